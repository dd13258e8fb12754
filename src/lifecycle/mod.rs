//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → signal name
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → server stops accepting → drain → exit
//! ```
//!
//! # Design Decisions
//! - Startup is linear in `main`: config, logging, metrics, state, bind
//! - In-flight upstream calls finish on their own tasks while draining

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
