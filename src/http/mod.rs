//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID assignment)
//!     → aggregate.rs | passthrough.rs (handlers)
//!     → upstream gateway (cache, scheduler, retries)
//!     → response.rs (diagnostic headers)
//!     → Send to client
//! ```

pub mod aggregate;
pub mod passthrough;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{build_router, AppState, HttpServer};
