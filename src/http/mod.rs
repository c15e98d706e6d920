//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers)
//!     → request.rs (request ID)
//!     → branching routers (see crate::branching)
//!     → upstream.rs (forward, stream response back)
//!     → Send to client
//! ```

pub mod request;
pub mod server;
pub mod upstream;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{stack_branches, GatewayServer, ServerError};
pub use upstream::Upstream;
