//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → proxy engine (tenant shaping)
//!     → headers.rs (hop-by-hop stripping on both legs)
//!     → websocket.rs (upgrade splice after a 101)
//!     → Send to client
//! ```

pub mod headers;
pub mod server;
pub mod websocket;

pub use server::HttpServer;
