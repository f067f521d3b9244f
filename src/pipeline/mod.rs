//! Middleware pipeline run by the director and the rewriter.
//!
//! # Data Flow
//! ```text
//! decoded body snapshot
//!     → middleware[0].transform → middleware[1].transform → ...
//!     → final snapshot handed to the body encoder
//!
//! first failure → ProxyError::Middleware, remaining stages skipped
//! ```
//!
//! # Design Decisions
//! - Request and response legs use disjoint pipelines, typed by the message
//!   head they see (`request::Parts` vs `response::Parts`)
//! - Registration order is execution order
//! - Not transactional: stages that already ran are not rolled back

pub mod middleware;

pub use middleware::{from_fn, FnMiddleware, Middleware, Pipeline};
