//! Tenant routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request head (host, path)
//!     → router.rs (table lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: TenantConfig or NoTenant
//!
//! Table compilation (at startup and on reload):
//!     TenantEntry[]
//!     → Sort by priority
//!     → Compile matchers
//!     → Swap into the StaticResolver
//! ```
//!
//! # Design Decisions
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same tenant
//! - First match wins (ordered by priority)

pub mod matcher;
pub mod router;

pub use router::{NoTenant, StaticResolver, TenantTable};
