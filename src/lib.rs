//! # capauth
//!
//! Hierarchical role/capability authorization engine.
//!
//! Decides, for a `(subject, capability, context)` triple, whether an
//! action is permitted. Contexts form a tree encoded as materialized
//! paths, roles bind subjects to permission bundles with optional
//! validity windows, and per-role permissions aggregate under the
//! `PROHIBIT > ALLOW > PREVENT > INHERIT` precedence.
//!
//! ## Features
//!
//! - **Materialized-path context tree** — ancestor/descendant queries are
//!   prefix checks, no recursion
//! - **Four-state permission lattice** with order-independent aggregation
//! - **Time-bounded role assignments** with bulk and cleanup operations
//! - **Memoized resolution** with explicit, per-subject invalidation
//! - **Pluggable storage** — in-memory for single-process use and tests,
//!   PostgreSQL behind the `postgres` feature
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use capauth::{
//!     AccessEngine, CapabilityDef, ContextLevel, MemoryStore, NewRole, Permission,
//!     SYSTEM_CONTEXT_ID,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = AccessEngine::new(Arc::new(MemoryStore::new()));
//!
//!     engine
//!         .register_capabilities(
//!             "core",
//!             &[CapabilityDef {
//!                 name: "site:config".to_string(),
//!                 captype: "write".to_string(),
//!                 context_level: ContextLevel::System,
//!                 risk_bitmask: capauth::risk::CONFIG,
//!                 description: "Configure the site".to_string(),
//!             }],
//!         )
//!         .await?;
//!
//!     let admin = engine
//!         .create_role(NewRole {
//!             name: "Administrator".to_string(),
//!             shortname: "admin".to_string(),
//!             description: String::new(),
//!             archetype: "admin".to_string(),
//!             sortorder: 1,
//!         })
//!         .await?;
//!
//!     engine
//!         .assign_capability(admin, "site:config", Permission::Allow, SYSTEM_CONTEXT_ID)
//!         .await?;
//!     engine.assign_role(admin, 42, SYSTEM_CONTEXT_ID, 0, 0).await?;
//!
//!     assert!(engine.has_capability(42, "site:config", SYSTEM_CONTEXT_ID).await?);
//!     Ok(())
//! }
//! ```

pub mod assignment;
pub mod capability;
pub mod context;
pub mod engine;
pub mod error;
pub mod matrix;
pub mod role;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use assignment::RoleAssignments;
pub use capability::CapabilityRegistry;
pub use context::ContextTree;
pub use engine::{AccessEngine, CacheConfig, CacheStats, DecisionCache, EngineConfig};
pub use error::{AccessError, Result};
pub use matrix::CapabilityMatrix;
pub use role::RoleCatalog;
pub use store::{AccessStore, MemoryStore};
#[cfg(feature = "postgres")]
pub use store::PostgresStore;
pub use types::{
    risk, AssignmentStatus, Capability, CapabilityDef, CapabilityInfo, Context, ContextLevel,
    NewRole, Permission, Role, RoleAssignment, RoleCapability, PROTECTED_SHORTNAMES,
    SYSTEM_CONTEXT_ID,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
