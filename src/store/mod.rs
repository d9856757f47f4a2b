//! Persistence boundary for the authorization engine
//!
//! The engine only ever touches storage through [`AccessStore`], so the
//! in-memory store used for single-process deployments and tests is
//! interchangeable with the PostgreSQL store.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    Capability, CapabilityDef, CapabilityInfo, Context, ContextLevel, NewRole, Permission, Role,
    RoleAssignment, RoleCapability,
};

mod memory;

pub use memory::MemoryStore;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

/// Storage operations over the persisted relational state.
///
/// Constraint violations (duplicate unique keys) surface as
/// [`crate::AccessError::Integrity`]; lookups that find nothing return
/// `Ok(None)` / empty collections rather than errors.
#[async_trait]
pub trait AccessStore: Send + Sync {
    // Contexts

    /// Get a context by id.
    async fn get_context(&self, id: i64) -> Result<Option<Context>>;

    /// Find a context by its (level, instance) key.
    async fn find_context(&self, level: ContextLevel, instance_id: i64)
        -> Result<Option<Context>>;

    /// Insert a context row and return its assigned id. The path passed in
    /// is a placeholder; the caller patches it once the id is known.
    async fn insert_context(
        &self,
        level: ContextLevel,
        instance_id: i64,
        path: &str,
        depth: i64,
    ) -> Result<i64>;

    /// Patch the path (and depth) of a freshly inserted context.
    async fn update_context_path(&self, id: i64, path: &str, depth: i64) -> Result<bool>;

    /// Direct children of the context with the given path and depth.
    async fn child_contexts(&self, path: &str, depth: i64) -> Result<Vec<Context>>;

    /// All strict descendants of the context with the given path.
    async fn descendant_contexts(&self, path: &str) -> Result<Vec<Context>>;

    /// Delete a context and every descendant in one operation; returns the
    /// ids of all deleted contexts so dependent rows can be cleaned up.
    async fn delete_context_subtree(&self, id: i64, path: &str) -> Result<Vec<i64>>;

    // Roles

    async fn get_role(&self, id: i64) -> Result<Option<Role>>;

    async fn find_role(&self, shortname: &str) -> Result<Option<Role>>;

    /// All roles ordered by sortorder.
    async fn list_roles(&self) -> Result<Vec<Role>>;

    async fn insert_role(&self, role: &NewRole) -> Result<i64>;

    async fn update_role(&self, role: &Role) -> Result<bool>;

    async fn delete_role(&self, id: i64) -> Result<bool>;

    // Capabilities

    async fn get_capability(&self, id: i64) -> Result<Option<Capability>>;

    async fn find_capability(&self, name: &str) -> Result<Option<Capability>>;

    async fn list_capabilities(&self) -> Result<Vec<Capability>>;

    async fn insert_capability(&self, component: &str, def: &CapabilityDef) -> Result<i64>;

    // Role-capability matrix

    /// Insert or update the (role, capability, context) permission entry.
    async fn upsert_role_capability(
        &self,
        role_id: i64,
        capability_id: i64,
        context_id: i64,
        permission: Permission,
        now: i64,
    ) -> Result<()>;

    /// The matrix entry for (role, capability) at the most specific of the
    /// candidate context ids, if any entry exists.
    async fn role_capability(
        &self,
        role_id: i64,
        capability_id: i64,
        context_ids: &[i64],
    ) -> Result<Option<RoleCapability>>;

    /// Capability name/description/permission rows for a role at a context.
    async fn role_capabilities(&self, role_id: i64, context_id: i64)
        -> Result<Vec<CapabilityInfo>>;

    /// Distinct ALLOW-permission capabilities reachable through the given
    /// roles, joined with their metadata.
    async fn allowed_capabilities(&self, role_ids: &[i64]) -> Result<Vec<CapabilityInfo>>;

    async fn delete_role_capabilities(&self, role_id: i64) -> Result<u64>;

    async fn delete_role_capabilities_at(&self, context_ids: &[i64]) -> Result<u64>;

    // Role assignments

    async fn find_assignment(
        &self,
        role_id: i64,
        subject_id: i64,
        context_id: i64,
    ) -> Result<Option<RoleAssignment>>;

    async fn insert_assignment(&self, assignment: &RoleAssignment) -> Result<()>;

    /// Update the validity window of an existing assignment.
    async fn update_assignment_window(
        &self,
        role_id: i64,
        subject_id: i64,
        context_id: i64,
        timestart: i64,
        timeend: i64,
        now: i64,
    ) -> Result<bool>;

    async fn delete_assignment(
        &self,
        role_id: i64,
        subject_id: i64,
        context_id: i64,
    ) -> Result<bool>;

    /// Roles assigned to a subject at any of the candidate contexts with a
    /// validity window covering `now`, ordered by sortorder.
    async fn subject_roles(
        &self,
        subject_id: i64,
        context_ids: &[i64],
        now: i64,
    ) -> Result<Vec<Role>>;

    /// Whether the subject holds the role at any of the candidate contexts
    /// with a currently valid window.
    async fn subject_has_role(
        &self,
        subject_id: i64,
        role_id: i64,
        context_ids: &[i64],
        now: i64,
    ) -> Result<bool>;

    /// Every assignment of a subject regardless of validity, with its role,
    /// ordered by role sortorder.
    async fn subject_assignments(&self, subject_id: i64)
        -> Result<Vec<(Role, RoleAssignment)>>;

    async fn delete_assignments_for_role(&self, role_id: i64) -> Result<u64>;

    async fn delete_assignments_at(&self, context_ids: &[i64]) -> Result<u64>;

    /// Delete assignments whose end bound lies in the past; returns the
    /// number of rows removed.
    async fn delete_expired_assignments(&self, now: i64) -> Result<u64>;
}
