//! Permission resolution engine
//!
//! Orchestrates the context graph, capability registry, role-capability
//! matrix and assignment store into the single question the surrounding
//! system asks: may this subject exercise this capability at this
//! context?
//!
//! ```text
//! caller → AccessEngine → RoleAssignments → ContextTree (root fallback)
//!                       → CapabilityMatrix → DecisionCache
//! ```
//!
//! The engine is an explicitly constructed instance; its cache is a field,
//! not process-global state. All mutating operations go through wrapper
//! methods that hold one writer lock around "mutate store + invalidate
//! cache", so no reader can observe a stale cached value after a mutation
//! completes.

pub mod cache;

pub use cache::{CacheConfig, CacheKey, CacheStats, DecisionCache};

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::assignment::RoleAssignments;
use crate::capability::CapabilityRegistry;
use crate::context::ContextTree;
use crate::error::{AccessError, Result};
use crate::matrix::CapabilityMatrix;
use crate::role::RoleCatalog;
use crate::store::AccessStore;
use crate::types::{
    AssignmentStatus, CapabilityDef, CapabilityInfo, Context, ContextLevel, NewRole, Permission,
    Role, RoleAssignment,
};

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Memoize resolution outcomes
    pub enable_cache: bool,
    /// Cache configuration
    pub cache: CacheConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_cache: true,
            cache: CacheConfig::default(),
        }
    }
}

/// Hierarchical role/capability authorization engine.
pub struct AccessEngine {
    store: Arc<dyn AccessStore>,
    contexts: ContextTree,
    registry: CapabilityRegistry,
    matrix: CapabilityMatrix,
    assignments: RoleAssignments,
    roles: RoleCatalog,
    cache: Option<DecisionCache>,
    /// Serializes "mutate store + invalidate cache" critical sections.
    write_lock: Mutex<()>,
}

impl AccessEngine {
    /// Create an engine with the default configuration.
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<dyn AccessStore>, config: EngineConfig) -> Self {
        let cache = config.enable_cache.then(|| DecisionCache::new(config.cache.clone()));
        info!(cache = config.enable_cache, "access engine initialized");
        Self {
            contexts: ContextTree::new(store.clone()),
            registry: CapabilityRegistry::new(store.clone()),
            matrix: CapabilityMatrix::new(store.clone()),
            assignments: RoleAssignments::new(store.clone()),
            roles: RoleCatalog::new(store.clone()),
            store,
            cache,
            write_lock: Mutex::new(()),
        }
    }

    // Read-side components. Mutations belong on the engine wrappers below
    // so cache invalidation cannot be skipped.

    pub fn contexts(&self) -> &ContextTree {
        &self.contexts
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn roles(&self) -> &RoleCatalog {
        &self.roles
    }

    // Resolution

    /// Whether a subject may exercise a capability at a context.
    ///
    /// Aggregates the permissions of every role the subject currently
    /// holds at the context (or the root) under the
    /// `Prohibit > Allow > Prevent > Inherit` precedence. Unknown or
    /// malformed capability names and subjects without roles resolve to
    /// false rather than an error; only store failures propagate.
    pub async fn has_capability(
        &self,
        subject_id: i64,
        capability: &str,
        context_id: i64,
    ) -> Result<bool> {
        // Guest / anonymous subjects hold nothing.
        if subject_id <= 0 {
            return Ok(false);
        }

        let key = CacheKey {
            subject_id,
            capability: capability.to_string(),
            context_id,
        };
        if let Some(cache) = &self.cache {
            if let Some(allowed) = cache.get(&key) {
                debug!(subject_id, capability, context_id, allowed, "cache hit");
                return Ok(allowed);
            }
        }

        let allowed = self
            .resolve_uncached(subject_id, capability, context_id)
            .await?;
        if let Some(cache) = &self.cache {
            cache.put(key, allowed);
        }
        debug!(subject_id, capability, context_id, allowed, "capability resolved");
        Ok(allowed)
    }

    async fn resolve_uncached(
        &self,
        subject_id: i64,
        capability: &str,
        context_id: i64,
    ) -> Result<bool> {
        let cap = match self.registry.resolve(capability).await {
            Ok(Some(cap)) => cap,
            Ok(None) => {
                debug!(capability, "unknown capability resolves to deny");
                return Ok(false);
            }
            Err(AccessError::Validation(reason)) => {
                debug!(capability, %reason, "malformed capability resolves to deny");
                return Ok(false);
            }
            Err(err) => return Err(err),
        };

        let roles = self.assignments.subject_roles(subject_id, context_id).await?;
        if roles.is_empty() {
            return Ok(false);
        }

        let mut resolved = Permission::Inherit;
        for role in &roles {
            let perm = self.matrix.permission(role.id, cap.id, context_id).await?;
            if perm == Permission::Prohibit {
                // Absolute: no other role can override it.
                debug!(subject_id, capability, role_id = role.id, "prohibited");
                return Ok(false);
            }
            resolved = resolved.combine(perm);
        }

        Ok(resolved == Permission::Allow)
    }

    /// Require a capability; a failed check is the expected
    /// [`AccessError::Denied`] outcome, not a system fault.
    pub async fn require_capability(
        &self,
        subject_id: i64,
        capability: &str,
        context_id: i64,
    ) -> Result<()> {
        if self.has_capability(subject_id, capability, context_id).await? {
            Ok(())
        } else {
            Err(AccessError::Denied {
                subject_id,
                capability: capability.to_string(),
                context_id,
            })
        }
    }

    /// Whether the subject holds at least one of the capabilities.
    pub async fn has_any_capability(
        &self,
        subject_id: i64,
        capabilities: &[&str],
        context_id: i64,
    ) -> Result<bool> {
        for capability in capabilities {
            if self.has_capability(subject_id, capability, context_id).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether the subject holds every one of the capabilities.
    pub async fn has_all_capabilities(
        &self,
        subject_id: i64,
        capabilities: &[&str],
        context_id: i64,
    ) -> Result<bool> {
        for capability in capabilities {
            if !self.has_capability(subject_id, capability, context_id).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Introspection: every ALLOW-permission capability reachable through
    /// the subject's current roles. Not used for gating.
    pub async fn user_capabilities(
        &self,
        subject_id: i64,
        context_id: i64,
    ) -> Result<Vec<CapabilityInfo>> {
        let roles = self.assignments.subject_roles(subject_id, context_id).await?;
        if roles.is_empty() {
            return Ok(Vec::new());
        }
        let role_ids: Vec<i64> = roles.iter().map(|r| r.id).collect();
        self.store.allowed_capabilities(&role_ids).await
    }

    /// Roles the subject currently holds at the context or the root.
    pub async fn user_roles(&self, subject_id: i64, context_id: i64) -> Result<Vec<Role>> {
        self.assignments.subject_roles(subject_id, context_id).await
    }

    pub async fn user_has_role(
        &self,
        subject_id: i64,
        role_id: i64,
        context_id: i64,
    ) -> Result<bool> {
        self.assignments
            .subject_has_role(subject_id, role_id, context_id)
            .await
    }

    pub async fn user_has_role_shortname(
        &self,
        subject_id: i64,
        shortname: &str,
        context_id: i64,
    ) -> Result<bool> {
        self.assignments
            .subject_has_role_shortname(subject_id, shortname, context_id)
            .await
    }

    /// Every assignment of a subject with its window status, including
    /// future-dated and expired ones.
    pub async fn user_assignments(
        &self,
        subject_id: i64,
    ) -> Result<Vec<(Role, RoleAssignment, AssignmentStatus)>> {
        self.assignments.all_for_subject(subject_id).await
    }

    /// All capability entries of a role at a context.
    pub async fn role_capabilities(
        &self,
        role_id: i64,
        context_id: i64,
    ) -> Result<Vec<CapabilityInfo>> {
        self.matrix.role_capabilities(role_id, context_id).await
    }

    // Mutations. Each holds the writer lock across the store change and
    // the cache invalidation so the two are observed together.

    /// Assign a role to a subject with an optional validity window.
    pub async fn assign_role(
        &self,
        role_id: i64,
        subject_id: i64,
        context_id: i64,
        timestart: i64,
        timeend: i64,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let assigned = self
            .assignments
            .assign(role_id, subject_id, context_id, timestart, timeend)
            .await?;
        self.invalidate(Some(subject_id));
        Ok(assigned)
    }

    pub async fn unassign_role(
        &self,
        role_id: i64,
        subject_id: i64,
        context_id: i64,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let removed = self.assignments.unassign(role_id, subject_id, context_id).await?;
        self.invalidate(Some(subject_id));
        Ok(removed)
    }

    /// Best-effort bulk assignment; returns the number of subjects
    /// actually assigned.
    pub async fn bulk_assign_role(
        &self,
        role_id: i64,
        subject_ids: &[i64],
        context_id: i64,
    ) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let assigned = self
            .assignments
            .bulk_assign(role_id, subject_ids, context_id)
            .await?;
        for &subject_id in subject_ids {
            self.invalidate(Some(subject_id));
        }
        Ok(assigned)
    }

    pub async fn bulk_unassign_role(
        &self,
        role_id: i64,
        subject_ids: &[i64],
        context_id: i64,
    ) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let unassigned = self
            .assignments
            .bulk_unassign(role_id, subject_ids, context_id)
            .await?;
        for &subject_id in subject_ids {
            self.invalidate(Some(subject_id));
        }
        Ok(unassigned)
    }

    /// Set a role's permission for a capability at a context. Any subject
    /// may hold the role, so the whole cache is dropped.
    pub async fn assign_capability(
        &self,
        role_id: i64,
        capability_name: &str,
        permission: Permission,
        context_id: i64,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let assigned = self
            .matrix
            .assign(role_id, capability_name, permission, context_id)
            .await?;
        if assigned {
            self.invalidate(None);
        }
        Ok(assigned)
    }

    /// Register a component's capabilities. Cached unknown-capability
    /// denials may now be wrong, so the whole cache is dropped.
    pub async fn register_capabilities(
        &self,
        component: &str,
        defs: &[CapabilityDef],
    ) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let inserted = self.registry.register_component(component, defs).await?;
        if inserted > 0 {
            self.invalidate(None);
        }
        Ok(inserted)
    }

    /// Idempotent context creation; see [`ContextTree::get_or_create`].
    /// Adding a leaf cannot change any existing resolution, so the cache
    /// is left alone.
    pub async fn get_or_create_context(
        &self,
        level: ContextLevel,
        instance_id: i64,
        parent_context_id: i64,
    ) -> Result<i64> {
        let _guard = self.write_lock.lock().await;
        self.contexts
            .get_or_create(level, instance_id, parent_context_id)
            .await
    }

    pub async fn get_context(&self, id: i64) -> Result<Context> {
        self.contexts.get(id).await
    }

    /// Delete a context subtree and everything scoped to it.
    pub async fn delete_context(&self, id: i64) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let deleted = self.contexts.delete(id).await?;
        if deleted {
            self.invalidate(None);
        }
        Ok(deleted)
    }

    pub async fn create_role(&self, role: NewRole) -> Result<i64> {
        let _guard = self.write_lock.lock().await;
        self.roles.create(role).await
    }

    pub async fn update_role(&self, role: &Role) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        self.roles.update(role).await
    }

    pub async fn delete_role(&self, role_id: i64) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let deleted = self.roles.delete(role_id).await?;
        if deleted {
            self.invalidate(None);
        }
        Ok(deleted)
    }

    /// Remove assignments whose validity window has ended.
    pub async fn clean_expired_assignments(&self) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let removed = self.assignments.clean_expired().await?;
        if removed > 0 {
            self.invalidate(None);
        }
        Ok(removed)
    }

    // Cache management

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate(None);
        }
    }

    fn invalidate(&self, subject_id: Option<i64>) {
        if let Some(cache) = &self.cache {
            cache.invalidate(subject_id);
        }
    }
}
