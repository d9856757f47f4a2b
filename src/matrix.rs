//! Role-capability matrix
//!
//! Per-(role, capability, context) permission storage and lookup. Lookup
//! consults only the requested context and the root fallback, preferring
//! the more specific entry when both exist; intermediate ancestors are
//! not walked.

use std::sync::Arc;

use tracing::{info, warn};

use crate::capability::validate_name;
use crate::error::{AccessError, Result};
use crate::store::AccessStore;
use crate::types::{now, CapabilityInfo, Permission, SYSTEM_CONTEXT_ID};

/// Role-capability permission matrix over an [`AccessStore`].
pub struct CapabilityMatrix {
    store: Arc<dyn AccessStore>,
}

impl CapabilityMatrix {
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self { store }
    }

    /// Set a role's permission for a capability at a context, updating the
    /// entry in place when it already exists. Returns false when the
    /// capability name is unknown or malformed.
    pub async fn assign(
        &self,
        role_id: i64,
        capability_name: &str,
        permission: Permission,
        context_id: i64,
    ) -> Result<bool> {
        if let Err(AccessError::Validation(reason)) = validate_name(capability_name) {
            warn!(%reason, "rejecting capability assignment");
            return Ok(false);
        }
        let Some(capability) = self.store.find_capability(capability_name).await? else {
            warn!(capability = capability_name, "unknown capability");
            return Ok(false);
        };

        self.store
            .upsert_role_capability(role_id, capability.id, context_id, permission, now())
            .await?;
        info!(
            role_id,
            capability = capability_name,
            context_id,
            permission = ?permission,
            "capability permission set"
        );
        Ok(true)
    }

    /// The permission a role holds for a capability at a context.
    ///
    /// Checks the exact context and the root fallback, preferring the more
    /// specific entry; `Inherit` when no entry exists at either.
    pub async fn permission(
        &self,
        role_id: i64,
        capability_id: i64,
        context_id: i64,
    ) -> Result<Permission> {
        let candidates = if context_id == SYSTEM_CONTEXT_ID {
            vec![SYSTEM_CONTEXT_ID]
        } else {
            vec![context_id, SYSTEM_CONTEXT_ID]
        };
        let entry = self
            .store
            .role_capability(role_id, capability_id, &candidates)
            .await?;
        Ok(entry.map(|e| e.permission).unwrap_or(Permission::Inherit))
    }

    /// All capability entries of a role at a context.
    pub async fn role_capabilities(
        &self,
        role_id: i64,
        context_id: i64,
    ) -> Result<Vec<CapabilityInfo>> {
        self.store.role_capabilities(role_id, context_id).await
    }
}
