//! Context graph
//!
//! Maintains the tree of authorization scopes using a materialized path:
//! every context stores the slash-delimited chain of its ancestor ids
//! ending in its own id. That makes ancestor/descendant queries a string
//! prefix check instead of a recursive walk, which matters because the
//! resolution engine consults the graph on every authorization check. The
//! cost is a patch-after-insert on creation, since the final path needs
//! the id the store only assigns on insert.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{AccessError, Result};
use crate::store::AccessStore;
use crate::types::{Context, ContextLevel, SYSTEM_CONTEXT_ID};

/// Hierarchical context tree over an [`AccessStore`].
pub struct ContextTree {
    store: Arc<dyn AccessStore>,
}

impl ContextTree {
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self { store }
    }

    /// The root (system) context.
    pub async fn system(&self) -> Result<Context> {
        self.store
            .get_context(SYSTEM_CONTEXT_ID)
            .await?
            .ok_or_else(|| AccessError::Internal("system context missing".to_string()))
    }

    /// Get a context by id, or return the existing one for its
    /// (level, instance) key; creates it under `parent_context_id`
    /// otherwise. Idempotent.
    ///
    /// Creation is two-phase: the row is inserted with a placeholder path
    /// segment, then the path is patched to `parent.path + "/" + id` once
    /// the assigned id is known.
    pub async fn get_or_create(
        &self,
        level: ContextLevel,
        instance_id: i64,
        parent_context_id: i64,
    ) -> Result<i64> {
        if let Some(existing) = self.store.find_context(level, instance_id).await? {
            debug!(
                context_id = existing.id,
                level = level.name(),
                instance_id,
                "context already exists"
            );
            return Ok(existing.id);
        }

        let parent = match self.store.get_context(parent_context_id).await? {
            Some(parent) => parent,
            None => {
                // Unknown parents fall back to the root rather than failing
                // the caller that merely referenced an instance.
                warn!(
                    parent_context_id,
                    "parent context not found, attaching to system context"
                );
                self.system().await?
            }
        };

        let depth = parent.depth + 1;
        let placeholder = format!("{}/0", parent.path);
        let id = self
            .store
            .insert_context(level, instance_id, &placeholder, depth)
            .await?;
        let path = format!("{}/{}", parent.path, id);
        self.store.update_context_path(id, &path, depth).await?;

        info!(context_id = id, level = level.name(), instance_id, %path, "context created");
        Ok(id)
    }

    /// Get a context by id; unknown ids are an error here because the
    /// caller asked for a specific record.
    pub async fn get(&self, id: i64) -> Result<Context> {
        self.store
            .get_context(id)
            .await?
            .ok_or_else(|| AccessError::NotFound(format!("context {id}")))
    }

    /// The direct parent, derived from the second-to-last path segment.
    /// The root has none.
    pub async fn parent(&self, id: i64) -> Result<Option<Context>> {
        let ctx = self.get(id).await?;
        match ctx.parent_id() {
            Some(parent_id) => self.store.get_context(parent_id).await,
            None => Ok(None),
        }
    }

    /// Children of a context: direct children only, or every descendant
    /// when `recursive` is set. Unknown ids yield an empty list.
    pub async fn children(&self, id: i64, recursive: bool) -> Result<Vec<Context>> {
        let Some(ctx) = self.store.get_context(id).await? else {
            return Ok(Vec::new());
        };
        if recursive {
            self.store.descendant_contexts(&ctx.path).await
        } else {
            self.store.child_contexts(&ctx.path, ctx.depth).await
        }
    }

    /// Whether `ancestor_id` appears on the descendant's materialized path.
    pub async fn is_ancestor(&self, ancestor_id: i64, descendant_id: i64) -> Result<bool> {
        let Some(descendant) = self.store.get_context(descendant_id).await? else {
            return Ok(false);
        };
        Ok(descendant.path.contains(&format!("/{ancestor_id}/")))
    }

    /// Delete a context and all of its descendants, along with the role
    /// assignments and role-capability entries scoped to them. Returns
    /// false for the system context and for unknown ids.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let Some(ctx) = self.store.get_context(id).await? else {
            return Ok(false);
        };
        if ctx.is_root() || ctx.level == ContextLevel::System {
            warn!(context_id = id, "refusing to delete the system context");
            return Ok(false);
        }

        let deleted = self.store.delete_context_subtree(ctx.id, &ctx.path).await?;
        let assignments = self.store.delete_assignments_at(&deleted).await?;
        let entries = self.store.delete_role_capabilities_at(&deleted).await?;

        info!(
            context_id = id,
            contexts = deleted.len(),
            assignments,
            entries,
            "context subtree deleted"
        );
        Ok(true)
    }

}
