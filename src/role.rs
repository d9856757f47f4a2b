//! Role catalog
//!
//! CRUD over roles plus the protection rules for the base system roles.
//! Deleting a role cascades to its matrix entries and assignments so
//! neither can outlive it.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{AccessError, Result};
use crate::store::AccessStore;
use crate::types::{NewRole, Role};

/// Role catalog over an [`AccessStore`].
pub struct RoleCatalog {
    store: Arc<dyn AccessStore>,
}

impl RoleCatalog {
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self { store }
    }

    /// Create a role. Shortnames must be unique; duplicates surface as an
    /// integrity error from the store.
    pub async fn create(&self, role: NewRole) -> Result<i64> {
        if role.shortname.is_empty() {
            return Err(AccessError::Validation("empty role shortname".to_string()));
        }
        let id = self.store.insert_role(&role).await?;
        info!(role_id = id, shortname = %role.shortname, "role created");
        Ok(id)
    }

    /// Ensure the protected base roles exist. Idempotent; returns the
    /// number of roles created.
    pub async fn ensure_defaults(&self) -> Result<usize> {
        let defaults = [
            ("Administrator", "admin", "admin", 1),
            ("Authenticated user", "user", "user", 2),
            ("Guest", "guest", "guest", 3),
        ];
        let mut created = 0;
        for (name, shortname, archetype, sortorder) in defaults {
            if self.store.find_role(shortname).await?.is_some() {
                continue;
            }
            self.create(NewRole {
                name: name.to_string(),
                shortname: shortname.to_string(),
                description: String::new(),
                archetype: archetype.to_string(),
                sortorder,
            })
            .await?;
            created += 1;
        }
        Ok(created)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Role>> {
        self.store.get_role(id).await
    }

    pub async fn find(&self, shortname: &str) -> Result<Option<Role>> {
        self.store.find_role(shortname).await
    }

    pub async fn list(&self) -> Result<Vec<Role>> {
        self.store.list_roles().await
    }

    /// Update a role. Renaming a protected system role is refused with a
    /// false return; other fields of protected roles stay editable.
    pub async fn update(&self, role: &Role) -> Result<bool> {
        let Some(existing) = self.store.get_role(role.id).await? else {
            return Ok(false);
        };
        if existing.is_protected()
            && (existing.shortname != role.shortname || existing.name != role.name)
        {
            warn!(role_id = role.id, shortname = %existing.shortname, "refusing to rename protected role");
            return Ok(false);
        }
        self.store.update_role(role).await
    }

    /// Delete a role together with its matrix entries and assignments.
    /// Protected system roles and unknown ids are refused with a false
    /// return.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let Some(role) = self.store.get_role(id).await? else {
            return Ok(false);
        };
        if role.is_protected() {
            warn!(role_id = id, shortname = %role.shortname, "refusing to delete protected role");
            return Ok(false);
        }

        let entries = self.store.delete_role_capabilities(id).await?;
        let assignments = self.store.delete_assignments_for_role(id).await?;
        self.store.delete_role(id).await?;
        info!(role_id = id, entries, assignments, "role deleted");
        Ok(true)
    }
}
