//! In-memory access store
//!
//! Backs single-process deployments and tests. Tables live behind one
//! `RwLock`, so every store call is atomic with respect to the others.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{AccessError, Result};
use crate::types::{
    Capability, CapabilityDef, CapabilityInfo, Context, ContextLevel, NewRole, Permission, Role,
    RoleAssignment, RoleCapability, SYSTEM_CONTEXT_ID,
};

use super::AccessStore;

#[derive(Debug, Default)]
struct Tables {
    contexts: BTreeMap<i64, Context>,
    roles: BTreeMap<i64, Role>,
    capabilities: BTreeMap<i64, Capability>,
    role_capabilities: Vec<RoleCapability>,
    assignments: Vec<RoleAssignment>,
    next_context_id: i64,
    next_role_id: i64,
    next_capability_id: i64,
}

/// In-memory [`AccessStore`] implementation.
pub struct MemoryStore {
    inner: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Create a store seeded with the system context at id 1.
    pub fn new() -> Self {
        let mut tables = Tables {
            next_context_id: 2,
            next_role_id: 1,
            next_capability_id: 1,
            ..Tables::default()
        };
        tables.contexts.insert(
            SYSTEM_CONTEXT_ID,
            Context {
                id: SYSTEM_CONTEXT_ID,
                level: ContextLevel::System,
                instance_id: 0,
                path: format!("/{SYSTEM_CONTEXT_ID}"),
                depth: 0,
            },
        );
        Self {
            inner: Arc::new(RwLock::new(tables)),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn descendant_prefix(path: &str) -> String {
    format!("{path}/")
}

#[async_trait]
impl AccessStore for MemoryStore {
    async fn get_context(&self, id: i64) -> Result<Option<Context>> {
        let tables = self.inner.read().await;
        Ok(tables.contexts.get(&id).cloned())
    }

    async fn find_context(
        &self,
        level: ContextLevel,
        instance_id: i64,
    ) -> Result<Option<Context>> {
        let tables = self.inner.read().await;
        Ok(tables
            .contexts
            .values()
            .find(|c| c.level == level && c.instance_id == instance_id)
            .cloned())
    }

    async fn insert_context(
        &self,
        level: ContextLevel,
        instance_id: i64,
        path: &str,
        depth: i64,
    ) -> Result<i64> {
        let mut tables = self.inner.write().await;
        if tables
            .contexts
            .values()
            .any(|c| c.level == level && c.instance_id == instance_id)
        {
            return Err(AccessError::Integrity(format!(
                "duplicate context for level {} instance {}",
                level.value(),
                instance_id
            )));
        }
        let id = tables.next_context_id;
        tables.next_context_id += 1;
        tables.contexts.insert(
            id,
            Context {
                id,
                level,
                instance_id,
                path: path.to_string(),
                depth,
            },
        );
        Ok(id)
    }

    async fn update_context_path(&self, id: i64, path: &str, depth: i64) -> Result<bool> {
        let mut tables = self.inner.write().await;
        match tables.contexts.get_mut(&id) {
            Some(ctx) => {
                ctx.path = path.to_string();
                ctx.depth = depth;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn child_contexts(&self, path: &str, depth: i64) -> Result<Vec<Context>> {
        let prefix = descendant_prefix(path);
        let tables = self.inner.read().await;
        let mut children: Vec<Context> = tables
            .contexts
            .values()
            .filter(|c| c.path.starts_with(&prefix) && c.depth == depth + 1)
            .cloned()
            .collect();
        children.sort_by_key(|c| c.id);
        Ok(children)
    }

    async fn descendant_contexts(&self, path: &str) -> Result<Vec<Context>> {
        let prefix = descendant_prefix(path);
        let tables = self.inner.read().await;
        let mut descendants: Vec<Context> = tables
            .contexts
            .values()
            .filter(|c| c.path.starts_with(&prefix))
            .cloned()
            .collect();
        descendants.sort_by_key(|c| (c.depth, c.id));
        Ok(descendants)
    }

    async fn delete_context_subtree(&self, id: i64, path: &str) -> Result<Vec<i64>> {
        let prefix = descendant_prefix(path);
        let mut tables = self.inner.write().await;
        let doomed: Vec<i64> = tables
            .contexts
            .values()
            .filter(|c| c.id == id || c.path.starts_with(&prefix))
            .map(|c| c.id)
            .collect();
        for ctx_id in &doomed {
            tables.contexts.remove(ctx_id);
        }
        Ok(doomed)
    }

    async fn get_role(&self, id: i64) -> Result<Option<Role>> {
        let tables = self.inner.read().await;
        Ok(tables.roles.get(&id).cloned())
    }

    async fn find_role(&self, shortname: &str) -> Result<Option<Role>> {
        let tables = self.inner.read().await;
        Ok(tables
            .roles
            .values()
            .find(|r| r.shortname == shortname)
            .cloned())
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        let tables = self.inner.read().await;
        let mut roles: Vec<Role> = tables.roles.values().cloned().collect();
        roles.sort_by_key(|r| (r.sortorder, r.id));
        Ok(roles)
    }

    async fn insert_role(&self, role: &NewRole) -> Result<i64> {
        let mut tables = self.inner.write().await;
        if tables.roles.values().any(|r| r.shortname == role.shortname) {
            return Err(AccessError::Integrity(format!(
                "duplicate role shortname '{}'",
                role.shortname
            )));
        }
        let id = tables.next_role_id;
        tables.next_role_id += 1;
        tables.roles.insert(
            id,
            Role {
                id,
                name: role.name.clone(),
                shortname: role.shortname.clone(),
                description: role.description.clone(),
                archetype: role.archetype.clone(),
                sortorder: role.sortorder,
            },
        );
        Ok(id)
    }

    async fn update_role(&self, role: &Role) -> Result<bool> {
        let mut tables = self.inner.write().await;
        if tables
            .roles
            .values()
            .any(|r| r.id != role.id && r.shortname == role.shortname)
        {
            return Err(AccessError::Integrity(format!(
                "duplicate role shortname '{}'",
                role.shortname
            )));
        }
        match tables.roles.get_mut(&role.id) {
            Some(existing) => {
                *existing = role.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_role(&self, id: i64) -> Result<bool> {
        let mut tables = self.inner.write().await;
        Ok(tables.roles.remove(&id).is_some())
    }

    async fn get_capability(&self, id: i64) -> Result<Option<Capability>> {
        let tables = self.inner.read().await;
        Ok(tables.capabilities.get(&id).cloned())
    }

    async fn find_capability(&self, name: &str) -> Result<Option<Capability>> {
        let tables = self.inner.read().await;
        Ok(tables
            .capabilities
            .values()
            .find(|c| c.name == name)
            .cloned())
    }

    async fn list_capabilities(&self) -> Result<Vec<Capability>> {
        let tables = self.inner.read().await;
        let mut caps: Vec<Capability> = tables.capabilities.values().cloned().collect();
        caps.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(caps)
    }

    async fn insert_capability(&self, component: &str, def: &CapabilityDef) -> Result<i64> {
        let mut tables = self.inner.write().await;
        if tables.capabilities.values().any(|c| c.name == def.name) {
            return Err(AccessError::Integrity(format!(
                "duplicate capability '{}'",
                def.name
            )));
        }
        let id = tables.next_capability_id;
        tables.next_capability_id += 1;
        tables.capabilities.insert(
            id,
            Capability {
                id,
                name: def.name.clone(),
                captype: def.captype.clone(),
                context_level: def.context_level,
                component: component.to_string(),
                risk_bitmask: def.risk_bitmask,
                description: def.description.clone(),
            },
        );
        Ok(id)
    }

    async fn upsert_role_capability(
        &self,
        role_id: i64,
        capability_id: i64,
        context_id: i64,
        permission: Permission,
        now: i64,
    ) -> Result<()> {
        let mut tables = self.inner.write().await;
        if let Some(entry) = tables.role_capabilities.iter_mut().find(|rc| {
            rc.role_id == role_id
                && rc.capability_id == capability_id
                && rc.context_id == context_id
        }) {
            entry.permission = permission;
            entry.timemodified = now;
        } else {
            tables.role_capabilities.push(RoleCapability {
                role_id,
                capability_id,
                context_id,
                permission,
                timecreated: now,
                timemodified: now,
            });
        }
        Ok(())
    }

    async fn role_capability(
        &self,
        role_id: i64,
        capability_id: i64,
        context_ids: &[i64],
    ) -> Result<Option<RoleCapability>> {
        let tables = self.inner.read().await;
        Ok(tables
            .role_capabilities
            .iter()
            .filter(|rc| {
                rc.role_id == role_id
                    && rc.capability_id == capability_id
                    && context_ids.contains(&rc.context_id)
            })
            .max_by_key(|rc| rc.context_id)
            .cloned())
    }

    async fn role_capabilities(
        &self,
        role_id: i64,
        context_id: i64,
    ) -> Result<Vec<CapabilityInfo>> {
        let tables = self.inner.read().await;
        let mut rows: Vec<CapabilityInfo> = tables
            .role_capabilities
            .iter()
            .filter(|rc| rc.role_id == role_id && rc.context_id == context_id)
            .filter_map(|rc| {
                tables.capabilities.get(&rc.capability_id).map(|cap| CapabilityInfo {
                    name: cap.name.clone(),
                    description: cap.description.clone(),
                    permission: rc.permission,
                })
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn allowed_capabilities(&self, role_ids: &[i64]) -> Result<Vec<CapabilityInfo>> {
        let tables = self.inner.read().await;
        let mut rows: Vec<CapabilityInfo> = Vec::new();
        for rc in &tables.role_capabilities {
            if rc.permission != Permission::Allow || !role_ids.contains(&rc.role_id) {
                continue;
            }
            let Some(cap) = tables.capabilities.get(&rc.capability_id) else {
                continue;
            };
            if rows.iter().any(|r: &CapabilityInfo| r.name == cap.name) {
                continue;
            }
            rows.push(CapabilityInfo {
                name: cap.name.clone(),
                description: cap.description.clone(),
                permission: rc.permission,
            });
        }
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn delete_role_capabilities(&self, role_id: i64) -> Result<u64> {
        let mut tables = self.inner.write().await;
        let before = tables.role_capabilities.len();
        tables.role_capabilities.retain(|rc| rc.role_id != role_id);
        Ok((before - tables.role_capabilities.len()) as u64)
    }

    async fn delete_role_capabilities_at(&self, context_ids: &[i64]) -> Result<u64> {
        let mut tables = self.inner.write().await;
        let before = tables.role_capabilities.len();
        tables
            .role_capabilities
            .retain(|rc| !context_ids.contains(&rc.context_id));
        Ok((before - tables.role_capabilities.len()) as u64)
    }

    async fn find_assignment(
        &self,
        role_id: i64,
        subject_id: i64,
        context_id: i64,
    ) -> Result<Option<RoleAssignment>> {
        let tables = self.inner.read().await;
        Ok(tables
            .assignments
            .iter()
            .find(|a| {
                a.role_id == role_id && a.subject_id == subject_id && a.context_id == context_id
            })
            .cloned())
    }

    async fn insert_assignment(&self, assignment: &RoleAssignment) -> Result<()> {
        let mut tables = self.inner.write().await;
        if tables.assignments.iter().any(|a| {
            a.role_id == assignment.role_id
                && a.subject_id == assignment.subject_id
                && a.context_id == assignment.context_id
        }) {
            return Err(AccessError::Integrity(format!(
                "duplicate assignment of role {} to subject {} at context {}",
                assignment.role_id, assignment.subject_id, assignment.context_id
            )));
        }
        tables.assignments.push(assignment.clone());
        Ok(())
    }

    async fn update_assignment_window(
        &self,
        role_id: i64,
        subject_id: i64,
        context_id: i64,
        timestart: i64,
        timeend: i64,
        now: i64,
    ) -> Result<bool> {
        let mut tables = self.inner.write().await;
        match tables.assignments.iter_mut().find(|a| {
            a.role_id == role_id && a.subject_id == subject_id && a.context_id == context_id
        }) {
            Some(a) => {
                a.timestart = timestart;
                a.timeend = timeend;
                a.timemodified = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_assignment(
        &self,
        role_id: i64,
        subject_id: i64,
        context_id: i64,
    ) -> Result<bool> {
        let mut tables = self.inner.write().await;
        let before = tables.assignments.len();
        tables.assignments.retain(|a| {
            !(a.role_id == role_id && a.subject_id == subject_id && a.context_id == context_id)
        });
        Ok(tables.assignments.len() < before)
    }

    async fn subject_roles(
        &self,
        subject_id: i64,
        context_ids: &[i64],
        now: i64,
    ) -> Result<Vec<Role>> {
        let tables = self.inner.read().await;
        let mut roles: Vec<Role> = Vec::new();
        for assignment in &tables.assignments {
            if assignment.subject_id != subject_id
                || !context_ids.contains(&assignment.context_id)
                || !assignment.is_active(now)
            {
                continue;
            }
            if roles.iter().any(|r| r.id == assignment.role_id) {
                continue;
            }
            if let Some(role) = tables.roles.get(&assignment.role_id) {
                roles.push(role.clone());
            }
        }
        roles.sort_by_key(|r| (r.sortorder, r.id));
        Ok(roles)
    }

    async fn subject_has_role(
        &self,
        subject_id: i64,
        role_id: i64,
        context_ids: &[i64],
        now: i64,
    ) -> Result<bool> {
        let tables = self.inner.read().await;
        Ok(tables.assignments.iter().any(|a| {
            a.subject_id == subject_id
                && a.role_id == role_id
                && context_ids.contains(&a.context_id)
                && a.is_active(now)
        }))
    }

    async fn subject_assignments(
        &self,
        subject_id: i64,
    ) -> Result<Vec<(Role, RoleAssignment)>> {
        let tables = self.inner.read().await;
        let mut rows: Vec<(Role, RoleAssignment)> = tables
            .assignments
            .iter()
            .filter(|a| a.subject_id == subject_id)
            .filter_map(|a| {
                tables
                    .roles
                    .get(&a.role_id)
                    .map(|role| (role.clone(), a.clone()))
            })
            .collect();
        rows.sort_by_key(|(role, _)| (role.sortorder, role.id));
        Ok(rows)
    }

    async fn delete_assignments_for_role(&self, role_id: i64) -> Result<u64> {
        let mut tables = self.inner.write().await;
        let before = tables.assignments.len();
        tables.assignments.retain(|a| a.role_id != role_id);
        Ok((before - tables.assignments.len()) as u64)
    }

    async fn delete_assignments_at(&self, context_ids: &[i64]) -> Result<u64> {
        let mut tables = self.inner.write().await;
        let before = tables.assignments.len();
        tables
            .assignments
            .retain(|a| !context_ids.contains(&a.context_id));
        Ok((before - tables.assignments.len()) as u64)
    }

    async fn delete_expired_assignments(&self, now: i64) -> Result<u64> {
        let mut tables = self.inner.write().await;
        let before = tables.assignments.len();
        tables
            .assignments
            .retain(|a| !(a.timeend > 0 && a.timeend < now));
        Ok((before - tables.assignments.len()) as u64)
    }
}
