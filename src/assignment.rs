//! Role assignment store
//!
//! Binds subjects to roles at a context, optionally time-bounded. Queries
//! consider assignments at the requested context or at the root context,
//! filtered to currently valid windows.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::store::AccessStore;
use crate::types::{
    now, AssignmentStatus, Role, RoleAssignment, SYSTEM_CONTEXT_ID,
};

fn candidate_contexts(context_id: i64) -> Vec<i64> {
    if context_id == SYSTEM_CONTEXT_ID {
        vec![SYSTEM_CONTEXT_ID]
    } else {
        vec![context_id, SYSTEM_CONTEXT_ID]
    }
}

/// Role assignment operations over an [`AccessStore`].
pub struct RoleAssignments {
    store: Arc<dyn AccessStore>,
}

impl RoleAssignments {
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self { store }
    }

    /// Assign a role to a subject at a context with an optional validity
    /// window (0 = unbounded). Re-assigning an existing triple updates its
    /// window instead of duplicating the row.
    pub async fn assign(
        &self,
        role_id: i64,
        subject_id: i64,
        context_id: i64,
        timestart: i64,
        timeend: i64,
    ) -> Result<bool> {
        let ts = now();
        if self
            .store
            .find_assignment(role_id, subject_id, context_id)
            .await?
            .is_some()
        {
            let updated = self
                .store
                .update_assignment_window(role_id, subject_id, context_id, timestart, timeend, ts)
                .await?;
            info!(role_id, subject_id, context_id, "assignment window updated");
            return Ok(updated);
        }

        self.store
            .insert_assignment(&RoleAssignment {
                role_id,
                subject_id,
                context_id,
                timestart,
                timeend,
                timecreated: ts,
                timemodified: ts,
            })
            .await?;
        info!(role_id, subject_id, context_id, "role assigned");
        Ok(true)
    }

    /// Remove an assignment. Returns false when no such assignment exists.
    pub async fn unassign(&self, role_id: i64, subject_id: i64, context_id: i64) -> Result<bool> {
        let removed = self
            .store
            .delete_assignment(role_id, subject_id, context_id)
            .await?;
        if removed {
            info!(role_id, subject_id, context_id, "role unassigned");
        }
        Ok(removed)
    }

    /// Roles currently held by a subject at a context (or at the root),
    /// ordered by sortorder.
    pub async fn subject_roles(&self, subject_id: i64, context_id: i64) -> Result<Vec<Role>> {
        self.store
            .subject_roles(subject_id, &candidate_contexts(context_id), now())
            .await
    }

    /// Whether the subject currently holds the role at the context or the
    /// root.
    pub async fn subject_has_role(
        &self,
        subject_id: i64,
        role_id: i64,
        context_id: i64,
    ) -> Result<bool> {
        self.store
            .subject_has_role(subject_id, role_id, &candidate_contexts(context_id), now())
            .await
    }

    /// Shortname variant of [`Self::subject_has_role`]; unknown shortnames
    /// are simply not held.
    pub async fn subject_has_role_shortname(
        &self,
        subject_id: i64,
        shortname: &str,
        context_id: i64,
    ) -> Result<bool> {
        match self.store.find_role(shortname).await? {
            Some(role) => self.subject_has_role(subject_id, role.id, context_id).await,
            None => Ok(false),
        }
    }

    /// Assign a role to many subjects, best-effort: per-subject failures
    /// are logged and skipped, and the count of successes is returned.
    pub async fn bulk_assign(
        &self,
        role_id: i64,
        subject_ids: &[i64],
        context_id: i64,
    ) -> Result<usize> {
        let mut assigned = 0;
        for &subject_id in subject_ids {
            match self.assign(role_id, subject_id, context_id, 0, 0).await {
                Ok(true) => assigned += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(role_id, subject_id, context_id, %err, "bulk assign failed for subject");
                }
            }
        }
        Ok(assigned)
    }

    /// Unassign a role from many subjects, best-effort; returns the count
    /// of assignments actually removed.
    pub async fn bulk_unassign(
        &self,
        role_id: i64,
        subject_ids: &[i64],
        context_id: i64,
    ) -> Result<usize> {
        let mut unassigned = 0;
        for &subject_id in subject_ids {
            match self.unassign(role_id, subject_id, context_id).await {
                Ok(true) => unassigned += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(role_id, subject_id, context_id, %err, "bulk unassign failed for subject");
                }
            }
        }
        Ok(unassigned)
    }

    /// Every assignment of a subject with its role and window status,
    /// including future-dated and expired ones.
    pub async fn all_for_subject(
        &self,
        subject_id: i64,
    ) -> Result<Vec<(Role, RoleAssignment, AssignmentStatus)>> {
        let ts = now();
        let rows = self.store.subject_assignments(subject_id).await?;
        Ok(rows
            .into_iter()
            .map(|(role, assignment)| {
                let status = assignment.status(ts);
                (role, assignment, status)
            })
            .collect())
    }

    /// Delete assignments whose end bound has passed; returns the number
    /// removed.
    pub async fn clean_expired(&self) -> Result<u64> {
        let removed = self.store.delete_expired_assignments(now()).await?;
        if removed > 0 {
            info!(removed, "expired role assignments cleaned");
        }
        Ok(removed)
    }
}
