//! Core data model: permissions, contexts, roles, capabilities, assignments

use serde::{Deserialize, Serialize};

/// Reserved id of the root (system) context. It exists from installation
/// time, has no parent and can never be deleted.
pub const SYSTEM_CONTEXT_ID: i64 = 1;

/// Role shortnames that are part of the base installation and cannot be
/// deleted or renamed.
pub const PROTECTED_SHORTNAMES: &[&str] = &["admin", "user", "guest"];

/// Capability risk flags, combinable into a bitmask.
pub mod risk {
    pub const SPAM: u32 = 1;
    pub const PERSONAL: u32 = 2;
    pub const XSS: u32 = 4;
    pub const CONFIG: u32 = 8;
    pub const MANAGEMENT: u32 = 16;
    pub const DATALOSS: u32 = 32;
}

/// Permission state of a (role, capability, context) entry.
///
/// Precedence when aggregating across roles is
/// `Prohibit > Allow > Prevent > Inherit`: a single prohibit is absolute,
/// a single allow beats any number of prevents, and inherit carries no
/// opinion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Permission {
    /// No opinion; defer to other roles or deny by default
    Inherit,
    /// Grant the capability
    Allow,
    /// Soft deny, overridable by an allow from another role
    Prevent,
    /// Hard deny, never overridable
    Prohibit,
}

impl Permission {
    /// Stored integer value (matches the persisted schema).
    pub const fn value(self) -> i64 {
        match self {
            Self::Inherit => 0,
            Self::Allow => 1,
            Self::Prevent => -1,
            Self::Prohibit => -1000,
        }
    }

    /// Parse a stored integer value.
    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Inherit),
            1 => Some(Self::Allow),
            -1 => Some(Self::Prevent),
            -1000 => Some(Self::Prohibit),
            _ => None,
        }
    }

    /// Combine two permission states under the resolution precedence.
    ///
    /// The operation is commutative and associative, so folding it over a
    /// role set yields the same result for any iteration order.
    pub fn combine(self, other: Self) -> Self {
        use Permission::*;
        match (self, other) {
            (Prohibit, _) | (_, Prohibit) => Prohibit,
            (Allow, _) | (_, Allow) => Allow,
            (Prevent, _) | (_, Prevent) => Prevent,
            (Inherit, Inherit) => Inherit,
        }
    }
}

/// Level of an authorization context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextLevel {
    System,
    Subject,
    Module,
    Block,
}

impl ContextLevel {
    /// Stored integer value (matches the persisted schema).
    pub const fn value(self) -> i64 {
        match self {
            Self::System => 10,
            Self::Subject => 30,
            Self::Module => 70,
            Self::Block => 80,
        }
    }

    /// Parse a stored integer value.
    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            10 => Some(Self::System),
            30 => Some(Self::Subject),
            70 => Some(Self::Module),
            80 => Some(Self::Block),
            _ => None,
        }
    }

    /// Human-readable level name.
    pub fn name(self) -> &'static str {
        match self {
            Self::System => "System",
            Self::Subject => "Subject",
            Self::Module => "Module",
            Self::Block => "Block",
        }
    }
}

/// A hierarchical authorization scope.
///
/// `path` is the slash-delimited materialized chain of ancestor ids ending
/// in this context's own id (the root is `/1`); `depth` is the segment
/// count minus one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub id: i64,
    pub level: ContextLevel,
    /// Opaque external reference (subject id, module id, ...); 0 for the
    /// system context.
    pub instance_id: i64,
    pub path: String,
    pub depth: i64,
}

impl Context {
    /// Context ids along the path, root first, ending with this context.
    pub fn path_ids(&self) -> Vec<i64> {
        self.path
            .split('/')
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect()
    }

    /// Id of the direct parent, parsed from the second-to-last path
    /// segment. The root has none.
    pub fn parent_id(&self) -> Option<i64> {
        let ids = self.path_ids();
        if ids.len() < 2 {
            return None;
        }
        ids.get(ids.len() - 2).copied()
    }

    pub fn is_root(&self) -> bool {
        self.id == SYSTEM_CONTEXT_ID
    }
}

/// A named bundle of capability grants, assignable to subjects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    /// Unique machine name, e.g. "admin"
    pub shortname: String,
    pub description: String,
    /// Role template/category used for defaulting, not enforced
    pub archetype: String,
    pub sortorder: i64,
}

impl Role {
    pub fn is_protected(&self) -> bool {
        PROTECTED_SHORTNAMES.contains(&self.shortname.as_str())
    }
}

/// Fields for creating a role; the id is assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    pub shortname: String,
    pub description: String,
    pub archetype: String,
    pub sortorder: i64,
}

/// A named, atomic permission check point (e.g. `"core/site:config"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub id: i64,
    pub name: String,
    pub captype: String,
    /// Most specific level this capability is meaningful at
    pub context_level: ContextLevel,
    /// Component that registered the capability
    pub component: String,
    pub risk_bitmask: u32,
    pub description: String,
}

/// A capability definition supplied by a registering component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDef {
    pub name: String,
    pub captype: String,
    pub context_level: ContextLevel,
    pub risk_bitmask: u32,
    pub description: String,
}

/// A (role, capability, context) permission entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCapability {
    pub role_id: i64,
    pub capability_id: i64,
    pub context_id: i64,
    pub permission: Permission,
    pub timecreated: i64,
    pub timemodified: i64,
}

/// A binding of a subject to a role at a context, optionally time-bounded.
///
/// A window bound of 0 means unbounded on that side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub role_id: i64,
    pub subject_id: i64,
    pub context_id: i64,
    pub timestart: i64,
    pub timeend: i64,
    pub timecreated: i64,
    pub timemodified: i64,
}

impl RoleAssignment {
    /// Whether the validity window covers `now`.
    pub fn is_active(&self, now: i64) -> bool {
        (self.timestart == 0 || self.timestart <= now)
            && (self.timeend == 0 || self.timeend >= now)
    }

    pub fn status(&self, now: i64) -> AssignmentStatus {
        if self.timestart > 0 && self.timestart > now {
            AssignmentStatus::Future
        } else if self.timeend > 0 && self.timeend < now {
            AssignmentStatus::Expired
        } else {
            AssignmentStatus::Active
        }
    }
}

/// Lifecycle state of a role assignment relative to its validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Active,
    Future,
    Expired,
}

/// Capability summary row used by introspection queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityInfo {
    pub name: String,
    pub description: String,
    pub permission: Permission,
}

/// Current unix time in seconds.
pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
