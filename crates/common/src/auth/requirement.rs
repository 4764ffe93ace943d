use crate::auth::{EffectivePermissionSet, Permission};
use crate::domain::DomainError;
use std::sync::Arc;

/// Where a requirement is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Resolved without a campus: only global assignments and bindings count
    Global,
    /// Resolved for the campus named by the request
    Campus,
}

/// Permission an operation declares it needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionRequirement {
    pub permission: Permission,
    pub scope: ScopeKind,
}

impl PermissionRequirement {
    pub const fn global(permission: Permission) -> Self {
        Self {
            permission,
            scope: ScopeKind::Global,
        }
    }

    pub const fn campus(permission: Permission) -> Self {
        Self {
            permission,
            scope: ScopeKind::Campus,
        }
    }

    /// Campus scope when a campus is given, global otherwise
    pub fn for_campus(permission: Permission, campus_id: Option<&str>) -> Self {
        match campus_id {
            Some(_) => Self::campus(permission),
            None => Self::global(permission),
        }
    }
}

/// Reason a request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Unauthenticated,
    Forbidden,
}

impl From<Denial> for DomainError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::Unauthenticated => DomainError::Unauthenticated,
            Denial::Forbidden => DomainError::Forbidden,
        }
    }
}

/// Outcome of a permission check
#[derive(Debug, Clone)]
pub enum AccessDecision {
    Allowed(Arc<EffectivePermissionSet>),
    Denied(Denial),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allowed(_))
    }
}
