use crate::auth::Permission;
use std::collections::HashSet;

/// Permissions a user holds for one `(user, campus?)` pair
///
/// Derived on demand and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectivePermissionSet {
    permissions: HashSet<String>,
    granted_by_super_role: bool,
}

impl EffectivePermissionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set built from ordinary bindings
    pub fn from_bindings<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            permissions: names.into_iter().map(Into::into).collect(),
            granted_by_super_role: false,
        }
    }

    /// Set granted by holding the super-role: the whole persisted catalog
    pub fn from_super_role<I, S>(catalog: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            permissions: catalog.into_iter().map(Into::into).collect(),
            granted_by_super_role: true,
        }
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.permissions.contains(permission.as_str())
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.permissions.contains(name)
    }

    pub fn granted_by_super_role(&self) -> bool {
        self.granted_by_super_role
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.permissions.iter().map(String::as_str)
    }

    /// Permission names in lexical order
    pub fn sorted_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.permissions.iter().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bindings_deduplicates() {
        let set = EffectivePermissionSet::from_bindings(["class:view", "class:view", "user:read"]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(Permission::ClassView));
        assert!(!set.granted_by_super_role());
    }

    #[test]
    fn test_super_role_flag() {
        let set =
            EffectivePermissionSet::from_super_role(Permission::ALL.iter().map(|p| p.as_str()));
        assert!(set.granted_by_super_role());
        assert!(set.contains(Permission::CoordinatorTransfer));
    }

    #[test]
    fn test_sorted_names() {
        let set = EffectivePermissionSet::from_bindings(["user:read", "class:view"]);
        assert_eq!(set.sorted_names(), vec!["class:view", "user:read"]);
    }
}
