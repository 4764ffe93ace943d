use crate::auth::EffectivePermissionSet;
use crate::domain::{
    DomainResult, GetRolesRepoInput, ListBindingsRepoInput, ListUserAssignmentsRepoInput,
    PermissionRecord, PermissionRepository, Role, RoleAssignment, RoleAssignmentRepository,
    RolePermissionBinding, RolePermissionRepository, RoleRepository, ScopeFilter,
    MAX_ROLE_DEPTH,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Input for resolving a user's effective permissions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvePermissionsInput {
    pub user_id: String,
    pub campus_id: Option<String>,
}

/// Rows loaded for one resolution
pub struct ResolutionRows<'a> {
    pub assignments: &'a [RoleAssignment],
    /// Assigned roles and their loaded ancestors, keyed by id
    pub roles: &'a HashMap<String, Role>,
    pub bindings: &'a [RolePermissionBinding],
    /// Persisted catalog; only read when the super-role is held
    pub catalog: &'a [PermissionRecord],
    pub scope: &'a ScopeFilter,
}

/// Roles reached from a user's assignments
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RoleWalk {
    pub super_role: bool,
    /// Roles whose bindings count, in discovery order
    pub role_ids: Vec<String>,
    pub integrity_faults: Vec<String>,
}

/// Whether any applicable assignment is the non-archived super-role
pub fn holds_super_role(
    assignments: &[RoleAssignment],
    roles: &HashMap<String, Role>,
    scope: &ScopeFilter,
) -> bool {
    assignments
        .iter()
        .filter(|a| scope.matches(a.campus_id.as_deref()))
        .filter_map(|a| roles.get(&a.role_id))
        .any(|role| role.is_super_role && !role.is_archived())
}

/// Walk the parent chain of every applicable assignment
///
/// Archived roles contribute nothing and stop their chain. A dangling parent
/// ends the chain. A repeated id or a chain deeper than `MAX_ROLE_DEPTH` is an
/// integrity fault: it is logged and the remainder of that chain is ignored.
pub fn walk_assigned_roles(
    assignments: &[RoleAssignment],
    roles: &HashMap<String, Role>,
    scope: &ScopeFilter,
) -> RoleWalk {
    if holds_super_role(assignments, roles, scope) {
        return RoleWalk {
            super_role: true,
            ..RoleWalk::default()
        };
    }

    let mut walk = RoleWalk::default();
    let mut collected: HashSet<&str> = HashSet::new();

    for assignment in assignments
        .iter()
        .filter(|a| scope.matches(a.campus_id.as_deref()))
    {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut next = Some(assignment.role_id.as_str());

        while let Some(role_id) = next {
            if !visited.insert(role_id) {
                warn!(
                    user_id = %assignment.user_id,
                    role_id = %role_id,
                    "role hierarchy cycle detected, ignoring the rest of the chain"
                );
                walk.integrity_faults
                    .push(format!("cycle through role {}", role_id));
                break;
            }
            if visited.len() > MAX_ROLE_DEPTH {
                warn!(
                    user_id = %assignment.user_id,
                    role_id = %assignment.role_id,
                    max_depth = MAX_ROLE_DEPTH,
                    "role hierarchy too deep, ignoring the rest of the chain"
                );
                walk.integrity_faults.push(format!(
                    "chain of role {} exceeds {} levels",
                    assignment.role_id, MAX_ROLE_DEPTH
                ));
                break;
            }

            let Some(role) = roles.get(role_id) else {
                break;
            };
            if role.is_archived() {
                break;
            }
            if collected.insert(role.id.as_str()) {
                walk.role_ids.push(role.id.clone());
            }
            next = role.parent_role_id.as_deref();
        }
    }

    walk
}

/// Compute the effective permission set from loaded rows
pub fn resolve_effective_permissions(rows: &ResolutionRows<'_>) -> EffectivePermissionSet {
    let walk = walk_assigned_roles(rows.assignments, rows.roles, rows.scope);

    if walk.super_role {
        return EffectivePermissionSet::from_super_role(
            rows.catalog.iter().map(|p| p.name.clone()),
        );
    }

    let contributing: HashSet<&str> = walk.role_ids.iter().map(String::as_str).collect();
    EffectivePermissionSet::from_bindings(
        rows.bindings
            .iter()
            .filter(|b| contributing.contains(b.role_id.as_str()))
            .filter(|b| rows.scope.matches(b.campus_id.as_deref()))
            .map(|b| b.permission_name.clone()),
    )
}

/// Resolves `(user, campus?)` to an effective permission set
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PermissionResolver: Send + Sync {
    async fn resolve(&self, input: ResolvePermissionsInput)
        -> DomainResult<EffectivePermissionSet>;
}

/// Resolver that loads its rows through the repositories
pub struct RepositoryPermissionResolver {
    permission_repository: Arc<dyn PermissionRepository>,
    role_repository: Arc<dyn RoleRepository>,
    role_permission_repository: Arc<dyn RolePermissionRepository>,
    role_assignment_repository: Arc<dyn RoleAssignmentRepository>,
}

impl RepositoryPermissionResolver {
    pub fn new(
        permission_repository: Arc<dyn PermissionRepository>,
        role_repository: Arc<dyn RoleRepository>,
        role_permission_repository: Arc<dyn RolePermissionRepository>,
        role_assignment_repository: Arc<dyn RoleAssignmentRepository>,
    ) -> Self {
        Self {
            permission_repository,
            role_repository,
            role_permission_repository,
            role_assignment_repository,
        }
    }

    /// Load the assigned roles and their ancestors, one level per query
    async fn load_role_arena(
        &self,
        assignments: &[RoleAssignment],
    ) -> DomainResult<HashMap<String, Role>> {
        let mut roles: HashMap<String, Role> = HashMap::new();
        let mut frontier: HashSet<String> =
            assignments.iter().map(|a| a.role_id.clone()).collect();

        for _ in 0..=MAX_ROLE_DEPTH {
            frontier.retain(|id| !roles.contains_key(id));
            if frontier.is_empty() {
                break;
            }

            let fetched = self
                .role_repository
                .get_roles(GetRolesRepoInput {
                    role_ids: frontier.drain().collect(),
                })
                .await?;

            frontier = fetched
                .iter()
                .filter(|role| !role.is_archived() && !role.is_super_role)
                .filter_map(|role| role.parent_role_id.clone())
                .collect();

            for role in fetched {
                roles.insert(role.id.clone(), role);
            }
        }

        Ok(roles)
    }
}

#[async_trait]
impl PermissionResolver for RepositoryPermissionResolver {
    #[instrument(skip(self, input), fields(user_id = %input.user_id, campus_id = ?input.campus_id))]
    async fn resolve(
        &self,
        input: ResolvePermissionsInput,
    ) -> DomainResult<EffectivePermissionSet> {
        let scope = ScopeFilter::for_campus(input.campus_id.clone());

        let assignments = self
            .role_assignment_repository
            .list_user_assignments(ListUserAssignmentsRepoInput {
                user_id: input.user_id.clone(),
                scope: scope.clone(),
            })
            .await?;

        if assignments.is_empty() {
            debug!("user has no applicable role assignments");
            return Ok(EffectivePermissionSet::empty());
        }

        let roles = self.load_role_arena(&assignments).await?;

        let (bindings, catalog) = if holds_super_role(&assignments, &roles, &scope) {
            (Vec::new(), self.permission_repository.list_permissions().await?)
        } else {
            let bindings = self
                .role_permission_repository
                .list_bindings(ListBindingsRepoInput {
                    role_ids: roles.keys().cloned().collect(),
                    scope: scope.clone(),
                })
                .await?;
            (bindings, Vec::new())
        };

        let permissions = resolve_effective_permissions(&ResolutionRows {
            assignments: &assignments,
            roles: &roles,
            bindings: &bindings,
            catalog: &catalog,
            scope: &scope,
        });

        debug!(
            count = permissions.len(),
            super_role = permissions.granted_by_super_role(),
            "resolved effective permissions"
        );
        Ok(permissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Permission;
    use crate::domain::{
        AssignRoleRepoInputWithId, BindPermissionRepoInputWithId, CreateRoleRepoInputWithId,
        RevokeRoleRepoInput, UpsertPermissionRepoInput,
    };
    use crate::memory::InMemoryAuthorizationStore;
    use chrono::Utc;

    const USER: &str = "user-1";
    const CAMPUS_1: &str = "campus-1";
    const CAMPUS_2: &str = "campus-2";

    fn role(id: &str, parent: Option<&str>) -> Role {
        Role {
            id: id.to_string(),
            name: id.to_string(),
            description: None,
            parent_role_id: parent.map(str::to_string),
            campus_id: None,
            is_super_role: false,
            archived_at: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn assignment(role_id: &str, campus_id: Option<&str>) -> RoleAssignment {
        RoleAssignment {
            id: format!("{}-{}", role_id, campus_id.unwrap_or("global")),
            user_id: USER.to_string(),
            role_id: role_id.to_string(),
            campus_id: campus_id.map(str::to_string),
            created_at: None,
        }
    }

    fn binding(role_id: &str, name: &str, campus_id: Option<&str>) -> RolePermissionBinding {
        RolePermissionBinding {
            id: format!("{}-{}", role_id, name),
            role_id: role_id.to_string(),
            permission_id: name.to_string(),
            permission_name: name.to_string(),
            campus_id: campus_id.map(str::to_string),
            created_at: None,
        }
    }

    fn arena(roles: Vec<Role>) -> HashMap<String, Role> {
        roles.into_iter().map(|r| (r.id.clone(), r)).collect()
    }

    fn resolve_rows(
        assignments: &[RoleAssignment],
        roles: &HashMap<String, Role>,
        bindings: &[RolePermissionBinding],
        scope: ScopeFilter,
    ) -> EffectivePermissionSet {
        resolve_effective_permissions(&ResolutionRows {
            assignments,
            roles,
            bindings,
            catalog: &[],
            scope: &scope,
        })
    }

    #[test]
    fn test_no_assignments_resolves_empty() {
        let set = resolve_rows(&[], &HashMap::new(), &[], ScopeFilter::Global);
        assert!(set.is_empty());
        assert!(!set.granted_by_super_role());
    }

    #[test]
    fn test_inherits_parent_bindings() {
        let roles = arena(vec![role("teacher", Some("base-staff")), role("base-staff", None)]);
        let bindings = [binding("base-staff", "class:view", None)];
        let set = resolve_rows(
            &[assignment("teacher", None)],
            &roles,
            &bindings,
            ScopeFilter::Global,
        );
        assert_eq!(set.sorted_names(), vec!["class:view"]);
    }

    #[test]
    fn test_cycle_contributes_reachable_roles_only() {
        let roles = arena(vec![role("a", Some("b")), role("b", Some("a"))]);
        let bindings = [binding("a", "class:view", None), binding("b", "user:read", None)];
        let walk = walk_assigned_roles(&[assignment("a", None)], &roles, &ScopeFilter::Global);
        assert_eq!(walk.integrity_faults.len(), 1);

        let set = resolve_rows(&[assignment("a", None)], &roles, &bindings, ScopeFilter::Global);
        assert_eq!(set.sorted_names(), vec!["class:view", "user:read"]);
    }

    #[test]
    fn test_archived_role_stops_chain() {
        let mut archived = role("staff", Some("base"));
        archived.archived_at = Some(Utc::now());
        let roles = arena(vec![role("teacher", Some("staff")), archived, role("base", None)]);
        let bindings = [
            binding("teacher", "grade:modify", None),
            binding("staff", "class:view", None),
            binding("base", "user:read", None),
        ];
        let set = resolve_rows(
            &[assignment("teacher", None)],
            &roles,
            &bindings,
            ScopeFilter::Global,
        );
        assert_eq!(set.sorted_names(), vec!["grade:modify"]);
    }

    #[test]
    fn test_dangling_parent_ends_chain() {
        let roles = arena(vec![role("teacher", Some("deleted"))]);
        let bindings = [binding("teacher", "class:view", None)];
        let set = resolve_rows(
            &[assignment("teacher", None)],
            &roles,
            &bindings,
            ScopeFilter::Global,
        );
        assert_eq!(set.sorted_names(), vec!["class:view"]);
    }

    #[test]
    fn test_campus_assignment_ignored_for_other_campus() {
        let roles = arena(vec![role("teacher", None)]);
        let bindings = [binding("teacher", "class:view", None)];
        let assignments = [assignment("teacher", Some(CAMPUS_1))];

        let campus_1 = resolve_rows(
            &assignments,
            &roles,
            &bindings,
            ScopeFilter::Campus(CAMPUS_1.to_string()),
        );
        let campus_2 = resolve_rows(
            &assignments,
            &roles,
            &bindings,
            ScopeFilter::Campus(CAMPUS_2.to_string()),
        );
        let global = resolve_rows(&assignments, &roles, &bindings, ScopeFilter::Global);

        assert!(campus_1.contains(Permission::ClassView));
        assert!(campus_2.is_empty());
        assert!(global.is_empty());
    }

    #[test]
    fn test_super_role_in_walk_short_circuits() {
        let mut root = role("super-admin", None);
        root.is_super_role = true;
        let roles = arena(vec![root, role("teacher", None)]);
        let walk = walk_assigned_roles(
            &[assignment("teacher", None), assignment("super-admin", None)],
            &roles,
            &ScopeFilter::Global,
        );
        assert!(walk.super_role);
        assert!(walk.role_ids.is_empty());
    }

    // Repository-backed resolution against the in-memory store

    async fn seeded_store() -> (InMemoryAuthorizationStore, RepositoryPermissionResolver) {
        let store = InMemoryAuthorizationStore::new();
        store.add_user(USER, "Ada").await;
        store.add_campus(CAMPUS_1, "North").await;
        store.add_campus(CAMPUS_2, "South").await;
        store
            .upsert_permissions(
                [Permission::CampusManage, Permission::ClassView]
                    .iter()
                    .map(|p| UpsertPermissionRepoInput {
                        id: p.as_str().to_string(),
                        name: p.as_str().to_string(),
                        description: p.description().to_string(),
                    })
                    .collect(),
            )
            .await
            .unwrap();

        let shared = Arc::new(store.clone());
        let resolver = RepositoryPermissionResolver::new(
            shared.clone(),
            shared.clone(),
            shared.clone(),
            shared,
        );
        (store, resolver)
    }

    async fn create_role(store: &InMemoryAuthorizationStore, id: &str, parent: Option<&str>) {
        store
            .create_role(CreateRoleRepoInputWithId {
                id: id.to_string(),
                name: id.to_string(),
                description: None,
                parent_role_id: parent.map(str::to_string),
                campus_id: None,
                is_super_role: false,
                permission_ids: Vec::new(),
            })
            .await
            .unwrap();
    }

    async fn bind(
        store: &InMemoryAuthorizationStore,
        role_id: &str,
        permission: Permission,
        campus: Option<&str>,
    ) {
        store
            .bind_permission(BindPermissionRepoInputWithId {
                id: xid::new().to_string(),
                role_id: role_id.to_string(),
                permission_id: permission.as_str().to_string(),
                campus_id: campus.map(str::to_string),
            })
            .await
            .unwrap();
    }

    async fn assign(store: &InMemoryAuthorizationStore, role_id: &str, campus: Option<&str>) {
        store
            .assign_role(AssignRoleRepoInputWithId {
                id: xid::new().to_string(),
                user_id: USER.to_string(),
                role_id: role_id.to_string(),
                campus_id: campus.map(str::to_string),
            })
            .await
            .unwrap();
    }

    async fn resolve(resolver: &RepositoryPermissionResolver, campus: Option<&str>) -> Vec<String> {
        resolver
            .resolve(ResolvePermissionsInput {
                user_id: USER.to_string(),
                campus_id: campus.map(str::to_string),
            })
            .await
            .unwrap()
            .sorted_names()
    }

    #[tokio::test]
    async fn test_campus_admin_scenario() {
        let (store, resolver) = seeded_store().await;
        create_role(&store, "campus-admin", None).await;
        bind(&store, "campus-admin", Permission::CampusManage, None).await;
        bind(&store, "campus-admin", Permission::ClassView, Some(CAMPUS_1)).await;
        assign(&store, "campus-admin", None).await;

        assert_eq!(resolve(&resolver, Some(CAMPUS_1)).await, vec!["campus:manage", "class:view"]);
        assert_eq!(resolve(&resolver, Some(CAMPUS_2)).await, vec!["campus:manage"]);
        assert_eq!(resolve(&resolver, None).await, vec!["campus:manage"]);
    }

    #[tokio::test]
    async fn test_inheritance_through_store() {
        let (store, resolver) = seeded_store().await;
        create_role(&store, "base-staff", None).await;
        create_role(&store, "teacher", Some("base-staff")).await;
        bind(&store, "base-staff", Permission::ClassView, None).await;
        assign(&store, "teacher", None).await;

        assert_eq!(resolve(&resolver, None).await, vec!["class:view"]);
        assert_eq!(resolve(&resolver, Some(CAMPUS_2)).await, vec!["class:view"]);
    }

    #[tokio::test]
    async fn test_super_role_gets_whole_catalog_everywhere() {
        let (store, resolver) = seeded_store().await;
        store
            .create_role(CreateRoleRepoInputWithId {
                id: "root".to_string(),
                name: "super-admin".to_string(),
                description: None,
                parent_role_id: None,
                campus_id: None,
                is_super_role: true,
                permission_ids: Vec::new(),
            })
            .await
            .unwrap();
        assign(&store, "root", None).await;

        for campus in [None, Some(CAMPUS_1), Some("campus-without-bindings")] {
            let set = resolver
                .resolve(ResolvePermissionsInput {
                    user_id: USER.to_string(),
                    campus_id: campus.map(str::to_string),
                })
                .await
                .unwrap();
            assert!(set.granted_by_super_role());
            assert_eq!(set.sorted_names(), vec!["campus:manage", "class:view"]);
        }
    }

    #[tokio::test]
    async fn test_revocation_takes_effect_on_next_resolution() {
        let (store, resolver) = seeded_store().await;
        create_role(&store, "teacher", None).await;
        bind(&store, "teacher", Permission::ClassView, None).await;
        assign(&store, "teacher", None).await;
        assert_eq!(resolve(&resolver, None).await, vec!["class:view"]);

        store
            .revoke_role(RevokeRoleRepoInput {
                user_id: USER.to_string(),
                role_id: "teacher".to_string(),
                campus_id: None,
            })
            .await
            .unwrap();
        assert!(resolve(&resolver, None).await.is_empty());
    }

    #[tokio::test]
    async fn test_user_without_assignments_skips_role_loading() {
        let mut assignments = crate::domain::MockRoleAssignmentRepository::new();
        assignments
            .expect_list_user_assignments()
            .times(1)
            .returning(|_| Ok(Vec::new()));
        let mut roles = crate::domain::MockRoleRepository::new();
        roles.expect_get_roles().never();

        let resolver = RepositoryPermissionResolver::new(
            Arc::new(crate::domain::MockPermissionRepository::new()),
            Arc::new(roles),
            Arc::new(crate::domain::MockRolePermissionRepository::new()),
            Arc::new(assignments),
        );

        let set = resolver
            .resolve(ResolvePermissionsInput {
                user_id: USER.to_string(),
                campus_id: Some(CAMPUS_1.to_string()),
            })
            .await
            .unwrap();
        assert!(set.is_empty());
    }
}
