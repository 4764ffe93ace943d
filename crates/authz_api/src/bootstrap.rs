//! Trusted seed path: permission catalog, super-role, default roles and the
//! first administrator.
//!
//! Runs outside the request path with no `RequestContext`, which is why it
//! talks to the repositories directly.

use common::auth::{DefaultRole, Permission};
use common::domain::{
    AssignRoleRepoInputWithId, CountRoleAssignmentsRepoInput, CreateRoleRepoInputWithId,
    DomainError, DomainResult, GetRoleByNameRepoInput, GetUserRepoInput, PermissionRecord,
    PermissionRepository, Role, RoleAssignmentRepository, RoleRepository,
    UpsertPermissionRepoInput, UserRepository,
};
use garde::Validate;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Input for a bootstrap run
#[derive(Debug, Clone, Validate)]
pub struct BootstrapInput {
    /// User who receives the super-role on the first run
    #[garde(length(min = 1))]
    pub administrator_user_id: String,
}

/// What a bootstrap run changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Size of the persisted catalog after the run
    pub catalog_size: usize,
    pub super_role_id: String,
    pub super_role_created: bool,
    /// Names of the default roles created by this run
    pub roles_created: Vec<String>,
    pub bindings_created: usize,
    /// True when this run made the administrator the first super-role holder
    pub administrator_assigned: bool,
}

/// Idempotent seeder for a fresh or existing deployment
pub struct Bootstrapper {
    permission_repository: Arc<dyn PermissionRepository>,
    role_repository: Arc<dyn RoleRepository>,
    role_assignment_repository: Arc<dyn RoleAssignmentRepository>,
    user_repository: Arc<dyn UserRepository>,
}

impl Bootstrapper {
    pub fn new(
        permission_repository: Arc<dyn PermissionRepository>,
        role_repository: Arc<dyn RoleRepository>,
        role_assignment_repository: Arc<dyn RoleAssignmentRepository>,
        user_repository: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            permission_repository,
            role_repository,
            role_assignment_repository,
            user_repository,
        }
    }

    #[instrument(skip(self, input), fields(administrator_user_id = %input.administrator_user_id))]
    pub async fn run(&self, input: BootstrapInput) -> DomainResult<BootstrapReport> {
        common::garde::validate_struct(&input)?;

        let administrator = self
            .user_repository
            .get_user(GetUserRepoInput {
                user_id: input.administrator_user_id.clone(),
            })
            .await?;
        if administrator.is_none() {
            return Err(DomainError::UnknownUser(input.administrator_user_id));
        }

        let mut report = BootstrapReport::default();

        let catalog = self.seed_catalog().await?;
        report.catalog_size = catalog.len();

        let (super_role, created) = self.ensure_super_role().await?;
        report.super_role_id = super_role.id.clone();
        report.super_role_created = created;

        for default_role in DefaultRole::ORDINARY {
            if let Some(bindings) = self.ensure_default_role(default_role, &catalog).await? {
                report.roles_created.push(default_role.as_str().to_string());
                report.bindings_created += bindings;
            }
        }

        report.administrator_assigned = self
            .assign_first_administrator(&super_role, &input.administrator_user_id)
            .await?;

        info!(
            catalog_size = report.catalog_size,
            roles_created = report.roles_created.len(),
            bindings_created = report.bindings_created,
            administrator_assigned = report.administrator_assigned,
            "bootstrap complete"
        );
        Ok(report)
    }

    /// Upsert every catalog permission and index the stored rows by name
    async fn seed_catalog(&self) -> DomainResult<HashMap<String, PermissionRecord>> {
        let entries = Permission::ALL
            .iter()
            .map(|permission| UpsertPermissionRepoInput {
                id: xid::new().to_string(),
                name: permission.as_str().to_string(),
                description: permission.description().to_string(),
            })
            .collect();

        let records = self.permission_repository.upsert_permissions(entries).await?;
        debug!(count = records.len(), "permission catalog seeded");

        Ok(records
            .into_iter()
            .map(|record| (record.name.clone(), record))
            .collect())
    }

    async fn ensure_super_role(&self) -> DomainResult<(Role, bool)> {
        if let Some(existing) = self.role_repository.get_super_role().await? {
            return Ok((existing, false));
        }

        let role = self
            .role_repository
            .create_role(CreateRoleRepoInputWithId {
                id: xid::new().to_string(),
                name: DefaultRole::SuperAdmin.as_str().to_string(),
                description: Some(DefaultRole::SuperAdmin.description().to_string()),
                parent_role_id: None,
                campus_id: None,
                is_super_role: true,
                permission_ids: Vec::new(),
            })
            .await?;

        debug!(role_id = %role.id, "super-role created");
        Ok((role, true))
    }

    /// Create a default role with its global bindings, unless it exists
    ///
    /// The role and its bindings are written in one store call, so a failed
    /// run never leaves a bare default role behind. Existing roles are left
    /// alone so bindings removed by administrators are not restored. Returns
    /// the number of bindings created.
    async fn ensure_default_role(
        &self,
        default_role: DefaultRole,
        catalog: &HashMap<String, PermissionRecord>,
    ) -> DomainResult<Option<usize>> {
        let existing = self
            .role_repository
            .get_role_by_name(GetRoleByNameRepoInput {
                name: default_role.as_str().to_string(),
                campus_id: None,
            })
            .await?;
        if existing.is_some() {
            debug!(role = default_role.as_str(), "default role already present");
            return Ok(None);
        }

        let permission_ids = default_role
            .default_permissions()
            .iter()
            .map(|permission| {
                catalog
                    .get(permission.as_str())
                    .map(|record| record.id.clone())
                    .ok_or_else(|| DomainError::UnknownPermission(permission.to_string()))
            })
            .collect::<DomainResult<Vec<_>>>()?;
        let bindings = permission_ids.len();

        let role = self
            .role_repository
            .create_role(CreateRoleRepoInputWithId {
                id: xid::new().to_string(),
                name: default_role.as_str().to_string(),
                description: Some(default_role.description().to_string()),
                parent_role_id: None,
                campus_id: None,
                is_super_role: false,
                permission_ids,
            })
            .await?;

        debug!(role_id = %role.id, role = default_role.as_str(), bindings, "default role created");
        Ok(Some(bindings))
    }

    /// Assign the super-role only while nobody holds it
    async fn assign_first_administrator(
        &self,
        super_role: &Role,
        administrator_user_id: &str,
    ) -> DomainResult<bool> {
        let holders = self
            .role_assignment_repository
            .count_role_assignments(CountRoleAssignmentsRepoInput {
                role_id: super_role.id.clone(),
            })
            .await?;
        if holders > 0 {
            debug!(holders, "super-role already assigned");
            return Ok(false);
        }

        self.role_assignment_repository
            .assign_role(AssignRoleRepoInputWithId {
                id: xid::new().to_string(),
                user_id: administrator_user_id.to_string(),
                role_id: super_role.id.clone(),
                campus_id: None,
            })
            .await?;

        info!(user_id = %administrator_user_id, "super-role assigned to administrator");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::store_enforcer;
    use common::auth::{AuthorizationProvider, RequestContext, SUPER_ROLE_NAME};
    use async_trait::async_trait;
    use common::domain::{
        ArchiveRoleRepoInput, GetRoleRepoInput, GetRolesRepoInput, ListBindingsRepoInput,
        ListRolesRepoInput, MockUserRepository, RolePermissionRepository, RoleRemoval,
        ScopeFilter, SetRoleParentRepoInput,
    };
    use common::memory::InMemoryAuthorizationStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    const ADMIN_ID: &str = "admin-1";

    fn bootstrapper(store: &InMemoryAuthorizationStore) -> Bootstrapper {
        let repos = Arc::new(store.clone());
        Bootstrapper::new(repos.clone(), repos.clone(), repos.clone(), repos)
    }

    fn input(user_id: &str) -> BootstrapInput {
        BootstrapInput {
            administrator_user_id: user_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_run_seeds_everything() {
        let store = InMemoryAuthorizationStore::new();
        store.add_user(ADMIN_ID, "Administrator").await;

        let report = bootstrapper(&store).run(input(ADMIN_ID)).await.unwrap();

        assert_eq!(report.catalog_size, Permission::ALL.len());
        assert!(report.super_role_created);
        assert_eq!(report.roles_created.len(), DefaultRole::ORDINARY.len());
        let expected_bindings: usize = DefaultRole::ORDINARY
            .iter()
            .map(|role| role.default_permissions().len())
            .sum();
        assert_eq!(report.bindings_created, expected_bindings);
        assert!(report.administrator_assigned);

        let set = store_enforcer(&store)
            .resolve_permissions(&RequestContext::authenticated(ADMIN_ID), ADMIN_ID, None)
            .await
            .unwrap();
        assert!(set.granted_by_super_role());
        assert_eq!(set.len(), Permission::ALL.len());
    }

    #[tokio::test]
    async fn test_second_run_changes_nothing() {
        let store = InMemoryAuthorizationStore::new();
        store.add_user(ADMIN_ID, "Administrator").await;
        store.add_user("admin-2", "Second Administrator").await;

        let first = bootstrapper(&store).run(input(ADMIN_ID)).await.unwrap();
        let second = bootstrapper(&store).run(input("admin-2")).await.unwrap();

        assert_eq!(second.super_role_id, first.super_role_id);
        assert!(!second.super_role_created);
        assert!(second.roles_created.is_empty());
        assert_eq!(second.bindings_created, 0);
        assert!(!second.administrator_assigned);

        let roles = store
            .list_roles(ListRolesRepoInput {
                campus_id: None,
                include_archived: true,
            })
            .await
            .unwrap();
        assert_eq!(roles.len(), DefaultRole::ORDINARY.len() + 1);
        assert_eq!(
            roles.iter().filter(|r| r.name == SUPER_ROLE_NAME).count(),
            1
        );

        // Only the first administrator became a super-role holder
        let set = store_enforcer(&store)
            .resolve_permissions(&RequestContext::authenticated("admin-2"), "admin-2", None)
            .await
            .unwrap();
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_teacher_defaults_resolve() {
        let store = InMemoryAuthorizationStore::new();
        store.add_user(ADMIN_ID, "Administrator").await;
        store.add_user("teacher-1", "Teacher").await;
        bootstrapper(&store).run(input(ADMIN_ID)).await.unwrap();

        let teacher = store
            .get_role_by_name(GetRoleByNameRepoInput {
                name: "teacher".to_string(),
                campus_id: None,
            })
            .await
            .unwrap()
            .unwrap();
        crate::test_support::assign(&store, "teacher-1", &teacher.id, None).await;

        let set = store_enforcer(&store)
            .resolve_permissions(&RequestContext::authenticated("teacher-1"), "teacher-1", None)
            .await
            .unwrap();
        assert!(!set.granted_by_super_role());
        assert!(set.contains(Permission::GradeModify));
        assert!(!set.contains(Permission::RoleCreate));
    }

    /// Role store whose first write of one role asks for a permission that
    /// has vanished from the catalog, so the store rejects that write
    struct VanishingPermissionRoles {
        store: InMemoryAuthorizationStore,
        role_name: &'static str,
        failed: AtomicBool,
    }

    #[async_trait]
    impl RoleRepository for VanishingPermissionRoles {
        async fn create_role(&self, mut input: CreateRoleRepoInputWithId) -> DomainResult<Role> {
            if input.name == self.role_name && !self.failed.swap(true, Ordering::SeqCst) {
                let last = input.permission_ids.len().saturating_sub(1);
                input.permission_ids.insert(last, "perm-vanished".to_string());
            }
            self.store.create_role(input).await
        }

        async fn get_role(&self, input: GetRoleRepoInput) -> DomainResult<Option<Role>> {
            self.store.get_role(input).await
        }

        async fn get_roles(&self, input: GetRolesRepoInput) -> DomainResult<Vec<Role>> {
            self.store.get_roles(input).await
        }

        async fn get_role_by_name(
            &self,
            input: GetRoleByNameRepoInput,
        ) -> DomainResult<Option<Role>> {
            self.store.get_role_by_name(input).await
        }

        async fn get_super_role(&self) -> DomainResult<Option<Role>> {
            self.store.get_super_role().await
        }

        async fn list_roles(&self, input: ListRolesRepoInput) -> DomainResult<Vec<Role>> {
            self.store.list_roles(input).await
        }

        async fn set_role_parent(&self, input: SetRoleParentRepoInput) -> DomainResult<Role> {
            self.store.set_role_parent(input).await
        }

        async fn archive_role(&self, input: ArchiveRoleRepoInput) -> DomainResult<RoleRemoval> {
            self.store.archive_role(input).await
        }
    }

    #[tokio::test]
    async fn test_failed_run_leaves_no_unbound_default_role() {
        let store = InMemoryAuthorizationStore::new();
        store.add_user(ADMIN_ID, "Administrator").await;
        let repos = Arc::new(store.clone());
        let roles = Arc::new(VanishingPermissionRoles {
            store: store.clone(),
            role_name: "admin",
            failed: AtomicBool::new(false),
        });
        let seeder = Bootstrapper::new(repos.clone(), roles, repos.clone(), repos);

        let first = seeder.run(input(ADMIN_ID)).await;
        assert!(matches!(first, Err(DomainError::UnknownPermission(id)) if id == "perm-vanished"));
        let admin = store
            .get_role_by_name(GetRoleByNameRepoInput {
                name: "admin".to_string(),
                campus_id: None,
            })
            .await
            .unwrap();
        assert!(admin.is_none());

        let second = seeder.run(input(ADMIN_ID)).await.unwrap();
        assert!(second.roles_created.contains(&"admin".to_string()));

        let admin = store
            .get_role_by_name(GetRoleByNameRepoInput {
                name: "admin".to_string(),
                campus_id: None,
            })
            .await
            .unwrap()
            .unwrap();
        let bindings = store
            .list_bindings(ListBindingsRepoInput {
                role_ids: vec![admin.id],
                scope: ScopeFilter::Global,
            })
            .await
            .unwrap();
        assert_eq!(bindings.len(), DefaultRole::Admin.default_permissions().len());
    }

    #[tokio::test]
    async fn test_unknown_administrator() {
        let mut users = MockUserRepository::new();
        users.expect_get_user().times(1).return_once(|_| Ok(None));
        let store = Arc::new(InMemoryAuthorizationStore::new());

        let result = Bootstrapper::new(store.clone(), store.clone(), store, Arc::new(users))
            .run(input("nobody"))
            .await;
        assert!(matches!(result, Err(DomainError::UnknownUser(_))));
    }
}
