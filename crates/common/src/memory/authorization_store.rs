use crate::domain::{
    collect_ancestor_chain, measure_subtree_depth, validate_parent_link, ArchiveRoleRepoInput,
    AssignRoleRepoInputWithId, BindPermissionRepoInputWithId, Campus, CampusRepository,
    CountRoleAssignmentsRepoInput, CreateRoleRepoInputWithId, DomainError, DomainResult,
    GetCampusRepoInput, GetPermissionByNameRepoInput, GetResponsibilityRepoInput,
    GetRoleByNameRepoInput, GetRoleRepoInput, GetRolesRepoInput, GetUserRepoInput,
    LinkCandidate, ListBindingsRepoInput, ListRolesRepoInput, ListUserAssignmentsRepoInput,
    PermissionRecord, PermissionRepository, Responsibility, ResponsibilityKind,
    ResponsibilityRepository, ResponsibilityTransfer, RevokeRoleRepoInput, Role,
    RoleAssignment, RoleAssignmentRepository, RoleLink, RolePermissionBinding,
    RolePermissionRepository, RoleRemoval, RoleRepository, SetRoleParentRepoInput,
    TransferResponsibilityRepoInputWithId, UnbindPermissionRepoInput, UpsertPermissionRepoInput,
    User, UserRepository, DEFAULT_RESPONSIBILITY_CAPACITY,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct StoreState {
    users: HashMap<String, User>,
    campuses: HashMap<String, Campus>,
    permissions: BTreeMap<String, PermissionRecord>,
    roles: HashMap<String, Role>,
    bindings: Vec<RolePermissionBinding>,
    assignments: Vec<RoleAssignment>,
    responsibilities: HashMap<(String, ResponsibilityKind), Responsibility>,
    capacities: HashMap<(String, ResponsibilityKind), i64>,
    transfers: Vec<ResponsibilityTransfer>,
}

impl StoreState {
    fn ancestor_chain(&self, start_role_id: &str) -> Vec<RoleLink> {
        collect_ancestor_chain(start_role_id, |id| self.roles.get(id).map(RoleLink::from))
    }

    fn subtree_depth(&self, role_id: &str) -> usize {
        measure_subtree_depth(role_id, |id| {
            self.roles
                .values()
                .filter(|role| role.parent_role_id.as_deref() == Some(id))
                .map(|role| role.id.clone())
                .collect()
        })
    }

    fn require_campus(&self, campus_id: Option<&str>) -> DomainResult<()> {
        match campus_id {
            Some(campus_id) if !self.campuses.contains_key(campus_id) => {
                Err(DomainError::CampusNotFound(campus_id.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn live_role(&self, role_id: &str) -> DomainResult<&Role> {
        self.roles
            .get(role_id)
            .filter(|role| !role.is_archived())
            .ok_or_else(|| DomainError::UnknownRole(role_id.to_string()))
    }
}

/// In-memory implementation of every authorization repository
///
/// One lock guards the whole state, so each mutation is atomic. Used for
/// tests and for embedding the engine without PostgreSQL.
#[derive(Clone)]
pub struct InMemoryAuthorizationStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryAuthorizationStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
        }
    }

    /// Register a user in the directory
    pub async fn add_user(&self, user_id: &str, name: &str) {
        let now = Utc::now();
        let mut state = self.state.write().await;
        state.users.insert(
            user_id.to_string(),
            User {
                id: user_id.to_string(),
                email: format!("{}@campus.test", user_id),
                name: name.to_string(),
                created_at: Some(now),
                updated_at: Some(now),
            },
        );
    }

    /// Remove a user together with their assignments
    pub async fn remove_user(&self, user_id: &str) {
        let mut state = self.state.write().await;
        state.users.remove(user_id);
        state.assignments.retain(|a| a.user_id != user_id);
    }

    /// Register a campus
    pub async fn add_campus(&self, campus_id: &str, name: &str) {
        let now = Utc::now();
        let mut state = self.state.write().await;
        state.campuses.insert(
            campus_id.to_string(),
            Campus {
                id: campus_id.to_string(),
                name: name.to_string(),
                created_at: Some(now),
                updated_at: Some(now),
            },
        );
    }

    /// Give a resource its initial holder
    pub async fn add_responsibility(
        &self,
        resource_id: &str,
        kind: ResponsibilityKind,
        holder_id: &str,
    ) {
        let now = Utc::now();
        let mut state = self.state.write().await;
        state.responsibilities.insert(
            (resource_id.to_string(), kind),
            Responsibility {
                resource_id: resource_id.to_string(),
                kind,
                holder_id: holder_id.to_string(),
                created_at: Some(now),
                updated_at: Some(now),
            },
        );
    }

    /// Override the default capacity of a user for one kind
    pub async fn set_responsibility_capacity(
        &self,
        user_id: &str,
        kind: ResponsibilityKind,
        max_load: i64,
    ) {
        let mut state = self.state.write().await;
        state
            .capacities
            .insert((user_id.to_string(), kind), max_load);
    }

    /// Recorded transfers, oldest first
    pub async fn transfers(&self) -> Vec<ResponsibilityTransfer> {
        let state = self.state.read().await;
        state.transfers.clone()
    }

    /// Store a role as given, skipping every check
    ///
    /// Lets tests reproduce rows written by older versions or by hand.
    pub async fn insert_role_unchecked(&self, role: Role) {
        let mut state = self.state.write().await;
        state.roles.insert(role.id.clone(), role);
    }
}

impl Default for InMemoryAuthorizationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserRepository for InMemoryAuthorizationStore {
    async fn get_user(&self, input: GetUserRepoInput) -> DomainResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.get(&input.user_id).cloned())
    }
}

#[async_trait]
impl CampusRepository for InMemoryAuthorizationStore {
    async fn get_campus(&self, input: GetCampusRepoInput) -> DomainResult<Option<Campus>> {
        let state = self.state.read().await;
        Ok(state.campuses.get(&input.campus_id).cloned())
    }
}

#[async_trait]
impl PermissionRepository for InMemoryAuthorizationStore {
    async fn list_permissions(&self) -> DomainResult<Vec<PermissionRecord>> {
        let state = self.state.read().await;
        Ok(state.permissions.values().cloned().collect())
    }

    async fn get_permission_by_name(
        &self,
        input: GetPermissionByNameRepoInput,
    ) -> DomainResult<Option<PermissionRecord>> {
        let state = self.state.read().await;
        Ok(state.permissions.get(&input.name).cloned())
    }

    async fn upsert_permissions(
        &self,
        input: Vec<UpsertPermissionRepoInput>,
    ) -> DomainResult<Vec<PermissionRecord>> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let mut stored = Vec::with_capacity(input.len());

        for entry in input {
            let record = state
                .permissions
                .entry(entry.name.clone())
                .or_insert_with(|| PermissionRecord {
                    id: entry.id,
                    name: entry.name,
                    description: entry.description,
                    created_at: Some(now),
                });
            stored.push(record.clone());
        }

        Ok(stored)
    }
}


#[async_trait]
impl RoleRepository for InMemoryAuthorizationStore {
    async fn create_role(&self, input: CreateRoleRepoInputWithId) -> DomainResult<Role> {
        let now = Utc::now();
        let mut state = self.state.write().await;

        if let Some(parent_role_id) = input.parent_role_id.as_deref() {
            let chain = state.ancestor_chain(parent_role_id);
            let candidate = LinkCandidate {
                role_id: &input.id,
                name: &input.name,
                campus_id: input.campus_id.as_deref(),
                subtree_depth: 1,
            };
            validate_parent_link(&candidate, parent_role_id, &chain)?;
        }

        state.require_campus(input.campus_id.as_deref())?;

        let duplicate = state.roles.values().any(|role| {
            (role.name == input.name && role.campus_id == input.campus_id)
                || (input.is_super_role && role.is_super_role)
        });
        if duplicate {
            return Err(DomainError::DuplicateName(input.name));
        }

        let mut initial_bindings = Vec::with_capacity(input.permission_ids.len());
        for permission_id in &input.permission_ids {
            let permission = state
                .permissions
                .values()
                .find(|p| &p.id == permission_id)
                .ok_or_else(|| DomainError::UnknownPermission(permission_id.clone()))?;
            if initial_bindings
                .iter()
                .any(|b: &RolePermissionBinding| &b.permission_id == permission_id)
            {
                continue;
            }
            initial_bindings.push(RolePermissionBinding {
                id: xid::new().to_string(),
                role_id: input.id.clone(),
                permission_id: permission.id.clone(),
                permission_name: permission.name.clone(),
                campus_id: None,
                created_at: Some(now),
            });
        }

        let role = Role {
            id: input.id,
            name: input.name,
            description: input.description,
            parent_role_id: input.parent_role_id,
            campus_id: input.campus_id,
            is_super_role: input.is_super_role,
            archived_at: None,
            created_at: Some(now),
            updated_at: Some(now),
        };
        state.roles.insert(role.id.clone(), role.clone());
        state.bindings.extend(initial_bindings);
        Ok(role)
    }

    async fn get_role(&self, input: GetRoleRepoInput) -> DomainResult<Option<Role>> {
        let state = self.state.read().await;
        Ok(state.roles.get(&input.role_id).cloned())
    }

    async fn get_roles(&self, input: GetRolesRepoInput) -> DomainResult<Vec<Role>> {
        let state = self.state.read().await;
        Ok(input
            .role_ids
            .iter()
            .filter_map(|id| state.roles.get(id).cloned())
            .collect())
    }

    async fn get_role_by_name(&self, input: GetRoleByNameRepoInput) -> DomainResult<Option<Role>> {
        let state = self.state.read().await;
        Ok(state
            .roles
            .values()
            .find(|role| role.name == input.name && role.campus_id == input.campus_id)
            .cloned())
    }

    async fn get_super_role(&self) -> DomainResult<Option<Role>> {
        let state = self.state.read().await;
        Ok(state.roles.values().find(|role| role.is_super_role).cloned())
    }

    async fn list_roles(&self, input: ListRolesRepoInput) -> DomainResult<Vec<Role>> {
        let state = self.state.read().await;
        let mut roles: Vec<Role> = state
            .roles
            .values()
            .filter(|role| input.include_archived || !role.is_archived())
            .filter(|role| role.campus_id.is_none() || role.campus_id == input.campus_id)
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(roles)
    }

    async fn set_role_parent(&self, input: SetRoleParentRepoInput) -> DomainResult<Role> {
        let now = Utc::now();
        let mut state = self.state.write().await;

        let role = state.live_role(&input.role_id)?.clone();
        if role.is_super_role && input.parent_role_id.is_some() {
            return Err(DomainError::InvalidParent(
                "the super-role cannot inherit from another role".to_string(),
            ));
        }

        if let Some(parent_role_id) = input.parent_role_id.as_deref() {
            let chain = state.ancestor_chain(parent_role_id);
            let candidate = LinkCandidate {
                role_id: &role.id,
                name: &role.name,
                campus_id: role.campus_id.as_deref(),
                subtree_depth: state.subtree_depth(&role.id),
            };
            validate_parent_link(&candidate, parent_role_id, &chain)?;
        }

        let updated = Role {
            parent_role_id: input.parent_role_id,
            updated_at: Some(now),
            ..role
        };
        state.roles.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }

    async fn archive_role(&self, input: ArchiveRoleRepoInput) -> DomainResult<RoleRemoval> {
        let now = Utc::now();
        let mut state = self.state.write().await;

        let role = state.live_role(&input.role_id)?.clone();
        if role.is_super_role {
            return Err(DomainError::ValidationError(
                "the super-role cannot be archived".to_string(),
            ));
        }

        let in_use = state.assignments.iter().any(|a| a.role_id == role.id);
        if in_use {
            if let Some(stored) = state.roles.get_mut(&role.id) {
                stored.archived_at = Some(now);
                stored.updated_at = Some(now);
            }
            return Ok(RoleRemoval::Archived);
        }

        state.roles.remove(&role.id);
        state.bindings.retain(|b| b.role_id != role.id);
        for child in state.roles.values_mut() {
            if child.parent_role_id.as_deref() == Some(role.id.as_str()) {
                child.parent_role_id = None;
                child.updated_at = Some(now);
            }
        }
        Ok(RoleRemoval::Deleted)
    }
}

#[async_trait]
impl RolePermissionRepository for InMemoryAuthorizationStore {
    async fn bind_permission(
        &self,
        input: BindPermissionRepoInputWithId,
    ) -> DomainResult<RolePermissionBinding> {
        let mut state = self.state.write().await;

        state.live_role(&input.role_id)?;
        let permission_name = state
            .permissions
            .values()
            .find(|p| p.id == input.permission_id)
            .map(|p| p.name.clone())
            .ok_or_else(|| DomainError::UnknownPermission(input.permission_id.clone()))?;
        state.require_campus(input.campus_id.as_deref())?;

        if let Some(existing) = state.bindings.iter().find(|b| {
            b.role_id == input.role_id
                && b.permission_id == input.permission_id
                && b.campus_id == input.campus_id
        }) {
            return Ok(existing.clone());
        }

        let binding = RolePermissionBinding {
            id: input.id,
            role_id: input.role_id,
            permission_id: input.permission_id,
            permission_name,
            campus_id: input.campus_id,
            created_at: Some(Utc::now()),
        };
        state.bindings.push(binding.clone());
        Ok(binding)
    }

    async fn unbind_permission(&self, input: UnbindPermissionRepoInput) -> DomainResult<bool> {
        let mut state = self.state.write().await;
        let before = state.bindings.len();
        state.bindings.retain(|b| {
            !(b.role_id == input.role_id
                && b.permission_id == input.permission_id
                && b.campus_id == input.campus_id)
        });
        Ok(state.bindings.len() != before)
    }

    async fn list_bindings(
        &self,
        input: ListBindingsRepoInput,
    ) -> DomainResult<Vec<RolePermissionBinding>> {
        let state = self.state.read().await;
        Ok(state
            .bindings
            .iter()
            .filter(|b| input.role_ids.contains(&b.role_id))
            .filter(|b| input.scope.matches(b.campus_id.as_deref()))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RoleAssignmentRepository for InMemoryAuthorizationStore {
    async fn assign_role(&self, input: AssignRoleRepoInputWithId) -> DomainResult<RoleAssignment> {
        let mut state = self.state.write().await;

        if !state.users.contains_key(&input.user_id) {
            return Err(DomainError::UnknownUser(input.user_id));
        }
        state.live_role(&input.role_id)?;
        state.require_campus(input.campus_id.as_deref())?;

        if let Some(existing) = state.assignments.iter().find(|a| {
            a.user_id == input.user_id
                && a.role_id == input.role_id
                && a.campus_id == input.campus_id
        }) {
            return Ok(existing.clone());
        }

        let assignment = RoleAssignment {
            id: input.id,
            user_id: input.user_id,
            role_id: input.role_id,
            campus_id: input.campus_id,
            created_at: Some(Utc::now()),
        };
        state.assignments.push(assignment.clone());
        Ok(assignment)
    }

    async fn revoke_role(&self, input: RevokeRoleRepoInput) -> DomainResult<bool> {
        let mut state = self.state.write().await;
        let before = state.assignments.len();
        state.assignments.retain(|a| {
            !(a.user_id == input.user_id
                && a.role_id == input.role_id
                && a.campus_id == input.campus_id)
        });
        Ok(state.assignments.len() != before)
    }

    async fn list_user_assignments(
        &self,
        input: ListUserAssignmentsRepoInput,
    ) -> DomainResult<Vec<RoleAssignment>> {
        let state = self.state.read().await;
        Ok(state
            .assignments
            .iter()
            .filter(|a| a.user_id == input.user_id)
            .filter(|a| input.scope.matches(a.campus_id.as_deref()))
            .cloned()
            .collect())
    }

    async fn count_role_assignments(
        &self,
        input: CountRoleAssignmentsRepoInput,
    ) -> DomainResult<i64> {
        let state = self.state.read().await;
        Ok(state
            .assignments
            .iter()
            .filter(|a| a.role_id == input.role_id)
            .count() as i64)
    }
}

#[async_trait]
impl ResponsibilityRepository for InMemoryAuthorizationStore {
    async fn get_responsibility(
        &self,
        input: GetResponsibilityRepoInput,
    ) -> DomainResult<Option<Responsibility>> {
        let state = self.state.read().await;
        Ok(state
            .responsibilities
            .get(&(input.resource_id, input.kind))
            .cloned())
    }

    async fn transfer_responsibility(
        &self,
        input: TransferResponsibilityRepoInputWithId,
    ) -> DomainResult<ResponsibilityTransfer> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let key = (input.resource_id.clone(), input.kind);

        let holder_id = state
            .responsibilities
            .get(&key)
            .map(|r| r.holder_id.clone())
            .ok_or_else(|| {
                DomainError::ResponsibilityNotFound(format!(
                    "{} {}",
                    input.kind, input.resource_id
                ))
            })?;

        if holder_id != input.from_user_id {
            return Err(DomainError::ValidationError(format!(
                "user {} does not hold {} {}",
                input.from_user_id, input.kind, input.resource_id
            )));
        }
        if input.from_user_id == input.to_user_id {
            return Err(DomainError::ValidationError(
                "cannot transfer a responsibility to its current holder".to_string(),
            ));
        }
        if !state.users.contains_key(&input.to_user_id) {
            return Err(DomainError::UnknownUser(input.to_user_id));
        }

        let load = state
            .responsibilities
            .values()
            .filter(|r| r.kind == input.kind && r.holder_id == input.to_user_id)
            .count() as i64;
        let max_load = state
            .capacities
            .get(&(input.to_user_id.clone(), input.kind))
            .copied()
            .unwrap_or(DEFAULT_RESPONSIBILITY_CAPACITY);
        if load >= max_load {
            return Err(DomainError::CapacityExceeded(
                input.to_user_id,
                input.kind.to_string(),
            ));
        }

        if let Some(responsibility) = state.responsibilities.get_mut(&key) {
            responsibility.holder_id = input.to_user_id.clone();
            responsibility.updated_at = Some(now);
        }

        let transfer = ResponsibilityTransfer {
            id: input.transfer_id,
            resource_id: input.resource_id,
            kind: input.kind,
            from_user_id: input.from_user_id,
            to_user_id: input.to_user_id,
            notes: input.notes,
            transferred_at: now,
        };
        state.transfers.push(transfer.clone());
        Ok(transfer)
    }
}
