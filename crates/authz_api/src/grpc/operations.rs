use common::auth::{Permission, PermissionRequirement};
use common::grpc::{CampusSource, OperationPolicy, OperationRegistry};

pub const CREATE_ROLE: &str = "/campus.authz.v1.RoleService/CreateRole";
pub const GET_ROLE: &str = "/campus.authz.v1.RoleService/GetRole";
pub const LIST_ROLES: &str = "/campus.authz.v1.RoleService/ListRoles";
pub const SET_ROLE_PARENT: &str = "/campus.authz.v1.RoleService/SetRoleParent";
pub const ARCHIVE_ROLE: &str = "/campus.authz.v1.RoleService/ArchiveRole";
pub const LIST_ROLE_PERMISSIONS: &str = "/campus.authz.v1.RoleService/ListRolePermissions";
pub const BIND_PERMISSION: &str = "/campus.authz.v1.PermissionBindingService/BindPermission";
pub const UNBIND_PERMISSION: &str = "/campus.authz.v1.PermissionBindingService/UnbindPermission";
pub const ASSIGN_ROLE: &str = "/campus.authz.v1.RoleAssignmentService/AssignRole";
pub const REVOKE_ROLE: &str = "/campus.authz.v1.RoleAssignmentService/RevokeRole";
pub const LIST_USER_ROLES: &str = "/campus.authz.v1.RoleAssignmentService/ListUserRoles";
pub const RESOLVE_PERMISSIONS: &str = "/campus.authz.v1.PermissionQueryService/ResolvePermissions";
pub const GET_RESPONSIBILITY: &str = "/campus.authz.v1.ResponsibilityService/GetResponsibility";
pub const TRANSFER_RESPONSIBILITY: &str =
    "/campus.authz.v1.ResponsibilityService/TransferResponsibility";

fn global(permission: Permission) -> OperationPolicy {
    OperationPolicy::Require {
        requirement: PermissionRequirement::global(permission),
        campus: CampusSource::None,
    }
}

/// Campus comes from the decoded message, so the service checks the permission
fn payload_scoped(permission: Permission) -> OperationPolicy {
    OperationPolicy::Require {
        requirement: PermissionRequirement::global(permission),
        campus: CampusSource::Payload,
    }
}

/// Operation table for the administrative API
pub fn authz_operation_registry() -> OperationRegistry {
    OperationRegistry::with_defaults()
        .register(CREATE_ROLE, payload_scoped(Permission::RoleCreate))
        .register(GET_ROLE, global(Permission::RoleRead))
        .register(LIST_ROLES, payload_scoped(Permission::RoleRead))
        .register(SET_ROLE_PARENT, global(Permission::RoleUpdate))
        .register(ARCHIVE_ROLE, global(Permission::RoleDelete))
        .register(LIST_ROLE_PERMISSIONS, payload_scoped(Permission::RoleRead))
        .register(BIND_PERMISSION, payload_scoped(Permission::PermissionManage))
        .register(UNBIND_PERMISSION, payload_scoped(Permission::PermissionManage))
        .register(ASSIGN_ROLE, payload_scoped(Permission::RoleCampusAssign))
        .register(REVOKE_ROLE, payload_scoped(Permission::RoleCampusAssign))
        // Own roles and permissions need only authentication; the service
        // checks role:read when another user is named
        .register(LIST_USER_ROLES, OperationPolicy::Authenticated)
        .register(RESOLVE_PERMISSIONS, OperationPolicy::Authenticated)
        .register(GET_RESPONSIBILITY, global(Permission::CoordinatorView))
        .register(
            TRANSFER_RESPONSIBILITY,
            global(Permission::CoordinatorTransfer),
        )
}
