use std::fmt;
use std::str::FromStr;

/// Name of the role that is granted the whole catalog
pub const SUPER_ROLE_NAME: &str = "super-admin";

/// Closed set of permissions known to the engine
///
/// Names are stable: they are persisted in the `permissions` table and bound
/// to roles by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    UserCreate,
    UserRead,
    UserUpdate,
    UserDelete,
    RoleCreate,
    RoleRead,
    RoleUpdate,
    RoleDelete,
    RoleCampusAssign,
    PermissionManage,
    SettingsManage,
    CampusView,
    CampusManage,
    CampusDelete,
    AcademicCalendarView,
    AcademicCalendarManage,
    AcademicYearManage,
    EventManage,
    ProgramView,
    ProgramManage,
    ProgramDelete,
    ClassGroupView,
    ClassGroupManage,
    ClassGroupDelete,
    ClassView,
    ClassManage,
    ClassDelete,
    ClassAssignTeachers,
    ClassAssignStudents,
    GradebookView,
    GradebookOverview,
    GradebookManage,
    GradeActivity,
    GradeModify,
    SubjectView,
    SubjectManage,
    SubjectDelete,
    SubjectAssignTeachers,
    CoordinatorView,
    CoordinatorManage,
    CoordinatorTransfer,
}

impl Permission {
    pub const ALL: [Permission; 41] = [
        Permission::UserCreate,
        Permission::UserRead,
        Permission::UserUpdate,
        Permission::UserDelete,
        Permission::RoleCreate,
        Permission::RoleRead,
        Permission::RoleUpdate,
        Permission::RoleDelete,
        Permission::RoleCampusAssign,
        Permission::PermissionManage,
        Permission::SettingsManage,
        Permission::CampusView,
        Permission::CampusManage,
        Permission::CampusDelete,
        Permission::AcademicCalendarView,
        Permission::AcademicCalendarManage,
        Permission::AcademicYearManage,
        Permission::EventManage,
        Permission::ProgramView,
        Permission::ProgramManage,
        Permission::ProgramDelete,
        Permission::ClassGroupView,
        Permission::ClassGroupManage,
        Permission::ClassGroupDelete,
        Permission::ClassView,
        Permission::ClassManage,
        Permission::ClassDelete,
        Permission::ClassAssignTeachers,
        Permission::ClassAssignStudents,
        Permission::GradebookView,
        Permission::GradebookOverview,
        Permission::GradebookManage,
        Permission::GradeActivity,
        Permission::GradeModify,
        Permission::SubjectView,
        Permission::SubjectManage,
        Permission::SubjectDelete,
        Permission::SubjectAssignTeachers,
        Permission::CoordinatorView,
        Permission::CoordinatorManage,
        Permission::CoordinatorTransfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::UserCreate => "user:create",
            Permission::UserRead => "user:read",
            Permission::UserUpdate => "user:update",
            Permission::UserDelete => "user:delete",
            Permission::RoleCreate => "role:create",
            Permission::RoleRead => "role:read",
            Permission::RoleUpdate => "role:update",
            Permission::RoleDelete => "role:delete",
            Permission::RoleCampusAssign => "role:campus-assign",
            Permission::PermissionManage => "permission:manage",
            Permission::SettingsManage => "settings:manage",
            Permission::CampusView => "campus:view",
            Permission::CampusManage => "campus:manage",
            Permission::CampusDelete => "campus:delete",
            Permission::AcademicCalendarView => "academic-calendar:view",
            Permission::AcademicCalendarManage => "academic-calendar:manage",
            Permission::AcademicYearManage => "academic-year:manage",
            Permission::EventManage => "event:manage",
            Permission::ProgramView => "program:view",
            Permission::ProgramManage => "program:manage",
            Permission::ProgramDelete => "program:delete",
            Permission::ClassGroupView => "class-group:view",
            Permission::ClassGroupManage => "class-group:manage",
            Permission::ClassGroupDelete => "class-group:delete",
            Permission::ClassView => "class:view",
            Permission::ClassManage => "class:manage",
            Permission::ClassDelete => "class:delete",
            Permission::ClassAssignTeachers => "class:assign-teachers",
            Permission::ClassAssignStudents => "class:assign-students",
            Permission::GradebookView => "gradebook:view",
            Permission::GradebookOverview => "gradebook:overview",
            Permission::GradebookManage => "gradebook:manage",
            Permission::GradeActivity => "grade:activity",
            Permission::GradeModify => "grade:modify",
            Permission::SubjectView => "subject:view",
            Permission::SubjectManage => "subject:manage",
            Permission::SubjectDelete => "subject:delete",
            Permission::SubjectAssignTeachers => "subject:assign-teachers",
            Permission::CoordinatorView => "coordinator:view",
            Permission::CoordinatorManage => "coordinator:manage",
            Permission::CoordinatorTransfer => "coordinator:transfer",
        }
    }

    /// Human readable description stored alongside the catalog entry
    pub fn description(&self) -> &'static str {
        match self {
            Permission::UserCreate => "Create users",
            Permission::UserRead => "View users",
            Permission::UserUpdate => "Update users",
            Permission::UserDelete => "Delete users",
            Permission::RoleCreate => "Create roles",
            Permission::RoleRead => "View roles and their permissions",
            Permission::RoleUpdate => "Change the parent of a role",
            Permission::RoleDelete => "Archive or delete roles",
            Permission::RoleCampusAssign => "Assign and revoke roles",
            Permission::PermissionManage => "Bind and unbind role permissions",
            Permission::SettingsManage => "Manage system settings",
            Permission::CampusView => "View campuses",
            Permission::CampusManage => "Manage campuses",
            Permission::CampusDelete => "Delete campuses",
            Permission::AcademicCalendarView => "View the academic calendar",
            Permission::AcademicCalendarManage => "Manage the academic calendar",
            Permission::AcademicYearManage => "Manage academic years",
            Permission::EventManage => "Manage calendar events",
            Permission::ProgramView => "View programs",
            Permission::ProgramManage => "Manage programs",
            Permission::ProgramDelete => "Delete programs",
            Permission::ClassGroupView => "View class groups",
            Permission::ClassGroupManage => "Manage class groups",
            Permission::ClassGroupDelete => "Delete class groups",
            Permission::ClassView => "View classes",
            Permission::ClassManage => "Manage classes",
            Permission::ClassDelete => "Delete classes",
            Permission::ClassAssignTeachers => "Assign teachers to classes",
            Permission::ClassAssignStudents => "Assign students to classes",
            Permission::GradebookView => "View gradebooks",
            Permission::GradebookOverview => "View gradebook overviews",
            Permission::GradebookManage => "Manage gradebooks",
            Permission::GradeActivity => "Grade activities",
            Permission::GradeModify => "Modify grades",
            Permission::SubjectView => "View subjects",
            Permission::SubjectManage => "Manage subjects",
            Permission::SubjectDelete => "Delete subjects",
            Permission::SubjectAssignTeachers => "Assign teachers to subjects",
            Permission::CoordinatorView => "View coordinators",
            Permission::CoordinatorManage => "Manage coordinators",
            Permission::CoordinatorTransfer => "Transfer coordinator responsibilities",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown permission: {}", s))
    }
}

/// Roles created by the bootstrap seed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefaultRole {
    SuperAdmin,
    Admin,
    CampusAdmin,
    Coordinator,
    Teacher,
    Student,
    Parent,
}

impl DefaultRole {
    /// Default roles seeded with ordinary bindings
    pub const ORDINARY: [DefaultRole; 6] = [
        DefaultRole::Admin,
        DefaultRole::CampusAdmin,
        DefaultRole::Coordinator,
        DefaultRole::Teacher,
        DefaultRole::Student,
        DefaultRole::Parent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DefaultRole::SuperAdmin => SUPER_ROLE_NAME,
            DefaultRole::Admin => "admin",
            DefaultRole::CampusAdmin => "campus-admin",
            DefaultRole::Coordinator => "coordinator",
            DefaultRole::Teacher => "teacher",
            DefaultRole::Student => "student",
            DefaultRole::Parent => "parent",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DefaultRole::SuperAdmin => "Full access to every permission",
            DefaultRole::Admin => "School administrator",
            DefaultRole::CampusAdmin => "Campus administrator",
            DefaultRole::Coordinator => "Program coordinator",
            DefaultRole::Teacher => "Teacher",
            DefaultRole::Student => "Student",
            DefaultRole::Parent => "Parent or guardian",
        }
    }

    /// Global bindings seeded for the role
    ///
    /// The super-role has none; the resolver grants it the whole catalog.
    pub fn default_permissions(&self) -> &'static [Permission] {
        use Permission::*;
        match self {
            DefaultRole::SuperAdmin => &[],
            DefaultRole::Admin => &[
                UserCreate,
                UserRead,
                UserUpdate,
                UserDelete,
                RoleRead,
                SettingsManage,
                ClassGroupView,
                ClassGroupManage,
                GradebookView,
                GradebookOverview,
                GradebookManage,
                GradeActivity,
                GradeModify,
                CampusView,
            ],
            DefaultRole::CampusAdmin => &[
                UserRead,
                UserUpdate,
                RoleRead,
                CampusView,
                CampusManage,
                ClassGroupView,
                ClassGroupManage,
                ClassView,
                ClassManage,
                ClassAssignTeachers,
                ClassAssignStudents,
                GradebookView,
                GradebookOverview,
                GradebookManage,
                SubjectView,
                SubjectManage,
                SubjectAssignTeachers,
            ],
            DefaultRole::Coordinator => &[
                UserRead,
                ClassGroupView,
                ClassView,
                GradebookView,
                GradebookOverview,
                SubjectView,
                CoordinatorView,
            ],
            DefaultRole::Teacher => &[
                UserRead,
                ClassView,
                GradebookView,
                GradebookManage,
                GradeActivity,
                GradeModify,
                SubjectView,
            ],
            DefaultRole::Student | DefaultRole::Parent => &[UserRead, ClassView, GradebookView],
        }
    }
}
