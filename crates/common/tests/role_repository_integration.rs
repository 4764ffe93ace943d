#![cfg(feature = "integration-tests")]

use common::domain::{
    ArchiveRoleRepoInput, AssignRoleRepoInputWithId, CreateRoleRepoInputWithId, DomainError,
    GetRoleRepoInput, ListRolesRepoInput, RoleAssignmentRepository, RoleRemoval, RoleRepository,
    SetRoleParentRepoInput,
};
use common::postgres::{PostgresClient, PostgresRoleAssignmentRepository, PostgresRoleRepository};
use goose::MigrationRunner;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;

const TEST_USER_ID: &str = "test-user-001";
const TEST_CAMPUS_ID: &str = "campus-north";

async fn setup_test_db() -> (ContainerAsync<Postgres>, PostgresRoleRepository, PostgresClient) {
    let postgres = Postgres::default().start().await.unwrap();
    let host = postgres.get_host().await.unwrap();
    let port = postgres.get_host_port_ipv4(5432).await.unwrap();

    let migrations_dir = format!(
        "{}/../../crates/authz_seed/migrations/postgres",
        env!("CARGO_MANIFEST_DIR")
    );
    let dsn = format!(
        "postgres://postgres:postgres@{}:{}/postgres?sslmode=disable",
        host, port
    );
    let goose_path = which::which("goose").expect("goose binary not found");

    MigrationRunner::new(
        goose_path.to_string_lossy().to_string(),
        migrations_dir,
        "postgres",
        dsn,
    )
    .run_migrations()
    .await
    .expect("Migrations failed");

    let client = PostgresClient::new(
        &host.to_string(),
        port,
        "postgres",
        "postgres",
        "postgres",
        5,
    )
    .expect("Failed to create client");

    // Users and campuses belong to other services; insert them directly
    let conn = client.get_connection().await.unwrap();
    conn.execute(
        "INSERT INTO users (id, email, name) VALUES ($1, 'test@example.com', 'Test User')",
        &[&TEST_USER_ID],
    )
    .await
    .unwrap();
    conn.execute(
        "INSERT INTO campuses (id, name) VALUES ($1, 'North Campus')",
        &[&TEST_CAMPUS_ID],
    )
    .await
    .unwrap();

    let repository = PostgresRoleRepository::new(client.clone());
    (postgres, repository, client)
}

fn role_input(id: &str, parent: Option<&str>, campus: Option<&str>) -> CreateRoleRepoInputWithId {
    CreateRoleRepoInputWithId {
        id: id.to_string(),
        name: id.to_string(),
        description: None,
        parent_role_id: parent.map(str::to_string),
        campus_id: campus.map(str::to_string),
        is_super_role: false,
        permission_ids: Vec::new(),
    }
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_create_and_get_role() {
    let (_container, repo, _client) = setup_test_db().await;

    let created = repo.create_role(role_input("teacher", None, None)).await.unwrap();
    assert_eq!(created.id, "teacher");
    assert!(!created.is_super_role);
    assert!(created.created_at.is_some());

    let retrieved = repo
        .get_role(GetRoleRepoInput {
            role_id: "teacher".to_string(),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(retrieved.name, "teacher");
    assert!(retrieved.archived_at.is_none());
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_role_names_are_unique_per_campus() {
    let (_container, repo, _client) = setup_test_db().await;

    repo.create_role(role_input("teacher", None, None)).await.unwrap();

    let mut duplicate = role_input("teacher-2", None, None);
    duplicate.name = "teacher".to_string();
    let result = repo.create_role(duplicate).await;
    assert!(matches!(result, Err(DomainError::DuplicateName(name)) if name == "teacher"));

    // Same name is allowed once it is owned by a campus
    let mut campus_owned = role_input("teacher-north", None, Some(TEST_CAMPUS_ID));
    campus_owned.name = "teacher".to_string();
    repo.create_role(campus_owned).await.unwrap();

    let listed = repo
        .list_roles(ListRolesRepoInput {
            campus_id: Some(TEST_CAMPUS_ID.to_string()),
            include_archived: false,
        })
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_create_role_unknown_campus() {
    let (_container, repo, _client) = setup_test_db().await;

    let result = repo
        .create_role(role_input("teacher", None, Some("campus-missing")))
        .await;
    assert!(matches!(result, Err(DomainError::CampusNotFound(_))));
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_set_role_parent_rejects_cycle() {
    let (_container, repo, _client) = setup_test_db().await;

    repo.create_role(role_input("a", None, None)).await.unwrap();
    repo.create_role(role_input("b", Some("a"), None)).await.unwrap();
    repo.create_role(role_input("c", Some("b"), None)).await.unwrap();

    let result = repo
        .set_role_parent(SetRoleParentRepoInput {
            role_id: "a".to_string(),
            parent_role_id: Some("c".to_string()),
        })
        .await;
    assert!(matches!(result, Err(DomainError::InvalidParent(_))));

    let a = repo
        .get_role(GetRoleRepoInput {
            role_id: "a".to_string(),
        })
        .await
        .unwrap()
        .unwrap();
    assert!(a.parent_role_id.is_none());

    let detached = repo
        .set_role_parent(SetRoleParentRepoInput {
            role_id: "c".to_string(),
            parent_role_id: None,
        })
        .await
        .unwrap();
    assert!(detached.parent_role_id.is_none());
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_global_role_cannot_inherit_from_campus_role() {
    let (_container, repo, _client) = setup_test_db().await;

    repo.create_role(role_input("campus-staff", None, Some(TEST_CAMPUS_ID)))
        .await
        .unwrap();

    let result = repo
        .create_role(role_input("staff", Some("campus-staff"), None))
        .await;
    assert!(matches!(result, Err(DomainError::InvalidParent(_))));
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_only_one_super_role() {
    let (_container, repo, _client) = setup_test_db().await;

    let mut first = role_input("super", None, None);
    first.is_super_role = true;
    repo.create_role(first).await.unwrap();

    let mut second = role_input("super-2", None, None);
    second.is_super_role = true;
    let result = repo.create_role(second).await;
    assert!(matches!(result, Err(DomainError::DuplicateName(_))));

    let super_role = repo.get_super_role().await.unwrap().unwrap();
    assert_eq!(super_role.id, "super");
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_archive_role_deletes_or_archives() {
    let (_container, repo, client) = setup_test_db().await;

    repo.create_role(role_input("unused", None, None)).await.unwrap();
    repo.create_role(role_input("held", None, None)).await.unwrap();

    let assignments = PostgresRoleAssignmentRepository::new(client.clone());
    assignments
        .assign_role(AssignRoleRepoInputWithId {
            id: "assignment-1".to_string(),
            user_id: TEST_USER_ID.to_string(),
            role_id: "held".to_string(),
            campus_id: None,
        })
        .await
        .unwrap();

    let removal = repo
        .archive_role(ArchiveRoleRepoInput {
            role_id: "unused".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(removal, RoleRemoval::Deleted);

    let removal = repo
        .archive_role(ArchiveRoleRepoInput {
            role_id: "held".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(removal, RoleRemoval::Archived);

    let held = repo
        .get_role(GetRoleRepoInput {
            role_id: "held".to_string(),
        })
        .await
        .unwrap()
        .unwrap();
    assert!(held.archived_at.is_some());

    let result = repo
        .archive_role(ArchiveRoleRepoInput {
            role_id: "held".to_string(),
        })
        .await;
    assert!(matches!(result, Err(DomainError::UnknownRole(_))));
}

async fn insert_permission(client: &PostgresClient, id: &str, name: &str) {
    let conn = client.get_connection().await.unwrap();
    conn.execute("INSERT INTO permissions (id, name) VALUES ($1, $2)", &[&id, &name])
        .await
        .unwrap();
}

async fn count_bindings(client: &PostgresClient, role_id: &str) -> i64 {
    let conn = client.get_connection().await.unwrap();
    conn.query_one(
        "SELECT COUNT(*) FROM role_permissions WHERE role_id = $1 AND campus_id IS NULL",
        &[&role_id],
    )
    .await
    .unwrap()
    .get(0)
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_create_role_binds_initial_permissions() {
    let (_container, repo, client) = setup_test_db().await;
    insert_permission(&client, "perm-view", "class:view").await;
    insert_permission(&client, "perm-grade", "grade:modify").await;

    let mut input = role_input("teacher", None, None);
    input.permission_ids = vec!["perm-view".to_string(), "perm-grade".to_string()];
    repo.create_role(input).await.unwrap();

    assert_eq!(count_bindings(&client, "teacher").await, 2);
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_create_role_with_unknown_permission_rolls_back() {
    let (_container, repo, client) = setup_test_db().await;
    insert_permission(&client, "perm-view", "class:view").await;

    let mut input = role_input("teacher", None, None);
    input.permission_ids = vec!["perm-view".to_string(), "perm-missing".to_string()];
    let result = repo.create_role(input).await;
    assert!(matches!(result, Err(DomainError::UnknownPermission(id)) if id == "perm-missing"));

    let stored = repo
        .get_role(GetRoleRepoInput {
            role_id: "teacher".to_string(),
        })
        .await
        .unwrap();
    assert!(stored.is_none());
    assert_eq!(count_bindings(&client, "teacher").await, 0);
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_concurrent_opposite_reparents_cannot_both_commit() {
    let (_container, repo, _client) = setup_test_db().await;
    repo.create_role(role_input("a", None, None)).await.unwrap();
    repo.create_role(role_input("b", None, None)).await.unwrap();

    let (a_under_b, b_under_a) = tokio::join!(
        repo.set_role_parent(SetRoleParentRepoInput {
            role_id: "a".to_string(),
            parent_role_id: Some("b".to_string()),
        }),
        repo.set_role_parent(SetRoleParentRepoInput {
            role_id: "b".to_string(),
            parent_role_id: Some("a".to_string()),
        }),
    );
    assert!(
        a_under_b.is_ok() != b_under_a.is_ok(),
        "exactly one re-parent should commit: {:?} / {:?}",
        a_under_b,
        b_under_a
    );

    let mut parents = Vec::new();
    for role_id in ["a", "b"] {
        let role = repo
            .get_role(GetRoleRepoInput {
                role_id: role_id.to_string(),
            })
            .await
            .unwrap()
            .unwrap();
        parents.push(role.parent_role_id);
    }
    let linked = parents.iter().filter(|parent| parent.is_some()).count();
    assert_eq!(linked, 1);
}

async fn create_linear_roles(repo: &PostgresRoleRepository, prefix: &str, len: usize) {
    // Built root first; `{prefix}0` ends up as the deepest role
    for i in (0..len).rev() {
        let id = format!("{}{}", prefix, i);
        let parent = (i + 1 < len).then(|| format!("{}{}", prefix, i + 1));
        repo.create_role(role_input(&id, parent.as_deref(), None)).await.unwrap();
    }
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_reparent_counts_depth_of_moved_subtree() {
    let (_container, repo, _client) = setup_test_db().await;
    create_linear_roles(&repo, "p", 20).await;
    create_linear_roles(&repo, "c", 20).await;

    let result = repo
        .set_role_parent(SetRoleParentRepoInput {
            role_id: "c19".to_string(),
            parent_role_id: Some("p0".to_string()),
        })
        .await;
    assert!(matches!(result, Err(DomainError::InvalidParent(msg)) if msg.contains("levels")));

    repo.set_role_parent(SetRoleParentRepoInput {
        role_id: "c11".to_string(),
        parent_role_id: Some("p0".to_string()),
    })
    .await
    .unwrap();
}
