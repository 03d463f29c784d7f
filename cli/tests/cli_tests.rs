use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const CONFIG: &str = r#"
roles:
  - id: viewer
    name: Viewer
    level: 25
  - id: contributor
    name: Contributor
    level: 50
    inherits: [viewer]
  - id: editor
    name: Editor
    level: 75
    inherits: [contributor]
    description: Edits any node
permissions:
  - id: content:view
    granting_roles: [viewer, contributor]
  - id: content:edit
    granting_roles: [contributor]
  - id: node:view
    granting_roles: [viewer]
  - id: node:edit
    granting_roles: [editor]
  - id: node:edit:own
    granting_roles: [contributor]
principals:
  - id: u1
    roles: [contributor]
  - id: v1
    roles: [viewer]
  - id: root
    is_admin: true
"#;

/// Helper function to create a project directory holding an rbac.yaml
fn create_mock_project() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("rbac.yaml"), CONFIG).unwrap();
    temp_dir
}

/// Command with a clean environment, run from `dir`
fn rbacctl(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("rbacctl").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("RBAC_CONFIG")
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_cli_help() {
    let dir = TempDir::new().unwrap();
    rbacctl(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Command line interface"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn test_cli_version() {
    let dir = TempDir::new().unwrap();
    rbacctl(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rbacctl"));
}

#[test]
fn test_missing_config() {
    let dir = TempDir::new().unwrap();
    rbacctl(&dir)
        .arg("roles")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No RBAC configuration found"));
}

#[test]
fn test_validate_text() {
    let project = create_mock_project();
    rbacctl(&project)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("RBAC Configuration"))
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_validate_json() {
    let project = create_mock_project();
    rbacctl(&project)
        .args(["validate", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"valid\""))
        .stdout(predicate::str::contains("\"roles\": 3"));
}

#[test]
fn test_validate_rejects_dangling_role() {
    let project = TempDir::new().unwrap();
    fs::write(
        project.path().join("rbac.yaml"),
        "roles: []\npermissions:\n  - id: content:view\n    granting_roles: [ghost]\n",
    )
    .unwrap();

    rbacctl(&project)
        .arg("validate")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("undefined role 'ghost'"));
}

#[test]
fn test_roles_listing() {
    let project = create_mock_project();
    rbacctl(&project)
        .arg("roles")
        .assert()
        .success()
        .stdout(predicate::str::contains("[editor]"))
        .stdout(predicate::str::contains("Total roles: 3"));
}

#[test]
fn test_permissions_json() {
    let project = create_mock_project();
    rbacctl(&project)
        .args(["permissions", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"node:edit:own\""))
        .stdout(predicate::str::contains("\"granting_roles\""));
}

#[test]
fn test_check_permission_allowed_through_inheritance() {
    let project = create_mock_project();
    rbacctl(&project)
        .args(["check", "permission", "u1", "content:view"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ALLOWED"));
}

#[test]
fn test_check_permission_denied_exit_code() {
    let project = create_mock_project();
    rbacctl(&project)
        .args(["check", "permission", "v1", "content:edit"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("DENIED"))
        .stdout(predicate::str::contains("missing permission 'content:edit'"));
}

#[test]
fn test_check_permission_any() {
    let project = create_mock_project();
    rbacctl(&project)
        .args(["check", "permission", "v1", "content:edit", "content:view", "--any"])
        .assert()
        .success();

    rbacctl(&project)
        .args(["check", "permission", "v1", "content:edit", "content:view"])
        .assert()
        .code(2);
}

#[test]
fn test_check_permission_json() {
    let project = create_mock_project();
    rbacctl(&project)
        .args(["check", "permission", "root", "billing:refund", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"allowed\": true"))
        .stdout(predicate::str::contains("\"source\": \"admin\""));
}

#[test]
fn test_check_role_is_direct_only() {
    let project = create_mock_project();
    rbacctl(&project)
        .args(["check", "role", "u1", "contributor"])
        .assert()
        .success();

    rbacctl(&project)
        .args(["check", "role", "u1", "viewer"])
        .assert()
        .code(2);
}

#[test]
fn test_check_action_ownership_override() {
    let project = create_mock_project();
    rbacctl(&project)
        .args(["check", "action", "u1", "edit", "node", "--owner", "u1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("owner=u1"));

    rbacctl(&project)
        .args(["check", "action", "u1", "edit", "node", "--owner", "v1"])
        .assert()
        .code(2);

    rbacctl(&project)
        .args(["check", "action", "u1", "edit", "node"])
        .assert()
        .code(2);
}

#[test]
fn test_check_action_anonymous_view() {
    let project = create_mock_project();
    rbacctl(&project)
        .args(["check", "action", "anonymous", "view", "node"])
        .assert()
        .success()
        .stdout(predicate::str::contains("unauthenticated"));

    rbacctl(&project)
        .args(["check", "action", "anonymous", "view", "node", "--private"])
        .assert()
        .code(2);
}

#[test]
fn test_effective_permissions_json() {
    let project = create_mock_project();
    rbacctl(&project)
        .args(["effective", "u1", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"content:view\""))
        .stdout(predicate::str::contains("\"node:edit:own\""))
        .stdout(predicate::str::contains("\"node:edit\"").not());
}

#[test]
fn test_unknown_principal() {
    let project = create_mock_project();
    rbacctl(&project)
        .args(["check", "permission", "ghost", "content:view"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Unknown principal 'ghost'"));
}

#[test]
fn test_malformed_permission_id() {
    let project = create_mock_project();
    rbacctl(&project)
        .args(["check", "permission", "u1", "content view"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid query"));
}

#[test]
fn test_explicit_config_path_and_env() {
    let project = create_mock_project();
    let elsewhere = TempDir::new().unwrap();
    let config_path = project.path().join("rbac.yaml");

    rbacctl(&elsewhere)
        .arg("--config")
        .arg(&config_path)
        .arg("roles")
        .assert()
        .success()
        .stdout(predicate::str::contains("[viewer]"));

    rbacctl(&elsewhere)
        .env("RBAC_CONFIG", &config_path)
        .arg("roles")
        .assert()
        .success();
}
