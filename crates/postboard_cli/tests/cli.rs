use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Command with logs and session file isolated under `dir`.
fn postboard(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("postboard");
    cmd.env("POSTBOARD_LOG_DIR", dir.path().join("logs"))
        .env("POSTBOARD_SESSION_FILE", dir.path().join("session.json"))
        .env_remove("POSTBOARD_LOG_LEVEL")
        .env_remove("POSTBOARD_LOCAL_DB")
        .env_remove("POSTBOARD_ARTICLES_TABLE")
        .env_remove("POSTBOARD_IMAGES_BUCKET");
    cmd
}

#[test]
fn help_lists_all_commands() {
    let mut assert = cargo_bin_cmd!("postboard").arg("--help").assert().success();
    for command in [
        "signup", "login", "logout", "whoami", "list", "post", "edit", "delete", "open",
    ] {
        assert = assert.stdout(predicate::str::contains(command));
    }
}

#[test]
fn refuses_to_start_without_backend_url() {
    let dir = TempDir::new().unwrap();
    postboard(&dir)
        .env_remove("SUPABASE_URL")
        .env("SUPABASE_ANON_KEY", "anon-key")
        .arg("whoami")
        .assert()
        .failure()
        .stderr(predicate::str::contains("SUPABASE_URL"));
}

#[test]
fn refuses_to_start_with_non_http_backend_url() {
    let dir = TempDir::new().unwrap();
    postboard(&dir)
        .env("SUPABASE_URL", "ftp://example.com")
        .env("SUPABASE_ANON_KEY", "anon-key")
        .arg("whoami")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported scheme"));
}

#[test]
fn anonymous_user_is_redirected_from_dashboard_to_login() {
    let dir = TempDir::new().unwrap();
    postboard(&dir)
        .env("SUPABASE_URL", "http://127.0.0.1:9")
        .env("SUPABASE_ANON_KEY", "anon-key")
        .args(["open", "/dashboard"])
        .assert()
        .success()
        .stdout(predicate::str::contains("redirect /login?redirect=%2Fdashboard"));

    postboard(&dir)
        .env("SUPABASE_URL", "http://127.0.0.1:9")
        .env("SUPABASE_ANON_KEY", "anon-key")
        .args(["open", "/login"])
        .assert()
        .success()
        .stdout(predicate::str::contains("proceed /login"));
}

#[test]
fn post_without_session_is_rejected_locally() {
    let dir = TempDir::new().unwrap();
    postboard(&dir)
        .env("SUPABASE_URL", "http://127.0.0.1:9")
        .env("SUPABASE_ANON_KEY", "anon-key")
        .args(["post", "hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be signed in"));
}

#[tokio::test(flavor = "multi_thread")]
async fn list_prints_articles_from_backend() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/articles"))
        .and(query_param("select", "*"))
        .and(query_param("order", "created_at.desc"))
        .and(header("apikey", "anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "id": "6a1f7f3e-2d0c-4d7b-9a53-0d7f8a1e2b3c",
                "user_id": "0b6c3a52-9e8f-4d21-a7c4-5e2f1d0c9b8a",
                "content": "first light",
                "image_url": null,
                "created_at": "2024-05-01T10:00:00Z",
                "updated_at": "2024-05-01T10:00:00Z"
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    postboard(&dir)
        .env("SUPABASE_URL", server.uri())
        .env("SUPABASE_ANON_KEY", "anon-key")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("first light"))
        .stdout(predicate::str::contains("User 0b6c3a52"));
}

const NEW_USER_ID: &str = "2d9f4c1a-7b3e-4f5a-8c6d-9e0f1a2b3c4d";

async fn mount_sign_in_for_new_user(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(body_json(serde_json::json!({
            "email": "new@example.com",
            "password": "secret"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "new-access",
            "refresh_token": "new-refresh",
            "expires_in": 3600,
            "user": { "id": NEW_USER_ID, "email": "new@example.com" }
        })))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn login_over_restored_session_reports_the_new_user() {
    let server = MockServer::start().await;
    mount_sign_in_for_new_user(&server).await;
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("session.json"),
        serde_json::json!({
            "user": {
                "id": "5e8a1c2b-3d4f-4a6b-9c8d-7e6f5a4b3c2d",
                "email": "old@example.com"
            },
            "access_token": "old-access",
            "refresh_token": "old-refresh",
            "expires_at": null
        })
        .to_string(),
    )
    .unwrap();

    postboard(&dir)
        .env("SUPABASE_URL", server.uri())
        .env("SUPABASE_ANON_KEY", "anon-key")
        .env("POSTBOARD_PASSWORD", "secret")
        .args(["login", "--email", "new@example.com"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Signed in as new@example.com."));

    let stored = std::fs::read_to_string(dir.path().join("session.json")).unwrap();
    assert!(stored.contains(NEW_USER_ID));
}

#[tokio::test(flavor = "multi_thread")]
async fn local_database_keeps_articles_between_runs() {
    let server = MockServer::start().await;
    mount_sign_in_for_new_user(&server).await;
    Mock::given(path("/rest/v1/articles"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("data").join("articles.db");
    let run = |args: &[&str]| {
        let mut cmd = postboard(&dir);
        cmd.env("SUPABASE_URL", server.uri())
            .env("SUPABASE_ANON_KEY", "anon-key")
            .env("POSTBOARD_PASSWORD", "secret")
            .arg("--local-db")
            .arg(&db)
            .args(args);
        cmd
    };

    run(&["list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No articles yet."));
    run(&["login", "--email", "new@example.com"]).assert().success();
    run(&["post", "kept on disk"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Posted "));

    run(&["list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("kept on disk"))
        .stdout(predicate::str::contains("new@example.com (yours)"));
    assert!(db.exists());
}
