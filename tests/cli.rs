use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn formdeck_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("formdeck");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    fs::write(
        root.join("fixture.json"),
        r#"{
  "submissions": [
    { "_id": "a1", "formId": "feedback-form-1", "namespace": "forms", "status": "CONFIRMED",
      "_createdDate": "2024-02-01T10:00:00Z",
      "submissions": { "email": "ann@example.com", "phone": "555 123 4567", "rating": 5 } },
    { "_id": "a2", "formId": "feedback-form-1", "namespace": "forms", "status": "PENDING",
      "_createdDate": "2024-02-03T10:00:00Z",
      "submissions": { "email": "joe@example.com", "phone": "555 987 6543", "rating": 3 } },
    { "_id": "a3", "namespace": "forms", "_createdDate": "2024-02-04T10:00:00Z" }
  ],
  "collections": {
    "Recipes": [
      { "_id": "r1", "_createdDate": "2024-01-01", "title": "Pancakes", "servings": 4 },
      { "_id": "r2", "_createdDate": "2024-01-02", "title": "Soup", "servings": 2 }
    ]
  }
}"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[backend]
kind = "memory"
fixture = "{}/fixture.json"

[discovery]
probe_interval_ms = 1
collections = ["Recipes"]

[[discovery.namespaces]]
id = "forms"

[[discovery.namespaces]]
id = "custom.forms"
"#,
        root.display()
    );

    let config_path = config_dir.join("formdeck.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_formdeck(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = formdeck_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run formdeck binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_discover_prints_report() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_formdeck(&config_path, &["discover"]);
    assert!(success, "discover failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("found   forms: 2 records in 1 forms"));
    assert!(stdout.contains("empty   custom.forms"));
    assert!(stdout.contains("Recipes"));
}

#[test]
fn test_forms_lists_generated_name() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_formdeck(&config_path, &["forms", "forms"]);
    assert!(success, "forms failed: stderr={}", stderr);
    assert!(stdout.contains("feedback-form-1"));
    assert!(stdout.contains("Contact Form (feedback...)"));
}

#[test]
fn test_submissions_table_with_status_filter() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_formdeck(
        &config_path,
        &["submissions", "forms", "--status", "pending"],
    );
    assert!(success, "submissions failed: stderr={}", stderr);
    assert!(stdout.contains("a2"));
    assert!(!stdout.contains("a1 "));
    assert!(stdout.contains("(555) 987-6543"));
    assert!(stdout.contains("Page 1/1: 1 matching"));
}

#[test]
fn test_submissions_rejects_unknown_status() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) =
        run_formdeck(&config_path, &["submissions", "forms", "--status", "lost"]);
    assert!(!success);
    assert!(stderr.contains("unknown submission status"));
}

#[test]
fn test_fields_reports_types() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_formdeck(&config_path, &["fields", "forms"]);
    assert!(success, "fields failed: stderr={}", stderr);
    let email_line = stdout.lines().find(|l| l.starts_with("email")).unwrap();
    assert_eq!(email_line.split_whitespace().nth(1), Some("email"));
    let rating_line = stdout.lines().find(|l| l.starts_with("rating")).unwrap();
    assert_eq!(rating_line.split_whitespace().nth(1), Some("number"));
    assert!(stdout.contains("(1 dropped)"));
}

#[test]
fn test_items_search() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) =
        run_formdeck(&config_path, &["items", "Recipes", "--search", "soup"]);
    assert!(success, "items failed: stderr={}", stderr);
    assert!(stdout.contains("Soup"));
    assert!(!stdout.contains("Pancakes"));
    assert!(stdout.contains("1 of 1 items"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) =
        run_formdeck(&tmp.path().join("nope.toml"), &["discover"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_collections_lists_counts() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_formdeck(&config_path, &["collections"]);
    assert!(success, "collections failed: stderr={}", stderr);
    let line = stdout.lines().find(|l| l.starts_with("Recipes")).unwrap();
    assert_eq!(line.split_whitespace().last(), Some("2"));
    assert!(stdout.contains("1 collections"));
}
