use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docsense_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docsense");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("alpha.txt"),
        "Alpha quarterly report. Revenue grew to nine million dollars in the third quarter. \
         Operating costs stayed flat while headcount doubled across the engineering teams. \
         The board approved a new capital plan for the following fiscal year. "
            .repeat(5),
    )
    .unwrap();
    fs::write(
        files_dir.join("beta.md"),
        "# Beta infrastructure notes\n\nThe deployment pipeline moved to Kubernetes this \
         spring. Docker images are built nightly and pushed to the internal registry. \
         Incident response runbooks were rewritten after the March outage. "
            .repeat(5),
    )
    .unwrap();
    fs::write(files_dir.join("blank.txt"), "   \n\n\t  \n").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/docsense.sqlite"

[storage]
upload_dir = "{root}/data/uploads"

[chunking]
chunk_chars = 300
overlap_chars = 40

[embedding]
provider = "hash"
dims = 128

[retrieval]
default_top_k = 5

[server]
bind = "127.0.0.1:8611"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("docsense.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docsense(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docsense_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docsense binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn files_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("files")
}

/// Extract the document id from `docsense ingest` output.
fn ingested_id(stdout: &str) -> String {
    stdout
        .split_whitespace()
        .nth(1)
        .expect("ingest output missing document id")
        .to_string()
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_docsense(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_docsense(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_docsense(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_text_document() {
    let (_tmp, config_path) = setup_test_env();
    run_docsense(&config_path, &["init"]);

    let alpha = files_dir(&config_path).join("alpha.txt");
    let (stdout, stderr, success) =
        run_docsense(&config_path, &["ingest", alpha.to_str().unwrap()]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Indexed"));
    assert!(stdout.contains("method: text"));

    let (stdout, _, success) = run_docsense(&config_path, &["list"]);
    assert!(success);
    assert!(stdout.contains("alpha.txt"));
    assert!(stdout.contains("indexed"));
}

#[test]
fn test_ingest_unsupported_format_fails() {
    let (tmp, config_path) = setup_test_env();
    run_docsense(&config_path, &["init"]);

    let archive = tmp.path().join("files").join("data.zip");
    fs::write(&archive, b"PK\x03\x04").unwrap();

    let (stdout, _, success) =
        run_docsense(&config_path, &["ingest", archive.to_str().unwrap()]);
    assert!(!success, "ingest of unsupported format should exit non-zero");
    assert!(stdout.contains("unsupported file format"));

    // The failed document stays visible with its reason
    let (stdout, _, _) = run_docsense(&config_path, &["list"]);
    assert!(stdout.contains("failed"));
    assert!(stdout.contains("unsupported file format"));
}

#[test]
fn test_ingest_whitespace_only_document_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_docsense(&config_path, &["init"]);

    let blank = files_dir(&config_path).join("blank.txt");
    let (stdout, _, success) =
        run_docsense(&config_path, &["ingest", blank.to_str().unwrap()]);
    assert!(!success);
    assert!(stdout.contains("degenerate input"));
}

#[test]
fn test_query_returns_grounded_answer() {
    let (_tmp, config_path) = setup_test_env();
    run_docsense(&config_path, &["init"]);

    let alpha = files_dir(&config_path).join("alpha.txt");
    let beta = files_dir(&config_path).join("beta.md");
    run_docsense(&config_path, &["ingest", alpha.to_str().unwrap()]);
    run_docsense(&config_path, &["ingest", beta.to_str().unwrap()]);

    let (stdout, stderr, success) = run_docsense(
        &config_path,
        &["query", "What happened to revenue in the third quarter?"],
    );
    assert!(success, "query failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("confidence:"));
    assert!(stdout.contains("citations:"));
    assert!(stdout.contains("excerpt:"));
}

#[test]
fn test_query_document_filter() {
    let (_tmp, config_path) = setup_test_env();
    run_docsense(&config_path, &["init"]);

    let alpha = files_dir(&config_path).join("alpha.txt");
    let beta = files_dir(&config_path).join("beta.md");
    let (stdout, _, _) = run_docsense(&config_path, &["ingest", alpha.to_str().unwrap()]);
    let alpha_id = ingested_id(&stdout);
    run_docsense(&config_path, &["ingest", beta.to_str().unwrap()]);

    // Filtered to alpha, a beta-flavored question still only cites alpha
    let (stdout, _, success) = run_docsense(
        &config_path,
        &[
            "query",
            "Kubernetes deployment pipeline",
            "--document",
            &alpha_id,
        ],
    );
    assert!(success);
    assert!(stdout.contains("alpha.txt"));
    assert!(!stdout.contains("beta.md"));
}

#[test]
fn test_query_no_documents_yields_no_evidence() {
    let (_tmp, config_path) = setup_test_env();
    run_docsense(&config_path, &["init"]);

    let (stdout, _, success) = run_docsense(&config_path, &["query", "anything?"]);
    assert!(success, "empty-corpus query should not error");
    assert!(stdout.contains("No grounded evidence"));
    assert!(stdout.contains("confidence: 0.00"));
}

#[test]
fn test_query_is_deterministic() {
    let (_tmp, config_path) = setup_test_env();
    run_docsense(&config_path, &["init"]);

    let alpha = files_dir(&config_path).join("alpha.txt");
    run_docsense(&config_path, &["ingest", alpha.to_str().unwrap()]);

    let (first, _, _) = run_docsense(&config_path, &["query", "revenue growth"]);
    let (second, _, _) = run_docsense(&config_path, &["query", "revenue growth"]);
    assert_eq!(first, second);
}

#[test]
fn test_delete_cascades_and_spares_others() {
    let (_tmp, config_path) = setup_test_env();
    run_docsense(&config_path, &["init"]);

    let alpha = files_dir(&config_path).join("alpha.txt");
    let beta = files_dir(&config_path).join("beta.md");
    let (stdout, _, _) = run_docsense(&config_path, &["ingest", alpha.to_str().unwrap()]);
    let alpha_id = ingested_id(&stdout);
    run_docsense(&config_path, &["ingest", beta.to_str().unwrap()]);

    let (stdout, _, success) = run_docsense(&config_path, &["delete", &alpha_id]);
    assert!(success, "delete failed: {}", stdout);
    assert!(stdout.contains("Deleted"));

    let (stdout, _, _) = run_docsense(&config_path, &["list"]);
    assert!(!stdout.contains("alpha.txt"));
    assert!(stdout.contains("beta.md"));

    // The index lost alpha's entries too
    let (stdout, _, success) = run_docsense(&config_path, &["check"]);
    assert!(success, "check failed after delete: {}", stdout);
    assert!(stdout.contains("consistent"));

    // Deleting again reports not found
    let (stdout, _, success) = run_docsense(&config_path, &["delete", &alpha_id]);
    assert!(!success);
    assert!(stdout.contains("not found"));
}

#[test]
fn test_check_on_fresh_database() {
    let (_tmp, config_path) = setup_test_env();
    run_docsense(&config_path, &["init"]);

    let (stdout, _, success) = run_docsense(&config_path, &["check"]);
    assert!(success);
    assert!(stdout.contains("consistent"));
}

#[test]
fn test_failed_document_leaves_no_index_entries() {
    let (_tmp, config_path) = setup_test_env();
    run_docsense(&config_path, &["init"]);

    let blank = files_dir(&config_path).join("blank.txt");
    run_docsense(&config_path, &["ingest", blank.to_str().unwrap()]);

    let (stdout, _, success) = run_docsense(&config_path, &["check"]);
    assert!(success, "check failed: {}", stdout);
    assert!(stdout.contains("consistent"));
}
