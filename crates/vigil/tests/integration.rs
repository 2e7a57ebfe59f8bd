use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn vigil_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("vigil");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    // Sample sources
    let src_dir = root.join("src");
    fs::create_dir_all(&src_dir).unwrap();
    fs::write(
        src_dir.join("db.js"),
        "const id = req.params.id;\nconst q = \"SELECT * FROM users WHERE id = \" + id;\ndb.query(q);\n",
    )
    .unwrap();
    fs::write(
        src_dir.join("view.js"),
        "function show(userInput) {\n  element.innerHTML = userInput;\n}\n",
    )
    .unwrap();
    fs::write(
        src_dir.join("settings.py"),
        "API_KEY = \"sk-live-1234567890\"\nDEBUG = False\n",
    )
    .unwrap();
    fs::write(
        src_dir.join("clean.py"),
        "import os\n\nAPI_KEY = os.environ.get(\"API_KEY\")\n\ndef add(a, b):\n    return a + b\n",
    )
    .unwrap();

    // The current provider needs a key that is never set, so LLM
    // commands fail without touching the network.
    let config_content = format!(
        r#"[llm]
provider = "offline"
timeout_secs = 5
max_retries = 0

[[llm.custom_providers]]
id = "offline"
display_name = "Offline"
base_url = "http://127.0.0.1:9/v1"
model_name = "none"
api_key_env = "VIGIL_TEST_UNSET_KEY"

[knowledge]
corpus_path = "{}/data/kb.json"

[completion]
debounce_ms = 10
"#,
        root.display()
    );

    let config_path = config_dir.join("vigil.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_vigil(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = vigil_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("VIGIL_TEST_UNSET_KEY")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run vigil binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn root_of(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().to_path_buf()
}

#[test]
fn test_scan_reports_rule_findings() {
    let (_tmp, config_path) = setup_test_env();
    let src = root_of(&config_path).join("src");

    let (stdout, stderr, success) = run_vigil(&config_path, &["scan", src.to_str().unwrap()]);
    assert!(success, "scan failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("sql-injection"));
    assert!(stdout.contains("xss"));
    assert!(stdout.contains("sensitive-data"));
    assert!(stdout.contains("Scanned 4 files"));
    assert!(stdout.contains("overall score"));
    assert!(!stdout.contains("clean.py"));
}

#[test]
fn test_scan_json_report() {
    let (_tmp, config_path) = setup_test_env();
    let src = root_of(&config_path).join("src");

    let (stdout, stderr, success) =
        run_vigil(&config_path, &["scan", src.to_str().unwrap(), "--json"]);
    assert!(success, "scan failed: stderr={}", stderr);

    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let files = report["files"].as_array().unwrap();
    assert_eq!(files.len(), 4);
    assert!(report["total_findings"].as_u64().unwrap() >= 3);
    assert!(report["overall_score"].as_u64().unwrap() < 100);

    let clean = files.iter().find(|f| f["path"] == "clean.py").unwrap();
    assert_eq!(clean["score"], 100);
    assert_eq!(clean["level"], "safe");
}

#[test]
fn test_scan_clean_file_scores_100() {
    let (_tmp, config_path) = setup_test_env();
    let clean = root_of(&config_path).join("src/clean.py");

    let (stdout, _, success) = run_vigil(&config_path, &["scan", clean.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("Scanned 1 files: 0 findings, overall score 100 (safe)"));
}

#[test]
fn test_scan_missing_path_fails() {
    let (_tmp, config_path) = setup_test_env();
    let missing = root_of(&config_path).join("nope");

    let (_, stderr, success) = run_vigil(&config_path, &["scan", missing.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("does not exist"));
}

#[test]
fn test_deep_scan_without_provider_stays_rule_only() {
    let (_tmp, config_path) = setup_test_env();
    let src = root_of(&config_path).join("src");

    let (stdout, stderr, success) =
        run_vigil(&config_path, &["scan", src.to_str().unwrap(), "--deep"]);
    assert!(success, "deep scan failed: stderr={}", stderr);
    assert!(stderr.contains("Deep scan unavailable"));
    assert!(stdout.contains("sql-injection"));
}

#[test]
fn test_search_ranks_matching_topic_first() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_vigil(&config_path, &["search", "sql injection risk"]);
    assert!(success, "search failed: stderr={}", stderr);
    let first = stdout.lines().next().unwrap_or_default();
    assert!(first.contains("sql-injection"), "unexpected first line: {}", first);
}

#[test]
fn test_search_limit() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) =
        run_vigil(&config_path, &["search", "xss html", "--limit", "2"]);
    assert!(success);
    assert!(stdout.contains("1. "));
    assert!(stdout.contains("2. "));
    assert!(!stdout.contains("3. "));
}

#[test]
fn test_knowledge_export_default_corpus() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_vigil(&config_path, &["knowledge", "export"]);
    assert!(success, "export failed: stderr={}", stderr);
    let docs: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(docs.as_array().unwrap().len(), 10);
}

#[test]
fn test_knowledge_import_and_list() {
    let (_tmp, config_path) = setup_test_env();
    let extra = root_of(&config_path).join("extra.json");
    fs::write(
        &extra,
        r#"[{"pageContent": "Validate redirect targets against an allow-list.", "metadata": {"category": "open-redirect", "severity": "low", "id": "kb-open-redirect", "tags": ["redirect"]}}]"#,
    )
    .unwrap();

    let (stdout, stderr, success) =
        run_vigil(&config_path, &["knowledge", "import", extra.to_str().unwrap()]);
    assert!(success, "import failed: stderr={}", stderr);
    assert!(stdout.contains("11 total"));

    let (stdout, _, success) = run_vigil(&config_path, &["knowledge", "list", "--tag", "redirect"]);
    assert!(success);
    assert!(stdout.contains("kb-open-redirect"));
    assert!(stdout.contains("1 documents"));

    let (stdout, _, success) =
        run_vigil(&config_path, &["knowledge", "list", "--severity", "high"]);
    assert!(success);
    assert!(stdout.contains("kb-sql-injection"));
    assert!(!stdout.contains("kb-open-redirect"));
}

#[test]
fn test_knowledge_list_rejects_bad_severity() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) =
        run_vigil(&config_path, &["knowledge", "list", "--severity", "extreme"]);
    assert!(!success);
    assert!(stderr.contains("Unknown severity"));
}

#[test]
fn test_providers_list_and_use() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_vigil(&config_path, &["providers", "list"]);
    assert!(success);
    assert!(stdout.contains("* offline"));
    assert!(stdout.contains("VIGIL_TEST_UNSET_KEY missing"));
    assert!(stdout.contains("ollama"));

    let (stdout, stderr, success) = run_vigil(&config_path, &["providers", "use", "ollama"]);
    assert!(success, "use failed: stderr={}", stderr);
    assert!(stdout.contains("Current provider: ollama"));

    let (stdout, _, _) = run_vigil(&config_path, &["providers", "list"]);
    assert!(stdout.contains("* ollama"));
    // The custom provider survives the rewrite.
    assert!(stdout.contains("offline"));
}

#[test]
fn test_providers_use_unknown_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_vigil(&config_path, &["providers", "use", "nope"]);
    assert!(!success);
    assert!(stderr.contains("unknown model provider: nope"));
}

#[test]
fn test_providers_add_persists() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_vigil(
        &config_path,
        &[
            "providers",
            "add",
            "lab",
            "--base-url",
            "http://127.0.0.1:9",
            "--model",
            "qwen",
            "--embedding-model",
            "nomic-embed-text",
            "--ollama",
        ],
    );
    assert!(success, "add failed: stderr={}", stderr);

    let saved = fs::read_to_string(&config_path).unwrap();
    assert!(saved.contains("id = \"lab\""));
    assert!(saved.contains("kind = \"ollama\""));

    let (stdout, _, _) = run_vigil(&config_path, &["providers", "list"]);
    assert!(stdout.contains("embeddings=nomic-embed-text"));
}

#[test]
fn test_advise_requires_initialized_service() {
    let (_tmp, config_path) = setup_test_env();
    let file = root_of(&config_path).join("src/db.js");

    let (_, stderr, success) = run_vigil(&config_path, &["advise", file.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("VIGIL_TEST_UNSET_KEY"));
    assert!(stderr.contains("service not initialized"));
}

#[test]
fn test_complete_requires_initialized_service() {
    let (_tmp, config_path) = setup_test_env();
    let file = root_of(&config_path).join("src/db.js");

    let (_, stderr, success) = run_vigil(
        &config_path,
        &["complete", file.to_str().unwrap(), "--line", "3", "--character", "4"],
    );
    assert!(!success);
    assert!(stderr.contains("service not initialized"));
}

#[test]
fn test_missing_config_uses_defaults() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("absent.toml");
    let file = tmp.path().join("a.js");
    fs::write(&file, "el.innerHTML = data;\n").unwrap();

    let (stdout, stderr, success) = run_vigil(&config_path, &["scan", file.to_str().unwrap()]);
    assert!(success, "scan failed: stderr={}", stderr);
    assert!(stdout.contains("xss"));
}
