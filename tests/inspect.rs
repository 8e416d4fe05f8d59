//! Integration test for the inspect command
//!
//! Inspecting without a raw query touches only the persisted index, so it
//! must work with no Ollama backend available.

use std::process::Command;

#[test]
fn inspect_on_fresh_index_reports_zero_chunks() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");

    let output = Command::new(env!("CARGO_BIN_EXE_legis-rag"))
        .env("OLLAMA_URL", "http://127.0.0.1:59999")
        .env("DATA_DIR", temp_dir.path().join("data"))
        .env("DOCUMENTS_DIR", temp_dir.path().join("docs"))
        .arg("inspect")
        .output()
        .expect("Failed to spawn process");

    assert!(
        output.status.success(),
        "inspect should succeed on an empty index, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Chunks in index: 0"), "stdout was: {stdout}");
}
