//! Integration tests for process exit codes
//!
//! These tests verify that the CLI exits non-zero when a required
//! collaborator (Ollama) is unreachable.

use std::process::Command;

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_legis-rag")
}

/// Query must fail fast with a non-zero exit code when Ollama is down.
#[test]
fn query_exits_nonzero_when_ollama_unreachable() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");

    let output = Command::new(bin())
        // A port that's very unlikely to be in use
        .env("OLLAMA_URL", "http://127.0.0.1:59999")
        .env("DATA_DIR", temp_dir.path().join("data"))
        .env("DOCUMENTS_DIR", temp_dir.path().join("docs"))
        .arg("query")
        .arg("que dice el articulo 5")
        .output()
        .expect("Failed to spawn process");

    assert!(
        !output.status.success(),
        "Expected non-zero exit code when Ollama unreachable, got: {:?}",
        output.status.code()
    );
}

/// Ingestion verifies the embedding backend before touching documents,
/// so an unreachable Ollama is fatal there too.
#[test]
fn ingest_exits_nonzero_when_ollama_unreachable() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let docs_dir = temp_dir.path().join("docs");
    std::fs::create_dir_all(&docs_dir).expect("Failed to create docs dir");

    let output = Command::new(bin())
        .env("OLLAMA_URL", "http://127.0.0.1:59999")
        .env("DATA_DIR", temp_dir.path().join("data"))
        .env("DOCUMENTS_DIR", &docs_dir)
        .arg("ingest")
        .output()
        .expect("Failed to spawn process");

    assert!(
        !output.status.success(),
        "Expected non-zero exit code when Ollama unreachable, got: {:?}",
        output.status.code()
    );
}

#[test]
fn binary_exists_and_prints_help() {
    let output = Command::new(bin())
        .arg("--help")
        .output()
        .expect("Failed to spawn process");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ingest"));
    assert!(stdout.contains("query"));
    assert!(stdout.contains("inspect"));
}
