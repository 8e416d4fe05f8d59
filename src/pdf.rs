use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use uuid::Uuid;
use walkdir::WalkDir;

/// One page of one source PDF, as produced by the loader.
///
/// Page numbers are 0-based; chunk IDs derived downstream depend on this
/// convention staying fixed.
#[derive(Debug, Clone, PartialEq)]
pub struct PageDocument {
    pub source: String,
    pub page: usize,
    pub text: String,
}

/// Loads every `*.pdf` under `dir` into per-page documents.
///
/// A file that cannot be parsed by either extraction backend is logged and
/// skipped; loading continues with the remaining documents. Returns an empty
/// vector for an empty or PDF-free directory.
pub async fn load_directory(dir: &Path) -> Result<Vec<PageDocument>> {
    let mut documents = Vec::new();

    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("pdf") {
            continue;
        }
        let Some(filename) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };

        match tokio::fs::read(path).await {
            Ok(data) => {
                tracing::info!("Loading document: {}", filename);
                match extract_pages(filename, data).await {
                    Ok(pages) => {
                        tracing::info!("Extracted {} pages from {}", pages.len(), filename);
                        documents.extend(pages);
                    }
                    Err(e) => {
                        tracing::error!("Skipping {}: {}", filename, e);
                    }
                }
            }
            Err(e) => {
                tracing::error!("Failed to read {}: {}", filename, e);
            }
        }
    }

    if documents.is_empty() {
        tracing::warn!("No readable PDF pages found under {:?}", dir);
    }

    Ok(documents)
}

/// Extracts per-page text from one PDF using spawn_blocking, so parsing
/// never stalls the async executor.
///
/// Two-stage fallback: pure-Rust extraction (lopdf) first, then the
/// pdftotext binary if lopdf fails.
async fn extract_pages(filename: &str, data: Vec<u8>) -> Result<Vec<PageDocument>> {
    let source = filename.to_string();
    let data_for_fallback = data.clone();

    let lopdf_result = {
        let source = source.clone();
        tokio::task::spawn_blocking(move || lopdf_extract_sync(&source, &data))
            .await
            .context("lopdf extraction task failed")?
    };

    match lopdf_result {
        Ok(pages) => Ok(pages),
        Err(lopdf_err) => {
            tracing::warn!(
                error = %lopdf_err,
                "Pure-Rust PDF extraction failed, falling back to pdftotext"
            );

            let pdftotext_result = {
                let source = source.clone();
                tokio::task::spawn_blocking(move || {
                    pdftotext_extract_sync(&source, &data_for_fallback)
                })
                .await
                .context("pdftotext extraction task failed")?
            };

            pdftotext_result.map_err(|pdftotext_err| {
                anyhow::anyhow!(
                    "PDF extraction failed: lopdf error: {}, pdftotext error: {}",
                    lopdf_err,
                    pdftotext_err
                )
            })
        }
    }
}

/// Pure-Rust per-page extraction using lopdf.
///
/// lopdf reports 1-based page numbers; they are shifted to the 0-based
/// convention here and nowhere else.
fn lopdf_extract_sync(source: &str, data: &[u8]) -> Result<Vec<PageDocument>> {
    use lopdf::Document;

    let doc = Document::load_mem(data)
        .map_err(|e| anyhow::anyhow!("lopdf failed to parse PDF: {}", e))?;

    let mut pages = Vec::new();
    for (page_num, _page_id) in doc.get_pages() {
        match doc.extract_text(&[page_num]) {
            Ok(page_text) => {
                if page_text.trim().is_empty() {
                    continue;
                }
                pages.push(PageDocument {
                    source: source.to_string(),
                    page: (page_num as usize).saturating_sub(1),
                    text: page_text,
                });
            }
            Err(e) => {
                tracing::debug!("lopdf: failed to extract text from page {}: {}", page_num, e);
            }
        }
    }

    if pages.is_empty() {
        return Err(anyhow::anyhow!("lopdf extracted no text from PDF"));
    }

    Ok(pages)
}

/// Fallback extraction via the pdftotext binary.
///
/// pdftotext separates pages with form feeds; splitting on them preserves
/// the 0-based page attribution.
fn pdftotext_extract_sync(source: &str, data: &[u8]) -> Result<Vec<PageDocument>> {
    use std::process::Command;

    // UUID temp name so concurrent extractions cannot collide
    let temp_file: PathBuf =
        std::env::temp_dir().join(format!("temp_pdf_{}.pdf", Uuid::new_v4()));

    std::fs::write(&temp_file, data)
        .map_err(|e| anyhow::anyhow!("Failed to write temp PDF: {}", e))?;

    let output = Command::new("pdftotext")
        .arg("-layout")
        .arg("-enc")
        .arg("UTF-8")
        .arg(&temp_file)
        .arg("-")
        .output();
    let _ = std::fs::remove_file(&temp_file);

    match output {
        Ok(output) if output.status.success() => {
            let text = String::from_utf8_lossy(&output.stdout).to_string();
            let pages: Vec<PageDocument> = text
                .split('\u{0c}')
                .enumerate()
                .filter(|(_, page_text)| !page_text.trim().is_empty())
                .map(|(page, page_text)| PageDocument {
                    source: source.to_string(),
                    page,
                    text: page_text.to_string(),
                })
                .collect();

            if pages.is_empty() {
                Err(anyhow::anyhow!("pdftotext produced no text output"))
            } else {
                Ok(pages)
            }
        }
        Ok(output) => {
            let error_msg = String::from_utf8_lossy(&output.stderr);
            Err(anyhow::anyhow!("pdftotext failed: {}", error_msg))
        }
        Err(e) => Err(anyhow::anyhow!(
            "pdftotext command failed: {} (is poppler installed?)",
            e
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_directory_yields_no_documents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let documents = load_directory(dir.path()).await.expect("load");
        assert!(documents.is_empty());
    }

    #[tokio::test]
    async fn unparseable_pdf_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("broken.pdf"), b"not a pdf at all").expect("write");
        let documents = load_directory(dir.path()).await.expect("load");
        assert!(documents.is_empty());
    }

    #[tokio::test]
    async fn non_pdf_files_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("notes.txt"), b"plain text").expect("write");
        let documents = load_directory(dir.path()).await.expect("load");
        assert!(documents.is_empty());
    }
}
