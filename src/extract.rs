//! PDF text extraction into page-level records.
//!
//! Each uploaded file is handled independently: a file that fails to parse is
//! reported as a per-file failure and logged, and the rest of the batch still
//! runs. Pages whose text is empty or whitespace-only are dropped, which is how
//! scanned image pages fall out of the corpus.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::error::RagError;
use crate::models::TextRecord;

/// An uploaded file: display name plus raw bytes.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read a file from disk, using its file name as the display name.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Self {
            name: display_name(path),
            bytes,
        })
    }
}

/// Outcome of extracting one file.
#[derive(Debug)]
pub enum FileOutcome {
    /// Parsed; `pages` counts the non-empty pages emitted.
    Extracted { name: String, pages: usize },
    Failed(RagError),
}

/// Records from a whole batch plus what happened to each file.
#[derive(Debug, Default)]
pub struct Extraction {
    pub records: Vec<TextRecord>,
    pub outcomes: Vec<FileOutcome>,
}

impl Extraction {
    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, FileOutcome::Failed(_)))
            .count()
    }

    fn push_file(&mut self, file: &UploadedFile) {
        match read_pdf_pages(file) {
            Ok(pages) => {
                let records = records_from_pages(&file.name, pages);
                tracing::info!(file = %file.name, pages = records.len(), "extracted pages");
                self.outcomes.push(FileOutcome::Extracted {
                    name: file.name.clone(),
                    pages: records.len(),
                });
                self.records.extend(records);
            }
            Err(err) => self.push_failure(err),
        }
    }

    fn push_failure(&mut self, err: RagError) {
        tracing::error!(error = %err, "skipping unreadable file");
        self.outcomes.push(FileOutcome::Failed(err));
    }
}

/// Extract page records from every file, preserving file and page order.
pub fn extract_documents(files: &[UploadedFile]) -> Extraction {
    let mut extraction = Extraction::default();
    for file in files {
        extraction.push_file(file);
    }
    extraction
}

/// Read and extract files from disk in order.
///
/// A path that cannot be opened is a per-file failure like a PDF that
/// cannot be parsed; the remaining paths still run.
pub fn extract_paths(paths: &[PathBuf]) -> Extraction {
    let mut extraction = Extraction::default();
    for path in paths {
        match UploadedFile::from_path(path) {
            Ok(file) => extraction.push_file(&file),
            Err(e) => extraction.push_failure(RagError::Extraction {
                file: display_name(path),
                message: e.root_cause().to_string(),
            }),
        }
    }
    extraction
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Turn raw per-page text into records, dropping blank pages.
///
/// Page numbers are 1-based positions in the file, so a dropped page leaves
/// a gap rather than renumbering the pages after it.
pub fn records_from_pages(source: &str, pages: Vec<String>) -> Vec<TextRecord> {
    pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| TextRecord {
            text,
            source: source.to_string(),
            page: (i + 1) as u32,
        })
        .collect()
}

fn read_pdf_pages(file: &UploadedFile) -> Result<Vec<String>, RagError> {
    let bytes = file.bytes.as_slice();
    // pdf-extract panics on some malformed inputs instead of returning an error.
    let parsed = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes));
    match parsed {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(RagError::Extraction {
            file: file.name.clone(),
            message: e.to_string(),
        }),
        Err(_) => Err(RagError::Extraction {
            file: file.name.clone(),
            message: "PDF parser aborted on malformed input".to_string(),
        }),
    }
}
