//! Chat history export.
//!
//! Flattens the history to `(Role, Content, Time)` rows and writes them as
//! CSV. User turns carry no time. This is a read-only projection of the
//! session.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;

use crate::models::ChatTurn;

#[derive(Serialize)]
struct HistoryRow<'a> {
    #[serde(rename = "Role")]
    role: &'a str,
    #[serde(rename = "Content")]
    content: &'a str,
    #[serde(rename = "Time")]
    time: &'a str,
}

/// `chat_history_YYYYMMDD_HHMMSS.csv` for the given instant.
pub fn export_file_name(at: DateTime<Local>) -> String {
    format!("chat_history_{}.csv", at.format("%Y%m%d_%H%M%S"))
}

/// Write `history` as CSV to any writer.
pub fn write_history<W: Write>(history: &[ChatTurn], writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for turn in history {
        csv.serialize(HistoryRow {
            role: turn.role.as_str(),
            content: &turn.content,
            time: turn.metadata.as_ref().map(|m| m.time.as_str()).unwrap_or(""),
        })?;
    }
    csv.flush()?;
    Ok(())
}

/// Export `history` into `dir` under a timestamped name.
///
/// Returns the path written.
pub fn export_history(history: &[ChatTurn], dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(export_file_name(Local::now()));
    let file = std::fs::File::create(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_history(history, file)?;
    tracing::info!(path = %path.display(), turns = history.len(), "exported chat history");
    Ok(path)
}
