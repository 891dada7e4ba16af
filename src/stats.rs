//! Workspace and session statistics.
//!
//! Summarizes what is indexed (files, chunks, per-source breakdown, backend,
//! on-disk size) and how the session has performed (analytics counters and
//! the latency series). Used by `pdfchat stats` and the `/stats` chat command.

use std::fmt::Write as _;
use std::path::PathBuf;

use crate::analytics::latency_series;
use crate::provider::Backend;
use crate::session::{SessionState, WorkspaceMode};

/// Per-source chunk count.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStats {
    pub source: String,
    pub chunk_count: usize,
    pub in_active_batch: bool,
}

/// Snapshot of the session's corpus.
#[derive(Debug, Clone)]
pub struct WorkspaceStats {
    pub backend: Backend,
    pub embedder_id: String,
    pub mode: WorkspaceMode,
    pub total_chunks: usize,
    pub batches: u32,
    pub sources: Vec<SourceStats>,
    pub location: Option<PathBuf>,
    pub size_bytes: Option<u64>,
}

impl WorkspaceStats {
    /// `None` when the session has no corpus.
    pub fn collect(session: &SessionState) -> Option<Self> {
        let corpus = session.corpus()?;
        let active = session.active_files();
        let counts = corpus.chunks_per_source();

        let sources = corpus
            .sources()
            .into_iter()
            .map(|source| SourceStats {
                chunk_count: counts.get(&source).copied().unwrap_or(0),
                in_active_batch: active.contains(&source),
                source,
            })
            .collect();

        let location = corpus.location().map(|p| p.to_path_buf());
        let size_bytes = location
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len());

        Some(Self {
            backend: corpus.backend(),
            embedder_id: corpus.embedder_id().to_string(),
            mode: session.workspace_mode(),
            total_chunks: corpus.len(),
            batches: corpus.next_batch(),
            sources,
            location,
            size_bytes,
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Workspace Insights");
        let _ = writeln!(out, "==================");
        let _ = writeln!(out);
        let _ = writeln!(out, "  Backend:     {}", self.backend);
        let _ = writeln!(out, "  Embeddings:  {}", self.embedder_id);
        let _ = writeln!(out, "  Mode:        {}", self.mode);
        if let Some(path) = &self.location {
            let _ = writeln!(out, "  Location:    {}", path.display());
        }
        if let Some(size) = self.size_bytes {
            let _ = writeln!(out, "  Size:        {}", format_bytes(size));
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "  Files:       {}", self.sources.len());
        let _ = writeln!(out, "  Chunks:      {}", self.total_chunks);
        let _ = writeln!(out, "  Uploads:     {}", self.batches);

        if !self.sources.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "  {:<40} {:>8}   {}", "FILE", "CHUNKS", "ACTIVE");
            let _ = writeln!(out, "  {}", "-".repeat(58));
            for s in &self.sources {
                let _ = writeln!(
                    out,
                    "  {:<40} {:>8}   {}",
                    s.source,
                    s.chunk_count,
                    if s.in_active_batch { "yes" } else { "" }
                );
            }
        }
        out
    }
}

/// Analytics counters plus the per-turn latency series.
pub fn render_analytics(session: &SessionState) -> String {
    let analytics = session.analytics();
    let mut out = String::new();
    let _ = writeln!(out, "Performance Analytics");
    let _ = writeln!(out, "=====================");
    let _ = writeln!(out);
    let _ = writeln!(out, "  Avg latency:   {:.2}s", analytics.avg_latency);
    let _ = writeln!(out, "  Queries:       {}", analytics.total_queries);
    let _ = writeln!(out, "  Tokens (est):  {}", analytics.total_tokens);
    let _ = writeln!(out, "  Success rate:  {:.1}%", analytics.success_rate);

    let series = latency_series(session.history());
    if !series.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "  Latency per turn:");
        let max = series.iter().cloned().fold(f64::EPSILON, f64::max);
        for (i, latency) in series.iter().enumerate() {
            let width = ((latency / max) * 30.0).round() as usize;
            let _ = writeln!(out, "  {:>3}  {:>7.2}s  {}", i + 1, latency, "#".repeat(width.max(1)));
        }
    }
    out
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexedCorpus;
    use crate::models::Chunk;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn empty_session_has_no_stats() {
        assert!(WorkspaceStats::collect(&SessionState::new()).is_none());
    }

    #[test]
    fn counts_chunks_per_source_and_marks_active() {
        let chunk = |source: &str| Chunk {
            text: "x".into(),
            source: source.into(),
            page: 1,
        };
        let mut corpus = IndexedCorpus::new("test", Backend::Ephemeral);
        corpus
            .append_batch(vec![chunk("a.pdf"), chunk("a.pdf")], vec![vec![1.0], vec![1.0]])
            .unwrap();
        corpus
            .append_batch(vec![chunk("b.pdf")], vec![vec![1.0]])
            .unwrap();
        let mut session = SessionState::new();
        session.set_corpus(corpus);

        let stats = WorkspaceStats::collect(&session).unwrap();
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.batches, 2);
        assert_eq!(
            stats.sources,
            vec![
                SourceStats {
                    source: "a.pdf".into(),
                    chunk_count: 2,
                    in_active_batch: false
                },
                SourceStats {
                    source: "b.pdf".into(),
                    chunk_count: 1,
                    in_active_batch: true
                },
            ]
        );
        assert!(stats.size_bytes.is_none());
        assert!(stats.render().contains("b.pdf"));
    }
}
