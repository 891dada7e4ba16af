//! Error taxonomy for the document chat pipeline.
//!
//! Every failure is scoped to the operation that raised it: extraction
//! errors are recovered per file, chain errors per turn, summary errors
//! per upload. Nothing here is fatal to the session.

use thiserror::Error;

/// Errors surfaced by the ingestion, retrieval, and generation stages.
#[derive(Debug, Error)]
pub enum RagError {
    /// A single uploaded file could not be opened or parsed.
    #[error("failed to read {file}: {message}")]
    Extraction { file: String, message: String },

    /// The upload batch was empty.
    #[error("no files uploaded")]
    NoFiles,

    /// Nothing survived extraction and chunking.
    #[error("no readable text found in the uploaded PDFs; ensure they are not scanned images or empty")]
    EmptyCorpus,

    /// Unsupported provider, model, backend, or invalid tuning values.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The selected provider needs an API key and none was supplied.
    #[error("missing API key for {provider}; pass --api-key or set {env_var}")]
    MissingApiKey { provider: String, env_var: String },

    /// A corpus embedded with one provider was queried with another.
    #[error("corpus was embedded with '{expected}' but queried with '{found}'")]
    ProviderMismatch { expected: String, found: String },

    /// Vector index build, load, or query failure.
    #[error("index error: {0}")]
    Index(String),

    /// Retrieval or generation failed for a single turn.
    #[error("chain error: {0}")]
    Chain(String),

    /// The executive snapshot could not be generated.
    #[error("summary unavailable: {0}")]
    Summary(String),
}

/// Convenience alias for results carrying a [`RagError`].
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_user_facing() {
        assert_eq!(RagError::NoFiles.to_string(), "no files uploaded");
        assert!(RagError::EmptyCorpus
            .to_string()
            .starts_with("no readable text found"));
        let err = RagError::MissingApiKey {
            provider: "Gemini".into(),
            env_var: "GOOGLE_API_KEY".into(),
        };
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
    }
}
