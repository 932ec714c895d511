use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Fatal failure kinds (spec §7). `EmptyInput` is deliberately absent:
/// per spec it is reported and yields an empty finding list rather than
/// aborting the run. Non-fatal per-entity skips are also not represented
/// here — they surface as [`crate::models::finding::SkipReason`] entries
/// in the run envelope instead.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("malformed OTEL payload: {0}")]
    MalformedInput(String),
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
