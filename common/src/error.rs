use thiserror::Error;

/// Configuration problems are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("validator {index}: pubkey is required")]
    MissingPubkey { index: usize },
    #[error("validator {index}: duplicate pubkey {pubkey}")]
    DuplicatePubkey { index: usize, pubkey: String },
    #[error("batchSize must be greater than zero")]
    InvalidBatchSize,
    #[error("maxRequestsPerMinute must be greater than zero")]
    InvalidRateLimit,
    #[error("checkIntervalSecs must be greater than zero")]
    InvalidCheckInterval,
}
