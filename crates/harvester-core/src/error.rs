use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    FileParse(#[source] serde_yaml::Error),

    #[error("invalid value for env var {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("invalid config value {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("missing credential {0}")]
    MissingCredential(&'static str),
}
