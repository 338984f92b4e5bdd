use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("config file not found: {0}")]
    ConfigNotFound(std::path::PathBuf),

    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
