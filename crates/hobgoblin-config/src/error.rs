use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[source] serdeconv::Error),
    #[error("failed to serialize configuration: {0}")]
    Save(#[source] serdeconv::Error),
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to parse logger configuration: {0}")]
    Parse(#[source] serdeconv::Error),
    #[error("failed to build logger: {0}")]
    Build(#[source] sloggers::Error),
}
