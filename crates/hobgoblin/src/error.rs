use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("runtime error: {0}")]
    Runtime(#[from] hobgoblin_runtime::RuntimeError),
    #[error("network error: {0}")]
    Net(#[from] hobgoblin_net::NetError),
    #[error("config error: {0}")]
    Config(#[from] hobgoblin_config::ConfigError),
    #[error("logging error: {0}")]
    Logging(#[from] hobgoblin_config::LoggingError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
