use thiserror::Error;

#[derive(Error, Debug)]
pub enum JoytaskError {
    #[error("config error: {0}")]
    Config(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("remote store error: {0}")]
    Remote(String),

    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error("task {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, JoytaskError>;
