use thiserror::Error;

pub type Result<T> = std::result::Result<T, FredError>;

#[derive(Debug, Error)]
pub enum FredError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Series {0} returned no usable observations")]
    EmptySeries(String),
}

impl From<reqwest::Error> for FredError {
    fn from(err: reqwest::Error) -> Self {
        FredError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for FredError {
    fn from(err: serde_json::Error) -> Self {
        FredError::Parse(err.to_string())
    }
}
