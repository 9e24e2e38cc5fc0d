use thiserror::Error;

/// Errors surfaced anywhere between the Hue bridge and the metrics endpoint.
#[derive(Error, Debug)]
pub enum ApiError {
    /* mapped errors */
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),

    #[error(transparent)]
    UrlError(#[from] url::ParseError),

    #[error(transparent)]
    ConfigError(#[from] config::ConfigError),

    #[error(transparent)]
    PrometheusError(#[from] prometheus::Error),

    #[error(transparent)]
    SetLoggerError(#[from] log::SetLoggerError),

    /* bridge errors */
    #[error("No Hue bridge found by discovery")]
    NoBridgeFound,

    #[error("Bridge username not configured (run `huewatch create-user` first)")]
    MissingUsername,

    #[error("Link button not pressed on bridge at [{0}]")]
    LinkButtonNotPressed(String),

    #[error("Hue API error {error_type} at {address}: {description}")]
    HueApiError {
        error_type: u32,
        address: String,
        description: String,
    },

    #[error("Unexpected Hue API reply: {0}")]
    UnexpectedReply(String),

    #[error("Bridge request failed: {0}")]
    BridgeError(String),
}

impl ApiError {
    #[must_use]
    pub fn bridge_error(msg: impl AsRef<str>) -> Self {
        Self::BridgeError(msg.as_ref().to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
