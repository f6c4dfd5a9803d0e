use std::time::Duration;

use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum BackendError {
    #[error("invalid media id '{0}'")]
    InvalidId(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("server responded {status}: {errcode} ({message})")]
    Server {
        status: u16,
        errcode: String,
        message: String,
    },

    #[error("request was dropped before completing")]
    Dropped,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("no backend configured")]
    Unconfigured,

    #[error("empty image id")]
    InvalidId,

    #[error("dispatch failed: {0}")]
    Dispatch(#[source] BackendError),

    #[error("fetch failed: {0}")]
    Backend(#[source] BackendError),

    #[error("cannot decode thumbnail: {0}")]
    Decode(String),

    #[error("no response within {0:.2?}")]
    Timeout(Duration),
}

impl From<::image::ImageError> for BridgeError {
    fn from(err: ::image::ImageError) -> Self {
        Self::Decode(err.to_string())
    }
}
