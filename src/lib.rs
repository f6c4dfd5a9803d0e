mod backend;
pub use backend::{FetchResult, Fut, MatrixMedia, MediaId, ThumbnailBackend};

mod bridge;
pub use bridge::{ImageProvider, ThumbnailBridge};

pub mod config;
pub use config::BridgeConfig;

mod error;
pub use error::{BackendError, BridgeError};

mod size;
pub use size::Size;

mod thumbnail;
pub use thumbnail::Thumbnail;

pub mod viewer;

pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

pub fn default_http_client() -> reqwest::Client {
    use reqwest::header::{HeaderValue, USER_AGENT as USER_AGENT_HEADER};
    reqwest::ClientBuilder::new()
        .default_headers(
            std::iter::once((USER_AGENT_HEADER, HeaderValue::from_static(USER_AGENT))).collect(),
        )
        .build()
        .expect("valid client configuration")
}
