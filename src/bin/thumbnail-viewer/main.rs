use std::sync::Arc;

use thumbnail_bridge::{
    config::{Config, MatrixConfig},
    viewer::Viewer,
    MatrixMedia, ThumbnailBridge,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    simple_env_load::load_env_from([".dev.env", ".secrets.env"]);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("thumbnail_bridge=info")),
        )
        .init();

    let config = Config::load(Config::FILE_NAME)?;
    let http = thumbnail_bridge::default_http_client();

    let bridge = ThumbnailBridge::new(tokio::runtime::Handle::current(), config.bridge.clone());
    let matrix = MatrixConfig::from_env()?;
    match matrix.clone() {
        Some(MatrixConfig {
            homeserver,
            access_token,
        }) => {
            tracing::info!(%homeserver, "using homeserver");
            let media = MatrixMedia::new(http.clone(), homeserver, access_token);
            bridge.set_backend(Some(Arc::new(media)));
        }
        None => tracing::warn!(
            "'{}' is not set, thumbnails are unavailable until a homeserver is connected",
            MatrixConfig::HOMESERVER
        ),
    }

    let bridge = Arc::new(bridge);
    eframe::run_native(
        "thumbnail viewer",
        eframe::NativeOptions::default(),
        Box::new(move |cc| Viewer::create(cc, bridge, http, &config.viewer, matrix)),
    )
    .map_err(|err| anyhow::anyhow!("cannot run viewer: {err}"))
}
