use std::sync::Arc;

use url::Url;

use super::{FetchResult, Fut, ThumbnailBackend};
use crate::BackendError;

// mxc://<server-name>/<media-id>
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaId {
    pub server: String,
    pub media: String,
}

impl MediaId {
    pub fn parse(id: &str) -> Result<Self, BackendError> {
        let invalid = || BackendError::InvalidId(id.to_string());

        let url = Url::parse(id).map_err(|_| invalid())?;
        if url.scheme() != "mxc" || url.query().is_some() || url.fragment().is_some() {
            return Err(invalid());
        }

        let host = url.host_str().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let server = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let media = url.path().strip_prefix('/').unwrap_or(url.path());
        if media.is_empty() || media.contains('/') {
            return Err(invalid());
        }

        Ok(Self {
            server,
            media: media.to_string(),
        })
    }
}

impl std::fmt::Display for MediaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mxc://{}/{}", self.server, self.media)
    }
}

#[derive(Clone)]
pub struct MatrixMedia {
    client: reqwest::Client,
    homeserver: Url,
    access_token: Option<Arc<str>>,
}

impl MatrixMedia {
    pub fn new(client: reqwest::Client, homeserver: Url, access_token: Option<String>) -> Self {
        Self {
            client,
            homeserver,
            access_token: access_token.map(Arc::from),
        }
    }

    pub const fn homeserver(&self) -> &Url {
        &self.homeserver
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn thumbnail_url(&self, id: &MediaId, width: u32, height: u32) -> Result<Url, BackendError> {
        let mut url = self.homeserver.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::Http(format!("'{}' is not a base url", self.homeserver)))?
            .pop_if_empty()
            .extend(["_matrix", "media", "v3", "thumbnail", id.server.as_str(), id.media.as_str()]);

        url.query_pairs_mut()
            .append_pair("width", &width.to_string())
            .append_pair("height", &height.to_string())
            .append_pair("method", "scale");

        Ok(url)
    }

    async fn get_thumbnail(
        client: reqwest::Client,
        url: Url,
        access_token: Option<Arc<str>>,
    ) -> FetchResult {
        let mut req = client.get(url.clone());
        if let Some(token) = &access_token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|err| BackendError::Http(format!("request failed: {err}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.bytes().await.unwrap_or_default();
            return Err(Self::server_error(status.as_u16(), &body));
        }

        let data = resp
            .bytes()
            .await
            .map_err(|err| BackendError::Http(format!("failed to read response: {err}")))?;

        tracing::debug!(%url, bytes = data.len(), "got thumbnail");
        Ok(data.to_vec())
    }

    fn server_error(status: u16, body: &[u8]) -> BackendError {
        #[derive(serde::Deserialize)]
        struct MatrixError {
            errcode: String,
            #[serde(default)]
            error: String,
        }

        let (errcode, message) = match serde_json::from_slice::<MatrixError>(body) {
            Ok(MatrixError { errcode, error }) => (errcode, error),
            Err(..) => (
                "M_UNKNOWN".to_string(),
                String::from_utf8_lossy(body).trim().to_string(),
            ),
        };

        BackendError::Server {
            status,
            errcode,
            message,
        }
    }
}

impl ThumbnailBackend for MatrixMedia {
    fn fetch_thumbnail(
        &self,
        id: &str,
        width: u32,
        height: u32,
    ) -> Result<Fut<FetchResult>, BackendError> {
        let media = MediaId::parse(id)?;
        let url = self.thumbnail_url(&media, width, height)?;

        let client = self.client.clone();
        let access_token = self.access_token.clone();
        Ok(Fut::spawn(Self::get_thumbnail(client, url, access_token)))
    }
}
