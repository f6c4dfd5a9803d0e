use std::{path::Path, time::Duration};

use indexmap::IndexSet;
use url::Url;

use crate::Size;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub default_size: Size,
    pub max_size: Size,
    #[serde(rename = "timeout_ms", with = "millis")]
    pub timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_size: Size::new(100, 100),
            max_size: Size::new(2048, 2048),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub size: Size,
    pub loaders: usize,
    pub ids: IndexSet<String>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            size: Size::new(96, 96),
            loaders: 1,
            ids: IndexSet::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub bridge: BridgeConfig,
    pub viewer: ViewerConfig,
}

impl Config {
    pub const FILE_NAME: &str = "thumbnails.toml";

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)?;
        Self::parse(&data)
            .map_err(|err| anyhow::anyhow!("invalid config '{}': {err}", path.display()))
    }

    pub fn parse(data: &str) -> anyhow::Result<Self> {
        let mut this: Self = toml::from_str(data)?;
        this.viewer.loaders = this.viewer.loaders.max(1);
        Ok(this)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let s = toml::to_string_pretty(self)?;
        std::fs::write(path, s)?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct MatrixConfig {
    pub homeserver: Url,
    pub access_token: Option<String>,
}

impl MatrixConfig {
    pub const HOMESERVER: &str = "MATRIX_HOMESERVER";
    pub const ACCESS_TOKEN: &str = "MATRIX_ACCESS_TOKEN";

    pub fn from_env() -> anyhow::Result<Option<Self>> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Option<Self>> {
        let Some(homeserver) = get(Self::HOMESERVER).filter(|s| !s.trim().is_empty()) else {
            return Ok(None);
        };

        let homeserver = Url::parse(homeserver.trim())
            .map_err(|err| anyhow::anyhow!("'{}' is not a valid url: {err}", Self::HOMESERVER))?;
        anyhow::ensure!(
            !homeserver.cannot_be_a_base(),
            "'{}' must be a base url, got '{homeserver}'",
            Self::HOMESERVER
        );

        Ok(Some(Self {
            homeserver,
            access_token: get(Self::ACCESS_TOKEN).filter(|s| !s.is_empty()),
        }))
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_u64(value.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        u64::deserialize(de).map(Duration::from_millis)
    }
}
