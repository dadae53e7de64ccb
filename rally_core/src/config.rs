use std::path::{Path, PathBuf};

use iroh::SecretKey;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

static DATA_DIR_NAME: &str = "rally";
static RALLY_DB_NAME: &str = "rally_db.sqlite";
static CONFIG_FILE_NAME: &str = "config.json";
static DATA_DIR_ENV: &str = "RALLY_DATA_DIR";

// data_dir_path
// |- rally
//    |- rally_db.sqlite
//    |- config.json

fn default_secret_key() -> SecretKey {
    SecretKey::generate(&mut rand::rng())
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct FeedConfig {
    pub default_limit: u64,
    pub max_limit: u64,
    /// When set, `top` and `hot` only rank posts created in the last this many days.
    pub ranking_window_days: Option<u32>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
            ranking_window_days: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CommentsConfig {
    /// Top-level comments per page.
    pub default_limit: u64,
    pub max_limit: u64,
    pub default_max_depth: u32,
    /// Hard ceiling on requested depth, whatever the caller asks for.
    pub max_depth_cap: u32,
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
            default_max_depth: 5,
            max_depth_cap: 100,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AuthConfig {
    pub min_password_len: usize,
    pub bcrypt_cost: u32,
    /// Lifetime of issued access tokens. A revocation is never kept past `now + ttl`.
    pub token_ttl_hours: i64,
    pub prune_interval_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            min_password_len: 8,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            token_ttl_hours: 24,
            prune_interval_secs: 3600,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RallyConfig {
    /// Secret key for the local node.
    #[serde(default = "default_secret_key")]
    pub(crate) secret_key: SecretKey,

    /// Secret key for the in-process client endpoint.
    #[serde(default = "default_secret_key")]
    pub(crate) client_secret_key: SecretKey,

    pub(crate) database_path: PathBuf,

    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub comments: CommentsConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

impl RallyConfig {
    fn new(data_dir: &Path) -> Self {
        RallyConfig {
            secret_key: default_secret_key(),
            client_secret_key: default_secret_key(),
            database_path: data_dir.join(RALLY_DB_NAME),
            feed: FeedConfig::default(),
            comments: CommentsConfig::default(),
            auth: AuthConfig::default(),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no data directory available on this platform")]
    NoDataDir,

    #[error("config io failed")]
    Io(#[from] std::io::Error),

    #[error("config file is not valid json")]
    Json(#[from] serde_json::Error),
}

fn data_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }

    dirs::data_dir()
        .map(|dir| dir.join(DATA_DIR_NAME))
        .ok_or(ConfigError::NoDataDir)
}

/// Gets the existing config or initializes a new one if it doesn't exist
pub async fn get_or_init() -> Result<RallyConfig, ConfigError> {
    let dir = data_dir()?;
    get_or_init_in(&dir).await
}

/// Same as [`get_or_init`] but rooted at an explicit directory.
pub async fn get_or_init_in(dir: &Path) -> Result<RallyConfig, ConfigError> {
    let config_path = dir.join(CONFIG_FILE_NAME);

    fs::create_dir_all(dir).await?;

    if fs::try_exists(&config_path).await? {
        let mut file = fs::File::open(&config_path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;

        let config: RallyConfig = serde_json::from_str(&contents)?;
        tracing::debug!(path = %config_path.display(), "loaded config");
        Ok(config)
    } else {
        let config = RallyConfig::new(dir);

        let json = serde_json::to_string_pretty(&config)?;
        let mut file = fs::File::create(&config_path).await?;
        file.write_all(json.as_bytes()).await?;

        tracing::info!(path = %config_path.display(), "wrote default config");
        Ok(config)
    }
}
