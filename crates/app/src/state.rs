use std::{fs, path::PathBuf, time::Duration};

use common::claims::{ExpiryPresets, Permission, PermissionSet, TimedError};
use common::context::ReconciliationContext;
use common::engine::{
    EngineConfig, DEFAULT_DOWNLOAD_LIMIT, DEFAULT_MIN_SEARCH_LEN, DEFAULT_OPERATION_TIMEOUT,
    DEFAULT_TIMEOUT,
};
use serde::{Deserialize, Serialize};

use crate::backend::FileBackend;

pub const APP_NAME: &str = "warden";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STORE_FILE_NAME: &str = "store.json";
pub const SESSION_FILE_NAME: &str = "session.json";
pub const LOG_FILE_NAME: &str = "warden.log";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Seconds every remote call may take
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Seconds a whole command may take, conflict prompts included
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
    /// Users per bulk lookup
    #[serde(default = "default_download_limit")]
    pub download_limit: usize,
    #[serde(default = "default_min_search_len")]
    pub min_search_len: usize,
    /// `[label, offset]` pairs offered as `+label` when setting a date
    #[serde(default = "default_expiry_presets")]
    pub expiry_presets: Vec<(String, String)>,
    /// Permissions in display order
    #[serde(default = "default_permissions")]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub backend: BackendConfig,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_operation_timeout_secs() -> u64 {
    DEFAULT_OPERATION_TIMEOUT.as_secs()
}

fn default_download_limit() -> usize {
    DEFAULT_DOWNLOAD_LIMIT
}

fn default_min_search_len() -> usize {
    DEFAULT_MIN_SEARCH_LEN
}

fn default_expiry_presets() -> Vec<(String, String)> {
    ["1w", "1m", "3m", "1y"]
        .into_iter()
        .map(|offset| (offset.to_string(), offset.to_string()))
        .collect()
}

fn default_permissions() -> Vec<Permission> {
    PermissionSet::default().iter().cloned().collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            operation_timeout_secs: default_operation_timeout_secs(),
            download_limit: default_download_limit(),
            min_search_len: default_min_search_len(),
            expiry_presets: default_expiry_presets(),
            permissions: default_permissions(),
            backend: BackendConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn permission_set(&self) -> Result<PermissionSet, StateError> {
        if self.permissions.is_empty() {
            return Err(StateError::InvalidConfig(
                "at least one permission must be configured".to_string(),
            ));
        }
        Ok(PermissionSet::new(self.permissions.clone()))
    }

    pub fn engine_config(&self) -> Result<EngineConfig, StateError> {
        if self.operation_timeout_secs < self.timeout_secs {
            return Err(StateError::InvalidConfig(
                "operation_timeout_secs must not be shorter than timeout_secs".to_string(),
            ));
        }
        if self.download_limit == 0 {
            return Err(StateError::InvalidConfig(
                "download_limit must be positive".to_string(),
            ));
        }
        Ok(EngineConfig {
            permissions: self.permission_set()?,
            timeout: Duration::from_secs(self.timeout_secs),
            operation_timeout: Duration::from_secs(self.operation_timeout_secs),
            download_limit: self.download_limit,
            min_search_len: self.min_search_len,
        })
    }

    pub fn presets(&self) -> Result<ExpiryPresets, StateError> {
        ExpiryPresets::parse(
            self.expiry_presets
                .iter()
                .map(|(label, offset)| (label.as_str(), offset.as_str())),
        )
        .map_err(StateError::Presets)
    }
}

/// Where users and the index document live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// A JSON file holding both stores
    File {
        /// Defaults to store.json in the state directory
        path: Option<PathBuf>,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::File { path: None }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the state directory (~/.warden)
    pub warden_dir: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Path to the persisted session
    pub session_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the state directory path (custom or default ~/.warden)
    pub fn warden_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new state directory with an empty store and session
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let warden_dir = Self::warden_dir(custom_path)?;

        if warden_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        let config = config.unwrap_or_default();
        // refuse to write a config that would not load
        config.engine_config()?;
        config.presets()?;

        fs::create_dir_all(&warden_dir)?;

        let config_path = warden_dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, toml::to_string_pretty(&config)?)?;

        let session_path = warden_dir.join(SESSION_FILE_NAME);
        fs::write(
            &session_path,
            serde_json::to_string_pretty(&ReconciliationContext::new())?,
        )?;

        let state = Self {
            warden_dir,
            config_path,
            session_path,
            config,
        };

        let store_path = state.store_path();
        if !store_path.exists() {
            FileBackend::empty(store_path).persist()?;
        }

        Ok(state)
    }

    /// Load existing state from the state directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let warden_dir = Self::warden_dir(custom_path)?;

        if !warden_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let config_path = warden_dir.join(CONFIG_FILE_NAME);
        let session_path = warden_dir.join(SESSION_FILE_NAME);

        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }
        if !session_path.exists() {
            return Err(StateError::MissingFile(SESSION_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            warden_dir,
            config_path,
            session_path,
            config,
        })
    }

    /// Path of the file backend's store
    pub fn store_path(&self) -> PathBuf {
        match &self.config.backend {
            BackendConfig::File { path: Some(path) } if path.is_absolute() => path.clone(),
            BackendConfig::File { path: Some(path) } => self.warden_dir.join(path),
            BackendConfig::File { path: None } => self.warden_dir.join(STORE_FILE_NAME),
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.warden_dir.join(LOG_FILE_NAME)
    }

    pub fn load_session(&self) -> Result<ReconciliationContext, StateError> {
        let json = fs::read_to_string(&self.session_path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save_session(&self, ctx: &ReconciliationContext) -> Result<(), StateError> {
        fs::write(&self.session_path, serde_json::to_string_pretty(ctx)?)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("warden directory not initialized. Run 'warden init' first")]
    NotInitialized,

    #[error("warden directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid expiry presets: {0}")]
    Presets(#[source] TimedError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
