use crate::error::TransferError;
use std::env;
use std::path::PathBuf;

/// Credentials and location of the remote object store
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// S3-compatible endpoint URL
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    /// Region sent with requests (default: "us-east-1")
    pub region: String,
    /// Container (bucket) holding the objects
    pub container: String,
    /// Key prefix to enumerate, e.g. "upc_data/18/"
    pub prefix: String,
}

/// External process launched once after the transfer loop
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    /// Program, or a full shell command line when `use_shell` is set
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Run through `sh -c` so shell preludes (`source ~/.bash_profile && ...`) work
    pub use_shell: bool,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            program: "./gradlew".to_string(),
            args: vec!["connectedAndroidTest".to_string()],
            working_dir: PathBuf::from("."),
            use_shell: true,
        }
    }
}

/// Static configuration for one transfer run
#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub storage: StorageConfig,

    /// Local staging root (default: "/tmp/adb_transfer/")
    pub staging_root: PathBuf,

    /// Device-side base path for per-item folders
    pub device_destination: String,

    /// Device bridge executable (default: "adb")
    pub adb_path: String,

    /// Preferred device serial; the first attached device is used when unset
    pub device_serial: Option<String>,

    pub trigger: TriggerConfig,

    /// Where to write the JSON run report, if anywhere
    pub report_path: Option<PathBuf>,
}

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_STAGING_ROOT: &str = "/tmp/adb_transfer/";
const DEFAULT_DEVICE_DESTINATION: &str = "/storage/emulated/0/Android/media/";
const DEFAULT_ADB_PATH: &str = "adb";

impl TransferConfig {
    /// Config with every optional field defaulted and no storage credentials.
    pub fn new(
        container: impl Into<String>,
        prefix: impl Into<String>,
        staging_root: impl Into<PathBuf>,
        device_destination: impl Into<String>,
    ) -> Self {
        Self {
            storage: StorageConfig {
                endpoint: String::new(),
                access_key: String::new(),
                secret_key: String::new(),
                region: DEFAULT_REGION.to_string(),
                container: container.into(),
                prefix: prefix.into(),
            },
            staging_root: staging_root.into(),
            device_destination: device_destination.into(),
            adb_path: DEFAULT_ADB_PATH.to_string(),
            device_serial: None,
            trigger: TriggerConfig::default(),
            report_path: None,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, TransferError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TransferError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| TransferError::Config(format!("{} must be set", key)))
        };

        let trigger_default = TriggerConfig::default();
        let trigger = TriggerConfig {
            program: lookup("TRIGGER_PROGRAM").unwrap_or(trigger_default.program),
            args: lookup("TRIGGER_ARGS")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or(trigger_default.args),
            working_dir: lookup("TRIGGER_WORKDIR")
                .map(PathBuf::from)
                .unwrap_or(trigger_default.working_dir),
            use_shell: lookup("TRIGGER_SHELL")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(trigger_default.use_shell),
        };

        let config = Self {
            storage: StorageConfig {
                endpoint: require("STORAGE_ENDPOINT")?,
                access_key: require("STORAGE_ACCESS_KEY")?,
                secret_key: require("STORAGE_SECRET_KEY")?,
                region: lookup("STORAGE_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
                container: require("STORAGE_CONTAINER")?,
                prefix: require("STORAGE_PREFIX")?,
            },
            staging_root: lookup("STAGING_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STAGING_ROOT)),
            device_destination: lookup("DEVICE_DESTINATION")
                .unwrap_or_else(|| DEFAULT_DEVICE_DESTINATION.to_string()),
            adb_path: lookup("ADB_PATH").unwrap_or_else(|| DEFAULT_ADB_PATH.to_string()),
            device_serial: lookup("DEVICE_SERIAL").filter(|v| !v.trim().is_empty()),
            trigger,
            report_path: lookup("REPORT_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TransferError> {
        if self.storage.container.trim().is_empty() {
            return Err(TransferError::Config("container name is empty".into()));
        }
        if self.storage.prefix.trim().is_empty() {
            return Err(TransferError::Config("remote prefix is empty".into()));
        }
        if self.device_destination.trim().is_empty() {
            return Err(TransferError::Config("device destination is empty".into()));
        }
        if !self.device_destination.starts_with('/') {
            return Err(TransferError::Config(format!(
                "device destination '{}' must be an absolute path",
                self.device_destination
            )));
        }
        Ok(())
    }
}
