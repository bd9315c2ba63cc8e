use crate::error::TransferError;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Exit status of a device push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushStatus {
    /// `None` when the bridge process was terminated by a signal
    pub code: Option<i32>,
}

impl PushStatus {
    pub fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for PushStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// Access to an attached external device
#[async_trait]
pub trait DeviceBridge: Send + Sync {
    /// Identifiers of attached devices, in the order the bridge reports them.
    async fn list_devices(&self) -> Result<Vec<String>>;

    /// `mkdir -p` on the device; succeeds if the directory already exists.
    async fn ensure_directory(&self, device_id: &str, path: &str) -> Result<()>;

    /// Streams a local file to the device. Only spawn failures are errors;
    /// a transfer failure is a non-zero status.
    async fn push_file(
        &self,
        device_id: &str,
        local_path: &Path,
        device_path: &str,
    ) -> Result<PushStatus>;
}

/// Extracts device identifiers from `adb devices` output.
///
/// The first line is the `List of devices attached` header. Daemon banners
/// (`* daemon started successfully`) can precede it and are dropped too.
pub fn parse_device_list(output: &str) -> Vec<String> {
    output
        .lines()
        .skip_while(|line| line.starts_with('*'))
        .skip(1)
        .filter(|line| !line.starts_with('*'))
        .filter_map(|line| line.split('\t').next())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Picks the target device for a run: `preferred` when it is attached,
/// otherwise the first listed device.
pub async fn resolve_device(
    bridge: &dyn DeviceBridge,
    preferred: Option<&str>,
) -> Result<String, TransferError> {
    let devices = bridge
        .list_devices()
        .await
        .map_err(|e| TransferError::NoDeviceFound(e.to_string()))?;

    if devices.is_empty() {
        return Err(TransferError::NoDeviceFound(
            "device bridge reported no attached devices".to_string(),
        ));
    }
    tracing::info!("📱 Connected devices: {}", devices.join(", "));

    match preferred {
        Some(serial) => devices
            .into_iter()
            .find(|id| id == serial)
            .ok_or_else(|| {
                TransferError::NoDeviceFound(format!("device '{}' is not attached", serial))
            }),
        None => Ok(devices.into_iter().next().unwrap_or_default()),
    }
}

/// `DeviceBridge` backed by the `adb` command-line tool
pub struct AdbBridge {
    adb_path: String,
}

impl AdbBridge {
    pub fn new(adb_path: impl Into<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.adb_path);
        cmd.kill_on_drop(true);
        cmd
    }

    /// `adb version`, used as a reachability probe at startup.
    pub async fn health_check(&self) -> bool {
        match self.command().arg("version").output().await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl DeviceBridge for AdbBridge {
    async fn list_devices(&self) -> Result<Vec<String>> {
        let output = self
            .command()
            .arg("devices")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| anyhow!("Failed to run {} devices: {}", self.adb_path, e))?;

        if !output.status.success() {
            let err_msg = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("{} devices failed: {}", self.adb_path, err_msg.trim()));
        }

        Ok(parse_device_list(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn ensure_directory(&self, device_id: &str, path: &str) -> Result<()> {
        let output = self
            .command()
            .args(["-s", device_id, "shell", "mkdir", "-p", path])
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            let err_msg = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("mkdir -p {} failed: {}", path, err_msg.trim()));
        }
        Ok(())
    }

    async fn push_file(
        &self,
        device_id: &str,
        local_path: &Path,
        device_path: &str,
    ) -> Result<PushStatus> {
        // adb prints its own progress, so stdout/stderr go straight to the operator
        let status = self
            .command()
            .args(["-s", device_id, "push"])
            .arg(local_path)
            .arg(device_path)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await?;

        Ok(status.into())
    }
}
