use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::models::{ObjectState, RemoteObject, RunReport, TransferResult, device_dir, device_path};
use crate::services::device::{DeviceBridge, PushStatus, resolve_device};
use crate::services::staging::StagingManager;
use crate::services::storage::RemoteObjectSource;
use crate::services::trigger::DownstreamTrigger;
use chrono::Utc;
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tracing::Instrument;

/// Moves every eligible object under the configured prefix onto one device.
///
/// Objects are handled strictly one at a time: an object's push is awaited,
/// and its staged file discarded, before the next object is pulled from the
/// listing.
pub struct TransferPipeline {
    config: TransferConfig,
    source: Arc<dyn RemoteObjectSource>,
    bridge: Arc<dyn DeviceBridge>,
    staging: StagingManager,
    trigger: Arc<dyn DownstreamTrigger>,
}

impl TransferPipeline {
    pub fn new(
        config: TransferConfig,
        source: Arc<dyn RemoteObjectSource>,
        bridge: Arc<dyn DeviceBridge>,
        trigger: Arc<dyn DownstreamTrigger>,
    ) -> Self {
        let staging = StagingManager::new(config.staging_root.clone());
        Self {
            config,
            source,
            bridge,
            staging,
            trigger,
        }
    }

    pub fn staging(&self) -> &StagingManager {
        &self.staging
    }

    /// Runs the whole transfer and then the downstream trigger.
    ///
    /// Returns `Err` only for run-level failures (no device, listing error,
    /// staging root unusable); those skip the trigger. Per-object failures
    /// are recorded in the report.
    pub async fn run(&self) -> Result<RunReport, TransferError> {
        let device_id =
            resolve_device(self.bridge.as_ref(), self.config.device_serial.as_deref()).await?;
        tracing::info!("🎯 Target device: {}", device_id);

        let mut report = RunReport::new(&device_id);

        self.ensure_device_dir(&device_id, &self.config.device_destination)
            .await;
        self.staging.prepare().await?;

        let prefix = &self.config.storage.prefix;
        tracing::info!("📥 Downloading files from folder: {}...", prefix);

        let mut objects = self.source.list_under_prefix(prefix);
        while let Some(listed) = objects.next().await {
            let object = listed.map_err(|e| {
                tracing::error!("❌ Error listing objects under {}: {}", prefix, e);
                TransferError::Listing(e.to_string())
            })?;

            let span = tracing::info_span!("object", key = %object.key);
            let result = self
                .process_object(&device_id, &object, &mut report)
                .instrument(span)
                .await;
            report.record(&object, result);
        }

        let pushed = report.pushed().count();
        let failed = report.failed().count();
        if failed == 0 {
            tracing::info!("✅ All files downloaded and moved successfully! ({} pushed)", pushed);
        } else {
            tracing::error!(
                "❌ Transfer finished with failures: {} pushed, {} failed, {} staged files retained",
                pushed,
                failed,
                report.retained_staging().len()
            );
        }

        match self.trigger.fire().await {
            Ok(code) => report.trigger_exit_code = code,
            Err(e) => tracing::error!("❌ Downstream trigger failed: {}", e),
        }

        report.finished_at = Some(Utc::now());
        Ok(report)
    }

    async fn process_object(
        &self,
        device_id: &str,
        object: &RemoteObject,
        report: &mut RunReport,
    ) -> TransferResult {
        let state = ObjectState::Listed;

        let Some(item_id) = object
            .item_id
            .as_deref()
            .filter(|_| object.is_eligible())
        else {
            tracing::debug!("Skipping ineligible object {}", object.key);
            return TransferResult::Skipped;
        };
        let file_name = object.file_name();

        let state = transition(state, ObjectState::Downloading);
        let local_path = match self.staging.path_for(item_id, file_name).await {
            Ok(path) => path,
            Err(e) => {
                tracing::error!("❌ Failed to prepare staging folder for {}: {}", object.key, e);
                transition(state, ObjectState::DownloadFailed);
                return TransferResult::DownloadFailed {
                    reason: e.to_string(),
                };
            }
        };

        tracing::info!("⬇️ Downloading: {} -> {:?}", object.key, local_path);
        if let Err(e) = self.source.download_to(object, &local_path).await {
            let err = TransferError::DownloadFailed {
                key: object.key.clone(),
                reason: e.to_string(),
            };
            tracing::error!("❌ {}", err);
            transition(state, ObjectState::DownloadFailed);
            return TransferResult::DownloadFailed {
                reason: e.to_string(),
            };
        }
        let state = transition(state, ObjectState::Downloaded);
        tracing::info!("✅ Downloaded: {:?}", local_path);

        self.staging.make_writable(&local_path).await;

        // A failure here is only logged; the push below reports the real outcome
        let item_dir = device_dir(&self.config.device_destination, item_id);
        self.ensure_device_dir(device_id, &item_dir).await;

        let state = transition(state, ObjectState::Pushing);
        let target = device_path(&self.config.device_destination, item_id, file_name);
        tracing::info!("📲 Transferring to device: {}", target);

        let status = self.push(device_id, &local_path, &target).await;
        if status.success() {
            transition(state, ObjectState::Pushed);
            tracing::info!("✅ Successfully moved to device: {}", target);
            // A stray copy does not change the outcome, only the report
            if let Err(err) = self.staging.discard(&local_path).await {
                tracing::debug!("Recording stray staged file: {}", err);
                report.stray_staging.push(local_path);
            }
            TransferResult::PushSucceeded
        } else {
            transition(state, ObjectState::PushFailed);
            let err = TransferError::PushFailed {
                device_path: target,
                exit_code: status.code,
            };
            tracing::error!("❌ {}; staged copy kept at {:?}", err, local_path);
            TransferResult::PushFailed {
                exit_code: status.code,
                staged_path: local_path,
            }
        }
    }

    async fn push(&self, device_id: &str, local_path: &Path, target: &str) -> PushStatus {
        match self.bridge.push_file(device_id, local_path, target).await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!("❌ Failed to launch push for {}: {}", target, e);
                PushStatus { code: None }
            }
        }
    }

    async fn ensure_device_dir(&self, device_id: &str, path: &str) {
        match self.bridge.ensure_directory(device_id, path).await {
            Ok(()) => tracing::info!("✅ Ensured device directory: {}", path),
            Err(e) => {
                let err = TransferError::DirectoryEnsureFailed {
                    path: path.to_string(),
                    reason: e.to_string(),
                };
                tracing::error!("❌ {}", err);
            }
        }
    }
}

fn transition(state: ObjectState, next: ObjectState) -> ObjectState {
    if next.is_terminal() {
        tracing::debug!("{:?} -> {:?} (settled)", state, next);
    } else {
        tracing::debug!("{:?} -> {:?}", state, next);
    }
    state.advance(next)
}

/// Writes the run report as pretty-printed JSON.
pub async fn write_report(report: &RunReport, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let json = serde_json::to_vec_pretty(report)?;
    tokio::fs::write(path, json).await?;
    tracing::info!("📝 Run report written to {:?}", path);
    Ok(())
}
