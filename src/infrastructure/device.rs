use crate::services::device::AdbBridge;
use std::sync::Arc;
use tracing::info;

pub async fn setup_bridge(adb_path: &str) -> Arc<AdbBridge> {
    let bridge = AdbBridge::new(adb_path);

    if bridge.health_check().await {
        info!("🔌 Device bridge '{}' is available", adb_path);
    } else {
        tracing::warn!(
            "⚠️  Device bridge '{}' did not respond; device resolution will likely fail.",
            adb_path
        );
    }

    Arc::new(bridge)
}
