use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::utils::validation::validate_path_segment;

/// File classification derived from an object key's extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Png,
    Jpeg,
    Other,
}

impl FileKind {
    /// Classifies by key suffix. Matching is case-sensitive: `A.PNG` is `Other`.
    pub fn from_key(key: &str) -> Self {
        if key.ends_with(".png") {
            FileKind::Png
        } else if key.ends_with(".jpg") {
            FileKind::Jpeg
        } else {
            FileKind::Other
        }
    }

    pub fn is_image(self) -> bool {
        matches!(self, FileKind::Png | FileKind::Jpeg)
    }
}

/// Returns the path segment directly above the filename, e.g. `123` for
/// `a/b/123/image1.png`.
pub fn item_id_from_key(key: &str) -> Option<String> {
    let mut segments = key.rsplit('/');
    segments.next()?;
    let parent = segments.next()?;
    validate_path_segment(parent).ok()?;
    Some(parent.to_string())
}

/// Last `/`-separated segment of a key.
pub fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Device paths are POSIX regardless of the host, so they are built as strings.
pub fn device_path(dest_root: &str, item_id: &str, file_name: &str) -> String {
    format!("{}/{}", device_dir(dest_root, item_id), file_name)
}

/// `<dest_root>/<item_id>`, the device folder holding one item's files.
pub fn device_dir(dest_root: &str, item_id: &str) -> String {
    format!("{}/{}", dest_root.trim_end_matches('/'), item_id)
}

/// One stored object as produced by a listing. Immutable once listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub key: String,
    pub item_id: Option<String>,
    pub kind: FileKind,
    pub size: Option<i64>,
}

impl RemoteObject {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            item_id: item_id_from_key(&key),
            kind: FileKind::from_key(&key),
            size: None,
            key,
        }
    }

    pub fn with_size(mut self, size: Option<i64>) -> Self {
        self.size = size;
        self
    }

    pub fn file_name(&self) -> &str {
        basename(&self.key)
    }

    /// Image kind, a usable ItemId and a file name that is safe to stage.
    pub fn is_eligible(&self) -> bool {
        self.kind.is_image()
            && self.item_id.is_some()
            && validate_path_segment(self.file_name()).is_ok()
    }
}

/// Per-object lifecycle inside one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectState {
    Listed,
    Downloading,
    Downloaded,
    Pushing,
    Pushed,
    PushFailed,
    DownloadFailed,
}

impl ObjectState {
    pub fn can_transition_to(self, next: ObjectState) -> bool {
        use ObjectState::*;
        matches!(
            (self, next),
            (Listed, Downloading)
                | (Downloading, Downloaded)
                | (Downloading, DownloadFailed)
                | (Downloaded, Pushing)
                | (Pushing, Pushed)
                | (Pushing, PushFailed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ObjectState::Pushed | ObjectState::PushFailed | ObjectState::DownloadFailed
        )
    }

    pub fn advance(self, next: ObjectState) -> ObjectState {
        debug_assert!(
            self.can_transition_to(next),
            "invalid transition {:?} -> {:?}",
            self,
            next
        );
        next
    }
}

/// Settled outcome of one listed object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransferResult {
    /// Listed but not eligible; never downloaded or pushed.
    Skipped,
    DownloadFailed {
        reason: String,
    },
    PushSucceeded,
    /// The staged copy is left in place for manual recovery.
    PushFailed {
        exit_code: Option<i32>,
        staged_path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectOutcome {
    pub key: String,
    pub item_id: Option<String>,
    pub result: TransferResult,
}

/// Ordered record of a completed run, returned by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub device_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcomes: Vec<ObjectOutcome>,
    /// Pushed files whose staged copy could not be deleted
    #[serde(default)]
    pub stray_staging: Vec<PathBuf>,
    pub trigger_exit_code: Option<i32>,
}

impl RunReport {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            started_at: Utc::now(),
            finished_at: None,
            outcomes: Vec::new(),
            stray_staging: Vec::new(),
            trigger_exit_code: None,
        }
    }

    pub fn record(&mut self, object: &RemoteObject, result: TransferResult) {
        self.outcomes.push(ObjectOutcome {
            key: object.key.clone(),
            item_id: object.item_id.clone(),
            result,
        });
    }

    pub fn pushed(&self) -> impl Iterator<Item = &ObjectOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, TransferResult::PushSucceeded))
    }

    pub fn failed(&self) -> impl Iterator<Item = &ObjectOutcome> {
        self.outcomes.iter().filter(|o| {
            matches!(
                o.result,
                TransferResult::DownloadFailed { .. } | TransferResult::PushFailed { .. }
            )
        })
    }

    pub fn skipped(&self) -> impl Iterator<Item = &ObjectOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, TransferResult::Skipped))
    }

    /// Staged files deliberately left behind by failed pushes.
    pub fn retained_staging(&self) -> Vec<&PathBuf> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.result {
                TransferResult::PushFailed { staged_path, .. } => Some(staged_path),
                _ => None,
            })
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failed().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_extraction() {
        assert_eq!(item_id_from_key("a/b/123/image1.png").as_deref(), Some("123"));
        assert_eq!(item_id_from_key("p/1/a.png").as_deref(), Some("1"));
        assert_eq!(item_id_from_key("a.png"), None);
        assert_eq!(item_id_from_key("p//a.png"), None);
        assert_eq!(item_id_from_key("p/../a.png"), None);
        assert_eq!(item_id_from_key(""), None);
    }

    #[test]
    fn test_file_kind() {
        assert_eq!(FileKind::from_key("p/1/a.png"), FileKind::Png);
        assert_eq!(FileKind::from_key("p/2/c.jpg"), FileKind::Jpeg);
        assert_eq!(FileKind::from_key("p/1/b.txt"), FileKind::Other);
        assert_eq!(FileKind::from_key("p/1/a.PNG"), FileKind::Other);
        assert!(FileKind::Png.is_image());
        assert!(!FileKind::Other.is_image());
    }

    #[test]
    fn test_device_path_mirrors_staging_layout() {
        assert_eq!(device_path("/sdcard/dest/", "123", "image1.png"), "/sdcard/dest/123/image1.png");
        assert_eq!(device_path("/sdcard/dest", "123", "image1.png"), "/sdcard/dest/123/image1.png");
        assert_eq!(device_dir("/sdcard/dest//", "7"), "/sdcard/dest/7");
    }

    #[test]
    fn test_remote_object_eligibility() {
        assert!(RemoteObject::new("p/1/a.png").is_eligible());
        assert!(!RemoteObject::new("p/1/b.txt").is_eligible());
        assert!(!RemoteObject::new("a.png").is_eligible());
        assert!(!RemoteObject::new("p/1/").is_eligible());

        let object = RemoteObject::new("upc_data/18/0001/front.jpg").with_size(Some(42));
        assert_eq!(object.item_id.as_deref(), Some("0001"));
        assert_eq!(object.file_name(), "front.jpg");
        assert_eq!(object.size, Some(42));
    }

    #[test]
    fn test_state_machine_transitions() {
        use ObjectState::*;
        assert!(Listed.can_transition_to(Downloading));
        assert!(Downloading.can_transition_to(DownloadFailed));
        assert!(Pushing.can_transition_to(PushFailed));
        assert!(!Listed.can_transition_to(Pushing));
        assert!(!Pushed.can_transition_to(Downloading));
        assert!(!DownloadFailed.can_transition_to(Pushing));

        let state = Listed.advance(Downloading).advance(Downloaded).advance(Pushing);
        assert_eq!(state.advance(Pushed), Pushed);
        assert!(Pushed.is_terminal());
        assert!(!Downloaded.is_terminal());
    }

    #[test]
    fn test_run_report_aggregation() {
        let mut report = RunReport::new("emulator-5554");
        report.record(&RemoteObject::new("p/1/a.png"), TransferResult::PushSucceeded);
        report.record(&RemoteObject::new("p/1/b.txt"), TransferResult::Skipped);
        report.record(
            &RemoteObject::new("p/2/c.jpg"),
            TransferResult::PushFailed {
                exit_code: Some(1),
                staged_path: PathBuf::from("/tmp/stage/2/c.jpg"),
            },
        );

        assert_eq!(report.pushed().count(), 1);
        assert_eq!(report.skipped().count(), 1);
        assert_eq!(report.failed().count(), 1);
        assert_eq!(
            report.retained_staging(),
            vec![&PathBuf::from("/tmp/stage/2/c.jpg")]
        );
        assert!(!report.is_clean());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcomes"][0]["result"]["status"], "push_succeeded");
        assert_eq!(json["outcomes"][2]["result"]["exit_code"], 1);
    }
}
