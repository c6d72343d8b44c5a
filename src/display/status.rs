use crate::acquisition::AcquisitionError;
use crate::sync::SyncStats;
use serde::Serialize;
use std::collections::BTreeMap;

pub const STATUS_TOPIC: &str = "Topic";
pub const STATUS_SERVICES: &str = "Services";
pub const STATUS_COST_LAYER: &str = "Cost layer";
pub const STATUS_VALIDATION: &str = "Validation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusLevel {
    Ok,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEntry {
    pub level: StatusLevel,
    pub text: String,
}

/// User-visible health of the display, grouped by category.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DisplayStatus {
    messages_received: u64,
    acquisition_errors: u64,
    last_acquisition_error: Option<String>,
    sync: SyncStats,
    entries: BTreeMap<&'static str, StatusEntry>,
}

impl DisplayStatus {
    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }

    pub fn acquisition_errors(&self) -> u64 {
        self.acquisition_errors
    }

    pub fn last_acquisition_error(&self) -> Option<&str> {
        self.last_acquisition_error.as_deref()
    }

    pub fn sync(&self) -> SyncStats {
        self.sync
    }

    pub fn entry(&self, category: &str) -> Option<&StatusEntry> {
        self.entries.get(category)
    }

    /// Worst level across all categories.
    pub fn level(&self) -> StatusLevel {
        self.entries
            .values()
            .map(|entry| entry.level)
            .fold(StatusLevel::Ok, |worst, level| match (worst, level) {
                (StatusLevel::Error, _) | (_, StatusLevel::Error) => StatusLevel::Error,
                (StatusLevel::Warn, _) | (_, StatusLevel::Warn) => StatusLevel::Warn,
                _ => StatusLevel::Ok,
            })
    }

    pub fn set(&mut self, category: &'static str, level: StatusLevel, text: impl Into<String>) {
        self.entries.insert(
            category,
            StatusEntry {
                level,
                text: text.into(),
            },
        );
    }

    pub fn clear(&mut self, category: &str) {
        self.entries.remove(category);
    }

    pub(crate) fn record_message(&mut self) {
        self.messages_received += 1;
        let text = format!("{} messages received", self.messages_received);
        self.set(STATUS_TOPIC, StatusLevel::Ok, text);
    }

    pub(crate) fn record_acquisition_error(&mut self, err: &AcquisitionError) {
        self.acquisition_errors += 1;
        let text = err.to_string();
        log::warn!("[display] acquisition failed: {text}");
        self.set(STATUS_SERVICES, StatusLevel::Error, text.clone());
        self.last_acquisition_error = Some(text);
    }

    pub(crate) fn record_acquisition_success(&mut self) {
        self.set(STATUS_SERVICES, StatusLevel::Ok, "last request succeeded");
    }

    pub(crate) fn update_sync(&mut self, stats: SyncStats) {
        if stats.rejected > self.sync.rejected {
            let text = format!("{} payloads rejected", stats.rejected);
            self.set(STATUS_VALIDATION, StatusLevel::Warn, text);
        }
        self.sync = stats;
    }

    pub(crate) fn reset(&mut self) {
        self.messages_received = 0;
        self.sync = SyncStats::default();
        self.entries.clear();
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{RequestKind, ServiceError};

    #[test]
    fn message_counter_updates_topic_text() {
        let mut status = DisplayStatus::default();
        status.record_message();
        status.record_message();
        assert_eq!(status.messages_received(), 2);
        assert_eq!(
            status.entry(STATUS_TOPIC).map(|e| e.text.as_str()),
            Some("2 messages received")
        );
        assert_eq!(status.level(), StatusLevel::Ok);
    }

    #[test]
    fn acquisition_error_raises_level() {
        let mut status = DisplayStatus::default();
        status.record_acquisition_error(&AcquisitionError::RequestFailed {
            kind: RequestKind::Geometry,
            mesh_id: Some("m1".into()),
            source: ServiceError::Unavailable("down".into()),
        });
        assert_eq!(status.acquisition_errors(), 1);
        assert_eq!(status.level(), StatusLevel::Error);
        assert!(
            status
                .last_acquisition_error()
                .is_some_and(|text| text.contains("geometry") && text.contains("m1"))
        );

        status.record_acquisition_success();
        assert_eq!(status.level(), StatusLevel::Ok);
        assert_eq!(status.acquisition_errors(), 1);
    }

    #[test]
    fn reset_zeroes_sync_counters() {
        let mut status = DisplayStatus::default();
        status.record_message();
        status.update_sync(SyncStats {
            rejected: 2,
            stale: 1,
            unmatched_dropped: 3,
        });
        status.reset();
        assert_eq!(status.sync(), SyncStats::default());
        assert_eq!(status.messages_received(), 0);

        // a fresh reject after reset warns again
        status.update_sync(SyncStats {
            rejected: 1,
            ..SyncStats::default()
        });
        assert_eq!(status.level(), StatusLevel::Warn);
    }

    #[test]
    fn status_serializes() {
        let mut status = DisplayStatus::default();
        status.record_message();
        let json = status.to_json().expect("serializes");
        assert!(json.contains("messages_received"));
        assert!(json.contains("Topic"));
    }
}
