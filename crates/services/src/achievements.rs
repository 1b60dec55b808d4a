use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use skillpath_core::model::UserId;

/// What a learner just achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementKind {
    /// First progress record for the learner.
    FirstCourse,
    /// A course reached 100% for the first time.
    CourseCompleted,
    /// A quiz score reached the high-score threshold.
    Milestone,
}

impl AchievementKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AchievementKind::FirstCourse => "first_course",
            AchievementKind::CourseCompleted => "course_completed",
            AchievementKind::Milestone => "milestone",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AchievementSignal {
    pub kind: AchievementKind,
    pub user_id: UserId,
    pub payload: serde_json::Value,
    pub emitted_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
#[error("achievement sink failed: {0}")]
pub struct SinkError(pub String);

/// Receives achievement signals once the triggering state has been saved.
#[async_trait]
pub trait AchievementSink: Send + Sync {
    /// # Errors
    ///
    /// Returns `SinkError` if the signal could not be delivered.
    async fn emit(&self, signal: AchievementSignal) -> Result<(), SinkError>;
}

/// Drops every signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl AchievementSink for NoopSink {
    async fn emit(&self, _signal: AchievementSignal) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Keeps signals in memory, in emission order.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    signals: Arc<Mutex<Vec<AchievementSignal>>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the signals received so far.
    #[must_use]
    pub fn signals(&self) -> Vec<AchievementSignal> {
        self.signals
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<AchievementKind> {
        self.signals().iter().map(|s| s.kind).collect()
    }
}

#[async_trait]
impl AchievementSink for RecordingSink {
    async fn emit(&self, signal: AchievementSignal) -> Result<(), SinkError> {
        let mut guard = self
            .signals
            .lock()
            .map_err(|e| SinkError(e.to_string()))?;
        guard.push(signal);
        Ok(())
    }
}
