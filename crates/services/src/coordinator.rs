use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use skillpath_core::model::{
    CompletionOutcome, Course, CourseId, EngineSettings, PerformanceModel, ProgressState,
    QuizAttempt, QuizId, SectionId, UserId,
};
use storage::repository::{CourseCatalog, PerformanceRepository, ProgressRepository, Storage};

use crate::Clock;
use crate::achievements::{AchievementKind, AchievementSignal, AchievementSink, NoopSink};
use crate::error::CoordinatorError;

//
// ─── EVENTS ────────────────────────────────────────────────────────────────────
//

/// A learner action delivered by the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Enroll {
        course_id: CourseId,
    },
    SectionCompleted {
        course_id: CourseId,
        section_id: SectionId,
        #[serde(default = "full_comprehension")]
        comprehension: f64,
    },
    SectionsCompleted {
        course_id: CourseId,
        section_ids: Vec<SectionId>,
        #[serde(default = "full_comprehension")]
        comprehension: f64,
    },
    TimeAdded {
        course_id: CourseId,
        section_id: SectionId,
        time_ms: u64,
    },
    QuizAttempted {
        course_id: CourseId,
        quiz_id: QuizId,
        score: u8,
        #[serde(default)]
        time_ms: u64,
    },
}

fn full_comprehension() -> f64 {
    100.0
}

impl ProgressEvent {
    #[must_use]
    pub fn course_id(&self) -> &CourseId {
        match self {
            ProgressEvent::Enroll { course_id }
            | ProgressEvent::SectionCompleted { course_id, .. }
            | ProgressEvent::SectionsCompleted { course_id, .. }
            | ProgressEvent::TimeAdded { course_id, .. }
            | ProgressEvent::QuizAttempted { course_id, .. } => course_id,
        }
    }
}

//
// ─── COORDINATOR ───────────────────────────────────────────────────────────────
//

/// Records loaded for one event.
struct Unit {
    course: Course,
    progress: ProgressState,
    performance: PerformanceModel,
    newly_enrolled: bool,
    first_course: bool,
}

/// Applies learner events to progress and performance records, saves them, and
/// emits achievement signals.
///
/// Callers serialize events per (user, course); the coordinator holds no locks.
/// Performance is saved before progress. The progress record is what makes a
/// redelivered event a no-op, so it is written last: if either save fails,
/// redelivering the event reapplies it in full.
#[derive(Clone)]
pub struct ProgressCoordinator {
    clock: Clock,
    settings: EngineSettings,
    progress: Arc<dyn ProgressRepository>,
    performance: Arc<dyn PerformanceRepository>,
    catalog: Arc<dyn CourseCatalog>,
    sink: Arc<dyn AchievementSink>,
}

impl ProgressCoordinator {
    #[must_use]
    pub fn new(
        clock: Clock,
        progress: Arc<dyn ProgressRepository>,
        performance: Arc<dyn PerformanceRepository>,
        catalog: Arc<dyn CourseCatalog>,
    ) -> Self {
        Self {
            clock,
            settings: EngineSettings::default(),
            progress,
            performance,
            catalog,
            sink: Arc::new(NoopSink),
        }
    }

    /// Build from the aggregate storage handles.
    #[must_use]
    pub fn from_storage(clock: Clock, storage: &Storage) -> Self {
        Self::new(
            clock,
            Arc::clone(&storage.progress),
            Arc::clone(&storage.performance),
            Arc::clone(&storage.catalog),
        )
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn AchievementSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Current progress, or a fresh unsaved zero-state when the learner never enrolled.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::Storage` if the repository cannot be read.
    pub async fn progress(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<ProgressState, CoordinatorError> {
        let existing = self.progress.load_progress(user_id, course_id).await?;
        Ok(existing.unwrap_or_else(|| {
            ProgressState::enroll(user_id.clone(), course_id.clone(), &[], self.clock.now())
        }))
    }

    /// Apply a decoded event.
    ///
    /// # Errors
    ///
    /// Returns the error of the matching handler.
    pub async fn apply(&self, user_id: &UserId, event: ProgressEvent) -> Result<(), CoordinatorError> {
        match event {
            ProgressEvent::Enroll { course_id } => {
                self.enroll(user_id, &course_id).await?;
            }
            ProgressEvent::SectionCompleted {
                course_id,
                section_id,
                comprehension,
            } => {
                self.section_completed(user_id, &course_id, section_id, comprehension)
                    .await?;
            }
            ProgressEvent::SectionsCompleted {
                course_id,
                section_ids,
                comprehension,
            } => {
                self.sections_completed(user_id, &course_id, &section_ids, comprehension)
                    .await?;
            }
            ProgressEvent::TimeAdded {
                course_id,
                section_id,
                time_ms,
            } => {
                self.time_added(user_id, &course_id, &section_id, time_ms)
                    .await?;
            }
            ProgressEvent::QuizAttempted {
                course_id,
                quiz_id,
                score,
                time_ms,
            } => {
                self.quiz_attempted(user_id, &course_id, quiz_id, score, time_ms)
                    .await?;
            }
        }
        Ok(())
    }

    /// Enroll a learner, registering the course outline. Enrolling twice
    /// returns the stored record untouched.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::Storage` with `StorageError::NotFound` if the
    /// course is not in the catalog, or any repository failure.
    #[instrument(skip(self))]
    pub async fn enroll(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<ProgressState, CoordinatorError> {
        let now = self.clock.now();
        let unit = self.load_unit(user_id, course_id, now).await?;
        if !unit.newly_enrolled {
            debug!("already enrolled");
            return Ok(unit.progress);
        }
        self.commit(&unit, now).await?;
        Ok(unit.progress)
    }

    /// Mark one section complete.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::Progress` for an invalid comprehension score
    /// (nothing is saved), or storage failures.
    #[instrument(skip(self))]
    pub async fn section_completed(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        section_id: SectionId,
        comprehension: f64,
    ) -> Result<CompletionOutcome, CoordinatorError> {
        self.sections_completed(user_id, course_id, &[section_id], comprehension)
            .await
    }

    /// Mark several sections complete with a single history snapshot.
    ///
    /// Redelivery is idempotent: already-completed sections keep their
    /// timestamps and do not count again toward performance.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::Progress` for an empty batch or invalid
    /// comprehension score, or storage failures.
    #[instrument(skip(self))]
    pub async fn sections_completed(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        section_ids: &[SectionId],
        comprehension: f64,
    ) -> Result<CompletionOutcome, CoordinatorError> {
        let now = self.clock.now();
        let mut unit = self.load_unit(user_id, course_id, now).await?;

        let outcome = unit
            .progress
            .complete_sections(section_ids, comprehension, now)?;

        if outcome.newly_completed > 0 {
            for _ in 0..outcome.newly_completed {
                unit.performance.increment_completed_sections();
            }
            for skill in &unit.course.skills {
                unit.performance.get_or_init_skill_level(skill);
                unit.performance.increment_revision_count(skill, now);
            }
        }
        debug!(
            newly_completed = outcome.newly_completed,
            percentage = outcome.percentage,
            "sections completed"
        );

        self.commit(&unit, now).await?;

        if outcome.certificate_awarded {
            info!(%user_id, %course_id, "course completed, certificate awarded");
            self.emit(
                AchievementKind::CourseCompleted,
                user_id,
                json!({ "course_id": course_id.as_str() }),
                now,
            )
            .await;
        }
        Ok(outcome)
    }

    /// Add time-on-task to a section.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::Progress` with `ProgressError::UnknownSection`
    /// if the section is not part of the course, or storage failures.
    #[instrument(skip(self))]
    pub async fn time_added(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        section_id: &SectionId,
        time_ms: u64,
    ) -> Result<(), CoordinatorError> {
        let now = self.clock.now();
        let mut unit = self.load_unit(user_id, course_id, now).await?;

        unit.progress.add_time_to_section(section_id, time_ms, now)?;
        unit.performance.add_learning_time(time_ms);
        debug!(time_ms, "time added");

        self.commit(&unit, now).await
    }

    /// Record a quiz attempt on both the course progress and the category model.
    ///
    /// The category's overall level follows the mean of its quiz averages.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::Progress` if `score > 100`, or storage failures.
    #[instrument(skip(self))]
    pub async fn quiz_attempted(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        quiz_id: QuizId,
        score: u8,
        time_ms: u64,
    ) -> Result<QuizAttempt, CoordinatorError> {
        let now = self.clock.now();
        let mut unit = self.load_unit(user_id, course_id, now).await?;

        let attempt = unit
            .progress
            .add_quiz_attempt_with_threshold(
                quiz_id.clone(),
                score,
                time_ms,
                self.settings.passing_score(),
                now,
            )?
            .clone();
        let average = unit
            .performance
            .record_quiz_attempt(&quiz_id, f64::from(score))?;
        unit.performance.add_learning_time(time_ms);
        let level = (unit.performance.average_quiz_score() / 100.0).clamp(0.0, 1.0);
        unit.performance.set_overall_level(level)?;
        debug!(
            attempt = attempt.attempt_number,
            score, average, "quiz attempt recorded"
        );

        self.commit(&unit, now).await?;

        if score >= self.settings.high_score_milestone() {
            self.emit(
                AchievementKind::Milestone,
                user_id,
                json!({
                    "course_id": course_id.as_str(),
                    "quiz_id": quiz_id.as_str(),
                    "score": score,
                }),
                now,
            )
            .await;
        }
        Ok(attempt)
    }

    // ── helpers ────────────────────────────────────────────────────────────

    /// Load the course, progress, and performance touched by one event.
    /// Missing progress becomes an implicit enrollment.
    async fn load_unit(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        now: DateTime<Utc>,
    ) -> Result<Unit, CoordinatorError> {
        let course = self.catalog.get_course(course_id).await?;

        let (progress, newly_enrolled, first_course) =
            match self.progress.load_progress(user_id, course_id).await? {
                Some(progress) => (progress, false, false),
                None => {
                    let first_course = self
                        .progress
                        .list_progress_for_user(user_id)
                        .await?
                        .is_empty();
                    debug!(%course_id, first_course, "enrolling");
                    let progress = ProgressState::enroll(
                        user_id.clone(),
                        course_id.clone(),
                        &course.section_ids,
                        now,
                    );
                    (progress, true, first_course)
                }
            };

        let performance = self
            .performance
            .load_performance(user_id, &course.category)
            .await?
            .unwrap_or_else(|| PerformanceModel::new(user_id.clone(), course.category.clone()));

        Ok(Unit {
            course,
            progress,
            performance,
            newly_enrolled,
            first_course,
        })
    }

    async fn commit(&self, unit: &Unit, now: DateTime<Utc>) -> Result<(), CoordinatorError> {
        self.performance.save_performance(&unit.performance).await?;
        self.progress.save_progress(&unit.progress).await?;

        if unit.first_course {
            let user_id = unit.progress.user_id();
            info!(%user_id, course_id = %unit.course.course_id, "first course");
            self.emit(
                AchievementKind::FirstCourse,
                user_id,
                json!({ "course_id": unit.course.course_id.as_str() }),
                now,
            )
            .await;
        }
        Ok(())
    }

    /// Delivery failures are logged and never undo saved state.
    async fn emit(
        &self,
        kind: AchievementKind,
        user_id: &UserId,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) {
        let signal = AchievementSignal {
            kind,
            user_id: user_id.clone(),
            payload,
            emitted_at: now,
        };
        if let Err(err) = self.sink.emit(signal).await {
            warn!(kind = kind.as_str(), %user_id, error = %err, "achievement signal dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_decode_with_defaults() {
        let event: ProgressEvent = serde_json::from_str(
            r#"{"type": "section_completed", "course_id": "c1", "section_id": "s1"}"#,
        )
        .unwrap();
        match event {
            ProgressEvent::SectionCompleted { comprehension, .. } => {
                assert_eq!(comprehension, 100.0);
            }
            other => panic!("unexpected event {other:?}"),
        }

        let quiz: ProgressEvent = serde_json::from_str(
            r#"{"type": "quiz_attempted", "course_id": "c1", "quiz_id": "q1", "score": 80}"#,
        )
        .unwrap();
        assert_eq!(quiz.course_id().as_str(), "c1");
    }

    #[test]
    fn events_reject_blank_ids() {
        let result: Result<ProgressEvent, _> =
            serde_json::from_str(r#"{"type": "enroll", "course_id": "   "}"#);
        assert!(result.is_err());
    }
}
