use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, QuizId, SectionId, SkillId, UserId};
use crate::time::{MILLIS_PER_DAY, whole_days_between};

/// Quiz score at or above which a quiz counts as a completed activity.
pub const DEFAULT_PASSING_SCORE: u8 = 70;

/// Half-width of the band in which the progress trend is reported as stable.
pub const DEFAULT_TREND_BAND: f64 = 5.0;

/// Number of history points averaged on each side of a trend comparison.
const TREND_WINDOW: usize = 3;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("quiz score must be within 0..=100, got {0}")]
    ScoreOutOfRange(u8),

    #[error("comprehension score must be a finite value within 0..=100, got {0}")]
    ComprehensionOutOfRange(f64),

    #[error("skill level must be within 0..=100, got {0}")]
    SkillLevelOutOfRange(u8),

    #[error("section {0} is not part of this course")]
    UnknownSection(SectionId),

    #[error("no sections given")]
    NoSections,

    #[error("inconsistent progress record: {0}")]
    InconsistentRecord(&'static str),
}

//
// ─── SECTION / QUIZ RECORDS ────────────────────────────────────────────────────
//

/// Progress through a single section of a course.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SectionProgress {
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
    time_spent_ms: u64,
    comprehension_score: f64,
    completed_sub_sections: BTreeSet<String>,
}

impl SectionProgress {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn time_spent_ms(&self) -> u64 {
        self.time_spent_ms
    }

    #[must_use]
    pub fn comprehension_score(&self) -> f64 {
        self.comprehension_score
    }

    #[must_use]
    pub fn completed_sub_sections(&self) -> &BTreeSet<String> {
        &self.completed_sub_sections
    }

    /// Marks the section complete. Returns true when this changed the completion flag.
    fn mark_completed(&mut self, comprehension: f64, now: DateTime<Utc>) -> bool {
        // Re-completion keeps the first timestamp but takes the newest score.
        self.comprehension_score = comprehension;
        if self.completed {
            return false;
        }
        self.completed = true;
        self.completed_at = Some(now);
        true
    }
}

/// One attempt at a quiz, in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub quiz_id: QuizId,
    pub score: u8,
    pub attempt_number: u32,
    pub completed_at: DateTime<Utc>,
    pub time_spent_ms: u64,
}

//
// ─── DERIVED VIEWS ─────────────────────────────────────────────────────────────
//

/// Direction of recent progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressTrend {
    Improving,
    Stable,
    Declining,
}

impl ProgressTrend {
    /// `+1`, `0` or `-1`.
    #[must_use]
    pub fn as_sign(self) -> i8 {
        match self {
            ProgressTrend::Improving => 1,
            ProgressTrend::Stable => 0,
            ProgressTrend::Declining => -1,
        }
    }
}

/// Projected completion date for a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionForecast {
    /// Not enough history to extrapolate (same-day enrollment or no progress).
    Unknown,
    Expected(DateTime<Utc>),
}

/// What a completion transition changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionOutcome {
    /// Sections whose completion flag flipped during this call.
    pub newly_completed: usize,
    pub percentage: u8,
    /// True only on the call that first reached 100%.
    pub certificate_awarded: bool,
}

//
// ─── PROGRESS STATE ────────────────────────────────────────────────────────────
//

/// A learner's progress through one course.
///
/// The headline `percentage` is derived from section completion only.
/// Passed quizzes are kept in a separate activity ledger and never move it.
///
/// Stored records are checked on load: a `percentage` out of step with the
/// section ledger, or a finished course without a certificate, is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ProgressStateRecord")]
pub struct ProgressState {
    user_id: UserId,
    course_id: CourseId,
    percentage: u8,
    enrolled_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    last_accessed: Option<DateTime<Utc>>,
    sections: BTreeMap<SectionId, SectionProgress>,
    quiz_attempts: Vec<QuizAttempt>,
    total_time_spent_ms: u64,
    completed_activities: BTreeSet<String>,
    skill_progress: BTreeMap<SkillId, u8>,
    certificate_earned_at: Option<DateTime<Utc>>,
    user_notes: String,
    bookmarks: u32,
    progress_history: Vec<f64>,
}

/// Unchecked wire form of [`ProgressState`].
#[derive(Deserialize)]
struct ProgressStateRecord {
    user_id: UserId,
    course_id: CourseId,
    percentage: u8,
    enrolled_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    #[serde(default)]
    last_accessed: Option<DateTime<Utc>>,
    sections: BTreeMap<SectionId, SectionProgress>,
    #[serde(default)]
    quiz_attempts: Vec<QuizAttempt>,
    #[serde(default)]
    total_time_spent_ms: u64,
    #[serde(default)]
    completed_activities: BTreeSet<String>,
    #[serde(default)]
    skill_progress: BTreeMap<SkillId, u8>,
    #[serde(default)]
    certificate_earned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    user_notes: String,
    #[serde(default)]
    bookmarks: u32,
    progress_history: Vec<f64>,
}

impl TryFrom<ProgressStateRecord> for ProgressState {
    type Error = ProgressError;

    fn try_from(record: ProgressStateRecord) -> Result<Self, Self::Error> {
        let state = Self {
            user_id: record.user_id,
            course_id: record.course_id,
            percentage: record.percentage,
            enrolled_at: record.enrolled_at,
            last_updated: record.last_updated,
            last_accessed: record.last_accessed,
            sections: record.sections,
            quiz_attempts: record.quiz_attempts,
            total_time_spent_ms: record.total_time_spent_ms,
            completed_activities: record.completed_activities,
            skill_progress: record.skill_progress,
            certificate_earned_at: record.certificate_earned_at,
            user_notes: record.user_notes,
            bookmarks: record.bookmarks,
            progress_history: record.progress_history,
        };

        let derived = section_percentage(state.completed_section_count(), state.sections.len());
        if state.percentage != derived {
            return Err(ProgressError::InconsistentRecord(
                "percentage does not match completed sections",
            ));
        }
        if state.percentage == 100 && state.certificate_earned_at.is_none() {
            return Err(ProgressError::InconsistentRecord(
                "completed course has no certificate",
            ));
        }
        if state.skill_progress.values().any(|level| *level > 100) {
            return Err(ProgressError::InconsistentRecord("skill level above 100"));
        }
        Ok(state)
    }
}

impl ProgressState {
    /// Creates the enrollment record: 0%, a single history point, and the
    /// given outline registered as incomplete sections.
    #[must_use]
    pub fn enroll(
        user_id: UserId,
        course_id: CourseId,
        outline: &[SectionId],
        now: DateTime<Utc>,
    ) -> Self {
        let sections = outline
            .iter()
            .cloned()
            .map(|id| (id, SectionProgress::default()))
            .collect();
        Self {
            user_id,
            course_id,
            percentage: 0,
            enrolled_at: now,
            last_updated: now,
            last_accessed: None,
            sections,
            quiz_attempts: Vec::new(),
            total_time_spent_ms: 0,
            completed_activities: BTreeSet::new(),
            skill_progress: BTreeMap::new(),
            certificate_earned_at: None,
            user_notes: String::new(),
            bookmarks: 0,
            progress_history: vec![0.0],
        }
    }

    // ── accessors ──────────────────────────────────────────────────────────

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn course_id(&self) -> &CourseId {
        &self.course_id
    }

    #[must_use]
    pub fn percentage(&self) -> u8 {
        self.percentage
    }

    #[must_use]
    pub fn enrolled_at(&self) -> DateTime<Utc> {
        self.enrolled_at
    }

    #[must_use]
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    #[must_use]
    pub fn last_accessed(&self) -> Option<DateTime<Utc>> {
        self.last_accessed
    }

    #[must_use]
    pub fn sections(&self) -> &BTreeMap<SectionId, SectionProgress> {
        &self.sections
    }

    #[must_use]
    pub fn section(&self, id: &SectionId) -> Option<&SectionProgress> {
        self.sections.get(id)
    }

    #[must_use]
    pub fn is_section_completed(&self, id: &SectionId) -> bool {
        self.sections.get(id).is_some_and(SectionProgress::is_completed)
    }

    #[must_use]
    pub fn completed_section_count(&self) -> usize {
        self.sections.values().filter(|s| s.completed).count()
    }

    #[must_use]
    pub fn quiz_attempts(&self) -> &[QuizAttempt] {
        &self.quiz_attempts
    }

    #[must_use]
    pub fn total_time_spent_ms(&self) -> u64 {
        self.total_time_spent_ms
    }

    #[must_use]
    pub fn completed_activities(&self) -> &BTreeSet<String> {
        &self.completed_activities
    }

    /// Size of the activity ledger (passed quizzes and other activities).
    #[must_use]
    pub fn activity_count(&self) -> usize {
        self.completed_activities.len()
    }

    #[must_use]
    pub fn skill_progress(&self) -> &BTreeMap<SkillId, u8> {
        &self.skill_progress
    }

    #[must_use]
    pub fn certificate_earned(&self) -> bool {
        self.certificate_earned_at.is_some()
    }

    #[must_use]
    pub fn certificate_earned_at(&self) -> Option<DateTime<Utc>> {
        self.certificate_earned_at
    }

    #[must_use]
    pub fn user_notes(&self) -> &str {
        &self.user_notes
    }

    #[must_use]
    pub fn bookmarks(&self) -> u32 {
        self.bookmarks
    }

    /// Percentage snapshots, oldest first.
    #[must_use]
    pub fn progress_history(&self) -> &[f64] {
        &self.progress_history
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.percentage == 100
    }

    // ── sections ───────────────────────────────────────────────────────────

    /// Marks a section complete and records a history snapshot.
    ///
    /// Completing an already-completed section keeps its `completed_at` but
    /// overwrites the comprehension score. Unknown ids are added to the outline.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::ComprehensionOutOfRange` before any mutation if
    /// the score is not a finite value in `0..=100`.
    pub fn complete_section(
        &mut self,
        section_id: SectionId,
        comprehension: f64,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome, ProgressError> {
        self.complete_sections(std::slice::from_ref(&section_id), comprehension, now)
    }

    /// Batch form of [`complete_section`](Self::complete_section): all sections
    /// are applied, then a single history snapshot is appended.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NoSections` for an empty batch and
    /// `ProgressError::ComprehensionOutOfRange` for an invalid score.
    pub fn complete_sections(
        &mut self,
        section_ids: &[SectionId],
        comprehension: f64,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome, ProgressError> {
        if section_ids.is_empty() {
            return Err(ProgressError::NoSections);
        }
        validate_comprehension(comprehension)?;

        let mut newly_completed = 0;
        for id in section_ids {
            let section = self.sections.entry(id.clone()).or_default();
            if section.mark_completed(comprehension, now) {
                newly_completed += 1;
            }
        }

        let certificate_awarded = self.recompute_percentage(now);
        self.progress_history.push(f64::from(self.percentage));
        self.last_updated = now;

        Ok(CompletionOutcome {
            newly_completed,
            percentage: self.percentage,
            certificate_awarded,
        })
    }

    /// Adds time-on-task to a section and to the course total.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::UnknownSection` if the section is not in the
    /// outline; registering it here would shift the percentage.
    pub fn add_time_to_section(
        &mut self,
        section_id: &SectionId,
        time_ms: u64,
        now: DateTime<Utc>,
    ) -> Result<(), ProgressError> {
        let Some(section) = self.sections.get_mut(section_id) else {
            return Err(ProgressError::UnknownSection(section_id.clone()));
        };
        section.time_spent_ms = section.time_spent_ms.saturating_add(time_ms);
        self.total_time_spent_ms = self.total_time_spent_ms.saturating_add(time_ms);
        self.last_updated = now;
        Ok(())
    }

    /// Records a finished sub-section; repeated ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::UnknownSection` if the section is not in the outline.
    pub fn add_completed_sub_section(
        &mut self,
        section_id: &SectionId,
        sub_section: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ProgressError> {
        let Some(section) = self.sections.get_mut(section_id) else {
            return Err(ProgressError::UnknownSection(section_id.clone()));
        };
        section.completed_sub_sections.insert(sub_section.into());
        self.last_updated = now;
        Ok(())
    }

    /// Sets `percentage` from the section ledger and awards the certificate on
    /// the first 100% transition. Returns true when the certificate was awarded.
    fn recompute_percentage(&mut self, now: DateTime<Utc>) -> bool {
        self.percentage = section_percentage(self.completed_section_count(), self.sections.len());
        if self.percentage == 100 && self.certificate_earned_at.is_none() {
            self.certificate_earned_at = Some(now);
            return true;
        }
        false
    }

    // ── quizzes and activities ─────────────────────────────────────────────

    /// Appends a quiz attempt using the default passing score.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::ScoreOutOfRange` if `score > 100`.
    pub fn add_quiz_attempt(
        &mut self,
        quiz_id: QuizId,
        score: u8,
        time_spent_ms: u64,
        now: DateTime<Utc>,
    ) -> Result<&QuizAttempt, ProgressError> {
        self.add_quiz_attempt_with_threshold(quiz_id, score, time_spent_ms, DEFAULT_PASSING_SCORE, now)
    }

    /// Appends a quiz attempt. Attempt numbers count up per quiz; a score at or
    /// above `passing_score` adds `quiz_<id>` to the activity ledger.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::ScoreOutOfRange` if `score > 100`.
    pub fn add_quiz_attempt_with_threshold(
        &mut self,
        quiz_id: QuizId,
        score: u8,
        time_spent_ms: u64,
        passing_score: u8,
        now: DateTime<Utc>,
    ) -> Result<&QuizAttempt, ProgressError> {
        if score > 100 {
            return Err(ProgressError::ScoreOutOfRange(score));
        }

        let prior = self
            .quiz_attempts
            .iter()
            .filter(|a| a.quiz_id == quiz_id)
            .count();
        let attempt_number = u32::try_from(prior).unwrap_or(u32::MAX).saturating_add(1);

        if score >= passing_score {
            self.completed_activities
                .insert(format!("quiz_{}", quiz_id.as_str()));
        }
        self.total_time_spent_ms = self.total_time_spent_ms.saturating_add(time_spent_ms);
        self.last_updated = now;

        self.quiz_attempts.push(QuizAttempt {
            quiz_id,
            score,
            attempt_number,
            completed_at: now,
            time_spent_ms,
        });
        Ok(&self.quiz_attempts[self.quiz_attempts.len() - 1])
    }

    /// Adds an arbitrary activity to the ledger. Returns false if it was already present.
    pub fn add_completed_activity(&mut self, activity: impl Into<String>, now: DateTime<Utc>) -> bool {
        let inserted = self.completed_activities.insert(activity.into());
        if inserted {
            self.last_updated = now;
        }
        inserted
    }

    /// All attempts at one quiz, in submission order.
    #[must_use]
    pub fn quiz_attempts_for(&self, quiz_id: &QuizId) -> Vec<&QuizAttempt> {
        self.quiz_attempts
            .iter()
            .filter(|a| &a.quiz_id == quiz_id)
            .collect()
    }

    /// Highest-scoring attempt; the earliest wins a tie.
    #[must_use]
    pub fn best_quiz_attempt(&self, quiz_id: &QuizId) -> Option<&QuizAttempt> {
        let mut best: Option<&QuizAttempt> = None;
        for attempt in self.quiz_attempts.iter().filter(|a| &a.quiz_id == quiz_id) {
            if best.is_none_or(|b| attempt.score > b.score) {
                best = Some(attempt);
            }
        }
        best
    }

    /// Most recent attempt by `completed_at`; the earliest inserted wins a tie.
    #[must_use]
    pub fn last_quiz_attempt(&self, quiz_id: &QuizId) -> Option<&QuizAttempt> {
        let mut last: Option<&QuizAttempt> = None;
        for attempt in self.quiz_attempts.iter().filter(|a| &a.quiz_id == quiz_id) {
            if last.is_none_or(|l| attempt.completed_at > l.completed_at) {
                last = Some(attempt);
            }
        }
        last
    }

    /// Mean score over every attempt, `0.0` when there are none.
    #[must_use]
    pub fn average_quiz_score(&self) -> f64 {
        if self.quiz_attempts.is_empty() {
            return 0.0;
        }
        let total: u64 = self.quiz_attempts.iter().map(|a| u64::from(a.score)).sum();
        #[allow(clippy::cast_precision_loss)]
        let avg = total as f64 / self.quiz_attempts.len() as f64;
        avg
    }

    // ── skills, notes, bookmarks ───────────────────────────────────────────

    /// Sets a per-course skill level.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::SkillLevelOutOfRange` if `level > 100`.
    pub fn update_skill(&mut self, skill: SkillId, level: u8) -> Result<(), ProgressError> {
        if level > 100 {
            return Err(ProgressError::SkillLevelOutOfRange(level));
        }
        self.skill_progress.insert(skill, level);
        Ok(())
    }

    /// Per-course skill level, `0` when never set.
    #[must_use]
    pub fn skill_level(&self, skill: &SkillId) -> u8 {
        self.skill_progress.get(skill).copied().unwrap_or(0)
    }

    pub fn update_user_note(&mut self, note: impl Into<String>, now: DateTime<Utc>) {
        self.user_notes = note.into();
        self.last_updated = now;
    }

    pub fn add_bookmark(&mut self) {
        self.bookmarks = self.bookmarks.saturating_add(1);
    }

    pub fn remove_bookmark(&mut self) {
        self.bookmarks = self.bookmarks.saturating_sub(1);
    }

    /// Records that the learner opened the course.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed = Some(now);
    }

    // ── analytics ──────────────────────────────────────────────────────────

    /// Whole days since enrollment, floored.
    #[must_use]
    pub fn days_enrolled(&self, now: DateTime<Utc>) -> i64 {
        whole_days_between(self.enrolled_at, now)
    }

    /// Percentage points gained per enrolled day; `0.0` on the enrollment day.
    #[must_use]
    pub fn daily_progress_rate(&self, now: DateTime<Utc>) -> f64 {
        let days = self.days_enrolled(now);
        if days == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = f64::from(self.percentage) / days as f64;
        rate
    }

    /// Extrapolates the current daily rate to 100%.
    #[must_use]
    pub fn predict_completion(&self, now: DateTime<Utc>) -> CompletionForecast {
        let daily_rate = self.daily_progress_rate(now);
        if daily_rate <= 0.0 {
            return CompletionForecast::Unknown;
        }
        let days_remaining = f64::from(100 - self.percentage) / daily_rate;
        #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
        let millis = (days_remaining * MILLIS_PER_DAY as f64) as i64;
        match now.checked_add_signed(Duration::milliseconds(millis)) {
            Some(at) => CompletionForecast::Expected(at),
            None => CompletionForecast::Unknown,
        }
    }

    /// Total time divided by activity count, `0` when no activity was completed.
    #[must_use]
    pub fn average_session_time_ms(&self) -> u64 {
        match u64::try_from(self.completed_activities.len()) {
            Ok(0) | Err(_) => 0,
            Ok(count) => self.total_time_spent_ms / count,
        }
    }

    /// True if the record was updated within the last `days` days.
    ///
    /// A window reaching past the earliest representable instant covers
    /// every update.
    #[must_use]
    pub fn is_active_recently(&self, days: u32, now: DateTime<Utc>) -> bool {
        match now.checked_sub_signed(Duration::days(i64::from(days))) {
            Some(threshold) => self.last_updated > threshold,
            None => true,
        }
    }

    /// Trend using the default stable band of ±5 points.
    #[must_use]
    pub fn progress_trend(&self) -> ProgressTrend {
        self.progress_trend_within(DEFAULT_TREND_BAND)
    }

    /// Compares the mean of the last three history points with the mean of
    /// the up-to-three points before them. Differences within `±band`
    /// (inclusive) are stable; fewer than three points is stable.
    #[must_use]
    pub fn progress_trend_within(&self, band: f64) -> ProgressTrend {
        let history = &self.progress_history;
        if history.len() < TREND_WINDOW {
            return ProgressTrend::Stable;
        }
        let split = history.len() - TREND_WINDOW;
        let recent = mean(&history[split..]);
        let older = mean(&history[split.saturating_sub(TREND_WINDOW)..split]);

        let difference = recent - older;
        if difference > band {
            ProgressTrend::Improving
        } else if difference < -band {
            ProgressTrend::Declining
        } else {
            ProgressTrend::Stable
        }
    }
}

/// `round(100 * completed / total)`, `0` for an empty outline.
#[must_use]
pub fn section_percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = completed.min(total) as f64 / total as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let pct = (ratio * 100.0).round() as u8;
    pct
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let avg = values.iter().sum::<f64>() / values.len() as f64;
    avg
}

fn validate_comprehension(score: f64) -> Result<(), ProgressError> {
    if score.is_finite() && (0.0..=100.0).contains(&score) {
        Ok(())
    } else {
        Err(ProgressError::ComprehensionOutOfRange(score))
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
