use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{QuizId, SkillId, UserId};
use crate::time::{MILLIS_PER_DAY, millis_between};

/// Level assigned to a category or skill before any evidence exists.
pub const INITIAL_LEVEL: f64 = 0.5;

/// Skill level below which a target skill counts as a gap.
pub const SKILL_GAP_THRESHOLD: f64 = 0.5;

/// Average quiz score at or above which a quiz counts as passed.
pub const QUIZ_SUCCESS_THRESHOLD: f64 = 70.0;

const RETAINED_WEIGHT: f64 = 0.7;
const RECENT_WEIGHT: f64 = 0.3;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum PerformanceError {
    #[error("level must be a finite value within 0.0..=1.0, got {0}")]
    LevelOutOfRange(f64),

    #[error("quiz score must be a finite value within 0..=100, got {0}")]
    ScoreOutOfRange(f64),
}

/// Proficiency model for one learner in one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceModel {
    user_id: UserId,
    category: String,
    overall_level: f64,
    skill_levels: BTreeMap<SkillId, f64>,
    revision_counts: BTreeMap<SkillId, u32>,
    last_revision_times: BTreeMap<SkillId, DateTime<Utc>>,
    quiz_attempts: BTreeMap<QuizId, u32>,
    quiz_average_scores: BTreeMap<QuizId, f64>,
    total_learning_time_ms: u64,
    completed_sections: u32,
}

impl PerformanceModel {
    #[must_use]
    pub fn new(user_id: UserId, category: impl Into<String>) -> Self {
        Self {
            user_id,
            category: category.into(),
            overall_level: INITIAL_LEVEL,
            skill_levels: BTreeMap::new(),
            revision_counts: BTreeMap::new(),
            last_revision_times: BTreeMap::new(),
            quiz_attempts: BTreeMap::new(),
            quiz_average_scores: BTreeMap::new(),
            total_learning_time_ms: 0,
            completed_sections: 0,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn overall_level(&self) -> f64 {
        self.overall_level
    }

    /// # Errors
    ///
    /// Returns `PerformanceError::LevelOutOfRange` for values outside `0.0..=1.0`.
    pub fn set_overall_level(&mut self, level: f64) -> Result<(), PerformanceError> {
        self.overall_level = validate_level(level)?;
        Ok(())
    }

    // ── skills ─────────────────────────────────────────────────────────────

    /// Reads a skill level, inserting the initial `0.5` if the skill is new.
    ///
    /// The insertion is observable: the skill shows up in [`skill_levels`](Self::skill_levels)
    /// afterwards.
    pub fn get_or_init_skill_level(&mut self, skill: &SkillId) -> f64 {
        *self
            .skill_levels
            .entry(skill.clone())
            .or_insert(INITIAL_LEVEL)
    }

    /// Side-effect free read.
    #[must_use]
    pub fn skill_level(&self, skill: &SkillId) -> Option<f64> {
        self.skill_levels.get(skill).copied()
    }

    /// # Errors
    ///
    /// Returns `PerformanceError::LevelOutOfRange` for values outside `0.0..=1.0`.
    pub fn set_skill_level(&mut self, skill: SkillId, level: f64) -> Result<(), PerformanceError> {
        let level = validate_level(level)?;
        self.skill_levels.insert(skill, level);
        Ok(())
    }

    #[must_use]
    pub fn skill_levels(&self) -> &BTreeMap<SkillId, f64> {
        &self.skill_levels
    }

    /// Target skills the learner has no level for, or a level below
    /// [`SKILL_GAP_THRESHOLD`], in the order given.
    #[must_use]
    pub fn identify_skill_gaps<'a>(
        &self,
        targets: impl IntoIterator<Item = &'a SkillId>,
    ) -> Vec<SkillId> {
        targets
            .into_iter()
            .filter(|skill| {
                self.skill_level(skill)
                    .is_none_or(|level| level < SKILL_GAP_THRESHOLD)
            })
            .cloned()
            .collect()
    }

    // ── revisions ──────────────────────────────────────────────────────────

    #[must_use]
    pub fn revision_count(&self, skill: &SkillId) -> u32 {
        self.revision_counts.get(skill).copied().unwrap_or(0)
    }

    /// Counts a revision and stamps its time. Sole writer of revision timestamps.
    pub fn increment_revision_count(&mut self, skill: &SkillId, now: DateTime<Utc>) {
        let count = self.revision_counts.entry(skill.clone()).or_insert(0);
        *count = count.saturating_add(1);
        self.last_revision_times.insert(skill.clone(), now);
    }

    #[must_use]
    pub fn last_revision_time(&self, skill: &SkillId) -> Option<DateTime<Utc>> {
        self.last_revision_times.get(skill).copied()
    }

    #[must_use]
    pub fn last_revision_times(&self) -> &BTreeMap<SkillId, DateTime<Utc>> {
        &self.last_revision_times
    }

    /// True when at least one skill was revised and none is older than `max_days`.
    #[must_use]
    pub fn is_consistent_learner(&self, max_days: u32, now: DateTime<Utc>) -> bool {
        if self.last_revision_times.is_empty() {
            return false;
        }
        let max_interval = i64::from(max_days) * MILLIS_PER_DAY;
        self.last_revision_times
            .values()
            .all(|last| millis_between(*last, now) <= max_interval)
    }

    /// Skills whose last revision is strictly older than `days_threshold`,
    /// mapped to their age in whole days.
    #[must_use]
    pub fn skills_needing_revision(
        &self,
        days_threshold: u32,
        now: DateTime<Utc>,
    ) -> BTreeMap<SkillId, i64> {
        let threshold = i64::from(days_threshold) * MILLIS_PER_DAY;
        self.last_revision_times
            .iter()
            .filter_map(|(skill, last)| {
                let age = millis_between(*last, now);
                (age > threshold).then(|| (skill.clone(), age / MILLIS_PER_DAY))
            })
            .collect()
    }

    // ── quizzes ────────────────────────────────────────────────────────────

    /// Records a quiz attempt and updates the recency-weighted average.
    ///
    /// The first attempt sets the average to the score. Attempt `n > 1` uses
    /// `(old * (n - 1) * 0.7 + score * 0.3 * n) / n`, so the order of attempts
    /// matters.
    ///
    /// # Errors
    ///
    /// Returns `PerformanceError::ScoreOutOfRange` for values outside `0..=100`.
    pub fn record_quiz_attempt(&mut self, quiz_id: &QuizId, score: f64) -> Result<f64, PerformanceError> {
        if !score.is_finite() || !(0.0..=100.0).contains(&score) {
            return Err(PerformanceError::ScoreOutOfRange(score));
        }

        let attempts = self.quiz_attempts.entry(quiz_id.clone()).or_insert(0);
        *attempts = attempts.saturating_add(1);
        let n = f64::from(*attempts);

        let new_average = match self.quiz_average_scores.get(quiz_id) {
            Some(old) if *attempts > 1 => {
                (old * (n - 1.0) * RETAINED_WEIGHT + score * RECENT_WEIGHT * n) / n
            }
            _ => score,
        };
        self.quiz_average_scores.insert(quiz_id.clone(), new_average);
        Ok(new_average)
    }

    #[must_use]
    pub fn quiz_attempts(&self, quiz_id: &QuizId) -> u32 {
        self.quiz_attempts.get(quiz_id).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn quiz_average_score(&self, quiz_id: &QuizId) -> f64 {
        self.quiz_average_scores.get(quiz_id).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn quiz_average_scores(&self) -> &BTreeMap<QuizId, f64> {
        &self.quiz_average_scores
    }

    /// Mean of the per-quiz averages, `0.0` when no quiz was recorded.
    #[must_use]
    pub fn average_quiz_score(&self) -> f64 {
        if self.quiz_average_scores.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let avg = self.quiz_average_scores.values().sum::<f64>()
            / self.quiz_average_scores.len() as f64;
        avg
    }

    /// Percentage of quizzes whose average is at least 70, `0.0` when none.
    #[must_use]
    pub fn quiz_success_rate(&self) -> f64 {
        if self.quiz_average_scores.is_empty() {
            return 0.0;
        }
        let passed = self
            .quiz_average_scores
            .values()
            .filter(|score| **score >= QUIZ_SUCCESS_THRESHOLD)
            .count();
        #[allow(clippy::cast_precision_loss)]
        let rate = passed as f64 / self.quiz_average_scores.len() as f64 * 100.0;
        rate
    }

    // ── totals ─────────────────────────────────────────────────────────────

    pub fn add_learning_time(&mut self, time_ms: u64) {
        self.total_learning_time_ms = self.total_learning_time_ms.saturating_add(time_ms);
    }

    #[must_use]
    pub fn total_learning_time_ms(&self) -> u64 {
        self.total_learning_time_ms
    }

    pub fn increment_completed_sections(&mut self) {
        self.completed_sections = self.completed_sections.saturating_add(1);
    }

    #[must_use]
    pub fn completed_sections(&self) -> u32 {
        self.completed_sections
    }
}

fn validate_level(level: f64) -> Result<f64, PerformanceError> {
    if level.is_finite() && (0.0..=1.0).contains(&level) {
        Ok(level)
    } else {
        Err(PerformanceError::LevelOutOfRange(level))
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
