use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::progress::{DEFAULT_PASSING_SCORE, DEFAULT_TREND_BAND};

/// Default cap on recommendation lists.
pub const DEFAULT_RECOMMENDATION_LIMIT: usize = 10;

/// Default quiz score that triggers a high-score milestone.
pub const DEFAULT_HIGH_SCORE_MILESTONE: u8 = 90;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("passing score must be within 1..=100")]
    InvalidPassingScore,

    #[error("high-score milestone must be within 1..=100")]
    InvalidHighScoreMilestone,

    #[error("recommendation limit must be > 0")]
    InvalidRecommendationLimit,

    #[error("trend band must be finite and >= 0")]
    InvalidTrendBand,

    #[error("relevance weights must be finite, non-negative and sum to 1")]
    InvalidWeights,
}

//
// ─── RELEVANCE WEIGHTS ─────────────────────────────────────────────────────────
//

/// Weights of the four relevance factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelevanceWeights {
    pub goal: f64,
    pub skill: f64,
    pub history: f64,
    pub style: f64,
}

impl Default for RelevanceWeights {
    fn default() -> Self {
        Self {
            goal: 0.4,
            skill: 0.3,
            history: 0.2,
            style: 0.1,
        }
    }
}

impl RelevanceWeights {
    fn validate(self) -> Result<Self, SettingsError> {
        let parts = [self.goal, self.skill, self.history, self.style];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(SettingsError::InvalidWeights);
        }
        if (parts.iter().sum::<f64>() - 1.0).abs() > 1e-6 {
            return Err(SettingsError::InvalidWeights);
        }
        Ok(self)
    }
}

//
// ─── ENGINE SETTINGS ───────────────────────────────────────────────────────────
//

/// Validated tuning knobs for progress tracking and recommendations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSettings {
    passing_score: u8,
    high_score_milestone: u8,
    recommendation_limit: usize,
    trend_band: f64,
    weights: RelevanceWeights,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            passing_score: DEFAULT_PASSING_SCORE,
            high_score_milestone: DEFAULT_HIGH_SCORE_MILESTONE,
            recommendation_limit: DEFAULT_RECOMMENDATION_LIMIT,
            trend_band: DEFAULT_TREND_BAND,
            weights: RelevanceWeights::default(),
        }
    }
}

impl EngineSettings {
    #[must_use]
    pub fn passing_score(&self) -> u8 {
        self.passing_score
    }

    #[must_use]
    pub fn high_score_milestone(&self) -> u8 {
        self.high_score_milestone
    }

    #[must_use]
    pub fn recommendation_limit(&self) -> usize {
        self.recommendation_limit
    }

    #[must_use]
    pub fn trend_band(&self) -> f64 {
        self.trend_band
    }

    #[must_use]
    pub fn weights(&self) -> RelevanceWeights {
        self.weights
    }
}

/// Partially specified settings, e.g. read from a config file.
///
/// Missing fields take the defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettingsDraft {
    pub passing_score: Option<u8>,
    pub high_score_milestone: Option<u8>,
    pub recommendation_limit: Option<usize>,
    pub trend_band: Option<f64>,
    pub weights: Option<RelevanceWeights>,
}

impl EngineSettingsDraft {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the draft and fill in defaults.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` naming the first invalid field.
    pub fn validate(self) -> Result<EngineSettings, SettingsError> {
        let defaults = EngineSettings::default();

        let passing_score = self.passing_score.unwrap_or(defaults.passing_score);
        if !(1..=100).contains(&passing_score) {
            return Err(SettingsError::InvalidPassingScore);
        }
        let high_score_milestone = self
            .high_score_milestone
            .unwrap_or(defaults.high_score_milestone);
        if !(1..=100).contains(&high_score_milestone) {
            return Err(SettingsError::InvalidHighScoreMilestone);
        }
        let recommendation_limit = self
            .recommendation_limit
            .unwrap_or(defaults.recommendation_limit);
        if recommendation_limit == 0 {
            return Err(SettingsError::InvalidRecommendationLimit);
        }
        let trend_band = self.trend_band.unwrap_or(defaults.trend_band);
        if !trend_band.is_finite() || trend_band < 0.0 {
            return Err(SettingsError::InvalidTrendBand);
        }
        let weights = self.weights.unwrap_or(defaults.weights).validate()?;

        Ok(EngineSettings {
            passing_score,
            high_score_milestone,
            recommendation_limit,
            trend_band,
            weights,
        })
    }
}
