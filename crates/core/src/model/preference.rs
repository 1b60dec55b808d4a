use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::course::CourseLevel;
use crate::model::ids::UserId;

/// Content modality a learner prefers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningStyle {
    #[default]
    Visual,
    Auditory,
    Reading,
    Practical,
}

/// Learner-stated preferences consumed by relevance scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPreference {
    pub user_id: UserId,
    #[serde(default)]
    pub preferred_categories: BTreeSet<String>,
    #[serde(default)]
    pub preferred_tags: BTreeSet<String>,
    #[serde(default)]
    pub preferred_learning_style: LearningStyle,
    #[serde(default = "default_difficulty")]
    pub preferred_difficulty: CourseLevel,
    #[serde(default = "default_session_minutes")]
    pub preferred_session_minutes: u32,
}

fn default_difficulty() -> CourseLevel {
    CourseLevel::Intermediate
}

fn default_session_minutes() -> u32 {
    30
}

impl LearningPreference {
    /// Preferences with no categories or tags, visual style, intermediate difficulty.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            preferred_categories: BTreeSet::new(),
            preferred_tags: BTreeSet::new(),
            preferred_learning_style: LearningStyle::default(),
            preferred_difficulty: default_difficulty(),
            preferred_session_minutes: default_session_minutes(),
        }
    }

    /// Adds a category; duplicates are ignored.
    pub fn add_category(&mut self, category: impl Into<String>) {
        self.preferred_categories.insert(category.into());
    }

    /// Adds a tag; duplicates are ignored.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.preferred_tags.insert(tag.into());
    }
}
