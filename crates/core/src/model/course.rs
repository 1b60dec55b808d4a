use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::ids::{CourseId, SectionId, SkillId};

//
// ─── LEVEL ─────────────────────────────────────────────────────────────────────
//

/// Difficulty level advertised by a catalog course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum CourseLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl CourseLevel {
    /// Ordinal used by skill matching: beginner 1, intermediate 2, advanced 3.
    #[must_use]
    pub fn ordinal(self) -> u8 {
        match self {
            CourseLevel::Beginner => 1,
            CourseLevel::Intermediate => 2,
            CourseLevel::Advanced => 3,
        }
    }

    /// Parses a catalog label, accepting the French labels used by older catalogs.
    ///
    /// Unknown labels are treated as beginner.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "intermediate" | "intermédiaire" | "intermediaire" => CourseLevel::Intermediate,
            "advanced" | "expert" | "avancé" | "avance" => CourseLevel::Advanced,
            _ => CourseLevel::Beginner,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CourseLevel::Beginner => "beginner",
            CourseLevel::Intermediate => "intermediate",
            CourseLevel::Advanced => "advanced",
        }
    }
}

impl From<String> for CourseLevel {
    fn from(label: String) -> Self {
        Self::from_label(&label)
    }
}

impl FromStr for CourseLevel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_label(s))
    }
}

impl fmt::Display for CourseLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── COURSE ────────────────────────────────────────────────────────────────────
//

/// Read-only catalog entry consumed by scoring and enrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub course_id: CourseId,
    #[serde(default)]
    pub title: String,
    pub category: String,
    pub level: CourseLevel,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub duration_minutes: u32,
    /// Number of learners enrolled; drives the popularity fallback.
    #[serde(default)]
    pub enrolled_count: u32,
    /// Course outline registered on enrollment.
    #[serde(default)]
    pub section_ids: Vec<SectionId>,
    /// Skills exercised by the course.
    #[serde(default)]
    pub skills: BTreeSet<SkillId>,
}

impl Course {
    #[must_use]
    pub fn new(course_id: CourseId, category: impl Into<String>, level: CourseLevel) -> Self {
        Self {
            course_id,
            title: String::new(),
            category: category.into(),
            level,
            tags: BTreeSet::new(),
            duration_minutes: 0,
            enrolled_count: 0,
            section_ids: Vec::new(),
            skills: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_sections(mut self, sections: Vec<SectionId>) -> Self {
        self.section_ids = sections;
        self
    }

    #[must_use]
    pub fn with_skills<I>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = SkillId>,
    {
        self.skills = skills.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_enrolled_count(mut self, count: u32) -> Self {
        self.enrolled_count = count;
        self
    }

    #[must_use]
    pub fn with_duration_minutes(mut self, minutes: u32) -> Self {
        self.duration_minutes = minutes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_labels_map_to_ordinals() {
        assert_eq!(CourseLevel::from_label("Beginner").ordinal(), 1);
        assert_eq!(CourseLevel::from_label("intermédiaire").ordinal(), 2);
        assert_eq!(CourseLevel::from_label("expert").ordinal(), 3);
        assert_eq!(CourseLevel::from_label("avancé"), CourseLevel::Advanced);
        assert_eq!(CourseLevel::from_label("mystery"), CourseLevel::Beginner);
    }

    #[test]
    fn catalog_json_fills_defaults() {
        let raw = r#"{"course_id":"rust-101","category":"programming","level":"beginner"}"#;
        let course: Course = serde_json::from_str(raw).unwrap();
        assert!(course.tags.is_empty());
        assert_eq!(course.enrolled_count, 0);
        assert_eq!(course.level, CourseLevel::Beginner);
    }

    #[test]
    fn catalog_json_accepts_legacy_level_labels() {
        let raw = r#"{"course_id":"ux","category":"design","level":"Avancé"}"#;
        let course: Course = serde_json::from_str(raw).unwrap();
        assert_eq!(course.level, CourseLevel::Advanced);
        assert_eq!(serde_json::to_value(course.level).unwrap(), "advanced");
    }
}
