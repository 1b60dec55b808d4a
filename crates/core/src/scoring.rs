use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::model::{Course, CourseLevel, LearningPreference, PerformanceModel, RelevanceWeights};

/// History score used when the learner has no courses in a category yet.
pub const NEUTRAL_HISTORY_SCORE: f64 = 0.7;

/// Style score used until courses carry modality metadata.
pub const NEUTRAL_STYLE_SCORE: f64 = 0.8;

//
// ─── LEARNER PROFILE ───────────────────────────────────────────────────────────
//

/// Enrollment outcomes for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryHistory {
    pub enrolled: u32,
    pub completed: u32,
}

/// Everything the scorer knows about a learner.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnerProfile {
    preferences: LearningPreference,
    category_levels: BTreeMap<String, f64>,
    history: BTreeMap<String, CategoryHistory>,
}

impl LearnerProfile {
    #[must_use]
    pub fn new(preferences: LearningPreference) -> Self {
        Self {
            preferences,
            category_levels: BTreeMap::new(),
            history: BTreeMap::new(),
        }
    }

    /// Uses the model's overall level as the learner's level in its category.
    ///
    /// A model without any quiz attempt still carries the initial level, which
    /// says nothing about the learner, so it is ignored.
    pub fn add_performance(&mut self, model: &PerformanceModel) {
        if model.quiz_average_scores().is_empty() {
            return;
        }
        self.category_levels
            .insert(model.category().to_string(), model.overall_level());
    }

    /// Counts one enrolled course in `category`.
    pub fn record_course(&mut self, category: &str, completed: bool) {
        let entry = self.history.entry(category.to_string()).or_default();
        entry.enrolled = entry.enrolled.saturating_add(1);
        if completed {
            entry.completed = entry.completed.saturating_add(1);
        }
    }

    #[must_use]
    pub fn preferences(&self) -> &LearningPreference {
        &self.preferences
    }

    /// Learner level in a category on the 0..=1 scale, if any evidence exists.
    #[must_use]
    pub fn category_level(&self, category: &str) -> Option<f64> {
        self.category_levels.get(category).copied()
    }

    #[must_use]
    pub fn category_history(&self, category: &str) -> Option<CategoryHistory> {
        self.history.get(category).copied()
    }

    /// Categories with a performance model or an enrollment.
    #[must_use]
    pub fn history_categories(&self) -> BTreeSet<&str> {
        self.category_levels
            .keys()
            .chain(self.history.keys())
            .map(String::as_str)
            .collect()
    }

    #[must_use]
    pub fn has_history(&self) -> bool {
        !self.category_levels.is_empty() || !self.history.is_empty()
    }
}

//
// ─── FACTORS ───────────────────────────────────────────────────────────────────
//

/// A pluggable relevance input in `0.0..=1.0`.
pub trait ScoringFactor: Send + Sync {
    fn score(&self, learner: &LearnerProfile, course: &Course) -> f64;
}

/// Returns the same score for every course.
#[derive(Debug, Clone, Copy)]
pub struct ConstantFactor(pub f64);

impl ScoringFactor for ConstantFactor {
    fn score(&self, _learner: &LearnerProfile, _course: &Course) -> f64 {
        self.0
    }
}

/// Share of the learner's courses in the same category that were completed.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionHistoryFactor;

impl ScoringFactor for CompletionHistoryFactor {
    fn score(&self, learner: &LearnerProfile, course: &Course) -> f64 {
        match learner.category_history(&course.category) {
            Some(h) if h.enrolled > 0 => f64::from(h.completed) / f64::from(h.enrolled),
            _ => NEUTRAL_HISTORY_SCORE,
        }
    }
}

/// How well a course serves the learner's stated categories and tags.
#[must_use]
pub fn goal_match(preferences: &LearningPreference, course: &Course) -> f64 {
    let mut score = 0.0;
    if preferences.preferred_categories.contains(&course.category) {
        score += 0.5;
    }
    if !course.tags.is_empty() {
        let matching = course
            .tags
            .iter()
            .filter(|tag| preferences.preferred_tags.contains(*tag))
            .count();
        #[allow(clippy::cast_precision_loss)]
        let share = matching as f64 / course.tags.len() as f64;
        score += 0.5 * share;
    }
    score
}

/// How well the course level fits the learner's level in its category.
///
/// `learner_level` is on the 0..=1 scale and maps onto the course ordinals
/// as `1 + 2 * level`. Buckets are checked in order; the first match wins.
#[must_use]
pub fn skill_match(learner_level: Option<f64>, level: CourseLevel) -> f64 {
    let course_level = f64::from(level.ordinal());
    let Some(learner_level) = learner_level else {
        return if level == CourseLevel::Beginner { 1.0 } else { 0.5 };
    };
    let user_level = 1.0 + 2.0 * learner_level.clamp(0.0, 1.0);
    let diff = (user_level - course_level).abs();

    if diff <= 1.0 && course_level > user_level {
        1.0
    } else if diff <= 0.5 {
        0.8
    } else if diff <= 1.0 {
        0.6
    } else {
        0.3
    }
}

//
// ─── RESULTS ───────────────────────────────────────────────────────────────────
//

/// Per-factor scores and their weighted total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RelevanceBreakdown {
    pub goal: f64,
    pub skill: f64,
    pub history: f64,
    pub style: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCourse {
    pub course: Course,
    pub relevance: RelevanceBreakdown,
}

impl ScoredCourse {
    #[must_use]
    pub fn score(&self) -> f64 {
        self.relevance.total
    }
}

/// A capped recommendation list and how it was produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", content = "courses", rename_all = "snake_case")]
pub enum Recommendations {
    /// No learner history: most-enrolled courses first.
    Popular(Vec<Course>),
    /// Ranked by relevance over the learner's categories.
    Personalized(Vec<ScoredCourse>),
}

impl Recommendations {
    #[must_use]
    pub fn courses(&self) -> Vec<&Course> {
        match self {
            Recommendations::Popular(courses) => courses.iter().collect(),
            Recommendations::Personalized(scored) => scored.iter().map(|s| &s.course).collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Recommendations::Popular(courses) => courses.len(),
            Recommendations::Personalized(scored) => scored.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_personalized(&self) -> bool {
        matches!(self, Recommendations::Personalized(_))
    }
}

//
// ─── SCORER ────────────────────────────────────────────────────────────────────
//

/// Multi-factor course ranking.
pub struct RelevanceScorer {
    weights: RelevanceWeights,
    history: Box<dyn ScoringFactor>,
    style: Box<dyn ScoringFactor>,
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self::new(RelevanceWeights::default())
    }
}

impl std::fmt::Debug for RelevanceScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelevanceScorer")
            .field("weights", &self.weights)
            .finish_non_exhaustive()
    }
}

impl RelevanceScorer {
    /// Scorer with completion-history and neutral style factors.
    #[must_use]
    pub fn new(weights: RelevanceWeights) -> Self {
        Self {
            weights,
            history: Box::new(CompletionHistoryFactor),
            style: Box::new(ConstantFactor(NEUTRAL_STYLE_SCORE)),
        }
    }

    #[must_use]
    pub fn with_history_factor(mut self, factor: impl ScoringFactor + 'static) -> Self {
        self.history = Box::new(factor);
        self
    }

    #[must_use]
    pub fn with_style_factor(mut self, factor: impl ScoringFactor + 'static) -> Self {
        self.style = Box::new(factor);
        self
    }

    #[must_use]
    pub fn weights(&self) -> RelevanceWeights {
        self.weights
    }

    /// Scores one course.
    #[must_use]
    pub fn relevance(&self, learner: &LearnerProfile, course: &Course) -> RelevanceBreakdown {
        let goal = goal_match(learner.preferences(), course);
        let skill = skill_match(learner.category_level(&course.category), course.level);
        let history = self.history.score(learner, course).clamp(0.0, 1.0);
        let style = self.style.score(learner, course).clamp(0.0, 1.0);

        let w = self.weights;
        let total = (goal * w.goal + skill * w.skill + history * w.history + style * w.style)
            .clamp(0.0, 1.0);

        RelevanceBreakdown {
            goal,
            skill,
            history,
            style,
            total,
        }
    }

    /// Every course, best first. Equal scores keep catalog order.
    #[must_use]
    pub fn learning_path(&self, learner: &LearnerProfile, catalog: &[Course]) -> Vec<ScoredCourse> {
        self.rank(learner, catalog.iter())
    }

    /// Capped recommendations.
    ///
    /// A learner without any category history gets the popularity list. Otherwise
    /// candidates from every history or preferred category are merged in
    /// catalog order, ranked, and only then truncated to `limit`. If no
    /// catalog course falls in those categories the whole catalog is ranked.
    #[must_use]
    pub fn recommend(
        &self,
        learner: &LearnerProfile,
        catalog: &[Course],
        limit: usize,
    ) -> Recommendations {
        if !learner.has_history() {
            return Recommendations::Popular(popular_courses(catalog, limit));
        }

        let mut categories = learner.history_categories();
        categories.extend(
            learner
                .preferences()
                .preferred_categories
                .iter()
                .map(String::as_str),
        );

        let candidates: Vec<&Course> = catalog
            .iter()
            .filter(|c| categories.contains(c.category.as_str()))
            .collect();

        let mut ranked = if candidates.is_empty() {
            self.rank(learner, catalog.iter())
        } else {
            self.rank(learner, candidates.into_iter())
        };
        ranked.truncate(limit);
        Recommendations::Personalized(ranked)
    }

    fn rank<'a>(
        &self,
        learner: &LearnerProfile,
        courses: impl Iterator<Item = &'a Course>,
    ) -> Vec<ScoredCourse> {
        let mut scored: Vec<ScoredCourse> = courses
            .map(|course| ScoredCourse {
                relevance: self.relevance(learner, course),
                course: course.clone(),
            })
            .collect();
        // `sort_by` is stable, so ties keep their input order.
        scored.sort_by(|a, b| b.score().total_cmp(&a.score()));
        scored
    }
}

/// Courses by enrollment count, highest first; ties keep catalog order.
#[must_use]
pub fn popular_courses(catalog: &[Course], limit: usize) -> Vec<Course> {
    let mut courses = catalog.to_vec();
    courses.sort_by(|a, b| b.enrolled_count.cmp(&a.enrolled_count));
    courses.truncate(limit);
    courses
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CourseId, QuizId, UserId};

    fn course(id: &str, category: &str, level: CourseLevel) -> Course {
        Course::new(CourseId::new(id).unwrap(), category, level)
    }

    fn prefs() -> LearningPreference {
        LearningPreference::new(UserId::new("u1").unwrap())
    }

    fn model(category: &str, level: f64) -> PerformanceModel {
        let mut m = PerformanceModel::new(UserId::new("u1").unwrap(), category);
        m.record_quiz_attempt(&QuizId::new("q1").unwrap(), 50.0).unwrap();
        m.set_overall_level(level).unwrap();
        m
    }

    #[test]
    fn category_match_without_tag_overlap_scores_half() {
        let mut p = prefs();
        p.add_category("design");
        let c = course("c1", "design", CourseLevel::Beginner).with_tags(["figma", "ux"]);
        assert_eq!(goal_match(&p, &c), 0.5);
    }

    #[test]
    fn tag_overlap_is_proportional() {
        let mut p = prefs();
        p.add_tag("rust");
        let c = course("c1", "programming", CourseLevel::Beginner).with_tags(["rust", "async"]);
        assert_eq!(goal_match(&p, &c), 0.25);

        let untagged = course("c2", "programming", CourseLevel::Beginner);
        assert_eq!(goal_match(&p, &untagged), 0.0);
    }

    #[test]
    fn skill_match_without_history_prefers_beginner() {
        assert_eq!(skill_match(None, CourseLevel::Beginner), 1.0);
        assert_eq!(skill_match(None, CourseLevel::Advanced), 0.5);
    }

    #[test]
    fn skill_match_buckets_in_priority_order() {
        // level 0.0 -> ordinal 1.0
        assert_eq!(skill_match(Some(0.0), CourseLevel::Intermediate), 1.0);
        assert_eq!(skill_match(Some(0.0), CourseLevel::Beginner), 0.8);
        assert_eq!(skill_match(Some(0.0), CourseLevel::Advanced), 0.3);
        // level 1.0 -> ordinal 3.0
        assert_eq!(skill_match(Some(1.0), CourseLevel::Intermediate), 0.6);
        // level 0.75 -> ordinal 2.5, diff 0.5 to both neighbours
        assert_eq!(skill_match(Some(0.75), CourseLevel::Advanced), 1.0);
        assert_eq!(skill_match(Some(0.75), CourseLevel::Intermediate), 0.8);
    }

    #[test]
    fn relevance_combines_weighted_factors() {
        let mut p = prefs();
        p.add_category("design");
        let learner = LearnerProfile::new(p);
        let c = course("c1", "design", CourseLevel::Beginner);
        let r = RelevanceScorer::default().relevance(&learner, &c);
        // 0.4 * 0.5 + 0.3 * 1.0 + 0.2 * 0.7 + 0.1 * 0.8
        assert!((r.total - 0.72).abs() < 1e-9);
        assert_eq!(r.goal, 0.5);
        assert_eq!(r.skill, 1.0);
    }

    #[test]
    fn factors_are_pluggable() {
        let learner = LearnerProfile::new(prefs());
        let c = course("c1", "design", CourseLevel::Beginner);
        let scorer = RelevanceScorer::default()
            .with_history_factor(ConstantFactor(0.0))
            .with_style_factor(ConstantFactor(1.0));
        let r = scorer.relevance(&learner, &c);
        assert_eq!(r.history, 0.0);
        assert_eq!(r.style, 1.0);
    }

    #[test]
    fn completion_history_uses_category_ratio() {
        let mut learner = LearnerProfile::new(prefs());
        learner.record_course("design", true);
        learner.record_course("design", false);
        let c = course("c1", "design", CourseLevel::Beginner);
        assert_eq!(CompletionHistoryFactor.score(&learner, &c), 0.5);
        let other = course("c2", "music", CourseLevel::Beginner);
        assert_eq!(CompletionHistoryFactor.score(&learner, &other), NEUTRAL_HISTORY_SCORE);
    }

    #[test]
    fn learning_path_sort_is_stable() {
        let learner = LearnerProfile::new(prefs());
        let catalog = vec![
            course("a", "x", CourseLevel::Advanced),
            course("b", "x", CourseLevel::Beginner),
            course("c", "x", CourseLevel::Advanced),
            course("d", "x", CourseLevel::Beginner),
        ];
        let ranked = RelevanceScorer::default().learning_path(&learner, &catalog);
        let ids: Vec<&str> = ranked.iter().map(|s| s.course.course_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn learner_without_history_gets_popular_list() {
        let learner = LearnerProfile::new(prefs());
        let catalog = vec![
            course("a", "x", CourseLevel::Beginner).with_enrolled_count(5),
            course("b", "y", CourseLevel::Beginner).with_enrolled_count(50),
            course("c", "z", CourseLevel::Beginner).with_enrolled_count(5),
        ];
        let recs = RelevanceScorer::default().recommend(&learner, &catalog, 10);
        assert!(!recs.is_personalized());
        let ids: Vec<&str> = recs.courses().iter().map(|c| c.course_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn enrollment_without_quizzes_keeps_the_beginner_default() {
        let mut learner = LearnerProfile::new(prefs());
        learner.add_performance(&PerformanceModel::new(UserId::new("u1").unwrap(), "alpha"));
        learner.record_course("alpha", false);
        assert!(learner.category_levels.is_empty());

        let catalog = vec![
            course("adv", "alpha", CourseLevel::Advanced),
            course("beg", "alpha", CourseLevel::Beginner),
        ];
        let path = RelevanceScorer::default().learning_path(&learner, &catalog);
        assert_eq!(path[0].course.course_id.as_str(), "beg");
        assert_eq!(path[0].relevance.skill, 1.0);
        assert_eq!(path[1].relevance.skill, 0.5);
    }

    #[test]
    fn truncation_happens_after_merging_categories() {
        let mut learner = LearnerProfile::new(prefs());
        learner.add_performance(&model("alpha", 0.0));
        learner.add_performance(&model("beta", 0.0));

        // Eight alpha courses first in the catalog, then beta beginners that score higher.
        let mut catalog: Vec<Course> = (0..8)
            .map(|i| course(&format!("alpha-{i}"), "alpha", CourseLevel::Advanced))
            .collect();
        catalog.extend(
            (0..4).map(|i| course(&format!("beta-{i}"), "beta", CourseLevel::Intermediate)),
        );
        catalog.push(course("gamma", "gamma", CourseLevel::Intermediate));

        let recs = RelevanceScorer::default().recommend(&learner, &catalog, 10);
        assert!(recs.is_personalized());
        assert_eq!(recs.len(), 10);
        let ids: Vec<&str> = recs.courses().iter().map(|c| c.course_id.as_str()).collect();
        assert!(ids[..4].iter().all(|id| id.starts_with("beta")));
        assert!(!ids.contains(&"gamma"));
    }
}
