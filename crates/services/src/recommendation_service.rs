use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use skillpath_core::model::{CourseId, EngineSettings, LearningPreference, SkillId, UserId};
use skillpath_core::scoring::{LearnerProfile, Recommendations, RelevanceScorer, ScoredCourse};
use storage::repository::{
    CourseCatalog, PerformanceRepository, PreferenceRepository, ProgressRepository, Storage,
};

use crate::error::RecommendationError;

/// Builds a learner profile from storage and ranks the catalog for it.
#[derive(Clone)]
pub struct RecommendationService {
    limit: usize,
    scorer: Arc<RelevanceScorer>,
    progress: Arc<dyn ProgressRepository>,
    performance: Arc<dyn PerformanceRepository>,
    preferences: Arc<dyn PreferenceRepository>,
    catalog: Arc<dyn CourseCatalog>,
}

impl RecommendationService {
    #[must_use]
    pub fn new(storage: &Storage) -> Self {
        let settings = EngineSettings::default();
        Self {
            limit: settings.recommendation_limit(),
            scorer: Arc::new(RelevanceScorer::new(settings.weights())),
            progress: Arc::clone(&storage.progress),
            performance: Arc::clone(&storage.performance),
            preferences: Arc::clone(&storage.preferences),
            catalog: Arc::clone(&storage.catalog),
        }
    }

    /// Use the weights and list cap from `settings`.
    #[must_use]
    pub fn with_settings(mut self, settings: &EngineSettings) -> Self {
        self.limit = settings.recommendation_limit();
        self.scorer = Arc::new(RelevanceScorer::new(settings.weights()));
        self
    }

    /// Replace the scorer, e.g. to plug in other history or style factors.
    #[must_use]
    pub fn with_scorer(mut self, scorer: RelevanceScorer) -> Self {
        self.scorer = Arc::new(scorer);
        self
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Preferences, per-category levels, and enrollment outcomes of a learner.
    ///
    /// Enrollments in courses that left the catalog are skipped.
    ///
    /// # Errors
    ///
    /// Returns `RecommendationError::Storage` if any repository cannot be read.
    pub async fn learner_profile(
        &self,
        user_id: &UserId,
    ) -> Result<LearnerProfile, RecommendationError> {
        let preferences = self
            .preferences
            .load_preferences(user_id)
            .await?
            .unwrap_or_else(|| LearningPreference::new(user_id.clone()));
        let mut profile = LearnerProfile::new(preferences);

        for model in self.performance.list_performance_for_user(user_id).await? {
            profile.add_performance(&model);
        }

        let courses = self.catalog.list_courses().await?;
        let categories: HashMap<_, _> = courses
            .iter()
            .map(|c| (&c.course_id, c.category.as_str()))
            .collect();
        for progress in self.progress.list_progress_for_user(user_id).await? {
            match categories.get(progress.course_id()) {
                Some(category) => profile.record_course(category, progress.is_completed()),
                None => debug!(course_id = %progress.course_id(), "enrolled course not in catalog"),
            }
        }
        Ok(profile)
    }

    /// Capped recommendations for a learner.
    ///
    /// # Errors
    ///
    /// Returns `RecommendationError::Storage` if any repository cannot be read.
    #[instrument(skip(self))]
    pub async fn recommend(&self, user_id: &UserId) -> Result<Recommendations, RecommendationError> {
        self.recommend_with_limit(user_id, self.limit).await
    }

    /// # Errors
    ///
    /// Returns `RecommendationError::Storage` if any repository cannot be read.
    pub async fn recommend_with_limit(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Recommendations, RecommendationError> {
        let profile = self.learner_profile(user_id).await?;
        let catalog = self.catalog.list_courses().await?;
        let recommendations = self.scorer.recommend(&profile, &catalog, limit);
        debug!(
            personalized = recommendations.is_personalized(),
            count = recommendations.len(),
            "recommendations ranked"
        );
        Ok(recommendations)
    }

    /// The whole catalog ranked by relevance, uncapped.
    ///
    /// # Errors
    ///
    /// Returns `RecommendationError::Storage` if any repository cannot be read.
    #[instrument(skip(self))]
    pub async fn learning_path(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ScoredCourse>, RecommendationError> {
        let profile = self.learner_profile(user_id).await?;
        let catalog = self.catalog.list_courses().await?;
        Ok(self.scorer.learning_path(&profile, &catalog))
    }

    /// Skills taught by `course_id` that the learner has not yet reached in
    /// the course's category. Without a performance record every skill is a gap.
    ///
    /// # Errors
    ///
    /// Returns `RecommendationError::Storage` if the course is unknown or a
    /// repository cannot be read.
    pub async fn skill_gaps(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Vec<SkillId>, RecommendationError> {
        let course = self.catalog.get_course(course_id).await?;
        let gaps = match self
            .performance
            .load_performance(user_id, &course.category)
            .await?
        {
            Some(model) => model.identify_skill_gaps(&course.skills),
            None => course.skills.iter().cloned().collect(),
        };
        Ok(gaps)
    }
}
