use async_trait::async_trait;
use skillpath_core::model::{
    Course, CourseId, LearningPreference, PerformanceModel, ProgressState, UserId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Per-(user, course) progress records.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the record for a user in a course, `None` if the user never enrolled.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn load_progress(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<ProgressState>, StorageError>;

    /// Persist or replace a progress record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn save_progress(&self, progress: &ProgressState) -> Result<(), StorageError>;

    /// Every progress record of a user, ordered by course id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn list_progress_for_user(&self, user_id: &UserId)
    -> Result<Vec<ProgressState>, StorageError>;
}

/// Per-(user, category) performance models.
#[async_trait]
pub trait PerformanceRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn load_performance(
        &self,
        user_id: &UserId,
        category: &str,
    ) -> Result<Option<PerformanceModel>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the model cannot be stored.
    async fn save_performance(&self, model: &PerformanceModel) -> Result<(), StorageError>;

    /// Every model of a user, ordered by category.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn list_performance_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PerformanceModel>, StorageError>;
}

#[async_trait]
pub trait PreferenceRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn load_preferences(
        &self,
        user_id: &UserId,
    ) -> Result<Option<LearningPreference>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the preferences cannot be stored.
    async fn save_preferences(&self, preferences: &LearningPreference)
    -> Result<(), StorageError>;
}

/// Read-only course catalog.
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    /// All courses in catalog order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the catalog cannot be read.
    async fn list_courses(&self) -> Result<Vec<Course>, StorageError>;

    /// Fetch a course by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_course(&self, course_id: &CourseId) -> Result<Course, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    progress: Arc<Mutex<HashMap<(UserId, CourseId), ProgressState>>>,
    performance: Arc<Mutex<HashMap<(UserId, String), PerformanceModel>>>,
    preferences: Arc<Mutex<HashMap<UserId, LearningPreference>>>,
    courses: Arc<Mutex<Vec<Course>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository whose catalog holds `courses` in the given order.
    #[must_use]
    pub fn with_courses(courses: Vec<Course>) -> Self {
        Self {
            courses: Arc::new(Mutex::new(courses)),
            ..Self::default()
        }
    }

    /// Add a course, replacing one with the same id in place.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` if the lock is poisoned.
    pub fn upsert_course(&self, course: Course) -> Result<(), StorageError> {
        let mut guard = self
            .courses
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        match guard.iter_mut().find(|c| c.course_id == course.course_id) {
            Some(existing) => *existing = course,
            None => guard.push(course),
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn load_progress(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<ProgressState>, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(guard.get(&(user_id.clone(), course_id.clone())).cloned())
    }

    async fn save_progress(&self, progress: &ProgressState) -> Result<(), StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        guard.insert(
            (progress.user_id().clone(), progress.course_id().clone()),
            progress.clone(),
        );
        Ok(())
    }

    async fn list_progress_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ProgressState>, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        let mut found: Vec<ProgressState> = guard
            .iter()
            .filter(|((user, _), _)| user == user_id)
            .map(|(_, progress)| progress.clone())
            .collect();
        found.sort_by(|a, b| a.course_id().cmp(b.course_id()));
        Ok(found)
    }
}

#[async_trait]
impl PerformanceRepository for InMemoryRepository {
    async fn load_performance(
        &self,
        user_id: &UserId,
        category: &str,
    ) -> Result<Option<PerformanceModel>, StorageError> {
        let guard = self
            .performance
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(guard
            .get(&(user_id.clone(), category.to_string()))
            .cloned())
    }

    async fn save_performance(&self, model: &PerformanceModel) -> Result<(), StorageError> {
        let mut guard = self
            .performance
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        guard.insert(
            (model.user_id().clone(), model.category().to_string()),
            model.clone(),
        );
        Ok(())
    }

    async fn list_performance_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PerformanceModel>, StorageError> {
        let guard = self
            .performance
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        let mut found: Vec<PerformanceModel> = guard
            .iter()
            .filter(|((user, _), _)| user == user_id)
            .map(|(_, model)| model.clone())
            .collect();
        found.sort_by(|a, b| a.category().cmp(b.category()));
        Ok(found)
    }
}

#[async_trait]
impl PreferenceRepository for InMemoryRepository {
    async fn load_preferences(
        &self,
        user_id: &UserId,
    ) -> Result<Option<LearningPreference>, StorageError> {
        let guard = self
            .preferences
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(guard.get(user_id).cloned())
    }

    async fn save_preferences(
        &self,
        preferences: &LearningPreference,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .preferences
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        guard.insert(preferences.user_id.clone(), preferences.clone());
        Ok(())
    }
}

#[async_trait]
impl CourseCatalog for InMemoryRepository {
    async fn list_courses(&self) -> Result<Vec<Course>, StorageError> {
        let guard = self
            .courses
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(guard.clone())
    }

    async fn get_course(&self, course_id: &CourseId) -> Result<Course, StorageError> {
        let guard = self
            .courses
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        guard
            .iter()
            .find(|c| &c.course_id == course_id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub performance: Arc<dyn PerformanceRepository>,
    pub preferences: Arc<dyn PreferenceRepository>,
    pub catalog: Arc<dyn CourseCatalog>,
}

impl Storage {
    /// Empty in-memory storage with an empty catalog.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Use one in-memory repository for every concern.
    #[must_use]
    pub fn from_repository(repo: InMemoryRepository) -> Self {
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let performance: Arc<dyn PerformanceRepository> = Arc::new(repo.clone());
        let preferences: Arc<dyn PreferenceRepository> = Arc::new(repo.clone());
        let catalog: Arc<dyn CourseCatalog> = Arc::new(repo);
        Self {
            progress,
            performance,
            preferences,
            catalog,
        }
    }

    /// Swap the course catalog, keeping the other repositories.
    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<dyn CourseCatalog>) -> Self {
        self.catalog = catalog;
        self
    }
}
