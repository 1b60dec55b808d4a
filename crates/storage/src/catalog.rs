use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use skillpath_core::model::{Course, CourseId};

use crate::repository::{CourseCatalog, StorageError};

/// Course catalog loaded once from JSON.
///
/// Accepts either a bare array of courses or an object with a `courses` array.
#[derive(Debug, Clone, Default)]
pub struct JsonCatalog {
    courses: Vec<Course>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    List(Vec<Course>),
    Wrapped { courses: Vec<Course> },
}

impl JsonCatalog {
    #[must_use]
    pub fn new(courses: Vec<Course>) -> Self {
        Self { courses }
    }

    /// Parse a catalog document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` on malformed JSON or invalid ids,
    /// and `StorageError::Conflict` when two courses share an id.
    pub fn from_json(json: &str) -> Result<Self, StorageError> {
        let file: CatalogFile =
            serde_json::from_str(json).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let courses = match file {
            CatalogFile::List(courses) | CatalogFile::Wrapped { courses } => courses,
        };
        for (i, course) in courses.iter().enumerate() {
            if courses[..i].iter().any(|c| c.course_id == course.course_id) {
                return Err(StorageError::Conflict);
            }
        }
        Ok(Self { courses })
    }

    /// Read and parse a catalog file.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` if the file cannot be read, plus the
    /// errors of [`from_json`](Self::from_json).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| StorageError::Unavailable(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    #[must_use]
    pub fn courses(&self) -> &[Course] {
        &self.courses
    }
}

#[async_trait]
impl CourseCatalog for JsonCatalog {
    async fn list_courses(&self) -> Result<Vec<Course>, StorageError> {
        Ok(self.courses.clone())
    }

    async fn get_course(&self, course_id: &CourseId) -> Result<Course, StorageError> {
        self.courses
            .iter()
            .find(|c| &c.course_id == course_id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }
}
