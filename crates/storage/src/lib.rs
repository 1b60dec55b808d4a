#![forbid(unsafe_code)]

pub mod catalog;
pub mod repository;

pub use catalog::JsonCatalog;
pub use repository::{
    CourseCatalog, InMemoryRepository, PerformanceRepository, PreferenceRepository,
    ProgressRepository, Storage, StorageError,
};
