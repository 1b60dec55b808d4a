#![forbid(unsafe_code)]

pub mod achievements;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod recommendation_service;

pub use skillpath_core::Clock;

pub use achievements::{
    AchievementKind, AchievementSignal, AchievementSink, NoopSink, RecordingSink, SinkError,
};
pub use coordinator::{ProgressCoordinator, ProgressEvent};
pub use error::{CoordinatorError, ErrorCategory, RecommendationError};
pub use recommendation_service::RecommendationService;
