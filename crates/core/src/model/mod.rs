mod course;
mod ids;
mod performance;
mod preference;
mod progress;
mod settings;

pub use ids::{CourseId, IdError, MAX_ID_LEN, QuizId, SectionId, SkillId, UserId};

pub use course::{Course, CourseLevel};
pub use performance::{
    INITIAL_LEVEL, PerformanceError, PerformanceModel, QUIZ_SUCCESS_THRESHOLD, SKILL_GAP_THRESHOLD,
};
pub use preference::{LearningPreference, LearningStyle};
pub use progress::{
    CompletionForecast, CompletionOutcome, DEFAULT_PASSING_SCORE, DEFAULT_TREND_BAND,
    ProgressError, ProgressState, ProgressTrend, QuizAttempt, SectionProgress, section_percentage,
};
pub use settings::{
    DEFAULT_HIGH_SCORE_MILESTONE, DEFAULT_RECOMMENDATION_LIMIT, EngineSettings,
    EngineSettingsDraft, RelevanceWeights, SettingsError,
};
