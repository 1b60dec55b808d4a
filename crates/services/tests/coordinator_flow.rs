use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use services::{
    AchievementKind, AchievementSignal, AchievementSink, Clock, ErrorCategory,
    ProgressCoordinator, ProgressEvent, RecordingSink, SinkError,
};
use skillpath_core::model::{
    Course, CourseId, CourseLevel, PerformanceModel, ProgressState, QuizId, SectionId, SkillId,
    UserId,
};
use skillpath_core::time::fixed_now;
use storage::repository::{
    CourseCatalog, InMemoryRepository, PerformanceRepository, ProgressRepository, StorageError,
};

fn user() -> UserId {
    UserId::new("learner-1").unwrap()
}

fn course_id() -> CourseId {
    CourseId::new("rust-101").unwrap()
}

fn sections() -> Vec<SectionId> {
    ["s1", "s2", "s3", "s4"]
        .into_iter()
        .map(|s| SectionId::new(s).unwrap())
        .collect()
}

fn repo() -> InMemoryRepository {
    InMemoryRepository::with_courses(vec![
        Course::new(course_id(), "programming", CourseLevel::Beginner)
            .with_sections(sections())
            .with_skills([SkillId::new("ownership").unwrap()]),
        Course::new(CourseId::new("ux-201").unwrap(), "design", CourseLevel::Intermediate)
            .with_sections(vec![SectionId::new("intro").unwrap()]),
    ])
}

fn coordinator(repo: &InMemoryRepository, sink: &RecordingSink) -> ProgressCoordinator {
    ProgressCoordinator::new(
        Clock::fixed(fixed_now()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
    )
    .with_sink(Arc::new(sink.clone()))
}

#[tokio::test]
async fn enrollment_to_certificate_end_to_end() {
    let repo = repo();
    let sink = RecordingSink::new();
    let coordinator = coordinator(&repo, &sink);
    let s = sections();

    let enrolled = coordinator.enroll(&user(), &course_id()).await.unwrap();
    assert_eq!(enrolled.percentage(), 0);
    assert_eq!(enrolled.progress_history(), &[0.0]);
    assert_eq!(enrolled.sections().len(), 4);

    let half = coordinator
        .sections_completed(&user(), &course_id(), &s[..2], 90.0)
        .await
        .unwrap();
    assert_eq!(half.percentage, 50);
    let stored = coordinator.progress(&user(), &course_id()).await.unwrap();
    assert_eq!(stored.progress_history(), &[0.0, 50.0]);
    assert!(!stored.certificate_earned());

    let coordinator = coordinator.with_clock(Clock::fixed(fixed_now() + Duration::days(2)));
    coordinator
        .section_completed(&user(), &course_id(), s[2].clone(), 80.0)
        .await
        .unwrap();
    let done = coordinator
        .section_completed(&user(), &course_id(), s[3].clone(), 80.0)
        .await
        .unwrap();
    assert_eq!(done.percentage, 100);
    assert!(done.certificate_awarded);

    let stored = coordinator.progress(&user(), &course_id()).await.unwrap();
    assert!(stored.certificate_earned());
    assert_eq!(
        stored.certificate_earned_at(),
        Some(fixed_now() + Duration::days(2))
    );
    assert_eq!(stored.progress_history(), &[0.0, 50.0, 75.0, 100.0]);

    assert_eq!(
        sink.kinds(),
        vec![AchievementKind::FirstCourse, AchievementKind::CourseCompleted]
    );

    let performance = repo
        .load_performance(&user(), "programming")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(performance.completed_sections(), 4);
    let ownership = SkillId::new("ownership").unwrap();
    assert_eq!(performance.revision_count(&ownership), 3);
    assert_eq!(performance.skill_level(&ownership), Some(0.5));
}

#[tokio::test]
async fn redelivered_completion_is_idempotent() {
    let repo = repo();
    let sink = RecordingSink::new();
    let coordinator = coordinator(&repo, &sink);
    let s = sections();

    coordinator
        .sections_completed(&user(), &course_id(), &s, 100.0)
        .await
        .unwrap();
    let again = coordinator
        .sections_completed(&user(), &course_id(), &s, 100.0)
        .await
        .unwrap();

    assert_eq!(again.newly_completed, 0);
    assert_eq!(again.percentage, 100);
    assert!(!again.certificate_awarded);
    assert_eq!(
        sink.kinds()
            .iter()
            .filter(|k| **k == AchievementKind::CourseCompleted)
            .count(),
        1
    );

    let performance = repo
        .load_performance(&user(), "programming")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(performance.completed_sections(), 4);
}

#[tokio::test]
async fn first_course_signal_only_once_per_learner() {
    let repo = repo();
    let sink = RecordingSink::new();
    let coordinator = coordinator(&repo, &sink);

    coordinator.enroll(&user(), &course_id()).await.unwrap();
    coordinator.enroll(&user(), &course_id()).await.unwrap();
    coordinator
        .enroll(&user(), &CourseId::new("ux-201").unwrap())
        .await
        .unwrap();

    assert_eq!(sink.kinds(), vec![AchievementKind::FirstCourse]);
    let listed = repo.list_progress_for_user(&user()).await.unwrap();
    assert_eq!(listed.len(), 2);
}

#[tokio::test]
async fn events_on_unenrolled_course_enroll_implicitly() {
    let repo = repo();
    let sink = RecordingSink::new();
    let coordinator = coordinator(&repo, &sink);

    coordinator
        .apply(
            &user(),
            ProgressEvent::TimeAdded {
                course_id: course_id(),
                section_id: SectionId::new("s1").unwrap(),
                time_ms: 60_000,
            },
        )
        .await
        .unwrap();

    let stored = coordinator.progress(&user(), &course_id()).await.unwrap();
    assert_eq!(stored.total_time_spent_ms(), 60_000);
    assert_eq!(stored.percentage(), 0);
    assert_eq!(stored.progress_history(), &[0.0]);
    assert_eq!(sink.kinds(), vec![AchievementKind::FirstCourse]);
}

#[tokio::test]
async fn invalid_input_is_rejected_before_any_write() {
    let repo = repo();
    let sink = RecordingSink::new();
    let coordinator = coordinator(&repo, &sink);

    let err = coordinator
        .section_completed(&user(), &course_id(), SectionId::new("s1").unwrap(), 150.0)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Invalid);

    let err = coordinator
        .time_added(&user(), &course_id(), &SectionId::new("bonus").unwrap(), 10)
        .await
        .unwrap_err();
    assert_eq!(err.category().as_str(), "invalid");

    let err = coordinator
        .quiz_attempted(&user(), &course_id(), QuizId::new("q1").unwrap(), 101, 0)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Invalid);

    assert!(repo.load_progress(&user(), &course_id()).await.unwrap().is_none());
    assert!(sink.signals().is_empty());
}

#[tokio::test]
async fn unknown_course_is_not_found() {
    let repo = repo();
    let sink = RecordingSink::new();
    let coordinator = coordinator(&repo, &sink);

    let err = coordinator
        .enroll(&user(), &CourseId::new("missing").unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotFound);
}

#[tokio::test]
async fn missing_progress_reads_as_fresh_zero_state() {
    let repo = repo();
    let coordinator = coordinator(&repo, &RecordingSink::new());

    let progress = coordinator.progress(&user(), &course_id()).await.unwrap();
    assert_eq!(progress.percentage(), 0);
    assert!(!progress.certificate_earned());
    assert!(repo.load_progress(&user(), &course_id()).await.unwrap().is_none());
}

#[tokio::test]
async fn quiz_attempts_update_both_models() {
    let repo = repo();
    let sink = RecordingSink::new();
    let coordinator = coordinator(&repo, &sink);
    let quiz = QuizId::new("q1").unwrap();

    let first = coordinator
        .quiz_attempted(&user(), &course_id(), quiz.clone(), 80, 1_000)
        .await
        .unwrap();
    let second = coordinator
        .quiz_attempted(&user(), &course_id(), quiz.clone(), 95, 1_000)
        .await
        .unwrap();
    assert_eq!(first.attempt_number, 1);
    assert_eq!(second.attempt_number, 2);

    let progress = coordinator.progress(&user(), &course_id()).await.unwrap();
    assert_eq!(progress.percentage(), 0);
    assert!(progress.completed_activities().contains("quiz_q1"));
    assert_eq!(progress.total_time_spent_ms(), 2_000);

    let performance = repo
        .load_performance(&user(), "programming")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(performance.quiz_attempts(&quiz), 2);
    // (80 * 1 * 0.7 + 95 * 0.3 * 2) / 2
    assert!((performance.quiz_average_score(&quiz) - 56.5).abs() < 1e-9);
    assert!((performance.overall_level() - 0.565).abs() < 1e-9);

    assert_eq!(
        sink.kinds(),
        vec![AchievementKind::FirstCourse, AchievementKind::Milestone]
    );
    let milestone = &sink.signals()[1];
    assert_eq!(milestone.payload["score"], 95);
    assert_eq!(milestone.payload["quiz_id"], "q1");
}

struct FailingSink;

#[async_trait]
impl AchievementSink for FailingSink {
    async fn emit(&self, _signal: AchievementSignal) -> Result<(), SinkError> {
        Err(SinkError("offline".into()))
    }
}

#[tokio::test]
async fn sink_failure_does_not_roll_back_progress() {
    let repo = repo();
    let coordinator = ProgressCoordinator::new(
        Clock::fixed(fixed_now()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
    )
    .with_sink(Arc::new(FailingSink));

    let outcome = coordinator
        .sections_completed(&user(), &course_id(), &sections(), 100.0)
        .await
        .unwrap();
    assert!(outcome.certificate_awarded);

    let stored = repo
        .load_progress(&user(), &course_id())
        .await
        .unwrap()
        .unwrap();
    assert!(stored.certificate_earned());
}

struct UnavailablePerformance;

#[async_trait]
impl PerformanceRepository for UnavailablePerformance {
    async fn load_performance(
        &self,
        _user_id: &UserId,
        _category: &str,
    ) -> Result<Option<PerformanceModel>, StorageError> {
        Ok(None)
    }

    async fn save_performance(&self, _model: &PerformanceModel) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("disk full".into()))
    }

    async fn list_performance_for_user(
        &self,
        _user_id: &UserId,
    ) -> Result<Vec<PerformanceModel>, StorageError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn failed_performance_save_leaves_progress_unwritten() {
    let repo = repo();
    let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
    let catalog: Arc<dyn CourseCatalog> = Arc::new(repo.clone());
    let coordinator = ProgressCoordinator::new(
        Clock::fixed(fixed_now()),
        progress,
        Arc::new(UnavailablePerformance),
        catalog,
    );

    let err = coordinator
        .section_completed(&user(), &course_id(), SectionId::new("s1").unwrap(), 100.0)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Unavailable);

    let stored: Option<ProgressState> = repo.load_progress(&user(), &course_id()).await.unwrap();
    assert!(stored.is_none());
}

/// Fails the first performance save, then delegates to the wrapped repository.
struct FailsOnce {
    inner: InMemoryRepository,
    failed: AtomicBool,
}

#[async_trait]
impl PerformanceRepository for FailsOnce {
    async fn load_performance(
        &self,
        user_id: &UserId,
        category: &str,
    ) -> Result<Option<PerformanceModel>, StorageError> {
        self.inner.load_performance(user_id, category).await
    }

    async fn save_performance(&self, model: &PerformanceModel) -> Result<(), StorageError> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(StorageError::Unavailable("connection reset".into()));
        }
        self.inner.save_performance(model).await
    }

    async fn list_performance_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PerformanceModel>, StorageError> {
        self.inner.list_performance_for_user(user_id).await
    }
}

#[tokio::test]
async fn redelivery_after_failed_save_applies_the_event_in_full() {
    let repo = repo();
    let sink = RecordingSink::new();
    let coordinator = ProgressCoordinator::new(
        Clock::fixed(fixed_now()),
        Arc::new(repo.clone()),
        Arc::new(FailsOnce {
            inner: repo.clone(),
            failed: AtomicBool::new(false),
        }),
        Arc::new(repo.clone()),
    )
    .with_sink(Arc::new(sink.clone()));
    let ux = CourseId::new("ux-201").unwrap();
    let intro = SectionId::new("intro").unwrap();

    let err = coordinator
        .section_completed(&user(), &ux, intro.clone(), 90.0)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Unavailable);
    assert!(sink.signals().is_empty());

    let retry = coordinator
        .section_completed(&user(), &ux, intro, 90.0)
        .await
        .unwrap();
    assert_eq!(retry.newly_completed, 1);
    assert_eq!(retry.percentage, 100);
    assert!(retry.certificate_awarded);
    assert_eq!(
        sink.kinds(),
        vec![AchievementKind::FirstCourse, AchievementKind::CourseCompleted]
    );

    let performance = repo
        .load_performance(&user(), "design")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(performance.completed_sections(), 1);
}
