use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use services::logging::init_tracing;
use services::{
    AchievementSignal, Clock, ProgressCoordinator, ProgressEvent, RecommendationService,
    RecordingSink,
};
use skillpath_core::model::{
    CompletionForecast, CourseId, EngineSettings, EngineSettingsDraft, LearningPreference,
    ProgressState, ProgressTrend, UserId,
};
use skillpath_core::scoring::Recommendations;
use storage::repository::{InMemoryRepository, PreferenceRepository, Storage};
use storage::JsonCatalog;
use tracing::{info, warn};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    MissingCatalog,
    MissingUser,
    InvalidUser { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::MissingCatalog => {
                write!(f, "a catalog is required (--catalog or SKILLPATH_CATALOG)")
            }
            ArgsError::MissingUser => write!(f, "recommend requires --user"),
            ArgsError::InvalidUser { raw } => write!(f, "invalid --user value: {raw:?}"),
        }
    }
}

impl std::error::Error for ArgsError {}

/// Failures reading the config, event log, or preference files.
#[derive(Debug)]
enum InputError {
    Read { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, line: usize, source: serde_json::Error },
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::Read { path, source } => write!(f, "{}: {source}", path.display()),
            InputError::Parse { path, line, source } => {
                write!(f, "{}:{line}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for InputError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- replay    --events <jsonl> [--catalog <json>] [--config <json>]");
    eprintln!("  cargo run -p app -- recommend --user <id> [--events <jsonl>] [--catalog <json>]");
    eprintln!("                                [--preferences <json>] [--config <json>]");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  SKILLPATH_CATALOG, SKILLPATH_CONFIG, SKILLPATH_LOG (default: warn)");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Replay,
    Recommend,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "replay" => Some(Self::Replay),
            "recommend" => Some(Self::Recommend),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Args {
    catalog: Option<PathBuf>,
    config: Option<PathBuf>,
    events: Option<PathBuf>,
    preferences: Option<PathBuf>,
    user: Option<UserId>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            catalog: std::env::var_os("SKILLPATH_CATALOG").map(PathBuf::from),
            config: std::env::var_os("SKILLPATH_CONFIG").map(PathBuf::from),
            ..Self::default()
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--catalog" => parsed.catalog = Some(require_value(args, "--catalog")?.into()),
                "--config" => parsed.config = Some(require_value(args, "--config")?.into()),
                "--events" => parsed.events = Some(require_value(args, "--events")?.into()),
                "--preferences" => {
                    parsed.preferences = Some(require_value(args, "--preferences")?.into());
                }
                "--user" => {
                    let value = require_value(args, "--user")?;
                    let user = UserId::new(value.clone())
                        .map_err(|_| ArgsError::InvalidUser { raw: value })?;
                    parsed.user = Some(user);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        if parsed.catalog.is_none() {
            return Err(ArgsError::MissingCatalog);
        }
        Ok(parsed)
    }
}

/// One line of the event log.
#[derive(Debug, Deserialize)]
struct LoggedEvent {
    user_id: UserId,
    #[serde(flatten)]
    event: ProgressEvent,
}

#[derive(Serialize)]
struct ProgressSummary {
    trend: ProgressTrend,
    forecast: CompletionForecast,
    activity_count: usize,
    state: ProgressState,
}

#[derive(Serialize)]
struct ReplayReport {
    applied: usize,
    rejected: usize,
    progress: Vec<ProgressSummary>,
    achievements: Vec<AchievementSignal>,
}

#[derive(Serialize)]
struct RecommendReport<'a> {
    user_id: &'a UserId,
    recommendations: Recommendations,
}

fn read_file(path: &Path) -> Result<String, InputError> {
    std::fs::read_to_string(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn load_settings(path: Option<&Path>) -> Result<EngineSettings, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(EngineSettings::default());
    };
    let raw = read_file(path)?;
    let draft: EngineSettingsDraft =
        serde_json::from_str(&raw).map_err(|source| InputError::Parse {
            path: path.to_path_buf(),
            line: 1,
            source,
        })?;
    Ok(draft.validate()?)
}

fn load_events(path: &Path) -> Result<Vec<LoggedEvent>, InputError> {
    let raw = read_file(path)?;
    let mut events = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event = serde_json::from_str(line).map_err(|source| InputError::Parse {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        })?;
        events.push(event);
    }
    Ok(events)
}

fn load_preferences(path: &Path) -> Result<Vec<LearningPreference>, InputError> {
    let raw = read_file(path)?;
    serde_json::from_str(&raw).map_err(|source| InputError::Parse {
        path: path.to_path_buf(),
        line: 1,
        source,
    })
}

/// Apply every logged event; invalid events are logged and skipped.
async fn replay(
    coordinator: &ProgressCoordinator,
    events: Vec<LoggedEvent>,
) -> (usize, usize, BTreeSet<(UserId, CourseId)>) {
    let mut applied = 0;
    let mut rejected = 0;
    let mut touched = BTreeSet::new();

    for LoggedEvent { user_id, event } in events {
        let course_id = event.course_id().clone();
        match coordinator.apply(&user_id, event).await {
            Ok(()) => {
                applied += 1;
                touched.insert((user_id, course_id));
            }
            Err(err) => {
                rejected += 1;
                warn!(%user_id, %course_id, category = err.category().as_str(), error = %err, "event rejected");
            }
        }
    }
    (applied, rejected, touched)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let mut iter = argv.into_iter().skip(1);
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let settings = load_settings(parsed.config.as_deref())?;
    let catalog_path = parsed.catalog.as_deref().ok_or(ArgsError::MissingCatalog)?;
    let catalog = JsonCatalog::from_path(catalog_path)?;
    info!(courses = catalog.courses().len(), "catalog loaded");

    let repo = InMemoryRepository::new();
    let storage = Storage::from_repository(repo.clone()).with_catalog(Arc::new(catalog));
    if let Some(path) = parsed.preferences.as_deref() {
        for preferences in load_preferences(path)? {
            repo.save_preferences(&preferences).await?;
        }
    }

    let sink = RecordingSink::new();
    let coordinator = ProgressCoordinator::from_storage(Clock::default(), &storage)
        .with_settings(settings.clone())
        .with_sink(Arc::new(sink.clone()));

    let events = match parsed.events.as_deref() {
        Some(path) => load_events(path)?,
        None => Vec::new(),
    };
    let (applied, rejected, touched) = replay(&coordinator, events).await;
    info!(applied, rejected, "event log replayed");

    match cmd {
        Command::Replay => {
            let now = Clock::default().now();
            let mut progress = Vec::with_capacity(touched.len());
            for (user_id, course_id) in &touched {
                let state = coordinator.progress(user_id, course_id).await?;
                progress.push(ProgressSummary {
                    trend: state.progress_trend_within(settings.trend_band()),
                    forecast: state.predict_completion(now),
                    activity_count: state.activity_count(),
                    state,
                });
            }
            let report = ReplayReport {
                applied,
                rejected,
                progress,
                achievements: sink.signals(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Recommend => {
            let user_id = parsed.user.as_ref().ok_or(ArgsError::MissingUser)?;
            let service = RecommendationService::new(&storage).with_settings(&settings);
            let report = RecommendReport {
                user_id,
                recommendations: service.recommend(user_id).await?,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let log = std::env::var("SKILLPATH_LOG").unwrap_or_else(|_| "warn".to_string());
    init_tracing(&log);

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
