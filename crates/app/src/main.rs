use std::fmt;
use std::collections::BTreeMap;

use chrono::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use services::auth::{AuthSession, Identity};
use services::catalog::CatalogService;
use services::scoring::ScoringService;
use services::tryout::{RunnerUpdate, TimerEvent, TryoutFlow, TryoutMachine, TryoutRunner};
use services::{AdminService, Clock};
use storage::repository::Storage;
use storage::rest::RestConfig;
use tryout_core::model::{
    LearnerId, PackageId, QuestionId, QuestionKind, SectionId, SessionId,
};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingSessionId,
    UnknownArg(String),
    InvalidSessionId { raw: String },
    InvalidLearnerId { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingSessionId => write!(f, "--session-id is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidSessionId { raw } => write!(f, "invalid --session-id value: {raw}"),
            ArgsError::InvalidLearnerId { raw } => {
                write!(f, "invalid --learner value (expected UUID): {raw}")
            }
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Sessions,
    Take,
    Score,
    Seed,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "sessions" => Some(Self::Sessions),
            "take" => Some(Self::Take),
            "score" => Some(Self::Score),
            "seed" => Some(Self::Seed),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    session_id: Option<SessionId>,
    learner_id: Option<LearnerId>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("TRYOUT_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://tryout.sqlite3".into(), normalize_sqlite_url);
        let mut session_id = None;
        let mut learner_id = std::env::var("TRYOUT_LEARNER_ID")
            .ok()
            .and_then(|value| value.parse::<LearnerId>().ok());

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--session-id" => {
                    let value = require_value(args, "--session-id")?;
                    let parsed: SessionId = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidSessionId { raw: value.clone() })?;
                    session_id = Some(parsed);
                }
                "--learner" => {
                    let value = require_value(args, "--learner")?;
                    let parsed: LearnerId = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidLearnerId { raw: value.clone() })?;
                    learner_id = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            session_id,
            learner_id,
        })
    }

    fn require_session_id(&self) -> Result<SessionId, ArgsError> {
        self.session_id.ok_or(ArgsError::MissingSessionId)
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- sessions [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- take  --session-id <id> [--learner <uuid>] [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- score --session-id <id> [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- seed  [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:tryout.sqlite3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  TRYOUT_DB_URL, TRYOUT_LEARNER_ID");
    eprintln!("  TRYOUT_API_URL, TRYOUT_API_KEY  (use the hosted backend instead of SQLite)");
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

/// Prefer the hosted backend when its env vars are set; fall back to SQLite.
async fn open_storage(db_url: &str) -> Result<Storage, Box<dyn std::error::Error>> {
    if let Some(config) = RestConfig::from_env() {
        tracing::info!(base_url = %config.base_url, "using hosted backend");
        return Ok(Storage::rest(config));
    }
    prepare_sqlite_file(db_url)?;
    Ok(Storage::sqlite(db_url).await?)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

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
    argv.remove(0);

    let mut iter = argv.into_iter();
    let args = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = open_storage(&args.db_url).await?;
    let clock = Clock::default_clock();

    match cmd {
        Command::Sessions => cmd_sessions(clock, &storage).await,
        Command::Take => cmd_take(clock, &storage, &args).await,
        Command::Score => cmd_score(&storage, &args).await,
        Command::Seed => cmd_seed(clock, &storage).await,
    }
}

async fn cmd_sessions(clock: Clock, storage: &Storage) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = CatalogService::new(clock, storage);
    let sessions = catalog.open_sessions().await?;

    if sessions.is_empty() {
        println!("No open sessions.");
        return Ok(());
    }
    for item in sessions {
        println!(
            "[{}] {} | {} ({} to {})",
            item.session_id, item.session_name, item.package_name, item.starts_at, item.ends_at
        );
        if let Some(description) = item.package_description {
            println!("      {description}");
        }
    }
    Ok(())
}

async fn cmd_score(storage: &Storage, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let session_id = args.require_session_id()?;
    let report = ScoringService::new(storage).score_session(session_id).await?;

    for scored in &report.scored {
        println!(
            "attempt {}: {} / 1000 ({} of {} answered correct)",
            scored.attempt_id, scored.final_score, scored.correct, scored.answered
        );
    }
    for failure in &report.failures {
        eprintln!("attempt {}: failed to score: {}", failure.attempt_id, failure.error);
    }
    println!(
        "Scored {} attempt(s), {} failure(s).",
        report.scored.len(),
        report.failures.len()
    );
    Ok(())
}

async fn cmd_seed(clock: Clock, storage: &Storage) -> Result<(), Box<dyn std::error::Error>> {
    let auth = AuthSession::signed_in(Identity::admin(LearnerId::random(), "seed@local"));
    let admin = AdminService::new(clock, storage);

    let package = admin
        .create_package(
            &auth,
            PackageId::new(1),
            "UTBK Saintek Package",
            Some("Paket lengkap untuk persiapan UTBK jurusan Saintek".into()),
        )
        .await?;

    let math = admin
        .add_section(&auth, SectionId::new(1), package.id(), "Matematika Dasar", 1, 1)
        .await?;
    let physics = admin
        .add_section(&auth, SectionId::new(2), package.id(), "Fisika Dasar", 1, 2)
        .await?;

    admin
        .add_multiple_choice(
            &auth,
            QuestionId::new(1),
            math.id(),
            "Berapakah hasil dari 2 + 2?",
            BTreeMap::from([
                ("A".to_string(), "3".to_string()),
                ("B".to_string(), "4".to_string()),
                ("C".to_string(), "5".to_string()),
                ("D".to_string(), "6".to_string()),
            ]),
            "B",
        )
        .await?;
    admin
        .add_short_answer(
            &auth,
            QuestionId::new(2),
            physics.id(),
            "Tuliskan rumus kecepatan (jarak per waktu).",
            "v = s/t",
        )
        .await?;

    let now = clock.now();
    let session = admin
        .schedule_session(
            &auth,
            SessionId::new(1),
            "Try Out UTBK Saintek",
            package.id(),
            now,
            now + Duration::days(7),
        )
        .await?;

    println!(
        "Seeded package {} with 2 sections; session {} is open for 7 days.",
        package.id(),
        session.id()
    );
    println!("Try: cargo run -p app -- take --session-id {}", session.id());
    Ok(())
}

fn render_question(machine: &TryoutMachine) {
    let progress = services::TryoutProgress::of(machine);
    let Some(section) = machine.current_section() else {
        return;
    };
    let Some(question) = machine.current_question() else {
        return;
    };

    println!();
    println!(
        "== {} | question {}/{} | {} left ==",
        section.name(),
        progress.question_index + 1,
        progress.question_count,
        progress.format_remaining()
    );
    println!("{}", question.text());
    if question.kind() == QuestionKind::MultipleChoice {
        if let Some(options) = question.options() {
            for (key, text) in options {
                println!("  {key}) {text}");
            }
        }
    }
    if let Some(answer) = machine.answer_for(question.id()) {
        if let Some(text) = answer.text() {
            println!("  [current answer: {text}]");
        }
        if answer.is_flagged() {
            println!("  [flagged]");
        }
    }
}

fn print_take_help() {
    println!("Commands: ans <text> | flag | next | prev | goto <n> | done | help | quit");
}

/// One resolved input for the take loop: a countdown event or a stdin line.
enum TakeInput {
    Timer(Option<TimerEvent>),
    Line(Option<String>),
}

async fn cmd_take(
    clock: Clock,
    storage: &Storage,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let session_id = args.require_session_id()?;
    let learner_id = args.learner_id.unwrap_or_else(LearnerId::random);
    let auth = AuthSession::signed_in(Identity::learner(learner_id, "learner@local"));

    let flow = TryoutFlow::new(clock, storage);
    let overview = flow.overview(session_id).await?;
    println!("{} | {}", overview.session.name(), overview.package.name());

    let mut runner = TryoutRunner::start(flow, &auth, session_id).await?;
    println!("Attempt {} started.", runner.machine().attempt().id());
    print_take_help();
    render_question(runner.machine());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        // Resolve the race into a value first so the handlers below get the
        // runner to themselves.
        let input = tokio::select! {
            event = runner.next_event() => TakeInput::Timer(event),
            line = lines.next_line() => TakeInput::Line(line?),
        };

        match input {
            TakeInput::Timer(None) | TakeInput::Line(None) => break,
            TakeInput::Timer(Some(event)) => match runner.handle_event(event).await {
                Ok(RunnerUpdate::Completed) => {
                    println!("Time is up: tryout completed.");
                    break;
                }
                Ok(RunnerUpdate::EnteredSection(_)) => {
                    println!("Time is up: next section.");
                    render_question(runner.machine());
                }
                Ok(RunnerUpdate::Countdown(secs)) if secs % 60 == 0 || secs <= 10 => {
                    println!("  {} left", runner.progress().format_remaining());
                }
                Ok(_) => {}
                Err(err) => eprintln!("section change failed, still counting: {err}"),
            },
            TakeInput::Line(Some(line)) => {
                let input = line.trim();
                match input.split_once(' ').map_or((input, ""), |(a, b)| (a, b)) {
                    ("ans", text) if !text.trim().is_empty() => {
                        runner.answer(text.trim()).await;
                        render_question(runner.machine());
                    }
                    ("flag", _) => {
                        runner.toggle_flag().await;
                        render_question(runner.machine());
                    }
                    ("next", _) => {
                        runner.next_question();
                        render_question(runner.machine());
                    }
                    ("prev", _) => {
                        runner.previous_question();
                        render_question(runner.machine());
                    }
                    ("goto", raw) => {
                        if let Ok(n) = raw.trim().parse::<usize>() {
                            runner.go_to(n.saturating_sub(1));
                        }
                        render_question(runner.machine());
                    }
                    ("done", _) => match runner.complete_section().await {
                        Ok(RunnerUpdate::Completed) => {
                            println!("Tryout completed.");
                            break;
                        }
                        Ok(RunnerUpdate::EnteredSection(_)) => {
                            render_question(runner.machine());
                        }
                        Ok(_) => {}
                        Err(err) => eprintln!("section change failed: {err}"),
                    },
                    ("help", _) => print_take_help(),
                    ("quit", _) => break,
                    ("", _) => {}
                    (other, _) => println!("unknown command: {other} (try: help)"),
                }
            }
        }
    }

    let attempt = runner.machine().attempt();
    println!(
        "Attempt {} is {}. Run `score --session-id {}` to grade the session.",
        attempt.id(),
        attempt.status(),
        session_id
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
