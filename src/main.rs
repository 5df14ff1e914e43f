use anyhow::{Context, Result};
use atlas_sweep::api::client::ApiClient;
use atlas_sweep::config::{Connection, Settings};
use atlas_sweep::engine::{CancelSignal, ConsoleConfirmer, Gate, Mode};
use atlas_sweep::error::{format_api_error, EngineError};
use atlas_sweep::workflow::{self, RunContext, RunReport, DEFAULT_INVITE_ROLE};
use atlas_sweep::VERSION;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Exit code for configuration and run-level errors
const EXIT_CONFIG: u8 = 2;

/// Bulk lifecycle operations for an organization's projects, clusters and users
#[derive(Parser, Debug)]
#[command(name = "atlas-sweep", version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Report what would happen without changing anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(long, global = true)]
    auto_confirm: bool,

    /// Config file (JSON or YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Directory for log files and run reports
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Maximum concurrent API operations
    #[arg(long, global = true)]
    concurrency: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Delete every project that has no clusters
    DeleteEmptyProjects,
    /// Delete every cluster in every project
    DeleteAllClusters,
    /// Pause every running cluster in every project
    PauseAllClusters,
    /// Remove users, invitations and clusters from aged projects
    CleanupAged {
        /// Remove members and database users from projects older than this
        #[arg(long)]
        user_days: Option<u32>,
        /// Delete pending invitations from projects older than this
        #[arg(long)]
        invitation_days: Option<u32>,
        /// Delete clusters from projects older than this
        #[arg(long)]
        cluster_days: Option<u32>,
    },
    /// Invite users to the organization
    InviteUsers {
        /// Email addresses (comma separated)
        #[arg(long, value_delimiter = ',')]
        emails: Vec<String>,
        /// CSV file with one email address in the first column of each line
        #[arg(long)]
        emails_file: Option<PathBuf>,
        /// Organization roles to grant
        #[arg(long, value_delimiter = ',', default_value = DEFAULT_INVITE_ROLE)]
        roles: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel, log_dir: &Path) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = log_dir.join(format!(
        "atlas-sweep-{}.log",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ));

    let file = std::fs::create_dir_all(log_dir).and_then(|_| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
    });

    let file = match file {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Warning: cannot open log file {:?}: {}", log_path, e);
            tracing_subscriber::fmt()
                .with_max_level(tracing_level)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(
            non_blocking
                .with_max_level(tracing_level)
                .and(std::io::stderr.with_max_level(Level::WARN)),
        )
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("atlas-sweep {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn default_log_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        return data_dir.join("atlas-sweep").join("logs");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".atlas-sweep").join("logs");
    }
    PathBuf::from("logs")
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;

    if let Some(concurrency) = args.concurrency {
        settings.concurrency = concurrency;
    }
    if let Command::CleanupAged {
        user_days,
        invitation_days,
        cluster_days,
    } = &args.command
    {
        if let Some(days) = user_days {
            settings.thresholds.user_days = *days;
        }
        if let Some(days) = invitation_days {
            settings.thresholds.invitation_days = *days;
        }
        if let Some(days) = cluster_days {
            settings.thresholds.cluster_days = *days;
        }
    }

    Ok(settings.normalized())
}

async fn run(args: &Args, log_dir: &Path) -> Result<RunReport> {
    let settings = load_settings(args)?;
    let connection = Connection::from_env().map_err(EngineError::from)?;
    tracing::info!("Organization: {}, API: {}", connection.org_id, connection.base_url);

    // Read emails before touching the API so bad input fails fast
    let emails = match &args.command {
        Command::InviteUsers {
            emails,
            emails_file,
            ..
        } => workflow::load_emails(emails, emails_file.as_deref()).map_err(EngineError::from)?,
        _ => Vec::new(),
    };

    let client = ApiClient::new(&connection, &settings).context("Failed to create API client")?;
    client.verify_organization().await.map_err(|source| {
        eprintln!("{}", format_api_error(&source));
        EngineError::OrganizationUnavailable {
            org_id: connection.org_id.clone(),
            source,
        }
    })?;

    let cancel = CancelSignal::new();
    cancel.install_ctrl_c();

    let confirmer = ConsoleConfirmer::new(cancel.clone());
    let ctx = RunContext {
        client: &client,
        settings: &settings,
        gate: Gate::new(Mode::from_flags(args.dry_run, args.auto_confirm), &confirmer),
        cancel,
    };

    let report = match &args.command {
        Command::DeleteEmptyProjects => ctx.delete_empty_projects().await?,
        Command::DeleteAllClusters => ctx.delete_all_clusters().await?,
        Command::PauseAllClusters => ctx.pause_all_clusters().await?,
        Command::CleanupAged { .. } => ctx.cleanup_aged().await?,
        Command::InviteUsers { roles, .. } => {
            if emails.is_empty() {
                tracing::warn!("No email addresses given");
            }
            ctx.invite_users(&emails, roles).await?
        }
    };

    match report.write_to(log_dir) {
        Ok(path) => tracing::info!("Report written to {:?}", path),
        Err(e) => tracing::warn!("Failed to write report to {:?}: {}", log_dir, e),
    }

    Ok(report)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_dir = args.log_dir.clone().unwrap_or_else(default_log_dir);

    let _log_guard = setup_logging(args.log_level, &log_dir);

    match run(&args, &log_dir).await {
        Ok(report) => {
            print!("{}", report.render());
            tracing::info!(
                "Finished {}: {} succeeded, {} failed, {} skipped",
                report.action.as_str(),
                report.summary.succeeded,
                report.summary.failed,
                report.summary.skipped
            );
            ExitCode::from(report.exit_code() as u8)
        }
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("Error: {err:#}");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}
