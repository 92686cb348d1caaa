//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Datelike;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use grantscout_core::{DiscoveryOrchestrator, LogStream, NotificationOutcome, RunReport};
use grantscout_extraction::{ExtractionClient, ExtractionSettings};
use grantscout_notify::{MailRelayNotifier, NotifierSettings};
use grantscout_shared::{
    AppConfig, LogEntry, LogLevel, SearchConfig, init_config, load_config, load_config_from,
};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// GrantScout — discover funding opportunities with search-grounded extraction.
#[derive(Parser)]
#[command(
    name = "grantscout",
    version,
    about = "Discover funding-grant opportunities with a search-grounded extraction service.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.grantscout/grantscout.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run one or more discovery sequences.
    Discover(DiscoverArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags for `grantscout discover`. Anything omitted comes from the config file.
#[derive(clap::Args, Debug)]
pub(crate) struct DiscoverArgs {
    /// Search keyword (repeatable). Replaces the configured keyword list.
    #[arg(short, long = "keyword")]
    pub keywords: Vec<String>,

    /// Funding year (defaults to the configured year, then the current year).
    #[arg(short, long)]
    pub year: Option<i32>,

    /// Send a digest of new grants to this address. Enables notifications.
    #[arg(short, long)]
    pub email: Option<String>,

    /// Disable digest delivery even if the config enables it.
    #[arg(long, conflicts_with = "email")]
    pub no_notify: bool,

    /// Number of sequential runs over the same in-memory repository.
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
    pub rounds: u32,

    /// Pause between rounds, in seconds.
    #[arg(long, default_value = "0")]
    pub interval_secs: u64,

    /// Write every accumulated grant to this JSON file when done.
    #[arg(long)]
    pub export: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
///
/// Progress entries are already rendered on the terminal, so library events
/// stay at `warn` unless `-v` is given.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = [
        "grantscout",
        "grantscout_core",
        "grantscout_extraction",
        "grantscout_notify",
        "grantscout_shared",
    ]
    .iter()
    .map(|target| format!("{target}={level}"))
    .collect::<Vec<_>>()
    .join(",");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Discover(args) => cmd_discover(&config, args).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

// ---------------------------------------------------------------------------
// discover
// ---------------------------------------------------------------------------

/// Merge config-file search values with command-line overrides.
fn resolve_search(config: &AppConfig, args: &DiscoverArgs) -> Result<SearchConfig> {
    let mut search = config.search_config(chrono::Utc::now().year());

    if !args.keywords.is_empty() {
        search.keywords = args.keywords.clone();
    }
    if let Some(year) = args.year {
        search.year = year;
    }
    if let Some(email) = &args.email {
        search.email_recipient = email.clone();
        search.notification_enabled = true;
    }
    if args.no_notify {
        search.notification_enabled = false;
    }

    search.keywords.retain(|k| !k.trim().is_empty());
    if search.keywords.is_empty() {
        return Err(eyre!(
            "no search keywords: pass --keyword or set [search].keywords in the config"
        ));
    }

    Ok(search)
}

async fn cmd_discover(config: &AppConfig, args: DiscoverArgs) -> Result<()> {
    let search = resolve_search(config, &args)?;

    let extractor = ExtractionClient::new(ExtractionSettings::from_config(&config.extraction))?;
    let notifier = MailRelayNotifier::new(NotifierSettings::from_config(&config.notification))?;

    let log = LogStream::new();
    let orchestrator =
        DiscoveryOrchestrator::new(Arc::new(extractor), Arc::new(notifier), log.clone());

    info!(
        keywords = ?search.keywords,
        year = search.year,
        rounds = args.rounds,
        notify = search.notification_enabled,
        "starting discovery"
    );

    let progress = CliProgress::new();
    let mut rx = log.subscribe();

    for round in 1..=args.rounds {
        if args.rounds > 1 {
            progress.println(format!("── Round {round}/{} ──", args.rounds));
        }
        log.clear();

        let result = run_with_progress(&orchestrator, &search, &mut rx, &progress).await;

        match result {
            Ok(report) => print_report(&progress, &report),
            Err(e) if e.is_run_fatal() => {
                progress.finish();
                return Err(eyre!("discovery aborted: {e}"));
            }
            Err(e) => {
                progress.finish();
                return Err(e.into());
            }
        }

        if round < args.rounds && args.interval_secs > 0 {
            progress.set_message(format!("Waiting {}s before next round", args.interval_secs));
            tokio::time::sleep(Duration::from_secs(args.interval_secs)).await;
        }
    }

    progress.finish();

    let repository = orchestrator.repository();
    println!();
    println!("  Discovery finished.");
    println!("  Grants in repository: {}", repository.len());

    if let Some(path) = &args.export {
        repository.export_json(path)?;
        println!("  Exported to:          {}", display_path(path));
    }
    println!();

    Ok(())
}

/// Drive one run while rendering log entries as they arrive.
async fn run_with_progress(
    orchestrator: &DiscoveryOrchestrator,
    search: &SearchConfig,
    rx: &mut broadcast::Receiver<LogEntry>,
    progress: &CliProgress,
) -> grantscout_shared::Result<RunReport> {
    let run = orchestrator.run(search);
    tokio::pin!(run);

    let result = loop {
        tokio::select! {
            biased;
            Ok(entry) = rx.recv() => progress.render(&entry),
            result = &mut run => break result,
        }
    };

    // Entries appended just before the run returned.
    while let Ok(entry) = rx.try_recv() {
        progress.render(&entry);
    }

    result
}

fn print_report(progress: &CliProgress, report: &RunReport) {
    if report.rejected_count > 0 {
        progress.println(format!("  {} malformed record(s) skipped.", report.rejected_count));
    }
    if report.new_grants.is_empty() {
        progress.println(format!(
            "  No new grants ({} duplicate(s) filtered).",
            report.filtered_count
        ));
        return;
    }

    progress.println(format!(
        "  {} new grant(s), {} duplicate(s) filtered:",
        report.new_grants.len(),
        report.filtered_count
    ));
    for grant in &report.new_grants {
        progress.println(format!(
            "  • {} — {} [{}] confidence {:.2}",
            grant.program_title, grant.agency_name, grant.status, grant.confidence_score
        ));
        if let Some(deadline) = &grant.application_deadline {
            progress.println(format!("      deadline: {deadline}"));
        }
        if let Some(amount) = &grant.funding_amount {
            progress.println(format!("      amount:   {amount}"));
        }
        progress.println(format!("      apply:    {}", grant.official_application_link));
    }

    if let NotificationOutcome::Failed(reason) = &report.notification {
        progress.println(format!("  ! digest not delivered: {reason}"));
    }
}

fn display_path(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

// ---------------------------------------------------------------------------
// CLI progress renderer
// ---------------------------------------------------------------------------

/// Renders log entries above an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn render(&self, entry: &LogEntry) {
        let marker = match entry.level {
            LogLevel::Info => " ",
            LogLevel::Success => "✓",
            LogLevel::Warning => "!",
            LogLevel::Error => "✗",
        };
        self.spinner.println(format!(
            "{} {marker} {:<7} {}",
            entry.timestamp.format("%H:%M:%S"),
            entry.level.as_str(),
            entry.message
        ));
        self.spinner.set_message(entry.message.clone());
    }

    fn println(&self, line: impl AsRef<str>) {
        self.spinner.println(line);
    }

    fn set_message(&self, msg: String) {
        self.spinner.set_message(msg);
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("grantscout").chain(args.iter().copied()))
            .expect("parse args")
    }

    fn discover_args(cli: Cli) -> DiscoverArgs {
        match cli.command {
            Command::Discover(args) => args,
            _ => panic!("expected discover"),
        }
    }

    #[test]
    fn keyword_flags_replace_configured_keywords() {
        let args = discover_args(parse(&[
            "discover", "-k", "arts", "-k", "heritage", "-y", "2027",
        ]));
        let search = resolve_search(&AppConfig::default(), &args).unwrap();
        assert_eq!(search.keywords, vec!["arts", "heritage"]);
        assert_eq!(search.year, 2027);
        assert!(!search.notification_enabled);
    }

    #[test]
    fn email_flag_enables_notifications() {
        let args = discover_args(parse(&["discover", "--email", "team@example.org"]));
        let search = resolve_search(&AppConfig::default(), &args).unwrap();
        assert!(search.notification_enabled);
        assert_eq!(search.email_recipient, "team@example.org");
    }

    #[test]
    fn no_notify_overrides_config() {
        let mut config = AppConfig::default();
        config.notification.enabled = true;
        config.notification.recipient = "ops@example.org".into();

        let args = discover_args(parse(&["discover", "--no-notify"]));
        let search = resolve_search(&config, &args).unwrap();
        assert!(!search.notification_enabled);
    }

    #[test]
    fn empty_keywords_are_rejected() {
        let mut config = AppConfig::default();
        config.search.keywords = vec!["  ".into()];
        let args = discover_args(parse(&["discover"]));
        assert!(resolve_search(&config, &args).is_err());
    }

    #[test]
    fn zero_rounds_is_a_usage_error() {
        let result = Cli::try_parse_from(["grantscout", "discover", "--rounds", "0"]);
        assert!(result.is_err());
    }
}
