use crate::{
    expand_jobs, format_duration, render_report, resolve_device, run_directory, AuditConfig,
    AuditError, AuditMetrics, BatchScheduler, ChromeBrowser, MetricsFile, PageChecker, PageJob,
    RunContext, RunSettings, RunSummary,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Exit status when the run is stopped by SIGINT/SIGTERM
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Parser)]
#[command(name = "page-audit")]
#[command(about = "Post-deployment page auditor with screenshots")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check every configured page on every configured device
    Run {
        #[arg(short, long, help = "Audit configuration file (JSON)")]
        config: PathBuf,

        #[arg(
            short,
            long,
            default_value = "screenshots",
            help = "Root directory for timestamped run folders"
        )]
        output: PathBuf,

        #[arg(short = 'n', long, default_value = "5", help = "Pages checked per batch")]
        concurrency: usize,

        #[arg(long, help = "Chrome executable path")]
        chrome_path: Option<String>,

        #[arg(long, help = "Show the browser window")]
        headful: bool,

        #[arg(long, help = "User-Agent for non-mobile devices")]
        user_agent: Option<String>,

        #[arg(long, help = "Write Prometheus text metrics to this file")]
        metrics_file: Option<PathBuf>,
    },

    /// Validate a configuration file and list the jobs it expands to
    Validate {
        #[arg(short, long, help = "Audit configuration file (JSON)")]
        config: PathBuf,
    },
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: PathBuf,
    pub output: PathBuf,
    pub concurrency: usize,
    pub chrome_path: Option<String>,
    pub headful: bool,
    pub user_agent: Option<String>,
    pub metrics_file: Option<PathBuf>,
}

impl RunOptions {
    pub fn settings(&self) -> RunSettings {
        RunSettings {
            concurrency: self.concurrency,
            output_root: self.output.clone(),
            chrome_path: self.chrome_path.clone(),
            headless: !self.headful,
            user_agent: self.user_agent.clone(),
            ..Default::default()
        }
    }
}

#[derive(Default)]
pub struct CliRunner;

impl CliRunner {
    pub fn new() -> Self {
        Self
    }

    /// Execute `command` and return the process exit status
    pub async fn run(
        &self,
        command: Commands,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<i32, AuditError> {
        match command {
            Commands::Run {
                config,
                output,
                concurrency,
                chrome_path,
                headful,
                user_agent,
                metrics_file,
            } => {
                self.run_audit(
                    RunOptions {
                        config,
                        output,
                        concurrency,
                        chrome_path,
                        headful,
                        user_agent,
                        metrics_file,
                    },
                    shutdown,
                )
                .await
            }
            Commands::Validate { config } => self.validate_config(&config).await,
        }
    }

    pub async fn run_audit(
        &self,
        options: RunOptions,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<i32, AuditError> {
        let started = Instant::now();

        let config = AuditConfig::load(&options.config).await?;
        let jobs = expand_jobs(&config)?;
        let settings = options
            .settings()
            .fit_navigation_timeout(config.longest_timeout());
        settings.validate()?;
        info!(
            "Loaded {} page(s) from {}, {} job(s)",
            config.pages.len(),
            options.config.display(),
            jobs.len()
        );

        // Must precede AuditMetrics::new so the handles bind to this recorder
        let metrics_file = options
            .metrics_file
            .as_ref()
            .map(MetricsFile::install)
            .transpose()?;
        let metrics = Arc::new(AuditMetrics::new());

        let output_dir = run_directory(&settings.output_root, chrono::Local::now());
        tokio::fs::create_dir_all(&output_dir).await?;
        info!("Writing screenshots to {}", output_dir.display());

        let browser = Arc::new(ChromeBrowser::launch(&settings).await?);
        let checker = Arc::new(PageChecker::new(browser.clone(), output_dir.clone()));
        let scheduler = BatchScheduler::new(checker, settings.concurrency).with_metrics(metrics);

        let outcome = tokio::select! {
            outcome = scheduler.run(jobs) => Some(outcome),
            Ok(()) = shutdown.recv() => None,
        };

        browser.shutdown().await;
        if let Some(file) = &metrics_file {
            if let Err(e) = file.write().await {
                warn!("Could not write metrics file: {}", e);
            }
        }

        let Some(outcome) = outcome else {
            warn!(
                "Run interrupted after {}; partial results are not reported",
                format_duration(started.elapsed())
            );
            return Ok(INTERRUPTED_EXIT_CODE);
        };
        let outcome = outcome?;

        let summary = RunSummary::from_results(&outcome.results);
        let report = render_report(
            &summary,
            &RunContext {
                output_dir: Some(output_dir.as_path()),
                elapsed: started.elapsed(),
                aborted_by: outcome.aborted_by.as_deref(),
            },
        );
        println!("{report}");

        Ok(summary.exit_code())
    }

    pub async fn validate_config(&self, config_path: &Path) -> Result<i32, AuditError> {
        println!("Validating configuration: {}", config_path.display());

        let config = AuditConfig::load(config_path).await?;
        let jobs = expand_jobs(&config)?;

        println!("Configuration is valid:");
        println!("  Pages: {}", config.pages.len());
        println!("  Jobs:  {}", jobs.len());
        for line in describe_jobs(&jobs) {
            println!("  {line}");
        }

        Ok(0)
    }
}

/// One line per job, flagging device names that fall back to desktop
pub fn describe_jobs(jobs: &[PageJob]) -> Vec<String> {
    jobs.iter()
        .map(|job| {
            let mut line = job.label();
            if !resolve_device(&job.device).1 {
                line.push_str(" (unknown device, desktop profile)");
            }
            if job.config.abort_if_fail {
                line.push_str(" (critical)");
            }
            line
        })
        .collect()
}

/// Map a command outcome to the process exit status
///
/// Fatal errors are handed back untouched and left for the caller to print;
/// anything else is logged here and becomes exit status 1.
pub fn exit_status(outcome: Result<i32, AuditError>) -> Result<i32, AuditError> {
    match outcome {
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            error!("Application error: {}", e);
            Ok(1)
        }
        ok => ok,
    }
}

pub fn setup_logging(verbose: bool) -> Result<(), AuditError> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AuditError::Configuration(format!("logging: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PageConfig;

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::parse_from([
            "page-audit",
            "run",
            "--config",
            "audit.json",
            "-n",
            "3",
            "--headful",
            "--verbose",
        ]);

        assert!(cli.verbose);
        match cli.command {
            Commands::Run {
                config,
                output,
                concurrency,
                headful,
                metrics_file,
                ..
            } => {
                assert_eq!(config, PathBuf::from("audit.json"));
                assert_eq!(output, PathBuf::from("screenshots"));
                assert_eq!(concurrency, 3);
                assert!(headful);
                assert!(metrics_file.is_none());
            }
            Commands::Validate { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn test_run_options_to_settings() {
        let options = RunOptions {
            config: PathBuf::from("audit.json"),
            output: PathBuf::from("out"),
            concurrency: 2,
            chrome_path: Some("/usr/bin/chromium".to_string()),
            headful: false,
            user_agent: None,
            metrics_file: None,
        };

        let settings = options.settings();
        assert!(settings.headless);
        assert_eq!(settings.concurrency, 2);
        assert_eq!(settings.output_root, PathBuf::from("out"));
    }

    #[test]
    fn test_describe_jobs_flags() {
        let jobs = vec![
            PageJob {
                url: "https://example.com/".to_string(),
                device: "desktop".to_string(),
                config: PageConfig::default(),
            },
            PageJob {
                url: "https://example.com/".to_string(),
                device: "Watch".to_string(),
                config: PageConfig {
                    abort_if_fail: true,
                    ..Default::default()
                },
            },
        ];

        assert_eq!(
            describe_jobs(&jobs),
            vec![
                "https://example.com/ [desktop]",
                "https://example.com/ [Watch] (unknown device, desktop profile) (critical)",
            ]
        );
    }

    #[test]
    fn test_exit_status_mapping() {
        assert_eq!(exit_status(Ok(0)).unwrap(), 0);
        assert_eq!(exit_status(Ok(INTERRUPTED_EXIT_CODE)).unwrap(), 130);
        assert_eq!(
            exit_status(Err(AuditError::Io("disk full".to_string()))).unwrap(),
            1
        );

        let fatal = exit_status(Err(AuditError::NoPagesConfigured)).unwrap_err();
        assert!(matches!(fatal, AuditError::NoPagesConfigured));
    }

    #[tokio::test]
    async fn test_validate_rejects_missing_file() {
        let runner = CliRunner::new();
        let result = runner
            .validate_config(Path::new("/nonexistent/page-audit.json"))
            .await;
        assert!(result.is_err());
    }
}
