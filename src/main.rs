#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # repograde
//!
//! Command line front end: grade a batch of submissions, analyze a local
//! directory, or run a single clone.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result, bail};
use bpaf::*;
use dotenvy::dotenv;
use repograde::{
    GradingConfig, GradingOrchestrator,
    acquire::{Acquirer, GitAcquirer},
    analyze::{Analyzer, CodeMetricsAnalyzer},
    report, util,
};
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Grade a batch of submissions
    Grade {
        /// JSON file holding the submission records
        input:       PathBuf,
        /// Where to write the grade records
        output:      Option<PathBuf>,
        /// Worker bound override
        workers:     Option<usize>,
        /// Acquisition timeout override, in seconds
        timeout:     Option<u64>,
        /// Line threshold override
        threshold:   Option<usize>,
        /// Leave clones on disk after grading
        keep_clones: bool,
    },
    /// Analyze a local directory
    Analyze {
        /// Directory to analyze
        dir:       PathBuf,
        /// Line threshold override
        threshold: Option<usize>,
    },
    /// Clone one repository
    Clone {
        /// Repository locator
        url:     String,
        /// Destination directory
        dest:    PathBuf,
        /// Acquisition timeout override, in seconds
        timeout: Option<u64>,
    },
}

/// Parse the command line arguments and return a `Cmd` enum
fn options() -> Cmd {
    /// parses the line threshold override
    fn threshold_arg() -> impl Parser<Option<usize>> {
        long("threshold")
            .short('t')
            .help("Code lines a file must exceed to count towards the grade")
            .argument::<usize>("LINES")
            .optional()
    }

    /// parses the timeout override
    fn timeout_arg() -> impl Parser<Option<u64>> {
        long("timeout")
            .help("Seconds allowed for each clone")
            .argument::<u64>("SECS")
            .optional()
    }

    let input = positional::<PathBuf>("SUBMISSIONS").help("JSON array of submission records");
    let output = long("output")
        .short('o')
        .help("Write grade records to this JSON file")
        .argument::<PathBuf>("FILE")
        .optional();
    let workers = long("workers")
        .short('w')
        .help("Maximum number of concurrent workers")
        .argument::<usize>("N")
        .optional();
    let timeout = timeout_arg();
    let threshold = threshold_arg();
    let keep_clones = long("keep-clones")
        .help("Do not delete cloned repositories after grading")
        .switch();
    let grade = construct!(Cmd::Grade {
        input,
        output,
        workers,
        timeout,
        threshold,
        keep_clones
    })
    .to_options()
    .command("grade")
    .help("Clone and grade a batch of submissions");

    let dir = positional::<PathBuf>("DIR").help("Directory to analyze");
    let threshold = threshold_arg();
    let analyze = construct!(Cmd::Analyze { dir, threshold })
        .to_options()
        .command("analyze")
        .help("Print code metrics for a local directory");

    let url = positional::<String>("URL").help("Repository locator");
    let dest = positional::<PathBuf>("DEST").help("Destination directory");
    let timeout = timeout_arg();
    let clone = construct!(Cmd::Clone { url, dest, timeout })
        .to_options()
        .command("clone")
        .help("Shallow-clone a single repository");

    let cmd = construct!([grade, analyze, clone]);

    cmd.to_options()
        .descr("Grade student repositories by code structure")
        .run()
}

/// Reads the log level from `REPOGRADE_LOG`, defaulting to `INFO`.
fn log_level() -> Level {
    std::env::var("REPOGRADE_LOG")
        .ok()
        .and_then(|value| value.trim().parse::<Level>().ok())
        .unwrap_or(Level::INFO)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);
    let filter_layer = LevelFilter::from_level(log_level());
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    let cmd = options();
    let base = GradingConfig::from_env();

    match cmd {
        Cmd::Grade {
            input,
            output,
            workers,
            timeout,
            threshold,
            keep_clones,
        } => {
            let mut config = base;
            if let Some(n) = workers {
                config = config.with_max_workers(n);
            }
            if let Some(secs) = timeout {
                config = config.with_acquisition_timeout(Duration::from_secs(secs));
            }
            if let Some(lines) = threshold {
                config = config.with_line_threshold(lines);
            }
            if keep_clones {
                config = config.with_delete_after_grading(false);
            }

            util::git_path(config.git_program())?;
            let submissions = report::read_submissions(&input)?;
            let orchestrator = GradingOrchestrator::from_config(config)?;
            let outcome = orchestrator
                .process(&submissions)
                .await
                .context("Grading batch aborted")?;

            println!("{}", report::render_batch(&outcome));
            if let Some(path) = output {
                report::write_grades(&path, &outcome.grades)?;
            }
        }
        Cmd::Analyze { dir, threshold } => {
            let config = match threshold {
                Some(lines) => base.with_line_threshold(lines),
                None => base,
            };
            config.validate()?;
            let analyzer = CodeMetricsAnalyzer::new(config.analyzer_settings())?;
            let result = analyzer
                .analyze(&dir)
                .with_context(|| format!("Could not analyze {}", dir.display()))?;
            println!("{}", report::render_analysis(&result, config.line_threshold()));
        }
        Cmd::Clone { url, dest, timeout } => {
            util::git_path(base.git_program())?;
            let acquirer = GitAcquirer::from_config(&base);
            let limit = timeout
                .map(Duration::from_secs)
                .unwrap_or_else(|| base.acquisition_timeout());
            let result = acquirer.acquire(&url, &dest, limit).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.is_success() {
                bail!(
                    "Clone failed: {}",
                    result.error.unwrap_or_else(|| "unknown error".to_string())
                );
            }
        }
    };

    Ok(())
}
