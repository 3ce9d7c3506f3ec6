//! Pipecheck - end-to-end validation of a CDC search pipeline
//!
//! ## Commands
//!
//! - `run <suite|all>`: run one suite, or every suite in order
//! - `list`: show the available suites
//!
//! Exit status is 0 when no check failed, 1 when any check failed and 2 for
//! usage or configuration errors.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

use pipecheck_core::{
    write_run_report_json, Harness, HarnessConfig, LiveContext, Reporter, RunMode, RunReport,
    SuiteKind, Verdict,
};

#[derive(Parser)]
#[command(name = "pipecheck")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Validate a SQL Server -> Debezium -> Kafka -> OpenSearch -> API pipeline", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one suite, or all suites in order
    Run {
        /// Suite to run: sqlserver, kafka, opensearch, debezium, api,
        /// monitoring, pipeline or all
        #[arg(value_parser = parse_selection)]
        suite: Selection,

        /// Run suites concurrently; results are still reported in suite order
        #[arg(long)]
        parallel: bool,

        /// Also write a JSON run report to this path
        #[arg(long)]
        report_json: Option<PathBuf>,
    },

    /// List the available suites
    List,
}

/// Suites picked on the command line, in run order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Selection(Vec<SuiteKind>);

fn parse_selection(raw: &str) -> Result<Selection, String> {
    if raw.trim().eq_ignore_ascii_case("all") {
        return Ok(Selection(SuiteKind::all()));
    }
    SuiteKind::parse(raw)
        .map(|kind| Selection(vec![kind]))
        .ok_or_else(|| {
            let names: Vec<&str> = SuiteKind::all().iter().map(SuiteKind::name).collect();
            format!("unknown suite (expected one of: {}, all)", names.join(", "))
        })
}

/// Deployment overrides. Unset values keep the built-in defaults.
#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// SQL Server host
    #[arg(long, global = true, env = "PIPECHECK_SQL_HOST")]
    sql_host: Option<String>,

    /// SQL Server port
    #[arg(long, global = true, env = "PIPECHECK_SQL_PORT")]
    sql_port: Option<u16>,

    /// SQL Server login
    #[arg(long, global = true, env = "PIPECHECK_SQL_USER")]
    sql_user: Option<String>,

    /// SQL Server password
    #[arg(long, global = true, env = "PIPECHECK_SQL_PASSWORD", hide_env_values = true)]
    sql_password: Option<String>,

    /// Application database
    #[arg(long, global = true, env = "PIPECHECK_SQL_DATABASE")]
    sql_database: Option<String>,

    /// Schema-qualified source table
    #[arg(long, global = true, env = "PIPECHECK_SOURCE_TABLE")]
    source_table: Option<String>,

    /// CDC capture instance of the source table
    #[arg(long, global = true, env = "PIPECHECK_CAPTURE_INSTANCE")]
    capture_instance: Option<String>,

    /// Kafka bootstrap servers
    #[arg(long, global = true, env = "PIPECHECK_KAFKA_BOOTSTRAP")]
    kafka_bootstrap: Option<String>,

    /// Topic Debezium publishes source changes to
    #[arg(long, global = true, env = "PIPECHECK_CDC_TOPIC")]
    cdc_topic: Option<String>,

    /// Scratch topic for the produce/consume check
    #[arg(long, global = true, env = "PIPECHECK_PROBE_TOPIC")]
    probe_topic: Option<String>,

    /// Consumer group of the search indexer
    #[arg(long, global = true, env = "PIPECHECK_INDEXER_GROUP")]
    indexer_group: Option<String>,

    /// Trailing messages per partition scanned when looking for an event
    #[arg(long, global = true, env = "PIPECHECK_TAIL_WINDOW")]
    tail_window: Option<i64>,

    /// OpenSearch base URL
    #[arg(long, global = true, env = "PIPECHECK_OPENSEARCH_URL")]
    opensearch_url: Option<String>,

    /// Search index
    #[arg(long, global = true, env = "PIPECHECK_INDEX")]
    index: Option<String>,

    /// Kafka Connect base URL
    #[arg(long, global = true, env = "PIPECHECK_CONNECT_URL")]
    connect_url: Option<String>,

    /// Debezium connector name
    #[arg(long, global = true, env = "PIPECHECK_CONNECTOR")]
    connector: Option<String>,

    /// Search API base URL
    #[arg(long, global = true, env = "PIPECHECK_API_URL")]
    api_url: Option<String>,

    /// Prometheus base URL
    #[arg(long, global = true, env = "PIPECHECK_PROMETHEUS_URL")]
    prometheus_url: Option<String>,

    /// Prometheus scrape job of the search API
    #[arg(long, global = true, env = "PIPECHECK_PROMETHEUS_JOB")]
    prometheus_job: Option<String>,

    /// Grafana base URL
    #[arg(long, global = true, env = "PIPECHECK_GRAFANA_URL")]
    grafana_url: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true, env = "PIPECHECK_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Verdict for a yellow search cluster (pass, warn or fail)
    #[arg(long, global = true, env = "PIPECHECK_YELLOW_HEALTH")]
    yellow_health: Option<Verdict>,
}

impl ConfigArgs {
    fn into_config(self) -> HarnessConfig {
        let mut config = HarnessConfig::default();
        if let Some(secs) = self.timeout_secs {
            config = config.with_probe_timeout(Duration::from_secs(secs));
        }

        let sql = &mut config.sql;
        set(&mut sql.host, self.sql_host);
        set(&mut sql.port, self.sql_port);
        set(&mut sql.user, self.sql_user);
        set(&mut sql.password, self.sql_password);
        set(&mut sql.database, self.sql_database);
        set(&mut sql.source_table, self.source_table);
        set(&mut sql.capture_instance, self.capture_instance);

        let kafka = &mut config.kafka;
        set(&mut kafka.bootstrap_servers, self.kafka_bootstrap);
        set(&mut kafka.cdc_topic, self.cdc_topic);
        set(&mut kafka.probe_topic, self.probe_topic);
        set(&mut kafka.indexer_group, self.indexer_group);
        set(&mut kafka.tail_window, self.tail_window);

        let endpoints = &mut config.endpoints;
        set(&mut endpoints.opensearch_url, self.opensearch_url);
        set(&mut endpoints.index, self.index);
        set(&mut endpoints.connect_url, self.connect_url);
        set(&mut endpoints.connector, self.connector);
        set(&mut endpoints.api_url, self.api_url);
        set(&mut endpoints.prometheus_url, self.prometheus_url);
        set(&mut endpoints.prometheus_job, self.prometheus_job);
        set(&mut endpoints.grafana_url, self.grafana_url);

        set(&mut config.yellow_health, self.yellow_health);
        config
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    pipecheck_core::init_tracing(cli.json, level);

    let config = cli.config.into_config();
    let result = match cli.command {
        Commands::Run {
            suite,
            parallel,
            report_json,
        } => cmd_run(config, suite, parallel, report_json.as_deref()).await,
        Commands::List => {
            cmd_list();
            Ok(ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

async fn cmd_run(
    config: HarnessConfig,
    suite: Selection,
    parallel: bool,
    report_json: Option<&Path>,
) -> Result<ExitCode> {
    let ctx = LiveContext::new(config).context("invalid configuration")?;
    let selection = suite.0;
    let harness = Harness::live(&selection, &ctx);
    let mode = if parallel {
        RunMode::Parallel
    } else {
        RunMode::Sequential
    };

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling run");
                cancel.cancel();
            }
        })
    };

    let reporter = harness.run(mode, &cancel).await;
    watcher.abort();

    let exit_code = publish(
        reporter,
        mode,
        selection,
        report_json,
        &mut std::io::stdout().lock(),
    )?;
    Ok(if exit_code == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Print results and summary, then write the JSON report if one was asked
/// for. The summary is printed even when the report cannot be written.
fn publish(
    reporter: Reporter,
    mode: RunMode,
    selection: Vec<SuiteKind>,
    report_json: Option<&Path>,
    out: &mut impl Write,
) -> Result<i32> {
    write!(out, "{}", reporter.render_results())?;

    let report =
        report_json.map(|path| (path, RunReport::from_reporter(&reporter, mode, selection)));

    let summary = reporter.finalize();
    writeln!(out)?;
    write!(out, "{}", summary.text)?;
    out.flush()?;

    if let Some((path, report)) = report {
        write_run_report_json(path, &report)?;
        info!(path = %path.display(), "wrote run report");
    }

    Ok(summary.exit_code)
}

fn cmd_list() {
    for kind in SuiteKind::all() {
        println!("{:<12} {}", kind.name(), kind.description());
    }
    println!("{:<12} every suite above, in order", "all");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pipecheck_core::{CheckResult, ResultSink};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn unknown_suite_is_a_usage_error() {
        let err = Cli::try_parse_from(["pipecheck", "run", "redis"])
            .err()
            .expect("redis is not a suite");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("unknown suite"));
    }

    #[test]
    fn run_all_in_parallel() {
        let cli = Cli::try_parse_from([
            "pipecheck",
            "run",
            "all",
            "--parallel",
            "--report-json",
            "out.json",
        ])
        .expect("valid arguments");
        match cli.command {
            Commands::Run {
                suite,
                parallel,
                report_json,
            } => {
                assert_eq!(suite, Selection(SuiteKind::all()));
                assert!(parallel);
                assert_eq!(report_json, Some(PathBuf::from("out.json")));
            }
            Commands::List => panic!("expected run"),
        }
    }

    #[test]
    fn single_suite_selection() {
        assert_eq!(
            parse_selection("debezium"),
            Ok(Selection(vec![SuiteKind::Debezium]))
        );
        assert_eq!(
            parse_selection("Pipeline"),
            Ok(Selection(vec![SuiteKind::Pipeline]))
        );
        assert_eq!(parse_selection("ALL"), Ok(Selection(SuiteKind::all())));
        assert!(parse_selection("redis").is_err());
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let args = ConfigArgs {
            sql_host: Some("mssql".to_string()),
            index: Some("people".to_string()),
            timeout_secs: Some(12),
            yellow_health: Some(Verdict::Fail),
            ..ConfigArgs::default()
        };
        let config = args.into_config();
        assert_eq!(config.sql.host, "mssql");
        assert_eq!(config.sql.port, 1433);
        assert_eq!(config.endpoints.index, "people");
        assert_eq!(config.probe_timeout, Duration::from_secs(12));
        assert_eq!(config.yellow_health, Verdict::Fail);
    }

    #[test]
    fn global_overrides_after_subcommand() {
        let cli = Cli::try_parse_from([
            "pipecheck",
            "run",
            "api",
            "--api-url",
            "http://search:8000",
            "--yellow-health",
            "pass",
        ])
        .expect("valid arguments");
        let config = cli.config.into_config();
        assert_eq!(config.endpoints.api_url, "http://search:8000");
        assert_eq!(config.yellow_health, Verdict::Pass);
    }

    fn failing_reporter() -> Reporter {
        let mut reporter = Reporter::new();
        reporter.begin_suite(SuiteKind::Api);
        reporter.record(CheckResult::fail("API /health reports ok", "HTTP 503"));
        reporter
    }

    #[test]
    fn summary_printed_even_if_report_cannot_be_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing").join("report.json");
        let mut out = Vec::new();

        let err = publish(
            failing_reporter(),
            RunMode::Sequential,
            vec![SuiteKind::Api],
            Some(&path),
            &mut out,
        )
        .expect_err("parent directory does not exist");

        let printed = String::from_utf8(out).expect("utf8");
        assert!(printed.contains("[FAIL] API /health reports ok"));
        assert!(printed.contains("- API /health reports ok"));
        assert!(printed.contains("RESULT: FAILED"));
        assert!(format!("{err:#}").contains("write"));
    }

    #[test]
    fn report_written_after_summary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.json");
        let mut out = Vec::new();

        let exit_code = publish(
            failing_reporter(),
            RunMode::Parallel,
            vec![SuiteKind::Api],
            Some(&path),
            &mut out,
        )
        .expect("report written");

        assert_eq!(exit_code, 1);
        let report: RunReport =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read report"))
                .expect("parse report");
        assert_eq!(report.summary.failed_names, vec!["API /health reports ok"]);
    }

    #[test]
    fn invalid_config_is_reported_before_any_check() {
        let args = ConfigArgs {
            source_table: Some("profiles; DROP TABLE x".to_string()),
            ..ConfigArgs::default()
        };
        assert!(LiveContext::new(args.into_config()).is_err());
    }
}
