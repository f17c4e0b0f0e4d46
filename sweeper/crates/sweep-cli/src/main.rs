//! CLI entry point for the strategy tester sweeper.
//!
//! Subcommands:
//!   - `optimize` sweeps the parameters in a spec file and replays the winner
//!   - `apply`    replays a saved set of input values
//!   - `read`     prints what the tester currently shows
//!   - `discover` writes a starter spec from the strategy's numeric inputs
//!   - `ping`     checks that the in-page agent answers

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sweep_bridge::{
    BridgeSettings, InputInfo, PageBridgeClient, connect_page, starter_parameters,
};
use sweep_core::{
    AcceptanceCriteria, ApplyStatus, BestInputs, Optimizer, RunControl, SweepReport,
    SweepSettings, SweepSpec, load_sweep_spec,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Exit status when a sweep finishes without a qualifying candidate.
const EXIT_NOT_FOUND: i32 = 2;

// ---------------------------------------------------------------------------
// CLI argument structs
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "sweep",
    version,
    about = "Greedy parameter sweeps against a browser strategy tester",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    bridge: BridgeArgs,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep the parameters in a spec file
    Optimize(OptimizeArgs),
    /// Replay saved input values onto the page
    Apply(ApplyArgs),
    /// Print the tester's current results
    Read(ReadArgs),
    /// Write a starter spec from the open strategy settings dialog
    Discover(DiscoverArgs),
    /// Check the in-page agent is reachable
    Ping,
}

#[derive(Args)]
struct BridgeArgs {
    /// Unix socket of the in-page agent
    #[arg(long, global = true, env = "SWEEP_BRIDGE_SOCK")]
    sock: Option<PathBuf>,

    /// How long to wait for a control or the results region (ms)
    #[arg(long, global = true, env = "SWEEP_ELEMENT_TIMEOUT_MS")]
    element_timeout_ms: Option<u64>,

    /// Interval between presence checks (ms)
    #[arg(long, global = true, env = "SWEEP_POLL_MS")]
    poll_ms: Option<u64>,

    /// Wait after clicking apply (ms)
    #[arg(long, global = true, env = "SWEEP_POST_APPLY_MS")]
    post_apply_ms: Option<u64>,

    /// Bound on one agent request (ms)
    #[arg(long, global = true, env = "SWEEP_RPC_TIMEOUT_MS")]
    rpc_timeout_ms: Option<u64>,
}

impl BridgeArgs {
    fn settings(&self) -> BridgeSettings {
        let mut s = BridgeSettings::default();
        if let Some(sock) = &self.sock {
            s.socket_path = sock.clone();
        }
        if let Some(ms) = self.element_timeout_ms {
            s.element_timeout_ms = ms;
        }
        if let Some(ms) = self.poll_ms {
            s.poll_interval_ms = ms;
        }
        if let Some(ms) = self.post_apply_ms {
            s.post_apply_ms = ms;
        }
        if let Some(ms) = self.rpc_timeout_ms {
            s.rpc_timeout_ms = ms;
        }
        s
    }
}

#[derive(Args)]
struct OptimizeArgs {
    /// Path to the sweep spec YAML
    #[arg(long)]
    spec: PathBuf,

    /// Leave the page at the last candidate instead of replaying the winner
    #[arg(long, default_value_t = false)]
    no_apply: bool,

    /// Write the JSON report to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Override the wait between applying a value and reading results (ms)
    #[arg(long, env = "SWEEP_SETTLE_MS")]
    settle_ms: Option<u64>,
}

#[derive(Args)]
struct ApplyArgs {
    /// YAML or JSON list of `{name, value}` entries, applied in order
    #[arg(long)]
    values: PathBuf,
}

#[derive(Args)]
struct ReadArgs {
    /// Include the trade list, balance and drawdown
    #[arg(long, default_value_t = false)]
    all: bool,
}

#[derive(Args)]
struct DiscoverArgs {
    /// Write the spec YAML to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct OptimizeOutput<'a> {
    #[serde(flatten)]
    report: &'a SweepReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    apply_result: Option<ApplyStatus>,
}

async fn cmd_optimize(args: OptimizeArgs, bridge: BridgeSettings) -> Result<i32> {
    let spec = load_sweep_spec(&args.spec)?;
    let mut settings = spec.settings;
    if let Some(ms) = args.settle_ms {
        settings.settle_ms = ms;
    }

    let (driver, reader) = connect_page(bridge);
    let optimizer = Optimizer::new(driver, reader).with_settings(settings);

    let control = RunControl::new();
    let cancel = control.cancel_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current candidate");
            cancel.cancel();
        }
    });

    let (report, apply_result) = if spec.apply_best && !args.no_apply {
        let (report, status) = optimizer
            .optimize_and_apply(&spec.parameters, &spec.criteria, &control)
            .await?;
        (report, Some(status))
    } else {
        let report = optimizer
            .optimize(&spec.parameters, &spec.criteria, &control)
            .await?;
        (report, None)
    };

    if let Some(ApplyStatus::Failed { parameter, error }) = &apply_result {
        warn!(param = ?parameter, %error, "best inputs were not fully applied");
    }

    write_json(
        &OptimizeOutput {
            report: &report,
            apply_result,
        },
        args.output.as_deref(),
    )?;

    if report.is_found() {
        Ok(0)
    } else {
        info!(trials = report.trials.len(), "no candidate met the criteria");
        Ok(EXIT_NOT_FOUND)
    }
}

fn load_values(path: &Path) -> Result<BestInputs> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read values file {}", path.display()))?;
    serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse values file {}", path.display()))
}

async fn cmd_apply(args: ApplyArgs, bridge: BridgeSettings) -> Result<i32> {
    let values = load_values(&args.values)?;
    let (driver, reader) = connect_page(bridge);
    let optimizer = Optimizer::new(driver, reader);
    optimizer.apply_best(&values).await?;
    write_json(&serde_json::json!({ "applied": values.len() }), None)?;
    Ok(0)
}

async fn cmd_read(args: ReadArgs, bridge: BridgeSettings) -> Result<i32> {
    let (_, reader) = connect_page(bridge);
    if args.all {
        let current = reader
            .read_current()
            .await
            .context("failed to read current results")?;
        write_json(&current, None)?;
    } else {
        let snapshot = reader
            .snapshot()
            .await
            .context("failed to read metrics")?;
        write_json(&snapshot, None)?;
    }
    Ok(0)
}

/// Spec sweeping every numeric input over its starter range, default criteria.
fn starter_spec(inputs: &[InputInfo]) -> SweepSpec {
    SweepSpec {
        parameters: starter_parameters(inputs),
        criteria: AcceptanceCriteria::default(),
        apply_best: true,
        settings: SweepSettings::default(),
    }
}

async fn cmd_discover(args: DiscoverArgs, bridge: BridgeSettings) -> Result<i32> {
    let (driver, _) = connect_page(bridge);
    let inputs = driver
        .list_inputs()
        .await
        .context("failed to list strategy inputs")?;
    let spec = starter_spec(&inputs);
    if spec.parameters.is_empty() {
        bail!(
            "no numeric inputs found ({} controls listed); open the strategy settings dialog first",
            inputs.len()
        );
    }
    info!(
        inputs = inputs.len(),
        parameters = spec.parameters.len(),
        "starter spec built"
    );

    let yaml = serde_yaml::to_string(&spec)?;
    match args.output.as_deref() {
        Some(path) => {
            std::fs::write(path, yaml)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "spec written");
        }
        None => print!("{yaml}"),
    }
    Ok(0)
}

async fn cmd_ping(bridge: BridgeSettings) -> Result<i32> {
    let client = PageBridgeClient::new(bridge.socket_path.clone(), bridge.rpc_timeout());
    let health = client
        .health()
        .await
        .with_context(|| format!("agent at {} did not answer", bridge.socket_path.display()))?;
    write_json(&health, None)?;
    Ok(0)
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, json + "\n")
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let bridge = cli.bridge.settings();
    let result = match cli.command {
        Commands::Optimize(args) => cmd_optimize(args, bridge).await,
        Commands::Apply(args) => cmd_apply(args, bridge).await,
        Commands::Read(args) => cmd_read(args, bridge).await,
        Commands::Discover(args) => cmd_discover(args, bridge).await,
        Commands::Ping => cmd_ping(bridge).await,
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("[error] {e:#}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io::Write;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn optimize_flags_parse() {
        let cli = Cli::try_parse_from([
            "sweep",
            "optimize",
            "--spec",
            "sweep.yaml",
            "--no-apply",
            "--settle-ms",
            "1500",
            "--sock",
            "/run/agent.sock",
            "--post-apply-ms",
            "250",
        ])
        .unwrap();
        let bridge = cli.bridge.settings();
        assert_eq!(bridge.socket_path, PathBuf::from("/run/agent.sock"));
        assert_eq!(bridge.post_apply_ms, 250);
        assert_eq!(bridge.element_timeout_ms, BridgeSettings::default().element_timeout_ms);
        match cli.command {
            Commands::Optimize(args) => {
                assert_eq!(args.spec, PathBuf::from("sweep.yaml"));
                assert!(args.no_apply);
                assert_eq!(args.settle_ms, Some(1500));
                assert!(args.output.is_none());
            }
            _ => panic!("expected optimize"),
        }
    }

    #[test]
    fn optimize_requires_spec() {
        assert!(Cli::try_parse_from(["sweep", "optimize"]).is_err());
    }

    #[test]
    fn values_file_keeps_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "- {{ name: mult, value: 1.5 }}\n- {{ name: length, value: 20 }}").unwrap();
        let values = load_values(file.path()).unwrap();
        let names: Vec<&str> = values.iter().map(|pv| pv.name.as_str()).collect();
        assert_eq!(names, vec!["mult", "length"]);
        assert_eq!(values.get("length"), Some(20.0));
    }

    #[test]
    fn values_file_accepts_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"name": "length", "value": 14}}]"#).unwrap();
        let values = load_values(file.path()).unwrap();
        assert_eq!(values.get("length"), Some(14.0));
    }

    #[test]
    fn report_output_flattens_outcome() {
        let report = SweepReport {
            outcome: sweep_core::SweepOutcome::NotFound,
            trials: Vec::new(),
            cancelled: true,
        };
        let json = serde_json::to_value(OptimizeOutput {
            report: &report,
            apply_result: Some(ApplyStatus::Skipped),
        })
        .unwrap();
        assert_eq!(json["outcome"], "not_found");
        assert_eq!(json["cancelled"], true);
        assert_eq!(json["apply_result"]["apply"], "skipped");
    }

    #[test]
    fn values_file_rejects_repeated_names() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "- {{ name: a, value: 1 }}\n- {{ name: a, value: 2 }}").unwrap();
        let err = load_values(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("duplicate value for parameter a"));
    }

    #[test]
    fn starter_spec_round_trips_through_loader() {
        let inputs: Vec<InputInfo> = serde_json::from_value(serde_json::json!([
            {"name": "length", "type": "number", "value": "14"},
            {"name": "src", "type": "string", "value": "close"},
            {"name": "mult", "type": "number", "value": "2", "min": "1", "max": "3", "step": "0.5"},
        ]))
        .unwrap();
        let spec = starter_spec(&inputs);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_yaml::to_string(&spec).unwrap()).unwrap();
        let loaded = load_sweep_spec(file.path()).unwrap();

        assert_eq!(loaded, spec);
        let names: Vec<&str> = loaded.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["length", "mult"]);
        assert_eq!(loaded.parameters.get("length").unwrap().max, 28.0);
        assert!(loaded.apply_best);
    }
}
