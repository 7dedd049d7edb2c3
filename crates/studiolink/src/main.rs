//! studiolink CLI.
//!
//! Checks request catalogs and runs the binding engine headless against a
//! studio.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use studiolink_catalog::{compile, BindingRole, Catalog, CompilerConfig, OptionsCache};
use studiolink_lib::{Engine, EngineConfig, EngineError, LoggingSurface};
use studiolink_telemetry::{LogFormat, Telemetry, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "studiolink", about = "Studio control surface link", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile a request catalog and list the resulting bindings.
    Check {
        /// Catalog file (JSON or YAML).
        #[arg(short, long)]
        catalog: String,

        /// Output format (text or json).
        #[arg(long, default_value = "text")]
        format: String,

        /// Catalog groups to leave out (default: commands).
        #[arg(long = "skip-group", num_args = 1..)]
        skip_group: Vec<String>,
    },

    /// Run the engine against a studio until interrupted.
    Run {
        /// Studio host.
        #[arg(long, env = "STUDIOLINK_HOST")]
        host: Option<String>,

        /// Studio WebSocket port.
        #[arg(long, env = "STUDIOLINK_PORT", default_value = "0")]
        port: u16,

        /// Catalog file (JSON or YAML).
        #[arg(short, long)]
        catalog: String,

        /// Delay between reconnect attempts in milliseconds.
        #[arg(long, default_value = "2000")]
        reconnect_delay_ms: u64,

        /// Time to wait for a reply in milliseconds (0 waits forever).
        #[arg(long, default_value = "10000")]
        request_timeout_ms: u64,

        /// Log level.
        #[arg(long, default_value = "info")]
        log_level: String,

        /// Log format (pretty or json).
        #[arg(long, default_value = "pretty")]
        log_format: String,

        /// Log every frame exchanged with the studio.
        #[arg(long)]
        log_messages: bool,
    },
}

#[derive(serde::Serialize)]
struct CheckReport<'a> {
    file: &'a str,
    bindings: &'a [studiolink_catalog::BindingDescriptor],
    rejected: Vec<String>,
}

fn load_catalog(path: &str) -> Result<Catalog, String> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(format!("catalog not found: {}", path.display()));
    }
    Catalog::load(path).map_err(|e| format!("failed to load catalog: {}", e))
}

/// Run the check command.
fn run_check(catalog_path: &str, output_format: &str, skip_groups: &[String]) -> ExitCode {
    let catalog = match load_catalog(catalog_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    };

    let mut config = CompilerConfig::default();
    if !skip_groups.is_empty() {
        config = config.with_skip_groups(skip_groups.iter().cloned());
    }
    let compiled = compile(&catalog, &OptionsCache::new(), &config);

    if output_format == "json" {
        let report = CheckReport {
            file: catalog_path,
            bindings: &compiled.descriptors,
            rejected: compiled.rejected.iter().map(|e| e.to_string()).collect(),
        };
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("error: failed to serialize report: {}", e);
                return ExitCode::from(1);
            }
        }
        return ExitCode::SUCCESS;
    }

    for descriptor in &compiled.descriptors {
        let role = match descriptor.role {
            BindingRole::Action => "action",
            BindingRole::Feedback => "feedback",
        };
        match &descriptor.topic {
            Some(topic) => println!("{:<8} {}  [{}]  topic={}", role, descriptor.id, descriptor.name, topic),
            None => println!("{:<8} {}  [{}]", role, descriptor.id, descriptor.name),
        }
    }
    for rejected in &compiled.rejected {
        println!("rejected {}: {}", rejected.request_type(), rejected);
    }
    eprintln!(
        "{}: {} binding(s), {} rejected",
        catalog_path,
        compiled.descriptors.len(),
        compiled.rejected.len()
    );
    ExitCode::SUCCESS
}

struct RunOptions {
    host: Option<String>,
    port: u16,
    catalog: String,
    reconnect_delay_ms: u64,
    request_timeout_ms: u64,
    log_level: String,
    log_format: String,
    log_messages: bool,
}

/// Run the engine until Ctrl-C.
async fn run_engine(opts: RunOptions) -> ExitCode {
    let Some(log_format) = LogFormat::parse(&opts.log_format) else {
        eprintln!("error: invalid log format: {}", opts.log_format);
        return ExitCode::from(1);
    };

    let mut config = EngineConfig::new()
        .with_reconnect_delay(Duration::from_millis(opts.reconnect_delay_ms))
        .with_request_timeout(
            (opts.request_timeout_ms > 0).then(|| Duration::from_millis(opts.request_timeout_ms)),
        )
        .with_log_messages(opts.log_messages);
    config.host = opts.host;
    config.port = opts.port;
    if let Err(e) = config.endpoint() {
        eprintln!("error: {}", e);
        return ExitCode::from(1);
    }

    let catalog = match load_catalog(&opts.catalog) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    };

    let telemetry_config = TelemetryConfig::new()
        .with_log_level(opts.log_level)
        .with_log_format(log_format);
    let telemetry = match Telemetry::init(telemetry_config) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    };

    let engine = Engine::with_metrics(
        config,
        catalog,
        Arc::new(LoggingSurface),
        telemetry.metrics_clone(),
    );
    match engine.init().await {
        Ok(()) => {}
        Err(EngineError::Connection(e)) => {
            tracing::warn!(error = %e, "Studio not reachable yet, retrying in the background");
        }
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
    }

    engine.shutdown().await;
    eprint!("{}", telemetry.render_prometheus());
    ExitCode::SUCCESS
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check {
            catalog,
            format,
            skip_group,
        } => run_check(&catalog, &format, &skip_group),
        Commands::Run {
            host,
            port,
            catalog,
            reconnect_delay_ms,
            request_timeout_ms,
            log_level,
            log_format,
            log_messages,
        } => {
            run_engine(RunOptions {
                host,
                port,
                catalog,
                reconnect_delay_ms,
                request_timeout_ms,
                log_level,
                log_format,
                log_messages,
            })
            .await
        }
    }
}
