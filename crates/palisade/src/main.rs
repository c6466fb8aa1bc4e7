//! Palisade demonstration server.
//!
//! Loads an OpenAPI document, validates every request against it and serves
//! a couple of toy handlers behind the validator.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use palisade_lib::App;
use palisade_spec::parse_spec_file;
use palisade_telemetry::{log_listening, log_shutdown, log_startup, LogFormat, TelemetryConfig};
use palisade_validator::RequestLimits;

#[derive(Parser, Debug)]
#[command(name = "palisade", about = "OpenAPI request validation server", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that OpenAPI document(s) load.
    ///
    /// Reports load errors (E1000-E1004) for each file.
    Validate {
        /// Input spec file(s) (YAML or JSON).
        #[arg(short, long, required = true, num_args = 1..)]
        spec: Vec<PathBuf>,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Run the validating server.
    Serve {
        /// OpenAPI document to validate against.
        #[arg(long, env = "PALISADE_SPEC")]
        spec: PathBuf,

        /// Listen address.
        #[arg(long, env = "PALISADE_LISTEN", default_value = "127.0.0.1:8888")]
        listen: String,

        /// Enable development mode (error details in problem responses).
        #[arg(long, env = "PALISADE_DEV")]
        dev: bool,

        /// Log level, overridden by RUST_LOG.
        #[arg(long, default_value = "info")]
        log_level: String,

        /// Log format (json or pretty).
        #[arg(long, default_value = "json")]
        log_format: LogFormat,

        /// Maximum request body size in bytes (default: 1048576 = 1MB).
        #[arg(long, default_value = "1048576")]
        max_body_size: usize,

        /// Maximum number of request headers (default: 100).
        #[arg(long, default_value = "100")]
        max_headers: usize,

        /// Maximum size of a single header in bytes (default: 8192 = 8KB).
        #[arg(long, default_value = "8192")]
        max_header_size: usize,

        /// Maximum URI length in characters (default: 8192 = 8KB).
        #[arg(long, default_value = "8192")]
        max_uri_length: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Load result for a single spec file.
#[derive(serde::Serialize)]
struct LoadReport {
    file: String,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    operations: usize,
    errors: Vec<LoadIssue>,
}

#[derive(serde::Serialize)]
struct LoadIssue {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
}

/// Run the validate command.
fn run_validate(specs: &[PathBuf], format: OutputFormat) -> ExitCode {
    let reports: Vec<LoadReport> = specs.iter().map(|path| load_report(path)).collect();
    let invalid = reports.iter().filter(|r| !r.valid).count();

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "results": reports,
                "summary": {
                    "total": reports.len(),
                    "valid": reports.len() - invalid,
                    "invalid": invalid,
                }
            });
            match serde_json::to_string_pretty(&output) {
                Ok(text) => println!("{text}"),
                Err(e) => {
                    eprintln!("error: failed to render report: {e}");
                    return ExitCode::from(2);
                }
            }
        }
        OutputFormat::Text => {
            for report in &reports {
                if report.valid {
                    eprintln!("✓ {} is valid ({} operation(s))", report.file, report.operations);
                } else {
                    eprintln!("✗ {} has {} error(s)", report.file, report.errors.len());
                }
                for err in &report.errors {
                    match &err.location {
                        Some(loc) => eprintln!("  {} [{}]: {}", err.code, loc, err.message),
                        None => eprintln!("  {}: {}", err.code, err.message),
                    }
                }
            }
            eprintln!();
            eprintln!(
                "validated {} spec(s): {} valid, {} invalid",
                reports.len(),
                reports.len() - invalid,
                invalid
            );
        }
    }

    if invalid > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

fn load_report(path: &Path) -> LoadReport {
    let file = path.display().to_string();
    match parse_spec_file(path) {
        Ok(spec) => LoadReport {
            file,
            valid: true,
            title: Some(spec.title.clone()),
            operations: spec.operations().count(),
            errors: Vec::new(),
        },
        Err(e) => LoadReport {
            file,
            valid: false,
            title: None,
            operations: 0,
            errors: vec![LoadIssue {
                code: e.code().to_string(),
                message: e.to_string(),
                location: e.location().map(str::to_string),
            }],
        },
    }
}

/// Run the serve command until interrupted.
async fn run_serve(spec: &Path, listen: &str, dev: bool, limits: RequestLimits) -> anyhow::Result<()> {
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid listen address: {listen}"))?;

    let app = Arc::new(App::load(spec, limits, dev)?);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    log_listening!(address = %addr, dev_mode = dev);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            },
            _ = &mut shutdown => break,
        };

        let app = Arc::clone(&app);
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let app = Arc::clone(&app);
                async move { Ok::<_, std::convert::Infallible>(app.handle(req).await) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(peer = %peer, error = %e, "connection error");
            }
        });
    }

    log_shutdown!(reason = "interrupt");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { spec, format } => run_validate(&spec, format),
        Commands::Serve {
            spec,
            listen,
            dev,
            log_level,
            log_format,
            max_body_size,
            max_headers,
            max_header_size,
            max_uri_length,
        } => {
            let telemetry = TelemetryConfig::new()
                .with_log_level(log_level)
                .with_log_format(log_format);
            if let Err(e) = palisade_telemetry::init(&telemetry) {
                eprintln!("error: {e}");
                return ExitCode::from(1);
            }

            log_startup!(
                service = %telemetry.service_name,
                version = env!("CARGO_PKG_VERSION"),
                spec = %spec.display()
            );

            let limits = RequestLimits {
                max_body_size,
                max_headers,
                max_header_size,
                max_uri_length,
            };

            match run_serve(&spec, &listen, dev, limits).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!(error = %format!("{e:#}"), "server failed");
                    eprintln!("error: {e:#}");
                    ExitCode::from(1)
                }
            }
        }
    }
}
