//! Lookout agent - telemetry host adapter (`lookoutd`)
//!
//! Reads reports as NDJSON on stdin and delivers them through the
//! dispatcher. Handles:
//! - Error and performance reports
//! - Online/offline transitions from the host
//! - Error capture with fingerprinting and rate limiting
//! - Optional Prometheus `/metrics` and `/status` endpoints
//! - Best-effort final delivery on SIGTERM/SIGINT or end of input
//!
//! # Architecture
//!
//! The agent builds one [`Dispatcher`] and feeds it from a line reader.
//! The reader loop is controlled by a `CancellationToken` that is
//! triggered on receipt of SIGTERM or SIGINT.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use lookout_core::config::Config;
use lookout_core::domain::Category;
use lookout_report::{ConnectivityMonitor, Dispatcher, Disposition};
use lookout_telemetry::{
    install_panic_reporter, uninstall_panic_reporter, ErrorCapture, ErrorInfo, MetricsRegistry,
    MetricsServer,
};
use lookout_transport::http::HttpTransport;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod input;

use input::{parse_line, InputLine};

#[derive(Debug, Parser)]
#[command(name = "lookoutd", version, about = "Lookout telemetry delivery agent")]
struct Cli {
    /// Use alternate config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

// ============================================================================
// Logging
// ============================================================================

/// Builds the log filter: `RUST_LOG` wins, then the configured level.
///
/// With `debug` set the lookout crates log at `debug` regardless.
fn build_env_filter(config: &Config) -> EnvFilter {
    let mut directives = std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| config.logging.level.clone());
    if config.debug {
        directives.push_str(",lookout_report=debug,lookout_transport=debug");
    }
    EnvFilter::new(directives)
}

fn init_tracing(config: &Config, json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(build_env_filter(config))
        .with_target(true)
        .with_writer(std::io::stderr);
    if json || config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ============================================================================
// AgentService
// ============================================================================

/// How long teardown waits for the final beacon before the runtime stops
const BEACON_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Wires configuration, dispatcher and adapters together
struct AgentService {
    config: Config,
    transport: Arc<HttpTransport>,
    dispatcher: Dispatcher,
    connectivity: ConnectivityMonitor,
    capture: ErrorCapture,
    metrics: Option<Arc<MetricsRegistry>>,
    shutdown: CancellationToken,
}

impl AgentService {
    fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let transport =
            Arc::new(HttpTransport::new(&config.report).context("Failed to create transport")?);
        let connectivity = ConnectivityMonitor::default();

        let metrics = if config.metrics.enabled {
            Some(Arc::new(
                MetricsRegistry::new().context("Failed to create metrics registry")?,
            ))
        } else {
            None
        };

        let mut builder = Dispatcher::builder(config.clone(), transport.clone())
            .connectivity(connectivity.subscribe())
            .integration(Arc::new(lookout_report::integrations::LogIntegration));
        if let Some(metrics) = &metrics {
            builder = builder.observer(metrics.clone());
        }
        let dispatcher = builder.build().context("Failed to start dispatcher")?;

        let capture = ErrorCapture::new(dispatcher.clone(), &config.capture)
            .context("Failed to create error capture")?;

        Ok(Self {
            config,
            transport,
            dispatcher,
            connectivity,
            capture,
            metrics,
            shutdown,
        })
    }

    /// Runs until end of input or shutdown, then tears the dispatcher down.
    async fn run<R>(&self, reader: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        if self.config.capture.capture_panics {
            install_panic_reporter(self.dispatcher.clone());
        }

        let server_token = self.shutdown.child_token();
        if let Some(metrics) = &self.metrics {
            let dispatcher = self.dispatcher.clone();
            let server = MetricsServer::new(Arc::clone(metrics), &self.config.metrics.listen)?
                .with_status(Arc::new(move || {
                    serde_json::to_value(dispatcher.status()).unwrap_or_default()
                }));
            let token = server_token.clone();
            tokio::spawn(async move {
                if let Err(e) = server.run(token).await {
                    error!(error = %e, "Metrics server failed");
                }
            });
        }

        let result = self.read_loop(reader).await;

        info!(status = ?self.dispatcher.status(), "Flushing remaining reports");
        self.dispatcher.destroy().await;
        self.transport.drain(BEACON_DRAIN_TIMEOUT).await;
        server_token.cancel();
        if self.config.capture.capture_panics {
            uninstall_panic_reporter();
        }

        result
    }

    async fn read_loop<R>(&self, reader: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut line_no: u64 = 0;

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line.context("Failed to read input")?,
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
            };
            let Some(line) = line else {
                info!(lines = line_no, "End of input");
                break;
            };
            line_no += 1;

            match parse_line(&line) {
                Ok(Some(input)) => self.handle(input),
                Ok(None) => {}
                Err(e) => warn!(line = line_no, error = %e, "Skipping malformed input line"),
            }
        }

        Ok(())
    }

    fn handle(&self, input: InputLine) {
        match input {
            InputLine::Report { kind, data } => {
                let disposition = match kind {
                    Category::Error => self.dispatcher.report_error(data),
                    Category::Performance => self.dispatcher.report_performance(data),
                };
                debug!(%kind, ?disposition, "Report ingested");
                if disposition == Disposition::Closed {
                    warn!("Report received after teardown");
                }
            }
            InputLine::Connectivity { connectivity } => {
                self.connectivity.set_online(connectivity.is_online());
            }
            InputLine::Capture { capture } => {
                let info = ErrorInfo::new(capture.name, capture.message).with_stack(capture.stack);
                let outcome = self.capture.capture(info, capture.context);
                debug!(?outcome, "Error captured");
            }
            InputLine::Flush { flush } => {
                if flush {
                    self.dispatcher.request_flush();
                }
            }
        }
    }
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(Config::load_or_default(&Config::default_path())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config, cli.json_logs);

    info!("Lookout agent starting (lookoutd)");

    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            error!(field = %problem.field, message = %problem.message, "Invalid configuration");
        }
        anyhow::bail!("invalid configuration ({} problem(s))", problems.len());
    }
    if !config.report.has_endpoint() {
        warn!("No report endpoint configured; reports will not leave this process");
    }

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = AgentService::new(config, shutdown_token)?;
    let result = service.run(BufReader::new(tokio::io::stdin())).await;

    match &result {
        Ok(()) => info!("Lookout agent shut down gracefully"),
        Err(e) => error!(error = %e, "Lookout agent exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::io::Write;

    use lookout_core::config::ConfigBuilder;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn quiet_config() -> Config {
        let mut config = ConfigBuilder::new().batch_interval_ms(60_000).build();
        config.capture.capture_panics = false;
        config
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::parse_from(["lookoutd", "--config", "/tmp/lookout.yaml", "--json-logs"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/lookout.yaml")));
        assert!(cli.json_logs);

        let cli = Cli::parse_from(["lookoutd"]);
        assert!(cli.config.is_none());
        assert!(!cli.json_logs);
    }

    #[test]
    fn test_load_config_from_explicit_path() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "report:\n  batch_size: 4\ndebug: true").unwrap();

        let cli = Cli::parse_from(["lookoutd", "--config", tmp.path().to_str().unwrap()]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.report.batch_size, 4);
        assert!(config.debug);
    }

    #[test]
    fn test_load_config_missing_explicit_path_fails() {
        let cli = Cli::parse_from(["lookoutd", "--config", "/nonexistent/lookout.yaml"]);
        assert!(load_config(&cli).is_err());
    }

    #[tokio::test]
    async fn test_service_ingests_lines_and_tears_down() {
        let service = AgentService::new(quiet_config(), CancellationToken::new()).unwrap();
        let input = concat!(
            "{\"kind\":\"error\",\"data\":{\"message\":\"boom\"}}\n",
            "\n",
            "garbage\n",
            "{\"kind\":\"performance\",\"data\":{\"name\":\"fcp\"}}\n",
            "{\"connectivity\":\"offline\"}\n",
        );

        service.read_loop(input.as_bytes()).await.unwrap();
        assert_eq!(service.dispatcher.status().queued, 2);
        assert!(!service.connectivity.is_online());

        service.dispatcher.destroy().await;
        assert!(service.dispatcher.status().destroyed);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancelled_token() {
        let token = CancellationToken::new();
        let service = AgentService::new(quiet_config(), token.clone()).unwrap();
        token.cancel();

        let (_writer, reader) = tokio::io::duplex(64);
        service.run(BufReader::new(reader)).await.unwrap();
        assert!(service.dispatcher.status().destroyed);
    }

    #[tokio::test]
    async fn test_run_waits_for_final_beacon() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/report"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut config = quiet_config();
        config.report.endpoint = format!("{}/report", server.uri());
        let service = AgentService::new(config, CancellationToken::new()).unwrap();

        let input = "{\"kind\":\"error\",\"data\":{\"message\":\"last\"}}\n";
        service.run(input.as_bytes()).await.unwrap();

        assert_eq!(service.transport.pending_beacons(), 0);
        let requests = server.received_requests().await.unwrap_or_default();
        assert_eq!(requests.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["batch"][0]["message"], "last");
    }

    #[tokio::test]
    async fn test_capture_lines_reach_the_queue() {
        let service = AgentService::new(quiet_config(), CancellationToken::new()).unwrap();
        let input = "{\"capture\":{\"name\":\"TypeError\",\"message\":\"x is undefined\"}}\n\
                     {\"capture\":{\"message\":\"Network Error\"}}\n";

        service.read_loop(input.as_bytes()).await.unwrap();
        assert_eq!(service.dispatcher.status().queued, 1);
    }

    #[test]
    fn test_debug_flag_raises_lookout_crates() {
        let mut config = quiet_config();
        config.debug = true;
        let filter = build_env_filter(&config).to_string();
        assert!(filter.contains("lookout_report=debug"));
    }
}
