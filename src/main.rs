//! Header overlay reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     CLI / config file ──▶ session::ProxyController ──events──▶ stdout
//!                                   │
//!                                   ▼
//!     LAN client ──▶ net listener ──▶ http server ──▶ overlay ──▶ forward ──▶ Target
//!                     0.0.0.0:port     (CORS, diagnostics)                      origin
//! ```
//!
//! Subcommands:
//! - `run`: start a session and keep it until Ctrl-C / SIGTERM
//! - `check-port`: report whether a port is free and who owns it
//! - `kill-port`: kill the process occupying a port
//! - `local-ip`: print the LAN address used in proxy URLs

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use header_proxy::config::{load_config, AppConfig, ConfigWatcher, LogFormat};
use header_proxy::lifecycle::wait_for_signal;
use header_proxy::net;
use header_proxy::observability::{init_logging, metrics};
use header_proxy::overlay::HeaderRow;
use header_proxy::session::{ProxyController, ProxyEvent};

#[derive(Parser)]
#[command(name = "header-proxy")]
#[command(about = "Reverse proxy that overlays custom request headers", long_about = None)]
struct Cli {
    /// Log as JSON lines instead of human-readable output
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy and run until interrupted
    Run(RunArgs),
    /// Check whether a port is free
    CheckPort {
        port: u32,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Kill the process occupying a port
    KillPort {
        port: u32,
        /// Process to kill; looked up from the port when omitted
        #[arg(long)]
        pid: Option<u32>,
    },
    /// Print the LAN IPv4 address
    LocalIp,
}

#[derive(clap::Args)]
struct RunArgs {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Restart the session whenever the config file changes
    #[arg(long, requires = "config")]
    watch: bool,

    /// Target origin, overrides the config file
    #[arg(short, long)]
    target: Option<String>,

    /// Listening port, overrides the config file
    #[arg(short, long)]
    port: Option<u32>,

    /// Header to overlay as `Name: value`; repeatable, replaces the file's headers
    #[arg(short = 'H', long = "header", value_parser = parse_header_row)]
    headers: Vec<HeaderRow>,

    /// Print status events as JSON lines
    #[arg(long)]
    json: bool,
}

fn parse_header_row(raw: &str) -> Result<HeaderRow, String> {
    raw.split_once(':')
        .map(|(key, value)| HeaderRow::new(key, value))
        .ok_or_else(|| format!("expected `Name: value`, got `{}`", raw))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args, cli.log_json).await,
        Commands::CheckPort { port, json } => {
            init_default_logging(cli.log_json);
            let result = net::check_port_availability(port).await?;
            if json {
                println!("{}", serde_json::to_string(&result)?);
            } else if result.available {
                println!("Port {} is available", port);
            } else {
                match &result.occupying_process {
                    Some(p) => println!(
                        "Port {} is in use by {} (pid {}): {}",
                        port, p.name, p.pid, p.command_line
                    ),
                    None => println!("Port {} is in use", port),
                }
            }
            Ok(())
        }
        Commands::KillPort { port, pid } => {
            init_default_logging(cli.log_json);
            let validated = header_proxy::config::validate_port(port)?;
            let pid = match pid {
                Some(pid) => pid,
                None => match net::find_owning_process(validated).await {
                    Some(owner) => owner.pid,
                    None => {
                        return Err(format!("No process found listening on port {}", port).into());
                    }
                },
            };

            let (controller, mut events) = ProxyController::new(Default::default());
            let outcome = controller.kill_port_process(port, pid).await;
            drop(controller);
            while let Some(event) = events.recv().await {
                print_event(&event, false);
            }
            outcome.map_err(Into::into)
        }
        Commands::LocalIp => {
            let (controller, _events) = ProxyController::new(Default::default());
            println!("{}", controller.local_ip());
            Ok(())
        }
    }
}

async fn run(args: RunArgs, log_json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if log_json {
        config.observability.log_format = LogFormat::Json;
    }
    init_logging(&config.observability);
    tracing::info!("header-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    if let Some(addr) = &config.observability.metrics_address {
        match addr.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(metrics_address = %addr, error = %e, "Failed to parse metrics address"),
        }
    }

    let overrides = CliOverrides::from(&args);
    let mut request = config.proxy.clone();
    overrides.apply(&mut request);

    match net::check_port_availability(request.port).await {
        Ok(result) if !result.available => tracing::warn!(
            port = request.port,
            owner = ?result.occupying_process,
            "Port appears to be in use"
        ),
        _ => {}
    }

    let (controller, events) = ProxyController::new(config.server.clone());
    let printer = tokio::spawn(print_events(events, args.json));

    if let Err(e) = controller.start(&request).await {
        drop(controller);
        let _ = printer.await;
        return Err(e.into());
    }

    let (_watcher, mut updates) = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            (Some(watcher.run()?), rx)
        }
        _ => {
            let (_, rx) = mpsc::unbounded_channel();
            (None, rx)
        }
    };

    let signal = wait_for_signal();
    tokio::pin!(signal);
    loop {
        tokio::select! {
            _ = &mut signal => break,
            Some(update) = updates.recv() => {
                let mut next = update.proxy;
                overrides.apply(&mut next);
                if let Err(e) = controller.restart(&next).await {
                    tracing::error!(error = %e, "Restart from config change failed");
                }
            }
        }
    }

    if controller.state().is_idle() {
        tracing::info!("No session running at shutdown");
    } else if let Err(e) = controller.stop().await {
        tracing::warn!(error = %e, "Stop at shutdown failed");
    }
    drop(controller);
    let _ = printer.await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Flags that win over whatever the config file says, including on reload.
struct CliOverrides {
    target: Option<String>,
    port: Option<u32>,
    headers: Vec<HeaderRow>,
}

impl From<&RunArgs> for CliOverrides {
    fn from(args: &RunArgs) -> Self {
        Self {
            target: args.target.clone(),
            port: args.port,
            headers: args.headers.clone(),
        }
    }
}

impl CliOverrides {
    fn apply(&self, request: &mut header_proxy::ProxyRequest) {
        if let Some(target) = &self.target {
            request.target_url = target.clone();
        }
        if let Some(port) = self.port {
            request.port = port;
        }
        if !self.headers.is_empty() {
            request.headers = self.headers.clone();
        }
    }
}

fn init_default_logging(json: bool) {
    let mut observability = header_proxy::config::ObservabilityConfig::default();
    if json {
        observability.log_format = LogFormat::Json;
    }
    init_logging(&observability);
}

async fn print_events(mut events: mpsc::UnboundedReceiver<ProxyEvent>, json: bool) {
    while let Some(event) = events.recv().await {
        print_event(&event, json);
    }
}

fn print_event(event: &ProxyEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::error!(error = %e, "Failed to serialize event"),
        }
        return;
    }
    match event {
        ProxyEvent::Status(status) => match &status.proxy_url {
            Some(url) => println!("[{}] {} ({})", status.status, status.message, url),
            None => println!("[{}] {}", status.status, status.message),
        },
        ProxyEvent::PortCheck(result) => {
            let mark = if result.success { "ok" } else { "failed" };
            println!("[{}] {}", mark, result.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_flag_splits_on_first_colon() {
        let row = parse_header_row("Authorization: Bearer a:b").unwrap();
        assert_eq!(row.key, "Authorization");
        assert_eq!(row.value, " Bearer a:b");
        assert!(parse_header_row("no-colon").is_err());
    }

    #[test]
    fn cli_overrides_replace_file_values() {
        let cli = Cli::parse_from([
            "header-proxy", "run", "-t", "http://127.0.0.1:3000", "-p", "4000", "-H", "X-A: 1",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let mut request = header_proxy::ProxyRequest::new("https://example.com", 8080, [("X-B", "2")]);
        CliOverrides::from(&args).apply(&mut request);
        assert_eq!(request.target_url, "http://127.0.0.1:3000");
        assert_eq!(request.port, 4000);
        assert_eq!(request.headers, vec![HeaderRow::new("X-A", " 1")]);
    }
}
