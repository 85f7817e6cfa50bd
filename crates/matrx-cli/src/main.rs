use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use matrx_client::{ClientConfig, EngineClient};
use matrx_observability::{
    default_logs_dir, emit_event, init_process_logging, ObservabilityEvent, ProcessKind,
};
use tracing::debug;

mod commands;
mod input;

#[derive(Parser, Debug)]
#[command(name = "matrx")]
#[command(about = "Talk to a running Matrx engine")]
struct Cli {
    /// Engine host. Overrides MATRX_ENGINE_HOST.
    #[arg(long, global = true)]
    host: Option<String>,
    /// First port to probe. Overrides MATRX_ENGINE_PORT.
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Number of consecutive ports to probe.
    #[arg(long, global = true)]
    span: Option<u16>,
    /// Sent as X-User-Id on document routes. Overrides MATRX_USER_ID.
    #[arg(long, global = true)]
    user_id: Option<String>,
    /// Bearer token. Overrides MATRX_API_TOKEN.
    #[arg(long, global = true)]
    token: Option<String>,
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe the port range and print the engine endpoint.
    Discover,
    /// List tool names, or full schemas with --schemas.
    Tools {
        #[arg(long, default_value_t = false)]
        schemas: bool,
    },
    /// Run one tool and print its result.
    Invoke {
        tool: String,
        /// Tool input as a JSON object.
        #[arg(long)]
        input: Option<String>,
        /// Extra input fields as key=value; values parse as JSON when they can.
        #[arg(long = "arg", value_name = "KEY=VALUE")]
        args: Vec<String>,
        /// Use the WebSocket session instead of REST.
        #[arg(long, default_value_t = false)]
        ws: bool,
    },
    /// Print the access log, or follow it live.
    Logs {
        #[arg(long, default_value_t = matrx_client::logs::DEFAULT_ACCESS_LOG_LIMIT)]
        limit: usize,
        #[arg(long, short, default_value_t = false)]
        follow: bool,
        /// Follow the engine's own log instead of the access log.
        #[arg(long, default_value_t = false)]
        engine: bool,
    },
    /// Scrape URLs through the remote scraper.
    Scrape {
        #[arg(required = true)]
        urls: Vec<String>,
        /// Print results as they arrive.
        #[arg(long, default_value_t = false)]
        stream: bool,
    },
    /// Run a research job through the remote scraper.
    Research {
        query: String,
        #[arg(long, default_value = "extreme")]
        effort: String,
        #[arg(long, default_value = "us")]
        country: String,
        #[arg(long, default_value_t = false)]
        stream: bool,
    },
    /// Read or change engine settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Browse notes and sync state.
    Notes {
        #[command(subcommand)]
        action: NotesAction,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Get,
    Set {
        #[arg(long)]
        headless: Option<bool>,
        #[arg(long)]
        scrape_delay: Option<f64>,
    },
}

#[derive(Subcommand, Debug)]
enum NotesAction {
    Tree,
    List {
        #[arg(long)]
        folder_id: Option<String>,
        #[arg(long)]
        search: Option<String>,
    },
    Show {
        note_id: String,
    },
    SyncStatus,
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::from_env();
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(span) = self.span {
            config.port_span = span.max(1);
        }
        if let Some(user_id) = &self.user_id {
            config.user_id = Some(user_id.clone());
        }
        if let Some(token) = &self.token {
            config.api_token = Some(token.clone());
        }
        config.process = ProcessKind::Cli;
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logs_dir = cli
        .logs_dir
        .clone()
        .unwrap_or_else(|| default_logs_dir(dirs::data_dir()));
    let (_log_guard, log_info) = init_process_logging(ProcessKind::Cli, &logs_dir, 14)
        .with_context(|| format!("failed to initialize logging in {}", logs_dir.display()))?;
    emit_event(
        tracing::Level::DEBUG,
        ProcessKind::Cli,
        ObservabilityEvent::new("logging.initialized", "cli.main").status("ok"),
    );
    debug!("cli logging initialized: {:?}", log_info);

    let client = EngineClient::new(cli.client_config());
    let outcome = commands::run(&client, cli.command).await;
    client.shutdown();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_environment_config() {
        let cli = Cli::try_parse_from([
            "matrx",
            "--host",
            "10.0.0.5",
            "--port",
            "23000",
            "--span",
            "0",
            "--user-id",
            "user-7",
            "--token",
            "tok",
            "tools",
        ])
        .unwrap();
        let config = cli.client_config();
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 23000);
        assert_eq!(config.port_span, 1);
        assert_eq!(config.user_id.as_deref(), Some("user-7"));
        assert_eq!(config.api_token.as_deref(), Some("tok"));
        assert_eq!(config.process, ProcessKind::Cli);
    }

    #[test]
    fn invoke_collects_repeated_args() {
        let cli = Cli::try_parse_from([
            "matrx", "invoke", "Bash", "--arg", "command=ls", "--arg", "timeout=5", "--ws",
        ])
        .unwrap();
        match cli.command {
            Command::Invoke { tool, args, ws, .. } => {
                assert_eq!(tool, "Bash");
                assert_eq!(args, vec!["command=ls", "timeout=5"]);
                assert!(ws);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn global_flags_work_after_the_subcommand() {
        let cli = Cli::try_parse_from(["matrx", "logs", "--follow", "--port", "22150"]).unwrap();
        assert_eq!(cli.port, Some(22150));
        assert!(matches!(cli.command, Command::Logs { follow: true, .. }));
    }
}
