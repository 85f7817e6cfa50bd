use anyhow::{bail, Context};
use matrx_client::{logs, scraper, ClientError, EngineClient, EngineEndpoint, NoteFilter, SseCallbacks, SseRequest};
use matrx_types::{ResearchRequest, ScrapeRequest};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::input::parse_tool_input;
use crate::{Command, NotesAction, SettingsAction};

pub async fn run(client: &EngineClient, command: Command) -> anyhow::Result<()> {
    let endpoint = require_engine(client).await?;

    match command {
        Command::Discover => {
            let rest = client.rest()?;
            let info = matrx_client::best_effort_default("engine info", rest.engine_info()).await;
            println!("{}", endpoint.base_url);
            if !info.version.is_empty() {
                println!("version {}", info.version);
            }
        }
        Command::Tools { schemas } => {
            let rest = client.rest()?;
            if schemas {
                let catalog = rest.chat_tools().await.context("failed to load tool schemas")?;
                print_json(&catalog.tools)?;
            } else {
                for tool in rest.list_tools().await.context("failed to list tools")? {
                    println!("{}", tool);
                }
            }
        }
        Command::Invoke {
            tool,
            input,
            args,
            ws,
        } => {
            let input = parse_tool_input(input.as_deref(), &args)?;
            let result = if ws {
                client
                    .connect_ws()
                    .await
                    .with_context(|| format!("failed to open WebSocket at {}", endpoint.ws_url))?;
                client.invoke_tool_ws(&tool, input).await
            } else {
                client.invoke_tool(&tool, input).await
            }
            .with_context(|| format!("failed to invoke {}", tool))?;

            print_json(&result)?;
            if result.is_error() {
                bail!("{} reported an error", tool);
            }
        }
        Command::Logs {
            limit,
            follow,
            engine,
        } => {
            if follow {
                let request = if engine {
                    logs::engine_log_stream()
                } else {
                    logs::access_log_stream()
                };
                follow_stream(client, request).await?;
            } else {
                let snapshot = client.rest()?.access_log(limit).await.context("failed to read access log")?;
                for entry in snapshot.entries {
                    println!(
                        "{} {} {} {} {:.1}ms",
                        entry.timestamp.to_rfc3339(),
                        entry.method,
                        entry.path,
                        entry.status,
                        entry.duration_ms
                    );
                }
            }
        }
        Command::Scrape { urls, stream } => {
            let request = ScrapeRequest { urls, options: None };
            if stream {
                follow_stream(client, scraper::scrape_stream(&request)?).await?;
            } else {
                let result = client.rest()?.remote_scrape(&request).await.context("scrape failed")?;
                print_json(&result)?;
            }
        }
        Command::Research {
            query,
            effort,
            country,
            stream,
        } => {
            let request = ResearchRequest { query, effort, country };
            if stream {
                follow_stream(client, scraper::research_stream(&request)?).await?;
            } else {
                let result = client.rest()?.remote_research(&request).await.context("research failed")?;
                print_json(&result)?;
            }
        }
        Command::Settings { action } => {
            let rest = client.rest()?;
            let mut settings = rest.settings().await.context("failed to read settings")?;
            if let SettingsAction::Set {
                headless,
                scrape_delay,
            } = action
            {
                if let Some(headless) = headless {
                    settings.headless_scraping = headless;
                }
                if let Some(delay) = scrape_delay {
                    if delay < 0.0 {
                        bail!("--scrape-delay must not be negative");
                    }
                    settings.scrape_delay = delay;
                }
                settings = rest.update_settings(&settings).await.context("failed to update settings")?;
            }
            print_json(&settings)?;
        }
        Command::Notes { action } => {
            let rest = client.rest()?;
            match action {
                NotesAction::Tree => print_json(&rest.folder_tree().await?)?,
                NotesAction::List { folder_id, search } => {
                    let notes = rest.list_notes(&NoteFilter { folder_id, search }).await?;
                    for note in notes {
                        println!("{}\t{}\t{}", note.id, note.folder_name, note.label);
                    }
                }
                NotesAction::Show { note_id } => print_json(&rest.get_note(&note_id).await?)?,
                NotesAction::SyncStatus => print_json(&rest.sync_status().await?)?,
            }
        }
    }

    Ok(())
}

async fn require_engine(client: &EngineClient) -> anyhow::Result<EngineEndpoint> {
    let config = client.config();
    match client.discover().await? {
        Some(endpoint) => Ok(endpoint),
        None => {
            let ports = config.candidate_ports();
            let last = ports.last().copied().unwrap_or(config.port);
            bail!(
                "no Matrx engine answered on {} ports {}-{}",
                config.host,
                config.port,
                last
            )
        }
    }
}

/// Prints events until the stream ends or Ctrl-C.
async fn follow_stream(client: &EngineClient, request: SseRequest) -> anyhow::Result<()> {
    let (error_tx, mut error_rx) = mpsc::unbounded_channel::<ClientError>();
    let handle = client.stream_sse(
        request,
        SseCallbacks::new(print_event).on_error(move |e| {
            let _ = error_tx.send(e);
        }),
    )?;

    tokio::select! {
        _ = handle.join() => {}
        _ = tokio::signal::ctrl_c() => {
            handle.abort();
            return Ok(());
        }
    }

    match error_rx.try_recv() {
        Ok(e) => Err(e).context("stream failed"),
        Err(_) => Ok(()),
    }
}

fn print_event(event: &str, data: Value) {
    match (event, data) {
        (_, Value::String(text)) => println!("{}", text),
        (name, data) if name == matrx_client::sse::DEFAULT_EVENT_NAME => println!("{}", data),
        (event, data) => println!("{}: {}", event, data),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
