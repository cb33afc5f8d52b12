use anyhow::Result;
use clap::Parser;
use dialogus::cli::{Cli, Commands};
use dialogus::core::BackendClient;
use dialogus::session::{MessageKind, SessionEvent, SessionHandle, UserQuestion, WebSocketTransport};
use dialogus::{utils, Settings};
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::new()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.logging.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Chat { endpoint, user } => handle_chat(settings, endpoint, user).await,
        Commands::Profiles { backend } => handle_profiles(settings, backend).await,
    }
}

async fn handle_chat(
    mut settings: Settings,
    endpoint: Option<String>,
    user: Option<String>,
) -> Result<()> {
    if let Some(endpoint) = endpoint {
        settings.connection.endpoint = endpoint;
    }
    if let Some(user) = user {
        settings.session.user_id = user;
    }

    utils::print_banner("Dialogus Chat");
    utils::print_info(&format!(
        "Connecting to {}...",
        settings.connection.endpoint
    ));

    let (session, events) = SessionHandle::spawn(settings, Arc::new(WebSocketTransport));
    session.connect().await?;
    utils::print_info("Connected. Type a message, /retry to retry failed dialogs, /new for a new topic, Ctrl+C to exit.\n");

    let printer = tokio::spawn(print_events(session.clone(), events));

    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin);

    loop {
        utils::print_prompt("You: ");
        let mut input = String::new();
        if reader.read_line(&mut input).await? == 0 {
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/retry" => match session.retry_errored().await {
                Ok(retried) => utils::print_info(&format!("Retried {} dialog(s)", retried.len())),
                Err(e) => utils::print_error(&format!("Retry failed: {e}")),
            },
            "/new" => match session.new_conversation().await {
                Ok(id) => utils::print_info(&format!("Started new conversation {id}")),
                Err(e) => utils::print_error(&format!("Failed: {e}")),
            },
            text => {
                if let Err(e) = session.send(UserQuestion::text(text)).await {
                    utils::print_error(&format!("Send failed: {e}"));
                }
            }
        }
    }

    session.shutdown().await.ok();
    printer.abort();
    Ok(())
}

/// Render session events as they arrive: intermediate progress dimmed, final
/// answers green, per-dialog errors red with a retry hint.
async fn print_events(
    session: SessionHandle,
    mut events: tokio::sync::mpsc::Receiver<SessionEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::DialogUpdated { dialog_id, kind } => {
                let Ok(Some(dialog)) = session.dialog(dialog_id).await else {
                    continue;
                };
                match kind {
                    MessageKind::Intermediate => {
                        if let Some(text) = dialog
                            .intermediate_responses
                            .last()
                            .and_then(|r| r.answer.as_ref())
                            .and_then(|a| a.answer_string.as_deref())
                        {
                            utils::print_step(text);
                        }
                    }
                    MessageKind::Final => {
                        if let Some(text) = dialog
                            .final_response
                            .as_ref()
                            .and_then(|r| r.answer.as_ref())
                            .and_then(|a| a.answer_string.as_deref())
                        {
                            utils::print_agent(&format!("Assistant: {text}\n"));
                        }
                    }
                    MessageKind::Error => {
                        if let Some(error) = dialog.dialog_error() {
                            let hint = if error.is_retryable(false) {
                                " (/retry to try again)"
                            } else {
                                ""
                            };
                            utils::print_error(&format!("Error: {}{hint}", error.error_str));
                        }
                    }
                }
            }
            SessionEvent::ConnectionLost { attempts } => {
                utils::print_error(&format!(
                    "Connection lost after {attempts} attempt(s). Restart to reconnect."
                ));
            }
            SessionEvent::DialogCreated { .. } => {}
        }
    }
}

async fn handle_profiles(settings: Settings, backend: Option<String>) -> Result<()> {
    let base_url = backend.unwrap_or(settings.backend.base_url);
    let client = BackendClient::new(base_url);

    let profiles = client.get_user_profiles().await?;
    if profiles.is_empty() {
        utils::print_info("No user profiles configured.");
        return Ok(());
    }
    for profile in profiles {
        println!("{} ({}): {}", profile.user_name, profile.id, profile.description);
    }
    Ok(())
}
