//! Minimal end-to-end session: connect, ask one question, print the
//! streamed responses until the final answer lands.
//!
//! Run against a local backend with:
//!     cargo run --example simple_chat

use dialogus::session::{SessionHandle, UserQuestion, WebSocketTransport};
use dialogus::utils::{print_agent, print_error, print_info, print_step};
use dialogus::{MessageKind, SessionEvent, Settings};
use std::sync::Arc;
use tokio::time::{timeout, Duration};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let settings = Settings::new()?;
    print_info(&format!(
        "connecting to {}",
        settings.connection.endpoint
    ));

    let (session, mut events) = SessionHandle::spawn(settings, Arc::new(WebSocketTransport));
    session.connect().await?;

    let dialog_id = session
        .send(UserQuestion::text("What can you help me with?"))
        .await?;
    print_info(&format!("dialog {dialog_id} sent"));

    loop {
        let event = timeout(Duration::from_secs(30), events.recv())
            .await
            .map_err(|_| anyhow::anyhow!("no response within 30s"))?
            .ok_or_else(|| anyhow::anyhow!("session stopped"))?;

        match event {
            SessionEvent::DialogUpdated { dialog_id, kind } => {
                let Some(dialog) = session.dialog(dialog_id).await? else {
                    continue;
                };
                match kind {
                    MessageKind::Intermediate => {
                        if let Some(response) = dialog.intermediate_responses.last() {
                            if let Some(answer) = &response.answer {
                                if let Some(text) = &answer.answer_string {
                                    print_step(text);
                                }
                            }
                        }
                    }
                    MessageKind::Final => {
                        if let Some(answer) =
                            dialog.final_response.as_ref().and_then(|r| r.answer.as_ref())
                        {
                            if let Some(text) = &answer.answer_string {
                                print_agent(text);
                            }
                        }
                        break;
                    }
                    MessageKind::Error => {
                        if let Some(error) = dialog.dialog_error() {
                            print_error(&format!("dialog failed: {}", error.error_str));
                        }
                        break;
                    }
                }
            }
            SessionEvent::ConnectionLost { attempts } => {
                print_error(&format!("connection lost after {attempts} attempts"));
                break;
            }
            SessionEvent::DialogCreated { .. } => {}
        }
    }

    session.shutdown().await?;
    Ok(())
}
