use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use joey_adaptor_chat::{CancelToken, ChatClient, Notice, ViewEvent};
use joey_core::{init_logging, ClientConfig, ConversationId, JoeyError, Role};
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Notify;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "run-chat", about = "Chat with a Joey AI gateway from the terminal")]
struct Cli {
    /// Gateway base URL
    #[arg(long, env = "JOEY_BACKEND_URL")]
    backend: Option<String>,

    /// Model name sent with every request
    #[arg(long, env = "JOEY_MODEL")]
    model: Option<String>,

    /// Continue an existing conversation
    #[arg(long, env = "JOEY_CONVERSATION")]
    conversation: Option<String>,

    #[arg(long, env = "JOEY_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

/// Token of the send currently running, if any
type InFlight = Arc<Mutex<Option<CancelToken>>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv();
    let cli = Cli::parse();
    std::env::set_var("JOEY_LOG_LEVEL", &cli.log_level);
    init_logging();

    let mut config = ClientConfig::from_env();
    if let Some(backend) = cli.backend {
        config = config.with_backend(backend);
    }
    if let Some(model) = cli.model {
        config.model = model;
    }
    let backend = config.backend_url.clone();

    let client = match cli.conversation {
        Some(id) => ChatClient::open(config, ConversationId::new(id)).await,
        None => ChatClient::connect(config).await,
    }
    .with_context(|| format!("could not start chat against {}", backend))?;

    let health = client.health();
    eprintln!("[{}] {} ({})", health.state, health.base, backend);
    for message in client.view().snapshot() {
        println!("{}> {}", message.role, message.display());
    }

    let printer = tokio::spawn(print_events(client.subscribe_view()));
    let in_flight = InFlight::default();
    let quit = Arc::new(Notify::new());
    let interrupts = tokio::spawn(watch_interrupts(in_flight.clone(), quit.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = quit.notified() => None,
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/health" => {
                let health = client.refresh_health().await;
                eprintln!("[{}] {}", health.state, health.base);
            }
            "/title" => {
                let title = client.session().title();
                eprintln!("[title] {}", title.as_deref().unwrap_or("(none)"));
            }
            "/conversations" => match client.conversations().await {
                Ok(list) => {
                    for c in list {
                        eprintln!("{}\t{}", c.id, c.title.as_deref().unwrap_or(""));
                    }
                }
                Err(e) => eprintln!("[error] {}", e),
            },
            text => send(&client, text, &in_flight).await,
        }
    }

    info!("Exiting");
    printer.abort();
    interrupts.abort();
    Ok(())
}

/// Ctrl-C cancels the running send, or quits when nothing is running
async fn watch_interrupts(in_flight: InFlight, quit: Arc<Notify>) {
    while tokio::signal::ctrl_c().await.is_ok() {
        if !interrupt(&in_flight) {
            quit.notify_one();
            return;
        }
    }
}

/// Cancel the running send; false when the driver is idle
fn interrupt(in_flight: &InFlight) -> bool {
    let running = in_flight
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    match running {
        Some(cancel) => {
            cancel.cancel();
            true
        }
        None => false,
    }
}

async fn send(client: &ChatClient, text: &str, in_flight: &InFlight) {
    let cancel = CancelToken::new();
    *in_flight.lock().unwrap_or_else(PoisonError::into_inner) = Some(cancel.clone());
    let result = client.send(text, &cancel).await;
    in_flight.lock().unwrap_or_else(PoisonError::into_inner).take();

    match result {
        Ok(report) => debug!(
            attempts = report.attempts,
            chunks = report.chunks,
            latency_ms = report.latency.as_millis() as u64,
            "Send complete"
        ),
        Err(JoeyError::SendFailed(failure)) => {
            eprintln!("[payload]\n{}", failure.payload);
        }
        // shown through view notices
        Err(JoeyError::Offline | JoeyError::Busy | JoeyError::Cancelled) => {}
        Err(e) => eprintln!("[error] {}", e),
    }
}

async fn print_events(mut rx: tokio::sync::broadcast::Receiver<ViewEvent>) {
    let mut stdout = std::io::stdout();
    // whether the current reply has printed any streamed text
    let mut streamed = false;
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "View events dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event {
            ViewEvent::Appended { role: Role::Assistant, pending: true, .. } => {
                streamed = false;
                print!("assistant> ");
            }
            ViewEvent::Updated { piece, .. } => {
                streamed = true;
                print!("{}", piece);
            }
            ViewEvent::Reset { .. } => {
                streamed = false;
                print!("\n[retrying without streaming]\nassistant> ");
            }
            ViewEvent::Finalized { text, .. } => {
                if !streamed {
                    print!("{}", text);
                }
                println!();
            }
            ViewEvent::Failed { message, .. } => println!("\n[failed] {}", message),
            ViewEvent::Notice(Notice::Offline { base }) => {
                eprintln!("[offline] backend {} is not reachable, message not sent", base)
            }
            ViewEvent::Notice(Notice::Busy) => eprintln!("[busy] wait for the current reply"),
            ViewEvent::Notice(Notice::Cancelled) => eprintln!("[cancelled]"),
            ViewEvent::TitleChanged(title) => eprintln!("[title] {}", title),
            ViewEvent::Appended { .. } => {}
        }
        let _ = stdout.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_cancels_running_send_only() {
        let in_flight = InFlight::default();
        assert!(!interrupt(&in_flight));

        let cancel = CancelToken::new();
        *in_flight.lock().unwrap() = Some(cancel.clone());
        assert!(interrupt(&in_flight));
        assert!(cancel.is_cancelled());

        in_flight.lock().unwrap().take();
        assert!(!interrupt(&in_flight));
    }

    #[test]
    fn test_conversation_from_env() {
        std::env::set_var("JOEY_CONVERSATION", "42");
        let cli = Cli::try_parse_from(["run-chat"]).unwrap();
        std::env::remove_var("JOEY_CONVERSATION");
        assert_eq!(cli.conversation.as_deref(), Some("42"));

        let cli = Cli::try_parse_from(["run-chat", "--conversation", "7"]).unwrap();
        assert_eq!(cli.conversation.as_deref(), Some("7"));
    }
}
