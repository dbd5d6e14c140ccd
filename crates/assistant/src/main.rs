use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use campus::chat::{
    ChatHistoryFeed, ChatSession, Navigator, Notifier, SessionContext, SessionEvent,
};
use campus::settings::SettingsStore;
use campus_protocol::{CHAT_HOME_PATH, ChatId, ProtocolError};
use campus_transport::{TransportError, create_api};
use chrono::Utc;
use clap::Parser;
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "campus-assistant", about = "Terminal client for the campus AI assistant")]
struct Args {
    /// Resume an existing conversation.
    #[arg(long)]
    chat_id: Option<String>,
    /// Settings file; defaults to the user config directory.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Snafu)]
enum CliError {
    #[snafu(display("invalid chat id on `{stage}`: {source}"))]
    InvalidChatId {
        stage: &'static str,
        source: ProtocolError,
    },
    #[snafu(display("failed to create chat client on `{stage}`: {source}"))]
    CreateClient {
        stage: &'static str,
        source: TransportError,
    },
    #[snafu(display("terminal io failed on `{stage}`: {source}"))]
    Terminal {
        stage: &'static str,
        source: std::io::Error,
    },
}

/// Tracks the location a browser shell would show.
struct TerminalNavigator {
    location: ArcSwap<String>,
}

impl TerminalNavigator {
    fn new(initial: String) -> Self {
        Self {
            location: ArcSwap::from_pointee(initial),
        }
    }

    fn location(&self) -> Arc<String> {
        self.location.load_full()
    }
}

impl Navigator for TerminalNavigator {
    fn replace(&self, path: &str) {
        tracing::debug!(path, "location replaced");
        self.location.store(Arc::new(path.to_string()));
    }

    fn refresh(&self) {
        tracing::debug!(path = %self.location(), "location refreshed");
    }
}

struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn error(&self, message: &str) {
        eprintln!("error: {message}");
    }

    fn success(&self, message: &str) {
        eprintln!("{message}");
    }
}

async fn write(out: &mut Stdout, text: &str) -> Result<(), CliError> {
    out.write_all(text.as_bytes())
        .await
        .context(TerminalSnafu { stage: "write-stdout" })?;
    out.flush()
        .await
        .context(TerminalSnafu { stage: "flush-stdout" })
}

async fn stream_reply(session: &mut ChatSession, out: &mut Stdout) -> Result<(), CliError> {
    let stop = session.stop_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
    });

    while let Some(event) = session.pump().await {
        match event {
            SessionEvent::TextDelta(delta) => write(out, &delta).await?,
            SessionEvent::ToolCall { tool_name, .. } => {
                write(out, &format!("\n[tool {tool_name}]\n")).await?
            }
            SessionEvent::ToolFailed { error_text, .. } => {
                write(out, &format!("\n[tool failed: {error_text}]\n")).await?
            }
            SessionEvent::Stopped => write(out, "\n[stopped]").await?,
            SessionEvent::Failed(_)
            | SessionEvent::MessageStarted
            | SessionEvent::ReasoningDelta(_)
            | SessionEvent::ToolResult { .. }
            | SessionEvent::Finished => {}
        }
    }
    ctrl_c.abort();
    write(out, "\n").await
}

async fn print_history(feed: &ChatHistoryFeed, out: &mut Stdout) -> Result<(), CliError> {
    if feed.is_empty() {
        return write(out, "Your conversations will appear here once you start chatting.\n").await;
    }

    let grouped = feed.grouped(Utc::now());
    for (heading, chats) in grouped.sections() {
        write(out, &format!("{heading}\n")).await?;
        for chat in chats {
            write(out, &format!("  {}  {}\n", chat.id, chat.title)).await?;
        }
    }
    if !feed.has_reached_end() {
        write(out, "(/more for older chats)\n").await?;
    }
    Ok(())
}

async fn run(args: Args) -> Result<(), CliError> {
    let store = match args.config {
        Some(path) => SettingsStore::new(path),
        None => SettingsStore::load(),
    };
    let settings = store.settings();
    let chat_id = args
        .chat_id
        .as_deref()
        .map(ChatId::parse)
        .transpose()
        .context(InvalidChatIdSnafu {
            stage: "parse-chat-id-argument",
        })?;

    let api = create_api(settings.transport_config()).context(CreateClientSnafu {
        stage: "create-chat-api",
    })?;
    let initial_location = chat_id
        .as_ref()
        .map(campus_protocol::chat_path)
        .unwrap_or_else(|| CHAT_HOME_PATH.to_string());
    let navigator = Arc::new(TerminalNavigator::new(initial_location));
    let context = SessionContext::from_settings(
        &settings,
        api,
        navigator.clone(),
        Arc::new(TerminalNotifier),
    );

    let mut session = ChatSession::mount(context.clone(), chat_id).await;
    let mut feed = ChatHistoryFeed::new(&context, settings.history_page_size);
    let mut out = tokio::io::stdout();

    for message in session.messages() {
        write(&mut out, &format!("{:?}: {}\n", message.role, message.text())).await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        write(&mut out, "> ").await?;
        let next = tokio::select! {
            next = lines.next_line() => next.context(TerminalSnafu { stage: "read-stdin" })?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = next else {
            break;
        };
        let line = line.trim();

        match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit", _) => break,
            ("/history", _) => {
                let loaded = if feed.page_count() == 0 {
                    feed.load_more().await.map(|_| ())
                } else {
                    feed.revalidate().await.map(|_| ())
                };
                match loaded {
                    Ok(()) => print_history(&feed, &mut out).await?,
                    Err(error) => eprintln!("error: {}", error.user_message()),
                }
            }
            ("/more", _) => match feed.load_more().await {
                Ok(true) => print_history(&feed, &mut out).await?,
                Ok(false) => write(&mut out, "No more chats.\n").await?,
                Err(error) => eprintln!("error: {}", error.user_message()),
            },
            ("/delete", raw_id) => {
                let Ok(chat_id) = ChatId::parse(raw_id) else {
                    eprintln!("usage: /delete <chat-id>");
                    continue;
                };
                let location = navigator.location();
                // Replacing the session drops its pending autosave for the deleted chat.
                if feed.delete_chat(&chat_id, &location).await.is_ok()
                    && session.chat_id() == Some(&chat_id)
                {
                    session = ChatSession::mount(context.clone(), None).await;
                }
            }
            ("", _) => {}
            _ => {
                if session.send(line).await.is_ok() {
                    stream_reply(&mut session, &mut out).await?;
                }
            }
        }
    }

    session.settle().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = run(Args::parse()).await {
        tracing::error!(error = %error, "campus assistant exited with an error");
        eprintln!("{error}");
        std::process::exit(1);
    }
}
