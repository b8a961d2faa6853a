//! Console front end — reads lines from stdin, runs chat turns, prints replies.
//!
//! Owns the short-term history window: the orchestrator only reads it, the
//! session appends each exchange and trims to `short_history_max`.
//!
//! Slash commands:
//!
//! ```text
//! /graph [query]    search the memory graph and print the raw result
//! /save             chunk the last exchange and store it in the background
//! /export [path]    write the short history as markdown (conversation.md)
//! /history          print the short history
//! /help             list commands
//! /quit             leave
//! ```
//!
//! Runs until `/quit`, stdin EOF, or the `shutdown` token is cancelled.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::history::{last_exchange, to_markdown, trim_short_history};
use crate::agent::TurnOrchestrator;
use crate::error::AppError;
use crate::message::ChatMessage;

/// Result limit for `/graph`.
pub const GRAPH_SEARCH_LIMIT: usize = 200;

const DEFAULT_EXPORT_PATH: &str = "conversation.md";

const HELP: &str = "\
Commands:
  /graph [query]   search the memory graph
  /save            store the last exchange as chunks
  /export [path]   write the conversation as markdown
  /history         show the short-term history
  /help            show this help
  /quit            exit";

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Chat(String),
    Graph(Option<String>),
    Save,
    Export(PathBuf),
    History,
    Help,
    Quit,
    Unknown(String),
}

/// Parse one input line; `None` for blank input.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Chat(line.to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
        None => (rest, None),
    };

    Some(match name {
        "graph" => Command::Graph(arg.map(str::to_string)),
        "save" => Command::Save,
        "export" => Command::Export(PathBuf::from(arg.unwrap_or(DEFAULT_EXPORT_PATH))),
        "history" => Command::History,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    })
}

/// What the loop should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Print(String),
    Exit,
}

/// One interactive conversation.
pub struct ConsoleSession {
    orchestrator: Arc<TurnOrchestrator>,
    user_id: String,
    thread_id: String,
    short_history_max: usize,
    history: Vec<ChatMessage>,
}

impl ConsoleSession {
    pub fn new(
        orchestrator: Arc<TurnOrchestrator>,
        user_id: impl Into<String>,
        thread_id: impl Into<String>,
        short_history_max: usize,
    ) -> Self {
        Self {
            orchestrator,
            user_id: user_id.into(),
            thread_id: thread_id.into(),
            short_history_max,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Run one chat turn and record the exchange in the short history.
    pub async fn submit(&mut self, text: &str) -> String {
        let reply = self
            .orchestrator
            .handle_turn(&self.thread_id, &self.user_id, text, &self.history)
            .await;
        self.history.push(ChatMessage::user(text));
        self.history.push(ChatMessage::assistant(reply.as_str()));
        self.history = trim_short_history(&self.history, self.short_history_max);
        reply
    }

    pub async fn execute(&mut self, command: Command) -> Step {
        match command {
            Command::Chat(text) => Step::Print(self.submit(&text).await),
            Command::Graph(query) => {
                if !self.orchestrator.memory().is_available() {
                    return Step::Print("memory service not configured".into());
                }
                let result = self
                    .orchestrator
                    .memory()
                    .search_graph(query.as_deref(), GRAPH_SEARCH_LIMIT, Some(&self.user_id))
                    .await;
                Step::Print(
                    serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string()),
                )
            }
            Command::Save => {
                let Some((user_text, assistant_text)) = last_exchange(&self.history) else {
                    return Step::Print("no user message in history".into());
                };
                let n = self.orchestrator.persist_exchange_chunks(
                    &self.thread_id,
                    &self.user_id,
                    &user_text,
                    &assistant_text,
                );
                if n == 0 {
                    Step::Print("memory service not configured, nothing saved".into())
                } else {
                    Step::Print(format!("{n} chunk message(s) scheduled for memory"))
                }
            }
            Command::Export(path) => {
                let markdown = to_markdown(&self.history);
                match tokio::fs::write(&path, markdown).await {
                    Ok(()) => Step::Print(format!("conversation written to {}", path.display())),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "export failed");
                        Step::Print(format!("export failed: {e}"))
                    }
                }
            }
            Command::History => {
                if self.history.is_empty() {
                    Step::Print("(history is empty)".into())
                } else {
                    Step::Print(
                        self.history
                            .iter()
                            .map(|m| format!("{}: {}", m.role, m.content))
                            .collect::<Vec<_>>()
                            .join("\n"),
                    )
                }
            }
            Command::Help => Step::Print(HELP.into()),
            Command::Quit => Step::Exit,
            Command::Unknown(name) => Step::Print(format!("unknown command: /{name} (try /help)")),
        }
    }
}

/// Drive the session from stdin until quit, EOF, or shutdown.
pub async fn run(mut session: ConsoleSession, shutdown: CancellationToken) -> Result<(), AppError> {
    info!(thread_id = %session.thread_id(), "console started");
    println!("─────────────────────────────────");
    println!(" threadmind console  (/help, Ctrl-C to quit)");
    println!(" thread: {}", session.thread_id());
    println!("─────────────────────────────────");

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        print!("> ");
        use std::io::Write as _;
        let _ = std::io::stdout().flush();

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                println!();
                info!("console shutting down");
                break;
            }

            line = lines.next_line() => {
                let input = match line {
                    Err(e) => {
                        warn!("console read error: {e}");
                        break;
                    }
                    Ok(None) => {
                        info!("console stdin closed");
                        break;
                    }
                    Ok(Some(input)) => input,
                };
                let Some(command) = parse_command(&input) else { continue };
                debug!(?command, "console command");
                match session.execute(command).await {
                    Step::Print(text) => println!("{text}"),
                    Step::Exit => break,
                }
            }
        }
    }

    Ok(())
}
