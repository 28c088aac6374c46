//! Chat fanned out across the enabled platforms.
//!
//! One prompt dispatches one independent turn per enabled platform. Each turn
//! streams through the engine and renders as it arrives; replies are persisted
//! so later prompts carry the conversation forward per platform.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use braid_abstraction::{ApiState, ClientType, ImageData, Platform};
use braid_orchestrator::{
    ChatEngine, ChatRoom, FinishReason, MemoryStore, Message, MessageStore, ToolManager,
    history_for_platform,
};
use braid_providers::client_with;
use colored::Colorize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::BraidConfig;

/// Execute the chat command.
///
/// With a prompt, sends it once and exits. Without one, opens an interactive
/// session that keeps the conversation history across prompts.
pub async fn execute(
    config: BraidConfig,
    prompt: Vec<String>,
    image: Option<PathBuf>,
) -> Result<()> {
    let platforms = config.enabled_platforms()?;
    if platforms.is_empty() {
        return Err(anyhow!(
            "No platforms enabled. Add a [platforms.<provider>] table to {} or pass --config.",
            BraidConfig::default_global_path().display()
        ));
    }

    let mut image = image.as_deref().map(load_image).transpose()?;
    let mut session = ChatSession::new(platforms);

    if !prompt.is_empty() {
        let delivered = session.send(&prompt.join(" "), image.take()).await?;
        if delivered == 0 {
            return Err(anyhow!("every platform failed; see the errors above"));
        }
        return Ok(());
    }

    print_banner(&session.platforms);

    loop {
        print!("\n{} ", ">".green().bold());
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" | "/q" => {
                println!("\nGoodbye!");
                break;
            }
            "/help" | "/h" => {
                print_help();
                continue;
            }
            "/history" => {
                session.print_history().await?;
                continue;
            }
            _ => {}
        }

        if let Err(e) = session.send(input, image.take()).await {
            eprintln!("\n{}: {}", "Error".red().bold(), e);
        }
    }

    Ok(())
}

/// One conversation shared by every enabled platform.
struct ChatSession {
    store: MemoryStore,
    room: ChatRoom,
    platforms: Vec<Platform>,
    tools: ToolManager,
    http: reqwest::Client,
}

impl ChatSession {
    fn new(platforms: Vec<Platform>) -> Self {
        let enabled = platforms.iter().map(|p| p.client_type).collect();
        Self {
            store: MemoryStore::new(),
            room: ChatRoom::new("", enabled),
            platforms,
            tools: ToolManager::new().with_web_tools(),
            http: reqwest::Client::new(),
        }
    }

    /// Sends one prompt to every enabled platform and persists the replies.
    ///
    /// Returns how many platforms produced a reply. Ctrl-C cancels the turns
    /// in flight; partial replies are kept.
    async fn send(&mut self, text: &str, image: Option<ImageData>) -> Result<usize> {
        let mut messages = if self.room.id == 0 {
            Vec::new()
        } else {
            self.store.fetch_messages(self.room.id).await?
        };
        messages.push(Message::user(self.room.id, text));
        self.room = self.store.save_chat(self.room.clone(), messages).await?;

        let saved = self.store.fetch_messages(self.room.id).await?;
        let user_id = saved.last().map(|m| m.id);

        let cancel = CancellationToken::new();
        let ctrl_c = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        // With a single platform the text streams straight to the terminal;
        // with several, each reply is buffered and printed as a block so the
        // deltas do not interleave.
        let streaming = self.platforms.len() == 1;

        let mut turns = Vec::new();
        for platform in self.platforms.clone() {
            let mut history = history_for_platform(&saved, platform.client_type);
            if let (Some(image), Some(last)) = (image.clone(), history.last_mut()) {
                last.images.push(image);
            }

            let (event_tx, events) = broadcast::channel(64);
            let engine = ChatEngine::new(
                client_with(platform.client_type, self.http.clone()),
                self.tools.clone(),
            )
            .with_event_channel(event_tx);

            let client_type = platform.client_type;
            let renderer = tokio::spawn(render_stream(events, client_type, streaming));
            let cancel = cancel.clone();
            let turn =
                tokio::spawn(async move { engine.run_turn(&platform, &history, cancel).await });
            turns.push((client_type, turn, renderer));
        }

        let mut replies = Vec::new();
        for (client_type, turn, renderer) in turns {
            let outcome = turn.await.context("chat turn panicked")?;
            renderer.await.context("renderer panicked")??;

            if let Some(error) = outcome.error {
                eprintln!("{} {}", format!("[{client_type}]").red().bold(), error.red());
            }
            if outcome.finish_reason == FinishReason::Cancelled {
                println!("{} cancelled", format!("[{client_type}]").yellow().bold());
            }
            if outcome.content.is_empty() {
                continue;
            }

            let mut reply = Message::assistant(self.room.id, client_type, outcome.content);
            if let Some(linked) = user_id {
                reply = reply.with_link(linked);
            }
            replies.push(reply);
        }
        ctrl_c.abort();

        let delivered = replies.len();
        if delivered > 0 {
            let mut messages = self.store.fetch_messages(self.room.id).await?;
            messages.extend(replies);
            self.room = self.store.save_chat(self.room.clone(), messages).await?;
        }
        Ok(delivered)
    }

    /// Print the conversation so far.
    async fn print_history(&self) -> Result<()> {
        if self.room.id == 0 {
            println!("\n{}", "No conversation history yet.".yellow());
            return Ok(());
        }

        let messages = self.store.fetch_messages(self.room.id).await?;
        println!();
        for message in messages {
            match message.platform {
                None => println!("{} {}", "You:".green().bold(), message.content),
                Some(platform) => {
                    println!("{}\n{}", format!("[{platform}]").cyan().bold(), message.content);
                }
            }
        }
        Ok(())
    }
}

/// Render one platform's event stream.
///
/// Runs until the engine drops its end of the channel at turn end.
async fn render_stream(
    mut events: broadcast::Receiver<ApiState>,
    client_type: ClientType,
    streaming: bool,
) -> Result<()> {
    let label = format!("[{client_type}]");
    let mut reply = String::new();
    let mut mid_line = false;

    loop {
        let state = match events.recv().await {
            Ok(state) => state,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event renderer lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match state {
            ApiState::Success { text } => {
                if streaming {
                    print!("{text}");
                    io::stdout().flush()?;
                    mid_line = true;
                } else {
                    reply.push_str(&text);
                }
            }
            ApiState::Thinking { text } => {
                if streaming {
                    print!("{}", text.dimmed());
                    io::stdout().flush()?;
                    mid_line = true;
                }
            }
            ApiState::ToolExecuting { name, .. } => {
                if mid_line {
                    println!();
                    mid_line = false;
                }
                println!("{} calling {}", label.cyan().bold(), name.white().bold());
            }
            // Stream errors are reported once, from the turn outcome.
            ApiState::Loading
            | ApiState::ToolCallRequested { .. }
            | ApiState::ToolResultReceived { .. }
            | ApiState::Error { .. }
            | ApiState::Done => {}
        }
    }

    if mid_line {
        println!();
    }
    if !streaming && !reply.is_empty() {
        println!("\n{}\n{}", label.cyan().bold(), reply);
    }
    Ok(())
}

/// Read an image file into an inline attachment.
fn load_image(path: &Path) -> Result<ImageData> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    let mime_type = mime_guess::from_path(path).first_or_octet_stream().essence_str().to_string();
    Ok(ImageData { mime_type, base64_data: STANDARD.encode(bytes) })
}

/// Print welcome banner.
fn print_banner(platforms: &[Platform]) {
    println!();
    println!("{}", "╔═══════════════════════════════════════════╗".cyan().bold());
    println!(
        "{}{}{}",
        "║  ".cyan().bold(),
        "Braid Interactive Chat".white().bold(),
        "                   ║".cyan().bold()
    );
    println!("{}", "╚═══════════════════════════════════════════╝".cyan().bold());
    println!();

    for platform in platforms {
        println!(
            "  {} {} {}",
            "•".green().bold(),
            platform.client_type.to_string().white().bold(),
            platform.model.yellow()
        );
    }

    println!();
    println!("{} {}", "Commands:".green().bold(), "/help /history /quit");
}

/// Print help text.
fn print_help() {
    println!();
    let commands = vec![
        ("/help, /h", "Show this help message"),
        ("/history", "Display conversation history"),
        ("/quit, /exit, /q", "Exit the chat"),
    ];

    for (cmd, desc) in commands {
        println!("  {} - {}", cmd.green().bold(), desc);
    }

    println!();
    println!(
        "{} Ctrl-C cancels the turn in flight; partial replies are kept.",
        "Tip:".yellow().bold()
    );
}
