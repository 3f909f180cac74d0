use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use lexai_core::chat::error_message;
use lexai_core::settings::api_key_from_env;
use lexai_core::{
    ChatError, ChatSession, GeminiClient, JsonSettingsRepository, RawFile, SessionEvent,
    SettingsRepository, SubmitReport,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "lexai")]
#[command(about = "Chat with a legal assistant about your documents", long_about = None)]
struct Cli {
    /// Settings file (defaults to <config dir>/lexai/settings.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Attach a file before the first prompt; may be repeated
    #[arg(short, long = "attach", value_name = "FILE")]
    attach: Vec<PathBuf>,

    /// Override the configured model identifier
    #[arg(long)]
    model: Option<String>,

    /// Override the reasoning budget in tokens
    #[arg(long)]
    thinking_budget: Option<i32>,

    /// Write the effective settings to the settings file and exit
    #[arg(long)]
    init_config: bool,
}

const HELP: &str = "\
Commands:
  /attach <file>...   attach files to the next message
  /remove <n>         drop attachment number n (see /files)
  /files              list attachments
  /reset              start a new conversation
  /quit               exit
Anything else is sent as a message; an empty line sends pending attachments.";

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they never interleave with streamed answers.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let repository = match &cli.config {
        Some(path) => JsonSettingsRepository::with_path(path),
        None => JsonSettingsRepository::new().context("Failed to locate config directory")?,
    };
    let mut settings = repository
        .load()
        .await
        .with_context(|| format!("Failed to load settings from {}", repository.storage_path()))?;

    if let Some(model) = cli.model {
        settings.model.model_identifier = model;
    }
    if let Some(budget) = cli.thinking_budget {
        settings.model.thinking_budget = Some(budget);
    }

    if cli.init_config {
        let path = repository.storage_path();
        repository
            .save(settings)
            .await
            .with_context(|| format!("Failed to write settings to {}", path))?;
        println!("Settings written to {}", path);
        return Ok(());
    }

    let api_key = api_key_from_env().context("Set GEMINI_API_KEY (or API_KEY) to your Gemini API key")?;
    let remote = GeminiClient::with_settings(api_key, &settings.model)?;

    info!(model = %settings.model.model_identifier, "Starting LexAI session");
    let session = ChatSession::builder()
        .settings(settings)
        .remote(Arc::new(remote))
        .with_default_extractors()
        .build()?;

    if !cli.attach.is_empty() {
        attach(&session, &cli.attach).await;
    }

    println!("LexAI ready. Type /help for commands.");
    repl(&session).await
}

async fn repl(session: &ChatSession) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit" | "/exit", _) => break,
            ("/help", _) => println!("{HELP}"),
            ("/files", _) => list_files(session),
            ("/reset", _) => {
                session.reset();
                println!("Started a new conversation.");
            }
            ("/attach", args) => {
                let paths: Vec<PathBuf> = args.split_whitespace().map(PathBuf::from).collect();
                if paths.is_empty() {
                    println!("Usage: /attach <file>...");
                } else {
                    attach(session, &paths).await;
                }
            }
            ("/remove", arg) => remove(session, arg.trim()),
            _ => send(session, line).await?,
        }
    }

    Ok(())
}

async fn attach(session: &ChatSession, paths: &[PathBuf]) {
    let mut files = Vec::new();
    for path in paths {
        match RawFile::from_path(path, "").await {
            Ok(file) => files.push(file),
            Err(e) => println!("  ✗ {}: {}", path.display(), e),
        }
    }
    if files.is_empty() {
        return;
    }

    let SubmitReport { accepted, rejections } = session.submit_files(files).await;
    for attachment in &accepted {
        println!("  + {} ({})", attachment.name, attachment.display_size());
    }
    for rejection in &rejections {
        println!("  ✗ {}", rejection.reason);
    }
}

fn list_files(session: &ChatSession) {
    let attachments = session.attachments();
    if attachments.is_empty() {
        println!("No attachments.");
        return;
    }
    for (index, attachment) in attachments.iter().enumerate() {
        let state = if attachment.is_delivered() { "sent" } else { "pending" };
        println!(
            "  {}. {} ({}, {})",
            index + 1,
            attachment.name,
            attachment.display_size(),
            state
        );
    }
}

fn remove(session: &ChatSession, arg: &str) {
    let attachments = session.attachments();
    let target = arg
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|index| attachments.get(index));

    match target {
        Some(attachment) if session.remove_attachment(&attachment.id) => {
            println!("Removed {}.", attachment.name)
        }
        _ => println!("No attachment {:?}. Use /files to list them.", arg),
    }
}

/// Send one message and print the answer as it streams in.
async fn send(session: &ChatSession, text: &str) -> Result<()> {
    let mut events = session.subscribe();
    let mut printed = String::new();

    let reply = session.send(text);
    tokio::pin!(reply);

    let result = loop {
        tokio::select! {
            result = &mut reply => break result,
            event = events.recv() => {
                if let Ok(event) = event {
                    render(&mut printed, event)?;
                }
            }
        }
    };
    while let Ok(event) = events.try_recv() {
        render(&mut printed, event)?;
    }

    match result {
        Ok(_) => println!(),
        Err(ChatError::InvalidSendRequest(reason)) => println!("Cannot send: {}", reason),
        Err(e) => {
            if !printed.is_empty() {
                println!();
            }
            println!("{}", error_message(&e));
        }
    }
    Ok(())
}

fn render(printed: &mut String, event: SessionEvent) -> Result<()> {
    let content = match event {
        SessionEvent::ResponseUpdated { content, .. } => content,
        SessionEvent::ResponseFinished { status, .. } => {
            debug!(?status, "Stream finished");
            return Ok(());
        }
    };

    let mut stdout = std::io::stdout();
    match content.strip_prefix(printed.as_str()) {
        Some(delta) => write!(stdout, "{}", delta)?,
        None => write!(stdout, "\n{}", content)?,
    }
    stdout.flush()?;
    *printed = content;
    Ok(())
}
