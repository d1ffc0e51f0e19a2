//! Interactive REPL — one customer chatting with one store.
//!
//! Uses `rustyline` for readline-style editing with persistent history.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use rustyline::config::Configurer;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use tracing::debug;

use mercabot_agent::orchestrator::{ChatRequest, ConversationOrchestrator};

use crate::helpers;

/// Exit commands (case-insensitive match).
const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

/// Who is chatting, where, and how.
pub struct Session {
    pub user: String,
    pub domain: String,
    pub model: Option<String>,
    pub stream: bool,
}

impl Session {
    pub fn request(&self, message: &str) -> ChatRequest {
        let request = ChatRequest::new(message, &self.domain, &self.user);
        match &self.model {
            Some(model) => request.with_force_model(model),
            None => request,
        }
    }
}

/// Send one message and print the answer.
pub async fn send(orchestrator: &Arc<ConversationOrchestrator>, session: &Session, message: &str) -> Result<()> {
    let request = session.request(message);
    if !session.stream {
        helpers::print_thinking();
        let reply = orchestrator.send_message(request).await;
        helpers::clear_thinking();
        helpers::print_reply(&reply?);
        return Ok(());
    }

    let mut frames = orchestrator.send_message_stream(request)?;
    println!();
    println!("{}", "🛒 Mercabot".cyan().bold());
    let mut stdout = std::io::stdout();
    while let Some(frame) = frames.recv().await {
        let frame = frame?;
        print!("{}", frame.text);
        let _ = stdout.flush();
    }
    println!();
    println!();
    Ok(())
}

/// Run the interactive REPL loop.
pub async fn run(orchestrator: Arc<ConversationOrchestrator>, session: Session) -> Result<()> {
    helpers::print_banner(&session.domain);

    let mut editor = create_editor()?;

    loop {
        let input = match editor.readline("You: ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted) | Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }
        if is_exit_command(trimmed) {
            println!("\n¡Hasta luego! 👋");
            break;
        }
        let _ = editor.add_history_entry(&input);

        let outcome = match trimmed {
            "/history" => show_history(&orchestrator, &session).await,
            "/close" => close_active(&orchestrator, &session).await,
            _ => {
                debug!(user = %session.user, input = trimmed, "processing input");
                send(&orchestrator, &session, trimmed).await
            }
        };
        if let Err(e) = outcome {
            eprintln!("\n❌ Error: {e}\n");
        }
    }

    save_history(&mut editor);
    Ok(())
}

async fn show_history(orchestrator: &ConversationOrchestrator, session: &Session) -> Result<()> {
    let messages = orchestrator.get_history(&session.user, &session.domain).await?;
    if messages.is_empty() {
        println!("{}", "(no active conversation)".dimmed());
    }
    for m in &messages {
        helpers::print_history_message(m);
    }
    Ok(())
}

/// Close the active conversation so the next message starts a new one.
async fn close_active(orchestrator: &ConversationOrchestrator, session: &Session) -> Result<()> {
    let Some(id) = orchestrator.active_conversation_id(&session.user, &session.domain).await? else {
        println!("{}", "(no active conversation)".dimmed());
        return Ok(());
    };
    orchestrator.close_conversation(&id).await?;
    println!("{} conversation closed", "✓".green());
    Ok(())
}

/// Create a rustyline editor with history.
fn create_editor() -> Result<Editor<(), DefaultHistory>> {
    let mut editor = DefaultEditor::new()?;
    editor.set_max_history_size(1000)?;

    let history_path = history_path();
    if history_path.exists() {
        let _ = editor.load_history(&history_path);
        debug!("loaded REPL history from {}", history_path.display());
    }
    Ok(editor)
}

/// Save history to disk.
fn save_history(editor: &mut Editor<(), DefaultHistory>) {
    let path = history_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = editor.save_history(&path) {
        debug!("failed to save history: {e}");
    }
}

fn history_path() -> std::path::PathBuf {
    mercabot_core::utils::get_data_path().join("history").join("cli_history")
}

fn is_exit_command(input: &str) -> bool {
    let lower = input.to_lowercase();
    EXIT_COMMANDS.contains(&lower.as_str())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_commands() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command("QUIT"));
        assert!(is_exit_command(":q"));
        assert!(!is_exit_command("hola"));
        assert!(!is_exit_command(""));
    }

    #[test]
    fn history_path_under_data_dir() {
        let path = history_path();
        assert!(path.to_string_lossy().contains(".mercabot"));
        assert!(path.ends_with("history/cli_history"));
    }

    #[test]
    fn session_request_carries_forced_model() {
        let session = Session {
            user: "u1".into(),
            domain: "shop.example".into(),
            model: Some("gemini".into()),
            stream: false,
        };
        let request = session.request("hola");
        assert_eq!(request.force_model.as_deref(), Some("gemini"));
        assert_eq!(request.domain, "shop.example");

        let plain = Session { model: None, ..session };
        assert!(plain.request("hola").force_model.is_none());
    }
}
