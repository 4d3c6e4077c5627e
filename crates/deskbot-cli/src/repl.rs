//! Interactive REPL for conversations.

use std::path::PathBuf;
use std::sync::Arc;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use deskbot_core::Config;

use crate::AppContext;

/// Run the interactive loop: stdin line -> response -> stdout.
pub async fn run(
    ctx: Arc<AppContext>,
    session_id: String,
    initial_prompt: Option<String>,
) -> anyhow::Result<()> {
    println!("deskbot {} - type 'exit' or 'quit' to leave", env!("CARGO_PKG_VERSION"));
    println!("[Session: {}]", short_id(&session_id));
    println!();

    if let Some(ref prompt) = initial_prompt {
        send(&ctx, &session_id, prompt).await;
    }

    // Initialize readline editor
    let mut editor = DefaultEditor::new()?;
    let history_path = get_history_path();
    if history_path.exists() {
        let _ = editor.load_history(&history_path);
    }

    // Main REPL loop
    loop {
        match editor.readline(">>> ") {
            Ok(line) => {
                let line = line.trim();

                if line.is_empty() {
                    continue;
                }
                if matches!(line, "exit" | "quit") {
                    break;
                }

                let _ = editor.add_history_entry(line);
                send(&ctx, &session_id, line).await;
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {err:?}");
                break;
            }
        }
    }

    // Save history
    if let Some(parent) = history_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = editor.save_history(&history_path);

    Ok(())
}

/// Send one turn and print the response or the full error chain.
async fn send(ctx: &AppContext, session_id: &str, text: &str) {
    match ctx.manager.handle_turn(session_id, text).await {
        Ok(reply) => println!("{}", reply.content),
        Err(e) => {
            eprint!("Error: {e}");
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                eprint!(": {cause}");
                source = cause.source();
            }
            eprintln!();
        }
    }
}

fn short_id(id: &str) -> &str {
    &id[..id.len().min(8)]
}

fn get_history_path() -> PathBuf {
    Config::data_dir().join("history.txt")
}
