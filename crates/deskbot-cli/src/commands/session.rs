//! Session management commands.

use chrono::{DateTime, Local, Utc};

use deskbot_core::{Role, Session, SessionStatus};

use crate::{AppContext, SessionAction};

/// Format a datetime for display.
fn format_time(dt: &DateTime<Utc>) -> String {
    let local: DateTime<Local> = dt.with_timezone(&Local);
    local.format("%Y-%m-%d %H:%M").to_string()
}

/// Format a session status for display.
fn format_status(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Active => "active",
        SessionStatus::Closed => "closed",
        SessionStatus::Errored => "errored",
    }
}

/// Format a session line for the listing.
fn format_session_line(s: &Session) -> String {
    format!(
        "{} [{}] {} via {}",
        s.id,
        format_status(s.status),
        format_time(&s.last_active_at),
        s.provider
    )
}

pub async fn handle(action: SessionAction, ctx: &AppContext) -> anyhow::Result<()> {
    match action {
        SessionAction::List { limit } => {
            list_sessions(ctx, limit).await?;
        }
        SessionAction::Show { id, turns } => {
            show_session(ctx, &id, turns).await?;
        }
        SessionAction::Close { id } => {
            ctx.manager.close_session(&id).await?;
            println!("Session {id} closed.");
        }
    }

    Ok(())
}

async fn list_sessions(ctx: &AppContext, limit: usize) -> anyhow::Result<()> {
    let sessions = ctx.index.list_recent(limit).await?;

    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!("Sessions ({}):", sessions.len());
    println!();
    for session in &sessions {
        println!("  {}", format_session_line(session));
    }

    Ok(())
}

async fn show_session(ctx: &AppContext, id: &str, turns: usize) -> anyhow::Result<()> {
    let Some(session) = ctx.index.get(id).await? else {
        println!("Session not found: {id}");
        return Ok(());
    };

    println!("Session: {}", session.id);
    println!("  Provider: {}", session.provider);
    println!("  Status: {}", format_status(session.status));
    println!("  Created: {}", format_time(&session.created_at));
    println!("  Last active: {}", format_time(&session.last_active_at));

    let transcript = ctx.transcript.recent(id, turns).await?;
    if !transcript.is_empty() {
        println!();
        for turn in &transcript {
            let who = match turn.role {
                Role::User => "user",
                Role::Agent => "agent",
                Role::System => "system",
            };
            println!("  [{:>4}] {:>5}: {}", turn.seq, who, turn.content);
        }
    }

    Ok(())
}
