use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use membot_memory::MemorySnippet;
use membot_runtime::{CommitReport, Session};
use std::time::Duration;

/// Spinner shown while waiting on the model or a remote service
pub fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// Print the agent's reply
pub fn print_reply(reply: &str, memories_used: usize) {
    if memories_used > 0 {
        println!(
            "{}",
            format!("(using {} relevant memor{})", memories_used, if memories_used == 1 { "y" } else { "ies" })
                .dimmed()
        );
    }
    println!("{}: {}", "Assistant".blue().bold(), reply);
}

pub fn print_memories(memories: &[MemorySnippet]) {
    if memories.is_empty() {
        println!("{}", "No memories found.".yellow());
        return;
    }
    println!("{}", format!("Found {} memories:", memories.len()).green().bold());
    for (i, memory) in memories.iter().enumerate() {
        let score = memory
            .score
            .map(|s| format!(" [{:.2}]", s))
            .unwrap_or_default();
        println!("  {}.{} {}", i + 1, score.dimmed(), memory.content);
    }
}

/// Print sessions with their last two turns
pub fn print_sessions(sessions: &[Session]) {
    if sessions.is_empty() {
        println!("{}", "No sessions found.".yellow());
        return;
    }
    println!("{}", format!("Found {} sessions:", sessions.len()).green().bold());
    for session in sessions {
        println!(
            "  {} {} ({} turns, created {})",
            "•".cyan(),
            session.id().bold(),
            session.turns.len(),
            session.created_at.format("%Y-%m-%d %H:%M:%S")
        );
        for turn in session.recent_turns(2) {
            let text = turn.text();
            let preview: String = text.chars().take(80).collect();
            let ellipsis = if text.chars().count() > 80 { "..." } else { "" };
            println!("      {}: {}{}", turn.role.to_string().dimmed(), preview, ellipsis);
        }
    }
}

pub fn print_commit_report(report: &CommitReport) {
    match report {
        CommitReport::Ingested(receipt) => println!(
            "{}",
            format!("Session saved to memory ({} turns).", receipt.turns).green()
        ),
        CommitReport::Skipped(reason) => {
            println!("{}", format!("Nothing to save: {}.", reason).yellow())
        }
        CommitReport::Failed(error) => {
            eprintln!("{}", format!("Failed to save session: {}", error).red())
        }
    }
}

/// Show the chat commands
pub fn print_chat_help() {
    println!("{}", "Commands:".cyan());
    println!("  {}          save this session to memory", "save".green().bold());
    println!("  {}           start a new session", "new".green().bold());
    println!("  {}  search your memories", "search <query>".green().bold());
    println!("  {}          show this help", "help".green().bold());
    println!("  {}   end the chat", "exit | quit".green().bold());
    println!();
}
