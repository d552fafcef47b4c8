use anyhow::{Context, Result};
use colored::*;
use membot_core::{AppConfig, CommitPolicy};
use membot_runtime::{CommitReport, ConversationRuntime};
use std::io::{self, Write};
use tracing::{debug, error, info};

use crate::output::{print_chat_help, print_commit_report, print_memories, print_reply, spinner};

/// Number of memories shown by the `search` chat command
const SEARCH_LIMIT: usize = 5;

/// A line typed at the chat prompt
#[derive(Debug, PartialEq, Eq)]
enum ChatCommand<'a> {
    Exit,
    Save,
    New,
    Help,
    Search(&'a str),
    Message(&'a str),
}

fn parse_command(input: &str) -> Option<ChatCommand<'_>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    let command = match input.to_ascii_lowercase().as_str() {
        "exit" | "quit" => ChatCommand::Exit,
        "save" => ChatCommand::Save,
        "new" => ChatCommand::New,
        "help" => ChatCommand::Help,
        _ => match input.split_once(char::is_whitespace) {
            Some((head, query)) if head.eq_ignore_ascii_case("search") => {
                ChatCommand::Search(query.trim())
            }
            _ => ChatCommand::Message(input),
        },
    };
    Some(command)
}

fn read_line(prompt: &str) -> Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    let read = io::stdin()
        .read_line(&mut input)
        .context("Failed to read input")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(input))
}

/// Ends the user's current session honouring their answer to the save prompt.
///
/// `save` is `None` when no prompt was shown. Under `SessionEnd` the end
/// itself is the commit, so a "no" ends the session without committing and a
/// "yes" does not commit a second time.
async fn finish_session(
    runtime: &ConversationRuntime,
    policy: CommitPolicy,
    user_id: &str,
    save: Option<bool>,
) -> Result<Option<CommitReport>> {
    let Some(key) = runtime.current_session(user_id).await else {
        return Ok(None);
    };

    let mut report = None;
    match (policy, save) {
        (CommitPolicy::SessionEnd, Some(false)) => {
            runtime.end_session_without_commit(&key).await?;
        }
        (CommitPolicy::Manual, Some(true)) => {
            report = Some(runtime.save_session(&key).await?);
            runtime.end_session(&key).await?;
        }
        _ => runtime.end_session(&key).await?,
    }
    Ok(report)
}

/// Runs an interactive chat session against the runtime
pub async fn run_interactive_chat(
    runtime: &ConversationRuntime,
    config: &AppConfig,
    user_id: &str,
) -> Result<()> {
    let key = runtime.create_session(user_id, None).await?;
    println!("{}", "Memory Bot".bold());
    println!("User: {}  Session: {}", user_id.green(), key.session_id.green());
    println!("Type 'help' for commands, 'exit' or 'quit' to end the session.");
    println!();

    loop {
        let prompt = format!("{}: ", "You".green().bold());
        let Some(line) = read_line(&prompt)? else {
            break;
        };
        let Some(command) = parse_command(&line) else {
            continue;
        };

        match command {
            ChatCommand::Exit => break,
            ChatCommand::Help => print_chat_help(),
            ChatCommand::Save => match runtime.save_current(user_id).await {
                Ok(report) => print_commit_report(&report),
                Err(e) => eprintln!("{}", format!("Error: {}", e).red()),
            },
            ChatCommand::New => match runtime.new_session(user_id).await {
                Ok(key) => println!("{}", format!("Started new session {}", key.session_id).cyan()),
                Err(e) => eprintln!("{}", format!("Error: {}", e).red()),
            },
            ChatCommand::Search(query) => {
                match runtime.search_memories(user_id, query, SEARCH_LIMIT).await {
                    Ok(memories) => print_memories(&memories),
                    Err(e) => eprintln!("{}", format!("Error: {}", e).red()),
                }
            }
            ChatCommand::Message(message) => {
                let waiting = spinner("Thinking...");
                debug!("Sending message: {}", message);
                let result = runtime.chat(user_id, message).await;
                waiting.finish_and_clear();

                match result {
                    Ok(reply) => print_reply(&reply.reply, reply.memories_used),
                    Err(e) => {
                        error!("Failed to get a reply: {}", e);
                        eprintln!("{}", format!("Error: {}", e).red());
                    }
                }
            }
        }
        println!();
    }

    let save = if config.commit_policy == CommitPolicy::EveryExchange {
        None
    } else {
        let answer = read_line("Save this session to memory? (y/n): ")?.unwrap_or_default();
        Some(answer.trim().eq_ignore_ascii_case("y"))
    };
    if let Some(report) = finish_session(runtime, config.commit_policy, user_id, save).await? {
        print_commit_report(&report);
    }

    let waiting = spinner("Finishing memory commits...");
    runtime.drain_commits().await;
    waiting.finish_and_clear();
    info!("Chat session finished");
    println!("Goodbye!");
    Ok(())
}
