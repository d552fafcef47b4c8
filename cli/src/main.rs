use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use membot_core::config::write_env_file;
use membot_core::AppConfig;
use membot_runtime::{build_runtime, http_server};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

mod app;
mod cli;
mod logging;
mod output;
mod provision;

use crate::cli::{Cli, Commands};
use crate::output::{print_memories, print_sessions, spinner};
use crate::provision::EngineAdmin;

fn resolve_addr(arg: Option<String>, config: &AppConfig) -> Result<SocketAddr> {
    let raw = arg.unwrap_or_else(|| config.http_addr.clone());
    raw.parse()
        .with_context(|| format!("Invalid listen address: {}", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level);
    debug!("Starting membot with arguments: {:?}", cli);

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let user_or_default = |user: Option<String>| user.unwrap_or_else(|| config.default_user_id.clone());

    match cli.command {
        Commands::Web { addr } => {
            let addr = resolve_addr(addr, &config)?;
            let runtime = Arc::new(build_runtime(&config)?);
            println!("{} http://{}", "Memory Bot web UI at".green(), addr);
            http_server::run_server(runtime, config.default_user_id.clone(), addr, true).await?;
        }
        Commands::Serve { addr } => {
            let addr = resolve_addr(addr, &config)?;
            let runtime = Arc::new(build_runtime(&config)?);
            http_server::run_server(runtime, config.default_user_id.clone(), addr, false).await?;
        }
        Commands::Chat { user } => {
            let runtime = build_runtime(&config)?;
            app::run_interactive_chat(&runtime, &config, &user_or_default(user)).await?;
        }
        Commands::Provision {
            display_name,
            env_file,
        } => {
            let admin = EngineAdmin::new(config.provisioning_target()?);
            let waiting = spinner("Creating Agent Engine instance (this can take a few minutes)...");
            let created = admin.create_engine(&display_name).await;
            waiting.finish_and_clear();
            let (engine_name, engine_id) = created?;

            write_env_file(&env_file, &config, &engine_name, &engine_id)
                .with_context(|| format!("Failed to write {}", env_file.display()))?;
            info!(engine = %engine_name, "Provisioned runtime instance");
            println!("{} {}", "Agent Engine created:".green().bold(), engine_name);
            println!("Engine ID: {}", engine_id.bold());
            println!("Configuration written to {}", env_file.display());
        }
        Commands::Engines => {
            let admin = EngineAdmin::new(config.provisioning_target()?);
            let engines = admin.list_engines().await?;
            if engines.is_empty() {
                println!("{}", "No Agent Engine instances found.".yellow());
            }
            for engine in engines {
                let created = engine
                    .create_time
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!(
                    "{} {}  {}  {}",
                    "•".cyan(),
                    engine.id().unwrap_or_default().bold(),
                    engine.display_name,
                    created.dimmed()
                );
            }
        }
        Commands::Memories { user, query, limit } => {
            let runtime = build_runtime(&config)?;
            let user = user_or_default(user);
            let memories = runtime
                .search_memories(&user, query.as_deref().unwrap_or_default(), limit)
                .await?;
            print_memories(&memories);
        }
        Commands::Sessions { user } => {
            let runtime = build_runtime(&config)?;
            let user = user_or_default(user);
            let mut sessions = Vec::new();
            for listed in runtime.list_sessions(&user).await? {
                let detailed = runtime.session_info(&listed.key).await;
                sessions.push(detailed.unwrap_or(listed));
            }
            print_sessions(&sessions);
        }
        Commands::SaveSessions { user } => {
            let runtime = build_runtime(&config)?;
            let user = user_or_default(user);
            let waiting = spinner("Saving sessions to memory...");
            let summary = runtime.save_stored_sessions(&user).await;
            waiting.finish_and_clear();
            let summary = summary?;
            println!(
                "{} saved, {} skipped, {} failed",
                summary.saved.to_string().green(),
                summary.skipped.to_string().yellow(),
                summary.failed.to_string().red()
            );
        }
    }

    Ok(())
}
