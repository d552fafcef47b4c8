use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Memory-augmented chat agent: web UI, HTTP API, terminal chat and provisioning
#[derive(Parser, Debug)]
#[command(name = "membot", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true, env = "MEMBOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "MEMBOT_LOG", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the chat page and the HTTP API
    Web {
        /// Address to listen on (defaults to MEMBOT_HTTP_ADDR)
        #[arg(long)]
        addr: Option<String>,
    },

    /// Serve the HTTP API only
    Serve {
        /// Address to listen on (defaults to MEMBOT_HTTP_ADDR)
        #[arg(long)]
        addr: Option<String>,
    },

    /// Chat in the terminal
    Chat {
        /// User to chat as (defaults to DEFAULT_USER_ID)
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Create a managed runtime instance and write its identifiers to a .env file
    Provision {
        /// Display name of the new instance
        #[arg(long, default_value = "Memory Bot Agent Engine")]
        display_name: String,

        /// Where to write the environment file
        #[arg(long, default_value = ".env")]
        env_file: PathBuf,
    },

    /// List the managed runtime instances of the configured project
    Engines,

    /// Search or list a user's memories
    Memories {
        #[arg(short, long)]
        user: Option<String>,

        /// Search query; lists the most recent memories when omitted
        #[arg(short, long)]
        query: Option<String>,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// List a user's stored sessions
    Sessions {
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Commit every stored session of a user to memory
    SaveSessions {
        #[arg(short, long)]
        user: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_with_globals() {
        let cli = Cli::try_parse_from(["membot", "--log-level", "debug", "chat", "--user", "alice"]).unwrap();
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Commands::Chat { user: Some(ref u) } if u == "alice"));
    }

    #[test]
    fn test_parse_save_sessions_and_provision_defaults() {
        let cli = Cli::try_parse_from(["membot", "save-sessions"]).unwrap();
        assert!(matches!(cli.command, Commands::SaveSessions { user: None }));

        let cli = Cli::try_parse_from(["membot", "provision"]).unwrap();
        match cli.command {
            Commands::Provision { env_file, .. } => assert_eq!(env_file, PathBuf::from(".env")),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
