//! Summarizer CLI - sign in and summarize articles from the terminal.

mod commands;
mod navigator;
mod output;

use clap::{Parser, Subcommand};
use commands::App;
use std::path::PathBuf;
use summarizer_config_and_utils::init_logging;
use tracing::debug;

/// Summarizer CLI - summarize articles and ask questions about them.
#[derive(Parser)]
#[command(name = "summarizer")]
#[command(about = "Summarizer CLI for authentication and article analysis")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error); defaults to config.json
    #[arg(long, global = true, env = "SUMMARIZER_LOG_LEVEL")]
    log_level: Option<String>,

    /// State directory (defaults to ~/.summarizer)
    #[arg(long, global = true, env = "SUMMARIZER_HOME")]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in through the browser
    Login {
        /// OAuth provider
        #[arg(short, long, default_value = "google")]
        provider: String,
        /// Print the sign-in URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Complete a sign-in from a redirect URL
    Callback {
        /// The full URL the browser was redirected to
        url: String,
    },

    /// Sign out
    Logout {
        /// Skip the server and wipe all local auth state
        #[arg(long)]
        force: bool,
    },

    /// Show authentication status
    Status {
        /// Keep running, re-checking consistency every N seconds
        #[arg(short, long, value_name = "SECS")]
        watch: Option<u64>,
        /// Repair an inconsistent sign-in state
        #[arg(long, conflicts_with = "watch")]
        fix: bool,
    },

    /// Summarize an article
    Summarize {
        /// Article URL
        url: String,
        /// Extra instructions for the summary
        #[arg(short, long)]
        instructions: Option<String>,
    },

    /// Ask a question about an article
    Ask {
        /// Article URL
        url: String,
        /// The question
        question: String,
    },

    /// Check the backend
    Health,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (paths, config) = match App::load(cli.base_dir.clone()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    let level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    init_logging(&level, Some(paths.log_file()), false);
    debug!(base_dir = %paths.base_dir().display(), "Summarizer CLI starting");

    let mut app = match App::new(paths, config) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    let format = cli.format;
    let result = match cli.command {
        Commands::Login {
            provider,
            no_browser,
        } => commands::login(&app, &provider, no_browser, &format).await,
        Commands::Callback { url } => commands::callback(&app, &url, &format).await,
        Commands::Logout { force } => commands::logout(&app, force, &format).await,
        Commands::Status { watch, fix } => commands::status(&mut app, watch, fix, &format).await,
        Commands::Summarize { url, instructions } => {
            commands::summarize(&app, &url, instructions.as_deref(), &format).await
        }
        Commands::Ask { url, question } => commands::ask(&app, &url, &question, &format).await,
        Commands::Health => commands::health(&app, &format).await,
    };

    app.shutdown();

    if let Err(e) = result {
        if e.downcast_ref::<output::NoticeReported>().is_none() {
            output::print_error(&format!("{:#}", e), &format);
        }
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_status_watch() {
        let cli = Cli::parse_from(["summarizer", "status", "--watch", "10", "--format", "json"]);
        assert_eq!(cli.format, output::OutputFormat::Json);
        assert!(matches!(
            cli.command,
            Commands::Status {
                watch: Some(10),
                fix: false
            }
        ));
    }

    #[test]
    fn test_watch_and_fix_conflict() {
        assert!(Cli::try_parse_from(["summarizer", "status", "--watch", "5", "--fix"]).is_err());
    }

    #[test]
    fn test_parse_summarize_with_instructions() {
        let cli = Cli::parse_from([
            "summarizer",
            "summarize",
            "https://example.com/post",
            "-i",
            "bullet points",
        ]);
        match cli.command {
            Commands::Summarize { url, instructions } => {
                assert_eq!(url, "https://example.com/post");
                assert_eq!(instructions.as_deref(), Some("bullet points"));
            }
            _ => panic!("expected summarize"),
        }
    }
}
