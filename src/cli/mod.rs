//! CLI module for the science portal launcher
//!
//! Provides command-line interface for all portal operations.

mod commands;
mod context;
mod output;
mod shell;

use clap::{Parser, Subcommand};

pub use context::CommandContext;
pub use output::{OutputFormat, print_error};

/// Science Portal - interactive session launcher
#[derive(Parser, Debug)]
#[command(name = "science-portal")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[command(flatten)]
    pub output: OutputOptions,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output formatting options
#[derive(Parser, Debug, Clone)]
pub struct OutputOptions {
    /// Output in JSON format (for machine parsing)
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase output verbosity
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl OutputOptions {
    pub fn format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List, launch, delete and connect to sessions
    Session {
        #[command(subcommand)]
        command: commands::session::SessionCommands,
    },

    /// Show launch resources (context, images, session types)
    Resources {
        #[command(subcommand)]
        command: commands::resources::ResourcesCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: commands::config::ConfigCommands,
    },

    /// Start an interactive shell
    Shell,
}

/// Run the CLI with parsed arguments
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = cli.output.format();
    let quiet = cli.output.quiet;

    match cli.command {
        Commands::Shell => shell::run(format, quiet).await,
        command => {
            let mut ctx = CommandContext::oneshot(format, quiet);
            let result = dispatch(command, &mut ctx).await;
            ctx.finish().await;
            result
        }
    }
}

/// Run one non-shell command
pub(crate) async fn dispatch(command: Commands, ctx: &mut CommandContext) -> anyhow::Result<()> {
    match command {
        Commands::Session { command } => commands::session::run(command, ctx).await,
        Commands::Resources { command } => commands::resources::run(command, ctx).await,
        Commands::Config { command } => commands::config::run(command, ctx.format).await,
        Commands::Shell => anyhow::bail!("Already in the interactive shell"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_launch() {
        let cli = Cli::try_parse_from([
            "science-portal",
            "--json",
            "session",
            "launch",
            "--name",
            "analysis",
            "--type",
            "desktop",
            "--cores",
            "4",
            "--no-wait",
        ])
        .unwrap();

        assert_eq!(cli.output.format(), OutputFormat::Json);
        match cli.command {
            Commands::Session {
                command:
                    commands::session::SessionCommands::Launch {
                        name,
                        session_type,
                        cores,
                        no_wait,
                        ..
                    },
            } => {
                assert_eq!(name, "analysis");
                assert_eq!(session_type.as_deref(), Some("desktop"));
                assert_eq!(cores, Some(4));
                assert!(no_wait);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_wait_target() {
        let cli = Cli::try_parse_from([
            "science-portal",
            "session",
            "wait",
            "a1",
            "--until",
            "terminated",
        ])
        .unwrap();

        assert!(matches!(
            cli.command,
            Commands::Session {
                command: commands::session::SessionCommands::Wait {
                    until: crate::watch::WaitTarget::Terminated,
                    ..
                }
            }
        ));
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
