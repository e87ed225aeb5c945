use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::filter::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "burrow", version, about = "Fixed-arena garbage collection simulator")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scripted two-object cycle demonstration
    Demo,
    /// Start the interactive command shell (the default)
    Shell,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Shell) {
        Commands::Demo => commands::demo::run(),
        Commands::Shell => commands::shell::run(),
    }
}
