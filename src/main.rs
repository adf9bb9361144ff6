use clap::{Parser, Subcommand};
use tracing::info;

use inbox_assist::agents::AgentRegistry;

#[derive(Parser)]
#[command(
    name = "inbox-assist",
    about = "LLM-backed personal productivity agents",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List registered agents.
    List,
    /// Run one agent by name.
    Run { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let registry = AgentRegistry::builtin();

    match cli.command {
        Command::List => {
            for (name, description) in registry.list() {
                println!("{name:<12} {description}");
            }
        }
        Command::Run { name } => {
            let agent = registry.build(&name)?;
            info!(agent = %name, "Running agent");
            agent.run().await?;
        }
    }

    Ok(())
}
