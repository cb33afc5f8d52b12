use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "dialogus")]
#[command(author, version, about = "Streaming chat client over a session manager backend", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open an interactive chat session
    Chat {
        /// WebSocket endpoint of the session manager (overrides config)
        #[arg(short, long)]
        endpoint: Option<String>,

        /// User id attached to outbound requests
        #[arg(short, long)]
        user: Option<String>,
    },

    /// List user profiles exposed by the backend
    Profiles {
        /// Base URL of the backend HTTP API (overrides config)
        #[arg(short, long)]
        backend: Option<String>,
    },
}
