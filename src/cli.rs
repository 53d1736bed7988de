use clap::{Parser, Subcommand};

/// `planstream` - plan execution and streaming search for procurement chat.
#[derive(Parser, Debug)]
#[command(name = "planstream")]
#[command(version)]
#[command(about = "Turn chat turns into executed plans streamed as server-sent events.", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.planstream/config.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP gateway (POST /api/chat, GET /health)
    Serve {
        /// Port to listen on (use 0 for random available port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
    },

    /// Run one chat turn against the backend and print its SSE frames
    Run {
        /// The user's message
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,

        /// Row the conversation is about
        #[arg(long)]
        active_row: Option<i64>,

        /// Project new rows are created under
        #[arg(long)]
        project: Option<i64>,
    },

    /// Print the plan a message would produce without executing it
    Plan {
        /// The user's message
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,

        #[arg(long)]
        active_row: Option<i64>,

        #[arg(long)]
        project: Option<i64>,
    },
}
