use clap::{Parser, Subcommand};

mod commands;
mod util;

use commands::alerts::AlertCommands;
use commands::checkins::CheckinCommands;
use commands::token::TokenCommands;

#[derive(Parser)]
#[command(name = "checkin", version, about = "Operator CLI for patient check-in dispatch and alerts")]
struct Cli {
    /// API base URL
    #[arg(long, env = "CHECKIN_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Operator bearer token for /v1 endpoints
    #[arg(long, env = "CHECKIN_DISPATCH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check API health
    Health,
    /// Queue operations: dispatch, enqueue, retry, erase
    Checkins {
        #[command(subcommand)]
        command: CheckinCommands,
    },
    /// Red-flag alert review
    Alerts {
        #[command(subcommand)]
        command: AlertCommands,
    },
    /// Sign or verify reply tokens locally (no API call)
    Token {
        /// Token signing secret shared with the API
        #[arg(long, env = "CHECKIN_TOKEN_SECRET", hide_env_values = true)]
        secret: Option<String>,
        /// Token lifetime in days
        #[arg(long, env = "CHECKIN_TOKEN_TTL_DAYS", default_value_t = checkin_core::token::DEFAULT_TTL_DAYS)]
        ttl_days: i64,
        #[command(subcommand)]
        command: TokenCommands,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let token = cli.token.as_deref();

    let code = match cli.command {
        Commands::Health => commands::health::run(&cli.api_url).await,
        Commands::Checkins { command } => commands::checkins::run(&cli.api_url, token, command).await,
        Commands::Alerts { command } => commands::alerts::run(&cli.api_url, token, command).await,
        Commands::Token {
            secret,
            ttl_days,
            command,
        } => commands::token::run(secret.as_deref(), ttl_days, command),
    };

    std::process::exit(code);
}
