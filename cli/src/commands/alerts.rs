use clap::Subcommand;
use uuid::Uuid;

use crate::util::{api_request, require_token};

#[derive(Subcommand)]
pub enum AlertCommands {
    /// List red-flag alerts, newest first
    List {
        /// Maximum alerts to return (default 50, max 500)
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Dismiss a reviewed alert
    Dismiss {
        #[arg(long)]
        id: Uuid,
    },
}

pub async fn run(api_url: &str, token: Option<&str>, command: AlertCommands) -> i32 {
    let token = require_token(token);
    match command {
        AlertCommands::List { limit } => {
            let query: Vec<(String, String)> = limit
                .map(|l| vec![("limit".to_string(), l.to_string())])
                .unwrap_or_default();
            api_request(
                api_url,
                reqwest::Method::GET,
                "/v1/alerts",
                Some(token),
                None,
                &query,
            )
            .await
        }
        AlertCommands::Dismiss { id } => {
            api_request(
                api_url,
                reqwest::Method::DELETE,
                &format!("/v1/alerts/{id}"),
                Some(token),
                None,
                &[],
            )
            .await
        }
    }
}
