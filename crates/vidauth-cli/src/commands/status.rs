//! Status command - shows the stored login state.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;

use vidauth::{CredentialStore, FileCredentialStore};

use super::Context;

/// Arguments for the status command.
#[derive(Args, Debug)]
pub struct StatusArgs {}

/// Status for JSON output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusOutput {
    logged_in: bool,
    valid: bool,
    expires_at: Option<DateTime<Utc>>,
    credentials: String,
}

/// Run the status command.
pub async fn run(_args: StatusArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load_config_or_default();
    let data_dir = ctx.data_dir(&config)?;
    let store = FileCredentialStore::new(&data_dir);
    let credentials = store.load().await?;

    let token = credentials.token.as_ref();
    let expires_at: Option<DateTime<Utc>> = token.and_then(|t| t.expires_at);

    if ctx.json_output {
        let output = StatusOutput {
            logged_in: token.is_some(),
            valid: token.is_some_and(|t| t.is_valid()),
            expires_at,
            credentials: store.path().display().to_string(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Login Status");
    println!("------------");
    println!("Credentials: {}", store.path().display());
    match token {
        Some(token) => {
            println!("Token: stored");
            match expires_at {
                Some(at) if token.is_valid() => println!("  Expires: {}", at.to_rfc3339()),
                Some(at) => println!("  Expired: {} (will refresh on next use)", at.to_rfc3339()),
                None => println!("  Expires: unknown"),
            }
            println!(
                "  Refresh token: {}",
                if token.refresh_token.is_some() {
                    "present"
                } else {
                    "absent"
                }
            );
        }
        None => {
            println!("Token: none");
            println!("  Run 'vidauth serve' and open the login URL to authenticate");
        }
    }
    Ok(())
}
