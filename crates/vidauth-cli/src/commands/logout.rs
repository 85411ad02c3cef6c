//! Logout command - forgets the stored token.

use anyhow::Result;
use clap::Args;

use vidauth::{CredentialStore, FileCredentialStore};

use super::Context;

/// Arguments for the logout command.
#[derive(Args, Debug)]
pub struct LogoutArgs {
    /// Also discard the session secret, invalidating outstanding login URLs
    #[arg(long)]
    pub all: bool,
}

/// Run the logout command.
///
/// Only touches stored credentials; a running server keeps its cached token
/// until it is logged out through `/auth/logout`.
pub async fn run(args: LogoutArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load_config_or_default();
    let data_dir = ctx.data_dir(&config)?;
    let store = FileCredentialStore::new(&data_dir);

    if args.all {
        store.clear().await?;
        println!("Stored credentials removed.");
        return Ok(());
    }

    if store.load().await?.token.is_some() {
        store.save_token(None).await?;
        println!("Stored token removed.");
    } else {
        println!("No stored token found.");
    }
    Ok(())
}
