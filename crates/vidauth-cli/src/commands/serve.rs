//! Serve command - runs the login callback server.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use axum::Router;
use clap::Args;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower_http::trace::TraceLayer;

use vidauth::{FileCredentialStore, IdentityConfig, IdentityManager};
use vidauth_config::{AUTH_PATH, ProviderSection, ServerSection, VidauthConfig};

use super::Context;

/// Arguments for the serve command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Externally reachable URL of this server (overrides config)
    #[arg(long)]
    pub external_url: Option<String>,

    /// Provider client id (overrides config)
    #[arg(long, env = "VIDAUTH_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Identity provider issuer URL (overrides config)
    #[arg(long)]
    pub issuer: Option<String>,
}

impl ServeArgs {
    /// CLI flags as the highest-priority config layer.
    fn as_layer(&self) -> VidauthConfig {
        VidauthConfig {
            server: Some(ServerSection {
                bind: self.bind.clone(),
                external_url: self.external_url.clone(),
                base_uri: None,
            }),
            provider: Some(ProviderSection {
                issuer: self.issuer.clone(),
                client_id: self.client_id.clone(),
                ..Default::default()
            }),
            storage: None,
        }
    }
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let mut config = ctx.load_config()?;
    config.merge(args.as_layer());
    let data_dir = ctx.data_dir(&config)?;
    let resolved = config.resolve()?;

    let store = Arc::new(FileCredentialStore::new(&data_dir));
    tracing::info!(path = %store.path().display(), "Using credential store");

    let identity_config = IdentityConfig {
        issuer_url: resolved.issuer.clone(),
        client_id: resolved.client_id.clone(),
        client_secret: resolved.client_secret.clone(),
        redirect_uri: resolved.redirect_uri(),
        base_uri: resolved.base_uri.clone(),
        scopes: resolved.scopes.clone(),
        state_ttl: resolved.state_ttl,
        http_timeout: resolved.http_timeout,
    };

    let identity = IdentityManager::builder(identity_config)
        .store(store)
        .build()
        .await
        .context("Failed to initialize identity")?;
    let identity = Arc::new(identity);

    let mut updates = identity.subscribe();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(true) => tracing::info!("Provider login completed"),
                Ok(false) => tracing::info!("Provider login lost"),
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Missed login updates")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let app = Router::new()
        .nest(AUTH_PATH, vidauth::router(identity.clone()))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(resolved.bind)
        .await
        .with_context(|| format!("Failed to bind {}", resolved.bind))?;
    let local_addr = listener.local_addr()?;

    tracing::info!(addr = %local_addr, "Starting login server");
    if !ctx.json_output {
        println!("Login server listening on {}", local_addr);
        println!("  Login:    {}{}/login", resolved.external_url, AUTH_PATH);
        println!("  Callback: {}", resolved.redirect_uri());
        println!(
            "  Status:   {}",
            if identity.is_logged_in().await {
                "logged in"
            } else {
                "logged out"
            }
        );
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Login server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
