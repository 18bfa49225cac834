// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Membership-Auth API Server
//!
//! Serves sign-up, sign-in, OAuth linking, two-factor and password reset
//! endpoints for a membership website.

use membership_auth::{
    config::Config,
    db::InMemoryDb,
    services::{cleanup::spawn_cleanup, mailer_from_config, HttpProviderClient, PasswordHasher},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, base_url = %config.base_url, "Starting Membership-Auth API");

    let db = InMemoryDb::new();

    let mailer = mailer_from_config(&config);
    let oauth_client = Arc::new(HttpProviderClient::from_config(&config));
    tracing::info!(
        providers = ?membership_auth::models::OAuthProvider::ALL
            .into_iter()
            .filter(|p| config.provider(*p).is_some())
            .collect::<Vec<_>>(),
        "OAuth providers configured"
    );

    // Build shared state
    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::new(db.clone()),
        Arc::new(db),
        mailer,
        oauth_client,
        PasswordHasher::default(),
    ));

    spawn_cleanup(
        state.codes.clone(),
        state.pending.clone(),
        config.code_cleanup_interval_secs,
    );

    // Build router
    let app = membership_auth::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("membership_auth=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
