//! aad-login - sign in to Azure AD from the command line.
//!
//! Opens the Azure AD sign-in page, receives the redirect on the configured
//! callback URL, and prints the resulting identity record as JSON.

#![deny(clippy::all)]

use aad_authenticator::{
    AppError, Authenticator, AzureAdAuthenticator, CallbackServer, Config, IdentityRecord,
    LocalAuthenticator, SystemUserProvisioner,
};
use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load .env file (if present) before anything else
    if let Err(e) = dotenvy::dotenv() {
        // .env file is optional - only log if it's not a "file not found" error
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            eprintln!("\nPlease set the following environment variables:");
            eprintln!("  AAD_TENANT_ID=<your-tenant-id>");
            eprintln!("  AAD_CLIENT_ID=<your-azure-ad-client-id>");
            eprintln!("  AAD_CLIENT_SECRET=<your-client-secret>");
            std::process::exit(1);
        }
    };

    init_logging(&config.logging.level);

    info!("Starting aad-login v{}", env!("CARGO_PKG_VERSION"));

    match run(&config).await {
        Ok(record) => match serde_json::to_string_pretty(&record) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize identity record: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            error!("Login failed: {:#}", e);
            let message = e
                .downcast_ref::<AppError>()
                .map(AppError::user_message)
                .unwrap_or("An error occurred. Please try again.");
            eprintln!("{}", message);
            std::process::exit(1);
        }
    }
}

/// Initialize tracing/logging.
fn init_logging(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Drive one login from browser redirect to identity record.
async fn run(config: &Config) -> Result<IdentityRecord> {
    let authenticator = AzureAdAuthenticator::new(config).map_err(AppError::from)?;

    let server = CallbackServer::bind(&config.provider.callback_url)
        .await
        .map_err(AppError::from)?;

    let (auth_url, state) = authenticator
        .oauth()
        .generate_auth_url()
        .map_err(AppError::from)?;

    info!("Sign in with {} at {}", authenticator.login_service(), auth_url);
    if let Err(e) = open::that(auth_url.as_str()) {
        warn!("Failed to open browser: {}", e);
        eprintln!("Open this URL to sign in:\n  {}", auth_url);
    }

    let callback_url = server
        .wait(config.http.callback_timeout())
        .await
        .map_err(AppError::from)?;

    let record = if config.local_users.enabled {
        let provisioner = SystemUserProvisioner::new(&config.local_users);
        LocalAuthenticator::new(authenticator, provisioner)
            .authenticate_callback(&callback_url, &state)
            .await
    } else {
        authenticator
            .authenticate_callback(&callback_url, &state)
            .await
    };

    let record = record
        .map_err(|e| {
            if e.is_provider_failure() {
                error!("Azure AD rejected the login: {}", e);
            }
            AppError::from(e)
        })
        .context("Authentication failed")?;

    Ok(record)
}
