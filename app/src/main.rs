//! Caption client command line.
//!
//! Connects to the backend, resumes the stored session (or logs in with
//! `CAPTION_EMAIL` / `CAPTION_PASSWORD`), loads bookings and prints a
//! summary.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use caption_client::environment::{LogNavigator, LogNotifier};
use caption_client::types::Credentials;
use caption_client::{AppAction, AuthStatus, CaptionClient, ClientConfig, ClientRole, selectors};
use caption_client_runtime::metrics::MetricsExporter;
use futures::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long to wait for any single backend round trip.
const STEP_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "caption_client=info,caption_client_runtime=info,caption_client_transport=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut exporter = MetricsExporter::new();
    if std::env::var("CAPTION_METRICS").is_ok_and(|v| v == "1" || v == "true") {
        exporter.install().context("failed to install metrics exporter")?;
    }

    let config = ClientConfig::from_env();
    info!(
        backend = %config.backend_url,
        role = ?config.role,
        token_path = %config.token_path.display(),
        "Configuration loaded"
    );

    let client = CaptionClient::from_config(
        &config,
        Arc::new(LogNotifier),
        Arc::new(LogNavigator::starting_at("/login")),
    );
    log_transitions(&client);

    let mut restored = client
        .store()
        .actions(|a| matches!(a, AppAction::TokenLoaded(_)));
    client
        .start()
        .await
        .with_context(|| format!("could not connect to {}", config.backend_url))?;
    tokio::time::timeout(STEP_TIMEOUT, restored.recv())
        .await
        .context("stored session was not loaded")?;

    let mut auth = wait_for_settled_auth(&client).await?;

    if auth != AuthStatus::Authenticated {
        if let (Ok(email), Ok(password)) = (
            std::env::var("CAPTION_EMAIL"),
            std::env::var("CAPTION_PASSWORD"),
        ) {
            info!(email = %email, "Logging in");
            client
                .store()
                .dispatch_and_wait_for(
                    AppAction::Login(Credentials::new(email, password)),
                    |a| matches!(a, AppAction::LogInResponse(_)),
                    STEP_TIMEOUT,
                )
                .await
                .context("login did not complete")?;
            auth = wait_for_settled_auth(&client).await?;
        }
    }

    if auth == AuthStatus::Authenticated {
        load_data(&client, config.role).await?;
        print_summary(&client);
    } else {
        warn!("Not logged in; set CAPTION_EMAIL and CAPTION_PASSWORD to log in");
    }

    if let Some(rendered) = exporter.render() {
        println!("{rendered}");
    }

    client
        .shutdown(Duration::from_secs(5))
        .await
        .context("shutdown did not complete")?;
    Ok(())
}

/// Log user and connection changes as they happen.
fn log_transitions(client: &CaptionClient) {
    let mut user = client.store().select(selectors::user);
    tokio::spawn(async move {
        while let Some(user) = user.next().await {
            info!(auth = ?user.auth, logged = user.logged, "User state");
        }
    });

    let mut connection = client.store().select_value(selectors::connection_status);
    tokio::spawn(async move {
        while let Some(status) = connection.next().await {
            info!(status = ?status, "Connection");
        }
    });
}

/// Wait until no login is in flight and any failure was acknowledged.
async fn wait_for_settled_auth(client: &CaptionClient) -> anyhow::Result<AuthStatus> {
    let mut auth = client.store().select_value(selectors::auth_status);
    let settled = async {
        while let Some(status) = auth.next().await {
            // Anonymous right after start may still be followed by a re-login
            let restoring = status == AuthStatus::Anonymous
                && client.store().state(|s| s.user.login_token.is_some());
            if !matches!(status, AuthStatus::Authenticating | AuthStatus::AuthFailed) && !restoring {
                return Some(status);
            }
        }
        None
    };
    tokio::time::timeout(STEP_TIMEOUT, settled)
        .await
        .context("authentication did not settle")?
        .context("store closed")
}

async fn load_data(client: &CaptionClient, role: ClientRole) -> anyhow::Result<()> {
    client
        .store()
        .dispatch_and_wait_for(
            AppAction::GetBookings,
            |a| matches!(a, AppAction::BookingsResponse(_)),
            STEP_TIMEOUT,
        )
        .await
        .context("bookings did not load")?;

    if role == ClientRole::Admin {
        client
            .store()
            .dispatch_and_wait_for(
                AppAction::GetUsers,
                |a| matches!(a, AppAction::UsersResponse(_)),
                STEP_TIMEOUT,
            )
            .await
            .context("users did not load")?;
    }
    Ok(())
}

fn print_summary(client: &CaptionClient) {
    let state = client.store().snapshot();
    let who = state
        .user
        .user_info
        .as_ref()
        .and_then(|u| u.email.clone())
        .unwrap_or_else(|| "unknown user".to_string());

    println!("Logged in as {who}");
    println!("{} booking(s)", state.bookings.items.len());
    for booking in &state.bookings.items {
        println!(
            "  {}  {}",
            booking.booking_token,
            booking.title.as_deref().unwrap_or("(untitled)")
        );
    }
    if state.users.loaded {
        println!("{} user(s)", state.users.items.len());
    }
}
