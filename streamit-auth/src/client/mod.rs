mod config;
mod flow;
pub mod provider_client;
mod session;
mod token_storage;

pub use config::Settings;
pub use flow::{DeviceFlowClient, FlowHandle, FlowState};
pub use provider_client::{AuthProvider, ProviderClient};
pub use token_storage::{FileTokenStore, MemoryTokenStore, TokenStorage, TokenStore};

use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::common::{format_remaining, AuthSession, DeviceAuthorization};
use crate::error::AuthError;

fn load_settings() -> Result<Settings, AuthError> {
    let settings = Settings::new().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        AuthError::from(e)
    })?;

    settings.validate().map_err(|e| {
        eprintln!("{}", e);
        eprintln!("\nPlease create a config.toml file with the following content:");
        eprintln!("\ndomain = \"your-tenant.us.auth0.com\"");
        eprintln!("client_id = \"<device flow client id>\"");
        eprintln!("# audience = \"https://api.streamit.example\"");
        eprintln!("\nor point it at a local dev provider:");
        eprintln!("domain = \"http://localhost:8080\"");
        e
    })?;

    Ok(settings)
}

fn token_storage(settings: &Settings) -> Result<FileTokenStore, AuthError> {
    match &settings.token_dir {
        Some(dir) => FileTokenStore::in_dir(dir),
        None => FileTokenStore::new(),
    }
}

fn show_device_code(authorization: &DeviceAuthorization) {
    let uri = authorization.qr_payload();

    // Open browser
    if let Err(e) = open::that(uri) {
        tracing::debug!(error = %e, "Could not open browser");
        println!("Open this URL on your phone or computer:");
    } else {
        println!("Browser opened. You can also open this URL on your phone:");
    }
    println!("  {}\n", uri);

    println!("Or visit {} and enter the code:", authorization.verification_uri);
    println!("\n    {}\n", authorization.user_code);
}

/// Authenticate the viewer before starting the app.
/// Returns the restored or freshly created session.
pub async fn authenticate() -> Result<AuthSession, AuthError> {
    let settings = load_settings()?;
    let storage = Arc::new(token_storage(&settings)?);
    let client = DeviceFlowClient::new(settings, storage)?;

    // Check for existing tokens
    match client.restore_session().await {
        Ok(Some(session)) => {
            println!("✓ Welcome back, {}!", session.user.display_name);
            return Ok(session);
        }
        Ok(None) => {}
        Err(e) => {
            eprintln!("Could not restore previous session: {}", e);
        }
    }

    println!("\n=== StreamIt Sign In ===\n");
    println!("Sign in with your phone or computer to start watching.");
    println!("Press Ctrl+C at any time to cancel.\n");

    loop {
        let handle = client.start().await?;
        show_device_code(handle.authorization());

        let expires_in = handle.authorization().expires_in;
        let mut countdown = handle.countdown();
        let ticker = tokio::spawn(async move {
            while countdown.changed().await.is_ok() {
                let remaining = *countdown.borrow_and_update();
                let elapsed = expires_in.saturating_sub(remaining);
                let percent = elapsed
                    .saturating_mul(100)
                    .checked_div(expires_in)
                    .unwrap_or(100);
                print!(
                    "\rWaiting for authorization... code expires in {} ({}% elapsed) ",
                    format_remaining(remaining),
                    percent
                );
                let _ = std::io::stdout().flush();
            }
        });

        let result = tokio::select! {
            result = handle.wait() => result,
            _ = tokio::signal::ctrl_c() => {
                client.cancel();
                Err(AuthError::Cancelled)
            }
        };
        ticker.abort();
        println!();

        match result {
            Ok(session) => {
                println!("✓ Welcome to StreamIt, {}!\n", session.user.display_name);
                return Ok(session);
            }
            Err(e) if e.is_retryable() => {
                eprintln!("\n{}", e);
                println!("Press Enter to try again, or Ctrl+C to cancel...");
                let stdin = BufReader::new(tokio::io::stdin());
                wait_for_retry(stdin, tokio::signal::ctrl_c()).await?;
            }
            Err(e) => {
                eprintln!("\nAuthentication failed: {}", e);
                return Err(e);
            }
        }
    }
}

/// Wait for a line on `input` unless `interrupt` fires first.
async fn wait_for_retry<R, I>(input: R, interrupt: I) -> Result<(), AuthError>
where
    R: AsyncBufRead + Unpin,
    I: Future<Output = std::io::Result<()>>,
{
    let mut lines = input.lines();
    tokio::select! {
        line = lines.next_line() => match line? {
            Some(_) => Ok(()),
            None => Err(AuthError::Cancelled),
        },
        _ = interrupt => Err(AuthError::Cancelled),
    }
}

/// Remove stored tokens.
pub fn logout() -> Result<(), AuthError> {
    let settings = Settings::new()?;
    let client = DeviceFlowClient::new(settings.clone(), Arc::new(token_storage(&settings)?))?;
    client.logout()
}

/// Restore the stored session without starting a new flow.
pub async fn current_session() -> Result<Option<AuthSession>, AuthError> {
    let settings = load_settings()?;
    let storage = Arc::new(token_storage(&settings)?);
    let client = DeviceFlowClient::new(settings, storage)?;
    client.restore_session().await
}
