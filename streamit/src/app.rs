use anyhow::Result;
use chrono::Local;

use streamit_auth::AuthSession;

/// Run the sign-in flow (or restore the stored session) and greet the viewer.
pub async fn login() -> Result<()> {
    let session = streamit_auth::authenticate().await?;
    tracing::info!(subject = %session.user.subject_id, "Signed in");

    println!("{}", profile_card(&session));
    Ok(())
}

pub fn logout() -> Result<()> {
    streamit_auth::logout()?;
    tracing::info!("Signed out");

    println!("Signed out of StreamIt.");
    Ok(())
}

pub async fn status() -> Result<()> {
    match streamit_auth::current_session().await? {
        Some(session) => println!("{}", profile_card(&session)),
        None => println!("Not signed in. Run `streamit login` to sign in."),
    }
    Ok(())
}

/// Boxed summary of the signed-in viewer.
pub fn profile_card(session: &AuthSession) -> String {
    let user = &session.user;

    let mut lines = vec![format!("Signed in as {}", user.display_name)];
    if let Some(email) = &user.email {
        lines.push(email.clone());
    }
    if let Some(expires_at) = session.expires_at {
        lines.push(format!(
            "Session valid until {}",
            expires_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
        ));
    }

    let width = lines
        .iter()
        .map(|line| line.chars().count())
        .max()
        .unwrap_or(0);
    let border = "─".repeat(width + 2);

    let mut card = format!("┌{}┐\n", border);
    for line in &lines {
        let padding = width - line.chars().count();
        card.push_str(&format!("│ {}{} │\n", line, " ".repeat(padding)));
    }
    card.push_str(&format!("└{}┘", border));
    card
}
