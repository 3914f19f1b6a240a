use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    Form,
};
use chrono::Utc;

use crate::server::{
    error::ServerError,
    models::{ActivateAction, ActivateForm, ActivateParams},
    services::normalize_user_code,
    AppState,
};

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{TITLE}</title>
    <style>
        body {
            margin: 0;
            padding: 0;
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, "Helvetica Neue", Arial, sans-serif;
            background: linear-gradient(135deg, #141E30 0%, #E50914 100%);
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
        }
        .container {
            background: white;
            border-radius: 12px;
            padding: 48px;
            box-shadow: 0 8px 32px rgba(0, 0, 0, 0.1);
            text-align: center;
            max-width: 400px;
        }
        .icon {
            width: 64px;
            height: 64px;
            border-radius: 50%;
            color: white;
            display: inline-flex;
            align-items: center;
            justify-content: center;
            font-size: 32px;
            margin-bottom: 24px;
        }
        .icon.ok { background: #10B981; }
        .icon.error { background: #EF4444; }
        .icon.tv { background: #E50914; }
        h1 {
            color: #1F2937;
            margin: 0 0 12px 0;
            font-size: 24px;
            font-weight: 600;
        }
        p {
            color: #6B7280;
            margin: 0 0 24px 0;
            line-height: 1.5;
        }
        input[name=user_code] {
            font-family: monospace;
            font-size: 28px;
            letter-spacing: 4px;
            text-align: center;
            text-transform: uppercase;
            width: 100%;
            box-sizing: border-box;
            padding: 12px;
            margin-bottom: 24px;
            border: 2px solid #D1D5DB;
            border-radius: 8px;
        }
        button {
            font-size: 16px;
            padding: 12px 24px;
            border: none;
            border-radius: 8px;
            cursor: pointer;
            margin: 0 6px;
        }
        button.approve { background: #E50914; color: white; }
        button.deny { background: #E5E7EB; color: #1F2937; }
        .footer {
            color: #9CA3AF;
            font-size: 14px;
        }
    </style>
</head>
<body>
    <div class="container">
{BODY}
        <div class="footer">StreamIt development provider</div>
    </div>
</body>
</html>"#;

const ACTIVATE_BODY: &str = r#"        <div class="icon tv">▶</div>
        <h1>Sign in to StreamIt</h1>
        <p>Enter the code shown on your TV.</p>
        <form method="post" action="activate">
            <input name="user_code" value="{USER_CODE}" placeholder="XXXX-XXXX" autocomplete="off" autofocus>
            <div>
                <button class="approve" type="submit" name="action" value="approve">Continue</button>
                <button class="deny" type="submit" name="action" value="deny">Cancel</button>
            </div>
        </form>"#;

const APPROVED_BODY: &str = r#"        <div class="icon ok">✓</div>
        <h1>You're signed in!</h1>
        <p>Your TV will continue automatically. You can close this window.</p>"#;

const DENIED_BODY: &str = r#"        <div class="icon error">✗</div>
        <h1>Sign-in cancelled</h1>
        <p>The TV was not signed in. You can close this window.</p>"#;

const ERROR_BODY: &str = r#"        <div class="icon error">✗</div>
        <h1>That code didn't work</h1>
        <p>{ERROR}</p>
        <p><a href="activate">Try another code</a></p>"#;

fn render(title: &str, body: &str) -> Html<String> {
    Html(
        PAGE_TEMPLATE
            .replace("{TITLE}", title)
            .replace("{BODY}", body),
    )
}

/// Page where the viewer types (or confirms) the code shown on the TV.
pub async fn activate_page(Query(params): Query<ActivateParams>) -> Html<String> {
    // Only a well-formed code is echoed back into the page
    let user_code = params
        .user_code
        .as_deref()
        .and_then(normalize_user_code)
        .unwrap_or_default();

    render(
        "Activate StreamIt",
        &ACTIVATE_BODY.replace("{USER_CODE}", &user_code),
    )
}

pub async fn submit_activation(
    State(state): State<AppState>,
    Form(form): Form<ActivateForm>,
) -> (StatusCode, Html<String>) {
    let Some(user_code) = normalize_user_code(&form.user_code) else {
        return error_page(StatusCode::BAD_REQUEST, "Codes look like BCDF-GHJK.");
    };

    // Create span with user_code for all logs in this request
    let span = tracing::info_span!("submit_activation", user_code = %user_code);
    let _enter = span.enter();

    let now = Utc::now();
    let result = match form.action {
        ActivateAction::Approve => state.grants.approve(&user_code, now),
        ActivateAction::Deny => state.grants.deny(&user_code, now),
    };

    match (result, form.action) {
        (Ok(_), ActivateAction::Approve) => {
            (StatusCode::OK, render("Signed in", APPROVED_BODY))
        }
        (Ok(_), ActivateAction::Deny) => (StatusCode::OK, render("Cancelled", DENIED_BODY)),
        (Err(ServerError::ExpiredToken), _) => {
            error_page(StatusCode::GONE, "This code has expired. Start again on your TV.")
        }
        (Err(ServerError::NotFound(_)), _) => {
            error_page(StatusCode::NOT_FOUND, "We couldn't find that code.")
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Activation rejected");
            error_page(StatusCode::CONFLICT, "This code has already been used.")
        }
    }
}

fn error_page(status: StatusCode, message: &str) -> (StatusCode, Html<String>) {
    (
        status,
        render("Activation failed", &ERROR_BODY.replace("{ERROR}", message)),
    )
}
