//! Authentication commands.

use super::App;
use crate::output::{self, OutputFormat};
use anyhow::{bail, Result};
use clap::ValueEnum;
use panelkit_auth::{ApiRequest, AuthError, Credentials, Method};
use serde_json::{json, Value};
use std::io::{self, Write};

/// HTTP method for `panelkit request`.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

/// Login with email and password.
pub async fn login(app: &App, email: Option<String>, format: &OutputFormat) -> Result<()> {
    let session = &app.session;

    if session.validate_token().await? {
        output::print_success("Already logged in", format);
        return Ok(());
    }

    let email = match email {
        Some(email) => email,
        None => {
            print!("Email: ");
            io::stdout().flush()?;
            let mut email = String::new();
            io::stdin().read_line(&mut email)?;
            email.trim().to_string()
        }
    };

    if email.is_empty() {
        output::print_error("Email is required", format);
        return Ok(());
    }

    // Prompt for password (hidden)
    let password = rpassword::prompt_password("Password: ")?;

    if password.is_empty() {
        output::print_error("Password is required", format);
        return Ok(());
    }

    if *format == OutputFormat::Text {
        println!("Logging in to {}...", session.server_url().await?);
    }

    match session.authenticate(&Credentials::new(&email, password)).await {
        Ok(grant) => match format {
            OutputFormat::Text => println!(
                "Logged in as {} (token valid for {}s)",
                email, grant.expires_in
            ),
            OutputFormat::Json => output::print_json(&json!({
                "status": "success",
                "email": email,
                "expires_at": grant.expires_at,
                "has_refresh_token": grant.refresh_token.is_some(),
            })),
        },
        Err(e) => output::print_error(&format!("Login failed: {}", e), format),
    }

    Ok(())
}

/// Logout and clear session.
pub async fn logout(app: &App, format: &OutputFormat) -> Result<()> {
    app.session.logout().await?;
    output::print_success("Logged out successfully", format);
    Ok(())
}

/// Check authentication status.
pub async fn status(app: &App, format: &OutputFormat) -> Result<()> {
    // Drive the FSM from what is stored before reporting it.
    app.session.validate_token().await?;
    let status = app.session.status().await?;

    match format {
        OutputFormat::Text => {
            output::print_heading("Session");
            output::print_row("Server", &status.server_url);
            output::print_row("Logged in", &status.is_logged_in.to_string());
            output::print_row("Valid", &status.is_valid.to_string());
            output::print_row("State", &format!("{:?}", status.state));
            output::print_row("Access token", &status.has_access_token.to_string());
            output::print_row("Refresh token", &status.has_refresh_token.to_string());
            output::print_row("Expires in (s)", &output::or_dash(status.expires_in_secs));
        }
        OutputFormat::Json => output::print_json(&status),
    }

    Ok(())
}

/// Exchange the refresh token for a new token set.
pub async fn refresh(app: &App, format: &OutputFormat) -> Result<()> {
    if app.session.refresh_token().await? {
        output::print_success("Token refreshed", format);
    } else {
        output::print_error("Token refresh failed - you need to re-authenticate", format);
    }
    Ok(())
}

/// Perform an authenticated request and print the response body.
pub async fn request(
    app: &App,
    method: HttpMethod,
    endpoint: &str,
    body: Option<&str>,
    format: &OutputFormat,
) -> Result<()> {
    let mut request = ApiRequest::new(method.into());
    if let Some(body) = body {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| anyhow::anyhow!("Request body is not valid JSON: {}", e))?;
        request = request.with_body(value);
    }

    let response = match app.session.make_authenticated_request(endpoint, request).await {
        Ok(response) => response,
        Err(AuthError::AuthRequired) => {
            output::print_error("Authentication required. Run 'panelkit login'", format);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let status = response.status().as_u16();
    let text = response.text().await?;
    let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

    match format {
        OutputFormat::Text => {
            println!("HTTP {}", status);
            output::print_json(&body);
        }
        OutputFormat::Json => output::print_json(&json!({ "status": status, "body": body })),
    }

    Ok(())
}

/// Set the CMS base URL.
pub async fn set_url(app: &App, url: &str, format: &OutputFormat) -> Result<()> {
    app.session.set_server_url(url).await?;
    output::print_success(&format!("Server URL set to {}", url.trim_end_matches('/')), format);
    Ok(())
}

/// Install a static access token. Reads it from a hidden prompt when omitted.
pub async fn set_token(app: &App, token: Option<String>, format: &OutputFormat) -> Result<()> {
    let token = match token {
        Some(token) => token,
        None => rpassword::prompt_password("Access token: ")?,
    };

    if token.trim().is_empty() {
        bail!("Access token is required");
    }

    app.session.set_static_token(token.trim()).await?;
    output::print_success("Static access token saved", format);
    Ok(())
}
