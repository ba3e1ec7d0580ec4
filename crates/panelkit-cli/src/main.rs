//! panelkit CLI - sign in to the CMS, inspect the session and browse modules.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use commands::{App, HttpMethod};
use std::path::PathBuf;
use tracing::debug;

/// panelkit CLI - manage the CMS session and browse module options.
#[derive(Parser)]
#[command(name = "panelkit")]
#[command(about = "panelkit CLI for CMS authentication and module browsing")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Session store file (defaults to ~/.panelkit/storage.json)
    #[arg(long, env = "PANELKIT_STORAGE_FILE", global = true)]
    storage_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Login with email and password
    Login {
        /// Email address (prompted when omitted)
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Logout and clear session
    Logout,

    /// Check authentication status
    Status,

    /// Exchange the refresh token for a new access token
    Refresh,

    /// Perform an authenticated request against the CMS
    Request {
        /// Endpoint path (e.g. /items/module_options) or absolute URL
        endpoint: String,
        /// HTTP method
        #[arg(short = 'X', long, value_enum, default_value = "get")]
        method: HttpMethod,
        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Set the CMS base URL
    SetUrl {
        /// Base URL, e.g. https://cms.example.com
        url: String,
    },

    /// Use a static access token instead of logging in
    SetToken {
        /// Access token (prompted without echo when omitted)
        token: Option<String>,
    },

    /// Move the token expiry into the past (testing)
    ForceExpire,

    /// Validate the token and refresh it if needed, reporting before/after
    TestRefresh,

    /// List module options
    Options {
        /// Filter as a JSON object
        #[arg(long)]
        filter: Option<String>,
        /// Sort field
        #[arg(long)]
        sort: Option<String>,
        /// Maximum number of options
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// List the items of a module option
    Items {
        /// Module option ID
        options_id: i64,
    },

    /// Pick a weighted random item of a module option
    Spin {
        /// Module option ID
        options_id: i64,
    },

    /// Follow the session state until interrupted
    Watch {
        /// Poll interval in seconds (defaults to the configured interval)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        poll_secs: Option<u64>,
    },
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let app = App::open(cli.storage_file)?;
    let format = &cli.format;

    match cli.command {
        Commands::Login { email } => commands::login(&app, email, format).await,
        Commands::Logout => commands::logout(&app, format).await,
        Commands::Status => commands::status(&app, format).await,
        Commands::Refresh => commands::refresh(&app, format).await,
        Commands::Request {
            endpoint,
            method,
            data,
        } => commands::request(&app, method, &endpoint, data.as_deref(), format).await,
        Commands::SetUrl { url } => commands::set_url(&app, &url, format).await,
        Commands::SetToken { token } => commands::set_token(&app, token, format).await,
        Commands::ForceExpire => commands::force_expire(&app, format).await,
        Commands::TestRefresh => commands::test_refresh(&app, format).await,
        Commands::Options {
            filter,
            sort,
            limit,
        } => commands::options(&app, filter.as_deref(), sort, limit, format).await,
        Commands::Items { options_id } => commands::items(&app, options_id, format).await,
        Commands::Spin { options_id } => commands::spin(&app, options_id, format).await,
        Commands::Watch { poll_secs } => commands::watch(&app, poll_secs, format).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    panelkit_config::init_logging_for_service("cli", &cli.log_level);
    debug!(format = ?cli.format, "Starting panelkit CLI");

    let format = cli.format;
    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e), &format);
        std::process::exit(1);
    }
}
