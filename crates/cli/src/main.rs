//! cartsync CLI - drive the cart store from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Guest cart, persisted under $CARTSYNC_STORAGE_DIR
//! cartsync add prod_42 --name "Airtime 10" --price 10.00 --stock 5
//! cartsync show
//!
//! # Sign in: the server cart replaces the guest cart
//! cartsync login --token eyJ... --refresh-token rt_...
//! cartsync update srv-3 2
//! cartsync sync
//!
//! # Sign out: cart and session are purged
//! cartsync logout
//! ```
//!
//! # Commands
//!
//! - `show` - Print the cart (synced first when signed in)
//! - `add` / `update` / `remove` / `clear` - Change the cart
//! - `sync` - Fetch the server cart
//! - `login` / `logout` - Manage the session

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cartsync_client::ClientConfig;

mod commands;

use commands::Session;
use commands::cart::AddArgs;
use commands::session::LoginArgs;

#[derive(Parser)]
#[command(name = "cartsync")]
#[command(author, version, about = "Cart synchronization CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the cart
    Show {
        /// Skip fetching the server cart
        #[arg(long)]
        local: bool,
    },
    /// Add units of a product
    Add(AddArgs),
    /// Set a line's quantity (0 or less removes it)
    Update {
        /// Line item ID
        item_id: String,

        /// New quantity
        #[arg(allow_negative_numbers = true)]
        qty: i64,
    },
    /// Remove a line
    Remove {
        /// Line item ID
        item_id: String,
    },
    /// Remove every line
    Clear,
    /// Fetch the server cart
    Sync,
    /// Store a session and sync the cart
    Login(LoginArgs),
    /// Clear the session and the cart
    Logout,
}

/// Initialize Sentry error tracking if `SENTRY_DSN` is configured.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Warnings and errors become Sentry events; info and debug become breadcrumbs.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        tracing::Level::TRACE => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cartsync_client=info,cartsync_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing();
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(2);
        }
    };

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);
    init_tracing();

    if let Err(e) = run(cli, &config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(config)?;

    match cli.command {
        Commands::Show { local } => commands::cart::show(&session, local).await?,
        Commands::Add(args) => commands::cart::add(&session, args).await?,
        Commands::Update { item_id, qty } => {
            commands::cart::update(&session, &item_id, qty).await?;
        }
        Commands::Remove { item_id } => commands::cart::remove(&session, &item_id).await?,
        Commands::Clear => commands::cart::clear(&session).await?,
        Commands::Sync => commands::cart::sync(&session).await?,
        Commands::Login(args) => commands::session::login(&session, args).await?,
        Commands::Logout => commands::session::logout(&session).await?,
    }
    Ok(())
}
