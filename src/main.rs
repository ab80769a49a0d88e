//! sgtc - terminal admin console for SG shot-timer servers.
//!
//! ## Modes
//!
//! **Default** (no subcommand): watch mode. Connects to the server's
//! WebSocket feed and renders live shot/session events as an append-only
//! log, restoring mid-session state from the local cache after a restart.
//!
//! **Subcommands**: one-shot operations against the server's HTTP API:
//! device scan/connect/disconnect, session history, per-session detail,
//! title management, and archival.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser as ClapParser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sgtc::client::ServerClient;
use sgtc::config::ConsoleConfig;
use sgtc::console::Console;
use sgtc::history::{format_sess_id, HistoryPager};
use sgtc::store::SessionStore;
use sgtc::ws::EventStream;

/// sgtc - terminal admin console for SG shot-timer servers.
///
/// Run without a subcommand to watch the live event feed.
#[derive(ClapParser, Debug)]
#[command(name = "sgtc", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Timer server address (host:port or full URL)
    #[arg(long, env = "SGTC_SERVER")]
    server: Option<String>,

    /// Path to the config file (default: platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan for nearby timer devices
    Devices,

    /// Show current device connection state
    Status,

    /// Connect a device. With no address, reuses the last connected one.
    Connect {
        /// Device address (e.g. AA:BB:CC:DD:EE:FF)
        address: Option<String>,

        /// Device name to register with the server
        #[arg(long)]
        name: Option<String>,
    },

    /// Disconnect a device. With no address, releases the last connected one.
    Disconnect {
        /// Device address
        address: Option<String>,
    },

    /// List recorded sessions, one page at a time
    Sessions {
        /// Page size (defaults to the configured one)
        #[arg(long)]
        limit: Option<usize>,

        /// Keep paging until the history is exhausted
        #[arg(long)]
        all: bool,
    },

    /// Show the per-shot detail of one recorded session
    Detail {
        /// Session id (as shown by `sessions`)
        sess_id: u64,
    },

    /// Show or set the competition title
    Title {
        /// New title. Omit to print the current one.
        value: Option<String>,
    },

    /// Archive all recorded sessions server-side
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = match &cli.config {
        Some(path) => ConsoleConfig::load(path)?
            .with_context(|| format!("config file not found: {}", path.display()))?,
        None => ConsoleConfig::load_default()?,
    };
    if let Some(server) = cli.server {
        config.server = server;
    }

    let client = ServerClient::new(&config.server)?;

    match cli.command {
        Some(Commands::Devices) => run_devices(&client).await,
        Some(Commands::Status) => run_status(&client).await,
        Some(Commands::Connect { address, name }) => {
            run_connect(&client, &config, address, name).await
        }
        Some(Commands::Disconnect { address }) => run_disconnect(&client, &config, address).await,
        Some(Commands::Sessions { limit, all }) => {
            run_sessions(&client, &config, limit, all).await
        }
        Some(Commands::Detail { sess_id }) => run_detail(&client, sess_id).await,
        Some(Commands::Title { value }) => run_title(&client, value).await,
        Some(Commands::Clear) => run_clear(&client).await,
        None => run_watch(client, config).await,
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "sgtc=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Open the persistent state file. A failure degrades to running without a
/// cache: watch mode must come up even with a corrupt or unwritable file.
fn open_store(config: &ConsoleConfig) -> Option<SessionStore> {
    let path = config.state_file.clone().or_else(SessionStore::default_path)?;
    match SessionStore::open(path) {
        Ok(store) => Some(store),
        Err(e) => {
            tracing::warn!(error = %e, "state cache disabled");
            None
        }
    }
}

// ── Watch mode ─────────────────────────────────────────────────────

async fn run_watch(client: ServerClient, config: ConsoleConfig) -> anyhow::Result<()> {
    let store = open_store(&config);
    let ws_url = client.ws_url();

    let mut console = Console::new(config, client, store);
    console.restore();
    console.prime().await;

    let (events_tx, events_rx) = tokio::sync::mpsc::channel(256);
    let stream = EventStream::spawn(ws_url, events_tx);

    console.run(events_rx).await;

    stream.shutdown();
    stream.join().await;
    Ok(())
}

// ── One-shot subcommands ───────────────────────────────────────────

async fn run_devices(client: &ServerClient) -> anyhow::Result<()> {
    let devices = client.devices().await.context("device scan failed")?;
    if devices.is_empty() {
        println!("no timer devices found");
        return Ok(());
    }
    for d in devices {
        let model = d.model.as_deref().unwrap_or("unknown model");
        println!("{}  {}  [{}]", d.address, d.name, model);
    }
    Ok(())
}

async fn run_status(client: &ServerClient) -> anyhow::Result<()> {
    let status = client.status().await.context("status query failed")?;
    println!(
        "server: {}",
        if status.connected { "connected" } else { "no device connected" }
    );
    for d in status.devices {
        let link = if d.connected { "connected" } else { "disconnected" };
        let model = d.model.as_deref().unwrap_or("unknown model");
        let api = d.api_version.as_deref().unwrap_or("?");
        println!("{}  {}  [{}] api v{}  {}", d.address, d.name, model, api, link);
    }
    Ok(())
}

/// Resolve an explicit address or fall back to the cached last device.
fn resolve_address(config: &ConsoleConfig, address: Option<String>) -> anyhow::Result<String> {
    if let Some(address) = address {
        return Ok(address);
    }
    open_store(config)
        .and_then(|s| s.last_device().map(str::to_string))
        .context("no address given and no previously connected device")
}

async fn run_connect(
    client: &ServerClient,
    config: &ConsoleConfig,
    address: Option<String>,
    name: Option<String>,
) -> anyhow::Result<()> {
    let address = resolve_address(config, address)?;
    let resp = client
        .connect_device(&address, name.as_deref())
        .await
        .context("connect failed")?;

    if let Some(mut store) = open_store(config) {
        store.set_last_device(&resp.address);
        if let Err(e) = store.flush() {
            tracing::warn!(error = %e, "could not persist state file");
        }
    }

    let model = resp.model.as_deref().unwrap_or("unknown model");
    let api = resp.api_version.as_deref().unwrap_or("?");
    println!("{}: {} ({}) [{}] api v{}", resp.status, resp.name, resp.address, model, api);
    Ok(())
}

async fn run_disconnect(
    client: &ServerClient,
    config: &ConsoleConfig,
    address: Option<String>,
) -> anyhow::Result<()> {
    let address = resolve_address(config, address)?;
    let resp = client
        .disconnect_device(&address)
        .await
        .context("disconnect failed")?;
    println!("{}: {}", resp.status, resp.address.as_deref().unwrap_or(&address));
    Ok(())
}

async fn run_sessions(
    client: &ServerClient,
    config: &ConsoleConfig,
    limit: Option<usize>,
    all: bool,
) -> anyhow::Result<()> {
    let page_size = limit.unwrap_or(config.page_size);
    let mut pager = HistoryPager::new(page_size);

    pager
        .load_page(client, true)
        .await
        .context("session list failed")?;
    while all && pager.has_more() {
        pager
            .load_page(client, false)
            .await
            .context("session list failed")?;
    }

    if pager.entries().is_empty() {
        println!("no recorded sessions");
        return Ok(());
    }
    for s in pager.entries() {
        println!(
            "{}  {}  shots {:3}  total {:7.2}s  best split {:5.2}s",
            s.sess_id,
            format_sess_id(s.sess_id),
            s.total_shots,
            s.total_time,
            s.best_split
        );
    }
    if pager.has_more() {
        println!("(more available; rerun with --all)");
    }
    Ok(())
}

async fn run_detail(client: &ServerClient, sess_id: u64) -> anyhow::Result<()> {
    let text = client.download(sess_id).await.context("download failed")?;
    let shots = sgtc::history::parse_export(&text);
    if shots.is_empty() {
        println!("session {} has no recorded shots", format_sess_id(sess_id));
        return Ok(());
    }
    println!("session {}: {} shot(s)", format_sess_id(sess_id), shots.len());
    for shot in shots {
        match shot.split {
            Some(split) => println!("  shot #{} at {:.2}s (split {:.2}s)", shot.num, shot.time, split),
            None => println!("  shot #{} at {:.2}s", shot.num, shot.time),
        }
    }
    Ok(())
}

async fn run_title(client: &ServerClient, value: Option<String>) -> anyhow::Result<()> {
    match value {
        Some(title) => {
            client.set_title(&title).await.context("set title failed")?;
            println!("title set: {}", title);
        }
        None => {
            let title = client.title().await.context("title query failed")?;
            println!("{}", title);
        }
    }
    Ok(())
}

async fn run_clear(client: &ServerClient) -> anyhow::Result<()> {
    let resp = client
        .clear_sessions()
        .await
        .context("clear sessions failed")?;
    println!("archived {} session(s) to {}", resp.archived, resp.archive_dir);
    Ok(())
}
