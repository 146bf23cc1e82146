//! Mate CLI - text-mode front end for the companion client.
//!
//! This is the main binary entry point. See the `mate` library for the
//! core functionality.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mate::catalog::view::Visible;
use mate::catalog::ItemRecord;
use mate::env::Environment;
use mate::roster::{Bot, Delivery};
use mate::{BotForm, CatalogView, ClientUpdate, CompanionClient, Config, ConnectionState, LoginMethod};

// CLI
#[derive(Parser)]
#[command(name = "mate")]
#[command(version)]
#[command(about = "Companion client for the Mate bot backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stay connected and log connectivity, roster and catalog updates
    Watch {
        /// Also fetch the item catalog once connected
        #[arg(long)]
        catalog: bool,
    },
    /// Print the bot roster
    Bots,
    /// Register a new bot with the backend
    AddBot {
        /// Account name
        #[arg(long)]
        username: String,
        /// Account password
        #[arg(long)]
        password: String,
        /// Session token
        #[arg(long)]
        token: String,
        /// Login method: legacy, google, apple, ubisoft (or 3, 2, 1, 0)
        #[arg(long, default_value = "legacy")]
        method: LoginMethod,
    },
    /// Browse the item catalog
    Items {
        /// Case-insensitive name filter
        #[arg(long)]
        search: Option<String>,
        /// Page to show (1-based)
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Show one catalog item and its sprite placement
    Item {
        /// Item id
        id: u32,
    },
    /// Print the effective configuration
    Config {
        /// Write it to config.json, environment overrides included
        #[arg(long)]
        save: bool,
    },
}

/// Drive the client until `step` yields a value or `timeout` passes.
async fn run_until<T>(
    client: &mut CompanionClient,
    timeout: Duration,
    what: &str,
    mut step: impl FnMut(&mut CompanionClient, ClientUpdate) -> Option<T>,
) -> Result<T> {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            updates = client.next_update() => {
                let Some(updates) = updates else {
                    bail!("connection closed while waiting for {what} ({})", client.state());
                };
                for update in updates {
                    if let Some(value) = step(client, update) {
                        return Ok(value);
                    }
                }
            }
            () = &mut deadline => {
                bail!("timed out after {}s waiting for {what} ({})", timeout.as_secs(), client.state());
            }
        }
    }
}

/// Connect and wait until the catalog snapshot is installed.
async fn load_catalog(client: &mut CompanionClient, timeout: Duration) -> Result<()> {
    run_until(client, timeout, "the item catalog", |client, update| match update {
        ClientUpdate::Connectivity(ConnectionState::Open) => {
            client.request_catalog();
            None
        }
        ClientUpdate::CatalogLoaded(summary) => {
            if let Some(claimed) = summary.count_mismatch {
                eprintln!(
                    "warning: backend reported {} items but sent {}",
                    claimed, summary.stored
                );
            }
            Some(())
        }
        _ => None,
    })
    .await
}

fn print_bot(bot: &Bot) {
    println!(
        "{:<24} {:<8} {:<12} {:<16} gems={:<8} ping={}",
        bot.username,
        bot.login_method,
        bot.status.as_deref().unwrap_or("-"),
        bot.world.as_deref().unwrap_or("-"),
        bot.gems.map_or_else(|| "-".to_string(), |g| g.to_string()),
        bot.ping.map_or_else(|| "-".to_string(), |p| format!("{p}ms")),
    );
}

fn print_item_line(item: &ItemRecord) {
    println!("{:>6}  {}", item.id, item.name);
}

async fn watch(config: &Config, catalog: bool) -> Result<()> {
    let mut client = CompanionClient::connect(config);

    loop {
        tokio::select! {
            updates = client.next_update() => {
                let Some(updates) = updates else {
                    log::info!("Connection task finished ({})", client.state());
                    break;
                };
                for update in updates {
                    match update {
                        ClientUpdate::Connectivity(state) => {
                            println!("connection: {state}");
                            if catalog && state.is_open() {
                                client.request_catalog();
                            }
                        }
                        ClientUpdate::RosterReplaced { bots } => {
                            println!("roster: {bots} bot(s)");
                            for bot in client.roster().bots() {
                                print_bot(bot);
                            }
                        }
                        ClientUpdate::CatalogLoaded(summary) => {
                            println!(
                                "catalog: version {} with {} item(s)",
                                summary.version, summary.stored
                            );
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
                break;
            }
        }
    }

    let diagnostics = client.diagnostics();
    if diagnostics.total() > 0 {
        println!(
            "recovered errors: {} transport, {} protocol",
            diagnostics.transport_errors(),
            diagnostics.protocol_errors()
        );
    }
    client.shutdown().await;
    Ok(())
}

async fn bots(config: &Config) -> Result<()> {
    let mut client = CompanionClient::connect(config);
    run_until(&mut client, config.response_timeout(), "the roster", |_, update| {
        matches!(update, ClientUpdate::RosterReplaced { .. }).then_some(())
    })
    .await?;

    let roster = client.roster();
    let session = roster.session();
    if let Some(version) = &session.game_version {
        println!(
            "game version {} (protocol {})",
            version,
            session.protocol.map_or_else(|| "?".to_string(), |p| p.to_string())
        );
    }
    if roster.bots().is_empty() {
        println!("no bots configured");
    }
    for bot in roster.bots() {
        print_bot(bot);
    }

    client.shutdown().await;
    Ok(())
}

async fn add_bot(config: &Config, form: BotForm) -> Result<()> {
    // Validate before touching the network.
    form.validate()?;

    let mut client = CompanionClient::connect(config);
    run_until(&mut client, config.response_timeout(), "the connection", |_, update| {
        matches!(update, ClientUpdate::Connectivity(ConnectionState::Open)).then_some(())
    })
    .await?;

    let delivery = client.add_bot(&form)?;
    client.shutdown().await;

    match delivery {
        Delivery::Sent => {
            println!("add_bot sent for '{}'", form.username);
            Ok(())
        }
        Delivery::Dropped(e) => Err::<(), _>(e).context("add_bot was not sent"),
    }
}

async fn items(config: &Config, search: Option<String>, page: usize) -> Result<()> {
    let mut client = CompanionClient::connect(config);
    load_catalog(&mut client, config.response_timeout()).await?;

    let store = client.catalog();
    let mut view = CatalogView::new();
    if let Some(query) = search {
        view.set_query(query);
    }
    view.goto(page, store);

    match view.visible(store) {
        Visible::Search(hits) => {
            println!("{} match(es) for '{}'", hits.len(), view.query().trim());
            for item in hits {
                print_item_line(item);
            }
        }
        Visible::Page {
            number,
            total_pages,
            items,
            window,
        } => {
            println!("page {number}/{total_pages}");
            for item in items {
                print_item_line(item);
            }
            let pages: Vec<String> = window
                .map(|p| {
                    if p == number {
                        format!("[{p}]")
                    } else {
                        p.to_string()
                    }
                })
                .collect();
            println!("pages: {}", pages.join(" "));
        }
    }

    client.shutdown().await;
    Ok(())
}

async fn item(config: &Config, id: u32) -> Result<()> {
    let mut client = CompanionClient::connect(config);
    load_catalog(&mut client, config.response_timeout()).await?;

    let record = client.catalog().lookup(id)?;
    println!("{}", serde_json::to_string_pretty(record)?);
    for layer in client.sprites().icon_layers(record) {
        println!(
            "sprite: {} at ({}, {}) tint #{:02x}{:02x}{:02x}{:02x} scale {}",
            layer.sprite.asset.display(),
            layer.sprite.offset.0,
            layer.sprite.offset.1,
            layer.tint.r,
            layer.tint.g,
            layer.tint.b,
            layer.tint.a,
            layer.scale
        );
    }

    client.shutdown().await;
    Ok(())
}

fn init_logging() -> Result<()> {
    let filter = Environment::current().default_log_filter();
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter));
    builder.format_timestamp_secs();

    // Keep stdout clean for command output; logs go to stderr or MATE_LOG_FILE.
    if let Ok(path) = std::env::var("MATE_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    builder.init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Watch { catalog } => watch(&config, catalog).await?,
        Commands::Bots => bots(&config).await?,
        Commands::AddBot {
            username,
            password,
            token,
            method,
        } => {
            let form = BotForm {
                username,
                password,
                token,
                login_method: Some(method),
            };
            add_bot(&config, form).await?;
        }
        Commands::Items { search, page } => items(&config, search, page).await?,
        Commands::Item { id } => item(&config, id).await?,
        Commands::Config { save } => {
            if save {
                config.save()?;
                println!("Saved to {}", Config::config_path()?.display());
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
