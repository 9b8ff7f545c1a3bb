//! Headless terminal front end for the live auction client.
//!
//! Renders the mirrored auction as text whenever it changes and turns stdin
//! commands into bids and identity selection. Logs go to stderr so the
//! rendered board on stdout stays readable.

#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;

use std::io::BufRead;

use auction_client::config::{DEFAULT_API_URL, DEFAULT_WS_URL};
use auction_client::{
    ApiClient, ApiError, AuctionState, ClientConfig, ConfigError, Countdown, Notification,
    SyncController,
};
use clap::Parser;
use events::AuctionStatus;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("http client setup failed: {0}")]
    Api(#[from] ApiError),
}

#[derive(Parser, Debug)]
#[command(name = "auction-cli", about = "Headless live auction client")]
struct Cli {
    #[arg(long, env = "AUCTION_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    #[arg(long, env = "AUCTION_WS_URL", default_value = DEFAULT_WS_URL)]
    ws_url: String,

    /// Identity id to bid as once the identity list has loaded.
    #[arg(long, env = "AUCTION_USER")]
    user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Help,
    Users,
    Items,
    Refresh,
    User(String),
    Bid { item_id: String, amount: Option<i64> },
    Quit,
}

const HELP: &str = "commands: users | user <id> | items | bid <item> [amount] | refresh | help | quit";

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = ClientConfig::from_values(Some(&cli.api_url), Some(&cli.ws_url))?;
    info!(api_url = %config.api_url, ws_url = %config.ws_url, "starting auction client");

    let api = ApiClient::new(&config.api_url)?;
    let controller = SyncController::from_config(&config);
    controller.start();
    controller.bootstrap(&api).await;

    if let Some(user_id) = cli.user.as_deref() {
        select_user(&controller, user_id);
    }

    println!("{HELP}");
    run(&controller).await;
    controller.shutdown();
    Ok(())
}

/// Read stdin lines on a dedicated thread. The channel closes at EOF.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn run(controller: &SyncController) {
    let (tick_tx, mut ticks) = mpsc::unbounded_channel();
    let _ticker = controller.clock().on_tick(move |server_now| {
        let _ = tick_tx.send(server_now);
    });
    let mut lines = spawn_stdin_reader();
    let mut last_frame = String::new();

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                match parse_command(&line) {
                    Ok(Command::Quit) => break,
                    Ok(Command::Items) => {
                        last_frame = frame(controller, controller.clock().server_now());
                        println!("{last_frame}");
                    }
                    Ok(command) => execute(controller, command),
                    Err(message) => eprintln!("{message}"),
                }
            }
            Some(server_now) = ticks.recv() => {
                let next = frame(controller, server_now);
                if next != last_frame {
                    println!("{next}");
                    last_frame = next;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
}

fn execute(controller: &SyncController, command: Command) {
    match command {
        Command::Help => println!("{HELP}"),
        Command::Users => {
            let lines = controller.store().read(render_users);
            println!("{lines}");
        }
        Command::Refresh => {
            if !controller.request_items() {
                eprintln!("offline; cannot refresh");
            }
        }
        Command::User(user_id) => select_user(controller, &user_id),
        Command::Bid { item_id, amount: Some(amount) } => {
            controller.place_bid(&item_id, amount);
        }
        Command::Bid { item_id, amount: None } => {
            controller.place_next_bid(&item_id);
        }
        Command::Items | Command::Quit => {}
    }
}

fn select_user(controller: &SyncController, user_id: &str) {
    let found = controller
        .store()
        .read(|state| state.users.iter().find(|user| user.id == user_id).cloned());
    match found {
        Some(user) => {
            controller.select_identity(user);
        }
        None => warn!(user_id, "unknown user; run `users` to list identities"),
    }
}

fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(Command::Help);
    };
    let command = match verb.to_ascii_lowercase().as_str() {
        "help" | "?" => Command::Help,
        "users" => Command::Users,
        "items" | "ls" => Command::Items,
        "refresh" => Command::Refresh,
        "quit" | "exit" | "q" => Command::Quit,
        "user" => {
            let id = words.next().ok_or("usage: user <id>")?;
            Command::User(id.to_owned())
        }
        "bid" => {
            let item_id = words.next().ok_or("usage: bid <item> [amount]")?;
            let amount = match words.next() {
                Some(raw) => Some(
                    raw.trim_start_matches('$')
                        .parse::<i64>()
                        .map_err(|_| format!("invalid amount: {raw}"))?,
                ),
                None => None,
            };
            Command::Bid { item_id: item_id.to_owned(), amount }
        }
        other => return Err(format!("unknown command: {other} ({HELP})")),
    };
    if words.next().is_some() {
        return Err(format!("too many arguments ({HELP})"));
    }
    Ok(command)
}

// =============================================================================
// RENDERING
// =============================================================================

fn frame(controller: &SyncController, server_now: i64) -> String {
    let notifications = controller.notifications().active();
    controller.store().read(|state| render(state, &notifications, server_now))
}

fn render(state: &AuctionState, notifications: &[Notification], server_now: i64) -> String {
    if state.loading {
        return "Loading auctions...".to_owned();
    }

    let mut out = String::new();
    let link = if state.connected { "live" } else { "offline" };
    let who = state.current_user.as_ref().map_or("(no user selected)", |user| user.name.as_str());
    out.push_str(&format!("[{link}] {who} | {} items\n", state.items.len()));

    if state.items.is_empty() {
        out.push_str("No active auctions\n");
    }
    for item in &state.items {
        let countdown = if item.status == AuctionStatus::Ended {
            Countdown::new(0)
        } else {
            Countdown::new(item.auction_end_time.saturating_sub(server_now))
        };
        let leader = item.current_bidder.as_deref().unwrap_or("-");
        let flash = state.flash(&item.id).map_or("", |kind| kind.color());
        out.push_str(&format!(
            "{:<10} {:<24} ${:<8} {:<10} {:>8} {:<8} {:<7} {flash}\n",
            item.id,
            item.title,
            item.current_bid,
            leader,
            countdown.to_string(),
            countdown.urgency().as_str(),
            state.derive_status(&item.id).as_str(),
        ));
    }
    for notification in notifications {
        out.push_str(&format!("  ({}) {}\n", notification.severity.as_str(), notification.message));
    }
    out.trim_end().to_owned()
}

fn render_users(state: &AuctionState) -> String {
    if state.users.is_empty() {
        return "no identities available".to_owned();
    }
    state
        .users
        .iter()
        .map(|user| {
            let marker = if state.is_current_user(Some(&user.id)) { "*" } else { " " };
            format!("{marker} {} {}", user.id, user.name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
