//! Interactive cash device console.
//!
//! Usage: cargo run --example vending_terminal <port> [inventory_path]
//!
//! Arguments:
//!   port            Serial port of the MDB ASCII bridge (required)
//!   inventory_path  Inventory document (default: inventory.json)
//!
//! Commands once running:
//!   a              accept the banknote in escrow
//!   r              return the banknote in escrow
//!   c <amount>     dispense change (minor units)
//!   p <amount>     start a cashless payment (minor units)
//!   t              show tube status
//!   i              show the inventory snapshot
//!   v              toggle verbose exchange logging
//!   q              quit

use std::env;
use std::process;
use std::sync::Arc;

use mdb_ascii_host::device::config::ControllerConfig;
use mdb_ascii_host::device::controller::PeripheralController;
use mdb_ascii_host::inventory::store::InventoryStore;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, Level};

fn init_logging() {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();
}

fn print_usage() {
    eprintln!("Usage: vending_terminal <port> [inventory_path]");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  vending_terminal /dev/ttyUSB0 inventory.json");
}

fn format_amount(minor: u32) -> String {
    format!("{}.{:02}", minor / 100, minor % 100)
}

async fn watch_events(controller: PeripheralController) {
    let mut events = controller.subscribe();
    while let Ok(event) = events.recv().await {
        info!("device event: {event:?}");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }
    let Some(port) = args.get(1).cloned() else {
        print_usage();
        process::exit(1);
    };
    let inventory_path = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| "inventory.json".to_string());

    let inventory = Arc::new(InventoryStore::open(&inventory_path));
    let controller = PeripheralController::new(ControllerConfig::default(), inventory);

    tokio::spawn(watch_events(controller.clone()));

    info!("starting device on {port}");
    controller.start(&port).await?;

    let mut verbose = false;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("ready - a/r/c <amt>/p <amt>/t/i/v/q");

    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("a"), _) => controller.accept(),
            (Some("r"), _) => controller.return_note(),
            (Some("c"), Some(amount)) => match amount.parse::<u32>() {
                Ok(amount) => {
                    let dispensed = controller.dispense_change(amount).await;
                    info!(
                        "dispense of {}: {}",
                        format_amount(amount),
                        if dispensed { "complete" } else { "failed" }
                    );
                }
                Err(_) => error!("not an amount: {amount}"),
            },
            (Some("p"), Some(amount)) => match amount.parse::<u32>() {
                Ok(amount) => {
                    let approved = controller.start_cashless_payment(amount).await;
                    info!(
                        "cashless payment of {}: {}",
                        format_amount(amount),
                        if approved { "approved" } else { "not approved" }
                    );
                }
                Err(_) => error!("not an amount: {amount}"),
            },
            (Some("t"), _) => {
                if let Some(tubes) = controller.show_tube_status().await {
                    for (denomination, count) in tubes {
                        info!("  {} x{count}", format_amount(denomination));
                    }
                }
            }
            (Some("i"), _) => {
                let snapshot = controller.inventory().snapshot();
                info!(
                    "inventory: {} total, banknotes {:?}, tubes {:?}, cashbox {:?}",
                    snapshot.total_value(),
                    snapshot.banknotes,
                    snapshot.coins,
                    snapshot.coins_in_cashbox
                );
            }
            (Some("v"), _) => {
                verbose = !verbose;
                controller.enable_verbose_logging(verbose);
            }
            (Some("q"), _) => break,
            (None, _) => {}
            (Some(other), _) => error!("unknown command: {other}"),
        }
    }

    controller.stop().await;
    Ok(())
}
