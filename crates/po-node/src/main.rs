//! # PO Node
//!
//! Runs purchase-order agreements between in-process nodes.
//!
//! ## Startup Sequence
//!
//! 1. Load telemetry and protocol configuration (from env)
//! 2. Initialize logging and metrics
//! 3. Start the notary, the buyer and the seller
//! 4. Run one agreement that passes the contract and one that does not
//! 5. Report ledgers and metrics, then shut down

mod network;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use po_agreement::{Address, AgreementApi, AgreementConfig, Item, PurchaseOrder};
use po_telemetry::{log_event, log_tx_event, TelemetryConfig};
use tracing::info;

use crate::network::DemoNetwork;

const BUYER: &str = "PartyA";
const SELLER: &str = "PartyB";
const NOTARY: &str = "Controller";

fn order(order_number: u32, country: &str) -> PurchaseOrder {
    PurchaseOrder {
        order_number,
        delivery_date: Utc::now() + Duration::days(7),
        delivery_address: Address::new("London", country),
        items: vec![
            Item::new("widget", 10),
            Item::new("sprocket", 20),
            Item::new("gear", 30),
        ],
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    po_telemetry::init_telemetry(&telemetry).context("initializing telemetry")?;

    let config = AgreementConfig::from_env().context("loading agreement config")?;
    config.validate().context("validating agreement config")?;
    info!(
        window_secs = config.time_window.as_secs(),
        notary_timeout_ms = config.notary_timeout.as_millis() as u64,
        "PO node starting"
    );

    let mut demo = DemoNetwork::new(NOTARY, config);
    let buyer = demo.spawn_node(BUYER);
    demo.spawn_node(SELLER);
    po_telemetry::PEERS_KNOWN.set(buyer.peers().len() as i64);

    let service = telemetry.service_name.as_str();
    match buyer.initiate(order(1, "UK"), SELLER).await {
        Ok(tx_id) => log_tx_event!(info, service, "UK order agreed", tx_id),
        Err(err) => {
            log_event!(warn, service, "UK order failed", kind = %err.kind(), error = %err)
        }
    }
    match buyer.initiate(order(2, "US"), SELLER).await {
        Ok(tx_id) => log_tx_event!(warn, service, "US order unexpectedly agreed", tx_id),
        Err(err) => {
            log_event!(info, service, "US order rejected", kind = %err.kind(), error = %err)
        }
    }

    // the seller records after the final forward arrives
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    for name in [BUYER, SELLER] {
        let node = demo.node(name)?;
        let orders = node.purchase_orders().await?;
        info!(node = %node.whoami(), count = orders.len(), "purchase orders on ledger");
        for state in orders {
            info!(
                node = %node.whoami(),
                reference = state.reference().unwrap_or_default(),
                buyer = %state.buyer,
                seller = %state.seller,
                total = state.po.total_quantity(),
                "purchase order"
            );
        }
    }

    if telemetry.metrics_enabled {
        let text = po_telemetry::gather().context("encoding metrics")?;
        println!("{}", text);
    }

    demo.shutdown().await?;
    info!("PO node stopped");
    Ok(())
}
