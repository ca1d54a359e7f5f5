use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use client_core::{DetachedSensor, FetchOutcome, MutationReport, OrderScreen};
use serde::Serialize;
use shared::{
    domain::{LineItemId, OrderId, PaymentModeId, StatusId},
    protocol::PaymentInput,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod gateway;

use config::load_settings;
use gateway::GraphqlGateway;

#[derive(Parser, Debug)]
#[command(name = "order-console", about = "Browse and update sales orders")]
struct Args {
    /// Overrides the configured GraphQL endpoint.
    #[arg(long)]
    graphql_url: Option<String>,
    #[arg(long)]
    api_token: Option<String>,
    #[arg(long)]
    page_size: Option<u32>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lists orders, newest first, optionally filtered by a search term.
    List {
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    Show {
        order_id: i64,
    },
    Payments {
        order_id: i64,
    },
    Modes,
    SetStatus {
        order_id: i64,
        line_item_id: i64,
        status_id: i64,
    },
    Pay {
        order_id: i64,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        mode: i64,
        /// Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        reference: Option<String>,
    },
    Deliver {
        order_id: i64,
        qty: i64,
    },
    Cancel {
        order_id: i64,
        qty: i64,
    },
}

#[derive(Serialize)]
struct MutationSummary {
    kind: client_core::MutationKind,
    order_id: OrderId,
    acknowledged_id: String,
    fully_refreshed: bool,
}

impl From<&MutationReport> for MutationSummary {
    fn from(report: &MutationReport) -> Self {
        Self {
            kind: report.kind,
            order_id: report.order_id,
            acknowledged_id: report.acknowledged_id.clone(),
            fully_refreshed: report.fully_refreshed(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(url) = args.graphql_url {
        settings.graphql_url = url;
    }
    if let Some(token) = args.api_token {
        settings.api_token = Some(token);
    }
    if let Some(page_size) = args.page_size.filter(|size| *size > 0) {
        settings.page_size = page_size;
    }
    info!(endpoint = %settings.graphql_url, page_size = settings.page_size, "order console starting");

    let gateway = Arc::new(GraphqlGateway::new(
        settings.graphql_url.clone(),
        settings.api_token.clone(),
    ));
    let screen = OrderScreen::open(gateway, Arc::new(DetachedSensor), settings.sync_options());
    let result = run(&screen, args.command).await;
    screen.teardown().await;
    result
}

async fn run(screen: &OrderScreen, command: Command) -> Result<()> {
    match command {
        Command::List { search, pages } => {
            screen
                .list()
                .reset_and_load(search.trim())
                .await
                .context("failed to load orders")?;
            for _ in 1..pages {
                if screen.load_more().await? == FetchOutcome::Skipped {
                    break;
                }
            }
            print_json(&screen.list().snapshot().await)
        }
        Command::Show { order_id } => {
            select(screen, order_id).await?;
            print_json(&screen.detail().snapshot().await)
        }
        Command::Payments { order_id } => {
            screen
                .payments()
                .load(OrderId(order_id))
                .await
                .with_context(|| format!("failed to load payments of order {order_id}"))?;
            print_json(&screen.payments().snapshot().await)
        }
        Command::Modes => print_json(&screen.payment_modes().await?),
        Command::SetStatus {
            order_id,
            line_item_id,
            status_id,
        } => {
            select(screen, order_id).await?;
            let report = screen
                .mutations()
                .update_line_item_status(OrderId(order_id), LineItemId(line_item_id), StatusId(status_id))
                .await?;
            print_json(&MutationSummary::from(&report))
        }
        Command::Pay {
            order_id,
            amount,
            mode,
            date,
            reference,
        } => {
            select(screen, order_id).await?;
            let payment = PaymentInput {
                amount,
                payment_date: date.unwrap_or_else(|| chrono::Local::now().date_naive()),
                payment_mode_id: Some(PaymentModeId(mode)),
                reference,
            };
            let report = screen
                .mutations()
                .capture_payment(OrderId(order_id), payment)
                .await?;
            print_json(&MutationSummary::from(&report))
        }
        Command::Deliver { order_id, qty } => {
            select(screen, order_id).await?;
            let report = screen.mutations().mark_delivered(OrderId(order_id), qty).await?;
            print_json(&MutationSummary::from(&report))
        }
        Command::Cancel { order_id, qty } => {
            select(screen, order_id).await?;
            let report = screen.mutations().mark_cancelled(OrderId(order_id), qty).await?;
            print_json(&MutationSummary::from(&report))
        }
    }
}

/// Loads the order first so mutations are checked against its current amounts.
async fn select(screen: &OrderScreen, order_id: i64) -> Result<()> {
    screen
        .select_order(OrderId(order_id))
        .await
        .with_context(|| format!("failed to load order {order_id}"))?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
