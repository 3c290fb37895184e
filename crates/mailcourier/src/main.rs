//! `mailcourier` - persistent, rate-limited email dispatch from the command line.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use mailcourier_core::{
    Attachment, DeliveryStatus, DispatchConfig, Dispatcher, EmailRecord, Message,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command, MessageArgs};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailcourier=info,mailcourier_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(DispatchConfig::default_path);
    let config = DispatchConfig::load_or_default(&config_path)
        .await
        .with_context(|| format!("loading {}", config_path.display()))?;
    let dispatcher = Dispatcher::connect(&config)
        .await
        .context("opening the mail store")?;

    match cli.command {
        Command::Worker => run_worker(&dispatcher).await,
        Command::Send(args) => send(&dispatcher, args).await,
        Command::Schedule { message, at } => {
            let message = build_message(message).await?;
            let ids = dispatcher.schedule(&message, at).await?;
            for id in ids {
                println!("{id}");
            }
            Ok(())
        }
        Command::Pending { json } => pending(&dispatcher, json).await,
    }
}

async fn run_worker(dispatcher: &Dispatcher) -> Result<()> {
    info!("Starting mailcourier worker");
    dispatcher.start_worker();

    tokio::signal::ctrl_c()
        .await
        .context("waiting for interrupt")?;
    info!("Interrupt received, finishing current cycle");

    dispatcher.stop_worker().await;
    Ok(())
}

async fn send(dispatcher: &Dispatcher, args: MessageArgs) -> Result<()> {
    let message = build_message(args).await?;
    let mut pending = 0usize;

    for dispatch in dispatcher.send(&message).await? {
        match dispatch.result {
            Ok(DeliveryStatus::Delivered) => {
                println!("{} {} delivered", dispatch.email_id, dispatch.recipient);
            }
            Ok(DeliveryStatus::Rejected(reason)) => {
                println!("{} {} rejected: {reason}", dispatch.email_id, dispatch.recipient);
            }
            Err(e) => {
                pending += 1;
                println!("{} {} pending: {e}", dispatch.email_id, dispatch.recipient);
            }
        }
    }

    if pending > 0 {
        anyhow::bail!("{pending} message(s) left pending for the worker");
    }
    Ok(())
}

async fn build_message(args: MessageArgs) -> Result<Message> {
    let mut message = Message::new(args.from, args.subject);
    for recipient in args.to {
        message = message.to(recipient);
    }
    if let Some(text) = args.text {
        message = message.text(text);
    }
    if let Some(html) = args.html {
        message = message.html(html);
    }
    for path in &args.attachments {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading attachment {}", path.display()))?;
        let filename = path
            .file_name()
            .map_or_else(|| "attachment".to_string(), |n| n.to_string_lossy().into_owned());
        message = message.attach(Attachment::new(filename, content_type_for(path), data));
    }
    Ok(message)
}

fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .map_or_else(|| "application/octet-stream".to_string(), |m| m.to_string())
}

#[derive(Serialize)]
struct PendingRow {
    id: i64,
    scheduled_at: String,
    sender: String,
    recipient: String,
    subject: String,
}

impl From<&EmailRecord> for PendingRow {
    fn from(record: &EmailRecord) -> Self {
        Self {
            id: record.id.0,
            scheduled_at: record.scheduled_at.to_rfc3339(),
            sender: record.sender.to_string(),
            recipient: record.recipient.clone(),
            subject: record.subject.clone(),
        }
    }
}

async fn pending(dispatcher: &Dispatcher, json: bool) -> Result<()> {
    let records = dispatcher.engine().unsent().await?;
    let rows: Vec<PendingRow> = records.iter().map(PendingRow::from).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for row in &rows {
        println!(
            "{:>6}  {}  {:<32}  {}",
            row.id, row.scheduled_at, row.recipient, row.subject
        );
    }
    info!("{} pending message(s)", rows.len());
    Ok(())
}
