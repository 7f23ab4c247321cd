//! Fieldcast admin CLI
//!
//! Drives the notification engine against a local database: broadcasts,
//! read receipts, inbox, statistics and channel providers.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use fieldcast_core::config::load_config;
use fieldcast_core::tracing_init::init_tracing;
use fieldcast_core::{ChannelType, Priority};
use tokio_stream::StreamExt;
use tracing::info;

use fieldcast_notify::NotificationEngine;
use fieldcast_notify::broadcast::{BroadcastDraft, StaticMembershipProvider};
use fieldcast_notify::dispatch::{CarrierAdapter, HttpCarrier, SimulatedCarrier};
use fieldcast_notify::registry::{ProviderConfig, SmsConfig, WhatsAppConfig};
use fieldcast_notify::storage::NotifyDatabase;

#[derive(Parser, Debug)]
#[command(name = "fieldcast")]
#[command(version, about = "Fieldcast notification engine - farm broadcasts and delivery")]
struct Args {
    /// Explicit settings file (JSON), layered over the global settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to SQLite database file.
    #[arg(long, env = "FIELDCAST_DB_PATH")]
    db_path: Option<PathBuf>,

    /// JSON file of farm memberships used to resolve broadcast audiences.
    #[arg(long, env = "FIELDCAST_MEMBERS")]
    members: Option<PathBuf>,

    /// Accept external sends without contacting any carrier.
    #[arg(long)]
    simulate_carriers: bool,

    /// Maximum recipients notified concurrently during a broadcast.
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Broadcast a message to every qualifying investor of a farm.
    Broadcast {
        /// Target farm ID.
        farm_id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: String,
        /// Sending administrator's ID.
        #[arg(long)]
        sender: String,
        /// Preferred channel (internal, sms, whatsapp).
        #[arg(long)]
        channel: Option<ChannelType>,
        #[arg(long, default_value = "normal")]
        priority: Priority,
        /// Structured summary payload (JSON).
        #[arg(long)]
        summary: Option<String>,
        /// Attached media reference. Repeatable.
        #[arg(long = "media")]
        media: Vec<String>,
    },
    /// Mark a message read for a recipient.
    MarkRead {
        message_id: String,
        recipient_id: String,
    },
    /// Show one message.
    Message { message_id: String },
    /// List messages for a farm or by a sender.
    Messages {
        #[arg(long, conflicts_with = "sender", required_unless_present = "sender")]
        farm: Option<String>,
        #[arg(long)]
        sender: Option<String>,
    },
    /// Show a recipient's broadcasts and in-app alerts.
    Inbox {
        recipient_id: String,
        /// Only unread alerts.
        #[arg(long)]
        unread: bool,
    },
    /// Mark an in-app alert read.
    AckAlert { notification_id: String },
    /// Show statistics.
    Stats {
        #[command(subcommand)]
        view: StatsView,
    },
    /// Show the delivery log, newest first.
    Log {
        #[arg(long)]
        recipient: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Show channel availability.
    Channels,
    /// Manage external channel providers.
    Provider {
        #[command(subcommand)]
        action: ProviderAction,
    },
}

#[derive(Subcommand, Debug)]
enum StatsView {
    /// Read statistics for one message.
    Message { message_id: String },
    /// Totals for one sender.
    Sender { sender_id: String },
    /// System-wide totals.
    System,
    /// Delivery outcomes per channel and fallback rate.
    Delivery,
}

#[derive(Subcommand, Debug)]
enum ProviderAction {
    /// Create or replace a provider.
    Add {
        #[arg(long)]
        id: String,
        /// sms or whatsapp.
        #[arg(long)]
        channel: ChannelType,
        #[arg(long)]
        name: String,
        #[arg(long, default_value_t = 0)]
        priority: i64,
        #[arg(long)]
        api_url: String,
        #[arg(long, env = "FIELDCAST_PROVIDER_TOKEN")]
        auth_token: String,
        /// Sender ID (sms).
        #[arg(long)]
        sender_id: Option<String>,
        /// Business phone number ID (whatsapp).
        #[arg(long)]
        phone_number_id: Option<String>,
    },
    /// Enable a provider.
    Enable { id: String },
    /// Disable a provider.
    Disable { id: String },
    /// List every provider.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(n) = args.max_concurrency {
        config.dispatch.max_concurrency = n;
    }
    if args.log_json {
        config.logging.json = true;
    }
    init_tracing(&config.logging.filter_directive(), config.logging.json);

    // Install ring as the default crypto provider for the carrier HTTP client.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let db_path = match args.db_path.or(config.storage.database_path.clone()) {
        Some(path) => path,
        None => default_db_path()?,
    };
    info!(path = %db_path.display(), "Opening notification database");
    let db = NotifyDatabase::open_with(&db_path, config.storage.pool_settings()).await?;

    let membership = match &args.members {
        Some(path) => StaticMembershipProvider::from_json_file(path)?,
        None => StaticMembershipProvider::default(),
    };

    let carrier: Arc<dyn CarrierAdapter> = if args.simulate_carriers {
        Arc::new(SimulatedCarrier)
    } else {
        Arc::new(HttpCarrier::with_default_client()?)
    };

    let engine = NotificationEngine::builder(db, Arc::new(membership))
        .dispatch_config(config.dispatch.clone())
        .carrier(ChannelType::Sms, Arc::clone(&carrier))
        .carrier(ChannelType::WhatsAppBusiness, carrier)
        .build();

    run(args.command, &engine).await
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    if let Some(path) = fieldcast_core::config::database_path() {
        return Ok(path);
    }
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".fieldcast").join("fieldcast.db"))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let mut out = io::stdout();
    writeln!(out, "{}", serde_json::to_string_pretty(value)?)?;
    Ok(())
}

async fn run(command: Command, engine: &NotificationEngine) -> anyhow::Result<()> {
    let mut out = io::stdout();
    match command {
        Command::Broadcast {
            farm_id,
            title,
            body,
            sender,
            channel,
            priority,
            summary,
            media,
        } => {
            let mut draft = BroadcastDraft::new(farm_id, title, body);
            draft.preferred_channel = channel;
            draft.priority = priority;
            draft.media_refs = media;
            draft.summary = summary
                .as_deref()
                .map(|s| serde_json::from_str(s))
                .transpose()
                .map_err(|e| anyhow::anyhow!("Invalid --summary JSON: {e}"))?;
            let receipt = engine.broadcast(&draft, &sender).await?;
            print_json(&receipt)?;
        }
        Command::MarkRead {
            message_id,
            recipient_id,
        } => {
            engine.mark_read(&message_id, &recipient_id).await?;
            writeln!(out, "Marked {message_id} read for {recipient_id}")?;
        }
        Command::Message { message_id } => {
            print_json(&engine.get_message(&message_id).await?)?;
        }
        Command::Messages { farm, sender } => {
            let messages = match (farm, sender) {
                (Some(farm), _) => engine.get_messages_for_farm(&farm).await?,
                (None, Some(sender)) => engine.get_messages_by_sender(&sender).await?,
                (None, None) => Vec::new(),
            };
            if messages.is_empty() {
                writeln!(out, "No messages")?;
            }
            writeln!(out, "{:<36} {:<12} {:>6} {:>6}  TITLE", "ID", "SENT", "TO", "READ")?;
            for m in &messages {
                writeln!(
                    out,
                    "{:<36} {:<12} {:>6} {:>6}  {}",
                    m.id, m.sent_at, m.recipient_count, m.read_count, m.title
                )?;
            }
        }
        Command::Inbox {
            recipient_id,
            unread,
        } => {
            writeln!(out, "Broadcasts:")?;
            let mut stream = Box::pin(engine.get_messages_for_recipient(&recipient_id));
            while let Some(entry) = stream.next().await {
                let entry = entry?;
                if unread && entry.is_read {
                    continue;
                }
                let marker = if entry.is_read { " " } else { "*" };
                writeln!(
                    out,
                    "{marker} {:<36} {:<12} {}",
                    entry.message.id, entry.message.sent_at, entry.message.title
                )?;
            }
            drop(stream);

            let alerts = engine.list_inbox(&recipient_id, unread).await?;
            let unread_count = engine.unread_inbox_count(&recipient_id).await?;
            writeln!(out, "Alerts ({unread_count} unread):")?;
            for n in &alerts {
                let marker = if n.is_read { " " } else { "*" };
                writeln!(out, "{marker} {:<36} {:<9} {}", n.id, n.kind, n.subject)?;
            }
        }
        Command::AckAlert { notification_id } => {
            if engine.mark_inbox_read(&notification_id).await? {
                writeln!(out, "Alert {notification_id} marked read")?;
            } else {
                writeln!(out, "Alert {notification_id} was already read")?;
            }
        }
        Command::Stats { view } => match view {
            StatsView::Message { message_id } => {
                print_json(&engine.get_message_stats(&message_id).await?)?;
            }
            StatsView::Sender { sender_id } => {
                print_json(&engine.get_sender_stats(&sender_id).await?)?;
            }
            StatsView::System => print_json(&engine.get_system_stats().await?)?,
            StatsView::Delivery => print_json(&engine.get_delivery_stats().await?)?,
        },
        Command::Log { recipient, limit } => {
            let entries = engine.list_delivery_log(recipient.as_deref(), limit).await?;
            writeln!(
                out,
                "{:<12} {:<9} {:<10} {:<20} {:<8}",
                "AT", "CHANNEL", "STATUS", "RECIPIENT", "FALLBACK"
            )?;
            for e in &entries {
                writeln!(
                    out,
                    "{:<12} {:<9} {:<10} {:<20} {:<8}",
                    e.created_at,
                    e.channel,
                    e.status,
                    e.recipient_id,
                    if e.fallback_used { "yes" } else { "no" }
                )?;
            }
        }
        Command::Channels => {
            writeln!(out, "{:<10} {:<10} {:>9}", "CHANNEL", "AVAILABLE", "PROVIDERS")?;
            for status in engine.get_channel_status().await? {
                writeln!(
                    out,
                    "{:<10} {:<10} {:>9}",
                    status.channel.as_str(),
                    if status.available { "yes" } else { "no" },
                    status.active_providers
                )?;
            }
        }
        Command::Provider { action } => run_provider(action, engine).await?,
    }
    Ok(())
}

async fn run_provider(action: ProviderAction, engine: &NotificationEngine) -> anyhow::Result<()> {
    let mut out = io::stdout();
    match action {
        ProviderAction::Add {
            id,
            channel,
            name,
            priority,
            api_url,
            auth_token,
            sender_id,
            phone_number_id,
        } => {
            let config = match channel {
                ChannelType::Internal => {
                    anyhow::bail!("The internal channel does not take a provider")
                }
                ChannelType::Sms => ProviderConfig::Sms(SmsConfig {
                    api_url,
                    sender_id: sender_id
                        .ok_or_else(|| anyhow::anyhow!("--sender-id is required for sms"))?,
                    auth_token,
                }),
                ChannelType::WhatsAppBusiness => ProviderConfig::WhatsAppBusiness(WhatsAppConfig {
                    api_url,
                    phone_number_id: phone_number_id.ok_or_else(|| {
                        anyhow::anyhow!("--phone-number-id is required for whatsapp")
                    })?,
                    auth_token,
                }),
            };
            let provider = engine.register_provider(&id, &name, priority, &config).await?;
            writeln!(out, "Provider {} registered for {}", provider.id, provider.channel)?;
        }
        ProviderAction::Enable { id } => {
            engine.set_provider_active(&id, true).await?;
            writeln!(out, "Provider {id} enabled")?;
        }
        ProviderAction::Disable { id } => {
            engine.set_provider_active(&id, false).await?;
            writeln!(out, "Provider {id} disabled")?;
        }
        ProviderAction::List => {
            writeln!(
                out,
                "{:<36} {:<9} {:<20} {:>8} {:<6}",
                "ID", "CHANNEL", "NAME", "PRIORITY", "ACTIVE"
            )?;
            for p in engine.list_providers().await? {
                writeln!(
                    out,
                    "{:<36} {:<9} {:<20} {:>8} {:<6}",
                    p.id,
                    p.channel.as_str(),
                    p.provider_name,
                    p.priority,
                    if p.is_active { "yes" } else { "no" }
                )?;
            }
        }
    }
    Ok(())
}
