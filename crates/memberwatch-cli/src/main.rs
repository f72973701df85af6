use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use memberwatch_api::{Credentials, MemberPressClient};
use memberwatch_core::{
    format::relative_time, validation::validate_api_config, EventBus, LogBadge, NotificationEvent,
    NotificationStore, Poller, Settings,
};
use memberwatch_store::{KeyValueStore, SqliteStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "memberwatch")]
#[command(version, about = "Terminal dashboard for a MemberPress site", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Store the site URL and API key
    Configure {
        /// Site base URL, e.g. https://example.com
        #[arg(long)]
        base_url: String,
        /// MemberPress REST API key
        #[arg(long)]
        api_key: String,
    },
    /// Show or change notification settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Check that the configured site answers
    Test,
    /// List members
    Members {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        per_page: u32,
        #[arg(long)]
        search: Option<String>,
    },
    /// List subscriptions
    Subscriptions {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        per_page: u32,
        #[arg(long)]
        search: Option<String>,
    },
    /// Cancel a subscription
    Cancel {
        /// Subscription id
        id: u64,
    },
    /// Manage the notification feed
    Notifications {
        #[command(subcommand)]
        command: NotificationCommands,
    },
    /// Poll for account events until interrupted
    Watch {
        /// Override the configured poll interval (minutes)
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[derive(clap::Subcommand)]
enum SettingsCommands {
    /// Print current settings
    Show,
    /// Change notification toggles and the poll interval
    Set {
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        failed_payments: Option<bool>,
        #[arg(long)]
        new_members: Option<bool>,
        #[arg(long)]
        canceled_subscriptions: Option<bool>,
        #[arg(long)]
        expiring_memberships: Option<bool>,
        /// Poll interval in minutes
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[derive(clap::Subcommand)]
enum NotificationCommands {
    /// Show the feed, newest first
    List {
        /// Only unread entries
        #[arg(long)]
        unread: bool,
    },
    /// Mark entries as read
    Read {
        /// Notification ids
        ids: Vec<String>,
    },
    /// Empty the feed
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - helps when things go sideways
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memberwatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let store: Arc<dyn KeyValueStore> =
        Arc::new(SqliteStore::open_default().context("opening local store")?);
    let settings = Settings::load(store.as_ref())?;

    match cli.command {
        Commands::Configure { base_url, api_key } => {
            let credentials = Credentials::new(base_url, api_key);
            let report = validate_api_config(&credentials);
            if !report.is_valid() {
                for error in &report.errors {
                    eprintln!("error: {error}");
                }
                anyhow::bail!("configuration not saved");
            }

            let mut settings = settings;
            settings.credentials = credentials;
            settings.save(store.as_ref())?;
            println!("Credentials saved.");
        }
        Commands::Settings { command } => match command {
            SettingsCommands::Show => {
                let n = &settings.notifications;
                println!("site:                   {}", or_unset(&settings.credentials.base_url));
                println!("notifications enabled:  {}", n.enabled);
                println!("  failed payments:      {}", n.failed_payments);
                println!("  new members:          {}", n.new_members);
                println!("  canceled subs:        {}", n.canceled_subscriptions);
                println!("  expiring memberships: {}", n.expiring_memberships);
                println!("check interval:         {}m", n.check_interval_minutes);
                println!("last check:             {}", or_unset(n.last_check.as_deref().unwrap_or("")));
            }
            SettingsCommands::Set {
                enabled,
                failed_payments,
                new_members,
                canceled_subscriptions,
                expiring_memberships,
                interval,
            } => {
                let mut settings = settings;
                let n = &mut settings.notifications;
                if let Some(v) = enabled {
                    n.enabled = v;
                }
                if let Some(v) = failed_payments {
                    n.failed_payments = v;
                }
                if let Some(v) = new_members {
                    n.new_members = v;
                }
                if let Some(v) = canceled_subscriptions {
                    n.canceled_subscriptions = v;
                }
                if let Some(v) = expiring_memberships {
                    n.expiring_memberships = v;
                }
                if let Some(v) = interval {
                    n.check_interval_minutes = v.max(1);
                }
                settings.save(store.as_ref())?;
                println!("Settings saved.");
            }
        },
        Commands::Test => {
            let client = client_from(&settings)?;
            let page = client.get_members(1, 1, None).await?;
            println!(
                "Connection OK: {} member(s) on {}",
                page.total_items, settings.credentials.base_url
            );
        }
        Commands::Members {
            page,
            per_page,
            search,
        } => {
            let client = client_from(&settings)?;
            let result = client.get_members(page, per_page, search.as_deref()).await?;
            for member in &result.items {
                println!(
                    "#{:<6} {:<30} {:<30} {}",
                    member.id,
                    member.full_name(),
                    member.email,
                    if member.is_active() { "active" } else { "expired" }
                );
            }
            println!(
                "page {page}/{} ({} total)",
                result.total_pages, result.total_items
            );
        }
        Commands::Subscriptions {
            page,
            per_page,
            search,
        } => {
            let client = client_from(&settings)?;
            let result = client
                .get_subscriptions(page, per_page, search.as_deref())
                .await?;
            let now = Utc::now();
            for sub in &result.items {
                let next = sub
                    .next_payment_date(now)
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "#{:<6} {:<30} {:<10} {:>10} next: {}",
                    sub.id, sub.member.email, sub.status, sub.total, next
                );
            }
            println!(
                "page {page}/{} ({} total)",
                result.total_pages, result.total_items
            );
        }
        Commands::Cancel { id } => {
            let client = client_from(&settings)?;
            let sub = client.cancel_subscription(id).await?;
            println!("Subscription #{} is now {}", sub.id, sub.status);
        }
        Commands::Notifications { command } => {
            let bus = EventBus::new();
            let notifications =
                NotificationStore::new(Arc::clone(&store), bus, Arc::new(LogBadge));
            match command {
                NotificationCommands::List { unread } => {
                    let now = Utc::now();
                    let records = notifications.load()?;
                    let mut shown = 0usize;
                    for record in &records {
                        if unread && record.read {
                            continue;
                        }
                        let marker = if record.read { " " } else { "*" };
                        println!(
                            "{marker} [{}] {:<25} {}  ({})",
                            record.id,
                            record.title,
                            record.message,
                            relative_time(record.timestamp, now)
                        );
                        shown += 1;
                    }
                    println!("{shown} shown, {} unread", notifications.unread_count()?);
                }
                NotificationCommands::Read { ids } => {
                    if notifications.mark_as_read(&ids)? {
                        println!("Marked as read.");
                    } else {
                        println!("Nothing to do.");
                    }
                }
                NotificationCommands::Clear => {
                    notifications.clear()?;
                    println!("Notifications cleared.");
                }
            }
        }
        Commands::Watch { interval } => {
            let client = client_from(&settings)?;
            let interval = interval
                .map(|minutes| std::time::Duration::from_secs(minutes.max(1) * 60))
                .unwrap_or_else(|| settings.check_interval());

            let bus = EventBus::new();
            let notifications =
                NotificationStore::new(Arc::clone(&store), bus.clone(), Arc::new(LogBadge));
            let poller = Arc::new(Poller::new(Arc::new(client), store, notifications));
            let handle = poller.start(interval);

            println!(
                "Watching {} every {}m. Ctrl-C to stop.",
                settings.credentials.base_url,
                interval.as_secs() / 60
            );

            let mut events = bus.subscribe();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        handle.cancel();
                        println!("Stopped.");
                        break;
                    }
                    event = events.recv() => match event {
                        Ok(NotificationEvent::Updated { count }) => {
                            println!("{count} new notification(s)");
                        }
                        Ok(NotificationEvent::Cleared) => {
                            println!("Notification feed cleared");
                        }
                        // Lagged just means we missed intermediate signals
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    }

    Ok(())
}

fn client_from(settings: &Settings) -> anyhow::Result<MemberPressClient> {
    let credentials = settings.credentials()?;
    Ok(MemberPressClient::new(credentials))
}

fn or_unset(value: &str) -> &str {
    if value.is_empty() {
        "(unset)"
    } else {
        value
    }
}
