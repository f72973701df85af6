use std::sync::Arc;

use chrono::{DateTime, Utc};
use memberwatch_api::{parse_timestamp, Member, Subscription, Transaction};
use memberwatch_store::{KeyValueStore, KeyValueStoreExt, Scope};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    events::{EventBus, NotificationEvent},
    Result,
};

/// The feed keeps the 100 most recent records; older ones fall off
pub const MAX_NOTIFICATIONS: usize = 100;

/// Badge background color, carried over from the extension days
pub const BADGE_COLOR: &str = "#FF0000";

const NOTIFICATIONS_KEY: &str = "notifications";

/// Memberships expiring within this many days produce a notification
pub const EXPIRY_WARNING_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    FailedPayment,
    NewMember,
    SubscriptionCanceled,
    MembershipExpiring,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::FailedPayment => write!(f, "Failed Payment"),
            NotificationKind::NewMember => write!(f, "New Member"),
            NotificationKind::SubscriptionCanceled => write!(f, "Subscription Canceled"),
            NotificationKind::MembershipExpiring => write!(f, "Membership Expiring Soon"),
        }
    }
}

/// One entry in the notification feed.
///
/// `timestamp` is when we created the record (epoch millis), not when
/// the underlying event happened on the site. `id` derives from the
/// source object, so the same source event seen twice produces the
/// same id twice; the feed does not deduplicate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// The raw source object, kept for detail views
    pub data: serde_json::Value,
    /// Creation time, epoch millis
    pub timestamp: i64,
    pub read: bool,
}

impl NotificationRecord {
    fn new(
        id: String,
        kind: NotificationKind,
        message: String,
        data: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: kind.to_string(),
            kind,
            message,
            data,
            timestamp: now.timestamp_millis(),
            read: false,
        }
    }
}

/// Map failed transactions to notification records, input order preserved
pub fn synthesize_failed_payments(
    transactions: &[Transaction],
    now: DateTime<Utc>,
) -> Vec<NotificationRecord> {
    transactions
        .iter()
        .map(|txn| {
            NotificationRecord::new(
                format!("payment-{}", txn.id),
                NotificationKind::FailedPayment,
                format!("Payment failed for {} ({})", txn.member.email, txn.total),
                serde_json::to_value(txn).unwrap_or(serde_json::Value::Null),
                now,
            )
        })
        .collect()
}

pub fn synthesize_new_members(members: &[Member], now: DateTime<Utc>) -> Vec<NotificationRecord> {
    members
        .iter()
        .map(|member| {
            NotificationRecord::new(
                format!("member-{}", member.id),
                NotificationKind::NewMember,
                format!(
                    "{} {} ({}) has joined",
                    member.first_name, member.last_name, member.email
                ),
                serde_json::to_value(member).unwrap_or(serde_json::Value::Null),
                now,
            )
        })
        .collect()
}

pub fn synthesize_canceled_subscriptions(
    subscriptions: &[Subscription],
    now: DateTime<Utc>,
) -> Vec<NotificationRecord> {
    subscriptions
        .iter()
        .map(|sub| {
            NotificationRecord::new(
                format!("subscription-{}", sub.id),
                NotificationKind::SubscriptionCanceled,
                format!("{}'s subscription was canceled", sub.member.email),
                serde_json::to_value(sub).unwrap_or(serde_json::Value::Null),
                now,
            )
        })
        .collect()
}

/// Expiring memberships only notify inside the 0..=30 day window; the
/// API's `expires_before` filter is coarser than that, so re-check here.
pub fn synthesize_expiring_memberships(
    transactions: &[Transaction],
    now: DateTime<Utc>,
) -> Vec<NotificationRecord> {
    transactions
        .iter()
        .filter_map(|txn| {
            let days = days_until_expiry(&txn.expires_at, now)?;
            if days <= 0 || days > EXPIRY_WARNING_DAYS {
                return None;
            }
            Some(NotificationRecord::new(
                format!("expiring-{}", txn.id),
                NotificationKind::MembershipExpiring,
                format!(
                    "{}'s membership expires in {} days",
                    txn.member.email, days
                ),
                serde_json::to_value(txn).unwrap_or(serde_json::Value::Null),
                now,
            ))
        })
        .collect()
}

/// Days until the given expiry timestamp, rounded up. None when the
/// timestamp is missing or unparsable.
pub fn days_until_expiry(expires_at: &str, now: DateTime<Utc>) -> Option<i64> {
    let expiry = parse_timestamp(expires_at)?;
    let ms = expiry.signed_duration_since(now).num_milliseconds();
    Some((ms as f64 / 86_400_000.0).ceil() as i64)
}

/// Where the unread count gets displayed.
///
/// The extension pushed this to the toolbar icon; the CLI logs it.
/// Tests record it.
#[cfg_attr(test, mockall::automock)]
pub trait BadgeSink: Send + Sync {
    fn update(&self, unread_count: usize);
}

/// Badge text: empty at zero, otherwise the decimal count
pub fn badge_text(unread_count: usize) -> String {
    if unread_count == 0 {
        String::new()
    } else {
        unread_count.to_string()
    }
}

/// Badge sink that just logs. Good enough for a terminal.
pub struct LogBadge;

impl BadgeSink for LogBadge {
    fn update(&self, unread_count: usize) {
        debug!(
            text = %badge_text(unread_count),
            color = BADGE_COLOR,
            "Badge updated"
        );
    }
}

/// The persisted notification feed plus the derived unread badge.
///
/// Every load and save recomputes the badge, so the displayed count
/// can never drift from stored state.
pub struct NotificationStore {
    store: Arc<dyn KeyValueStore>,
    bus: EventBus,
    badge: Arc<dyn BadgeSink>,
}

impl NotificationStore {
    pub fn new(store: Arc<dyn KeyValueStore>, bus: EventBus, badge: Arc<dyn BadgeSink>) -> Self {
        Self { store, bus, badge }
    }

    pub fn load(&self) -> Result<Vec<NotificationRecord>> {
        let records: Vec<NotificationRecord> = self
            .store
            .get_json(Scope::Local, NOTIFICATIONS_KEY)?
            .unwrap_or_default();
        self.push_badge(&records);
        Ok(records)
    }

    fn save(&self, records: &[NotificationRecord]) -> Result<()> {
        self.store
            .set_json(Scope::Local, NOTIFICATIONS_KEY, &records)?;
        self.push_badge(records);
        Ok(())
    }

    /// Prepend freshly synthesized records (input order preserved),
    /// truncate to capacity, persist, and tell listeners.
    pub fn commit(&self, new_records: Vec<NotificationRecord>) -> Result<()> {
        if new_records.is_empty() {
            return Ok(());
        }

        let count = new_records.len();
        let mut records = new_records;
        records.extend(self.load()?);
        records.truncate(MAX_NOTIFICATIONS);

        self.save(&records)?;
        self.bus.publish(NotificationEvent::Updated { count });
        Ok(())
    }

    /// Flip matching records to read. Persists and signals only when
    /// something actually changed, so repeat calls are free.
    pub fn mark_as_read(&self, ids: &[String]) -> Result<bool> {
        let mut records = self.load()?;
        let mut changed = 0usize;

        for record in &mut records {
            if !record.read && ids.contains(&record.id) {
                record.read = true;
                changed += 1;
            }
        }

        if changed == 0 {
            return Ok(false);
        }

        self.save(&records)?;
        self.bus.publish(NotificationEvent::Updated { count: changed });
        Ok(true)
    }

    pub fn clear(&self) -> Result<()> {
        self.save(&[])?;
        self.bus.publish(NotificationEvent::Cleared);
        Ok(())
    }

    pub fn unread_count(&self) -> Result<usize> {
        Ok(self.load()?.iter().filter(|r| !r.read).count())
    }

    fn push_badge(&self, records: &[NotificationRecord]) {
        let unread = records.iter().filter(|r| !r.read).count();
        self.badge.update(unread);
    }
}
