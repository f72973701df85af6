use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use memberwatch_api::{Member, MemberPressClient, Subscription, Transaction};
use memberwatch_store::KeyValueStore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    checkpoint::CheckpointTracker,
    notify::{
        synthesize_canceled_subscriptions, synthesize_expiring_memberships,
        synthesize_failed_payments, synthesize_new_members, NotificationStore,
        EXPIRY_WARNING_DAYS,
    },
    resource::ResourceType,
    settings::Settings,
    Result,
};

/// The poller fetches at most this many items per feed per cycle
const POLL_PAGE_SIZE: u32 = 100;

/// What the poller needs from the API - a seam so tests can feed it
/// canned data instead of a live MemberPress site.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn members_since(&self, after: DateTime<Utc>) -> memberwatch_api::Result<Vec<Member>>;

    async fn failed_transactions_since(
        &self,
        after: DateTime<Utc>,
    ) -> memberwatch_api::Result<Vec<Transaction>>;

    async fn canceled_subscriptions_since(
        &self,
        after: DateTime<Utc>,
    ) -> memberwatch_api::Result<Vec<Subscription>>;

    async fn transactions_expiring_before(
        &self,
        deadline: DateTime<Utc>,
    ) -> memberwatch_api::Result<Vec<Transaction>>;
}

#[async_trait]
impl UpdateSource for MemberPressClient {
    async fn members_since(&self, after: DateTime<Utc>) -> memberwatch_api::Result<Vec<Member>> {
        MemberPressClient::members_since(self, after, POLL_PAGE_SIZE).await
    }

    async fn failed_transactions_since(
        &self,
        after: DateTime<Utc>,
    ) -> memberwatch_api::Result<Vec<Transaction>> {
        MemberPressClient::failed_transactions_since(self, after).await
    }

    async fn canceled_subscriptions_since(
        &self,
        after: DateTime<Utc>,
    ) -> memberwatch_api::Result<Vec<Subscription>> {
        MemberPressClient::canceled_subscriptions_since(self, after).await
    }

    async fn transactions_expiring_before(
        &self,
        deadline: DateTime<Utc>,
    ) -> memberwatch_api::Result<Vec<Transaction>> {
        MemberPressClient::transactions_expiring_before(self, deadline).await
    }
}

/// Periodic poll-and-synthesize loop.
///
/// Each tick walks the enabled feeds, fetches whatever is new since the
/// feed's checkpoint, commits the synthesized records, and advances the
/// checkpoint. A failing feed is logged and retried with the same
/// window on the next tick; it never takes the other feeds down.
pub struct Poller {
    source: Arc<dyn UpdateSource>,
    store: Arc<dyn KeyValueStore>,
    checkpoints: CheckpointTracker,
    notifications: NotificationStore,
    tick_running: AtomicBool,
}

/// Cancellation handle for a running poll loop
pub struct PollerHandle {
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Poller {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        store: Arc<dyn KeyValueStore>,
        notifications: NotificationStore,
    ) -> Self {
        let checkpoints = CheckpointTracker::new(Arc::clone(&store));
        Self {
            source,
            store,
            checkpoints,
            notifications,
            tick_running: AtomicBool::new(false),
        }
    }

    /// Run the loop: one tick immediately, then one per interval.
    /// The returned handle stops the loop.
    pub fn start(self: &Arc<Self>, interval: Duration) -> PollerHandle {
        let poller = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = poller.tick().await {
                    warn!(error = %err, "Poll cycle failed");
                }
            }
        });
        info!(interval_secs = interval.as_secs(), "Poller started");
        PollerHandle { task }
    }

    /// One poll cycle. If the previous cycle is still in flight the
    /// tick is skipped outright, so checkpoint and feed writes from two
    /// cycles can never interleave.
    pub async fn tick(&self) -> Result<()> {
        if self
            .tick_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Previous tick still running, skipping this one");
            return Ok(());
        }

        let result = self.run_tick().await;
        self.tick_running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_tick(&self) -> Result<()> {
        let mut settings = Settings::load(self.store.as_ref())?;
        if !settings.notifications.enabled {
            debug!("Notifications disabled, skipping poll");
            return Ok(());
        }

        let now = Utc::now();
        for resource in ResourceType::ALL {
            if !resource.enabled_in(&settings.notifications) {
                continue;
            }
            match self.poll_resource(resource, now).await {
                Ok(count) => {
                    if count > 0 {
                        info!(resource = %resource, count, "New notifications");
                    }
                }
                Err(err) => {
                    // Checkpoint stays put; the next tick retries this window
                    warn!(resource = %resource, error = %err, "Poll failed for feed");
                }
            }
        }

        settings.notifications.last_check = Some(now.to_rfc3339());
        settings.save(self.store.as_ref())?;
        Ok(())
    }

    /// Fetch, synthesize and commit one feed, then advance its
    /// checkpoint to the cycle start time.
    async fn poll_resource(&self, resource: ResourceType, now: DateTime<Utc>) -> Result<usize> {
        let since = self.checkpoints.effective_since(resource, now)?;
        debug!(resource = %resource, since = %since, "Checking feed");

        let records = match resource {
            ResourceType::NewMembers => {
                let members = self.source.members_since(since).await?;
                synthesize_new_members(&members, now)
            }
            ResourceType::FailedPayments => {
                let transactions = self.source.failed_transactions_since(since).await?;
                synthesize_failed_payments(&transactions, now)
            }
            ResourceType::CanceledSubscriptions => {
                let subscriptions = self.source.canceled_subscriptions_since(since).await?;
                synthesize_canceled_subscriptions(&subscriptions, now)
            }
            ResourceType::ExpiringMemberships => {
                let deadline = now + chrono::Duration::days(EXPIRY_WARNING_DAYS);
                let transactions = self.source.transactions_expiring_before(deadline).await?;
                synthesize_expiring_memberships(&transactions, now)
            }
        };

        let count = records.len();
        self.notifications.commit(records)?;
        self.checkpoints.set_checkpoint(resource, now)?;
        Ok(count)
    }
}
