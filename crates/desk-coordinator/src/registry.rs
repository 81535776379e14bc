//! Refcounted channel subscription registry.
//!
//! Multiple consumers can hold interest in the same broker channel; the
//! broker sees at most one subscribe per channel regardless of how many
//! acquirers there are, and one unsubscribe when the last interest is
//! released. Concurrent acquisitions while a subscribe is in flight
//! coalesce onto the same outcome. Failed subscribes stay registered and
//! are retried; a channel whose interest drops to zero while its
//! subscribe is still in flight is unsubscribed as soon as it completes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use desk_client::{BrokerError, ChannelCallback, MessageBroker};

use crate::error::{RegistryError, RegistryResult};

type Outcome = Option<Result<(), String>>;

enum Slot {
    /// Subscribe in flight; waiters observe the outcome on the channel.
    Pending(watch::Sender<Outcome>),
    Active,
    Failed(String),
}

struct Entry {
    refcount: usize,
    slot: Slot,
    callback: ChannelCallback,
}

enum AcquirePath {
    AlreadyActive,
    Wait(watch::Receiver<Outcome>),
    Subscribe(ChannelCallback),
}

/// How a completed subscribe attempt reconciled with the entry table.
enum SettleOutcome {
    /// Entry vanished: the registry was disposed while the call was out.
    Disposed,
    /// Interest dropped to zero while the call was out.
    Orphaned,
    /// Entry updated in place (active or parked failed).
    Settled,
}

/// Shared subscription registry.
pub struct SubscriptionRegistry {
    broker: Arc<dyn MessageBroker>,
    entries: Mutex<HashMap<String, Entry>>,
    disposed: Mutex<bool>,
}

impl SubscriptionRegistry {
    pub fn new(broker: Arc<dyn MessageBroker>) -> Self {
        Self {
            broker,
            entries: Mutex::new(HashMap::new()),
            disposed: Mutex::new(false),
        }
    }

    /// Register interest in `channel`, subscribing on first acquisition.
    ///
    /// Interest remains registered even when this returns a subscribe
    /// error; [`retry_failed`](Self::retry_failed) will converge it, or
    /// the caller can [`release`](Self::release) to withdraw.
    pub async fn acquire(&self, channel: &str, callback: ChannelCallback) -> RegistryResult<()> {
        let path = {
            if *self.disposed.lock() {
                return Err(RegistryError::Disposed);
            }
            let mut entries = self.entries.lock();
            match entries.get_mut(channel) {
                Some(entry) => {
                    if !Arc::ptr_eq(&entry.callback, &callback) {
                        return Err(RegistryError::CallbackMismatch {
                            channel: channel.to_string(),
                        });
                    }
                    entry.refcount += 1;
                    match &entry.slot {
                        Slot::Active => AcquirePath::AlreadyActive,
                        Slot::Pending(tx) => AcquirePath::Wait(tx.subscribe()),
                        Slot::Failed(_) => {
                            // Fresh interest triggers an immediate retry.
                            let (tx, _) = watch::channel(None);
                            entry.slot = Slot::Pending(tx);
                            AcquirePath::Subscribe(entry.callback.clone())
                        }
                    }
                }
                None => {
                    let (tx, _) = watch::channel(None);
                    entries.insert(
                        channel.to_string(),
                        Entry {
                            refcount: 1,
                            slot: Slot::Pending(tx),
                            callback: callback.clone(),
                        },
                    );
                    AcquirePath::Subscribe(callback)
                }
            }
        };

        match path {
            AcquirePath::AlreadyActive => {
                debug!(%channel, "joined active subscription");
                Ok(())
            }
            AcquirePath::Wait(rx) => self.await_outcome(channel, rx).await,
            AcquirePath::Subscribe(callback) => self.run_subscribe(channel, callback).await,
        }
    }

    /// Withdraw one unit of interest; unsubscribes at zero.
    pub async fn release(&self, channel: &str) -> RegistryResult<()> {
        let unsubscribe = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(channel) else {
                warn!(%channel, "release of unregistered channel");
                return Ok(());
            };
            entry.refcount = entry.refcount.saturating_sub(1);
            if entry.refcount > 0 {
                return Ok(());
            }
            match entry.slot {
                // In-flight subscriber converges the orphan on completion.
                Slot::Pending(_) => false,
                Slot::Active => {
                    entries.remove(channel);
                    true
                }
                Slot::Failed(_) => {
                    entries.remove(channel);
                    false
                }
            }
        };

        if unsubscribe {
            debug!(%channel, "last interest released, unsubscribing");
            self.broker.unsubscribe(channel.to_string()).await?;
        }
        Ok(())
    }

    /// Re-attempt every failed channel that still has interest.
    ///
    /// Returns the number of channels recovered.
    pub async fn retry_failed(&self) -> usize {
        let targets: Vec<(String, ChannelCallback)> = {
            let mut entries = self.entries.lock();
            entries
                .iter_mut()
                .filter(|(_, entry)| matches!(entry.slot, Slot::Failed(_)) && entry.refcount > 0)
                .map(|(channel, entry)| {
                    let (tx, _) = watch::channel(None);
                    entry.slot = Slot::Pending(tx);
                    (channel.clone(), entry.callback.clone())
                })
                .collect()
        };

        let mut recovered = 0;
        for (channel, callback) in targets {
            match self.run_subscribe(&channel, callback).await {
                Ok(()) => {
                    info!(%channel, "failed subscription recovered");
                    recovered += 1;
                }
                Err(err) => warn!(%channel, error = %err, "retry failed"),
            }
        }
        recovered
    }

    /// Re-issue every held subscription after a reconnect.
    ///
    /// The broker loses channel state across reconnects, so active
    /// entries are re-subscribed too, not just failed ones.
    pub async fn resubscribe_all(&self) {
        let targets: Vec<(String, ChannelCallback)> = {
            let mut entries = self.entries.lock();
            entries
                .iter_mut()
                .filter(|(_, entry)| {
                    entry.refcount > 0 && !matches!(entry.slot, Slot::Pending(_))
                })
                .map(|(channel, entry)| {
                    let (tx, _) = watch::channel(None);
                    entry.slot = Slot::Pending(tx);
                    (channel.clone(), entry.callback.clone())
                })
                .collect()
        };

        info!(channels = targets.len(), "resubscribing after reconnect");
        for (channel, callback) in targets {
            if let Err(err) = self.run_subscribe(&channel, callback).await {
                warn!(%channel, error = %err, "resubscribe failed, will retry");
            }
        }
    }

    /// Tear down: reject further acquisitions and unsubscribe everything.
    pub async fn dispose(&self) {
        let channels: Vec<String> = {
            *self.disposed.lock() = true;
            let mut entries = self.entries.lock();
            let active: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| matches!(entry.slot, Slot::Active))
                .map(|(channel, _)| channel.clone())
                .collect();
            for entry in entries.values() {
                if let Slot::Pending(tx) = &entry.slot {
                    tx.send_replace(Some(Err("registry disposed".to_string())));
                }
            }
            entries.clear();
            active
        };

        for channel in channels {
            if let Err(err) = self.broker.unsubscribe(channel.clone()).await {
                warn!(%channel, error = %err, "unsubscribe during dispose failed");
            }
        }
        info!("subscription registry disposed");
    }

    /// Current interest count for a channel (0 when unregistered).
    pub fn refcount(&self, channel: &str) -> usize {
        self.entries
            .lock()
            .get(channel)
            .map(|entry| entry.refcount)
            .unwrap_or(0)
    }

    pub fn is_active(&self, channel: &str) -> bool {
        matches!(
            self.entries.lock().get(channel).map(|e| &e.slot),
            Some(Slot::Active)
        )
    }

    /// Channels currently parked in the failed table.
    pub fn failed_channels(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, entry)| matches!(entry.slot, Slot::Failed(_)))
            .map(|(channel, _)| channel.clone())
            .collect()
    }

    async fn await_outcome(
        &self,
        channel: &str,
        mut rx: watch::Receiver<Outcome>,
    ) -> RegistryResult<()> {
        loop {
            let outcome = rx.borrow_and_update().clone();
            if let Some(result) = outcome {
                return result.map_err(|message| {
                    RegistryError::Broker(BrokerError::SubscribeFailed {
                        channel: channel.to_string(),
                        message,
                    })
                });
            }
            if rx.changed().await.is_err() {
                return Err(RegistryError::Disposed);
            }
        }
    }

    /// Drive one subscribe attempt and publish the outcome to waiters.
    async fn run_subscribe(&self, channel: &str, callback: ChannelCallback) -> RegistryResult<()> {
        let result = self.broker.subscribe(channel.to_string(), callback).await;

        let settled = {
            let mut entries = self.entries.lock();
            match entries.get_mut(channel) {
                // Disposed underneath us; a subscribe that landed anyway
                // is an orphan the broker must not keep.
                None => SettleOutcome::Disposed,
                Some(entry) => {
                    let outcome = match &result {
                        Ok(()) => Ok(()),
                        Err(err) => Err(err.to_string()),
                    };
                    if let Slot::Pending(tx) = &entry.slot {
                        tx.send_replace(Some(outcome));
                    }

                    if entry.refcount == 0 {
                        entries.remove(channel);
                        if result.is_ok() {
                            SettleOutcome::Orphaned
                        } else {
                            SettleOutcome::Settled
                        }
                    } else {
                        match &result {
                            Ok(()) => entry.slot = Slot::Active,
                            Err(err) => {
                                warn!(%channel, error = %err, "subscribe failed, parked for retry");
                                entry.slot = Slot::Failed(err.to_string());
                            }
                        }
                        SettleOutcome::Settled
                    }
                }
            }
        };

        match settled {
            SettleOutcome::Disposed => {
                if result.is_ok() {
                    debug!(%channel, "disposed mid-subscribe, unsubscribing orphan");
                    let _ = self.broker.unsubscribe(channel.to_string()).await;
                }
                Err(RegistryError::Disposed)
            }
            SettleOutcome::Orphaned => {
                debug!(%channel, "interest withdrawn mid-subscribe, unsubscribing orphan");
                let _ = self.broker.unsubscribe(channel.to_string()).await;
                Err(RegistryError::Cancelled {
                    channel: channel.to_string(),
                })
            }
            SettleOutcome::Settled => {
                result?;
                Ok(())
            }
        }
    }
}
