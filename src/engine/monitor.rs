//! Background worker that drives [`PaymentEngine::check_payment`] from the
//! persisted `next_check_at` schedule.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use chrono::Utc;
use tokio::{
    sync::watch,
    task::{JoinError, JoinHandle, JoinSet},
};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    db::PaymentRepository,
    engine::{CheckOutcome, PaymentEngine, PaymentError},
    ethereum::ChainClient,
};

/// Payment ids with a check currently running. At most one check per id.
#[derive(Clone, Default)]
pub struct InFlightRegistry {
    ids: Arc<Mutex<HashSet<Uuid>>>,
}

impl InFlightRegistry {
    pub fn try_acquire(&self, payment_id: Uuid) -> Option<MonitorLease> {
        let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        if !ids.insert(payment_id) {
            return None;
        }

        Some(MonitorLease {
            payment_id,
            ids: self.ids.clone(),
        })
    }

    pub fn is_in_flight(&self, payment_id: &Uuid) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(payment_id)
    }

    pub fn len(&self) -> usize {
        self.ids.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Releases the payment id when dropped.
pub struct MonitorLease {
    payment_id: Uuid,
    ids: Arc<Mutex<HashSet<Uuid>>>,
}

impl Drop for MonitorLease {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.payment_id);
    }
}

pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Stops dispatching new checks and waits for running ones to finish.
    /// Scheduled checks stay in the database and resume on the next start.
    pub async fn shutdown(self) {
        info!("[Monitor] Shutting down");
        let _ = self.shutdown.send(true);

        if let Err(e) = self.task.await {
            error!("[Monitor] Worker task ended abnormally: {}", e);
        }
    }
}

pub fn spawn<R, C>(engine: Arc<PaymentEngine<R, C>>) -> MonitorHandle
where
    R: PaymentRepository,
    C: ChainClient,
{
    let (shutdown, signal) = watch::channel(false);
    let task = tokio::spawn(run(engine, signal));

    MonitorHandle { shutdown, task }
}

async fn run<R, C>(engine: Arc<PaymentEngine<R, C>>, mut shutdown: watch::Receiver<bool>)
where
    R: PaymentRepository,
    C: ChainClient,
{
    info!("[Monitor] Starting payment monitor");
    let poll_interval = engine.settings().poll_interval;
    let mut checks: JoinSet<()> = JoinSet::new();

    loop {
        if *shutdown.borrow() {
            break;
        }

        dispatch_due(&engine, &mut checks).await;

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = engine.wakeup().notified() => {}
            _ = tokio::time::sleep(poll_interval) => {}
            Some(res) = checks.join_next(), if !checks.is_empty() => log_join(res),
        }
    }

    if !checks.is_empty() {
        info!("[Monitor] Waiting for {} in-flight checks", checks.len());
    }
    while let Some(res) = checks.join_next().await {
        log_join(res);
    }
    info!("[Monitor] Stopped");
}

async fn dispatch_due<R, C>(engine: &Arc<PaymentEngine<R, C>>, checks: &mut JoinSet<()>)
where
    R: PaymentRepository,
    C: ChainClient,
{
    let due = match engine
        .repository()
        .get_due_payments(Utc::now(), engine.settings().batch_size)
        .await
    {
        Ok(due) => due,
        Err(e) => {
            error!("[Monitor] Error loading due payments: {}", e);
            return;
        }
    };

    for payment_id in due {
        let Some(lease) = engine.in_flight().try_acquire(payment_id) else {
            debug!("[Monitor] Payment {} already being checked", payment_id);
            continue;
        };

        let engine = engine.clone();
        checks.spawn(async move {
            let _lease = lease;
            let res: Result<CheckOutcome, PaymentError> = engine.check_payment(&payment_id).await;
            if let Err(e) = res {
                error!("[Monitor] Error checking payment {}: {}", payment_id, e);
            }
        });
    }
}

fn log_join(res: Result<(), JoinError>) {
    if let Err(e) = res {
        error!("[Monitor] Check task panicked: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_allows_one_lease_per_payment() {
        let registry = InFlightRegistry::default();
        let id = Uuid::new_v4();

        let lease = registry.try_acquire(id).expect("first lease");
        assert!(registry.try_acquire(id).is_none());
        assert!(registry.is_in_flight(&id));

        let other = registry.try_acquire(Uuid::new_v4());
        assert!(other.is_some());
        assert_eq!(registry.len(), 2);
        drop(other);

        drop(lease);
        assert!(!registry.is_in_flight(&id));
        assert!(registry.try_acquire(id).is_some());
    }
}
