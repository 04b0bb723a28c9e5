use super::accrual::AccrualClient;
use super::cancellation::{CancellationSignal, CancellationToken};
use super::updater::LedgerUpdater;
use crate::domain::order::{OrderNumber, OrderStatus};
use crate::domain::ports::LedgerStoreRef;
use crate::domain::user::UserId;
use crate::error::{LoyaltyError, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Default wait between polls while the service reports a non-terminal status.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Result of [`Dispatcher::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Spawned,
    /// A task for this order is already running in this process.
    AlreadyInFlight,
}

/// Spawns and supervises one reconciliation task per order.
///
/// All tasks share one cancellation signal owned by the dispatcher.
/// [`Dispatcher::shutdown`] raises it and waits until the in-flight set is
/// empty, so no ledger write can happen after it returns. Task handles never
/// leave the dispatcher; waiting is done on the in-flight set, which a task
/// only leaves once it has exited.
pub struct Dispatcher {
    client: Arc<AccrualClient>,
    updater: LedgerUpdater,
    poll_interval: Duration,
    signal: CancellationSignal,
    tasks: Mutex<JoinSet<()>>,
    in_flight: Arc<watch::Sender<HashSet<OrderNumber>>>,
}

impl Dispatcher {
    pub fn new(store: LedgerStoreRef, client: AccrualClient) -> Self {
        Self {
            client: Arc::new(client),
            updater: LedgerUpdater::new(store),
            poll_interval: DEFAULT_POLL_INTERVAL,
            signal: CancellationSignal::new(),
            tasks: Mutex::new(JoinSet::new()),
            in_flight: Arc::new(watch::Sender::new(HashSet::new())),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Starts reconciling `number` on its own task.
    ///
    /// Must be called from within a tokio runtime. Fails with `Cancelled`
    /// once [`Dispatcher::shutdown`] has begun.
    pub fn dispatch(&self, user_id: UserId, number: OrderNumber) -> Result<Dispatch> {
        let mut tasks = lock(&self.tasks)?;
        if self.signal.is_cancelled() {
            return Err(LoyaltyError::Cancelled);
        }
        reap_finished(&mut tasks);

        if !self
            .in_flight
            .send_if_modified(|set| set.insert(number.clone()))
        {
            debug!(order = %number, "reconciliation already in flight");
            return Ok(Dispatch::AlreadyInFlight);
        }

        let span = info_span!("reconcile", order = %number, user = %user_id);
        let task = ReconcileTask {
            client: self.client.clone(),
            updater: self.updater.clone(),
            poll_interval: self.poll_interval,
            token: self.signal.token(),
            user_id,
            _guard: InFlightGuard {
                set: self.in_flight.clone(),
                number: number.clone(),
            },
            number,
        };
        tasks.spawn(task.run().instrument(span));
        Ok(Dispatch::Spawned)
    }

    /// Number of tasks that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.borrow().len()
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// Waits for every outstanding task to finish on its own.
    ///
    /// Dropping the returned future leaves the tasks running.
    pub async fn drain(&self) -> Result<()> {
        self.wait_idle().await?;
        reap_finished(&mut *lock(&self.tasks)?);
        Ok(())
    }

    /// Raises the cancellation signal without waiting. Running tasks stop at
    /// their next check; further dispatches fail.
    pub fn cancel(&self) -> Result<()> {
        let _guard = lock(&self.tasks)?;
        self.signal.cancel();
        Ok(())
    }

    /// Cancels every outstanding task and waits until all of them have exited.
    ///
    /// Safe to call while [`Dispatcher::drain`] is waiting; both return only
    /// once the in-flight set is empty.
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel()?;
        info!(tasks = self.in_flight(), "shutting down reconciliation");
        self.wait_idle().await?;

        // Every task is past its last ledger write; collect the handles.
        let mut tasks = std::mem::take(&mut *lock(&self.tasks)?);
        join_all(&mut tasks).await;
        info!("reconciliation stopped");
        Ok(())
    }

    async fn wait_idle(&self) -> Result<()> {
        let mut rx = self.in_flight.subscribe();
        rx.wait_for(|set| set.is_empty())
            .await
            .map(|_| ())
            .map_err(|_| LoyaltyError::InternalError("in-flight set closed".to_string()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| LoyaltyError::InternalError("dispatcher lock poisoned".to_string()))
}

fn reap_finished(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        log_join_error(result);
    }
}

async fn join_all(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        log_join_error(result);
    }
}

fn log_join_error(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(join_err) = result
        && join_err.is_panic()
    {
        error!("reconciliation task panicked: {:?}", join_err);
    }
}

/// Removes the order from the in-flight set however the task ends, waking
/// anyone waiting in `drain` or `shutdown`.
struct InFlightGuard {
    set: Arc<watch::Sender<HashSet<OrderNumber>>>,
    number: OrderNumber,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.send_modify(|set| {
            set.remove(&self.number);
        });
    }
}

struct ReconcileTask {
    client: Arc<AccrualClient>,
    updater: LedgerUpdater,
    poll_interval: Duration,
    token: CancellationToken,
    user_id: UserId,
    number: OrderNumber,
    _guard: InFlightGuard,
}

impl ReconcileTask {
    async fn run(self) {
        match self.reconcile().await {
            Ok(status) => info!(%status, "order reconciled"),
            Err(LoyaltyError::Cancelled) => info!("reconciliation cancelled"),
            Err(e) if e.is_internal() => {
                error!(error = %e, "reconciliation failed, order left in its last committed status")
            }
            Err(e) => warn!(error = %e, "reconciliation aborted"),
        }
    }

    /// Polls until the service gives a terminal answer, then commits it.
    async fn reconcile(&self) -> Result<OrderStatus> {
        let status = self.updater.mark_processing(self.user_id, &self.number).await?;
        if status.is_terminal() {
            return Ok(status);
        }

        loop {
            let answer = self.client.get_order_info(&self.number, &self.token).await?;
            if answer.status.is_terminal() {
                return self.updater.apply(self.user_id, &self.number, &answer).await;
            }
            debug!(external = ?answer.status, "order not final yet");
            self.client.pause(self.poll_interval, &self.token).await?;
        }
    }
}
