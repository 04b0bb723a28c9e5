use crate::domain::ledger::Points;
use crate::domain::order::{AccrualOrder, AccrualStatus, OrderNumber, OrderStatus};
use crate::domain::ports::LedgerStoreRef;
use crate::domain::user::UserId;
use crate::error::Result;
use tracing::{debug, info};

/// Outcome of the order state machine for one accrual answer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// Nothing to write.
    Stay,
    /// Write `status`; `accrual` is only non-zero for `PROCESSED`.
    Advance { status: OrderStatus, accrual: Points },
}

/// Pure transition function of the order state machine.
///
/// ```text
/// NEW ──► PROCESSING ──► PROCESSED (credit once)
///              │
///              └──────► INVALID
/// ```
/// REGISTERED and PROCESSING answers keep the order in PROCESSING. Terminal
/// orders never move.
pub fn transition(
    current: OrderStatus,
    external: AccrualStatus,
    accrual: Option<Points>,
) -> Transition {
    let next = match external {
        AccrualStatus::Registered | AccrualStatus::Processing => OrderStatus::Processing,
        AccrualStatus::Invalid => OrderStatus::Invalid,
        AccrualStatus::Processed => OrderStatus::Processed,
    };
    if !current.can_advance_to(next) {
        return Transition::Stay;
    }
    let accrual = match next {
        OrderStatus::Processed => accrual.unwrap_or(Points::ZERO),
        _ => Points::ZERO,
    };
    Transition::Advance {
        status: next,
        accrual,
    }
}

/// Applies accrual answers to the ledger, one store transaction per answer.
///
/// Safe to call repeatedly with the same answer: the store refuses to move an
/// order out of a terminal status, so a balance is credited at most once.
#[derive(Clone)]
pub struct LedgerUpdater {
    store: LedgerStoreRef,
}

impl LedgerUpdater {
    pub fn new(store: LedgerStoreRef) -> Self {
        Self { store }
    }

    /// NEW → PROCESSING when reconciliation starts. Returns the resulting status.
    pub async fn mark_processing(&self, user_id: UserId, number: &OrderNumber) -> Result<OrderStatus> {
        let order = self.store.get_order(user_id, number).await?;
        if order.status != OrderStatus::New {
            return Ok(order.status);
        }
        self.store
            .update_order(user_id, number, OrderStatus::Processing, Points::ZERO)
            .await?;
        debug!(order = %number, "order moved to PROCESSING");
        Ok(OrderStatus::Processing)
    }

    /// Merges one accrual answer and returns the order's resulting status.
    pub async fn apply(
        &self,
        user_id: UserId,
        number: &OrderNumber,
        answer: &AccrualOrder,
    ) -> Result<OrderStatus> {
        let order = self.store.get_order(user_id, number).await?;
        match transition(order.status, answer.status, answer.accrual) {
            Transition::Stay => Ok(order.status),
            Transition::Advance { status, accrual } => {
                let changed = self
                    .store
                    .update_order(user_id, number, status, accrual)
                    .await?;
                if changed {
                    info!(order = %number, user = %user_id, %status, %accrual, "order updated");
                    Ok(status)
                } else {
                    // Lost a race with another writer; report what is stored.
                    Ok(self.store.get_order(user_id, number).await?.status)
                }
            }
        }
    }
}
