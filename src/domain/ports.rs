use super::ledger::{Amount, Balance, Points, Withdrawal};
use super::order::{Order, OrderNumber, OrderStatus};
use super::user::{User, UserId};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Transactional persistence for users, orders, balances and withdrawals.
///
/// Every mutating method is one transaction: it either commits all of its
/// effects or none of them.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fails with `Exists` if the login is taken. Creates an empty balance.
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<UserId>;
    /// Looks a user up by login; `NotFound` if there is none.
    async fn get_user(&self, login: &str) -> Result<User>;

    /// Inserts a `NEW` order.
    ///
    /// Uniqueness of the number is enforced here: `Exists` if `user_id`
    /// already owns it, `Conflict` if another user does.
    async fn create_order(&self, user_id: UserId, number: &OrderNumber) -> Result<()>;
    /// Moves the order to `status`.
    ///
    /// Backward moves and moves out of a terminal status are ignored. On the
    /// first transition into `PROCESSED` the accrual is recorded on the order
    /// and added to the owner's balance. Returns whether the order changed.
    async fn update_order(
        &self,
        user_id: UserId,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Points,
    ) -> Result<bool>;
    async fn get_order(&self, user_id: UserId, number: &OrderNumber) -> Result<Order>;
    /// Newest first.
    async fn get_orders(&self, user_id: UserId) -> Result<Vec<Order>>;

    async fn get_balance(&self, user_id: UserId) -> Result<Balance>;
    /// `NotEnoughMoney` leaves both balance and history untouched.
    async fn withdraw(&self, user_id: UserId, order: &OrderNumber, amount: Amount) -> Result<()>;
    /// Newest first.
    async fn get_withdrawals(&self, user_id: UserId) -> Result<Vec<Withdrawal>>;
}

/// Raw answer of the accrual service, before protocol interpretation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AccrualReply {
    pub status: u16,
    pub retry_after: Option<String>,
    pub body: Vec<u8>,
}

/// Issues `GET {base}/api/orders/{number}`.
#[async_trait]
pub trait AccrualTransport: Send + Sync {
    async fn fetch(&self, number: &OrderNumber) -> Result<AccrualReply>;
}

/// Source of delays for the polling loop.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub type LedgerStoreRef = Arc<dyn LedgerStore>;
pub type AccrualTransportRef = Arc<dyn AccrualTransport>;
pub type SleeperRef = Arc<dyn Sleeper>;
