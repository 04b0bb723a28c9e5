use super::dispatcher::{Dispatch, Dispatcher};
use crate::domain::ledger::{Amount, Balance, Withdrawal};
use crate::domain::order::{Order, OrderNumber};
use crate::domain::ports::LedgerStoreRef;
use crate::domain::user::UserId;
use crate::error::{LoyaltyError, Result};
use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use rand::rngs::OsRng;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Outcome of [`LoyaltyService::submit_order`]. Both are successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// New order stored and handed to reconciliation.
    Accepted,
    /// The same user had already submitted this number; nothing changed.
    AlreadySubmitted,
}

/// Entry point for whatever layer faces users (HTTP handlers, the batch CLI).
///
/// Owns the path from a raw request to the store and the dispatcher; the
/// dispatcher is shared so the caller can shut it down during termination.
pub struct LoyaltyService {
    store: LedgerStoreRef,
    dispatcher: Arc<Dispatcher>,
}

impl LoyaltyService {
    pub fn new(store: LedgerStoreRef, dispatcher: Arc<Dispatcher>) -> Self {
        Self { store, dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Registers a user. `Exists` if the login is taken.
    #[instrument(skip(self, password))]
    pub async fn register(&self, login: &str, password: &str) -> Result<UserId> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| LoyaltyError::InternalError(format!("hashing failed: {}", e)))?
            .to_string();
        let id = self.store.create_user(login, &password_hash).await?;
        info!(user = %id, "user registered");
        Ok(id)
    }

    /// Resolves credentials to a user id. Unknown login and wrong password
    /// are both `NotFound`.
    #[instrument(skip(self, password))]
    pub async fn login(&self, login: &str, password: &str) -> Result<UserId> {
        let user = self.store.get_user(login).await?;
        let parsed = PasswordHash::new(&user.password_hash)
            .map_err(|e| LoyaltyError::InternalError(format!("invalid hash format: {}", e)))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| LoyaltyError::NotFound)?;
        Ok(user.id)
    }

    /// Stores a new order and starts reconciling it.
    ///
    /// A resubmission by the owner is `AlreadySubmitted`; a number owned by
    /// someone else is `Conflict`. Once reconciliation has been shut down
    /// nothing is stored and the call fails with `Cancelled`.
    #[instrument(skip(self))]
    pub async fn submit_order(&self, user_id: UserId, raw_number: &str) -> Result<Submission> {
        let number = OrderNumber::parse(raw_number)?;
        if self.dispatcher.is_cancelled() {
            return Err(LoyaltyError::Cancelled);
        }
        match self.store.create_order(user_id, &number).await {
            Ok(()) => {}
            Err(LoyaltyError::Exists) => return Ok(Submission::AlreadySubmitted),
            Err(e) => return Err(e),
        }
        info!(order = %number, "order accepted");
        // The row is committed, so the order is accepted either way.
        if let Err(e) = self.dispatcher.dispatch(user_id, number.clone()) {
            warn!(order = %number, error = %e, "order stored but not dispatched, retrigger it to reconcile");
        }
        Ok(Submission::Accepted)
    }

    /// Re-dispatches a stuck order. Terminal orders are left alone and
    /// reported as `None`.
    #[instrument(skip(self))]
    pub async fn retrigger(&self, user_id: UserId, raw_number: &str) -> Result<Option<Dispatch>> {
        let number = OrderNumber::parse(raw_number)?;
        let order = self.store.get_order(user_id, &number).await?;
        if order.status.is_terminal() {
            warn!(order = %number, status = %order.status, "order already final, not re-dispatching");
            return Ok(None);
        }
        self.dispatcher.dispatch(user_id, number).map(Some)
    }

    pub async fn order(&self, user_id: UserId, raw_number: &str) -> Result<Order> {
        let number = OrderNumber::parse(raw_number)?;
        self.store.get_order(user_id, &number).await
    }

    pub async fn orders(&self, user_id: UserId) -> Result<Vec<Order>> {
        self.store.get_orders(user_id).await
    }

    pub async fn balance(&self, user_id: UserId) -> Result<Balance> {
        self.store.get_balance(user_id).await
    }

    /// Spends points against a reference number. `NotEnoughMoney` leaves the
    /// ledger untouched.
    #[instrument(skip(self))]
    pub async fn withdraw(&self, user_id: UserId, raw_number: &str, sum: Decimal) -> Result<()> {
        let number = OrderNumber::parse(raw_number)?;
        let amount = Amount::new(sum)?;
        self.store.withdraw(user_id, &number, amount).await?;
        info!(order = %number, %sum, "points withdrawn");
        Ok(())
    }

    pub async fn withdrawals(&self, user_id: UserId) -> Result<Vec<Withdrawal>> {
        self.store.get_withdrawals(user_id).await
    }

    /// Waits for all reconciliation tasks to finish on their own.
    pub async fn drain(&self) -> Result<()> {
        self.dispatcher.drain().await
    }

    /// Cancels reconciliation and waits for every task to exit.
    pub async fn shutdown(&self) -> Result<()> {
        self.dispatcher.shutdown().await
    }
}
