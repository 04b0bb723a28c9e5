use crate::domain::ledger::{Amount, Balance, Points, Withdrawal};
use crate::domain::order::{Order, OrderNumber, OrderStatus};
use crate::domain::ports::LedgerStore;
use crate::domain::user::{User, UserId};
use crate::error::{LoyaltyError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    logins: HashMap<String, UserId>,
    orders: HashMap<OrderNumber, Order>,
    balances: HashMap<UserId, Balance>,
    withdrawals: Vec<Withdrawal>,
}

/// A thread-safe in-memory ledger store.
///
/// All tables sit behind one `RwLock`; holding the write guard for the whole
/// of a mutating call is what makes each call a transaction. The `orders` map
/// keyed by number is the uniqueness constraint for order numbers.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryLedgerStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<UserId> {
        let mut tables = self.tables.write().await;
        if tables.logins.contains_key(login) {
            return Err(LoyaltyError::Exists);
        }
        let id = UserId::new();
        tables.logins.insert(login.to_string(), id);
        tables.users.insert(
            id,
            User {
                id,
                login: login.to_string(),
                password_hash: password_hash.to_string(),
            },
        );
        tables.balances.insert(id, Balance::default());
        Ok(id)
    }

    async fn get_user(&self, login: &str) -> Result<User> {
        let tables = self.tables.read().await;
        tables
            .logins
            .get(login)
            .and_then(|id| tables.users.get(id))
            .cloned()
            .ok_or(LoyaltyError::NotFound)
    }

    async fn create_order(&self, user_id: UserId, number: &OrderNumber) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.orders.entry(number.clone()) {
            Entry::Occupied(existing) if existing.get().user_id == user_id => {
                Err(LoyaltyError::Exists)
            }
            Entry::Occupied(_) => Err(LoyaltyError::Conflict),
            Entry::Vacant(slot) => {
                slot.insert(Order::new(number.clone(), user_id));
                Ok(())
            }
        }
    }

    async fn update_order(
        &self,
        user_id: UserId,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Points,
    ) -> Result<bool> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;

        let order = tables
            .orders
            .get_mut(number)
            .filter(|order| order.user_id == user_id)
            .ok_or(LoyaltyError::NotFound)?;
        if !order.status.can_advance_to(status) {
            return Ok(false);
        }

        if status == OrderStatus::Processed {
            let balance = tables.balances.entry(user_id).or_default();
            balance.credit(accrual);
            order.accrual = Some(accrual);
        }
        order.status = status;
        Ok(true)
    }

    async fn get_order(&self, user_id: UserId, number: &OrderNumber) -> Result<Order> {
        let tables = self.tables.read().await;
        tables
            .orders
            .get(number)
            .filter(|order| order.user_id == user_id)
            .cloned()
            .ok_or(LoyaltyError::NotFound)
    }

    async fn get_orders(&self, user_id: UserId) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|order| order.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(orders)
    }

    async fn get_balance(&self, user_id: UserId) -> Result<Balance> {
        let tables = self.tables.read().await;
        tables
            .balances
            .get(&user_id)
            .copied()
            .ok_or(LoyaltyError::NotFound)
    }

    async fn withdraw(&self, user_id: UserId, order: &OrderNumber, amount: Amount) -> Result<()> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;

        let balance = tables
            .balances
            .get_mut(&user_id)
            .ok_or(LoyaltyError::NotFound)?;
        balance.debit(amount)?;
        tables.withdrawals.push(Withdrawal {
            user_id,
            order: order.clone(),
            sum: amount.into(),
            processed_at: Utc::now(),
        });
        Ok(())
    }

    async fn get_withdrawals(&self, user_id: UserId) -> Result<Vec<Withdrawal>> {
        let tables = self.tables.read().await;
        Ok(tables
            .withdrawals
            .iter()
            .rev()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect())
    }
}
