use crate::domain::ledger::{Amount, Balance, Points, Withdrawal};
use crate::domain::order::{Order, OrderNumber, OrderStatus};
use crate::domain::ports::LedgerStore;
use crate::domain::user::{User, UserId};
use crate::error::{LoyaltyError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family for users keyed by id.
pub const CF_USERS: &str = "users";
/// Column Family mapping logins to user ids.
pub const CF_LOGINS: &str = "logins";
/// Column Family for orders keyed by order number.
pub const CF_ORDERS: &str = "orders";
/// Column Family indexing each user's orders, keyed by `user id ++ order number`.
pub const CF_USER_ORDERS: &str = "user_orders";
/// Column Family for balances keyed by user id.
pub const CF_BALANCES: &str = "balances";
/// Column Family for withdrawals keyed by `user id ++ timestamp ++ random suffix`.
pub const CF_WITHDRAWALS: &str = "withdrawals";

const ALL_CFS: [&str; 6] = [
    CF_USERS,
    CF_LOGINS,
    CF_ORDERS,
    CF_USER_ORDERS,
    CF_BALANCES,
    CF_WITHDRAWALS,
];

/// A persistent ledger store backed by RocksDB.
///
/// Mutations take `write_lock`, read what they need, and commit every row they
/// touch in a single `WriteBatch`, so each call is atomic and serialized
/// against the others. Reads go straight to the database.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating any
    /// missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            LoyaltyError::InternalError(format!("{} column family not found", name))
        })
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_pinned_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        let cf = self.cf(cf_name)?;
        batch.put_cf(cf, key, serde_json::to_vec(value)?);
        Ok(())
    }

    /// Visits every `(key, value)` whose key starts with `prefix`, in key order.
    fn scan_prefix(
        &self,
        cf_name: &str,
        prefix: &[u8],
        mut visit: impl FnMut(&[u8], &[u8]) -> Result<()>,
    ) -> Result<()> {
        let cf = self.cf(cf_name)?;
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            visit(&key, &value)?;
        }
        Ok(())
    }

    fn scan_json<T: DeserializeOwned>(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<T>> {
        let mut values = Vec::new();
        self.scan_prefix(cf_name, prefix, |_, value| {
            values.push(serde_json::from_slice(value)?);
            Ok(())
        })?;
        Ok(values)
    }

    fn load_order(&self, user_id: UserId, number: &OrderNumber) -> Result<Order> {
        self.get_json::<Order>(CF_ORDERS, number.as_str().as_bytes())?
            .filter(|order| order.user_id == user_id)
            .ok_or(LoyaltyError::NotFound)
    }

    fn load_balance(&self, user_id: UserId) -> Result<Balance> {
        self.get_json(CF_BALANCES, user_id.as_bytes())?
            .ok_or(LoyaltyError::NotFound)
    }
}

fn user_order_key(user_id: UserId, number: &OrderNumber) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + number.as_str().len());
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(number.as_str().as_bytes());
    key
}

fn withdrawal_key(withdrawal: &Withdrawal) -> Vec<u8> {
    let nanos = withdrawal
        .processed_at
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .max(0) as u64;
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(withdrawal.user_id.as_bytes());
    key.extend_from_slice(&nanos.to_be_bytes());
    key.extend_from_slice(Uuid::new_v4().as_bytes());
    key
}

#[async_trait]
impl LedgerStore for RocksDBStore {
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<UserId> {
        let _guard = self.write_lock.lock().await;
        let logins = self.cf(CF_LOGINS)?;
        if self.db.get_pinned_cf(logins, login.as_bytes())?.is_some() {
            return Err(LoyaltyError::Exists);
        }

        let id = UserId::new();
        let user = User {
            id,
            login: login.to_string(),
            password_hash: password_hash.to_string(),
        };
        let mut batch = WriteBatch::default();
        batch.put_cf(logins, login.as_bytes(), id.as_bytes());
        self.put_json(&mut batch, CF_USERS, id.as_bytes(), &user)?;
        self.put_json(&mut batch, CF_BALANCES, id.as_bytes(), &Balance::default())?;
        self.db.write(batch)?;
        Ok(id)
    }

    async fn get_user(&self, login: &str) -> Result<User> {
        let logins = self.cf(CF_LOGINS)?;
        let id = self
            .db
            .get_pinned_cf(logins, login.as_bytes())?
            .ok_or(LoyaltyError::NotFound)?;
        self.get_json(CF_USERS, &id)?.ok_or(LoyaltyError::NotFound)
    }

    async fn create_order(&self, user_id: UserId, number: &OrderNumber) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let key = number.as_str().as_bytes();
        if let Some(existing) = self.get_json::<Order>(CF_ORDERS, key)? {
            return Err(if existing.user_id == user_id {
                LoyaltyError::Exists
            } else {
                LoyaltyError::Conflict
            });
        }

        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_ORDERS, key, &Order::new(number.clone(), user_id))?;
        batch.put_cf(self.cf(CF_USER_ORDERS)?, user_order_key(user_id, number), b"");
        self.db.write(batch)?;
        Ok(())
    }

    async fn update_order(
        &self,
        user_id: UserId,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Points,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut order = self.load_order(user_id, number)?;
        if !order.status.can_advance_to(status) {
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        if status == OrderStatus::Processed {
            let mut balance = self.load_balance(user_id)?;
            balance.credit(accrual);
            order.accrual = Some(accrual);
            self.put_json(&mut batch, CF_BALANCES, user_id.as_bytes(), &balance)?;
        }
        order.status = status;
        self.put_json(&mut batch, CF_ORDERS, number.as_str().as_bytes(), &order)?;
        self.db.write(batch)?;
        Ok(true)
    }

    async fn get_order(&self, user_id: UserId, number: &OrderNumber) -> Result<Order> {
        self.load_order(user_id, number)
    }

    async fn get_orders(&self, user_id: UserId) -> Result<Vec<Order>> {
        let prefix = user_id.as_bytes();
        let mut orders = Vec::new();
        self.scan_prefix(CF_USER_ORDERS, prefix, |key, _| {
            let order = self
                .get_json::<Order>(CF_ORDERS, &key[prefix.len()..])?
                .ok_or_else(|| {
                    LoyaltyError::InternalError("order index points at a missing order".to_string())
                })?;
            orders.push(order);
            Ok(())
        })?;
        orders.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(orders)
    }

    async fn get_balance(&self, user_id: UserId) -> Result<Balance> {
        self.load_balance(user_id)
    }

    async fn withdraw(&self, user_id: UserId, order: &OrderNumber, amount: Amount) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut balance = self.load_balance(user_id)?;
        balance.debit(amount)?;

        let withdrawal = Withdrawal {
            user_id,
            order: order.clone(),
            sum: amount.into(),
            processed_at: Utc::now(),
        };
        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_BALANCES, user_id.as_bytes(), &balance)?;
        self.put_json(
            &mut batch,
            CF_WITHDRAWALS,
            &withdrawal_key(&withdrawal),
            &withdrawal,
        )?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn get_withdrawals(&self, user_id: UserId) -> Result<Vec<Withdrawal>> {
        let mut withdrawals: Vec<Withdrawal> =
            self.scan_json(CF_WITHDRAWALS, user_id.as_bytes())?;
        withdrawals.reverse();
        Ok(withdrawals)
    }
}
