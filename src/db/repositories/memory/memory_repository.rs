use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::db::{
    error::RepositoryError,
    log::LogTypes,
    repositories::models::{
        order::{Order, OrderPaymentStatus, OrderStatus},
        payment::{NewPayment, Payment, PaymentStatus, PAYMENT_CURRENCY},
    },
    PaymentRepository, PaymentTransaction,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    orders: HashMap<i64, Order>,
    payments: HashMap<Uuid, Payment>,
    logs: Vec<(Uuid, LogTypes, Option<String>)>,
}

/// Repository backed by a single mutex. A transaction holds the lock for its
/// whole lifetime and works on a copy that replaces the state on commit.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    state: Arc<Mutex<MemoryState>>,
    fail_order_updates: Arc<AtomicBool>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_order(&self, id: i64, total_amount: Decimal) -> Order {
        let order = Order {
            id,
            payment_status: OrderPaymentStatus::Pending,
            order_status: OrderStatus::Pending,
            total_amount,
            payment_transaction_id: None,
        };
        self.state.lock().await.orders.insert(id, order.clone());
        order
    }

    pub async fn put_order(&self, order: Order) {
        self.state.lock().await.orders.insert(order.id, order);
    }

    pub async fn put_payment(&self, payment: Payment) {
        self.state.lock().await.payments.insert(payment.id, payment);
    }

    pub async fn order(&self, id: i64) -> Option<Order> {
        self.state.lock().await.orders.get(&id).cloned()
    }

    pub async fn payment(&self, id: &Uuid) -> Option<Payment> {
        self.state.lock().await.payments.get(id).cloned()
    }

    pub async fn payment_count(&self) -> usize {
        self.state.lock().await.payments.len()
    }

    pub async fn logs(&self, payment_id: &Uuid) -> Vec<LogTypes> {
        self.state
            .lock()
            .await
            .logs
            .iter()
            .filter(|(id, _, _)| id == payment_id)
            .map(|(_, log_type, _)| *log_type)
            .collect()
    }

    /// Makes every subsequent order update inside a transaction fail.
    pub fn fail_order_updates(&self, fail: bool) {
        self.fail_order_updates.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentRepository for MemoryRepository {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> Result<Self::Transaction, RepositoryError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();

        Ok(MemoryTransaction {
            guard,
            staged,
            fail_order_updates: self.fail_order_updates.load(Ordering::SeqCst),
        })
    }

    async fn get_order(&self, order_id: i64) -> Result<Option<Order>, RepositoryError> {
        Ok(self.state.lock().await.orders.get(&order_id).cloned())
    }

    async fn get_payment(&self, payment_id: &Uuid) -> Result<Option<Payment>, RepositoryError> {
        Ok(self.state.lock().await.payments.get(payment_id).cloned())
    }

    async fn get_payment_by_hash(
        &self,
        transaction_hash: &str,
    ) -> Result<Option<Payment>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(find_by_hash(&state, transaction_hash))
    }

    async fn get_due_payments(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, RepositoryError> {
        let state = self.state.lock().await;
        let mut due = state
            .payments
            .values()
            .filter(|p| p.is_monitorable())
            .filter_map(|p| p.next_check_at.filter(|at| *at <= now).map(|at| (at, p.id)))
            .collect::<Vec<_>>();
        due.sort();

        Ok(due
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(_, id)| id)
            .collect())
    }
}

fn find_by_hash(state: &MemoryState, transaction_hash: &str) -> Option<Payment> {
    state
        .payments
        .values()
        .find(|p| p.transaction_hash.as_deref() == Some(transaction_hash))
        .cloned()
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
    fail_order_updates: bool,
}

#[async_trait]
impl PaymentTransaction for MemoryTransaction {
    async fn lock_order(&mut self, order_id: i64) -> Result<Option<Order>, RepositoryError> {
        Ok(self.staged.orders.get(&order_id).cloned())
    }

    async fn lock_payment(
        &mut self,
        payment_id: &Uuid,
    ) -> Result<Option<Payment>, RepositoryError> {
        Ok(self.staged.payments.get(payment_id).cloned())
    }

    async fn find_payment_by_hash(
        &mut self,
        transaction_hash: &str,
    ) -> Result<Option<Payment>, RepositoryError> {
        Ok(find_by_hash(&self.staged, transaction_hash))
    }

    async fn find_active_payment(
        &mut self,
        order_id: i64,
    ) -> Result<Option<Payment>, RepositoryError> {
        Ok(self
            .staged
            .payments
            .values()
            .find(|p| p.order_id == order_id && p.status != PaymentStatus::Failed)
            .cloned())
    }

    async fn insert_payment(&mut self, payment: &NewPayment) -> Result<Payment, RepositoryError> {
        if self
            .staged
            .payments
            .values()
            .any(|p| p.order_id == payment.order_id && p.status != PaymentStatus::Failed)
        {
            return Err(RepositoryError::UniqueViolation(
                "crypto_payments_active_order".to_string(),
            ));
        }

        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            order_id: payment.order_id,
            wallet_address_from: payment.wallet_address_from.clone(),
            wallet_address_to: payment.wallet_address_to.clone(),
            amount: payment.amount,
            currency: PAYMENT_CURRENCY.to_string(),
            transaction_hash: None,
            status: PaymentStatus::Pending,
            block_number: None,
            confirmation_count: 0,
            check_attempts: 0,
            next_check_at: None,
            created_at: now,
            updated_at: now,
        };
        self.staged.payments.insert(payment.id, payment.clone());

        Ok(payment)
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<(), RepositoryError> {
        if let Some(hash) = &payment.transaction_hash {
            if self
                .staged
                .payments
                .values()
                .any(|p| p.id != payment.id && p.transaction_hash.as_ref() == Some(hash))
            {
                return Err(RepositoryError::UniqueViolation(
                    "crypto_payments_transaction_hash_key".to_string(),
                ));
            }
        }

        let mut payment = payment.clone();
        payment.updated_at = Utc::now();
        self.staged.payments.insert(payment.id, payment);

        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), RepositoryError> {
        if self.fail_order_updates {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }

        self.staged.orders.insert(order.id, order.clone());

        Ok(())
    }

    async fn add_log(
        &mut self,
        payment_id: &Uuid,
        log_type: LogTypes,
        log_data: Option<&str>,
    ) -> Result<(), RepositoryError> {
        self.staged
            .logs
            .push((*payment_id, log_type, log_data.map(str::to_string)));

        Ok(())
    }

    async fn commit(mut self) -> Result<(), RepositoryError> {
        *self.guard = std::mem::take(&mut self.staged);

        Ok(())
    }
}
