use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::{
    error::RepositoryError,
    log::LogTypes,
    repositories::models::{
        order::Order,
        payment::{NewPayment, Payment},
    },
};

/// Read access to payments and orders plus the entry point for units of work.
///
/// Every write goes through a [`PaymentTransaction`] so that a payment and its
/// order are always changed together.
#[async_trait]
pub trait PaymentRepository
where
    Self: Clone + Send + Sync + 'static,
{
    type Transaction: PaymentTransaction;

    async fn begin(&self) -> Result<Self::Transaction, RepositoryError>;

    async fn get_order(&self, order_id: i64) -> Result<Option<Order>, RepositoryError>;

    async fn get_payment(&self, payment_id: &Uuid) -> Result<Option<Payment>, RepositoryError>;

    async fn get_payment_by_hash(
        &self,
        transaction_hash: &str,
    ) -> Result<Option<Payment>, RepositoryError>;

    /// Pending payments with a transaction hash whose next check is due.
    async fn get_due_payments(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, RepositoryError>;
}

/// An open unit of work. Rows returned by the `lock_*` methods stay locked
/// until the transaction ends; dropping it without [`commit`] rolls back.
///
/// [`commit`]: PaymentTransaction::commit
#[async_trait]
pub trait PaymentTransaction
where
    Self: Send,
{
    async fn lock_order(&mut self, order_id: i64) -> Result<Option<Order>, RepositoryError>;

    async fn lock_payment(&mut self, payment_id: &Uuid)
        -> Result<Option<Payment>, RepositoryError>;

    async fn find_payment_by_hash(
        &mut self,
        transaction_hash: &str,
    ) -> Result<Option<Payment>, RepositoryError>;

    /// The order's payment that has not failed, if any.
    async fn find_active_payment(
        &mut self,
        order_id: i64,
    ) -> Result<Option<Payment>, RepositoryError>;

    async fn insert_payment(&mut self, payment: &NewPayment) -> Result<Payment, RepositoryError>;

    async fn update_payment(&mut self, payment: &Payment) -> Result<(), RepositoryError>;

    async fn update_order(&mut self, order: &Order) -> Result<(), RepositoryError>;

    async fn add_log(
        &mut self,
        payment_id: &Uuid,
        log_type: LogTypes,
        log_data: Option<&str>,
    ) -> Result<(), RepositoryError>;

    async fn commit(self) -> Result<(), RepositoryError>
    where
        Self: Sized;
}
