use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use tracing::{debug, error};
use uuid::Uuid;

use crate::db::{
    error::RepositoryError,
    log::LogTypes,
    repositories::models::{
        order::Order,
        payment::{NewPayment, Payment, PAYMENT_CURRENCY},
    },
    PaymentRepository, PaymentTransaction,
};

const PAYMENT_COLUMNS: &str = "id, order_id, wallet_address_from, wallet_address_to, amount, \
     currency, transaction_hash, status, block_number, confirmation_count, check_attempts, \
     next_check_at, created_at, updated_at";

/// `orders.id` is an INTEGER in the storefront schema; widen it for `i64`.
const ORDER_COLUMNS: &str =
    "id::BIGINT AS id, payment_status, order_status, total_amount, payment_transaction_id";

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    order_id: i64,
    wallet_address_from: String,
    wallet_address_to: String,
    amount: Decimal,
    currency: String,
    transaction_hash: Option<String>,
    status: String,
    block_number: Option<i64>,
    confirmation_count: i64,
    check_attempts: i32,
    next_check_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = RepositoryError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            order_id: row.order_id,
            wallet_address_from: row.wallet_address_from,
            wallet_address_to: row.wallet_address_to,
            amount: row.amount,
            currency: row.currency,
            transaction_hash: row.transaction_hash,
            status: row.status.parse().map_err(RepositoryError::CorruptRow)?,
            block_number: row.block_number,
            confirmation_count: row.confirmation_count,
            check_attempts: row.check_attempts,
            next_check_at: row.next_check_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    payment_status: String,
    order_status: String,
    total_amount: Decimal,
    payment_transaction_id: Option<String>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            payment_status: row
                .payment_status
                .parse()
                .map_err(RepositoryError::CorruptRow)?,
            order_status: row.order_status.parse().map_err(RepositoryError::CorruptRow)?,
            total_amount: row.total_amount,
            payment_transaction_id: row.payment_transaction_id,
        })
    }
}

#[derive(Clone)]
pub struct SqlxPostgresqlRepository {
    pool: PgPool,
}

impl SqlxPostgresqlRepository {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, RepositoryError> {
        debug!("[DB] Connecting to database");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        debug!("[DB] Connected to database");

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        debug!("[DB] Running migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        debug!("[DB] Migrations applied");

        Ok(())
    }
}

#[async_trait]
impl PaymentRepository for SqlxPostgresqlRepository {
    type Transaction = SqlxPostgresqlTransaction;

    async fn begin(&self) -> Result<Self::Transaction, RepositoryError> {
        let tx = self.pool.begin().await.map_err(|e| {
            error!("[DB] Failed to begin transaction: {}", e);
            e
        })?;

        Ok(SqlxPostgresqlTransaction { tx })
    }

    async fn get_order(&self, order_id: i64) -> Result<Option<Order>, RepositoryError> {
        debug!("[DB] Getting order {}", order_id);

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE id = $1;",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("[DB] Failed to get order {}", order_id);
            e
        })?;

        row.map(Order::try_from).transpose()
    }

    async fn get_payment(&self, payment_id: &Uuid) -> Result<Option<Payment>, RepositoryError> {
        debug!("[DB] Getting payment {}", payment_id);

        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM crypto_payments WHERE id = $1;",
            PAYMENT_COLUMNS
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("[DB] Failed to get payment {}", payment_id);
            e
        })?;

        if row.is_none() {
            debug!("[DB] Payment {} not found", payment_id);
        }

        row.map(Payment::try_from).transpose()
    }

    async fn get_payment_by_hash(
        &self,
        transaction_hash: &str,
    ) -> Result<Option<Payment>, RepositoryError> {
        debug!("[DB] Getting payment by transaction {}", transaction_hash);

        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM crypto_payments WHERE transaction_hash = $1;",
            PAYMENT_COLUMNS
        ))
        .bind(transaction_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "[DB] Failed to get payment by transaction {}",
                transaction_hash
            );
            e
        })?;

        row.map(Payment::try_from).transpose()
    }

    async fn get_due_payments(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, RepositoryError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"SELECT id FROM crypto_payments
               WHERE status = 'pending'
                 AND transaction_hash IS NOT NULL
                 AND next_check_at IS NOT NULL
                 AND next_check_at <= $1
               ORDER BY next_check_at
               LIMIT $2;"#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("[DB] Failed to get due payments");
            e
        })?;

        if !ids.is_empty() {
            debug!("[DB] Got due payments {:?}", ids);
        }

        Ok(ids)
    }
}

pub struct SqlxPostgresqlTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl PaymentTransaction for SqlxPostgresqlTransaction {
    async fn lock_order(&mut self, order_id: i64) -> Result<Option<Order>, RepositoryError> {
        debug!("[DB] Locking order {}", order_id);

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE id = $1 FOR UPDATE;",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn lock_payment(
        &mut self,
        payment_id: &Uuid,
    ) -> Result<Option<Payment>, RepositoryError> {
        debug!("[DB] Locking payment {}", payment_id);

        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM crypto_payments WHERE id = $1 FOR UPDATE;",
            PAYMENT_COLUMNS
        ))
        .bind(payment_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_payment_by_hash(
        &mut self,
        transaction_hash: &str,
    ) -> Result<Option<Payment>, RepositoryError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM crypto_payments WHERE transaction_hash = $1;",
            PAYMENT_COLUMNS
        ))
        .bind(transaction_hash)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_active_payment(
        &mut self,
        order_id: i64,
    ) -> Result<Option<Payment>, RepositoryError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM crypto_payments WHERE order_id = $1 AND status <> 'failed';",
            PAYMENT_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Payment::try_from).transpose()
    }

    async fn insert_payment(&mut self, payment: &NewPayment) -> Result<Payment, RepositoryError> {
        debug!("[DB] Creating payment for order {}", payment.order_id);

        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            r#"INSERT INTO crypto_payments
                   (id, order_id, wallet_address_from, wallet_address_to, amount, currency, status)
               VALUES ($1, $2, $3, $4, $5, $6, 'pending')
               RETURNING {};"#,
            PAYMENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(payment.order_id)
        .bind(&payment.wallet_address_from)
        .bind(&payment.wallet_address_to)
        .bind(payment.amount)
        .bind(PAYMENT_CURRENCY)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            error!("[DB] Failed to create payment for order {}", payment.order_id);
            e
        })?;

        let payment = Payment::try_from(row)?;
        debug!(
            "[DB] Created payment {} for order {}",
            payment.id, payment.order_id
        );

        Ok(payment)
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<(), RepositoryError> {
        debug!(
            "[DB] Updating payment {} status={} confirmations={}",
            payment.id, payment.status, payment.confirmation_count
        );

        sqlx::query(
            r#"UPDATE crypto_payments
               SET transaction_hash = $2,
                   status = $3,
                   block_number = $4,
                   confirmation_count = $5,
                   check_attempts = $6,
                   next_check_at = $7,
                   updated_at = NOW()
               WHERE id = $1;"#,
        )
        .bind(payment.id)
        .bind(&payment.transaction_hash)
        .bind(payment.status.as_str())
        .bind(payment.block_number)
        .bind(payment.confirmation_count)
        .bind(payment.check_attempts)
        .bind(payment.next_check_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            error!("[DB] Failed to update payment {}", payment.id);
            e
        })?;

        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), RepositoryError> {
        debug!(
            "[DB] Updating order {} payment_status={} order_status={}",
            order.id, order.payment_status, order.order_status
        );

        sqlx::query(
            r#"UPDATE orders
               SET payment_status = $2,
                   order_status = $3,
                   payment_transaction_id = $4,
                   updated_at = NOW()
               WHERE id = $1;"#,
        )
        .bind(order.id)
        .bind(order.payment_status.as_str())
        .bind(order.order_status.as_str())
        .bind(&order.payment_transaction_id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            error!("[DB] Failed to update order {}", order.id);
            e
        })?;

        Ok(())
    }

    async fn add_log(
        &mut self,
        payment_id: &Uuid,
        log_type: LogTypes,
        log_data: Option<&str>,
    ) -> Result<(), RepositoryError> {
        debug!("[DB] Adding log {} {:?} {:?}", payment_id, log_type, log_data);

        let action: &str = log_type.into();
        sqlx::query(r#"INSERT INTO payment_logs (payment_id, action, data) VALUES ($1, $2, $3);"#)
            .bind(payment_id)
            .bind(action)
            .bind(log_data)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                error!("[DB] Failed to add log {} {:?}", payment_id, log_type);
                e
            })?;

        Ok(())
    }

    async fn commit(self) -> Result<(), RepositoryError> {
        self.tx.commit().await.map_err(|e| {
            error!("[DB] Failed to commit transaction: {}", e);
            e
        })?;

        Ok(())
    }
}
