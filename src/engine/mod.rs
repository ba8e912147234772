//! Crypto payment confirmation.
//!
//! A payment is created `pending` without a transaction hash. Attaching a hash
//! schedules it for monitoring; the [`monitor`] worker then calls
//! [`PaymentEngine::check_payment`] until the transaction is confirmed,
//! reverted, or the check budget runs out (`unconfirmed`). The verify webhook
//! applies the same rules synchronously.

pub mod error;
pub mod monitor;
pub mod transition;


use std::time::Duration;

use chrono::Utc;
use futures::future::try_join;
use rust_decimal::Decimal;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    db::{
        log::LogTypes,
        repositories::models::{
            order::OrderPaymentStatus,
            payment::{NewPayment, Payment, PaymentStatus},
        },
        PaymentRepository, PaymentTransaction, RepositoryError,
    },
    ethereum::{ChainClient, Receipt},
    utils::validation::{is_valid_address, normalize_transaction_hash},
};

pub use error::{ErrorKind, PaymentError};
use monitor::InFlightRegistry;
use transition::Evaluation;

pub const REQUIRED_CONFIRMATIONS: u64 = 12;
pub const RECHECK_DELAY: Duration = Duration::from_secs(5);
pub const MAX_CHECK_ATTEMPTS: i32 = 3;
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DUE_BATCH_SIZE: i64 = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub required_confirmations: u64,
    pub recheck_delay: Duration,
    /// Checks without a usable receipt before a payment becomes `unconfirmed`.
    pub max_check_attempts: i32,
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub platform_wallet: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            required_confirmations: REQUIRED_CONFIRMATIONS,
            recheck_delay: RECHECK_DELAY,
            max_check_attempts: MAX_CHECK_ATTEMPTS,
            poll_interval: POLL_INTERVAL,
            batch_size: DUE_BATCH_SIZE,
            platform_wallet: None,
        }
    }
}

/// Read-only projection returned by the status endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentView {
    pub id: Uuid,
    pub status: PaymentStatus,
    pub transaction_hash: Option<String>,
    pub confirmation_count: i64,
    pub amount: Decimal,
    pub currency: String,
}

impl From<Payment> for PaymentView {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            status: payment.status,
            transaction_hash: payment.transaction_hash,
            confirmation_count: payment.confirmation_count,
            amount: payment.amount,
            currency: payment.currency,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationResult {
    pub confirmations: u64,
    pub required: u64,
    pub status: PaymentStatus,
}

impl VerificationResult {
    pub fn is_confirmed(&self) -> bool {
        self.status == PaymentStatus::Confirmed
    }
}

/// What a single monitor check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The payment is not monitorable any more (settled, re-hashed or gone).
    Skipped,
    NotMined { attempts: i32 },
    AwaitingDepth { confirmations: u64 },
    Confirmed { confirmations: u64 },
    Failed,
    GaveUp { attempts: i32 },
}

enum Observation {
    Mined { receipt: Receipt, current_block: u64 },
    NotMined,
    Unavailable,
}

pub struct PaymentEngine<R, C> {
    repository: R,
    chain: C,
    settings: EngineSettings,
    wakeup: Notify,
    in_flight: InFlightRegistry,
}

impl<R, C> PaymentEngine<R, C>
where
    R: PaymentRepository,
    C: ChainClient,
{
    pub fn new(repository: R, chain: C, settings: EngineSettings) -> Self {
        Self {
            repository,
            chain,
            settings,
            wakeup: Notify::new(),
            in_flight: InFlightRegistry::default(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub(crate) fn in_flight(&self) -> &InFlightRegistry {
        &self.in_flight
    }

    pub(crate) fn wakeup(&self) -> &Notify {
        &self.wakeup
    }

    fn platform_wallet(&self) -> Result<&str, PaymentError> {
        match self.settings.platform_wallet.as_deref() {
            Some(address) if is_valid_address(address) => Ok(address),
            _ => Err(PaymentError::MisconfiguredPlatformWallet),
        }
    }

    fn next_check_at(&self) -> chrono::DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.settings.recheck_delay)
            .unwrap_or_else(|_| chrono::Duration::seconds(5));
        Utc::now() + delay
    }

    pub async fn create_payment(
        &self,
        order_id: i64,
        wallet_address_from: &str,
    ) -> Result<Payment, PaymentError> {
        if !is_valid_address(wallet_address_from) {
            return Err(PaymentError::InvalidAddress(wallet_address_from.to_string()));
        }
        let wallet_address_to = self.platform_wallet()?.to_string();

        let mut tx = self.repository.begin().await?;

        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound(order_id))?;
        if order.payment_status == OrderPaymentStatus::Completed {
            return Err(PaymentError::OrderAlreadyPaid(order_id));
        }
        if let Some(active) = tx.find_active_payment(order_id).await? {
            return Err(PaymentError::PaymentInProgress {
                order_id,
                payment_id: active.id,
            });
        }

        let payment = tx
            .insert_payment(&NewPayment {
                order_id,
                wallet_address_from: wallet_address_from.to_string(),
                wallet_address_to,
                amount: order.total_amount,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::UniqueViolation(_) => PaymentError::OrderAlreadyPaid(order_id),
                e => e.into(),
            })?;

        order.payment_status = OrderPaymentStatus::Pending;
        order.payment_transaction_id = Some(payment.id.to_string());
        tx.update_order(&order).await?;

        let log_message = format!(
            "order {} requested {} {} from {}",
            order_id, payment.amount, payment.currency, payment.wallet_address_from
        );
        tx.add_log(&payment.id, LogTypes::PaymentRequested, Some(&log_message))
            .await?;
        tx.commit().await?;

        info!(
            "Created payment {} for order {} ({} {})",
            payment.id, order_id, payment.amount, payment.currency
        );

        Ok(payment)
    }

    /// Stores the hash and schedules the payment for monitoring. Returns
    /// without waiting for the chain.
    pub async fn attach_transaction_hash(
        &self,
        payment_id: &Uuid,
        transaction_hash: &str,
    ) -> Result<Payment, PaymentError> {
        let hash =
            normalize_transaction_hash(transaction_hash).ok_or(PaymentError::InvalidHashFormat)?;

        let mut tx = self.repository.begin().await?;
        let mut payment = tx
            .lock_payment(payment_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.to_string()))?;

        if payment.status.is_terminal() {
            return Err(PaymentError::PaymentAlreadySettled(payment.id));
        }
        // An unconfirmed payment may take a replacement transaction.
        let replaced = match payment.transaction_hash.clone() {
            Some(existing) if existing == hash && payment.status == PaymentStatus::Pending => {
                debug!("Payment {} already monitors {}", payment.id, hash);
                return Ok(payment);
            }
            Some(existing) if existing != hash => {
                if payment.status != PaymentStatus::Unconfirmed {
                    return Err(PaymentError::HashAlreadyAttached(payment.id));
                }
                Some(existing)
            }
            _ => None,
        };

        if let Some(other) = tx.find_payment_by_hash(&hash).await? {
            if other.id != payment.id {
                return Err(PaymentError::DuplicateTransaction(hash));
            }
        }

        payment.transaction_hash = Some(hash.clone());
        payment.status = PaymentStatus::Pending;
        payment.check_attempts = 0;
        payment.next_check_at = Some(Utc::now());
        if replaced.is_some() {
            payment.block_number = None;
            payment.confirmation_count = 0;
        }

        tx.update_payment(&payment).await.map_err(|e| match e {
            RepositoryError::UniqueViolation(_) => PaymentError::DuplicateTransaction(hash.clone()),
            e => e.into(),
        })?;
        let log_message = match &replaced {
            Some(previous) => format!("{} (replaces {})", hash, previous),
            None => hash.clone(),
        };
        tx.add_log(&payment.id, LogTypes::TransactionAttached, Some(&log_message))
            .await?;
        tx.commit().await?;

        match replaced {
            Some(previous) => info!(
                "Replaced unconfirmed transaction {} with {} on payment {}",
                previous, hash, payment.id
            ),
            None => info!("Attached transaction {} to payment {}", hash, payment.id),
        }
        self.wakeup.notify_one();

        Ok(payment)
    }

    pub async fn get_status(&self, payment_id: &Uuid) -> Result<PaymentView, PaymentError> {
        self.repository
            .get_payment(payment_id)
            .await?
            .map(PaymentView::from)
            .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.to_string()))
    }

    /// Webhook entry point. `observed_block` replaces the receipt's block as
    /// the base for counting confirmations when supplied.
    pub async fn verify_by_hash(
        &self,
        transaction_hash: &str,
        observed_block: Option<u64>,
    ) -> Result<VerificationResult, PaymentError> {
        let hash =
            normalize_transaction_hash(transaction_hash).ok_or(PaymentError::InvalidHashFormat)?;
        let payment = self
            .repository
            .get_payment_by_hash(&hash)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(hash.clone()))?;

        let (receipt, current_block) = try_join(
            self.chain.get_receipt(&hash),
            self.chain.get_current_block(),
        )
        .await?;
        let receipt = receipt.ok_or_else(|| PaymentError::TransactionNotFound(hash.clone()))?;

        let required = self.settings.required_confirmations;
        // A caller-supplied block may only shorten the count, never lengthen it.
        let reference_block =
            observed_block.map_or(receipt.block_number, |b| b.max(receipt.block_number));
        let evaluation = transition::evaluate(&receipt, reference_block, current_block, required);
        let confirmations = current_block.saturating_sub(reference_block);

        let mut tx = self.repository.begin().await?;
        let mut payment = tx
            .lock_payment(&payment.id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(hash.clone()))?;

        if payment.transaction_hash.as_deref() != Some(hash.as_str()) {
            return Err(PaymentError::PaymentNotFound(hash));
        }

        if payment.status.is_terminal() {
            debug!(
                "Payment {} already {}, verification changes nothing",
                payment.id, payment.status
            );
            if payment.status == PaymentStatus::Failed {
                return Err(PaymentError::TransactionFailed(hash));
            }
            return Ok(VerificationResult {
                confirmations,
                required,
                status: payment.status,
            });
        }

        match evaluation {
            Evaluation::Failed => {
                transition::fail(&mut tx, &mut payment, receipt.block_number).await?;
                tx.commit().await?;
                warn!("Payment {} failed: transaction {} reverted", payment.id, hash);

                return Err(PaymentError::TransactionFailed(hash));
            }
            Evaluation::Confirmed { confirmations } => {
                transition::confirm(&mut tx, &mut payment, receipt.block_number, confirmations)
                    .await?;
                tx.commit().await?;
                info!(
                    "Payment {} confirmed via verification ({} confirmations)",
                    payment.id, confirmations
                );
            }
            Evaluation::AwaitingDepth { confirmations } => {
                let next_check_at = match payment.status {
                    PaymentStatus::Unconfirmed => {
                        payment.check_attempts = 0;
                        Some(self.next_check_at())
                    }
                    _ => payment.next_check_at.or_else(|| Some(self.next_check_at())),
                };
                transition::record_depth(
                    &mut tx,
                    &mut payment,
                    receipt.block_number,
                    confirmations,
                    next_check_at,
                )
                .await?;
                tx.commit().await?;
                debug!(
                    "Payment {} has {}/{} confirmations",
                    payment.id, confirmations, required
                );
            }
        }

        Ok(VerificationResult {
            confirmations,
            required,
            status: payment.status,
        })
    }

    /// One monitoring step for a payment: look at the chain, then apply the
    /// matching transition and reschedule inside a single transaction.
    pub async fn check_payment(&self, payment_id: &Uuid) -> Result<CheckOutcome, PaymentError> {
        let payment = self
            .repository
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.to_string()))?;

        let hash = match payment.transaction_hash.as_deref() {
            Some(hash) if payment.is_monitorable() => hash.to_string(),
            _ => return Ok(CheckOutcome::Skipped),
        };

        let observation = match try_join(
            self.chain.get_receipt(&hash),
            self.chain.get_current_block(),
        )
        .await
        {
            Ok((Some(receipt), current_block)) => Observation::Mined {
                receipt,
                current_block,
            },
            Ok((None, _)) => Observation::NotMined,
            Err(e) => {
                warn!(
                    "[Monitor] Chain unavailable while checking payment {}: {}",
                    payment_id, e
                );
                Observation::Unavailable
            }
        };

        let outcome = match self.apply_check(payment_id, &hash, observation).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Err(postpone_error) = self.postpone(payment_id).await {
                    error!(
                        "[Monitor] Could not postpone payment {}: {}",
                        payment_id, postpone_error
                    );
                }
                return Err(e);
            }
        };

        match outcome {
            CheckOutcome::Confirmed { confirmations } => info!(
                "[Monitor] Payment {} confirmed with transaction {} ({} confirmations)",
                payment_id, hash, confirmations
            ),
            CheckOutcome::Failed => warn!(
                "[Monitor] Payment {} failed with transaction {}",
                payment_id, hash
            ),
            CheckOutcome::GaveUp { attempts } => warn!(
                "[Monitor] Transaction {} not mined after {} checks, payment {} is unconfirmed",
                hash, attempts, payment_id
            ),
            _ => debug!("[Monitor] Payment {}: {:?}", payment_id, outcome),
        }

        Ok(outcome)
    }

    async fn apply_check(
        &self,
        payment_id: &Uuid,
        hash: &str,
        observation: Observation,
    ) -> Result<CheckOutcome, PaymentError> {
        let mut tx = self.repository.begin().await?;
        let mut payment = match tx.lock_payment(payment_id).await? {
            Some(p) if p.is_monitorable() && p.transaction_hash.as_deref() == Some(hash) => p,
            _ => return Ok(CheckOutcome::Skipped),
        };

        let outcome = match observation {
            Observation::Mined {
                receipt,
                current_block,
            } => {
                let required = self.settings.required_confirmations;
                match transition::evaluate(&receipt, receipt.block_number, current_block, required)
                {
                    Evaluation::Failed => {
                        transition::fail(&mut tx, &mut payment, receipt.block_number).await?;
                        CheckOutcome::Failed
                    }
                    Evaluation::Confirmed { confirmations } => {
                        transition::confirm(
                            &mut tx,
                            &mut payment,
                            receipt.block_number,
                            confirmations,
                        )
                        .await?;
                        CheckOutcome::Confirmed { confirmations }
                    }
                    Evaluation::AwaitingDepth { confirmations } => {
                        let next_check_at = Some(self.next_check_at());
                        transition::record_depth(
                            &mut tx,
                            &mut payment,
                            receipt.block_number,
                            confirmations,
                            next_check_at,
                        )
                        .await?;
                        CheckOutcome::AwaitingDepth { confirmations }
                    }
                }
            }
            Observation::NotMined | Observation::Unavailable => {
                if payment.check_attempts + 1 >= self.settings.max_check_attempts {
                    transition::give_up(&mut tx, &mut payment).await?;
                    CheckOutcome::GaveUp {
                        attempts: payment.check_attempts,
                    }
                } else {
                    let next_check_at = self.next_check_at();
                    transition::defer(&mut tx, &mut payment, next_check_at).await?;
                    CheckOutcome::NotMined {
                        attempts: payment.check_attempts,
                    }
                }
            }
        };

        tx.commit().await?;

        Ok(outcome)
    }

    /// Pushes the next check back after a failed one. Attempts are untouched.
    async fn postpone(&self, payment_id: &Uuid) -> Result<(), PaymentError> {
        let mut tx = self.repository.begin().await?;
        let Some(mut payment) = tx.lock_payment(payment_id).await? else {
            return Ok(());
        };
        if !payment.is_monitorable() {
            return Ok(());
        }

        payment.next_check_at = Some(self.next_check_at());
        tx.update_payment(&payment).await?;
        tx.commit().await?;

        Ok(())
    }
}
