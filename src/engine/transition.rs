//! Status transitions that touch a payment and possibly its order.
//!
//! Every function here takes an open [`PaymentTransaction`]; nothing is
//! visible to other readers until the caller commits it.

use chrono::{DateTime, Utc};

use crate::{
    db::{
        log::LogTypes,
        repositories::models::{
            order::{OrderPaymentStatus, OrderStatus},
            payment::{Payment, PaymentStatus},
        },
        PaymentTransaction,
    },
    engine::PaymentError,
    ethereum::Receipt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    Failed,
    Confirmed { confirmations: u64 },
    AwaitingDepth { confirmations: u64 },
}

/// Confirmations are counted from `reference_block`, which is the receipt's
/// block unless the caller observed a different one.
pub fn evaluate(
    receipt: &Receipt,
    reference_block: u64,
    current_block: u64,
    required_confirmations: u64,
) -> Evaluation {
    if !receipt.success {
        return Evaluation::Failed;
    }

    let confirmations = current_block.saturating_sub(reference_block);
    if confirmations >= required_confirmations {
        Evaluation::Confirmed { confirmations }
    } else {
        Evaluation::AwaitingDepth { confirmations }
    }
}

fn to_db_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub async fn confirm<T: PaymentTransaction>(
    tx: &mut T,
    payment: &mut Payment,
    block_number: u64,
    confirmations: u64,
) -> Result<(), PaymentError> {
    let mut order = tx
        .lock_order(payment.order_id)
        .await?
        .ok_or(PaymentError::OrderNotFound(payment.order_id))?;

    payment.status = PaymentStatus::Confirmed;
    payment.block_number = Some(to_db_count(block_number));
    payment.confirmation_count = to_db_count(confirmations);
    payment.next_check_at = None;

    order.payment_status = OrderPaymentStatus::Completed;
    order.order_status = OrderStatus::Processing;

    tx.update_payment(payment).await?;
    tx.update_order(&order).await?;

    let log_message = format!(
        "order {} paid {} {} with {} confirmations at block {}",
        order.id, payment.amount, payment.currency, confirmations, block_number
    );
    tx.add_log(&payment.id, LogTypes::PaymentConfirmed, Some(&log_message))
        .await?;

    Ok(())
}

pub async fn fail<T: PaymentTransaction>(
    tx: &mut T,
    payment: &mut Payment,
    block_number: u64,
) -> Result<(), PaymentError> {
    let mut order = tx
        .lock_order(payment.order_id)
        .await?
        .ok_or(PaymentError::OrderNotFound(payment.order_id))?;

    payment.status = PaymentStatus::Failed;
    payment.block_number = Some(to_db_count(block_number));
    payment.next_check_at = None;

    order.payment_status = OrderPaymentStatus::Failed;

    tx.update_payment(payment).await?;
    tx.update_order(&order).await?;

    let log_message = format!(
        "transaction {} reverted at block {}",
        payment.transaction_hash.as_deref().unwrap_or("-"),
        block_number
    );
    tx.add_log(&payment.id, LogTypes::PaymentFailed, Some(&log_message))
        .await?;

    Ok(())
}

/// Mined but not deep enough yet. The order is not touched.
pub async fn record_depth<T: PaymentTransaction>(
    tx: &mut T,
    payment: &mut Payment,
    block_number: u64,
    confirmations: u64,
    next_check_at: Option<DateTime<Utc>>,
) -> Result<(), PaymentError> {
    payment.status = PaymentStatus::Pending;
    payment.block_number = Some(to_db_count(block_number));
    payment.confirmation_count = to_db_count(confirmations);
    payment.next_check_at = next_check_at;

    tx.update_payment(payment).await?;

    Ok(())
}

/// Not mined (or the node could not be reached); try again later.
pub async fn defer<T: PaymentTransaction>(
    tx: &mut T,
    payment: &mut Payment,
    next_check_at: DateTime<Utc>,
) -> Result<(), PaymentError> {
    payment.check_attempts += 1;
    payment.next_check_at = Some(next_check_at);

    tx.update_payment(payment).await?;

    Ok(())
}

/// The check budget is spent. The order stays as it is.
pub async fn give_up<T: PaymentTransaction>(
    tx: &mut T,
    payment: &mut Payment,
) -> Result<(), PaymentError> {
    payment.check_attempts += 1;
    payment.status = PaymentStatus::Unconfirmed;
    payment.next_check_at = None;

    tx.update_payment(payment).await?;

    let log_message = format!(
        "no receipt for {} after {} checks",
        payment.transaction_hash.as_deref().unwrap_or("-"),
        payment.check_attempts
    );
    tx.add_log(&payment.id, LogTypes::PaymentUnconfirmed, Some(&log_message))
        .await?;

    Ok(())
}
