use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use poem_openapi::Enum;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Token every payment is denominated in.
pub const PAYMENT_CURRENCY: &str = "USDT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
#[oai(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Failed,
    /// Monitoring gave up without observing a usable receipt.
    Unconfirmed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Unconfirmed => "unconfirmed",
        }
    }

    /// Confirmed and failed payments never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Confirmed | PaymentStatus::Failed)
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "failed" => Ok(Self::Failed),
            "unconfirmed" => Ok(Self::Unconfirmed),
            _ => Err(format!("unknown payment status: {}", s)),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: i64,

    pub wallet_address_from: String,
    pub wallet_address_to: String,
    pub amount: Decimal,
    pub currency: String,

    pub transaction_hash: Option<String>,
    pub status: PaymentStatus,
    pub block_number: Option<i64>,
    pub confirmation_count: i64,

    pub check_attempts: i32,
    pub next_check_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values supplied by the caller when a payment row is inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub order_id: i64,
    pub wallet_address_from: String,
    pub wallet_address_to: String,
    pub amount: Decimal,
}

impl Payment {
    pub fn is_monitorable(&self) -> bool {
        self.status == PaymentStatus::Pending && self.transaction_hash.is_some()
    }
}
