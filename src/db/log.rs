#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTypes {
    PaymentRequested,
    TransactionAttached,
    PaymentConfirmed,
    PaymentFailed,
    PaymentUnconfirmed,
}

impl TryFrom<&str> for LogTypes {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "payment_requested" => Ok(LogTypes::PaymentRequested),
            "transaction_attached" => Ok(LogTypes::TransactionAttached),
            "payment_confirmed" => Ok(LogTypes::PaymentConfirmed),
            "payment_failed" => Ok(LogTypes::PaymentFailed),
            "payment_unconfirmed" => Ok(LogTypes::PaymentUnconfirmed),
            _ => Err(format!("invalid log type: {}", value)),
        }
    }
}

impl From<LogTypes> for &'static str {
    fn from(value: LogTypes) -> Self {
        match value {
            LogTypes::PaymentRequested => "payment_requested",
            LogTypes::TransactionAttached => "transaction_attached",
            LogTypes::PaymentConfirmed => "payment_confirmed",
            LogTypes::PaymentFailed => "payment_failed",
            LogTypes::PaymentUnconfirmed => "payment_unconfirmed",
        }
    }
}

impl From<LogTypes> for String {
    fn from(value: LogTypes) -> Self {
        let s: &'static str = value.into();
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_types_round_trip_through_their_column_value() {
        for log_type in [
            LogTypes::PaymentRequested,
            LogTypes::TransactionAttached,
            LogTypes::PaymentConfirmed,
            LogTypes::PaymentFailed,
            LogTypes::PaymentUnconfirmed,
        ] {
            let value: &str = log_type.into();
            assert_eq!(LogTypes::try_from(value), Ok(log_type));
        }
        assert!(LogTypes::try_from("payment_refunded").is_err());
    }
}
