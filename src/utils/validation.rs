use std::str::FromStr;

use ethers::types::{Address, H256};

/// `0x` followed by 20 hex-encoded bytes, either case.
pub fn is_valid_address(address: &str) -> bool {
    address.starts_with("0x") && Address::from_str(address).is_ok()
}

/// Returns the lower-cased hash when it is `0x` followed by 32 hex-encoded bytes.
pub fn normalize_transaction_hash(hash: &str) -> Option<String> {
    if !hash.starts_with("0x") {
        return None;
    }

    H256::from_str(hash).ok().map(|h| format!("{:#x}", h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_only_twenty_byte_addresses() {
        assert!(is_valid_address("0x52908400098527886E0F7030069857D2E4169EE7"));
        assert!(is_valid_address("0xde709f2102306220921060314715629080e2fb77"));
        assert!(!is_valid_address("52908400098527886E0F7030069857D2E4169EE7"));
        assert!(!is_valid_address("0x123456789abcdef123456789abcdef123456789"));
        assert!(!is_valid_address("0xg2908400098527886E0F7030069857D2E4169EE7"));
        assert!(!is_valid_address(""));
    }

    #[test]
    fn normalizes_transaction_hashes() {
        let upper = format!("0x{}", "AB".repeat(32));
        assert_eq!(
            normalize_transaction_hash(&upper),
            Some(format!("0x{}", "ab".repeat(32)))
        );
        assert_eq!(normalize_transaction_hash(&"ab".repeat(32)), None);
        assert_eq!(normalize_transaction_hash("0xdeadbeef"), None);
        assert_eq!(normalize_transaction_hash(&format!("0x{}", "zz".repeat(32))), None);
        assert_eq!(normalize_transaction_hash("0x"), None);
    }
}
