//! Bluetooth MAC address helpers
//!
//! The adapter MAC is factory-provisioned and may arrive in any of the
//! usual notations (`aa-bb-..`, `aabb.ccdd.eeff`, bare hex).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MacAddressError {
    #[error("Invalid MAC address length: {0}")]
    InvalidLength(String),

    #[error("Invalid MAC address digits: {0}")]
    InvalidDigits(String),
}

/// Normalize a MAC address to `AA:BB:CC:DD:EE:FF`
pub fn format_mac_address(mac: &str) -> Result<String, MacAddressError> {
    let cleaned: String = mac
        .trim()
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if cleaned.chars().count() != 12 {
        return Err(MacAddressError::InvalidLength(mac.to_string()));
    }
    if !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(MacAddressError::InvalidDigits(mac.to_string()));
    }

    let pairs: Vec<&str> = (0..12).step_by(2).map(|i| &cleaned[i..i + 2]).collect();
    Ok(pairs.join(":"))
}

/// Check whether `mac` is a valid MAC address in any accepted notation
pub fn validate_mac_address(mac: &str) -> bool {
    format_mac_address(mac).is_ok()
}
