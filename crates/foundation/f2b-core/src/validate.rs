//! Request parameter validation.
//!
//! Everything that ends up on a `fail2ban-client` command line passes through
//! here first. Over SSH the arguments are also seen by a remote shell, so the
//! jail name alphabet is deliberately narrow.

use std::net::IpAddr;

use thiserror::Error;

pub const MAX_JAIL_NAME_LEN: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Jail name is empty")]
    EmptyJailName,

    #[error("Jail name is longer than 64 characters")]
    JailNameTooLong,

    #[error("Invalid jail name: {0}")]
    InvalidJailName(String),

    #[error("Invalid IP address: {0}")]
    InvalidAddress(String),
}

/// Accepts `[A-Za-z0-9._-]`, not starting with `-`.
pub fn validate_jail_name(name: &str) -> Result<&str, ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyJailName);
    }
    if name.len() > MAX_JAIL_NAME_LEN {
        return Err(ValidationError::JailNameTooLong);
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');
    if name.starts_with('-') || !name.chars().all(allowed) {
        return Err(ValidationError::InvalidJailName(name.to_string()));
    }
    Ok(name)
}

/// Parse an IPv4/IPv6 address. Callers should dispatch the canonical
/// `to_string()` of the result rather than the raw input.
pub fn validate_address(ip: &str) -> Result<IpAddr, ValidationError> {
    ip.trim()
        .parse()
        .map_err(|_| ValidationError::InvalidAddress(ip.to_string()))
}

/// True for a bare address or an `addr/prefix` network, as fail2ban prints
/// them in banned lists.
pub fn is_address_token(token: &str) -> bool {
    let (addr, prefix) = match token.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (token, None),
    };
    let Ok(ip) = addr.parse::<IpAddr>() else {
        return false;
    };
    match prefix {
        None => true,
        Some(p) => {
            let max = if ip.is_ipv4() { 32 } else { 128 };
            p.parse::<u8>().map(|bits| bits <= max).unwrap_or(false)
        }
    }
}
