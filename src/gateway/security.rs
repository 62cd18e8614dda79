use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::gateway::GatewayConfig;
use crate::types::{ValidationFailure, ValidationReport};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_PREFIX: &str = "sha256=";

pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

pub fn validate_signature(signature_header: &str, raw_body: &[u8], secret: &str) -> bool {
    let Some(hex_mac) = signature_header.trim().strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(provided) = hex::decode(hex_mac.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    let expected = mac.finalize().into_bytes();

    bool::from(expected.as_slice().ct_eq(provided.as_slice()))
}

pub fn validate_timestamp(timestamp: i64, tolerance_secs: i64) -> bool {
    let now = Utc::now().timestamp();
    (now - timestamp).abs() <= tolerance_secs
}

pub fn validate_ip_allowlist(ip: IpAddr, allowlist: &[String]) -> bool {
    if allowlist.is_empty() {
        return true;
    }

    allowlist.iter().any(|entry| {
        if entry.contains('/') {
            ip_in_cidr(ip, entry)
        } else {
            entry.parse::<IpAddr>().is_ok_and(|allowed| allowed == ip)
        }
    })
}

/// Checks run cheapest first: ip, then timestamp, then signature.
pub fn validate_all(
    config: &GatewayConfig,
    client_ip: IpAddr,
    timestamp: Option<i64>,
    signature_header: Option<&str>,
    raw_body: &[u8],
) -> ValidationReport {
    if !validate_ip_allowlist(client_ip, &config.ip_allowlist) {
        return rejected(ValidationFailure::IpNotAllowed);
    }

    if let Some(timestamp) = timestamp
        && !validate_timestamp(timestamp, config.timestamp_tolerance_secs)
    {
        return rejected(ValidationFailure::StaleTimestamp);
    }

    if config.validate_signature {
        let Some(secret) = config.secret.as_deref() else {
            return rejected(ValidationFailure::MissingSecret);
        };
        let Some(signature_header) = signature_header else {
            return rejected(ValidationFailure::MissingSignature);
        };
        if !validate_signature(signature_header, raw_body, secret) {
            return rejected(ValidationFailure::InvalidSignature);
        }
    }

    ValidationReport {
        valid: true,
        failures: Vec::new(),
    }
}

fn rejected(failure: ValidationFailure) -> ValidationReport {
    ValidationReport {
        valid: false,
        failures: vec![failure],
    }
}

fn ip_in_cidr(ip: IpAddr, cidr: &str) -> bool {
    let Some((network, prefix)) = cidr.split_once('/') else {
        return false;
    };
    let Ok(prefix_length) = prefix.parse::<u8>() else {
        return false;
    };

    match (ip, network.parse::<IpAddr>()) {
        (IpAddr::V4(ip), Ok(IpAddr::V4(network))) => ipv4_in_cidr(ip, network, prefix_length),
        (IpAddr::V6(ip), Ok(IpAddr::V6(network))) => ipv6_in_cidr(ip, network, prefix_length),
        _ => false,
    }
}

fn ipv4_in_cidr(ip: Ipv4Addr, network: Ipv4Addr, prefix_length: u8) -> bool {
    if prefix_length > 32 {
        return false;
    }

    let ip = u32::from_be_bytes(ip.octets());
    let network = u32::from_be_bytes(network.octets());
    let mask = if prefix_length == 0 {
        0
    } else {
        (!0u32) << (32 - prefix_length)
    };

    (ip & mask) == (network & mask)
}

fn ipv6_in_cidr(ip: Ipv6Addr, network: Ipv6Addr, prefix_length: u8) -> bool {
    if prefix_length > 128 {
        return false;
    }

    let ip = u128::from_be_bytes(ip.octets());
    let network = u128::from_be_bytes(network.octets());
    let mask = if prefix_length == 0 {
        0
    } else {
        (!0u128) << (128 - prefix_length)
    };

    (ip & mask) == (network & mask)
}
