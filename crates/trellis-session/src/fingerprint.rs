//! Session fingerprinting
//!
//! The session name is a SHA-256 over the client address, user agent and an
//! optional caller id. The store id is a second hash over the name.

use sha2::{Digest, Sha256};
use std::net::IpAddr;

pub const FINGERPRINT_PREFIX: &str = "trellis-session";
pub const FINGERPRINT_SEPARATOR: &str = "|";

/// Derive the session name for a client
pub fn fingerprint(ip: IpAddr, user_agent: &str, id: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_PREFIX.as_bytes());
    hasher.update(ip.to_string().as_bytes());
    hasher.update(FINGERPRINT_SEPARATOR.as_bytes());
    hasher.update(user_agent.as_bytes());
    hasher.update(id.unwrap_or_default().as_bytes());
    to_hex(&hasher.finalize())
}

/// Identifier the session is stored under
pub fn store_id(name: &str) -> String {
    to_hex(&Sha256::digest(name.as_bytes()))
}

fn to_hex(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
