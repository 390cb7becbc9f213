//! Seeded value derivation.
//!
//! Every derived value is `HMAC-SHA256(key = seed, message = name)` rendered as
//! lowercase hex and truncated. Keying by the seed (rather than hashing
//! `seed || name`) keeps differently named parameters independent.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex characters produced by one HMAC-SHA256 block.
const BLOCK_HEX_LEN: usize = 64;

/// Derive `output_len` hex characters for `name` under `seed`.
///
/// The first 64 characters are exactly the HMAC of `name`. Longer outputs
/// append blocks keyed by the same seed over `name:1`, `name:2`, ...
pub fn derive(seed: &str, name: &str, output_len: usize) -> String {
    let mut out = String::with_capacity(output_len.max(BLOCK_HEX_LEN));
    out.push_str(&block(seed, name.as_bytes()));
    let mut counter = 1u64;
    while out.len() < output_len {
        let message = format!("{name}:{counter}");
        out.push_str(&block(seed, message.as_bytes()));
        counter += 1;
    }
    out.truncate(output_len);
    out
}

/// Derive `hex_len` characters and parse them as an unsigned integer.
///
/// `hex_len` must stay at or below 32 so the value fits in a `u128`.
pub fn derive_u128(seed: &str, name: &str, hex_len: usize) -> u128 {
    debug_assert!(hex_len <= 32, "derived integer wider than u128");
    let digits = derive(seed, name, hex_len);
    u128::from_str_radix(&digits, 16).unwrap_or_default()
}

fn block(seed: &str, message: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(seed.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}
