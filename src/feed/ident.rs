//! Stable identifiers for sources and items.
//!
//! Identifiers are a 64-bit FNV-1a hash of the seed text rendered as
//! sixteen lowercase hex digits. The hash is not meant to resist deliberate
//! collisions; it only has to be short and reproducible across runs and
//! platforms.

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Identifier of a source, derived from its feed URL alone
pub fn source_id(feed_url: &str) -> String {
    format!("{:016x}", fnv1a(feed_url.trim().as_bytes()))
}

/// Identifier of an item, derived from its native GUID/ID or, failing
/// that, from its media URL
pub fn item_id(native_token: &str) -> String {
    format!("{:016x}", fnv1a(native_token.trim().as_bytes()))
}
