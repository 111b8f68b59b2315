//! Name fingerprint stored in every record header.
//!
//! The hash covers the name bytes only, never the payload.  It exists so a
//! renamed header (name rewritten, hash left alone) can be told apart from
//! an intact one.

/// DJB2 seed.
pub const SEED: u32 = 5381;

/// DJB2 over the raw bytes of `name`, wrapping at 32 bits.
pub fn name_hash(name: &str) -> u32 {
    name.bytes()
        .fold(SEED, |hash, b| hash.wrapping_mul(33).wrapping_add(b as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_name_is_seed() {
        assert_eq!(name_hash(""), SEED);
    }

    #[test]
    fn single_byte() {
        assert_eq!(name_hash("a"), 5381 * 33 + 'a' as u32);
    }

    #[test]
    fn wraps_at_32_bits() {
        let name = "a".repeat(64);
        let expected = name.bytes().fold(5381u64, |h, b| (h * 33 + b as u64) & 0xFFFF_FFFF);
        assert_eq!(name_hash(&name) as u64, expected);
    }

    #[test]
    fn depends_on_name_only() {
        assert_eq!(name_hash("a.txt"), name_hash("a.txt"));
        assert_ne!(name_hash("a.txt"), name_hash("b.txt"));
    }
}
