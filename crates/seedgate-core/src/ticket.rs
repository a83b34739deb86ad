//! Sealing, opening, and formatting of tickets.
//!
//! A ticket is a deterministic function of `(seed, category, tick, salt,
//! key)` — there is no nonce, so presenting `(seed, ticket)` alone suffices
//! for verification. Layout before encryption:
//!
//! ```text
//! seed (8) ‖ category (1) ‖ tick (4, big-endian) ‖ HMAC(salt, core) tail
//! ```
//!
//! The 13-byte core is padded to one or two AES blocks by the leading bytes
//! of its own HMAC-SHA-256 tag, then each block is encrypted independently
//! with AES-ECB under the private key. A forger who cannot compute the tag
//! tail has a `2^-24` (one block) or `2^-152` (two blocks) chance per
//! attempt of producing a body that opens cleanly; the verification
//! throttle bounds how many attempts are possible.
//!
//! Changing the mode or introducing a nonce would change the on-wire
//! format, so neither is offered.

use subtle::ConstantTimeEq;

use crate::{
    config::{Blocks, PrivateKey, Salt, TICKET_CORE_LEN},
    crypto,
};

/// The claims recovered from a well-formed ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketClaims {
    pub seed: [u8; 8],
    pub category: u8,
    pub tick: u32,
}

/// Build the encrypted ticket for a drawn seed.
pub fn seal(
    seed: &[u8; 8],
    category: u8,
    tick: u32,
    salt: &Salt,
    key: &PrivateKey,
    blocks: Blocks,
) -> Vec<u8> {
    let mut raw = Vec::with_capacity(blocks.len());
    raw.extend_from_slice(seed);
    raw.push(category);
    raw.extend_from_slice(&tick.to_be_bytes());
    debug_assert_eq!(raw.len(), TICKET_CORE_LEN);

    let tag = crypto::hash(&raw, Some(salt.as_bytes()));
    raw.extend_from_slice(&tag[..blocks.len() - TICKET_CORE_LEN]);

    crypto::aes_ecb_encrypt(&mut raw, key);
    raw
}

/// Decrypt and validate a ticket against the seed the client claims it
/// covers.
///
/// Without a salt only the seed round-trip is checked — enough for an
/// offline holder of the key to peek inside, but not enough to rule out a
/// forgery, so callers that have the salt must pass it. All comparisons
/// are constant-time and every failure is the same `None`.
pub fn open(
    seed: &[u8; 8],
    ticket: &[u8],
    key: &PrivateKey,
    salt: Option<&Salt>,
) -> Option<TicketClaims> {
    if ticket.len() != 16 && ticket.len() != 32 {
        return None;
    }

    let mut raw = ticket.to_vec();
    crypto::aes_ecb_decrypt(&mut raw, key);

    if !bool::from(raw[..8].ct_eq(seed)) {
        return None;
    }

    if let Some(salt) = salt {
        let tag = crypto::hash(&raw[..TICKET_CORE_LEN], Some(salt.as_bytes()));
        let tail = &tag[..ticket.len() - TICKET_CORE_LEN];
        if !bool::from(tail.ct_eq(&raw[TICKET_CORE_LEN..])) {
            return None;
        }
    }

    Some(TicketClaims {
        seed: *seed,
        category: raw[8],
        tick: u32::from_be_bytes(raw[9..13].try_into().expect("core is 13 bytes")),
    })
}

/// Lowercase hex with a dash after every eighth byte:
/// `0011223344556677-8899aabbccddeeff[-…]`.
pub fn pretty(ticket: &[u8]) -> String {
    ticket
        .chunks(8)
        .map(hex::encode)
        .collect::<Vec<_>>()
        .join("-")
}

/// Undo [`pretty`]: dashes may appear at character positions 16, 33, and
/// 50 and nowhere else; the rest must be hex. Anything off-pattern yields
/// an empty vec, which no caller accepts as a ticket.
pub fn clean(text: &str) -> Vec<u8> {
    for (i, c) in text.chars().enumerate() {
        if (matches!(i, 16 | 33 | 50)) != (c == '-') {
            return Vec::new();
        }
    }
    hex::decode(text.replace('-', "")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn key() -> PrivateKey {
        PrivateKey::new((0x00..0x20).collect()).unwrap()
    }

    fn salt() -> Salt {
        Salt::new((0x20..0x40).collect()).unwrap()
    }

    #[test]
    fn seal_then_open_recovers_claims() {
        let seed = hex!("1122334455667788");
        for blocks in [Blocks::One, Blocks::Two] {
            let ticket = seal(&seed, 7, 100_000, &salt(), &key(), blocks);
            assert_eq!(ticket.len(), blocks.len());
            let claims = open(&seed, &ticket, &key(), Some(&salt())).unwrap();
            assert_eq!(claims, TicketClaims { seed, category: 7, tick: 100_000 });
        }
    }

    #[test]
    fn open_rejects_wrong_seed() {
        let seed = hex!("1122334455667788");
        let ticket = seal(&seed, 7, 100_000, &salt(), &key(), Blocks::Two);
        let other = hex!("1122334455667789");
        assert!(open(&other, &ticket, &key(), Some(&salt())).is_none());
        assert!(open(&other, &ticket, &key(), None).is_none());
    }

    #[test]
    fn open_rejects_mutated_tail() {
        let seed = hex!("1122334455667788");
        let mut ticket = seal(&seed, 7, 100_000, &salt(), &key(), Blocks::Two);
        let last = ticket.len() - 1;
        ticket[last] ^= 0x01;
        assert!(open(&seed, &ticket, &key(), Some(&salt())).is_none());
    }

    #[test]
    fn open_rejects_wrong_salt_and_key() {
        let seed = hex!("1122334455667788");
        let ticket = seal(&seed, 7, 100_000, &salt(), &key(), Blocks::Two);

        let wrong_salt = Salt::new((0x40..0x60).collect()).unwrap();
        assert!(open(&seed, &ticket, &key(), Some(&wrong_salt)).is_none());

        let wrong_key = PrivateKey::new((0x01..0x21).collect()).unwrap();
        assert!(open(&seed, &ticket, &wrong_key, Some(&salt())).is_none());
    }

    #[test]
    fn open_without_salt_skips_tag_check() {
        let seed = hex!("1122334455667788");
        let ticket = seal(&seed, 7, 100_000, &salt(), &key(), Blocks::Two);
        let wrong_salt_claims = open(&seed, &ticket, &key(), None).unwrap();
        assert_eq!(wrong_salt_claims.category, 7);
    }

    #[test]
    fn open_rejects_bad_lengths() {
        let seed = hex!("1122334455667788");
        assert!(open(&seed, &[0u8; 15], &key(), None).is_none());
        assert!(open(&seed, &[0u8; 24], &key(), None).is_none());
        assert!(open(&seed, &[], &key(), None).is_none());
    }

    #[test]
    fn pretty_formats_in_eight_byte_groups() {
        let bytes = hex!("00112233445566778899aabbccddeeff");
        assert_eq!(pretty(&bytes), "0011223344556677-8899aabbccddeeff");
    }

    #[test]
    fn clean_inverts_pretty() {
        let one = hex!("00112233445566778899aabbccddeeff");
        let two = hex!(
            "00112233445566778899aabbccddeeff"
            "0102030405060708090a0b0c0d0e0f10"
        );
        assert_eq!(clean(&pretty(&one)), one);
        assert_eq!(clean(&pretty(&two)), two);
    }

    #[test]
    fn clean_rejects_misplaced_dashes() {
        // dash one position late
        assert_eq!(clean("00112233445566778-899aabbccddeeff"), Vec::<u8>::new());
        // missing dash
        assert_eq!(clean("00112233445566778899aabbccddeeff0"), Vec::<u8>::new());
        // dash where hex should be
        assert_eq!(clean("0011223344556677-8899aabbccddee-f"), Vec::<u8>::new());
        // non-hex content with correct dashes
        assert_eq!(clean("001122334455667z-8899aabbccddeeff"), Vec::<u8>::new());
    }

    #[test]
    fn clean_accepts_uppercase_hex() {
        let bytes = hex!("00112233445566778899aabbccddeeff");
        assert_eq!(clean("0011223344556677-8899AABBCCDDEEFF"), bytes);
    }
}
