//! Seed and crash-point derivation.
//!
//! The crash point for a round is a pure function of two seeds: one chosen
//! by (or for) the player before the bet, one chosen by the operator and
//! disclosed only after the bet is on the books. Anyone can recompute the
//! crash point from the revealed pair and check the operator did not move
//! the goalposts, which is the entire fairness claim of the game.

use sha2::{Digest, Sha256};

/// Lowest possible crash multiplier, scaled by 100 (1.00x).
pub const CRASH_FLOOR: u32 = 100;

/// Size of the crash multiplier range. Crash points land in
/// `[CRASH_FLOOR, CRASH_FLOOR + CRASH_RANGE - 1]`, i.e. 1.00x..=9.99x.
pub const CRASH_RANGE: u32 = 900;

/// Packs a seed as a 32-byte big-endian word, the same fixed-width
/// encoding the on-chain contract hashes.
fn pack_seed(seed: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&seed.to_be_bytes());
    word
}

/// Derives the crash multiplier (scaled by 100) for a seed pair.
///
/// Both seeds are packed as 32-byte big-endian words, concatenated, and
/// hashed with SHA-256. The first four digest bytes, read big-endian, are
/// reduced into the bounded multiplier range.
///
/// The modulo reduction over a 900-value range carries a small non-uniform
/// bias toward the low end. The reference contract has the same bias; it is
/// kept here so independently computed crash points agree byte-for-byte.
///
/// Callers must not invoke this with an undisclosed server seed. A zero
/// seed is a valid input to the hash, so "unset" cannot be detected here;
/// the round state (`crash_multiplier == 0`) is the authority on whether
/// the seed has been revealed.
pub fn derive_crash_point(client_seed: u64, server_seed: u64) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(pack_seed(client_seed));
    hasher.update(pack_seed(server_seed));
    let digest = hasher.finalize();

    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    CRASH_FLOOR + (prefix % CRASH_RANGE)
}

/// Computes the pre-bet commitment to a server seed.
///
/// The operator publishes this hash before (or at) bet placement, so the
/// seed cannot be chosen after the client seed is known. The store checks
/// the revealed seed against it.
pub fn commit_server_seed(server_seed: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(pack_seed(server_seed));
    hasher.finalize().into()
}

/// Checks a revealed server seed against its published commitment.
pub fn verify_commitment(server_seed: u64, commitment: &[u8; 32]) -> bool {
    commit_server_seed(server_seed) == *commitment
}

#[cfg(test)]
mod tests {
    use super::*;

    // Regression vectors pinned against the reference derivation. Any
    // implementation of this game must reproduce these exactly.
    const VECTORS: &[(u64, u64, u32)] = &[
        (12345, 67890, 361),
        (0, 1, 261),
        (1, 0, 673),
        (42, 99, 571),
        (999_999_999, 123_456_789, 664),
        (u64::MAX, u64::MAX, 299),
    ];

    #[test]
    fn test_reference_vectors() {
        for &(client, server, expected) in VECTORS {
            assert_eq!(
                derive_crash_point(client, server),
                expected,
                "vector ({}, {})",
                client,
                server
            );
        }
    }

    #[test]
    fn test_deterministic() {
        for i in 0..100u64 {
            let a = derive_crash_point(i, i.wrapping_mul(7919));
            let b = derive_crash_point(i, i.wrapping_mul(7919));
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_range() {
        // Sweep a spread of seed pairs; every result must land in
        // [1.00x, 9.99x].
        for client in (0..10_000u64).step_by(37) {
            let crash = derive_crash_point(client, client ^ 0xdead_beef);
            assert!((CRASH_FLOOR..CRASH_FLOOR + CRASH_RANGE).contains(&crash));
        }
    }

    #[test]
    fn test_seed_order_matters() {
        // The packed encoding is positional; swapping seeds is a
        // different round.
        assert_ne!(derive_crash_point(1, 0), derive_crash_point(0, 1));
    }

    #[test]
    fn test_commitment_roundtrip() {
        let commitment = commit_server_seed(67890);
        assert_eq!(
            hex::encode(commitment),
            "06f1031acaafe70cb79fac7403f9d70a40f70661d80199b718cd0b76e7451be5"
        );
        assert!(verify_commitment(67890, &commitment));
        assert!(!verify_commitment(67891, &commitment));
    }
}
