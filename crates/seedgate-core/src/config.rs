//! Service tunables and process-wide secrets.
//!
//! Secrets are read once at boot from `PRIVATE_KEY` / `SALT` (hex-encoded
//! environment variables) and never change afterwards. An absent or invalid
//! value is replaced with a freshly generated random secret — the service
//! still works, but tickets will not survive a restart, so a warning is
//! logged.

use std::{env, fmt, path::PathBuf, str::FromStr, time::Duration};

use rand::RngCore;
use thiserror::Error;
use tracing::warn;
use zeroize::Zeroizing;

/// Number of payload bytes in a ticket before the authenticator tail:
/// 8-byte seed, 1-byte category, 4-byte tick count.
pub const TICKET_CORE_LEN: usize = 13;

/// One tick is ⅛ of a second.
pub const TICK_MILLIS: u64 = 125;

/// Ticket length in 16-byte AES blocks.
///
/// One block leaves a 3-byte (24-bit) authenticator tail; two blocks leave
/// 19 bytes (152 bits). Shorter tickets are friendlier to type but easier
/// to forge, which the verification throttle has to compensate for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Blocks {
    One,
    #[default]
    Two,
}

impl Blocks {
    /// Ticket length in bytes.
    pub fn len(self) -> usize {
        match self {
            Blocks::One => 16,
            Blocks::Two => 32,
        }
    }

    /// Bits of HMAC tail appended to the 13-byte core.
    pub fn tag_bits(self) -> u32 {
        8 * (self.len() as u32 - TICKET_CORE_LEN as u32)
    }
}

/// Error returned when parsing an invalid block count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseBlocksError(String);

impl fmt::Display for ParseBlocksError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ticket length must be 1 or 2 blocks, got {}", self.0)
    }
}

impl std::error::Error for ParseBlocksError {}

impl FromStr for Blocks {
    type Err = ParseBlocksError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" => Ok(Blocks::One),
            "2" => Ok(Blocks::Two),
            _ => Err(ParseBlocksError(s.to_owned())),
        }
    }
}

/// Load-time constants governing ticket lifetime and throttling.
#[derive(Debug, Clone)]
pub struct Tunables {
    /// How long a ticket remains live after issuance, in seconds.
    pub live_time: u64,
    /// How long after issuance a ticket is still observable (dead but not
    /// yet indistinguishable from garbage), in seconds.
    pub dead_time: u64,
    /// Half-life of the pre-image attack: a client farming issuances
    /// non-stop reaches a 50% chance of drawing a chosen seed after this
    /// many seconds.
    pub ld50: u64,
    /// Maximum tolerated forgery probability over `dead_time`.
    pub forge_success: f64,
    /// Ticket size.
    pub blocks: Blocks,
    /// How long to wait on a throttle lock before giving up.
    pub lock_timeout: Duration,
    /// Directory holding `NNN.seeds.gz` archives.
    pub seed_dir: PathBuf,
    /// Scratch directory for throttle records and their locks.
    pub scratch_dir: PathBuf,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            live_time: 2 * 60 * 60,
            dead_time: 14 * 24 * 60 * 60,
            ld50: 86_400,
            forge_success: 0.001,
            blocks: Blocks::Two,
            lock_timeout: Duration::from_secs(15),
            seed_dir: PathBuf::from("seeds"),
            scratch_dir: env::temp_dir(),
        }
    }
}

impl Tunables {
    /// Minimum spacing between issuances for a category of `seed_count`
    /// seeds.
    ///
    /// The chance of *not* drawing a chosen seed in one pull is `1 − 1/N`;
    /// solving `(1 − 1/N)^k = ½` for the number of pulls `k` over an
    /// `ld50`-second horizon gives the interval. A single-seed category
    /// would need an infinite interval; it is clamped to `u32::MAX`
    /// seconds, which freezes the category after its first draw.
    pub fn gen_interval(&self, seed_count: usize) -> Duration {
        debug_assert!(seed_count > 0);
        let secs = self.ld50 as f64 * (-1.0 / seed_count as f64).ln_1p() / 0.5f64.ln();
        if secs.is_finite() {
            Duration::from_secs_f64(secs)
        } else {
            Duration::from_secs(u64::from(u32::MAX))
        }
    }

    /// Minimum spacing between verification attempts, global across
    /// categories.
    ///
    /// A forged ticket survives the authenticator check with probability
    /// `2^−b` per attempt, where `b` is the tag-tail width. Bounding the
    /// attempt count over `dead_time` keeps the cumulative success chance
    /// under `forge_success`. `ln_1p` keeps the 152-bit case from
    /// underflowing to zero-over-zero.
    pub fn verify_interval(&self) -> Duration {
        let per_try = (-2f64.powi(-(self.blocks.tag_bits() as i32))).ln_1p();
        let budget = (-self.forge_success).ln_1p();
        Duration::from_secs_f64(self.dead_time as f64 * per_try / budget)
    }
}

/// Error returned when constructing a secret from bytes of the wrong size.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("private key must be 16, 24, or 32 bytes, got {0}")]
    BadKeyLength(usize),
    #[error("salt must be 24 to 64 bytes, got {0}")]
    BadSaltLength(usize),
}

/// The AES key every ticket and throttle record is encrypted under.
///
/// 16, 24, or 32 bytes; the length selects AES-128/192/256. The buffer is
/// zeroed on drop and never printed.
#[derive(Clone)]
pub struct PrivateKey(Zeroizing<Vec<u8>>);

impl PrivateKey {
    pub fn new(bytes: Vec<u8>) -> Result<Self, SecretError> {
        match bytes.len() {
            16 | 24 | 32 => Ok(Self(Zeroizing::new(bytes))),
            n => Err(SecretError::BadKeyLength(n)),
        }
    }

    /// Generate a fresh 32-byte key.
    pub fn random() -> Self {
        let mut bytes = vec![0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        Self(Zeroizing::new(bytes))
    }

    /// Read `PRIVATE_KEY` (hex). Absent or malformed values fall back to a
    /// random key.
    pub fn from_env() -> Self {
        match env::var("PRIVATE_KEY") {
            Ok(raw) => match hex::decode(raw.trim()).ok().and_then(|b| Self::new(b).ok()) {
                Some(key) => key,
                None => {
                    warn!("PRIVATE_KEY is not 32/48/64 hex chars; using a random key");
                    Self::random()
                }
            },
            Err(_) => {
                warn!("PRIVATE_KEY is unset; using a random key");
                Self::random()
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PrivateKey").field(&"[REDACTED]").finish()
    }
}

/// The HMAC key that makes ticket tags and throttle filenames unforgeable.
///
/// 24 to 64 bytes. Zeroed on drop, never printed.
#[derive(Clone)]
pub struct Salt(Zeroizing<Vec<u8>>);

impl Salt {
    pub fn new(bytes: Vec<u8>) -> Result<Self, SecretError> {
        match bytes.len() {
            24..=64 => Ok(Self(Zeroizing::new(bytes))),
            n => Err(SecretError::BadSaltLength(n)),
        }
    }

    /// Generate a fresh 64-byte salt.
    pub fn random() -> Self {
        let mut bytes = vec![0u8; 64];
        rand::rng().fill_bytes(&mut bytes);
        Self(Zeroizing::new(bytes))
    }

    /// Read `SALT` (hex). Absent or malformed values fall back to a random
    /// salt.
    pub fn from_env() -> Self {
        match env::var("SALT") {
            Ok(raw) => match hex::decode(raw.trim()).ok().and_then(|b| Self::new(b).ok()) {
                Some(salt) => salt,
                None => {
                    warn!("SALT is not 48-128 hex chars; using a random salt");
                    Self::random()
                }
            },
            Err(_) => {
                warn!("SALT is unset; using a random salt");
                Self::random()
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Salt").field(&"[REDACTED]").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_geometry() {
        assert_eq!(Blocks::One.len(), 16);
        assert_eq!(Blocks::Two.len(), 32);
        assert_eq!(Blocks::One.tag_bits(), 24);
        assert_eq!(Blocks::Two.tag_bits(), 152);
        assert_eq!("1".parse::<Blocks>().unwrap(), Blocks::One);
        assert_eq!("2".parse::<Blocks>().unwrap(), Blocks::Two);
        assert!("3".parse::<Blocks>().is_err());
    }

    #[test]
    fn secret_length_gates() {
        assert!(PrivateKey::new(vec![0; 16]).is_ok());
        assert!(PrivateKey::new(vec![0; 24]).is_ok());
        assert!(PrivateKey::new(vec![0; 32]).is_ok());
        assert!(PrivateKey::new(vec![0; 20]).is_err());
        assert!(Salt::new(vec![0; 24]).is_ok());
        assert!(Salt::new(vec![0; 64]).is_ok());
        assert!(Salt::new(vec![0; 23]).is_err());
        assert!(Salt::new(vec![0; 65]).is_err());
    }

    #[test]
    fn secrets_redact_debug() {
        let key = PrivateKey::random();
        let salt = Salt::random();
        assert!(!format!("{key:?}").contains(&hex::encode(key.as_bytes())));
        assert!(format!("{salt:?}").contains("REDACTED"));
    }

    #[test]
    fn issuance_interval_shrinks_with_population() {
        let tunables = Tunables::default();
        let small = tunables.gen_interval(10);
        let large = tunables.gen_interval(1_000_000);
        assert!(small > large);
        // ln(1 - 1/N)/ln(1/2) ~ 1/(N ln 2) for large N
        let expected = tunables.ld50 as f64 / (1_000_000.0 * 2f64.ln());
        assert!((large.as_secs_f64() - expected).abs() / expected < 1e-3);
    }

    #[test]
    fn single_seed_category_is_frozen() {
        let interval = Tunables::default().gen_interval(1);
        assert_eq!(interval, Duration::from_secs(u64::from(u32::MAX)));
    }

    #[test]
    fn verify_interval_depends_on_tag_width() {
        let mut tunables = Tunables::default();
        tunables.blocks = Blocks::One;
        let one = tunables.verify_interval();
        // 24-bit tail: ~ dead_time * 2^-24 / forge_success seconds
        let expected = tunables.dead_time as f64 * 2f64.powi(-24) / tunables.forge_success;
        assert!((one.as_secs_f64() - expected).abs() / expected < 1e-2);

        tunables.blocks = Blocks::Two;
        let two = tunables.verify_interval();
        assert!(two < Duration::from_millis(1));
    }
}
