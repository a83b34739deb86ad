//! File-locked pacing of privileged operations.
//!
//! Each throttle owns two files under the scratch directory: an advisory
//! lock and an encrypted record of the last time the operation ran. The
//! filenames are HMAC-derived from the salt, so an attacker who can list
//! the scratch directory cannot tell which file belongs to which category
//! or role, and cannot plant a record without the salt.
//!
//! The record is an [`crate::crypto::encrypt_blob`] ciphertext of the last
//! tick count as 8 big-endian bytes. A missing or undecryptable record is
//! treated as if the operation had *just* run: the caller sleeps the full
//! interval. Wiping the file therefore slows an attacker down instead of
//! letting them through.
//!
//! Locks work across threads and processes, permitting multi-worker
//! deployments on one host. The pacing sleep happens while the lock is
//! held — that is the point: concurrent requests for the same resource
//! queue up behind it.

use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    clock,
    config::{PrivateKey, Salt},
    crypto,
};

/// How often to re-try a contended advisory lock.
const LOCK_POLL: Duration = Duration::from_millis(25);

/// Which operation a throttle paces. The string forms feed the salted
/// filename derivation and must never change, or every deployment would
/// forget its throttle state on upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Issue,
    Verify,
}

impl Role {
    fn tag(self) -> &'static str {
        match self {
            Role::Issue => "generate",
            Role::Verify => "verify",
        }
    }
}

#[derive(Debug, Error)]
pub enum ThrottleError {
    #[error("timed out waiting for the throttle lock")]
    LockTimeout,
    #[error("throttle state I/O: {0}")]
    Io(#[from] io::Error),
}

/// A persistent minimum-spacing gate for one `(category, role)` pair.
#[derive(Debug)]
pub struct Throttle {
    record_path: PathBuf,
    lock_path: PathBuf,
    timeout: Duration,
}

impl Throttle {
    /// Derive the record/lock paths for `category` in `role`. Category 0
    /// is reserved for the global verification gate.
    pub fn new(
        scratch_dir: &Path,
        salt: &Salt,
        category: u8,
        role: Role,
        timeout: Duration,
    ) -> Self {
        let name = |kind: &str| {
            let label = format!("{category:03}.{}.{kind}", role.tag());
            hex::encode(crypto::hash(label.as_bytes(), Some(salt.as_bytes())))
        };
        Self {
            record_path: scratch_dir.join(name("file")),
            lock_path: scratch_dir.join(name("lock")),
            timeout,
        }
    }

    /// Wait until at least `interval` has passed since the last paced
    /// call, then record the new pass. Returns the post-sleep instant,
    /// which is the moment callers must stamp into anything they mint.
    pub fn pace(
        &self,
        interval: Duration,
        key: &PrivateKey,
    ) -> Result<DateTime<Utc>, ThrottleError> {
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)?;

        let deadline = Instant::now() + self.timeout;
        loop {
            match lock_file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(ThrottleError::LockTimeout);
                    }
                    thread::sleep(LOCK_POLL);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let result = self.pace_locked(interval, key);
        let _ = FileExt::unlock(&lock_file);
        result
    }

    fn pace_locked(
        &self,
        interval: Duration,
        key: &PrivateKey,
    ) -> Result<DateTime<Utc>, ThrottleError> {
        let mut now = Utc::now();
        let now_tick = clock::encode(now);

        // Corrupt or absent records pace as if the last pass were this
        // instant; an attacker gains nothing by destroying state.
        let last_tick = self.read_record(key).unwrap_or(now_tick);

        let elapsed =
            Duration::from_millis(u64::from(now_tick.saturating_sub(last_tick)) * 125);
        if elapsed < interval {
            let nap = interval - elapsed;
            trace!(?nap, "pacing");
            thread::sleep(nap);
            now = Utc::now();
        }

        self.write_record(clock::encode(now), key)?;
        Ok(now)
    }

    fn read_record(&self, key: &PrivateKey) -> Option<u32> {
        let blob = match fs::read(&self.record_path) {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => return None,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!(path = %self.record_path.display(), error = %e, "unreadable throttle record");
                }
                return None;
            }
        };
        let plain = crypto::decrypt_blob(&blob, key)?;
        let raw: [u8; 8] = plain.as_slice().try_into().ok()?;
        u32::try_from(u64::from_be_bytes(raw)).ok()
    }

    fn write_record(&self, tick: u32, key: &PrivateKey) -> Result<(), ThrottleError> {
        let blob = crypto::encrypt_blob(&u64::from(tick).to_be_bytes(), key);
        let dir = self.record_path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&blob)?;
        tmp.persist(&self.record_path).map_err(|e| ThrottleError::Io(e.error))?;
        Ok(())
    }
}
