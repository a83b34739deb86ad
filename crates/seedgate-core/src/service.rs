//! The two operations the transport layer calls.
//!
//! A [`Service`] is built once at boot and shared immutably between
//! request handlers (an `Arc<Service>` across threads or processes —
//! cross-process coordination rides on the throttle files alone).
//!
//! Issuance and verification both block: they sleep inside a file-locked
//! critical section. Async transports must push them onto a blocking pool.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{
    clock,
    config::{PrivateKey, Salt, Tunables},
    registry::{BootError, Registry},
    throttle::ThrottleError,
    ticket,
};

/// Operational failures. Everything a *client* did wrong is not an error
/// but a [`Verdict::Invalid`] — callers must not be able to distinguish
/// why a ticket was rejected.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Throttle(#[from] ThrottleError),
}

/// What issuance hands back for rendering.
#[derive(Debug, Clone)]
pub struct IssuedTicket {
    /// The drawn seed, in its on-wire signed form.
    pub seed: i64,
    /// The moment the ticket was stamped (post-throttle).
    pub issued_at: DateTime<Utc>,
    /// When the ticket stops being live.
    pub live_until: DateTime<Utc>,
    /// Pretty-hex ticket for the client to copy.
    pub ticket: String,
    /// Slug of the category the seed came from.
    pub category_url: String,
    /// Display name of the category.
    pub category_name: String,
}

/// Lifecycle classification of a presented `(seed, ticket)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Still usable; `remaining_secs` until it goes dead.
    Live { remaining_secs: i64 },
    /// Past its window but still recognizable; expired at the given time.
    Dead { expired_at: DateTime<Utc> },
    /// Unparseable, forged, unknown, or too old to acknowledge.
    Invalid,
}

/// Immutable per-process context: secrets, tunables, loaded categories.
#[derive(Debug)]
pub struct Service {
    tunables: Tunables,
    key: PrivateKey,
    salt: Salt,
    registry: Registry,
}

impl Service {
    /// Boot with secrets from the environment.
    pub fn from_env(tunables: Tunables) -> Result<Self, BootError> {
        let key = PrivateKey::from_env();
        let salt = Salt::from_env();
        Self::new(tunables, key, salt)
    }

    /// Boot with explicit secrets.
    pub fn new(tunables: Tunables, key: PrivateKey, salt: Salt) -> Result<Self, BootError> {
        let registry = Registry::load(&tunables, &salt)?;
        Ok(Self { tunables, key, salt, registry })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    /// Draw a seed and mint its ticket.
    ///
    /// An unknown or absent slug falls back to a weighted-random category
    /// rather than failing: the issuance endpoint has nothing to protect
    /// besides the draw itself, and the per-category throttle guards that.
    /// The ticket is stamped with the *post*-sleep instant, so the spacing
    /// guarantee is visible in the tick values themselves.
    #[instrument(level = "debug", skip(self), fields(category))]
    pub fn issue(&self, slug: Option<&str>) -> Result<IssuedTicket, ServiceError> {
        let category = slug
            .and_then(|s| self.registry.by_slug(s))
            .unwrap_or_else(|| self.registry.pick_weighted());
        tracing::Span::current().record("category", category.number());

        let issued_at = category
            .throttle()
            .pace(category.gen_interval(), &self.key)?;
        let tick = clock::encode(issued_at);

        let seed = category.draw_seed();
        let blob = ticket::seal(
            &seed,
            category.number(),
            tick,
            &self.salt,
            &self.key,
            self.tunables.blocks,
        );

        // report the instant the ticket actually encodes
        let issued_at = clock::decode(tick);
        debug!(category = category.number(), "issued ticket");
        Ok(IssuedTicket {
            seed: i64::from_be_bytes(seed),
            issued_at,
            live_until: issued_at + ChronoDuration::seconds(self.tunables.live_time as i64),
            ticket: ticket::pretty(&blob),
            category_url: category.url().to_owned(),
            category_name: category.name().to_owned(),
        })
    }

    /// Classify a presented `(seed, ticket)` pair.
    ///
    /// The global verification throttle runs before anything is parsed:
    /// malformed garbage costs an attacker exactly as much time as a
    /// well-formed forgery attempt.
    #[instrument(level = "debug", skip_all)]
    pub fn verify(&self, seed_text: &str, ticket_text: &str) -> Result<Verdict, ServiceError> {
        self.registry
            .verify_throttle()
            .pace(self.registry.verify_interval(), &self.key)?;

        let Ok(seed) = seed_text.trim().parse::<i64>() else {
            return Ok(Verdict::Invalid);
        };
        let seed_bytes = seed.to_be_bytes();

        let blob = ticket::clean(ticket_text);
        if blob.len() != 16 && blob.len() != 32 {
            return Ok(Verdict::Invalid);
        }

        let Some(claims) = ticket::open(&seed_bytes, &blob, &self.key, Some(&self.salt)) else {
            return Ok(Verdict::Invalid);
        };

        let Some(category) = self.registry.by_number(claims.category) else {
            return Ok(Verdict::Invalid);
        };
        if !category.contains(u64::from_be_bytes(seed_bytes)) {
            return Ok(Verdict::Invalid);
        }

        Ok(self.classify(claims.tick))
    }

    fn classify(&self, ticket_tick: u32) -> Verdict {
        let age_millis = (i64::from(clock::now()) - i64::from(ticket_tick)) * 125;
        let live_millis = self.tunables.live_time as i64 * 1000;
        let dead_millis = self.tunables.dead_time as i64 * 1000;

        if age_millis < live_millis {
            Verdict::Live {
                remaining_secs: (live_millis - age_millis + 500) / 1000,
            }
        } else if age_millis < dead_millis {
            Verdict::Dead {
                expired_at: clock::decode(ticket_tick)
                    + ChronoDuration::seconds(self.tunables.live_time as i64),
            }
        } else {
            Verdict::Invalid
        }
    }
}
