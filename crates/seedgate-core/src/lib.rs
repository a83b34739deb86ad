#![forbid(unsafe_code)]

//! Core engine for the seed-ticketing service.
//!
//! A player requests a randomly drawn seed from a named category and receives
//! a short authenticated **ticket** binding `(seed, category, issue instant)`
//! under the server's private key. Later the pair `(seed, ticket)` is
//! presented for verification and classified as live, dead, or invalid.
//!
//! The engine is built from small, separately testable pieces:
//!
//! - [`crypto`] — SHA-256 / HMAC-SHA-256 and the two AES constructions
//!   (CBC-with-embedded-tag blobs, raw ECB for the fixed-size ticket body)
//! - [`clock`] — the ⅛-second tick codec relative to the 2021 epoch
//! - [`ticket`] — sealing, opening, and hex formatting of tickets
//! - [`archive`] — the packed seed table and its membership index
//! - [`throttle`] — file-locked pacing of issuance and verification
//! - [`registry`] — boot-time category loading and weighted selection
//! - [`service`] — the two top-level operations the transport layer calls
//!
//! Everything the request path touches is immutable after boot; the only
//! coordination between handlers (and between worker processes on the same
//! host) is the advisory file locks owned by the throttles.

pub mod archive;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod registry;
pub mod service;
pub mod throttle;
pub mod ticket;

pub use config::{Blocks, PrivateKey, Salt, Tunables};
pub use service::{IssuedTicket, Service, Verdict};
