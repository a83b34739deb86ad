//! Exit codes for scripting against the verifier.

pub const SUCCESS: u8 = 0;
pub const BAD_KEY: u8 = 1;
pub const BAD_SALT: u8 = 2;
pub const BAD_SEED: u8 = 3;
pub const BAD_TICKET: u8 = 4;
pub const BAD_TICKET_SIZE: u8 = 5;
pub const MISSING_SALT: u8 = 6;
pub const MISSING_CATEGORY: u8 = 7;
/// The ticket did not validate, or is past its observation window.
pub const TICKET_REJECTED: u8 = 127;
