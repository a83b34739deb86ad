#![deny(unsafe_code)]

//! Offline ticket generator and verifier.
//!
//! Runs against the same key and salt as a ticket server, but without seed
//! archives: it proves what a ticket *says*, not that the seed was ever in
//! a category. Scripts drive it through the exit code; humans read stdout.

mod exit_code;
mod material;

use std::process::ExitCode;

use chrono::{Duration, Utc};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use seedgate_core::{
    Blocks,
    clock,
    ticket::{clean, open, pretty, seal},
};

/// Generate or validate a seed ticket offline.
#[derive(Parser)]
#[command(name = "seedgate")]
#[command(author, version)]
#[command(after_help = "EXAMPLES:
    # Mint a ticket for a known seed
    seedgate --key key.hex --salt salt.hex --cat 7 --seed -4530634556500121041

    # Check a ticket somebody presented
    seedgate --key key.hex --salt salt.hex --seed -4530634556500121041 \\
        --ticket 23d6a0b8a462e2b1-8b0015d599045d6f-64d276ab52f9d67a-5dea65cd7e371932
")]
struct Cli {
    /// The seed to generate or validate a ticket for.
    #[arg(long, value_name = "INT", default_value = "404", allow_hyphen_values = true)]
    seed: String,

    /// The category that seed falls into.
    #[arg(long, value_name = "INT")]
    cat: Option<u8>,

    /// The time the seed becomes valid, in ⅛-second ticks since
    /// 2021-01-01 UTC. Leave blank to use the current time.
    #[arg(long, value_name = "INT")]
    time: Option<u32>,

    /// The secret key for this ticket. Ideally a filename, but a
    /// hex-encoded string also works.
    #[arg(long, value_name = "FILE/HEX", required = true)]
    key: String,

    /// The salt for this ticket. Optional for validation. Ideally a
    /// filename; a hex string works, with a text string as a fallback.
    #[arg(long, value_name = "FILE/HEX/STRING")]
    salt: Option<String>,

    /// How many seconds a ticket remains "live" after creation.
    #[arg(long = "live_time", value_name = "INT", default_value_t = 7_200)]
    live_time: u64,

    /// Seconds until a ticket transitions from "dead" to invalid/expired.
    #[arg(long = "dead_time", value_name = "INT", default_value_t = 14 * 86_400)]
    dead_time: u64,

    /// The ticket to be validated.
    #[arg(long, value_name = "HEX")]
    ticket: Option<String>,

    /// The number of blocks in the ticket. Only used for generation.
    #[arg(long, value_name = "SIZE", default_value = "2")]
    blocks: Blocks,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);
    ExitCode::from(run(&cli))
}

fn run(cli: &Cli) -> u8 {
    let Some(key) = material::load_key(&cli.key) else {
        println!(
            "ERROR: An invalid key was given! It must be a file or hex string, and either 16, 24, or 32 bytes long."
        );
        return exit_code::BAD_KEY;
    };

    let salt = match &cli.salt {
        None => None,
        Some(arg) => match material::load_salt(arg) {
            Some(salt) => Some(salt),
            None => {
                println!(
                    "ERROR: An invalid salt was given! It must be a file or string, between 24 and 64 bytes in size."
                );
                return exit_code::BAD_SALT;
            }
        },
    };

    let Ok(seed) = cli.seed.parse::<i64>() else {
        println!("ERROR: An invalid seed was given! It should be smaller.");
        return exit_code::BAD_SEED;
    };
    let seed_bytes = seed.to_be_bytes();

    let tick = cli.time.unwrap_or_else(clock::now);

    match &cli.ticket {
        Some(text) => validate(cli, seed, &seed_bytes, text, &key, salt.as_ref()),
        None => generate(cli, seed, &seed_bytes, tick, &key, salt.as_ref()),
    }
}

fn validate(
    cli: &Cli,
    seed: i64,
    seed_bytes: &[u8; 8],
    text: &str,
    key: &seedgate_core::PrivateKey,
    salt: Option<&seedgate_core::Salt>,
) -> u8 {
    let ticket = clean(text);
    if ticket.is_empty() {
        println!("ERROR: An invalid ticket was given! It must be a hex string.");
        return exit_code::BAD_TICKET;
    }
    if ticket.len() != 16 && ticket.len() != 32 {
        println!(
            "ERROR: An invalid ticket was given! It must be either 16 or 32 bytes in size, and with the proper hyphenation."
        );
        return exit_code::BAD_TICKET_SIZE;
    }

    let rejected = || {
        println!("The ticket is INVALID/EXPIRED!");
        println!("  TICKET: {}", pretty(&ticket));
        exit_code::TICKET_REJECTED
    };

    let Some(claims) = open(seed_bytes, &ticket, key, salt) else {
        return rejected();
    };
    if cli.cat.is_some_and(|cat| cat != claims.category) {
        return rejected();
    }

    let creation = clock::decode(claims.tick);
    let millis = (Utc::now() - creation).num_milliseconds();
    let seconds = (millis + 500).div_euclid(1000);

    if seconds > cli.dead_time as i64 {
        return rejected();
    }

    if seconds > cli.live_time as i64 {
        println!(
            "The ticket is DEAD; if it was not submitted for verification while it was live, it is invalid."
        );
        println!("    TIME: {}", creation.format("%Y/%m/%d %H:%M %Z"));
    } else {
        println!("The ticket is LIVE, and could be a viable record if submitted for validation.");
        let remaining = cli.live_time as i64 - seconds;
        println!(
            " EXPIRES: In {} hours, {} minutes, and {} seconds.",
            remaining / 3600,
            (remaining / 60) % 60,
            remaining % 60
        );
    }

    println!("  TICKET: {}", pretty(&ticket));
    println!("    SEED: {seed}");
    println!("     CAT: {}", claims.category);
    if salt.is_none() {
        println!(" WARNING: No value for the salt was provided, so this could be a forged ticket.");
    }

    exit_code::SUCCESS
}

fn generate(
    cli: &Cli,
    seed: i64,
    seed_bytes: &[u8; 8],
    tick: u32,
    key: &seedgate_core::PrivateKey,
    salt: Option<&seedgate_core::Salt>,
) -> u8 {
    let Some(salt) = salt else {
        println!("ERROR: A salt is necessary for generating a ticket!");
        return exit_code::MISSING_SALT;
    };
    let Some(cat) = cli.cat else {
        println!("ERROR: A category is necessary for generating a ticket!");
        return exit_code::MISSING_CATEGORY;
    };

    let ticket = seal(seed_bytes, cat, tick, salt, key, cli.blocks);
    let expires = clock::decode(tick) + Duration::seconds(cli.live_time as i64);
    tracing::debug!(tick, %expires, "minted ticket");

    println!("Here is a ticket for seed {seed}:");
    println!(" TICKET: {}", pretty(&ticket));

    exit_code::SUCCESS
}

fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(std::io::stderr)
        .init();
}
