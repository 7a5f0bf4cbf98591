//! Sign a token and check it at simulated times
//!
//! Usage:
//!   cargo run --example sign_token -- --secret "your-secret-key" --data "user:42"
//!   cargo run --example sign_token -- --data "user:42" --minutes 5

use std::sync::Arc;

use brief_token::{FixedClock, Mint, TokenError};
use chrono::{Duration, Utc};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "sign_token")]
#[command(about = "Sign data into a brief token and verify it", long_about = None)]
struct Args {
    /// HMAC secret (a random secret is generated if omitted)
    #[arg(long, env = "BRIEF_SECRET")]
    secret: Option<String>,

    /// Data to sign
    #[arg(long, default_value = "hello")]
    data: String,

    /// Token validity in minutes
    #[arg(long, default_value = "60")]
    minutes: i64,
}

fn main() {
    let args = Args::parse();

    let now = Utc::now();
    let clock = Arc::new(FixedClock::new(now));
    let mint = match args.secret {
        Some(secret) => Mint::new(secret.into_bytes()),
        None => Mint::lazy(),
    }
    .with_clock(clock.clone());

    let token = match mint.sign(args.data.as_bytes(), now + Duration::minutes(args.minutes)) {
        Ok(token) => token,
        Err(e) => {
            eprintln!("Failed to sign token: {}", e);
            std::process::exit(1);
        }
    };
    let serialized = token.to_string();

    println!("Token:   {}", serialized);
    println!("Expires: {}", token.expiry().format("%Y-%m-%d %H:%M:%S UTC"));

    match mint.verify_string(&serialized) {
        Ok(t) => println!("Now:          valid ({} payload bytes)", t.payload().len()),
        Err(e) => println!("Now:          {}", e),
    }

    clock.set(token.expiry() + Duration::seconds(1));
    match mint.verify_string(&serialized) {
        Err(TokenError::Expired) => println!("After expiry: expired"),
        Ok(_) => println!("After expiry: unexpectedly valid"),
        Err(e) => println!("After expiry: {}", e),
    }
}
