//! CLI tool to produce an Argon2 hash for `admin.password_hash`.
//!
//! Usage: `cargo run --bin hash-password -- 'my password'`
//! or pipe the password on stdin to keep it out of shell history.

use anyhow::{bail, Context, Result};
use std::io::BufRead;

use brokerage::services::hash_password;

fn main() -> Result<()> {
    let password = match std::env::args().nth(1) {
        Some(arg) => arg,
        None => {
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("failed to read password from stdin")?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    if password.is_empty() {
        bail!("password cannot be empty");
    }

    println!("{}", hash_password(&password)?);
    Ok(())
}
