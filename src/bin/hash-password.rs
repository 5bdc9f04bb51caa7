use bcrypt::{hash, DEFAULT_COST};
use std::env;

/// Produce a bcrypt hash for the ADMIN_HASH_PASSWORD bootstrap variable.
fn main() {
    let password = env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: cargo run --bin hash-password <PASSWORD>");
        std::process::exit(1);
    });

    if password.len() < 8 {
        eprintln!("Refusing to hash a password shorter than 8 characters.");
        std::process::exit(1);
    }

    match hash(&password, DEFAULT_COST) {
        Ok(hashed) => {
            println!("ADMIN_HASH_PASSWORD={}", hashed);
            eprintln!("(cost {}; add the line above to your .env)", DEFAULT_COST);
        }
        Err(e) => {
            eprintln!("Error hashing password: {}", e);
            std::process::exit(1);
        }
    }
}
