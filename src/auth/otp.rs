//! One-time code generation.

use rand::{rngs::OsRng, RngCore};

/// The 62 symbols a code is drawn from.
pub const OTP_ALPHABET: &[u8; 62] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

// Largest multiple of 62 that fits in a byte; bytes at or above it are redrawn
// so every symbol keeps the same probability.
const ACCEPT_BELOW: u8 = 248;

/// Generate a `length`-character alphanumeric code from the OS random source.
///
/// # Errors
/// Returns the random source error; nothing is generated partially.
pub fn generate_code(length: usize) -> Result<String, rand::Error> {
    generate_code_with(&mut OsRng, length)
}

/// Generate a code from the given random source.
///
/// # Errors
/// Returns the random source error.
pub fn generate_code_with<R: RngCore + ?Sized>(
    rng: &mut R,
    length: usize,
) -> Result<String, rand::Error> {
    let mut code = String::with_capacity(length);
    let mut buffer = [0u8; 64];

    while code.len() < length {
        rng.try_fill_bytes(&mut buffer)?;
        for byte in buffer {
            if code.len() == length {
                break;
            }
            if byte < ACCEPT_BELOW {
                let symbol = OTP_ALPHABET[usize::from(byte % 62)];
                code.push(char::from(symbol));
            }
        }
    }

    Ok(code)
}
