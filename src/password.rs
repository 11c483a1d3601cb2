//! Random password generation for `PASSWORD_` placeholders

use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::{ProvisionError, Result};

pub const MIN_PASSWORD_LENGTH: usize = 5;
pub const MAX_PASSWORD_LENGTH: usize = 128;

pub const PUNCTUATION: &[u8] = b"!@$&?";
const DIGITS: &[u8] = b"0123456789";
// I and O are left out, they read like 1 and 0
const UPPERCASE: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
// l and o are left out for the same reason
const LOWERCASE: &[u8] = b"abcdefghijkmnpqrstuvwxyz";

/// Produces secrets for password placeholders
pub trait PasswordGenerator: Send + Sync {
    /// Generate a password of exactly `length` characters containing exactly
    /// `non_alphanumeric` punctuation characters and at least one digit,
    /// uppercase and lowercase letter.
    fn generate(&self, length: usize, non_alphanumeric: usize) -> Result<String>;
}

/// [`PasswordGenerator`] backed by the thread-local RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPasswordGenerator;

impl PasswordGenerator for RandomPasswordGenerator {
    fn generate(&self, length: usize, non_alphanumeric: usize) -> Result<String> {
        validate(length, non_alphanumeric)?;

        let mut rng = rand::thread_rng();
        let alphanumeric = length - non_alphanumeric;
        // leave room for at least one uppercase and one lowercase letter
        let digits = rng.gen_range(1..=alphanumeric - 2);
        let uppercase = rng.gen_range(1..=alphanumeric - digits - 1);
        let lowercase = alphanumeric - digits - uppercase;

        let mut chars = Vec::with_capacity(length);
        for (class, count) in [
            (DIGITS, digits),
            (UPPERCASE, uppercase),
            (LOWERCASE, lowercase),
            (PUNCTUATION, non_alphanumeric),
        ] {
            chars.extend((0..count).map(|_| class[rng.gen_range(0..class.len())]));
        }
        chars.shuffle(&mut rng);

        Ok(chars.into_iter().map(char::from).collect())
    }
}

fn validate(length: usize, non_alphanumeric: usize) -> Result<()> {
    if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&length) {
        return Err(ProvisionError::InvalidArgument(format!(
            "password length {} outside {}..={}",
            length, MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH
        )));
    }
    if non_alphanumeric > length - 4 {
        return Err(ProvisionError::InvalidArgument(format!(
            "{} non-alphanumeric characters do not fit a password of length {}",
            non_alphanumeric, length
        )));
    }
    Ok(())
}
