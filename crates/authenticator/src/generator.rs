//! OTP generation

use rand::RngExt;

/// Alphabet OTPs are drawn from.
pub const DIGITS: &[u8] = b"0123456789";

/// Source of fresh OTP strings.
///
/// Swapping the implementation changes where randomness comes from, never
/// the shape of the output: `generate(n)` always yields `n` characters of
/// [`DIGITS`].
pub trait SecretGenerator: Send + Sync {
    fn generate(&self, length: usize) -> String;
}

/// Default generator backed by the thread-local `rand` RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct DigitGenerator;

impl SecretGenerator for DigitGenerator {
    fn generate(&self, length: usize) -> String {
        let mut rng = rand::rng();
        (0..length)
            .map(|_| DIGITS[rng.random_range(0..DIGITS.len())] as char)
            .collect()
    }
}
