use crate::Generator;
use rand::Rng;
use snip_core::ShortCode;
use typed_builder::TypedBuilder;

/// The 62-symbol alphabet generated codes are drawn from.
pub const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ1234567890";

/// Default length of generated codes.
pub const DEFAULT_CODE_LENGTH: usize = 6;

/// Fixed-length random code generator.
///
/// Uses the thread-local non-cryptographic RNG. Collisions are expected and
/// are resolved by the caller retrying with a fresh candidate.
#[derive(Debug, Clone, TypedBuilder)]
pub struct RandomGenerator {
    #[builder(default = DEFAULT_CODE_LENGTH)]
    length: usize,
}

impl RandomGenerator {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for RandomGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for RandomGenerator {
    type Output = ShortCode;

    fn generate(&self) -> Self::Output {
        let mut rng = rand::rng();
        let code: String = (0..self.length)
            .map(|_| ALPHANUMERIC[rng.random_range(0..ALPHANUMERIC.len())] as char)
            .collect();
        ShortCode::new_unchecked(code)
    }
}
