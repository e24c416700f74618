use std::time::Duration;
use typed_builder::TypedBuilder;

pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Tunables of a [`ShortenerService`](crate::ShortenerService).
///
/// The length of generated codes belongs to the generator, see
/// [`RandomGenerator`](snip_generator::RandomGenerator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, TypedBuilder)]
pub struct ShortenerSettings {
    /// How many candidate codes are tried before giving up.
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: usize,
    /// Delay between two hard-delete sweeps.
    #[builder(default = DEFAULT_SWEEP_INTERVAL)]
    pub sweep_interval: Duration,
}

impl Default for ShortenerSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}
