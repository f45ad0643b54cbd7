use rand::{rngs::SmallRng, Rng, SeedableRng as _};
use tracing::trace;

use crate::{client::validate_sampling_rate, error::StatsdError};

/// Decides which events are reported, given a sampling rate.
///
/// The decision is kept apart from encoding: the client only labels lines with the sampling rate, and it is up to the
/// caller to consult a `Sampler` before recording an event that should be sampled.
pub struct Sampler<R = SmallRng> {
    rate: f32,
    rng: R,
}

impl Sampler {
    /// Creates a new `Sampler` with a random source seeded from the thread-local generator.
    ///
    /// # Errors
    ///
    /// If `rate` is not in `(0.0, 1.0]`, an error is returned.
    pub fn new(rate: f32) -> Result<Self, StatsdError> {
        Self::with_rng(rate, SmallRng::from_rng(&mut rand::rng()))
    }
}

impl<R: Rng> Sampler<R> {
    /// Creates a new `Sampler` with the given random source.
    ///
    /// # Errors
    ///
    /// If `rate` is not in `(0.0, 1.0]`, an error is returned.
    pub fn with_rng(rate: f32, rng: R) -> Result<Self, StatsdError> {
        validate_sampling_rate(rate)?;
        Ok(Sampler { rate, rng })
    }

    /// Returns the sampling rate.
    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Returns `true` if the next event should be reported.
    ///
    /// Always `true` when the rate is 1.0. Otherwise, a value is drawn uniformly from `[0.0, 1.0)` and the event is
    /// reported if that value is no greater than the rate.
    pub fn should_sample(&mut self) -> bool {
        if self.rate >= 1.0 {
            return true;
        }

        let p: f32 = self.rng.random();
        trace!(p, rate = self.rate, "Sampling decision.");
        p <= self.rate
    }
}
