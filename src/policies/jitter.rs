//! # Jitter applied to reconnect delays.
//!
//! Many processes lose the broker at the same moment; without jitter they all
//! come back at the same moment too.

use std::time::Duration;

use rand::Rng;

/// Randomization mixed into a computed delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Use the delay as computed.
    #[default]
    None,
    /// Anywhere in `[0, delay]`.
    Full,
    /// `delay/2` plus anywhere in `[0, delay/2]`.
    Equal,
}

impl JitterPolicy {
    /// Returns `delay` with this policy's randomness applied.
    pub fn apply(self, delay: Duration) -> Duration {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        if ms == 0 {
            return delay;
        }
        let mut rng = rand::rng();
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => Duration::from_millis(rng.random_range(0..=ms)),
            JitterPolicy::Equal => {
                let half = ms / 2;
                Duration::from_millis(half + rng.random_range(0..=ms - half))
            }
        }
    }
}
