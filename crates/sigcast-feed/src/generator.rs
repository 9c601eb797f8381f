//! Sample value generation.
//!
//! Every tick draws a uniform value in [0, 100). The draw decides the state
//! (`Ok` below 50, `Bad` otherwise) and is mapped to the signal's kind.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sigcast_core::{SignalKind, SignalState};

/// Draws below this value are reported as `Ok`.
const OK_THRESHOLD: f32 = 50.0;

/// Map a draw in [0, 100) to the value and state of a sample.
pub fn sample_for(kind: SignalKind, draw: f32) -> (f32, SignalState) {
    let state = if draw < OK_THRESHOLD {
        SignalState::Ok
    } else {
        SignalState::Bad
    };

    let value = match kind {
        SignalKind::Analog => draw,
        SignalKind::Discrete => (draw / 10.0).ceil(),
        SignalKind::Digital => {
            if draw < OK_THRESHOLD {
                0.0
            } else {
                1.0
            }
        }
    };

    (value, state)
}

/// Random source of one ticker.
#[derive(Debug)]
pub struct ValueGenerator {
    rng: StdRng,
}

impl ValueGenerator {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic generator.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draw the next sample for a signal of `kind`.
    pub fn next_sample(&mut self, kind: SignalKind) -> (f32, SignalState) {
        let draw = self.rng.gen_range(0.0f32..100.0);
        sample_for(kind, draw)
    }
}

impl Default for ValueGenerator {
    fn default() -> Self {
        Self::from_entropy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_state_threshold() {
        assert_eq!(sample_for(SignalKind::Analog, 49.9).1, SignalState::Ok);
        assert_eq!(sample_for(SignalKind::Analog, 50.0).1, SignalState::Bad);
    }

    #[test]
    fn test_discrete_rounds_up() {
        assert_eq!(sample_for(SignalKind::Discrete, 0.0).0, 0.0);
        assert_eq!(sample_for(SignalKind::Discrete, 0.5).0, 1.0);
        assert_eq!(sample_for(SignalKind::Discrete, 42.0).0, 5.0);
        assert_eq!(sample_for(SignalKind::Discrete, 99.9).0, 10.0);
    }

    #[test]
    fn test_digital_is_binary() {
        assert_eq!(sample_for(SignalKind::Digital, 12.0), (0.0, SignalState::Ok));
        assert_eq!(sample_for(SignalKind::Digital, 77.0), (1.0, SignalState::Bad));
    }

    #[test]
    fn test_seeded_generators_agree() {
        let mut a = ValueGenerator::seeded(7);
        let mut b = ValueGenerator::seeded(7);
        for _ in 0..16 {
            assert_eq!(
                a.next_sample(SignalKind::Analog),
                b.next_sample(SignalKind::Analog)
            );
        }
    }

    proptest! {
        #[test]
        fn prop_values_stay_in_range(seed in any::<u64>()) {
            let mut generator = ValueGenerator::seeded(seed);
            for kind in [SignalKind::Analog, SignalKind::Discrete, SignalKind::Digital] {
                let (value, state) = generator.next_sample(kind);
                prop_assert!(matches!(state, SignalState::Ok | SignalState::Bad));
                match kind {
                    SignalKind::Analog => prop_assert!((0.0..100.0).contains(&value)),
                    SignalKind::Discrete => {
                        prop_assert!((0.0..=10.0).contains(&value));
                        prop_assert_eq!(value.fract(), 0.0);
                    }
                    SignalKind::Digital => prop_assert!(value == 0.0 || value == 1.0),
                }
            }
        }

        #[test]
        fn prop_digital_matches_state(draw in 0.0f32..100.0) {
            let (value, state) = sample_for(SignalKind::Digital, draw);
            prop_assert_eq!(value == 0.0, state == SignalState::Ok);
        }
    }
}
