//! Edge detection between consecutive scans

use crate::error::{Error, Result};

/// Last observed bit vector of one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankState {
    bits: Vec<bool>,
}

impl BankState {
    /// All contacts open (pulled high), i.e. everything released
    pub fn released(len: usize) -> Self {
        Self {
            bits: vec![true; len],
        }
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Indices whose value differs from the previous scan, ascending.
    ///
    /// Every reported index is overwritten with its new value. The state is
    /// left untouched when `current` has the wrong length.
    pub fn diff(&mut self, current: &[bool]) -> Result<Vec<usize>> {
        if current.len() != self.bits.len() {
            return Err(Error::LengthMismatch {
                expected: self.bits.len(),
                actual: current.len(),
            });
        }

        let mut changed = Vec::new();
        for (idx, (previous, &now)) in self.bits.iter_mut().zip(current).enumerate() {
            if *previous != now {
                *previous = now;
                changed.push(idx);
            }
        }

        Ok(changed)
    }
}

/// Contact bounce filter placed in front of [`BankState::diff`].
///
/// A position only takes a new level once that level has been sampled on
/// `required` consecutive scans. With `required <= 1` samples pass through.
#[derive(Debug, Clone)]
pub struct StableFilter {
    required: u32,
    stable: Vec<bool>,
    streak: Vec<u32>,
}

impl StableFilter {
    pub fn new(len: usize, required: u32) -> Self {
        Self {
            required,
            stable: vec![true; len],
            streak: vec![0; len],
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.required <= 1
    }

    /// Feed one raw sample, get the debounced vector back
    pub fn apply(&mut self, sample: &[bool]) -> Result<Vec<bool>> {
        if sample.len() != self.stable.len() {
            return Err(Error::LengthMismatch {
                expected: self.stable.len(),
                actual: sample.len(),
            });
        }
        if self.is_passthrough() {
            self.stable.copy_from_slice(sample);
            return Ok(sample.to_vec());
        }

        for ((stable, streak), &raw) in self.stable.iter_mut().zip(&mut self.streak).zip(sample) {
            if raw == *stable {
                *streak = 0;
                continue;
            }
            *streak += 1;
            if *streak >= self.required {
                *stable = raw;
                *streak = 0;
            }
        }

        Ok(self.stable.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bits(s: &str) -> Vec<bool> {
        s.chars().map(|c| c == '1').collect()
    }

    #[test]
    fn test_initial_state_is_released() {
        let state = BankState::released(4);
        assert_eq!(state.bits(), bits("1111").as_slice());
    }

    #[test]
    fn test_diff_reports_and_records_changes() {
        let mut state = BankState::released(3);

        assert_eq!(state.diff(&bits("101")).unwrap(), vec![1]);
        assert_eq!(state.bits(), bits("101").as_slice());

        assert_eq!(state.diff(&bits("101")).unwrap(), Vec::<usize>::new());
        assert_eq!(state.diff(&bits("010")).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_diff_rejects_wrong_length() {
        let mut state = BankState::released(3);
        assert_eq!(
            state.diff(&bits("1010")),
            Err(Error::LengthMismatch { expected: 3, actual: 4 })
        );
        assert_eq!(state.bits(), bits("111").as_slice());
    }

    #[test]
    fn test_filter_passthrough() {
        let mut filter = StableFilter::new(2, 0);
        assert_eq!(filter.apply(&bits("01")).unwrap(), bits("01"));
        assert_eq!(filter.apply(&bits("10")).unwrap(), bits("10"));
    }

    #[test]
    fn test_filter_ignores_short_glitch() {
        let mut filter = StableFilter::new(2, 3);

        assert_eq!(filter.apply(&bits("01")).unwrap(), bits("11"));
        assert_eq!(filter.apply(&bits("01")).unwrap(), bits("11"));
        // Bounce back resets the streak
        assert_eq!(filter.apply(&bits("11")).unwrap(), bits("11"));
        assert_eq!(filter.apply(&bits("01")).unwrap(), bits("11"));
        assert_eq!(filter.apply(&bits("01")).unwrap(), bits("11"));
        assert_eq!(filter.apply(&bits("01")).unwrap(), bits("01"));
    }

    proptest! {
        #[test]
        fn prop_diff_is_exact_difference(pair in (1usize..96).prop_flat_map(|n| {
            (proptest::collection::vec(any::<bool>(), n), proptest::collection::vec(any::<bool>(), n))
        })) {
            let (v1, v2) = pair;
            let mut state = BankState { bits: v1.clone() };

            let expected: Vec<usize> = (0..v1.len()).filter(|&i| v1[i] != v2[i]).collect();
            prop_assert_eq!(state.diff(&v2).unwrap(), expected);
            prop_assert_eq!(state.bits(), v2.as_slice());
            prop_assert!(state.diff(&v2).unwrap().is_empty());
        }
    }
}
