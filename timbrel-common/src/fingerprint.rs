//! Timbral fingerprints
//!
//! A fingerprint is the fixed-width numeric summary of one recording's
//! timbre: 13 time-averaged mel-cepstral coefficients, f32 end to end.
//! The constructor is the single place dimensionality is checked; the
//! catalog, the cluster model, and the recommendation path all rely on the
//! type instead of re-validating shapes at every call site.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of cepstral coefficients in every fingerprint
pub const FINGERPRINT_DIM: usize = 13;

/// Fingerprint construction errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FingerprintError {
    /// Coefficient count differs from the fixed fingerprint width
    #[error("expected {FINGERPRINT_DIM} coefficients, got {0}")]
    Dimensionality(usize),

    /// NaN or infinite coefficient
    #[error("non-finite coefficient at index {0}")]
    NonFinite(usize),
}

/// Fixed-width timbral summary of one recording
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint([f32; FINGERPRINT_DIM]);

impl Fingerprint {
    /// Build a fingerprint from a coefficient slice.
    ///
    /// Length and finiteness are validated here, once; every downstream
    /// consumer takes the type and skips the checks.
    pub fn new(coefficients: &[f32]) -> Result<Self, FingerprintError> {
        let values: [f32; FINGERPRINT_DIM] = coefficients
            .try_into()
            .map_err(|_| FingerprintError::Dimensionality(coefficients.len()))?;
        if let Some(index) = values.iter().position(|c| !c.is_finite()) {
            return Err(FingerprintError::NonFinite(index));
        }
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Squared Euclidean distance to another fingerprint
    pub fn squared_distance(&self, other: &Fingerprint) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| {
                let d = a - b;
                d * d
            })
            .sum()
    }
}

impl From<[f32; FINGERPRINT_DIM]> for Fingerprint {
    fn from(values: [f32; FINGERPRINT_DIM]) -> Self {
        Self(values)
    }
}

impl AsRef<[f32]> for Fingerprint {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_exactly_thirteen_coefficients() {
        let fp = Fingerprint::new(&[0.5; FINGERPRINT_DIM]).unwrap();
        assert_eq!(fp.as_slice().len(), FINGERPRINT_DIM);
    }

    #[test]
    fn rejects_wrong_width() {
        assert_eq!(
            Fingerprint::new(&[0.0; 12]),
            Err(FingerprintError::Dimensionality(12))
        );
        assert_eq!(
            Fingerprint::new(&[0.0; 14]),
            Err(FingerprintError::Dimensionality(14))
        );
        assert_eq!(Fingerprint::new(&[]), Err(FingerprintError::Dimensionality(0)));
    }

    #[test]
    fn rejects_non_finite_coefficients() {
        let mut values = [1.0f32; FINGERPRINT_DIM];
        values[7] = f32::NAN;
        assert_eq!(
            Fingerprint::new(&values),
            Err(FingerprintError::NonFinite(7))
        );

        values[7] = f32::INFINITY;
        assert_eq!(
            Fingerprint::new(&values),
            Err(FingerprintError::NonFinite(7))
        );
    }

    #[test]
    fn squared_distance_is_zero_for_identical() {
        let fp = Fingerprint::from([2.5; FINGERPRINT_DIM]);
        assert_eq!(fp.squared_distance(&fp), 0.0);
    }

    #[test]
    fn squared_distance_matches_hand_computation() {
        let mut a = [0.0f32; FINGERPRINT_DIM];
        let mut b = [0.0f32; FINGERPRINT_DIM];
        a[0] = 3.0;
        b[0] = 0.0;
        a[1] = 1.0;
        b[1] = 5.0;
        let fp_a = Fingerprint::from(a);
        let fp_b = Fingerprint::from(b);
        assert_eq!(fp_a.squared_distance(&fp_b), 9.0 + 16.0);
    }

    #[test]
    fn serde_round_trip_is_exact() {
        let mut values = [0.0f32; FINGERPRINT_DIM];
        for (i, v) in values.iter_mut().enumerate() {
            *v = 0.1 + i as f32 / 3.0;
        }
        let fp = Fingerprint::from(values);
        let json = serde_json::to_string(&fp).unwrap();
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(fp, back);
    }
}
