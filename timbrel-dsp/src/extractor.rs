//! Fingerprint extraction
//!
//! Front door of the signal path: decoded audio (or raw samples) in, one
//! 13-coefficient fingerprint out. Pure over its input; decoding reads the
//! file or byte buffer it is handed and nothing else.

use crate::decoder::{AudioDecoder, DecodeError, DecodedAudio, ANALYSIS_WINDOW_SECS};
use crate::mfcc::{MfccAnalyzer, MfccError};
use std::path::Path;
use thiserror::Error;
use timbrel_common::Fingerprint;

/// Why a recording could not be fingerprinted.
///
/// Recoverable during batch catalog building (the item is skipped) and
/// user-visible during an interactive query.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("analysis failed: {0}")]
    Analysis(#[from] MfccError),
}

/// Turns one audio signal into one fingerprint
#[derive(Default)]
pub struct FeatureExtractor {
    decoder: AudioDecoder,
}

impl FeatureExtractor {
    pub fn new(decoder: AudioDecoder) -> Self {
        Self { decoder }
    }

    /// Fingerprint an audio file on disk
    pub fn extract_file(&self, path: &Path) -> Result<Fingerprint, ExtractionError> {
        let audio = self.decoder.decode_file(path)?;
        self.extract_decoded(&audio)
    }

    /// Fingerprint in-memory audio bytes, e.g. an uploaded query file
    pub fn extract_bytes(
        &self,
        bytes: Vec<u8>,
        extension_hint: Option<&str>,
    ) -> Result<Fingerprint, ExtractionError> {
        let audio = self.decoder.decode_bytes(bytes, extension_hint)?;
        self.extract_decoded(&audio)
    }

    /// Fingerprint already-decoded mono samples.
    ///
    /// Only the leading analysis window is used, so fingerprints stay
    /// comparable regardless of recording length.
    pub fn extract_samples(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<Fingerprint, ExtractionError> {
        let analyzer = MfccAnalyzer::new(sample_rate)?;
        let cap = sample_rate as usize * ANALYSIS_WINDOW_SECS as usize;
        let window = &samples[..samples.len().min(cap)];
        Ok(analyzer.mean_mfcc(window)?)
    }

    fn extract_decoded(&self, audio: &DecodedAudio) -> Result<Fingerprint, ExtractionError> {
        tracing::debug!(
            "analyzing {:.1}s of audio at {} Hz",
            audio.duration_seconds(),
            audio.sample_rate
        );
        self.extract_samples(&audio.samples, audio.sample_rate)
    }
}
