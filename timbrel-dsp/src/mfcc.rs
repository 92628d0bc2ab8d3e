//! Mel-frequency cepstral analysis
//!
//! Short-time spectral transform over sliding windows: Hann-windowed
//! 2048-point FFT frames at hop 512, power spectrum, 128-band Slaney-style
//! mel filterbank, log compression, orthonormal DCT-II, first 13
//! coefficients. The per-frame coefficients are reduced to one fingerprint
//! by arithmetic mean per coefficient.
//!
//! Frames are centered with reflect padding, so any non-empty signal yields
//! at least one frame.

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::f32::consts::PI;
use std::sync::Arc;
use thiserror::Error;
use timbrel_common::fingerprint::{Fingerprint, FINGERPRINT_DIM};

/// FFT frame length
pub const N_FFT: usize = 2048;

/// Samples between successive frames
pub const HOP_LENGTH: usize = 512;

/// Mel filterbank size
pub const N_MELS: usize = 128;

/// Floor applied before the log so silent bands stay finite
const LOG_FLOOR: f32 = 1e-10;

/// MFCC analysis errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MfccError {
    #[error("signal is empty")]
    EmptySignal,

    #[error("sample rate must be positive")]
    ZeroSampleRate,

    #[error("analysis produced a non-finite coefficient")]
    Degenerate,

    #[error("fft failed: {0}")]
    Fft(String),
}

/// Reusable MFCC analyzer for one sample rate
pub struct MfccAnalyzer {
    sample_rate: u32,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    mel_filters: Vec<Vec<f32>>,
    dct_basis: Vec<Vec<f32>>,
}

impl MfccAnalyzer {
    pub fn new(sample_rate: u32) -> Result<Self, MfccError> {
        if sample_rate == 0 {
            return Err(MfccError::ZeroSampleRate);
        }
        let mut planner = RealFftPlanner::<f32>::new();
        Ok(Self {
            sample_rate,
            fft: planner.plan_fft_forward(N_FFT),
            window: hann_window(N_FFT),
            mel_filters: mel_filterbank(sample_rate, N_FFT, N_MELS),
            dct_basis: dct_basis(FINGERPRINT_DIM, N_MELS),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Mean MFCC vector across every frame of `samples`
    pub fn mean_mfcc(&self, samples: &[f32]) -> Result<Fingerprint, MfccError> {
        if samples.is_empty() {
            return Err(MfccError::EmptySignal);
        }

        let padded = reflect_pad(samples, N_FFT / 2);
        if padded.len() < N_FFT {
            return Err(MfccError::EmptySignal);
        }
        let n_frames = 1 + (padded.len() - N_FFT) / HOP_LENGTH;

        let mut sums = [0.0f64; FINGERPRINT_DIM];
        let mut frame = vec![0.0f32; N_FFT];
        let mut spectrum: Vec<Complex<f32>> = self.fft.make_output_vec();
        let mut scratch = self.fft.make_scratch_vec();
        let mut power = vec![0.0f32; N_FFT / 2 + 1];
        let mut mel_log = vec![0.0f32; N_MELS];

        for frame_index in 0..n_frames {
            let start = frame_index * HOP_LENGTH;
            for (out, (&sample, &w)) in frame
                .iter_mut()
                .zip(padded[start..start + N_FFT].iter().zip(&self.window))
            {
                *out = sample * w;
            }

            self.fft
                .process_with_scratch(&mut frame, &mut spectrum, &mut scratch)
                .map_err(|e| MfccError::Fft(e.to_string()))?;
            for (p, c) in power.iter_mut().zip(&spectrum) {
                *p = c.norm_sqr();
            }

            for (log_energy, filter) in mel_log.iter_mut().zip(&self.mel_filters) {
                let energy: f32 = filter.iter().zip(&power).map(|(w, p)| w * p).sum();
                *log_energy = 10.0 * energy.max(LOG_FLOOR).log10();
            }

            for (sum, basis) in sums.iter_mut().zip(&self.dct_basis) {
                let coefficient: f32 = basis.iter().zip(&mel_log).map(|(b, v)| b * v).sum();
                *sum += coefficient as f64;
            }
        }

        let mut means = [0.0f32; FINGERPRINT_DIM];
        for (mean, &sum) in means.iter_mut().zip(&sums) {
            *mean = (sum / n_frames as f64) as f32;
        }
        Fingerprint::new(&means).map_err(|_| MfccError::Degenerate)
    }
}

/// Periodic Hann window: sin^2(pi n / N)
fn hann_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let s = (PI * i as f32 / len as f32).sin();
            s * s
        })
        .collect()
}

/// Bounce an out-of-range index back into [0, n), reflecting at both edges
/// without repeating them
fn reflect_index(i: isize, n: isize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n - 1);
    let mut j = i.rem_euclid(period);
    if j >= n {
        j = period - j;
    }
    j as usize
}

/// Pad `pad` reflected samples onto both ends of the signal
fn reflect_pad(samples: &[f32], pad: usize) -> Vec<f32> {
    let n = samples.len() as isize;
    (-(pad as isize)..n + pad as isize)
        .map(|i| samples[reflect_index(i, n)])
        .collect()
}

/// Slaney-style mel scale: linear below 1 kHz, logarithmic above
fn hz_to_mel(hz: f32) -> f32 {
    const F_SP: f32 = 200.0 / 3.0;
    const MIN_LOG_HZ: f32 = 1000.0;
    const MIN_LOG_MEL: f32 = MIN_LOG_HZ / F_SP;
    let logstep = (6.4f32).ln() / 27.0;
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / logstep
    } else {
        hz / F_SP
    }
}

fn mel_to_hz(mel: f32) -> f32 {
    const F_SP: f32 = 200.0 / 3.0;
    const MIN_LOG_HZ: f32 = 1000.0;
    const MIN_LOG_MEL: f32 = MIN_LOG_HZ / F_SP;
    let logstep = (6.4f32).ln() / 27.0;
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * ((mel - MIN_LOG_MEL) * logstep).exp()
    } else {
        mel * F_SP
    }
}

/// Triangular mel filterbank over FFT bins, area-normalized per band
fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<Vec<f32>> {
    let n_bins = n_fft / 2 + 1;
    let nyquist = sample_rate as f32 / 2.0;

    let mel_min = hz_to_mel(0.0);
    let mel_max = hz_to_mel(nyquist);
    let edges: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f32 / (n_mels + 1) as f32))
        .collect();
    let bin_hz: Vec<f32> = (0..n_bins)
        .map(|b| b as f32 * sample_rate as f32 / n_fft as f32)
        .collect();

    let mut filters = vec![vec![0.0f32; n_bins]; n_mels];
    for (m, filter) in filters.iter_mut().enumerate() {
        let (lower, center, upper) = (edges[m], edges[m + 1], edges[m + 2]);
        let norm = 2.0 / (upper - lower);
        for (weight, &f) in filter.iter_mut().zip(&bin_hz) {
            let shape = if f <= lower || f >= upper {
                0.0
            } else if f <= center {
                (f - lower) / (center - lower)
            } else {
                (upper - f) / (upper - center)
            };
            *weight = shape * norm;
        }
    }
    filters
}

/// Orthonormal DCT-II basis, `n_out` rows over `n_in` inputs
fn dct_basis(n_out: usize, n_in: usize) -> Vec<Vec<f32>> {
    let scale0 = (1.0 / n_in as f32).sqrt();
    let scale = (2.0 / n_in as f32).sqrt();
    (0..n_out)
        .map(|k| {
            (0..n_in)
                .map(|n| {
                    if k == 0 {
                        scale0
                    } else {
                        let angle = PI * k as f32 * (2 * n + 1) as f32 / (2 * n_in) as f32;
                        scale * angle.cos()
                    }
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency: f32, duration_secs: f32, sample_rate: u32) -> Vec<f32> {
        let frames = (duration_secs * sample_rate as f32) as usize;
        (0..frames)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (2.0 * PI * frequency * t).sin() * 0.5
            })
            .collect()
    }

    #[test]
    fn fingerprint_width_is_constant_across_durations() {
        let analyzer = MfccAnalyzer::new(22_050).unwrap();
        for duration in [0.05, 0.5, 2.0, 5.0] {
            let fp = analyzer.mean_mfcc(&sine(440.0, duration, 22_050)).unwrap();
            assert_eq!(fp.as_slice().len(), FINGERPRINT_DIM);
            assert!(fp.as_slice().iter().all(|c| c.is_finite()));
        }
    }

    #[test]
    fn empty_signal_is_rejected() {
        let analyzer = MfccAnalyzer::new(22_050).unwrap();
        assert_eq!(analyzer.mean_mfcc(&[]), Err(MfccError::EmptySignal));
    }

    #[test]
    fn zero_sample_rate_is_rejected() {
        assert!(matches!(MfccAnalyzer::new(0), Err(MfccError::ZeroSampleRate)));
    }

    #[test]
    fn sub_frame_signal_still_yields_one_fingerprint() {
        let analyzer = MfccAnalyzer::new(22_050).unwrap();
        // Shorter than one hop, far shorter than one FFT frame
        let fp = analyzer.mean_mfcc(&sine(440.0, 0.005, 22_050)).unwrap();
        assert_eq!(fp.as_slice().len(), FINGERPRINT_DIM);
    }

    #[test]
    fn silence_stays_finite() {
        let analyzer = MfccAnalyzer::new(22_050).unwrap();
        let fp = analyzer.mean_mfcc(&vec![0.0; 22_050]).unwrap();
        assert!(fp.as_slice().iter().all(|c| c.is_finite()));
    }

    #[test]
    fn analysis_is_deterministic() {
        let analyzer = MfccAnalyzer::new(22_050).unwrap();
        let signal = sine(440.0, 1.0, 22_050);
        let first = analyzer.mean_mfcc(&signal).unwrap();
        let second = analyzer.mean_mfcc(&signal).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn distinct_timbres_yield_distinct_fingerprints() {
        let analyzer = MfccAnalyzer::new(22_050).unwrap();
        let low = analyzer.mean_mfcc(&sine(220.0, 1.0, 22_050)).unwrap();
        let high = analyzer.mean_mfcc(&sine(4_000.0, 1.0, 22_050)).unwrap();
        assert!(low.squared_distance(&high) > 1.0);
    }

    #[test]
    fn mel_filters_cover_the_spectrum() {
        let filters = mel_filterbank(22_050, N_FFT, N_MELS);
        assert_eq!(filters.len(), N_MELS);
        // Every band has some mass, every band is finite
        for filter in &filters {
            assert_eq!(filter.len(), N_FFT / 2 + 1);
            assert!(filter.iter().all(|w| w.is_finite() && *w >= 0.0));
            assert!(filter.iter().any(|w| *w > 0.0));
        }
    }

    #[test]
    fn reflect_padding_bounces_without_repeating_edges() {
        let signal = [1.0f32, 2.0, 3.0, 4.0];
        let padded = reflect_pad(&signal, 2);
        assert_eq!(padded, vec![3.0, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0, 2.0]);
    }

    #[test]
    fn reflect_padding_handles_signals_shorter_than_the_pad() {
        let signal = [1.0f32, 2.0];
        let padded = reflect_pad(&signal, 5);
        assert_eq!(padded.len(), 12);
        assert!(padded.iter().all(|s| *s == 1.0 || *s == 2.0));
    }
}
