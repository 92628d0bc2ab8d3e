//! Audio decoding for the analysis pipeline
//!
//! Decodes any supported container to mono f32 PCM at the analysis sample
//! rate. Only the leading analysis window is decoded; packets past the cap
//! never leave the demuxer, which bounds cost for arbitrarily long files.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use thiserror::Error;
use tracing::debug;

/// Sample rate every signal is brought to before analysis
pub const ANALYSIS_SAMPLE_RATE: u32 = 22_050;

/// Length of the analysis window in seconds
pub const ANALYSIS_WINDOW_SECS: u32 = 30;

/// Audio decoding errors
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to open {0}: {1}")]
    Open(PathBuf, std::io::Error),

    #[error("unrecognized audio format: {0}")]
    Probe(symphonia::core::errors::Error),

    #[error("no audio track in input")]
    NoAudioTrack,

    #[error("sample rate missing from stream parameters")]
    UnknownSampleRate,

    #[error("decode failed: {0}")]
    Decode(symphonia::core::errors::Error),

    #[error("resampling failed: {0}")]
    Resample(String),

    #[error("input contains no audio frames")]
    EmptySignal,
}

/// Decoded mono PCM ready for analysis
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Mono samples, normalized to [-1.0, 1.0]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decoder producing mono PCM at a fixed target rate, capped to the
/// analysis window
pub struct AudioDecoder {
    target_sample_rate: u32,
    max_seconds: u32,
}

impl Default for AudioDecoder {
    fn default() -> Self {
        Self::new(ANALYSIS_SAMPLE_RATE, ANALYSIS_WINDOW_SECS)
    }
}

impl AudioDecoder {
    pub fn new(target_sample_rate: u32, max_seconds: u32) -> Self {
        Self {
            target_sample_rate,
            max_seconds,
        }
    }

    /// Decode an audio file from disk
    pub fn decode_file(&self, path: &Path) -> Result<DecodedAudio, DecodeError> {
        let file = std::fs::File::open(path)
            .map_err(|e| DecodeError::Open(path.to_path_buf(), e))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }
        self.decode_stream(mss, hint)
    }

    /// Decode in-memory audio bytes, e.g. an uploaded query file
    pub fn decode_bytes(
        &self,
        bytes: Vec<u8>,
        extension_hint: Option<&str>,
    ) -> Result<DecodedAudio, DecodeError> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension_hint {
            hint.with_extension(ext);
        }
        self.decode_stream(mss, hint)
    }

    fn decode_stream(
        &self,
        mss: MediaSourceStream,
        hint: Hint,
    ) -> Result<DecodedAudio, DecodeError> {
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(DecodeError::Probe)?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoAudioTrack)?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let native_rate = codec_params
            .sample_rate
            .ok_or(DecodeError::UnknownSampleRate)?;
        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(DecodeError::Decode)?;

        // Cap applied at the native rate, before resampling
        let frame_budget = native_rate as usize * self.max_seconds as usize;
        let mut mono: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => return Err(DecodeError::Decode(e)),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                // A corrupt packet mid-stream is recoverable; skip it
                Err(symphonia::core::errors::Error::DecodeError(reason)) => {
                    debug!("skipping undecodable packet: {}", reason);
                    continue;
                }
                Err(e) => return Err(DecodeError::Decode(e)),
            };
            downmix_into(&mut mono, &decoded);

            if mono.len() >= frame_budget {
                mono.truncate(frame_budget);
                break;
            }
        }

        if mono.is_empty() {
            return Err(DecodeError::EmptySignal);
        }
        debug!(
            "decoded {} mono frames at {} Hz (target {} Hz)",
            mono.len(),
            native_rate,
            self.target_sample_rate
        );

        let samples = if native_rate == self.target_sample_rate {
            mono
        } else {
            self.resample_mono(mono, native_rate)?
        };
        if samples.is_empty() {
            return Err(DecodeError::EmptySignal);
        }

        Ok(DecodedAudio {
            samples,
            sample_rate: self.target_sample_rate,
        })
    }

    /// Resample a mono signal to the target rate with sinc interpolation
    fn resample_mono(&self, samples: Vec<f32>, source_rate: u32) -> Result<Vec<f32>, DecodeError> {
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let ratio = self.target_sample_rate as f64 / source_rate as f64;
        let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)
            .map_err(|e| DecodeError::Resample(e.to_string()))?;

        let mut output = resampler
            .process(&[samples], None)
            .map_err(|e| DecodeError::Resample(e.to_string()))?;
        Ok(output.pop().unwrap_or_default())
    }
}

/// Downmix one decoded packet to mono and append it to `out`
fn downmix_into(out: &mut Vec<f32>, decoded: &AudioBufferRef<'_>) {
    match decoded {
        AudioBufferRef::F32(buf) => downmix_planes(out, buf, |s| s),
        AudioBufferRef::F64(buf) => downmix_planes(out, buf, |s| s as f32),
        AudioBufferRef::U8(buf) => downmix_planes(out, buf, |s| (s as f32 - 128.0) / 128.0),
        AudioBufferRef::U16(buf) => downmix_planes(out, buf, |s| (s as f32 - 32768.0) / 32768.0),
        AudioBufferRef::U24(buf) => {
            downmix_planes(out, buf, |s| (s.inner() as f32 - 8_388_608.0) / 8_388_608.0)
        }
        AudioBufferRef::U32(buf) => {
            downmix_planes(out, buf, |s| (s as f32 - 2_147_483_648.0) / 2_147_483_648.0)
        }
        AudioBufferRef::S8(buf) => downmix_planes(out, buf, |s| s as f32 / 128.0),
        AudioBufferRef::S16(buf) => downmix_planes(out, buf, |s| s as f32 / 32768.0),
        AudioBufferRef::S24(buf) => downmix_planes(out, buf, |s| s.inner() as f32 / 8_388_608.0),
        AudioBufferRef::S32(buf) => downmix_planes(out, buf, |s| s as f32 / 2_147_483_648.0),
    }
}

/// Average all channels of a planar buffer into mono f32
fn downmix_planes<S, F>(out: &mut Vec<f32>, buf: &AudioBuffer<S>, convert: F)
where
    S: Sample,
    F: Fn(S) -> f32,
{
    let channels = buf.spec().channels.count();
    let frames = buf.frames();
    out.reserve(frames);

    if channels == 1 {
        let plane = buf.chan(0);
        out.extend(plane.iter().take(frames).map(|&s| convert(s)));
    } else {
        for frame in 0..frames {
            let mut acc = 0.0f32;
            for ch in 0..channels {
                acc += convert(buf.chan(ch)[frame]);
            }
            out.push(acc / channels as f32);
        }
    }
}
