//! Bulk catalog construction
//!
//! Walks a music directory, fingerprints every recognized audio file, and
//! collects the successes into an ordered catalog. A file that fails to
//! decode or analyze is logged and skipped; it never aborts the batch.

use crate::extractor::FeatureExtractor;
use crate::scanner::{AudioScanner, ScanError};
use chrono::Utc;
use std::path::{Path, PathBuf};
use timbrel_common::catalog::{Catalog, CatalogEntry};
use tracing::{info, warn};

/// Outcome counters for one catalog build
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Audio files the scanner recognized
    pub scanned: usize,
    /// Files that made it into the catalog
    pub cataloged: usize,
    /// Files skipped, with the reason
    pub skipped: Vec<(PathBuf, String)>,
}

/// Fingerprint every audio file under `music_dir` into a fresh catalog.
///
/// Files are processed in sorted path order so the resulting catalog order
/// is reproducible. Track ids are paths relative to `music_dir`.
pub fn build_catalog(
    music_dir: &Path,
    extractor: &FeatureExtractor,
) -> Result<(Catalog, BuildReport), ScanError> {
    let scanner = AudioScanner::new();
    let files = scanner.scan(music_dir)?;

    let mut catalog = Catalog::new();
    let mut report = BuildReport {
        scanned: files.len(),
        ..Default::default()
    };

    for path in files {
        let track_id = track_id_for(&path, music_dir);
        match extractor.extract_file(&path) {
            Ok(fingerprint) => {
                let entry = CatalogEntry {
                    track_id,
                    fingerprint,
                    cluster: None,
                    analyzed_at: Utc::now(),
                };
                match catalog.push(entry) {
                    Ok(()) => report.cataloged += 1,
                    Err(e) => {
                        warn!("Skipping {}: {}", path.display(), e);
                        report.skipped.push((path, e.to_string()));
                    }
                }
            }
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                report.skipped.push((path, e.to_string()));
            }
        }
    }

    info!(
        "Catalog build: {} of {} files fingerprinted, {} skipped",
        report.cataloged,
        report.scanned,
        report.skipped.len()
    );
    Ok((catalog, report))
}

/// Track id: path relative to the scanned root
fn track_id_for(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;
    use std::fs;

    fn write_sine_wav(path: &Path, frequency: f32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..22_050 {
            let t = i as f32 / 22_050.0;
            let sample = ((2.0 * PI * frequency * t).sin() * 0.4 * 32767.0) as i16;
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn builds_an_ordered_catalog_from_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_sine_wav(&dir.path().join("beta.wav"), 440.0);
        fs::create_dir(dir.path().join("sub")).unwrap();
        write_sine_wav(&dir.path().join("sub/alpha.wav"), 880.0);
        fs::write(dir.path().join("cover.txt"), "ignored").unwrap();

        let extractor = FeatureExtractor::default();
        let (catalog, report) = build_catalog(dir.path(), &extractor).unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.cataloged, 2);
        assert!(report.skipped.is_empty());

        let ids: Vec<_> = catalog.iter().map(|e| e.track_id.as_str()).collect();
        assert_eq!(ids, vec!["beta.wav", "sub/alpha.wav"]);
        assert!(catalog.iter().all(|e| e.cluster.is_none()));
    }

    #[test]
    fn a_broken_file_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_sine_wav(&dir.path().join("good.wav"), 440.0);
        // Valid WAV magic bytes, truncated before any sample data
        fs::write(dir.path().join("broken.wav"), b"RIFF\x04\x00\x00\x00WAVE").unwrap();

        let extractor = FeatureExtractor::default();
        let (catalog, report) = build_catalog(dir.path(), &extractor).unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.cataloged, 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(catalog.get("good.wav").is_some());
        assert!(catalog.get("broken.wav").is_none());
    }

    #[test]
    fn missing_directory_is_a_scan_error() {
        let extractor = FeatureExtractor::default();
        let result = build_catalog(Path::new("/nonexistent/music"), &extractor);
        assert!(matches!(result, Err(ScanError::PathNotFound(_))));
    }
}
