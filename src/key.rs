//! key.rs
//!
//! Melodic key estimation with the Krumhansl-Schmuckler algorithm: build a
//! duration-weighted pitch-class histogram, then Pearson-correlate it against
//! all 24 rotations of the Krumhansl-Kessler major/minor profiles. The best
//! correlation names the key.
//!
//! Reference: Krumhansl, C. L., & Kessler, E. J. (1982). Tracing the Dynamic
//! Changes in Perceived Tonal Organization in a Spatial Representation of
//! Musical Keys. *Psychological Review*, 89(4), 334-368.

use std::fmt;

use crate::midi::SoundingNote;

/// Krumhansl-Kessler major key profile (duration-weighted perception studies).
const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

/// Krumhansl-Kessler minor key profile.
const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Major,
    Minor,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Major => write!(f, "major"),
            Mode::Minor => write!(f, "minor"),
        }
    }
}

/// Estimated key of the transcribed melody. Immutable once computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEstimate {
    /// Tonic pitch class, 0 = C .. 11 = B.
    pub tonic: u8,
    pub mode: Mode,
}

impl fmt::Display for KeyEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", NOTE_NAMES[self.tonic as usize], self.mode)
    }
}

/// Why key analysis could not produce an estimate. The pipeline recovers
/// from any of these with a zero transposition instead of aborting.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("no pitched notes to analyze")]
    EmptyNoteSet,
    #[error("pitch distribution carries no tonal information")]
    DegenerateDistribution,
}

/// Estimate the key of a note sequence.
///
/// Deterministic for identical input: candidates are scanned tonic 0..=11,
/// major before minor, and only a strictly better correlation replaces the
/// current best.
pub fn estimate_key(notes: &[SoundingNote]) -> Result<KeyEstimate, AnalysisError> {
    if notes.is_empty() {
        return Err(AnalysisError::EmptyNoteSet);
    }

    // Duration-weighted pitch-class histogram. Zero-length notes still
    // carry one tick of weight so every sounded pitch participates.
    let mut histogram = [0.0_f64; 12];
    for note in notes {
        let pc = (note.pitch % 12) as usize;
        histogram[pc] += note.duration_ticks.max(1) as f64;
    }

    let total: f64 = histogram.iter().sum();
    for h in &mut histogram {
        *h /= total;
    }

    // A flat histogram correlates equally with every rotation; there is no
    // tonal center to report.
    let mean = 1.0 / 12.0;
    if histogram.iter().all(|h| (h - mean).abs() < 1e-9) {
        return Err(AnalysisError::DegenerateDistribution);
    }

    let mut best = KeyEstimate {
        tonic: 0,
        mode: Mode::Major,
    };
    let mut best_corr = f64::NEG_INFINITY;

    for tonic in 0..12u8 {
        // Rotate the histogram so the candidate tonic sits at index 0
        let mut rotated = [0.0; 12];
        for (i, r) in rotated.iter_mut().enumerate() {
            *r = histogram[(i + tonic as usize) % 12];
        }

        for (mode, profile) in [(Mode::Major, &MAJOR_PROFILE), (Mode::Minor, &MINOR_PROFILE)] {
            let corr = pearson(&rotated, profile);
            if corr > best_corr {
                best_corr = corr;
                best = KeyEstimate { tonic, mode };
            }
        }
    }

    Ok(best)
}

/// Pearson correlation coefficient between two 12-element arrays.
fn pearson(x: &[f64; 12], y: &[f64; 12]) -> f64 {
    let x_mean: f64 = x.iter().sum::<f64>() / 12.0;
    let y_mean: f64 = y.iter().sum::<f64>() / 12.0;

    let mut num = 0.0;
    let mut x_sq = 0.0;
    let mut y_sq = 0.0;

    for i in 0..12 {
        let xd = x[i] - x_mean;
        let yd = y[i] - y_mean;
        num += xd * yd;
        x_sq += xd * xd;
        y_sq += yd * yd;
    }

    let denom = (x_sq * y_sq).sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    num / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale(pitches: &[u8], tick_per_note: u64) -> Vec<SoundingNote> {
        pitches
            .iter()
            .enumerate()
            .map(|(i, &p)| SoundingNote {
                pitch: p,
                onset_tick: i as u64 * tick_per_note,
                duration_ticks: tick_per_note,
            })
            .collect()
    }

    #[test]
    fn empty_input_is_an_error() {
        assert_eq!(estimate_key(&[]), Err(AnalysisError::EmptyNoteSet));
    }

    #[test]
    fn c_major_scale_detected() {
        let notes = scale(&[60, 62, 64, 65, 67, 69, 71], 480);
        let est = estimate_key(&notes).unwrap();
        assert_eq!(est.tonic, 0);
        assert_eq!(est.mode, Mode::Major);
    }

    #[test]
    fn g_major_scale_detected() {
        let notes = scale(&[67, 69, 71, 72, 74, 76, 78], 480);
        let est = estimate_key(&notes).unwrap();
        assert_eq!(est.tonic, 7);
        assert_eq!(est.mode, Mode::Major);
    }

    #[test]
    fn tonic_weighted_minor_detected() {
        // A natural minor with the tonic dwelled on; the extra weight on A
        // separates it from the relative C major.
        let mut notes = scale(&[57, 59, 60, 62, 64, 65, 67], 480);
        notes.push(SoundingNote {
            pitch: 69,
            onset_tick: 7 * 480,
            duration_ticks: 480 * 5,
        });
        let est = estimate_key(&notes).unwrap();
        assert_eq!(est.tonic, 9);
        assert_eq!(est.mode, Mode::Minor);
    }

    #[test]
    fn chromatic_cloud_is_degenerate() {
        let notes = scale(&[60, 61, 62, 63, 64, 65, 66, 67, 68, 69, 70, 71], 480);
        assert_eq!(
            estimate_key(&notes),
            Err(AnalysisError::DegenerateDistribution)
        );
    }

    #[test]
    fn same_input_same_estimate() {
        let notes = scale(&[62, 64, 66, 67, 69, 71, 73], 240);
        let first = estimate_key(&notes).unwrap();
        for _ in 0..10 {
            assert_eq!(estimate_key(&notes).unwrap(), first);
        }
    }

    #[test]
    fn pearson_of_identical_arrays_is_one() {
        let r = pearson(&MAJOR_PROFILE, &MAJOR_PROFILE);
        assert!((r - 1.0).abs() < 1e-10, "self-correlation was {r}");
    }

    #[test]
    fn display_names() {
        let est = KeyEstimate {
            tonic: 4,
            mode: Mode::Minor,
        };
        assert_eq!(est.to_string(), "E minor");
    }
}
