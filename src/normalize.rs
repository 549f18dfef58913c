//! normalize.rs
//!
//! Makes a transcribed melody playable on a physical Boomwhacker set. Three
//! steps, always in this order:
//!
//! 1. pick the target key nearest (in circular semitone distance) to the
//!    estimated key, from the small set of keys a diatonic tube set covers,
//! 2. transpose every note by the minimal signed shift into that key,
//! 3. fold every note by octaves into a single 12-semitone window centered
//!    on the median pitch, so seven or eight tubes reach everything.
//!
//! Failed key analysis degrades to a zero transposition; the fold still runs.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use midly::Smf;

use crate::key::{self, AnalysisError, KeyEstimate};
use crate::midi::{self, NoteEvent, SoundingNote};

/// One of the keys a diatonic Boomwhacker set can cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetKey {
    pub name: &'static str,
    /// Tonic pitch class, 0 = C .. 11 = B.
    pub tonic: u8,
}

/// The keys reachable with stock tube sets, in preference order.
/// The order matters: equidistant candidates resolve to the earliest entry.
pub const TARGET_KEYS: [TargetKey; 6] = [
    TargetKey { name: "C major", tonic: 0 },
    TargetKey { name: "G major", tonic: 7 },
    TargetKey { name: "D major", tonic: 2 },
    TargetKey { name: "A minor", tonic: 9 },
    TargetKey { name: "E minor", tonic: 4 },
    TargetKey { name: "B minor", tonic: 11 },
];

/// Circular semitone distance between two pitch classes, always in 0..=6.
pub fn pitch_class_distance(a: u8, b: u8) -> u8 {
    let up = (i32::from(a) - i32::from(b)).rem_euclid(12);
    let down = (i32::from(b) - i32::from(a)).rem_euclid(12);
    up.min(down) as u8
}

/// Pick the target key nearest to the given tonic pitch class.
///
/// Only a strictly smaller distance replaces the current pick, so ties go
/// to whichever key appears first in `TARGET_KEYS`. The estimate's mode is
/// deliberately not consulted; matching is on tonic distance alone.
pub fn nearest_target_key(tonic: u8) -> TargetKey {
    let mut best = TARGET_KEYS[0];
    let mut best_dist = pitch_class_distance(tonic, best.tonic);
    for candidate in &TARGET_KEYS[1..] {
        let dist = pitch_class_distance(tonic, candidate.tonic);
        if dist < best_dist {
            best = *candidate;
            best_dist = dist;
        }
    }
    best
}

/// Minimal signed semitone shift taking `source` to `target`, in -6..=6.
pub fn transpose_offset(source: u8, target: u8) -> i8 {
    let mut offset = (i32::from(target) - i32::from(source)).rem_euclid(12);
    if offset > 6 {
        offset -= 12;
    }
    offset as i8
}

/// Shift every event, note-ons and note-offs alike, so on/off pairs stay
/// matched. No wrapping or clamping here; that is the fold's job.
pub fn apply_transpose(events: &mut [NoteEvent], offset: i8) {
    for ev in events {
        ev.pitch += i32::from(offset);
    }
}

/// Closed 12-semitone interval the folded melody must land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OctaveWindow {
    pub min: i32,
    pub max: i32,
}

impl OctaveWindow {
    /// Window centered on a median pitch.
    fn around(median: i32) -> Self {
        Self {
            min: median - 6,
            max: median + 6,
        }
    }
}

/// Fold a pitch into the window by whole octaves (pitch class preserving),
/// then clamp to the valid MIDI range. When the window itself pokes outside
/// 0..=127 the clamp may land a pitch outside the nominal window; that is
/// accepted rather than corrected.
fn fold_pitch(mut pitch: i32, window: OctaveWindow) -> i32 {
    while pitch < window.min {
        pitch += 12;
    }
    while pitch > window.max {
        pitch -= 12;
    }
    pitch.clamp(0, 127)
}

/// Fold every event into the given window.
pub fn fold_into_window(events: &mut [NoteEvent], window: OctaveWindow) {
    for ev in events {
        ev.pitch = fold_pitch(ev.pitch, window);
    }
}

/// Compute the fold window from the note-on pitch distribution and fold all
/// events into it. With no note-ons there is nothing to center on, so the
/// events pass through untouched and no window is reported.
pub fn constrain_octave(events: &mut [NoteEvent]) -> Option<OctaveWindow> {
    let mut pitches: Vec<i32> = events.iter().filter(|e| e.on).map(|e| e.pitch).collect();
    if pitches.is_empty() {
        return None;
    }
    pitches.sort_unstable();
    // integer median: lower-middle element for even counts
    let median = pitches[(pitches.len() - 1) / 2];

    let window = OctaveWindow::around(median);
    fold_into_window(events, window);
    Some(window)
}

/// Everything the pipeline wants to report about one normalization run.
#[derive(Debug, Clone)]
pub struct Normalization {
    pub estimate: Result<KeyEstimate, AnalysisError>,
    pub target: Option<TargetKey>,
    pub offset: i8,
    pub window: Option<OctaveWindow>,
}

/// Run the full estimate → select → transpose → fold sequence over an
/// extracted event list.
pub fn normalize_events(events: &mut [NoteEvent], notes: &[SoundingNote]) -> Normalization {
    let estimate = key::estimate_key(notes);

    let (target, offset) = match estimate {
        Ok(est) => {
            let target = nearest_target_key(est.tonic);
            (Some(target), transpose_offset(est.tonic, target.tonic))
        }
        // graceful degradation: keep the original key
        Err(_) => (None, 0),
    };

    apply_transpose(events, offset);
    let window = constrain_octave(events);

    Normalization {
        estimate,
        target,
        offset,
        window,
    }
}

/// Read a MIDI file, normalize it for a Boomwhacker set, write the result.
pub fn normalize_file(input: &Path, output: &Path) -> Result<Normalization> {
    let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let mut smf = Smf::parse(&bytes).context("parsing transcribed MIDI")?;

    let mut events = midi::extract_note_events(&smf);
    let notes = midi::pair_sounding_notes(&events);
    let outcome = normalize_events(&mut events, &notes);

    midi::apply_note_events(&mut smf, &events);
    smf.save(output)
        .with_context(|| format!("writing {}", output.display()))?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on(pitch: i32) -> NoteEvent {
        NoteEvent {
            pitch,
            velocity: 100,
            on: true,
            channel: 0,
            track: 0,
            event_index: 0,
            tick: 0,
        }
    }

    fn off(pitch: i32) -> NoteEvent {
        NoteEvent {
            on: false,
            velocity: 0,
            ..on(pitch)
        }
    }

    fn pitches(events: &[NoteEvent]) -> Vec<i32> {
        events.iter().map(|e| e.pitch).collect()
    }

    #[test]
    fn distance_is_zero_on_diagonal_symmetric_and_bounded() {
        for a in 0..12 {
            assert_eq!(pitch_class_distance(a, a), 0);
            for b in 0..12 {
                assert_eq!(pitch_class_distance(a, b), pitch_class_distance(b, a));
                assert!(pitch_class_distance(a, b) <= 6);
            }
        }
    }

    #[test]
    fn f_major_lands_on_e_minor_with_offset_minus_one() {
        // distances from F: C 5, G 2, D 3, A 4, E 1, B 6
        let target = nearest_target_key(5);
        assert_eq!(target.name, "E minor");
        assert_eq!(transpose_offset(5, target.tonic), -1);
    }

    #[test]
    fn c_is_already_a_target() {
        let target = nearest_target_key(0);
        assert_eq!(target.name, "C major");
        assert_eq!(transpose_offset(0, target.tonic), 0);
    }

    #[test]
    fn ties_resolve_to_enumeration_order() {
        // C# is one semitone from both C and D; C is listed first
        assert_eq!(nearest_target_key(1).name, "C major");
        // A# is one semitone from both A and B; A minor is listed first
        assert_eq!(nearest_target_key(10).name, "A minor");
        // sanity-check a non-tie: F# has G as its unique nearest key
        assert_eq!(nearest_target_key(6).name, "G major");
    }

    #[test]
    fn selection_is_deterministic() {
        for tonic in 0..12 {
            let first = nearest_target_key(tonic);
            for _ in 0..10 {
                assert_eq!(nearest_target_key(tonic), first);
            }
        }
    }

    #[test]
    fn offset_round_trips_onto_target() {
        for source in 0..12u8 {
            for target in TARGET_KEYS {
                let offset = transpose_offset(source, target.tonic);
                assert!((-6..=6).contains(&offset));
                let landed = (i32::from(source) + i32::from(offset)).rem_euclid(12);
                assert_eq!(landed as u8, target.tonic);
            }
        }
    }

    #[test]
    fn transpose_shifts_ons_and_offs_alike() {
        let mut events = vec![on(60), off(60), on(65), off(65)];
        apply_transpose(&mut events, -4);
        assert_eq!(pitches(&events), vec![56, 56, 61, 61]);
    }

    #[test]
    fn transpose_preserves_pitch_class_shift() {
        let original = vec![on(60), on(61), off(61), on(119)];
        for offset in -6..=6i8 {
            let mut events = original.clone();
            apply_transpose(&mut events, offset);
            for (before, after) in original.iter().zip(&events) {
                let diff = after.pitch - before.pitch;
                assert_eq!(diff, i32::from(offset));
                assert_eq!(
                    diff.rem_euclid(12),
                    i32::from(offset).rem_euclid(12)
                );
            }
        }
    }

    #[test]
    fn window_centers_on_median_and_folds_by_octaves() {
        // note-ons [60, 72, 48]: median 60, window [54, 66];
        // the off at 40 folds 40 -> 52 -> 64
        let mut events = vec![on(60), on(72), on(48), off(40)];
        let window = constrain_octave(&mut events).unwrap();
        assert_eq!(window, OctaveWindow { min: 54, max: 66 });
        assert_eq!(pitches(&events), vec![60, 60, 60, 64]);
    }

    #[test]
    fn folding_with_same_window_is_idempotent() {
        let mut events = vec![on(30), on(61), on(75), off(99), off(12)];
        let window = constrain_octave(&mut events).unwrap();
        let folded = pitches(&events);
        fold_into_window(&mut events, window);
        assert_eq!(pitches(&events), folded);
    }

    #[test]
    fn folding_preserves_pitch_class() {
        let original = vec![on(30), on(61), on(75), off(99), off(12), on(127)];
        let mut events = original.clone();
        let window = constrain_octave(&mut events).unwrap();
        // window comfortably inside 0..=127 -> the clamp never fires
        assert!(window.min >= 0 && window.max <= 127);
        for (before, after) in original.iter().zip(&events) {
            assert_eq!(before.pitch.rem_euclid(12), after.pitch.rem_euclid(12));
            assert!(after.pitch >= window.min && after.pitch <= window.max);
        }
    }

    #[test]
    fn even_count_median_takes_lower_middle() {
        // sorted ons [50, 60, 62, 70]: lower-middle is 60, window [54, 66]
        let mut events = vec![on(60), on(70), on(50), on(62)];
        let window = constrain_octave(&mut events).unwrap();
        assert_eq!(window, OctaveWindow { min: 54, max: 66 });
    }

    #[test]
    fn no_note_ons_passes_events_through() {
        let mut events = vec![off(60), off(72)];
        assert_eq!(constrain_octave(&mut events), None);
        assert_eq!(pitches(&events), vec![60, 72]);

        let mut empty: Vec<NoteEvent> = Vec::new();
        assert_eq!(constrain_octave(&mut empty), None);
    }

    #[test]
    fn clamp_applies_when_window_pokes_below_zero() {
        // ons at 3: window [-3, 9]; the off at 118 folds down to -2,
        // then clamps to 0, outside the nominal window
        let mut events = vec![on(3), on(3), off(118)];
        let window = constrain_octave(&mut events).unwrap();
        assert_eq!(window, OctaveWindow { min: -3, max: 9 });
        assert_eq!(pitches(&events), vec![3, 3, 0]);
    }

    #[test]
    fn normalize_events_transposes_and_folds_a_melody() {
        // F major scale, quarter notes: estimator says F major, nearest
        // target is E minor, shift is -1, and the window holds everything
        let scale = [65, 67, 69, 70, 72, 74, 76];
        let mut events = Vec::new();
        let mut notes = Vec::new();
        for (i, &p) in scale.iter().enumerate() {
            let mut ev = on(p);
            ev.tick = i as u64 * 480;
            events.push(ev);
            notes.push(SoundingNote {
                pitch: p as u8,
                onset_tick: i as u64 * 480,
                duration_ticks: 480,
            });
        }

        let outcome = normalize_events(&mut events, &notes);
        let est = outcome.estimate.unwrap();
        assert_eq!(est.tonic, 5);
        assert_eq!(outcome.target.unwrap().name, "E minor");
        assert_eq!(outcome.offset, -1);
        assert_eq!(outcome.window, Some(OctaveWindow { min: 63, max: 75 }));
        assert_eq!(pitches(&events), vec![64, 66, 68, 69, 71, 73, 75]);
    }

    #[test]
    fn normalize_events_degrades_to_zero_offset() {
        let mut events = vec![on(60), off(60)];
        // no sounding notes -> analysis fails -> no transposition,
        // but the fold still centers on the surviving note-ons
        let outcome = normalize_events(&mut events, &[]);
        assert!(outcome.estimate.is_err());
        assert_eq!(outcome.offset, 0);
        assert_eq!(outcome.target, None);
        assert_eq!(outcome.window, Some(OctaveWindow { min: 54, max: 66 }));
        assert_eq!(pitches(&events), vec![60, 60]);
    }

    #[test]
    fn normalize_file_round_trips_through_disk() {
        use midly::{
            num::u15, Format, Header, MetaMessage, MidiMessage, Timing, TrackEvent,
            TrackEventKind,
        };

        let mut track = Vec::new();
        for &p in &[65u8, 67, 69, 70, 72, 74, 76] {
            track.push(TrackEvent {
                delta: 0.into(),
                kind: TrackEventKind::Midi {
                    channel: 0.into(),
                    message: MidiMessage::NoteOn { key: p.into(), vel: 100.into() },
                },
            });
            track.push(TrackEvent {
                delta: 480.into(),
                kind: TrackEventKind::Midi {
                    channel: 0.into(),
                    message: MidiMessage::NoteOff { key: p.into(), vel: 0.into() },
                },
            });
        }
        track.push(TrackEvent {
            delta: 0.into(),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        let smf = Smf {
            header: Header {
                format: Format::SingleTrack,
                timing: Timing::Metrical(u15::from(480)),
            },
            tracks: vec![track],
        };

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("melody.mid");
        let output = dir.path().join("normalized.mid");
        smf.save(&input).unwrap();

        let outcome = normalize_file(&input, &output).unwrap();
        assert_eq!(outcome.offset, -1);

        let bytes = std::fs::read(&output).unwrap();
        let reparsed = Smf::parse(&bytes).unwrap();
        let events = crate::midi::extract_note_events(&reparsed);
        let ons: Vec<i32> = events.iter().filter(|e| e.on).map(|e| e.pitch).collect();
        assert_eq!(ons, vec![64, 66, 68, 69, 71, 73, 75]);
    }
}
