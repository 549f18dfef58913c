//! midi.rs
//!
//! This module lifts the note events out of a Standard MIDI File (SMF) so the
//! normalizer can work on them as plain integers, then writes the transformed
//! pitches back onto the events they came from.
//!
//! ### Quick primer on what we extract
//! - A MIDI file is a set of tracks; each track is a list of events with
//!   delta-tick timing. We accumulate deltas into absolute ticks per track.
//! - Only NoteOn/NoteOff matter here. Everything else (tempo, controllers,
//!   program changes) passes through the file untouched.
//! - NoteOn with velocity 0 is the classic shorthand for NoteOff, so we
//!   normalize it to "off" during extraction.
//!
//! Each extracted event remembers its track and position inside that track,
//! which makes the write-back a straight index assignment rather than a
//! re-serialization of the music.

use std::collections::HashMap;

use midly::{MidiMessage, Smf, TrackEventKind};

/// A single note-on or note-off, lifted out of its SMF track.
///
/// `pitch` is widened to `i32` because transposition may push it outside
/// 0..=127 temporarily; the octave fold brings it back before write-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub pitch: i32,
    pub velocity: u8,
    pub on: bool,
    pub channel: u8,
    /// Index of the originating track in the SMF.
    pub track: usize,
    /// Index of the originating event inside that track.
    pub event_index: usize,
    /// Absolute time in ticks from the start of the track.
    pub tick: u64,
}

/// A note-on paired with its note-off. The key estimator weights pitch
/// classes by how long they actually sound, so it wants durations, not
/// raw on/off events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundingNote {
    pub pitch: u8,
    pub onset_tick: u64,
    pub duration_ticks: u64,
}

/// Collect every note-on/note-off in the file, tagged with its origin,
/// ordered by absolute tick (original track order breaks ties).
pub fn extract_note_events(smf: &Smf) -> Vec<NoteEvent> {
    let mut events = Vec::new();
    for (track, tr) in smf.tracks.iter().enumerate() {
        let mut abs_ticks: u64 = 0;
        for (event_index, ev) in tr.iter().enumerate() {
            abs_ticks += ev.delta.as_int() as u64;
            let TrackEventKind::Midi { channel, message } = ev.kind else {
                continue;
            };
            let ch = u8::from(channel);
            match message {
                MidiMessage::NoteOn { key, vel } => {
                    events.push(NoteEvent {
                        pitch: key.as_int() as i32,
                        velocity: vel.as_int(),
                        // velocity 0 means "off" in disguise
                        on: vel.as_int() > 0,
                        channel: ch,
                        track,
                        event_index,
                        tick: abs_ticks,
                    });
                }
                MidiMessage::NoteOff { key, vel } => {
                    events.push(NoteEvent {
                        pitch: key.as_int() as i32,
                        velocity: vel.as_int(),
                        on: false,
                        channel: ch,
                        track,
                        event_index,
                        tick: abs_ticks,
                    });
                }
                _ => {}
            }
        }
    }
    // Stable by (tick, track, event_index): per-track event order survives,
    // so an off and a re-on of the same pitch at the same tick never swap.
    events.sort_by_key(|e| (e.tick, e.track, e.event_index));
    events
}

/// Pair note-ons with their note-offs into sounding notes.
///
/// Overlapping retriggers of the same pitch are handled with a stack per
/// (track, channel, pitch) slot. Ons that never see an off still count,
/// with a token one-tick duration, so a truncated file keeps its melody
/// visible to the key estimator.
pub fn pair_sounding_notes(events: &[NoteEvent]) -> Vec<SoundingNote> {
    let mut open: HashMap<(usize, u8, i32), Vec<u64>> = HashMap::new();
    let mut notes = Vec::new();

    for ev in events {
        let slot = (ev.track, ev.channel, ev.pitch);
        if ev.on {
            open.entry(slot).or_default().push(ev.tick);
        } else if let Some(onset) = open.get_mut(&slot).and_then(Vec::pop) {
            notes.push(SoundingNote {
                pitch: ev.pitch as u8,
                onset_tick: onset,
                duration_ticks: ev.tick.saturating_sub(onset),
            });
        }
    }

    for ((_, _, pitch), onsets) in open {
        for onset in onsets {
            notes.push(SoundingNote {
                pitch: pitch as u8,
                onset_tick: onset,
                duration_ticks: 1,
            });
        }
    }

    notes.sort_by_key(|n| (n.onset_tick, n.pitch));
    notes
}

/// Write transformed pitches back onto the SMF events they came from.
/// Pitches are clamped to the valid MIDI range as a last line of defense;
/// the octave fold already guarantees this for any window inside 0..=127.
pub fn apply_note_events(smf: &mut Smf, events: &[NoteEvent]) {
    for ev in events {
        let pitch = ev.pitch.clamp(0, 127) as u8;
        let Some(tev) = smf
            .tracks
            .get_mut(ev.track)
            .and_then(|tr| tr.get_mut(ev.event_index))
        else {
            continue;
        };
        if let TrackEventKind::Midi { message, .. } = &mut tev.kind {
            match message {
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    *key = pitch.into();
                }
                _ => {}
            }
        }
    }
}
