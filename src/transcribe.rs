//! transcribe.rs
//!
//! Audio-to-MIDI via the external `basic-pitch` model. basic-pitch names its
//! output after the input file, so we hand it a private output directory and
//! scan that for the `.mid` it produced.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};

use crate::tools;

/// Transcribe `audio` into a MIDI file inside `out_dir`.
///
/// The directory is recreated empty on every call so a leftover `.mid`
/// from an earlier run can never be mistaken for fresh output.
pub fn audio_to_midi(audio: &Path, out_dir: &Path) -> Result<PathBuf> {
    println!("--- Converting Audio to MIDI (Basic Pitch) ---");

    if out_dir.exists() {
        fs::remove_dir_all(out_dir)
            .with_context(|| format!("clearing {}", out_dir.display()))?;
    }
    fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let mut cmd = Command::new("basic-pitch");
    cmd.arg(out_dir);
    cmd.arg(audio);
    tools::run(&mut cmd)?;

    match find_midi_output(out_dir)? {
        Some(midi) => Ok(midi),
        None => bail!(
            "MIDI generation failed: basic-pitch produced no .mid in {}",
            out_dir.display()
        ),
    }
}

/// First `.mid` entry in the directory, in sorted order for determinism.
pub fn find_midi_output(dir: &Path) -> Result<Option<PathBuf>> {
    let mut mids: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("scanning {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("mid"))
        })
        .collect();
    mids.sort();
    Ok(mids.into_iter().next())
}
