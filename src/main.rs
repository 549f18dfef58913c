use anyhow::Result;
use clap::Parser;
use std::{
    fs,
    io::{stdout, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

mod key;
mod media;
mod midi;
mod normalize;
mod tools;
mod transcribe;
mod video;

use media::SourceMedia;

/// Turn a song into a Boomwhacker play-along video.
///
/// Takes a YouTube URL or a local media file, extracts the melody, fits it
/// to a physical Boomwhacker set, and overlays color-coded bar cues on the
/// original video (or on black when the source is audio-only).
#[derive(Parser, Debug)]
struct Opt {
    /// YouTube URL or path to a local audio/video file
    input: String,
    /// Process only the first 10 seconds, then ask before the full run
    #[arg(long)]
    preview: bool,
    /// Where to write the final video
    #[arg(long, default_value = "Final_Boomwhacker_Video.mp4")]
    output: PathBuf,
}

/// Intermediate files live here, next to the invocation. Kept after the run
/// so a rerun can reuse the downloaded media.
const WORK_DIR: &str = "bw_project_temp";

struct RawGuard;
impl RawGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}
impl Drop for RawGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Single-key yes/no prompt. Anything except y/Y declines; so does Ctrl+C.
fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    stdout().flush().ok();

    let answer = {
        let _raw = RawGuard::enter()?;
        loop {
            if !event::poll(Duration::from_millis(50))? {
                continue;
            }
            if let Event::Key(k) = event::read()? {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                if k.code == KeyCode::Char('c') && k.modifiers.contains(KeyModifiers::CONTROL) {
                    break false;
                }
                break matches!(k.code, KeyCode::Char('y') | KeyCode::Char('Y'));
            }
        }
    };
    println!("{}", if answer { "y" } else { "n" });
    Ok(answer)
}

fn report(outcome: &normalize::Normalization) {
    match &outcome.estimate {
        Ok(est) => println!("Estimated key: {est}"),
        Err(err) => println!("Key analysis failed ({err}); keeping the original key"),
    }
    if let Some(target) = outcome.target {
        println!(
            "Target key: {} (shift {:+} semitones)",
            target.name, outcome.offset
        );
    }
    match outcome.window {
        Some(w) => println!("Octave window: {}..={}", w.min, w.max),
        None => println!("No notes to fold."),
    }
}

/// Transcribe → normalize → render → composite, for one audio track.
/// `tag` keeps the preview run's intermediates apart from the full run's.
fn run_pipeline(
    source: &SourceMedia,
    audio: &Path,
    work: &Path,
    tag: &str,
    output: &Path,
) -> Result<()> {
    let midi_raw = transcribe::audio_to_midi(audio, &work.join(format!("transcription_{tag}")))?;
    println!("MIDI Generated: {}", midi_raw.display());

    println!("--- Normalizing Melody for Boomwhackers ---");
    let normalized = work.join(format!("normalized_{tag}.mid"));
    let outcome = normalize::normalize_file(&midi_raw, &normalized)?;
    report(&outcome);

    let background = video::make_black_background(work)?;
    let layer = video::render_bar_layer(&normalized, audio, &background, work)?;
    video::composite(source.video.as_deref(), &layer, output)?;
    Ok(())
}

fn main() -> Result<()> {
    let opt = Opt::parse();

    let work = PathBuf::from(WORK_DIR);
    fs::create_dir_all(&work)?;

    let source = media::acquire(&opt.input, &work)?;

    if opt.preview {
        let clip = media::trim_preview(&source.audio, &work)?;
        let preview_out = work.join("preview.mp4");
        run_pipeline(&source, &clip, &work, "preview", &preview_out)?;
        println!("Preview written to {}", preview_out.display());

        if !confirm("Proceed with the full song?")? {
            println!("Stopping after preview.");
            return Ok(());
        }
    }

    run_pipeline(&source, &source.audio, &work, "full", &opt.output)?;

    println!("--- Done! Saved as {} ---", opt.output.display());
    println!("To clean up temp files, run: rm -rf {WORK_DIR}");
    Ok(())
}
