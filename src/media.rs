//! media.rs
//!
//! Turns whatever the user gave us (YouTube URL or local file) into the two
//! things the pipeline needs: an audio track to transcribe, and optionally a
//! background video to composite the bars over. Downloading and demuxing are
//! delegated to yt-dlp and ffmpeg.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};

use crate::tools;

/// yt-dlp format ladder: prefer an mp4/m4a mux, degrade gracefully.
const YTDLP_FORMAT: &str =
    "bestvideo[ext=mp4]+bestaudio[ext=m4a]/bestvideo+bestaudio/best[ext=mp4]/best";

#[derive(thiserror::Error, Debug)]
pub enum MediaError {
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),
}

/// What acquisition produced. Audio is always present; the background video
/// is only there when the source had a picture to overlay on.
#[derive(Debug, Clone)]
pub struct SourceMedia {
    pub video: Option<PathBuf>,
    pub audio: PathBuf,
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the user input into local video/audio files inside `work`.
pub fn acquire(input: &str, work: &Path) -> Result<SourceMedia> {
    if is_url(input) {
        download(input, work)
    } else {
        classify_local(Path::new(input), work)
    }
}

fn download(url: &str, work: &Path) -> Result<SourceMedia> {
    println!("--- Downloading from YouTube: {url} ---");
    let video = work.join("video_bg.mp4");

    let mut cmd = Command::new("yt-dlp");
    cmd.arg("--no-warnings");
    // yt-dlp needs a JS runtime for some extractors; point it at node when
    // one is installed, otherwise let it fend for itself
    if let Some(node) = tools::find_on_path("node").or_else(|| tools::find_on_path("nodejs")) {
        cmd.arg("--js-runtimes")
            .arg(format!("node:{}", node.display()));
    }
    cmd.arg("-f").arg(YTDLP_FORMAT);
    cmd.arg("-o").arg(&video);
    cmd.arg(url);

    if let Err(err) = tools::run(&mut cmd) {
        eprintln!("YouTube download failed. Possible reasons:");
        eprintln!("  1. Video may be unavailable (private, deleted, or region-locked)");
        eprintln!("  2. yt-dlp may need a JavaScript runtime (install nodejs or deno)");
        eprintln!("  3. Network connectivity issues");
        eprintln!("You can also download the video manually and pass the file path.");
        return Err(err);
    }

    let audio = extract_audio(&video, work)?;
    Ok(SourceMedia {
        video: Some(video),
        audio,
    })
}

fn classify_local(path: &Path, work: &Path) -> Result<SourceMedia> {
    println!("--- Processing Local File: {} ---", path.display());
    if !path.exists() {
        return Err(MediaError::MissingInput(path.to_path_buf()).into());
    }
    let path = path
        .canonicalize()
        .with_context(|| format!("resolving {}", path.display()))?;

    let mime = tools::output(
        Command::new("file")
            .args(["--mime-type", "-b"])
            .arg(&path),
    )?;

    if mime.starts_with("video") {
        let audio = extract_audio(&path, work)?;
        Ok(SourceMedia {
            video: Some(path),
            audio,
        })
    } else {
        // plain audio: nothing to use as a background
        Ok(SourceMedia {
            video: None,
            audio: path,
        })
    }
}

/// Demux the audio track to mp3 for the transcriber.
fn extract_audio(video: &Path, work: &Path) -> Result<PathBuf> {
    let audio = work.join("audio_input.mp3");
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-i").arg(video);
    cmd.args(["-vn", "-acodec", "libmp3lame", "-q:a", "2"]);
    cmd.arg(&audio);
    cmd.arg("-y");
    tools::run(&mut cmd)?;
    Ok(audio)
}

/// Cut the first ten seconds for preview mode.
pub fn trim_preview(audio: &Path, work: &Path) -> Result<PathBuf> {
    let out = work.join("audio_preview.mp3");
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-i").arg(audio);
    cmd.args(["-t", "10"]);
    cmd.arg(&out);
    cmd.arg("-y");
    tools::run(&mut cmd)?;
    Ok(out)
}
