//! video.rs
//!
//! Bar-layer rendering and final compositing. whackercmd draws the colored
//! Boomwhacker bars over a black frame; ffmpeg then screen-blends that layer
//! onto the background video so the black pixels vanish and only the bars
//! survive.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};

use crate::tools;

const FRAME_SIZE: &str = "1920x1080";

/// Render a solid black frame for whackercmd to draw the bars on.
pub fn make_black_background(work: &Path) -> Result<PathBuf> {
    let out = work.join("black_bg.png");
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-f", "lavfi", "-i"]);
    cmd.arg(format!("color=black:s={FRAME_SIZE}"));
    cmd.args(["-frames:v", "1"]);
    cmd.arg(&out);
    cmd.arg("-y");
    tools::run(&mut cmd)?;
    Ok(out)
}

/// Draw the Boomwhacker bars for `midi`, synced to `audio`.
pub fn render_bar_layer(
    midi: &Path,
    audio: &Path,
    background: &Path,
    work: &Path,
) -> Result<PathBuf> {
    println!("--- Generating Boomwhacker Visuals ---");
    let out = work.join("whacker_layer.mp4");
    let mut cmd = Command::new("whackercmd");
    cmd.arg("-a").arg(audio);
    cmd.arg("-i").arg(background);
    cmd.arg(midi);
    cmd.arg(&out);
    tools::run(&mut cmd)?;
    Ok(out)
}

/// Filter graph for the overlay:
/// - `[0:v]` (background) is fitted into the frame and letterboxed,
/// - `[1:v]` (bar layer) is sized to match,
/// - `blend=screen` keeps whichever pixel is brighter, so the layer's black
///   background drops out and the colored bars win.
fn overlay_filter() -> String {
    format!(
        "[0:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2[bg];\
         [1:v]scale={w}:{h}[fg];\
         [bg][fg]blend=all_mode='screen':shortest=1[out]",
        w = 1920,
        h = 1080
    )
}

/// Produce the final video. With a background, overlay the bars on it and
/// keep the background's audio; without one, the bar layer (which already
/// carries the song audio) becomes the output as-is.
pub fn composite(background: Option<&Path>, layer: &Path, output: &Path) -> Result<()> {
    println!("--- Compositing Final Video ---");
    match background {
        Some(bg) => {
            println!("Overlaying Boomwhackers on top of original video...");
            let mut cmd = Command::new("ffmpeg");
            cmd.arg("-i").arg(bg);
            cmd.arg("-i").arg(layer);
            cmd.arg("-filter_complex").arg(overlay_filter());
            cmd.args(["-map", "[out]", "-map", "0:a"]);
            cmd.args(["-c:v", "libx264", "-crf", "23", "-preset", "fast"]);
            cmd.arg(output);
            cmd.arg("-y");
            tools::run(&mut cmd)
        }
        None => {
            println!("No video background detected. Saving bar layer directly.");
            move_file(layer, output)
        }
    }
}

/// Rename, falling back to copy+remove when source and destination live on
/// different filesystems.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)
        .with_context(|| format!("copying {} to {}", from.display(), to.display()))?;
    let _ = fs::remove_file(from);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_filter_wires_bg_and_fg_into_out() {
        let graph = overlay_filter();
        assert!(graph.contains("[0:v]scale=1920:1080:force_original_aspect_ratio=decrease"));
        assert!(graph.contains("pad=1920:1080"));
        assert!(graph.contains("[1:v]scale=1920:1080[fg]"));
        assert!(graph.contains("[bg][fg]blend=all_mode='screen':shortest=1[out]"));
    }

    #[test]
    fn move_file_replaces_destination() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("layer.mp4");
        let to = dir.path().join("final.mp4");
        fs::write(&from, b"video bytes").unwrap();

        move_file(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"video bytes");
    }
}
