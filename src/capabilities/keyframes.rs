//! Keyframe extraction with ffprobe and ffmpeg.

use crate::config::MediaSettings;
use crate::error::{Result, TripsyError};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Seeking exactly to the end of a stream yields no frame.
const LAST_FRAME_MARGIN_SECS: f64 = 0.1;

/// Stream facts needed to pick and orient frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoProbe {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    /// Rotation from container metadata, in degrees.
    pub rotation: i32,
}

impl VideoProbe {
    /// Whether decoded frames come out wider than tall.
    ///
    /// ffmpeg applies rotation metadata while decoding, so a quarter turn
    /// swaps the stored dimensions.
    pub fn is_landscape(&self) -> bool {
        let (width, height) = if self.rotation.rem_euclid(180) == 90 {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        };
        width > height
    }
}

/// `n` evenly spaced timestamps from the first to the last frame, inclusive.
pub fn frame_timestamps(duration: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => {
            let last = (duration - LAST_FRAME_MARGIN_SECS).max(0.0);
            let step = last / (n - 1) as f64;
            (0..n).map(|i| step * i as f64).collect()
        }
    }
}

/// Parse `ffprobe -of json` output for the first video stream.
pub fn parse_probe(json: &str) -> Result<VideoProbe> {
    let parsed: Value = serde_json::from_str(json)
        .map_err(|_| TripsyError::Media("Invalid ffprobe output".into()))?;

    let stream = parsed["streams"]
        .get(0)
        .ok_or_else(|| TripsyError::Media("File has no video stream".into()))?;

    let dimension = |key: &str| {
        stream[key]
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| TripsyError::Media(format!("Could not determine video {}", key)))
    };

    let duration = parsed["format"]["duration"]
        .as_str()
        .or_else(|| stream["duration"].as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| TripsyError::Media("Could not determine video duration".into()))?;

    // Older containers carry a `rotate` tag; newer ffprobe reports display matrix side data.
    let rotation = stream["tags"]["rotate"]
        .as_str()
        .and_then(|s| s.parse::<i32>().ok())
        .or_else(|| {
            stream["side_data_list"].as_array().and_then(|list| {
                list.iter()
                    .find_map(|d| d["rotation"].as_i64())
                    .and_then(|r| i32::try_from(r).ok())
            })
        })
        .unwrap_or(0);

    Ok(VideoProbe {
        duration,
        width: dimension("width")?,
        height: dimension("height")?,
        rotation,
    })
}

async fn run(program: &str, command: &mut Command) -> Result<Output> {
    let output = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await;
    match output {
        Ok(output) => Ok(output),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(TripsyError::ExternalToolNotFound(program.to_string()))
        }
        Err(e) => Err(TripsyError::Media(format!("{} execution failed: {}", program, e))),
    }
}

/// Query duration, dimensions and rotation of a video file.
pub async fn probe_video(ffprobe: &str, path: &Path) -> Result<VideoProbe> {
    let output = run(
        ffprobe,
        Command::new(ffprobe)
            .arg("-v").arg("error")
            .arg("-select_streams").arg("v:0")
            .arg("-show_entries")
            .arg("stream=width,height,duration:stream_tags=rotate:stream_side_data=rotation:format=duration")
            .arg("-of").arg("json")
            .arg(path),
    )
    .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TripsyError::Media(format!("ffprobe failed: {}", stderr.trim())));
    }

    parse_probe(&String::from_utf8_lossy(&output.stdout))
}

/// Extract evenly spaced keyframes from `video` as JPEG files in `output_dir`.
///
/// Landscape frames are turned 90 degrees clockwise when
/// `rotate_landscape` is set. Frames ffmpeg cannot produce are skipped.
#[instrument(skip_all, fields(video = %video.display()))]
pub async fn extract_keyframes(
    settings: &MediaSettings,
    video: &Path,
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let probe = probe_video(&settings.ffprobe_path, video).await?;
    debug!("Probed video: {:?}", probe);

    let rotate = settings.rotate_landscape && probe.is_landscape();
    let mut frames = Vec::new();

    for (index, timestamp) in frame_timestamps(probe.duration, settings.keyframes)
        .into_iter()
        .enumerate()
    {
        let target = output_dir.join(format!("keyframe_{}.jpg", index));

        let mut command = Command::new(&settings.ffmpeg_path);
        command
            .arg("-v").arg("error")
            .arg("-ss").arg(format!("{:.3}", timestamp))
            .arg("-i").arg(video)
            .arg("-frames:v").arg("1");
        if rotate {
            command.arg("-vf").arg("transpose=1");
        }
        command.arg("-q:v").arg("2").arg("-y").arg(&target);

        let output = run(&settings.ffmpeg_path, &mut command).await?;
        if output.status.success() && target.exists() {
            frames.push(target);
        } else {
            warn!(
                "Skipping frame at {:.3}s: {}",
                timestamp,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_frame_timestamps_evenly_spaced() {
        let stamps = frame_timestamps(10.1, 4);
        assert_eq!(stamps.len(), 4);
        assert_eq!(stamps[0], 0.0);
        assert!((stamps[3] - 10.0).abs() < 1e-9);
        assert!((stamps[1] - 10.0 / 3.0).abs() < 1e-9);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dropped_run_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let script = format!("sleep 0.3; touch '{}'", marker.display());

        let mut command = Command::new("sh");
        command.arg("-c").arg(&script);
        let timed_out =
            tokio::time::timeout(Duration::from_millis(50), run("sh", &mut command)).await;
        assert!(timed_out.is_err());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!marker.exists());
    }

    #[test]
    fn test_frame_timestamps_edge_cases() {
        assert!(frame_timestamps(10.0, 0).is_empty());
        assert_eq!(frame_timestamps(10.0, 1), vec![0.0]);
        assert_eq!(frame_timestamps(0.0, 3), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_parse_probe_with_rotate_tag() {
        let json = r#"{
            "streams": [{"width": 1920, "height": 1080, "tags": {"rotate": "90"}}],
            "format": {"duration": "12.500000"}
        }"#;
        let probe = parse_probe(json).unwrap();
        assert_eq!(probe.duration, 12.5);
        assert_eq!(probe.rotation, 90);
        assert!(!probe.is_landscape());
    }

    #[test]
    fn test_parse_probe_with_side_data() {
        let json = r#"{
            "streams": [{
                "width": 1080, "height": 1920,
                "side_data_list": [{"side_data_type": "Display Matrix", "rotation": -90}]
            }],
            "format": {"duration": "3.0"}
        }"#;
        let probe = parse_probe(json).unwrap();
        assert_eq!(probe.rotation, -90);
        assert!(probe.is_landscape());
    }

    #[test]
    fn test_parse_probe_landscape_without_rotation() {
        let json = r#"{"streams": [{"width": 640, "height": 360}], "format": {"duration": "1.0"}}"#;
        let probe = parse_probe(json).unwrap();
        assert_eq!(probe.rotation, 0);
        assert!(probe.is_landscape());
    }

    #[test]
    fn test_parse_probe_errors() {
        assert!(parse_probe("not json").is_err());
        assert!(parse_probe(r#"{"streams": [], "format": {"duration": "1.0"}}"#).is_err());
        assert!(parse_probe(r#"{"streams": [{"width": 1, "height": 1}], "format": {}}"#).is_err());
    }

    #[tokio::test]
    async fn test_missing_ffprobe_is_reported() {
        let result = probe_video("tripsy-no-such-ffprobe", Path::new("clip.mp4")).await;
        assert!(matches!(result, Err(TripsyError::ExternalToolNotFound(_))));
    }
}
