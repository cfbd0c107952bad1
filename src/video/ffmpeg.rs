//! ffmpeg / ffprobe subprocess codec
//!
//! Probing parses `ffprobe -print_format json`. Decoding reads packed
//! `rgb24` frames from an ffmpeg process's stdout; encoding writes them to an
//! ffmpeg process's stdin, which encodes H.264 and muxes the source audio
//! track when requested. Child processes are killed if a reader or writer is
//! dropped before the stream ends.

use super::{EncodeSettings, FrameReader, FrameWriter, VideoCodec};
use crate::{
    config::EngineConfig,
    error::{RemovalError, Result},
    types::VideoDescriptor,
};
use image::RgbImage;
use serde::Deserialize;
use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

/// Parse an ffprobe rate such as `30000/1001` or `25`
fn parse_frame_rate(rate: &str) -> Option<f64> {
    if let Some((num, den)) = rate.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        return (den > 0.0 && num > 0.0).then(|| num / den);
    }
    rate.trim().parse().ok().filter(|r: &f64| *r > 0.0)
}

/// Build a descriptor from ffprobe JSON
fn parse_probe(json: &str, path: &Path) -> Result<VideoDescriptor> {
    let probe: ProbeOutput = serde_json::from_str(json).map_err(|e| {
        RemovalError::codec(format!("Invalid ffprobe output for '{}': {}", path.display(), e))
    })?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| {
            RemovalError::codec(format!("No video stream found in '{}'", path.display()))
        })?;
    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(RemovalError::codec(format!(
                "Video stream in '{}' has no dimensions",
                path.display()
            )))
        },
    };

    let fps = video
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video.avg_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(30.0);

    let duration_seconds = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let frame_count = video
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u32>().ok())
        .filter(|n| *n > 0)
        .unwrap_or_else(|| (duration_seconds * fps).round().max(0.0) as u32);

    Ok(VideoDescriptor {
        width,
        height,
        fps,
        frame_count,
        duration_seconds,
        codec: video.codec_name.clone().unwrap_or_else(|| "unknown".to_string()),
        has_audio,
    })
}

/// Collect a child's stderr on a background thread so the pipe never fills
fn drain_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    let mut stderr = child.stderr.take()?;
    Some(std::thread::spawn(move || {
        let mut text = String::new();
        let _ = stderr.read_to_string(&mut text);
        text
    }))
}

fn collect_stderr(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn spawn_error(program: &Path, error: &std::io::Error) -> RemovalError {
    RemovalError::file_io_error("run", program, error)
}

/// Codec that shells out to the ffmpeg command-line tools
#[derive(Debug, Clone)]
pub struct FfmpegCodec {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for FfmpegCodec {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegCodec {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(ffmpeg: P, ffprobe: Q) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.ffmpeg_path, &config.ffprobe_path)
    }

    fn encoder_args(
        output: &Path,
        descriptor: &VideoDescriptor,
        settings: &EncodeSettings,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-v",
            "error",
            "-y",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push(format!("{}x{}", descriptor.width, descriptor.height).into());
        args.push("-r".into());
        args.push(format!("{}", descriptor.fps).into());
        args.push("-i".into());
        args.push("-".into());

        let mux_audio = descriptor.has_audio && settings.audio_source.is_some();
        if let Some(source) = settings.audio_source.as_ref().filter(|_| mux_audio) {
            args.push("-i".into());
            args.push(source.as_os_str().to_os_string());
            for arg in ["-map", "0:v:0", "-map", "1:a?", "-c:a", "aac", "-shortest"] {
                args.push(arg.into());
            }
        }

        args.push("-c:v".into());
        args.push("libx264".into());
        if settings.lossless {
            for arg in ["-qp", "0", "-pix_fmt", "yuv444p"] {
                args.push(arg.into());
            }
        } else {
            for arg in ["-crf", "18", "-preset", "medium", "-pix_fmt", "yuv420p"] {
                args.push(arg.into());
            }
            if descriptor.width % 2 != 0 || descriptor.height % 2 != 0 {
                // 4:2:0 chroma needs even dimensions
                args.push("-vf".into());
                args.push("pad=ceil(iw/2)*2:ceil(ih/2)*2".into());
            }
        }

        args.push("-movflags".into());
        args.push("+faststart".into());
        args.push(output.as_os_str().to_os_string());
        args
    }
}

impl VideoCodec for FfmpegCodec {
    fn probe(&self, path: &Path) -> Result<VideoDescriptor> {
        if !path.exists() {
            return Err(RemovalError::file_io_error(
                "open video",
                path,
                &std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }

        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .output()
            .map_err(|e| spawn_error(&self.ffprobe, &e))?;

        if !output.status.success() {
            return Err(RemovalError::codec(format!(
                "ffprobe failed for '{}': {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let descriptor = parse_probe(&String::from_utf8_lossy(&output.stdout), path)?;
        debug!(
            width = descriptor.width,
            height = descriptor.height,
            fps = descriptor.fps,
            frames = descriptor.frame_count,
            codec = %descriptor.codec,
            "Probed video"
        );
        Ok(descriptor)
    }

    fn open_reader(&self, path: &Path, descriptor: &VideoDescriptor) -> Result<Box<dyn FrameReader>> {
        let mut child = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&self.ffmpeg, &e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RemovalError::internal("ffmpeg stdout was not captured"))?;
        let stderr = drain_stderr(&mut child);

        Ok(Box::new(FfmpegFrameReader {
            child,
            stdout,
            stderr,
            width: descriptor.width,
            height: descriptor.height,
            done: false,
        }))
    }

    fn open_writer(
        &self,
        path: &Path,
        descriptor: &VideoDescriptor,
        settings: &EncodeSettings,
    ) -> Result<Box<dyn FrameWriter>> {
        let args = Self::encoder_args(path, descriptor, settings);
        debug!(?args, "Starting ffmpeg encoder");

        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&self.ffmpeg, &e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RemovalError::internal("ffmpeg stdin was not captured"))?;
        let stderr = drain_stderr(&mut child);

        Ok(Box::new(FfmpegFrameWriter {
            child,
            stdin: Some(stdin),
            stderr,
            width: descriptor.width,
            height: descriptor.height,
            finished: false,
        }))
    }
}

struct FfmpegFrameReader {
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    done: bool,
}

impl FfmpegFrameReader {
    fn finish_process(&mut self) -> Result<()> {
        self.done = true;
        let status = self
            .child
            .wait()
            .map_err(|e| RemovalError::internal(format!("Failed to wait for ffmpeg: {}", e)))?;
        if status.success() {
            Ok(())
        } else {
            Err(RemovalError::codec(format!(
                "ffmpeg decoder exited with {}: {}",
                status,
                collect_stderr(self.stderr.take())
            )))
        }
    }
}

impl FrameReader for FfmpegFrameReader {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.done {
            return Ok(None);
        }

        let frame_size = self.width as usize * self.height as usize * 3;
        let mut buffer = vec![0_u8; frame_size];
        let mut filled = 0;
        while filled < frame_size {
            match self.stdout.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {},
                Err(e) => {
                    return Err(RemovalError::codec(format!("Failed to read decoded frame: {}", e)))
                },
            }
        }

        if filled == 0 {
            self.finish_process()?;
            return Ok(None);
        }
        if filled < frame_size {
            self.finish_process()?;
            return Err(RemovalError::codec(format!(
                "Truncated frame: got {} of {} bytes",
                filled, frame_size
            )));
        }

        RgbImage::from_raw(self.width, self.height, buffer)
            .map(Some)
            .ok_or_else(|| RemovalError::internal("Decoded frame has the wrong size"))
    }
}

impl Drop for FfmpegFrameReader {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

struct FfmpegFrameWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    finished: bool,
}

impl FrameWriter for FfmpegFrameWriter {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(RemovalError::internal(format!(
                "Frame is {}x{}, encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| RemovalError::internal("Encoder input already closed"))?;
        stdin.write_all(frame.as_raw()).map_err(|e| {
            RemovalError::codec(format!(
                "ffmpeg encoder rejected frame data: {} {}",
                e,
                collect_stderr(self.stderr.take())
            ))
        })
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        drop(self.stdin.take());
        self.finished = true;
        let status = self
            .child
            .wait()
            .map_err(|e| RemovalError::internal(format!("Failed to wait for ffmpeg: {}", e)))?;
        if status.success() {
            Ok(())
        } else {
            Err(RemovalError::codec(format!(
                "ffmpeg encoder exited with {}: {}",
                status,
                collect_stderr(self.stderr.take())
            )))
        }
    }
}

impl Drop for FfmpegFrameWriter {
    fn drop(&mut self) {
        if !self.finished {
            drop(self.stdin.take());
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
