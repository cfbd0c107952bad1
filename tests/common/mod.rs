//! Shared test utilities: image fixtures, fake inpainters and an in-memory
//! video codec injected through the public traits.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use watermark_remover::{
    CloudError, CloudInpaint, CredentialStore, EncodeSettings, EngineConfig, FrameReader,
    FrameWriter, InpaintBackends, InpaintError, LocalInpaint, LocalParams, MemoryCredentialStore,
    PatchInpainter, Region, RemovalError, Result, VideoCodec, VideoDescriptor, WatermarkRemover,
};

/// Write a gradient test image in `format`
pub fn write_test_image(dir: &Path, name: &str, width: u32, height: u32, format: ImageFormat) -> PathBuf {
    let image = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128])
    }));
    let path = dir.join(name);
    image.save_with_format(&path, format).unwrap();
    path
}

/// Write a noisy image that compresses poorly; JPEGs use quality 100
pub fn write_noisy_image(dir: &Path, name: &str, width: u32, height: u32, format: ImageFormat) -> PathBuf {
    let mut state: u32 = 0x1234_5678;
    let image = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xff) as u8
        };
        Rgb([next(), next(), next()])
    }));
    let path = dir.join(name);
    if format == ImageFormat::Jpeg {
        let mut file = std::fs::File::create(&path).unwrap();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut file, 100)
            .encode_image(&image)
            .unwrap();
    } else {
        image.save_with_format(&path, format).unwrap();
    }
    path
}

/// Local inpainter that always fails
pub struct FailingLocal;

impl LocalInpaint for FailingLocal {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn inpaint(
        &self,
        _image: &DynamicImage,
        _region: Region,
        _params: &LocalParams,
    ) -> std::result::Result<DynamicImage, InpaintError> {
        Err(InpaintError::local("synthetic failure"))
    }
}

/// Cloud fake that paints the region black and records its calls
#[derive(Default)]
pub struct FakeCloud {
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    /// Fail the call with this zero-based index
    pub fail_call: Option<(usize, CloudError)>,
    /// Return the image scaled by this factor
    pub scale: Option<u32>,
}

impl FakeCloud {
    pub fn failing_at(call: usize, error: CloudError) -> Self {
        Self {
            fail_call: Some((call, error)),
            ..Self::default()
        }
    }

    pub fn scaling(factor: u32) -> Self {
        Self {
            scale: Some(factor),
            ..Self::default()
        }
    }
}

#[async_trait]
impl CloudInpaint for FakeCloud {
    async fn inpaint(
        &self,
        image: &[u8],
        _mime_type: &str,
        region: Region,
        _api_key: &str,
    ) -> std::result::Result<Vec<u8>, CloudError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some((index, error)) = &self.fail_call {
            if *index == call {
                return Err(error.clone());
            }
        }

        let mut decoded = image::load_from_memory(image)
            .map_err(|e| CloudError::service(e.to_string()))?
            .to_rgb8();
        for y in region.y..region.bottom().min(decoded.height()) {
            for x in region.x..region.right().min(decoded.width()) {
                decoded.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        let mut output = DynamicImage::ImageRgb8(decoded);
        if let Some(factor) = self.scale {
            output = output.resize_exact(output.width() * factor, output.height() * factor, image::imageops::FilterType::Nearest);
        }

        let mut bytes = Vec::new();
        output
            .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| CloudError::service(e.to_string()))?;
        Ok(bytes)
    }

    async fn test_connection(&self, _api_key: &str) -> std::result::Result<bool, CloudError> {
        Ok(true)
    }

    async fn list_models(&self, _api_key: &str) -> std::result::Result<Vec<String>, CloudError> {
        Ok(vec!["models/fake-image".to_string()])
    }
}

/// One-shot latch that blocks a worker thread until opened
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cond.notify_all();
    }

    /// Block until opened; gives up after ten seconds so a broken test cannot hang
    pub fn wait(&self) {
        let guard = self.open.lock().unwrap();
        let _ = self
            .cond
            .wait_timeout_while(guard, Duration::from_secs(10), |open| !*open)
            .unwrap();
    }
}

/// In-memory video codec producing solid frames
#[derive(Clone)]
pub struct MemoryCodec {
    pub width: u32,
    pub height: u32,
    /// Frames the decoder yields
    pub frames: u32,
    /// Frame count the probe reports
    pub reported_frames: u32,
    /// Block before yielding frame `n + 1` until the gate opens
    pub pause_after: Option<(u32, Arc<Gate>)>,
    /// Decoder error when asked for this zero-based frame
    pub fail_at: Option<u32>,
    pub frames_written: Arc<AtomicUsize>,
}

impl MemoryCodec {
    pub fn new(frames: u32) -> Self {
        Self {
            width: 16,
            height: 12,
            frames,
            reported_frames: frames,
            pause_after: None,
            fail_at: None,
            frames_written: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn pause_after(mut self, frame: u32, gate: Arc<Gate>) -> Self {
        self.pause_after = Some((frame, gate));
        self
    }

    pub fn fail_at(mut self, frame: u32) -> Self {
        self.fail_at = Some(frame);
        self
    }

    pub fn reporting(mut self, frames: u32) -> Self {
        self.reported_frames = frames;
        self
    }
}

struct MemoryReader {
    codec: MemoryCodec,
    produced: u32,
}

impl FrameReader for MemoryReader {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if let Some((frame, gate)) = &self.codec.pause_after {
            if self.produced == *frame {
                gate.wait();
            }
        }
        if self.codec.fail_at == Some(self.produced) {
            return Err(RemovalError::codec("synthetic decode failure"));
        }
        if self.produced >= self.codec.frames {
            return Ok(None);
        }
        self.produced += 1;
        Ok(Some(RgbImage::from_pixel(
            self.codec.width,
            self.codec.height,
            Rgb([40, 80, 120]),
        )))
    }
}

struct MemoryWriter {
    path: PathBuf,
    frames: usize,
    counter: Arc<AtomicUsize>,
}

impl FrameWriter for MemoryWriter {
    fn write_frame(&mut self, _frame: &RgbImage) -> Result<()> {
        self.frames += 1;
        self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        std::fs::write(&self.path, vec![7_u8; self.frames * 3])?;
        Ok(())
    }
}

impl VideoCodec for MemoryCodec {
    fn probe(&self, path: &Path) -> Result<VideoDescriptor> {
        if !path.exists() {
            return Err(RemovalError::file_io_error(
                "open video",
                path,
                &std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }
        Ok(VideoDescriptor {
            width: self.width,
            height: self.height,
            fps: 25.0,
            frame_count: self.reported_frames,
            duration_seconds: f64::from(self.reported_frames) / 25.0,
            codec: "memory".to_string(),
            has_audio: false,
        })
    }

    fn open_reader(&self, _path: &Path, _descriptor: &VideoDescriptor) -> Result<Box<dyn FrameReader>> {
        Ok(Box::new(MemoryReader {
            codec: self.clone(),
            produced: 0,
        }))
    }

    fn open_writer(
        &self,
        path: &Path,
        _descriptor: &VideoDescriptor,
        _settings: &EncodeSettings,
    ) -> Result<Box<dyn FrameWriter>> {
        Ok(Box::new(MemoryWriter {
            path: path.to_path_buf(),
            frames: 0,
            counter: Arc::clone(&self.frames_written),
        }))
    }
}

/// Placeholder video file; the memory codec only checks that it exists
pub fn write_fake_video(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"not really a video").unwrap();
    path
}

pub fn scratch_config(dir: &Path) -> EngineConfig {
    EngineConfig::builder()
        .scratch_dir(dir.join("scratch"))
        .build()
        .unwrap()
}

/// Engine with the patch inpainter, a fake cloud and the memory codec
pub fn engine_with(
    dir: &Path,
    local: Arc<dyn LocalInpaint>,
    cloud: Arc<dyn CloudInpaint>,
    credentials: Arc<dyn CredentialStore>,
    codec: MemoryCodec,
) -> WatermarkRemover {
    WatermarkRemover::with_components(
        scratch_config(dir),
        credentials,
        InpaintBackends::new(local, cloud),
        Arc::new(codec),
    )
    .unwrap()
}

pub fn local_engine(dir: &Path) -> WatermarkRemover {
    engine_with(
        dir,
        Arc::new(PatchInpainter::new()),
        Arc::new(FakeCloud::default()),
        Arc::new(MemoryCredentialStore::new()),
        MemoryCodec::new(10),
    )
}

/// Files currently present in a directory (non-recursive)
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect()
        })
        .unwrap_or_default()
}
