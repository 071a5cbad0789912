use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use image::{DynamicImage, ImageBuffer, Rgb};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::InterpreterError;

// Consecutive capture failures before the worker gives up on the device.
const MAX_CAPTURE_FAILURES: u32 = 30;

/// One decoded RGB frame from a capture source.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at: Instant,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            data,
            width,
            height,
            captured_at: Instant::now(),
        }
    }

    /// Whether the classifier can accept this frame: nonzero dimensions and
    /// a full RGB payload. Anything else gets skipped, never submitted.
    pub fn is_decodable(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == (self.width as usize) * (self.height as usize) * 3
    }

    pub fn to_image(&self) -> Result<DynamicImage> {
        let buffer = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(
            self.width,
            self.height,
            self.data.clone(),
        )
        .ok_or_else(|| {
            anyhow!(
                "frame buffer does not match {}x{} RGB",
                self.width,
                self.height
            )
        })?;
        Ok(DynamicImage::ImageRgb8(buffer))
    }
}

/// Requested capture parameters. The device maps them to its closest
/// supported format; frames are resized again at classification time.
#[derive(Debug, Clone)]
pub struct CameraConstraints {
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Bias device fallback toward index 0, which is the integrated
    /// user-facing camera on most machines.
    pub prefer_front: bool,
}

/// A live source of frames. Owned by exactly one detection session and
/// released when that session ends.
#[async_trait]
pub trait FrameSource: Send {
    /// Latest frame from the source. `Ok(None)` means nothing usable has
    /// arrived yet and the caller should skip this tick; an error means the
    /// source failed for good.
    async fn capture_frame(&mut self) -> Result<Option<VideoFrame>, InterpreterError>;

    /// Stop the underlying capture and free the device.
    async fn release(&mut self);
}

/// Hands out frame sources on request, mapping provider failures to
/// [`InterpreterError::CameraUnavailable`].
#[async_trait]
pub trait CameraProvider: Send + Sync {
    async fn acquire(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Box<dyn FrameSource>, InterpreterError>;
}

/// Real webcam capture through nokhwa.
pub struct NokhwaProvider;

impl NokhwaProvider {
    /// Probe the usual index range for responsive devices.
    pub fn detect_cameras() -> Vec<u32> {
        let mut cameras = Vec::new();

        for cam_id in 0..10 {
            let camera_index = CameraIndex::Index(cam_id);
            let requested_format =
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

            if Camera::new(camera_index, requested_format).is_ok() {
                cameras.push(cam_id);
            }
        }

        cameras
    }
}

#[async_trait]
impl CameraProvider for NokhwaProvider {
    async fn acquire(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Box<dyn FrameSource>, InterpreterError> {
        info!(
            device = constraints.device_index,
            width = constraints.width,
            height = constraints.height,
            fps = constraints.fps,
            "acquiring camera"
        );

        let latest: Arc<Mutex<Option<VideoFrame>>> = Arc::new(Mutex::new(None));
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel();

        let worker_constraints = constraints.clone();
        let worker_latest = Arc::clone(&latest);
        let worker_stop = Arc::clone(&stop);
        let worker = std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || capture_worker(worker_constraints, worker_latest, worker_stop, ready_tx))
            .map_err(|e| InterpreterError::CameraUnavailable(e.to_string()))?;

        match ready_rx.await {
            Ok(Ok(device_index)) => {
                info!(device = device_index, "camera stream open");
                Ok(Box::new(CameraCapture {
                    latest,
                    stop,
                    worker: Some(worker),
                }))
            }
            Ok(Err(err)) => {
                let _ = worker.join();
                Err(err)
            }
            Err(_) => {
                let _ = worker.join();
                Err(InterpreterError::CameraUnavailable(
                    "capture thread exited before reporting".to_string(),
                ))
            }
        }
    }
}

/// Frame source backed by a dedicated capture thread. The nokhwa camera is
/// not `Send`, so it lives and dies on that thread; the session only ever
/// sees the most recent decoded frame.
pub struct CameraCapture {
    latest: Arc<Mutex<Option<VideoFrame>>>,
    stop: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
}

#[async_trait]
impl FrameSource for CameraCapture {
    async fn capture_frame(&mut self) -> Result<Option<VideoFrame>, InterpreterError> {
        let worker_done = self
            .worker
            .as_ref()
            .map_or(true, |worker| worker.is_finished());
        if worker_done && !self.stop.load(Ordering::Relaxed) {
            return Err(InterpreterError::PlaybackFailure(
                "capture thread terminated unexpectedly".to_string(),
            ));
        }

        Ok(self.latest.lock().clone())
    }

    async fn release(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = tokio::task::spawn_blocking(move || worker.join()).await;
        }
        *self.latest.lock() = None;
        debug!("camera released");
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        // Backstop for sessions that never called release.
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn capture_worker(
    constraints: CameraConstraints,
    latest: Arc<Mutex<Option<VideoFrame>>>,
    stop: Arc<AtomicBool>,
    ready_tx: oneshot::Sender<Result<u32, InterpreterError>>,
) {
    let (mut camera, device_index) = match open_camera(&constraints) {
        Ok(opened) => opened,
        Err(err) => {
            let _ = ready_tx.send(Err(err));
            return;
        }
    };
    let _ = ready_tx.send(Ok(device_index));

    let retry_pause = Duration::from_millis(1000 / constraints.fps.max(1) as u64);
    let mut consecutive_failures = 0u32;

    while !stop.load(Ordering::Relaxed) {
        match camera.frame() {
            Ok(frame) => match frame.decode_image::<RgbFormat>() {
                Ok(decoded) => {
                    consecutive_failures = 0;
                    let (width, height) = decoded.dimensions();
                    *latest.lock() = Some(VideoFrame::new(width, height, decoded.into_raw()));
                }
                Err(err) => {
                    consecutive_failures += 1;
                    warn!(%err, "frame decode failed");
                }
            },
            Err(err) => {
                consecutive_failures += 1;
                warn!(%err, "camera read failed");
                std::thread::sleep(retry_pause);
            }
        }

        if consecutive_failures >= MAX_CAPTURE_FAILURES {
            warn!("camera stopped delivering frames, giving up");
            break;
        }
    }

    if let Err(err) = camera.stop_stream() {
        warn!(%err, "error stopping camera stream");
    }
    debug!("camera capture thread exited");
}

fn open_camera(constraints: &CameraConstraints) -> Result<(Camera, u32), InterpreterError> {
    let available = NokhwaProvider::detect_cameras();
    if available.is_empty() {
        return Err(InterpreterError::CameraUnavailable(
            "no cameras detected on this system".to_string(),
        ));
    }
    info!("found {} camera(s): {:?}", available.len(), available);

    // Requested device first, then the integrated camera when the user
    // prefers facing themselves, then everything else.
    let mut candidates = vec![constraints.device_index];
    if constraints.prefer_front {
        candidates.push(0);
    }
    candidates.extend(available.iter().copied());
    let mut seen = Vec::new();
    candidates.retain(|id| {
        if seen.contains(id) {
            false
        } else {
            seen.push(*id);
            true
        }
    });

    let mut last_error: Option<InterpreterError> = None;
    for cam_id in candidates {
        if !available.contains(&cam_id) {
            continue;
        }
        match try_open_camera(cam_id, constraints) {
            Ok(camera) => return Ok((camera, cam_id)),
            Err(err) => {
                warn!(device = cam_id, %err, "failed to open camera");
                last_error = Some(err);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        InterpreterError::CameraUnavailable("no usable camera found".to_string())
    }))
}

fn try_open_camera(cam_id: u32, constraints: &CameraConstraints) -> Result<Camera, InterpreterError> {
    let camera_index = CameraIndex::Index(cam_id);
    let requested_format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
        CameraFormat::new(
            Resolution::new(constraints.width, constraints.height),
            FrameFormat::MJPEG,
            constraints.fps,
        ),
    ));

    let mut camera = Camera::new(camera_index, requested_format)
        .map_err(|e| InterpreterError::CameraUnavailable(e.to_string()))?;
    camera
        .open_stream()
        .map_err(|e| InterpreterError::CameraUnavailable(e.to_string()))?;

    // One probe frame proves the stream actually delivers.
    camera
        .frame()
        .map_err(|e| InterpreterError::PlaybackFailure(e.to_string()))?;

    Ok(camera)
}

/// Synthetic frames for running without camera hardware: a gray field with
/// a bright square drifting across it, plus a little sensor noise.
pub struct SyntheticProvider;

#[async_trait]
impl CameraProvider for SyntheticProvider {
    async fn acquire(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Box<dyn FrameSource>, InterpreterError> {
        info!(
            width = constraints.width,
            height = constraints.height,
            "using synthetic frame source"
        );
        Ok(Box::new(SyntheticSource {
            width: constraints.width.max(1),
            height: constraints.height.max(1),
            tick: 0,
            released: false,
        }))
    }
}

struct SyntheticSource {
    width: u32,
    height: u32,
    tick: u64,
    released: bool,
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn capture_frame(&mut self) -> Result<Option<VideoFrame>, InterpreterError> {
        if self.released {
            return Err(InterpreterError::PlaybackFailure(
                "synthetic source already released".to_string(),
            ));
        }

        self.tick += 1;
        let (width, height) = (self.width as usize, self.height as usize);
        let mut rng = rand::thread_rng();
        let mut data = vec![96u8; width * height * 3];

        for byte in data.iter_mut().step_by(7) {
            *byte = byte.saturating_add(rng.gen_range(0..24));
        }

        let square = (width.min(height) / 4).max(1);
        let offset_x = (self.tick as usize * 3) % (width.saturating_sub(square).max(1));
        let offset_y = height / 3;
        for y in offset_y..(offset_y + square).min(height) {
            for x in offset_x..(offset_x + square).min(width) {
                let index = (y * width + x) * 3;
                data[index] = 230;
                data[index + 1] = 214;
                data[index + 2] = 180;
            }
        }

        Ok(Some(VideoFrame::new(self.width, self.height, data)))
    }

    async fn release(&mut self) {
        self.released = true;
        debug!("synthetic source released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodable_requires_full_rgb_payload() {
        let good = VideoFrame::new(4, 2, vec![0u8; 4 * 2 * 3]);
        assert!(good.is_decodable());

        let empty = VideoFrame::new(0, 0, Vec::new());
        assert!(!empty.is_decodable());

        let short = VideoFrame::new(4, 2, vec![0u8; 5]);
        assert!(!short.is_decodable());
    }

    #[test]
    fn frame_converts_to_image() {
        let frame = VideoFrame::new(2, 2, vec![255u8; 2 * 2 * 3]);
        let image = frame.to_image().unwrap();
        assert_eq!(image.width(), 2);
        assert_eq!(image.height(), 2);
    }

    #[tokio::test]
    async fn synthetic_source_delivers_decodable_frames() {
        let provider = SyntheticProvider;
        let constraints = CameraConstraints {
            device_index: 0,
            width: 64,
            height: 48,
            fps: 30,
            prefer_front: true,
        };
        let mut source = provider.acquire(&constraints).await.unwrap();

        let frame = source.capture_frame().await.unwrap().unwrap();
        assert!(frame.is_decodable());

        source.release().await;
        assert!(source.capture_frame().await.is_err());
    }
}
