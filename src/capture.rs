use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::CaptureError;

pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;
pub const DEFAULT_FRAME_RATE: u32 = 30;

/// Requested camera settings; unset fields fall back to the defaults above
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub frame_rate: Option<u32>,
}

impl CaptureConfig {
    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    fn requested_settings(&self) -> StreamSettings {
        StreamSettings {
            width: self.width.unwrap_or(DEFAULT_WIDTH),
            height: self.height.unwrap_or(DEFAULT_HEIGHT),
            frame_rate: self.frame_rate.unwrap_or(DEFAULT_FRAME_RATE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    VideoInput,
    AudioInput,
    AudioOutput,
}

/// One enumerated media device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub label: String,
    pub kind: DeviceKind,
}

impl DeviceInfo {
    pub fn video(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            label: label.into(),
            kind: DeviceKind::VideoInput,
        }
    }

    /// Rear/environment-facing cameras are preferred when no device is chosen
    fn is_environment_facing(&self) -> bool {
        let label = self.label.to_lowercase();
        ["back", "rear", "environment"]
            .iter()
            .any(|needle| label.contains(needle))
    }
}

/// Stream parameters, either requested or as negotiated by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

/// Hardware/OS boundary for camera access
///
/// `open` may negotiate different settings than requested and returns what
/// the device actually delivers. `close` must be safe to call on a
/// partially-opened device.
pub trait CameraBackend: Send {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, CaptureError>;
    fn open(
        &mut self,
        device_id: &str,
        requested: StreamSettings,
    ) -> Result<StreamSettings, CaptureError>;
    fn read_frame(&mut self) -> Result<RgbaImage, CaptureError>;
    fn close(&mut self);
}

/// A captured frame snapshot
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: Arc<RgbaImage>,
    pub index: u64,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbaImage, index: u64) -> Self {
        Self {
            image: Arc::new(image),
            index,
            captured_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStats {
    pub width: u32,
    pub height: u32,
    pub target_frame_rate: u32,
    pub frames_extracted: u64,
    pub active: bool,
}

/// Camera frame source
///
/// Owns one backend and at most one open stream. Frames are pulled with
/// [`CaptureManager::get_frame`]; [`CaptureManager::frame_interval`] is the
/// advisory pacing for callers that poll on a timer.
pub struct CaptureManager<B: CameraBackend> {
    backend: B,
    device: Option<DeviceInfo>,
    settings: Option<StreamSettings>,
    frames_extracted: u64,
}

impl<B: CameraBackend> CaptureManager<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            device: None,
            settings: None,
            frames_extracted: 0,
        }
    }

    /// Open a camera stream
    ///
    /// An already-active stream is stopped first. On failure the backend is
    /// closed before the error is returned, so the manager is never left
    /// half-initialized.
    pub fn start(&mut self, config: &CaptureConfig) -> Result<StreamSettings, CaptureError> {
        if self.is_active() {
            self.stop();
        }

        let device = self.select_device(config)?;
        let requested = config.requested_settings();

        info!(
            "Starting camera '{}' ({}x{} @ {} fps requested)",
            device.label, requested.width, requested.height, requested.frame_rate
        );

        let negotiated = match self.backend.open(&device.device_id, requested) {
            Ok(settings) => settings,
            Err(err) => {
                warn!("Camera '{}' failed to open: {}", device.label, err);
                self.backend.close();
                return Err(err);
            }
        };

        if negotiated.width == 0 || negotiated.height == 0 {
            self.backend.close();
            return Err(CaptureError::NotReadable(format!(
                "device '{}' negotiated an empty resolution",
                device.label
            )));
        }

        info!(
            "✓ Camera started: {}x{} @ {} fps",
            negotiated.width, negotiated.height, negotiated.frame_rate
        );

        self.device = Some(device);
        self.settings = Some(negotiated);
        Ok(negotiated)
    }

    /// Release the stream. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if self.settings.take().is_some() {
            self.backend.close();
            info!("Camera stopped after {} frames", self.frames_extracted);
        }
        self.device = None;
    }

    /// Latest frame, or `None` while inactive
    pub fn get_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.settings.is_none() {
            return Ok(None);
        }

        let image = self.backend.read_frame()?;
        self.frames_extracted += 1;
        debug!(frame = self.frames_extracted, "frame extracted");
        Ok(Some(Frame::new(image, self.frames_extracted)))
    }

    pub fn is_active(&self) -> bool {
        self.settings.is_some()
    }

    /// Video inputs only
    pub fn list_devices(&self) -> Result<Vec<DeviceInfo>, CaptureError> {
        Ok(self
            .backend
            .enumerate()?
            .into_iter()
            .filter(|d| d.kind == DeviceKind::VideoInput)
            .collect())
    }

    pub fn active_device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    pub fn get_stats(&self) -> CaptureStats {
        let settings = self.settings.unwrap_or(StreamSettings {
            width: 0,
            height: 0,
            frame_rate: DEFAULT_FRAME_RATE,
        });
        CaptureStats {
            width: settings.width,
            height: settings.height,
            target_frame_rate: settings.frame_rate,
            frames_extracted: self.frames_extracted,
            active: self.is_active(),
        }
    }

    /// Advisory pacing derived from the negotiated frame rate (30 FPS default)
    pub fn frame_interval(&self) -> Duration {
        let fps = self
            .settings
            .map(|s| s.frame_rate)
            .unwrap_or(DEFAULT_FRAME_RATE)
            .max(1);
        Duration::from_micros(1_000_000 / u64::from(fps))
    }

    fn select_device(&self, config: &CaptureConfig) -> Result<DeviceInfo, CaptureError> {
        let devices = self.list_devices()?;

        if let Some(ref wanted) = config.device_id {
            return devices
                .into_iter()
                .find(|d| &d.device_id == wanted)
                .ok_or_else(|| CaptureError::NotFound(Some(wanted.clone())));
        }

        let preferred = devices.iter().position(DeviceInfo::is_environment_facing);
        match preferred {
            Some(idx) => Ok(devices[idx].clone()),
            None => devices.into_iter().next().ok_or(CaptureError::NotFound(None)),
        }
    }
}

impl<B: CameraBackend> Drop for CaptureManager<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// In-process camera producing solid pitch-coloured frames
///
/// Stands in for real hardware in the demo binary and tests. Failures can be
/// injected per operation to exercise the error paths.
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    devices: Vec<DeviceInfo>,
    max_resolution: (u32, u32),
    open_error: Option<CaptureError>,
    read_error: Option<CaptureError>,
    enumerate_error: Option<CaptureError>,
    opened: Option<StreamSettings>,
    open_calls: usize,
    close_calls: usize,
}

impl SyntheticCamera {
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        Self {
            devices,
            max_resolution: (1920, 1080),
            open_error: None,
            read_error: None,
            enumerate_error: None,
            opened: None,
            open_calls: 0,
            close_calls: 0,
        }
    }

    /// Front + rear camera pair plus an unrelated microphone
    pub fn with_default_devices() -> Self {
        Self::new(vec![
            DeviceInfo::video("cam-front", "Front Camera"),
            DeviceInfo {
                device_id: "mic-0".to_string(),
                label: "Built-in Microphone".to_string(),
                kind: DeviceKind::AudioInput,
            },
            DeviceInfo::video("cam-rear", "Back Camera"),
        ])
    }

    pub fn with_max_resolution(mut self, width: u32, height: u32) -> Self {
        self.max_resolution = (width, height);
        self
    }

    pub fn fail_open(mut self, err: CaptureError) -> Self {
        self.open_error = Some(err);
        self
    }

    pub fn fail_reads(mut self, err: CaptureError) -> Self {
        self.read_error = Some(err);
        self
    }

    pub fn fail_enumerate(mut self, err: CaptureError) -> Self {
        self.enumerate_error = Some(err);
        self
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls
    }

    pub fn is_open(&self) -> bool {
        self.opened.is_some()
    }
}

impl CameraBackend for SyntheticCamera {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, CaptureError> {
        match &self.enumerate_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.devices.clone()),
        }
    }

    fn open(
        &mut self,
        device_id: &str,
        requested: StreamSettings,
    ) -> Result<StreamSettings, CaptureError> {
        self.open_calls += 1;
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }
        if !self.devices.iter().any(|d| d.device_id == device_id) {
            return Err(CaptureError::NotFound(Some(device_id.to_string())));
        }

        let settings = StreamSettings {
            width: requested.width.min(self.max_resolution.0),
            height: requested.height.min(self.max_resolution.1),
            frame_rate: requested.frame_rate.min(60),
        };
        self.opened = Some(settings);
        Ok(settings)
    }

    fn read_frame(&mut self) -> Result<RgbaImage, CaptureError> {
        if let Some(err) = &self.read_error {
            return Err(err.clone());
        }
        let settings = self.opened.ok_or(CaptureError::NotActive)?;
        Ok(RgbaImage::from_pixel(
            settings.width,
            settings.height,
            Rgba([34, 139, 34, 255]),
        ))
    }

    fn close(&mut self) {
        self.close_calls += 1;
        self.opened = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> CaptureConfig {
        CaptureConfig::default().with_resolution(64, 36)
    }

    #[test]
    fn test_prefers_environment_camera() {
        let mut manager = CaptureManager::new(SyntheticCamera::with_default_devices());
        manager.start(&small_config()).unwrap();

        assert_eq!(manager.active_device().unwrap().device_id, "cam-rear");
        assert!(manager.is_active());
    }

    #[test]
    fn test_explicit_device_selection() {
        let mut manager = CaptureManager::new(SyntheticCamera::with_default_devices());
        manager
            .start(&small_config().with_device("cam-front"))
            .unwrap();
        assert_eq!(manager.active_device().unwrap().label, "Front Camera");
    }

    #[test]
    fn test_unknown_device_is_not_found() {
        let mut manager = CaptureManager::new(SyntheticCamera::with_default_devices());
        let err = manager
            .start(&small_config().with_device("cam-9"))
            .unwrap_err();
        assert_eq!(err, CaptureError::NotFound(Some("cam-9".to_string())));
        assert!(!manager.is_active());
    }

    #[test]
    fn test_no_video_devices() {
        let mut manager = CaptureManager::new(SyntheticCamera::new(vec![]));
        assert_eq!(
            manager.start(&small_config()).unwrap_err(),
            CaptureError::NotFound(None)
        );
    }

    #[test]
    fn test_open_failure_tears_down() {
        let camera =
            SyntheticCamera::with_default_devices().fail_open(CaptureError::PermissionDenied);
        let mut manager = CaptureManager::new(camera);

        let err = manager.start(&small_config()).unwrap_err();
        assert_eq!(err, CaptureError::PermissionDenied);
        assert!(!manager.is_active());
        assert_eq!(manager.backend.open_calls(), 1);
        assert_eq!(manager.backend.close_calls(), 1);
        assert!(manager.get_frame().unwrap().is_none());
    }

    #[test]
    fn test_negotiated_resolution() {
        let camera = SyntheticCamera::with_default_devices().with_max_resolution(32, 18);
        let mut manager = CaptureManager::new(camera);
        let settings = manager.start(&small_config()).unwrap();

        assert_eq!((settings.width, settings.height), (32, 18));
        let frame = manager.get_frame().unwrap().unwrap();
        assert_eq!((frame.width(), frame.height()), (32, 18));
    }

    #[test]
    fn test_frame_counter_and_stats() {
        let mut manager = CaptureManager::new(SyntheticCamera::with_default_devices());
        assert!(manager.get_frame().unwrap().is_none());

        manager.start(&small_config()).unwrap();
        let first = manager.get_frame().unwrap().unwrap();
        let second = manager.get_frame().unwrap().unwrap();
        assert_eq!(first.index, 1);
        assert_eq!(second.index, 2);

        let stats = manager.get_stats();
        assert_eq!(stats.frames_extracted, 2);
        assert_eq!(stats.target_frame_rate, 30);
        assert_eq!((stats.width, stats.height), (64, 36));
        assert!(stats.active);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut manager = CaptureManager::new(SyntheticCamera::with_default_devices());
        manager.start(&small_config()).unwrap();

        manager.stop();
        manager.stop();

        assert!(!manager.is_active());
        assert_eq!(manager.backend.close_calls(), 1);
        assert!(!manager.get_stats().active);
    }

    #[test]
    fn test_list_devices_filters_video_inputs() {
        let manager = CaptureManager::new(SyntheticCamera::with_default_devices());
        let devices = manager.list_devices().unwrap();
        assert_eq!(devices.len(), 2);
        assert!(devices.iter().all(|d| d.kind == DeviceKind::VideoInput));
    }

    #[test]
    fn test_frame_interval_defaults_to_30fps() {
        let manager = CaptureManager::new(SyntheticCamera::with_default_devices());
        assert_eq!(manager.frame_interval(), Duration::from_micros(33_333));
    }

    #[test]
    fn test_read_failure_surfaces() {
        let camera = SyntheticCamera::with_default_devices()
            .fail_reads(CaptureError::NotReadable("busy".to_string()));
        let mut manager = CaptureManager::new(camera);
        manager.start(&small_config()).unwrap();

        assert!(matches!(
            manager.get_frame(),
            Err(CaptureError::NotReadable(_))
        ));
        assert_eq!(manager.get_stats().frames_extracted, 0);
    }
}
