use std::sync::Arc;

use image::RgbaImage;

use crate::error::{OmrError, Result};

/// The single capture device owned by a controller.
pub trait FrameSource: Send {
    /// Acquire the device. Failing here is fatal for the live path.
    fn start(&mut self) -> Result<()>;

    /// Latest frame, or `None` when the device has nothing new yet.
    fn grab(&mut self) -> Result<Option<RgbaImage>>;

    /// Release the device. Must be idempotent.
    fn stop(&mut self);

    fn is_active(&self) -> bool;
}

/// Plays back a fixed list of frames in a loop.
///
/// Stands in for a camera in tests and in `omrtool`; can be told to refuse
/// acquisition like a device whose permission was denied.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    frames: Vec<Arc<RgbaImage>>,
    next: usize,
    active: bool,
    refusal: Option<String>,
    starts: usize,
}

impl ReplaySource {
    pub fn new(frames: Vec<RgbaImage>) -> Self {
        Self {
            frames: frames.into_iter().map(Arc::new).collect(),
            ..Self::default()
        }
    }

    /// A device that always fails to start with `message`.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            refusal: Some(message.into()),
            ..Self::default()
        }
    }

    /// How many times the device was acquired.
    pub fn starts(&self) -> usize {
        self.starts
    }
}

impl FrameSource for ReplaySource {
    fn start(&mut self) -> Result<()> {
        if let Some(message) = &self.refusal {
            return Err(OmrError::acquisition(message.clone()));
        }
        self.active = true;
        self.starts += 1;
        Ok(())
    }

    fn grab(&mut self) -> Result<Option<RgbaImage>> {
        if !self.active {
            return Err(OmrError::acquisition("capture device is not running"));
        }
        if self.frames.is_empty() {
            return Ok(None);
        }
        let frame = &self.frames[self.next % self.frames.len()];
        self.next = self.next.wrapping_add(1);
        Ok(Some(RgbaImage::clone(frame)))
    }

    fn stop(&mut self) {
        self.active = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_cycles_frames() {
        let mut source = ReplaySource::new(vec![RgbaImage::new(1, 1), RgbaImage::new(2, 2)]);
        assert!(source.grab().is_err());
        source.start().expect("start");
        let sizes: Vec<u32> = (0..3)
            .map(|_| source.grab().expect("grab").expect("frame").width())
            .collect();
        assert_eq!(sizes, vec![1, 2, 1]);
        source.stop();
        source.stop();
        assert!(!source.is_active());
    }

    #[test]
    fn test_unavailable_device() {
        let mut source = ReplaySource::unavailable("permission denied");
        let err = source.start().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(source.starts(), 0);
    }
}
