//! Frame delivery into the host buffer.
//!
//! Runs on the session's frame consumer thread. Each completed SDK frame is
//! reduced to `i16` samples, shaped (height, width), copied into the host slot
//! and announced.

use std::sync::Weak;

use chrono::Utc;
use ndarray::Array2;
use pixet_core::{BufferManager, CameraError, CameraResult, FrameInfo};
use tracing::trace;

use crate::family::PixelSource;
use crate::sdk::{AcquiredFrame, FrameData};

/// Outcome of delivering one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Frame copied and announced.
    Delivered,
    /// No buffer manager attached to the session.
    NoBuffer,
    /// The host released the buffer manager; frame dropped.
    BufferReleased,
}

/// Copies frames from the SDK into a host buffer.
pub struct FrameBridge {
    buffer: Option<Weak<dyn BufferManager>>,
    pixel_source: PixelSource,
    shape: (usize, usize),
}

impl FrameBridge {
    /// `shape` is the detector geometry as (height, width).
    pub fn new(
        buffer: Option<Weak<dyn BufferManager>>,
        pixel_source: PixelSource,
        shape: (usize, usize),
    ) -> Self {
        Self {
            buffer,
            pixel_source,
            shape,
        }
    }

    /// Deliver `frame` into slot `frame_nb`.
    pub fn deliver(&self, frame_nb: u64, frame: &dyn AcquiredFrame) -> CameraResult<Delivery> {
        let Some(weak) = &self.buffer else {
            return Ok(Delivery::NoBuffer);
        };
        let Some(buffer) = weak.upgrade() else {
            return Ok(Delivery::BufferReleased);
        };

        let expected = buffer.frame_dim().shape();
        if expected != self.shape {
            return Err(CameraError::ShapeMismatch {
                expected,
                actual: self.shape,
            });
        }

        let samples = self.samples(frame)?;
        let pixels = Array2::from_shape_vec(self.shape, samples.to_i16()).map_err(|e| {
            CameraError::Hardware(format!(
                "frame of {} samples does not fit {:?}: {}",
                samples.len(),
                self.shape,
                e
            ))
        })?;

        buffer.copy_frame(frame_nb, pixels.view())?;
        let accepted = buffer.new_frame_ready(FrameInfo {
            acq_frame_nb: frame_nb,
            frame_timestamp: Utc::now(),
        });
        trace!(frame = frame_nb, accepted, "Frame delivered");
        Ok(Delivery::Delivered)
    }

    fn samples(&self, frame: &dyn AcquiredFrame) -> CameraResult<FrameData> {
        match self.pixel_source {
            PixelSource::Direct => Ok(frame.data()),
            PixelSource::SubFrame(index) => {
                let sub = frame.sub_frame(index).ok_or_else(|| {
                    CameraError::Hardware(format!(
                        "frame has {} sub-frames, channel {} missing",
                        frame.sub_frame_count(),
                        index
                    ))
                })?;
                trace!(index, name = %sub.name, "Reading sub-frame");
                Ok(sub.data)
            }
        }
    }
}
