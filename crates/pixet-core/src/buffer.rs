//! Host buffer-manager contract and a minimal in-memory implementation.
//!
//! The camera adapter never owns frame storage. It copies each frame into a slot
//! of the host's buffer manager and then announces it with
//! [`BufferManager::new_frame_ready`]. [`MemoryBuffer`] is a ring of slots good
//! enough to drive the adapter from tests and the CLI.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView2};
use parking_lot::Mutex;

use crate::error::{CameraError, CameraResult};
use crate::hw::ImageType;

/// Geometry of one frame slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDim {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// Pixel depth of the slot.
    pub image_type: ImageType,
}

impl FrameDim {
    /// Shape as (height, width), matching row-major frame arrays.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }
}

/// Notification payload for a delivered frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameInfo {
    /// Zero-based index of the frame within the acquisition.
    pub acq_frame_nb: u64,
    /// Capture timestamp.
    pub frame_timestamp: DateTime<Utc>,
}

/// Host-side frame buffer.
///
/// Implementations must be safe to call from the adapter's frame consumer thread
/// while the host reads frames from other threads.
pub trait BufferManager: Send + Sync {
    /// Geometry every delivered frame must match.
    fn frame_dim(&self) -> FrameDim;

    /// Record the start of an acquisition.
    fn set_start_timestamp(&self, timestamp: DateTime<Utc>);

    /// Copy a frame into the slot for `frame_nb`.
    fn copy_frame(&self, frame_nb: u64, frame: ArrayView2<'_, i16>) -> CameraResult<()>;

    /// Announce a frame whose data has been copied.
    ///
    /// Returns `false` if the host wants the acquisition to stop.
    fn new_frame_ready(&self, info: FrameInfo) -> bool;
}

#[derive(Debug, Clone, Default)]
struct Slot {
    frame_nb: Option<u64>,
    data: Option<Array2<i16>>,
    ready: bool,
}

#[derive(Debug, Default)]
struct MemoryBufferState {
    slots: Vec<Slot>,
    /// Latest notifications, at most one per slot.
    recent: VecDeque<FrameInfo>,
    nb_ready: usize,
    start_timestamp: Option<DateTime<Utc>>,
}

/// Ring of in-memory frame slots.
///
/// Memory stays bounded by the slot count however long the buffer lives.
#[derive(Debug)]
pub struct MemoryBuffer {
    dim: FrameDim,
    state: Mutex<MemoryBufferState>,
}

impl MemoryBuffer {
    /// Allocate `nb_slots` empty slots of geometry `dim`.
    #[must_use]
    pub fn new(dim: FrameDim, nb_slots: usize) -> Self {
        let nb_slots = nb_slots.max(1);
        Self {
            dim,
            state: Mutex::new(MemoryBufferState {
                slots: vec![Slot::default(); nb_slots],
                recent: VecDeque::with_capacity(nb_slots),
                ..MemoryBufferState::default()
            }),
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn nb_slots(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// Frame data held for `frame_nb`, if its slot still holds that frame and
    /// it has been announced.
    #[must_use]
    pub fn frame(&self, frame_nb: u64) -> Option<Array2<i16>> {
        let state = self.state.lock();
        let slot = &state.slots[slot_index(frame_nb, state.slots.len())];
        if slot.ready && slot.frame_nb == Some(frame_nb) {
            slot.data.clone()
        } else {
            None
        }
    }

    /// Latest ready notifications in arrival order, at most one per slot.
    #[must_use]
    pub fn ready_frames(&self) -> Vec<FrameInfo> {
        self.state.lock().recent.iter().cloned().collect()
    }

    /// Number of ready notifications received since creation or [`clear`](Self::clear).
    #[must_use]
    pub fn nb_ready(&self) -> usize {
        self.state.lock().nb_ready
    }

    /// Timestamp recorded at acquisition start.
    #[must_use]
    pub fn start_timestamp(&self) -> Option<DateTime<Utc>> {
        self.state.lock().start_timestamp
    }

    /// Drop all frames and notifications, keeping the slot count.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.slots.iter_mut().for_each(|slot| *slot = Slot::default());
        state.recent.clear();
        state.nb_ready = 0;
        state.start_timestamp = None;
    }
}

fn slot_index(frame_nb: u64, nb_slots: usize) -> usize {
    (frame_nb % nb_slots as u64) as usize
}

impl BufferManager for MemoryBuffer {
    fn frame_dim(&self) -> FrameDim {
        self.dim
    }

    fn set_start_timestamp(&self, timestamp: DateTime<Utc>) {
        self.state.lock().start_timestamp = Some(timestamp);
    }

    fn copy_frame(&self, frame_nb: u64, frame: ArrayView2<'_, i16>) -> CameraResult<()> {
        let actual = frame.dim();
        if actual != self.dim.shape() {
            return Err(CameraError::ShapeMismatch {
                expected: self.dim.shape(),
                actual,
            });
        }
        let mut state = self.state.lock();
        let idx = slot_index(frame_nb, state.slots.len());
        state.slots[idx] = Slot {
            frame_nb: Some(frame_nb),
            data: Some(frame.to_owned()),
            ready: false,
        };
        Ok(())
    }

    fn new_frame_ready(&self, info: FrameInfo) -> bool {
        tracing::trace!(frame = info.acq_frame_nb, "frame ready");
        let mut state = self.state.lock();
        let nb_slots = state.slots.len();
        let slot = &mut state.slots[slot_index(info.acq_frame_nb, nb_slots)];
        if slot.frame_nb == Some(info.acq_frame_nb) {
            slot.ready = true;
        }
        if state.recent.len() == nb_slots {
            state.recent.pop_front();
        }
        state.recent.push_back(info);
        state.nb_ready += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn dim() -> FrameDim {
        FrameDim {
            width: 4,
            height: 2,
            image_type: ImageType::Bpp16,
        }
    }

    #[test]
    fn test_copy_and_read_back() {
        let buffer = MemoryBuffer::new(dim(), 3);
        let frame = Array2::from_shape_fn((2, 4), |(r, c)| (r * 4 + c) as i16);
        buffer.copy_frame(0, frame.view()).unwrap();
        assert!(buffer.new_frame_ready(FrameInfo {
            acq_frame_nb: 0,
            frame_timestamp: Utc::now(),
        }));

        let stored = buffer.frame(0).unwrap();
        assert_eq!(stored[[1, 3]], 7);
        assert_eq!(buffer.nb_ready(), 1);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let buffer = MemoryBuffer::new(dim(), 1);
        let wrong = Array2::<i16>::zeros((4, 2));
        let err = buffer.copy_frame(0, wrong.view()).unwrap_err();
        assert!(matches!(
            err,
            CameraError::ShapeMismatch {
                expected: (2, 4),
                actual: (4, 2)
            }
        ));
    }

    #[test]
    fn test_ring_overwrites_old_frames() {
        let buffer = MemoryBuffer::new(dim(), 2);
        for nb in 0..3u64 {
            let frame = Array2::from_elem((2, 4), nb as i16);
            buffer.copy_frame(nb, frame.view()).unwrap();
            buffer.new_frame_ready(FrameInfo {
                acq_frame_nb: nb,
                frame_timestamp: Utc::now(),
            });
        }
        assert!(buffer.frame(0).is_none());
        assert_eq!(buffer.frame(2).unwrap()[[0, 0]], 2);
        assert_eq!(buffer.frame(1).unwrap()[[0, 0]], 1);
    }

    fn announce(buffer: &MemoryBuffer, nb: u64) {
        let frame = Array2::from_elem((2, 4), nb as i16);
        buffer.copy_frame(nb, frame.view()).unwrap();
        buffer.new_frame_ready(FrameInfo {
            acq_frame_nb: nb,
            frame_timestamp: Utc::now(),
        });
    }

    #[test]
    fn test_long_run_keeps_history_bounded() {
        let buffer = MemoryBuffer::new(dim(), 4);
        for nb in 0..1000u64 {
            announce(&buffer, nb);
        }
        assert_eq!(buffer.nb_ready(), 1000);
        let recent: Vec<u64> = buffer.ready_frames().iter().map(|i| i.acq_frame_nb).collect();
        assert_eq!(recent, vec![996, 997, 998, 999]);
        assert_eq!(buffer.frame(999).unwrap()[[0, 0]], 999);
        assert!(buffer.frame(995).is_none());
    }

    #[test]
    fn test_copied_frame_hidden_until_announced() {
        let buffer = MemoryBuffer::new(dim(), 2);
        announce(&buffer, 0);
        let frame = Array2::from_elem((2, 4), 2i16);
        buffer.copy_frame(2, frame.view()).unwrap();
        assert!(buffer.frame(2).is_none());
        assert!(buffer.frame(0).is_none());
    }

    #[test]
    fn test_clear() {
        let buffer = MemoryBuffer::new(dim(), 2);
        buffer.set_start_timestamp(Utc::now());
        announce(&buffer, 0);
        buffer.clear();
        assert!(buffer.start_timestamp().is_none());
        assert_eq!(buffer.nb_ready(), 0);
        assert!(buffer.ready_frames().is_empty());
        assert!(buffer.frame(0).is_none());
        assert_eq!(buffer.nb_slots(), 2);
    }
}
