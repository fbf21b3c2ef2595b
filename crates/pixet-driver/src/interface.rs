//! Host hardware interface over a [`PixetCamera`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use pixet_core::{
    AcqStatus, BufferManager, CameraError, CameraResult, DetInfoCtrl, DetStatus, FrameDim, HwCap,
    HwInterface, HwStatus, ResetLevel, SyncCtrl,
};
use tracing::{error, info, trace};

use crate::camera::PixetCamera;
use crate::components::acquisition::CameraStatus;
use crate::config::DetectorConfig;
use crate::det_info::PixetDetInfo;
use crate::sdk::PixetSdk;
use crate::sync_ctrl::PixetSyncCtrl;

/// Hardware interface handed to the host.
///
/// The host owns its buffer manager; the interface keeps only a weak
/// reference. Preparing after the buffer is gone fails with
/// [`CameraError::BufferReleased`]; frames arriving after it is gone are dropped.
pub struct PixetInterface {
    camera: Arc<PixetCamera>,
    det_info: Arc<PixetDetInfo>,
    sync: Arc<PixetSyncCtrl>,
    buffer: Weak<dyn BufferManager>,
    started: AtomicBool,
    image_number: AtomicU64,
}

impl PixetInterface {
    /// Wrap an opened camera and attach the host buffer manager.
    pub fn new(camera: Arc<PixetCamera>, buffer: &Arc<dyn BufferManager>) -> Self {
        let buffer = Arc::downgrade(buffer);
        camera.acquisition().attach_buffer(buffer.clone());
        Self {
            det_info: Arc::new(PixetDetInfo::new(Arc::clone(&camera))),
            sync: Arc::new(PixetSyncCtrl::new(Arc::clone(&camera))),
            camera,
            buffer,
            started: AtomicBool::new(false),
            image_number: AtomicU64::new(0),
        }
    }

    /// Open the camera and build a buffer with `make_buffer` from its frame geometry.
    ///
    /// Returns the interface together with the buffer, which the caller must keep
    /// alive for as long as frames are wanted.
    pub fn open<B, F>(
        sdk: Arc<dyn PixetSdk>,
        config: &DetectorConfig,
        make_buffer: F,
    ) -> CameraResult<(Self, Arc<B>)>
    where
        B: BufferManager + 'static,
        F: FnOnce(FrameDim) -> B,
    {
        let camera = Arc::new(PixetCamera::open(sdk, config)?);
        let buffer = Arc::new(make_buffer(camera.frame_dim()));
        let dyn_buffer: Arc<dyn BufferManager> = buffer.clone();
        Ok((Self::new(camera, &dyn_buffer), buffer))
    }

    /// The camera behind the capabilities.
    pub fn camera(&self) -> &Arc<PixetCamera> {
        &self.camera
    }

    /// Detector-info capability.
    pub fn det_info(&self) -> &Arc<PixetDetInfo> {
        &self.det_info
    }

    /// Synchronisation capability.
    pub fn sync(&self) -> &Arc<PixetSyncCtrl> {
        &self.sync
    }

    /// The host buffer manager, if the host still holds it.
    pub fn buffer_manager(&self) -> CameraResult<Arc<dyn BufferManager>> {
        self.buffer.upgrade().ok_or(CameraError::BufferReleased)
    }

    /// Number of `start_acq` calls since the last prepare.
    pub fn image_number(&self) -> u64 {
        self.image_number.load(Ordering::SeqCst)
    }

    /// Stop acquiring and shut the SDK down.
    pub fn quit(&self) {
        self.started.store(false, Ordering::SeqCst);
        self.camera.quit();
    }
}

impl HwInterface for PixetInterface {
    fn cap_list(&self) -> Vec<HwCap> {
        let mut caps = vec![
            HwCap::DetInfo(self.det_info.clone() as Arc<dyn DetInfoCtrl>),
            HwCap::Sync(self.sync.clone() as Arc<dyn SyncCtrl>),
        ];
        if let Ok(buffer) = self.buffer_manager() {
            caps.push(HwCap::Buffer(buffer));
        }
        caps
    }

    fn reset(&self, level: ResetLevel) -> CameraResult<()> {
        info!(?level, "Reset requested");
        match level {
            ResetLevel::HardReset => {
                self.started.store(false, Ordering::SeqCst);
                self.camera.hard_reset()
            }
            ResetLevel::SoftReset => Ok(()),
        }
    }

    fn prepare_acq(&self) -> CameraResult<()> {
        if let Err(e) = self.buffer_manager() {
            error!("prepare_acq: host buffer manager no longer exists");
            return Err(e);
        }
        self.sync.prepare_acq();
        self.camera.acquisition().prepare_acq()?;
        self.image_number.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn start_acq(&self) -> CameraResult<()> {
        self.started.store(true, Ordering::SeqCst);
        self.camera.acquisition().start_acq()?;
        self.image_number.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop_acq(&self) -> CameraResult<()> {
        let result = self.camera.acquisition().stop_acq();
        self.started.store(false, Ordering::SeqCst);
        result
    }

    fn status(&self) -> HwStatus {
        let acquisition = self.camera.acquisition();
        let (det, acq) = match acquisition.status() {
            CameraStatus::Error => (DetStatus::FAULT, AcqStatus::Fault),
            CameraStatus::Running => (DetStatus::EXPOSURE, AcqStatus::Running),
            CameraStatus::Ready => {
                // Between per-frame triggers the camera is READY but the host
                // sequence is not over until the last requested frame arrived.
                let acquired = acquisition.nb_acquired_frames();
                let requested = self.sync.nb_frames();
                let sequence_done = acquired > 0 && acquired == requested;
                let acq = if self.started.load(Ordering::SeqCst)
                    && acquisition.is_worker_active()
                    && !sequence_done
                {
                    AcqStatus::Running
                } else {
                    AcqStatus::Ready
                };
                (DetStatus::IDLE, acq)
            }
        };
        trace!(?det, ?acq, "status");
        HwStatus {
            det,
            acq,
            det_mask: DetStatus::EXPOSURE | DetStatus::FAULT,
        }
    }

    fn nb_acquired_frames(&self) -> u64 {
        self.camera.acquisition().nb_acquired_frames()
    }
}

impl Drop for PixetInterface {
    fn drop(&mut self) {
        self.camera.quit();
    }
}
