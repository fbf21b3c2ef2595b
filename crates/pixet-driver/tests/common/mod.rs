//! Shared test utilities for the Pixet driver integration tests.
//!
//! - `TestCamera`: simulated SDK, factory directory, interface and host buffer
//! - `wait_until`: bounded polling for asynchronous state changes

#![allow(dead_code)] // Utilities may not all be used in every test file
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pixet_core::{BufferManager, MemoryBuffer};
use pixet_driver::mock::{MockConfig, MockDevice, MockPixet};
use pixet_driver::{DetectorConfig, PixetInterface};
use tempfile::TempDir;

/// Simulated detector wired to an interface and an in-memory host buffer.
pub struct TestCamera {
    pub sdk: Arc<MockPixet>,
    pub device: Arc<MockDevice>,
    pub interface: PixetInterface,
    pub buffer: Arc<MemoryBuffer>,
    pub factory: TempDir,
}

impl TestCamera {
    pub fn new(mock: MockConfig) -> Self {
        Self::with_detector(mock, |_| {})
    }

    /// Build with a detector config tweak applied on top of the test defaults.
    pub fn with_detector(mock: MockConfig, tweak: impl FnOnce(&mut DetectorConfig)) -> Self {
        init_tracing();
        let factory = factory_dir("MiniPIX-J06-W0105.xml");
        let mut config = DetectorConfig {
            factory_dir: factory.path().to_path_buf(),
            start_settle: Duration::from_millis(5),
            stop_timeout: Duration::from_secs(2),
            ..DetectorConfig::default()
        };
        tweak(&mut config);

        let sdk = Arc::new(MockPixet::new(mock));
        let device = sdk.device();
        let (interface, buffer) =
            PixetInterface::open(sdk.clone(), &config, |dim| MemoryBuffer::new(dim, 64))
                .expect("camera should open");
        Self {
            sdk,
            device,
            interface,
            buffer,
            factory,
        }
    }

    pub fn buffer_dyn(&self) -> Arc<dyn BufferManager> {
        self.buffer.clone()
    }
}

/// Fast single-chip Timepix3: 16x8 pixels, 2 ms per frame.
pub fn fast_minipix() -> MockConfig {
    MockConfig {
        width: 16,
        height: 8,
        frame_period: Duration::from_millis(2),
        ..MockConfig::minipix()
    }
}

/// Fast five-chip Medipix3: 40x8 pixels, 2 ms per frame.
pub fn fast_widepix() -> MockConfig {
    MockConfig {
        width: 40,
        height: 8,
        chip_count: 5,
        frame_period: Duration::from_millis(2),
        ..MockConfig::widepix()
    }
}

/// Temporary factory directory holding one XML file.
pub fn factory_dir(file_name: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(file_name), "<device/>").unwrap();
    dir
}

pub fn factory_file(dir: &TempDir) -> PathBuf {
    fs::read_dir(dir.path())
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path()
}

/// Poll `condition` until it holds or `timeout` expires.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
