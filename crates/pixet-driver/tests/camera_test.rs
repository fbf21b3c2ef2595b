//! Integration tests for camera bring-up and settings.
//!
//! Tests the camera against the simulated SDK:
//! - Bring-up (factory discovery, model detection, pixel depth)
//! - Energy thresholds, bias, operation mode
//! - Trigger mode mapping and synchronisation bounds
//! - Capability list and shutdown
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p pixet-driver --test camera_test
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;

use common::{factory_dir, factory_file, fast_minipix, fast_widepix, TestCamera};
use pixet_core::{
    CameraError, DetInfoCtrl, HwInterface, ImageType, Size, SyncCtrl, TrigMode,
};
use pixet_driver::mock::{MockConfig, MockPixet, DEFAULT_THRESHOLD_KEV};
use pixet_driver::{DetectorConfig, OperationMode, PixetCamera, SensorFamily};

fn open_camera(mock: MockConfig, config: &DetectorConfig) -> (Arc<MockPixet>, Result<PixetCamera, CameraError>) {
    common::init_tracing();
    let sdk = Arc::new(MockPixet::new(mock));
    let camera = PixetCamera::open(sdk.clone(), config);
    (sdk, camera)
}

// =============================================================================
// Bring-up
// =============================================================================

mod bring_up {
    use super::*;

    #[test]
    fn single_chip_timepix3() {
        let cam = TestCamera::new(fast_minipix());
        let det_info = cam.interface.det_info();

        assert_eq!(det_info.max_image_size(), Size::new(16, 8));
        assert_eq!(det_info.detector_image_size(), Size::new(16, 8));
        assert_eq!(det_info.def_image_type().unwrap(), ImageType::Bpp16);
        assert_eq!(det_info.curr_image_type().unwrap(), ImageType::Bpp16);
        assert_eq!(det_info.detector_type(), "Timepix3");
        assert_eq!(det_info.detector_model(), "MiniPIX TPX3 J06-W0105 - W0105_A01");
        assert_eq!(det_info.pixel_size(), (55e-6, 55e-6));

        let camera = cam.interface.camera();
        assert_eq!(camera.family(), SensorFamily::Timepix3);
        assert_eq!(
            camera.features().operation_mode().unwrap(),
            OperationMode::EventItot
        );
        assert_eq!(
            cam.device.loaded_config(),
            Some(factory_file(&cam.factory))
        );
    }

    #[test]
    fn medipix3_bit_depth_follows_counter_depth() {
        let cam = TestCamera::new(MockConfig {
            counter_depth: 3,
            ..fast_widepix()
        });
        let det_info = cam.interface.det_info();
        assert_eq!(det_info.def_image_type().unwrap(), ImageType::Bpp24);
        assert_eq!(det_info.detector_type(), "Medipix3");
        assert_eq!(
            cam.interface.camera().features().operation_mode().unwrap(),
            OperationMode::Spm1Ch
        );

        let cam = TestCamera::new(fast_widepix());
        assert_eq!(
            cam.interface.det_info().def_image_type().unwrap(),
            ImageType::Bpp12
        );
    }

    #[test]
    fn unsupported_counter_depth_is_fatal() {
        let factory = factory_dir("WidePIX.xml");
        let config = DetectorConfig {
            factory_dir: factory.path().to_path_buf(),
            ..DetectorConfig::default()
        };
        let (sdk, result) = open_camera(
            MockConfig {
                counter_depth: 5,
                ..fast_widepix()
            },
            &config,
        );
        assert!(matches!(result, Err(CameraError::Configuration(_))));
        assert_eq!(sdk.exit_count(), 1, "SDK must be shut down");
    }

    #[test]
    fn unknown_model_is_fatal() {
        let factory = factory_dir("FitPIX.xml");
        let config = DetectorConfig {
            factory_dir: factory.path().to_path_buf(),
            ..DetectorConfig::default()
        };
        let (sdk, result) = open_camera(
            MockConfig {
                full_name: "FitPIX MPX2 H05".into(),
                ..fast_minipix()
            },
            &config,
        );
        let err = result.err().unwrap();
        assert!(matches!(err, CameraError::Configuration(_)));
        assert!(err.to_string().contains("fitpix"));
        assert_eq!(sdk.exit_count(), 1);
        assert!(!sdk.is_started());
    }

    #[test]
    fn no_device_is_fatal() {
        let factory = factory_dir("MiniPIX.xml");
        let config = DetectorConfig {
            factory_dir: factory.path().to_path_buf(),
            ..DetectorConfig::default()
        };
        let (sdk, result) = open_camera(
            MockConfig {
                connected: false,
                ..fast_minipix()
            },
            &config,
        );
        assert!(matches!(result, Err(CameraError::Configuration(_))));
        assert_eq!(sdk.exit_count(), 1);
    }

    #[test]
    fn ambiguous_factory_dir_fails_before_sdk_start() {
        let factory = factory_dir("a.xml");
        std::fs::write(factory.path().join("b.xml"), "").unwrap();
        let config = DetectorConfig {
            factory_dir: factory.path().to_path_buf(),
            ..DetectorConfig::default()
        };
        let (sdk, result) = open_camera(fast_minipix(), &config);
        assert!(matches!(result, Err(CameraError::Configuration(_))));
        assert!(!sdk.is_started());
        assert_eq!(sdk.exit_count(), 0);
    }

    #[test]
    fn explicit_config_file_must_exist() {
        let factory = factory_dir("MiniPIX.xml");
        let config = DetectorConfig::with_config_file(factory.path().join("missing.xml"));
        let (sdk, result) = open_camera(fast_minipix(), &config);
        let err = result.err().unwrap();
        assert!(matches!(err, CameraError::Configuration(_)));
        assert!(err.to_string().contains("missing.xml"));
        assert_eq!(sdk.exit_count(), 1);
    }

    #[test]
    fn configured_settings_applied_at_open() {
        let cam = TestCamera::with_detector(fast_minipix(), |config| {
            config.energy_threshold = Some(7.5);
            config.operation_mode = Some("ToT".into());
        });
        let features = cam.interface.camera().features();
        assert_eq!(features.energy_threshold0().unwrap(), 7.5);
        assert_eq!(features.operation_mode().unwrap(), OperationMode::TotNotoa);
    }

    #[test]
    fn configured_mode_from_wrong_family_is_rejected() {
        let factory = factory_dir("MiniPIX.xml");
        let config = DetectorConfig {
            factory_dir: factory.path().to_path_buf(),
            operation_mode: Some("CSM".into()),
            ..DetectorConfig::default()
        };
        let (sdk, result) = open_camera(fast_minipix(), &config);
        assert!(matches!(result, Err(CameraError::Validation { .. })));
        assert_eq!(sdk.exit_count(), 1);
    }
}

// =============================================================================
// Settings
// =============================================================================

mod settings {
    use super::*;

    #[test]
    fn energy_threshold_round_trip() {
        let cam = TestCamera::new(fast_minipix());
        let features = cam.interface.camera().features();

        for kev in [0.0, 0.5, 3.6, 60.0, 119.9, 120.0] {
            features.set_energy_threshold0(kev).unwrap();
            assert_eq!(features.energy_threshold0().unwrap(), kev);
        }
    }

    #[test]
    fn energy_threshold_out_of_range_keeps_value() {
        let cam = TestCamera::new(fast_minipix());
        let features = cam.interface.camera().features();
        features.set_energy_threshold0(10.0).unwrap();

        for kev in [-0.1, -50.0, 120.01, 500.0, f64::NAN] {
            let err = features.set_energy_threshold0(kev).unwrap_err();
            assert!(err.is_validation(), "{} keV should be rejected", kev);
            assert_eq!(features.energy_threshold0().unwrap(), 10.0);
        }
    }

    #[test]
    fn energy_threshold_applied_to_every_chip() {
        let cam = TestCamera::new(fast_widepix());
        cam.interface
            .camera()
            .features()
            .set_energy_threshold0(12.0)
            .unwrap();
        for chip in 0..5 {
            assert_eq!(cam.device.raw_threshold(chip, 0), Some(12.0));
            assert_eq!(cam.device.raw_threshold(chip, 1), Some(DEFAULT_THRESHOLD_KEV));
        }
    }

    #[test]
    fn second_threshold_not_supported_on_timepix3() {
        let cam = TestCamera::new(fast_minipix());
        let features = cam.interface.camera().features();

        assert_eq!(features.energy_threshold1().unwrap(), None);
        let err = features.set_energy_threshold1(10.0).unwrap_err();
        assert!(matches!(err, CameraError::NotSupported(_)));
        assert_eq!(features.energy_threshold0().unwrap(), DEFAULT_THRESHOLD_KEV);
    }

    #[test]
    fn second_threshold_on_medipix3() {
        let cam = TestCamera::new(fast_widepix());
        let features = cam.interface.camera().features();

        features.set_energy_threshold1(25.0).unwrap();
        assert_eq!(features.energy_threshold1().unwrap(), Some(25.0));
        for chip in 0..5 {
            assert_eq!(cam.device.raw_threshold(chip, 1), Some(25.0));
        }
        assert!(features.set_energy_threshold1(121.0).is_err());
        assert_eq!(features.energy_threshold1().unwrap(), Some(25.0));
    }

    #[test]
    fn unknown_operation_mode_keeps_mode() {
        let cam = TestCamera::new(fast_minipix());
        let features = cam.interface.camera().features();

        let err = features.set_operation_mode_by_name("Event+ToT").unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("Event+iToT"), "lists choices: {}", err);
        assert_eq!(features.operation_mode().unwrap(), OperationMode::EventItot);

        let err = features.set_operation_mode_by_name("CSM").unwrap_err();
        assert!(err.is_validation());
        assert_eq!(features.operation_mode().unwrap(), OperationMode::EventItot);

        features.set_operation_mode_by_name("ToA").unwrap();
        assert_eq!(features.operation_mode().unwrap(), OperationMode::Toa);
    }

    #[test]
    fn operation_mode_choices_per_family() {
        let cam = TestCamera::new(fast_minipix());
        assert_eq!(
            cam.interface.camera().features().operation_mode_choices(),
            vec!["ToA+ToT", "ToA", "Event+iToT", "ToT"]
        );
    }

    #[test]
    fn bias_and_sensors() {
        let cam = TestCamera::new(fast_minipix());
        let features = cam.interface.camera().features();

        features.set_bias_voltage(-120.0).unwrap();
        assert_eq!(features.bias_voltage().unwrap(), -120.0);
        assert!((features.sensed_bias_voltage().unwrap() - (-117.6)).abs() < 1e-9);
        assert_eq!(features.sensed_bias_current().unwrap(), 0.5);
        assert_eq!(features.temperature().unwrap(), 38.5);
    }

    #[test]
    fn image_type_is_fixed() {
        let cam = TestCamera::new(fast_minipix());
        let det_info = cam.interface.det_info();
        assert!(det_info.set_curr_image_type(ImageType::Bpp16).is_ok());
        assert!(matches!(
            det_info.set_curr_image_type(ImageType::Bpp24),
            Err(CameraError::NotSupported(_))
        ));
    }
}

// =============================================================================
// Synchronisation
// =============================================================================

mod sync {
    use super::*;

    #[test]
    fn supported_trigger_modes_round_trip() {
        let cam = TestCamera::new(fast_minipix());
        let sync = cam.interface.sync();

        assert_eq!(sync.trig_mode(), Some(TrigMode::IntTrig));
        for mode in [TrigMode::IntTrigMult, TrigMode::IntTrig] {
            assert!(sync.check_trig_mode(mode));
            sync.set_trig_mode(mode).unwrap();
            assert_eq!(sync.trig_mode(), Some(mode));
        }
    }

    #[test]
    fn other_trigger_modes_rejected() {
        let cam = TestCamera::new(fast_minipix());
        let sync = cam.interface.sync();
        sync.set_trig_mode(TrigMode::IntTrigMult).unwrap();

        for mode in [
            TrigMode::ExtTrigSingle,
            TrigMode::ExtTrigMult,
            TrigMode::ExtGate,
            TrigMode::ExtStartStop,
            TrigMode::ExtTrigReadout,
        ] {
            assert!(!sync.check_trig_mode(mode));
            assert!(matches!(
                sync.set_trig_mode(mode),
                Err(CameraError::NotSupported(_))
            ));
            assert_eq!(sync.trig_mode(), Some(TrigMode::IntTrigMult));
        }
    }

    #[test]
    fn exposure_bounds() {
        let cam = TestCamera::new(fast_minipix());
        let sync = cam.interface.sync();

        sync.set_exp_time(0.25).unwrap();
        assert_eq!(sync.exp_time(), 0.25);
        assert!(sync.set_exp_time(0.0).is_err());
        assert!(sync.set_exp_time(2e6).is_err());
        assert_eq!(sync.exp_time(), 0.25);

        let ranges = sync.valid_ranges();
        assert_eq!(ranges.min_exp_time, 1e-7);
        assert_eq!(ranges.max_exp_time, 1e6);
        assert_eq!((ranges.min_lat_time, ranges.max_lat_time), (0.0, 0.0));
    }

    #[test]
    fn frame_count_and_latency() {
        let cam = TestCamera::new(fast_minipix());
        let sync = cam.interface.sync();

        sync.set_nb_hw_frames(7);
        assert_eq!(sync.nb_frames(), 7);
        assert_eq!(sync.nb_hw_frames(), 7);
        assert!(sync.set_lat_time(0.0).is_ok());
        assert!(sync.set_lat_time(0.1).is_err());

        sync.set_exp_time(0.5).unwrap();
        assert_eq!(sync.prepare_acq(), 0.5);
        assert_eq!(cam.interface.camera().acquisition().nb_frames(), 7);
    }
}

// =============================================================================
// Capabilities and shutdown
// =============================================================================

mod lifecycle {
    use super::*;

    #[test]
    fn cap_list_includes_live_buffer() {
        let cam = TestCamera::new(fast_minipix());
        let names: Vec<_> = cam.interface.cap_list().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["DetInfo", "Sync", "Buffer"]);
    }

    #[test]
    fn cap_list_drops_released_buffer() {
        let TestCamera {
            interface, buffer, ..
        } = TestCamera::new(fast_minipix());
        drop(buffer);
        let names: Vec<_> = interface.cap_list().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["DetInfo", "Sync"]);
    }

    #[test]
    fn quit_shuts_sdk_down_once() {
        let cam = TestCamera::new(fast_minipix());
        cam.interface.quit();
        assert!(cam.interface.camera().is_closed());
        assert_eq!(cam.sdk.exit_count(), 1);

        let sdk = cam.sdk.clone();
        drop(cam);
        assert_eq!(sdk.exit_count(), 1);
    }

    #[test]
    fn drop_shuts_sdk_down() {
        let cam = TestCamera::new(fast_minipix());
        let sdk = cam.sdk.clone();
        assert!(sdk.is_started());
        drop(cam);
        assert_eq!(sdk.exit_count(), 1);
        assert!(!sdk.is_started());
    }
}
