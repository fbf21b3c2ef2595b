//! CLI entry point for pixet-camera
//!
//! Opens the configured detector through the device-server binding and runs
//! one command against it. Without an SDK binding linked, the `[simulator]`
//! section describes the detector.
//!
//! # Usage
//!
//! ```bash
//! pixet-camera --config config/pixet.toml info
//! pixet-camera info --json
//! pixet-camera acquire --frames 10 --exposure 0.01
//! pixet-camera acquire --frames 5 --per-frame
//! pixet-camera attr list
//! pixet-camera attr set energy_threshold 8.5
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pixet_camera::config::{AppConfig, DEFAULT_CONFIG_PATH};
use pixet_camera::device_server::{attr_info, AttrValue, DeviceServer, ATTRIBUTES};
use pixet_camera::logging;
use pixet_core::{AcqStatus, DetInfoCtrl, HwInterface, SyncCtrl, TrigMode};
use pixet_driver::mock::MockPixet;
use tracing::info;

#[derive(Parser)]
#[command(name = "pixet-camera")]
#[command(about = "Timepix3/Medipix3 camera adapter", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print detector information
    Info {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Acquire a sequence of frames into the in-memory buffer
    Acquire {
        /// Number of frames
        #[arg(long, default_value_t = 1)]
        frames: u64,

        /// Exposure time in seconds
        #[arg(long, default_value_t = 0.01)]
        exposure: f64,

        /// Issue one start per frame instead of a single trigger
        #[arg(long)]
        per_frame: bool,
    },

    /// Read and write device attributes
    Attr {
        #[command(subcommand)]
        action: AttrAction,
    },
}

#[derive(Subcommand)]
enum AttrAction {
    /// List attributes with access, unit and description
    List,
    /// Read one attribute
    Get { name: String },
    /// Write one attribute
    Set { name: String, value: String },
    /// Authorized values of an enumerated attribute
    Values { name: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;
    logging::init_from_config(&config)?;

    let server = open_server(&config)?;
    let result = match cli.command {
        Commands::Info { json } => print_info(&server, json),
        Commands::Acquire {
            frames,
            exposure,
            per_frame,
        } => acquire(&server, frames, exposure, per_frame, &config),
        Commands::Attr { action } => attr(&server, action),
    };
    server.delete_device();
    result
}

fn open_server(config: &AppConfig) -> Result<DeviceServer> {
    let sdk = Arc::new(MockPixet::new(config.simulator.clone()));
    DeviceServer::new(
        sdk,
        config.device.clone(),
        &config.detector,
        config.buffer.slots,
    )
    .context("failed to open detector")
}

fn print_info(server: &DeviceServer, json: bool) -> Result<()> {
    let interface = server.interface();
    let camera = interface.camera();
    let det_info = interface.det_info();

    let values = ATTRIBUTES
        .iter()
        .map(|attr| Ok((attr, server.read_attribute(attr.name)?)))
        .collect::<Result<Vec<_>>>()?;

    if json {
        let attributes: serde_json::Map<_, _> = values
            .iter()
            .map(|(attr, value)| {
                let value = match value {
                    AttrValue::Double(v) => serde_json::json!(v),
                    AttrValue::String(s) => serde_json::json!(s),
                };
                (attr.name.to_string(), value)
            })
            .collect();
        let size = det_info.max_image_size();
        let info = serde_json::json!({
            "model": det_info.detector_model(),
            "type": det_info.detector_type(),
            "width": size.width,
            "height": size.height,
            "bpp": det_info.def_image_type()?.bits(),
            "chips": camera.chip_ids(),
            "config_file": camera.config_file(),
            "state": server.state().to_string(),
            "attributes": attributes,
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Model:        {}", det_info.detector_model());
    println!("Type:         {}", det_info.detector_type());
    println!("Size:         {}", det_info.max_image_size());
    println!("Depth:        {} bit", det_info.def_image_type()?.bits());
    println!("Chips:        {}", camera.chip_ids().join(", "));
    println!("Config file:  {}", camera.config_file().display());
    println!("State:        {}", server.state());
    for (attr, value) in &values {
        println!("{:<22}{} {}", format!("{}:", attr.name), value, attr.unit);
    }
    Ok(())
}

fn acquire(
    server: &DeviceServer,
    frames: u64,
    exposure: f64,
    per_frame: bool,
    config: &AppConfig,
) -> Result<()> {
    let interface = server.interface();
    let sync = interface.sync();
    sync.set_nb_frames(frames);
    sync.set_exp_time(exposure)?;
    sync.set_trig_mode(if per_frame {
        TrigMode::IntTrigMult
    } else {
        TrigMode::IntTrig
    })?;

    let per_frame_budget = config.simulator.frame_period + Duration::from_secs_f64(exposure);
    let timeout = per_frame_budget * frames.max(1) as u32 + Duration::from_secs(10);
    let started = Instant::now();

    interface.prepare_acq()?;
    if per_frame {
        for frame in 1..=frames {
            interface.start_acq()?;
            wait_for(timeout, started, || interface.nb_acquired_frames() >= frame)?;
            info!(frame, "Frame acquired");
        }
    } else {
        interface.start_acq()?;
    }
    wait_for(timeout, started, || {
        interface.status().acq != AcqStatus::Running
    })?;

    if interface.status().acq == AcqStatus::Fault {
        bail!(
            "acquisition failed: {}",
            interface
                .camera()
                .acquisition()
                .fault()
                .unwrap_or_else(|| "unknown fault".into())
        );
    }
    interface.stop_acq()?;

    println!(
        "Acquired {} frame(s) in {:.3} s ({} in buffer)",
        interface.nb_acquired_frames(),
        started.elapsed().as_secs_f64(),
        server.buffer().nb_ready()
    );
    Ok(())
}

fn wait_for(timeout: Duration, started: Instant, mut done: impl FnMut() -> bool) -> Result<()> {
    while !done() {
        if started.elapsed() > timeout {
            bail!("acquisition did not complete within {:?}", timeout);
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    Ok(())
}

fn attr(server: &DeviceServer, action: AttrAction) -> Result<()> {
    match action {
        AttrAction::List => {
            for attr in ATTRIBUTES {
                println!(
                    "{:<22}{:<4}{:<5}{}",
                    attr.name,
                    if attr.is_writable() { "rw" } else { "r" },
                    attr.unit,
                    attr.description
                );
            }
        }
        AttrAction::Get { name } => {
            println!("{}", server.read_attribute(&name)?);
        }
        AttrAction::Set { name, value } => {
            let value = attr_info(&name)?.parse(&value)?;
            server.write_attribute(&name, value)?;
            println!("{} = {}", name, server.read_attribute(&name)?);
        }
        AttrAction::Values { name } => {
            for value in server.attr_string_value_list(&name)? {
                println!("{}", value);
            }
        }
    }
    Ok(())
}
