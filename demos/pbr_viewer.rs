//! # PBR Viewer
//!
//! Shows a glTF model (or the built-in sphere grid) lit by three point lights and an HDR
//! environment, with eye adaptation and tone mapping.
//!
//! Controls:
//! - WASD move, Space/E up, Ctrl/Q down, Shift sprint, hold right mouse to look around
//! - `1`/`2` cycle light strengths, `3`-`6` shader debug modes, `7` toggles the sky source
//! - Escape quits

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use ibl_renderer::{RendererConfig, TonemapOperator};

/// IBL renderer viewer arguments.
#[derive(Parser, Debug)]
#[command(name = "pbr_viewer", about = "PBR + IBL model viewer", version)]
struct Args {
    /// glTF or GLB file to show. Defaults to a grid of spheres.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Equirectangular HDR panorama. Defaults to a procedural sky.
    #[arg(long)]
    environment: Option<PathBuf>,

    /// Initial window width in pixels.
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Initial window height in pixels.
    #[arg(long, default_value = "720")]
    height: u32,

    /// Disable vertical sync (may cause tearing).
    #[arg(long)]
    no_vsync: bool,

    /// Tonemapping operator: reinhard, aces or none.
    #[arg(long, default_value = "aces")]
    operator: TonemapOperator,

    /// Eye adaptation time constant in seconds.
    #[arg(long)]
    adaptation_time: Option<f32>,

    /// Middle-grey key value used for exposure.
    #[arg(long)]
    key_value: Option<f32>,
}

impl From<Args> for RendererConfig {
    fn from(args: Args) -> Self {
        let mut config = RendererConfig {
            width: args.width,
            height: args.height,
            vsync: !args.no_vsync,
            tonemap: args.operator,
            model: args.model,
            environment: args.environment,
            ..Default::default()
        };
        if let Some(time_constant) = args.adaptation_time {
            config.adaptation.time_constant = time_constant;
        }
        if let Some(key_value) = args.key_value {
            config.adaptation.key_value = key_value;
        }
        config
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config: RendererConfig = Args::parse().into();
    match ibl_renderer::run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
