//! Example: stream a synthetic signal through a forward and an inverse
//! engine block by block and report the reconstruction error.
//!
//! Uses the GPU when one is available and falls back to the host backend.
//!
//! Run with:
//!     RUST_LOG=info cargo run --example offline_roundtrip

use anyhow::{bail, Context};
use streamfft::gpu::GpuProvider;
use streamfft::synth::{sine, white_noise};
use streamfft::{
    BlockStatus, DeviceClass, DeviceProvider, Diagnostics, Direction, EngineConfig,
    HostProvider, Severity, StreamFftBuilder,
};

const SAMPLE_RATE: u32 = 48000;
const BLOCK: usize = 1024;
const BLOCKS: usize = 48;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_file(&path)
            .with_context(|| format!("loading config from {}", path))?,
        None => EngineConfig {
            size: BLOCK as u32,
            ..Default::default()
        },
    };

    let diagnostics = Diagnostics::new(|severity, message| match severity {
        Severity::Notice => println!("notice: {}", message),
        Severity::Error => eprintln!("error: {}", message),
    });

    let mut signal = sine(440.0, SAMPLE_RATE, BLOCK * BLOCKS, 0.5);
    for (s, n) in signal.iter_mut().zip(white_noise(BLOCK * BLOCKS, 0.05, 1)) {
        *s += n;
    }

    if GpuProvider::new()
        .acquire(config.device, &Diagnostics::silent())
        .is_ok()
    {
        println!("Running on the {} device", config.device);
        run(GpuProvider::new(), GpuProvider::new(), &config, &diagnostics, &signal)
    } else {
        println!("No {} adapter, running on the host backend", config.device);
        let config = EngineConfig {
            device: DeviceClass::Cpu,
            ..config
        };
        run(HostProvider::new(), HostProvider::new(), &config, &diagnostics, &signal)
    }
}

fn run<P: DeviceProvider>(
    forward_provider: P,
    inverse_provider: P,
    config: &EngineConfig,
    diagnostics: &Diagnostics,
    signal: &[f32],
) -> anyhow::Result<()> {
    let (mut forward, mut forward_control) = StreamFftBuilder::from_config(config.clone())
        .direction(Direction::Forward)
        .diagnostics(diagnostics.clone())
        .build(forward_provider)?;
    let (mut inverse, mut inverse_control) = StreamFftBuilder::from_config(config.clone())
        .direction(Direction::Inverse)
        .diagnostics(diagnostics.clone())
        .build(inverse_provider)?;

    // The host tells both engines about its block layout once
    forward_control.negotiate_block(BLOCK, BLOCK * 2)?;
    inverse_control.negotiate_block(BLOCK, BLOCK * 2)?;

    let mut freq = vec![0.0f32; BLOCK * 2];
    let mut output = vec![0.0f32; BLOCK];
    let mut worst = 0.0f32;

    for (index, block) in signal.chunks(BLOCK).enumerate() {
        if !forward.on_block_boundary() || !inverse.on_block_boundary() {
            bail!("no compute device became ready");
        }

        let mut time = block.to_vec();
        let status = forward.process(&mut time, &mut freq);
        if status != BlockStatus::Processed {
            println!("block {}: forward {:?}", index, status);
        }
        inverse.process(&mut output, &mut freq);

        let error = block
            .iter()
            .zip(&output)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        worst = worst.max(error);
    }

    let status = inverse_control.status();
    println!("{}", serde_json::to_string_pretty(&status)?);
    println!(
        "{} blocks of {} samples, worst reconstruction error {:.2e}",
        signal.len() / BLOCK,
        BLOCK,
        worst
    );
    Ok(())
}
