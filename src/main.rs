//! Cloud noise generator
//!
//! Builds the base and detail noise volumes on the GPU and optionally dumps
//! a slice of each to PNG for inspection.

use std::path::Path;

use clap::Parser;
use image::RgbaImage;

use cloudnoise::cli::Args;
use cloudnoise::host::{ComputeHost, RecordingHost, VolumeHandle, WgpuHost};
use cloudnoise::params::CloudNoiseConfig;
use cloudnoise::pipeline::{GenerateOutcome, NoisePipeline};

/// Run two passes: the first generates, the second should be a no-op
fn run_passes<H: ComputeHost>(
    pipeline: &mut NoisePipeline<H>,
    config: &CloudNoiseConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    for pass in 1..=2 {
        match pipeline.generate(config)? {
            GenerateOutcome::Generated(report) => {
                println!("Pass {}: generated ({:?})", pass, report.reason);
                println!(
                    "  Base:   {}^3 texels, {}^3 groups{}",
                    config.base_resolution,
                    report.base_groups,
                    if report.base_dispatched { "" } else { " (skipped)" }
                );
                println!(
                    "  Detail: {}^3 texels, {}^3 groups",
                    config.detail_resolution, report.detail_groups
                );
                if let Some(timing) = report.timing {
                    println!(
                        "  Time: {:.2}ms (CPU: {:.2}ms GPU: {:.2}ms)",
                        timing.total().as_secs_f64() * 1000.0,
                        timing.upload.as_secs_f64() * 1000.0,
                        timing.gpu.as_secs_f64() * 1000.0
                    );
                }
            }
            GenerateOutcome::Skipped => println!("Pass {}: up to date, skipped", pass),
        }
    }
    Ok(())
}

fn export_slice(
    host: &WgpuHost,
    volume: Option<VolumeHandle>,
    side: u32,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(volume) = volume else {
        return Ok(());
    };
    let pixels = host.read_volume_slice(volume, side / 2)?;
    let image = RgbaImage::from_raw(side, side, pixels).ok_or("Slice size mismatch")?;
    image.save(path)?;
    println!("  Output: {}", path.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let config = args.build_config()?;

    println!("Cloud Noise Generator");
    println!(
        "  Simplex: seed {}, {} layers",
        config.simplex.seed, config.simplex.num_layers
    );
    println!(
        "  Worley:  base {} points, detail {} points",
        config.worley.total_point_count(),
        config.detail_worley.total_point_count()
    );

    if args.dry_run {
        let mut pipeline = NoisePipeline::new(RecordingHost::new())?;
        run_passes(&mut pipeline, &config)?;
        println!("\nHost calls:");
        for call in &pipeline.host().calls {
            println!("  {:?}", call);
        }
        return Ok(());
    }

    let host = WgpuHost::new_blocking()?;
    let mut pipeline = NoisePipeline::new(host)?;
    run_passes(&mut pipeline, &config)?;

    if let Some(dir) = &args.export {
        std::fs::create_dir_all(dir)?;
        export_slice(
            pipeline.host(),
            pipeline.base_volume(),
            config.base_side(),
            &dir.join("base_noise.png"),
        )?;
        export_slice(
            pipeline.host(),
            pipeline.detail_volume(),
            config.detail_side(),
            &dir.join("detail_noise.png"),
        )?;
    }

    Ok(())
}
