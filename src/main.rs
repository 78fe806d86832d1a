use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;

use refire::archive::DirectoryArchive;
use refire::device::vulkan::{VulkanDevice, VulkanDeviceConfig};
use refire::filter::ReplayFilter;
use refire::{run_replay, ReplayOptions, Replayer};

/// Replays a captured Vulkan pipeline archive to warm driver caches and
/// measure compilation cost.
#[derive(Parser)]
#[command(name = "refire")]
#[command(version)]
struct Args {
    /// Path to the replay archive.
    archive: PathBuf,

    /// Worker thread count. Defaults to the number of hardware threads.
    #[arg(long, default_value_t = 0)]
    num_threads: usize,

    /// Re-create every shader module and pipeline this many times.
    #[arg(long = "loop", default_value_t = 1)]
    loop_count: u32,

    /// Create pipelines against a driver pipeline cache.
    #[arg(long)]
    pipeline_cache: bool,

    /// Seed the pipeline cache from this file and write it back on exit.
    /// Implies --pipeline-cache.
    #[arg(long)]
    on_disk_pipeline_cache: Option<PathBuf>,

    /// Replay only this graphics pipeline hash (repeatable).
    #[arg(long = "filter-graphics", value_parser = parse_hash)]
    filter_graphics: Vec<u64>,

    /// Replay only this compute pipeline hash (repeatable).
    #[arg(long = "filter-compute", value_parser = parse_hash)]
    filter_compute: Vec<u64>,

    /// Index of the physical device to replay on.
    #[arg(long, default_value_t = 0)]
    device_index: usize,

    /// Enable the Khronos validation layer.
    #[arg(long)]
    enable_validation: bool,
}

fn parse_hash(value: &str) -> Result<u64, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|_| format!("invalid hash: {}", value))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let open_start = Instant::now();
    let archive = match DirectoryArchive::open(&args.archive) {
        Ok(archive) => archive,
        Err(err) => {
            log::error!("Failed to open archive {}: {:?}", args.archive.display(), err);
            return ExitCode::FAILURE;
        }
    };
    log::info!("Opening archive took {} ms", open_start.elapsed().as_millis());

    let device = Arc::new(VulkanDevice::new(VulkanDeviceConfig {
        device_index: args.device_index,
        enable_validation: args.enable_validation,
        pipeline_cache: args.pipeline_cache || args.on_disk_pipeline_cache.is_some(),
        on_disk_pipeline_cache_path: args.on_disk_pipeline_cache,
    }));

    let filter = ReplayFilter::new(
        args.filter_graphics.into_iter().collect(),
        args.filter_compute.into_iter().collect(),
    );

    let replayer = Replayer::new(
        device,
        filter,
        ReplayOptions {
            num_threads: args.num_threads,
            loop_count: args.loop_count,
        },
    );

    match run_replay(&archive, &replayer) {
        Ok(report) => {
            report.log();
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("Replay failed: {:?}", err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_values_accept_hex_and_decimal() {
        assert_eq!(parse_hash("0x2A").unwrap(), 42);
        assert_eq!(parse_hash("42").unwrap(), 42);
        assert!(parse_hash("zebra").is_err());
    }

    #[test]
    fn args_parse_repeatable_filters() {
        let args = Args::parse_from([
            "refire",
            "archive-dir",
            "--num-threads",
            "8",
            "--loop",
            "3",
            "--filter-graphics",
            "0x1",
            "--filter-graphics",
            "0x2",
        ]);
        assert_eq!(args.num_threads, 8);
        assert_eq!(args.loop_count, 3);
        assert_eq!(args.filter_graphics, vec![1, 2]);
        assert!(args.filter_compute.is_empty());
    }
}
