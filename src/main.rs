//! p2pbench - peer-to-peer accelerator/NVMe throughput benchmark.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use p2pbench::bench::Benchmark;
use p2pbench::clock::MonotonicClock;
use p2pbench::cli::{Cli, needs_help};
use p2pbench::config::Config;
use p2pbench::device::{DeviceBuffer, fill_pattern};
use p2pbench::storage::DirectStorage;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over -v.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let json_output = cli.json.clone();
    let config = cli.into_config().context("failed to read configuration")?;
    if needs_help(&config) {
        eprintln!("{}", Cli::help_text());
        return Ok(ExitCode::from(2));
    }
    config.validate().context("invalid configuration")?;

    with_device_buffer(&config, |buffer| {
        benchmark(&config, buffer, json_output.as_deref())
    })?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(feature = "xrt")]
fn with_device_buffer<F>(config: &Config, f: F) -> Result<()>
where
    F: FnOnce(&mut dyn DeviceBuffer) -> Result<()>,
{
    use p2pbench::device::xrt::XrtDevice;

    println!("Open the device {}", config.device_index);
    let device = XrtDevice::open(config.device_index)?;
    if let Some(xclbin) = &config.xclbin {
        println!("Load the xclbin {}", xclbin.display());
        device.load_xclbin(xclbin)?;
    }
    let mut buffer = device
        .alloc_p2p(config.transfer_size, config.bank)
        .context("failed to allocate the P2P buffer")?;
    f(&mut buffer)
}

#[cfg(not(feature = "xrt"))]
fn with_device_buffer<F>(config: &Config, f: F) -> Result<()>
where
    F: FnOnce(&mut dyn DeviceBuffer) -> Result<()>,
{
    use p2pbench::device::HostBuffer;
    use p2pbench::{Error, ErrorKind};

    if let Some(xclbin) = &config.xclbin {
        return Err(Error::new(
            ErrorKind::Unsupported,
            "loading an xclbin needs a build with the `xrt` feature",
        )
        .with_operation("with_device_buffer")
        .with_context("xclbin", xclbin.display().to_string())
        .into());
    }
    tracing::info!("no device backend compiled in, using a host buffer");
    let mut buffer = HostBuffer::new(config.transfer_size)?;
    f(&mut buffer)
}

fn benchmark(config: &Config, buffer: &mut dyn DeviceBuffer, json: Option<&Path>) -> Result<()> {
    fill_pattern(buffer.as_mut_slice());

    let storage = DirectStorage::new(config.direct_io);
    let mut bench = Benchmark::new(config, buffer, storage, MonotonicClock::new())?;

    println!("\nStarting {} iterations W/R", config.iterations);
    let report = bench
        .run(|p| println!("Iteration {} : {}s", p.index, p.elapsed_micros / 1_000_000))
        .context("benchmark failed")?;

    println!("{report}");

    if let Some(path) = json {
        report.write_json(path).context("failed to export JSON")?;
        println!("Results exported to: {}", path.display());
    }

    println!("FINISHED");
    Ok(())
}
