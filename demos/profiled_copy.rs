//! Profiled copy example - times a byte copy and prints the queue profile

use nong::prelude::*;
use std::sync::Arc;

const SIZE: usize = 1 << 20;

fn main() -> Result<()> {
    env_logger::init();
    println!("=== Profiled Copy Example ===\n");

    let directory = DeviceDirectory::init(Arc::new(HostDriver::with_defaults()))?;
    let device = directory
        .cpu_device()
        .ok_or_else(|| Error::config("no CPU device"))?
        .clone();
    let mut ctx = Context::create(&directory, &device, true)?;
    let queue = ctx.default_queue();

    let pattern: Vec<u8> = (0..SIZE).map(|i| (i % 251) as u8).collect();
    let input = ctx.create_buffer(AccessMode::ReadOnly, SIZE)?;
    let output = ctx.create_buffer(AccessMode::WriteOnly, SIZE)?;

    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/kernels/copy_buffer.cl");
    let kernel = ctx.create_kernel_from_file(path, "copy_buffer", &BuildOptions::default())?;
    ctx.set_arg(kernel, 0, input)?;
    ctx.set_arg(kernel, 1, output)?;
    ctx.set_arg(kernel, 2, SIZE as u32)?;

    ctx.copy_from_host(queue, input, &pattern)?;
    ctx.enqueue_kernel_labeled(queue, kernel, 1024, None, "copy 1MB")?;
    let mut result = vec![0u8; SIZE];
    ctx.copy_to_host(queue, output, &mut result)?;

    println!("Round trip exact: {}\n", result == pattern);
    println!("{}", ctx.events_profile(queue)?);

    #[cfg(feature = "telemetry")]
    {
        use nong::telemetry::{ConsoleExporter, MetricsExporter};
        ConsoleExporter::new(true).export(&ctx.queue_metrics(queue)?)?;
    }

    Ok(())
}
