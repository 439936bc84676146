//! Array sum example - reduces 64 floats with the bundled `add_numbers` kernel

use nong::prelude::*;
use std::sync::Arc;

fn main() -> Result<()> {
    env_logger::init();
    println!("=== Array Sum Example ===\n");

    let directory = DeviceDirectory::init(Arc::new(HostDriver::with_defaults()))?;
    let device = directory
        .default_device()
        .ok_or_else(|| Error::config("no device found"))?
        .clone();
    println!("{}\n", device.describe(true));

    let mut ctx = Context::create(&directory, &device, false)?;
    let queue = ctx.default_queue();

    let data: Vec<f32> = (0..64).map(|i| i as f32).collect();
    let global_size = data.len() / 8;
    let local_size = 4;

    let input = ctx.create_buffer_from_slice(AccessMode::ReadOnly, &data)?;
    let output = ctx.create_buffer(AccessMode::WriteOnly, global_size / local_size * 4)?;

    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/kernels/add_numbers.cl");
    let kernel = ctx.create_kernel_from_file(path, "add_numbers", &BuildOptions::default())?;
    println!("{}", ctx.kernel(kernel)?.describe(true));

    ctx.set_arg(kernel, 0, input)?;
    ctx.set_arg(kernel, 1, KernelArg::local::<f32>(local_size))?;
    ctx.set_arg(kernel, 2, output)?;
    ctx.enqueue_kernel(queue, kernel, global_size, Some(local_size))?;

    let sums = ctx.read_buffer_as::<f32>(queue, output)?;
    let total: f32 = sums.iter().sum();
    let expected: f32 = data.iter().sum();

    println!("\nGroup sums: {:?}", sums);
    println!("Total: {} (expected {})", total, expected);
    println!("Correct: {}", total == expected);
    Ok(())
}
