//! Device listing example - prints every device the host driver exposes

use nong::prelude::*;
use std::sync::Arc;

fn main() -> Result<()> {
    env_logger::init();

    let config = HostConfig::builder()
        .device(HostDeviceSpec::cpu())
        .device(HostDeviceSpec::gpu("Iris Xe Graphics", "Intel(R) Corporation"))
        .device(HostDeviceSpec::gpu("Radeon RX 7600", "Advanced Micro Devices, Inc.").with_double_precision(true))
        .build()?;
    let directory = DeviceDirectory::init(Arc::new(HostDriver::new(config)?))?;

    println!("=== {} device(s) ===\n", directory.len());
    for device in directory.iter() {
        println!("{}", device.describe(true));

        let caps = device.capabilities();
        println!("  Int64Atomics: {}", caps.int64_atomics);
        println!("  DoublePrecision: {}", caps.double_precision);
        println!("  ByteAddressableStore: {}", caps.byte_addressable_store);
        println!();
    }

    if let Some(device) = directory.default_device() {
        println!("Default device: {}", device);
    }
    if let Some(device) = directory.cpu_device() {
        println!("First CPU: {}", device);
    }
    if let Some(device) = directory.gpu_device() {
        println!("First GPU: {}", device);
    }
    Ok(())
}
