//! Device directory: enumerates the devices of a [`DeviceApi`] once and
//! hands out immutable descriptors.

use crate::driver::{DeviceApi, DeviceId, RawDeviceInfo, DEVICE_TYPE_CPU, DEVICE_TYPE_GPU};
use crate::error::{self, ApiCall, Result};
use crate::driver::status;
use crate::util::format_bytes;
use std::fmt;
use std::sync::Arc;

/// Zero-copy pointer alignment for Intel integrated GPUs.
pub const INTEL_ZERO_COPY_ALIGNMENT: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Cpu,
    Gpu,
    Unknown,
}

impl DeviceType {
    fn from_bits(bits: u64) -> Self {
        if bits == DEVICE_TYPE_CPU {
            DeviceType::Cpu
        } else if bits == DEVICE_TYPE_GPU {
            DeviceType::Gpu
        } else {
            DeviceType::Unknown
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Cpu => write!(f, "CPU"),
            DeviceType::Gpu => write!(f, "GPU"),
            DeviceType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vendor {
    Intel,
    Amd,
    Nvidia,
    Unknown,
}

impl Vendor {
    /// Classifies a driver vendor string, ignoring case and decorations
    /// such as "Intel(R) Corporation".
    pub fn parse(vendor: &str) -> Self {
        let lower = vendor.to_ascii_lowercase();
        if lower.contains("intel") {
            Vendor::Intel
        } else if lower.contains("advanced micro devices") || lower.split_whitespace().any(|w| w == "amd") {
            Vendor::Amd
        } else if lower.contains("nvidia") {
            Vendor::Nvidia
        } else {
            Vendor::Unknown
        }
    }
}

/// Optional features derived from the extension string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub int32_atomics: bool,
    pub int64_atomics: bool,
    pub double_precision: bool,
    pub byte_addressable_store: bool,
}

impl Capabilities {
    pub fn from_extensions(extensions: &[String]) -> Self {
        let has = |name: &str| extensions.iter().any(|e| e == name);
        Self {
            int32_atomics: has("cl_khr_global_int32_base_atomics"),
            int64_atomics: has("cl_khr_int64_base_atomics"),
            double_precision: has("cl_khr_fp64"),
            byte_addressable_store: has("cl_khr_byte_addressable_store"),
        }
    }
}

/// Static description of one compute device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    id: DeviceId,
    name: String,
    version: String,
    vendor_name: String,
    vendor: Vendor,
    device_type: DeviceType,
    compute_units: u32,
    max_work_group_size: usize,
    local_mem_size: u64,
    global_mem_size: u64,
    ptr_alignment: u32,
    capabilities: Capabilities,
    extensions: Vec<String>,
}

impl DeviceDescriptor {
    pub fn from_raw(id: DeviceId, raw: RawDeviceInfo) -> Self {
        let extensions: Vec<String> = raw.extensions.split_whitespace().map(String::from).collect();
        let first_dim = raw.max_work_item_sizes.first().copied().unwrap_or(raw.max_work_group_size);

        let mut descriptor = Self {
            id,
            vendor: Vendor::parse(&raw.vendor),
            device_type: DeviceType::from_bits(raw.device_type),
            capabilities: Capabilities::from_extensions(&extensions),
            max_work_group_size: raw.max_work_group_size.min(first_dim),
            name: raw.name,
            version: raw.version,
            vendor_name: raw.vendor,
            compute_units: raw.compute_units,
            local_mem_size: raw.local_mem_size,
            global_mem_size: raw.global_mem_size,
            ptr_alignment: raw.mem_base_addr_align,
            extensions,
        };
        descriptor.apply_vendor_optimizations();
        descriptor
    }

    fn apply_vendor_optimizations(&mut self) {
        if self.vendor == Vendor::Intel && self.is_gpu() {
            self.ptr_alignment = self.ptr_alignment.max(INTEL_ZERO_COPY_ALIGNMENT);
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn vendor_name(&self) -> &str {
        &self.vendor_name
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn is_cpu(&self) -> bool {
        self.device_type == DeviceType::Cpu
    }

    pub fn is_gpu(&self) -> bool {
        self.device_type == DeviceType::Gpu
    }

    pub fn compute_units(&self) -> u32 {
        self.compute_units
    }

    /// Largest work-group, already clamped to the first work-item dimension.
    pub fn max_work_group_size(&self) -> usize {
        self.max_work_group_size
    }

    pub fn local_mem_size(&self) -> u64 {
        self.local_mem_size
    }

    pub fn global_mem_size(&self) -> u64 {
        self.global_mem_size
    }

    /// Preferred host pointer alignment for buffers shared with the device.
    pub fn ptr_alignment(&self) -> u32 {
        self.ptr_alignment
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|e| e == name)
    }

    pub fn describe(&self, detail: bool) -> String {
        let mut out = format!("Device {} ({})", self.name, self.device_type);
        if detail {
            out.push_str(&format!(
                "\n  Vendor: {}\n  NumComputeUnits: {}\n  MaxWorkGroupSize: {}\n  MaxLocalMem: {}\n  MaxGlobalMem: {}\n  PtrAlignment: {}",
                self.vendor_name,
                self.compute_units,
                self.max_work_group_size,
                format_bytes(self.local_mem_size),
                format_bytes(self.global_mem_size),
                self.ptr_alignment,
            ));
        }
        out
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe(false))
    }
}

/// Snapshot of every device a driver exposes.
#[derive(Clone)]
pub struct DeviceDirectory {
    api: Arc<dyn DeviceApi>,
    devices: Vec<Arc<DeviceDescriptor>>,
    default_device: Option<usize>,
    cpu_device: Option<usize>,
    gpu_device: Option<usize>,
}

impl DeviceDirectory {
    /// Enumerates the devices of `api`. A driver without devices yields an
    /// empty directory.
    pub fn init(api: Arc<dyn DeviceApi>) -> Result<Self> {
        let ids = match api.device_ids() {
            Ok(ids) => ids,
            Err(code) if code == status::DEVICE_NOT_FOUND => Vec::new(),
            Err(code) => return Err(error::translate(ApiCall::DeviceQuery, code, "enumerate devices")),
        };

        let mut devices = Vec::with_capacity(ids.len());
        for id in ids {
            let raw = api
                .device_info(id)
                .map_err(|code| error::translate(ApiCall::DeviceQuery, code, format!("query {}", id)))?;
            devices.push(Arc::new(DeviceDescriptor::from_raw(id, raw)));
        }

        let cpu_device = devices.iter().position(|d| d.is_cpu());
        let gpu_device = devices.iter().position(|d| d.is_gpu());
        let default_device = gpu_device.or(cpu_device).or((!devices.is_empty()).then_some(0));

        log::debug!(
            "{}: found {} device(s)",
            api.platform_name(),
            devices.len()
        );
        for device in &devices {
            log::debug!("  {}", device);
        }

        Ok(Self {
            api,
            devices,
            default_device,
            cpu_device,
            gpu_device,
        })
    }

    pub fn api(&self) -> &Arc<dyn DeviceApi> {
        &self.api
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn device(&self, index: usize) -> Option<&Arc<DeviceDescriptor>> {
        self.devices.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<DeviceDescriptor>> {
        self.devices.iter()
    }

    /// First GPU, otherwise first CPU, otherwise the first device.
    pub fn default_device(&self) -> Option<&Arc<DeviceDescriptor>> {
        self.default_device.map(|i| &self.devices[i])
    }

    pub fn cpu_device(&self) -> Option<&Arc<DeviceDescriptor>> {
        self.cpu_device.map(|i| &self.devices[i])
    }

    pub fn gpu_device(&self) -> Option<&Arc<DeviceDescriptor>> {
        self.gpu_device.map(|i| &self.devices[i])
    }

    pub(crate) fn contains(&self, device: &DeviceDescriptor) -> bool {
        self.devices.iter().any(|d| std::ptr::eq(d.as_ref(), device))
    }
}

impl fmt::Debug for DeviceDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceDirectory")
            .field("platform", &self.api.platform_name())
            .field("devices", &self.devices)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;
    use crate::driver::host::{HostDeviceSpec, HostDriver};

    fn directory(specs: Vec<HostDeviceSpec>) -> DeviceDirectory {
        let mut builder = HostConfig::builder().no_devices();
        for spec in specs {
            builder = builder.device(spec);
        }
        let driver = HostDriver::new(builder.build().unwrap()).unwrap();
        DeviceDirectory::init(Arc::new(driver)).unwrap()
    }

    #[test]
    fn test_vendor_parsing() {
        assert_eq!(Vendor::parse("Intel(R) Corporation"), Vendor::Intel);
        assert_eq!(Vendor::parse("INTEL"), Vendor::Intel);
        assert_eq!(Vendor::parse("Advanced Micro Devices, Inc."), Vendor::Amd);
        assert_eq!(Vendor::parse("AMD"), Vendor::Amd);
        assert_eq!(Vendor::parse("NVIDIA Corporation"), Vendor::Nvidia);
        assert_eq!(Vendor::parse("Apple"), Vendor::Unknown);
    }

    #[test]
    fn test_selectors() {
        let dir = directory(vec![
            HostDeviceSpec::cpu(),
            HostDeviceSpec::gpu("Card A", "NVIDIA Corporation"),
            HostDeviceSpec::gpu("Card B", "AMD"),
        ]);
        assert_eq!(dir.len(), 3);
        assert_eq!(dir.default_device().unwrap().name(), "Card A");
        assert_eq!(dir.cpu_device().unwrap().name(), "Host CPU");
        assert_eq!(dir.gpu_device().unwrap().name(), "Card A");
        assert_eq!(dir.device(2).unwrap().vendor(), Vendor::Amd);
    }

    #[test]
    fn test_default_falls_back_to_cpu() {
        let dir = directory(vec![HostDeviceSpec::cpu()]);
        assert!(dir.gpu_device().is_none());
        assert_eq!(dir.default_device().unwrap().device_type(), DeviceType::Cpu);
    }

    #[test]
    fn test_default_falls_back_to_first_device() {
        let mut accel = HostDeviceSpec::gpu("Accel", "Xilinx");
        accel.device_type = crate::driver::DEVICE_TYPE_ACCELERATOR;
        let dir = directory(vec![accel]);
        assert!(dir.cpu_device().is_none());
        assert!(dir.gpu_device().is_none());
        let default = dir.default_device().unwrap();
        assert_eq!(default.name(), "Accel");
        assert_eq!(default.device_type(), DeviceType::Unknown);
    }

    #[test]
    fn test_empty_directory() {
        let dir = directory(Vec::new());
        assert!(dir.is_empty());
        assert!(dir.default_device().is_none());
    }

    #[test]
    fn test_intel_gpu_alignment() {
        let dir = directory(vec![
            HostDeviceSpec::gpu("HD Graphics", "Intel(R) Corporation").with_alignment(128),
            HostDeviceSpec::cpu().with_alignment(128),
        ]);
        assert_eq!(dir.device(0).unwrap().ptr_alignment(), INTEL_ZERO_COPY_ALIGNMENT);
        assert_eq!(dir.device(1).unwrap().ptr_alignment(), 128);
    }

    #[test]
    fn test_work_group_clamped_to_first_dimension() {
        let spec = HostDeviceSpec::gpu("Narrow", "AMD")
            .with_max_work_group_size(1024)
            .with_max_work_item_sizes(vec![256, 1024, 1024]);
        let dir = directory(vec![spec]);
        assert_eq!(dir.device(0).unwrap().max_work_group_size(), 256);
    }

    #[test]
    fn test_capabilities() {
        let dir = directory(vec![
            HostDeviceSpec::cpu(),
            HostDeviceSpec::gpu("Lite", "NVIDIA Corporation"),
        ]);
        let cpu = dir.device(0).unwrap().capabilities();
        assert!(cpu.double_precision && cpu.int64_atomics && cpu.int32_atomics);
        let gpu = dir.device(1).unwrap().capabilities();
        assert!(!gpu.double_precision);
        assert!(gpu.byte_addressable_store);
    }

    #[test]
    fn test_describe() {
        let dir = directory(vec![HostDeviceSpec::cpu()]);
        let device = dir.default_device().unwrap();
        assert_eq!(device.describe(false), "Device Host CPU (CPU)");
        let detail = device.describe(true);
        assert!(detail.contains("MaxLocalMem: 32KB"));
        assert!(detail.contains("MaxGlobalMem: 1GB"));
    }
}
