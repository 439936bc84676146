//! In-process compute device.
//!
//! [`HostDriver`] implements [`DeviceApi`] on the host CPU. Device source is
//! checked by the [`compiler`] front-end, and every entry point it declares
//! is bound to a host body registered in a [`KernelRegistry`]. Each command
//! queue owns one worker thread, so submissions are asynchronous and FIFO
//! exactly as they are on a real device.

pub mod builtins;
pub mod compiler;
pub mod registry;
mod worker;

pub use registry::{GlobalView, GlobalViewMut, HostKernel, KernelFault, KernelRegistry, KernelResult, WorkGroup};

use self::compiler::{CompiledUnit, KernelSignature, TargetInfo};
use self::registry::{BoundArg, MemObject};
use self::worker::{Clock, Command, EventRecord, QueueWorker};
use super::status::{self, Status};
use super::*;
use crate::config::HostConfig;
use crate::error::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Declares one emulated device.
#[derive(Debug, Clone, PartialEq)]
pub struct HostDeviceSpec {
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub device_type: u64,
    pub compute_units: u32,
    pub max_work_group_size: usize,
    pub max_work_item_sizes: Vec<usize>,
    pub local_mem_size: u64,
    pub global_mem_size: u64,
    /// Base address alignment in bytes.
    pub mem_base_addr_align: u32,
    pub double_precision: bool,
    pub int64_atomics: bool,
    pub byte_addressable_store: bool,
    /// Extensions reported on top of the ones implied by the flags above.
    pub extensions: Vec<String>,
}

impl HostDeviceSpec {
    /// The host processor itself.
    pub fn cpu() -> Self {
        Self {
            name: "Host CPU".to_string(),
            vendor: "nong".to_string(),
            version: "OpenCL 1.2 nong-host".to_string(),
            device_type: DEVICE_TYPE_CPU,
            compute_units: num_cpus::get() as u32,
            max_work_group_size: 1024,
            max_work_item_sizes: vec![1024, 1024, 1024],
            local_mem_size: 32 * 1024,
            global_mem_size: 1 << 30,
            mem_base_addr_align: 128,
            double_precision: true,
            int64_atomics: true,
            byte_addressable_store: true,
            extensions: Vec::new(),
        }
    }

    /// A GPU-typed device with typical discrete-card limits.
    pub fn gpu(name: impl Into<String>, vendor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vendor: vendor.into(),
            version: "OpenCL 1.2 nong-host".to_string(),
            device_type: DEVICE_TYPE_GPU,
            compute_units: 16,
            max_work_group_size: 256,
            max_work_item_sizes: vec![256, 256, 64],
            local_mem_size: 48 * 1024,
            global_mem_size: 1 << 30,
            mem_base_addr_align: 256,
            double_precision: false,
            int64_atomics: false,
            byte_addressable_store: true,
            extensions: Vec::new(),
        }
    }

    pub fn with_compute_units(mut self, units: u32) -> Self {
        self.compute_units = units;
        self
    }

    pub fn with_max_work_group_size(mut self, size: usize) -> Self {
        self.max_work_group_size = size;
        self
    }

    pub fn with_max_work_item_sizes(mut self, sizes: Vec<usize>) -> Self {
        self.max_work_item_sizes = sizes;
        self
    }

    pub fn with_local_mem_size(mut self, bytes: u64) -> Self {
        self.local_mem_size = bytes;
        self
    }

    pub fn with_global_mem_size(mut self, bytes: u64) -> Self {
        self.global_mem_size = bytes;
        self
    }

    pub fn with_alignment(mut self, bytes: u32) -> Self {
        self.mem_base_addr_align = bytes;
        self
    }

    pub fn with_double_precision(mut self, enable: bool) -> Self {
        self.double_precision = enable;
        self
    }

    pub fn with_int64_atomics(mut self, enable: bool) -> Self {
        self.int64_atomics = enable;
        self
    }

    pub fn with_extension(mut self, name: impl Into<String>) -> Self {
        self.extensions.push(name.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::config("device name must not be empty"));
        }
        if self.compute_units == 0 {
            return Err(Error::config(format!("device '{}' needs at least 1 compute unit", self.name)));
        }
        if self.max_work_group_size == 0 || self.max_work_item_sizes.is_empty() {
            return Err(Error::config(format!("device '{}' has no work-group capacity", self.name)));
        }
        if self.global_mem_size == 0 {
            return Err(Error::config(format!("device '{}' has no global memory", self.name)));
        }
        if !self.mem_base_addr_align.is_power_of_two() {
            return Err(Error::config(format!(
                "device '{}' alignment {} is not a power of two",
                self.name, self.mem_base_addr_align
            )));
        }
        Ok(())
    }

    fn extension_list(&self) -> Vec<String> {
        let mut list: Vec<String> = [
            "cl_khr_global_int32_base_atomics",
            "cl_khr_global_int32_extended_atomics",
            "cl_khr_local_int32_base_atomics",
            "cl_khr_local_int32_extended_atomics",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if self.int64_atomics {
            list.push("cl_khr_int64_base_atomics".into());
            list.push("cl_khr_int64_extended_atomics".into());
        }
        if self.double_precision {
            list.push("cl_khr_fp64".into());
        }
        if self.byte_addressable_store {
            list.push("cl_khr_byte_addressable_store".into());
        }
        list.extend(self.extensions.iter().cloned());
        list
    }

    fn raw_info(&self) -> RawDeviceInfo {
        RawDeviceInfo {
            name: self.name.clone(),
            version: self.version.clone(),
            vendor: self.vendor.clone(),
            device_type: self.device_type,
            compute_units: self.compute_units,
            max_work_group_size: self.max_work_group_size,
            max_work_item_sizes: self.max_work_item_sizes.clone(),
            local_mem_size: self.local_mem_size,
            global_mem_size: self.global_mem_size,
            mem_base_addr_align: self.mem_base_addr_align,
            extensions: self.extension_list().join(" "),
        }
    }

    fn target(&self) -> TargetInfo {
        TargetInfo {
            extensions: self.extension_list().into_iter().collect(),
            double_precision: self.double_precision,
        }
    }
}

struct QueueEntry {
    context: ContextHandle,
    profiling: bool,
    worker: Arc<QueueWorker>,
}

struct ProgramEntry {
    context: ContextHandle,
    source: String,
    filename: String,
    unit: Option<Arc<CompiledUnit>>,
    log: String,
}

struct KernelEntry {
    context: ContextHandle,
    signature: KernelSignature,
    body: Arc<dyn HostKernel>,
    args: Vec<Option<BoundArg>>,
}

struct MemEntry {
    context: ContextHandle,
    object: Arc<MemObject>,
    size: usize,
}

struct EventEntry {
    record: Arc<EventRecord>,
    profiling: bool,
}

#[derive(Default)]
struct State {
    contexts: HashMap<ContextHandle, DeviceId>,
    queues: HashMap<QueueHandle, QueueEntry>,
    programs: HashMap<ProgramHandle, ProgramEntry>,
    kernels: HashMap<KernelHandle, KernelEntry>,
    mems: HashMap<MemHandle, MemEntry>,
    events: HashMap<EventHandle, EventEntry>,
    /// Live allocation per device index.
    allocated: HashMap<DeviceId, u64>,
}

impl State {
    fn device_of(&self, context: ContextHandle) -> ApiResult<DeviceId> {
        self.contexts.get(&context).copied().ok_or(status::INVALID_CONTEXT)
    }
}

/// Emulated compute platform running kernels on the host.
pub struct HostDriver {
    devices: Vec<HostDeviceSpec>,
    registry: RwLock<KernelRegistry>,
    state: Mutex<State>,
    next_handle: AtomicU64,
    clock: Clock,
    thread_name_prefix: String,
    stack_size: Option<usize>,
}

impl HostDriver {
    pub fn new(config: HostConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    pub fn with_defaults() -> Self {
        Self::from_config(HostConfig::default())
    }

    fn from_config(config: HostConfig) -> Self {
        let registry = if config.builtin_kernels {
            KernelRegistry::with_builtins()
        } else {
            KernelRegistry::new()
        };

        log::debug!(
            "host driver: {} device(s), {} kernel bodies",
            config.devices.len(),
            registry.len()
        );

        Self {
            devices: config.devices,
            registry: RwLock::new(registry),
            state: Mutex::new(State::default()),
            next_handle: AtomicU64::new(1),
            clock: Clock::new(),
            thread_name_prefix: config.thread_name_prefix,
            stack_size: config.stack_size,
        }
    }

    /// Binds `kernel` to every entry point named `name` in programs built
    /// from now on.
    pub fn register_kernel<K>(&self, name: impl Into<String>, kernel: K)
    where
        K: HostKernel + 'static,
    {
        self.registry.write().register(name, kernel);
    }

    pub fn kernel_names(&self) -> Vec<String> {
        self.registry.read().names().into_iter().map(String::from).collect()
    }

    /// Bytes currently allocated on `device`.
    pub fn allocated_bytes(&self, device: DeviceId) -> u64 {
        self.state.lock().allocated.get(&device).copied().unwrap_or(0)
    }

    fn next(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn spec(&self, device: DeviceId) -> ApiResult<&HostDeviceSpec> {
        self.devices.get(device.0 as usize).ok_or(status::INVALID_DEVICE)
    }

    fn queue_worker(&self, queue: QueueHandle) -> ApiResult<Arc<QueueWorker>> {
        let state = self.state.lock();
        let entry = state.queues.get(&queue).ok_or(status::INVALID_COMMAND_QUEUE)?;
        Ok(entry.worker.clone())
    }

    fn new_event(&self, want: bool) -> Option<Arc<EventRecord>> {
        want.then(|| EventRecord::new(&self.clock))
    }

    /// Makes `record` visible to event queries once its command was accepted.
    fn register_event(&self, state: &mut State, record: Option<Arc<EventRecord>>, profiling: bool) -> Option<EventHandle> {
        let record = record?;
        let handle = EventHandle(self.next());
        state.events.insert(handle, EventEntry { record, profiling });
        Some(handle)
    }

    fn kernel_limit(&self, device: DeviceId) -> ApiResult<usize> {
        let spec = self.spec(device)?;
        let first_dim = spec.max_work_item_sizes.first().copied().unwrap_or(1);
        Ok(spec.max_work_group_size.min(first_dim))
    }

    /// Checks an explicit local size or picks one for the launch.
    fn resolve_local_size(global: usize, local: Option<usize>, limit: usize) -> ApiResult<usize> {
        if global == 0 {
            return Err(status::INVALID_GLOBAL_WORK_SIZE);
        }
        match local {
            Some(local) if local == 0 || global % local != 0 || local > limit => {
                Err(status::INVALID_WORK_GROUP_SIZE)
            }
            Some(local) => Ok(local),
            None => Ok((1..=limit.min(global))
                .rev()
                .find(|size| global % size == 0)
                .unwrap_or(1)),
        }
    }
}

impl Default for HostDriver {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for HostDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostDriver")
            .field("devices", &self.devices.len())
            .field("registry", &*self.registry.read())
            .finish()
    }
}

impl DeviceApi for HostDriver {
    fn platform_name(&self) -> &str {
        "nong-host"
    }

    fn device_ids(&self) -> ApiResult<Vec<DeviceId>> {
        if self.devices.is_empty() {
            return Err(status::DEVICE_NOT_FOUND);
        }
        Ok((0..self.devices.len() as u64).map(DeviceId).collect())
    }

    fn device_info(&self, device: DeviceId) -> ApiResult<RawDeviceInfo> {
        Ok(self.spec(device)?.raw_info())
    }

    fn create_context(&self, device: DeviceId) -> ApiResult<ContextHandle> {
        self.spec(device)?;
        let handle = ContextHandle(self.next());
        self.state.lock().contexts.insert(handle, device);
        log::debug!("{}: created {} on {}", self.platform_name(), handle, device);
        Ok(handle)
    }

    fn release_context(&self, context: ContextHandle) -> ApiResult<()> {
        self.state
            .lock()
            .contexts
            .remove(&context)
            .map(|_| ())
            .ok_or(status::INVALID_CONTEXT)
    }

    fn create_command_queue(&self, context: ContextHandle, device: DeviceId, profiling: bool) -> ApiResult<QueueHandle> {
        let mut state = self.state.lock();
        if state.device_of(context)? != device {
            return Err(status::INVALID_DEVICE);
        }

        let handle = QueueHandle(self.next());
        let name = format!("{}-{}", self.thread_name_prefix, handle.0);
        let worker = QueueWorker::spawn(name, self.stack_size, self.clock).map_err(|e| {
            log::error!("could not spawn queue worker: {}", e);
            status::OUT_OF_HOST_MEMORY
        })?;

        state.queues.insert(
            handle,
            QueueEntry {
                context,
                profiling,
                worker: Arc::new(worker),
            },
        );
        Ok(handle)
    }

    fn release_command_queue(&self, queue: QueueHandle) -> ApiResult<()> {
        let entry = self
            .state
            .lock()
            .queues
            .remove(&queue)
            .ok_or(status::INVALID_COMMAND_QUEUE)?;
        // Joining outside the lock: the worker drains pending commands first.
        drop(entry);
        Ok(())
    }

    fn create_program_with_source(
        &self,
        context: ContextHandle,
        source: &str,
        filename: Option<&str>,
    ) -> ApiResult<ProgramHandle> {
        let mut state = self.state.lock();
        state.device_of(context)?;
        if source.trim().is_empty() {
            return Err(status::INVALID_VALUE);
        }

        let handle = ProgramHandle(self.next());
        state.programs.insert(
            handle,
            ProgramEntry {
                context,
                source: source.to_string(),
                filename: filename.unwrap_or("<source>").to_string(),
                unit: None,
                log: String::new(),
            },
        );
        Ok(handle)
    }

    fn build_program(&self, program: ProgramHandle, device: DeviceId, options: &str) -> ApiResult<()> {
        let target = self.spec(device)?.target();
        let mut state = self.state.lock();
        let context = state.programs.get(&program).ok_or(status::INVALID_PROGRAM)?.context;
        if state.device_of(context)? != device {
            return Err(status::INVALID_DEVICE);
        }

        let entry = state.programs.get_mut(&program).ok_or(status::INVALID_PROGRAM)?;
        match compiler::compile(&entry.source, &entry.filename, options, &target) {
            Ok((unit, log)) => {
                entry.unit = Some(Arc::new(unit));
                entry.log = log;
                Ok(())
            }
            Err((code, log)) => {
                entry.unit = None;
                entry.log = log;
                Err(code)
            }
        }
    }

    fn program_build_log(&self, program: ProgramHandle, _device: DeviceId) -> ApiResult<String> {
        let state = self.state.lock();
        let entry = state.programs.get(&program).ok_or(status::INVALID_PROGRAM)?;
        Ok(entry.log.clone())
    }

    fn release_program(&self, program: ProgramHandle) -> ApiResult<()> {
        self.state
            .lock()
            .programs
            .remove(&program)
            .map(|_| ())
            .ok_or(status::INVALID_PROGRAM)
    }

    fn create_kernel(&self, program: ProgramHandle, name: &str) -> ApiResult<KernelHandle> {
        let mut state = self.state.lock();
        let entry = state.programs.get(&program).ok_or(status::INVALID_PROGRAM)?;
        let unit = entry.unit.as_ref().ok_or(status::INVALID_PROGRAM_EXECUTABLE)?;
        let signature = unit.kernel(name).ok_or(status::INVALID_KERNEL_NAME)?.clone();
        let body = self.registry.read().get(name).ok_or_else(|| {
            log::warn!("kernel '{}' is declared but has no host body", name);
            status::INVALID_KERNEL_NAME
        })?;

        let handle = KernelHandle(self.next());
        let context = entry.context;
        let args = vec![None; signature.params.len()];
        state.kernels.insert(
            handle,
            KernelEntry {
                context,
                signature,
                body,
                args,
            },
        );
        Ok(handle)
    }

    fn kernel_work_group_size(&self, kernel: KernelHandle, device: DeviceId) -> ApiResult<usize> {
        let state = self.state.lock();
        let entry = state.kernels.get(&kernel).ok_or(status::INVALID_KERNEL)?;
        if state.device_of(entry.context)? != device {
            return Err(status::INVALID_DEVICE);
        }
        self.kernel_limit(device)
    }

    fn kernel_num_args(&self, kernel: KernelHandle) -> ApiResult<u32> {
        let state = self.state.lock();
        let entry = state.kernels.get(&kernel).ok_or(status::INVALID_KERNEL)?;
        Ok(entry.signature.params.len() as u32)
    }

    fn kernel_arg_info(&self, kernel: KernelHandle, index: u32) -> ApiResult<ArgInfo> {
        let state = self.state.lock();
        let entry = state.kernels.get(&kernel).ok_or(status::INVALID_KERNEL)?;
        entry
            .signature
            .params
            .get(index as usize)
            .cloned()
            .ok_or(status::INVALID_ARG_INDEX)
    }

    fn set_kernel_arg(&self, kernel: KernelHandle, index: u32, value: &ArgValue) -> ApiResult<()> {
        let mut state = self.state.lock();
        let entry = state.kernels.get(&kernel).ok_or(status::INVALID_KERNEL)?;
        let param = entry
            .signature
            .params
            .get(index as usize)
            .ok_or(status::INVALID_ARG_INDEX)?;

        let bound = match value {
            ArgValue::Mem(mem) => {
                let mem = state.mems.get(mem).ok_or(status::INVALID_MEM_OBJECT)?;
                if mem.context != entry.context {
                    return Err(status::INVALID_MEM_OBJECT);
                }
                if !param.is_pointer || param.address == AddressQualifier::Local {
                    return Err(status::INVALID_ARG_VALUE);
                }
                BoundArg::Mem(mem.object.clone())
            }
            ArgValue::Scalar(bytes) => {
                if param.is_pointer {
                    return Err(status::INVALID_ARG_VALUE);
                }
                if matches!(param.size, Some(size) if size != bytes.len()) {
                    return Err(status::INVALID_ARG_SIZE);
                }
                BoundArg::Scalar(bytes.clone())
            }
            ArgValue::Local(size) => {
                if param.address != AddressQualifier::Local {
                    return Err(status::INVALID_ARG_VALUE);
                }
                if *size == 0 {
                    return Err(status::INVALID_ARG_SIZE);
                }
                BoundArg::Local(*size)
            }
        };

        if let Some(entry) = state.kernels.get_mut(&kernel) {
            entry.args[index as usize] = Some(bound);
        }
        Ok(())
    }

    fn release_kernel(&self, kernel: KernelHandle) -> ApiResult<()> {
        self.state
            .lock()
            .kernels
            .remove(&kernel)
            .map(|_| ())
            .ok_or(status::INVALID_KERNEL)
    }

    fn create_buffer(&self, context: ContextHandle, flags: MemFlags, host: &[u8]) -> ApiResult<MemHandle> {
        let mut state = self.state.lock();
        let device = state.device_of(context)?;
        let limit = self.spec(device)?.global_mem_size;
        let size = host.len() as u64;

        if size == 0 || size > limit {
            return Err(status::INVALID_BUFFER_SIZE);
        }
        let in_use = state.allocated.get(&device).copied().unwrap_or(0);
        if in_use + size > limit {
            return Err(status::MEM_OBJECT_ALLOCATION_FAILURE);
        }

        let handle = MemHandle(self.next());
        state.allocated.insert(device, in_use + size);
        state.mems.insert(
            handle,
            MemEntry {
                context,
                object: Arc::new(MemObject::new(flags, host)),
                size: host.len(),
            },
        );
        Ok(handle)
    }

    fn release_mem_object(&self, mem: MemHandle) -> ApiResult<()> {
        let mut state = self.state.lock();
        let entry = state.mems.remove(&mem).ok_or(status::INVALID_MEM_OBJECT)?;
        if let Some(device) = state.contexts.get(&entry.context).copied() {
            if let Some(in_use) = state.allocated.get_mut(&device) {
                *in_use = in_use.saturating_sub(entry.size as u64);
            }
        }
        Ok(())
    }

    fn enqueue_nd_range_kernel(
        &self,
        queue: QueueHandle,
        kernel: KernelHandle,
        global_size: usize,
        local_size: Option<usize>,
        want_event: bool,
    ) -> ApiResult<Option<EventHandle>> {
        let mut state = self.state.lock();
        let q = state.queues.get(&queue).ok_or(status::INVALID_COMMAND_QUEUE)?;
        let (q_context, profiling, worker) = (q.context, q.profiling, q.worker.clone());
        let k = state.kernels.get(&kernel).ok_or(status::INVALID_KERNEL)?;
        if k.context != q_context {
            return Err(status::INVALID_CONTEXT);
        }

        let device = state.device_of(q_context)?;
        let local_size = Self::resolve_local_size(global_size, local_size, self.kernel_limit(device)?)?;

        let args = k
            .args
            .iter()
            .cloned()
            .collect::<Option<Vec<BoundArg>>>()
            .ok_or(status::INVALID_KERNEL_ARGS)?;

        let local_bytes: usize = args
            .iter()
            .map(|arg| match arg {
                BoundArg::Local(size) => *size,
                _ => 0,
            })
            .sum();
        if local_bytes as u64 > self.spec(device)?.local_mem_size {
            return Err(status::OUT_OF_RESOURCES);
        }

        let name = k.signature.name.clone();
        let body = k.body.clone();
        let event = self.new_event(want_event);

        worker.submit(Command::Launch {
            name,
            kernel: body,
            args,
            global_size,
            local_size,
            event: event.clone(),
        })?;
        Ok(self.register_event(&mut state, event, profiling))
    }

    fn enqueue_write_buffer(
        &self,
        queue: QueueHandle,
        mem: MemHandle,
        blocking: bool,
        offset: usize,
        data: &[u8],
        want_event: bool,
    ) -> ApiResult<Option<EventHandle>> {
        let mut state = self.state.lock();
        let q = state.queues.get(&queue).ok_or(status::INVALID_COMMAND_QUEUE)?;
        let (q_context, profiling, worker) = (q.context, q.profiling, q.worker.clone());
        let m = state.mems.get(&mem).ok_or(status::INVALID_MEM_OBJECT)?;
        if m.context != q_context {
            return Err(status::INVALID_CONTEXT);
        }
        if offset.checked_add(data.len()).map_or(true, |end| end > m.size) {
            return Err(status::INVALID_VALUE);
        }

        let object = m.object.clone();
        let event = self.new_event(want_event);

        if blocking {
            drop(state);
            worker.write_blocking(object, offset, data.to_vec(), event.clone())?;
            state = self.state.lock();
        } else {
            worker.submit(Command::Write {
                mem: object,
                offset,
                data: data.to_vec(),
                event: event.clone(),
                done: None,
            })?;
        }
        Ok(self.register_event(&mut state, event, profiling))
    }

    fn enqueue_read_buffer(
        &self,
        queue: QueueHandle,
        mem: MemHandle,
        offset: usize,
        dst: &mut [u8],
        want_event: bool,
    ) -> ApiResult<Option<EventHandle>> {
        let state = self.state.lock();
        let q = state.queues.get(&queue).ok_or(status::INVALID_COMMAND_QUEUE)?;
        let (q_context, profiling, worker) = (q.context, q.profiling, q.worker.clone());
        let m = state.mems.get(&mem).ok_or(status::INVALID_MEM_OBJECT)?;
        if m.context != q_context {
            return Err(status::INVALID_CONTEXT);
        }
        if offset.checked_add(dst.len()).map_or(true, |end| end > m.size) {
            return Err(status::INVALID_VALUE);
        }

        let object = m.object.clone();
        let event = self.new_event(want_event);
        drop(state);

        worker.read(object, offset, dst, event.clone())?;
        Ok(self.register_event(&mut self.state.lock(), event, profiling))
    }

    fn finish(&self, queue: QueueHandle) -> ApiResult<()> {
        self.queue_worker(queue)?.finish()
    }

    fn event_profiling_info(&self, event: EventHandle) -> ApiResult<ProfilingInfo> {
        let state = self.state.lock();
        let entry = state.events.get(&event).ok_or(status::INVALID_EVENT)?;
        if !entry.profiling {
            return Err(status::PROFILING_INFO_NOT_AVAILABLE);
        }
        entry.record.profiling_info()
    }

    fn release_event(&self, event: EventHandle) -> ApiResult<()> {
        self.state
            .lock()
            .events
            .remove(&event)
            .map(|_| ())
            .ok_or(status::INVALID_EVENT)
    }
}
