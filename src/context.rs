//! The root resource owner.
//!
//! A [`Context`] holds one device connection and every program, kernel,
//! queue and buffer created through it. Resources are addressed by typed ids
//! ([`ProgramId`], [`KernelId`], [`QueueId`], [`BufferId`]) that are only
//! valid for the context that issued them. Nothing is released individually:
//! dropping the context releases programs, kernels, queues and buffers, in
//! that order, and then the connection itself.
//!
//! ```
//! use nong::prelude::*;
//! use std::sync::Arc;
//!
//! let directory = DeviceDirectory::init(Arc::new(HostDriver::with_defaults())).unwrap();
//! let device = directory.cpu_device().unwrap().clone();
//! let mut ctx = Context::create(&directory, &device, false).unwrap();
//!
//! let source = "__kernel void copy_buffer(__global const uchar* input,
//!                                         __global uchar* output,
//!                                         const uint length) {}";
//! let kernel = ctx
//!     .create_kernel_from_source(source, "copy_buffer", &BuildOptions::default())
//!     .unwrap();
//!
//! let input = ctx.create_buffer_from_mem(AccessMode::ReadOnly, b"hello").unwrap();
//! let output = ctx.create_buffer_from_mem(AccessMode::WriteOnly, &[0u8; 5]).unwrap();
//! ctx.set_arg(kernel, 0, input).unwrap();
//! ctx.set_arg(kernel, 1, output).unwrap();
//! ctx.set_arg(kernel, 2, 5u32).unwrap();
//!
//! let queue = ctx.default_queue();
//! ctx.enqueue_kernel(queue, kernel, 5, None).unwrap();
//! assert_eq!(ctx.read_buffer(queue, output).unwrap(), b"hello");
//! ```

use crate::arena::{next_owner, Arena, ArenaId, BufferId, KernelId, ProgramId, QueueId};
use crate::buffer::{AccessMode, Buffer};
use crate::config::ContextConfig;
use crate::device::{DeviceDescriptor, DeviceDirectory};
use crate::driver::{status, ArgInfo, ArgValue, ContextHandle, DeviceApi, KernelHandle, Status};
use crate::error::{translate, ApiCall, Error, Result};
use crate::kernel::{Kernel, KernelArg};
use crate::program::{BuildOptions, Program, ProgramKey};
use crate::queue::{self, CommandQueue, ProfileReport};
use crate::telemetry::MetricsSnapshot;
use crate::util::{format_bytes, AlignedBytes, ScopedTimer};
use bytemuck::Pod;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub struct Context {
    api: Arc<dyn DeviceApi>,
    device: Arc<DeviceDescriptor>,
    handle: ContextHandle,
    config: ContextConfig,
    programs: Arena<ProgramId, Program>,
    program_cache: HashMap<ProgramKey, ProgramId>,
    kernels: Arena<KernelId, Kernel>,
    queues: Arena<QueueId, CommandQueue>,
    buffers: Arena<BufferId, Buffer>,
    default_queue: QueueId,
}

impl Context {
    /// Connects to `device` and creates the default queue.
    pub fn create(directory: &DeviceDirectory, device: &Arc<DeviceDescriptor>, profiling: bool) -> Result<Self> {
        let config = ContextConfig {
            enable_profiling: profiling,
            ..ContextConfig::default()
        };
        Self::with_config(directory, device, config)
    }

    pub fn with_config(
        directory: &DeviceDirectory,
        device: &Arc<DeviceDescriptor>,
        config: ContextConfig,
    ) -> Result<Self> {
        config.validate()?;
        if !directory.contains(device) {
            return Err(Error::invalid_handle(format!(
                "device '{}' is not part of this directory",
                device.name()
            )));
        }

        let api = directory.api().clone();
        let handle = api
            .create_context(device.id())
            .map_err(|code| translate(ApiCall::CreateContext, code, format!("connect to '{}'", device.name())))?;

        let owner = next_owner();
        let mut context = Self {
            api,
            device: device.clone(),
            handle,
            config,
            programs: Arena::new(owner),
            program_cache: HashMap::new(),
            kernels: Arena::new(owner),
            queues: Arena::new(owner),
            buffers: Arena::new(owner),
            default_queue: QueueId::from_parts(owner, 0),
        };

        // On failure the partially built context is dropped and releases the connection.
        context.default_queue = context.create_command_queue()?;

        log::debug!(
            "context on '{}' ({}), profiling {}",
            context.device.name(),
            context.device.device_type(),
            if context.config.enable_profiling { "on" } else { "off" }
        );
        Ok(context)
    }

    pub fn device(&self) -> &Arc<DeviceDescriptor> {
        &self.device
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn is_profiling(&self) -> bool {
        self.config.enable_profiling
    }

    /// Queue created together with the context.
    pub fn default_queue(&self) -> QueueId {
        self.default_queue
    }

    /// Creates another queue sharing the context's profiling setting.
    pub fn create_command_queue(&mut self) -> Result<QueueId> {
        let profiling = self.config.enable_profiling;
        let handle = self
            .api
            .create_command_queue(self.handle, self.device.id(), profiling)
            .map_err(|code| translate(ApiCall::CreateCommandQueue, code, format!("queue on '{}'", self.device.name())))?;

        let id = self.queues.insert(CommandQueue::new(handle, profiling));
        log::debug!("created {}", id);
        Ok(id)
    }

    // ---- programs and kernels ----

    /// Builds the program at `path`, or returns the cached one.
    ///
    /// The cache is keyed by path only: a later request with different
    /// options returns the first build and logs a warning. A failed build
    /// leaves no cache entry.
    pub fn create_program_from_file(&mut self, path: impl AsRef<Path>, options: &BuildOptions) -> Result<ProgramId> {
        let path = path.as_ref();
        let key = ProgramKey::from_path(path);
        if let Some(id) = self.cached_program(&key, options)? {
            return Ok(id);
        }

        let source = std::fs::read_to_string(path).map_err(|source| {
            log::error!("could not read {}: {}", path.display(), source);
            Error::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;
        self.build_program(key, &source, Some(path), None, options)
    }

    /// [`create_program_from_file`](Self::create_program_from_file) with the
    /// context's default build options.
    pub fn create_program(&mut self, path: impl AsRef<Path>) -> Result<ProgramId> {
        let options = self.config.build_options.clone();
        self.create_program_from_file(path, &options)
    }

    /// Builds in-memory source, cached by a digest of the text. `filename`
    /// only names the source in diagnostics.
    pub fn create_program_from_source(
        &mut self,
        source: &str,
        options: &BuildOptions,
        filename: Option<&str>,
    ) -> Result<ProgramId> {
        let key = ProgramKey::from_source(source);
        if let Some(id) = self.cached_program(&key, options)? {
            return Ok(id);
        }
        self.build_program(key, source, None, filename, options)
    }

    fn cached_program(&self, key: &ProgramKey, options: &BuildOptions) -> Result<Option<ProgramId>> {
        let Some(&id) = self.program_cache.get(key) else {
            return Ok(None);
        };

        let program = self.programs.get(id)?;
        if program.options() != options {
            log::warn!(
                "{} was built with '{}', ignoring '{}'",
                key,
                program.options(),
                options
            );
        }
        log::debug!("program cache hit for {}", key);
        Ok(Some(id))
    }

    fn build_program(
        &mut self,
        key: ProgramKey,
        source: &str,
        path: Option<&Path>,
        filename: Option<&str>,
        options: &BuildOptions,
    ) -> Result<ProgramId> {
        let display_name = path.map(|p| p.display().to_string());
        let filename = display_name.as_deref().or(filename);
        let device = self.device.id();

        let handle = self
            .api
            .create_program_with_source(self.handle, source, filename)
            .map_err(|code| compile_error(code, path, format!("could not load source of {}", key)))?;

        let _timer = ScopedTimer::new(format!("build {}", key));
        if let Err(code) = self.api.build_program(handle, device, &options.to_options_string()) {
            let build_log = self.api.program_build_log(handle, device).unwrap_or_default();
            if let Err(code) = self.api.release_program(handle) {
                log::warn!("could not release failed program {}: {}", key, code);
            }
            return Err(compile_error(code, path, build_log));
        }

        let build_log = self.api.program_build_log(handle, device).unwrap_or_default();
        if !build_log.trim().is_empty() {
            log::warn!("build log for {}:\n{}", key, build_log);
        }

        let id = self
            .programs
            .insert(Program::new(handle, key.clone(), options.clone(), build_log));
        self.program_cache.insert(key, id);
        Ok(id)
    }

    /// Resolves entry point `name` of `program`.
    pub fn create_kernel(&mut self, program: ProgramId, name: &str) -> Result<KernelId> {
        let program_handle = self.programs.get(program)?.handle();
        let handle = self
            .api
            .create_kernel(program_handle, name)
            .map_err(|code| translate(ApiCall::CreateKernel, code, name))?;

        let (max_work_group_size, num_args) = match self.query_kernel(handle) {
            Ok(info) => info,
            Err(code) => {
                if let Err(release) = self.api.release_kernel(handle) {
                    log::warn!("could not release kernel '{}': {}", name, release);
                }
                return Err(translate(ApiCall::KernelInfo, code, name));
            }
        };

        // Parameter info is optional; drivers may not keep it.
        let arg_info: Option<Vec<ArgInfo>> = (0..num_args)
            .map(|index| self.api.kernel_arg_info(handle, index).ok())
            .collect();

        let kernel = Kernel::new(handle, name.to_string(), program, max_work_group_size, num_args, arg_info);
        log::debug!("{}", kernel.describe(true));
        Ok(self.kernels.insert(kernel))
    }

    fn query_kernel(&self, handle: KernelHandle) -> std::result::Result<(usize, u32), Status> {
        let max_work_group_size = self.api.kernel_work_group_size(handle, self.device.id())?;
        let num_args = self.api.kernel_num_args(handle)?;
        Ok((max_work_group_size, num_args))
    }

    pub fn create_kernel_from_file(
        &mut self,
        path: impl AsRef<Path>,
        name: &str,
        options: &BuildOptions,
    ) -> Result<KernelId> {
        let program = self.create_program_from_file(path, options)?;
        self.create_kernel(program, name)
    }

    pub fn create_kernel_from_source(&mut self, source: &str, name: &str, options: &BuildOptions) -> Result<KernelId> {
        let program = self.create_program_from_source(source, options, None)?;
        self.create_kernel(program, name)
    }

    pub fn program(&self, id: ProgramId) -> Result<&Program> {
        self.programs.get(id)
    }

    pub fn kernel(&self, id: KernelId) -> Result<&Kernel> {
        self.kernels.get(id)
    }

    /// Number of distinct programs built by this context.
    pub fn num_programs(&self) -> usize {
        self.programs.len()
    }

    // ---- buffers ----

    /// Copies `host` into a new device buffer.
    pub fn create_buffer_from_mem(&mut self, access: AccessMode, host: &[u8]) -> Result<BufferId> {
        let mem = self
            .api
            .create_buffer(self.handle, access.mem_flags(), host)
            .map_err(|code| {
                translate(
                    ApiCall::CreateBuffer,
                    code,
                    format!("{} buffer of {}", access, format_bytes(host.len() as u64)),
                )
            })?;

        let id = self
            .buffers
            .insert(Buffer::new(mem, access, AlignedBytes::from_bytes(host)));
        log::debug!("created {} ({}, {} bytes)", id, access, host.len());
        Ok(id)
    }

    pub fn create_buffer_from_slice<T: Pod>(&mut self, access: AccessMode, host: &[T]) -> Result<BufferId> {
        self.create_buffer_from_mem(access, bytemuck::cast_slice(host))
    }

    /// Zero-initialised buffer of `size` bytes.
    pub fn create_buffer(&mut self, access: AccessMode, size: usize) -> Result<BufferId> {
        self.create_buffer_from_mem(access, AlignedBytes::zeroed(size).as_bytes())
    }

    pub fn buffer(&self, id: BufferId) -> Result<&Buffer> {
        self.buffers.get(id)
    }

    // ---- argument binding ----

    /// Binds `arg` to slot `index` of `kernel`.
    ///
    /// On failure the previous binding of the slot stays in place. Read-only
    /// buffers are rejected for parameters the kernel may write.
    pub fn set_arg(&mut self, kernel: KernelId, index: u32, arg: impl Into<KernelArg>) -> Result<()> {
        let arg = arg.into();
        let value = match &arg {
            KernelArg::Buffer(id) => {
                let buffer = self.buffers.get(*id)?;
                let target = self.kernels.get(kernel)?;
                if let Some(info) = target.arg_info(index) {
                    if info.device_writable() && !buffer.can_write() {
                        log::error!(
                            "{} is {} but '{}' may write parameter '{}'",
                            id,
                            buffer.access(),
                            target.name(),
                            info.name
                        );
                        return Err(Error::binding(
                            index,
                            format!(
                                "{} buffer bound to writable parameter '{}'",
                                buffer.access(),
                                info.name
                            ),
                        ));
                    }
                }
                ArgValue::Mem(buffer.handle())
            }
            KernelArg::Scalar(bytes) => ArgValue::Scalar(bytes.clone()),
            KernelArg::Local(size) => ArgValue::Local(*size),
        };

        let target = self.kernels.get_mut(kernel)?;
        self.api
            .set_kernel_arg(target.handle(), index, &value)
            .map_err(|code| binding_error(index, code, target.name()))?;
        target.store_binding(index, arg);
        Ok(())
    }

    /// Reserves `size` bytes of local memory for slot `index`.
    pub fn set_local_arg(&mut self, kernel: KernelId, index: u32, size: usize) -> Result<()> {
        self.set_arg(kernel, index, KernelArg::Local(size))
    }

    // ---- submission ----

    /// Launches `kernel` with its current bindings, labelled by its name.
    /// `local_size` of `None` lets the device choose.
    pub fn enqueue_kernel(
        &mut self,
        queue: QueueId,
        kernel: KernelId,
        global_size: usize,
        local_size: Option<usize>,
    ) -> Result<()> {
        self.launch(queue, kernel, global_size, local_size, None)
    }

    /// Like [`enqueue_kernel`](Self::enqueue_kernel), recorded under `label`.
    pub fn enqueue_kernel_labeled(
        &mut self,
        queue: QueueId,
        kernel: KernelId,
        global_size: usize,
        local_size: Option<usize>,
        label: &str,
    ) -> Result<()> {
        self.launch(queue, kernel, global_size, local_size, Some(label))
    }

    fn launch(
        &mut self,
        queue: QueueId,
        kernel: KernelId,
        global_size: usize,
        local_size: Option<usize>,
        label: Option<&str>,
    ) -> Result<()> {
        let target = self.kernels.get(kernel)?;
        let submit = self.queues.get_mut(queue)?;
        let label = label.unwrap_or_else(|| target.name());
        submit.enqueue_kernel(self.api.as_ref(), target, global_size, local_size, label)
    }

    /// Blocking read of the whole buffer into its host region, which is
    /// returned.
    pub fn read_buffer(&mut self, queue: QueueId, buffer: BufferId) -> Result<&[u8]> {
        let submit = self.queues.get_mut(queue)?;
        let target = self.buffers.get_mut(buffer)?;
        let mem = target.handle();
        submit.read(self.api.as_ref(), mem, target.host_mut(), queue::LABEL_READ)?;
        Ok(target.host_bytes())
    }

    /// [`read_buffer`](Self::read_buffer) viewed as a slice of `T`.
    pub fn read_buffer_as<T: Pod>(&mut self, queue: QueueId, buffer: BufferId) -> Result<&[T]> {
        let bytes = self.read_buffer(queue, buffer)?;
        bytemuck::try_cast_slice(bytes).map_err(|_| Error::Transfer {
            status: status::INVALID_VALUE,
            message: format!(
                "{} bytes are not a whole number of {}",
                bytes.len(),
                std::any::type_name::<T>()
            ),
        })
    }

    /// Enqueues a host to device copy of `data` into the start of `buffer`.
    /// Does not wait; flush the queue before relying on the device copy.
    pub fn copy_from_host(&mut self, queue: QueueId, buffer: BufferId, data: &[u8]) -> Result<()> {
        let submit = self.queues.get_mut(queue)?;
        let target = self.buffers.get_mut(buffer)?;
        submit.write(self.api.as_ref(), target.handle(), data, false, queue::LABEL_COPY_FROM_HOST)?;
        target.host_mut()[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Copies the first `dst.len()` bytes of `buffer` into `dst`, waiting for
    /// the transfer.
    pub fn copy_to_host(&mut self, queue: QueueId, buffer: BufferId, dst: &mut [u8]) -> Result<()> {
        let submit = self.queues.get_mut(queue)?;
        let target = self.buffers.get_mut(buffer)?;
        submit.read(self.api.as_ref(), target.handle(), dst, queue::LABEL_COPY_TO_HOST)?;
        target.host_mut()[..dst.len()].copy_from_slice(dst);
        Ok(())
    }

    /// Blocks until every command submitted to `queue` completed.
    pub fn flush(&mut self, queue: QueueId) -> Result<()> {
        self.queues.get_mut(queue)?.finish(self.api.as_ref())
    }

    /// Flushes every queue, oldest first.
    pub fn flush_all(&mut self) -> Result<()> {
        let ids: Vec<QueueId> = self.queues.iter().map(|(id, _)| id).collect();
        for id in ids {
            self.flush(id)?;
        }
        Ok(())
    }

    pub fn queue(&self, id: QueueId) -> Result<&CommandQueue> {
        self.queues.get(id)
    }

    /// Flushes `queue` and reports the timings of every recorded
    /// submission. Empty when profiling is off.
    pub fn events_profile(&mut self, queue: QueueId) -> Result<ProfileReport> {
        let submit = self.queues.get_mut(queue)?;
        if !submit.is_profiling() {
            log::warn!("{} was created without profiling", queue);
            return Ok(ProfileReport::default());
        }
        submit.profile(self.api.as_ref())
    }

    pub fn queue_metrics(&self, queue: QueueId) -> Result<MetricsSnapshot> {
        Ok(self.queues.get(queue)?.metrics())
    }
}

fn compile_error(code: Status, path: Option<&Path>, log: String) -> Error {
    let mut err = translate(ApiCall::BuildProgram, code, log);
    if let Error::Compile { path: failed, .. } = &mut err {
        *failed = path.map(Path::to_path_buf);
    }
    err
}

fn binding_error(index: u32, code: Status, kernel: &str) -> Error {
    match translate(ApiCall::SetKernelArg, code, format!("argument {} of '{}'", index, kernel)) {
        Error::Binding { reason, status, .. } => Error::Binding { index, reason, status },
        other => other,
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        let api = self.api.as_ref();

        self.program_cache.clear();
        for program in self.programs.drain() {
            if let Err(code) = api.release_program(program.handle()) {
                log::warn!("could not release program {}: {}", program.key(), code);
            }
        }
        for kernel in self.kernels.drain() {
            if let Err(code) = api.release_kernel(kernel.handle()) {
                log::warn!("could not release kernel '{}': {}", kernel.name(), code);
            }
        }
        for mut queue in self.queues.drain() {
            queue.release(api);
        }
        for buffer in self.buffers.drain() {
            if let Err(code) = api.release_mem_object(buffer.handle()) {
                log::warn!("could not release buffer: {}", code);
            }
        }
        if let Err(code) = api.release_context(self.handle) {
            log::warn!("could not release {}: {}", self.handle, code);
        }

        log::debug!("released context on '{}'", self.device.name());
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("device", &self.device.name())
            .field("profiling", &self.config.enable_profiling)
            .field("programs", &self.programs.len())
            .field("kernels", &self.kernels.len())
            .field("queues", &self.queues.len())
            .field("buffers", &self.buffers.len())
            .finish()
    }
}
