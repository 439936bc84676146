//! The native device API seam.
//!
//! [`DeviceApi`] mirrors a C-style compute API: every call hands back either
//! a value or a raw numeric [`Status`], objects are opaque handles, and
//! nothing is reference counted. The core (`Context`, `Program`, `Kernel`,
//! `Buffer`, `CommandQueue`) is the only code that talks to it, and it
//! translates every status into [`crate::Error`] exactly once.
//!
//! [`host::HostDriver`] is the in-process implementation shipped with the
//! crate.

pub mod host;
pub mod status;

pub use status::Status;

use std::fmt;

/// Result of a native call.
pub type ApiResult<T> = std::result::Result<T, Status>;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

handle!(
    /// Identifies one device exposed by the driver.
    DeviceId
);
handle!(
    /// Native device connection.
    ContextHandle
);
handle!(
    /// Native command queue.
    QueueHandle
);
handle!(
    /// Native program object.
    ProgramHandle
);
handle!(
    /// Native kernel object.
    KernelHandle
);
handle!(
    /// Native memory object.
    MemHandle
);
handle!(
    /// Native event recording one command's timing.
    EventHandle
);

/// Device type bit field as reported by the driver.
pub const DEVICE_TYPE_CPU: u64 = 1 << 1;
pub const DEVICE_TYPE_GPU: u64 = 1 << 2;
pub const DEVICE_TYPE_ACCELERATOR: u64 = 1 << 3;

/// Device properties exactly as the driver reports them, before any
/// interpretation by [`crate::device`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawDeviceInfo {
    pub name: String,
    pub version: String,
    pub vendor: String,
    pub device_type: u64,
    pub compute_units: u32,
    pub max_work_group_size: usize,
    pub max_work_item_sizes: Vec<usize>,
    pub local_mem_size: u64,
    pub global_mem_size: u64,
    /// Base address alignment in bytes.
    pub mem_base_addr_align: u32,
    /// Space separated extension names.
    pub extensions: String,
}

/// Access flags of a memory object, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemFlags {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// Address space of a kernel parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressQualifier {
    Global,
    Constant,
    Local,
    Private,
}

/// Parameter description as reported by the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgInfo {
    pub name: String,
    pub type_name: String,
    pub address: AddressQualifier,
    /// `true` when the pointee is `const` qualified (or lives in constant memory).
    pub is_const: bool,
    /// `true` for pointer parameters.
    pub is_pointer: bool,
    /// Size in bytes of a by-value parameter, when the type is known.
    pub size: Option<usize>,
}

impl ArgInfo {
    /// Whether the kernel may store through this parameter.
    pub fn device_writable(&self) -> bool {
        self.is_pointer && self.address == AddressQualifier::Global && !self.is_const
    }
}

/// Value handed to `set_kernel_arg`.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Mem(MemHandle),
    Scalar(Vec<u8>),
    /// Local memory reservation in bytes; no host value.
    Local(usize),
}

/// Device clock timestamps of one command, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProfilingInfo {
    pub queued: u64,
    pub submit: u64,
    pub start: u64,
    pub end: u64,
}

/// C-style compute device API.
///
/// Implementations must be safe to share across threads; the core never
/// calls into one handle concurrently from two places except where a
/// native API would allow it (distinct queues).
pub trait DeviceApi: Send + Sync {
    /// Short identifier used in log output.
    fn platform_name(&self) -> &str;

    fn device_ids(&self) -> ApiResult<Vec<DeviceId>>;
    fn device_info(&self, device: DeviceId) -> ApiResult<RawDeviceInfo>;

    fn create_context(&self, device: DeviceId) -> ApiResult<ContextHandle>;
    fn release_context(&self, context: ContextHandle) -> ApiResult<()>;

    fn create_command_queue(
        &self,
        context: ContextHandle,
        device: DeviceId,
        profiling: bool,
    ) -> ApiResult<QueueHandle>;
    fn release_command_queue(&self, queue: QueueHandle) -> ApiResult<()>;

    fn create_program_with_source(
        &self,
        context: ContextHandle,
        source: &str,
        filename: Option<&str>,
    ) -> ApiResult<ProgramHandle>;
    fn build_program(&self, program: ProgramHandle, device: DeviceId, options: &str) -> ApiResult<()>;
    fn program_build_log(&self, program: ProgramHandle, device: DeviceId) -> ApiResult<String>;
    fn release_program(&self, program: ProgramHandle) -> ApiResult<()>;

    fn create_kernel(&self, program: ProgramHandle, name: &str) -> ApiResult<KernelHandle>;
    fn kernel_work_group_size(&self, kernel: KernelHandle, device: DeviceId) -> ApiResult<usize>;
    fn kernel_num_args(&self, kernel: KernelHandle) -> ApiResult<u32>;
    fn kernel_arg_info(&self, kernel: KernelHandle, index: u32) -> ApiResult<ArgInfo>;
    fn set_kernel_arg(&self, kernel: KernelHandle, index: u32, value: &ArgValue) -> ApiResult<()>;
    fn release_kernel(&self, kernel: KernelHandle) -> ApiResult<()>;

    /// Allocates a memory object initialised with a copy of `host`.
    fn create_buffer(&self, context: ContextHandle, flags: MemFlags, host: &[u8]) -> ApiResult<MemHandle>;
    fn release_mem_object(&self, mem: MemHandle) -> ApiResult<()>;

    fn enqueue_nd_range_kernel(
        &self,
        queue: QueueHandle,
        kernel: KernelHandle,
        global_size: usize,
        local_size: Option<usize>,
        want_event: bool,
    ) -> ApiResult<Option<EventHandle>>;

    /// Host to device copy. The driver copies `data` before returning, so a
    /// non-blocking write never borrows host memory past the call.
    fn enqueue_write_buffer(
        &self,
        queue: QueueHandle,
        mem: MemHandle,
        blocking: bool,
        offset: usize,
        data: &[u8],
        want_event: bool,
    ) -> ApiResult<Option<EventHandle>>;

    /// Blocking device to host copy into `dst`.
    fn enqueue_read_buffer(
        &self,
        queue: QueueHandle,
        mem: MemHandle,
        offset: usize,
        dst: &mut [u8],
        want_event: bool,
    ) -> ApiResult<Option<EventHandle>>;

    /// Blocks until every command previously submitted to `queue` completed.
    fn finish(&self, queue: QueueHandle) -> ApiResult<()>;

    fn event_profiling_info(&self, event: EventHandle) -> ApiResult<ProfilingInfo>;
    fn release_event(&self, event: EventHandle) -> ApiResult<()>;
}
