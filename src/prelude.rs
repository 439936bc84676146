pub use crate::arena::{BufferId, KernelId, ProgramId, QueueId};
pub use crate::buffer::AccessMode;
pub use crate::config::{ContextConfig, HostConfig};
pub use crate::context::Context;
pub use crate::device::{DeviceDescriptor, DeviceDirectory, DeviceType};
pub use crate::driver::host::{HostDeviceSpec, HostDriver, HostKernel, KernelFault, KernelResult, WorkGroup};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::kernel::KernelArg;
pub use crate::program::BuildOptions;
pub use crate::queue::ProfileReport;

pub use crate::telemetry::MetricsSnapshot;
