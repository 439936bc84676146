//! Numeric status codes returned by the native device API.
//!
//! Codes follow the OpenCL numbering so that a native binding can pass its
//! return values through unchanged.

use std::fmt;

/// Raw status code returned by a [`DeviceApi`](super::DeviceApi) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

pub const SUCCESS: Status = Status(0);
pub const DEVICE_NOT_FOUND: Status = Status(-1);
pub const DEVICE_NOT_AVAILABLE: Status = Status(-2);
pub const COMPILER_NOT_AVAILABLE: Status = Status(-3);
pub const MEM_OBJECT_ALLOCATION_FAILURE: Status = Status(-4);
pub const OUT_OF_RESOURCES: Status = Status(-5);
pub const OUT_OF_HOST_MEMORY: Status = Status(-6);
pub const PROFILING_INFO_NOT_AVAILABLE: Status = Status(-7);
pub const BUILD_PROGRAM_FAILURE: Status = Status(-11);
pub const EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST: Status = Status(-14);
pub const KERNEL_ARG_INFO_NOT_AVAILABLE: Status = Status(-19);
pub const INVALID_VALUE: Status = Status(-30);
pub const INVALID_DEVICE: Status = Status(-33);
pub const INVALID_CONTEXT: Status = Status(-34);
pub const INVALID_COMMAND_QUEUE: Status = Status(-36);
pub const INVALID_HOST_PTR: Status = Status(-37);
pub const INVALID_MEM_OBJECT: Status = Status(-38);
pub const INVALID_BUILD_OPTIONS: Status = Status(-43);
pub const INVALID_PROGRAM: Status = Status(-44);
pub const INVALID_PROGRAM_EXECUTABLE: Status = Status(-45);
pub const INVALID_KERNEL_NAME: Status = Status(-46);
pub const INVALID_KERNEL_DEFINITION: Status = Status(-47);
pub const INVALID_KERNEL: Status = Status(-48);
pub const INVALID_ARG_INDEX: Status = Status(-49);
pub const INVALID_ARG_VALUE: Status = Status(-50);
pub const INVALID_ARG_SIZE: Status = Status(-51);
pub const INVALID_KERNEL_ARGS: Status = Status(-52);
pub const INVALID_WORK_DIMENSION: Status = Status(-53);
pub const INVALID_WORK_GROUP_SIZE: Status = Status(-54);
pub const INVALID_GLOBAL_OFFSET: Status = Status(-56);
pub const INVALID_EVENT_WAIT_LIST: Status = Status(-57);
pub const INVALID_EVENT: Status = Status(-58);
pub const INVALID_OPERATION: Status = Status(-59);
pub const INVALID_BUFFER_SIZE: Status = Status(-61);
pub const INVALID_GLOBAL_WORK_SIZE: Status = Status(-63);

// Command execution states reported through event status.
pub const COMPLETE: i32 = 0;
pub const RUNNING: i32 = 1;
pub const SUBMITTED: i32 = 2;
pub const QUEUED: i32 = 3;

impl Status {
    pub fn code(self) -> i32 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self.0 >= 0
    }

    /// Codes signalling that the device ran out of memory or execution resources.
    pub fn is_exhaustion(self) -> bool {
        matches!(
            self,
            MEM_OBJECT_ALLOCATION_FAILURE | OUT_OF_RESOURCES | OUT_OF_HOST_MEMORY
        )
    }

    /// Symbolic name of the code, without the `CL_` prefix.
    pub fn name(self) -> &'static str {
        match self {
            SUCCESS => "SUCCESS",
            DEVICE_NOT_FOUND => "DEVICE_NOT_FOUND",
            DEVICE_NOT_AVAILABLE => "DEVICE_NOT_AVAILABLE",
            COMPILER_NOT_AVAILABLE => "COMPILER_NOT_AVAILABLE",
            MEM_OBJECT_ALLOCATION_FAILURE => "MEM_OBJECT_ALLOCATION_FAILURE",
            OUT_OF_RESOURCES => "OUT_OF_RESOURCES",
            OUT_OF_HOST_MEMORY => "OUT_OF_HOST_MEMORY",
            PROFILING_INFO_NOT_AVAILABLE => "PROFILING_INFO_NOT_AVAILABLE",
            BUILD_PROGRAM_FAILURE => "BUILD_PROGRAM_FAILURE",
            EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST => "EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST",
            KERNEL_ARG_INFO_NOT_AVAILABLE => "KERNEL_ARG_INFO_NOT_AVAILABLE",
            INVALID_VALUE => "INVALID_VALUE",
            INVALID_DEVICE => "INVALID_DEVICE",
            INVALID_CONTEXT => "INVALID_CONTEXT",
            INVALID_COMMAND_QUEUE => "INVALID_COMMAND_QUEUE",
            INVALID_HOST_PTR => "INVALID_HOST_PTR",
            INVALID_MEM_OBJECT => "INVALID_MEM_OBJECT",
            INVALID_BUILD_OPTIONS => "INVALID_BUILD_OPTIONS",
            INVALID_PROGRAM => "INVALID_PROGRAM",
            INVALID_PROGRAM_EXECUTABLE => "INVALID_PROGRAM_EXECUTABLE",
            INVALID_KERNEL_NAME => "INVALID_KERNEL_NAME",
            INVALID_KERNEL_DEFINITION => "INVALID_KERNEL_DEFINITION",
            INVALID_KERNEL => "INVALID_KERNEL",
            INVALID_ARG_INDEX => "INVALID_ARG_INDEX",
            INVALID_ARG_VALUE => "INVALID_ARG_VALUE",
            INVALID_ARG_SIZE => "INVALID_ARG_SIZE",
            INVALID_KERNEL_ARGS => "INVALID_KERNEL_ARGS",
            INVALID_WORK_DIMENSION => "INVALID_WORK_DIMENSION",
            INVALID_WORK_GROUP_SIZE => "INVALID_WORK_GROUP_SIZE",
            INVALID_GLOBAL_OFFSET => "INVALID_GLOBAL_OFFSET",
            INVALID_EVENT_WAIT_LIST => "INVALID_EVENT_WAIT_LIST",
            INVALID_EVENT => "INVALID_EVENT",
            INVALID_OPERATION => "INVALID_OPERATION",
            INVALID_BUFFER_SIZE => "INVALID_BUFFER_SIZE",
            INVALID_GLOBAL_WORK_SIZE => "INVALID_GLOBAL_WORK_SIZE",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_names() {
        assert_eq!(INVALID_KERNEL_NAME.name(), "INVALID_KERNEL_NAME");
        assert_eq!(Status(-9999).name(), "Unknown");
        assert_eq!(OUT_OF_RESOURCES.to_string(), "OUT_OF_RESOURCES (-5)");
    }

    #[test]
    fn test_exhaustion_codes() {
        assert!(OUT_OF_RESOURCES.is_exhaustion());
        assert!(MEM_OBJECT_ALLOCATION_FAILURE.is_exhaustion());
        assert!(!INVALID_VALUE.is_exhaustion());
        assert!(SUCCESS.is_success());
        assert!(!BUILD_PROGRAM_FAILURE.is_success());
    }
}
