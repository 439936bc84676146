use crate::driver::Status;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure classes a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Device connection or command queue could not be created.
    Connection,
    /// Program failed to build; the device build log is attached.
    Compile,
    /// Kernel entry point missing or its work-group size could not be queried.
    Resolution,
    /// Kernel argument index or value rejected.
    Binding,
    /// Buffer creation, read or write could not be enqueued or completed.
    Transfer,
    /// Kernel launch could not be enqueued or failed while executing.
    Launch,
    /// Device ran out of memory or execution resources.
    ResourceExhaustion,
    /// Handle does not belong to this context.
    InvalidHandle,
    Config,
    Io,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("device connection failed: {message} ({status})")]
    Connection { status: Status, message: String },

    #[error("could not build program{}: {status}\n{log}", display_path(.path))]
    Compile {
        path: Option<PathBuf>,
        status: Status,
        log: String,
    },

    #[error("could not resolve kernel '{kernel}': {status}")]
    Resolution { kernel: String, status: Status },

    #[error("could not set kernel argument {index}: {reason}")]
    Binding {
        index: u32,
        reason: String,
        status: Option<Status>,
    },

    #[error("buffer transfer failed: {message} ({status})")]
    Transfer { status: Status, message: String },

    #[error("could not launch kernel '{kernel}': {status}")]
    Launch { kernel: String, status: Status },

    #[error("device out of resources: {message} ({status})")]
    ResourceExhaustion { status: Status, message: String },

    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("could not read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" {}", p.display()),
        None => String::new(),
    }
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn invalid_handle<S: Into<String>>(msg: S) -> Self {
        Error::InvalidHandle(msg.into())
    }

    pub fn binding<S: Into<String>>(index: u32, reason: S) -> Self {
        Error::Binding {
            index,
            reason: reason.into(),
            status: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection { .. } => ErrorKind::Connection,
            Error::Compile { .. } => ErrorKind::Compile,
            Error::Resolution { .. } => ErrorKind::Resolution,
            Error::Binding { .. } => ErrorKind::Binding,
            Error::Transfer { .. } => ErrorKind::Transfer,
            Error::Launch { .. } => ErrorKind::Launch,
            Error::ResourceExhaustion { .. } => ErrorKind::ResourceExhaustion,
            Error::InvalidHandle(_) => ErrorKind::InvalidHandle,
            Error::Config(_) => ErrorKind::Config,
            Error::Io { .. } => ErrorKind::Io,
        }
    }

    /// Native status code behind this error, if it came from the device API.
    pub fn status(&self) -> Option<Status> {
        match self {
            Error::Connection { status, .. }
            | Error::Compile { status, .. }
            | Error::Resolution { status, .. }
            | Error::Transfer { status, .. }
            | Error::Launch { status, .. }
            | Error::ResourceExhaustion { status, .. } => Some(*status),
            Error::Binding { status, .. } => *status,
            _ => None,
        }
    }

    /// Device compiler output for a failed build.
    pub fn build_log(&self) -> Option<&str> {
        match self {
            Error::Compile { log, .. } => Some(log),
            _ => None,
        }
    }
}

/// Native calls grouped by the error class their failures belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApiCall {
    DeviceQuery,
    CreateContext,
    CreateCommandQueue,
    BuildProgram,
    CreateKernel,
    KernelInfo,
    SetKernelArg,
    EnqueueKernel,
    CreateBuffer,
    ReadBuffer,
    WriteBuffer,
    Finish,
}

/// Translates a raw status into the crate error taxonomy and logs it.
///
/// Exhaustion codes win over the call category.
pub(crate) fn translate(call: ApiCall, status: Status, detail: impl Into<String>) -> Error {
    let detail = detail.into();
    log::error!("{:?} failed: {} [{}]", call, detail, status);

    if status.is_exhaustion() {
        return Error::ResourceExhaustion {
            status,
            message: detail,
        };
    }

    match call {
        ApiCall::DeviceQuery | ApiCall::CreateContext | ApiCall::CreateCommandQueue => {
            Error::Connection {
                status,
                message: detail,
            }
        }
        ApiCall::BuildProgram => Error::Compile {
            path: None,
            status,
            log: detail,
        },
        ApiCall::CreateKernel | ApiCall::KernelInfo => Error::Resolution {
            kernel: detail,
            status,
        },
        ApiCall::SetKernelArg => Error::Binding {
            index: 0,
            reason: detail,
            status: Some(status),
        },
        ApiCall::EnqueueKernel => Error::Launch {
            kernel: detail,
            status,
        },
        ApiCall::CreateBuffer | ApiCall::ReadBuffer | ApiCall::WriteBuffer | ApiCall::Finish => {
            Error::Transfer {
                status,
                message: detail,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::status;

    #[test]
    fn test_exhaustion_overrides_category() {
        let err = translate(ApiCall::SetKernelArg, status::OUT_OF_RESOURCES, "slot 0");
        assert_eq!(err.kind(), ErrorKind::ResourceExhaustion);
        assert_eq!(err.status(), Some(status::OUT_OF_RESOURCES));
    }

    #[test]
    fn test_category_mapping() {
        let err = translate(ApiCall::CreateContext, status::INVALID_DEVICE, "ctx");
        assert_eq!(err.kind(), ErrorKind::Connection);

        let err = translate(ApiCall::CreateKernel, status::INVALID_KERNEL_NAME, "missing");
        assert_eq!(err.kind(), ErrorKind::Resolution);
        assert!(err.to_string().contains("INVALID_KERNEL_NAME"));

        let err = translate(ApiCall::ReadBuffer, status::INVALID_MEM_OBJECT, "read");
        assert_eq!(err.kind(), ErrorKind::Transfer);
    }

    #[test]
    fn test_compile_error_carries_log() {
        let err = Error::Compile {
            path: Some(PathBuf::from("kernels/bad.cl")),
            status: status::BUILD_PROGRAM_FAILURE,
            log: "bad.cl:1:1: error: expected '}'".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Compile);
        assert!(err.build_log().unwrap().contains("expected"));
        assert!(err.to_string().contains("kernels/bad.cl"));
    }
}
