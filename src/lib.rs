//! nong - safe resource ownership over a C-style compute device API
//!
//! A [`Context`] owns one device connection together with every program,
//! kernel, buffer and command queue created through it, and releases them in
//! dependency order when dropped. Native status codes are translated once,
//! at the [`driver::DeviceApi`] boundary, into [`Error`].
//!
//! # Quick Start
//!
//! ```
//! use nong::prelude::*;
//! use std::sync::Arc;
//!
//! let directory = DeviceDirectory::init(Arc::new(HostDriver::with_defaults())).unwrap();
//! let device = directory.default_device().unwrap().clone();
//! let mut ctx = Context::create(&directory, &device, true).unwrap();
//!
//! let data: Vec<f32> = (0..64).map(|i| i as f32).collect();
//! let input = ctx.create_buffer_from_slice(AccessMode::ReadOnly, &data).unwrap();
//! let output = ctx.create_buffer(AccessMode::WriteOnly, 2 * 4).unwrap();
//!
//! let source = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/kernels/add_numbers.cl"));
//! let kernel = ctx
//!     .create_kernel_from_source(source, "add_numbers", &BuildOptions::default())
//!     .unwrap();
//! ctx.set_arg(kernel, 0, input).unwrap();
//! ctx.set_local_arg(kernel, 1, 4 * 4).unwrap();
//! ctx.set_arg(kernel, 2, output).unwrap();
//!
//! let queue = ctx.default_queue();
//! ctx.enqueue_kernel(queue, kernel, 8, Some(4)).unwrap();
//! let sums = ctx.read_buffer_as::<f32>(queue, output).unwrap();
//! assert_eq!(sums.iter().sum::<f32>(), 2016.0);
//!
//! println!("{}", ctx.events_profile(queue).unwrap());
//! ```
//!
//! # Features
//!
//! - **Owning arena**: typed ids, one teardown path per context
//! - **Program cache**: keyed by source path or source digest
//! - **Ordered queues**: FIFO submission with optional event profiling
//! - **Host driver**: an in-process device with a validating compiler front-end
//! - **Telemetry**: per-queue counters and wait histograms (optional)

#![warn(missing_debug_implementations)]

pub mod arena;
pub mod buffer;
pub mod config;
pub mod context;
pub mod device;
pub mod driver;
pub mod error;
pub mod kernel;
pub mod prelude;
pub mod program;
pub mod queue;
pub mod telemetry;
pub mod util;

pub use arena::{BufferId, KernelId, ProgramId, QueueId};
pub use buffer::{AccessMode, Buffer};
pub use config::{ContextConfig, ContextConfigBuilder, HostConfig, HostConfigBuilder};
pub use context::Context;
pub use device::{DeviceDescriptor, DeviceDirectory, DeviceType, Vendor};
pub use error::{Error, ErrorKind, Result};
pub use kernel::{Kernel, KernelArg};
pub use program::{BuildOptions, Program, ProgramKey};
pub use queue::{CommandQueue, ProfileEntry, ProfileReport};
