//! Ordered submission channels.
//!
//! Commands submitted to one [`CommandQueue`] run in submission order. The
//! host only observes completion through a blocking read or a flush. When
//! the owning context was created with profiling enabled every submission
//! records a labelled event that [`profile`](CommandQueue::profile) turns into
//! a [`ProfileReport`].

pub mod profile;

pub use profile::{ProfileEntry, ProfileReport};

use crate::driver::{DeviceApi, EventHandle, MemHandle, QueueHandle};
use crate::error::{translate, ApiCall, Result};
use crate::kernel::Kernel;
use crate::telemetry::{MetricsSnapshot, QueueMetrics};
use std::fmt;
use std::time::Instant;

pub(crate) const LABEL_READ: &str = "BufferRead";
pub(crate) const LABEL_COPY_FROM_HOST: &str = "BufferCopyFromHost";
pub(crate) const LABEL_COPY_TO_HOST: &str = "BufferCopyToHost";

#[derive(Debug)]
struct ProfileEvent {
    label: String,
    event: EventHandle,
}

pub struct CommandQueue {
    handle: QueueHandle,
    profiling: bool,
    events: Vec<ProfileEvent>,
    metrics: QueueMetrics,
}

impl CommandQueue {
    pub(crate) fn new(handle: QueueHandle, profiling: bool) -> Self {
        Self {
            handle,
            profiling,
            events: Vec::new(),
            metrics: QueueMetrics::new(),
        }
    }

    pub fn is_profiling(&self) -> bool {
        self.profiling
    }

    /// Number of events recorded so far.
    pub fn num_events(&self) -> usize {
        self.events.len()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn record(&mut self, label: &str, event: Option<EventHandle>) {
        if let Some(event) = event {
            self.events.push(ProfileEvent {
                label: label.to_string(),
                event,
            });
        }
    }

    pub(crate) fn enqueue_kernel(
        &mut self,
        api: &dyn DeviceApi,
        kernel: &Kernel,
        global_size: usize,
        local_size: Option<usize>,
        label: &str,
    ) -> Result<()> {
        let event = api
            .enqueue_nd_range_kernel(self.handle, kernel.handle(), global_size, local_size, self.profiling)
            .map_err(|status| translate(ApiCall::EnqueueKernel, status, kernel.name()))?;

        log::trace!("enqueued '{}' global={} local={:?}", label, global_size, local_size);
        self.metrics.record_launch();
        self.record(label, event);
        Ok(())
    }

    /// Host to device copy; `blocking` waits for the data to land.
    pub(crate) fn write(
        &mut self,
        api: &dyn DeviceApi,
        mem: MemHandle,
        data: &[u8],
        blocking: bool,
        label: &str,
    ) -> Result<()> {
        let started = Instant::now();
        let event = api
            .enqueue_write_buffer(self.handle, mem, blocking, 0, data, self.profiling)
            .map_err(|status| translate(ApiCall::WriteBuffer, status, format!("write of {} bytes", data.len())))?;

        if blocking {
            self.metrics.record_wait(started.elapsed());
        }
        self.metrics.record_upload(data.len());
        self.record(label, event);
        Ok(())
    }

    /// Blocking device to host copy.
    pub(crate) fn read(&mut self, api: &dyn DeviceApi, mem: MemHandle, dst: &mut [u8], label: &str) -> Result<()> {
        let started = Instant::now();
        let event = api
            .enqueue_read_buffer(self.handle, mem, 0, dst, self.profiling)
            .map_err(|status| translate(ApiCall::ReadBuffer, status, format!("read of {} bytes", dst.len())))?;

        self.metrics.record_wait(started.elapsed());
        self.metrics.record_download(dst.len());
        self.record(label, event);
        Ok(())
    }

    /// Waits for every command submitted so far.
    pub(crate) fn finish(&mut self, api: &dyn DeviceApi) -> Result<()> {
        let started = Instant::now();
        api.finish(self.handle)
            .map_err(|status| translate(ApiCall::Finish, status, format!("flush of {}", self.handle)))?;
        self.metrics.record_wait(started.elapsed());
        self.metrics.record_flush();
        Ok(())
    }

    /// Flushes the queue and collects the timings of every recorded event.
    pub(crate) fn profile(&mut self, api: &dyn DeviceApi) -> Result<ProfileReport> {
        self.finish(api)?;

        let mut entries = Vec::with_capacity(self.events.len());
        for recorded in &self.events {
            let info = api
                .event_profiling_info(recorded.event)
                .map_err(|status| translate(ApiCall::Finish, status, format!("profile of '{}'", recorded.label)))?;
            entries.push(ProfileEntry::new(recorded.label.clone(), info));
        }
        Ok(ProfileReport::new(entries))
    }

    /// Releases recorded events, then the native queue. The driver drains
    /// pending commands before the queue goes away.
    pub(crate) fn release(&mut self, api: &dyn DeviceApi) {
        for recorded in self.events.drain(..) {
            if let Err(status) = api.release_event(recorded.event) {
                log::warn!("could not release event '{}': {}", recorded.label, status);
            }
        }
        if let Err(status) = api.release_command_queue(self.handle) {
            log::warn!("could not release {}: {}", self.handle, status);
        }
    }
}

impl fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandQueue")
            .field("handle", &self.handle)
            .field("profiling", &self.profiling)
            .field("events", &self.events.len())
            .finish()
    }
}
