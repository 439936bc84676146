// queue worker thread
use super::registry::{self, BoundArg, HostKernel, MemObject};
use crate::driver::status::{self, Status};
use crate::driver::ProfilingInfo;
use crossbeam_channel::{bounded, unbounded, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Driver-wide monotonic clock in nanoseconds.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Clock {
    epoch: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    pub fn now(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

/// Timestamps of one command.
pub(crate) struct EventRecord {
    queued: u64,
    submit: u64,
    start: AtomicU64,
    end: AtomicU64,
    complete: AtomicBool,
}

impl EventRecord {
    pub fn new(clock: &Clock) -> Arc<Self> {
        let now = clock.now();
        Arc::new(Self {
            queued: now,
            submit: now,
            start: AtomicU64::new(0),
            end: AtomicU64::new(0),
            complete: AtomicBool::new(false),
        })
    }

    fn started(&self, clock: &Clock) {
        self.start.store(clock.now(), Ordering::Relaxed);
    }

    fn ended(&self, clock: &Clock) {
        self.end.store(clock.now(), Ordering::Relaxed);
        self.complete.store(true, Ordering::Release);
    }

    pub fn profiling_info(&self) -> Result<ProfilingInfo, Status> {
        if !self.complete.load(Ordering::Acquire) {
            return Err(status::PROFILING_INFO_NOT_AVAILABLE);
        }
        Ok(ProfilingInfo {
            queued: self.queued,
            submit: self.submit,
            start: self.start.load(Ordering::Relaxed),
            end: self.end.load(Ordering::Relaxed),
        })
    }
}

pub(crate) enum Command {
    Launch {
        name: String,
        kernel: Arc<dyn HostKernel>,
        args: Vec<BoundArg>,
        global_size: usize,
        local_size: usize,
        event: Option<Arc<EventRecord>>,
    },
    Write {
        mem: Arc<MemObject>,
        offset: usize,
        data: Vec<u8>,
        event: Option<Arc<EventRecord>>,
        done: Option<Sender<()>>,
    },
    Read {
        mem: Arc<MemObject>,
        offset: usize,
        len: usize,
        event: Option<Arc<EventRecord>>,
        reply: Sender<Vec<u8>>,
    },
    Marker {
        reply: Sender<()>,
    },
}

/// One thread executing a queue's commands in submission order.
pub(crate) struct QueueWorker {
    sender: Option<Sender<Command>>,
    thread: Option<JoinHandle<()>>,
    fault: Arc<Mutex<Option<Status>>>,
}

impl QueueWorker {
    pub fn spawn(name: String, stack_size: Option<usize>, clock: Clock) -> std::io::Result<Self> {
        let (sender, receiver) = unbounded::<Command>();
        let fault = Arc::new(Mutex::new(None));
        let worker_fault = fault.clone();

        let mut builder = thread::Builder::new().name(name);
        if let Some(stack_size) = stack_size {
            builder = builder.stack_size(stack_size);
        }

        let thread = builder.spawn(move || {
            for command in receiver.iter() {
                run_command(command, &clock, &worker_fault);
            }
            log::trace!("queue worker exiting");
        })?;

        Ok(Self {
            sender: Some(sender),
            thread: Some(thread),
            fault,
        })
    }

    pub fn submit(&self, command: Command) -> Result<(), Status> {
        let sender = self.sender.as_ref().ok_or(status::INVALID_COMMAND_QUEUE)?;
        sender.send(command).map_err(|_| status::INVALID_COMMAND_QUEUE)
    }

    /// Blocks until every earlier command ran, then reports a pending fault.
    pub fn finish(&self) -> Result<(), Status> {
        let (reply, done) = bounded(1);
        self.submit(Command::Marker { reply })?;
        done.recv().map_err(|_| status::INVALID_COMMAND_QUEUE)?;
        self.take_fault()
    }

    /// Blocking read through the queue.
    pub fn read(
        &self,
        mem: Arc<MemObject>,
        offset: usize,
        dst: &mut [u8],
        event: Option<Arc<EventRecord>>,
    ) -> Result<(), Status> {
        let (reply, data) = bounded(1);
        self.submit(Command::Read {
            mem,
            offset,
            len: dst.len(),
            event,
            reply,
        })?;
        let bytes = data.recv().map_err(|_| status::INVALID_COMMAND_QUEUE)?;
        dst.copy_from_slice(&bytes);
        self.take_fault()
    }

    /// Blocking write through the queue.
    pub fn write_blocking(
        &self,
        mem: Arc<MemObject>,
        offset: usize,
        data: Vec<u8>,
        event: Option<Arc<EventRecord>>,
    ) -> Result<(), Status> {
        let (done, wait) = bounded(1);
        self.submit(Command::Write {
            mem,
            offset,
            data,
            event,
            done: Some(done),
        })?;
        wait.recv().map_err(|_| status::INVALID_COMMAND_QUEUE)?;
        self.take_fault()
    }

    fn take_fault(&self) -> Result<(), Status> {
        match self.fault.lock().take() {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    /// Drains outstanding commands and joins the thread.
    pub fn shutdown(&mut self) {
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for QueueWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn record_fault(fault: &Mutex<Option<Status>>, status: Status) {
    let mut slot = fault.lock();
    if slot.is_none() {
        *slot = Some(status);
    }
}

fn run_command(command: Command, clock: &Clock, fault: &Mutex<Option<Status>>) {
    match command {
        Command::Launch {
            name,
            kernel,
            args,
            global_size,
            local_size,
            event,
        } => {
            log::trace!("launch {} global={} local={}", name, global_size, local_size);
            if let Some(event) = &event {
                event.started(clock);
            }

            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                registry::execute(kernel.as_ref(), &args, global_size, local_size)
            }));

            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    log::error!("kernel '{}' failed: {}", name, err);
                    record_fault(fault, err.status());
                }
                Err(_) => {
                    log::error!("kernel '{}' panicked", name);
                    record_fault(fault, status::OUT_OF_RESOURCES);
                }
            }

            if let Some(event) = &event {
                event.ended(clock);
            }
        }
        Command::Write {
            mem,
            offset,
            data,
            event,
            done,
        } => {
            log::trace!("write {} bytes at {}", data.len(), offset);
            if let Some(event) = &event {
                event.started(clock);
            }
            mem.data.write().as_bytes_mut()[offset..offset + data.len()].copy_from_slice(&data);
            if let Some(event) = &event {
                event.ended(clock);
            }
            if let Some(done) = done {
                let _ = done.send(());
            }
        }
        Command::Read {
            mem,
            offset,
            len,
            event,
            reply,
        } => {
            log::trace!("read {} bytes at {}", len, offset);
            if let Some(event) = &event {
                event.started(clock);
            }
            let bytes = mem.data.read().as_bytes()[offset..offset + len].to_vec();
            if let Some(event) = &event {
                event.ended(clock);
            }
            let _ = reply.send(bytes);
        }
        Command::Marker { reply } => {
            let _ = reply.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::host::registry::{KernelFault, WorkGroup};
    use crate::driver::MemFlags;

    fn worker() -> QueueWorker {
        QueueWorker::spawn("test-queue".into(), None, Clock::new()).unwrap()
    }

    #[test]
    fn test_commands_run_in_order() {
        let worker = worker();
        let mem = Arc::new(MemObject::new(MemFlags::ReadWrite, &[0u8; 4]));

        for value in 1..=10u8 {
            worker
                .submit(Command::Write {
                    mem: mem.clone(),
                    offset: 0,
                    data: vec![value; 4],
                    event: None,
                    done: None,
                })
                .unwrap();
        }

        let mut out = [0u8; 4];
        worker.read(mem, 0, &mut out, None).unwrap();
        assert_eq!(out, [10u8; 4]);
    }

    #[test]
    fn test_fault_reported_once() {
        let worker = worker();
        let failing = |_: &WorkGroup<'_>| -> Result<(), KernelFault> { Err(KernelFault::Other("boom".into())) };
        worker
            .submit(Command::Launch {
                name: "failing".into(),
                kernel: Arc::new(failing),
                args: Vec::new(),
                global_size: 1,
                local_size: 1,
                event: None,
            })
            .unwrap();

        assert_eq!(worker.finish(), Err(status::OUT_OF_RESOURCES));
        assert_eq!(worker.finish(), Ok(()));
    }

    #[test]
    fn test_panic_is_contained() {
        let worker = worker();
        let panicking = |_: &WorkGroup<'_>| -> Result<(), KernelFault> { panic!("kernel bug") };
        worker
            .submit(Command::Launch {
                name: "panicking".into(),
                kernel: Arc::new(panicking),
                args: Vec::new(),
                global_size: 2,
                local_size: 1,
                event: None,
            })
            .unwrap();

        assert!(worker.finish().is_err());
        assert!(worker.finish().is_ok());
    }

    #[test]
    fn test_event_timestamps() {
        let clock = Clock::new();
        let worker = QueueWorker::spawn("events".into(), None, clock).unwrap();
        let mem = Arc::new(MemObject::new(MemFlags::ReadWrite, &[0u8; 8]));
        let event = EventRecord::new(&clock);
        assert_eq!(event.profiling_info(), Err(status::PROFILING_INFO_NOT_AVAILABLE));

        let mut out = [0u8; 8];
        worker.read(mem, 0, &mut out, Some(event.clone())).unwrap();

        let info = event.profiling_info().unwrap();
        assert!(info.queued <= info.submit);
        assert!(info.submit <= info.start);
        assert!(info.start <= info.end);
    }
}
