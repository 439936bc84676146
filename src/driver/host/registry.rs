//! Host implementations of device kernels.

use crate::driver::status::{self, Status};
use crate::driver::MemFlags;
use crate::util::AlignedBytes;
use bytemuck::Pod;
use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::cell::{RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut, Range};
use std::sync::Arc;

/// Device memory of one buffer.
pub(crate) struct MemObject {
    pub flags: MemFlags,
    pub data: RwLock<AlignedBytes>,
}

impl MemObject {
    pub fn new(flags: MemFlags, host: &[u8]) -> Self {
        Self {
            flags,
            data: RwLock::new(AlignedBytes::from_bytes(host)),
        }
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }
}

/// Kernel argument as captured when a launch is enqueued.
#[derive(Clone)]
pub(crate) enum BoundArg {
    Mem(Arc<MemObject>),
    Scalar(Vec<u8>),
    Local(usize),
}

/// Failure raised by a host kernel body.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KernelFault {
    #[error("argument {0} was never set")]
    MissingArg(u32),

    #[error("argument {index} is not a {expected}")]
    WrongKind { index: u32, expected: &'static str },

    #[error("argument {index} holds {len} bytes, not a whole number of {elem}-byte elements")]
    Misaligned { index: u32, len: usize, elem: usize },

    #[error("argument {0} is a read-only buffer")]
    ReadOnly(u32),

    #[error("argument {0} is already borrowed by this launch")]
    Aliased(u32),

    #[error("index {index} out of bounds for argument {arg} of {len} elements")]
    OutOfBounds { arg: u32, index: usize, len: usize },

    #[error("{0}")]
    Other(String),
}

impl KernelFault {
    /// Status a native driver would report for this failure.
    pub fn status(&self) -> Status {
        match self {
            KernelFault::OutOfBounds { .. } | KernelFault::Other(_) => status::OUT_OF_RESOURCES,
            _ => status::INVALID_KERNEL_ARGS,
        }
    }
}

/// Outcome of one work-group.
pub type KernelResult = Result<(), KernelFault>;

/// Body of a device kernel, run once per work-group.
///
/// Work-items of the group are iterated by the body itself, which is what
/// makes local memory and group-wide reductions expressible.
pub trait HostKernel: Send + Sync {
    fn run(&self, group: &WorkGroup<'_>) -> Result<(), KernelFault>;
}

impl<F> HostKernel for F
where
    F: Fn(&WorkGroup<'_>) -> Result<(), KernelFault> + Send + Sync,
{
    fn run(&self, group: &WorkGroup<'_>) -> Result<(), KernelFault> {
        self(group)
    }
}

/// Kernel bodies by entry point name.
#[derive(Clone, Default)]
pub struct KernelRegistry {
    kernels: HashMap<String, Arc<dyn HostKernel>>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the bundled reference kernels.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        super::builtins::register(&mut registry);
        registry
    }

    /// Registers `kernel` under `name`, replacing any previous body.
    pub fn register<K>(&mut self, name: impl Into<String>, kernel: K)
    where
        K: HostKernel + 'static,
    {
        self.kernels.insert(name.into(), Arc::new(kernel));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn HostKernel>> {
        self.kernels.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kernels.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.kernels.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for KernelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelRegistry")
            .field("kernels", &self.names())
            .finish()
    }
}

/// Buffer borrows held by one launch, by memory object address.
#[derive(Debug, Default)]
struct Claims {
    held: RefCell<Vec<(usize, bool)>>,
}

impl Claims {
    fn holds(&self, addr: usize) -> Option<bool> {
        let held = self.held.borrow();
        let mut found = None;
        for &(a, write) in held.iter() {
            if a == addr {
                found = Some(found.unwrap_or(false) || write);
            }
        }
        found
    }

    fn push(&self, addr: usize, write: bool) {
        self.held.borrow_mut().push((addr, write));
    }

    fn release(&self, addr: usize, write: bool) {
        let mut held = self.held.borrow_mut();
        if let Some(pos) = held.iter().rposition(|&entry| entry == (addr, write)) {
            held.swap_remove(pos);
        }
    }
}

/// Read view of a global buffer, returned by [`WorkGroup::global`].
pub struct GlobalView<'g, T> {
    guard: MappedRwLockReadGuard<'g, [T]>,
    claims: &'g Claims,
    addr: usize,
}

impl<T> Deref for GlobalView<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.guard
    }
}

impl<T> Drop for GlobalView<'_, T> {
    fn drop(&mut self) {
        self.claims.release(self.addr, false);
    }
}

impl<T> fmt::Debug for GlobalView<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalView").field("len", &self.guard.len()).finish()
    }
}

/// Write view of a global buffer, returned by [`WorkGroup::global_mut`].
pub struct GlobalViewMut<'g, T> {
    guard: MappedRwLockWriteGuard<'g, [T]>,
    claims: &'g Claims,
    addr: usize,
}

impl<T> Deref for GlobalViewMut<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.guard
    }
}

impl<T> DerefMut for GlobalViewMut<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.guard
    }
}

impl<T> Drop for GlobalViewMut<'_, T> {
    fn drop(&mut self) {
        self.claims.release(self.addr, true);
    }
}

impl<T> fmt::Debug for GlobalViewMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalViewMut").field("len", &self.guard.len()).finish()
    }
}

/// Execution context of one work-group.
pub struct WorkGroup<'a> {
    group_id: usize,
    local_size: usize,
    global_size: usize,
    args: &'a [BoundArg],
    locals: Vec<Option<RefCell<AlignedBytes>>>,
    claims: Claims,
}

impl fmt::Debug for WorkGroup<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkGroup")
            .field("group_id", &self.group_id)
            .field("local_size", &self.local_size)
            .field("global_size", &self.global_size)
            .field("num_args", &self.args.len())
            .finish()
    }
}

impl<'a> WorkGroup<'a> {
    pub(crate) fn new(group_id: usize, local_size: usize, global_size: usize, args: &'a [BoundArg]) -> Self {
        let locals = args
            .iter()
            .map(|arg| match arg {
                BoundArg::Local(size) => Some(RefCell::new(AlignedBytes::zeroed(*size))),
                _ => None,
            })
            .collect();

        Self {
            group_id,
            local_size,
            global_size,
            args,
            locals,
            claims: Claims::default(),
        }
    }

    pub fn group_id(&self) -> usize {
        self.group_id
    }

    pub fn local_size(&self) -> usize {
        self.local_size
    }

    pub fn global_size(&self) -> usize {
        self.global_size
    }

    pub fn num_groups(&self) -> usize {
        self.global_size / self.local_size
    }

    /// Global id of the work-item with local id `local_id`.
    pub fn global_id(&self, local_id: usize) -> usize {
        self.group_id * self.local_size + local_id
    }

    /// Global ids covered by this group.
    pub fn global_ids(&self) -> Range<usize> {
        let first = self.global_id(0);
        first..first + self.local_size
    }

    fn arg(&self, index: u32) -> Result<&'a BoundArg, KernelFault> {
        self.args
            .get(index as usize)
            .ok_or(KernelFault::MissingArg(index))
    }

    fn mem(&self, index: u32) -> Result<&'a MemObject, KernelFault> {
        match self.arg(index)? {
            BoundArg::Mem(mem) => Ok(mem.as_ref()),
            _ => Err(KernelFault::WrongKind {
                index,
                expected: "buffer",
            }),
        }
    }

    /// Read view of a buffer argument.
    ///
    /// Blocks while a launch on another queue writes the same buffer. Reading
    /// a buffer this launch is writing is [`KernelFault::Aliased`].
    pub fn global<T: Pod>(&self, index: u32) -> Result<GlobalView<'_, T>, KernelFault> {
        let mem = self.mem(index)?;
        let addr = mem as *const MemObject as usize;
        let guard = match self.claims.holds(addr) {
            Some(true) => return Err(KernelFault::Aliased(index)),
            Some(false) => mem.data.read_recursive(),
            None => mem.data.read(),
        };
        let len = guard.len();
        let guard = RwLockReadGuard::try_map(guard, |bytes| bytes.as_slice::<T>()).map_err(|_| {
            KernelFault::Misaligned {
                index,
                len,
                elem: std::mem::size_of::<T>(),
            }
        })?;
        self.claims.push(addr, false);
        Ok(GlobalView {
            guard,
            claims: &self.claims,
            addr,
        })
    }

    /// Write view of a buffer argument. Read-only memory is rejected.
    ///
    /// Blocks while a launch on another queue holds the same buffer. A buffer
    /// already borrowed by this launch is [`KernelFault::Aliased`].
    pub fn global_mut<T: Pod>(&self, index: u32) -> Result<GlobalViewMut<'_, T>, KernelFault> {
        let mem = self.mem(index)?;
        if mem.flags == MemFlags::ReadOnly {
            return Err(KernelFault::ReadOnly(index));
        }
        let addr = mem as *const MemObject as usize;
        if self.claims.holds(addr).is_some() {
            return Err(KernelFault::Aliased(index));
        }
        let guard = mem.data.write();
        let len = guard.len();
        let guard = RwLockWriteGuard::try_map(guard, |bytes| bytes.as_slice_mut::<T>()).map_err(|_| {
            KernelFault::Misaligned {
                index,
                len,
                elem: std::mem::size_of::<T>(),
            }
        })?;
        self.claims.push(addr, true);
        Ok(GlobalViewMut {
            guard,
            claims: &self.claims,
            addr,
        })
    }

    /// Zero-initialised local memory of this group.
    pub fn local_mut<T: Pod>(&self, index: u32) -> Result<RefMut<'_, [T]>, KernelFault> {
        let cell = self
            .locals
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or(KernelFault::WrongKind {
                index,
                expected: "local memory reservation",
            })?;
        let bytes = cell.try_borrow_mut().map_err(|_| KernelFault::Aliased(index))?;
        let len = bytes.len();
        RefMut::filter_map(bytes, |b| b.as_slice_mut::<T>()).map_err(|_| KernelFault::Misaligned {
            index,
            len,
            elem: std::mem::size_of::<T>(),
        })
    }

    /// By-value argument decoded from its bytes.
    pub fn scalar<T: Pod>(&self, index: u32) -> Result<T, KernelFault> {
        match self.arg(index)? {
            BoundArg::Scalar(bytes) if bytes.len() == std::mem::size_of::<T>() => {
                Ok(bytemuck::pod_read_unaligned(bytes))
            }
            BoundArg::Scalar(bytes) => Err(KernelFault::Misaligned {
                index,
                len: bytes.len(),
                elem: std::mem::size_of::<T>(),
            }),
            _ => Err(KernelFault::WrongKind {
                index,
                expected: "scalar",
            }),
        }
    }
}

/// Runs every work-group of one launch in order.
pub(crate) fn execute(
    kernel: &dyn HostKernel,
    args: &[BoundArg],
    global_size: usize,
    local_size: usize,
) -> Result<(), KernelFault> {
    for group_id in 0..global_size / local_size {
        let group = WorkGroup::new(group_id, local_size, global_size, args);
        kernel.run(&group)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem(flags: MemFlags, values: &[f32]) -> BoundArg {
        BoundArg::Mem(Arc::new(MemObject::new(flags, bytemuck::cast_slice(values))))
    }

    #[test]
    fn test_closure_kernel_runs_every_group() {
        let args = vec![mem(MemFlags::ReadWrite, &[0.0; 8])];
        let kernel = |g: &WorkGroup<'_>| -> Result<(), KernelFault> {
            let mut out = g.global_mut::<f32>(0)?;
            for gid in g.global_ids() {
                out[gid] = g.group_id() as f32;
            }
            Ok(())
        };

        execute(&kernel, &args, 8, 2).unwrap();

        let BoundArg::Mem(m) = &args[0] else { unreachable!() };
        let data = m.data.read();
        assert_eq!(data.as_slice::<f32>().unwrap(), &[0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
    }

    #[test]
    fn test_read_only_buffer_rejects_writes() {
        let args = vec![mem(MemFlags::ReadOnly, &[1.0; 4])];
        let group = WorkGroup::new(0, 4, 4, &args);
        assert_eq!(group.global_mut::<f32>(0).unwrap_err(), KernelFault::ReadOnly(0));
        assert!(group.global::<f32>(0).is_ok());
    }

    #[test]
    fn test_aliased_buffer() {
        let shared = mem(MemFlags::ReadWrite, &[1.0; 4]);
        let args = vec![shared.clone(), shared];
        let group = WorkGroup::new(0, 4, 4, &args);
        {
            let _read = group.global::<f32>(0).unwrap();
            assert_eq!(group.global_mut::<f32>(1).unwrap_err(), KernelFault::Aliased(1));
            // Shared reads of one buffer are fine.
            assert!(group.global::<f32>(1).is_ok());
        }
        {
            let _write = group.global_mut::<f32>(0).unwrap();
            assert_eq!(group.global::<f32>(1).unwrap_err(), KernelFault::Aliased(1));
        }
        // Borrows end with their views.
        assert!(group.global_mut::<f32>(1).is_ok());
    }

    #[test]
    fn test_buffer_held_elsewhere_blocks_instead_of_failing() {
        let shared = mem(MemFlags::ReadWrite, &[0.0; 4]);
        let BoundArg::Mem(m) = &shared else { unreachable!() };
        let outside = m.data.write();

        let args = vec![shared.clone()];
        let worker = std::thread::spawn(move || {
            let group = WorkGroup::new(0, 4, 4, &args);
            let mut out = group.global_mut::<f32>(0)?;
            out[0] = 5.0;
            Ok::<(), KernelFault>(())
        });

        std::thread::sleep(std::time::Duration::from_millis(20));
        drop(outside);
        worker.join().unwrap().unwrap();
        assert_eq!(m.data.read().as_slice::<f32>().unwrap()[0], 5.0);
    }

    #[test]
    fn test_local_memory_is_zeroed_per_group() {
        let args = vec![BoundArg::Local(16)];
        let group = WorkGroup::new(0, 4, 8, &args);
        let local = group.local_mut::<f32>(0).unwrap();
        assert_eq!(&*local, &[0.0; 4]);
    }

    #[test]
    fn test_scalar_decoding() {
        let args = vec![BoundArg::Scalar(7u32.to_ne_bytes().to_vec())];
        let group = WorkGroup::new(0, 1, 1, &args);
        assert_eq!(group.scalar::<u32>(0).unwrap(), 7);
        assert!(group.scalar::<u64>(0).is_err());
        assert_eq!(group.scalar::<u32>(3).unwrap_err(), KernelFault::MissingArg(3));
        assert!(format!("{:?}", group).starts_with("WorkGroup { group_id: 0"));
    }

    #[test]
    fn test_registry() {
        let mut registry = KernelRegistry::new();
        assert!(registry.is_empty());
        registry.register("noop", |_: &WorkGroup<'_>| -> Result<(), KernelFault> { Ok(()) });
        assert!(registry.contains("noop"));
        assert!(registry.get("missing").is_none());

        let builtins = KernelRegistry::with_builtins();
        assert_eq!(builtins.names(), vec!["add_numbers", "copy_buffer"]);
    }
}
