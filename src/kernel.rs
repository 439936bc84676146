//! Kernel entry points and their argument bindings.

use crate::arena::{BufferId, ProgramId};
use crate::driver::{ArgInfo, KernelHandle};
use bytemuck::Pod;
use std::fmt;

/// A value bound to one kernel argument slot.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelArg {
    /// Device buffer, bound by reference.
    Buffer(BufferId),
    /// By-value argument in native byte order.
    Scalar(Vec<u8>),
    /// Local memory reservation in bytes.
    Local(usize),
}

impl KernelArg {
    pub fn scalar<T: Pod>(value: T) -> Self {
        KernelArg::Scalar(bytemuck::bytes_of(&value).to_vec())
    }

    /// Local memory for `count` elements of `T`.
    pub fn local<T: Pod>(count: usize) -> Self {
        KernelArg::Local(count * std::mem::size_of::<T>())
    }
}

impl From<BufferId> for KernelArg {
    fn from(id: BufferId) -> Self {
        KernelArg::Buffer(id)
    }
}

macro_rules! scalar_arg {
    ($($t:ty),*) => {
        $(
            impl From<$t> for KernelArg {
                fn from(value: $t) -> Self {
                    KernelArg::scalar(value)
                }
            }

            impl<const N: usize> From<[$t; N]> for KernelArg
            where
                [$t; N]: Pod,
            {
                fn from(value: [$t; N]) -> Self {
                    KernelArg::scalar(value)
                }
            }
        )*
    };
}

scalar_arg!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

/// A resolved kernel and its current argument table.
///
/// Bindings persist across launches; each launch uses the last value
/// successfully bound to every slot.
pub struct Kernel {
    handle: KernelHandle,
    name: String,
    program: ProgramId,
    max_work_group_size: usize,
    arg_info: Option<Vec<ArgInfo>>,
    bindings: Vec<Option<KernelArg>>,
}

impl Kernel {
    pub(crate) fn new(
        handle: KernelHandle,
        name: String,
        program: ProgramId,
        max_work_group_size: usize,
        num_args: u32,
        arg_info: Option<Vec<ArgInfo>>,
    ) -> Self {
        Self {
            handle,
            name,
            program,
            max_work_group_size,
            arg_info,
            bindings: vec![None; num_args as usize],
        }
    }

    pub(crate) fn handle(&self) -> KernelHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Program the kernel was resolved from.
    pub fn program(&self) -> ProgramId {
        self.program
    }

    /// Device-reported work-group limit for this kernel.
    pub fn max_work_group_size(&self) -> usize {
        self.max_work_group_size
    }

    pub fn num_args(&self) -> u32 {
        self.bindings.len() as u32
    }

    /// Parameter description, when the driver reports it.
    pub fn arg_info(&self, index: u32) -> Option<&ArgInfo> {
        self.arg_info.as_ref()?.get(index as usize)
    }

    /// Value currently bound to slot `index`.
    pub fn binding(&self, index: u32) -> Option<&KernelArg> {
        self.bindings.get(index as usize)?.as_ref()
    }

    /// Whether every slot has a value.
    pub fn is_fully_bound(&self) -> bool {
        self.bindings.iter().all(Option::is_some)
    }

    pub(crate) fn store_binding(&mut self, index: u32, arg: KernelArg) {
        if let Some(slot) = self.bindings.get_mut(index as usize) {
            *slot = Some(arg);
        }
    }

    pub fn describe(&self, detail: bool) -> String {
        let mut out = format!("Kernel '{}'", self.name);
        if detail {
            out.push_str(&format!("\n  MaxWorkGroupSize: {}", self.max_work_group_size));
        }
        out
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("name", &self.name)
            .field("program", &self.program)
            .field("max_work_group_size", &self.max_work_group_size)
            .field("bindings", &self.bindings)
            .finish()
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaId;

    fn kernel(num_args: u32) -> Kernel {
        Kernel::new(
            KernelHandle(3),
            "add_numbers".into(),
            ProgramId::from_parts(1, 0),
            64,
            num_args,
            None,
        )
    }

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(KernelArg::from(7u32), KernelArg::Scalar(7u32.to_ne_bytes().to_vec()));
        assert_eq!(KernelArg::from([1.0f32, 2.0]), KernelArg::Scalar(bytemuck::cast_slice(&[1.0f32, 2.0]).to_vec()));
        assert_eq!(KernelArg::local::<f32>(8), KernelArg::Local(32));
    }

    #[test]
    fn test_last_binding_wins() {
        let mut k = kernel(2);
        assert!(!k.is_fully_bound());

        k.store_binding(0, KernelArg::from(1u32));
        k.store_binding(1, KernelArg::Local(16));
        k.store_binding(0, KernelArg::from(2u32));

        assert_eq!(k.binding(0), Some(&KernelArg::from(2u32)));
        assert_eq!(k.binding(1), Some(&KernelArg::Local(16)));
        assert!(k.is_fully_bound());
        assert_eq!(k.binding(5), None);
    }

    #[test]
    fn test_describe() {
        let k = kernel(3);
        assert_eq!(k.to_string(), "Kernel 'add_numbers'");
        assert_eq!(k.describe(true), "Kernel 'add_numbers'\n  MaxWorkGroupSize: 64");
        assert_eq!(k.num_args(), 3);
    }
}
