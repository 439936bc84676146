//! Host bodies of the reference kernels shipped in `kernels/`.

use super::registry::{KernelFault, KernelRegistry, KernelResult, WorkGroup};

/// Elements summed by one `add_numbers` work-item.
pub const ADD_NUMBERS_SPAN: usize = 8;

pub fn register(registry: &mut KernelRegistry) {
    registry.register("add_numbers", add_numbers);
    registry.register("copy_buffer", copy_buffer);
}

/// `add_numbers(__global const float* input, __local float* scratch, __global float* group_sums)`
///
/// Each work-item sums [`ADD_NUMBERS_SPAN`] consecutive inputs into its
/// scratch slot; the group total lands in `group_sums[group_id]`.
pub fn add_numbers(group: &WorkGroup<'_>) -> KernelResult {
    let input = group.global::<f32>(0)?;
    let mut scratch = group.local_mut::<f32>(1)?;

    for local_id in 0..group.local_size() {
        let start = group.global_id(local_id) * ADD_NUMBERS_SPAN;
        let chunk = input
            .get(start..start + ADD_NUMBERS_SPAN)
            .ok_or(KernelFault::OutOfBounds {
                arg: 0,
                index: start + ADD_NUMBERS_SPAN - 1,
                len: input.len(),
            })?;

        let len = scratch.len();
        let slot = scratch.get_mut(local_id).ok_or(KernelFault::OutOfBounds {
            arg: 1,
            index: local_id,
            len,
        })?;
        *slot = chunk.iter().sum();
    }

    // barrier(CLK_LOCAL_MEM_FENCE)
    let total: f32 = scratch.iter().take(group.local_size()).sum();

    let mut sums = group.global_mut::<f32>(2)?;
    let len = sums.len();
    let slot = sums.get_mut(group.group_id()).ok_or(KernelFault::OutOfBounds {
        arg: 2,
        index: group.group_id(),
        len,
    })?;
    *slot = total;
    Ok(())
}

/// `copy_buffer(__global const uchar* input, __global uchar* output, const uint length)`
///
/// Work-item `i` copies bytes `i, i + global_size, ...` below `length`.
pub fn copy_buffer(group: &WorkGroup<'_>) -> KernelResult {
    let length = group.scalar::<u32>(2)? as usize;
    let input = group.global::<u8>(0)?;
    let mut output = group.global_mut::<u8>(1)?;

    if length > input.len() {
        return Err(KernelFault::OutOfBounds {
            arg: 0,
            index: length - 1,
            len: input.len(),
        });
    }
    if length > output.len() {
        return Err(KernelFault::OutOfBounds {
            arg: 1,
            index: length - 1,
            len: output.len(),
        });
    }

    for gid in group.global_ids() {
        for i in (gid..length).step_by(group.global_size()) {
            output[i] = input[i];
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::host::registry::{execute, BoundArg, MemObject};
    use crate::driver::MemFlags;
    use std::sync::Arc;

    fn buffer(flags: MemFlags, bytes: &[u8]) -> Arc<MemObject> {
        Arc::new(MemObject::new(flags, bytes))
    }

    #[test]
    fn test_add_numbers_reduces_per_group() {
        let data: Vec<f32> = (0..64).map(|i| i as f32).collect();
        let input = buffer(MemFlags::ReadOnly, bytemuck::cast_slice(&data));
        let sums = buffer(MemFlags::ReadWrite, bytemuck::cast_slice(&[0.0f32; 4]));
        let args = vec![
            BoundArg::Mem(input),
            BoundArg::Local(4 * std::mem::size_of::<f32>()),
            BoundArg::Mem(sums.clone()),
        ];

        execute(&add_numbers, &args, 8, 4).unwrap();

        let out = sums.data.read();
        let out = out.as_slice::<f32>().unwrap();
        assert_eq!(out[0], (0..32).sum::<i32>() as f32);
        assert_eq!(out[1], (32..64).sum::<i32>() as f32);
        assert_eq!(out.iter().sum::<f32>(), 2016.0);
    }

    #[test]
    fn test_add_numbers_rejects_read_only_output() {
        let data = [1.0f32; 16];
        let input = buffer(MemFlags::ReadOnly, bytemuck::cast_slice(&data));
        let sums = buffer(MemFlags::ReadOnly, bytemuck::cast_slice(&[0.0f32; 2]));
        let args = vec![BoundArg::Mem(input), BoundArg::Local(8), BoundArg::Mem(sums)];

        let fault = execute(&add_numbers, &args, 2, 2).unwrap_err();
        assert_eq!(fault, KernelFault::ReadOnly(2));
    }

    #[test]
    fn test_copy_buffer_strided() {
        let pattern: Vec<u8> = (0..=255).collect();
        let input = buffer(MemFlags::ReadOnly, &pattern);
        let output = buffer(MemFlags::ReadWrite, &[0u8; 256]);
        let args = vec![
            BoundArg::Mem(input),
            BoundArg::Mem(output.clone()),
            BoundArg::Scalar(256u32.to_ne_bytes().to_vec()),
        ];

        execute(&copy_buffer, &args, 6, 3).unwrap();
        assert_eq!(output.data.read().as_bytes(), &pattern[..]);
    }

    #[test]
    fn test_copy_buffer_length_checked() {
        let args = vec![
            BoundArg::Mem(buffer(MemFlags::ReadOnly, &[1u8; 4])),
            BoundArg::Mem(buffer(MemFlags::ReadWrite, &[0u8; 4])),
            BoundArg::Scalar(8u32.to_ne_bytes().to_vec()),
        ];
        let fault = execute(&copy_buffer, &args, 1, 1).unwrap_err();
        assert!(matches!(fault, KernelFault::OutOfBounds { arg: 0, .. }));
    }
}
