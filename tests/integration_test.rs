use nong::driver::status;
use nong::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;

const FILL_SRC: &str = "__kernel void fill(__global uint* out, const uint value) {
    out[get_global_id(0)] = value;
}";

const ADD_ONE_SRC: &str = "__kernel void add_one(__global uint* data) {
    data[get_global_id(0)] += 1;
}";

fn kernel_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("kernels").join(name)
}

fn driver() -> Arc<HostDriver> {
    let driver = Arc::new(HostDriver::with_defaults());

    driver.register_kernel("fill", |group: &WorkGroup<'_>| -> KernelResult {
        let value = group.scalar::<u32>(1)?;
        let mut out = group.global_mut::<u32>(0)?;
        for gid in group.global_ids() {
            if let Some(slot) = out.get_mut(gid) {
                *slot = value;
            }
        }
        Ok(())
    });

    driver.register_kernel("add_one", |group: &WorkGroup<'_>| -> KernelResult {
        let mut data = group.global_mut::<u32>(0)?;
        for gid in group.global_ids() {
            if let Some(slot) = data.get_mut(gid) {
                *slot += 1;
            }
        }
        Ok(())
    });

    driver
}

fn context(profiling: bool) -> Context {
    let directory = DeviceDirectory::init(driver()).unwrap();
    let device = directory.cpu_device().unwrap().clone();
    Context::create(&directory, &device, profiling).unwrap()
}

#[test]
fn test_array_sum_scenario() {
    let mut ctx = context(false);
    let queue = ctx.default_queue();

    let data: Vec<f32> = (0..64).map(|i| i as f32).collect();
    let input = ctx.create_buffer_from_slice(AccessMode::ReadOnly, &data).unwrap();
    let output = ctx
        .create_buffer_from_slice(AccessMode::ReadWrite, &[0.0f32; 8])
        .unwrap();

    let kernel = ctx
        .create_kernel_from_file(kernel_path("add_numbers.cl"), "add_numbers", &BuildOptions::default())
        .unwrap();
    ctx.set_arg(kernel, 0, input).unwrap();
    ctx.set_arg(kernel, 1, KernelArg::local::<f32>(4)).unwrap();
    ctx.set_arg(kernel, 2, output).unwrap();

    ctx.enqueue_kernel(queue, kernel, 8, Some(4)).unwrap();
    let sums = ctx.read_buffer_as::<f32>(queue, output).unwrap();

    assert_eq!(sums[0] + sums[1], 2016.0);
    assert_eq!(sums.iter().sum::<f32>(), 2016.0);
}

#[test]
fn test_copy_round_trip() {
    let mut ctx = context(false);
    let queue = ctx.default_queue();

    let pattern: Vec<u8> = (0..1000u32).map(|i| (i * 31 % 251) as u8).collect();
    let input = ctx.create_buffer(AccessMode::ReadWrite, pattern.len()).unwrap();
    let output = ctx.create_buffer(AccessMode::ReadWrite, pattern.len()).unwrap();

    let kernel = ctx
        .create_kernel_from_file(kernel_path("copy_buffer.cl"), "copy_buffer", &BuildOptions::default())
        .unwrap();
    ctx.set_arg(kernel, 0, input).unwrap();
    ctx.set_arg(kernel, 1, output).unwrap();
    ctx.set_arg(kernel, 2, pattern.len() as u32).unwrap();

    ctx.copy_from_host(queue, input, &pattern).unwrap();
    ctx.enqueue_kernel(queue, kernel, 64, None).unwrap();

    assert_eq!(ctx.read_buffer(queue, output).unwrap(), &pattern[..]);
}

#[test]
fn test_read_only_buffer_never_written() {
    let mut ctx = context(false);
    let queue = ctx.default_queue();

    let kernel = ctx
        .create_kernel_from_source(FILL_SRC, "fill", &BuildOptions::default())
        .unwrap();
    let frozen = ctx
        .create_buffer_from_slice(AccessMode::ReadOnly, &[5u32; 4])
        .unwrap();

    let err = ctx.set_arg(kernel, 0, frozen).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Binding);

    ctx.set_arg(kernel, 1, 9u32).unwrap();
    let err = ctx.enqueue_kernel(queue, kernel, 4, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Launch);
    assert_eq!(err.status(), Some(status::INVALID_KERNEL_ARGS));

    assert_eq!(ctx.read_buffer_as::<u32>(queue, frozen).unwrap(), &[5, 5, 5, 5]);
}

#[test]
fn test_read_only_memory_fault_surfaces_on_flush() {
    let driver = driver();
    // Declares the output const, so binding succeeds and the write faults.
    driver.register_kernel("sneaky", |group: &WorkGroup<'_>| -> KernelResult {
        let mut out = group.global_mut::<u32>(0)?;
        out[0] = 1;
        Ok(())
    });

    let directory = DeviceDirectory::init(driver).unwrap();
    let device = directory.cpu_device().unwrap().clone();
    let mut ctx = Context::create(&directory, &device, false).unwrap();
    let queue = ctx.default_queue();

    let kernel = ctx
        .create_kernel_from_source(
            "__kernel void sneaky(__global const uint* out) {}",
            "sneaky",
            &BuildOptions::default(),
        )
        .unwrap();
    let frozen = ctx.create_buffer_from_slice(AccessMode::ReadOnly, &[0u32; 4]).unwrap();
    ctx.set_arg(kernel, 0, frozen).unwrap();
    ctx.enqueue_kernel(queue, kernel, 1, None).unwrap();

    let err = ctx.flush(queue).unwrap_err();
    assert_eq!(err.status(), Some(status::INVALID_KERNEL_ARGS));

    // Reported once; the buffer is untouched.
    ctx.flush(queue).unwrap();
    assert_eq!(ctx.read_buffer_as::<u32>(queue, frozen).unwrap(), &[0, 0, 0, 0]);
}

#[test]
fn test_program_cache_ignores_build_options() {
    let mut ctx = context(false);
    let path = kernel_path("add_numbers.cl");

    let first = ctx.create_program_from_file(&path, &BuildOptions::default()).unwrap();
    let relaxed = BuildOptions::default()
        .warnings_as_errors(false)
        .disable_optimizations(true);
    let second = ctx.create_program_from_file(&path, &relaxed).unwrap();

    assert_eq!(first, second);
    assert_eq!(ctx.num_programs(), 1);
    assert_eq!(ctx.program(second).unwrap().options(), &BuildOptions::default());
    assert_eq!(ctx.program(first).unwrap().key(), &nong::ProgramKey::from_path(&path));
}

#[test]
fn test_create_program_uses_configured_options() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gl.cl");
    std::fs::write(
        &path,
        "#pragma OPENCL EXTENSION cl_khr_gl_sharing : enable\n__kernel void fill(__global uint* out, const uint value) {}\n",
    )
    .unwrap();

    let directory = DeviceDirectory::init(driver()).unwrap();
    let device = directory.cpu_device().unwrap().clone();

    // Warnings are errors by default.
    let mut strict = Context::create(&directory, &device, false).unwrap();
    let err = strict.create_program(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Compile);
    assert!(err.build_log().unwrap().contains("[-Werror]"));

    let config = ContextConfig::builder()
        .build_options(BuildOptions::default().warnings_as_errors(false))
        .build()
        .unwrap();
    let mut relaxed = Context::with_config(&directory, &device, config).unwrap();
    let program = relaxed.create_program(&path).unwrap();
    let program = relaxed.program(program).unwrap();
    assert!(!program.options().warnings_as_errors);
    assert!(program.build_log().contains("warning: unsupported OpenCL extension"));
}

#[test]
fn test_last_binding_wins() {
    let mut ctx = context(false);
    let queue = ctx.default_queue();

    let kernel = ctx
        .create_kernel_from_source(FILL_SRC, "fill", &BuildOptions::default())
        .unwrap();
    let a = ctx.create_buffer(AccessMode::ReadWrite, 16).unwrap();
    let b = ctx.create_buffer(AccessMode::ReadWrite, 16).unwrap();

    ctx.set_arg(kernel, 1, 1u32).unwrap();
    ctx.set_arg(kernel, 0, a).unwrap();
    ctx.set_arg(kernel, 1, 2u32).unwrap();
    ctx.set_arg(kernel, 0, b).unwrap();
    ctx.set_arg(kernel, 1, 3u32).unwrap();
    // Rejected, slot 1 keeps 3.
    assert!(ctx.set_arg(kernel, 1, 4u8).is_err());

    ctx.enqueue_kernel(queue, kernel, 4, None).unwrap();
    assert_eq!(ctx.read_buffer_as::<u32>(queue, a).unwrap(), &[0, 0, 0, 0]);
    assert_eq!(ctx.read_buffer_as::<u32>(queue, b).unwrap(), &[3, 3, 3, 3]);

    // Bindings persist across launches.
    ctx.set_arg(kernel, 0, a).unwrap();
    ctx.enqueue_kernel(queue, kernel, 4, None).unwrap();
    assert_eq!(ctx.read_buffer_as::<u32>(queue, a).unwrap(), &[3, 3, 3, 3]);
}

#[test]
fn test_fifo_within_queue() {
    let mut ctx = context(false);
    let queue = ctx.default_queue();

    let kernel = ctx
        .create_kernel_from_source(ADD_ONE_SRC, "add_one", &BuildOptions::default())
        .unwrap();
    let data = ctx.create_buffer(AccessMode::ReadWrite, 8 * 4).unwrap();
    ctx.set_arg(kernel, 0, data).unwrap();

    for _ in 0..3 {
        ctx.enqueue_kernel(queue, kernel, 8, None).unwrap();
    }
    ctx.copy_from_host(queue, data, bytemuck::cast_slice(&[10u32; 8])).unwrap();
    ctx.enqueue_kernel(queue, kernel, 8, Some(2)).unwrap();

    assert_eq!(ctx.read_buffer_as::<u32>(queue, data).unwrap(), &[11; 8]);
}

#[test]
fn test_buffer_contents_visible_without_rebinding() {
    let mut ctx = context(false);
    let queue = ctx.default_queue();

    let kernel = ctx
        .create_kernel_from_source(ADD_ONE_SRC, "add_one", &BuildOptions::default())
        .unwrap();
    let data = ctx.create_buffer(AccessMode::ReadWrite, 4 * 4).unwrap();
    ctx.set_arg(kernel, 0, data).unwrap();

    ctx.copy_from_host(queue, data, bytemuck::cast_slice(&[100u32; 4])).unwrap();
    ctx.flush(queue).unwrap();
    ctx.enqueue_kernel(queue, kernel, 4, None).unwrap();
    assert_eq!(ctx.read_buffer_as::<u32>(queue, data).unwrap(), &[101; 4]);
}

#[test]
fn test_second_queue_shares_profiling() {
    let mut ctx = context(true);
    let extra = ctx.create_command_queue().unwrap();
    assert_ne!(extra, ctx.default_queue());
    assert!(ctx.queue(extra).unwrap().is_profiling());

    let data = ctx.create_buffer(AccessMode::ReadWrite, 64).unwrap();
    ctx.copy_from_host(extra, data, &[1u8; 64]).unwrap();
    ctx.flush(extra).unwrap();
    ctx.flush_all().unwrap();

    assert_eq!(ctx.read_buffer(ctx.default_queue(), data).unwrap(), &[1u8; 64][..]);
}

#[test]
fn test_queues_sharing_a_buffer_serialize() {
    let mut ctx = context(false);
    let kernel = ctx
        .create_kernel_from_file(kernel_path("copy_buffer.cl"), "copy_buffer", &BuildOptions::default())
        .unwrap();

    let pattern: Vec<u8> = (0..4096).map(|i| (i % 251) as u8).collect();
    let input = ctx.create_buffer_from_mem(AccessMode::ReadOnly, &pattern).unwrap();
    let output = ctx.create_buffer(AccessMode::WriteOnly, pattern.len()).unwrap();
    ctx.set_arg(kernel, 0, input).unwrap();
    ctx.set_arg(kernel, 1, output).unwrap();
    ctx.set_arg(kernel, 2, pattern.len() as u32).unwrap();

    let queues: Vec<QueueId> = (0..4).map(|_| ctx.create_command_queue().unwrap()).collect();
    for _ in 0..25 {
        for queue in &queues {
            ctx.enqueue_kernel(*queue, kernel, 64, None).unwrap();
        }
    }
    ctx.flush_all().unwrap();

    assert_eq!(ctx.read_buffer(queues[0], output).unwrap(), &pattern[..]);
}

#[test]
fn test_syntax_error_returns_build_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.cl");
    std::fs::write(&path, "__kernel void broken(__global float* x) {\n    x[0] = 1.0f;\n").unwrap();

    let mut ctx = context(false);
    let err = ctx
        .create_program_from_file(&path, &BuildOptions::default())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Compile);
    assert_eq!(err.status(), Some(status::BUILD_PROGRAM_FAILURE));
    let log = err.build_log().unwrap();
    assert!(!log.is_empty());
    assert!(log.contains("error"));
    assert_eq!(ctx.num_programs(), 0);

    // No cache entry was left behind, so a fixed file builds.
    std::fs::write(&path, FILL_SRC).unwrap();
    let program = ctx.create_program_from_file(&path, &BuildOptions::default()).unwrap();
    assert!(ctx.create_kernel(program, "fill").is_ok());
}

#[test]
fn test_truncated_kernel_declaration_is_compile_error() {
    let mut ctx = context(false);

    for source in ["__kernel void foo", "__kernel void foo(", "kernel void foo(__global int* x"] {
        let err = ctx
            .create_program_from_source(source, &BuildOptions::default(), Some("truncated.cl"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Compile);
        assert!(!err.build_log().unwrap().is_empty());
    }
    assert_eq!(ctx.num_programs(), 0);
}

#[test]
fn test_missing_source_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(false);
    let err = ctx
        .create_program_from_file(dir.path().join("absent.cl"), &BuildOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn test_profiling_scenario() {
    let mut ctx = context(true);
    let queue = ctx.default_queue();

    let data: Vec<f32> = (0..64).map(|i| i as f32).collect();
    let input = ctx.create_buffer_from_slice(AccessMode::ReadOnly, &data).unwrap();
    let output = ctx.create_buffer(AccessMode::WriteOnly, 2 * 4).unwrap();

    let kernel = ctx
        .create_kernel_from_file(kernel_path("add_numbers.cl"), "add_numbers", &BuildOptions::default())
        .unwrap();
    ctx.set_arg(kernel, 0, input).unwrap();
    ctx.set_local_arg(kernel, 1, 4 * 4).unwrap();
    ctx.set_arg(kernel, 2, output).unwrap();

    ctx.enqueue_kernel(queue, kernel, 8, Some(4)).unwrap();
    ctx.read_buffer(queue, output).unwrap();

    let report = ctx.events_profile(queue).unwrap();
    assert_eq!(report.len(), 2);
    assert_eq!(report.entries()[0].label, "add_numbers");
    assert_eq!(report.entries()[1].label, "BufferRead");
    for entry in report.entries() {
        assert!(entry.start <= entry.end);
        assert!(entry.queued <= entry.start);
    }
    assert!(!report.to_string().is_empty());
}

#[test]
fn test_profiling_labels() {
    let mut ctx = context(true);
    let queue = ctx.default_queue();

    let kernel = ctx
        .create_kernel_from_source(FILL_SRC, "fill", &BuildOptions::default())
        .unwrap();
    let out = ctx.create_buffer(AccessMode::ReadWrite, 16).unwrap();
    ctx.set_arg(kernel, 0, out).unwrap();
    ctx.set_arg(kernel, 1, 7u32).unwrap();

    ctx.copy_from_host(queue, out, &[0u8; 16]).unwrap();
    ctx.enqueue_kernel_labeled(queue, kernel, 4, None, "fill sevens").unwrap();
    let mut host = [0u8; 16];
    ctx.copy_to_host(queue, out, &mut host).unwrap();

    let labels: Vec<String> = ctx
        .events_profile(queue)
        .unwrap()
        .entries()
        .iter()
        .map(|e| e.label.clone())
        .collect();
    assert_eq!(labels, vec!["BufferCopyFromHost", "fill sevens", "BufferCopyToHost"]);
    assert_eq!(&host[..4], &7u32.to_ne_bytes());
    assert_eq!(ctx.buffer(out).unwrap().host_slice::<u32>().unwrap(), &[7, 7, 7, 7]);
}

#[test]
fn test_profile_empty_without_profiling() {
    let mut ctx = context(false);
    let queue = ctx.default_queue();
    let out = ctx.create_buffer(AccessMode::ReadWrite, 16).unwrap();
    ctx.read_buffer(queue, out).unwrap();
    assert!(ctx.events_profile(queue).unwrap().is_empty());
}

#[test]
fn test_launch_validation() {
    let mut ctx = context(false);
    let queue = ctx.default_queue();

    let kernel = ctx
        .create_kernel_from_source(FILL_SRC, "fill", &BuildOptions::default())
        .unwrap();
    let out = ctx.create_buffer(AccessMode::ReadWrite, 4 * 4096).unwrap();
    ctx.set_arg(kernel, 0, out).unwrap();
    ctx.set_arg(kernel, 1, 1u32).unwrap();

    let err = ctx.enqueue_kernel(queue, kernel, 0, None).unwrap_err();
    assert_eq!(err.status(), Some(status::INVALID_GLOBAL_WORK_SIZE));

    let err = ctx.enqueue_kernel(queue, kernel, 12, Some(5)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Launch);
    assert_eq!(err.status(), Some(status::INVALID_WORK_GROUP_SIZE));

    let limit = ctx.kernel(kernel).unwrap().max_work_group_size();
    let err = ctx.enqueue_kernel(queue, kernel, 4 * limit, Some(2 * limit)).unwrap_err();
    assert_eq!(err.status(), Some(status::INVALID_WORK_GROUP_SIZE));

    ctx.flush(queue).unwrap();
}

#[test]
fn test_allocation_exhaustion() {
    let config = HostConfig::builder()
        .device(HostDeviceSpec::gpu("Tiny", "Advanced Micro Devices, Inc.").with_global_mem_size(1024))
        .build()
        .unwrap();
    let directory = DeviceDirectory::init(Arc::new(HostDriver::new(config).unwrap())).unwrap();
    let device = directory.default_device().unwrap().clone();
    assert!(device.is_gpu());
    let mut ctx = Context::create(&directory, &device, false).unwrap();

    ctx.create_buffer(AccessMode::ReadWrite, 600).unwrap();
    let err = ctx.create_buffer(AccessMode::ReadWrite, 600).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhaustion);

    let err = ctx.create_buffer(AccessMode::ReadWrite, 4096).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transfer);
    assert_eq!(err.status(), Some(status::INVALID_BUFFER_SIZE));
}

#[test]
fn test_panicking_kernel_is_reported() {
    let driver = driver();
    driver.register_kernel("explode", |_group: &WorkGroup<'_>| -> KernelResult {
        panic!("kernel bug");
    });
    let directory = DeviceDirectory::init(driver).unwrap();
    let device = directory.cpu_device().unwrap().clone();
    let mut ctx = Context::create(&directory, &device, false).unwrap();
    let queue = ctx.default_queue();

    let kernel = ctx
        .create_kernel_from_source("__kernel void explode() {}", "explode", &BuildOptions::default())
        .unwrap();
    ctx.enqueue_kernel(queue, kernel, 1, None).unwrap();

    let err = ctx.flush(queue).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhaustion);
    ctx.flush(queue).unwrap();
}

#[cfg(feature = "telemetry")]
#[test]
fn test_queue_metrics() {
    let mut ctx = context(false);
    let queue = ctx.default_queue();

    let kernel = ctx
        .create_kernel_from_source(FILL_SRC, "fill", &BuildOptions::default())
        .unwrap();
    let out = ctx.create_buffer(AccessMode::ReadWrite, 16).unwrap();
    ctx.set_arg(kernel, 0, out).unwrap();
    ctx.set_arg(kernel, 1, 1u32).unwrap();

    ctx.copy_from_host(queue, out, &[0u8; 8]).unwrap();
    ctx.enqueue_kernel(queue, kernel, 4, None).unwrap();
    ctx.read_buffer(queue, out).unwrap();
    ctx.flush(queue).unwrap();

    let metrics = ctx.queue_metrics(queue).unwrap();
    assert_eq!(metrics.kernel_launches, 1);
    assert_eq!(metrics.transfers, 2);
    assert_eq!(metrics.bytes_to_device, 8);
    assert_eq!(metrics.bytes_from_device, 16);
    assert_eq!(metrics.flushes, 1);
}
