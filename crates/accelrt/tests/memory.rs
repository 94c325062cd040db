//! Integration tests for pooled device memory, pinned host memory and
//! stream-ordered copies.

use accelrt::prelude::*;

fn runtime() -> Runtime {
    Runtime::sim(SimConfig::minimal())
}

fn alloc(rt: &Runtime, bytes: u64) -> DevicePtr {
    rt.alloc_async(bytes)
        .expect("alloc_async failed")
        .ptr()
        .expect("unexpected out-of-memory")
}

#[test]
fn test_allocations_within_free_memory_succeed() {
    let rt = runtime();
    let info = rt.mem_info().unwrap();
    assert_eq!(info.free_bytes, info.total_bytes);

    let sizes = [1u64, 255, 256, 4096, 1 << 20];
    let mut ptrs = Vec::new();
    for &size in &sizes {
        let ptr = alloc(&rt, size);
        assert!(!ptr.is_null());
        ptrs.push(ptr);
    }

    let after = rt.mem_info().unwrap();
    assert!(after.free_bytes < info.free_bytes);

    for ptr in ptrs {
        rt.free_async(ptr).unwrap();
    }
    rt.synchronize_device().unwrap();
}

#[test]
fn test_oversized_request_reports_out_of_memory() {
    let rt = runtime();
    let outcome = rt.alloc_async(1 << 40).unwrap();
    assert!(outcome.is_out_of_memory());
    assert_eq!(outcome.into_raw(), 0);

    // The pool is still usable afterwards.
    let ptr = alloc(&rt, 512);
    rt.free_async(ptr).unwrap();
    rt.synchronize_device().unwrap();
}

#[test]
fn test_request_within_free_but_beyond_host_is_out_of_memory() {
    let config = SimConfig {
        total_memory_bytes: 1 << 62,
        ..SimConfig::minimal()
    };
    let rt = Runtime::sim(config);
    let info = rt.mem_info().unwrap();
    assert!(1 << 61 <= info.free_bytes);

    let outcome = rt.alloc_async(1 << 61).unwrap();
    assert!(outcome.is_out_of_memory());
    assert_eq!(rt.mem_info().unwrap().free_bytes, info.free_bytes);

    let ptr = alloc(&rt, 4096);
    rt.free_async(ptr).unwrap();
    rt.synchronize_device().unwrap();
}

#[test]
fn test_free_sync_trim_returns_all_memory() {
    let rt = runtime();
    let before = rt.mem_info().unwrap();

    for _ in 0..8 {
        let ptr = alloc(&rt, 64 * 1024);
        rt.memset_async(ptr, 64 * 1024, 0xab).unwrap();
        rt.free_async(ptr).unwrap();
    }
    rt.synchronize_device().unwrap();
    rt.trim_pool(0).unwrap();

    let after = rt.mem_info().unwrap();
    assert_eq!(after.free_bytes, before.free_bytes);
}

#[test]
fn test_host_device_round_trip() {
    let rt = runtime();
    let data: Vec<u8> = (0..1024u32).map(|i| (i * 7 % 251) as u8).collect();

    let h_src = rt.alloc_pinned_host(1024).unwrap();
    let h_dst = rt.alloc_pinned_host(1024).unwrap();
    let d = alloc(&rt, 1024);

    rt.write_host(h_src, &data).unwrap();
    rt.memcpy_async(h_src.as_raw(), d.as_raw(), 1024, MemcpyKind::HostToDevice)
        .unwrap();
    rt.memcpy_async(d.as_raw(), h_dst.as_raw(), 1024, MemcpyKind::DeviceToHost)
        .unwrap();
    rt.synchronize_device().unwrap();

    let mut out = vec![0u8; 1024];
    rt.read_host(h_dst, &mut out).unwrap();
    assert_eq!(out, data);

    rt.free_async(d).unwrap();
    rt.free_pinned_host(h_src).unwrap();
    rt.free_pinned_host(h_dst).unwrap();
}

#[test]
fn test_memset_then_readback() {
    let rt = runtime();
    let d = alloc(&rt, 300);
    let host = rt.alloc_pinned_host(300).unwrap();

    rt.memset_async(d, 300, 0x5a).unwrap();
    rt.memcpy_async(d.as_raw(), host.as_raw(), 300, MemcpyKind::DeviceToHost)
        .unwrap();
    rt.synchronize_device().unwrap();

    let mut out = vec![0u8; 300];
    rt.read_host(host, &mut out).unwrap();
    assert!(out.iter().all(|&b| b == 0x5a));
}

#[test]
fn test_partial_memset_leaves_tail() {
    let rt = runtime();
    let d = alloc(&rt, 256);
    let host = rt.alloc_pinned_host(256).unwrap();

    rt.memset_async(d, 256, 0).unwrap();
    rt.memset_async(d, 100, 0xff).unwrap();
    rt.memcpy_async(d.as_raw(), host.as_raw(), 256, MemcpyKind::DeviceToHost)
        .unwrap();
    rt.synchronize_device().unwrap();

    let mut out = vec![0u8; 256];
    rt.read_host(host, &mut out).unwrap();
    assert!(out[..100].iter().all(|&b| b == 0xff));
    assert!(out[100..].iter().all(|&b| b == 0));
}

#[test]
fn test_copy_past_allocation_is_rejected() {
    let rt = runtime();
    let d = alloc(&rt, 256);
    let host = rt.alloc_pinned_host(512).unwrap();

    let err = rt
        .memcpy_async(host.as_raw(), d.as_raw(), 512, MemcpyKind::HostToDevice)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transfer);
}

#[test]
fn test_work_on_separate_streams() {
    let rt = runtime();
    let stream = rt.create_stream().unwrap();
    let d = alloc(&rt, 256);
    let host = rt.alloc_pinned_host(256).unwrap();

    rt.memset_async_on(d, 256, 3, stream).unwrap();
    rt.synchronize_stream(stream).unwrap();
    rt.memcpy_async(d.as_raw(), host.as_raw(), 256, MemcpyKind::DeviceToHost)
        .unwrap();
    rt.synchronize_device().unwrap();

    let mut out = vec![0u8; 256];
    rt.read_host(host, &mut out).unwrap();
    assert!(out.iter().all(|&b| b == 3));

    rt.destroy_stream(stream).unwrap();
    let err = rt.synchronize_stream(stream).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Stream);
}
