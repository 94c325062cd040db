//! Integration tests for the flat C ABI over the process-wide runtime.

use accelrt::ffi::*;
use accelrt::prelude::*;

fn setup() {
    // Tests share one process; only the first install wins.
    let _ = accelrt::install(Runtime::sim(SimConfig::minimal()));
    assert!(accelrt::is_installed());
}

#[test]
fn test_mem_info_through_abi() {
    setup();
    let mut free = 0u64;
    let mut total = 0u64;
    let rc = unsafe { accelrt_mem_info(&mut free, &mut total) };
    assert_eq!(rc, 0);
    assert_eq!(total, 16 << 20);
    assert!(free <= total);

    let rc = unsafe { accelrt_mem_info(std::ptr::null_mut(), &mut total) };
    assert_eq!(rc, ErrorKind::DeviceQuery.code());
    assert_eq!(accelrt_get_last_error(), rc);
}

#[test]
fn test_round_trip_through_abi() {
    setup();
    let data: Vec<u8> = (0..512u32).map(|i| (i % 256) as u8).collect();

    let d = accelrt_malloc_async(512);
    assert_ne!(d, 0);
    let h_src = accelrt_malloc_host(512);
    let h_dst = accelrt_malloc_host(512);
    assert_ne!(h_src, 0);
    assert_ne!(h_dst, 0);

    assert_eq!(unsafe { accelrt_host_write(h_src, data.as_ptr(), data.len()) }, 0);
    assert_eq!(accelrt_memcpy_async(h_src, d, 512, 1), 0);
    assert_eq!(accelrt_memcpy_async(d, h_dst, 512, 2), 0);
    assert_eq!(accelrt_device_synchronize(), 0);

    let mut out = vec![0u8; 512];
    assert_eq!(unsafe { accelrt_host_read(h_dst, out.as_mut_ptr(), out.len()) }, 0);
    assert_eq!(out, data);

    assert_eq!(accelrt_free_async(d), 0);
    assert_eq!(accelrt_free_host(h_src), 0);
    assert_eq!(accelrt_free_host(h_dst), 0);
    assert_eq!(accelrt_device_synchronize(), 0);
    assert_eq!(accelrt_mempool_trim(0), 0);
}

#[test]
fn test_out_of_memory_leaves_slot_clear() {
    setup();
    assert_eq!(accelrt_malloc_async(1 << 40), 0);
    assert_eq!(accelrt_get_last_error(), 0);
}

#[test]
fn test_failures_set_last_error() {
    setup();
    assert_eq!(accelrt_free_host(0xdead_0000), ErrorKind::Free.code());
    assert_eq!(accelrt_get_last_error(), ErrorKind::Free.code());

    let mut buf = [0 as std::ffi::c_char; 128];
    let n = unsafe { accelrt_get_last_error_message(buf.as_mut_ptr(), buf.len()) };
    assert!(n > 0);
    assert_ne!(buf[0], 0);

    assert_eq!(accelrt_memcpy_async(0, 0, 16, 4), ErrorKind::Transfer.code());

    accelrt_clear_last_error();
    assert_eq!(accelrt_get_last_error(), 0);
}

#[test]
fn test_random_and_events_through_abi() {
    setup();
    let d = accelrt_malloc_async(256);
    assert_ne!(d, 0);

    let start = accelrt_event_create();
    let end = accelrt_event_create();
    assert_ne!(start, 0);
    assert_ne!(end, 0);

    assert_eq!(accelrt_event_record(start, 0), 0);
    assert_eq!(accelrt_memset_async(d, 256, 0), 0);
    assert_eq!(accelrt_generate_uniform(d, 32), 0);
    assert_eq!(accelrt_generate_normal(d, 31, 0.0, 1.0), 0);
    assert_eq!(accelrt_event_record(end, 0), 0);
    assert_eq!(accelrt_device_synchronize(), 0);

    let mut ms = -1.0f32;
    assert_eq!(unsafe { accelrt_event_elapsed_time(start, end, &mut ms) }, 0);
    assert!(ms > 0.0);

    // 63 normals fit exactly after a 4-byte offset, but round up to 64.
    assert_eq!(
        accelrt_generate_normal(d + 4, 63, 0.0, 1.0),
        ErrorKind::RandomGen.code()
    );

    assert_eq!(accelrt_event_destroy(start), 0);
    assert_eq!(accelrt_event_destroy(end), 0);
    assert_eq!(accelrt_free_async(d), 0);
    assert_eq!(accelrt_device_synchronize(), 0);
}
