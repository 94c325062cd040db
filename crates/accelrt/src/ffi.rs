//! Flat C ABI.
//!
//! Every handle crosses as a `u64`. Calls that can fail return an `i32`
//! status (0 on success, otherwise an [`ErrorKind`] code) or a zero handle,
//! and store the error in a thread-local slot readable with
//! [`accelrt_get_last_error`]. A zero from [`accelrt_malloc_async`] with a
//! clear slot means the pool was out of memory.

use std::cell::RefCell;
use std::ffi::c_char;

use accelrt_core::error::{AccelError, ErrorKind, Result};
use accelrt_core::memory::{
    AllocOutcome, DevicePtr, EventHandle, HostPtr, MemcpyKind, StreamHandle,
};

use crate::runtime::global;

thread_local! {
    static LAST_ERROR: RefCell<Option<AccelError>> = const { RefCell::new(None) };
}

fn set_last_error(err: Option<AccelError>) {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = err);
}

fn status(result: Result<()>) -> i32 {
    match result {
        Ok(()) => {
            set_last_error(None);
            0
        }
        Err(e) => {
            let code = e.kind().code();
            set_last_error(Some(e));
            code
        }
    }
}

fn value<T>(result: Result<T>, on_error: T) -> T {
    match result {
        Ok(v) => {
            set_last_error(None);
            v
        }
        Err(e) => {
            set_last_error(Some(e));
            on_error
        }
    }
}

/// Code of the last error on this thread, or 0.
#[no_mangle]
pub extern "C" fn accelrt_get_last_error() -> i32 {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map_or(0, |e| e.kind().code()))
}

/// Copy the last error message on this thread into `buf` as a NUL-terminated
/// string, truncating to `len - 1` bytes. Returns the full message length.
///
/// # Safety
///
/// `buf` must be null or valid for writes of `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn accelrt_get_last_error_message(buf: *mut c_char, len: usize) -> usize {
    LAST_ERROR.with(|slot| {
        let message = slot
            .borrow()
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        if !buf.is_null() && len > 0 {
            let n = message.len().min(len - 1);
            std::ptr::copy_nonoverlapping(message.as_ptr(), buf.cast::<u8>(), n);
            *buf.add(n) = 0;
        }
        message.len()
    })
}

/// Clear the last error on this thread.
#[no_mangle]
pub extern "C" fn accelrt_clear_last_error() {
    set_last_error(None);
}

/// Free and total device memory.
///
/// # Safety
///
/// `free` and `total` must be valid for a `u64` write.
#[no_mangle]
pub unsafe extern "C" fn accelrt_mem_info(free: *mut u64, total: *mut u64) -> i32 {
    if free.is_null() || total.is_null() {
        return status(Err(AccelError::DeviceQuery(
            "null output pointer".to_string(),
        )));
    }
    status(global().and_then(|rt| rt.mem_info()).map(|info| {
        *free = info.free_bytes;
        *total = info.total_bytes;
    }))
}

/// Stream-ordered allocation. Returns 0 on out-of-memory (slot clear) or
/// on error (slot set).
#[no_mangle]
pub extern "C" fn accelrt_malloc_async(bytes: u64) -> u64 {
    value(
        global()
            .and_then(|rt| rt.alloc_async(bytes))
            .map(AllocOutcome::into_raw),
        0,
    )
}

/// Page-locked host allocation. Returns 0 on error.
#[no_mangle]
pub extern "C" fn accelrt_malloc_host(bytes: u64) -> u64 {
    value(
        global()
            .and_then(|rt| rt.alloc_pinned_host(bytes))
            .map(HostPtr::as_raw),
        0,
    )
}

/// Stream-ordered release.
#[no_mangle]
pub extern "C" fn accelrt_free_async(ptr: u64) -> i32 {
    status(global().and_then(|rt| rt.free_async(DevicePtr::from_raw(ptr))))
}

/// Release page-locked host memory.
#[no_mangle]
pub extern "C" fn accelrt_free_host(ptr: u64) -> i32 {
    status(global().and_then(|rt| rt.free_pinned_host(HostPtr::from_raw(ptr))))
}

/// Copy `len` bytes from `src` into pinned host buffer `dst`.
///
/// # Safety
///
/// `src` must be valid for reads of `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn accelrt_host_write(dst: u64, src: *const u8, len: usize) -> i32 {
    if src.is_null() && len > 0 {
        return status(Err(AccelError::Transfer("null source pointer".to_string())));
    }
    let data: &[u8] = if len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(src, len)
    };
    status(global().and_then(|rt| rt.write_host(HostPtr::from_raw(dst), data)))
}

/// Copy `len` bytes from pinned host buffer `src` into `dst`.
///
/// # Safety
///
/// `dst` must be valid for writes of `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn accelrt_host_read(src: u64, dst: *mut u8, len: usize) -> i32 {
    if dst.is_null() && len > 0 {
        return status(Err(AccelError::Transfer(
            "null destination pointer".to_string(),
        )));
    }
    let mut empty = [0u8; 0];
    let out: &mut [u8] = if len == 0 {
        &mut empty
    } else {
        std::slice::from_raw_parts_mut(dst, len)
    };
    status(global().and_then(|rt| rt.read_host(HostPtr::from_raw(src), out)))
}

/// Release cached pool memory down to `min_bytes_to_keep`.
#[no_mangle]
pub extern "C" fn accelrt_mempool_trim(min_bytes_to_keep: u64) -> i32 {
    status(global().and_then(|rt| rt.trim_pool(min_bytes_to_keep)))
}

/// Enqueue a byte fill. Only the low byte of `value` is used.
#[no_mangle]
pub extern "C" fn accelrt_memset_async(dst: u64, bytes: u64, value: i32) -> i32 {
    let dst = DevicePtr::from_raw(dst);
    status(global().and_then(|rt| rt.memset_async(dst, bytes, value as u8)))
}

/// Enqueue a copy; `kind` is 0 host-host, 1 host-device, 2 device-host,
/// 3 device-device.
#[no_mangle]
pub extern "C" fn accelrt_memcpy_async(src: u64, dst: u64, bytes: u64, kind: u32) -> i32 {
    status(
        MemcpyKind::try_from(kind)
            .and_then(|kind| global().and_then(|rt| rt.memcpy_async(src, dst, bytes, kind))),
    )
}

/// Block until all device work has completed.
#[no_mangle]
pub extern "C" fn accelrt_device_synchronize() -> i32 {
    status(global().and_then(|rt| rt.synchronize_device()))
}

/// Fill `count` f32 values uniformly in `[0, 1)`.
#[no_mangle]
pub extern "C" fn accelrt_generate_uniform(dst: u64, count: u64) -> i32 {
    status(global().and_then(|rt| rt.generate_uniform(DevicePtr::from_raw(dst), count)))
}

/// Fill `count` f32 normal samples. An odd `count` writes `count + 1`
/// values, so the buffer needs room for one more element.
#[no_mangle]
pub extern "C" fn accelrt_generate_normal(dst: u64, count: u64, mean: f32, stddev: f32) -> i32 {
    let dst = DevicePtr::from_raw(dst);
    status(global().and_then(|rt| rt.generate_normal(dst, count, mean, stddev)))
}

/// Create a timing event. Returns 0 on error.
#[no_mangle]
pub extern "C" fn accelrt_event_create() -> u64 {
    value(
        global()
            .and_then(|rt| rt.create_event())
            .map(EventHandle::as_raw),
        0,
    )
}

/// Destroy a timing event.
#[no_mangle]
pub extern "C" fn accelrt_event_destroy(event: u64) -> i32 {
    status(global().and_then(|rt| rt.destroy_event(EventHandle::from_raw(event))))
}

/// Record `event` on `stream` (0 is the default stream).
#[no_mangle]
pub extern "C" fn accelrt_event_record(event: u64, stream: u64) -> i32 {
    status(global().and_then(|rt| {
        rt.record_event(EventHandle::from_raw(event), StreamHandle::from_raw(stream))
    }))
}

/// Milliseconds between two completed events, written to `out_ms`.
///
/// # Safety
///
/// `out_ms` must be valid for an `f32` write.
#[no_mangle]
pub unsafe extern "C" fn accelrt_event_elapsed_time(
    start: u64,
    end: u64,
    out_ms: *mut f32,
) -> i32 {
    if out_ms.is_null() {
        return status(Err(AccelError::Event("null output pointer".to_string())));
    }
    let (start, end) = (EventHandle::from_raw(start), EventHandle::from_raw(end));
    status(
        global()
            .and_then(|rt| rt.elapsed_time(start, end))
            .map(|ms| *out_ms = ms),
    )
}

/// Whether `code` is a known error code.
#[no_mangle]
pub extern "C" fn accelrt_is_error_code(code: i32) -> bool {
    ErrorKind::from_code(code).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_sets_and_clears_slot() {
        assert_eq!(status(Err(AccelError::Pool("x".to_string()))), 4);
        assert_eq!(accelrt_get_last_error(), ErrorKind::Pool.code());

        assert_eq!(status(Ok(())), 0);
        assert_eq!(accelrt_get_last_error(), 0);
    }

    #[test]
    fn test_last_error_message_truncates() {
        status(Err(AccelError::Event("unknown event 0x9".to_string())));
        let full = unsafe { accelrt_get_last_error_message(std::ptr::null_mut(), 0) };
        assert_eq!(full, "Event operation failed: unknown event 0x9".len());

        let mut buf = [0 as c_char; 6];
        let n = unsafe { accelrt_get_last_error_message(buf.as_mut_ptr(), buf.len()) };
        assert_eq!(n, full);
        let bytes: Vec<u8> = buf.iter().map(|&c| c as u8).collect();
        assert_eq!(&bytes, b"Event\0");

        accelrt_clear_last_error();
        assert_eq!(accelrt_get_last_error(), 0);
    }

    #[test]
    fn test_error_slot_is_per_thread() {
        status(Err(AccelError::Transfer("x".to_string())));
        let other = std::thread::spawn(|| accelrt_get_last_error()).join().unwrap();
        assert_eq!(other, 0);
        assert_eq!(accelrt_get_last_error(), ErrorKind::Transfer.code());
    }

    #[test]
    fn test_invalid_direction_code() {
        assert_eq!(accelrt_memcpy_async(0, 0, 0, 7), ErrorKind::Transfer.code());
        assert!(accelrt_is_error_code(ErrorKind::Transfer.code()));
        assert!(!accelrt_is_error_code(0));
    }
}
