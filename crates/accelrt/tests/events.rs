//! Integration tests for event timing.

use accelrt::prelude::*;

fn runtime() -> Runtime {
    Runtime::sim(SimConfig::minimal())
}

#[test]
fn test_elapsed_time_spans_recorded_work() {
    let rt = runtime();
    let start = rt.create_event().unwrap();
    let end = rt.create_event().unwrap();
    let d = rt.alloc_async(1 << 20).unwrap().ptr().unwrap();

    rt.record_event(start, StreamHandle::DEFAULT).unwrap();
    rt.memset_async(d, 1 << 20, 1).unwrap();
    rt.record_event(end, StreamHandle::DEFAULT).unwrap();
    rt.synchronize_device().unwrap();

    let first = rt.elapsed_time(start, end).unwrap();
    assert!(first > 0.0);

    // Re-recording moves both markers; nothing runs between them now.
    rt.record_event(start, StreamHandle::DEFAULT).unwrap();
    rt.record_event(end, StreamHandle::DEFAULT).unwrap();
    rt.synchronize_device().unwrap();

    let second = rt.elapsed_time(start, end).unwrap();
    assert!(second >= 0.0);
    assert!(second < first);

    rt.destroy_event(start).unwrap();
    rt.destroy_event(end).unwrap();
}

#[test]
fn test_elapsed_time_before_completion_is_an_error() {
    let rt = runtime();
    let start = rt.create_event().unwrap();
    let end = rt.create_event().unwrap();

    let err = rt.elapsed_time(start, end).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Event);

    rt.record_event(start, StreamHandle::DEFAULT).unwrap();
    rt.record_event(end, StreamHandle::DEFAULT).unwrap();
    let err = rt.elapsed_time(start, end).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Event);

    rt.synchronize_device().unwrap();
    assert_eq!(rt.elapsed_time(start, end).unwrap(), 0.0);
}

#[test]
fn test_events_on_a_side_stream() {
    let rt = runtime();
    let stream = rt.create_stream().unwrap();
    let start = rt.create_event().unwrap();
    let end = rt.create_event().unwrap();
    let d = rt.alloc_async_on(4096, stream).unwrap().ptr().unwrap();

    rt.record_event(start, stream).unwrap();
    rt.memset_async_on(d, 4096, 0, stream).unwrap();
    rt.record_event(end, stream).unwrap();
    rt.synchronize_stream(stream).unwrap();

    assert!(rt.elapsed_time(start, end).unwrap() > 0.0);
    rt.free_async_on(d, stream).unwrap();
    rt.destroy_stream(stream).unwrap();
}

#[test]
fn test_destroyed_event_is_unknown() {
    let rt = runtime();
    let event = rt.create_event().unwrap();
    rt.destroy_event(event).unwrap();

    let err = rt.record_event(event, StreamHandle::DEFAULT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Event);
    let err = rt.destroy_event(event).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Event);
}
