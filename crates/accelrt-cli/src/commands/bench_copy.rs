//! `accelrt bench-copy` command - Time host/device copies with events.

use colored::Colorize;
use tracing::debug;

use accelrt::{MemcpyKind, StreamHandle};

use crate::error::{CliError, CliResult};

use super::{format_bytes, Session};

/// Execute the `bench-copy` command.
pub fn execute(session: &Session, size: u64, iterations: u32) -> CliResult<()> {
    if size == 0 || iterations == 0 {
        return Err(CliError::InvalidArgument(
            "size and iterations must be greater than 0".to_string(),
        ));
    }

    let rt = &session.runtime;
    let host = rt.alloc_pinned_host(size)?;
    let dev_a = session.alloc(size)?;
    let dev_b = session.alloc(size)?;
    let start = rt.create_event()?;
    let end = rt.create_event()?;

    println!(
        "{} Timing {} copies of {}",
        "→".bright_cyan(),
        iterations.to_string().bright_yellow(),
        format_bytes(size).bright_yellow()
    );

    let cases = [
        (MemcpyKind::HostToDevice, host.as_raw(), dev_a.as_raw()),
        (MemcpyKind::DeviceToHost, dev_a.as_raw(), host.as_raw()),
        (MemcpyKind::DeviceToDevice, dev_a.as_raw(), dev_b.as_raw()),
    ];

    for (kind, src, dst) in cases {
        rt.record_event(start, StreamHandle::DEFAULT)?;
        for _ in 0..iterations {
            rt.memcpy_async(src, dst, size, kind)?;
        }
        rt.record_event(end, StreamHandle::DEFAULT)?;
        rt.synchronize_device()?;

        let ms = rt.elapsed_time(start, end)?;
        let total = size as f64 * f64::from(iterations);
        let gbps = if ms > 0.0 {
            total / (f64::from(ms) * 1.0e6)
        } else {
            f64::INFINITY
        };
        debug!(kind = kind.label(), ms, "Copy timing");
        println!(
            "  {} {:<16} {:>10.3} ms  {:>8.2} GB/s",
            "•".dimmed(),
            kind.label(),
            ms,
            gbps
        );
    }

    rt.destroy_event(start)?;
    rt.destroy_event(end)?;
    rt.free_async(dev_a)?;
    rt.free_async(dev_b)?;
    rt.free_pinned_host(host)?;
    rt.synchronize_device()?;

    Ok(())
}
