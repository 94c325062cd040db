//! Generator seeding.

use std::time::{SystemTime, UNIX_EPOCH};

/// Seed mixed from wall-clock seconds and processor time.
///
/// Two processes started in the same second still diverge as long as they
/// have consumed different amounts of CPU time before the first random fill.
#[must_use]
pub fn entropy_seed() -> u64 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    secs ^ processor_ticks()
}

/// Process CPU time in microseconds, the unit of POSIX `clock()`.
#[cfg(unix)]
fn processor_ticks() -> u64 {
    // SAFETY: timespec is plain data, all-zero is a valid value, and `ts`
    // stays writable for the duration of the call.
    let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_PROCESS_CPUTIME_ID, &mut ts) };
    if rc != 0 {
        return 0;
    }
    (ts.tv_sec as u64)
        .wrapping_mul(1_000_000)
        .wrapping_add(ts.tv_nsec as u64 / 1_000)
}

#[cfg(not(unix))]
fn processor_ticks() -> u64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_micros() as u64
}
