//! `accelrt random` command - Sample a device-side random fill.

use colored::Colorize;

use accelrt::MemcpyKind;

use crate::error::{CliError, CliResult};

use super::Session;

/// Distribution to sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Distribution {
    /// Uniform in `[0, 1)`.
    Uniform,
    /// Normal with `--mean` / `--stddev`.
    Normal,
}

/// Bytes of device buffer a fill of `count` values needs. Normal fills of an
/// odd count write one extra value, so the buffer always has room for it.
fn buffer_bytes(count: u64) -> CliResult<u64> {
    count
        .checked_add(count & 1)
        .and_then(|written| written.checked_mul(4))
        .ok_or_else(|| CliError::InvalidArgument(format!("count {} is too large", count)))
}

/// Execute the `random` command.
pub fn execute(
    session: &Session,
    distribution: Distribution,
    count: u64,
    mean: f32,
    stddev: f32,
    show: usize,
) -> CliResult<()> {
    if count == 0 {
        return Err(CliError::InvalidArgument(
            "count must be greater than 0".to_string(),
        ));
    }

    let rt = &session.runtime;
    let bytes = buffer_bytes(count)?;
    let dev = session.alloc(bytes)?;
    let host = rt.alloc_pinned_host(bytes)?;

    match distribution {
        Distribution::Uniform => rt.generate_uniform(dev, count)?,
        Distribution::Normal => rt.generate_normal(dev, count, mean, stddev)?,
    }
    rt.synchronize_device()?;
    rt.memcpy_async(dev.as_raw(), host.as_raw(), bytes, MemcpyKind::DeviceToHost)?;
    rt.synchronize_device()?;

    let mut raw = vec![0u8; bytes as usize];
    rt.read_host(host, &mut raw)?;
    let values: Vec<f32> = raw
        .chunks_exact(4)
        .take(count as usize)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    let n = values.len() as f64;
    let sample_mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|&v| (f64::from(v) - sample_mean).powi(2))
        .sum::<f64>()
        / n;
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    println!(
        "{} {} {:?} values (seed {:#x})",
        "✓".bright_green(),
        count.to_string().bright_yellow(),
        distribution,
        rt.random()?.seed()
    );
    println!("  {} mean {:.4}, stddev {:.4}", "•".dimmed(), sample_mean, variance.sqrt());
    println!("  {} min {:.4}, max {:.4}", "•".dimmed(), min, max);
    if show > 0 {
        let preview: Vec<String> = values.iter().take(show).map(|v| format!("{:.4}", v)).collect();
        println!("  {} [{}]", "•".dimmed(), preview.join(", "));
    }

    rt.free_async(dev)?;
    rt.free_pinned_host(host)?;
    rt.synchronize_device()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_bytes_pads_odd_counts() {
        assert_eq!(buffer_bytes(4).unwrap(), 16);
        assert_eq!(buffer_bytes(5).unwrap(), 24);
    }

    #[test]
    fn test_buffer_bytes_rejects_overflow() {
        assert!(matches!(
            buffer_bytes(u64::MAX / 4),
            Err(CliError::InvalidArgument(_))
        ));
        assert!(buffer_bytes(u64::MAX).is_err());
    }
}
