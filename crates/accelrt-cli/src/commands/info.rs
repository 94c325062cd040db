//! `accelrt info` command - Report device memory and pool state.

use colored::Colorize;
use serde::Serialize;

use accelrt::PoolStats;

use crate::error::CliResult;

use super::{format_bytes, Session};

#[derive(Serialize)]
struct InfoReport {
    backend: String,
    cuda_devices: usize,
    total_bytes: u64,
    free_bytes: u64,
    used_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pool: Option<PoolReport>,
}

#[derive(Serialize)]
struct PoolReport {
    reserved_bytes: u64,
    in_use_bytes: u64,
    cached_bytes: u64,
    high_water_bytes: u64,
    allocations: u64,
    reuses: u64,
    out_of_memory: u64,
}

impl From<PoolStats> for PoolReport {
    fn from(s: PoolStats) -> Self {
        Self {
            reserved_bytes: s.reserved_bytes,
            in_use_bytes: s.in_use_bytes,
            cached_bytes: s.cached_bytes,
            high_water_bytes: s.high_water_bytes,
            allocations: s.allocations,
            reuses: s.reuses,
            out_of_memory: s.out_of_memory,
        }
    }
}

/// Execute the `info` command.
pub fn execute(session: &Session, json: bool) -> CliResult<()> {
    let mem = session.runtime.mem_info()?;
    let report = InfoReport {
        backend: session.runtime.backend_kind().to_string(),
        cuda_devices: accelrt::cuda_device_count(),
        total_bytes: mem.total_bytes,
        free_bytes: mem.free_bytes,
        used_bytes: mem.used_bytes(),
        pool: session.sim.as_ref().map(|dev| dev.pool_stats().into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}:", "Device".bright_white().underline());
    println!("  {} Backend: {}", "•".dimmed(), report.backend.bright_yellow());
    println!(
        "  {} CUDA devices: {}",
        "•".dimmed(),
        report.cuda_devices.to_string().bright_yellow()
    );
    println!(
        "  {} Memory: {} free of {} ({} used)",
        "•".dimmed(),
        format_bytes(report.free_bytes).bright_green(),
        format_bytes(report.total_bytes).bright_white(),
        format_bytes(report.used_bytes)
    );

    if let Some(pool) = &report.pool {
        println!();
        println!("{}:", "Pool".bright_white().underline());
        println!(
            "  {} Reserved: {} (high water {})",
            "•".dimmed(),
            format_bytes(pool.reserved_bytes),
            format_bytes(pool.high_water_bytes)
        );
        println!(
            "  {} In use: {}, cached: {}",
            "•".dimmed(),
            format_bytes(pool.in_use_bytes),
            format_bytes(pool.cached_bytes)
        );
        println!(
            "  {} Allocations: {} ({} reused, {} out of memory)",
            "•".dimmed(),
            pool.allocations,
            pool.reuses,
            pool.out_of_memory
        );
    }

    Ok(())
}
