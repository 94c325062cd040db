//! `accelrt trim` command - Release cached pool memory.

use colored::Colorize;

use crate::error::CliResult;

use super::{format_bytes, Session};

/// Execute the `trim` command.
///
/// With `warm > 0`, first allocates and frees that many bytes so the pool
/// has something cached to release.
pub fn execute(session: &Session, keep: u64, warm: u64) -> CliResult<()> {
    let rt = &session.runtime;

    if warm > 0 {
        let ptr = session.alloc(warm)?;
        rt.free_async(ptr)?;
        rt.synchronize_device()?;
        println!(
            "{} Warmed pool with {}",
            "→".bright_cyan(),
            format_bytes(warm).bright_yellow()
        );
    }

    let before = rt.mem_info()?;
    rt.trim_pool(keep)?;
    let after = rt.mem_info()?;

    println!(
        "{} Trimmed pool to keep {}",
        "✓".bright_green(),
        format_bytes(keep).bright_yellow()
    );
    println!(
        "  {} Free: {} → {}",
        "•".dimmed(),
        format_bytes(before.free_bytes),
        format_bytes(after.free_bytes).bright_green()
    );
    println!(
        "  {} Released: {}",
        "•".dimmed(),
        format_bytes(after.free_bytes.saturating_sub(before.free_bytes))
    );

    Ok(())
}
