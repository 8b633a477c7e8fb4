//! Preflight checks (spec §4.11): run once before the scheduler loop
//! starts. Any failure here maps to the harness's exit code 2 rather than
//! the generic uncaught-error code 1, so an operator can tell "never
//! started" apart from "started and then blew up".

use sysinfo::Disks;

use crate::error::HarnessError;

use super::HarnessContext;

/// Verify the working tree is clean (or dirtiness is explicitly accepted),
/// the agent transport is reachable, and enough disk is free. The backlog
/// load itself already happened during [`HarnessContext::bootstrap`], so a
/// context that exists at all has already satisfied that check.
pub async fn run(ctx: &HarnessContext) -> Result<(), HarnessError> {
    check_worktree(ctx)?;
    ctx.transport
        .health_check()
        .await
        .map_err(|e| HarnessError::Preflight(format!("agent transport unreachable: {e}")))?;
    check_disk_free(ctx)?;
    Ok(())
}

fn check_worktree(ctx: &HarnessContext) -> Result<(), HarnessError> {
    if ctx.config.preflight.allow_dirty_worktree {
        return Ok(());
    }
    let status = ctx
        .vcs
        .status()
        .map_err(|e| HarnessError::Preflight(format!("could not read repository status: {e}")))?;
    if status.clean {
        Ok(())
    } else {
        Err(HarnessError::Preflight(format!(
            "working tree is dirty ({} untracked path(s)); set ADA_HARNESS_ALLOW_DIRTY_WORKTREE to proceed anyway",
            status.untracked_paths.len()
        )))
    }
}

fn check_disk_free(ctx: &HarnessContext) -> Result<(), HarnessError> {
    let min_bytes = ctx.config.preflight.min_disk_free_bytes;
    let disks = Disks::new_with_refreshed_list();
    let root = &ctx.config.project_root;

    let mut best_match: Option<&sysinfo::Disk> = None;
    for disk in disks.list() {
        if root.starts_with(disk.mount_point()) {
            let longer_match = best_match
                .map(|b| disk.mount_point().as_os_str().len() > b.mount_point().as_os_str().len())
                .unwrap_or(true);
            if longer_match {
                best_match = Some(disk);
            }
        }
    }

    match best_match {
        Some(disk) if disk.available_space() < min_bytes => Err(HarnessError::Preflight(format!(
            "only {} bytes free on {:?}, need at least {min_bytes}",
            disk.available_space(),
            disk.mount_point()
        ))),
        // A filesystem we can't identify (containers, unusual mounts) should
        // never block a run outright; the check is best-effort.
        _ => Ok(()),
    }
}
