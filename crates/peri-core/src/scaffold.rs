//! Provisioning of the signaling resource tree
//!
//! The management agent serves whatever files exist under the resource
//! root, one file per (object, instance, resource). This materializes the
//! signaling object's slots with their baseline values so a freshly
//! installed device can rendezvous, plus the executable trigger scripts the
//! agent runs when the directory fires an execute action. Existing files
//! are left untouched, so re-running is safe.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use peri_protocol::schema::{ResourcePath, SignalingLayout};

/// Directory under the resource root holding the per-slot files.
pub const RESOURCE_DIR_NAME: &str = "resources";

/// Outcome of a provisioning run.
#[derive(Debug)]
pub struct ScaffoldResult {
    /// The resource directory that was provisioned.
    pub resource_dir: PathBuf,
    /// Number of slot files created in this run.
    pub created: usize,
}

/// Materialize the signaling object under `root`, writing trigger scripts
/// that re-invoke `exe`.
pub fn provision_resource_tree(
    root: &Path,
    layout: &SignalingLayout,
    exe: &Path,
) -> Result<ScaffoldResult> {
    let resource_dir = root.join(RESOURCE_DIR_NAME);
    let mut created = 0;

    for (slot, value) in layout.baseline() {
        created += write_if_absent(&resource_dir, slot, value.as_bytes(), false)?;
    }

    // Executable slots: the agent runs these scripts on an execute action.
    let start = format!("#!/bin/sh\n{} execute\n", exe.display());
    created += write_if_absent(&resource_dir, layout.start_trigger(), start.as_bytes(), true)?;

    let stop = format!("#!/bin/sh\npkill -f -x \"{} device\"\n", exe.display());
    created += write_if_absent(&resource_dir, layout.stop_trigger(), stop.as_bytes(), true)?;

    if created > 0 {
        tracing::info!(
            dir = %resource_dir.display(),
            created,
            "provisioned signaling resources"
        );
    }

    Ok(ScaffoldResult {
        resource_dir,
        created,
    })
}

fn write_if_absent(
    resource_dir: &Path,
    slot: ResourcePath,
    content: &[u8],
    executable: bool,
) -> Result<usize> {
    let path = resource_dir
        .join(slot.object_id.to_string())
        .join(slot.instance_id.to_string())
        .join(slot.resource_id.to_string());

    if path.exists() {
        return Ok(0);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create resource dir {}", parent.display()))?;
    }
    fs::write(&path, content)
        .with_context(|| format!("failed to write resource {}", slot))?;

    #[cfg(unix)]
    if executable {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .with_context(|| format!("failed to mark resource {} executable", slot))?;
    }
    #[cfg(not(unix))]
    let _ = executable;

    tracing::debug!(%slot, "provisioned resource");
    Ok(1)
}
