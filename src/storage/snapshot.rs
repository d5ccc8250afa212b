use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use super::Tables;

const SNAPSHOT_FILE: &str = "lims.json";

pub(crate) fn snapshot_path(root: &Path) -> PathBuf { root.join(SNAPSHOT_FILE) }

pub(crate) fn load(root: &Path) -> Result<Option<Tables>> {
    let p = snapshot_path(root);
    if !p.exists() { return Ok(None); }
    let bytes = fs::read(&p).with_context(|| format!("reading snapshot {}", p.display()))?;
    let tables: Tables = serde_json::from_slice(&bytes).with_context(|| format!("parsing snapshot {}", p.display()))?;
    debug!(target: "lims::storage", "snapshot loaded from {}", p.display());
    Ok(Some(tables))
}

/// Write via temp file + rename so a crash never leaves a torn snapshot.
pub(crate) fn save(root: &Path, tables: &Tables) -> Result<()> {
    fs::create_dir_all(root).with_context(|| format!("creating data dir {}", root.display()))?;
    let p = snapshot_path(root);
    let tmp = p.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(tables)?;
    {
        let mut f = fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
        f.write_all(&bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, &p).with_context(|| format!("replacing snapshot {}", p.display()))?;
    debug!(target: "lims::storage", bytes = bytes.len(), "snapshot written to {}", p.display());
    Ok(())
}
