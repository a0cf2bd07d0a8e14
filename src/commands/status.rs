use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::{INVENTORY_MANIFEST_FILE, manifest_dir, resolve_db_path};
use crate::model::CorpusInventoryManifest;
use crate::split::Split;
use crate::store::{
    Store, candidate_counts, documents_in_split, element_counts, unassigned_document_count,
};
use crate::util::read_json;

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_dir = manifest_dir(&args.work_root);
    let inventory_path = manifest_dir.join(INVENTORY_MANIFEST_FILE);
    let db_path = resolve_db_path(&args.work_root, args.db_path.as_ref());

    info!(work_root = %args.work_root.display(), "status requested");

    if inventory_path.exists() {
        let inventory: CorpusInventoryManifest = read_json(&inventory_path)?;
        info!(
            generated_at = %inventory.generated_at,
            document_count = inventory.document_count,
            skipped = inventory.skipped.len(),
            "loaded inventory manifest"
        );
    } else {
        warn!(path = %inventory_path.display(), "inventory manifest missing");
    }

    for prefix in ["parse_run_", "extract_run_"] {
        match latest_manifest(&manifest_dir, prefix)? {
            Some(path) => {
                let manifest: serde_json::Value = read_json(&path)?;
                info!(
                    path = %path.display(),
                    run_id = %manifest["run_id"].as_str().unwrap_or_default(),
                    status = %manifest["status"].as_str().unwrap_or_default(),
                    updated_at = %manifest["updated_at"].as_str().unwrap_or_default(),
                    failures = manifest["failures"].as_array().map_or(0, Vec::len),
                    "latest run manifest"
                );
            }
            None => warn!(prefix, "no run manifest found"),
        }
    }

    if !db_path.exists() {
        warn!(path = %db_path.display(), "database file missing");
        return Ok(());
    }

    let store = Store::open(&db_path)?;
    let counts = element_counts(store.connection())?;
    info!(
        path = %db_path.display(),
        documents = counts.documents,
        pages = counts.pages,
        phrases = counts.phrases,
        tables = counts.tables,
        cells = counts.cells,
        figures = counts.figures,
        candidates = counts.candidates,
        "database status"
    );

    for split in Split::ALL {
        let documents = documents_in_split(store.connection(), split)?.len();
        info!(split = split.as_str(), documents, "split documents");
    }
    let unassigned = unassigned_document_count(store.connection())?;
    if unassigned > 0 {
        warn!(documents = unassigned, "documents without a split");
    }

    for count in candidate_counts(store.connection())? {
        info!(
            relation = %count.relation,
            split = count.split.as_str(),
            candidates = count.count,
            "candidate count"
        );
    }

    Ok(())
}

/// Run manifests carry a compact UTC timestamp, so the lexically last name
/// is the most recent run.
fn latest_manifest(manifest_dir: &Path, prefix: &str) -> Result<Option<PathBuf>> {
    if !manifest_dir.is_dir() {
        return Ok(None);
    }

    let mut latest: Option<PathBuf> = None;
    let entries = fs::read_dir(manifest_dir)
        .with_context(|| format!("failed to read {}", manifest_dir.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to read entry in {}", manifest_dir.display()))?
            .path();
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(prefix) && name.ends_with(".json"));
        if matches && latest.as_ref().is_none_or(|current| path > *current) {
            latest = Some(path);
        }
    }

    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_manifest_picks_newest_timestamp() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        for name in [
            "parse_run_20260101T000000Z.json",
            "parse_run_20260301T000000Z.json",
            "extract_run_20260401T000000Z.json",
            "parse_run_20260201T000000Z.json",
        ] {
            fs::write(dir.path().join(name), "{}").expect("manifest");
        }

        let latest = latest_manifest(dir.path(), "parse_run_")
            .expect("scan")
            .expect("manifest");
        assert!(latest.ends_with("parse_run_20260301T000000Z.json"));
        assert!(
            latest_manifest(&dir.path().join("missing"), "parse_run_")
                .expect("scan")
                .is_none()
        );
    }
}
