use std::path::Path;

use anyhow::{Result, bail};
use tracing::info;

use crate::cli::{CorpusArgs, InventoryArgs};
use crate::commands::{INVENTORY_MANIFEST_FILE, manifest_dir};
use crate::corpus;
use crate::model::CorpusInventoryManifest;
use crate::util::{now_utc_string, read_json, write_json_pretty};

pub fn run(args: InventoryArgs) -> Result<()> {
    let manifest = build_manifest(&args.corpus)?;

    if args.dry_run {
        info!(
            document_count = manifest.document_count,
            skipped = manifest.skipped.len(),
            source = %manifest.source_directory,
            "inventory dry-run complete"
        );
        return Ok(());
    }

    let manifest_path = args
        .manifest_path
        .unwrap_or_else(|| manifest_dir(&args.work_root).join(INVENTORY_MANIFEST_FILE));

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote inventory manifest");
    info!(
        document_count = manifest.document_count,
        skipped = manifest.skipped.len(),
        "inventory completed"
    );

    Ok(())
}

pub fn build_manifest(corpus_args: &CorpusArgs) -> Result<CorpusInventoryManifest> {
    let html_dir = corpus_args.html_dir();
    let pdf_dir = corpus_args.pdf_dir();
    let scan = corpus::scan(&html_dir, &pdf_dir, corpus_args.max_docs)?;

    if scan.is_empty() {
        bail!(
            "no paired HTML/PDF documents found under {} and {}",
            html_dir.display(),
            pdf_dir.display()
        );
    }
    info!(paired = scan.len(), skipped = scan.skipped().len(), "hashing corpus documents");

    let documents = scan.documents().collect::<Result<Vec<_>>>()?;

    Ok(CorpusInventoryManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        source_directory: corpus_args.corpus_root.display().to_string(),
        max_docs: corpus_args.max_docs,
        document_count: documents.len(),
        documents,
        skipped: scan.skipped().to_vec(),
    })
}

/// Reuses the manifest on disk unless asked to refresh, it is missing, or it
/// was built with a different document cap.
pub fn load_or_refresh(
    corpus_args: &CorpusArgs,
    manifest_path: &Path,
    refresh: bool,
) -> Result<CorpusInventoryManifest> {
    if !refresh && manifest_path.exists() {
        let manifest: CorpusInventoryManifest = read_json(manifest_path)?;
        if manifest.max_docs == corpus_args.max_docs {
            info!(
                path = %manifest_path.display(),
                document_count = manifest.document_count,
                "loaded existing inventory manifest"
            );
            return Ok(manifest);
        }
    }

    let manifest = build_manifest(corpus_args)?;
    write_json_pretty(manifest_path, &manifest)?;
    info!(
        path = %manifest_path.display(),
        document_count = manifest.document_count,
        "refreshed inventory manifest"
    );
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use super::*;

    fn corpus_args(root: &Path, max_docs: Option<usize>) -> CorpusArgs {
        CorpusArgs {
            corpus_root: root.to_path_buf(),
            html_dir: None,
            pdf_dir: None,
            max_docs,
        }
    }

    fn write_pair(root: &Path, name: &str) {
        fs::create_dir_all(root.join("html")).expect("html dir");
        fs::create_dir_all(root.join("pdf")).expect("pdf dir");
        fs::write(root.join("html").join(format!("{name}.html")), "<p>x</p>").expect("html");
        fs::write(root.join("pdf").join(format!("{name}.pdf")), "%PDF-1.4").expect("pdf");
    }

    #[test]
    fn build_manifest_hashes_pairs_and_records_skips() {
        let root = tempfile::tempdir().expect("temp dir should be created");
        write_pair(root.path(), "bc546");
        write_pair(root.path(), "bc547");
        fs::write(root.path().join("html").join("orphan.html"), "<p>y</p>").expect("orphan");

        let manifest = build_manifest(&corpus_args(root.path(), None)).expect("manifest");

        assert_eq!(manifest.document_count, 2);
        assert_eq!(manifest.documents[0].name, "bc546");
        assert_eq!(manifest.documents[0].html_sha256.len(), 64);
        assert_eq!(manifest.skipped.len(), 1);
        assert_eq!(manifest.skipped[0].name, "orphan");
    }

    #[test]
    fn build_manifest_fails_on_empty_corpus() {
        let root = tempfile::tempdir().expect("temp dir should be created");
        fs::create_dir_all(root.path().join("html")).expect("html dir");

        assert!(build_manifest(&corpus_args(root.path(), None)).is_err());
    }

    #[test]
    fn load_or_refresh_rebuilds_when_cap_changes() {
        let root = tempfile::tempdir().expect("temp dir should be created");
        write_pair(root.path(), "a");
        write_pair(root.path(), "b");
        let manifest_path: PathBuf = root.path().join("manifests").join(INVENTORY_MANIFEST_FILE);

        let full = load_or_refresh(&corpus_args(root.path(), None), &manifest_path, false)
            .expect("first load");
        assert_eq!(full.document_count, 2);

        write_pair(root.path(), "c");
        let reused = load_or_refresh(&corpus_args(root.path(), None), &manifest_path, false)
            .expect("reuse");
        assert_eq!(reused.document_count, 2);

        let capped = load_or_refresh(&corpus_args(root.path(), Some(1)), &manifest_path, false)
            .expect("capped");
        assert_eq!(capped.document_count, 1);
        assert_eq!(capped.max_docs, Some(1));
    }
}
