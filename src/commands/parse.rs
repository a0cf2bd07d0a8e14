use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::cli::ParseArgs;
use crate::commands::{INVENTORY_MANIFEST_FILE, inventory, manifest_dir, resolve_db_path};
use crate::model::{
    DocumentFailure, FailureKind, ModalityFlags, ParseCounts, ParseRunManifest, RawDocument,
    RunPaths, ToolVersions,
};
use crate::parser::{Deadline, Modalities, ParsedDocument, parse_document, tool_version};
use crate::store::{DB_SCHEMA_VERSION, PersistStats, Store, element_counts, persist_document};
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

enum DocumentResult {
    Persisted {
        stats: PersistStats,
        aligned_phrases: usize,
        warnings: Vec<String>,
    },
    Failed(DocumentFailure),
}

pub fn run(args: ParseArgs) -> Result<()> {
    if args.workers == 0 {
        bail!("--workers must be at least 1");
    }
    if args.doc_timeout_secs == 0 {
        bail!("--doc-timeout-secs must be at least 1");
    }

    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let work_root = args.work_root.clone();
    let manifest_dir = manifest_dir(&work_root);
    ensure_directory(&manifest_dir)?;

    let inventory_manifest_path = args
        .inventory_manifest_path
        .clone()
        .unwrap_or_else(|| manifest_dir.join(INVENTORY_MANIFEST_FILE));
    let parse_manifest_path = args.parse_manifest_path.clone().unwrap_or_else(|| {
        manifest_dir.join(format!("parse_run_{}.json", utc_compact_string(started_ts)))
    });
    let db_path = resolve_db_path(&work_root, args.db_path.as_ref());

    info!(work_root = %work_root.display(), run_id = %run_id, "starting parse");

    let inventory = inventory::load_or_refresh(
        &args.corpus,
        &inventory_manifest_path,
        args.refresh_inventory,
    )?;

    let modalities = modalities_from_args(&args);
    let mut warnings = Vec::new();
    let tool_versions = if modalities.visual {
        collect_tool_versions(&mut warnings)
    } else {
        ToolVersions {
            pdftotext: None,
            pdfimages: None,
        }
    };

    // Nothing can be persisted without the store, so this one is fatal.
    let store = Store::open_and_migrate(&db_path)
        .with_context(|| format!("failed to prepare store at {}", db_path.display()))?;

    let pool = ThreadPoolBuilder::new()
        .num_threads(args.workers)
        .build()
        .context("failed to build parse worker pool")?;
    let timeout = Duration::from_secs(args.doc_timeout_secs);

    let results: Vec<DocumentResult> = pool.install(|| {
        inventory
            .documents
            .par_iter()
            .map(|raw| {
                parse_and_persist(raw, &db_path, modalities, args.max_pages_per_doc, timeout)
            })
            .collect()
    });

    let mut counts = ParseCounts {
        document_count: inventory.document_count,
        ..ParseCounts::default()
    };
    let mut failures = inventory.skipped.clone();

    for result in results {
        match result {
            DocumentResult::Persisted {
                stats,
                aligned_phrases,
                warnings: document_warnings,
            } => {
                counts.parsed_document_count += 1;
                counts.phrases_inserted += stats.phrases;
                counts.tables_inserted += stats.tables;
                counts.cells_inserted += stats.cells;
                counts.figures_inserted += stats.figures;
                counts.visually_aligned_phrases += aligned_phrases;
                warnings.extend(document_warnings);
            }
            DocumentResult::Failed(failure) => {
                counts.failed_document_count += 1;
                failures.push(failure);
            }
        }
    }

    let totals = element_counts(store.connection())?;
    counts.documents_total = totals.documents;
    counts.phrases_total = totals.phrases;
    counts.figures_total = totals.figures;

    // Unpaired sources from the inventory count as failures of the run too.
    let status = if failures.is_empty() {
        "completed"
    } else {
        "completed_with_failures"
    };

    let manifest = ParseRunManifest {
        manifest_version: 1,
        run_id,
        db_schema_version: DB_SCHEMA_VERSION.to_string(),
        status: status.to_string(),
        started_at,
        updated_at: now_utc_string(),
        command: render_parse_command(&args),
        workers: args.workers,
        doc_timeout_secs: args.doc_timeout_secs,
        modalities: ModalityFlags {
            structural: modalities.structural,
            lingual: modalities.lingual,
            tabular: modalities.tabular,
            visual: modalities.visual,
        },
        tool_versions,
        paths: RunPaths {
            work_root: work_root.display().to_string(),
            manifest_dir: manifest_dir.display().to_string(),
            inventory_manifest_path: inventory_manifest_path.display().to_string(),
            db_path: db_path.display().to_string(),
        },
        counts,
        failures,
        warnings,
    };

    write_json_pretty(&parse_manifest_path, &manifest)?;

    info!(path = %parse_manifest_path.display(), "wrote parse run manifest");
    info!(
        parsed = manifest.counts.parsed_document_count,
        failed = manifest.counts.failed_document_count,
        phrases = manifest.counts.phrases_inserted,
        tables = manifest.counts.tables_inserted,
        figures = manifest.counts.figures_inserted,
        documents_total = manifest.counts.documents_total,
        "parse completed"
    );

    Ok(())
}

fn modalities_from_args(args: &ParseArgs) -> Modalities {
    Modalities {
        structural: !args.no_structural,
        lingual: !args.no_lingual,
        tabular: !args.no_tabular,
        visual: !args.no_visual,
    }
}

fn collect_tool_versions(warnings: &mut Vec<String>) -> ToolVersions {
    let pdftotext = tool_version("pdftotext", &["-v"]);
    let pdfimages = tool_version("pdfimages", &["-v"]);

    if pdftotext.is_none() {
        warnings.push("pdftotext not found; phrases will carry no visual annotations".to_string());
    }
    if pdfimages.is_none() {
        warnings.push("pdfimages not found; figures will carry no page or size".to_string());
    }

    ToolVersions {
        pdftotext,
        pdfimages,
    }
}

fn parse_and_persist(
    raw: &RawDocument,
    db_path: &Path,
    modalities: Modalities,
    max_pages: Option<usize>,
    timeout: Duration,
) -> DocumentResult {
    let parsed = match parse_with_timeout(raw, modalities, max_pages, timeout) {
        Ok(parsed) => parsed,
        Err(failure) => {
            warn!(
                document = %failure.name,
                kind = failure.kind.as_str(),
                reason = %failure.message,
                "document parse failed"
            );
            return DocumentResult::Failed(failure);
        }
    };

    let persisted = Store::open(db_path)
        .and_then(|mut store| persist_document(&mut store, raw, &parsed));

    match persisted {
        Ok(stats) => DocumentResult::Persisted {
            stats,
            aligned_phrases: parsed.aligned_phrase_count(),
            warnings: parsed.warnings,
        },
        Err(err) => {
            warn!(document = %raw.name, error = %format!("{err:#}"), "document persist failed");
            DocumentResult::Failed(DocumentFailure::new(
                raw.name.clone(),
                FailureKind::Store,
                format!("{err:#}"),
            ))
        }
    }
}

/// Runs the parse on its own thread and gives up waiting after `timeout`.
/// The same deadline is handed to the parse, which stops walking the HTML
/// and kills any PDF tool still running once it passes. Nothing is persisted
/// for a timed-out document.
fn parse_with_timeout(
    raw: &RawDocument,
    modalities: Modalities,
    max_pages: Option<usize>,
    timeout: Duration,
) -> std::result::Result<ParsedDocument, DocumentFailure> {
    let (sender, receiver) = mpsc::channel();
    let job = raw.clone();
    let deadline = Deadline::after(timeout);
    let timed_out = || {
        DocumentFailure::new(
            raw.name.clone(),
            FailureKind::Timeout,
            format!("parse exceeded {} ms", timeout.as_millis()),
        )
    };

    thread::Builder::new()
        .name(format!("parse-{}", raw.name))
        .spawn(move || {
            let _ = sender.send(parse_document(&job, modalities, max_pages, deadline));
        })
        .map_err(|err| {
            DocumentFailure::new(
                raw.name.clone(),
                FailureKind::Parse,
                format!("failed to spawn parse thread: {err}"),
            )
        })?;

    match receiver.recv_timeout(timeout) {
        Ok(Ok(parsed)) => Ok(parsed),
        Ok(Err(_)) if deadline.expired() => Err(timed_out()),
        Ok(Err(err)) => Err(DocumentFailure::new(
            raw.name.clone(),
            FailureKind::Parse,
            format!("{err:#}"),
        )),
        Err(RecvTimeoutError::Timeout) => Err(timed_out()),
        Err(RecvTimeoutError::Disconnected) => Err(DocumentFailure::new(
            raw.name.clone(),
            FailureKind::Parse,
            "parse thread exited without a result",
        )),
    }
}

fn render_parse_command(args: &ParseArgs) -> String {
    let mut command = vec![
        "hwsheets".to_string(),
        "parse".to_string(),
        "--corpus-root".to_string(),
        args.corpus.corpus_root.display().to_string(),
        "--work-root".to_string(),
        args.work_root.display().to_string(),
    ];

    if let Some(path) = &args.corpus.html_dir {
        command.push("--html-dir".to_string());
        command.push(path.display().to_string());
    }
    if let Some(path) = &args.corpus.pdf_dir {
        command.push("--pdf-dir".to_string());
        command.push(path.display().to_string());
    }
    if let Some(max_docs) = args.corpus.max_docs {
        command.push("--max-docs".to_string());
        command.push(max_docs.to_string());
    }
    if let Some(path) = &args.db_path {
        command.push("--db-path".to_string());
        command.push(path.display().to_string());
    }
    if let Some(path) = &args.inventory_manifest_path {
        command.push("--inventory-manifest-path".to_string());
        command.push(path.display().to_string());
    }
    if let Some(path) = &args.parse_manifest_path {
        command.push("--parse-manifest-path".to_string());
        command.push(path.display().to_string());
    }
    if args.refresh_inventory {
        command.push("--refresh-inventory".to_string());
    }

    command.push("--workers".to_string());
    command.push(args.workers.to_string());
    command.push("--doc-timeout-secs".to_string());
    command.push(args.doc_timeout_secs.to_string());

    if let Some(max_pages) = args.max_pages_per_doc {
        command.push("--max-pages-per-doc".to_string());
        command.push(max_pages.to_string());
    }
    for (disabled, flag) in [
        (args.no_structural, "--no-structural"),
        (args.no_lingual, "--no-lingual"),
        (args.no_tabular, "--no-tabular"),
        (args.no_visual, "--no-visual"),
    ] {
        if disabled {
            command.push(flag.to_string());
        }
    }

    command.join(" ")
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use super::*;
    use crate::cli::CorpusArgs;
    use crate::util::read_json;

    fn parse_args(corpus_root: &Path, work_root: &Path) -> ParseArgs {
        ParseArgs {
            corpus: CorpusArgs {
                corpus_root: corpus_root.to_path_buf(),
                html_dir: None,
                pdf_dir: None,
                max_docs: None,
            },
            work_root: work_root.to_path_buf(),
            db_path: None,
            inventory_manifest_path: None,
            parse_manifest_path: Some(work_root.join("parse.json")),
            refresh_inventory: false,
            workers: 2,
            doc_timeout_secs: 30,
            max_pages_per_doc: None,
            no_structural: false,
            no_lingual: false,
            no_tabular: false,
            no_visual: true,
        }
    }

    fn write_document(root: &Path, name: &str, html: &str) {
        fs::create_dir_all(root.join("html")).expect("html dir");
        fs::create_dir_all(root.join("pdf")).expect("pdf dir");
        fs::write(root.join("html").join(format!("{name}.html")), html).expect("html");
        fs::write(root.join("pdf").join(format!("{name}.pdf")), "%PDF-1.4").expect("pdf");
    }

    #[test]
    fn render_parse_command_lists_disabled_modalities() {
        let mut args = parse_args(Path::new("data"), Path::new(".cache/hwsheets"));
        args.no_lingual = true;
        args.corpus.max_docs = Some(10);

        let command = render_parse_command(&args);
        assert!(command.starts_with("hwsheets parse --corpus-root data"));
        assert!(command.contains("--max-docs 10"));
        assert!(command.contains("--no-lingual"));
        assert!(command.contains("--no-visual"));
        assert!(!command.contains("--no-tabular"));
    }

    #[test]
    fn parse_with_timeout_reports_missing_html_as_parse_failure() {
        let raw = RawDocument {
            name: "ghost".to_string(),
            html_path: PathBuf::from("/nonexistent/ghost.html"),
            pdf_path: PathBuf::from("/nonexistent/ghost.pdf"),
            html_sha256: String::new(),
            pdf_sha256: String::new(),
        };
        let modalities = Modalities {
            visual: false,
            ..Modalities::default()
        };

        let failure = parse_with_timeout(&raw, modalities, None, Duration::from_secs(10))
            .expect_err("missing html");
        assert_eq!(failure.kind, FailureKind::Parse);
        assert_eq!(failure.name, "ghost");
    }

    #[test]
    fn parse_with_timeout_reports_slow_documents_as_timeouts() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let html_path = dir.path().join("huge.html");
        let body: String = (0..20_000)
            .map(|row| format!("<div><p>Row {row} of the absolute maximum ratings.</p></div>"))
            .collect();
        fs::write(&html_path, format!("<html><body>{body}</body></html>")).expect("fixture");

        let raw = RawDocument {
            name: "huge".to_string(),
            html_path,
            pdf_path: dir.path().join("huge.pdf"),
            html_sha256: String::new(),
            pdf_sha256: String::new(),
        };
        let modalities = Modalities {
            visual: false,
            ..Modalities::default()
        };

        let failure = parse_with_timeout(&raw, modalities, None, Duration::from_millis(1))
            .expect_err("timeout");
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(failure.name, "huge");
    }

    #[test]
    fn run_keeps_going_when_one_document_fails() {
        let corpus = tempfile::tempdir().expect("corpus dir");
        let work = tempfile::tempdir().expect("work dir");
        for name in ["bc546", "bc547", "bc548"] {
            write_document(
                corpus.path(),
                name,
                "<html><body><p>NPN transistor.</p><img src=\"a.png\"></body></html>",
            );
        }

        let args = parse_args(corpus.path(), work.path());
        let inventory_path = manifest_dir(work.path()).join(INVENTORY_MANIFEST_FILE);
        inventory::load_or_refresh(&args.corpus, &inventory_path, false).expect("inventory");
        fs::remove_file(corpus.path().join("html").join("bc547.html")).expect("remove html");

        run(args).expect("parse run");

        let store = Store::open(&work.path().join("hwsheets.sqlite")).expect("store");
        let totals = element_counts(store.connection()).expect("counts");
        assert_eq!(totals.documents, 2);
        assert_eq!(totals.figures, 2);

        let manifest: serde_json::Value =
            read_json(&work.path().join("parse.json")).expect("manifest");
        assert_eq!(manifest["status"], "completed_with_failures");
        assert_eq!(manifest["counts"]["parsed_document_count"], 2);
        assert_eq!(manifest["counts"]["failed_document_count"], 1);
        assert_eq!(manifest["failures"][0]["name"], "bc547");
        assert_eq!(manifest["failures"][0]["kind"], "parse");
    }

    #[test]
    fn run_persists_every_paired_document_and_writes_manifest() {
        let corpus = tempfile::tempdir().expect("corpus dir");
        let work = tempfile::tempdir().expect("work dir");
        write_document(
            corpus.path(),
            "bc546",
            "<html><body><p>NPN transistor. Low noise.</p><img src=\"a.png\"></body></html>",
        );
        write_document(
            corpus.path(),
            "bc547",
            "<html><body><table><tr><td>VCEO</td><td>45 V</td></tr></table><img src=\"b.png\"><img src=\"c.jpg\"></body></html>",
        );
        fs::write(corpus.path().join("html").join("orphan.html"), "<p>x</p>").expect("orphan");

        let args = parse_args(corpus.path(), work.path());
        run(args.clone()).expect("parse run");

        let store = Store::open(&work.path().join("hwsheets.sqlite")).expect("store");
        let totals = element_counts(store.connection()).expect("counts");
        assert_eq!(totals.documents, 2);
        assert_eq!(totals.figures, 3);
        assert_eq!(totals.tables, 1);
        assert_eq!(totals.cells, 2);

        let manifest: serde_json::Value =
            read_json(&work.path().join("parse.json")).expect("manifest");
        assert_eq!(manifest["status"], "completed_with_failures");
        assert_eq!(manifest["counts"]["parsed_document_count"], 2);
        assert_eq!(manifest["counts"]["failed_document_count"], 0);
        assert_eq!(manifest["failures"][0]["kind"], "missing_source");

        run(args).expect("second parse run");
        let again = element_counts(store.connection()).expect("counts");
        assert_eq!(again, totals);
    }
}
