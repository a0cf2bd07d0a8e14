use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::candidates::{CandidateExtractor, DocumentOutcome, Relation, RelationConfig};
use crate::cli::ExtractArgs;
use crate::commands::{manifest_dir, resolve_db_path};
use crate::model::{DocumentFailure, ExtractRunManifest, ExtractSplitCounts, FailureKind};
use crate::split::Split;
use crate::store::{Store, count_candidates, documents_in_split, unassigned_document_count};
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

pub fn run(args: ExtractArgs) -> Result<()> {
    if args.workers == 0 {
        bail!("--workers must be at least 1");
    }

    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let manifest_dir = manifest_dir(&args.work_root);
    ensure_directory(&manifest_dir)?;
    let extract_manifest_path = args.extract_manifest_path.clone().unwrap_or_else(|| {
        manifest_dir.join(format!("extract_run_{}.json", utc_compact_string(started_ts)))
    });

    let relation = match &args.relation_config {
        Some(path) => RelationConfig::load(path)?,
        None => RelationConfig::transistor_image(),
    }
    .compile()?;

    let db_path = resolve_db_path(&args.work_root, args.db_path.as_ref());
    if !db_path.exists() {
        bail!(
            "store not found at {}; run `hwsheets parse` first",
            db_path.display()
        );
    }
    let store = Store::open_and_migrate(&db_path)
        .with_context(|| format!("failed to prepare store at {}", db_path.display()))?;

    let unassigned = unassigned_document_count(store.connection())?;
    if unassigned > 0 {
        warn!(
            documents = unassigned,
            "documents without a split are skipped; run `hwsheets split`"
        );
    }

    let pool = ThreadPoolBuilder::new()
        .num_threads(args.workers)
        .build()
        .context("failed to build extract worker pool")?;

    let splits = match args.split {
        Some(split) => vec![split],
        None => Split::ALL.to_vec(),
    };

    info!(
        run_id = %run_id,
        relation = %relation.name,
        arity = relation.arity(),
        "starting extract"
    );

    let mut split_counts = Vec::with_capacity(splits.len());
    let mut failures = Vec::new();

    for split in splits {
        let documents = documents_in_split(store.connection(), split)?;
        let batch_len = documents.len().div_ceil(args.workers).max(1);

        let results: Vec<(&String, Result<DocumentOutcome>)> = pool.install(|| {
            documents
                .par_chunks(batch_len)
                .flat_map_iter(|batch| extract_batch(&relation, split, &db_path, batch))
                .collect()
        });

        let mut counts = ExtractSplitCounts {
            split: split.as_str().to_string(),
            document_count: documents.len(),
            ..ExtractSplitCounts::default()
        };

        for (doc_id, result) in results {
            match result {
                Ok(outcome) => {
                    counts.tuples_enumerated += outcome.tuples_enumerated;
                    counts.tuples_rejected_by_matchers += outcome.rejected_by_matchers;
                    counts.tuples_rejected_by_throttler += outcome.rejected_by_throttler;
                    counts.candidates_persisted += outcome.persisted;
                }
                Err(err) => {
                    warn!(
                        document = %doc_id,
                        error = %format!("{err:#}"),
                        "candidate extraction failed"
                    );
                    failures.push(DocumentFailure::new(
                        doc_id.clone(),
                        FailureKind::Store,
                        format!("{err:#}"),
                    ));
                }
            }
        }

        counts.candidates_total =
            count_candidates(store.connection(), &relation.name, Some(split))?;

        info!(
            split = split.as_str(),
            documents = counts.document_count,
            enumerated = counts.tuples_enumerated,
            persisted = counts.candidates_persisted,
            total = counts.candidates_total,
            "split extracted"
        );
        split_counts.push(counts);
    }

    let status = if failures.is_empty() {
        "completed"
    } else {
        "completed_with_failures"
    };

    let manifest = ExtractRunManifest {
        manifest_version: 1,
        run_id,
        status: status.to_string(),
        started_at,
        updated_at: now_utc_string(),
        relation: relation.name.clone(),
        arity: relation.arity(),
        db_path: db_path.display().to_string(),
        splits: split_counts,
        failures,
    };

    write_json_pretty(&extract_manifest_path, &manifest)?;
    info!(path = %extract_manifest_path.display(), "wrote extract run manifest");
    info!(
        relation = %manifest.relation,
        failed = manifest.failures.len(),
        "extract completed"
    );

    Ok(())
}

/// Runs one extractor over a worker's share of a split. Every document
/// opens its own connection; the extractor is finished once the batch ends.
fn extract_batch<'d>(
    relation: &Relation,
    split: Split,
    db_path: &Path,
    doc_ids: &'d [String],
) -> Vec<(&'d String, Result<DocumentOutcome>)> {
    let mut extractor = CandidateExtractor::new(relation, split);

    let results = doc_ids
        .iter()
        .map(|doc_id| {
            let outcome = Store::open(db_path)
                .and_then(|mut store| extractor.process(&mut store, doc_id));
            if outcome.is_err() {
                debug!(
                    document = %doc_id,
                    state = ?extractor.state(),
                    "extractor reset after failure"
                );
            }
            (doc_id, outcome)
        })
        .collect();

    extractor.finish();
    debug!(
        split = split.as_str(),
        documents = doc_ids.len(),
        "extractor batch finished"
    );

    results
}
