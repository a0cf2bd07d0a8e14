use anyhow::{Result, bail};
use tracing::info;

use crate::cli::SplitArgs;
use crate::commands::resolve_db_path;
use crate::split::{Split, SplitFractions, assign_splits};
use crate::store::{Store, apply_split_assignment, document_names};

pub fn run(args: SplitArgs) -> Result<()> {
    let fractions = SplitFractions::new(args.train_fraction, args.dev_fraction)?;
    let db_path = resolve_db_path(&args.work_root, args.db_path.as_ref());
    if !db_path.exists() {
        bail!(
            "store not found at {}; run `hwsheets parse` first",
            db_path.display()
        );
    }

    let mut store = Store::open_and_migrate(&db_path)?;
    let names = document_names(store.connection())?;
    if names.is_empty() {
        bail!("no parsed documents in {}", db_path.display());
    }

    let assignment = assign_splits(&names, fractions);
    let updated = apply_split_assignment(&mut store, &assignment)?;

    for split in Split::ALL {
        let documents = assignment
            .iter()
            .filter(|(_, assigned)| *assigned == split)
            .count();
        info!(split = split.as_str(), documents, "split assigned");
    }
    info!(
        updated,
        train_end = fractions.train_end,
        dev_end = fractions.dev_end,
        "split completed"
    );

    Ok(())
}
