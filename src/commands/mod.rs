use std::path::{Path, PathBuf};

pub mod extract;
pub mod inventory;
pub mod parse;
pub mod show;
pub mod split;
pub mod status;

pub const DB_FILE_NAME: &str = "hwsheets.sqlite";
pub const INVENTORY_MANIFEST_FILE: &str = "corpus_inventory.json";

pub fn manifest_dir(work_root: &Path) -> PathBuf {
    work_root.join("manifests")
}

pub fn resolve_db_path(work_root: &Path, db_path: Option<&PathBuf>) -> PathBuf {
    db_path
        .cloned()
        .unwrap_or_else(|| work_root.join(DB_FILE_NAME))
}
