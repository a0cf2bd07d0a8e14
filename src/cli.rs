use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::candidates::DEFAULT_RELATION;
use crate::split::Split;

#[derive(Parser, Debug)]
#[command(
    name = "hwsheets",
    version,
    about = "Datasheet ingestion and candidate extraction over paired PDF/HTML corpora"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Inventory(InventoryArgs),
    Parse(ParseArgs),
    Split(SplitArgs),
    Extract(ExtractArgs),
    Status(StatusArgs),
    Show(ShowArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CorpusArgs {
    #[arg(long, default_value = "data")]
    pub corpus_root: PathBuf,

    /// Defaults to `<corpus-root>/html`.
    #[arg(long)]
    pub html_dir: Option<PathBuf>,

    /// Defaults to `<corpus-root>/pdf`.
    #[arg(long)]
    pub pdf_dir: Option<PathBuf>,

    #[arg(long)]
    pub max_docs: Option<usize>,
}

impl CorpusArgs {
    pub fn html_dir(&self) -> PathBuf {
        self.html_dir
            .clone()
            .unwrap_or_else(|| self.corpus_root.join("html"))
    }

    pub fn pdf_dir(&self) -> PathBuf {
        self.pdf_dir
            .clone()
            .unwrap_or_else(|| self.corpus_root.join("pdf"))
    }
}

#[derive(Args, Debug, Clone)]
pub struct InventoryArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,

    #[arg(long, default_value = ".cache/hwsheets")]
    pub work_root: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ParseArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,

    #[arg(long, default_value = ".cache/hwsheets")]
    pub work_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub inventory_manifest_path: Option<PathBuf>,

    #[arg(long)]
    pub parse_manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub refresh_inventory: bool,

    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    #[arg(long, default_value_t = 120)]
    pub doc_timeout_secs: u64,

    #[arg(long)]
    pub max_pages_per_doc: Option<usize>,

    #[arg(long, default_value_t = false)]
    pub no_structural: bool,

    #[arg(long, default_value_t = false)]
    pub no_lingual: bool,

    #[arg(long, default_value_t = false)]
    pub no_tabular: bool,

    #[arg(long, default_value_t = false)]
    pub no_visual: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SplitArgs {
    #[arg(long, default_value = ".cache/hwsheets")]
    pub work_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Cumulative fraction of documents labelled train.
    #[arg(long, default_value_t = 0.5)]
    pub train_fraction: f64,

    /// Cumulative fraction of documents labelled train or dev.
    #[arg(long, default_value_t = 0.75)]
    pub dev_fraction: f64,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[arg(long, default_value = ".cache/hwsheets")]
    pub work_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Only this split; every split when omitted.
    #[arg(long, value_enum)]
    pub split: Option<Split>,

    /// JSON relation definition; the built-in `transistor_image` relation when omitted.
    #[arg(long)]
    pub relation_config: Option<PathBuf>,

    #[arg(long)]
    pub extract_manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = 4)]
    pub workers: usize,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/hwsheets")]
    pub work_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    #[arg(long, default_value = ".cache/hwsheets")]
    pub work_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_RELATION)]
    pub relation: String,

    #[arg(long, value_enum, default_value_t = Split::Train)]
    pub split: Split,

    #[arg(long, default_value_t = 0)]
    pub index: usize,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}
