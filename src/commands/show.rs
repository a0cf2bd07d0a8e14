use std::io::{self, Write};

use anyhow::{Context, Result, bail};

use crate::cli::ShowArgs;
use crate::commands::resolve_db_path;
use crate::store::{CandidateView, Store, candidate_at, count_candidates};

pub fn run(args: ShowArgs) -> Result<()> {
    let db_path = resolve_db_path(&args.work_root, args.db_path.as_ref());
    if !db_path.exists() {
        bail!("store not found at {}", db_path.display());
    }
    let store = Store::open(&db_path)?;

    let Some(candidate) = candidate_at(store.connection(), &args.relation, args.split, args.index)?
    else {
        let available = count_candidates(store.connection(), &args.relation, Some(args.split))?;
        bail!(
            "no candidate at index {} for relation {} in {} ({} available)",
            args.index,
            args.relation,
            args.split.as_str(),
            available
        );
    };

    let mut output = io::BufWriter::new(io::stdout().lock());
    if args.json {
        serde_json::to_writer_pretty(&mut output, &candidate)
            .context("failed to serialize candidate json output")?;
        writeln!(output)?;
    } else {
        write_text(&mut output, &candidate)?;
    }
    output.flush()?;
    Ok(())
}

fn write_text(output: &mut impl Write, candidate: &CandidateView) -> Result<()> {
    writeln!(output, "Candidate: {}", candidate.candidate_id)?;
    writeln!(
        output,
        "Relation: {} split={} document={}",
        candidate.relation,
        candidate.split.as_str(),
        candidate.doc_id
    )?;

    for argument in &candidate.arguments {
        let page = argument
            .page
            .map(|page| page.to_string())
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            output,
            "{}.\t{}\t{}\tpage {}",
            argument.position, argument.element_type, argument.element_id, page
        )?;
        if let Some(url) = &argument.url {
            let format = argument.format.as_deref().unwrap_or("unknown");
            writeln!(output, "\turl={url} format={format}")?;
        }
        if let Some(text) = &argument.text {
            writeln!(output, "\t{text}")?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::model::RawDocument;
    use crate::parser::{Figure, ParsedDocument};
    use crate::split::Split;
    use crate::store::{ElementKind, ElementRef, figure_id, persist_document, replace_candidates};

    #[test]
    fn write_text_lists_arguments_with_urls() {
        let mut store = Store::open_in_memory().expect("store");
        let raw = RawDocument {
            name: "bc546".to_string(),
            html_path: PathBuf::from("bc546.html"),
            pdf_path: PathBuf::from("bc546.pdf"),
            html_sha256: String::new(),
            pdf_sha256: String::new(),
        };
        let parsed = ParsedDocument {
            name: "bc546".to_string(),
            figures: vec![Figure {
                position: 0,
                url: "img/to92.png".to_string(),
                format: Some("png".to_string()),
                alt: None,
                xpath: None,
                page: Some(2),
                width: None,
                height: None,
            }],
            ..ParsedDocument::default()
        };
        persist_document(&mut store, &raw, &parsed).expect("persist");
        let tuple = vec![ElementRef {
            kind: ElementKind::Figure,
            id: figure_id("bc546", 0),
        }];
        replace_candidates(&mut store, "transistor_image", "bc546", Split::Train, &[tuple])
            .expect("candidates");

        let candidate = candidate_at(store.connection(), "transistor_image", Split::Train, 0)
            .expect("lookup")
            .expect("candidate");
        let mut buffer = Vec::new();
        write_text(&mut buffer, &candidate).expect("write");
        let text = String::from_utf8(buffer).expect("utf8");

        assert!(text.starts_with("Candidate: transistor_image:train:bc546:figure:000\n"));
        assert!(text.contains("Relation: transistor_image split=train document=bc546"));
        assert!(text.contains("0.\tfigure\tbc546:figure:000\tpage 2"));
        assert!(text.contains("\turl=img/to92.png format=png"));
    }
}
