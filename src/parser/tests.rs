use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

use super::align::{align_figures, align_phrases};
use super::html::{figure_format, parse_html};
use super::lingual::{alignment_tokens, tokenize};
use super::pdf::{PdfImage, parse_bbox_layout, parse_image_list, run_tool};
use super::*;

const DATASHEET_HTML: &str = r#"<html><head><title>BC546</title><style>p { color: red; }</style></head>
<body>
<h1>BC546 NPN</h1>
<p class="intro">General purpose transistor. Low noise.</p>
<script>var ignored = "not text";</script>
<div><p>Second <b>bold</b> block</p></div>
</body></html>"#;

const BBOX_LAYOUT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<body>
<doc>
  <page width="595.000000" height="842.000000">
    <flow>
      <block xMin="10.000000" yMin="20.000000" xMax="70.000000" yMax="30.000000">
        <line xMin="10.000000" yMin="20.000000" xMax="70.000000" yMax="30.000000">
          <word xMin="10.000000" yMin="20.000000" xMax="40.000000" yMax="30.000000">BC546</word>
          <word xMin="45.000000" yMin="21.000000" xMax="70.000000" yMax="31.000000">NPN</word>
        </line>
      </block>
    </flow>
  </page>
  <page width="595.000000" height="842.000000">
    <flow>
      <block xMin="12.000000" yMin="100.000000" xMax="80.000000" yMax="110.000000">
        <line xMin="12.000000" yMin="100.000000" xMax="80.000000" yMax="110.000000">
          <word xMin="12.000000" yMin="100.000000" xMax="60.000000" yMax="110.000000">Low-noise</word>
          <word xMin="62.000000" yMin="100.000000" xMax="80.000000" yMax="110.000000">&amp;</word>
        </line>
      </block>
    </flow>
  </page>
</doc>
</body>
</html>
"#;

const IMAGE_LIST: &str = "page   num  type   width height color comp bpc  enc interp  object ID x-ppi y-ppi size ratio
--------------------------------------------------------------------------------------------
   1     0 image     320   240  rgb     3   8  image  no        12  0    72    72 12.3K 5.5%
   1     1 smask     320   240  gray    1   8  image  no        13  0    72    72 1.2K 1.6%
   2     2 image     100    80  rgb     3   8  jpeg   no        20  0    96    96 3.1K  13%
";

fn parse_fixture(name: &str, source: &str, modalities: Modalities) -> ParsedDocument {
    parse_html(name, source, modalities, Deadline::default()).expect("html should parse")
}

fn texts(document: &ParsedDocument) -> Vec<&str> {
    document
        .phrases
        .iter()
        .map(|phrase| phrase.text.as_str())
        .collect()
}

#[test]
fn parse_html_splits_blocks_into_sentences_in_document_order() {
    let document = parse_fixture("bc546", DATASHEET_HTML, Modalities::default());

    assert_eq!(
        texts(&document),
        vec![
            "BC546",
            "BC546 NPN",
            "General purpose transistor.",
            "Low noise.",
            "Second bold block"
        ]
    );

    for (index, phrase) in document.phrases.iter().enumerate() {
        assert_eq!(phrase.position, index as i64);
    }
    assert!(
        document
            .phrases
            .windows(2)
            .all(|pair| pair[0].abs_char_offset < pair[1].abs_char_offset)
    );

    let title = &document.phrases[0];
    assert_eq!(title.html_tag.as_deref(), Some("title"));
    assert_eq!(title.xpath.as_deref(), Some("/html/head[1]/title[1]"));

    let sentence = &document.phrases[2];
    assert_eq!(sentence.html_tag.as_deref(), Some("p"));
    assert_eq!(sentence.xpath.as_deref(), Some("/html/body[1]/p[1]"));
    assert_eq!(sentence.html_attrs, vec!["class=intro".to_string()]);
    assert_eq!(sentence.words, vec!["General", "purpose", "transistor"]);
    assert_eq!(sentence.char_offsets, vec![0, 8, 16]);
    assert_eq!(sentence.lemmas, vec!["general", "purpose", "transistor"]);

    assert_eq!(
        document.phrases[4].xpath.as_deref(),
        Some("/html/body[1]/div[1]/p[1]")
    );
}

#[test]
fn parse_html_without_lingual_keeps_blocks_whole() {
    let modalities = Modalities {
        lingual: false,
        ..Modalities::default()
    };
    let document = parse_fixture("bc546", DATASHEET_HTML, modalities);

    let block = &document.phrases[2];
    assert_eq!(block.text, "General purpose transistor. Low noise.");
    assert_eq!(
        block.words,
        vec!["General", "purpose", "transistor.", "Low", "noise."]
    );
    assert_eq!(block.char_offsets, vec![0, 8, 16, 28, 32]);
    assert_eq!(
        block.lemmas,
        vec!["general", "purpose", "transistor.", "low", "noise."]
    );
}

#[test]
fn parse_html_reads_only_the_title_from_head() {
    let document = parse_fixture(
        "t",
        r#"<html><head><meta charset="utf-8"><title>BC546 datasheet</title>
<script>var x = "skip";</script></head><body><p>x</p></body></html>"#,
        Modalities::default(),
    );

    assert_eq!(texts(&document), vec!["BC546 datasheet", "x"]);
    assert_eq!(document.phrases[0].position, 0);
}

#[test]
fn parse_html_stops_at_an_expired_deadline() {
    let err = parse_html(
        "late",
        DATASHEET_HTML,
        Modalities::default(),
        Deadline::after(Duration::ZERO),
    )
    .expect_err("expired deadline");
    assert!(err.to_string().contains("deadline"));
}

#[test]
fn parse_html_without_structural_drops_markup_annotations() {
    let modalities = Modalities {
        structural: false,
        ..Modalities::default()
    };
    let document = parse_fixture("bc546", DATASHEET_HTML, modalities);

    assert!(document.phrases.iter().all(|phrase| phrase.xpath.is_none()
        && phrase.html_tag.is_none()
        && phrase.html_attrs.is_empty()));
}

#[test]
fn parse_html_builds_table_grid_with_spans() {
    let source = r#"<html><body>
<table><caption>Limits</caption>
<tr><th rowspan="2">Param</th><th colspan="2">Value</th></tr>
<tr><td>Min</td><td>Max</td></tr>
<tr><td>VCE</td><td>30</td><td>65</td></tr>
</table>
<p>After table</p>
</body></html>"#;

    let document = parse_fixture("limits", source, Modalities::default());

    assert_eq!(document.tables.len(), 1);
    assert_eq!(document.cells.len(), 7);

    let grid: Vec<(&str, i64, i64, i64, i64)> = document
        .cells
        .iter()
        .map(|cell| {
            (
                cell.text.as_str(),
                cell.row_start,
                cell.row_end,
                cell.col_start,
                cell.col_end,
            )
        })
        .collect();
    assert_eq!(grid[0], ("Param", 0, 1, 0, 0));
    assert_eq!(grid[1], ("Value", 0, 0, 1, 2));
    assert_eq!(grid[2], ("Min", 1, 1, 1, 1));
    assert_eq!(grid[3], ("Max", 1, 1, 2, 2));
    assert_eq!(grid[4], ("VCE", 2, 2, 0, 0));

    let caption = &document.phrases[0];
    assert_eq!(caption.text, "Limits");
    assert_eq!(caption.cell_position, None);

    let min = document
        .phrases
        .iter()
        .find(|phrase| phrase.text == "Min")
        .expect("cell phrase should exist");
    assert_eq!(min.table_position, Some(0));
    assert_eq!(min.cell_position, Some(2));

    let after = document.phrases.last().expect("trailing phrase");
    assert_eq!(after.text, "After table");
    assert_eq!(after.table_position, None);
}

#[test]
fn parse_html_without_tabular_reads_tables_as_text() {
    let source = "<html><body><table><tr><td>VCE</td><td>65</td></tr></table></body></html>";
    let modalities = Modalities {
        tabular: false,
        ..Modalities::default()
    };
    let document = parse_fixture("limits", source, modalities);

    assert!(document.tables.is_empty());
    assert!(document.cells.is_empty());
    assert_eq!(texts(&document), vec!["VCE", "65"]);
}

#[test]
fn parse_html_collects_figures_with_formats() {
    let source = r#"<html><body>
<p>Pinout <img src="img/to92.PNG" alt="TO-92 package"></p>
<a href="curves.html"><img src="images/curve.jpg?v=2"></a>
<img src="data:image/png;base64,iVBORw0KGgo=">
<img alt="missing source">
</body></html>"#;

    let document = parse_fixture("figures", source, Modalities::default());

    let figures: Vec<(i64, &str, Option<&str>)> = document
        .figures
        .iter()
        .map(|figure| (figure.position, figure.url.as_str(), figure.format.as_deref()))
        .collect();
    assert_eq!(
        figures,
        vec![
            (0, "img/to92.PNG", Some("png")),
            (1, "images/curve.jpg?v=2", Some("jpg")),
            (2, "data:image/png;base64,iVBORw0KGgo=", Some("png")),
        ]
    );
    assert_eq!(document.figures[0].alt.as_deref(), Some("TO-92 package"));
    assert_eq!(texts(&document), vec!["Pinout"]);
}

#[test]
fn figure_format_handles_paths_queries_and_data_urls() {
    assert_eq!(figure_format("a/b/c.png"), Some("png".to_string()));
    assert_eq!(figure_format("C.JPEG#frag"), Some("jpeg".to_string()));
    assert_eq!(figure_format("data:image/svg+xml;utf8,<svg/>"), Some("svg".to_string()));
    assert_eq!(figure_format("images/noext"), None);
    assert_eq!(figure_format("dir.v2/file"), None);
    assert_eq!(figure_format(".hidden"), None);
    assert_eq!(figure_format("data:text/plain,hello"), None);
}

#[test]
fn tokenize_reports_character_offsets_for_non_ascii_text() {
    let tokens = tokenize("Ic ≤ 100 mA", true);
    assert_eq!(tokens.words, vec!["Ic", "100", "mA"]);
    assert_eq!(tokens.char_offsets, vec![0, 5, 9]);
}

#[test]
fn alignment_tokens_split_on_punctuation() {
    assert_eq!(
        alignment_tokens("Low-noise, 3.5V BC546"),
        vec!["low", "noise", "3", "5v", "bc546"]
    );
}

#[test]
fn parse_bbox_layout_reads_pages_and_words() {
    let layer = parse_bbox_layout(BBOX_LAYOUT).expect("layout should parse");

    assert_eq!(layer.pages.len(), 2);
    assert_eq!(layer.pages[1].number, 2);
    assert_eq!(layer.pages[0].width, 595.0);
    assert_eq!(layer.words.len(), 4);
    assert_eq!(layer.words[2].text, "Low-noise");
    assert_eq!(layer.words[2].page, 2);
    assert_eq!(layer.words[3].text, "&");
}

#[test]
fn parse_bbox_layout_rejects_words_outside_pages() {
    let err = parse_bbox_layout(
        r#"<word xMin="1.0" yMin="1.0" xMax="2.0" yMax="2.0">orphan</word>"#,
    )
    .expect_err("orphan word should fail");
    assert!(err.to_string().contains("before any page"));
}

#[test]
fn parse_image_list_keeps_only_image_rows() {
    let images = parse_image_list(IMAGE_LIST);
    assert_eq!(
        images,
        vec![
            PdfImage {
                page: 1,
                width: 320,
                height: 240
            },
            PdfImage {
                page: 2,
                width: 100,
                height: 80
            },
        ]
    );
}

#[test]
fn align_phrases_assigns_pages_and_union_boxes() {
    let layer = parse_bbox_layout(BBOX_LAYOUT).expect("layout should parse");
    let mut phrases = vec![
        Phrase {
            text: "BC546 NPN".to_string(),
            ..Phrase::default()
        },
        Phrase {
            text: "Not in the PDF at all".to_string(),
            position: 1,
            ..Phrase::default()
        },
        Phrase {
            text: "Low noise".to_string(),
            position: 2,
            ..Phrase::default()
        },
    ];

    let aligned = align_phrases(&mut phrases, &layer);

    assert_eq!(aligned, 2);
    let first = phrases[0].bbox.expect("first phrase aligned");
    assert_eq!(first.page, 1);
    assert_eq!((first.left, first.top, first.right, first.bottom), (10.0, 20.0, 70.0, 31.0));
    assert!(phrases[1].bbox.is_none());
    let third = phrases[2].bbox.expect("third phrase aligned");
    assert_eq!(third.page, 2);
    assert_eq!((third.left, third.right), (12.0, 60.0));
}

#[test]
fn align_figures_pairs_in_order() {
    let mut document = parse_fixture(
        "figures",
        r#"<html><body><img src="a.png"><img src="b.png"><img src="c.png"></body></html>"#,
        Modalities::default(),
    );
    align_figures(&mut document.figures, &parse_image_list(IMAGE_LIST));

    assert_eq!(document.figures[0].page, Some(1));
    assert_eq!(document.figures[1].page, Some(2));
    assert_eq!(document.figures[1].width, Some(100));
    assert_eq!(document.figures[2].page, None);
}

#[test]
fn parse_document_without_visual_never_touches_pdf() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let html_path = dir.path().join("bc546.html");
    fs::write(&html_path, DATASHEET_HTML).expect("fixture should be written");

    let raw = RawDocument {
        name: "bc546".to_string(),
        html_path,
        pdf_path: dir.path().join("missing.pdf"),
        html_sha256: String::new(),
        pdf_sha256: String::new(),
    };
    let modalities = Modalities {
        visual: false,
        ..Modalities::default()
    };

    let document = parse_document(&raw, modalities, None, Deadline::default())
        .expect("parse should succeed");
    assert_eq!(document.phrases.len(), 5);
    assert!(document.pages.is_empty());
    assert!(document.warnings.is_empty());
}

#[test]
fn parse_document_degrades_to_warnings_when_pdf_is_unreadable() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let html_path = dir.path().join("bc546.html");
    fs::write(&html_path, DATASHEET_HTML).expect("fixture should be written");

    let raw = RawDocument {
        name: "bc546".to_string(),
        html_path,
        pdf_path: dir.path().join("missing.pdf"),
        html_sha256: String::new(),
        pdf_sha256: String::new(),
    };

    let document = parse_document(&raw, Modalities::default(), None, Deadline::default())
        .expect("parse should succeed");
    assert_eq!(document.phrases.len(), 5);
    assert_eq!(document.warnings.len(), 2);
    assert_eq!(document.aligned_phrase_count(), 0);
}

#[test]
fn parse_document_fails_for_missing_html() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let raw = RawDocument {
        name: "ghost".to_string(),
        html_path: dir.path().join("ghost.html"),
        pdf_path: dir.path().join("ghost.pdf"),
        html_sha256: String::new(),
        pdf_sha256: String::new(),
    };

    assert!(parse_document(&raw, Modalities::default(), None, Deadline::default()).is_err());
}

#[cfg(unix)]
#[test]
fn run_tool_returns_stdout_of_a_successful_tool() {
    let mut command = Command::new("echo");
    command.arg("BC546");
    let stdout = run_tool(&mut command, "echo", Path::new("bc546.pdf"), Deadline::default())
        .expect("echo should run");
    assert_eq!(stdout.trim(), "BC546");
}

#[cfg(unix)]
#[test]
fn run_tool_kills_a_tool_that_outlives_the_deadline() {
    let mut command = Command::new("sleep");
    command.arg("30");
    let started = Instant::now();

    let err = run_tool(
        &mut command,
        "sleep",
        Path::new("slow.pdf"),
        Deadline::after(Duration::from_millis(100)),
    )
    .expect_err("sleep should be killed");

    assert!(err.to_string().contains("deadline"));
    assert!(started.elapsed() < Duration::from_secs(10));
}
