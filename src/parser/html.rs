use std::collections::{HashMap, HashSet};

use anyhow::{Result, bail};
use scraper::node::Node;
use scraper::{ElementRef, Html};

use super::lingual::{normalize_whitespace, split_sentences, tokenize};
use super::{Cell, Deadline, Figure, Modalities, ParsedDocument, Phrase, Table};

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "cite", "code", "data", "dfn", "em", "font", "i", "kbd",
    "mark", "q", "s", "samp", "small", "span", "strong", "sub", "sup", "time", "u", "var",
];

const MAX_SPAN: i64 = 1000;

#[derive(Debug, Clone, Copy, Default)]
struct CellContext {
    table_position: Option<i64>,
    cell_position: Option<i64>,
}

struct HtmlWalker {
    modalities: Modalities,
    document: ParsedDocument,
    text_offset: usize,
    deadline: Deadline,
    expired: bool,
}

pub(super) fn parse_html(
    name: &str,
    source: &str,
    modalities: Modalities,
    deadline: Deadline,
) -> Result<ParsedDocument> {
    let html = Html::parse_document(source);
    let mut walker = HtmlWalker {
        modalities,
        document: ParsedDocument {
            name: name.to_string(),
            ..ParsedDocument::default()
        },
        text_offset: 0,
        deadline,
        expired: false,
    };

    walker.walk(html.root_element(), "/html", CellContext::default());
    if walker.expired {
        bail!("deadline passed while walking the HTML of {name}");
    }
    Ok(walker.document)
}

/// Image format from a figure URL: the lowercase file extension, or the MIME
/// subtype of a `data:` URL.
pub fn figure_format(url: &str) -> Option<String> {
    let url = url.trim();

    if let Some(rest) = url.strip_prefix("data:") {
        let mime = rest.split([';', ',']).next()?;
        let subtype = mime.trim().strip_prefix("image/")?;
        let subtype = subtype.split('+').next()?;
        return (!subtype.is_empty()).then(|| subtype.to_ascii_lowercase());
    }

    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let (stem, extension) = file_name.rsplit_once('.')?;
    if stem.is_empty()
        || extension.is_empty()
        || !extension.chars().all(|ch| ch.is_ascii_alphanumeric())
    {
        return None;
    }

    Some(extension.to_ascii_lowercase())
}

impl HtmlWalker {
    fn walk(&mut self, element: ElementRef<'_>, xpath: &str, cell: CellContext) {
        if self.expired || self.deadline.expired() {
            self.expired = true;
            return;
        }

        let tag = element.value().name();
        if SKIPPED_TAGS.contains(&tag) {
            return;
        }

        if tag == "head" {
            self.walk_head(element, xpath);
            return;
        }

        if tag == "img" {
            self.push_figure(element, xpath);
            return;
        }

        if tag == "table" && self.modalities.tabular {
            self.walk_table(element, xpath, cell);
            return;
        }

        let mut buffer = String::new();
        let mut sibling_counts = HashMap::<String, usize>::new();

        for child in element.children() {
            match child.value() {
                Node::Text(text) => buffer.push_str(text),
                Node::Element(_) => {
                    let Some(child_element) = ElementRef::wrap(child) else {
                        continue;
                    };
                    let child_tag = child_element.value().name();
                    let child_xpath = child_xpath(xpath, child_tag, &mut sibling_counts);

                    if child_tag == "br" {
                        buffer.push(' ');
                    } else if is_inline_text(child_element) {
                        buffer.extend(child_element.text());
                    } else {
                        self.emit_text(&buffer, element, xpath, cell);
                        buffer.clear();
                        self.walk(child_element, &child_xpath, cell);
                    }
                }
                _ => {}
            }
        }

        self.emit_text(&buffer, element, xpath, cell);
    }

    /// Only the document title carries text worth keeping in `head`.
    fn walk_head(&mut self, head: ElementRef<'_>, xpath: &str) {
        let mut sibling_counts = HashMap::<String, usize>::new();
        for child in head.children().filter_map(ElementRef::wrap) {
            let tag = child.value().name();
            let child_xpath = child_xpath(xpath, tag, &mut sibling_counts);
            if tag == "title" {
                let text = child.text().collect::<String>();
                self.emit_text(&text, child, &child_xpath, CellContext::default());
            }
        }
    }

    fn walk_table(&mut self, table: ElementRef<'_>, xpath: &str, outer: CellContext) {
        let table_position = self.document.tables.len() as i64;
        self.document.tables.push(Table {
            position: table_position,
            xpath: self.modalities.structural.then(|| xpath.to_string()),
        });

        let mut rows = Vec::<(ElementRef<'_>, String)>::new();
        let mut table_counts = HashMap::<String, usize>::new();
        for child in table.children().filter_map(ElementRef::wrap) {
            let tag = child.value().name();
            let section_xpath = child_xpath(xpath, tag, &mut table_counts);
            match tag {
                "tr" => rows.push((child, section_xpath)),
                "thead" | "tbody" | "tfoot" => {
                    let mut section_counts = HashMap::<String, usize>::new();
                    for row in child.children().filter_map(ElementRef::wrap) {
                        let row_tag = row.value().name();
                        let row_xpath = child_xpath(&section_xpath, row_tag, &mut section_counts);
                        if row_tag == "tr" {
                            rows.push((row, row_xpath));
                        }
                    }
                }
                _ => self.walk(child, &section_xpath, outer),
            }
        }

        let mut occupied = HashSet::<(i64, i64)>::new();
        for (row_index, (row, row_xpath)) in rows.into_iter().enumerate() {
            let row_index = row_index as i64;
            let mut col_index: i64 = 0;
            let mut cell_counts = HashMap::<String, usize>::new();

            for cell_element in row.children().filter_map(ElementRef::wrap) {
                let cell_tag = cell_element.value().name();
                let cell_xpath = child_xpath(&row_xpath, cell_tag, &mut cell_counts);
                if cell_tag != "td" && cell_tag != "th" {
                    continue;
                }

                while occupied.contains(&(row_index, col_index)) {
                    col_index += 1;
                }

                let row_span = span_attr(cell_element, "rowspan");
                let col_span = span_attr(cell_element, "colspan");
                for row in row_index..row_index + row_span {
                    for col in col_index..col_index + col_span {
                        occupied.insert((row, col));
                    }
                }

                let cell_position = self.document.cells.len() as i64;
                self.document.cells.push(Cell {
                    position: cell_position,
                    table_position,
                    row_start: row_index,
                    row_end: row_index + row_span - 1,
                    col_start: col_index,
                    col_end: col_index + col_span - 1,
                    text: normalize_whitespace(&cell_element.text().collect::<String>()),
                    xpath: self.modalities.structural.then(|| cell_xpath.clone()),
                });

                self.walk(
                    cell_element,
                    &cell_xpath,
                    CellContext {
                        table_position: Some(table_position),
                        cell_position: Some(cell_position),
                    },
                );

                col_index += col_span;
            }
        }
    }

    fn push_figure(&mut self, img: ElementRef<'_>, xpath: &str) {
        let Some(src) = img
            .value()
            .attr("src")
            .map(str::trim)
            .filter(|src| !src.is_empty())
        else {
            return;
        };

        let alt = img
            .value()
            .attr("alt")
            .map(normalize_whitespace)
            .filter(|alt| !alt.is_empty());

        self.document.figures.push(Figure {
            position: self.document.figures.len() as i64,
            url: src.to_string(),
            format: figure_format(src),
            alt,
            xpath: self.modalities.structural.then(|| xpath.to_string()),
            page: None,
            width: None,
            height: None,
        });
    }

    fn emit_text(&mut self, text: &str, owner: ElementRef<'_>, xpath: &str, cell: CellContext) {
        let normalized = normalize_whitespace(text);
        if normalized.is_empty() {
            return;
        }

        let lingual = self.modalities.lingual;
        let pieces = if lingual {
            split_sentences(&normalized)
        } else {
            vec![normalized.as_str()]
        };

        let (html_tag, html_xpath, html_attrs) = if self.modalities.structural {
            let mut attrs: Vec<String> = owner
                .value()
                .attrs()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            attrs.sort();
            (
                Some(owner.value().name().to_string()),
                Some(xpath.to_string()),
                attrs,
            )
        } else {
            (None, None, Vec::new())
        };

        for piece in pieces {
            let tokens = tokenize(piece, lingual);
            let position = self.document.phrases.len() as i64;

            self.document.phrases.push(Phrase {
                position,
                text: piece.to_string(),
                html_tag: html_tag.clone(),
                xpath: html_xpath.clone(),
                html_attrs: html_attrs.clone(),
                words: tokens.words,
                char_offsets: tokens.char_offsets,
                lemmas: tokens.lemmas,
                abs_char_offset: self.text_offset,
                table_position: cell.table_position,
                cell_position: cell.cell_position,
                bbox: None,
            });

            self.text_offset += piece.chars().count() + 1;
        }
    }
}

fn child_xpath(parent: &str, tag: &str, counts: &mut HashMap<String, usize>) -> String {
    let index = counts
        .entry(tag.to_string())
        .and_modify(|value| *value += 1)
        .or_insert(1);
    format!("{parent}/{tag}[{index}]")
}

/// Inline element whose whole subtree is inline text, so it can be merged into
/// the surrounding text block.
fn is_inline_text(element: ElementRef<'_>) -> bool {
    if !INLINE_TAGS.contains(&element.value().name()) {
        return false;
    }

    element.descendants().all(|node| match node.value() {
        Node::Element(child) => child.name() == "br" || INLINE_TAGS.contains(&child.name()),
        _ => true,
    })
}

fn span_attr(cell: ElementRef<'_>, name: &str) -> i64 {
    cell.value()
        .attr(name)
        .and_then(|value| value.trim().parse::<i64>().ok())
        .map(|value| value.clamp(1, MAX_SPAN))
        .unwrap_or(1)
}
