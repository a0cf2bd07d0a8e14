use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;

use super::Deadline;

const TOOL_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub struct PdfPage {
    pub number: i64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PdfWord {
    pub page: i64,
    pub text: String,
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PdfWordLayer {
    pub pages: Vec<PdfPage>,
    pub words: Vec<PdfWord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfImage {
    pub page: i64,
    pub width: i64,
    pub height: i64,
}

pub fn extract_word_layer(
    pdf_path: &Path,
    max_pages: Option<usize>,
    deadline: Deadline,
) -> Result<PdfWordLayer> {
    let mut command = Command::new("pdftotext");
    command.arg("-bbox-layout").arg("-enc").arg("UTF-8").arg("-f").arg("1");
    if let Some(max_pages) = max_pages {
        command.arg("-l").arg(max_pages.to_string());
    }
    command.arg(pdf_path).arg("-");

    let stdout = run_tool(&mut command, "pdftotext", pdf_path, deadline)?;
    parse_bbox_layout(&stdout)
}

pub fn extract_image_list(
    pdf_path: &Path,
    max_pages: Option<usize>,
    deadline: Deadline,
) -> Result<Vec<PdfImage>> {
    let mut command = Command::new("pdfimages");
    command.arg("-list").arg("-f").arg("1");
    if let Some(max_pages) = max_pages {
        command.arg("-l").arg(max_pages.to_string());
    }
    command.arg(pdf_path);

    let stdout = run_tool(&mut command, "pdfimages", pdf_path, deadline)?;
    Ok(parse_image_list(&stdout))
}

/// Runs a poppler tool to completion, killing it once `deadline` passes.
/// Output pipes are drained on their own threads while the child is polled.
pub(super) fn run_tool(
    command: &mut Command,
    program: &str,
    pdf_path: &Path,
    deadline: Deadline,
) -> Result<String> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to execute {program} for {}", pdf_path.display()))?;
    let mut stdout_pipe = child
        .stdout
        .take()
        .with_context(|| format!("{program} stdout was not captured"))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .with_context(|| format!("{program} stderr was not captured"))?;

    thread::scope(|scope| -> Result<String> {
        let stdout_reader = scope.spawn(move || {
            let mut buffer = Vec::new();
            stdout_pipe.read_to_end(&mut buffer).map(|_| buffer)
        });
        let stderr_reader = scope.spawn(move || {
            let mut buffer = Vec::new();
            stderr_pipe.read_to_end(&mut buffer).map(|_| buffer)
        });

        let status = loop {
            let exited = child
                .try_wait()
                .with_context(|| format!("failed to wait for {program}"))?;
            if let Some(status) = exited {
                break status;
            }
            if deadline.expired() {
                let _ = child.kill();
                let _ = child.wait();
                bail!(
                    "{program} killed at the document deadline for {}",
                    pdf_path.display()
                );
            }
            thread::sleep(TOOL_POLL_INTERVAL);
        };

        let stdout = stdout_reader
            .join()
            .map_err(|_| anyhow!("{program} stdout reader panicked"))?
            .with_context(|| format!("failed to read {program} stdout"))?;
        let stderr = stderr_reader
            .join()
            .map_err(|_| anyhow!("{program} stderr reader panicked"))?
            .with_context(|| format!("failed to read {program} stderr"))?;

        if !status.success() {
            bail!(
                "{program} returned non-zero exit status for {}: {}",
                pdf_path.display(),
                String::from_utf8_lossy(&stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&stdout).replace('\u{0000}', ""))
    })
}

pub(super) fn parse_bbox_layout(xhtml: &str) -> Result<PdfWordLayer> {
    let element_regex = Regex::new(
        r#"<page width="(?P<pw>[-\d.]+)" height="(?P<ph>[-\d.]+)">|<word xMin="(?P<x0>[-\d.]+)" yMin="(?P<y0>[-\d.]+)" xMax="(?P<x1>[-\d.]+)" yMax="(?P<y1>[-\d.]+)">(?P<text>[^<]*)</word>"#,
    )
    .context("failed to compile bbox layout regex")?;

    let mut layer = PdfWordLayer::default();

    for captures in element_regex.captures_iter(xhtml) {
        if let (Some(width), Some(height)) = (captures.name("pw"), captures.name("ph")) {
            layer.pages.push(PdfPage {
                number: layer.pages.len() as i64 + 1,
                width: parse_coordinate(width.as_str())?,
                height: parse_coordinate(height.as_str())?,
            });
            continue;
        }

        let Some(page) = layer.pages.last().map(|page| page.number) else {
            bail!("word element found before any page element");
        };

        let field = |name: &str| -> Result<f64> {
            let value = captures
                .name(name)
                .with_context(|| format!("missing {name} capture in word element"))?;
            parse_coordinate(value.as_str())
        };

        let text = captures
            .name("text")
            .map(|value| decode_entities(value.as_str()))
            .unwrap_or_default();
        if text.trim().is_empty() {
            continue;
        }

        layer.words.push(PdfWord {
            page,
            text,
            left: field("x0")?,
            top: field("y0")?,
            right: field("x1")?,
            bottom: field("y1")?,
        });
    }

    Ok(layer)
}

pub(super) fn parse_image_list(listing: &str) -> Vec<PdfImage> {
    let mut images = Vec::new();
    let mut past_header = false;

    for line in listing.lines() {
        let trimmed = line.trim();
        if !past_header {
            past_header = trimmed.starts_with("---");
            continue;
        }

        let columns: Vec<&str> = trimmed.split_whitespace().collect();
        if columns.len() < 5 || columns[2] != "image" {
            continue;
        }

        let (Ok(page), Ok(width), Ok(height)) = (
            columns[0].parse::<i64>(),
            columns[3].parse::<i64>(),
            columns[4].parse::<i64>(),
        ) else {
            continue;
        };

        images.push(PdfImage {
            page,
            width,
            height,
        });
    }

    images
}

fn parse_coordinate(raw: &str) -> Result<f64> {
    raw.parse::<f64>()
        .with_context(|| format!("invalid coordinate in bbox layout: {raw}"))
}

fn decode_entities(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// First non-empty line of a tool's version banner, if the tool runs at all.
pub fn tool_version(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let source = if stdout.trim().is_empty() {
        stderr.trim()
    } else {
        stdout.trim()
    };

    source
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
}
