//! Paginated PDF rendering of a summary with lopdf.
//!
//! Uses the standard Helvetica fonts with WinAnsi encoding, so no font data
//! is embedded. Layout works in whole points.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use serde::Deserialize;

use crate::error::{AppError, Result};

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 56;
const BODY_SIZE: i64 = 11;
const TITLE_SIZE: i64 = 16;
const LINE_HEIGHT: i64 = 15;
const PRINTABLE_WIDTH: i64 = PAGE_WIDTH - 2 * MARGIN;

const REGULAR: &str = "F1";
const BOLD: &str = "F2";

#[derive(Debug, Clone, Deserialize)]
pub struct PdfRequest {
    pub summary: String,
    pub title: Option<String>,
    pub provider: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct TextLine {
    font: &'static str,
    size: i64,
    x: i64,
    y: i64,
    bytes: Vec<u8>,
}

/// Render the summary to PDF bytes.
pub fn render_summary(req: &PdfRequest) -> Result<Vec<u8>> {
    if req.summary.trim().is_empty() {
        return Err(AppError::bad_request("Summary must not be empty"));
    }

    let title = req
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("Summary");
    let provider = req.provider.as_deref().map(str::trim).filter(|p| !p.is_empty());

    let pages = layout(title, provider, &req.summary);
    build_document(pages)
}

fn layout(title: &str, provider: Option<&str>, summary: &str) -> Vec<Vec<TextLine>> {
    let mut pages: Vec<Vec<TextLine>> = vec![Vec::new()];
    let mut y = PAGE_HEIGHT - MARGIN - TITLE_SIZE;

    for (i, line) in wrap(&encode_win_ansi(title), TITLE_SIZE).into_iter().enumerate() {
        if i > 0 {
            y -= TITLE_SIZE + 4;
        }
        push_line(&mut pages, y, BOLD, TITLE_SIZE, line);
    }

    if let Some(provider) = provider {
        let label = encode_win_ansi(&format!("Provider: {}", provider));
        for line in wrap(&label, BODY_SIZE) {
            y -= LINE_HEIGHT;
            push_line(&mut pages, y, REGULAR, BODY_SIZE, line);
        }
    }
    y -= LINE_HEIGHT / 2;

    for paragraph in summary.lines() {
        let encoded = encode_win_ansi(paragraph.trim_end());
        for line in wrap(&encoded, BODY_SIZE) {
            if y - LINE_HEIGHT < MARGIN {
                pages.push(Vec::new());
                y = PAGE_HEIGHT - MARGIN;
            }
            y -= LINE_HEIGHT;
            push_line(&mut pages, y, REGULAR, BODY_SIZE, line);
        }
    }

    pages
}

/// Append to the last page. Empty lines only move the cursor.
fn push_line(pages: &mut [Vec<TextLine>], y: i64, font: &'static str, size: i64, bytes: Vec<u8>) {
    if bytes.is_empty() {
        return;
    }
    if let Some(page) = pages.last_mut() {
        page.push(TextLine {
            font,
            size,
            x: MARGIN,
            y,
            bytes,
        });
    }
}

fn footer(index: usize, total: usize) -> TextLine {
    let bytes = format!("Page {} of {}", index, total).into_bytes();
    let width = text_width(&bytes, BODY_SIZE);
    TextLine {
        font: REGULAR,
        size: BODY_SIZE,
        x: (PAGE_WIDTH - width) / 2,
        y: MARGIN / 2,
        bytes,
    }
}

fn build_document(pages: Vec<Vec<TextLine>>) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font = |base: &str| {
        dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => base.to_string(),
            "Encoding" => "WinAnsiEncoding",
        }
    };
    let regular_id = doc.add_object(font("Helvetica"));
    let bold_id = doc.add_object(font("Helvetica-Bold"));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            REGULAR => regular_id,
            BOLD => bold_id,
        },
    });

    let total = pages.len();
    let mut kids: Vec<Object> = Vec::with_capacity(total);
    for (i, mut lines) in pages.into_iter().enumerate() {
        lines.push(footer(i + 1, total));
        let page_id = add_page(&mut doc, pages_id, &lines)?;
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => total as i64,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).map_err(lopdf::Error::from)?;
    Ok(buf)
}

fn add_page(doc: &mut Document, parent: ObjectId, lines: &[TextLine]) -> Result<ObjectId> {
    let mut operations = Vec::with_capacity(lines.len() * 5);
    for line in lines {
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new("Tf", vec![line.font.into(), line.size.into()]));
        operations.push(Operation::new("Td", vec![line.x.into(), line.y.into()]));
        operations.push(Operation::new(
            "Tj",
            vec![Object::string_literal(line.bytes.clone())],
        ));
        operations.push(Operation::new("ET", vec![]));
    }

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => parent,
        "Contents" => content_id,
    }))
}

/// Greedy word wrap to the printable width. Words wider than a line are split.
/// An empty input yields one empty line so blank paragraphs keep their space.
fn wrap(text: &[u8], size: i64) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    let mut current: Vec<u8> = Vec::new();

    for word in text.split(|b| *b == b' ').filter(|w| !w.is_empty()) {
        let mut candidate = current.clone();
        if !candidate.is_empty() {
            candidate.push(b' ');
        }
        candidate.extend_from_slice(word);
        if text_width(&candidate, size) <= PRINTABLE_WIDTH {
            current = candidate;
            continue;
        }

        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        for &b in word {
            current.push(b);
            if text_width(&current, size) > PRINTABLE_WIDTH && current.len() > 1 {
                current.pop();
                lines.push(std::mem::replace(&mut current, vec![b]));
            }
        }
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Width in points, rounded up.
fn text_width(bytes: &[u8], size: i64) -> i64 {
    let units: i64 = bytes.iter().map(|b| glyph_width(*b)).sum();
    (units * size + 999) / 1000
}

/// Helvetica advance widths per 1000 em for printable ASCII.
const HELVETICA_ASCII: [i64; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0..?
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // @..O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // P.._
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // `..o
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // p..~
];

fn glyph_width(b: u8) -> i64 {
    match b {
        0x20..=0x7e => HELVETICA_ASCII[(b - 0x20) as usize],
        _ => 556,
    }
}

/// Map text onto WinAnsiEncoding bytes. Unsupported characters become `?`.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
            '\t' => b' ',
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            '\u{20ac}' => 0x80,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201c}' => 0x93,
            '\u{201d}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2026}' => 0x85,
            _ => b'?',
        })
        .collect()
}
