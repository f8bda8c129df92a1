//! Markdown → PDF rendering with `pulldown-cmark` and `lopdf`.
//!
//! The Markdown event stream is laid out on US-Letter pages using the
//! standard Type1 fonts, so no font files are embedded. Headings use
//! Helvetica-Bold, body text Helvetica, code blocks Courier. Inline emphasis
//! is rendered in the surrounding block's font.

use crate::error::ExtractError;
use crate::export::markdown::display_title;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use std::path::Path;
use tracing::{debug, info};

const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 72.0;
const BODY_SIZE: f32 = 11.0;
const CODE_SIZE: f32 = 9.0;
const LIST_INDENT: f32 = 18.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
    Mono,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
            Font::Mono => "F3",
        }
    }

    /// Average glyph advance as a fraction of the font size.
    fn advance(self) -> f32 {
        match self {
            Font::Regular => 0.5,
            Font::Bold => 0.55,
            Font::Mono => 0.6,
        }
    }
}

/// Lays out lines top to bottom, starting a new page when the cursor
/// reaches the bottom margin.
struct Layout {
    pages: Vec<Vec<Operation>>,
    y: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn ops(&mut self) -> &mut Vec<Operation> {
        if self.pages.is_empty() {
            self.pages.push(Vec::new());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn ensure_room(&mut self, height: f32) {
        if self.y - height < MARGIN {
            self.pages.push(Vec::new());
            self.y = PAGE_HEIGHT - MARGIN;
        }
    }

    fn space(&mut self, points: f32) {
        self.y -= points;
    }

    fn line(&mut self, text: &str, font: Font, size: f32, indent: f32) {
        let leading = size * 1.35;
        self.ensure_room(leading);
        self.y -= leading;
        let x = MARGIN + indent;
        let y = self.y;
        self.ops().extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font.resource().into(), size.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new("Tj", vec![Object::string_literal(encode_win_ansi(text))]),
            Operation::new("ET", vec![]),
        ]);
    }

    /// Wrap `text` to the usable width and emit it; `prefix` goes on the
    /// first line, continuation lines are indented past it.
    fn paragraph(&mut self, text: &str, font: Font, size: f32, indent: f32, prefix: &str) {
        let prefix_width = prefix.chars().count() as f32 * size * font.advance();
        let width = PAGE_WIDTH - 2.0 * MARGIN - indent - prefix_width;
        let max_chars = ((width / (size * font.advance())) as usize).max(10);

        for (i, line) in wrap(text, max_chars).iter().enumerate() {
            if i == 0 {
                self.line(&format!("{}{}", prefix, line), font, size, indent);
            } else {
                self.line(line, font, size, indent + prefix_width);
            }
        }
    }

    fn rule(&mut self) {
        self.ensure_room(12.0);
        self.y -= 6.0;
        let y = self.y;
        self.ops().extend([
            Operation::new("w", vec![0.5f32.into()]),
            Operation::new("m", vec![MARGIN.into(), y.into()]),
            Operation::new("l", vec![(PAGE_WIDTH - MARGIN).into(), y.into()]),
            Operation::new("S", vec![]),
        ]);
        self.y -= 6.0;
    }
}

/// Greedy word wrap at `max_chars`; words longer than a line are split.
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Map text onto WinAnsiEncoding bytes; unmappable characters become `?`.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{20}'..='\u{7E}' => c as u8,
            '\u{A0}'..='\u{FF}' => c as u8,
            '€' => 0x80,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '\t' => b' ',
            _ => b'?',
        })
        .collect()
}

fn heading_style(level: HeadingLevel) -> (f32, f32) {
    // (font size, space before)
    match level {
        HeadingLevel::H1 => (20.0, 14.0),
        HeadingLevel::H2 => (16.0, 12.0),
        HeadingLevel::H3 => (13.0, 10.0),
        _ => (12.0, 8.0),
    }
}

/// Block currently collecting inline text.
enum Block {
    None,
    Paragraph,
    Heading(HeadingLevel),
    Code,
    TableCell,
}

struct Renderer {
    layout: Layout,
    block: Block,
    buf: String,
    /// One entry per open list: the next number for ordered lists.
    lists: Vec<Option<u64>>,
    /// Prefix of the list item whose first line has not been written yet.
    pending_prefix: Option<String>,
    row: Vec<String>,
    in_table_head: bool,
}

impl Renderer {
    fn new() -> Self {
        Self {
            layout: Layout::new(),
            block: Block::None,
            buf: String::new(),
            lists: Vec::new(),
            pending_prefix: None,
            row: Vec::new(),
            in_table_head: false,
        }
    }

    fn list_indent(&self) -> f32 {
        self.lists.len().saturating_sub(1) as f32 * LIST_INDENT
    }

    fn flush_text(&mut self) {
        let text = std::mem::take(&mut self.buf);
        let text = text.trim();
        let prefix = self.pending_prefix.take().unwrap_or_default();
        if text.is_empty() && prefix.is_empty() {
            return;
        }
        let indent = self.list_indent();
        self.layout
            .paragraph(text, Font::Regular, BODY_SIZE, indent, &prefix);
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                self.flush_text();
                let (_, before) = heading_style(level);
                self.layout.space(before);
                self.block = Block::Heading(level);
            }
            Event::End(TagEnd::Heading(level)) => {
                let text = std::mem::take(&mut self.buf);
                let (size, _) = heading_style(level);
                self.layout.paragraph(text.trim(), Font::Bold, size, 0.0, "");
                self.layout.space(4.0);
                self.block = Block::None;
            }
            Event::Start(Tag::Paragraph) => {
                if self.lists.is_empty() {
                    self.block = Block::Paragraph;
                }
            }
            Event::End(TagEnd::Paragraph) => {
                self.flush_text();
                if self.lists.is_empty() {
                    self.layout.space(6.0);
                    self.block = Block::None;
                }
            }
            Event::Start(Tag::List(start)) => {
                self.flush_text();
                self.lists.push(start);
            }
            Event::End(TagEnd::List(_)) => {
                self.flush_text();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.layout.space(6.0);
                }
            }
            Event::Start(Tag::Item) => {
                self.flush_text();
                let prefix = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let p = format!("{}. ", n);
                        *n += 1;
                        p
                    }
                    _ => "• ".to_string(),
                };
                self.pending_prefix = Some(prefix);
            }
            Event::End(TagEnd::Item) => self.flush_text(),
            Event::Start(Tag::CodeBlock(_)) => {
                self.flush_text();
                self.block = Block::Code;
            }
            Event::End(TagEnd::CodeBlock) => {
                let code = std::mem::take(&mut self.buf);
                let max = ((PAGE_WIDTH - 2.0 * MARGIN) / (CODE_SIZE * Font::Mono.advance())) as usize;
                for line in code.trim_end_matches('\n').lines() {
                    let cut: String = line.chars().take(max).collect();
                    self.layout.line(&cut, Font::Mono, CODE_SIZE, 0.0);
                }
                self.layout.space(6.0);
                self.block = Block::None;
            }
            Event::Start(Tag::Table(_)) => self.flush_text(),
            Event::End(TagEnd::Table) => self.layout.space(6.0),
            Event::Start(Tag::TableHead) => {
                self.in_table_head = true;
                self.row.clear();
            }
            Event::Start(Tag::TableRow) => self.row.clear(),
            Event::End(TagEnd::TableHead | TagEnd::TableRow) => {
                let line = self.row.join(" | ");
                let font = if self.in_table_head {
                    Font::Bold
                } else {
                    Font::Regular
                };
                self.layout.paragraph(&line, font, BODY_SIZE - 1.0, 0.0, "");
                self.in_table_head = false;
                self.row.clear();
            }
            Event::Start(Tag::TableCell) => self.block = Block::TableCell,
            Event::End(TagEnd::TableCell) => {
                let cell = std::mem::take(&mut self.buf);
                self.row.push(cell.trim().to_string());
                self.block = Block::None;
            }
            Event::Text(text) | Event::Code(text) => self.buf.push_str(&text),
            Event::SoftBreak => match self.block {
                Block::Code => self.buf.push('\n'),
                _ => self.buf.push(' '),
            },
            Event::HardBreak => {
                if matches!(self.block, Block::Paragraph | Block::None) {
                    self.flush_text();
                } else {
                    self.buf.push(' ');
                }
            }
            Event::Rule => {
                self.flush_text();
                self.layout.rule();
            }
            _ => {}
        }
    }

    fn finish(mut self) -> Layout {
        self.flush_text();
        self.layout
    }
}

/// Render Markdown into the bytes of a PDF document titled `title`.
pub fn markdown_to_pdf(markdown: &str, title: &str) -> Result<Vec<u8>, ExtractError> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut renderer = Renderer::new();
    for event in Parser::new_ext(markdown, options) {
        renderer.event(event);
    }
    let layout = renderer.finish();
    debug!("Laid out {} PDF pages", layout.pages.len());

    build_document(layout.pages, title)
}

fn build_document(pages: Vec<Vec<Operation>>, title: &str) -> Result<Vec<u8>, ExtractError> {
    let mut doc = Document::with_version("1.5");

    let font = |doc: &mut Document, base: &str| -> ObjectId {
        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => Object::Name(base.as_bytes().to_vec()),
            "Encoding" => "WinAnsiEncoding",
        })
    };
    let regular = font(&mut doc, "Helvetica");
    let bold = font(&mut doc, "Helvetica-Bold");
    let mono = font(&mut doc, "Courier");

    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => Object::Reference(regular),
            "F2" => Object::Reference(bold),
            "F3" => Object::Reference(mono),
        },
    });

    let pages_id = doc.new_object_id();
    let mut kids = Vec::with_capacity(pages.len());
    for operations in pages {
        let bytes = Content { operations }
            .encode()
            .map_err(|e| ExtractError::PdfExportFailed(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, bytes));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
            "Contents" => Object::Reference(content_id),
            "Resources" => Object::Reference(resources_id),
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(encode_win_ansi(title)),
        "Producer" => Object::string_literal("pdf-visual-extract"),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc.trailer.set("Info", Object::Reference(info_id));

    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| ExtractError::PdfExportFailed(e.to_string()))?;
    Ok(buf)
}

/// Render the Markdown file at `md_path` into `pdf_path`.
///
/// The PDF title is derived from the Markdown file name.
pub fn convert_markdown_file_to_pdf(md_path: &Path, pdf_path: &Path) -> Result<(), ExtractError> {
    let markdown = std::fs::read_to_string(md_path).map_err(ExtractError::read(md_path))?;
    let title = display_title(&crate::pipeline::input::pdf_name(md_path));
    let bytes = markdown_to_pdf(&markdown, &title)?;

    if let Some(parent) = pdf_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(ExtractError::write(parent))?;
    }
    std::fs::write(pdf_path, &bytes).map_err(ExtractError::write(pdf_path))?;
    info!("Wrote {} ({} bytes)", pdf_path.display(), bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn wraps_on_word_boundaries() {
        assert_eq!(wrap("aa bb cc dd", 5), vec!["aa bb", "cc dd"]);
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert!(wrap("   ", 5).is_empty());
    }

    #[test]
    fn win_ansi_mapping() {
        assert_eq!(encode_win_ansi("a–b•€"), vec![b'a', 0x96, b'b', 0x95, 0x80]);
        assert_eq!(encode_win_ansi("日"), b"?".to_vec());
    }

    #[test]
    fn renders_loadable_pdf() {
        let md = "# Revenue Report\n\nTotal revenue grew.\n\n- first\n- second\n\n```\nlet x = 1;\n```\n\n---\n\n| A | B |\n|---|---|\n| 1 | 2 |\n";
        let bytes = markdown_to_pdf(md, "Revenue Report").unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        assert!(contains(&bytes, b"Revenue Report"));
        assert!(contains(&bytes, b"Total revenue grew."));
        assert!(contains(&bytes, b"let x = 1;"));
        assert!(contains(&bytes, b"A | B"));
        assert!(contains(&bytes, b"second"));
    }

    #[test]
    fn long_documents_paginate() {
        let md: String = (0..200)
            .map(|i| format!("Paragraph number {i} with some filler text.\n\n"))
            .collect();
        let bytes = markdown_to_pdf(&md, "Long").unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() > 3);
    }

    #[test]
    fn ordered_lists_are_numbered() {
        let bytes = markdown_to_pdf("1. alpha\n2. beta\n", "t").unwrap();
        assert!(contains(&bytes, b"1. alpha"));
        assert!(contains(&bytes, b"2. beta"));
    }

    #[test]
    fn file_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let md = dir.path().join("q3_report.md");
        std::fs::write(&md, "## Hello\n").unwrap();
        let pdf = dir.path().join("out/q3_report.pdf");
        convert_markdown_file_to_pdf(&md, &pdf).unwrap();
        let bytes = std::fs::read(&pdf).unwrap();
        assert!(contains(&bytes, b"Q3 Report"));
    }
}
