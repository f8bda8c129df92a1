//! Markdown rendering of the enriched document and the blended report.

use crate::output::{BlendSummary, BlendedElement, BlendedKind, EnrichedDocument};
use std::fmt::Write as _;

/// Word-initial title case: a letter is upper-cased when the previous
/// character is not a letter, lower-cased otherwise.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Display title for a document name: `q3_earnings-call` → `Q3 Earnings Call`.
pub fn display_title(pdf_name: &str) -> String {
    title_case(&pdf_name.replace(['_', '-'], " "))
}

/// Render an [`EnrichedDocument`] page by page.
pub fn document_to_markdown(doc: &EnrichedDocument) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# {}\n", display_title(&doc.pdf_name));
    let _ = writeln!(md, "**Total Pages:** {}\n", doc.total_pages);
    md.push_str("---\n\n");

    for page in &doc.pages {
        let _ = writeln!(md, "## Page {}\n", page.page_number);

        let text = page.text.trim();
        if !text.is_empty() {
            md.push_str("### Text Content\n\n");
            md.push_str(text);
            md.push_str("\n\n");
        }

        if !page.tables.is_empty() {
            md.push_str("### Tables and Figures\n\n");
            for (i, table) in page.tables.iter().enumerate() {
                let _ = writeln!(md, "#### Table {}\n", i + 1);
                if !table.description.is_empty() {
                    let _ = writeln!(md, "### {}\n", table.description);
                }
                if !table.structured_data.is_empty() {
                    md.push_str(&table.structured_data);
                    md.push_str("\n\n");
                }
            }
        }

        md.push_str("---\n\n");
    }
    md
}

/// Turn the structured-list table format into readable Markdown.
///
/// * `### Table: X` → `## X`
/// * `- **K**: V` → `**K**: V`, or `### K` when `V` is empty
/// * `- x` stays a bullet; indented bullets stay nested
pub fn format_structured_data(s: &str) -> String {
    let mut lines = Vec::new();
    for raw in s.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(title) = line.strip_prefix("### Table:") {
            lines.push(format!("\n## {}\n", title.trim()));
        } else if line.starts_with("- **") && line.contains("**:") {
            let (key, value) = line.split_once("**:").unwrap_or((line, ""));
            let key = key.trim_start_matches("- **").trim();
            let value = value.trim();
            if value.is_empty() {
                lines.push(format!("### {}", key));
            } else {
                lines.push(format!("**{}**: {}", key, value));
            }
        } else if let Some(item) = line.strip_prefix("- ") {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            if raw.starts_with(char::is_whitespace) {
                lines.push(format!("  - {}", item));
            } else {
                lines.push(format!("- {}", item));
            }
        }
    }
    lines.join("\n")
}

/// Render the blended element stream as a report.
///
/// `generated_at` is printed verbatim under the title.
pub fn blend_to_markdown(
    pdf_name: &str,
    summary: Option<&BlendSummary>,
    elements: &[BlendedElement],
    generated_at: &str,
) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# {}\n", display_title(pdf_name));
    let _ = writeln!(md, "*Generated on: {}*\n", generated_at);

    if let Some(summary) = summary {
        let doc = &summary.document_summary;
        md.push_str("## Document Summary\n\n");
        let _ = writeln!(md, "- **Total Elements**: {}", summary.total_elements);
        if !doc.document_type.is_empty() {
            let _ = writeln!(md, "- **Document Type**: {}", doc.document_type);
        }
        if !summary.pages_covered.is_empty() {
            let pages: Vec<String> = summary.pages_covered.iter().map(|p| p.to_string()).collect();
            let _ = writeln!(md, "- **Pages Covered**: {}", pages.join(", "));
        }
        if !doc.key_metrics.is_empty() {
            md.push_str("- **Key Metrics**:\n");
            for metric in &doc.key_metrics {
                let _ = writeln!(md, "  - {}", metric);
            }
        }
        md.push('\n');
    }

    let of_kind = |kind: BlendedKind| elements.iter().filter(move |e| e.kind == kind);

    let mut texts = of_kind(BlendedKind::Text).peekable();
    if texts.peek().is_some() {
        md.push_str("## Text Content\n\n");
        let mut current_page = None;
        for el in texts.filter(|e| !e.content.text.is_empty()) {
            if current_page != Some(el.page) {
                let _ = writeln!(md, "### Page {}\n", el.page);
                current_page = Some(el.page);
            }
            md.push_str(&el.content.text);
            md.push_str("\n\n");
        }
    }

    for (kind, section, label) in [
        (BlendedKind::Table, "Tables", "Table"),
        (BlendedKind::Figure, "Figures", "Figure"),
    ] {
        let mut items = of_kind(kind).peekable();
        if items.peek().is_none() {
            continue;
        }
        let _ = writeln!(md, "## {}\n", section);
        for (i, el) in items.enumerate() {
            if !el.content.text.is_empty() {
                let _ = writeln!(md, "### {} {} (Page {})", label, i + 1, el.page);
                let _ = writeln!(md, "*{}*\n", el.content.text);
            }
            let structured = el.content.structured_data.as_deref().unwrap_or("");
            let formatted = format_structured_data(structured);
            if !formatted.is_empty() {
                md.push_str(&formatted);
                md.push_str("\n\n");
            }
            if kind == BlendedKind::Table {
                let raw = el.content.raw_text.as_deref().unwrap_or("");
                if !raw.is_empty() && raw != structured {
                    let _ = writeln!(md, "**Raw Table Data:**\n```\n{}\n```\n", raw);
                }
            }
        }
    }

    md.push_str("## Processing Metadata\n\n");
    if let Some(summary) = summary {
        for (heading, counts, underscores) in [
            ("Element Distribution", &summary.element_types, false),
            ("Categories", &summary.categories, true),
            ("Importance Levels", &summary.importance_levels, false),
        ] {
            let _ = writeln!(md, "### {}\n", heading);
            for (name, count) in counts {
                let label = if underscores {
                    title_case(&name.replace('_', " "))
                } else {
                    title_case(name)
                };
                let _ = writeln!(md, "- **{}**: {}", label, count);
            }
            md.push('\n');
        }
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{BlendedContent, ElementMetadata, EnrichedPage, TableRecord};
    use crate::pipeline::blend::summarize;
    use pretty_assertions::assert_eq;

    #[test]
    fn title_case_capitalises_after_non_letters() {
        assert_eq!(title_case("hello WORLD"), "Hello World");
        assert_eq!(display_title("q3_earnings-call"), "Q3 Earnings Call");
    }

    #[test]
    fn structured_data_is_formatted() {
        let input = "### Table: Revenue\n- **Products**:\n  - Q1: 10\n  - Q2: 12\n- **Total**: 22\n- note";
        let expected = "\n## Revenue\n\n### Products\n  - Q1: 10\n  - Q2: 12\n**Total**: 22\n- note";
        assert_eq!(format_structured_data(input), expected);
    }

    #[test]
    fn document_markdown_lists_pages_and_tables() {
        let doc = EnrichedDocument {
            pdf_path: "q3.pdf".into(),
            pdf_name: "q3_report".into(),
            total_pages: 2,
            pages: vec![
                EnrichedPage {
                    page_number: 1,
                    text: " Intro text \n".into(),
                    ..Default::default()
                },
                EnrichedPage {
                    page_number: 2,
                    text: String::new(),
                    tables: vec![TableRecord {
                        description: "Revenue".into(),
                        structured_data: "- **A**: 1".into(),
                        raw_text: String::new(),
                        confidence: 0.9,
                        bbox: vec![],
                    }],
                    ..Default::default()
                },
            ],
        };
        let md = document_to_markdown(&doc);
        assert!(md.starts_with("# Q3 Report\n\n**Total Pages:** 2\n\n---\n\n## Page 1\n\n### Text Content\n\nIntro text\n\n---"));
        assert!(md.contains("## Page 2\n\n### Tables and Figures\n\n#### Table 1\n\n### Revenue\n\n- **A**: 1\n\n---"));
        assert!(!md.contains("## Page 2\n\n### Text Content"));
    }

    fn element(id: &str, kind: BlendedKind, page: usize, text: &str) -> BlendedElement {
        BlendedElement {
            id: id.into(),
            kind,
            page,
            content: BlendedContent {
                text: text.into(),
                structured_data: (kind != BlendedKind::Text).then(|| "- **Total**: 5".into()),
                raw_text: (kind == BlendedKind::Table).then(|| "Total 5".into()),
                ..Default::default()
            },
            metadata: ElementMetadata {
                confidence: 1.0,
                source: "text".into(),
                importance: "medium".into(),
                category: "narrative".into(),
            },
        }
    }

    #[test]
    fn report_has_all_sections() {
        let elements = vec![
            element("text_page_1_para_1", BlendedKind::Text, 1, "Para one"),
            element("text_page_1_para_2", BlendedKind::Text, 1, "Para two"),
            element("table_page_2_table_1", BlendedKind::Table, 2, "Income statement"),
            element("figure_page_2_fig_2", BlendedKind::Figure, 2, "Trend"),
        ];
        let summary = summarize("q3", &elements);
        let md = blend_to_markdown("q3", Some(&summary), &elements, "2026-01-01 00:00:00");

        assert!(md.starts_with("# Q3\n\n*Generated on: 2026-01-01 00:00:00*"));
        assert!(md.contains("- **Total Elements**: 4"));
        assert!(md.contains("### Page 1\n\nPara one\n\nPara two\n\n"));
        assert!(md.contains("### Table 1 (Page 2)\n*Income statement*"));
        assert!(md.contains("**Total**: 5"));
        assert!(md.contains("**Raw Table Data:**\n```\nTotal 5\n```"));
        assert!(md.contains("### Figure 1 (Page 2)\n*Trend*"));
        assert!(md.contains("### Categories\n\n- **Narrative**: 4"));
        assert!(md.contains("- **Text**: 2"));
    }

    #[test]
    fn report_without_summary() {
        let md = blend_to_markdown("doc", None, &[], "now");
        assert!(!md.contains("Document Summary"));
        assert!(md.ends_with("## Processing Metadata\n\n"));
    }
}
