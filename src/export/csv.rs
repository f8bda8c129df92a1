//! Per-table CSV export.
//!
//! Each table's structured data is converted by the model. When the model is
//! unavailable, fails, or returns something that is not CSV, the table is
//! flattened deterministically into `Category,Subcategory,Value` rows.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::output::{CsvExportSummary, CsvFileRecord, EnrichedDocument, TableRecord};
use crate::pipeline::detect::run_bounded;
use crate::pipeline::{llm, write_json};
use crate::prompts::csv_conversion_prompt;
use edgequake_llm::{ChatMessage, LLMProvider};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Sub-directory of the output directory that receives the CSV files.
pub const CSV_DIR: &str = "csv_exports";

const FALLBACK_HEADER: [&str; 3] = ["Category", "Subcategory", "Value"];

/// A table together with its location in the document.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedTable {
    pub page_number: usize,
    /// 1-based position among the page's tables.
    pub table_index: usize,
    pub table: TableRecord,
}

/// Flatten all tables of `doc` in page order.
pub fn extract_tables_from_document(doc: &EnrichedDocument) -> Vec<LocatedTable> {
    doc.pages
        .iter()
        .flat_map(|page| {
            page.tables.iter().enumerate().map(move |(i, t)| LocatedTable {
                page_number: page.page_number,
                table_index: i + 1,
                table: t.clone(),
            })
        })
        .collect()
}

/// File-name fragment derived from a table description.
///
/// Keeps alphanumerics, space, `-` and `_`, right-trims, turns spaces into
/// `_` and caps the length at 50 characters.
pub fn safe_description(description: &str, page: usize, index: usize) -> String {
    let kept: String = description
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let kept = kept.trim_end();
    if kept.is_empty() {
        format!("table_{}_{}", page, index)
    } else {
        kept.replace(' ', "_").chars().take(50).collect()
    }
}

/// Deterministic `Category,Subcategory,Value` rows from structured-list data.
pub fn structured_to_rows(structured_data: &str) -> Vec<[String; 3]> {
    let mut rows = Vec::new();
    let mut category = String::new();

    for raw in structured_data.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(item) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) else {
            continue;
        };

        if let Some(rest) = item.strip_prefix("**") {
            let (key, value) = rest.split_once("**").unwrap_or((rest, ""));
            let value = value.trim_start_matches(':').trim();
            category = key.trim().to_string();
            if !value.is_empty() {
                rows.push([category.clone(), String::new(), value.to_string()]);
            }
        } else {
            let (sub, value) = match item.split_once(':') {
                Some((s, v)) => (s.trim(), v.trim()),
                None => ("", item.trim()),
            };
            rows.push([category.clone(), sub.to_string(), value.to_string()]);
        }
    }
    rows
}

/// Strip surrounding ``` / ```csv fences from a model reply.
pub fn strip_csv_fences(reply: &str) -> &str {
    let mut s = reply.trim();
    if let Some(rest) = s.strip_prefix("```csv") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Reserve `base`, or `base_{n}` for the first free `n >= table_index`.
fn unique_stem(used: &mut HashSet<String>, base: String, table_index: usize) -> String {
    if used.insert(base.clone()) {
        return base;
    }
    let mut n = table_index;
    loop {
        let candidate = format!("{}_{}", base, n);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Parse CSV text leniently.
///
/// `None` if there are no records or no record has two columns, which is
/// how a prose refusal from the model looks.
fn parse_csv(content: &str) -> Option<Vec<Vec<String>>> {
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());
    let records: Vec<Vec<String>> = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .ok()?
        .into_iter()
        .map(|r| r.iter().map(str::to_string).collect())
        .filter(|r: &Vec<String>| r.iter().any(|f| !f.is_empty()))
        .collect();
    records.iter().any(|r| r.len() >= 2).then_some(records)
}

fn write_csv(path: &Path, rows: &[Vec<String>]) -> Result<u64, ExtractError> {
    let csv_err = |e: ::csv::Error| ExtractError::CsvFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    };
    let mut writer = ::csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;
    for row in rows {
        writer.write_record(row).map_err(csv_err)?;
    }
    writer.flush().map_err(ExtractError::write(path))?;
    let size = std::fs::metadata(path)
        .map_err(ExtractError::read(path))?
        .len();
    Ok(size)
}

/// Convert every table of `doc` to a CSV file under `<out_dir>/csv_exports/`.
///
/// With `provider = None` only the deterministic flattening is used. The
/// summary is saved next to the CSVs as `{pdf_name}_csv_conversion_summary.json`.
pub async fn convert_tables_to_csv(
    provider: Option<&Arc<dyn LLMProvider>>,
    doc: &EnrichedDocument,
    out_dir: &Path,
    pdf_name: &str,
    config: &ExtractionConfig,
) -> Result<CsvExportSummary, ExtractError> {
    let tables = extract_tables_from_document(doc);
    let mut summary = CsvExportSummary {
        pdf_name: pdf_name.to_string(),
        total_tables: tables.len(),
        ..Default::default()
    };
    if tables.is_empty() {
        info!("No tables found to convert");
        return Ok(summary);
    }

    let csv_dir = out_dir.join(CSV_DIR);
    std::fs::create_dir_all(&csv_dir).map_err(ExtractError::write(&csv_dir))?;
    info!("Converting {} tables to CSV in {}", tables.len(), csv_dir.display());

    let options = &llm::completion_options(config, config.csv_max_tokens);
    let mut converted = run_bounded(tables, config.concurrency, |located| async move {
        let rows = match provider {
            Some(provider) => model_rows(provider, &located, options, config).await,
            None => None,
        };
        (located, rows)
    })
    .await;
    converted.sort_by_key(|(t, _)| (t.page_number, t.table_index));

    let mut used_names = HashSet::new();
    for (located, from_model) in converted {
        let LocatedTable {
            page_number,
            table_index,
            table,
        } = located;

        let (rows, model_converted) = match from_model {
            Some(rows) => (rows, true),
            None => {
                let rows = structured_to_rows(&table.structured_data);
                if rows.is_empty() {
                    let msg = format!(
                        "Page {} table {}: no rows could be extracted",
                        page_number, table_index
                    );
                    warn!("{}", msg);
                    summary.errors.push(msg);
                    continue;
                }
                let mut all: Vec<Vec<String>> =
                    vec![FALLBACK_HEADER.iter().map(|h| h.to_string()).collect()];
                all.extend(rows.into_iter().map(Vec::from));
                (all, false)
            }
        };

        let stem = unique_stem(
            &mut used_names,
            format!(
                "{}_page_{:03}_{}",
                pdf_name,
                page_number,
                safe_description(&table.description, page_number, table_index)
            ),
            table_index,
        );
        let csv_filename = format!("{}.csv", stem);
        let csv_path: PathBuf = csv_dir.join(&csv_filename);

        match write_csv(&csv_path, &rows) {
            Ok(file_size) => {
                summary.converted_tables += 1;
                summary.csv_files.push(CsvFileRecord {
                    page_number,
                    table_index,
                    description: table.description.clone(),
                    csv_filename,
                    csv_path,
                    file_size,
                    model_converted,
                });
            }
            Err(e) => {
                warn!("{}", e);
                summary.errors.push(e.to_string());
            }
        }
    }

    write_json(
        &summary,
        &csv_dir.join(format!("{}_csv_conversion_summary.json", pdf_name)),
    )?;
    info!(
        "CSV export: {}/{} tables converted, {} errors",
        summary.converted_tables,
        summary.total_tables,
        summary.errors.len()
    );
    Ok(summary)
}

async fn model_rows(
    provider: &Arc<dyn LLMProvider>,
    located: &LocatedTable,
    options: &edgequake_llm::CompletionOptions,
    config: &ExtractionConfig,
) -> Option<Vec<Vec<String>>> {
    if located.table.structured_data.trim().is_empty() {
        return None;
    }
    let messages = vec![ChatMessage::user(csv_conversion_prompt(
        &located.table.structured_data,
    ))];
    match llm::chat(provider, &messages, options, located.page_number, config).await {
        Ok(reply) => {
            let rows = parse_csv(strip_csv_fences(&reply.content));
            if rows.is_none() {
                warn!(
                    "Page {} table {}: model reply is not CSV, using fallback",
                    located.page_number, located.table_index
                );
            }
            rows
        }
        Err(e) => {
            warn!("{}; using fallback rows", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::EnrichedPage;
    use pretty_assertions::assert_eq;

    const REVENUE: &str = "### Table: Revenue\n- **Products**:\n  - Q1 2024: 1,000\n  - Q2 2024: 1,200\n- **Total**: 2,200";

    fn table(desc: &str, data: &str) -> TableRecord {
        TableRecord {
            description: desc.into(),
            structured_data: data.into(),
            raw_text: String::new(),
            confidence: 0.9,
            bbox: vec![],
        }
    }

    fn doc() -> EnrichedDocument {
        EnrichedDocument {
            pdf_path: "q3.pdf".into(),
            pdf_name: "q3".into(),
            total_pages: 3,
            pages: vec![
                EnrichedPage {
                    page_number: 2,
                    tables: vec![
                        table("Revenue (USD, millions)", REVENUE),
                        table("", "no bullets here"),
                    ],
                    ..Default::default()
                },
                EnrichedPage {
                    page_number: 3,
                    tables: vec![table("Revenue (USD, millions)", REVENUE)],
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn safe_names() {
        assert_eq!(safe_description("Revenue (USD, millions)", 2, 1), "Revenue_USD_millions");
        assert_eq!(safe_description("%%%", 4, 2), "table_4_2");
        assert_eq!(safe_description(&"x".repeat(80), 1, 1).len(), 50);
    }

    #[test]
    fn flattening_structured_list() {
        let rows = structured_to_rows(REVENUE);
        assert_eq!(
            rows,
            vec![
                ["Products".to_string(), "Q1 2024".into(), "1,000".into()],
                ["Products".to_string(), "Q2 2024".into(), "1,200".into()],
                ["Total".to_string(), String::new(), "2,200".into()],
            ]
        );
        assert!(structured_to_rows("plain text").is_empty());
    }

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_csv_fences("```csv\na,b\n1,2\n```"), "a,b\n1,2");
        assert_eq!(strip_csv_fences("```\na,b\n```"), "a,b");
        assert_eq!(strip_csv_fences("a,b"), "a,b");
    }

    #[test]
    fn lenient_csv_parse() {
        let rows = parse_csv("\"Category\",\"Value\"\n\"Revenue, net\",10\n").unwrap();
        assert_eq!(rows[1], vec!["Revenue, net".to_string(), "10".into()]);
        assert!(parse_csv("").is_none());
        assert!(parse_csv("I cannot convert this table.").is_none());
    }

    #[test]
    fn stems_stay_unique() {
        let mut used = HashSet::new();
        let names: Vec<String> = [("A", 1), ("A_3", 2), ("A", 3), ("A", 4)]
            .into_iter()
            .map(|(base, idx)| unique_stem(&mut used, base.to_string(), idx))
            .collect();
        assert_eq!(names, vec!["A", "A_3", "A_4", "A_5"]);
    }

    #[tokio::test]
    async fn colliding_descriptions_never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let doc = EnrichedDocument {
            pdf_name: "q".into(),
            pages: vec![EnrichedPage {
                page_number: 1,
                tables: vec![table("A", REVENUE), table("A_3", REVENUE), table("A", REVENUE)],
                ..Default::default()
            }],
            ..Default::default()
        };
        let summary = convert_tables_to_csv(None, &doc, dir.path(), "q", &ExtractionConfig::default())
            .await
            .unwrap();

        let names: Vec<&str> = summary.csv_files.iter().map(|f| f.csv_filename.as_str()).collect();
        assert_eq!(names, vec!["q_page_001_A.csv", "q_page_001_A_3.csv", "q_page_001_A_4.csv"]);
        let on_disk = std::fs::read_dir(dir.path().join(CSV_DIR))
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|x| x == "csv"))
            .count();
        assert_eq!(on_disk, summary.converted_tables);
    }

    #[tokio::test]
    async fn model_replies_used_when_they_parse() {
        use crate::pipeline::scripted::ScriptedProvider;

        let dir = tempfile::tempdir().unwrap();
        let doc = EnrichedDocument {
            pdf_name: "q3".into(),
            pages: vec![
                EnrichedPage {
                    page_number: 2,
                    tables: vec![table("Revenue", REVENUE), table("Costs", "- **Costs**: 5")],
                    ..Default::default()
                },
                EnrichedPage {
                    page_number: 3,
                    tables: vec![table("Staff", "- **Staff**: 12"), table("Empty", "")],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let scripted = ScriptedProvider::new(|msg| {
            if msg.content.contains("Products") {
                (20, Ok("```csv\nSegment,Q1 2024\nProducts,\"1,000\"\n```".to_string()))
            } else if msg.content.contains("Costs") {
                (0, Ok("I cannot convert this table.".to_string()))
            } else {
                (5, Err("service unavailable".to_string()))
            }
        });
        let provider: Arc<dyn LLMProvider> = scripted.clone();
        let config = ExtractionConfig::builder()
            .max_retries(0)
            .api_timeout_secs(5)
            .build()
            .unwrap();

        let summary = convert_tables_to_csv(Some(&provider), &doc, dir.path(), "q3", &config)
            .await
            .unwrap();

        // The empty table is never sent and has nothing to flatten.
        assert_eq!(scripted.calls(), 3);
        assert_eq!(summary.total_tables, 4);
        assert_eq!(summary.converted_tables, 3);
        assert_eq!(summary.errors.len(), 1);
        let flags: Vec<(&str, bool)> = summary
            .csv_files
            .iter()
            .map(|f| (f.description.as_str(), f.model_converted))
            .collect();
        assert_eq!(flags, vec![("Revenue", true), ("Costs", false), ("Staff", false)]);

        let revenue = std::fs::read_to_string(&summary.csv_files[0].csv_path).unwrap();
        assert_eq!(revenue, "Segment,Q1 2024\nProducts,\"1,000\"\n");
        let costs = std::fs::read_to_string(&summary.csv_files[1].csv_path).unwrap();
        assert_eq!(costs, "Category,Subcategory,Value\nCosts,,5\n");
    }

    #[test]
    fn tables_are_located() {
        let tables = extract_tables_from_document(&doc());
        assert_eq!(tables.len(), 3);
        assert_eq!((tables[1].page_number, tables[1].table_index), (2, 2));
        assert_eq!(tables[2].page_number, 3);
    }

    #[tokio::test]
    async fn fallback_export_writes_files_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let summary = convert_tables_to_csv(None, &doc(), dir.path(), "q3", &ExtractionConfig::default())
            .await
            .unwrap();

        assert_eq!(summary.total_tables, 3);
        assert_eq!(summary.converted_tables, 2);
        assert_eq!(summary.errors.len(), 1);

        let first = &summary.csv_files[0];
        assert_eq!(first.csv_filename, "q3_page_002_Revenue_USD_millions.csv");
        assert!(!first.model_converted);
        let body = std::fs::read_to_string(&first.csv_path).unwrap();
        assert_eq!(
            body,
            "Category,Subcategory,Value\nProducts,Q1 2024,\"1,000\"\nProducts,Q2 2024,\"1,200\"\nTotal,,\"2,200\"\n"
        );
        assert_eq!(first.file_size, body.len() as u64);
        assert_eq!(summary.csv_files[1].csv_filename, "q3_page_003_Revenue_USD_millions.csv");
        assert!(dir
            .path()
            .join("csv_exports/q3_csv_conversion_summary.json")
            .exists());
    }

    #[tokio::test]
    async fn no_tables_no_directory() {
        let dir = tempfile::tempdir().unwrap();
        let empty = EnrichedDocument::default();
        let summary = convert_tables_to_csv(None, &empty, dir.path(), "x", &ExtractionConfig::default())
            .await
            .unwrap();
        assert_eq!(summary.total_tables, 0);
        assert!(!dir.path().join(CSV_DIR).exists());
    }
}
