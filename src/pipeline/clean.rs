//! Optional model pass that strips raw table text already captured by detection.
//!
//! Only pages with at least one detected element and non-blank text are sent.
//! A failed page keeps its text and is marked `text_cleaned = false`.

use crate::config::ExtractionConfig;
use crate::output::{ElementContent, ElementKind, EnrichedDocument, VisualDetection, VisualElement};
use crate::pipeline::detect::run_bounded;
use crate::pipeline::llm;
use crate::prompts::text_cleaning_prompt;
use edgequake_llm::{ChatMessage, LLMProvider};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Return a cleaned copy of `doc`.
///
/// Elements come from `visual` when given, otherwise from the tables already
/// injected into `doc`. With no elements anywhere the document is returned
/// unchanged and no request is made.
pub async fn clean_document(
    provider: &Arc<dyn LLMProvider>,
    doc: &EnrichedDocument,
    visual: Option<&VisualDetection>,
    config: &ExtractionConfig,
) -> EnrichedDocument {
    let elements = elements_by_page(doc, visual);
    if elements.values().all(Vec::is_empty) {
        info!("No tables/figures found, skipping text cleaning");
        return doc.clone();
    }

    let jobs = cleaning_jobs(doc, &elements);
    info!("Cleaning text on {} pages", jobs.len());

    let options = &llm::completion_options(config, config.max_tokens);
    let outcomes = run_bounded(jobs, config.concurrency, |(slot, page_number, prompt)| {
        let provider = Arc::clone(provider);
        async move {
            let messages = vec![ChatMessage::user(prompt)];
            let cleaned = match llm::chat(&provider, &messages, options, page_number, config).await {
                Ok(reply) => Some(reply.content.trim().to_string()).filter(|t| !t.is_empty()),
                Err(e) => {
                    warn!("Text cleaning failed: {}", e);
                    None
                }
            };
            (slot, cleaned)
        }
    })
    .await;

    let cleaned = apply_cleaning(doc, outcomes);
    info!(
        "Pages cleaned: {}/{}",
        cleaned.pages.iter().filter(|p| p.text_cleaned).count(),
        cleaned.pages.len()
    );
    cleaned
}

/// Detected elements keyed by page number.
fn elements_by_page(
    doc: &EnrichedDocument,
    visual: Option<&VisualDetection>,
) -> BTreeMap<usize, Vec<VisualElement>> {
    match visual {
        Some(v) => v
            .pages
            .iter()
            .map(|p| (p.page_number, p.detection_result.elements.clone()))
            .collect(),
        None => doc
            .pages
            .iter()
            .map(|p| {
                let els = p
                    .tables
                    .iter()
                    .map(|t| VisualElement {
                        kind: ElementKind::Table,
                        bbox: t.bbox.clone(),
                        confidence: t.confidence,
                        description: t.description.clone(),
                        content: ElementContent::default(),
                    })
                    .collect();
                (p.page_number, els)
            })
            .collect(),
    }
}

/// `(page slot, page number, prompt)` for every page worth cleaning.
fn cleaning_jobs(
    doc: &EnrichedDocument,
    elements: &BTreeMap<usize, Vec<VisualElement>>,
) -> Vec<(usize, usize, String)> {
    doc.pages
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.text.trim().is_empty())
        .filter_map(|(slot, p)| {
            let els = elements.get(&p.page_number).filter(|e| !e.is_empty())?;
            Some((slot, p.page_number, text_cleaning_prompt(&p.text, p.page_number, els)))
        })
        .collect()
}

fn apply_cleaning(doc: &EnrichedDocument, outcomes: Vec<(usize, Option<String>)>) -> EnrichedDocument {
    let mut out = doc.clone();
    for page in &mut out.pages {
        page.text_cleaned = false;
    }
    for (slot, cleaned) in outcomes {
        let Some(page) = out.pages.get_mut(slot) else {
            continue;
        };
        if let Some(text) = cleaned {
            page.original_text = Some(std::mem::replace(&mut page.text, text));
            page.text_cleaned = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{EnrichedPage, TableRecord};

    fn doc() -> EnrichedDocument {
        let table = TableRecord {
            description: "Revenue".into(),
            structured_data: String::new(),
            raw_text: String::new(),
            confidence: 0.9,
            bbox: vec![],
        };
        EnrichedDocument {
            pdf_path: "q3.pdf".into(),
            pdf_name: "q3".into(),
            total_pages: 3,
            pages: vec![
                EnrichedPage {
                    page_number: 1,
                    text: "Intro".into(),
                    ..Default::default()
                },
                EnrichedPage {
                    page_number: 2,
                    text: "Revenue 10 20 30".into(),
                    tables: vec![table.clone()],
                    ..Default::default()
                },
                EnrichedPage {
                    page_number: 3,
                    text: "   ".into(),
                    tables: vec![table],
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn only_pages_with_elements_and_text_are_sent() {
        let d = doc();
        let jobs = cleaning_jobs(&d, &elements_by_page(&d, None));
        assert_eq!(jobs.len(), 1);
        assert_eq!((jobs[0].0, jobs[0].1), (1, 2));
        assert!(jobs[0].2.contains("1. Page 2: Table - Revenue"));
    }

    #[test]
    fn successful_cleaning_keeps_original() {
        let out = apply_cleaning(&doc(), vec![(1, Some("Revenue section".into()))]);
        let p = &out.pages[1];
        assert!(p.text_cleaned);
        assert_eq!(p.text, "Revenue section");
        assert_eq!(p.original_text.as_deref(), Some("Revenue 10 20 30"));
        assert!(!out.pages[0].text_cleaned);
    }

    #[test]
    fn failed_cleaning_leaves_text() {
        let out = apply_cleaning(&doc(), vec![(1, None)]);
        assert!(!out.pages[1].text_cleaned);
        assert_eq!(out.pages[1].text, "Revenue 10 20 30");
        assert!(out.pages[1].original_text.is_none());
    }

    #[tokio::test]
    async fn model_pass_marks_cleaned_and_failed_pages() {
        use crate::pipeline::scripted::ScriptedProvider;

        let mut d = doc();
        let mut costs = d.pages[1].clone();
        costs.page_number = 4;
        costs.text = "Costs 5 6 7".into();
        d.pages.push(costs);
        d.total_pages = 4;

        let scripted = ScriptedProvider::new(|msg| {
            if msg.content.contains("Costs 5 6 7") {
                (0, Err("rate limited".to_string()))
            } else {
                (10, Ok("  Revenue section\n".to_string()))
            }
        });
        let provider: Arc<dyn LLMProvider> = scripted.clone();
        let config = ExtractionConfig::builder()
            .max_retries(0)
            .api_timeout_secs(5)
            .build()
            .unwrap();

        let out = clean_document(&provider, &d, None, &config).await;

        // Page 1 has no tables and page 3 has no text.
        assert_eq!(scripted.calls(), 2);
        let flags: Vec<bool> = out.pages.iter().map(|p| p.text_cleaned).collect();
        assert_eq!(flags, vec![false, true, false, false]);
        assert_eq!(out.pages[1].text, "Revenue section");
        assert_eq!(out.pages[1].original_text.as_deref(), Some("Revenue 10 20 30"));
        assert_eq!(out.pages[3].text, "Costs 5 6 7");
        assert!(out.pages[3].original_text.is_none());
    }

    #[tokio::test]
    async fn nothing_detected_means_no_requests() {
        use crate::pipeline::scripted::ScriptedProvider;

        let mut d = doc();
        for p in &mut d.pages {
            p.tables.clear();
        }
        let scripted = ScriptedProvider::new(|_| (0, Ok("unused".to_string())));
        let provider: Arc<dyn LLMProvider> = scripted.clone();

        let out = clean_document(&provider, &d, None, &ExtractionConfig::default()).await;
        assert_eq!(scripted.calls(), 0);
        assert_eq!(out, d);
    }

    #[test]
    fn no_elements_means_no_jobs() {
        let mut d = doc();
        for p in &mut d.pages {
            p.tables.clear();
        }
        assert!(elements_by_page(&d, None).values().all(Vec::is_empty));
    }
}
