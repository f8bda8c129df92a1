//! Prompts for table/figure detection, text cleaning and CSV conversion.
//!
//! Every prompt lives here so tests can inspect them without a model.
//! Callers can override detection via
//! [`crate::config::ExtractionConfig::detection_prompt`].

use crate::output::VisualElement;

/// Default prompt sent alongside each page image.
///
/// Asks for a single JSON object with `page_analysis` and `elements`, and for
/// table content in the structured-list format that
/// [`crate::export::markdown::format_structured_data`] and the CSV fallback
/// understand.
pub const DETECTION_PROMPT: &str = r#"You are an expert at analyzing financial documents and extracting structured data from tables and figures.

For each image, identify and extract:
1. Tables with financial data
2. Charts, graphs, or other figures

For each table/figure found, provide:
- Type: "table" or "figure"
- Description: Brief description of what the table/figure shows
- Bounding box: [x1, y1, x2, y2] coordinates
- Confidence: 0.0 to 1.0
- Content: Extract the structured data in this exact format:

For tables, use this structured list format:
### Table: [Table Title]
- **Category Name**:
  - Subcategory: value
  - Subcategory: value
- **Another Category**:
  - Subcategory: value

For figures, use this format:
### Figure: [Figure Title]
- **Description**: What the figure shows
- **Key Data Points**:
  - Point 1: value
  - Point 2: value

IMPORTANT: Extract ALL numbers and data from tables/figures. Be precise and complete.

Return your analysis as valid JSON in this format:
{
  "page_analysis": {
    "has_tables": true/false,
    "has_figures": true/false,
    "total_elements": number,
    "page_summary": "Brief summary of the page content"
  },
  "elements": [
    {
      "type": "table" or "figure",
      "bbox": [x1, y1, x2, y2],
      "confidence": 0.95,
      "description": "Description of the element",
      "content": {
        "structured_data": "The structured list format data",
        "raw_text": "Raw text from the element",
        "summary": "Brief summary of the element"
      }
    }
  ]
}"#;

/// Build the cleaning prompt for one page.
///
/// `elements` are the tables and figures already detected on `page_number`;
/// they are listed so the model knows what it may remove.
pub fn text_cleaning_prompt(text: &str, page_number: usize, elements: &[VisualElement]) -> String {
    let listed = if elements.is_empty() {
        "No tables/figures found".to_string()
    } else {
        elements
            .iter()
            .enumerate()
            .map(|(i, el)| {
                let desc = if el.description.is_empty() {
                    "No description"
                } else {
                    el.description.as_str()
                };
                format!(
                    "{}. Page {}: {} - {}",
                    i + 1,
                    page_number,
                    title_case(el.kind.as_str()),
                    desc
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"You are an expert at cleaning extracted text from PDFs. Your task is to remove ONLY redundant table and figure content that has already been properly parsed and structured by a Vision Language Model (VLM).

CONTEXT:
The following text was extracted from a PDF using a text extractor. Additionally, a VLM has already identified and parsed the following tables and figures:

TABLES/FIGURES ALREADY PARSED:
{listed}

TASK:
Clean the extracted text by removing ONLY:
1. Raw table data that appears as text (rows, columns, numbers in table format)
2. Malformed table data that appears as plain text
3. Content that exactly duplicates the parsed table/figure data

CRITICAL RULES - DO NOT CHANGE ANYTHING ELSE:
- Keep ALL regular paragraph text, headings, and narrative content EXACTLY as written
- Keep table/figure references and mentions (like "see Table 1" or "as shown in Figure 2")
- DO NOT reformat, rewrite, or change ANY remaining text
- DO NOT add any new content, explanations, or formatting
- If unsure whether to remove something, KEEP IT
- Preserve all line breaks, spacing, and original text structure

TEXT TO CLEAN:
{text}

CLEANED TEXT:"#
    )
}

/// Build the prompt converting one table's structured data to CSV.
pub fn csv_conversion_prompt(structured_data: &str) -> String {
    format!(
        r#"You are an expert at converting structured table data into CSV format.

Convert the following table data into a clean, properly formatted CSV:

{structured_data}

Requirements:
1. Extract all numerical data and text content
2. Identify proper column headers
3. Create rows with consistent data alignment
4. Handle missing values appropriately (use empty cells)
5. Ensure proper CSV formatting with commas as delimiters
6. Quote text fields that contain commas or special characters
7. Preserve the hierarchical structure if applicable

Return ONLY the CSV content, no explanations or additional text.
The first line should be the header row with column names.
Each subsequent line should be a data row.

Example format:
"Category","Subcategory","Value","Notes"
"Revenue","Q1 2024","1000000","Strong growth"
"#
    )
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{ElementContent, ElementKind};

    #[test]
    fn detection_prompt_requests_json_shape() {
        assert!(DETECTION_PROMPT.contains("\"page_analysis\""));
        assert!(DETECTION_PROMPT.contains("\"elements\""));
        assert!(DETECTION_PROMPT.contains("### Table:"));
    }

    #[test]
    fn cleaning_prompt_lists_elements() {
        let el = VisualElement {
            kind: ElementKind::Figure,
            bbox: vec![],
            confidence: 0.9,
            description: "Revenue by quarter".into(),
            content: ElementContent::default(),
        };
        let p = text_cleaning_prompt("some text", 4, &[el]);
        assert!(p.contains("1. Page 4: Figure - Revenue by quarter"));
        assert!(p.ends_with("some text\n\nCLEANED TEXT:"));
    }

    #[test]
    fn cleaning_prompt_without_elements() {
        let p = text_cleaning_prompt("x", 1, &[]);
        assert!(p.contains("No tables/figures found"));
    }

    #[test]
    fn csv_prompt_embeds_data() {
        let p = csv_conversion_prompt("### Table: Revenue");
        assert!(p.contains("### Table: Revenue"));
        assert!(p.contains("Return ONLY the CSV content"));
    }
}
