//! Prompt text for the extraction models.
//!
//! Every prompt demands a single JSON object so responses parse
//! deterministically; the shapes mirror the serde types in
//! `mobilia-core`.

use mobilia_core::RawRow;

/// System prompt for spreadsheet row-chunk extraction.
pub const TABULAR_SYSTEM: &str = "You extract furniture products from catalog \
spreadsheet rows. Ignore header rows, totals, separators, and price-range \
rows. Answer with one JSON object: {\"records\": [{\"name\": string, \
\"code\": string, \"price\": number, \"description\": string, \"category\": \
string, \"materials\": [string], \"colors\": [string], \"sizes\": [string], \
\"row\": number}], \"hints\": {\"code_column\": string|null, \
\"image_column\": string|null}}. Every record must carry the exact row number \
it came from. Do not invent products that are not in the rows.";

/// System prompt for page-level document extraction.
pub const DOCUMENT_SYSTEM: &str = "You extract furniture products from one \
page of a catalog document. Use only the text of this page. If the page is a \
cover, index, or introduction, return an empty list instead of inventing \
products. Answer with one JSON object: {\"records\": [{\"name\": string, \
\"code\": string, \"price\": number, \"description\": string, \"category\": \
string, \"materials\": [string], \"colors\": [string], \"sizes\": [string]}]}. \
If a product name is not on this page, use the form \
\"<category> (see specifications)\".";

/// System prompt for price-only extraction from a secondary source.
pub const PRICE_SYSTEM: &str = "You extract prices from a furniture price \
list. Answer with one JSON object: {\"items\": [{\"code\": string, \"name\": \
string, \"price\": number}]}. Skip rows without a usable price. Do not invent \
items.";

/// Render one chunk of rows for the tabular prompt, each line carrying
/// its absolute row number.
pub fn render_rows(rows: &[RawRow]) -> String {
    let mut out = String::new();
    for row in rows {
        out.push_str(&format!("Row {}: ", row.number));
        let mut first = true;
        for (column, value) in &row.cells {
            if !first {
                out.push_str("; ");
            }
            out.push_str(&format!("{}=\"{}\"", column, value));
            first = false;
        }
        out.push('\n');
    }
    out
}

/// Render one page for the document prompt, naming the page so the
/// anchor survives into logs.
pub fn render_page(page_number: u32, text: &str, pending_name: Option<&str>) -> String {
    match pending_name {
        Some(name) => format!(
            "Page {}. The previous page ended with the probable product name \
             \"{}\"; use it if this page describes a product without naming it.\n\n{}",
            page_number, name, text
        ),
        None => format!("Page {}.\n\n{}", page_number, text),
    }
}
