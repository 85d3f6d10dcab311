//! Price fusion from a secondary price file.
//!
//! Prices are merged into already persisted records by normalized code
//! match, then by normalized name match. Fusion only ever updates
//! existing records; an unmatched price item creates nothing.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use mobilia_core::{ItemOutcome, PriceItem, ProductRecord, RecordStore, Result, StageReport};

/// Normalize a code or name for matching: lowercase, alphanumerics only.
pub fn normalize_key(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Merge extracted price items into the catalog's records.
///
/// Returns the number of records whose price was updated. A record
/// matches at most one item; code match wins over name match.
pub async fn merge_prices(
    store: &Arc<dyn RecordStore>,
    records: &[ProductRecord],
    items: &[PriceItem],
    report: &mut StageReport,
) -> Result<usize> {
    if items.is_empty() {
        return Ok(0);
    }

    let mut by_code: HashMap<String, f64> = HashMap::new();
    let mut by_name: HashMap<String, f64> = HashMap::new();
    for item in items {
        let code = normalize_key(&item.code);
        if !code.is_empty() {
            by_code.entry(code).or_insert(item.price);
        }
        let name = normalize_key(&item.name);
        if !name.is_empty() {
            by_name.entry(name).or_insert(item.price);
        }
    }

    let mut updated = 0;
    for record in records {
        let code = normalize_key(&record.code);
        let name = normalize_key(&record.name);
        let price = if !code.is_empty() {
            by_code.get(&code).copied()
        } else {
            None
        }
        .or_else(|| {
            if !name.is_empty() {
                by_name.get(&name).copied()
            } else {
                None
            }
        });

        let Some(price) = price else {
            debug!(
                component = "fusion",
                record_id = %record.id,
                "No price match for record"
            );
            continue;
        };

        let label = format!("record {} ({})", record.id, record.code);
        match store.set_price(record.id, price).await {
            Ok(()) => {
                updated += 1;
                report.record(ItemOutcome::success(label));
            }
            Err(e) => {
                report.record(ItemOutcome::failure(label, e));
            }
        }
    }

    info!(
        component = "fusion",
        record_count = records.len(),
        input_count = items.len(),
        updated,
        "Price fusion finished"
    );
    Ok(updated)
}
