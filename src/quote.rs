//! Staff-side quotation built from a client's submitted selections.
//!
//! Staff can correct guest counts and prices, drop items, reorder lines and
//! export the result. Edits are kept locally until [`Quotation::persist`].

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::encode_file_name;
use crate::models::{MAX_PAX, MenuCatalog, SelectionRecord, parse_day_number};
use crate::traits::{Clock, QuoteStore};

/// Group label for items no station serves.
pub const UNGROUPED_STATION: &str = "OTHER";

/// Meal names in serving order; the first one found in a label decides.
const MEAL_ORDER: [&str; 9] = [
    "breakfast",
    "brunch",
    "lunch",
    "high-tea",
    "high tea",
    "snacks",
    "dinner",
    "supper",
    "midnight",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuoteError {
    #[error("no quotation line at position {0}")]
    LineOutOfRange(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuoteTotals {
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
}

/// Items of one line served at the same station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationGroup {
    pub station: String,
    pub items: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CsvLine<'a> {
    position: usize,
    session: &'a str,
    pax: u32,
    price_per_plate: f64,
    amount: f64,
    items: String,
}

/// `parseFloat`-style number: the longest numeric prefix, or 0.
///
/// Negative and non-finite values clamp to 0.
pub fn parse_amount(input: &str) -> f64 {
    let trimmed = input.trim_start();
    let value = (1..=trimmed.len())
        .rev()
        .filter(|&end| trimmed.is_char_boundary(end))
        .find_map(|end| trimmed[..end].parse::<f64>().ok())
        .unwrap_or(0.0);
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

fn meal_rank(label: &str) -> usize {
    let lower = label.to_lowercase();
    MEAL_ORDER
        .iter()
        .position(|meal| lower.contains(meal))
        .unwrap_or(usize::MAX)
}

/// Day number, then meal time, then label.
fn chronological(a: &SelectionRecord, b: &SelectionRecord) -> Ordering {
    let day = |r: &SelectionRecord| parse_day_number(&r.category_title).unwrap_or(0);
    day(a)
        .cmp(&day(b))
        .then_with(|| meal_rank(&a.category_title).cmp(&meal_rank(&b.category_title)))
        .then_with(|| {
            a.category_title
                .to_lowercase()
                .cmp(&b.category_title.to_lowercase())
        })
        .then_with(|| a.category_title.cmp(&b.category_title))
}

/// Editable quotation for one event.
#[derive(Debug, Clone)]
pub struct Quotation {
    event_id: String,
    lines: Vec<SelectionRecord>,
    dirty: HashSet<i64>,
}

impl Quotation {
    /// Order the stored lines for display.
    ///
    /// Once staff have arranged lines manually (any `order_index` set), that
    /// order is used for every line, unset ones counting as 0.
    pub fn new(event_id: impl Into<String>, mut lines: Vec<SelectionRecord>) -> Self {
        if lines.iter().any(|l| l.order_index.is_some_and(|i| i != 0)) {
            lines.sort_by_key(|l| l.order_index.unwrap_or(0));
        } else {
            lines.sort_by(chronological);
        }
        Self {
            event_id: event_id.into(),
            lines,
            dirty: HashSet::new(),
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn lines(&self) -> &[SelectionRecord] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Whether there are edits not yet written to the store.
    pub fn has_changes(&self) -> bool {
        !self.dirty.is_empty()
    }

    fn line_mut(&mut self, index: usize) -> Result<&mut SelectionRecord, QuoteError> {
        let line = self
            .lines
            .get_mut(index)
            .ok_or(QuoteError::LineOutOfRange(index))?;
        if let Some(id) = line.id {
            self.dirty.insert(id);
        }
        Ok(line)
    }

    /// Set the guest count from free-form input; fractions are dropped and
    /// huge values saturate at [`MAX_PAX`].
    pub fn update_pax(&mut self, index: usize, input: &str) -> Result<u32, QuoteError> {
        let pax = parse_amount(input).floor().min(f64::from(MAX_PAX)) as u32;
        self.line_mut(index)?.pax = pax;
        Ok(pax)
    }

    pub fn update_price(&mut self, index: usize, input: &str) -> Result<f64, QuoteError> {
        let price = parse_amount(input);
        self.line_mut(index)?.price_per_plate = price;
        Ok(price)
    }

    /// Drop an item from a line. Returns whether it was present.
    pub fn remove_item(&mut self, index: usize, item: &str) -> Result<bool, QuoteError> {
        let present = self
            .lines
            .get(index)
            .ok_or(QuoteError::LineOutOfRange(index))?
            .selected_items
            .iter()
            .any(|i| i == item);
        if present {
            self.line_mut(index)?.selected_items.retain(|i| i != item);
        }
        Ok(present)
    }

    /// Swap a line with its neighbour and renumber every line from 1.
    ///
    /// Moving the first line up or the last line down does nothing and
    /// returns `false`.
    pub fn move_line(&mut self, index: usize, direction: Direction) -> Result<bool, QuoteError> {
        if index >= self.lines.len() {
            return Err(QuoteError::LineOutOfRange(index));
        }
        let target = match direction {
            Direction::Up if index == 0 => return Ok(false),
            Direction::Up => index - 1,
            Direction::Down if index + 1 == self.lines.len() => return Ok(false),
            Direction::Down => index + 1,
        };

        self.lines.swap(index, target);
        for (position, line) in self.lines.iter_mut().enumerate() {
            line.order_index = Some(position as i32 + 1);
            if let Some(id) = line.id {
                self.dirty.insert(id);
            }
        }
        debug!(from = index, to = target, "Moved quotation line");
        Ok(true)
    }

    /// Subtotal of every line plus a flat tax.
    pub fn totals(&self, tax_rate_percent: f64) -> QuoteTotals {
        let subtotal: f64 = self.lines.iter().map(SelectionRecord::amount).sum();
        let tax = subtotal * tax_rate_percent / 100.0;
        QuoteTotals {
            subtotal,
            tax,
            total: subtotal + tax,
        }
    }

    /// Write one CSV row per line into a timestamped file in `output_dir`.
    pub async fn export_csv<C: Clock>(&self, output_dir: &Path, clock: &C) -> Result<PathBuf> {
        let filename = format!(
            "quotation_{}_{}.csv",
            encode_file_name(&self.event_id),
            clock.now_utc().format("%Y%m%d_%H%M%S")
        );
        let output_path = output_dir.join(filename);

        let path = output_path.clone();
        let lines = self.lines.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut wtr = csv::Writer::from_path(&path).context("Failed to create CSV writer")?;
            for (position, line) in lines.iter().enumerate() {
                wtr.serialize(CsvLine {
                    position: position + 1,
                    session: &line.category_title,
                    pax: line.pax,
                    price_per_plate: line.price_per_plate,
                    amount: line.amount(),
                    items: line.selected_items.join("; "),
                })
                .context("Failed to serialize quotation line")?;
            }
            wtr.flush().context("Failed to flush CSV writer")?;
            Ok(())
        })
        .await
        .context("CSV export task failed")??;

        info!(path = %output_path.display(), lines = self.lines.len(), "Exported quotation");
        Ok(output_path)
    }

    /// Push every edited line to the store. Returns how many were written.
    pub async fn persist<S: QuoteStore>(&mut self, store: &S) -> Result<usize> {
        let mut written = 0;
        for line in &self.lines {
            let Some(id) = line.id else { continue };
            if !self.dirty.contains(&id) {
                continue;
            }
            store
                .update_selection(line)
                .await
                .with_context(|| format!("Failed to save quotation line {}", line.category_title))?;
            self.dirty.remove(&id);
            written += 1;
        }
        info!(event_id = %self.event_id, written, "Saved quotation edits");
        Ok(written)
    }
}

/// Group a line's items by the station serving them, in first-seen order.
pub fn grouped_items(record: &SelectionRecord, catalog: &MenuCatalog) -> Vec<StationGroup> {
    let mut groups: Vec<StationGroup> = Vec::new();
    for item in &record.selected_items {
        let station = catalog
            .station_for_item(item)
            .map_or(UNGROUPED_STATION, |s| s.name.as_str());
        match groups.iter_mut().find(|g| g.station == station) {
            Some(group) => group.items.push(item.clone()),
            None => groups.push(StationGroup {
                station: station.to_string(),
                items: vec![item.clone()],
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use super::*;
    use crate::models::{Category, MenuItem, Station};
    use crate::traits::{MemoryStore, MockClock};

    fn line(id: i64, label: &str, pax: u32, price: f64) -> SelectionRecord {
        SelectionRecord {
            id: Some(id),
            event_id: "e1".to_string(),
            category_id: "cat".to_string(),
            category_title: label.to_string(),
            pax,
            price_per_plate: price,
            selected_items: vec!["Dal".to_string(), "Naan".to_string()],
            order_index: None,
        }
    }

    fn labels(quote: &Quotation) -> Vec<&str> {
        quote
            .lines()
            .iter()
            .map(|l| l.category_title.as_str())
            .collect()
    }

    // ==================== Ordering Tests ====================

    #[test]
    fn test_default_order_is_chronological() {
        let quote = Quotation::new(
            "e1",
            vec![
                line(1, "Day 2 (11 Oct) - Lunch", 10, 100.0),
                line(2, "Day 1 (10 Oct) - Dinner", 10, 100.0),
                line(3, "Day 1 (10 Oct) - Breakfast", 10, 100.0),
                line(4, "Day 1 (10 Oct) - Cocktails", 10, 100.0),
                line(5, "Day 1 (10 Oct) - High Tea", 10, 100.0),
            ],
        );
        assert_eq!(
            labels(&quote),
            vec![
                "Day 1 (10 Oct) - Breakfast",
                "Day 1 (10 Oct) - High Tea",
                "Day 1 (10 Oct) - Dinner",
                "Day 1 (10 Oct) - Cocktails",
                "Day 2 (11 Oct) - Lunch",
            ]
        );
    }

    #[test]
    fn test_day_ten_sorts_after_day_two() {
        let quote = Quotation::new(
            "e1",
            vec![
                line(1, "Day 10 (19 Oct) - Lunch", 1, 1.0),
                line(2, "Day 2 (11 Oct) - Lunch", 1, 1.0),
            ],
        );
        assert_eq!(labels(&quote)[0], "Day 2 (11 Oct) - Lunch");
    }

    #[test]
    fn test_manual_order_wins() {
        let mut first = line(1, "Day 1 (10 Oct) - Lunch", 1, 1.0);
        let mut second = line(2, "Day 2 (11 Oct) - Lunch", 1, 1.0);
        first.order_index = Some(2);
        second.order_index = Some(1);

        let quote = Quotation::new("e1", vec![first, second]);
        assert_eq!(labels(&quote)[0], "Day 2 (11 Oct) - Lunch");
    }

    #[test]
    fn test_move_line_renumbers() {
        let mut quote = Quotation::new(
            "e1",
            vec![
                line(1, "Day 1 (10 Oct) - Lunch", 1, 1.0),
                line(2, "Day 1 (10 Oct) - Dinner", 1, 1.0),
                line(3, "Day 2 (11 Oct) - Lunch", 1, 1.0),
            ],
        );

        assert!(quote.move_line(2, Direction::Up).unwrap());
        assert_eq!(labels(&quote)[1], "Day 2 (11 Oct) - Lunch");
        let order: Vec<Option<i32>> = quote.lines().iter().map(|l| l.order_index).collect();
        assert_eq!(order, vec![Some(1), Some(2), Some(3)]);

        assert!(!quote.move_line(0, Direction::Up).unwrap());
        assert!(!quote.move_line(2, Direction::Down).unwrap());
        assert_eq!(
            quote.move_line(3, Direction::Down),
            Err(QuoteError::LineOutOfRange(3))
        );

        // Re-sorting the renumbered lines keeps the manual order.
        let reloaded = Quotation::new("e1", quote.lines().to_vec());
        assert_eq!(labels(&reloaded), labels(&quote));
    }

    // ==================== Editing Tests ====================

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("250.5"), 250.5);
        assert_eq!(parse_amount(" 12abc"), 12.0);
        assert_eq!(parse_amount("-4"), 0.0);
        assert_eq!(parse_amount("abc"), 0.0);
        assert_eq!(parse_amount(""), 0.0);
        assert_eq!(parse_amount("inf"), 0.0);
    }

    #[test]
    fn test_update_pax_and_price() {
        let mut quote = Quotation::new("e1", vec![line(1, "Day 1 - Lunch", 10, 100.0)]);

        assert_eq!(quote.update_pax(0, "42.9").unwrap(), 42);
        assert_eq!(quote.update_price(0, "-1").unwrap(), 0.0);
        assert_eq!(quote.update_price(0, "199.5").unwrap(), 199.5);
        assert_eq!(quote.lines()[0].amount(), 42.0 * 199.5);
        assert!(quote.has_changes());
        assert!(quote.update_pax(4, "1").is_err());
    }

    #[test]
    fn test_update_pax_saturates_at_storable_limit() {
        let mut quote = Quotation::new("e1", vec![line(1, "Day 1 - Lunch", 10, 100.0)]);

        assert_eq!(quote.update_pax(0, "3000000000").unwrap(), MAX_PAX);
        assert_eq!(quote.update_pax(0, "1e30").unwrap(), MAX_PAX);
        assert!(i32::try_from(quote.lines()[0].pax).is_ok());
    }

    #[test]
    fn test_remove_item() {
        let mut quote = Quotation::new("e1", vec![line(1, "Day 1 - Lunch", 10, 100.0)]);
        assert!(quote.remove_item(0, "Dal").unwrap());
        assert!(!quote.remove_item(0, "Dal").unwrap());
        assert_eq!(quote.lines()[0].selected_items, vec!["Naan".to_string()]);
    }

    #[test]
    fn test_totals_apply_flat_tax() {
        let quote = Quotation::new(
            "e1",
            vec![
                line(1, "Day 1 - Lunch", 50, 250.0),
                line(2, "Day 1 - Dinner", 20, 400.0),
            ],
        );
        let totals = quote.totals(18.0);
        assert_eq!(totals.subtotal, 20_500.0);
        assert!((totals.tax - 3_690.0).abs() < 1e-9);
        assert!((totals.total - 24_190.0).abs() < 1e-9);
    }

    // ==================== Grouping Tests ====================

    #[test]
    fn test_grouped_items_by_station() {
        let catalog = MenuCatalog::from_parts(
            vec![Category {
                id: "lunch".to_string(),
                title: "Lunch".to_string(),
                default_price: 100.0,
                sort_order: 1,
            }],
            vec![Station {
                id: "s1".to_string(),
                category_id: "lunch".to_string(),
                name: "Tandoor".to_string(),
                sort_order: 1,
            }],
            vec![MenuItem {
                id: "i1".to_string(),
                station_id: "s1".to_string(),
                name: "Naan".to_string(),
            }],
        )
        .unwrap();

        let mut record = line(1, "Day 1 - Lunch", 1, 1.0);
        record.selected_items = vec!["Dal".into(), "Naan".into(), "Salad".into()];

        let groups = grouped_items(&record, &catalog);
        assert_eq!(
            groups,
            vec![
                StationGroup {
                    station: "OTHER".to_string(),
                    items: vec!["Dal".to_string(), "Salad".to_string()],
                },
                StationGroup {
                    station: "Tandoor".to_string(),
                    items: vec!["Naan".to_string()],
                },
            ]
        );
    }

    // ==================== Store and Export Tests ====================

    #[tokio::test]
    async fn test_persist_writes_only_changed_lines() {
        let store = MemoryStore::new(MenuCatalog::default());
        store.insert_selections(
            "e1",
            vec![
                line(1, "Day 1 - Lunch", 10, 100.0),
                line(2, "Day 1 - Dinner", 10, 100.0),
            ],
        );

        let mut quote = Quotation::new("e1", store.selections_for("e1"));
        quote.update_pax(0, "75").unwrap();
        assert_eq!(quote.persist(&store).await.unwrap(), 1);
        assert!(!quote.has_changes());
        assert_eq!(quote.persist(&store).await.unwrap(), 0);

        let stored = store.selections_for("e1");
        assert_eq!(stored.iter().find(|r| r.id == Some(1)).unwrap().pax, 75);
    }

    #[tokio::test]
    async fn test_persist_failure_keeps_changes() {
        let store = MemoryStore::new(MenuCatalog::default());
        store.insert_selections("e1", vec![line(1, "Day 1 - Lunch", 10, 100.0)]);
        let mut quote = Quotation::new("e1", store.selections_for("e1"));
        quote.update_price(0, "120").unwrap();

        store.set_fail_writes(true);
        assert!(quote.persist(&store).await.is_err());
        assert!(quote.has_changes());
    }

    #[tokio::test]
    async fn test_export_csv_writes_timestamped_file() {
        let dir = tempdir().unwrap();
        let clock = MockClock::new(Utc.with_ymd_and_hms(2024, 10, 1, 9, 30, 0).unwrap());
        let quote = Quotation::new("e1", vec![line(1, "Day 1 (10 Oct) - Lunch", 50, 250.0)]);

        let path = quote.export_csv(dir.path(), &clock).await.unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "quotation_e1_20241001_093000.csv"
        );

        let content = std::fs::read_to_string(&path).unwrap();
        let mut rows = content.lines();
        assert_eq!(
            rows.next(),
            Some("position,session,pax,price_per_plate,amount,items")
        );
        assert_eq!(
            rows.next(),
            Some("1,Day 1 (10 Oct) - Lunch,50,250.0,12500.0,Dal; Naan")
        );
    }

    #[tokio::test]
    async fn test_export_csv_encodes_event_id() {
        let dir = tempdir().unwrap();
        let clock = MockClock::new(Utc.with_ymd_and_hms(2024, 10, 1, 9, 30, 0).unwrap());
        let quote = Quotation::new("../evt/1", vec![line(1, "Day 1 - Lunch", 50, 250.0)]);

        let path = quote.export_csv(dir.path(), &clock).await.unwrap();
        assert_eq!(path.parent(), Some(dir.path()));
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "quotation_%2E%2E%2Fevt%2F1_20241001_093000.csv"
        );
        assert!(path.exists());
    }
}
