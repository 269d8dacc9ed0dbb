//! Typed records shared by the calendar, the selection wizard and the store.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dates::days_in_range;
use crate::packing::Interval;

// ==================== Events ====================

/// Lifecycle status of an event as tracked by staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Draft,
    Sent,
    Approved,
    Confirmed,
    Completed,
    ClientUpdated,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "draft",
            EventStatus::Sent => "sent",
            EventStatus::Approved => "approved",
            EventStatus::Confirmed => "confirmed",
            EventStatus::Completed => "completed",
            EventStatus::ClientUpdated => "client_updated",
            EventStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(EventStatus::Draft),
            "sent" => Ok(EventStatus::Sent),
            "approved" => Ok(EventStatus::Approved),
            "confirmed" => Ok(EventStatus::Confirmed),
            "completed" => Ok(EventStatus::Completed),
            "client_updated" => Ok(EventStatus::ClientUpdated),
            "cancelled" => Ok(EventStatus::Cancelled),
            other => Err(format!("unknown event status: {other}")),
        }
    }
}

/// Whether the client has sent their menu selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    #[default]
    Open,
    ClientSubmitted,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Open => "open",
            QuoteStatus::ClientSubmitted => "client_submitted",
        }
    }

    /// Anything other than `client_submitted` is still open for the client.
    pub fn from_column(value: Option<&str>) -> Self {
        match value {
            Some("client_submitted") => QuoteStatus::ClientSubmitted,
            _ => QuoteStatus::Open,
        }
    }
}

/// Size tag, only used to pick a colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSize {
    Small,
    Large,
}

impl EventSize {
    pub fn from_column(value: Option<&str>) -> Option<Self> {
        match value? {
            "Small" => Some(EventSize::Small),
            "Large" => Some(EventSize::Large),
            _ => None,
        }
    }
}

/// A catering event spanning one or more whole days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub event_code: String,
    pub client_name: Option<String>,
    pub start_date: NaiveDate,
    /// Inclusive; `None` means a single-day event.
    pub end_date: Option<NaiveDate>,
    pub size: Option<EventSize>,
    pub status: EventStatus,
    pub quote_status: QuoteStatus,
}

impl Event {
    /// Single-day draft event; mostly for tests and fixtures.
    pub fn new(
        id: impl Into<String>,
        event_code: impl Into<String>,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            event_code: event_code.into(),
            client_name: None,
            start_date,
            end_date: None,
            size: None,
            status: EventStatus::Draft,
            quote_status: QuoteStatus::Open,
        }
    }

    pub fn with_end_date(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }

    /// Last day of the event. Never before the start date.
    pub fn effective_end(&self) -> NaiveDate {
        self.end_date.unwrap_or(self.start_date).max(self.start_date)
    }

    pub fn interval(&self) -> Interval {
        Interval::new(self.start_date, self.effective_end())
    }

    /// Every day of the event; day index 0 is the start date.
    pub fn days(&self) -> Vec<NaiveDate> {
        days_in_range(self.start_date, self.effective_end())
    }

    /// Calendar title, e.g. `"EV-104 - Acme Corp"`.
    pub fn title(&self) -> String {
        match &self.client_name {
            Some(client) => format!("{} - {}", self.event_code, client),
            None => self.event_code.clone(),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == EventStatus::Confirmed
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == EventStatus::Cancelled
    }
}

// ==================== Menu Catalog ====================

/// Top tier of the menu, e.g. "Lunch". Priced per plate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub title: String,
    pub default_price: f64,
    pub sort_order: i32,
}

/// Group of items inside a category, e.g. "Live Counter".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    pub category_id: String,
    pub name: String,
    pub sort_order: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: String,
    pub station_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("duplicate {kind} id: {id}")]
    DuplicateId { kind: &'static str, id: String },
    #[error("station {station} references unknown category {category}")]
    UnknownCategory { station: String, category: String },
    #[error("item {item} references unknown station {station}")]
    UnknownStation { item: String, station: String },
    #[error("category {0} has a negative price")]
    NegativePrice(String),
}

/// Three-tier menu (category, station, item) validated on construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MenuCatalog {
    categories: Vec<Category>,
    stations: Vec<Station>,
    items: Vec<MenuItem>,
}

impl MenuCatalog {
    /// Join the three tiers by id, rejecting dangling references.
    ///
    /// Categories and stations are ordered by `sort_order`, items by name.
    pub fn from_parts(
        mut categories: Vec<Category>,
        mut stations: Vec<Station>,
        mut items: Vec<MenuItem>,
    ) -> Result<Self, CatalogError> {
        let mut category_ids = HashSet::new();
        for category in &categories {
            if category.default_price < 0.0 {
                return Err(CatalogError::NegativePrice(category.id.clone()));
            }
            if !category_ids.insert(category.id.as_str()) {
                return Err(CatalogError::DuplicateId {
                    kind: "category",
                    id: category.id.clone(),
                });
            }
        }

        let mut station_ids = HashSet::new();
        for station in &stations {
            if !category_ids.contains(station.category_id.as_str()) {
                return Err(CatalogError::UnknownCategory {
                    station: station.id.clone(),
                    category: station.category_id.clone(),
                });
            }
            if !station_ids.insert(station.id.as_str()) {
                return Err(CatalogError::DuplicateId {
                    kind: "station",
                    id: station.id.clone(),
                });
            }
        }

        for item in &items {
            if !station_ids.contains(item.station_id.as_str()) {
                return Err(CatalogError::UnknownStation {
                    item: item.id.clone(),
                    station: item.station_id.clone(),
                });
            }
        }

        categories.sort_by_key(|c| c.sort_order);
        stations.sort_by_key(|s| s.sort_order);
        items.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Self {
            categories,
            stations,
            items,
        })
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn stations_of<'a>(&'a self, category_id: &'a str) -> impl Iterator<Item = &'a Station> {
        self.stations
            .iter()
            .filter(move |s| s.category_id == category_id)
    }

    pub fn items_of<'a>(&'a self, station_id: &'a str) -> impl Iterator<Item = &'a MenuItem> {
        self.items.iter().filter(move |i| i.station_id == station_id)
    }

    /// Station an item name is served at. The first match wins when a name
    /// appears at several stations.
    pub fn station_for_item(&self, item_name: &str) -> Option<&Station> {
        let item = self.items.iter().find(|i| i.name == item_name)?;
        self.stations.iter().find(|s| s.id == item.station_id)
    }

    /// Whether `item_name` is offered anywhere in the given category.
    pub fn category_offers(&self, category_id: &str, item_name: &str) -> bool {
        self.stations_of(category_id)
            .any(|station| self.items_of(&station.id).any(|i| i.name == item_name))
    }
}

// ==================== Persisted Selections ====================

/// Largest guest count a durable store can hold (a signed 32-bit column).
pub const MAX_PAX: u32 = i32::MAX as u32;

/// One confirmed (day, category) session as written at submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRecord {
    /// Store-assigned id; `None` before insertion.
    pub id: Option<i64>,
    pub event_id: String,
    pub category_id: String,
    /// `"Day {n} ({label}) - {category title}"`.
    pub category_title: String,
    pub pax: u32,
    pub price_per_plate: f64,
    pub selected_items: Vec<String>,
    /// Manual ordering set by staff, 1-based.
    pub order_index: Option<i32>,
}

impl SelectionRecord {
    pub fn amount(&self) -> f64 {
        f64::from(self.pax) * self.price_per_plate
    }

    /// Zero-based day index encoded in the label; 0 when missing.
    pub fn day_index(&self) -> usize {
        parse_day_number(&self.category_title)
            .map(|n| n.saturating_sub(1))
            .unwrap_or(0)
    }

    pub fn is_pending(&self) -> bool {
        self.selected_items.is_empty()
    }
}

/// Build the record label for a session.
pub fn session_label(day_index: usize, day_label: &str, category_title: &str) -> String {
    format!("Day {} ({}) - {}", day_index + 1, day_label, category_title)
}

/// First `Day <n>` in a label, case-insensitive, `n` as written (1-based).
pub fn parse_day_number(label: &str) -> Option<usize> {
    let lower = label.to_ascii_lowercase();
    let mut rest = lower.as_str();
    while let Some(pos) = rest.find("day ") {
        let after = &rest[pos + 4..];
        let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(n) = digits.parse() {
            return Some(n);
        }
        rest = after;
    }
    None
}

impl fmt::Display for SelectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} pax @ {:.2})",
            self.category_title, self.pax, self.price_per_plate
        )
    }
}
