//! Seams to the outside world, with in-memory doubles for tests.
//!
//! This module provides traits for:
//! - `Clock`: time access, so "today" in the calendar is deterministic
//! - `QuoteStore`: the durable store for events, menu and selections
//! - `LocalCache`: the transient per-client cache used for crash recovery

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, NaiveDate, Utc};

use crate::models::{Event, MAX_PAX, MenuCatalog, QuoteStatus, SelectionRecord};

// ==================== Clock Trait ====================

/// Trait for abstracting time access.
pub trait Clock: Send + Sync {
    /// Get the current time in UTC.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Get the current time in the local timezone.
    fn now_local(&self) -> DateTime<Local>;

    /// Today's date in the local timezone.
    fn today(&self) -> NaiveDate {
        self.now_local().date_naive()
    }
}

/// System clock implementation using real time.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_local(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Mock clock for testing with controllable time.
#[derive(Debug, Clone)]
pub struct MockClock {
    utc_time: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a new mock clock set to the given UTC time.
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            utc_time: Arc::new(Mutex::new(time)),
        }
    }

    /// Set the mock clock to a new time.
    pub fn set_time(&self, time: DateTime<Utc>) {
        *self.utc_time.lock().unwrap() = time;
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: chrono::Duration) {
        let mut time = self.utc_time.lock().unwrap();
        *time += duration;
    }
}

impl Clock for MockClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.utc_time.lock().unwrap()
    }

    fn now_local(&self) -> DateTime<Local> {
        self.now_utc().with_timezone(&Local)
    }

    /// The mock pins "today" to its UTC date so tests do not depend on the
    /// machine's timezone.
    fn today(&self) -> NaiveDate {
        self.now_utc().date_naive()
    }
}

// ==================== Store Trait ====================

/// Durable store holding events, the menu catalog and submitted selections.
///
/// Every method may fail; callers turn failures into user-visible messages
/// and leave their own state untouched.
pub trait QuoteStore: Send + Sync {
    fn fetch_events(&self) -> impl Future<Output = Result<Vec<Event>>> + Send;

    fn fetch_event(&self, event_id: &str) -> impl Future<Output = Result<Option<Event>>> + Send;

    fn fetch_catalog(&self) -> impl Future<Output = Result<MenuCatalog>> + Send;

    fn fetch_selections(
        &self,
        event_id: &str,
    ) -> impl Future<Output = Result<Vec<SelectionRecord>>> + Send;

    /// Replace every selection of the event with `records`.
    fn replace_selections(
        &self,
        event_id: &str,
        records: &[SelectionRecord],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Flag the event's quote as submitted by the client.
    fn mark_submitted(&self, event_id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Persist staff edits (pax, price, items, order) of one stored record.
    fn update_selection(&self, record: &SelectionRecord)
    -> impl Future<Output = Result<()>> + Send;
}

/// In-memory store for tests and demos.
///
/// Clones share the same data, so a test can keep a handle to inspect what
/// a session wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    events: Arc<Mutex<HashMap<String, Event>>>,
    catalog: Arc<Mutex<MenuCatalog>>,
    selections: Arc<Mutex<HashMap<String, Vec<SelectionRecord>>>>,
    next_id: Arc<AtomicI64>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new(catalog: MenuCatalog) -> Self {
        Self {
            catalog: Arc::new(Mutex::new(catalog)),
            ..Self::default()
        }
    }

    pub fn insert_event(&self, event: Event) {
        self.events.lock().unwrap().insert(event.id.clone(), event);
    }

    /// Seed stored selections directly, assigning ids where missing.
    pub fn insert_selections(&self, event_id: &str, records: Vec<SelectionRecord>) {
        let records = records.into_iter().map(|r| self.with_id(r)).collect();
        self.selections
            .lock()
            .unwrap()
            .insert(event_id.to_string(), records);
    }

    /// Make every write fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn selections_for(&self, event_id: &str) -> Vec<SelectionRecord> {
        self.selections
            .lock()
            .unwrap()
            .get(event_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn event(&self, event_id: &str) -> Option<Event> {
        self.events.lock().unwrap().get(event_id).cloned()
    }

    fn with_id(&self, mut record: SelectionRecord) -> SelectionRecord {
        if record.id.is_none() {
            record.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        }
        record
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("store is unavailable");
        }
        Ok(())
    }

    /// Same bound as the PostgreSQL `pax INTEGER` column.
    fn check_storable(record: &SelectionRecord) -> Result<()> {
        if record.pax > MAX_PAX {
            bail!("Guest count {} is too large to store", record.pax);
        }
        Ok(())
    }
}

impl QuoteStore for MemoryStore {
    async fn fetch_events(&self) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self.events.lock().unwrap().values().cloned().collect();
        events.sort_by(|a, b| a.start_date.cmp(&b.start_date).then(a.id.cmp(&b.id)));
        Ok(events)
    }

    async fn fetch_event(&self, event_id: &str) -> Result<Option<Event>> {
        Ok(self.event(event_id))
    }

    async fn fetch_catalog(&self) -> Result<MenuCatalog> {
        Ok(self.catalog.lock().unwrap().clone())
    }

    async fn fetch_selections(&self, event_id: &str) -> Result<Vec<SelectionRecord>> {
        Ok(self.selections_for(event_id))
    }

    async fn replace_selections(&self, event_id: &str, records: &[SelectionRecord]) -> Result<()> {
        self.check_writable()
            .context("Failed to replace menu selections")?;
        records.iter().try_for_each(Self::check_storable)?;
        let records = records.iter().cloned().map(|r| self.with_id(r)).collect();
        self.selections
            .lock()
            .unwrap()
            .insert(event_id.to_string(), records);
        Ok(())
    }

    async fn mark_submitted(&self, event_id: &str) -> Result<()> {
        self.check_writable()
            .context("Failed to update quote status")?;
        let mut events = self.events.lock().unwrap();
        let event = events
            .get_mut(event_id)
            .with_context(|| format!("Event {event_id} not found"))?;
        event.quote_status = QuoteStatus::ClientSubmitted;
        Ok(())
    }

    async fn update_selection(&self, record: &SelectionRecord) -> Result<()> {
        self.check_writable()
            .context("Failed to update menu selection")?;
        Self::check_storable(record)?;
        let id = record.id.context("Cannot update a selection without an id")?;
        let mut selections = self.selections.lock().unwrap();
        let stored = selections
            .get_mut(&record.event_id)
            .and_then(|records| records.iter_mut().find(|r| r.id == Some(id)))
            .with_context(|| format!("Selection {id} not found"))?;
        *stored = record.clone();
        Ok(())
    }
}

// ==================== Local Cache Trait ====================

/// Key/value string cache that survives a client crash or reload.
pub trait LocalCache: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;

    fn write(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory cache; clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl LocalCache for MemoryCache {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}
