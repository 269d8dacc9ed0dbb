//! Client menu selection wizard.
//!
//! A [`SelectionSession`] owns the two maps a client edits for one event:
//! guest counts per (day, category) session and the chosen items per
//! session. Every mutation while the wizard is editable is mirrored into a
//! [`LocalCache`], so a crash or reload can resume where the client left
//! off. Submission writes one [`SelectionRecord`] per enabled session to the
//! durable store.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::cache::{
    CacheLoad, CacheSnapshot, MenuSelections, SessionConfig, clear_snapshot, load_snapshot,
    save_snapshot,
};
use crate::dates::day_label;
use crate::error::SessionError;
use crate::models::{MAX_PAX, Event, MenuCatalog, QuoteStatus, SelectionRecord, session_label};
use crate::traits::{LocalCache, QuoteStore};

// ==================== Session Key ====================

/// One (day, category) pairing within an event. Day 0 is the start date.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionKey {
    pub day_index: usize,
    pub category_id: String,
}

impl SessionKey {
    pub fn new(day_index: usize, category_id: impl Into<String>) -> Self {
        Self {
            day_index,
            category_id: category_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.day_index, self.category_id)
    }
}

impl FromStr for SessionKey {
    type Err = String;

    /// Parse `"{day}_{category}"`. Category ids may themselves contain `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (day, category) = s
            .split_once('_')
            .ok_or_else(|| format!("session key without separator: {s}"))?;
        let day_index = day
            .parse()
            .map_err(|_| format!("session key with invalid day: {s}"))?;
        if category.is_empty() {
            return Err(format!("session key without category: {s}"));
        }
        Ok(Self::new(day_index, category))
    }
}

impl Serialize for SessionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SessionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ==================== Wizard State ====================

/// Where the client is in the wizard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardStep {
    /// Choosing which sessions to book and their guest counts.
    Configuring,
    /// Picking items; at most one session is open at a time.
    Selecting { active: Option<SessionKey> },
    Reviewing,
    /// Locked after submission until [`SelectionSession::unlock`].
    Submitted,
    /// Staff view of the client's choices. Never editable.
    PreviewReadOnly,
}

impl WizardStep {
    pub fn name(&self) -> &'static str {
        match self {
            WizardStep::Configuring => "configuring",
            WizardStep::Selecting { .. } => "selecting",
            WizardStep::Reviewing => "reviewing",
            WizardStep::Submitted => "submitted",
            WizardStep::PreviewReadOnly => "previewing",
        }
    }

    pub fn is_editable(&self) -> bool {
        matches!(
            self,
            WizardStep::Configuring | WizardStep::Selecting { .. } | WizardStep::Reviewing
        )
    }
}

/// How the wizard is being opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestoreMode {
    #[default]
    Edit,
    Preview,
}

/// Which tier the maps were restored from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestoreSource {
    Cache,
    Records,
    #[default]
    Empty,
}

/// One enabled session as shown on the review screen.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewLine {
    pub key: SessionKey,
    pub label: String,
    pub pax: u32,
    pub price_per_plate: f64,
    pub items: Vec<String>,
    pub amount: f64,
    /// No item has been chosen yet. Submitting is still allowed.
    pub selection_pending: bool,
}

/// `parseInt`-style guest count: leading digits win, anything else is 0.
///
/// Negative input clamps to 0 and huge input saturates at [`MAX_PAX`].
pub fn parse_pax(input: &str) -> u32 {
    let trimmed = input.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits: &str = &digits[..digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len())];

    if negative || digits.is_empty() {
        return 0;
    }
    digits.parse::<u32>().map_or(MAX_PAX, |pax| pax.min(MAX_PAX))
}

// ==================== Selection Session ====================

/// Editable menu selection for a single event.
#[derive(Debug)]
pub struct SelectionSession<C: LocalCache> {
    event: Event,
    days: Vec<NaiveDate>,
    catalog: MenuCatalog,
    step: WizardStep,
    config: SessionConfig,
    selections: MenuSelections,
    cache: C,
    source: RestoreSource,
}

impl<C: LocalCache> SelectionSession<C> {
    /// Fresh wizard with nothing booked.
    pub fn new(event: Event, catalog: MenuCatalog, cache: C) -> Self {
        let days = event.days();
        Self {
            event,
            days,
            catalog,
            step: WizardStep::Configuring,
            config: SessionConfig::new(),
            selections: MenuSelections::new(),
            cache,
            source: RestoreSource::Empty,
        }
    }

    /// Load everything for `event_id` from the store and resume the wizard.
    pub async fn restore<S: QuoteStore>(
        store: &S,
        event_id: &str,
        mode: RestoreMode,
        cache: C,
    ) -> Result<Self, SessionError> {
        let event = store
            .fetch_event(event_id)
            .await
            .map_err(|e| SessionError::persistence(&e))?
            .ok_or_else(|| SessionError::validation(format!("Event {event_id} not found")))?;
        let catalog = store
            .fetch_catalog()
            .await
            .map_err(|e| SessionError::persistence(&e))?;
        let records = store
            .fetch_selections(event_id)
            .await
            .map_err(|e| SessionError::persistence(&e))?;

        Ok(Self::from_sources(event, catalog, &records, cache, mode))
    }

    /// Rebuild the wizard from already-fetched data.
    ///
    /// The cache wins over durable records unless the quote has already
    /// been submitted. Preview and submitted quotes open read-only.
    pub fn from_sources(
        event: Event,
        catalog: MenuCatalog,
        records: &[SelectionRecord],
        cache: C,
        mode: RestoreMode,
    ) -> Self {
        let submitted = event.quote_status == QuoteStatus::ClientSubmitted;
        let mut session = Self::new(event, catalog, cache);

        if !submitted {
            match load_snapshot(&session.cache, &session.event.id) {
                CacheLoad::Loaded(snapshot) => {
                    session.adopt(snapshot.config, snapshot.selections);
                    session.source = RestoreSource::Cache;
                }
                CacheLoad::Corrupt(reason) => {
                    warn!(event_id = %session.event.id, %reason, "Ignoring corrupt local cache");
                }
                CacheLoad::Missing => {}
            }
        }

        if session.source == RestoreSource::Empty && !records.is_empty() {
            let mut config = SessionConfig::new();
            let mut selections = MenuSelections::new();
            for record in records {
                let key = SessionKey::new(record.day_index(), record.category_id.clone());
                config.insert(key.clone(), record.pax);
                selections.insert(key, record.selected_items.iter().cloned().collect());
            }
            session.adopt(config, selections);
            session.source = RestoreSource::Records;
        }

        session.step = match mode {
            RestoreMode::Preview => WizardStep::PreviewReadOnly,
            RestoreMode::Edit if submitted => WizardStep::Submitted,
            RestoreMode::Edit => WizardStep::Configuring,
        };

        if !session.step.is_editable() {
            session.clear_cache();
        }

        info!(
            event_id = %session.event.id,
            source = ?session.source,
            step = session.step.name(),
            sessions = session.config.len(),
            "Restored menu selection"
        );
        session
    }

    /// Keep only sessions that still exist for this event and menu, and
    /// give every enabled session an item set.
    fn adopt(&mut self, config: SessionConfig, mut selections: MenuSelections) {
        self.config.clear();
        self.selections.clear();

        for (key, pax) in config {
            if !self.is_known_session(&key) {
                warn!(event_id = %self.event.id, %key, "Dropping session that no longer exists");
                continue;
            }
            let items = selections.remove(&key).unwrap_or_default();
            self.config.insert(key.clone(), pax);
            self.selections.insert(key, items);
        }
    }

    fn is_known_session(&self, key: &SessionKey) -> bool {
        key.day_index < self.days.len() && self.catalog.category(&key.category_id).is_some()
    }

    // ==================== Accessors ====================

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn days(&self) -> &[NaiveDate] {
        &self.days
    }

    pub fn catalog(&self) -> &MenuCatalog {
        &self.catalog
    }

    pub fn step(&self) -> &WizardStep {
        &self.step
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn selections(&self) -> &MenuSelections {
        &self.selections
    }

    pub fn restored_from(&self) -> RestoreSource {
        self.source
    }

    pub fn is_editable(&self) -> bool {
        self.step.is_editable()
    }

    pub fn is_enabled(&self, key: &SessionKey) -> bool {
        self.config.contains_key(key)
    }

    pub fn pax(&self, key: &SessionKey) -> Option<u32> {
        self.config.get(key).copied()
    }

    pub fn items(&self, key: &SessionKey) -> Option<&BTreeSet<String>> {
        self.selections.get(key)
    }

    pub fn active_session(&self) -> Option<&SessionKey> {
        match &self.step {
            WizardStep::Selecting { active } => active.as_ref(),
            _ => None,
        }
    }

    /// `"10 Oct"`-style label of a day of the event.
    pub fn day_label(&self, day_index: usize) -> Option<String> {
        self.days.get(day_index).map(|day| day_label(*day))
    }

    // ==================== Configuring ====================

    /// Enable the session, or disable it if already enabled.
    ///
    /// Returns whether the session is enabled afterwards. Disabling discards
    /// its guest count and items.
    pub fn toggle_session(
        &mut self,
        day_index: usize,
        category_id: &str,
    ) -> Result<bool, SessionError> {
        self.require(
            matches!(self.step, WizardStep::Configuring),
            "change sessions",
        )?;
        let key = SessionKey::new(day_index, category_id);
        if day_index >= self.days.len() {
            return Err(SessionError::validation(format!(
                "Day {} is outside the event",
                day_index + 1
            )));
        }
        if self.catalog.category(category_id).is_none() {
            return Err(SessionError::validation(format!(
                "Unknown menu category: {category_id}"
            )));
        }

        let enabled = if self.config.remove(&key).is_some() {
            self.selections.remove(&key);
            false
        } else {
            self.config.insert(key.clone(), 0);
            self.selections.insert(key.clone(), BTreeSet::new());
            true
        };
        debug!(%key, enabled, "Toggled session");

        self.mirror_to_cache();
        Ok(enabled)
    }

    /// Set the guest count from free-form input. See [`parse_pax`].
    pub fn update_pax(&mut self, key: &SessionKey, input: &str) -> Result<u32, SessionError> {
        let pax = parse_pax(input);
        self.set_pax(key, pax)?;
        Ok(pax)
    }

    pub fn set_pax(&mut self, key: &SessionKey, pax: u32) -> Result<(), SessionError> {
        self.require(self.is_editable(), "change guest counts")?;
        if pax > MAX_PAX {
            return Err(SessionError::validation(format!(
                "Guest count {pax} is above the limit of {MAX_PAX}"
            )));
        }
        let slot = self.config.get_mut(key).ok_or_else(|| {
            SessionError::validation(format!("Session {key} is not enabled"))
        })?;
        *slot = pax;
        debug!(%key, pax, "Updated guest count");

        self.mirror_to_cache();
        Ok(())
    }

    pub fn proceed_to_selection(&mut self) -> Result<(), SessionError> {
        self.require(
            matches!(self.step, WizardStep::Configuring),
            "start choosing items",
        )?;
        self.require_sessions()?;
        self.step = WizardStep::Selecting { active: None };
        Ok(())
    }

    // ==================== Selecting ====================

    pub fn open_session(&mut self, key: &SessionKey) -> Result<(), SessionError> {
        self.require(
            matches!(self.step, WizardStep::Selecting { .. }),
            "open a session",
        )?;
        if !self.is_enabled(key) {
            return Err(SessionError::validation(format!(
                "Session {key} is not enabled"
            )));
        }
        self.step = WizardStep::Selecting {
            active: Some(key.clone()),
        };
        Ok(())
    }

    pub fn close_session(&mut self) -> Result<(), SessionError> {
        self.require(
            matches!(self.step, WizardStep::Selecting { .. }),
            "close a session",
        )?;
        self.step = WizardStep::Selecting { active: None };
        Ok(())
    }

    /// Add or remove an item in the open session. Returns whether the item
    /// is selected afterwards.
    pub fn toggle_item(&mut self, item_name: &str) -> Result<bool, SessionError> {
        let key = self
            .active_session()
            .cloned()
            .ok_or(SessionError::InvalidTransition {
                from: self.step.name(),
                action: "toggle an item without an open session",
            })?;
        if !self.catalog.category_offers(&key.category_id, item_name) {
            return Err(SessionError::validation(format!(
                "{item_name} is not on the {} menu",
                key.category_id
            )));
        }

        let items = self.selections.entry(key.clone()).or_default();
        let selected = if items.remove(item_name) {
            false
        } else {
            items.insert(item_name.to_string());
            true
        };
        debug!(%key, item = item_name, selected, "Toggled item");

        self.mirror_to_cache();
        Ok(selected)
    }

    pub fn back_to_configuring(&mut self) -> Result<(), SessionError> {
        self.require(
            matches!(self.step, WizardStep::Selecting { .. }),
            "go back to sessions",
        )?;
        self.step = WizardStep::Configuring;
        Ok(())
    }

    pub fn review(&mut self) -> Result<(), SessionError> {
        self.require(matches!(self.step, WizardStep::Selecting { .. }), "review")?;
        self.require_sessions()?;
        self.step = WizardStep::Reviewing;
        Ok(())
    }

    // ==================== Reviewing ====================

    pub fn back_to_selection(&mut self) -> Result<(), SessionError> {
        self.require(
            matches!(self.step, WizardStep::Reviewing),
            "go back to items",
        )?;
        self.step = WizardStep::Selecting { active: None };
        Ok(())
    }

    /// Sum of `pax * default price` over enabled sessions.
    pub fn total(&self) -> f64 {
        self.config
            .iter()
            .map(|(key, pax)| {
                let price = self
                    .catalog
                    .category(&key.category_id)
                    .map_or(0.0, |c| c.default_price);
                f64::from(*pax) * price
            })
            .sum()
    }

    pub fn review_lines(&self) -> Vec<ReviewLine> {
        self.config
            .iter()
            .filter_map(|(key, pax)| {
                let category = self.catalog.category(&key.category_id)?;
                let day = self.day_label(key.day_index)?;
                let items: Vec<String> = self
                    .selections
                    .get(key)
                    .map(|set| set.iter().cloned().collect())
                    .unwrap_or_default();
                Some(ReviewLine {
                    key: key.clone(),
                    label: session_label(key.day_index, &day, &category.title),
                    pax: *pax,
                    price_per_plate: category.default_price,
                    amount: f64::from(*pax) * category.default_price,
                    selection_pending: items.is_empty(),
                    items,
                })
            })
            .collect()
    }

    /// One durable record per enabled session, prices snapshotted now.
    pub fn build_records(&self) -> Vec<SelectionRecord> {
        self.review_lines()
            .into_iter()
            .map(|line| SelectionRecord {
                id: None,
                event_id: self.event.id.clone(),
                category_id: line.key.category_id,
                category_title: line.label,
                pax: line.pax,
                price_per_plate: line.price_per_plate,
                selected_items: line.items,
                order_index: None,
            })
            .collect()
    }

    /// Replace the event's stored selections and lock the wizard.
    ///
    /// On a store failure nothing changes locally, so the call can simply
    /// be retried.
    pub async fn submit<S: QuoteStore>(&mut self, store: &S) -> Result<(), SessionError> {
        self.require(matches!(self.step, WizardStep::Reviewing), "submit")?;
        self.require_sessions()?;

        let records = self.build_records();
        let pending = records.iter().filter(|r| r.is_pending()).count();
        if pending > 0 {
            warn!(event_id = %self.event.id, pending, "Submitting sessions with no items selected");
        }

        store
            .replace_selections(&self.event.id, &records)
            .await
            .map_err(|e| SessionError::persistence(&e))?;
        store
            .mark_submitted(&self.event.id)
            .await
            .map_err(|e| SessionError::persistence(&e))?;

        self.clear_cache();
        self.event.quote_status = QuoteStatus::ClientSubmitted;
        self.step = WizardStep::Submitted;

        info!(
            event_id = %self.event.id,
            sessions = records.len(),
            total = self.total(),
            "Menu selection submitted"
        );
        Ok(())
    }

    /// Reopen a submitted selection for editing.
    pub fn unlock(&mut self) -> Result<(), SessionError> {
        self.require(matches!(self.step, WizardStep::Submitted), "unlock")?;
        self.step = WizardStep::Reviewing;
        self.mirror_to_cache();
        Ok(())
    }

    // ==================== Internals ====================

    fn require(&self, allowed: bool, action: &'static str) -> Result<(), SessionError> {
        if allowed {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                from: self.step.name(),
                action,
            })
        }
    }

    fn require_sessions(&self) -> Result<(), SessionError> {
        if self.config.is_empty() {
            return Err(SessionError::validation("Select at least one session"));
        }
        Ok(())
    }

    fn mirror_to_cache(&self) {
        if !self.is_editable() {
            return;
        }
        let snapshot = CacheSnapshot {
            config: self.config.clone(),
            selections: self.selections.clone(),
        };
        if let Err(e) = save_snapshot(&self.cache, &self.event.id, &snapshot) {
            warn!(
                event_id = %self.event.id,
                error = %format!("{e:#}"),
                "Failed to cache selections"
            );
        }
    }

    fn clear_cache(&self) {
        if let Err(e) = clear_snapshot(&self.cache, &self.event.id) {
            warn!(
                event_id = %self.event.id,
                error = %format!("{e:#}"),
                "Failed to clear cached selections"
            );
        }
    }
}
