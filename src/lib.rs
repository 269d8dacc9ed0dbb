//! Catering Quotes Library
//!
//! Calendar layout, the client menu selection wizard and the staff
//! quotation, exposed for the binary and for testing.

pub mod cache;
pub mod calendar;
pub mod config;
pub mod dates;
pub mod db;
pub mod error;
pub mod models;
pub mod packing;
pub mod quote;
pub mod session;
pub mod traits;

// Re-export commonly used types
pub use cache::{CacheLoad, CacheSnapshot, FileCache};
pub use calendar::{
    CalendarBuilder, CalendarError, CalendarMonth, DayCell, DayInfo, EventBar, WeekRow,
    events_on_day,
};
pub use config::AppConfig;
pub use db::Database;
pub use error::SessionError;
pub use models::{
    CatalogError, Category, Event, EventSize, EventStatus, MAX_PAX, MenuCatalog, MenuItem,
    QuoteStatus, SelectionRecord, Station,
};
pub use packing::{DEFAULT_MAX_VISIBLE_ROWS, Interval, Placement, pack_rows};
pub use quote::{Direction, QuoteTotals, Quotation, StationGroup, grouped_items};
pub use session::{
    RestoreMode, RestoreSource, ReviewLine, SelectionSession, SessionKey, WizardStep,
};
pub use traits::{Clock, LocalCache, MemoryCache, MemoryStore, MockClock, QuoteStore, SystemClock};
