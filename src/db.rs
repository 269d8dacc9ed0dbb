use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use sqlx::{FromRow, PgPool};
use tracing::{debug, warn};

use crate::models::{
    Category, Event, EventSize, EventStatus, MenuCatalog, MenuItem, QuoteStatus, SelectionRecord,
    Station,
};
use crate::traits::QuoteStore;

/// A row of the `events` table.
#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: String,
    pub event_code: String,
    pub client_name: Option<String>,
    pub event_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub event_size: Option<String>,
    pub status: String,
    pub quote_status: Option<String>,
}

impl EventRow {
    pub fn into_event(self) -> Event {
        let status = self.status.parse().unwrap_or_else(|e| {
            warn!(event_id = %self.id, error = %e, "Treating unknown event status as draft");
            EventStatus::Draft
        });
        Event {
            size: EventSize::from_column(self.event_size.as_deref()),
            quote_status: QuoteStatus::from_column(self.quote_status.as_deref()),
            id: self.id,
            event_code: self.event_code,
            client_name: self.client_name,
            start_date: self.event_date,
            end_date: self.end_date,
            status,
        }
    }
}

/// A row of the `menu_selections` table; items are JSON array text.
#[derive(Debug, Clone, FromRow)]
pub struct SelectionRow {
    pub id: i64,
    pub event_id: String,
    pub category_id: String,
    pub category_title: String,
    pub pax: i32,
    pub price_per_plate: f64,
    pub selected_items: String,
    pub order_index: Option<i32>,
}

impl SelectionRow {
    pub fn into_record(self) -> SelectionRecord {
        SelectionRecord {
            selected_items: parse_item_list(self.id, &self.selected_items),
            id: Some(self.id),
            event_id: self.event_id,
            category_id: self.category_id,
            category_title: self.category_title,
            pax: u32::try_from(self.pax).unwrap_or(0),
            price_per_plate: self.price_per_plate.max(0.0),
            order_index: self.order_index,
        }
    }
}

/// Decode a stored item list. Anything but a JSON array of strings loads as
/// an empty list.
pub fn parse_item_list(selection_id: i64, raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(selection_id, error = %e, "Ignoring unreadable item list");
        Vec::new()
    })
}

fn encode_item_list(items: &[String]) -> Result<String> {
    serde_json::to_string(items).context("Failed to encode item list")
}

fn pax_column(pax: u32) -> Result<i32> {
    i32::try_from(pax).with_context(|| format!("Guest count {pax} is too large to store"))
}

#[derive(Clone, Debug)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;

        Ok(Self { pool })
    }

    /// Insert or overwrite an event.
    pub async fn upsert_event(&self, event: &Event) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO events
                (id, event_code, client_name, event_date, end_date, event_size, status, quote_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                event_code = EXCLUDED.event_code,
                client_name = EXCLUDED.client_name,
                event_date = EXCLUDED.event_date,
                end_date = EXCLUDED.end_date,
                event_size = EXCLUDED.event_size,
                status = EXCLUDED.status,
                quote_status = EXCLUDED.quote_status
            "#,
        )
        .bind(&event.id)
        .bind(&event.event_code)
        .bind(&event.client_name)
        .bind(event.start_date)
        .bind(event.end_date)
        .bind(event.size.map(|s| match s {
            EventSize::Small => "Small",
            EventSize::Large => "Large",
        }))
        .bind(event.status.as_str())
        .bind(event.quote_status.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save event {}", event.id))?;
        Ok(())
    }

    /// Insert or overwrite every category, station and item of a catalog.
    pub async fn save_catalog(&self, catalog: &MenuCatalog) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;

        for category in catalog.categories() {
            sqlx::query(
                r#"
                INSERT INTO menu_categories (id, title, default_price, sort_order)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id) DO UPDATE SET
                    title = EXCLUDED.title,
                    default_price = EXCLUDED.default_price,
                    sort_order = EXCLUDED.sort_order
                "#,
            )
            .bind(&category.id)
            .bind(&category.title)
            .bind(category.default_price)
            .bind(category.sort_order)
            .execute(&mut *tx)
            .await
            .context("Failed to save menu category")?;
        }

        for station in catalog.stations() {
            sqlx::query(
                r#"
                INSERT INTO menu_stations (id, category_id, name, sort_order)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id) DO UPDATE SET
                    category_id = EXCLUDED.category_id,
                    name = EXCLUDED.name,
                    sort_order = EXCLUDED.sort_order
                "#,
            )
            .bind(&station.id)
            .bind(&station.category_id)
            .bind(&station.name)
            .bind(station.sort_order)
            .execute(&mut *tx)
            .await
            .context("Failed to save menu station")?;
        }

        for item in catalog.items() {
            sqlx::query(
                r#"
                INSERT INTO menu_items (id, station_id, name)
                VALUES ($1, $2, $3)
                ON CONFLICT (id) DO UPDATE SET
                    station_id = EXCLUDED.station_id,
                    name = EXCLUDED.name
                "#,
            )
            .bind(&item.id)
            .bind(&item.station_id)
            .bind(&item.name)
            .execute(&mut *tx)
            .await
            .context("Failed to save menu item")?;
        }

        tx.commit().await.context("Failed to commit menu catalog")?;
        Ok(())
    }
}

impl QuoteStore for Database {
    async fn fetch_events(&self) -> Result<Vec<Event>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, event_code, client_name, event_date, end_date, event_size, status,
                   quote_status
            FROM events
            ORDER BY event_date ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch events")?;

        Ok(rows.into_iter().map(EventRow::into_event).collect())
    }

    async fn fetch_event(&self, event_id: &str) -> Result<Option<Event>> {
        let row = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, event_code, client_name, event_date, end_date, event_size, status,
                   quote_status
            FROM events
            WHERE id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch event {event_id}"))?;

        Ok(row.map(EventRow::into_event))
    }

    async fn fetch_catalog(&self) -> Result<MenuCatalog> {
        let categories = sqlx::query_as::<_, (String, String, f64, i32)>(
            "SELECT id, title, default_price, sort_order FROM menu_categories ORDER BY sort_order",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch menu categories")?;

        let stations = sqlx::query_as::<_, (String, String, String, i32)>(
            "SELECT id, category_id, name, sort_order FROM menu_stations ORDER BY sort_order",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch menu stations")?;

        let items = sqlx::query_as::<_, (String, String, String)>(
            "SELECT id, station_id, name FROM menu_items ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch menu items")?;

        let catalog = MenuCatalog::from_parts(
            categories
                .into_iter()
                .map(|(id, title, default_price, sort_order)| Category {
                    id,
                    title,
                    default_price,
                    sort_order,
                })
                .collect(),
            stations
                .into_iter()
                .map(|(id, category_id, name, sort_order)| Station {
                    id,
                    category_id,
                    name,
                    sort_order,
                })
                .collect(),
            items
                .into_iter()
                .map(|(id, station_id, name)| MenuItem {
                    id,
                    station_id,
                    name,
                })
                .collect(),
        )
        .context("Stored menu catalog is inconsistent")?;

        debug!(categories = catalog.categories().len(), "Loaded menu catalog");
        Ok(catalog)
    }

    async fn fetch_selections(&self, event_id: &str) -> Result<Vec<SelectionRecord>> {
        let rows = sqlx::query_as::<_, SelectionRow>(
            r#"
            SELECT id, event_id, category_id, category_title, pax, price_per_plate,
                   selected_items, order_index
            FROM menu_selections
            WHERE event_id = $1
            ORDER BY category_title ASC
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch menu selections for {event_id}"))?;

        Ok(rows.into_iter().map(SelectionRow::into_record).collect())
    }

    async fn replace_selections(&self, event_id: &str, records: &[SelectionRecord]) -> Result<()> {
        // Delete and insert commit together, so a failure never leaves the
        // event without selections.
        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;

        sqlx::query("DELETE FROM menu_selections WHERE event_id = $1")
            .bind(event_id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete previous menu selections")?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO menu_selections
                    (event_id, category_id, category_title, pax, price_per_plate,
                     selected_items, order_index)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(event_id)
            .bind(&record.category_id)
            .bind(&record.category_title)
            .bind(pax_column(record.pax)?)
            .bind(record.price_per_plate)
            .bind(encode_item_list(&record.selected_items)?)
            .bind(record.order_index)
            .execute(&mut *tx)
            .await
            .context("Failed to insert menu selection")?;
        }

        tx.commit()
            .await
            .context("Failed to commit menu selections")?;
        debug!(event_id, count = records.len(), "Replaced menu selections");
        Ok(())
    }

    async fn mark_submitted(&self, event_id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE events SET quote_status = $1 WHERE id = $2")
            .bind(QuoteStatus::ClientSubmitted.as_str())
            .bind(event_id)
            .execute(&self.pool)
            .await
            .context("Failed to update quote status")?;

        if result.rows_affected() == 0 {
            bail!("Event {event_id} not found");
        }
        Ok(())
    }

    async fn update_selection(&self, record: &SelectionRecord) -> Result<()> {
        let id = record
            .id
            .context("Cannot update a selection without an id")?;

        let result = sqlx::query(
            r#"
            UPDATE menu_selections
            SET pax = $1, price_per_plate = $2, selected_items = $3, order_index = $4
            WHERE id = $5
            "#,
        )
        .bind(pax_column(record.pax)?)
        .bind(record.price_per_plate)
        .bind(encode_item_list(&record.selected_items)?)
        .bind(record.order_index)
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to update menu selection {id}"))?;

        if result.rows_affected() == 0 {
            bail!("Selection {id} not found");
        }
        Ok(())
    }
}
