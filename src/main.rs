use std::path::PathBuf;

use anyhow::{Context, Result};
use catering_quotes::{
    AppConfig, CalendarBuilder, Clock, Database, FileCache, Quotation, QuoteStore, RestoreMode,
    SelectionSession, SystemClock, grouped_items,
};
use chrono::Datelike;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "catering-quotes")]
#[command(about = "Event calendar, client menu selection and quotations")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the month grid with event bars
    Calendar {
        #[arg(long)]
        year: Option<i32>,
        /// 1-12
        #[arg(long)]
        month: Option<u32>,
    },
    /// Restore a client's menu selection and print the review
    Review {
        event_id: String,
        /// Open read-only, as staff preview it
        #[arg(long)]
        preview: bool,
    },
    /// Print the priced quotation for an event
    Quote {
        event_id: String,
        /// Also write the quotation as CSV into this directory
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .parse_lossy("catering_quotes=debug");

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    rt.block_on(async move {
        tracing::info!("Connecting to database...");
        let database = Database::new(config.database_url()?).await?;
        tracing::info!("Database connected successfully");

        match args.command {
            Command::Calendar { year, month } => {
                run_calendar(&config, &database, &SystemClock, year, month).await
            }
            Command::Review { event_id, preview } => {
                run_review(&config, &database, &event_id, preview).await
            }
            Command::Quote { event_id, export } => {
                run_quote(&config, &database, &event_id, export).await
            }
        }
    })
}

async fn run_calendar<C: Clock>(
    config: &AppConfig,
    database: &Database,
    clock: &C,
    year: Option<i32>,
    month: Option<u32>,
) -> Result<()> {
    let today = clock.today();
    let events = database.fetch_events().await?;

    let builder = CalendarBuilder::new(config.calendar.max_visible_rows);
    let grid = builder.build(
        year.unwrap_or(today.year()),
        month.unwrap_or(today.month()),
        &events,
        today,
    )?;

    print!("{}", grid.render_text());
    Ok(())
}

async fn run_review(
    config: &AppConfig,
    database: &Database,
    event_id: &str,
    preview: bool,
) -> Result<()> {
    let mode = if preview {
        RestoreMode::Preview
    } else {
        RestoreMode::Edit
    };
    let cache = FileCache::new(config.cache_dir());
    let session = SelectionSession::restore(database, event_id, mode, cache).await?;

    let currency = &config.quote.currency_symbol;
    println!("{} [{}]", session.event().title(), session.step().name());

    let lines = session.review_lines();
    if lines.is_empty() {
        println!("No sessions selected yet.");
        return Ok(());
    }

    for line in lines {
        println!(
            "{}: {} pax x {currency} {:.2} = {currency} {:.2}",
            line.label, line.pax, line.price_per_plate, line.amount
        );
        if line.selection_pending {
            println!("    (selection pending)");
        } else {
            println!("    {}", line.items.join(", "));
        }
    }
    println!("Total: {currency} {:.2}", session.total());
    Ok(())
}

async fn run_quote(
    config: &AppConfig,
    database: &Database,
    event_id: &str,
    export: Option<PathBuf>,
) -> Result<()> {
    let records = database.fetch_selections(event_id).await?;
    let catalog = database.fetch_catalog().await?;
    let quotation = Quotation::new(event_id, records);

    let currency = &config.quote.currency_symbol;
    for (position, line) in quotation.lines().iter().enumerate() {
        println!(
            "{}. {}: {} pax x {currency} {:.2} = {currency} {:.2}",
            position + 1,
            line.category_title,
            line.pax,
            line.price_per_plate,
            line.amount()
        );
        for group in grouped_items(line, &catalog) {
            println!("    {}: {}", group.station, group.items.join(", "));
        }
    }

    let totals = quotation.totals(config.quote.tax_rate_percent);
    println!("Subtotal: {currency} {:.2}", totals.subtotal);
    println!(
        "Tax ({}%): {currency} {:.2}",
        config.quote.tax_rate_percent, totals.tax
    );
    println!("Total: {currency} {:.2}", totals.total);

    if let Some(dir) = export {
        let path = quotation.export_csv(&dir, &SystemClock).await?;
        tracing::info!("Quotation written to {}", path.display());
    }
    Ok(())
}
