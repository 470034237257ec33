use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::forecast::Coordinate;

/// Maximum rows returned by [`Database::search`].
pub const SEARCH_LIMIT: i64 = 10;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),
    #[error("Data ingest failed: {0}")]
    Ingest(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AirportMatch {
    pub iata_code: String,
    pub name: Option<String>,
    pub municipality: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TicketRoute {
    pub origin: String,
    pub destination: String,
}

/// One OurAirports `airports.csv` row; the remaining columns are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct AirportRow {
    pub iata_code: String,
    pub name: String,
    pub municipality: String,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
}

impl AirportRow {
    /// Lowercased code, name and municipality, one per line so a term never
    /// matches across fields.
    pub fn search_key(&self) -> String {
        format!("{}\n{}\n{}", self.iata_code, self.name, self.municipality).to_lowercase()
    }
}

/// Header-less `tickets.csv` row.
#[derive(Debug, Clone, Deserialize)]
pub struct TicketRow {
    pub num_ticket: String,
    pub origin: String,
    pub destination: String,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the tables when missing, keeping existing data.
    pub async fn ensure_tables(&self) -> Result<(), DatabaseError> {
        // IATA codes are unique in the source dataset.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS airports (
                iata_code    TEXT PRIMARY KEY,
                name         TEXT,
                municipality TEXT,
                latitude     REAL NOT NULL,
                longitude    REAL NOT NULL,
                search_key   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tickets (
                num_ticket  TEXT PRIMARY KEY,
                origin      TEXT NOT NULL REFERENCES airports(iata_code),
                destination TEXT NOT NULL REFERENCES airports(iata_code)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Drops and recreates both tables.
    pub async fn init_tables(&self) -> Result<(), DatabaseError> {
        sqlx::query("DROP TABLE IF EXISTS tickets")
            .execute(&self.pool)
            .await?;
        sqlx::query("DROP TABLE IF EXISTS airports")
            .execute(&self.pool)
            .await?;

        self.ensure_tables().await
    }

    /// Recreates the tables and loads airports from the configured CSV URL
    /// and tickets from the configured file.
    pub async fn init_db(&self, config: &Config) -> Result<(), DatabaseError> {
        self.init_tables().await?;

        tracing::info!("Downloading airports from {}", config.airports_csv_url);
        let airports_csv = download(&config.airports_csv_url).await?;
        let airports = parse_airports(airports_csv.as_bytes())?;
        let inserted = self.populate_airports(&airports).await?;
        tracing::info!("Loaded {} airports", inserted);

        let tickets_csv = tokio::fs::read(&config.tickets_csv_path)
            .await
            .map_err(|e| {
                DatabaseError::Ingest(format!("File missing: {}: {}", config.tickets_csv_path, e))
            })?;
        let tickets = parse_tickets(tickets_csv.as_slice())?;
        let inserted = self.populate_tickets(&tickets).await?;
        tracing::info!("Loaded {} tickets", inserted);

        Ok(())
    }

    /// Inserts airports, skipping duplicate IATA codes. Returns the number
    /// of rows inserted.
    pub async fn populate_airports(&self, airports: &[AirportRow]) -> Result<u64, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for airport in airports {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO airports \
                 (iata_code, name, municipality, latitude, longitude, search_key) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(&airport.iata_code)
            .bind(&airport.name)
            .bind(&airport.municipality)
            .bind(airport.latitude_deg)
            .bind(airport.longitude_deg)
            .bind(airport.search_key())
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Inserts tickets whose origin and destination are both known airports.
    /// Returns the number of rows inserted.
    pub async fn populate_tickets(&self, tickets: &[TicketRow]) -> Result<u64, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for ticket in tickets {
            let result = sqlx::query(
                r#"
                INSERT INTO tickets (num_ticket, origin, destination)
                SELECT ?1, ?2, ?3
                WHERE EXISTS (SELECT 1 FROM airports WHERE iata_code = ?2)
                  AND EXISTS (SELECT 1 FROM airports WHERE iata_code = ?3)
                "#,
            )
            .bind(&ticket.num_ticket)
            .bind(&ticket.origin)
            .bind(&ticket.destination)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tracing::warn!(
                    "Skipping ticket {}: unknown airport in {} -> {}",
                    ticket.num_ticket,
                    ticket.origin,
                    ticket.destination
                );
            }
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn get_iata_location(&self, iata_code: &str) -> Result<Option<Coordinate>, DatabaseError> {
        let row: Option<(f64, f64)> = sqlx::query_as(
            "SELECT latitude, longitude FROM airports WHERE iata_code = ?1",
        )
        .bind(iata_code.trim().to_uppercase())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(lat, lon)| {
            Coordinate::new(lat, lon)
                .map_err(|e| DatabaseError::InvalidData(format!("airport {}: {}", iata_code, e)))
        })
        .transpose()
    }

    pub async fn get_ticket_iata(&self, num_ticket: &str) -> Result<Option<TicketRoute>, DatabaseError> {
        let route = sqlx::query_as::<_, TicketRoute>(
            "SELECT origin, destination FROM tickets WHERE num_ticket = ?1",
        )
        .bind(num_ticket.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(route)
    }

    /// Case-insensitive substring search over IATA code, name and
    /// municipality. Exact IATA matches sort first.
    pub async fn search(&self, term: &str) -> Result<Vec<AirportMatch>, DatabaseError> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        // SQLite only folds ASCII case, so both sides are lowercased here.
        let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
        let results = sqlx::query_as::<_, AirportMatch>(
            r#"
            SELECT iata_code, name, municipality FROM airports
            WHERE search_key LIKE ?1 ESCAPE '\'
            ORDER BY iata_code = ?2 DESC, iata_code
            LIMIT ?3
            "#,
        )
        .bind(pattern)
        .bind(term.to_uppercase())
        .bind(SEARCH_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

/// Parses OurAirports CSV, dropping rows without an IATA code.
pub fn parse_airports<R: std::io::Read>(reader: R) -> Result<Vec<AirportRow>, DatabaseError> {
    let mut csv = csv::Reader::from_reader(reader);
    let mut airports = Vec::new();

    for row in csv.deserialize::<AirportRow>() {
        let mut airport = row.map_err(|e| DatabaseError::Ingest(format!("airports.csv: {}", e)))?;
        airport.iata_code = airport.iata_code.trim().to_uppercase();
        if !airport.iata_code.is_empty() {
            airports.push(airport);
        }
    }

    Ok(airports)
}

pub fn parse_tickets<R: std::io::Read>(reader: R) -> Result<Vec<TicketRow>, DatabaseError> {
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(reader);

    csv.deserialize::<TicketRow>()
        .map(|row| row.map_err(|e| DatabaseError::Ingest(format!("tickets.csv: {}", e))))
        .collect()
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

async fn download(url: &str) -> Result<String, DatabaseError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| DatabaseError::Ingest(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| DatabaseError::Ingest(format!("Error while trying to fetch airport data: {}", e)))?;

    response
        .text()
        .await
        .map_err(|e| DatabaseError::Ingest(format!("Error while reading airport data: {}", e)))
}
