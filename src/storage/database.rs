//! SQLite database for persistent storage

use anyhow::{Context, Result};
use chrono::DateTime;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

use super::{Competitor, CompetitorLookup, DetectionRecord, DetectionSink};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS sail_numbers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        value INTEGER NOT NULL,
        confidence REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
        timestamp INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_sail_numbers_timestamp ON sail_numbers (timestamp);
    CREATE TABLE IF NOT EXISTS competitors (
        sail_number INTEGER PRIMARY KEY,
        skipper_name TEXT,
        boat_name TEXT,
        club TEXT
    );
";

/// Database connection wrapper
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create database at path
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("failed to open database {:?}", path))?;
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema()?;
        info!("Opened database at {:?}", path);
        Ok(db)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    pub fn init_schema(&self) -> Result<()> {
        self.conn.lock().execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Insert detections in one transaction, committed only if every row succeeds
    pub fn insert_detections(&self, records: &[DetectionRecord]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO sail_numbers (value, confidence, timestamp) VALUES (?1, ?2, ?3)")?;
            for record in records {
                stmt.execute(params![
                    record.value,
                    record.confidence as f64,
                    record.timestamp.timestamp_millis()
                ])
                .with_context(|| format!("failed to store detection {}", record.value))?;
            }
        }
        tx.commit()?;
        debug!("Stored {} detection(s)", records.len());
        Ok(())
    }

    /// Latest detections, newest first
    pub fn recent_detections(&self, limit: usize) -> Result<Vec<DetectionRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT value, confidence, timestamp FROM sail_numbers
             ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            let value: u32 = row.get(0)?;
            let confidence: f64 = row.get(1)?;
            let millis: i64 = row.get(2)?;
            Ok((value, confidence, millis))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (value, confidence, millis) = row?;
            let timestamp = DateTime::from_timestamp_millis(millis)
                .with_context(|| format!("stored timestamp {} is out of range", millis))?;
            records.push(DetectionRecord {
                value,
                confidence: confidence as f32,
                timestamp,
            });
        }

        Ok(records)
    }

    /// Insert or replace a competitor entry
    pub fn upsert_competitor(&self, competitor: &Competitor) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO competitors (sail_number, skipper_name, boat_name, club)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(sail_number) DO UPDATE SET
                skipper_name = excluded.skipper_name,
                boat_name = excluded.boat_name,
                club = excluded.club",
            params![
                competitor.sail_number,
                competitor.skipper_name,
                competitor.boat_name,
                competitor.club
            ],
        )?;
        Ok(())
    }

    pub fn competitor(&self, sail_number: u32) -> Result<Option<Competitor>> {
        let competitor = self
            .conn
            .lock()
            .query_row(
                "SELECT sail_number, skipper_name, boat_name, club FROM competitors WHERE sail_number = ?1",
                params![sail_number],
                |row| {
                    Ok(Competitor {
                        sail_number: row.get(0)?,
                        skipper_name: row.get(1)?,
                        boat_name: row.get(2)?,
                        club: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(competitor)
    }
}

impl DetectionSink for Database {
    fn record_all(&self, records: &[DetectionRecord]) -> Result<()> {
        self.insert_detections(records)
    }
}

impl CompetitorLookup for Database {
    fn lookup(&self, sail_number: u32) -> Result<Option<Competitor>> {
        self.competitor(sail_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn record(value: u32, confidence: f32, seconds_ago: i64) -> DetectionRecord {
        DetectionRecord {
            value,
            confidence,
            timestamp: Utc::now() - Duration::seconds(seconds_ago),
        }
    }

    #[test]
    fn test_recent_detections_newest_first() {
        let db = Database::open_in_memory().unwrap();
        db.record_all(&[record(101, 0.9, 30)]).unwrap();
        db.record_all(&[record(202, 0.8, 10)]).unwrap();
        db.record_all(&[record(303, 0.7, 20)]).unwrap();

        let recent = db.recent_detections(10).unwrap();
        let values: Vec<u32> = recent.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![202, 303, 101]);
        assert!((recent[0].confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_recent_detections_limit() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..15 {
            db.record_all(&[record(100 + i, 0.9, 100 - i as i64)]).unwrap();
        }

        let recent = db.recent_detections(crate::storage::DEFAULT_RECENT_LIMIT).unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].value, 114);
    }

    #[test]
    fn test_batch_is_stored_together() {
        let db = Database::open_in_memory().unwrap();
        db.record_all(&[record(11, 0.9, 2), record(22, 0.8, 1)]).unwrap();
        assert_eq!(db.recent_detections(10).unwrap().len(), 2);
    }

    #[test]
    fn test_failed_batch_stores_nothing() {
        let db = Database::open_in_memory().unwrap();
        // Second row violates the confidence check
        let result = db.record_all(&[record(4242, 0.9, 0), record(707, 1.5, 0)]);
        assert!(result.is_err());
        assert!(db.recent_detections(10).unwrap().is_empty());

        db.record_all(&[record(4242, 0.9, 0)]).unwrap();
        assert_eq!(db.recent_detections(10).unwrap().len(), 1);
    }

    #[test]
    fn test_timestamp_survives_storage() {
        let db = Database::open_in_memory().unwrap();
        let stored = record(4242, 0.95, 0);
        db.record_all(&[stored.clone()]).unwrap();

        let loaded = &db.recent_detections(1).unwrap()[0];
        assert_eq!(loaded.timestamp.timestamp_millis(), stored.timestamp.timestamp_millis());
    }

    #[test]
    fn test_competitor_lookup() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.lookup(1234).unwrap().is_none());

        db.upsert_competitor(&Competitor {
            sail_number: 1234,
            skipper_name: Some("A. Skipper".to_string()),
            boat_name: Some("Windward".to_string()),
            club: None,
        })
        .unwrap();

        let found = db.lookup(1234).unwrap().unwrap();
        assert_eq!(found.boat_name.as_deref(), Some("Windward"));
        assert!(found.club.is_none());
    }

    #[test]
    fn test_upsert_replaces_competitor() {
        let db = Database::open_in_memory().unwrap();
        let mut competitor = Competitor {
            sail_number: 77,
            boat_name: Some("First".to_string()),
            ..Default::default()
        };
        db.upsert_competitor(&competitor).unwrap();

        competitor.boat_name = Some("Second".to_string());
        competitor.club = Some("RYC".to_string());
        db.upsert_competitor(&competitor).unwrap();

        assert_eq!(db.lookup(77).unwrap(), Some(competitor));
    }

    #[test]
    fn test_file_database_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sailscan.db");

        {
            let db = Database::open(&path).unwrap();
            db.record_all(&[record(808, 0.75, 0)]).unwrap();
        }

        let reopened = Database::open(&path).unwrap();
        let recent = reopened.recent_detections(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].value, 808);
    }
}
