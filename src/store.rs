//! SQLite-backed local store for carbon-accounting records.
//!
//! The database lives at `~/.carbondesk/<name>.db` and holds the user's
//! working data: reporting activities, emission factors, and GHG reporting
//! standards. This is draft data with a destructive retention policy, not an
//! archive — the retention controller clears all three collections when the
//! session lifecycle fires.
//!
//! Stores are explicitly constructed and injected; there is no global
//! instance. Construction is cheap and infallible, and the database is
//! opened lazily on first use: concurrent callers await the same in-flight
//! open, later callers get the memoized connection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use tokio::sync::{Mutex, OnceCell};

use crate::error::StoreError;
use crate::migrations;
use crate::observer::{LogSink, StoreEvent, StoreObserver};
use crate::types::{
    DataSnapshot, EmissionFactor, FactorSnapshot, GhgReportingStandard, RecordKind,
    ReportingActivity,
};

/// Standards present in a fresh database.
const DEFAULT_STANDARDS: &[&str] = &[
    "GHG Protocol Corporate Standard",
    "ISO 14064-1",
    "ESRS E1",
    "DEFRA SECR",
];

/// Where to open the database.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl StoreConfig {
    /// Resolve a named store under `~/.carbondesk/`.
    pub fn for_name(name: &str) -> Result<Self, StoreError> {
        let home = dirs::home_dir().ok_or(StoreError::HomeDirNotFound)?;
        Ok(Self {
            path: home.join(".carbondesk").join(format!("{name}.db")),
        })
    }

    /// Open at an explicit path. Useful for testing.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Per-kind record counts.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub activities: usize,
    pub factors: usize,
    pub standards: usize,
}

/// The local persistent store.
pub struct LedgerStore {
    config: StoreConfig,
    observer: Arc<dyn StoreObserver>,
    conn: OnceCell<Mutex<Connection>>,
}

impl LedgerStore {
    pub fn new(config: StoreConfig) -> Self {
        Self::with_observer(config, Arc::new(LogSink))
    }

    pub fn with_observer(config: StoreConfig, observer: Arc<dyn StoreObserver>) -> Self {
        Self {
            config,
            observer,
            conn: OnceCell::new(),
        }
    }

    /// Force initialization now instead of on first use.
    pub async fn init(&self) -> Result<(), StoreError> {
        self.conn().await.map(|_| ())
    }

    /// Lazily open the database. At most one open is in flight; concurrent
    /// callers await it rather than re-triggering.
    async fn conn(&self) -> Result<&Mutex<Connection>, StoreError> {
        self.conn
            .get_or_try_init(|| async {
                let (conn, applied) = Self::open_database(&self.config.path)?;
                self.observer.store_event(&StoreEvent::Opened {
                    migrations_applied: applied,
                });
                Ok(Mutex::new(conn))
            })
            .await
    }

    fn open_database(path: &Path) -> Result<(Connection, usize), StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(StoreError::CreateDir)?;
            }
        }

        let conn =
            Connection::open(path).map_err(|e| StoreError::Initialization(e.to_string()))?;

        // WAL keeps reads cheap while the retention path deletes
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| StoreError::Initialization(e.to_string()))?;

        let applied = migrations::run_migrations(&conn).map_err(StoreError::Initialization)?;

        Ok((conn, applied))
    }

    // =========================================================================
    // Activities
    // =========================================================================

    /// Persist a new activity and return its assigned identifier.
    ///
    /// The emission figure is computed here, inside the insert transaction,
    /// and stored with the row.
    pub async fn add_activity(&self, activity: &ReportingActivity) -> Result<i64, StoreError> {
        let snapshot_json = encode_snapshot(activity.factor_snapshot.as_ref())?;
        let conn = self.conn().await?;
        let id = {
            let mut guard = conn.lock().await;
            let tx = guard.transaction()?;
            let calculated = resolve_emissions(&tx, activity)?;
            tx.execute(
                "INSERT INTO activities (
                    period_start, period_end, scope, category, name, location,
                    quantity, factor_ref, factor_snapshot, remarks, calculated_emissions
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    activity.period_start,
                    activity.period_end,
                    activity.scope,
                    activity.category,
                    activity.name,
                    activity.location,
                    activity.quantity,
                    activity.factor_ref,
                    snapshot_json,
                    activity.remarks,
                    calculated,
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            id
        };
        self.observer.store_event(&StoreEvent::Added {
            kind: RecordKind::Activities,
            id,
        });
        Ok(id)
    }

    /// Get a single activity, or `None` if absent.
    pub async fn activity(&self, id: i64) -> Result<Option<ReportingActivity>, StoreError> {
        let conn = self.conn().await?;
        let guard = conn.lock().await;
        let row = guard
            .query_row(
                &format!("{ACTIVITY_SELECT} WHERE id = ?1"),
                params![id],
                activity_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// All activities in insertion order.
    pub async fn activities(&self) -> Result<Vec<ReportingActivity>, StoreError> {
        self.find_activities(None, None, None).await
    }

    /// Activities filtered by any combination of scope, category, and
    /// location — the lookups the secondary indexes exist for.
    pub async fn find_activities(
        &self,
        scope: Option<&str>,
        category: Option<&str>,
        location: Option<&str>,
    ) -> Result<Vec<ReportingActivity>, StoreError> {
        let (clause, binds) = filter_clause(scope, category, location);
        let conn = self.conn().await?;
        let guard = conn.lock().await;
        let mut stmt = guard.prepare(&format!("{ACTIVITY_SELECT}{clause} ORDER BY id"))?;
        let rows = stmt.query_map(params_from_iter(binds.iter()), activity_from_row)?;

        let mut activities = Vec::new();
        for row in rows {
            activities.push(row?);
        }
        Ok(activities)
    }

    /// Full replace keyed by the record's identifier. An unknown identifier
    /// creates the record (upsert), matching SQLite's native put behavior.
    pub async fn update_activity(&self, activity: &ReportingActivity) -> Result<(), StoreError> {
        let id = activity.id.ok_or(StoreError::MissingId)?;
        let snapshot_json = encode_snapshot(activity.factor_snapshot.as_ref())?;
        let conn = self.conn().await?;
        {
            let mut guard = conn.lock().await;
            let tx = guard.transaction()?;
            let calculated = resolve_emissions(&tx, activity)?;
            tx.execute(
                "INSERT INTO activities (
                    id, period_start, period_end, scope, category, name, location,
                    quantity, factor_ref, factor_snapshot, remarks, calculated_emissions
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(id) DO UPDATE SET
                    period_start = excluded.period_start,
                    period_end = excluded.period_end,
                    scope = excluded.scope,
                    category = excluded.category,
                    name = excluded.name,
                    location = excluded.location,
                    quantity = excluded.quantity,
                    factor_ref = excluded.factor_ref,
                    factor_snapshot = excluded.factor_snapshot,
                    remarks = excluded.remarks,
                    calculated_emissions = excluded.calculated_emissions",
                params![
                    id,
                    activity.period_start,
                    activity.period_end,
                    activity.scope,
                    activity.category,
                    activity.name,
                    activity.location,
                    activity.quantity,
                    activity.factor_ref,
                    snapshot_json,
                    activity.remarks,
                    calculated,
                ],
            )?;
            tx.commit()?;
        }
        self.observer.store_event(&StoreEvent::Updated {
            kind: RecordKind::Activities,
            id,
        });
        Ok(())
    }

    /// Remove an activity. No-op if absent.
    pub async fn delete_activity(&self, id: i64) -> Result<(), StoreError> {
        self.delete_row(RecordKind::Activities, id).await
    }

    // =========================================================================
    // Factors
    // =========================================================================

    /// Persist a new emission factor and return its assigned identifier.
    pub async fn add_factor(&self, factor: &EmissionFactor) -> Result<i64, StoreError> {
        let conn = self.conn().await?;
        let id = {
            let guard = conn.lock().await;
            guard.execute(
                "INSERT INTO factors (
                    description, scope, category, location, unit, data_source,
                    method_type, co2e_per_unit, factor_unit, standard, source_reference
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    factor.description,
                    factor.scope,
                    factor.category,
                    factor.location,
                    factor.unit,
                    factor.data_source,
                    factor.method_type.to_string(),
                    factor.co2e_per_unit,
                    factor.factor_unit,
                    factor.standard,
                    factor.source_reference,
                ],
            )?;
            guard.last_insert_rowid()
        };
        self.observer.store_event(&StoreEvent::Added {
            kind: RecordKind::Factors,
            id,
        });
        Ok(id)
    }

    /// Get a single factor, or `None` if absent.
    pub async fn factor(&self, id: i64) -> Result<Option<EmissionFactor>, StoreError> {
        let conn = self.conn().await?;
        let guard = conn.lock().await;
        let row = guard
            .query_row(
                &format!("{FACTOR_SELECT} WHERE id = ?1"),
                params![id],
                factor_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// All factors in insertion order.
    pub async fn factors(&self) -> Result<Vec<EmissionFactor>, StoreError> {
        self.find_factors(None, None, None).await
    }

    /// Factors filtered by any combination of scope, category, and location.
    pub async fn find_factors(
        &self,
        scope: Option<&str>,
        category: Option<&str>,
        location: Option<&str>,
    ) -> Result<Vec<EmissionFactor>, StoreError> {
        let (clause, binds) = filter_clause(scope, category, location);
        let conn = self.conn().await?;
        let guard = conn.lock().await;
        let mut stmt = guard.prepare(&format!("{FACTOR_SELECT}{clause} ORDER BY id"))?;
        let rows = stmt.query_map(params_from_iter(binds.iter()), factor_from_row)?;

        let mut factors = Vec::new();
        for row in rows {
            factors.push(row?);
        }
        Ok(factors)
    }

    /// Full replace keyed by the record's identifier; upsert semantics.
    pub async fn update_factor(&self, factor: &EmissionFactor) -> Result<(), StoreError> {
        let id = factor.id.ok_or(StoreError::MissingId)?;
        let conn = self.conn().await?;
        {
            let guard = conn.lock().await;
            guard.execute(
                "INSERT INTO factors (
                    id, description, scope, category, location, unit, data_source,
                    method_type, co2e_per_unit, factor_unit, standard, source_reference
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(id) DO UPDATE SET
                    description = excluded.description,
                    scope = excluded.scope,
                    category = excluded.category,
                    location = excluded.location,
                    unit = excluded.unit,
                    data_source = excluded.data_source,
                    method_type = excluded.method_type,
                    co2e_per_unit = excluded.co2e_per_unit,
                    factor_unit = excluded.factor_unit,
                    standard = excluded.standard,
                    source_reference = excluded.source_reference",
                params![
                    id,
                    factor.description,
                    factor.scope,
                    factor.category,
                    factor.location,
                    factor.unit,
                    factor.data_source,
                    factor.method_type.to_string(),
                    factor.co2e_per_unit,
                    factor.factor_unit,
                    factor.standard,
                    factor.source_reference,
                ],
            )?;
        }
        self.observer.store_event(&StoreEvent::Updated {
            kind: RecordKind::Factors,
            id,
        });
        Ok(())
    }

    /// Remove a factor. No-op if absent. Activities that embedded a snapshot
    /// of this factor keep their stored emission figures.
    pub async fn delete_factor(&self, id: i64) -> Result<(), StoreError> {
        self.delete_row(RecordKind::Factors, id).await
    }

    // =========================================================================
    // Standards
    // =========================================================================

    /// Persist a new reporting standard and return its assigned identifier.
    /// Names are unique; a duplicate fails the transaction.
    pub async fn add_standard(&self, standard: &GhgReportingStandard) -> Result<i64, StoreError> {
        let conn = self.conn().await?;
        let id = {
            let guard = conn.lock().await;
            guard.execute(
                "INSERT INTO standards (name) VALUES (?1)",
                params![standard.name],
            )?;
            guard.last_insert_rowid()
        };
        self.observer.store_event(&StoreEvent::Added {
            kind: RecordKind::Standards,
            id,
        });
        Ok(id)
    }

    /// Get a single standard, or `None` if absent.
    pub async fn standard(&self, id: i64) -> Result<Option<GhgReportingStandard>, StoreError> {
        let conn = self.conn().await?;
        let guard = conn.lock().await;
        let row = guard
            .query_row(
                "SELECT id, name FROM standards WHERE id = ?1",
                params![id],
                standard_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// All standards in insertion order.
    pub async fn standards(&self) -> Result<Vec<GhgReportingStandard>, StoreError> {
        let conn = self.conn().await?;
        let guard = conn.lock().await;
        let mut stmt = guard.prepare("SELECT id, name FROM standards ORDER BY id")?;
        let rows = stmt.query_map([], standard_from_row)?;

        let mut standards = Vec::new();
        for row in rows {
            standards.push(row?);
        }
        Ok(standards)
    }

    /// Full replace keyed by the record's identifier; upsert semantics.
    pub async fn update_standard(&self, standard: &GhgReportingStandard) -> Result<(), StoreError> {
        let id = standard.id.ok_or(StoreError::MissingId)?;
        let conn = self.conn().await?;
        {
            let guard = conn.lock().await;
            guard.execute(
                "INSERT INTO standards (id, name) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                params![id, standard.name],
            )?;
        }
        self.observer.store_event(&StoreEvent::Updated {
            kind: RecordKind::Standards,
            id,
        });
        Ok(())
    }

    /// Remove a standard. No-op if absent.
    pub async fn delete_standard(&self, id: i64) -> Result<(), StoreError> {
        self.delete_row(RecordKind::Standards, id).await
    }

    /// Insert the stock reporting standards into an empty collection.
    ///
    /// Check-then-insert inside one transaction, so repeated calls cannot
    /// double-seed. Returns the number of standards inserted.
    pub async fn seed_default_standards(&self) -> Result<usize, StoreError> {
        let conn = self.conn().await?;
        let inserted = {
            let mut guard = conn.lock().await;
            let tx = guard.transaction()?;
            let count: i64 = tx.query_row("SELECT COUNT(*) FROM standards", [], |r| r.get(0))?;
            if count > 0 {
                0
            } else {
                for name in DEFAULT_STANDARDS {
                    tx.execute("INSERT INTO standards (name) VALUES (?1)", params![name])?;
                }
                tx.commit()?;
                DEFAULT_STANDARDS.len()
            }
        };
        if inserted > 0 {
            self.observer.store_event(&StoreEvent::Seeded { inserted });
        }
        Ok(inserted)
    }

    // =========================================================================
    // Clear / export / import
    // =========================================================================

    /// Remove every record of one kind. Its own transaction.
    pub async fn clear(&self, kind: RecordKind) -> Result<(), StoreError> {
        let conn = self.conn().await?;
        let removed = {
            let guard = conn.lock().await;
            guard.execute(&format!("DELETE FROM {}", kind.table()), [])?
        };
        self.observer
            .store_event(&StoreEvent::Cleared { kind, removed });
        Ok(())
    }

    /// Clear all three kinds in sequence.
    ///
    /// Not atomic across kinds: each clear is its own transaction, so a
    /// failing kind propagates its error while earlier kinds stay cleared —
    /// at-most-once per kind, not all-or-nothing. Callers may retry; a
    /// second call over already-empty collections succeeds.
    pub async fn clear_all_data(&self) -> Result<(), StoreError> {
        for kind in RecordKind::ALL {
            self.clear(kind).await?;
        }
        Ok(())
    }

    /// Bulk read of all three kinds into one snapshot.
    pub async fn export_all(&self) -> Result<DataSnapshot, StoreError> {
        let snapshot = DataSnapshot {
            activities: self.activities().await?,
            factors: self.factors().await?,
            standards: self.standards().await?,
        };
        self.observer.store_event(&StoreEvent::Exported {
            activities: snapshot.activities.len(),
            factors: snapshot.factors.len(),
            standards: snapshot.standards.len(),
        });
        Ok(snapshot)
    }

    /// Replace the store's contents with a snapshot.
    ///
    /// Each kind is cleared and refilled in its own transaction. Incoming
    /// identifiers are stripped so the store re-assigns them; stored emission
    /// figures are carried over untouched — they are historical values, and
    /// re-assigned factor ids make references unreliable anyway (embedded
    /// snapshots are the resilience mechanism).
    pub async fn import_all(&self, snapshot: &DataSnapshot) -> Result<(), StoreError> {
        // Snapshot encoding happens before any collection is touched
        let mut activity_rows = Vec::with_capacity(snapshot.activities.len());
        for activity in &snapshot.activities {
            activity_rows.push((activity, encode_snapshot(activity.factor_snapshot.as_ref())?));
        }

        let conn = self.conn().await?;
        {
            let mut guard = conn.lock().await;

            let tx = guard.transaction()?;
            tx.execute("DELETE FROM activities", [])?;
            for (activity, snapshot_json) in &activity_rows {
                tx.execute(
                    "INSERT INTO activities (
                        period_start, period_end, scope, category, name, location,
                        quantity, factor_ref, factor_snapshot, remarks, calculated_emissions
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        activity.period_start,
                        activity.period_end,
                        activity.scope,
                        activity.category,
                        activity.name,
                        activity.location,
                        activity.quantity,
                        activity.factor_ref,
                        snapshot_json,
                        activity.remarks,
                        activity.calculated_emissions,
                    ],
                )?;
            }
            tx.commit()?;

            let tx = guard.transaction()?;
            tx.execute("DELETE FROM factors", [])?;
            for factor in &snapshot.factors {
                tx.execute(
                    "INSERT INTO factors (
                        description, scope, category, location, unit, data_source,
                        method_type, co2e_per_unit, factor_unit, standard, source_reference
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        factor.description,
                        factor.scope,
                        factor.category,
                        factor.location,
                        factor.unit,
                        factor.data_source,
                        factor.method_type.to_string(),
                        factor.co2e_per_unit,
                        factor.factor_unit,
                        factor.standard,
                        factor.source_reference,
                    ],
                )?;
            }
            tx.commit()?;

            let tx = guard.transaction()?;
            tx.execute("DELETE FROM standards", [])?;
            for standard in &snapshot.standards {
                tx.execute(
                    "INSERT INTO standards (name) VALUES (?1)",
                    params![standard.name],
                )?;
            }
            tx.commit()?;
        }
        self.observer.store_event(&StoreEvent::Imported {
            activities: snapshot.activities.len(),
            factors: snapshot.factors.len(),
            standards: snapshot.standards.len(),
        });
        Ok(())
    }

    /// Per-kind record counts.
    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn().await?;
        let guard = conn.lock().await;
        let mut counts = [0usize; 3];
        for (i, kind) in RecordKind::ALL.iter().enumerate() {
            let count: i64 = guard.query_row(
                &format!("SELECT COUNT(*) FROM {}", kind.table()),
                [],
                |r| r.get(0),
            )?;
            counts[i] = count as usize;
        }
        Ok(StoreStats {
            activities: counts[0],
            factors: counts[1],
            standards: counts[2],
        })
    }

    async fn delete_row(&self, kind: RecordKind, id: i64) -> Result<(), StoreError> {
        let conn = self.conn().await?;
        {
            let guard = conn.lock().await;
            guard.execute(
                &format!("DELETE FROM {} WHERE id = ?1", kind.table()),
                params![id],
            )?;
        }
        self.observer.store_event(&StoreEvent::Deleted { kind, id });
        Ok(())
    }
}

const ACTIVITY_SELECT: &str = "SELECT id, period_start, period_end, scope, category, name, \
     location, quantity, factor_ref, factor_snapshot, remarks, calculated_emissions \
     FROM activities";

const FACTOR_SELECT: &str = "SELECT id, description, scope, category, location, unit, \
     data_source, method_type, co2e_per_unit, factor_unit, standard, source_reference \
     FROM factors";

/// Emission figure for an activity at write time: the embedded snapshot's
/// co2e wins, then the referenced factor's current co2e, else zero for a
/// factorless draft.
fn resolve_emissions(
    conn: &Connection,
    activity: &ReportingActivity,
) -> Result<f64, rusqlite::Error> {
    if let Some(snapshot) = &activity.factor_snapshot {
        return Ok(activity.quantity * snapshot.co2e_per_unit);
    }
    if let Some(factor_id) = activity.factor_ref {
        let co2e: Option<f64> = conn
            .query_row(
                "SELECT co2e_per_unit FROM factors WHERE id = ?1",
                params![factor_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(co2e) = co2e {
            return Ok(activity.quantity * co2e);
        }
        log::debug!("activity references missing factor {factor_id}; emissions recorded as 0");
        return Ok(0.0);
    }
    log::debug!("activity has neither factor reference nor snapshot; emissions recorded as 0");
    Ok(0.0)
}

fn encode_snapshot(snapshot: Option<&FactorSnapshot>) -> Result<Option<String>, StoreError> {
    snapshot
        .map(|s| serde_json::to_string(s).map_err(StoreError::Encode))
        .transpose()
}

fn filter_clause(
    scope: Option<&str>,
    category: Option<&str>,
    location: Option<&str>,
) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut binds = Vec::new();
    for (column, value) in [
        ("scope", scope),
        ("category", category),
        ("location", location),
    ] {
        if let Some(value) = value {
            binds.push(value.to_string());
            clauses.push(format!("{column} = ?{}", binds.len()));
        }
    }
    if clauses.is_empty() {
        (String::new(), binds)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), binds)
    }
}

fn activity_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReportingActivity> {
    let snapshot_json: Option<String> = row.get(9)?;
    Ok(ReportingActivity {
        id: Some(row.get(0)?),
        period_start: row.get(1)?,
        period_end: row.get(2)?,
        scope: row.get(3)?,
        category: row.get(4)?,
        name: row.get(5)?,
        location: row.get(6)?,
        quantity: row.get(7)?,
        factor_ref: row.get(8)?,
        factor_snapshot: snapshot_json.and_then(|raw| serde_json::from_str(&raw).ok()),
        remarks: row.get(10)?,
        calculated_emissions: row.get(11)?,
    })
}

fn factor_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EmissionFactor> {
    let method_raw: String = row.get(7)?;
    let method_type = method_raw.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(EmissionFactor {
        id: Some(row.get(0)?),
        description: row.get(1)?,
        scope: row.get(2)?,
        category: row.get(3)?,
        location: row.get(4)?,
        unit: row.get(5)?,
        data_source: row.get(6)?,
        method_type,
        co2e_per_unit: row.get(8)?,
        factor_unit: row.get(9)?,
        standard: row.get(10)?,
        source_reference: row.get(11)?,
    })
}

fn standard_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GhgReportingStandard> {
    Ok(GhgReportingStandard {
        id: Some(row.get(0)?),
        name: row.get(1)?,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MethodType;

    /// Create a store over a temporary database.
    ///
    /// We leak the `TempDir` so the directory persists for the duration of
    /// the test. Test temp dirs are cleaned up by the OS.
    fn test_store() -> LedgerStore {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("ledger.db");
        std::mem::forget(dir);
        LedgerStore::new(StoreConfig::at(path))
    }

    fn sample_factor(description: &str, co2e: f64) -> EmissionFactor {
        EmissionFactor {
            id: None,
            description: description.to_string(),
            scope: "Scope 1".to_string(),
            category: "Stationary combustion".to_string(),
            location: "DE".to_string(),
            unit: "kWh".to_string(),
            data_source: "DEFRA 2025".to_string(),
            method_type: MethodType::FuelBased,
            co2e_per_unit: co2e,
            factor_unit: "kgCO2e/kWh".to_string(),
            standard: "GHG Protocol Corporate Standard".to_string(),
            source_reference: "defra-2025-fuels".to_string(),
        }
    }

    fn sample_activity(name: &str) -> ReportingActivity {
        ReportingActivity {
            id: None,
            period_start: "2026-01-01".to_string(),
            period_end: "2026-03-31".to_string(),
            scope: "Scope 1".to_string(),
            category: "Stationary combustion".to_string(),
            name: name.to_string(),
            location: "DE".to_string(),
            quantity: 100.0,
            factor_ref: None,
            factor_snapshot: None,
            remarks: None,
            calculated_emissions: 0.0,
        }
    }

    #[tokio::test]
    async fn test_add_then_get_returns_equal_record() {
        let store = test_store();

        let mut activity = sample_activity("Boiler gas");
        activity.factor_snapshot = Some(FactorSnapshot {
            description: "Natural gas".to_string(),
            co2e_per_unit: 0.25,
            unit: "kWh".to_string(),
            factor_unit: "kgCO2e/kWh".to_string(),
        });
        activity.remarks = Some("meter 4".to_string());

        let id = store.add_activity(&activity).await.expect("add");
        let stored = store
            .activity(id)
            .await
            .expect("get")
            .expect("should exist");

        assert_eq!(stored.id, Some(id));
        assert_eq!(stored.name, activity.name);
        assert_eq!(stored.factor_snapshot, activity.factor_snapshot);
        assert_eq!(stored.remarks, activity.remarks);
        assert_eq!(stored.calculated_emissions, 25.0);
    }

    #[tokio::test]
    async fn test_get_absent_is_none() {
        let store = test_store();
        assert!(store.activity(999).await.expect("get").is_none());
        assert!(store.factor(999).await.expect("get").is_none());
        assert!(store.standard(999).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_delete_absent_is_noop() {
        let store = test_store();
        store.delete_activity(999).await.expect("delete");
        store.delete_factor(999).await.expect("delete");
    }

    #[tokio::test]
    async fn test_get_all_after_clear_is_empty() {
        let store = test_store();

        store
            .add_factor(&sample_factor("Gas", 0.2))
            .await
            .expect("add factor");
        store
            .add_activity(&sample_activity("Boiler"))
            .await
            .expect("add activity");
        store
            .add_standard(&GhgReportingStandard {
                id: None,
                name: "ISO 14064-1".to_string(),
            })
            .await
            .expect("add standard");

        store.clear_all_data().await.expect("clear all");

        assert!(store.activities().await.expect("activities").is_empty());
        assert!(store.factors().await.expect("factors").is_empty());
        assert!(store.standards().await.expect("standards").is_empty());
    }

    #[tokio::test]
    async fn test_clear_all_twice_is_idempotent() {
        let store = test_store();
        store
            .add_activity(&sample_activity("Boiler"))
            .await
            .expect("add");

        store.clear_all_data().await.expect("first clear");
        store.clear_all_data().await.expect("second clear");

        let stats = store.stats().await.expect("stats");
        assert_eq!(stats.activities, 0);
        assert_eq!(stats.factors, 0);
        assert_eq!(stats.standards, 0);
    }

    #[tokio::test]
    async fn test_update_nonexistent_id_is_upsert() {
        let store = test_store();

        let mut factor = sample_factor("Diesel", 2.68);
        factor.id = Some(42);
        store.update_factor(&factor).await.expect("upsert");

        let stored = store
            .factor(42)
            .await
            .expect("get")
            .expect("should have been created");
        assert_eq!(stored.description, "Diesel");
        assert_eq!(stored.co2e_per_unit, 2.68);
    }

    #[tokio::test]
    async fn test_update_without_id_is_rejected() {
        let store = test_store();
        let factor = sample_factor("Diesel", 2.68);
        let result = store.update_factor(&factor).await;
        assert!(matches!(result, Err(StoreError::MissingId)));
    }

    #[tokio::test]
    async fn test_update_replaces_whole_record() {
        let store = test_store();

        let id = store
            .add_factor(&sample_factor("Gas", 0.2))
            .await
            .expect("add");
        let mut updated = sample_factor("Gas (revised)", 0.22);
        updated.id = Some(id);
        updated.method_type = MethodType::AverageData;
        store.update_factor(&updated).await.expect("update");

        let stored = store.factor(id).await.expect("get").expect("exists");
        assert_eq!(stored.description, "Gas (revised)");
        assert_eq!(stored.co2e_per_unit, 0.22);
        assert_eq!(stored.method_type, MethodType::AverageData);

        // Still exactly one record
        assert_eq!(store.factors().await.expect("all").len(), 1);
    }

    #[tokio::test]
    async fn test_calculated_emissions_frozen_against_factor_edits() {
        let store = test_store();

        // Three factors; the activity references the second
        store
            .add_factor(&sample_factor("Coal", 2.4))
            .await
            .expect("add");
        let target = store
            .add_factor(&sample_factor("Gas", 2.5))
            .await
            .expect("add");
        store
            .add_factor(&sample_factor("Diesel", 2.68))
            .await
            .expect("add");

        let mut activity = sample_activity("Boiler");
        activity.quantity = 10.0;
        activity.factor_ref = Some(target);
        let activity_id = store.add_activity(&activity).await.expect("add activity");

        let stored = store
            .activity(activity_id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(stored.calculated_emissions, 25.0);

        // Editing the factor afterwards must not touch the stored figure
        let mut edited = sample_factor("Gas", 99.0);
        edited.id = Some(target);
        store.update_factor(&edited).await.expect("edit factor");

        let after = store
            .activity(activity_id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(after.calculated_emissions, 25.0);
    }

    #[tokio::test]
    async fn test_snapshot_wins_over_reference() {
        let store = test_store();

        let factor_id = store
            .add_factor(&sample_factor("Gas", 2.5))
            .await
            .expect("add");

        let mut activity = sample_activity("Boiler");
        activity.quantity = 10.0;
        activity.factor_ref = Some(factor_id);
        activity.factor_snapshot = Some(FactorSnapshot {
            description: "Gas (frozen)".to_string(),
            co2e_per_unit: 3.0,
            unit: "kWh".to_string(),
            factor_unit: "kgCO2e/kWh".to_string(),
        });

        let id = store.add_activity(&activity).await.expect("add");
        let stored = store.activity(id).await.expect("get").expect("exists");
        assert_eq!(stored.calculated_emissions, 30.0);
    }

    #[tokio::test]
    async fn test_factorless_draft_records_zero() {
        let store = test_store();
        let id = store
            .add_activity(&sample_activity("Draft"))
            .await
            .expect("add");
        let stored = store.activity(id).await.expect("get").expect("exists");
        assert_eq!(stored.calculated_emissions, 0.0);
    }

    #[tokio::test]
    async fn test_seed_defaults_is_check_then_insert() {
        let store = test_store();

        let first = store.seed_default_standards().await.expect("first seed");
        assert_eq!(first, DEFAULT_STANDARDS.len());

        let second = store.seed_default_standards().await.expect("second seed");
        assert_eq!(second, 0, "non-empty collection must not be re-seeded");

        let standards = store.standards().await.expect("all");
        assert_eq!(standards.len(), DEFAULT_STANDARDS.len());
    }

    #[tokio::test]
    async fn test_seed_skips_partially_filled_collection() {
        let store = test_store();
        store
            .add_standard(&GhgReportingStandard {
                id: None,
                name: "House standard".to_string(),
            })
            .await
            .expect("add");

        let inserted = store.seed_default_standards().await.expect("seed");
        assert_eq!(inserted, 0);
        assert_eq!(store.standards().await.expect("all").len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_standard_name_is_transaction_error() {
        let store = test_store();
        let standard = GhgReportingStandard {
            id: None,
            name: "ISO 14064-1".to_string(),
        };
        store.add_standard(&standard).await.expect("first add");
        let dup = store.add_standard(&standard).await;
        assert!(matches!(dup, Err(StoreError::Transaction(_))));
    }

    #[tokio::test]
    async fn test_export_import_strips_ids() {
        let store = test_store();

        let factor_id = store
            .add_factor(&sample_factor("Gas", 0.2))
            .await
            .expect("add factor");
        store.delete_factor(factor_id).await.expect("delete");
        // Next insert gets a fresh id, so the exported id is > 1
        let kept = store
            .add_factor(&sample_factor("Diesel", 2.68))
            .await
            .expect("add factor");
        assert!(kept > 1);

        store
            .add_activity(&sample_activity("Boiler"))
            .await
            .expect("add activity");
        store.seed_default_standards().await.expect("seed");

        let snapshot = store.export_all().await.expect("export");
        assert_eq!(snapshot.factors.len(), 1);
        assert_eq!(snapshot.factors[0].id, Some(kept));

        let second = test_store();
        second.import_all(&snapshot).await.expect("import");

        let factors = second.factors().await.expect("factors");
        assert_eq!(factors.len(), 1);
        assert_eq!(
            factors[0].id,
            Some(1),
            "import must strip ids so the store re-assigns them"
        );
        assert_eq!(factors[0].description, "Diesel");

        assert_eq!(second.activities().await.expect("activities").len(), 1);
        assert_eq!(
            second.standards().await.expect("standards").len(),
            DEFAULT_STANDARDS.len()
        );
    }

    #[tokio::test]
    async fn test_import_replaces_existing_contents() {
        let store = test_store();
        store
            .add_activity(&sample_activity("Old draft"))
            .await
            .expect("add");

        let mut incoming = DataSnapshot::default();
        let mut activity = sample_activity("Imported");
        activity.calculated_emissions = 12.5;
        incoming.activities.push(activity);

        store.import_all(&incoming).await.expect("import");

        let activities = store.activities().await.expect("all");
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].name, "Imported");
        // Historical figure carried over, not recomputed
        assert_eq!(activities[0].calculated_emissions, 12.5);
    }

    #[tokio::test]
    async fn test_find_factors_by_filters() {
        let store = test_store();

        store
            .add_factor(&sample_factor("Gas DE", 0.2))
            .await
            .expect("add");
        let mut uk = sample_factor("Gas UK", 0.21);
        uk.location = "UK".to_string();
        store.add_factor(&uk).await.expect("add");
        let mut scope3 = sample_factor("Freight", 0.1);
        scope3.scope = "Scope 3".to_string();
        scope3.category = "Upstream transport".to_string();
        store.add_factor(&scope3).await.expect("add");

        let de = store
            .find_factors(None, None, Some("DE"))
            .await
            .expect("find");
        assert_eq!(de.len(), 2);

        let scope3_hits = store
            .find_factors(Some("Scope 3"), None, None)
            .await
            .expect("find");
        assert_eq!(scope3_hits.len(), 1);
        assert_eq!(scope3_hits[0].description, "Freight");

        let both = store
            .find_factors(Some("Scope 1"), Some("Stationary combustion"), Some("UK"))
            .await
            .expect("find");
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].description, "Gas UK");
    }

    #[tokio::test]
    async fn test_insertion_order_is_stable() {
        let store = test_store();
        for name in ["a", "b", "c"] {
            store
                .add_activity(&sample_activity(name))
                .await
                .expect("add");
        }
        let names: Vec<String> = store
            .activities()
            .await
            .expect("all")
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_init() {
        let store = std::sync::Arc::new(test_store());
        let a = store.clone();
        let b = store.clone();
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { a.activities().await.map(|v| v.len()) }),
            tokio::spawn(async move { b.factors().await.map(|v| v.len()) }),
        );
        assert_eq!(ra.expect("join").expect("activities"), 0);
        assert_eq!(rb.expect("join").expect("factors"), 0);
    }

    #[tokio::test]
    async fn test_reopen_same_path_sees_data() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("ledger.db");

        let store = LedgerStore::new(StoreConfig::at(path.clone()));
        store
            .add_activity(&sample_activity("Persistent"))
            .await
            .expect("add");
        drop(store);

        let reopened = LedgerStore::new(StoreConfig::at(path));
        let activities = reopened.activities().await.expect("all");
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].name, "Persistent");
    }
}
