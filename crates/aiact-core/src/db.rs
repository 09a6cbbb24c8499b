// SQLite persistence layer for the AI-system inventory, risk assessments and
// generated documents.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::domain::{AiSystem, DocumentKind, RiskAssessment};
use crate::error::{AppError, AppResult};

/// SQLite-backed store. All access goes through a single connection guarded
/// by a mutex, so a `Database` can be shared behind an `Arc`.
pub struct Database {
    conn: Mutex<Connection>,
}

const SYSTEM_COLUMNS: &str = "id, name, description, purpose, sector, data_types, \
     deployment_context, user_facing, automated_decisions, controls, created_at";

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database.
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if path != Path::new(":memory:") {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Database(format!("failed to create {}: {e}", parent.display()))
                })?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS ai_systems (
                id                  TEXT PRIMARY KEY,
                name                TEXT NOT NULL UNIQUE,
                description         TEXT NOT NULL,
                purpose             TEXT NOT NULL,
                sector              TEXT,
                data_types          TEXT NOT NULL,
                deployment_context  TEXT,
                user_facing         INTEGER NOT NULL,
                automated_decisions INTEGER NOT NULL,
                controls            TEXT NOT NULL,
                created_at          TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS risk_assessments (
                id               TEXT PRIMARY KEY,
                system_id        TEXT NOT NULL REFERENCES ai_systems(id) ON DELETE CASCADE,
                risk_level       TEXT NOT NULL,
                source           TEXT NOT NULL,
                compliance_score INTEGER NOT NULL,
                payload          TEXT NOT NULL,
                created_at       TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_risk_assessments_system
                ON risk_assessments(system_id, created_at);

            CREATE TABLE IF NOT EXISTS documents (
                system_id  TEXT NOT NULL REFERENCES ai_systems(id) ON DELETE CASCADE,
                kind       TEXT NOT NULL,
                content    TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (system_id, kind)
            );
            ",
        )?;

        debug!("database ready at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".into()))
    }

    // -- AI systems --

    /// Insert a new system. A second system with the same name is a conflict.
    pub fn insert_system(&self, system: &AiSystem) -> AppResult<()> {
        let conn = self.conn()?;
        let result = conn.execute(
            &format!(
                "INSERT INTO ai_systems ({SYSTEM_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                system.id,
                system.name,
                system.description,
                system.purpose,
                system.sector,
                serde_json::to_string(&system.data_types)?,
                system.deployment_context,
                system.user_facing,
                system.automated_decisions,
                serde_json::to_string(&system.controls)?,
                timestamp(&system.created_at),
            ],
        );
        result.map_err(|e| name_conflict(e, &system.name))?;
        Ok(())
    }

    /// Overwrite every mutable field of an existing system.
    pub fn update_system(&self, system: &AiSystem) -> AppResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE ai_systems SET name = ?2, description = ?3, purpose = ?4, sector = ?5,
                 data_types = ?6, deployment_context = ?7, user_facing = ?8,
                 automated_decisions = ?9, controls = ?10
             WHERE id = ?1",
            params![
                system.id,
                system.name,
                system.description,
                system.purpose,
                system.sector,
                serde_json::to_string(&system.data_types)?,
                system.deployment_context,
                system.user_facing,
                system.automated_decisions,
                serde_json::to_string(&system.controls)?,
            ],
        )
        .map_err(|e| name_conflict(e, &system.name))?;
        if changed == 0 {
            return Err(AppError::not_found("ai_system", &system.id));
        }
        Ok(())
    }

    pub fn get_system(&self, id: &str) -> AppResult<Option<AiSystem>> {
        let conn = self.conn()?;
        let system = conn
            .query_row(
                &format!("SELECT {SYSTEM_COLUMNS} FROM ai_systems WHERE id = ?1"),
                params![id],
                system_from_row,
            )
            .optional()?;
        Ok(system)
    }

    /// All systems ordered by name.
    pub fn list_systems(&self) -> AppResult<Vec<AiSystem>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {SYSTEM_COLUMNS} FROM ai_systems ORDER BY name"))?;
        let systems = stmt
            .query_map([], system_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(systems)
    }

    /// Delete a system together with its assessments and documents. Returns
    /// `false` when no such system exists.
    pub fn delete_system(&self, id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM ai_systems WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    // -- Risk assessments --

    pub fn record_assessment(&self, assessment: &RiskAssessment) -> AppResult<()> {
        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO risk_assessments
                (id, system_id, risk_level, source, compliance_score, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                assessment.id,
                assessment.system_id,
                assessment.risk_level.as_str(),
                assessment.source.as_str(),
                assessment.compliance_score,
                serde_json::to_string(assessment)?,
                timestamp(&assessment.created_at),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(AppError::not_found("ai_system", &assessment.system_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn latest_assessment(&self, system_id: &str) -> AppResult<Option<RiskAssessment>> {
        let conn = self.conn()?;
        let assessment = conn
            .query_row(
                "SELECT payload FROM risk_assessments WHERE system_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                params![system_id],
                |row| json_column(row, 0),
            )
            .optional()?;
        Ok(assessment)
    }

    /// Assessment history for a system, newest first.
    pub fn list_assessments(&self, system_id: &str) -> AppResult<Vec<RiskAssessment>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT payload FROM risk_assessments WHERE system_id = ?1
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let assessments = stmt
            .query_map(params![system_id], |row| json_column(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(assessments)
    }

    // -- Documents --

    /// Store a generated document, replacing any earlier version of the same
    /// kind for the same system.
    pub fn save_document(&self, system_id: &str, kind: DocumentKind, content: &str) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO documents (system_id, kind, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![system_id, kind.as_str(), content, timestamp(&Utc::now())],
        )?;
        Ok(())
    }

    pub fn load_document(&self, system_id: &str, kind: DocumentKind) -> AppResult<Option<String>> {
        let conn = self.conn()?;
        let content = conn
            .query_row(
                "SELECT content FROM documents WHERE system_id = ?1 AND kind = ?2",
                params![system_id, kind.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(content)
    }
}

// ---------------------------------------------------------------------------
// Row mapping helpers
// ---------------------------------------------------------------------------

/// Fixed-width UTC timestamps sort lexicographically in time order.
fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// `UNIQUE(name)` violations become `Conflict`; anything else stays a
/// database error.
fn name_conflict(e: rusqlite::Error, name: &str) -> AppError {
    match e {
        rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation => {
            AppError::Conflict(format!("an AI system named `{name}` already exists"))
        }
        other => other.into(),
    }
}

fn conversion_error(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| conversion_error(idx, e))
}

fn system_from_row(row: &Row<'_>) -> rusqlite::Result<AiSystem> {
    let created_at: String = row.get(10)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| conversion_error(10, e))?
        .with_timezone(&Utc);
    Ok(AiSystem {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        purpose: row.get(3)?,
        sector: row.get(4)?,
        data_types: json_column(row, 5)?,
        deployment_context: row.get(6)?,
        user_facing: row.get(7)?,
        automated_decisions: row.get(8)?,
        controls: json_column(row, 9)?,
        created_at,
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AnalysisSource, RiskLevel};

    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    fn sample_system(name: &str) -> AiSystem {
        let mut system = AiSystem::new(name, "Scores loan applications", "Credit scoring");
        system.sector = Some("Banking".into());
        system.data_types = vec!["financial".into(), "personal".into()];
        system.automated_decisions = true;
        system.controls.risk_management = true;
        system
    }

    fn sample_assessment(system_id: &str, level: RiskLevel, at: DateTime<Utc>) -> RiskAssessment {
        RiskAssessment {
            id: uuid::Uuid::new_v4().to_string(),
            system_id: system_id.to_string(),
            risk_level: level,
            confidence: 0.8,
            categories: vec!["essential_services".into()],
            reasoning: "credit scoring".into(),
            obligations: vec![],
            recommendations: vec![],
            required_documents: vec![DocumentKind::TechnicalDocumentation],
            compliance_score: 40,
            gaps: vec![],
            source: AnalysisSource::RuleBased,
            created_at: at,
        }
    }

    #[test]
    fn insert_and_get_system_round_trip() {
        let db = test_db();
        let system = sample_system("LoanScore");
        db.insert_system(&system).unwrap();

        let loaded = db.get_system(&system.id).unwrap().expect("system should exist");
        assert_eq!(loaded.name, "LoanScore");
        assert_eq!(loaded.sector.as_deref(), Some("Banking"));
        assert_eq!(loaded.data_types, vec!["financial", "personal"]);
        assert!(loaded.automated_decisions);
        assert!(loaded.controls.risk_management);
        assert!(!loaded.controls.cybersecurity);
        // Micro-second precision survives the round trip.
        assert_eq!(
            loaded.created_at.timestamp_micros(),
            system.created_at.timestamp_micros()
        );
    }

    #[test]
    fn get_missing_system_returns_none() {
        let db = test_db();
        assert!(db.get_system("missing").unwrap().is_none());
    }

    #[test]
    fn duplicate_name_is_conflict() {
        let db = test_db();
        db.insert_system(&sample_system("Same")).unwrap();
        let err = db.insert_system(&sample_system("Same")).unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn renaming_onto_existing_name_is_conflict() {
        let db = test_db();
        db.insert_system(&sample_system("A")).unwrap();
        let mut b = sample_system("B");
        db.insert_system(&b).unwrap();

        b.name = "A".into();
        let err = db.update_system(&b).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(err.is_operational());
        assert_eq!(db.get_system(&b.id).unwrap().unwrap().name, "B");
    }

    #[test]
    fn list_systems_sorted_by_name() {
        let db = test_db();
        db.insert_system(&sample_system("Zeta")).unwrap();
        db.insert_system(&sample_system("Alpha")).unwrap();
        db.insert_system(&sample_system("Mu")).unwrap();
        let names: Vec<String> = db.list_systems().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Alpha", "Mu", "Zeta"]);
    }

    #[test]
    fn update_system_changes_fields() {
        let db = test_db();
        let mut system = sample_system("Upd");
        db.insert_system(&system).unwrap();

        system.description = "Now also screens fraud".into();
        system.controls.human_oversight = true;
        db.update_system(&system).unwrap();

        let loaded = db.get_system(&system.id).unwrap().unwrap();
        assert_eq!(loaded.description, "Now also screens fraud");
        assert!(loaded.controls.human_oversight);
    }

    #[test]
    fn update_missing_system_is_not_found() {
        let db = test_db();
        let err = db.update_system(&sample_system("Ghost")).unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn latest_assessment_picks_newest() {
        let db = test_db();
        let system = sample_system("Hist");
        db.insert_system(&system).unwrap();

        let t0 = Utc::now() - chrono::Duration::hours(2);
        let t1 = Utc::now() - chrono::Duration::hours(1);
        db.record_assessment(&sample_assessment(&system.id, RiskLevel::Limited, t0)).unwrap();
        db.record_assessment(&sample_assessment(&system.id, RiskLevel::High, t1)).unwrap();

        let latest = db.latest_assessment(&system.id).unwrap().unwrap();
        assert_eq!(latest.risk_level, RiskLevel::High);

        let history = db.list_assessments(&system.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].risk_level, RiskLevel::High);
        assert_eq!(history[1].risk_level, RiskLevel::Limited);
    }

    #[test]
    fn latest_assessment_none_without_history() {
        let db = test_db();
        let system = sample_system("Fresh");
        db.insert_system(&system).unwrap();
        assert!(db.latest_assessment(&system.id).unwrap().is_none());
    }

    #[test]
    fn assessment_for_unknown_system_is_rejected() {
        let db = test_db();
        let err = db
            .record_assessment(&sample_assessment("nope", RiskLevel::High, Utc::now()))
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn delete_cascades_to_assessments_and_documents() {
        let db = test_db();
        let system = sample_system("Gone");
        db.insert_system(&system).unwrap();
        db.record_assessment(&sample_assessment(&system.id, RiskLevel::High, Utc::now()))
            .unwrap();
        db.save_document(&system.id, DocumentKind::RiskManagementPlan, "# plan")
            .unwrap();

        assert!(db.delete_system(&system.id).unwrap());
        assert!(!db.delete_system(&system.id).unwrap());
        assert!(db.list_assessments(&system.id).unwrap().is_empty());
        assert!(db
            .load_document(&system.id, DocumentKind::RiskManagementPlan)
            .unwrap()
            .is_none());
    }

    #[test]
    fn save_document_replaces_previous_version() {
        let db = test_db();
        let system = sample_system("Docs");
        db.insert_system(&system).unwrap();

        db.save_document(&system.id, DocumentKind::TechnicalDocumentation, "v1")
            .unwrap();
        db.save_document(&system.id, DocumentKind::TechnicalDocumentation, "v2")
            .unwrap();

        assert_eq!(
            db.load_document(&system.id, DocumentKind::TechnicalDocumentation)
                .unwrap()
                .as_deref(),
            Some("v2")
        );
        assert!(db
            .load_document(&system.id, DocumentKind::TransparencyNotice)
            .unwrap()
            .is_none());
    }

    #[test]
    fn open_creates_parent_directories() {
        let tmp = std::env::temp_dir().join("aiact_db_nested");
        let _ = std::fs::remove_dir_all(&tmp);
        let path = tmp.join("a/b/aiact.db");
        let db = Database::open(&path).expect("should create nested dirs");
        db.insert_system(&sample_system("Disk")).unwrap();
        assert!(path.exists());
        drop(db);
        let _ = std::fs::remove_dir_all(&tmp);
    }
}
