//! SQLite-backed [`Fabric`] implementation.
//!
//! Connection pooling and migration bootstrapping follow the teacher's
//! `adapters::sqlite::connection` / `adapters::sqlite::migrations`
//! conventions: WAL journal mode, `busy_timeout`, and an idempotent
//! `CREATE TABLE IF NOT EXISTS` migration run at startup rather than a
//! numbered migration ladder (the schema is small and stable enough that
//! the ladder would be pure ceremony).

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::{Fabric, FabricError, FabricResult};
use crate::model::{Entanglement, EntanglementKind, FabricPhaseState, PhaseId};

pub struct SqliteFabric {
    pool: SqlitePool,
}

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS phase_states (
    id TEXT PRIMARY KEY,
    state TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS entanglements (
    rowid INTEGER PRIMARY KEY AUTOINCREMENT,
    producer TEXT NOT NULL,
    kind TEXT NOT NULL,
    name TEXT NOT NULL,
    signature TEXT NOT NULL,
    package TEXT NOT NULL,
    published_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS file_claims (
    path TEXT PRIMARY KEY,
    owner TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS discoveries (
    rowid INTEGER PRIMARY KEY AUTOINCREMENT,
    phase_id TEXT NOT NULL,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS pulses (
    rowid INTEGER PRIMARY KEY AUTOINCREMENT,
    from_phase TEXT NOT NULL,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS messages (
    rowid INTEGER PRIMARY KEY AUTOINCREMENT,
    from_phase TEXT NOT NULL,
    to_phase TEXT,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL
);
";

impl SqliteFabric {
    pub async fn open(database_url: &str) -> FabricResult<Self> {
        ensure_parent_dir(database_url)?;
        let connect_options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| FabricError::Io(format!("invalid database url {database_url}: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(connect_options)
            .await
            .map_err(|e| FabricError::Io(e.to_string()))?;

        let fabric = Self { pool };
        fabric.migrate().await?;
        Ok(fabric)
    }

    pub async fn open_in_memory() -> FabricResult<Self> {
        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| FabricError::Io(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .shared_cache(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .map_err(|e| FabricError::Io(e.to_string()))?;

        let fabric = Self { pool };
        fabric.migrate().await?;
        Ok(fabric)
    }

    async fn migrate(&self) -> FabricResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| FabricError::Io(e.to_string()))?;
        Ok(())
    }
}

fn ensure_parent_dir(database_url: &str) -> FabricResult<()> {
    let path = database_url
        .strip_prefix("sqlite:")
        .or_else(|| database_url.strip_prefix("sqlite://"))
        .unwrap_or(database_url);
    if path.is_empty() || path == ":memory:" {
        return Ok(());
    }
    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| FabricError::Io(e.to_string()))?;
        }
    }
    Ok(())
}

fn kind_to_str(k: EntanglementKind) -> &'static str {
    match k {
        EntanglementKind::Interface => "interface",
        EntanglementKind::Type => "type",
        EntanglementKind::Function => "function",
        EntanglementKind::Constant => "constant",
    }
}

fn kind_from_str(s: &str) -> EntanglementKind {
    match s {
        "type" => EntanglementKind::Type,
        "function" => EntanglementKind::Function,
        "constant" => EntanglementKind::Constant,
        _ => EntanglementKind::Interface,
    }
}

#[async_trait]
impl Fabric for SqliteFabric {
    async fn set_phase_state(&self, id: &PhaseId, state: FabricPhaseState) -> FabricResult<()> {
        sqlx::query("INSERT INTO phase_states (id, state) VALUES (?, ?) ON CONFLICT(id) DO UPDATE SET state = excluded.state")
            .bind(id.as_str())
            .bind(state.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| FabricError::Io(e.to_string()))?;
        Ok(())
    }

    async fn get_phase_state(&self, id: &PhaseId) -> FabricResult<Option<FabricPhaseState>> {
        let row = sqlx::query("SELECT state FROM phase_states WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| FabricError::Io(e.to_string()))?;
        Ok(row.and_then(|r| FabricPhaseState::parse(r.get::<String, _>("state").as_str())))
    }

    async fn publish_entanglement(&self, e: Entanglement) -> FabricResult<()> {
        self.publish_entanglements(vec![e]).await
    }

    async fn publish_entanglements(&self, es: Vec<Entanglement>) -> FabricResult<()> {
        for e in es {
            let published_at = Utc::now();
            sqlx::query(
                "INSERT INTO entanglements (producer, kind, name, signature, package, published_at) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(e.producer.as_str())
            .bind(kind_to_str(e.kind))
            .bind(&e.name)
            .bind(&e.signature)
            .bind(&e.package)
            .bind(published_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|err| FabricError::Io(err.to_string()))?;
        }
        Ok(())
    }

    async fn entanglements_for(&self, id: &PhaseId) -> FabricResult<Vec<Entanglement>> {
        let rows = sqlx::query("SELECT producer, kind, name, signature, package, published_at FROM entanglements WHERE producer = ?")
            .bind(id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| FabricError::Io(e.to_string()))?;
        Ok(rows.into_iter().map(row_to_entanglement).collect())
    }

    async fn all_entanglements(&self) -> FabricResult<Vec<Entanglement>> {
        let rows = sqlx::query("SELECT producer, kind, name, signature, package, published_at FROM entanglements")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| FabricError::Io(e.to_string()))?;
        Ok(rows.into_iter().map(row_to_entanglement).collect())
    }

    async fn claim_file(&self, path: &str, owner: &PhaseId) -> FabricResult<()> {
        sqlx::query("INSERT INTO file_claims (path, owner) VALUES (?, ?) ON CONFLICT(path) DO UPDATE SET owner = excluded.owner")
            .bind(path)
            .bind(owner.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| FabricError::Io(e.to_string()))?;
        Ok(())
    }

    async fn file_owner(&self, path: &str) -> FabricResult<Option<PhaseId>> {
        let row = sqlx::query("SELECT owner FROM file_claims WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| FabricError::Io(e.to_string()))?;
        Ok(row.map(|r| PhaseId::new(r.get::<String, _>("owner"))))
    }

    async fn claims_for(&self, owner: &PhaseId) -> FabricResult<Vec<String>> {
        let rows = sqlx::query("SELECT path FROM file_claims WHERE owner = ?")
            .bind(owner.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| FabricError::Io(e.to_string()))?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>("path")).collect())
    }

    async fn release_claims(&self, owner: &PhaseId) -> FabricResult<()> {
        sqlx::query("DELETE FROM file_claims WHERE owner = ?")
            .bind(owner.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| FabricError::Io(e.to_string()))?;
        Ok(())
    }

    async fn all_phase_states(&self) -> FabricResult<HashMap<PhaseId, FabricPhaseState>> {
        let rows = sqlx::query("SELECT id, state FROM phase_states")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| FabricError::Io(e.to_string()))?;
        Ok(rows
            .into_iter()
            .filter_map(|r| {
                let id = PhaseId::new(r.get::<String, _>("id"));
                let state = FabricPhaseState::parse(r.get::<String, _>("state").as_str())?;
                Some((id, state))
            })
            .collect())
    }
}

fn row_to_entanglement(row: sqlx::sqlite::SqliteRow) -> Entanglement {
    Entanglement {
        producer: PhaseId::new(row.get::<String, _>("producer")),
        kind: kind_from_str(&row.get::<String, _>("kind")),
        name: row.get::<String, _>("name"),
        signature: row.get::<String, _>("signature"),
        package: row.get::<String, _>("package"),
        published_at: chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>("published_at"))
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    }
}
