//! PostgreSQL Store
//!
//! `PgStore` implements [`EvolutionStore`] on a deadpool-postgres pool. It
//! never retries: the engine wraps every call in the retry utility, so
//! failures are mapped to `StorageError` text the retry classifier reads.
//!
//! Tables: `agents`, `agent_memories`, `agent_learning_events`,
//! `agent_relationships` (unique per pair and type) and `task_queue`.

use async_trait::async_trait;
use atlas_core::{
    clamp_unit, AtlasError, AtlasResult, ConfigError, Entity, EntityUpdate, LearningEvent,
    MemoryRecord, MemoryType, RecordKind, Relationship, Specializations, StorageError,
    TaskQueueItem,
};
use atlas_storage::{EntityOrder, EntityQuery, EvolutionStore, MemoryOrder, MemoryQuery};
use deadpool_postgres::{
    Config, ManagerConfig, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime,
};
use serde_json::{Map, Value as JsonValue};
use std::time::Duration;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Clone, PartialEq)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub max_size: usize,
    /// Wait limit for a pool checkout.
    pub timeout: Duration,
    /// Create missing tables at startup.
    pub auto_migrate: bool,
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("max_size", &self.max_size)
            .field("timeout", &self.timeout)
            .field("auto_migrate", &self.auto_migrate)
            .finish()
    }
}

impl DbConfig {
    /// Environment variables:
    /// - `ATLAS_DB_HOST` (required)
    /// - `ATLAS_DB_PORT` (default: 5432)
    /// - `ATLAS_DB_NAME` (default: atlas)
    /// - `ATLAS_DB_USER` (default: postgres)
    /// - `ATLAS_DB_PASSWORD` (default: empty)
    /// - `ATLAS_DB_POOL_SIZE` (default: 16)
    /// - `ATLAS_DB_TIMEOUT` seconds (default: 30)
    /// - `ATLAS_DB_AUTO_MIGRATE` "true" to create tables (default: false)
    pub fn from_env() -> AtlasResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AtlasResult<Self> {
        let host = lookup("ATLAS_DB_HOST")
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                field: "ATLAS_DB_HOST".to_string(),
            })?;

        Ok(Self {
            host,
            port: lookup("ATLAS_DB_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: lookup("ATLAS_DB_NAME").unwrap_or_else(|| "atlas".to_string()),
            user: lookup("ATLAS_DB_USER").unwrap_or_else(|| "postgres".to_string()),
            password: lookup("ATLAS_DB_PASSWORD").unwrap_or_default(),
            max_size: lookup("ATLAS_DB_POOL_SIZE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                lookup("ATLAS_DB_TIMEOUT")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            auto_migrate: lookup("ATLAS_DB_AUTO_MIGRATE")
                .map(|s| s.eq_ignore_ascii_case("true") || s == "1")
                .unwrap_or(false),
        })
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> AtlasResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool = PoolConfig::new(self.max_size);
        pool.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls).map_err(|e| {
            AtlasError::Config(ConfigError::Load {
                reason: format!("Failed to create pool: {}", e),
            })
        })
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

/// Tables the store reads and writes.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS agents (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    sector TEXT,
    user_id UUID,
    status TEXT NOT NULL DEFAULT 'active',
    learning_velocity DOUBLE PRECISION NOT NULL DEFAULT 0,
    success_rate DOUBLE PRECISION NOT NULL DEFAULT 0,
    avg_confidence DOUBLE PRECISION NOT NULL DEFAULT 0,
    total_tasks_completed BIGINT NOT NULL DEFAULT 0,
    task_specializations JSONB NOT NULL DEFAULT '{}'::jsonb,
    last_performance_update TIMESTAMPTZ
);
CREATE INDEX IF NOT EXISTS agents_staleness_idx
    ON agents (last_performance_update ASC NULLS FIRST);

CREATE TABLE IF NOT EXISTS agent_memories (
    id UUID PRIMARY KEY,
    agent_id UUID NOT NULL,
    user_id UUID,
    memory_type TEXT NOT NULL,
    content TEXT NOT NULL,
    importance_score DOUBLE PRECISION NOT NULL,
    context JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS agent_memories_agent_idx ON agent_memories (agent_id);

CREATE TABLE IF NOT EXISTS agent_learning_events (
    id UUID PRIMARY KEY,
    agent_id UUID NOT NULL,
    event_type TEXT NOT NULL,
    event_data JSONB NOT NULL DEFAULT '{}'::jsonb,
    impact_score DOUBLE PRECISION NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS agent_relationships (
    agent_a_id UUID NOT NULL,
    agent_b_id UUID NOT NULL,
    relationship_type TEXT NOT NULL,
    synergy_score DOUBLE PRECISION NOT NULL,
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (agent_a_id, agent_b_id, relationship_type)
);

CREATE TABLE IF NOT EXISTS task_queue (
    id UUID PRIMARY KEY,
    title TEXT NOT NULL,
    task_type TEXT NOT NULL,
    description TEXT NOT NULL,
    priority TEXT NOT NULL,
    status TEXT NOT NULL,
    assigned_agents UUID[] NOT NULL DEFAULT '{}',
    input_data JSONB NOT NULL DEFAULT '{}'::jsonb,
    assignment_rationale TEXT NOT NULL DEFAULT '',
    user_id UUID,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
"#;

const ENTITY_COLUMNS: &str = "id, name, sector, user_id, status, learning_velocity, \
     success_rate, avg_confidence, total_tasks_completed, task_specializations, \
     last_performance_update";

const MEMORY_COLUMNS: &str =
    "id, agent_id, user_id, memory_type, content, importance_score, context, created_at";

const INSERT_MEMORY: &str = "INSERT INTO agent_memories \
     (id, agent_id, user_id, memory_type, content, importance_score, context, created_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";

const INSERT_EVENT: &str = "INSERT INTO agent_learning_events \
     (id, agent_id, event_type, event_data, impact_score, created_at) \
     VALUES ($1, $2, $3, $4, $5, $6)";

const INSERT_TASK: &str = "INSERT INTO task_queue \
     (id, title, task_type, description, priority, status, assigned_agents, input_data, \
      assignment_rationale, user_id, created_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)";

const UPSERT_RELATIONSHIP: &str = "INSERT INTO agent_relationships \
     (agent_a_id, agent_b_id, relationship_type, synergy_score, metadata, updated_at) \
     VALUES ($1, $2, $3, $4, $5, now()) \
     ON CONFLICT (agent_a_id, agent_b_id, relationship_type) \
     DO UPDATE SET synergy_score = EXCLUDED.synergy_score, \
                   metadata = EXCLUDED.metadata, \
                   updated_at = EXCLUDED.updated_at";

// ============================================================================
// QUERY BUILDING
// ============================================================================

/// Positional parameters collected while building a statement.
#[derive(Default)]
struct SqlParams {
    values: Vec<Box<dyn ToSql + Sync + Send>>,
}

impl SqlParams {
    /// Push a value and return its placeholder.
    fn bind<T: ToSql + Sync + Send + 'static>(&mut self, value: T) -> String {
        self.values.push(Box::new(value));
        format!("${}", self.values.len())
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.values
            .iter()
            .map(|v| v.as_ref() as &(dyn ToSql + Sync))
            .collect()
    }
}

fn where_clause(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

fn entity_select(query: &EntityQuery) -> (String, SqlParams) {
    let mut params = SqlParams::default();
    let mut clauses = Vec::new();

    if let Some(sector) = &query.filter.sector {
        clauses.push(format!("sector = {}", params.bind(sector.clone())));
    }
    if let Some(owner) = query.filter.owner_id {
        clauses.push(format!("user_id = {}", params.bind(owner)));
    }
    if let Some(min) = query.min_success_rate {
        clauses.push(format!("success_rate > {}", params.bind(min)));
    }

    let order = match query.order {
        EntityOrder::StalestFirst => "last_performance_update ASC NULLS FIRST",
        EntityOrder::SuccessRateDesc => "success_rate DESC",
    };
    let limit = params.bind(query.limit as i64);

    let sql = format!(
        "SELECT {} FROM agents{} ORDER BY {} LIMIT {}",
        ENTITY_COLUMNS,
        where_clause(&clauses),
        order,
        limit
    );
    (sql, params)
}

fn memory_select(query: &MemoryQuery) -> (String, SqlParams) {
    let mut params = SqlParams::default();
    let mut clauses = Vec::new();

    if !query.entity_ids.is_empty() {
        clauses.push(format!("agent_id = ANY({})", params.bind(query.entity_ids.clone())));
    }
    if let Some(min) = query.min_importance {
        clauses.push(format!("importance_score >= {}", params.bind(min)));
    }
    if !query.exclude_types.is_empty() {
        let excluded: Vec<String> = query
            .exclude_types
            .iter()
            .map(|t| t.as_db_str().to_string())
            .collect();
        clauses.push(format!("memory_type <> ALL({})", params.bind(excluded)));
    }

    let order = match query.order {
        MemoryOrder::ImportanceDesc => "importance_score DESC",
        MemoryOrder::NewestFirst => "created_at DESC",
    };
    let limit = params.bind(query.limit as i64);

    let sql = format!(
        "SELECT {} FROM agent_memories{} ORDER BY {} LIMIT {}",
        MEMORY_COLUMNS,
        where_clause(&clauses),
        order,
        limit
    );
    (sql, params)
}

/// `None` when the update sets nothing.
fn entity_update(update: &EntityUpdate) -> Option<(String, SqlParams)> {
    let mut params = SqlParams::default();
    let mut sets = Vec::new();

    if let Some(v) = update.learning_velocity {
        sets.push(format!("learning_velocity = {}", params.bind(clamp_unit(v))));
    }
    if let Some(v) = update.success_rate {
        sets.push(format!("success_rate = {}", params.bind(clamp_unit(v))));
    }
    if let Some(specs) = &update.task_specializations {
        let mut specs = specs.clone();
        specs.clamp_all();
        sets.push(format!(
            "task_specializations = {}",
            params.bind(specializations_to_json(&specs))
        ));
    }
    if let Some(ts) = update.last_performance_update {
        sets.push(format!("last_performance_update = {}", params.bind(ts)));
    }
    if sets.is_empty() {
        return None;
    }

    let id = params.bind(update.entity_id);
    let sql = format!("UPDATE agents SET {} WHERE id = {}", sets.join(", "), id);
    Some((sql, params))
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn specializations_to_json(specs: &Specializations) -> JsonValue {
    let map: Map<String, JsonValue> = specs
        .iter()
        .map(|(k, v)| (k.to_string(), JsonValue::from(v)))
        .collect();
    JsonValue::Object(map)
}

/// Non-numeric values are dropped.
fn specializations_from_json(value: &JsonValue) -> Specializations {
    match value.as_object() {
        Some(map) => map
            .iter()
            .filter_map(|(k, v)| v.as_f64().map(|score| (k.clone(), score)))
            .collect(),
        None => Specializations::new(),
    }
}

fn entity_from_row(row: &Row) -> Result<Entity, tokio_postgres::Error> {
    let specs: Option<JsonValue> = row.try_get("task_specializations")?;
    let tasks: Option<i64> = row.try_get("total_tasks_completed")?;
    let velocity: Option<f64> = row.try_get("learning_velocity")?;
    let success: Option<f64> = row.try_get("success_rate")?;
    let confidence: Option<f64> = row.try_get("avg_confidence")?;
    let status: Option<String> = row.try_get("status")?;

    Ok(Entity {
        entity_id: row.try_get("id")?,
        name: row.try_get("name")?,
        sector: row.try_get("sector")?,
        owner_id: row.try_get("user_id")?,
        status: status.unwrap_or_else(|| "active".to_string()),
        learning_velocity: velocity.unwrap_or(0.0),
        success_rate: success.unwrap_or(0.0),
        avg_confidence: confidence.unwrap_or(0.0),
        total_tasks_completed: tasks.unwrap_or(0).max(0) as u64,
        task_specializations: specs
            .as_ref()
            .map(specializations_from_json)
            .unwrap_or_default(),
        last_performance_update: row.try_get("last_performance_update")?,
    })
}

/// `Ok(None)` for rows whose memory type this engine does not know.
fn memory_from_row(row: &Row) -> Result<Option<MemoryRecord>, tokio_postgres::Error> {
    let raw_type: String = row.try_get("memory_type")?;
    let memory_type = match MemoryType::from_db_str(&raw_type) {
        Ok(t) => t,
        Err(_) => {
            tracing::debug!(memory_type = %raw_type, "Skipping memory with unknown type");
            return Ok(None);
        }
    };
    let context: Option<JsonValue> = row.try_get("context")?;
    let importance: f64 = row.try_get("importance_score")?;

    Ok(Some(MemoryRecord {
        memory_id: row.try_get("id")?,
        entity_id: row.try_get("agent_id")?,
        owner_id: row.try_get("user_id")?,
        memory_type,
        content: row.try_get("content")?,
        importance_score: clamp_unit(importance),
        context: context.unwrap_or_else(|| JsonValue::Object(Map::new())),
        created_at: row.try_get("created_at")?,
    }))
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn pg_error(err: tokio_postgres::Error) -> AtlasError {
    if let Some(db) = err.as_db_error() {
        return StorageError::Query {
            message: format!("{} (SQLSTATE {})", db.message(), db.code().code()),
        }
        .into();
    }
    if err.is_closed() {
        return StorageError::Connection {
            reason: err.to_string(),
        }
        .into();
    }
    StorageError::Query {
        message: err.to_string(),
    }
    .into()
}

fn pool_error(err: PoolError) -> AtlasError {
    let reason = match &err {
        PoolError::Timeout(_) => "connection pool checkout timed out".to_string(),
        PoolError::Closed => "connection pool is closed".to_string(),
        other => format!("connection pool: {}", other),
    };
    StorageError::Connection { reason }.into()
}

// ============================================================================
// STORE
// ============================================================================

/// PostgreSQL-backed [`EvolutionStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> AtlasResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Current pool size, for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Create any missing tables.
    pub async fn ensure_schema(&self) -> AtlasResult<()> {
        let conn = self.conn().await?;
        conn.batch_execute(SCHEMA_SQL).await.map_err(pg_error)?;
        tracing::info!("Database schema ensured");
        Ok(())
    }

    async fn conn(&self) -> AtlasResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }
}

#[async_trait]
impl EvolutionStore for PgStore {
    async fn fetch_entities(&self, query: &EntityQuery) -> AtlasResult<Vec<Entity>> {
        let conn = self.conn().await?;
        let (sql, params) = entity_select(query);
        let rows = conn
            .query(sql.as_str(), &params.as_refs())
            .await
            .map_err(pg_error)?;
        rows.iter()
            .map(|row| entity_from_row(row).map_err(pg_error))
            .collect()
    }

    async fn fetch_memories(&self, query: &MemoryQuery) -> AtlasResult<Vec<MemoryRecord>> {
        let conn = self.conn().await?;
        let (sql, params) = memory_select(query);
        let rows = conn
            .query(sql.as_str(), &params.as_refs())
            .await
            .map_err(pg_error)?;

        let mut memories = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(memory) = memory_from_row(row).map_err(pg_error)? {
                memories.push(memory);
            }
        }
        Ok(memories)
    }

    async fn insert_memories(&self, records: &[MemoryRecord]) -> AtlasResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(pg_error)?;
        let stmt = tx.prepare_cached(INSERT_MEMORY).await.map_err(pg_error)?;
        for r in records {
            tx.execute(
                &stmt,
                &[
                    &r.memory_id,
                    &r.entity_id,
                    &r.owner_id,
                    &r.memory_type.as_db_str(),
                    &r.content,
                    &r.importance_score,
                    &r.context,
                    &r.created_at,
                ],
            )
            .await
            .map_err(pg_error)?;
        }
        tx.commit().await.map_err(pg_error)?;
        Ok(records.len())
    }

    async fn insert_learning_events(&self, events: &[LearningEvent]) -> AtlasResult<usize> {
        if events.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(pg_error)?;
        let stmt = tx.prepare_cached(INSERT_EVENT).await.map_err(pg_error)?;
        for e in events {
            tx.execute(
                &stmt,
                &[
                    &e.event_id,
                    &e.entity_id,
                    &e.event_type.as_db_str(),
                    &e.event_data,
                    &e.impact_score,
                    &e.created_at,
                ],
            )
            .await
            .map_err(pg_error)?;
        }
        tx.commit().await.map_err(pg_error)?;
        Ok(events.len())
    }

    async fn insert_tasks(&self, tasks: &[TaskQueueItem]) -> AtlasResult<usize> {
        if tasks.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(pg_error)?;
        let stmt = tx.prepare_cached(INSERT_TASK).await.map_err(pg_error)?;
        for t in tasks {
            tx.execute(
                &stmt,
                &[
                    &t.task_id,
                    &t.title,
                    &t.task_type,
                    &t.description,
                    &t.priority.as_db_str(),
                    &t.status.as_db_str(),
                    &t.assigned_entities,
                    &t.input_data,
                    &t.assignment_rationale,
                    &t.owner_id,
                    &t.created_at,
                ],
            )
            .await
            .map_err(pg_error)?;
        }
        tx.commit().await.map_err(pg_error)?;
        Ok(tasks.len())
    }

    async fn update_entity(&self, update: &EntityUpdate) -> AtlasResult<()> {
        let Some((sql, params)) = entity_update(update) else {
            return Ok(());
        };
        let conn = self.conn().await?;
        let affected = conn
            .execute(sql.as_str(), &params.as_refs())
            .await
            .map_err(pg_error)?;
        if affected == 0 {
            return Err(StorageError::NotFound {
                kind: RecordKind::Entity,
                id: update.entity_id,
            }
            .into());
        }
        Ok(())
    }

    async fn upsert_relationship(&self, relationship: &Relationship) -> AtlasResult<()> {
        let conn = self.conn().await?;
        conn.execute(
            UPSERT_RELATIONSHIP,
            &[
                &relationship.entity_a,
                &relationship.entity_b,
                &relationship.relationship_type.as_db_str(),
                &relationship.synergy_score,
                &relationship.metadata,
            ],
        )
        .await
        .map_err(pg_error)?;
        Ok(())
    }

    async fn ping(&self) -> AtlasResult<()> {
        let conn = self.conn().await?;
        conn.query_one("SELECT 1", &[]).await.map_err(pg_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::is_transient;
    use atlas_storage::PopulationFilter;
    use chrono::Utc;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_db_config_requires_host() {
        let err = DbConfig::from_lookup(lookup(&[("ATLAS_DB_NAME", "atlas")])).unwrap_err();
        assert!(matches!(
            err,
            AtlasError::Config(ConfigError::MissingRequired { ref field }) if field == "ATLAS_DB_HOST"
        ));
    }

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::from_lookup(lookup(&[
            ("ATLAS_DB_HOST", "db.internal"),
            ("ATLAS_DB_PASSWORD", "hunter2"),
        ]))
        .unwrap();
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "atlas");
        assert_eq!(config.max_size, 16);
        assert!(!config.auto_migrate);
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_entity_select_stalest_unfiltered() {
        let query = EntityQuery::stalest(PopulationFilter::default(), 50);
        let (sql, params) = entity_select(&query);
        assert!(sql.starts_with("SELECT id, name"));
        assert!(!sql.contains("WHERE"));
        assert!(sql.ends_with("ORDER BY last_performance_update ASC NULLS FIRST LIMIT $1"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_entity_select_filters_in_order() {
        let filter = PopulationFilter {
            sector: Some("FINANCE".to_string()),
            owner_id: Some(Uuid::nil()),
        };
        let query = EntityQuery::top_performers(filter, Some(0.3), 100);
        let (sql, params) = entity_select(&query);
        assert!(sql.contains("WHERE sector = $1 AND user_id = $2 AND success_rate > $3"));
        assert!(sql.ends_with("ORDER BY success_rate DESC LIMIT $4"));
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn test_memory_select_with_exclusions() {
        let query = MemoryQuery::most_important(vec![Uuid::nil()], Some(0.5), 150)
            .excluding(&[MemoryType::Crystallized, MemoryType::ReceivedCrystal]);
        let (sql, params) = memory_select(&query);
        assert!(sql.contains(
            "WHERE agent_id = ANY($1) AND importance_score >= $2 AND memory_type <> ALL($3)"
        ));
        assert!(sql.ends_with("ORDER BY importance_score DESC LIMIT $4"));
        assert_eq!(params.len(), 4);

        let (sql, _) = memory_select(&MemoryQuery::newest(Vec::new(), 50));
        assert!(!sql.contains("WHERE"));
        assert!(sql.contains("ORDER BY created_at DESC"));
    }

    #[test]
    fn test_entity_update_sets_present_fields() {
        let update = EntityUpdate {
            entity_id: Uuid::nil(),
            learning_velocity: Some(0.4),
            last_performance_update: Some(Utc::now()),
            ..Default::default()
        };
        let (sql, params) = entity_update(&update).unwrap();
        assert_eq!(
            sql,
            "UPDATE agents SET learning_velocity = $1, last_performance_update = $2 WHERE id = $3"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_empty_update_is_noop() {
        let update = EntityUpdate {
            entity_id: Uuid::nil(),
            ..Default::default()
        };
        assert!(entity_update(&update).is_none());
    }

    #[test]
    fn test_specializations_json_is_lenient() {
        let value = serde_json::json!({
            "research": 0.7,
            "planning": "high",
            "analysis": 1
        });
        let specs = specializations_from_json(&value);
        assert_eq!(specs.len(), 2);
        assert_eq!(specs.score("research"), 0.7);
        assert_eq!(specs.score("analysis"), 1.0);

        let back = specializations_to_json(&specs);
        assert_eq!(back["research"], 0.7);
        assert!(specializations_from_json(&serde_json::json!([1, 2])).is_empty());
    }

    #[test]
    fn test_schema_declares_relationship_key() {
        assert!(SCHEMA_SQL.contains("PRIMARY KEY (agent_a_id, agent_b_id, relationship_type)"));
        assert!(UPSERT_RELATIONSHIP
            .contains("ON CONFLICT (agent_a_id, agent_b_id, relationship_type)"));
    }

    #[test]
    fn test_pool_timeout_is_transient() {
        let err: AtlasError = StorageError::Connection {
            reason: "connection pool checkout timed out".to_string(),
        }
        .into();
        assert!(is_transient(&err));
    }
}
