//! SQLite storage backend implementation
//!
//! This module provides a SQLite-based implementation of the `StorageBackend` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! ## Alert deduplication
//!
//! `create_alert_if_absent` is a single `INSERT … SELECT … WHERE NOT EXISTS`
//! statement. SQLite holds the write lock for the whole statement, so the
//! duplicate check and the insert cannot interleave with another writer.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{
    Alert, AlertInsert, AlertRule, AlertStatus, ManagedServer, NewAlert, NewAlertRule,
    NewManagedServer, NewProbeResult, NewProbeTarget, ProbeResult, ProbeTarget, ServerKind,
    ServerStatus, TargetState, UptimeStats,
};

const TARGET_COLUMNS: &str =
    "id, name, kind, address, interval_secs, status, last_check, latency_ms, uptime";

const RESULT_COLUMNS: &str = "id, target_id, status, latency_ms, message, checked_at";

const RULE_COLUMNS: &str = "id, name, scope, target_id, condition, threshold, enabled";

const ALERT_COLUMNS: &str = "id, rule_id, scope, severity, message, current_value, target_id, \
     target_name, status, acknowledged_at, acknowledged_by, resolved_at, created_at";

const SERVER_COLUMNS: &str =
    "id, name, kind, address, port, username, password, realm, verify_tls, status, last_sync";

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Create a new SQLite backend
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite for concurrent access (WAL mode, busy timeout)
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use infra_watch::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./infra-watch.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30)); // Retry on lock contention

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    /// Helper to convert timestamp to Unix milliseconds for SQLite
    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    /// Helper to convert Unix milliseconds from SQLite to DateTime
    fn millis_to_timestamp(millis: i64) -> StorageResult<DateTime<Utc>> {
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| StorageError::InvalidValue(format!("timestamp {millis} out of range")))
    }

    fn optional_timestamp(millis: Option<i64>) -> StorageResult<Option<DateTime<Utc>>> {
        millis.map(Self::millis_to_timestamp).transpose()
    }

    fn parse_column<T: FromStr<Err = StorageError>>(row: &SqliteRow, column: &str) -> StorageResult<T> {
        let value: String = row.try_get(column)?;
        value.parse()
    }

    fn target_from_row(row: &SqliteRow) -> StorageResult<ProbeTarget> {
        Ok(ProbeTarget {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            kind: Self::parse_column(row, "kind")?,
            address: row.try_get("address")?,
            interval_secs: row.try_get::<i64, _>("interval_secs")?.max(0) as u32,
            status: Self::parse_column(row, "status")?,
            last_check: Self::optional_timestamp(row.try_get("last_check")?)?,
            latency_ms: row.try_get("latency_ms")?,
            uptime: row.try_get("uptime")?,
        })
    }

    fn result_from_row(row: &SqliteRow) -> StorageResult<ProbeResult> {
        Ok(ProbeResult {
            id: row.try_get("id")?,
            target_id: row.try_get("target_id")?,
            status: Self::parse_column(row, "status")?,
            latency_ms: row.try_get("latency_ms")?,
            message: row.try_get("message")?,
            checked_at: Self::millis_to_timestamp(row.try_get("checked_at")?)?,
        })
    }

    fn rule_from_row(row: &SqliteRow) -> StorageResult<AlertRule> {
        Ok(AlertRule {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            scope: Self::parse_column(row, "scope")?,
            target_id: row.try_get("target_id")?,
            condition: Self::parse_column(row, "condition")?,
            threshold: row.try_get("threshold")?,
            enabled: row.try_get("enabled")?,
        })
    }

    fn alert_from_row(row: &SqliteRow) -> StorageResult<Alert> {
        Ok(Alert {
            id: row.try_get("id")?,
            rule_id: row.try_get("rule_id")?,
            scope: Self::parse_column(row, "scope")?,
            severity: Self::parse_column(row, "severity")?,
            message: row.try_get("message")?,
            current_value: row.try_get("current_value")?,
            target_id: row.try_get("target_id")?,
            target_name: row.try_get("target_name")?,
            status: Self::parse_column(row, "status")?,
            acknowledged_at: Self::optional_timestamp(row.try_get("acknowledged_at")?)?,
            acknowledged_by: row.try_get("acknowledged_by")?,
            resolved_at: Self::optional_timestamp(row.try_get("resolved_at")?)?,
            created_at: Self::millis_to_timestamp(row.try_get("created_at")?)?,
        })
    }

    fn server_from_row(row: &SqliteRow) -> StorageResult<ManagedServer> {
        let port: i64 = row.try_get("port")?;
        Ok(ManagedServer {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            kind: Self::parse_column(row, "kind")?,
            address: row.try_get("address")?,
            port: u16::try_from(port)
                .map_err(|_| StorageError::InvalidValue(format!("port {port} out of range")))?,
            username: row.try_get("username")?,
            password: row.try_get("password")?,
            realm: row.try_get("realm")?,
            verify_tls: row.try_get("verify_tls")?,
            status: Self::parse_column(row, "status")?,
            last_sync: Self::optional_timestamp(row.try_get("last_sync")?)?,
        })
    }

    /// Current status of an alert, or `NotFound`
    async fn alert_status(&self, id: i64) -> StorageResult<AlertStatus> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM alerts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        status
            .ok_or(StorageError::NotFound { entity: "alert", id })?
            .parse()
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn list_probe_targets(&self) -> StorageResult<Vec<ProbeTarget>> {
        let rows = sqlx::query(&format!(
            "SELECT {TARGET_COLUMNS} FROM probe_targets ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::target_from_row).collect()
    }

    async fn get_probe_target(&self, id: i64) -> StorageResult<Option<ProbeTarget>> {
        let row = sqlx::query(&format!(
            "SELECT {TARGET_COLUMNS} FROM probe_targets WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::target_from_row).transpose()
    }

    #[instrument(skip(self, target), fields(name = %target.name))]
    async fn insert_probe_target(&self, target: NewProbeTarget) -> StorageResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO probe_targets (name, kind, address, interval_secs)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&target.name)
        .bind(target.kind.to_string())
        .bind(&target.address)
        .bind(target.interval_secs as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    #[instrument(skip(self, state))]
    async fn update_probe_target_state(&self, id: i64, state: TargetState) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE probe_targets
            SET status = ?, last_check = ?, latency_ms = ?, uptime = ?
            WHERE id = ?
            "#,
        )
        .bind(state.status.to_string())
        .bind(Self::timestamp_to_millis(&state.last_check))
        .bind(state.latency_ms)
        .bind(state.uptime)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "probe target",
                id,
            });
        }
        Ok(())
    }

    #[instrument(skip(self, result), fields(target_id = result.target_id))]
    async fn append_probe_result(&self, result: NewProbeResult) -> StorageResult<i64> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO probe_results (target_id, status, latency_ms, message, checked_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(result.target_id)
        .bind(result.status.to_string())
        .bind(result.latency_ms)
        .bind(&result.message)
        .bind(Self::timestamp_to_millis(&result.checked_at))
        .execute(&self.pool)
        .await?;

        Ok(inserted.last_insert_rowid())
    }

    async fn calculate_uptime(&self, target_id: i64) -> StorageResult<UptimeStats> {
        let (total, up): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN status = 'up' THEN 1 ELSE 0 END), 0)
            FROM probe_results
            WHERE target_id = ?
            "#,
        )
        .bind(target_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(UptimeStats {
            total: total.max(0) as u64,
            up: up.max(0) as u64,
        })
    }

    async fn query_latest_probe_results(
        &self,
        target_id: i64,
        limit: usize,
    ) -> StorageResult<Vec<ProbeResult>> {
        let rows = sqlx::query(&format!(
            "SELECT {RESULT_COLUMNS} FROM probe_results WHERE target_id = ? ORDER BY id DESC LIMIT ?"
        ))
        .bind(target_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::result_from_row).collect()
    }

    async fn list_enabled_alert_rules(&self) -> StorageResult<Vec<AlertRule>> {
        let rows = sqlx::query(&format!(
            "SELECT {RULE_COLUMNS} FROM alert_rules WHERE enabled = 1 ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::rule_from_row).collect()
    }

    #[instrument(skip(self, rule), fields(name = %rule.name))]
    async fn insert_alert_rule(&self, rule: NewAlertRule) -> StorageResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO alert_rules (name, scope, target_id, condition, threshold, enabled)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&rule.name)
        .bind(rule.scope.to_string())
        .bind(rule.target_id)
        .bind(rule.condition.to_string())
        .bind(rule.threshold)
        .bind(rule.enabled)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    #[instrument(skip(self, alert), fields(rule_id = alert.rule_id))]
    async fn create_alert_if_absent(
        &self,
        alert: NewAlert,
        window_start: DateTime<Utc>,
    ) -> StorageResult<AlertInsert> {
        let result = sqlx::query(
            r#"
            INSERT INTO alerts (
                rule_id, scope, severity, message, current_value,
                target_id, target_name, status, created_at
            )
            SELECT ?, ?, ?, ?, ?, ?, ?, 'active', ?
            WHERE NOT EXISTS (
                SELECT 1 FROM alerts
                WHERE rule_id = ?
                  AND status IN ('active', 'acknowledged')
                  AND created_at > ?
            )
            "#,
        )
        .bind(alert.rule_id)
        .bind(alert.scope.to_string())
        .bind(alert.severity.to_string())
        .bind(&alert.message)
        .bind(alert.current_value)
        .bind(alert.target_id)
        .bind(&alert.target_name)
        .bind(Self::timestamp_to_millis(&alert.created_at))
        .bind(alert.rule_id)
        .bind(Self::timestamp_to_millis(&window_start))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!("open alert inside dedup window, suppressing");
            return Ok(AlertInsert::Suppressed);
        }
        Ok(AlertInsert::Created(result.last_insert_rowid()))
    }

    async fn query_recent_alerts(
        &self,
        rule_id: i64,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<Alert>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ALERT_COLUMNS} FROM alerts
            WHERE rule_id = ?
              AND status IN ('active', 'acknowledged')
              AND created_at > ?
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(rule_id)
        .bind(Self::timestamp_to_millis(&since))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::alert_from_row).collect()
    }

    async fn list_alerts(&self, status: Option<AlertStatus>) -> StorageResult<Vec<Alert>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {ALERT_COLUMNS} FROM alerts WHERE status = ? ORDER BY created_at DESC, id DESC"
                ))
                .bind(status.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {ALERT_COLUMNS} FROM alerts ORDER BY created_at DESC, id DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(Self::alert_from_row).collect()
    }

    async fn get_alert(&self, id: i64) -> StorageResult<Option<Alert>> {
        let row = sqlx::query(&format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::alert_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn acknowledge_alert(&self, id: i64, by: &str, at: DateTime<Utc>) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE alerts
            SET status = 'acknowledged', acknowledged_at = ?, acknowledged_by = ?
            WHERE id = ? AND status = 'active'
            "#,
        )
        .bind(Self::timestamp_to_millis(&at))
        .bind(by)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let from = self.alert_status(id).await?;
            return Err(StorageError::InvalidTransition {
                id,
                from: from.to_string(),
                to: "acknowledged",
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn resolve_alert(&self, id: i64, at: DateTime<Utc>) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE alerts
            SET status = 'resolved', resolved_at = ?
            WHERE id = ? AND status IN ('active', 'acknowledged')
            "#,
        )
        .bind(Self::timestamp_to_millis(&at))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let from = self.alert_status(id).await?;
            return Err(StorageError::InvalidTransition {
                id,
                from: from.to_string(),
                to: "resolved",
            });
        }
        Ok(())
    }

    async fn list_managed_servers(&self, kind: ServerKind) -> StorageResult<Vec<ManagedServer>> {
        let rows = sqlx::query(&format!(
            "SELECT {SERVER_COLUMNS} FROM managed_servers WHERE kind = ? ORDER BY id ASC"
        ))
        .bind(kind.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::server_from_row).collect()
    }

    #[instrument(skip(self, server), fields(name = %server.name))]
    async fn insert_managed_server(&self, server: NewManagedServer) -> StorageResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO managed_servers (
                name, kind, address, port, username, password, realm, verify_tls
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&server.name)
        .bind(server.kind.to_string())
        .bind(&server.address)
        .bind(server.port as i64)
        .bind(&server.username)
        .bind(&server.password)
        .bind(&server.realm)
        .bind(server.verify_tls)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    #[instrument(skip(self))]
    async fn update_server_status(
        &self,
        id: i64,
        status: ServerStatus,
        last_sync: DateTime<Utc>,
    ) -> StorageResult<()> {
        let result = sqlx::query("UPDATE managed_servers SET status = ?, last_sync = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(Self::timestamp_to_millis(&last_sync))
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "managed server",
                id,
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        // Simple ping query to verify connection
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
