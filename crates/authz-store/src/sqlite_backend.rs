//! Embedded SQLite mirror of the policy-tuple relations.
//!
//! A single table, `casbin_rules(ptype, v0..v5, internal)`, carries both the
//! `g` (grant) and `p` (binding) relations the way Casbin-style adapters do:
//! `ptype = "g"` rows use `v0..v2` for `(role, action, namespace)`, `ptype =
//! "p"` rows use `v0..v5` for `(subject, resource, role, namespace, effect,
//! context)`. A unique index across all seven columns makes every insert
//! idempotent without a prior existence check.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::StorageError;
use crate::{ActionRow, BindingField, BindingRow, GrantField, GrantRow, PolicyBackend};

const GRANT_PTYPE: &str = "g";
const BINDING_PTYPE: &str = "p";

/// A [`PolicyBackend`] backed by a single-file SQLite database.
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend").finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Open (creating if absent) the database at `path` and run its schema migration.
    ///
    /// # Errors
    /// Returns [`StorageError::Init`] if the file cannot be opened or the schema
    /// cannot be created.
    pub async fn connect(path: &str) -> Result<Self, StorageError> {
        let url = format!("sqlite://{path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&url)
            .await
            .map_err(|err| StorageError::Init(err.to_string()))?;
        let backend = Self { pool };
        backend.migrate().await?;
        Ok(backend)
    }

    /// Open a backend over an already-initialized pool, for callers who manage
    /// their own connection lifecycle (tests, multi-database servers).
    ///
    /// # Errors
    /// Returns [`StorageError::Init`] if the schema cannot be created.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        let backend = Self { pool };
        backend.migrate().await?;
        Ok(backend)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS casbin_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ptype TEXT NOT NULL,
                v0 TEXT NOT NULL DEFAULT '',
                v1 TEXT NOT NULL DEFAULT '',
                v2 TEXT NOT NULL DEFAULT '',
                v3 TEXT NOT NULL DEFAULT '',
                v4 TEXT NOT NULL DEFAULT '',
                v5 TEXT NOT NULL DEFAULT '',
                internal INTEGER NOT NULL DEFAULT 0,
                UNIQUE(ptype, v0, v1, v2, v3, v4, v5)
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Init(err.to_string()))?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS actions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                action TEXT UNIQUE NOT NULL,
                internal INTEGER NOT NULL DEFAULT 0
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Init(err.to_string()))?;

        Ok(())
    }

    fn grant_from_row(row: &sqlx::sqlite::SqliteRow) -> GrantRow {
        let internal: i64 = row.get("internal");
        GrantRow {
            role: row.get("v0"),
            action: row.get("v1"),
            namespace: row.get("v2"),
            internal: internal != 0,
        }
    }

    fn binding_from_row(row: &sqlx::sqlite::SqliteRow) -> BindingRow {
        let internal: i64 = row.get("internal");
        BindingRow {
            subject: row.get("v0"),
            resource: row.get("v1"),
            role: row.get("v2"),
            namespace: row.get("v3"),
            effect: row.get("v4"),
            context: row.get("v5"),
            internal: internal != 0,
        }
    }
}

fn grant_column(field: GrantField) -> &'static str {
    match field {
        GrantField::Role => "v0",
        GrantField::Action => "v1",
        GrantField::Namespace => "v2",
    }
}

fn binding_column(field: BindingField) -> &'static str {
    match field {
        BindingField::Subject => "v0",
        BindingField::Resource => "v1",
        BindingField::Role => "v2",
        BindingField::Namespace => "v3",
        BindingField::Effect => "v4",
    }
}

#[async_trait::async_trait]
impl PolicyBackend for SqliteBackend {
    async fn add_grant(&self, row: &GrantRow) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO casbin_rules (ptype, v0, v1, v2, internal) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(GRANT_PTYPE)
        .bind(&row.role)
        .bind(&row.action)
        .bind(&row.namespace)
        .bind(i64::from(row.internal))
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Write(err.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_grant(&self, row: &GrantRow) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "DELETE FROM casbin_rules WHERE ptype = ? AND v0 = ? AND v1 = ? AND v2 = ?",
        )
        .bind(GRANT_PTYPE)
        .bind(&row.role)
        .bind(&row.action)
        .bind(&row.namespace)
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Write(err.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn has_grant(&self, row: &GrantRow) -> Result<bool, StorageError> {
        let found = sqlx::query(
            "SELECT 1 FROM casbin_rules WHERE ptype = ? AND v0 = ? AND v1 = ? AND v2 = ? LIMIT 1",
        )
        .bind(GRANT_PTYPE)
        .bind(&row.role)
        .bind(&row.action)
        .bind(&row.namespace)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| StorageError::Read(err.to_string()))?;
        Ok(found.is_some())
    }

    async fn filtered_grants(&self, field: GrantField, value: &str) -> Result<Vec<GrantRow>, StorageError> {
        let sql = format!("SELECT v0, v1, v2, internal FROM casbin_rules WHERE ptype = ? AND {} = ?", grant_column(field));
        let rows = sqlx::query(&sql)
            .bind(GRANT_PTYPE)
            .bind(value)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| StorageError::Read(err.to_string()))?;
        Ok(rows.iter().map(Self::grant_from_row).collect())
    }

    async fn all_grants(&self) -> Result<Vec<GrantRow>, StorageError> {
        let rows = sqlx::query("SELECT v0, v1, v2, internal FROM casbin_rules WHERE ptype = ?")
            .bind(GRANT_PTYPE)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| StorageError::Read(err.to_string()))?;
        Ok(rows.iter().map(Self::grant_from_row).collect())
    }

    async fn add_binding(&self, row: &BindingRow) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO casbin_rules (ptype, v0, v1, v2, v3, v4, v5, internal) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(BINDING_PTYPE)
        .bind(&row.subject)
        .bind(&row.resource)
        .bind(&row.role)
        .bind(&row.namespace)
        .bind(&row.effect)
        .bind(&row.context)
        .bind(i64::from(row.internal))
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Write(err.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_binding(&self, row: &BindingRow) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "DELETE FROM casbin_rules WHERE ptype = ? AND v0 = ? AND v1 = ? AND v2 = ? AND v3 = ? AND v4 = ? AND v5 = ?",
        )
        .bind(BINDING_PTYPE)
        .bind(&row.subject)
        .bind(&row.resource)
        .bind(&row.role)
        .bind(&row.namespace)
        .bind(&row.effect)
        .bind(&row.context)
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Write(err.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn has_binding(&self, row: &BindingRow) -> Result<bool, StorageError> {
        let found = sqlx::query(
            "SELECT 1 FROM casbin_rules WHERE ptype = ? AND v0 = ? AND v1 = ? AND v2 = ? AND v3 = ? AND v4 = ? AND v5 = ? LIMIT 1",
        )
        .bind(BINDING_PTYPE)
        .bind(&row.subject)
        .bind(&row.resource)
        .bind(&row.role)
        .bind(&row.namespace)
        .bind(&row.effect)
        .bind(&row.context)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| StorageError::Read(err.to_string()))?;
        Ok(found.is_some())
    }

    async fn update_binding(&self, old: &BindingRow, new: &BindingRow) -> Result<bool, StorageError> {
        let mut tx = self.pool.begin().await.map_err(|err| StorageError::Write(err.to_string()))?;

        let deleted = sqlx::query(
            "DELETE FROM casbin_rules WHERE ptype = ? AND v0 = ? AND v1 = ? AND v2 = ? AND v3 = ? AND v4 = ? AND v5 = ?",
        )
        .bind(BINDING_PTYPE)
        .bind(&old.subject)
        .bind(&old.resource)
        .bind(&old.role)
        .bind(&old.namespace)
        .bind(&old.effect)
        .bind(&old.context)
        .execute(&mut *tx)
        .await
        .map_err(|err| StorageError::Write(err.to_string()))?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await.map_err(|err| StorageError::Write(err.to_string()))?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT OR IGNORE INTO casbin_rules (ptype, v0, v1, v2, v3, v4, v5, internal) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(BINDING_PTYPE)
        .bind(&new.subject)
        .bind(&new.resource)
        .bind(&new.role)
        .bind(&new.namespace)
        .bind(&new.effect)
        .bind(&new.context)
        .bind(i64::from(new.internal))
        .execute(&mut *tx)
        .await
        .map_err(|err| StorageError::Write(err.to_string()))?;

        tx.commit().await.map_err(|err| StorageError::Write(err.to_string()))?;
        Ok(true)
    }

    async fn filtered_bindings(&self, field: BindingField, value: &str) -> Result<Vec<BindingRow>, StorageError> {
        let sql = format!(
            "SELECT v0, v1, v2, v3, v4, v5, internal FROM casbin_rules WHERE ptype = ? AND {} = ?",
            binding_column(field)
        );
        let rows = sqlx::query(&sql)
            .bind(BINDING_PTYPE)
            .bind(value)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| StorageError::Read(err.to_string()))?;
        Ok(rows.iter().map(Self::binding_from_row).collect())
    }

    async fn all_bindings(&self) -> Result<Vec<BindingRow>, StorageError> {
        let rows = sqlx::query("SELECT v0, v1, v2, v3, v4, v5, internal FROM casbin_rules WHERE ptype = ?")
            .bind(BINDING_PTYPE)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| StorageError::Read(err.to_string()))?;
        Ok(rows.iter().map(Self::binding_from_row).collect())
    }

    async fn seed_actions(&self, actions: &[ActionRow]) -> Result<u64, StorageError> {
        let mut tx = self.pool.begin().await.map_err(|err| StorageError::Write(err.to_string()))?;
        let mut inserted = 0u64;
        for action in actions {
            let result = sqlx::query("INSERT OR IGNORE INTO actions (action, internal) VALUES (?, ?)")
                .bind(&action.name)
                .bind(i64::from(action.internal))
                .execute(&mut *tx)
                .await
                .map_err(|err| StorageError::Write(err.to_string()))?;
            inserted += result.rows_affected();
        }
        tx.commit().await.map_err(|err| StorageError::Write(err.to_string()))?;
        Ok(inserted)
    }

    async fn seed_grants(&self, grants: &[GrantRow]) -> Result<u64, StorageError> {
        let mut tx = self.pool.begin().await.map_err(|err| StorageError::Write(err.to_string()))?;
        let mut inserted = 0u64;
        for grant in grants {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO casbin_rules (ptype, v0, v1, v2, internal) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(GRANT_PTYPE)
            .bind(&grant.role)
            .bind(&grant.action)
            .bind(&grant.namespace)
            .bind(i64::from(grant.internal))
            .execute(&mut *tx)
            .await
            .map_err(|err| StorageError::Write(err.to_string()))?;
            inserted += result.rows_affected();
        }
        tx.commit().await.map_err(|err| StorageError::Write(err.to_string()))?;
        Ok(inserted)
    }

    async fn seed_bindings(&self, bindings: &[BindingRow]) -> Result<u64, StorageError> {
        let mut tx = self.pool.begin().await.map_err(|err| StorageError::Write(err.to_string()))?;
        let mut inserted = 0u64;
        for binding in bindings {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO casbin_rules (ptype, v0, v1, v2, v3, v4, v5, internal) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(BINDING_PTYPE)
            .bind(&binding.subject)
            .bind(&binding.resource)
            .bind(&binding.role)
            .bind(&binding.namespace)
            .bind(&binding.effect)
            .bind(&binding.context)
            .bind(i64::from(binding.internal))
            .execute(&mut *tx)
            .await
            .map_err(|err| StorageError::Write(err.to_string()))?;
            inserted += result.rows_affected();
        }
        tx.commit().await.map_err(|err| StorageError::Write(err.to_string()))?;
        Ok(inserted)
    }

    async fn list_actions(&self) -> Result<Vec<ActionRow>, StorageError> {
        let rows = sqlx::query("SELECT action, internal FROM actions")
            .fetch_all(&self.pool)
            .await
            .map_err(|err| StorageError::Read(err.to_string()))?;
        Ok(rows
            .iter()
            .map(|row| {
                let internal: i64 = row.get("internal");
                ActionRow {
                    name: row.get("action"),
                    internal: internal != 0,
                }
            })
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn temp_backend() -> SqliteBackend {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.into_path().join("policy.db");
        SqliteBackend::connect(path.to_str().unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn add_grant_is_idempotent_across_rows_affected() {
        let backend = temp_backend().await;
        let row = GrantRow::new("editor", "component:view", "acme");
        assert!(backend.add_grant(&row).await.unwrap());
        assert!(!backend.add_grant(&row).await.unwrap());
        assert!(backend.has_grant(&row).await.unwrap());
    }

    #[tokio::test]
    async fn update_binding_rolls_back_when_old_missing() {
        let backend = temp_backend().await;
        let old = BindingRow::new("groups:devs", "*", "editor", "acme", "allow", "");
        let new = BindingRow::new("groups:devs", "*", "editor", "acme", "deny", "");
        assert!(!backend.update_binding(&old, &new).await.unwrap());
        assert!(!backend.has_binding(&new).await.unwrap());
    }

    #[tokio::test]
    async fn seed_actions_counts_only_new_rows() {
        let backend = temp_backend().await;
        let rows = vec![ActionRow::new("component:view", true), ActionRow::new("component:create", true)];
        assert_eq!(backend.seed_actions(&rows).await.unwrap(), 2);
        assert_eq!(backend.seed_actions(&rows).await.unwrap(), 0);
        assert_eq!(backend.list_actions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn filtered_bindings_uses_column_index() {
        let backend = temp_backend().await;
        backend
            .add_binding(&BindingRow::new("groups:devs", "ns/acme", "editor", "acme", "allow", ""))
            .await
            .unwrap();
        backend
            .add_binding(&BindingRow::new("groups:ops", "ns/acme", "viewer", "acme", "allow", ""))
            .await
            .unwrap();

        let by_role = backend.filtered_bindings(BindingField::Role, "editor").await.unwrap();
        assert_eq!(by_role.len(), 1);
        assert_eq!(by_role[0].subject, "groups:devs");
    }
}
