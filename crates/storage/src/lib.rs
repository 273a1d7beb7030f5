use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite, Transaction,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::{
    domain::{NetId, NetStatus, PersonId},
    protocol::{NetForm, PersonForm},
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPerson {
    pub person_id: PersonId,
    pub name: Option<String>,
    pub phone_prefix: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredNet {
    pub net_id: NetId,
    pub gps_coordinates: String,
    pub estimated_size: String,
    pub status: NetStatus,
    pub reporter_id: Option<PersonId>,
    pub salvager_id: Option<PersonId>,
}

const NET_COLUMNS: &str =
    "id, gps_coordinates, estimated_size, status, reporter_id, salvager_id";

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Opens a unit of work. Dropping the returned handle without calling
    /// [`StorageTx::commit`] rolls every write back, but only once the
    /// connection is reused; prefer [`StorageTx::finish`].
    pub async fn begin(&self) -> Result<StorageTx> {
        let tx = self
            .pool
            .begin()
            .await
            .context("failed to open transaction")?;
        Ok(StorageTx { tx })
    }

    pub async fn load_net(&self, net_id: NetId) -> Result<Option<StoredNet>> {
        let row = sqlx::query(&format!("SELECT {NET_COLUMNS} FROM nets WHERE id = ?"))
            .bind(net_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(net_from_row).transpose()
    }

    pub async fn load_person(&self, person_id: PersonId) -> Result<Option<StoredPerson>> {
        let row = sqlx::query(
            "SELECT id, name, phone_prefix, phone_number FROM persons WHERE id = ?",
        )
        .bind(person_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| StoredPerson {
            person_id: PersonId(r.get::<i64, _>(0)),
            name: r.get::<Option<String>, _>(1),
            phone_prefix: r.get::<Option<String>, _>(2),
            phone_number: r.get::<Option<String>, _>(3),
        }))
    }

    /// Nets in insertion order, all statuses.
    pub async fn list_nets(&self) -> Result<Vec<StoredNet>> {
        let rows = sqlx::query(&format!("SELECT {NET_COLUMNS} FROM nets ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(net_from_row).collect()
    }

    /// Nets whose status is one of `statuses`, in insertion order.
    pub async fn list_nets_with_status(&self, statuses: &[NetStatus]) -> Result<Vec<StoredNet>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "SELECT {NET_COLUMNS} FROM nets WHERE status IN ({placeholders}) ORDER BY id ASC"
        );
        let mut query = sqlx::query(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(net_from_row).collect()
    }

    pub async fn count_persons(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM persons")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

pub struct StorageTx {
    tx: Transaction<'static, Sqlite>,
}

impl StorageTx {
    pub async fn insert_person(&mut self, person: &PersonForm) -> Result<PersonId> {
        let rec = sqlx::query(
            "INSERT INTO persons (name, phone_prefix, phone_number) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(person.name.as_deref())
        .bind(person.phone_prefix.as_deref())
        .bind(person.phone_number.as_deref())
        .fetch_one(&mut *self.tx)
        .await
        .context("failed to insert person")?;
        Ok(PersonId(rec.get::<i64, _>(0)))
    }

    pub async fn insert_net(
        &mut self,
        net: &NetForm,
        status: NetStatus,
        reporter_id: Option<PersonId>,
        salvager_id: Option<PersonId>,
    ) -> Result<NetId> {
        let rec = sqlx::query(
            "INSERT INTO nets (gps_coordinates, estimated_size, status, reporter_id, salvager_id)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&net.gps_coordinates)
        .bind(&net.estimated_size)
        .bind(status.as_str())
        .bind(reporter_id.map(|id| id.0))
        .bind(salvager_id.map(|id| id.0))
        .fetch_one(&mut *self.tx)
        .await
        .context("failed to insert net")?;
        Ok(NetId(rec.get::<i64, _>(0)))
    }

    /// Reads the current row inside the transaction.
    pub async fn find_net(&mut self, net_id: NetId) -> Result<Option<StoredNet>> {
        let row = sqlx::query(&format!("SELECT {NET_COLUMNS} FROM nets WHERE id = ?"))
            .bind(net_id.0)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(net_from_row).transpose()
    }

    /// Moves a net one lifecycle step in a single conditional update,
    /// attaching `salvager_id` when given. Returns false when no row is in
    /// `from`, either because the net is missing or because it has moved on.
    pub async fn advance_net(
        &mut self,
        net_id: NetId,
        from: NetStatus,
        to: NetStatus,
        salvager_id: Option<PersonId>,
    ) -> Result<bool> {
        let to = from.transition_to(to)?;
        let affected = sqlx::query(
            "UPDATE nets
             SET status = ?, salvager_id = COALESCE(?, salvager_id)
             WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(salvager_id.map(|id| id.0))
        .bind(net_id.0)
        .bind(from.as_str())
        .execute(&mut *self.tx)
        .await
        .with_context(|| format!("failed to update net {net_id}"))?
        .rows_affected();
        Ok(affected == 1)
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.context("failed to commit transaction")
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .context("failed to roll back transaction")
    }

    /// Commits when `result` is `Ok`, otherwise rolls back and returns the
    /// original error.
    pub async fn finish<T>(self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => match self.rollback().await {
                Ok(()) => Err(err),
                Err(rollback) => Err(err.context(format!("{rollback:#}"))),
            },
        }
    }
}

fn net_from_row(row: &SqliteRow) -> Result<StoredNet> {
    let status = row
        .try_get::<String, _>("status")?
        .parse::<NetStatus>()?;
    Ok(StoredNet {
        net_id: NetId(row.try_get::<i64, _>("id")?),
        gps_coordinates: row.try_get::<String, _>("gps_coordinates")?,
        estimated_size: row.try_get::<String, _>("estimated_size")?,
        status,
        reporter_id: row.try_get::<Option<i64>, _>("reporter_id")?.map(PersonId),
        salvager_id: row.try_get::<Option<i64>, _>("salvager_id")?.map(PersonId),
    })
}

/// Creates the directory holding a file-backed SQLite database. In-memory
/// and non-SQLite URLs are left alone.
pub fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(parent) = sqlite_path(database_url)
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
    else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(&parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() || path == ":memory:" {
        return None;
    }

    Some(PathBuf::from(path))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
