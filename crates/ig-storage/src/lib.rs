//! SQLite persistence for daily insight increments.
//!
//! Every write path follows the same shape: read the baseline sum for the
//! dimension key, reconcile the observed cumulative value against it, then
//! create or update today's record. The read-sum, compute, write sequence for
//! one key runs inside a single transaction, so a partial failure never
//! leaves a key half-applied and a sum query issued right after a write sees
//! that write.

use chrono::{DateTime, NaiveDate, Utc};
use ig_core::{
    reconcile, AccountDelta, AccountObservation, AudienceDimension, Delta, PostMetricsDelta,
    PostMetricsObservation, PostRecord,
};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use thiserror::Error;

pub const INSIGHTS_SCHEMA_VERSION: i64 = 1;

const ACCOUNT_METRIC_COLUMNS: [&str; 4] =
    ["followers", "reach", "accounts_engaged", "website_clicks"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("timestamp parse error: {0}")]
    Timestamp(String),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
}

/// One account row: the increments recorded for a single calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub id: i64,
    pub day: NaiveDate,
    pub username: String,
    pub followers: i64,
    pub reach: i64,
    pub accounts_engaged: i64,
    pub website_clicks: i64,
    pub updated_ts: DateTime<Utc>,
}

pub struct InsightsStore {
    conn: Connection,
}

impl InsightsStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        let current = self.schema_version()?;
        if current > INSIGHTS_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchemaVersion {
                found: current,
                supported: INSIGHTS_SCHEMA_VERSION,
            });
        }

        if current < 1 {
            let sql = include_str!("../migrations/0001_insights_schema.sql");
            self.conn.execute_batch(sql)?;
            self.conn
                .execute("PRAGMA user_version = 1", [])
                .map(|_| ())?;
        }

        Ok(())
    }

    /// Reconcile the four account metrics against their stored baselines and
    /// apply the increments to the row for `day`, creating it if absent.
    /// The username is fixed at row creation and not rewritten afterwards.
    pub fn apply_account_metrics(
        &mut self,
        day: NaiveDate,
        observed: &AccountObservation,
    ) -> Result<AccountDelta, StorageError> {
        let tx = self.conn.transaction()?;
        let day_text = day.to_string();

        let existing = tx
            .query_row(
                "
                SELECT id, followers, reach, accounts_engaged, website_clicks
                FROM account_snapshots
                WHERE day = ?1
                ",
                [&day_text],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        [
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, i64>(4)?,
                        ],
                    ))
                },
            )
            .optional()?;

        let observed_values = [
            observed.followers,
            observed.reach,
            observed.accounts_engaged,
            observed.website_clicks,
        ];
        let mut deltas = [Delta {
            increment: 0,
            today_value: 0,
            regressed: false,
        }; 4];
        for (index, column) in ACCOUNT_METRIC_COLUMNS.iter().enumerate() {
            let baseline = column_sum(&tx, "account_snapshots", column, "1 = 1", &[])?;
            let existing_today = existing.as_ref().map(|(_, values)| values[index]);
            deltas[index] = reconcile(observed_values[index], baseline, existing_today);
        }

        let now = Utc::now().to_rfc3339();
        match existing {
            Some((id, _)) => {
                tx.execute(
                    "
                    UPDATE account_snapshots
                    SET followers = ?1,
                        reach = ?2,
                        accounts_engaged = ?3,
                        website_clicks = ?4,
                        updated_ts = ?5
                    WHERE id = ?6
                    ",
                    params![
                        deltas[0].today_value,
                        deltas[1].today_value,
                        deltas[2].today_value,
                        deltas[3].today_value,
                        now,
                        id,
                    ],
                )?;
            }
            None => {
                tx.execute(
                    "
                    INSERT INTO account_snapshots (
                        day,
                        username,
                        followers,
                        reach,
                        accounts_engaged,
                        website_clicks,
                        created_ts,
                        updated_ts
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                    ",
                    params![
                        day_text,
                        observed.username,
                        deltas[0].today_value,
                        deltas[1].today_value,
                        deltas[2].today_value,
                        deltas[3].today_value,
                        now,
                    ],
                )?;
            }
        }
        tx.commit()?;

        Ok(AccountDelta {
            followers: deltas[0],
            reach: deltas[1],
            accounts_engaged: deltas[2],
            website_clicks: deltas[3],
        })
    }

    pub fn account_snapshot_for_day(
        &self,
        day: NaiveDate,
    ) -> Result<Option<AccountSnapshot>, StorageError> {
        let snapshot = self
            .conn
            .query_row(
                "
                SELECT id, day, username, followers, reach, accounts_engaged,
                       website_clicks, updated_ts
                FROM account_snapshots
                WHERE day = ?1
                ",
                [day.to_string()],
                |row| {
                    let day_raw: String = row.get(1)?;
                    let day = day_raw.parse::<NaiveDate>().map_err(|err| {
                        rusqlite::Error::FromSqlConversionFailure(
                            1,
                            rusqlite::types::Type::Text,
                            Box::new(err),
                        )
                    })?;
                    let updated_ts =
                        parse_timestamp_sql(row.get::<_, String>(7)?, 7)?;
                    Ok(AccountSnapshot {
                        id: row.get(0)?,
                        day,
                        username: row.get(2)?,
                        followers: row.get(3)?,
                        reach: row.get(4)?,
                        accounts_engaged: row.get(5)?,
                        website_clicks: row.get(6)?,
                        updated_ts,
                    })
                },
            )
            .optional()?;
        Ok(snapshot)
    }

    /// Reconcile one demographic bucket. The dimension key is
    /// `(dimension, dimension_value)`; its baseline spans all days and all
    /// snapshots, while today's record is unique per snapshot and day.
    pub fn apply_audience_count(
        &mut self,
        snapshot_id: i64,
        dimension: AudienceDimension,
        dimension_value: &str,
        day: NaiveDate,
        observed: i64,
    ) -> Result<Delta, StorageError> {
        let tx = self.conn.transaction()?;
        let day_text = day.to_string();

        let baseline = column_sum(
            &tx,
            "audience_breakdowns",
            "count",
            "dimension = ?1 AND dimension_value = ?2",
            &[&dimension.as_str(), &dimension_value],
        )?;
        let existing = tx
            .query_row(
                "
                SELECT id, count FROM audience_breakdowns
                WHERE snapshot_id = ?1 AND dimension = ?2
                  AND dimension_value = ?3 AND day = ?4
                ",
                params![snapshot_id, dimension.as_str(), dimension_value, day_text],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        let delta = reconcile(observed, baseline, existing.map(|(_, count)| count));
        let now = Utc::now().to_rfc3339();
        match existing {
            Some((id, _)) => {
                tx.execute(
                    "UPDATE audience_breakdowns SET count = ?1, updated_ts = ?2 WHERE id = ?3",
                    params![delta.today_value, now, id],
                )?;
            }
            None => {
                tx.execute(
                    "
                    INSERT INTO audience_breakdowns (
                        snapshot_id,
                        dimension,
                        dimension_value,
                        day,
                        count,
                        created_ts,
                        updated_ts
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                    ",
                    params![
                        snapshot_id,
                        dimension.as_str(),
                        dimension_value,
                        day_text,
                        delta.today_value,
                        now,
                    ],
                )?;
            }
        }
        tx.commit()?;
        Ok(delta)
    }

    /// Upsert-by-existence on the provider's post id. Attributes are fixed
    /// at first observation; re-fetching the same post never duplicates it.
    pub fn find_or_create_post(&mut self, record: &PostRecord) -> Result<i64, StorageError> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM posts WHERE post_id = ?1",
                [&record.post_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "
            INSERT INTO posts (post_id, media_type, media_url, created_date, created_ts, updated_ts)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ",
            params![
                record.post_id,
                record.media_type,
                record.media_url,
                record.created_date.map(|date| date.to_string()),
                now,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Reconcile a post's cumulative engagement counters into the snapshot
    /// row for `(post, day)`.
    pub fn apply_post_metrics(
        &mut self,
        post_ref: i64,
        day: NaiveDate,
        observed: &PostMetricsObservation,
    ) -> Result<PostMetricsDelta, StorageError> {
        let tx = self.conn.transaction()?;
        let day_text = day.to_string();

        let existing = tx
            .query_row(
                "
                SELECT id, reach, likes, saves FROM post_metric_snapshots
                WHERE post_ref = ?1 AND day = ?2
                ",
                params![post_ref, day_text],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        [
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, i64>(3)?,
                        ],
                    ))
                },
            )
            .optional()?;

        let observed_values = [observed.reach, observed.likes, observed.saves];
        let mut deltas = [Delta {
            increment: 0,
            today_value: 0,
            regressed: false,
        }; 3];
        for (index, column) in ["reach", "likes", "saves"].iter().enumerate() {
            let baseline = column_sum(
                &tx,
                "post_metric_snapshots",
                column,
                "post_ref = ?1",
                &[&post_ref],
            )?;
            let existing_today = existing.as_ref().map(|(_, values)| values[index]);
            deltas[index] = reconcile(observed_values[index], baseline, existing_today);
        }

        let now = Utc::now().to_rfc3339();
        match existing {
            Some((id, _)) => {
                tx.execute(
                    "
                    UPDATE post_metric_snapshots
                    SET reach = ?1, likes = ?2, saves = ?3, updated_ts = ?4
                    WHERE id = ?5
                    ",
                    params![
                        deltas[0].today_value,
                        deltas[1].today_value,
                        deltas[2].today_value,
                        now,
                        id,
                    ],
                )?;
            }
            None => {
                tx.execute(
                    "
                    INSERT INTO post_metric_snapshots (
                        post_ref, day, reach, likes, saves, created_ts, updated_ts
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                    ",
                    params![
                        post_ref,
                        day_text,
                        deltas[0].today_value,
                        deltas[1].today_value,
                        deltas[2].today_value,
                        now,
                    ],
                )?;
            }
        }
        tx.commit()?;

        Ok(PostMetricsDelta {
            reach: deltas[0],
            likes: deltas[1],
            saves: deltas[2],
        })
    }

    pub fn audience_sum(
        &self,
        dimension: AudienceDimension,
        dimension_value: &str,
    ) -> Result<i64, StorageError> {
        let sum = self.conn.query_row(
            "
            SELECT COALESCE(SUM(count), 0) FROM audience_breakdowns
            WHERE dimension = ?1 AND dimension_value = ?2
            ",
            params![dimension.as_str(), dimension_value],
            |row| row.get(0),
        )?;
        Ok(sum)
    }

    pub fn post_count(&self) -> Result<i64, StorageError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn post_metric_sums(&self, post_ref: i64) -> Result<(i64, i64, i64), StorageError> {
        let sums = self.conn.query_row(
            "
            SELECT COALESCE(SUM(reach), 0), COALESCE(SUM(likes), 0), COALESCE(SUM(saves), 0)
            FROM post_metric_snapshots
            WHERE post_ref = ?1
            ",
            [post_ref],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(sums)
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool, StorageError> {
        let exists = self
            .conn
            .query_row(
                "
                SELECT 1
                FROM sqlite_master
                WHERE type='table' AND name = ?1
                LIMIT 1
                ",
                [table_name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    #[cfg(test)]
    fn delete_account_snapshot(&self, id: i64) -> Result<(), StorageError> {
        self.conn
            .execute("DELETE FROM account_snapshots WHERE id = ?1", [id])?;
        Ok(())
    }

    #[cfg(test)]
    fn audience_row_count(&self) -> Result<i64, StorageError> {
        let count =
            self.conn
                .query_row("SELECT COUNT(*) FROM audience_breakdowns", [], |row| {
                    row.get(0)
                })?;
        Ok(count)
    }
}

fn column_sum(
    tx: &Transaction<'_>,
    table: &str,
    column: &str,
    filter: &str,
    filter_params: &[&dyn rusqlite::ToSql],
) -> Result<i64, StorageError> {
    let sql = format!("SELECT COALESCE(SUM({column}), 0) FROM {table} WHERE {filter}");
    let sum = tx.query_row(&sql, filter_params, |row| row.get(0))?;
    Ok(sum)
}

fn parse_timestamp_sql(value: String, column: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(&value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(err),
            )
        })
}
