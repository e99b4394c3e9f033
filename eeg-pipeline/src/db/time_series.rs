//! Time-series subject and point persistence

use eeg_common::db::{channel_columns, CHANNEL_COUNT};
use eeg_common::time::{from_micros, parse_rfc3339, to_micros};
use eeg_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::{DataPoint, PointQuery, Subject};
use crate::utils::retry_on_lock;

fn subject_from_row(row: &SqliteRow) -> Result<Subject> {
    let created_at: String = row.get("created_at");

    Ok(Subject {
        subject_label: row.get("subject_label"),
        age: row.get("age"),
        gender: row.get("gender"),
        condition: row.get("condition"),
        description: row.get("description"),
        created_at: parse_rfc3339("created_at", &created_at)?,
    })
}

fn point_from_row(row: &SqliteRow) -> DataPoint {
    let mut channels = [0.0; CHANNEL_COUNT];
    for (i, value) in channels.iter_mut().enumerate() {
        *value = row.get(2 + i);
    }

    DataPoint {
        time: from_micros(row.get("time_us")),
        subject_label: row.get("subject_label"),
        channels,
    }
}

fn point_select_sql() -> String {
    format!(
        "SELECT subject_label, time_us, {} FROM eeg_data_points",
        channel_columns().join(", ")
    )
}

/// Create the subject if absent; returns true when a row was created
pub async fn ensure_subject(
    pool: &SqlitePool,
    subject_label: &str,
    description: &str,
    max_wait_ms: u64,
) -> Result<bool> {
    let created_at = eeg_common::time::now().to_rfc3339();

    retry_on_lock("ensure_subject", max_wait_ms, || async {
        let done = sqlx::query(
            r#"
            INSERT INTO eeg_subjects (subject_label, description, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(subject_label) DO NOTHING
            "#,
        )
        .bind(subject_label)
        .bind(description)
        .bind(&created_at)
        .execute(pool)
        .await?;

        Ok(done.rows_affected() == 1)
    })
    .await
}

/// Insert one batch of points in a single transaction (all or nothing)
pub async fn insert_points(pool: &SqlitePool, points: &[DataPoint], max_wait_ms: u64) -> Result<u64> {
    if points.is_empty() {
        return Ok(0);
    }

    let columns = channel_columns();
    let placeholders = vec!["?"; CHANNEL_COUNT + 2].join(", ");
    let sql = format!(
        "INSERT INTO eeg_data_points (subject_label, time_us, {}) VALUES ({})",
        columns.join(", "),
        placeholders
    );

    retry_on_lock("insert_points", max_wait_ms, || async {
        let mut tx = pool.begin().await?;

        for point in points {
            let mut query = sqlx::query(&sql)
                .bind(&point.subject_label)
                .bind(to_micros(point.time));
            for value in point.channels {
                query = query.bind(value);
            }
            query.execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(points.len() as u64)
    })
    .await
}

pub async fn list_subjects(pool: &SqlitePool) -> Result<Vec<Subject>> {
    let rows = sqlx::query(
        r#"
        SELECT subject_label, age, gender, condition, description, created_at
        FROM eeg_subjects
        ORDER BY subject_label
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(subject_from_row).collect()
}

pub async fn load_subject(pool: &SqlitePool, subject_label: &str) -> Result<Option<Subject>> {
    let row = sqlx::query(
        r#"
        SELECT subject_label, age, gender, condition, description, created_at
        FROM eeg_subjects
        WHERE subject_label = ?
        "#,
    )
    .bind(subject_label)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(subject_from_row).transpose()
}

/// Points of one subject inside the optional window, ascending by time
pub async fn query_points(pool: &SqlitePool, query: &PointQuery) -> Result<Vec<DataPoint>> {
    let mut sql = point_select_sql();
    sql.push_str(" WHERE subject_label = ?");
    if query.start.is_some() {
        sql.push_str(" AND time_us >= ?");
    }
    if query.end.is_some() {
        sql.push_str(" AND time_us <= ?");
    }
    sql.push_str(" ORDER BY time_us ASC LIMIT ?");

    let mut q = sqlx::query(&sql).bind(&query.subject_label);
    if let Some(start) = query.start {
        q = q.bind(to_micros(start));
    }
    if let Some(end) = query.end {
        q = q.bind(to_micros(end));
    }
    let rows = q.bind(query.limit).fetch_all(pool).await?;

    Ok(rows.iter().map(point_from_row).collect())
}

pub async fn count_points(pool: &SqlitePool, subject_label: &str) -> Result<u64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM eeg_data_points WHERE subject_label = ?")
            .bind(subject_label)
            .fetch_one(pool)
            .await?;

    Ok(count.max(0) as u64)
}

/// Delete all points of a subject, then the subject itself
///
/// Returns `None` when the subject does not exist, else the number of points removed.
pub async fn purge_subject(
    pool: &SqlitePool,
    subject_label: &str,
    max_wait_ms: u64,
) -> Result<Option<u64>> {
    retry_on_lock("purge_subject", max_wait_ms, || async {
        let mut tx = pool.begin().await?;

        let points = sqlx::query("DELETE FROM eeg_data_points WHERE subject_label = ?")
            .bind(subject_label)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let subjects = sqlx::query("DELETE FROM eeg_subjects WHERE subject_label = ?")
            .bind(subject_label)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        Ok((subjects == 1).then_some(points))
    })
    .await
}
