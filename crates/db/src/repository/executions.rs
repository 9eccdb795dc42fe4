//! Execution history repository functions.

use uuid::Uuid;

use crate::{DbError, DbPool, models::ExecutionRow};
use super::conflict_on_duplicate;

/// Append a finished execution record.
///
/// Records are never updated; inserting the same id twice is a conflict.
pub async fn insert_execution(pool: &DbPool, row: &ExecutionRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO executions
            (id, workflow_id, workflow_name, status, started_at, finished_at, record)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(row.id)
    .bind(row.workflow_id)
    .bind(&row.workflow_name)
    .bind(&row.status)
    .bind(row.started_at)
    .bind(row.finished_at)
    .bind(&row.record)
    .execute(pool)
    .await
    .map_err(|e| conflict_on_duplicate(e, &format!("execution {}", row.id)))?;

    Ok(())
}

/// Fetch one execution record by id.
pub async fn get_execution(pool: &DbPool, id: Uuid) -> Result<ExecutionRow, DbError> {
    let row = sqlx::query_as::<_, ExecutionRow>(
        r#"
        SELECT id, workflow_id, workflow_name, status, started_at, finished_at, record
        FROM executions
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// All records for one workflow, newest first.
pub async fn list_executions_for_workflow(
    pool: &DbPool,
    workflow_id: Uuid,
) -> Result<Vec<ExecutionRow>, DbError> {
    let rows = sqlx::query_as::<_, ExecutionRow>(
        r#"
        SELECT id, workflow_id, workflow_name, status, started_at, finished_at, record
        FROM executions
        WHERE workflow_id = ?
        ORDER BY started_at DESC, rowid DESC
        "#,
    )
    .bind(workflow_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::create_memory_pool;
    use chrono::{Duration, Utc};

    fn row(workflow_id: Uuid, offset_secs: i64) -> ExecutionRow {
        let started = Utc::now() + Duration::seconds(offset_secs);
        ExecutionRow {
            id: Uuid::new_v4(),
            workflow_id,
            workflow_name: "wf".into(),
            status: "completed".into(),
            started_at: started,
            finished_at: started,
            record: "{}".into(),
        }
    }

    #[tokio::test]
    async fn records_are_listed_newest_first_per_workflow() {
        let pool = create_memory_pool().await.unwrap();
        let wf = Uuid::new_v4();
        let other = Uuid::new_v4();

        let first = row(wf, 0);
        let second = row(wf, 10);
        insert_execution(&pool, &first).await.unwrap();
        insert_execution(&pool, &second).await.unwrap();
        insert_execution(&pool, &row(other, 5)).await.unwrap();

        let ids: Vec<Uuid> = list_executions_for_workflow(&pool, wf)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn records_are_append_only() {
        let pool = create_memory_pool().await.unwrap();
        let rec = row(Uuid::new_v4(), 0);
        insert_execution(&pool, &rec).await.unwrap();
        assert!(matches!(insert_execution(&pool, &rec).await, Err(DbError::Conflict(_))));
        assert_eq!(get_execution(&pool, rec.id).await.unwrap(), rec);
    }
}
