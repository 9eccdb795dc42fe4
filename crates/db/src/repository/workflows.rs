//! Workflow CRUD operations.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{DbError, DbPool, models::WorkflowRow};
use super::conflict_on_duplicate;

const SELECT_COLUMNS: &str = r#"
    SELECT id, name, description, definition, created, modified, execution_count, last_executed
    FROM workflows
"#;

/// Insert a new workflow row.
///
/// Returns `DbError::Conflict` if a row with the same id already exists.
pub async fn insert_workflow(pool: &DbPool, row: &WorkflowRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO workflows
            (id, name, description, definition, created, modified, execution_count, last_executed)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(row.id)
    .bind(&row.name)
    .bind(&row.description)
    .bind(&row.definition)
    .bind(row.created)
    .bind(row.modified)
    .bind(row.execution_count)
    .bind(row.last_executed)
    .execute(pool)
    .await
    .map_err(|e| conflict_on_duplicate(e, &format!("workflow {}", row.id)))?;

    Ok(())
}

/// Fetch a single workflow by its primary key.
pub async fn get_workflow(pool: &DbPool, id: Uuid) -> Result<WorkflowRow, DbError> {
    let row = sqlx::query_as::<_, WorkflowRow>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Return all workflows, most recently modified first.
pub async fn list_workflows(pool: &DbPool) -> Result<Vec<WorkflowRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
        "{SELECT_COLUMNS} ORDER BY modified DESC, rowid DESC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Overwrite the editable columns of a workflow.
///
/// The write only applies if the stored `modified` still equals
/// `previous_modified` (compare-and-swap). Counters are left untouched.
///
/// Returns `DbError::NotFound` if the row is gone and `DbError::Conflict` if
/// another writer got there first.
pub async fn update_workflow(
    pool: &DbPool,
    row: &WorkflowRow,
    previous_modified: DateTime<Utc>,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE workflows
        SET name = ?, description = ?, definition = ?, modified = ?
        WHERE id = ? AND modified = ?
        "#,
    )
    .bind(&row.name)
    .bind(&row.description)
    .bind(&row.definition)
    .bind(row.modified)
    .bind(row.id)
    .bind(previous_modified)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM workflows WHERE id = ?")
            .bind(row.id)
            .fetch_optional(&mut *tx)
            .await?;
        tx.rollback().await?;
        return Err(match exists {
            Some(_) => DbError::Conflict(format!("workflow {} was modified concurrently", row.id)),
            None => DbError::NotFound,
        });
    }

    tx.commit().await?;
    Ok(())
}

/// Atomically bump `execution_count` and set `last_executed`.
///
/// The increment happens inside SQL, so two runs finishing together both
/// count. Returns the updated row.
pub async fn increment_execution_count(
    pool: &DbPool,
    id: Uuid,
    executed_at: DateTime<Utc>,
) -> Result<WorkflowRow, DbError> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE workflows
        SET execution_count = execution_count + 1, last_executed = ?
        WHERE id = ?
        "#,
    )
    .bind(executed_at)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(DbError::NotFound);
    }

    let row = sqlx::query_as::<_, WorkflowRow>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(row)
}

/// Permanently delete a workflow by its primary key.
///
/// Returns `DbError::NotFound` if no row was deleted.
pub async fn delete_workflow(pool: &DbPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::create_memory_pool;
    use chrono::Duration;

    fn row(name: &str, modified: DateTime<Utc>) -> WorkflowRow {
        WorkflowRow {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            definition: r#"{"nodes":[],"edges":[]}"#.into(),
            created: modified,
            modified,
            execution_count: 0,
            last_executed: None,
        }
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let pool = create_memory_pool().await.unwrap();
        let wf = row("a", Utc::now());
        insert_workflow(&pool, &wf).await.unwrap();

        let fetched = get_workflow(&pool, wf.id).await.unwrap();
        assert_eq!(fetched, wf);
    }

    #[tokio::test]
    async fn duplicate_insert_is_a_conflict() {
        let pool = create_memory_pool().await.unwrap();
        let wf = row("a", Utc::now());
        insert_workflow(&pool, &wf).await.unwrap();
        assert!(matches!(insert_workflow(&pool, &wf).await, Err(DbError::Conflict(_))));
    }

    #[tokio::test]
    async fn list_is_most_recently_modified_first() {
        let pool = create_memory_pool().await.unwrap();
        let now = Utc::now();
        let old = row("old", now - Duration::hours(2));
        let new = row("new", now);
        let mid = row("mid", now - Duration::hours(1));
        for wf in [&old, &new, &mid] {
            insert_workflow(&pool, wf).await.unwrap();
        }

        let names: Vec<String> = list_workflows(&pool).await.unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn stale_update_is_rejected() {
        let pool = create_memory_pool().await.unwrap();
        let original = row("a", Utc::now());
        insert_workflow(&pool, &original).await.unwrap();

        let mut first = original.clone();
        first.name = "first".into();
        first.modified = original.modified + Duration::seconds(1);
        update_workflow(&pool, &first, original.modified).await.unwrap();

        let mut second = original.clone();
        second.name = "second".into();
        second.modified = original.modified + Duration::seconds(2);
        let err = update_workflow(&pool, &second, original.modified).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));

        assert_eq!(get_workflow(&pool, original.id).await.unwrap().name, "first");
    }

    #[tokio::test]
    async fn update_of_missing_row_is_not_found() {
        let pool = create_memory_pool().await.unwrap();
        let ghost = row("ghost", Utc::now());
        assert!(matches!(
            update_workflow(&pool, &ghost, ghost.modified).await,
            Err(DbError::NotFound)
        ));
    }

    #[tokio::test]
    async fn increment_bumps_counter_only() {
        let pool = create_memory_pool().await.unwrap();
        let wf = row("a", Utc::now());
        insert_workflow(&pool, &wf).await.unwrap();

        let at = Utc::now();
        increment_execution_count(&pool, wf.id, at).await.unwrap();
        let updated = increment_execution_count(&pool, wf.id, at).await.unwrap();

        assert_eq!(updated.execution_count, 2);
        assert_eq!(updated.last_executed, Some(at));
        assert_eq!(updated.modified, wf.modified);
    }

    #[tokio::test]
    async fn delete_missing_row_is_not_found() {
        let pool = create_memory_pool().await.unwrap();
        let wf = row("a", Utc::now());
        insert_workflow(&pool, &wf).await.unwrap();

        delete_workflow(&pool, wf.id).await.unwrap();
        assert!(matches!(delete_workflow(&pool, wf.id).await, Err(DbError::NotFound)));
        assert!(matches!(get_workflow(&pool, wf.id).await, Err(DbError::NotFound)));
    }
}
