use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::models::{NewTaskRequest, OwnerId, Priority, Task, TaskId, UpdateTaskRequest};
use crate::store::{StoreError, TaskStore};

const TASK_COLUMNS: &str = "id, owner_id, title, description, due_at, priority, completed, tag, last_modified, deleted";

#[derive(Debug, FromRow)]
struct TaskRow {
    id: String,
    owner_id: i64,
    title: String,
    description: Option<String>,
    due_at: i64,
    priority: Option<String>,
    completed: bool,
    tag: String,
    last_modified: i64,
    deleted: bool,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let id = row
            .id
            .parse::<TaskId>()
            .map_err(|e| StoreError::Corrupt(format!("task id {}: {}", row.id, e)))?;
        let priority = match row.priority.as_deref() {
            None => None,
            Some(raw) => Some(Priority::parse(raw).ok_or_else(|| {
                StoreError::Corrupt(format!("task {}: unknown priority {}", id, raw))
            })?),
        };

        Ok(Task {
            id,
            owner_id: OwnerId::new(row.owner_id),
            title: row.title,
            description: row.description,
            due_at: from_micros(row.due_at, id, "due_at")?,
            priority,
            completed: row.completed,
            tag: row.tag,
            last_modified: from_micros(row.last_modified, id, "last_modified")?,
            deleted: row.deleted,
        })
    }
}

/// Timestamps are stored as microseconds, the resolution of the shared clock.
fn from_micros(us: i64, id: TaskId, column: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(us)
        .ok_or_else(|| StoreError::Corrupt(format!("task {}: {} out of range", id, column)))
}

fn rows_into_tasks(rows: Vec<TaskRow>) -> Result<Vec<Task>, StoreError> {
    rows.into_iter().map(Task::try_from).collect()
}

pub async fn find_task_by_id(db: &SqlitePool, id: TaskId) -> Result<Option<Task>, StoreError> {
    let row = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"
    ))
    .bind(id.to_string())
    .fetch_optional(db)
    .await?;

    row.map(Task::try_from).transpose()
}

/// Tasks the UI shows: tombstones hidden, soonest due first.
pub async fn fetch_visible_tasks(db: &SqlitePool, owner: OwnerId) -> Result<Vec<Task>, StoreError> {
    let rows = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE owner_id = ? AND deleted = 0 ORDER BY due_at ASC"
    ))
    .bind(owner.get())
    .fetch_all(db)
    .await?;

    rows_into_tasks(rows)
}

pub async fn fetch_all_tasks(db: &SqlitePool, owner: OwnerId) -> Result<Vec<Task>, StoreError> {
    let rows = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE owner_id = ? ORDER BY due_at ASC"
    ))
    .bind(owner.get())
    .fetch_all(db)
    .await?;

    rows_into_tasks(rows)
}

/// Case-insensitive substring match on title, description and tag.
pub async fn search_tasks(
    db: &SqlitePool,
    owner: OwnerId,
    query: &str,
    include_deleted: bool,
) -> Result<Vec<Task>, StoreError> {
    let query = query.trim();
    if query.is_empty() {
        return if include_deleted {
            fetch_all_tasks(db, owner).await
        } else {
            fetch_visible_tasks(db, owner).await
        };
    }

    let rows = sqlx::query_as::<_, TaskRow>(&format!(
        r#"
        SELECT {TASK_COLUMNS} FROM tasks
        WHERE owner_id = ?1
          AND (?3 OR deleted = 0)
          AND (instr(lower(title), lower(?2)) > 0
               OR instr(lower(coalesce(description, '')), lower(?2)) > 0
               OR instr(lower(tag), lower(?2)) > 0)
        ORDER BY due_at ASC
        "#
    ))
    .bind(owner.get())
    .bind(query)
    .bind(include_deleted)
    .fetch_all(db)
    .await?;

    rows_into_tasks(rows)
}

pub async fn tasks_modified_since(
    db: &SqlitePool,
    owner: OwnerId,
    since: DateTime<Utc>,
) -> Result<Vec<Task>, StoreError> {
    let rows = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE owner_id = ? AND last_modified > ? ORDER BY last_modified ASC"
    ))
    .bind(owner.get())
    .bind(since.timestamp_micros())
    .fetch_all(db)
    .await?;

    rows_into_tasks(rows)
}

pub async fn insert_task(db: &SqlitePool, task: &Task) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO tasks
            (id, owner_id, title, description, due_at, priority,
            completed, tag, last_modified, deleted)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(task.id.to_string())
    .bind(task.owner_id.get())
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.due_at.timestamp_micros())
    .bind(task.priority.map(|p| p.as_str()))
    .bind(task.completed)
    .bind(&task.tag)
    .bind(task.last_modified.timestamp_micros())
    .bind(task.deleted)
    .execute(db)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(StoreError::AlreadyExists(task.id))
        }
        Err(e) => Err(e.into()),
    }
}

/// Overwrites every column of an existing row, `last_modified` included.
pub async fn replace_task(db: &SqlitePool, task: &Task) -> Result<(), StoreError> {
    let affected = sqlx::query(
        r#"
        UPDATE tasks
        SET owner_id = ?1,
            title = ?2,
            description = ?3,
            due_at = ?4,
            priority = ?5,
            completed = ?6,
            tag = ?7,
            last_modified = ?8,
            deleted = ?9
        WHERE id = ?10
        "#,
    )
    .bind(task.owner_id.get())
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.due_at.timestamp_micros())
    .bind(task.priority.map(|p| p.as_str()))
    .bind(task.completed)
    .bind(&task.tag)
    .bind(task.last_modified.timestamp_micros())
    .bind(task.deleted)
    .bind(task.id.to_string())
    .execute(db)
    .await?
    .rows_affected();

    if affected == 0 {
        return Err(StoreError::NotFound(task.id));
    }
    Ok(())
}

/// Like `replace_task`, but only while the stored row is strictly older.
/// Returns false when the row is missing or already as new as `task`.
pub async fn replace_task_if_older(db: &SqlitePool, task: &Task) -> Result<bool, StoreError> {
    let affected = sqlx::query(
        r#"
        UPDATE tasks
        SET owner_id = ?1,
            title = ?2,
            description = ?3,
            due_at = ?4,
            priority = ?5,
            completed = ?6,
            tag = ?7,
            last_modified = ?8,
            deleted = ?9
        WHERE id = ?10 AND last_modified < ?8
        "#,
    )
    .bind(task.owner_id.get())
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.due_at.timestamp_micros())
    .bind(task.priority.map(|p| p.as_str()))
    .bind(task.completed)
    .bind(&task.tag)
    .bind(task.last_modified.timestamp_micros())
    .bind(task.deleted)
    .bind(task.id.to_string())
    .execute(db)
    .await?
    .rows_affected();

    Ok(affected > 0)
}

pub async fn create_task(
    db: &SqlitePool,
    owner: OwnerId,
    req: NewTaskRequest,
    now: DateTime<Utc>,
) -> Result<Task, StoreError> {
    let task = Task::new(owner, req, now);
    insert_task(db, &task).await?;
    debug!("created task {}", task.id);
    Ok(task)
}

pub async fn update_task(
    db: &SqlitePool,
    id: TaskId,
    req: UpdateTaskRequest,
    now: DateTime<Utc>,
) -> Result<Option<Task>, StoreError> {
    let Some(mut current) = find_live_task(db, id).await? else {
        return Ok(None);
    };

    current.apply_update(req, now);
    replace_task(db, &current).await?;
    Ok(Some(current))
}

pub async fn set_task_completed(
    db: &SqlitePool,
    id: TaskId,
    completed: bool,
    now: DateTime<Utc>,
) -> Result<Option<Task>, StoreError> {
    let Some(mut current) = find_live_task(db, id).await? else {
        return Ok(None);
    };

    current.set_completed(completed, now);
    replace_task(db, &current).await?;
    Ok(Some(current))
}

/// Tombstones the task. Rows are never physically removed.
pub async fn soft_delete_task(
    db: &SqlitePool,
    id: TaskId,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let Some(mut current) = find_live_task(db, id).await? else {
        return Ok(false);
    };

    current.mark_deleted(now);
    replace_task(db, &current).await?;
    debug!("tombstoned task {}", id);
    Ok(true)
}

async fn find_live_task(db: &SqlitePool, id: TaskId) -> Result<Option<Task>, StoreError> {
    Ok(find_task_by_id(db, id).await?.filter(|t| !t.deleted))
}

/// `TaskStore` over the local sqlite database.
#[derive(Clone)]
pub struct SqliteTaskStore {
    db: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn query_modified_since(
        &self,
        owner: OwnerId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Task>, StoreError> {
        tasks_modified_since(&self.db, owner, since).await
    }

    async fn get_by_id(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        find_task_by_id(&self.db, id).await
    }

    async fn insert(&self, task: &Task) -> Result<(), StoreError> {
        insert_task(&self.db, task).await
    }

    async fn update(&self, task: &Task) -> Result<(), StoreError> {
        replace_task(&self.db, task).await
    }

    async fn overwrite_if_older(&self, task: &Task) -> Result<bool, StoreError> {
        replace_task_if_older(&self.db, task).await
    }
}
