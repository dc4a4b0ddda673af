use crate::{DbError, DbPool};

/// Seeds a project row. Project management lives outside the gateway; this
/// exists for fixtures and local setups.
pub async fn insert_project(pool: &DbPool, id: &str, name: &str) -> Result<(), DbError> {
    sqlx::query("INSERT INTO projects (id, name) VALUES ($1, $2)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn project_exists(pool: &DbPool, id: &str) -> Result<bool, DbError> {
    let found: Option<String> = sqlx::query_scalar("SELECT id FROM projects WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}
