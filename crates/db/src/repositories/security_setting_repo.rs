//! Repository for the `project_security_settings` mirror table.

use secinv_core::analyzer::SecuritySettingField;
use secinv_core::types::DbId;
use sqlx::PgPool;

/// Provides access to the boolean security settings of projects.
pub struct SecuritySettingRepo;

impl SecuritySettingRepo {
    /// Set one setting, creating the project's settings record if needed.
    pub async fn upsert(
        pool: &PgPool,
        project_id: DbId,
        field: SecuritySettingField,
        enabled: bool,
    ) -> Result<(), sqlx::Error> {
        let column = field.column();
        let query = format!(
            "INSERT INTO project_security_settings (project_id, {column}) \
             VALUES ($1, $2) \
             ON CONFLICT (project_id) \
             DO UPDATE SET {column} = EXCLUDED.{column}, updated_at = NOW()"
        );
        sqlx::query(&query)
            .bind(project_id)
            .bind(enabled)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// `(project_id, value)` of `field` for each project that has a
    /// settings record.
    pub async fn list_field(
        pool: &PgPool,
        project_ids: &[DbId],
        field: SecuritySettingField,
    ) -> Result<Vec<(DbId, bool)>, sqlx::Error> {
        let column = field.column();
        let query = format!(
            "SELECT project_id, {column} FROM project_security_settings \
             WHERE project_id = ANY($1) ORDER BY project_id"
        );
        sqlx::query_as::<_, (DbId, bool)>(&query)
            .bind(project_ids)
            .fetch_all(pool)
            .await
    }
}
