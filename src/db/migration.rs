use ::migration::{Migrator, MigratorTrait};
use sea_orm::DatabaseConnection;

use crate::error::Result;

/// Creates the target `user` and `account` tables if they are missing.
pub async fn run(db: &DatabaseConnection) -> Result<()> {
    let pending = Migrator::get_pending_migrations(db).await?.len();
    Migrator::up(db, None).await?;
    tracing::info!(applied = pending, "Target schema up to date");
    Ok(())
}
