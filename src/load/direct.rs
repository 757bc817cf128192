use async_trait::async_trait;
use entity::user;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QuerySelect, TransactionTrait,
};

use super::{statements, Applied, BatchOutcome, LoadCounts, Loader};
use crate::batch::Batch;
use crate::error::{MigrateError, Result, RowError};
use crate::model::MigratedUser;

/// Executes each batch inside one transaction on the target database.
pub struct DirectLoader {
    db: DatabaseConnection,
}

impl DirectLoader {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn apply_in(
        txn: &DatabaseTransaction,
        items: &[MigratedUser],
    ) -> std::result::Result<Staged, DbErr> {
        let backend = txn.get_database_backend();
        let mut staged = Staged::default();

        for item in items {
            let inserted = txn
                .execute(backend.build(&statements::insert_user(&item.user)?))
                .await?
                .rows_affected();

            let target_id = if inserted > 0 {
                staged.counts.users_inserted += 1;
                item.user.id.clone()
            } else if let Some(existing) = existing_user_id(txn, &item.source_id).await? {
                staged.counts.users_skipped += 1;
                tracing::info!(
                    source_id = %item.source_id,
                    target_id = %existing,
                    "User already present, skipped"
                );
                existing
            } else {
                let row = RowError::new(
                    item.position,
                    Some(item.source_id.clone()),
                    format!(
                        "email {} already has a credential account",
                        item.account.account_id
                    ),
                );
                tracing::warn!(%row, "Target refused row");
                staged.rejected.push(row);
                continue;
            };

            let account = statements::insert_account(&item.account, &item.source_id)?;
            if txn.execute(backend.build(&account)).await?.rows_affected() > 0 {
                staged.counts.accounts_inserted += 1;
            } else if inserted > 0 {
                tracing::warn!(
                    source_id = %item.source_id,
                    account_id = %item.account.account_id,
                    "Inserted user has no credential account"
                );
                return Err(DbErr::Custom(format!(
                    "credential account for {} was not inserted",
                    item.source_id
                )));
            } else {
                staged.counts.accounts_skipped += 1;
                tracing::info!(
                    account_id = %item.account.account_id,
                    "Credential account already present, skipped"
                );
            }

            staged.resolved.push((item.source_id.clone(), target_id));
        }

        Ok(staged)
    }
}

/// What one transaction did before commit.
#[derive(Default)]
struct Staged {
    counts: LoadCounts,
    resolved: Vec<(String, String)>,
    rejected: Vec<RowError>,
}

async fn existing_user_id(
    txn: &DatabaseTransaction,
    source_id: &str,
) -> std::result::Result<Option<String>, DbErr> {
    user::Entity::find()
        .select_only()
        .column(user::Column::Id)
        .filter(user::Column::SupabaseUserId.eq(source_id))
        .into_tuple::<String>()
        .one(txn)
        .await
}

#[async_trait]
impl Loader for DirectLoader {
    async fn apply(&mut self, batch: &Batch<MigratedUser>) -> Result<BatchOutcome> {
        let failed = |source: DbErr| MigrateError::BatchCommit {
            batch: batch.index,
            source,
        };

        let txn = self.db.begin().await.map_err(failed)?;
        // Dropping `txn` on error rolls the whole batch back.
        let staged = Self::apply_in(&txn, &batch.items).await.map_err(failed)?;
        txn.commit().await.map_err(failed)?;

        let counts = staged.counts;
        tracing::info!(
            batch = batch.index,
            users_inserted = counts.users_inserted,
            users_skipped = counts.users_skipped,
            accounts_inserted = counts.accounts_inserted,
            accounts_skipped = counts.accounts_skipped,
            refused = staged.rejected.len(),
            "Committed batch"
        );

        Ok(BatchOutcome {
            index: batch.index,
            rows: batch.len() - staged.rejected.len(),
            applied: Applied::Committed(counts),
            resolved_ids: staged.resolved,
            rejected: staged.rejected,
        })
    }
}
