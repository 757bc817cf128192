//! Insert statements shared by direct execution and SQL file output.

use entity::{account, user};
use sea_orm::sea_query::{
    Alias, Expr, InsertStatement, OnConflict, PostgresQueryBuilder, Query, SelectStatement,
    SimpleExpr, SqliteQueryBuilder,
};
use sea_orm::{ActiveEnum, ColumnTrait, DbErr};

use crate::config::SqlDialect;

const EXISTING: &str = "existing";

/// `INSERT INTO "user" … ON CONFLICT (supabase_user_id) DO NOTHING`.
///
/// The row is also withheld when its email already backs a credential
/// account, since that account can never be paired with this user.
pub fn insert_user(record: &user::Model) -> Result<InsertStatement, DbErr> {
    let unclaimed = Query::select()
        .expr(Expr::val(record.id.clone()))
        .expr(Expr::val(record.email.clone()))
        .expr(Expr::val(record.email_verified))
        .expr(Expr::val(record.image.clone()))
        .expr(Expr::val(record.name.clone()))
        .expr(Expr::val(record.created_at))
        .expr(Expr::val(record.updated_at))
        .expr(Expr::val(record.role.clone()))
        .expr(Expr::val(record.is_active))
        .expr(Expr::val(record.activation_status.to_value()))
        .expr(Expr::val(record.last_active_at))
        .expr(Expr::val(record.supabase_user_id.clone()))
        .expr(Expr::val(record.raw_user_meta_data.clone()))
        .and_where(
            Expr::exists(credential_where(
                account::Column::AccountId,
                Expr::val(record.email.clone()),
            ))
            .not(),
        )
        .to_owned();

    let mut insert = Query::insert();
    insert
        .into_table(user::Entity)
        .columns([
            user::Column::Id,
            user::Column::Email,
            user::Column::EmailVerified,
            user::Column::Image,
            user::Column::Name,
            user::Column::CreatedAt,
            user::Column::UpdatedAt,
            user::Column::Role,
            user::Column::IsActive,
            user::Column::ActivationStatus,
            user::Column::LastActiveAt,
            user::Column::SupabaseUserId,
            user::Column::RawUserMetaData,
        ])
        .select_from(unclaimed)
        .map_err(|e| DbErr::Custom(format!("user insert: {e}")))?;
    insert.on_conflict(
        OnConflict::column(user::Column::SupabaseUserId)
            .do_nothing()
            .to_owned(),
    );

    Ok(insert)
}

/// Inserts the credential account for the user row that holds `source_id`.
///
/// `user_id` is read from the `user` table rather than taken from `record`,
/// so the account links whichever row survived the user conflict-skip. A
/// user that already has a credential account gets no second one, even
/// when its email changed between waves.
pub fn insert_account(record: &account::Model, source_id: &str) -> Result<InsertStatement, DbErr> {
    let linked_user = Query::select()
        .expr(Expr::val(record.id.clone()))
        .expr(Expr::val(record.account_id.clone()))
        .expr(Expr::val(record.provider_id.clone()))
        .column((user::Entity, user::Column::Id))
        .expr(Expr::val(record.password.clone()))
        .expr(Expr::val(record.created_at))
        .expr(Expr::val(record.updated_at))
        .from(user::Entity)
        .and_where(user::Column::SupabaseUserId.eq(source_id))
        .and_where(
            Expr::exists(credential_where(
                account::Column::UserId,
                Expr::col((user::Entity, user::Column::Id)),
            ))
            .not(),
        )
        .to_owned();

    let mut insert = Query::insert();
    insert
        .into_table(account::Entity)
        .columns([
            account::Column::Id,
            account::Column::AccountId,
            account::Column::ProviderId,
            account::Column::UserId,
            account::Column::Password,
            account::Column::CreatedAt,
            account::Column::UpdatedAt,
        ])
        .select_from(linked_user)
        .map_err(|e| DbErr::Custom(format!("account insert: {e}")))?;
    insert.on_conflict(
        OnConflict::columns([account::Column::AccountId, account::Column::ProviderId])
            .do_nothing()
            .to_owned(),
    );

    Ok(insert)
}

/// `SELECT 1 FROM account AS existing WHERE existing.<column> = <value>
/// AND existing.provider_id = 'credential'`.
fn credential_where(column: account::Column, value: impl Into<SimpleExpr>) -> SelectStatement {
    let existing = Alias::new(EXISTING);
    Query::select()
        .expr(Expr::val(1))
        .from_as(account::Entity, existing.clone())
        .and_where(Expr::col((existing.clone(), column)).eq(value))
        .and_where(
            Expr::col((existing, account::Column::ProviderId))
                .eq(account::CREDENTIAL_PROVIDER),
        )
        .to_owned()
}

/// Render with values inlined and escaped for `dialect`.
pub fn render(statement: &InsertStatement, dialect: SqlDialect) -> String {
    match dialect {
        SqlDialect::Postgres => statement.to_string(PostgresQueryBuilder),
        SqlDialect::Sqlite => statement.to_string(SqliteQueryBuilder),
    }
}
