use std::num::NonZeroUsize;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{
    Alias, Expr, IntoIden, Order, Query, SelectStatement, SimpleExpr, TableRef,
};
use sea_orm::{ConnectionTrait, DatabaseConnection, FromQueryResult};

use super::{Extractor, Page};
use crate::error::Result;
use crate::model::SourceUserRecord;

const SOURCE_ALIAS: &str = "src";
const GRANT_ALIAS: &str = "acc";

#[derive(Debug, FromQueryResult)]
struct SourceRow {
    id: String,
    email: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_sign_in_at: Option<DateTime<Utc>>,
    email_confirmed_at: Option<DateTime<Utc>>,
    raw_user_meta_data: Option<serde_json::Value>,
    has_access: Option<bool>,
}

impl From<SourceRow> for SourceUserRecord {
    fn from(row: SourceRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_sign_in_at: row.last_sign_in_at,
            email_confirmed_at: row.email_confirmed_at,
            raw_user_meta_data: row.raw_user_meta_data,
            full_name: None,
            is_active: row.has_access,
        }
    }
}

/// Pages through the identity table ordered by `created_at`.
pub struct DatabaseExtractor {
    db: DatabaseConnection,
    table: String,
    access_table: Option<String>,
    page_size: NonZeroUsize,
    next_offset: u64,
    remaining: Option<u64>,
    exhausted: bool,
}

impl DatabaseExtractor {
    pub fn new(db: DatabaseConnection, table: impl Into<String>, page_size: NonZeroUsize) -> Self {
        Self {
            db,
            table: table.into(),
            access_table: None,
            page_size,
            next_offset: 0,
            remaining: None,
            exhausted: false,
        }
    }

    /// Select `EXISTS(... has_access = true)` from `table` as the access signal.
    pub fn with_access_table(mut self, table: impl Into<String>) -> Self {
        self.access_table = Some(table.into());
        self
    }

    /// Start after the first `count` rows of the ordering.
    pub fn skip(mut self, count: u64) -> Self {
        self.next_offset = count;
        self
    }

    /// Stop after `count` rows in total.
    pub fn limit(mut self, count: Option<u64>) -> Self {
        self.remaining = count;
        self
    }
}

#[async_trait]
impl Extractor for DatabaseExtractor {
    async fn next_page(&mut self) -> Result<Option<Page>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut limit = self.page_size.get() as u64;
        if let Some(remaining) = self.remaining {
            limit = limit.min(remaining);
        }
        if limit == 0 {
            self.exhausted = true;
            return Ok(None);
        }

        let offset = self.next_offset;
        let query = page_query(&self.table, self.access_table.as_deref(), limit, offset);
        let statement = self.db.get_database_backend().build(&query);
        let rows = SourceRow::find_by_statement(statement).all(&self.db).await?;
        let fetched = rows.len() as u64;
        tracing::info!(offset, fetched, "Fetched source page");

        self.next_offset += fetched;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= fetched;
        }
        if fetched < limit {
            self.exhausted = true;
        }
        if fetched == 0 {
            return Ok(None);
        }

        Ok(Some(Page {
            offset,
            records: rows.into_iter().map(SourceUserRecord::from).collect(),
            rejected: Vec::new(),
        }))
    }
}

/// One page of the source ordering, with the access signal projected as
/// `has_access` (NULL when no grant table is configured).
fn page_query(table: &str, access_table: Option<&str>, limit: u64, offset: u64) -> SelectStatement {
    let src = Alias::new(SOURCE_ALIAS);
    let column = |name: &str| (src.clone(), Alias::new(name));

    let mut query = Query::select();
    query
        .expr_as(
            SimpleExpr::from(Expr::col(column("id"))).cast_as(Alias::new("TEXT")),
            Alias::new("id"),
        )
        .column(column("email"))
        .column(column("created_at"))
        .column(column("updated_at"))
        .column(column("last_sign_in_at"))
        .column(column("email_confirmed_at"))
        .column(column("raw_user_meta_data"))
        .from_as(table_ref(table), src.clone())
        .order_by(column("created_at"), Order::Asc)
        .order_by(column("id"), Order::Asc)
        .limit(limit)
        .offset(offset);

    match access_table {
        Some(access_table) => {
            let acc = Alias::new(GRANT_ALIAS);
            let granted = Query::select()
                .expr(Expr::val(1))
                .from_as(table_ref(access_table), acc.clone())
                .and_where(Expr::col((acc.clone(), Alias::new("user_id"))).equals(column("id")))
                .and_where(Expr::col((acc, Alias::new("has_access"))).eq(true))
                .to_owned();
            query.expr_as(Expr::exists(granted), Alias::new("has_access"));
        }
        None => {
            query.expr_as(Expr::cust("NULL"), Alias::new("has_access"));
        }
    }

    query
}

/// `schema.table` or plain `table`.
fn table_ref(name: &str) -> TableRef {
    match name.split_once('.') {
        Some((schema, table)) => {
            TableRef::SchemaTable(Alias::new(schema).into_iden(), Alias::new(table).into_iden())
        }
        None => TableRef::Table(Alias::new(name).into_iden()),
    }
}
