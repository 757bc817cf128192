pub use sea_orm_migration::prelude::*;

mod m20251114_000001_create_user;
mod m20251114_000002_create_account;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20251114_000001_create_user::Migration),
            Box::new(m20251114_000002_create_account::Migration),
        ]
    }
}
