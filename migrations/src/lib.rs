pub use sea_orm_migration::prelude::*;

mod m20241020_000001_create_tax_transaction_log_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(
            m20241020_000001_create_tax_transaction_log_table::Migration,
        )]
    }
}
