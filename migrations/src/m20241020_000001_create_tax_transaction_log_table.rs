use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20241020_000001_create_tax_transaction_log_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TaxTransactionLog::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TaxTransactionLog::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TaxTransactionLog::LogType).integer().not_null())
                    .col(ColumnDef::new(TaxTransactionLog::Message).text().not_null())
                    .col(ColumnDef::new(TaxTransactionLog::CustomerId).big_integer().null())
                    .col(ColumnDef::new(TaxTransactionLog::CorrelationId).uuid().null())
                    .col(
                        ColumnDef::new(TaxTransactionLog::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tax_transaction_log_created_at")
                    .table(TaxTransactionLog::Table)
                    .col(TaxTransactionLog::CreatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tax_transaction_log_customer_type")
                    .table(TaxTransactionLog::Table)
                    .col(TaxTransactionLog::CustomerId)
                    .col(TaxTransactionLog::LogType)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TaxTransactionLog::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TaxTransactionLog {
    Table,
    Id,
    LogType,
    Message,
    CustomerId,
    CorrelationId,
    CreatedAt,
}
