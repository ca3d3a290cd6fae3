use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::entities::tax_transaction_log::{self, Entity as TaxTransactionLog, LogType, Model};
use crate::errors::ServiceError;

/// Filter and page of a log search. Pages are numbered from zero.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LogSearch {
    pub customer_id: Option<i64>,
    pub log_type: Option<LogType>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub page_index: u64,
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 1000, message = "Page size must be between 1 and 1000"))]
    pub page_size: u64,
}

impl Default for LogSearch {
    fn default() -> Self {
        Self {
            customer_id: None,
            log_type: None,
            created_from: None,
            created_to: None,
            page_index: 0,
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> u64 {
    25
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPage {
    pub records: Vec<Model>,
    pub total: u64,
    pub page_index: u64,
    pub page_size: u64,
}

/// Append-only audit trail of provider traffic.
///
/// Records are never updated; they can only be deleted one by one or all
/// at once.
#[derive(Clone)]
pub struct TransactionLogService {
    db: Arc<DatabaseConnection>,
}

impl TransactionLogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, message))]
    pub async fn append(
        &self,
        log_type: LogType,
        message: String,
        customer_id: Option<i64>,
        correlation_id: Option<Uuid>,
    ) -> Result<Model, ServiceError> {
        let record = tax_transaction_log::ActiveModel {
            log_type: Set(log_type),
            message: Set(message),
            customer_id: Set(customer_id),
            correlation_id: Set(correlation_id),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        record.insert(&*self.db).await.map_err(|e| {
            error!(error = %e, %log_type, "Failed to append tax transaction log record");
            ServiceError::DatabaseError(e)
        })
    }

    pub async fn find_by_id(&self, id: i32) -> Result<Option<Model>, ServiceError> {
        TaxTransactionLog::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Newest records first; records created in the same instant come in
    /// reverse insertion order.
    #[instrument(skip(self))]
    pub async fn search(&self, search: &LogSearch) -> Result<LogPage, ServiceError> {
        search.validate()?;

        let mut query = TaxTransactionLog::find();
        if let Some(customer_id) = search.customer_id {
            query = query.filter(tax_transaction_log::Column::CustomerId.eq(customer_id));
        }
        if let Some(log_type) = search.log_type {
            query = query.filter(tax_transaction_log::Column::LogType.eq(log_type));
        }
        if let Some(created_from) = search.created_from {
            query = query.filter(tax_transaction_log::Column::CreatedAt.gte(created_from));
        }
        if let Some(created_to) = search.created_to {
            query = query.filter(tax_transaction_log::Column::CreatedAt.lte(created_to));
        }

        let paginator = query
            .order_by_desc(tax_transaction_log::Column::CreatedAt)
            .order_by_desc(tax_transaction_log::Column::Id)
            .paginate(&*self.db, search.page_size);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count tax transaction log records");
            ServiceError::DatabaseError(e)
        })?;

        let records = paginator.fetch_page(search.page_index).await.map_err(|e| {
            error!(error = %e, page_index = search.page_index, "Failed to fetch tax transaction log page");
            ServiceError::DatabaseError(e)
        })?;

        Ok(LogPage {
            records,
            total,
            page_index: search.page_index,
            page_size: search.page_size,
        })
    }

    /// Records sharing a correlation id, oldest first.
    pub async fn find_correlated(&self, correlation_id: Uuid) -> Result<Vec<Model>, ServiceError> {
        TaxTransactionLog::find()
            .filter(tax_transaction_log::Column::CorrelationId.eq(correlation_id))
            .order_by_asc(tax_transaction_log::Column::Id)
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Returns whether a record was removed.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> Result<bool, ServiceError> {
        let result = TaxTransactionLog::delete_by_id(id)
            .exec(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;
        Ok(result.rows_affected > 0)
    }

    /// Removes every record and returns how many there were.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<u64, ServiceError> {
        let result = TaxTransactionLog::delete_many()
            .exec(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;
        info!(deleted = result.rows_affected, "Tax transaction log cleared");
        Ok(result.rows_affected)
    }
}
