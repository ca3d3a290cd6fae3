use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Category of a transaction log record.
///
/// Persisted as an integer; the values are stable.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
#[strum(ascii_case_insensitive)]
pub enum LogType {
    #[sea_orm(num_value = 1)]
    Error,
    #[sea_orm(num_value = 2)]
    Create,
    #[sea_orm(num_value = 3)]
    CreateResponse,
    #[sea_orm(num_value = 4)]
    Void,
    #[sea_orm(num_value = 5)]
    VoidResponse,
    #[sea_orm(num_value = 6)]
    Refund,
    #[sea_orm(num_value = 7)]
    RefundResponse,
}

impl LogType {
    /// Response category paired with a request category.
    pub fn response(self) -> LogType {
        match self {
            LogType::Create => LogType::CreateResponse,
            LogType::Void => LogType::VoidResponse,
            LogType::Refund => LogType::RefundResponse,
            other => other,
        }
    }
}

/// Audit record of one request, response or error exchanged with the provider
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tax_transaction_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub log_type: LogType,

    /// Outbound payload, response body or error description
    #[sea_orm(column_type = "Text")]
    pub message: String,

    pub customer_id: Option<i64>,

    /// Shared by the request and response records of one call
    pub correlation_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use sea_orm::ActiveEnum;
    use std::str::FromStr;

    #[rstest]
    #[case(LogType::Error, 1)]
    #[case(LogType::Create, 2)]
    #[case(LogType::CreateResponse, 3)]
    #[case(LogType::Void, 4)]
    #[case(LogType::VoidResponse, 5)]
    #[case(LogType::Refund, 6)]
    #[case(LogType::RefundResponse, 7)]
    fn log_type_integer_mapping_is_stable(#[case] log_type: LogType, #[case] value: i32) {
        assert_eq!(log_type.to_value(), value);
        assert_eq!(LogType::try_from_value(&value).ok(), Some(log_type));
    }

    #[test]
    fn log_type_parses_case_insensitively() {
        assert_eq!(LogType::from_str("voidresponse").ok(), Some(LogType::VoidResponse));
        assert_eq!(LogType::Create.response(), LogType::CreateResponse);
    }
}
