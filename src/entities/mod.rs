pub mod tax_transaction_log;

pub use tax_transaction_log::{
    ActiveModel as TaxTransactionLogActiveModel, Entity as TaxTransactionLog, LogType,
    Model as TaxTransactionLogModel,
};
