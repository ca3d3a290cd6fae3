// Tax adapter services
pub mod request_mapper;
pub mod tax_provider;
pub mod transaction_log;

pub use request_mapper::RequestMapper;
pub use tax_provider::{build_provider, AvalaraTaxProvider, TaxProvider};
pub use transaction_log::{LogPage, LogSearch, TransactionLogService};
