//! Transport to the AvaTax REST API.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::errors::ServiceError;
use crate::models::{
    Address, AddressValidation, Company, EntityUseCode, PingStatus, RefundRequest, TaxCode,
    TaxRequest, TaxResult, VoidReason,
};

pub mod client;
pub mod dto;

pub use client::AvaTaxClient;

/// Countries whose addresses the provider can validate
pub const VALIDATION_COUNTRIES: [&str; 2] = ["US", "CA"];

/// Calls the tax provider.
///
/// A structured provider error comes back as `Ok` with an error
/// [`TaxResult`]; `Err` means the call failed or its answer was unreadable.
#[async_trait]
pub trait TaxTransport: Send + Sync {
    /// Creates a quote or, when the request's commit flag is set, records
    /// the transaction.
    async fn create_transaction(&self, request: &TaxRequest) -> Result<TaxResult, ServiceError>;

    async fn void_transaction(
        &self,
        document_code: &str,
        reason: VoidReason,
    ) -> Result<TaxResult, ServiceError>;

    async fn refund_transaction(
        &self,
        document_code: &str,
        refund: &RefundRequest,
    ) -> Result<TaxResult, ServiceError>;

    async fn resolve_address(&self, address: &Address) -> Result<AddressValidation, ServiceError>;

    async fn ping(&self) -> Result<PingStatus, ServiceError>;

    async fn list_entity_use_codes(&self) -> Result<Vec<EntityUseCode>, ServiceError>;

    /// Companies of the account, used to pick the company code.
    async fn list_companies(&self, active_only: bool) -> Result<Vec<Company>, ServiceError>;

    async fn list_tax_code_types(&self) -> Result<BTreeMap<String, String>, ServiceError>;

    /// System tax codes defined by the provider.
    async fn list_tax_codes(&self, active_only: bool) -> Result<Vec<TaxCode>, ServiceError>;

    async fn get_transaction(&self, document_code: &str) -> Result<TaxResult, ServiceError>;
}
