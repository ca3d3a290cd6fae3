//! Domain types exchanged between the host application and the tax adapter.

pub mod address;
pub mod order;
pub mod tax;

pub use address::Address;
pub use order::{
    CalculateTaxRequest, CheckoutAttribute, Customer, CustomerRole, OrderItem, OrderSnapshot,
    OrderTotals, Product, RateResult, TaxBasedOn, TaxOriginAddressType,
};
pub use tax::{
    AddressValidation, Company, DocumentType, EntityUseCode, JurisdictionDetail, LineItem, PingStatus,
    RefundRequest, RefundType, ResultCode, TaxAddresses, TaxCode, TaxLineResult, TaxRequest, TaxResult,
    VoidReason,
};
