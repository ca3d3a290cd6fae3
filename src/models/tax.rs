use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::address::Address;

/// Whether a transaction is a throwaway quote or a recordable invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum DocumentType {
    /// Estimate, never recorded by the provider
    SalesOrder,
    /// Recordable sale
    SalesInvoice,
    /// Refund of a recorded sale
    ReturnInvoice,
}

/// Either a single location or an origin/destination pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxAddresses {
    SingleLocation(Address),
    ShipFromTo { ship_from: Address, ship_to: Address },
}

impl TaxAddresses {
    /// The address tax is charged for.
    pub fn destination(&self) -> &Address {
        match self {
            TaxAddresses::SingleLocation(address) => address,
            TaxAddresses::ShipFromTo { ship_to, .. } => ship_to,
        }
    }

    pub fn destination_mut(&mut self) -> &mut Address {
        match self {
            TaxAddresses::SingleLocation(address) => address,
            TaxAddresses::ShipFromTo { ship_to, .. } => ship_to,
        }
    }

    pub fn origin(&self) -> Option<&Address> {
        match self {
            TaxAddresses::SingleLocation(_) => None,
            TaxAddresses::ShipFromTo { ship_from, .. } => Some(ship_from),
        }
    }

    /// Every address of the set, origin first.
    pub fn all_mut(&mut self) -> Vec<&mut Address> {
        match self {
            TaxAddresses::SingleLocation(address) => vec![address],
            TaxAddresses::ShipFromTo { ship_from, ship_to } => vec![ship_from, ship_to],
        }
    }
}

/// One taxable component of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub number: String,
    /// SKU or a synthetic key such as `shipping` or `payment`
    pub item_code: String,
    pub amount: Decimal,
    pub quantity: Decimal,
    pub description: Option<String>,
    pub tax_code: Option<String>,
    pub exemption_code: Option<String>,
    pub customer_usage_type: Option<String>,
    /// Overrides the request-level addresses for this line only
    pub addresses: Option<TaxAddresses>,
    pub discounted: bool,
}

impl LineItem {
    pub fn new(number: impl Into<String>, item_code: impl Into<String>, amount: Decimal) -> Self {
        Self {
            number: number.into(),
            item_code: item_code.into(),
            amount,
            quantity: Decimal::ONE,
            description: None,
            tax_code: None,
            exemption_code: None,
            customer_usage_type: None,
            addresses: None,
            discounted: false,
        }
    }
}

/// Provider-agnostic tax calculation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRequest {
    pub company_code: String,
    pub document_type: DocumentType,
    /// Stable key for committed transactions, reused by void and refund
    pub document_code: Option<String>,
    pub customer_code: String,
    pub date: NaiveDate,
    pub currency_code: String,
    pub addresses: TaxAddresses,
    pub lines: Vec<LineItem>,
    pub exemption_no: Option<String>,
    pub customer_usage_type: Option<String>,
    pub purchase_order_no: Option<String>,
    pub business_identification_no: Option<String>,
    /// Order-level discount spread by the provider over lines marked `discounted`
    pub discount: Decimal,
    pub commit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum ResultCode {
    Success,
    Warning,
    Error,
    Exception,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurisdictionDetail {
    pub jurisdiction_name: Option<String>,
    pub jurisdiction_type: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub tax_name: Option<String>,
    /// Fractional rate, e.g. `0.065`
    pub rate: Decimal,
    pub tax: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxLineResult {
    pub line_number: String,
    pub rate: Decimal,
    pub taxable_amount: Decimal,
    pub tax: Decimal,
    pub details: Vec<JurisdictionDetail>,
}

/// Outcome of a provider call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxResult {
    pub result_code: ResultCode,
    pub document_code: Option<String>,
    pub total_amount: Decimal,
    pub total_taxable: Decimal,
    pub total_tax: Decimal,
    pub lines: Vec<TaxLineResult>,
    pub messages: Vec<String>,
}

impl TaxResult {
    /// A result carrying no amounts, only a status and messages.
    pub fn failure(result_code: ResultCode, messages: Vec<String>) -> Self {
        let messages = if messages.is_empty() {
            vec![format!("Tax provider returned {}", result_code)]
        } else {
            messages
        };

        Self {
            result_code,
            document_code: None,
            total_amount: Decimal::ZERO,
            total_taxable: Decimal::ZERO,
            total_tax: Decimal::ZERO,
            lines: Vec::new(),
            messages,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result_code == ResultCode::Success
    }

    /// The total tax, available only when the call succeeded.
    pub fn usable_tax(&self) -> Option<Decimal> {
        self.is_success().then_some(self.total_tax)
    }

    /// Messages joined for display or logging.
    pub fn error_summary(&self) -> String {
        self.messages.join("; ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum VoidReason {
    /// Order cancelled, provider code `DocVoided`
    Voided,
    /// Order deleted, provider code `DocDeleted`
    Deleted,
}

impl VoidReason {
    pub fn provider_code(&self) -> &'static str {
        match self {
            VoidReason::Voided => "DocVoided",
            VoidReason::Deleted => "DocDeleted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum RefundType {
    Full,
    Percentage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    /// Document code of the new return transaction
    pub refund_transaction_code: String,
    pub refund_date: NaiveDate,
    pub refund_type: RefundType,
    pub refund_percentage: Option<Decimal>,
    pub reference_code: Option<String>,
}

/// Result of a provider address resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressValidation {
    pub validated: Option<Address>,
    pub messages: Vec<String>,
}

impl AddressValidation {
    pub fn is_valid(&self) -> bool {
        self.validated.is_some() && self.messages.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingStatus {
    pub version: Option<String>,
    pub authenticated: bool,
    pub authenticated_account_id: Option<i64>,
}

/// Provider-defined reason a sale is exempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityUseCode {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub valid_countries: Vec<String>,
}

/// Company registered under the provider account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub company_code: String,
    pub name: String,
    pub is_default: bool,
    pub is_active: bool,
}

/// Provider-defined tax code, the category a product is taxed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxCode {
    pub id: i64,
    pub tax_code: String,
    /// Key into the tax code types, e.g. `P` for physical goods
    pub tax_code_type_id: Option<String>,
    pub description: Option<String>,
    pub parent_tax_code: Option<String>,
    pub is_active: bool,
}
