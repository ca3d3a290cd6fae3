use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::address::Address;
use super::tax::{ResultCode, TaxLineResult, TaxResult};

/// Which customer address determines the tax jurisdiction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxBasedOn {
    BillingAddress,
    #[default]
    ShippingAddress,
    DefaultAddress,
}

/// Which configured address is sent as ship-from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxOriginAddressType {
    #[default]
    DefaultTaxAddress,
    ShippingOrigin,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRole {
    pub name: String,
    pub tax_exempt: bool,
    pub entity_use_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    /// Stable code identifying the customer at the provider
    pub customer_code: String,
    pub is_tax_exempt: bool,
    pub entity_use_code: Option<String>,
    pub roles: Vec<CustomerRole>,
    /// Private person rather than a business
    pub is_individual_consumer: bool,
    pub vat_number: Option<String>,
}

impl Customer {
    /// First role that exempts its members from tax.
    pub fn exempt_role(&self) -> Option<&CustomerRole> {
        self.roles.iter().find(|role| role.tax_exempt)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub sku: Option<String>,
    pub name: String,
    pub short_description: Option<String>,
    pub is_tax_exempt: bool,
    /// Provider tax code assigned through the product's tax category
    pub tax_code: Option<String>,
    pub entity_use_code: Option<String>,
    /// Telecommunication, broadcasting or electronically supplied service
    pub is_telecommunications_or_electronic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product: Product,
    pub quantity: u32,
    /// Line total excluding tax
    pub price_excl_tax: Decimal,
    /// Whether the order-level discount applies to this line
    pub discounted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutAttribute {
    pub key: String,
    pub name: String,
    pub price_adjustment: Decimal,
    pub tax_code: Option<String>,
}

/// Snapshot of an order as seen by the tax adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    /// Order number, used as the provider document code
    pub order_number: String,
    pub store_id: i64,
    pub customer: Customer,
    pub billing_address: Option<Address>,
    pub shipping_address: Option<Address>,
    /// Set when the customer picks the order up at a pickup point
    pub pickup_address: Option<Address>,
    pub items: Vec<OrderItem>,
    pub shipping_amount: Decimal,
    pub shipping_tax_code: Option<String>,
    /// Payment method surcharge
    pub payment_fee: Decimal,
    pub payment_tax_code: Option<String>,
    pub checkout_attributes: Vec<CheckoutAttribute>,
    pub discount_amount: Decimal,
    pub order_total: Decimal,
    pub order_tax: Decimal,
    pub currency_code: String,
    pub purchase_order_no: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Minimal single-address rate request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculateTaxRequest {
    pub address: Option<Address>,
    pub customer: Option<Customer>,
    pub product: Option<Product>,
    /// Tax code of the requested tax category, used when no product is given
    pub tax_code: Option<String>,
    pub store_id: i64,
}

/// Rate lookup outcome: a percentage rate or the reasons it is unavailable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateResult {
    pub rate: Option<Decimal>,
    pub errors: Vec<String>,
}

impl RateResult {
    pub fn rate(rate: Decimal) -> Self {
        Self {
            rate: Some(rate),
            errors: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            rate: None,
            errors: vec![message.into()],
        }
    }

    pub fn errors(errors: Vec<String>) -> Self {
        Self { rate: None, errors }
    }

    pub fn is_success(&self) -> bool {
        self.rate.is_some() && self.errors.is_empty()
    }
}

/// Order tax figures handed down the pricing pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub result_code: ResultCode,
    pub document_code: Option<String>,
    pub total_tax: Decimal,
    pub total_taxable: Decimal,
    pub total_amount: Decimal,
    /// Tax amount per percentage rate
    pub tax_rates: BTreeMap<Decimal, Decimal>,
    pub lines: Vec<TaxLineResult>,
    pub messages: Vec<String>,
}

impl OrderTotals {
    pub fn from_result(result: TaxResult) -> Self {
        let mut tax_rates = BTreeMap::new();
        for line in &result.lines {
            let percent = (line.rate * Decimal::ONE_HUNDRED).normalize();
            *tax_rates.entry(percent).or_insert(Decimal::ZERO) += line.tax;
        }

        Self {
            result_code: result.result_code,
            document_code: result.document_code,
            total_tax: result.total_tax,
            total_taxable: result.total_taxable,
            total_amount: result.total_amount,
            tax_rates,
            lines: result.lines,
            messages: result.messages,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result_code == ResultCode::Success
    }

    pub fn usable_tax(&self) -> Option<Decimal> {
        self.is_success().then_some(self.total_tax)
    }
}
