//! AvaTax REST v2 payloads.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{
    Address, AddressValidation, Company, EntityUseCode, JurisdictionDetail, LineItem, PingStatus,
    RefundRequest, ResultCode, TaxAddresses, TaxCode, TaxLineResult, TaxRequest, TaxResult,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddressInfo {
    pub line1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line3: Option<String>,
    pub city: String,
    pub region: String,
    pub country: String,
    pub postal_code: String,
}

impl From<&Address> for AddressInfo {
    fn from(address: &Address) -> Self {
        Self {
            line1: address.line1.clone(),
            line2: address.line2.clone().filter(|l| !l.is_empty()),
            line3: None,
            city: address.city.clone(),
            region: address.region.clone(),
            country: address.country.clone(),
            postal_code: address.postal_code.clone(),
        }
    }
}

impl AddressInfo {
    /// Applies validated fields onto a host address, keeping its identifier.
    pub fn apply_to(&self, address: &mut Address) {
        address.line1 = self.line1.clone();
        address.line2 = self.line2.clone();
        address.city = self.city.clone();
        address.region = self.region.clone();
        address.country = self.country.clone();
        address.postal_code = self.postal_code.clone();
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddressesModel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub single_location: Option<AddressInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ship_from: Option<AddressInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ship_to: Option<AddressInfo>,
}

impl From<&TaxAddresses> for AddressesModel {
    fn from(addresses: &TaxAddresses) -> Self {
        match addresses {
            TaxAddresses::SingleLocation(address) => Self {
                single_location: Some(address.into()),
                ship_from: None,
                ship_to: None,
            },
            TaxAddresses::ShipFromTo { ship_from, ship_to } => Self {
                single_location: None,
                ship_from: Some(ship_from.into()),
                ship_to: Some(ship_to.into()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineItemModel {
    pub number: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addresses: Option<AddressesModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_usage_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exemption_code: Option<String>,
    pub item_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub discounted: bool,
}

impl From<&LineItem> for LineItemModel {
    fn from(line: &LineItem) -> Self {
        Self {
            number: line.number.clone(),
            quantity: line.quantity,
            amount: line.amount,
            addresses: line.addresses.as_ref().map(Into::into),
            tax_code: line.tax_code.clone(),
            customer_usage_type: line.customer_usage_type.clone(),
            exemption_code: line.exemption_code.clone(),
            item_code: line.item_code.clone(),
            description: line.description.clone(),
            discounted: line.discounted,
        }
    }
}

/// Body of `POST /api/v2/transactions/create`
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionModel {
    #[serde(rename = "type")]
    pub document_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub company_code: String,
    pub date: NaiveDate,
    pub customer_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_usage_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exemption_no: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub discount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_order_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_identification_no: Option<String>,
    pub currency_code: String,
    pub addresses: AddressesModel,
    pub lines: Vec<LineItemModel>,
    pub commit: bool,
}

impl From<&TaxRequest> for CreateTransactionModel {
    fn from(request: &TaxRequest) -> Self {
        Self {
            document_type: request.document_type.to_string(),
            code: request.document_code.clone(),
            company_code: request.company_code.clone(),
            date: request.date,
            customer_code: request.customer_code.clone(),
            customer_usage_type: request.customer_usage_type.clone(),
            exemption_no: request.exemption_no.clone(),
            discount: request.discount,
            purchase_order_no: request.purchase_order_no.clone(),
            business_identification_no: request.business_identification_no.clone(),
            currency_code: request.currency_code.clone(),
            addresses: (&request.addresses).into(),
            lines: request.lines.iter().map(Into::into).collect(),
            commit: request.commit,
        }
    }
}

/// Body of the void endpoint
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VoidTransactionModel {
    pub code: String,
}

/// Body of the refund endpoint
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RefundTransactionModel {
    pub refund_transaction_code: String,
    pub refund_date: NaiveDate,
    pub refund_type: String,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub refund_percentage: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_code: Option<String>,
}

impl From<&RefundRequest> for RefundTransactionModel {
    fn from(refund: &RefundRequest) -> Self {
        Self {
            refund_transaction_code: refund.refund_transaction_code.clone(),
            refund_date: refund.refund_date,
            refund_type: refund.refund_type.to_string(),
            refund_percentage: refund.refund_percentage,
            reference_code: refund.reference_code.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetailModel {
    pub juris_name: Option<String>,
    pub juris_type: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub tax_name: Option<String>,
    #[serde(default)]
    pub rate: Decimal,
    #[serde(default)]
    pub tax: Decimal,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransactionLineModel {
    pub line_number: Option<String>,
    #[serde(default)]
    pub tax: Decimal,
    #[serde(default)]
    pub taxable_amount: Decimal,
    #[serde(default)]
    pub details: Vec<TransactionDetailModel>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AvaTaxMessage {
    pub summary: Option<String>,
    pub details: Option<String>,
    pub severity: Option<String>,
}

impl AvaTaxMessage {
    pub fn text(&self) -> String {
        match (&self.summary, &self.details) {
            (Some(summary), Some(details)) if !details.is_empty() => {
                format!("{} {}", summary, details)
            }
            (Some(summary), _) => summary.clone(),
            (None, Some(details)) => details.clone(),
            (None, None) => "Unspecified provider message".to_string(),
        }
    }

    fn is_error(&self) -> bool {
        matches!(self.severity.as_deref(), Some("Error") | Some("Exception"))
    }
}

/// Transaction returned by create, get, void and refund
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransactionModel {
    pub code: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub total_amount: Decimal,
    #[serde(default)]
    pub total_tax: Decimal,
    #[serde(default)]
    pub total_taxable: Decimal,
    #[serde(default)]
    pub lines: Vec<TransactionLineModel>,
    #[serde(default)]
    pub messages: Vec<AvaTaxMessage>,
}

impl From<TransactionModel> for TaxResult {
    fn from(model: TransactionModel) -> Self {
        let result_code = if model.messages.iter().any(AvaTaxMessage::is_error) {
            ResultCode::Error
        } else if model.messages.is_empty() {
            ResultCode::Success
        } else {
            ResultCode::Warning
        };

        let lines = model
            .lines
            .into_iter()
            .enumerate()
            .map(|(index, line)| {
                let details: Vec<JurisdictionDetail> = line
                    .details
                    .into_iter()
                    .map(|detail| JurisdictionDetail {
                        jurisdiction_name: detail.juris_name,
                        jurisdiction_type: detail.juris_type,
                        country: detail.country,
                        region: detail.region,
                        tax_name: detail.tax_name,
                        rate: detail.rate,
                        tax: detail.tax,
                    })
                    .collect();
                TaxLineResult {
                    line_number: line
                        .line_number
                        .unwrap_or_else(|| (index + 1).to_string()),
                    rate: details.iter().map(|d| d.rate).sum(),
                    taxable_amount: line.taxable_amount,
                    tax: line.tax,
                    details,
                }
            })
            .collect();

        TaxResult {
            result_code,
            document_code: model.code,
            total_amount: model.total_amount,
            total_taxable: model.total_taxable,
            total_tax: model.total_tax,
            lines,
            messages: model.messages.iter().map(AvaTaxMessage::text).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub code: Option<String>,
    pub message: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub code: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub details: Vec<ErrorDetail>,
}

/// Structured error body returned with non-2xx statuses
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResult {
    pub error: ErrorInfo,
}

impl ErrorResult {
    /// `"{code} - {message}"` followed by one message per detail.
    pub fn messages(&self) -> Vec<String> {
        let mut messages = vec![format!(
            "{} - {}",
            self.error.code.as_deref().unwrap_or("UnknownError"),
            self.error.message.as_deref().unwrap_or("no message")
        )];
        messages.extend(self.error.details.iter().filter_map(|detail| {
            match (&detail.message, &detail.description) {
                (Some(message), Some(description)) if !description.is_empty() => {
                    Some(format!("{} ({})", message, description))
                }
                (Some(message), _) => Some(message.clone()),
                (None, Some(description)) => Some(description.clone()),
                (None, None) => None,
            }
        }));
        messages
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressResolutionModel {
    #[serde(default)]
    pub validated_addresses: Vec<AddressInfo>,
    #[serde(default)]
    pub messages: Vec<AvaTaxMessage>,
}

impl From<AddressResolutionModel> for AddressValidation {
    fn from(model: AddressResolutionModel) -> Self {
        let messages: Vec<String> = model
            .messages
            .iter()
            .filter(|m| m.is_error())
            .map(AvaTaxMessage::text)
            .collect();

        let validated = if messages.is_empty() {
            model.validated_addresses.first().map(|info| {
                let mut address = Address::default();
                info.apply_to(&mut address);
                address
            })
        } else {
            None
        };

        let messages = if validated.is_none() && messages.is_empty() {
            vec!["Address could not be validated".to_string()]
        } else {
            messages
        };

        AddressValidation { validated, messages }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResultModel {
    pub version: Option<String>,
    #[serde(default)]
    pub authenticated: bool,
    pub authenticated_account_id: Option<i64>,
}

impl From<PingResultModel> for PingStatus {
    fn from(model: PingResultModel) -> Self {
        PingStatus {
            version: model.version,
            authenticated: model.authenticated,
            authenticated_account_id: model.authenticated_account_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityUseCodeModel {
    pub code: String,
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub valid_countries: Vec<String>,
}

impl From<EntityUseCodeModel> for EntityUseCode {
    fn from(model: EntityUseCodeModel) -> Self {
        EntityUseCode {
            code: model.code,
            name: model.name,
            description: model.description,
            valid_countries: model.valid_countries,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyModel {
    pub id: i64,
    pub company_code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_active: bool,
}

impl From<CompanyModel> for Company {
    fn from(model: CompanyModel) -> Self {
        Company {
            id: model.id,
            company_code: model.company_code,
            name: model.name,
            is_default: model.is_default,
            is_active: model.is_active,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxCodeModel {
    #[serde(default)]
    pub id: i64,
    pub tax_code: String,
    pub tax_code_type_id: Option<String>,
    pub description: Option<String>,
    pub parent_tax_code: Option<String>,
    #[serde(default)]
    pub is_active: bool,
}

impl From<TaxCodeModel> for TaxCode {
    fn from(model: TaxCodeModel) -> Self {
        TaxCode {
            id: model.id,
            tax_code: model.tax_code,
            tax_code_type_id: model.tax_code_type_id,
            description: model.description,
            parent_tax_code: model.parent_tax_code,
            is_active: model.is_active,
        }
    }
}

/// Tax code types keyed by id, e.g. `P` => `Product`
#[derive(Debug, Clone, Deserialize)]
pub struct TaxCodeTypesModel {
    #[serde(default)]
    pub types: BTreeMap<String, String>,
}

/// Paged list wrapper used by definition endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct FetchResult<T> {
    #[serde(rename = "@recordsetCount", default)]
    pub recordset_count: i64,
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}
