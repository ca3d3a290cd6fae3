use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, instrument};

use crate::config::AvalaraConfig;
use crate::errors::ServiceError;
use crate::models::{
    Address, CalculateTaxRequest, Customer, DocumentType, LineItem, OrderSnapshot, Product,
    TaxAddresses, TaxBasedOn, TaxRequest,
};

/// Provider field limits, in characters
const MAX_ADDRESS_LINE: usize = 50;
const MAX_CITY: usize = 50;
const MAX_REGION: usize = 3;
const MAX_COUNTRY: usize = 2;
const MAX_POSTAL_CODE: usize = 11;
const MAX_CODE: usize = 50;
const MAX_SHORT_CODE: usize = 25;
const MAX_DESCRIPTION: usize = 2096;

pub const SHIPPING_ITEM_CODE: &str = "shipping";
pub const PAYMENT_ITEM_CODE: &str = "payment";
const RATE_LOOKUP_ITEM_CODE: &str = "rate-lookup";
const ANONYMOUS_CUSTOMER_CODE: &str = "anonymous";

/// Members of the European Union
const EU_COUNTRIES: [&str; 27] = [
    "AT", "BE", "BG", "HR", "CY", "CZ", "DK", "EE", "FI", "FR", "DE", "GR", "HU", "IE", "IT",
    "LV", "LT", "LU", "MT", "NL", "PL", "PT", "RO", "SK", "SI", "ES", "SE",
];

/// Builds provider requests from host orders and rate lookups.
///
/// Exemptions travel through one channel per line: a line carries either an
/// exemption code or a customer usage type, never both. Every string is cut
/// to the provider's documented maximum before it leaves this module.
#[derive(Debug, Clone)]
pub struct RequestMapper {
    config: Arc<AvalaraConfig>,
}

impl RequestMapper {
    pub fn new(config: Arc<AvalaraConfig>) -> Self {
        Self { config }
    }

    /// Request used to obtain a rate for one address.
    ///
    /// The single line has a nominal amount of 100, so the returned total
    /// tax reads directly as a percentage.
    #[instrument(skip(self, request), fields(store_id = request.store_id))]
    pub fn map_rate_request(&self, request: &CalculateTaxRequest) -> Result<TaxRequest, ServiceError> {
        let destination = request
            .address
            .as_ref()
            .filter(|address| !address.is_blank())
            .or_else(|| self.default_tax_address())
            .ok_or_else(|| {
                ServiceError::AddressMissing("Address is not set for the tax request".to_string())
            })?;

        let customer = request.customer.as_ref();
        let product = request.product.as_ref();

        let item_code = product
            .map(product_item_code)
            .unwrap_or_else(|| RATE_LOOKUP_ITEM_CODE.to_string());
        let mut line = LineItem::new("1", item_code, Decimal::ONE_HUNDRED);
        line.description = product.map(|p| p.name.clone());
        line.tax_code = product
            .and_then(|p| p.tax_code.clone())
            .or_else(|| request.tax_code.clone());
        apply_line_exemption(&mut line, product, customer);

        let mut tax_request = TaxRequest {
            company_code: self.config.company_code.clone(),
            document_type: DocumentType::SalesOrder,
            document_code: None,
            customer_code: customer_code(customer),
            date: Utc::now().date_naive(),
            currency_code: self.config.default_currency.clone(),
            addresses: self.addresses_for(destination),
            lines: vec![line],
            exemption_no: customer.and_then(customer_exemption),
            customer_usage_type: None,
            purchase_order_no: None,
            business_identification_no: None,
            discount: Decimal::ZERO,
            commit: false,
        };
        if tax_request.exemption_no.is_none() {
            tax_request.customer_usage_type = customer.and_then(customer_entity_use_code);
        }

        apply_field_limits(&mut tax_request);
        Ok(tax_request)
    }

    /// Request for the full tax of an order.
    #[instrument(skip(self, order), fields(order_number = %order.order_number))]
    pub fn map_order_request(
        &self,
        order: &OrderSnapshot,
        document_type: DocumentType,
        commit: bool,
    ) -> Result<TaxRequest, ServiceError> {
        let destination = self.resolve_destination(order).ok_or_else(|| {
            ServiceError::AddressMissing(format!(
                "No tax address could be resolved for order {}",
                order.order_number
            ))
        })?;

        let customer = &order.customer;
        let request_exemption = customer_exemption(customer);
        let mut lines = Vec::with_capacity(order.items.len() + order.checkout_attributes.len() + 2);

        for item in &order.items {
            let mut line = LineItem::new(
                next_line_number(&lines),
                product_item_code(&item.product),
                item.price_excl_tax,
            );
            line.quantity = Decimal::from(item.quantity);
            line.description = Some(
                item.product
                    .short_description
                    .clone()
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or_else(|| item.product.name.clone()),
            );
            line.tax_code = item.product.tax_code.clone();
            line.discounted = item.discounted;
            apply_line_exemption(&mut line, Some(&item.product), Some(customer));

            if let Some(billing) = self.cross_border_destination(order, &item.product) {
                line.addresses = Some(self.addresses_for(billing));
            }
            lines.push(line);
        }

        if !order.shipping_amount.is_zero() {
            let mut line = LineItem::new(
                next_line_number(&lines),
                SHIPPING_ITEM_CODE,
                order.shipping_amount,
            );
            line.description = Some("Shipping rate".to_string());
            line.tax_code = order.shipping_tax_code.clone();
            apply_line_exemption(&mut line, None, Some(customer));
            lines.push(line);
        }

        if !order.payment_fee.is_zero() {
            let mut line = LineItem::new(next_line_number(&lines), PAYMENT_ITEM_CODE, order.payment_fee);
            line.description = Some("Payment method additional fee".to_string());
            line.tax_code = order.payment_tax_code.clone();
            apply_line_exemption(&mut line, None, Some(customer));
            lines.push(line);
        }

        for attribute in &order.checkout_attributes {
            if attribute.price_adjustment.is_zero() {
                continue;
            }
            let mut line = LineItem::new(
                next_line_number(&lines),
                attribute.key.clone(),
                attribute.price_adjustment,
            );
            line.description = Some(attribute.name.clone());
            line.tax_code = attribute.tax_code.clone();
            apply_line_exemption(&mut line, None, Some(customer));
            lines.push(line);
        }

        let customer_usage_type = if request_exemption.is_none() {
            customer_entity_use_code(customer)
        } else {
            None
        };

        let mut tax_request = TaxRequest {
            company_code: self.config.company_code.clone(),
            document_type,
            document_code: Some(order.order_number.clone()),
            customer_code: customer_code(Some(customer)),
            date: order.created_at.date_naive(),
            currency_code: if order.currency_code.trim().is_empty() {
                self.config.default_currency.clone()
            } else {
                order.currency_code.clone()
            },
            addresses: self.addresses_for(destination),
            lines,
            exemption_no: request_exemption,
            customer_usage_type,
            purchase_order_no: order.purchase_order_no.clone(),
            business_identification_no: customer.vat_number.clone(),
            discount: order.discount_amount,
            commit,
        };

        apply_field_limits(&mut tax_request);
        debug!(lines = tax_request.lines.len(), "Order tax request mapped");
        Ok(tax_request)
    }

    /// Pickup point, then the configured tax basis, then the store default.
    pub fn resolve_destination<'a>(&'a self, order: &'a OrderSnapshot) -> Option<&'a Address> {
        let usable = |address: &&Address| !address.is_blank();

        if self.config.tax_based_on_pickup_point_address {
            if let Some(pickup) = order.pickup_address.as_ref().filter(usable) {
                return Some(pickup);
            }
        }

        let by_basis = match self.config.tax_based_on {
            TaxBasedOn::BillingAddress => order.billing_address.as_ref().filter(usable),
            // Orders without shipping are taxed at the billing address
            TaxBasedOn::ShippingAddress => order
                .shipping_address
                .as_ref()
                .filter(usable)
                .or_else(|| order.billing_address.as_ref().filter(usable)),
            TaxBasedOn::DefaultAddress => None,
        };

        by_basis.or_else(|| self.default_tax_address())
    }

    /// Billing address when the line must be taxed where an EU consumer lives.
    fn cross_border_destination<'a>(
        &self,
        order: &'a OrderSnapshot,
        product: &Product,
    ) -> Option<&'a Address> {
        if !self.config.eu_vat_rules_enabled
            || !product.is_telecommunications_or_electronic
            || !order.customer.is_individual_consumer
        {
            return None;
        }

        order
            .billing_address
            .as_ref()
            .filter(|billing| billing.is_in_any(&EU_COUNTRIES))
    }

    fn default_tax_address(&self) -> Option<&Address> {
        self.config
            .default_tax_address
            .as_ref()
            .filter(|address| !address.is_blank())
    }

    fn addresses_for(&self, destination: &Address) -> TaxAddresses {
        match self.config.origin_address().filter(|origin| !origin.is_blank()) {
            Some(origin) => TaxAddresses::ShipFromTo {
                ship_from: origin.clone(),
                ship_to: destination.clone(),
            },
            None => TaxAddresses::SingleLocation(destination.clone()),
        }
    }
}

fn next_line_number(lines: &[LineItem]) -> String {
    (lines.len() + 1).to_string()
}

fn product_item_code(product: &Product) -> String {
    product
        .sku
        .clone()
        .filter(|sku| !sku.trim().is_empty())
        .unwrap_or_else(|| product.id.to_string())
}

fn customer_code(customer: Option<&Customer>) -> String {
    match customer {
        Some(customer) if !customer.customer_code.trim().is_empty() => customer.customer_code.clone(),
        Some(customer) => customer.id.to_string(),
        None => ANONYMOUS_CUSTOMER_CODE.to_string(),
    }
}

/// Exemption of the customer itself, then of an exempt role.
pub fn customer_exemption(customer: &Customer) -> Option<String> {
    if customer.is_tax_exempt {
        return Some(format!("Exempt-customer-#{}", customer.id));
    }
    customer
        .exempt_role()
        .map(|role| format!("Exempt-{}", role.name))
}

/// Exemption for one line: product, then customer, then role.
pub fn line_exemption(product: Option<&Product>, customer: Option<&Customer>) -> Option<String> {
    match product {
        Some(product) if product.is_tax_exempt => Some(format!("Exempt-product-#{}", product.id)),
        _ => customer.and_then(customer_exemption),
    }
}

fn customer_entity_use_code(customer: &Customer) -> Option<String> {
    customer.entity_use_code.clone().or_else(|| {
        customer
            .roles
            .iter()
            .find_map(|role| role.entity_use_code.clone())
    })
}

fn apply_line_exemption(line: &mut LineItem, product: Option<&Product>, customer: Option<&Customer>) {
    line.exemption_code = line_exemption(product, customer);
    if line.exemption_code.is_none() {
        line.customer_usage_type = product
            .and_then(|p| p.entity_use_code.clone())
            .or_else(|| customer.and_then(customer_entity_use_code));
    }
}

/// Cuts `value` to at most `max` characters.
pub fn truncate(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((byte_index, _)) => value[..byte_index].to_string(),
        None => value.to_string(),
    }
}

fn truncate_in_place(value: &mut String, max: usize) {
    if let Some((byte_index, _)) = value.char_indices().nth(max) {
        value.truncate(byte_index);
    }
}

fn truncate_option(value: &mut Option<String>, max: usize) {
    if let Some(value) = value.as_mut() {
        truncate_in_place(value, max);
    }
}

fn limit_address(address: &mut Address) {
    truncate_in_place(&mut address.line1, MAX_ADDRESS_LINE);
    truncate_option(&mut address.line2, MAX_ADDRESS_LINE);
    truncate_in_place(&mut address.city, MAX_CITY);
    truncate_in_place(&mut address.region, MAX_REGION);
    truncate_in_place(&mut address.country, MAX_COUNTRY);
    truncate_in_place(&mut address.postal_code, MAX_POSTAL_CODE);
}

fn limit_addresses(addresses: &mut TaxAddresses) {
    match addresses {
        TaxAddresses::SingleLocation(address) => limit_address(address),
        TaxAddresses::ShipFromTo { ship_from, ship_to } => {
            limit_address(ship_from);
            limit_address(ship_to);
        }
    }
}

fn apply_field_limits(request: &mut TaxRequest) {
    truncate_in_place(&mut request.company_code, MAX_SHORT_CODE);
    truncate_option(&mut request.document_code, MAX_CODE);
    truncate_in_place(&mut request.customer_code, MAX_CODE);
    truncate_option(&mut request.exemption_no, MAX_SHORT_CODE);
    truncate_option(&mut request.customer_usage_type, MAX_SHORT_CODE);
    truncate_option(&mut request.purchase_order_no, MAX_CODE);
    truncate_option(&mut request.business_identification_no, MAX_SHORT_CODE);
    limit_addresses(&mut request.addresses);

    for line in &mut request.lines {
        truncate_in_place(&mut line.number, MAX_CODE);
        truncate_in_place(&mut line.item_code, MAX_CODE);
        truncate_option(&mut line.description, MAX_DESCRIPTION);
        truncate_option(&mut line.tax_code, MAX_SHORT_CODE);
        truncate_option(&mut line.exemption_code, MAX_SHORT_CODE);
        truncate_option(&mut line.customer_usage_type, MAX_SHORT_CODE);
        if let Some(addresses) = line.addresses.as_mut() {
            limit_addresses(addresses);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CheckoutAttribute, CustomerRole, OrderItem, TaxOriginAddressType};
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn config() -> AvalaraConfig {
        AvalaraConfig::with_credentials("1100012345", "ABCDEF")
    }

    fn mapper(config: AvalaraConfig) -> RequestMapper {
        RequestMapper::new(Arc::new(config))
    }

    fn product(id: i64, sku: &str) -> Product {
        Product {
            id,
            sku: Some(sku.to_string()),
            name: format!("Product {}", id),
            tax_code: Some("P0000000".to_string()),
            ..Default::default()
        }
    }

    fn customer() -> Customer {
        Customer {
            id: 42,
            customer_code: "c-42".to_string(),
            is_individual_consumer: true,
            ..Default::default()
        }
    }

    fn order() -> OrderSnapshot {
        OrderSnapshot {
            order_number: "1001".to_string(),
            store_id: 1,
            customer: customer(),
            billing_address: Some(Address::new("1 Billing Rd", "Austin", "TX", "US", "73301")),
            shipping_address: Some(Address::new("2 Ship Ave", "Seattle", "WA", "US", "98101")),
            pickup_address: None,
            items: vec![
                OrderItem {
                    product: product(1, "SKU-1"),
                    quantity: 2,
                    price_excl_tax: dec!(40),
                    discounted: false,
                },
                OrderItem {
                    product: product(2, "SKU-2"),
                    quantity: 1,
                    price_excl_tax: dec!(15),
                    discounted: true,
                },
            ],
            shipping_amount: dec!(10),
            shipping_tax_code: Some("FR020100".to_string()),
            payment_fee: dec!(0),
            payment_tax_code: None,
            checkout_attributes: vec![CheckoutAttribute {
                key: "gift-wrap".to_string(),
                name: "Gift wrapping".to_string(),
                price_adjustment: dec!(5),
                tax_code: None,
            }],
            discount_amount: dec!(0),
            order_total: dec!(70),
            order_tax: dec!(0),
            currency_code: "USD".to_string(),
            purchase_order_no: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn order_with_products_shipping_and_attribute_yields_four_lines() {
        let request = mapper(config())
            .map_order_request(&order(), DocumentType::SalesOrder, false)
            .unwrap();

        let codes: Vec<&str> = request.lines.iter().map(|l| l.item_code.as_str()).collect();
        assert_eq!(codes, vec!["SKU-1", "SKU-2", "shipping", "gift-wrap"]);
        let numbers: Vec<&str> = request.lines.iter().map(|l| l.number.as_str()).collect();
        assert_eq!(numbers, vec!["1", "2", "3", "4"]);
        assert_eq!(request.lines[0].quantity, dec!(2));
        assert!(request.lines[1].discounted);
    }

    #[test]
    fn free_checkout_attribute_adds_no_line() {
        let mut order = order();
        order.checkout_attributes.push(CheckoutAttribute {
            key: "card-message".to_string(),
            name: "Card message".to_string(),
            price_adjustment: dec!(0),
            tax_code: None,
        });

        let request = mapper(config())
            .map_order_request(&order, DocumentType::SalesOrder, false)
            .unwrap();
        let codes: Vec<&str> = request.lines.iter().map(|l| l.item_code.as_str()).collect();
        assert_eq!(codes, vec!["SKU-1", "SKU-2", "shipping", "gift-wrap"]);

        order.checkout_attributes.retain(|a| a.price_adjustment.is_zero());
        let request = mapper(config())
            .map_order_request(&order, DocumentType::SalesOrder, false)
            .unwrap();
        assert_eq!(request.lines.len(), 3);
    }

    #[test]
    fn payment_fee_adds_a_line_when_nonzero() {
        let mut order = order();
        order.payment_fee = dec!(2.5);
        order.shipping_amount = dec!(0);
        order.checkout_attributes.clear();

        let request = mapper(config())
            .map_order_request(&order, DocumentType::SalesOrder, false)
            .unwrap();
        assert_eq!(request.lines.len(), 3);
        assert_eq!(request.lines[2].item_code, PAYMENT_ITEM_CODE);
        assert_eq!(request.lines[2].amount, dec!(2.5));
    }

    #[test]
    fn document_code_and_commit_come_from_the_order() {
        let request = mapper(config())
            .map_order_request(&order(), DocumentType::SalesInvoice, true)
            .unwrap();
        assert_eq!(request.document_code.as_deref(), Some("1001"));
        assert_eq!(request.document_type, DocumentType::SalesInvoice);
        assert!(request.commit);
        assert_eq!(request.customer_code, "c-42");
    }

    #[test]
    fn destination_prefers_pickup_point() {
        let mut order = order();
        let pickup = Address::new("9 Pickup Pl", "Portland", "OR", "US", "97201");
        order.pickup_address = Some(pickup.clone());

        let request = mapper(config())
            .map_order_request(&order, DocumentType::SalesOrder, false)
            .unwrap();
        assert_eq!(request.addresses.destination(), &pickup);
    }

    #[test]
    fn destination_follows_tax_basis() {
        let mut cfg = config();
        cfg.tax_based_on = TaxBasedOn::BillingAddress;
        let request = mapper(cfg)
            .map_order_request(&order(), DocumentType::SalesOrder, false)
            .unwrap();
        assert_eq!(request.addresses.destination().city, "Austin");

        let request = mapper(config())
            .map_order_request(&order(), DocumentType::SalesOrder, false)
            .unwrap();
        assert_eq!(request.addresses.destination().city, "Seattle");
    }

    #[test]
    fn destination_falls_back_to_default_tax_address() {
        let mut cfg = config();
        cfg.tax_based_on = TaxBasedOn::DefaultAddress;
        cfg.default_tax_address = Some(Address::new("1 Store Way", "Irvine", "CA", "US", "92618"));

        let request = mapper(cfg)
            .map_order_request(&order(), DocumentType::SalesOrder, false)
            .unwrap();
        assert_eq!(request.addresses.destination().city, "Irvine");
    }

    #[test]
    fn missing_destination_is_reported() {
        let mut order = order();
        order.billing_address = None;
        order.shipping_address = None;

        let result = mapper(config()).map_order_request(&order, DocumentType::SalesOrder, false);
        assert_matches!(result, Err(ServiceError::AddressMissing(_)));
    }

    #[test]
    fn origin_configured_sends_ship_from_and_to() {
        let mut cfg = config();
        cfg.tax_origin_address_type = TaxOriginAddressType::ShippingOrigin;
        cfg.shipping_origin_address =
            Some(Address::new("5 Warehouse Blvd", "Reno", "NV", "US", "89501"));

        let request = mapper(cfg)
            .map_order_request(&order(), DocumentType::SalesOrder, false)
            .unwrap();
        assert_eq!(request.addresses.origin().map(|a| a.city.as_str()), Some("Reno"));

        let request = mapper(config())
            .map_order_request(&order(), DocumentType::SalesOrder, false)
            .unwrap();
        assert_matches!(request.addresses, TaxAddresses::SingleLocation(_));
    }

    #[test]
    fn customer_exemption_wins_over_role_exemption() {
        let mut order = order();
        order.customer.is_tax_exempt = true;
        order.customer.roles.push(CustomerRole {
            name: "Wholesale".to_string(),
            tax_exempt: true,
            entity_use_code: Some("G".to_string()),
        });

        let request = mapper(config())
            .map_order_request(&order, DocumentType::SalesOrder, false)
            .unwrap();
        assert_eq!(request.exemption_no.as_deref(), Some("Exempt-customer-#42"));
        assert_eq!(request.customer_usage_type, None);
    }

    #[test]
    fn role_exemption_applies_without_customer_exemption() {
        let mut order = order();
        order.customer.roles.push(CustomerRole {
            name: "Wholesale".to_string(),
            tax_exempt: true,
            entity_use_code: None,
        });

        let request = mapper(config())
            .map_order_request(&order, DocumentType::SalesOrder, false)
            .unwrap();
        assert_eq!(request.exemption_no.as_deref(), Some("Exempt-Wholesale"));
        assert!(request
            .lines
            .iter()
            .all(|l| l.exemption_code.as_deref() == Some("Exempt-Wholesale")));
    }

    #[test]
    fn product_exemption_wins_on_its_line() {
        let mut order = order();
        order.customer.is_tax_exempt = true;
        order.items[0].product.is_tax_exempt = true;

        let request = mapper(config())
            .map_order_request(&order, DocumentType::SalesOrder, false)
            .unwrap();
        assert_eq!(request.lines[0].exemption_code.as_deref(), Some("Exempt-product-#1"));
        assert_eq!(request.lines[1].exemption_code.as_deref(), Some("Exempt-customer-#42"));
    }

    #[test]
    fn a_line_never_carries_both_exemption_channels() {
        let mut order = order();
        order.customer.entity_use_code = Some("A".to_string());
        order.items[0].product.is_tax_exempt = true;
        order.items[1].product.entity_use_code = Some("E".to_string());

        let request = mapper(config())
            .map_order_request(&order, DocumentType::SalesOrder, false)
            .unwrap();
        assert_eq!(request.lines[0].customer_usage_type, None);
        assert_eq!(request.lines[1].customer_usage_type.as_deref(), Some("E"));
        assert_eq!(request.lines[2].customer_usage_type.as_deref(), Some("A"));
        for line in &request.lines {
            assert!(!(line.exemption_code.is_some() && line.customer_usage_type.is_some()));
        }
    }

    #[test]
    fn electronic_service_to_eu_consumer_is_taxed_at_billing_address() {
        let mut cfg = config();
        cfg.eu_vat_rules_enabled = true;
        let mut order = order();
        order.billing_address = Some(Address::new("Hauptstrasse 1", "Berlin", "BE", "DE", "10115"));
        order.items[0].product.is_telecommunications_or_electronic = true;

        let request = mapper(cfg)
            .map_order_request(&order, DocumentType::SalesOrder, false)
            .unwrap();
        let override_destination = request.lines[0]
            .addresses
            .as_ref()
            .map(|a| a.destination().country.clone());
        assert_eq!(override_destination.as_deref(), Some("DE"));
        assert!(request.lines[1].addresses.is_none());
    }

    #[test]
    fn cross_border_override_skips_businesses() {
        let mut cfg = config();
        cfg.eu_vat_rules_enabled = true;
        let mut order = order();
        order.customer.is_individual_consumer = false;
        order.billing_address = Some(Address::new("Rue 1", "Paris", "IDF", "FR", "75001"));
        order.items[0].product.is_telecommunications_or_electronic = true;

        let request = mapper(cfg)
            .map_order_request(&order, DocumentType::SalesOrder, false)
            .unwrap();
        assert!(request.lines[0].addresses.is_none());
    }

    #[test]
    fn long_fields_are_truncated_silently() {
        let mut order = order();
        order.order_number = "N".repeat(80);
        order.shipping_address = Some(Address::new(
            "L".repeat(70),
            "Seattle",
            "Washington",
            "USA",
            "98101-1234-5678",
        ));
        order.items[0].product.short_description = Some("d".repeat(3000));

        let request = mapper(config())
            .map_order_request(&order, DocumentType::SalesOrder, false)
            .unwrap();
        let destination = request.addresses.destination();
        assert_eq!(request.document_code.as_ref().map(|c| c.len()), Some(50));
        assert_eq!(destination.line1.len(), 50);
        assert_eq!(destination.region, "Was");
        assert_eq!(destination.country, "US");
        assert_eq!(destination.postal_code.len(), 11);
        assert_eq!(request.lines[0].description.as_ref().map(|d| d.len()), Some(2096));
    }

    #[test]
    fn rate_request_uses_single_nominal_line() {
        let request = mapper(config())
            .map_rate_request(&CalculateTaxRequest {
                address: Some(Address::new("1 Main St", "Seattle", "WA", "US", "98101")),
                customer: Some(customer()),
                product: None,
                tax_code: Some("P0000000".to_string()),
                store_id: 1,
            })
            .unwrap();

        assert_eq!(request.lines.len(), 1);
        assert_eq!(request.lines[0].amount, dec!(100));
        assert_eq!(request.lines[0].tax_code.as_deref(), Some("P0000000"));
        assert_eq!(request.document_type, DocumentType::SalesOrder);
        assert!(!request.commit);
    }

    #[test]
    fn rate_request_without_address_fails() {
        let result = mapper(config()).map_rate_request(&CalculateTaxRequest::default());
        assert_matches!(result, Err(ServiceError::AddressMissing(message)) if !message.is_empty());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("Zürich-Straße", 6), "Zürich");
        assert_eq!(truncate("short", 25), "short");
    }

    proptest! {
        #[test]
        fn truncate_never_exceeds_limit(value in "\\PC{0,120}", max in 0usize..60) {
            let cut = truncate(&value, max);
            prop_assert!(cut.chars().count() <= max);
            prop_assert!(value.starts_with(&cut));
        }
    }
}
