#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use stateset_avatax::{
    avatax::AvaTaxClient,
    cache::RateCache,
    config::AvalaraConfig,
    db,
    models::{Address, Customer, OrderItem, OrderSnapshot, Product},
    retry::RetryPolicy,
    services::{AvalaraTaxProvider, TransactionLogService},
};
use wiremock::MockServer;

/// `Basic` credentials for the test account below.
pub const AUTHORIZATION: &str = "Basic MTEwMDAxMjM0NTpBQkNERUY=";

/// Configuration pointing at a mock AvaTax server.
pub fn config_for(server: &MockServer) -> AvalaraConfig {
    let mut config = AvalaraConfig::with_credentials("1100012345", "ABCDEF");
    config.base_url = Some(server.uri());
    config.request_timeout_secs = 2;
    config
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
    }
}

pub fn client_for(config: &AvalaraConfig) -> AvaTaxClient {
    AvaTaxClient::new(config)
        .expect("configured client")
        .with_retry_policy(fast_retry())
}

/// Provider wired to the mock server with a fresh in-memory log.
pub async fn provider_for(config: AvalaraConfig) -> (AvalaraTaxProvider, TransactionLogService) {
    let pool = db::connect_and_migrate("sqlite::memory:")
        .await
        .expect("in-memory database");
    let log = TransactionLogService::new(Arc::new(pool));
    let client = client_for(&config);
    let provider = AvalaraTaxProvider::new(
        Arc::new(config),
        Arc::new(client),
        RateCache::in_memory(Duration::from_secs(60)),
        log.clone(),
    );
    (provider, log)
}

pub fn seattle() -> Address {
    Address::new("2 Ship Ave", "Seattle", "WA", "US", "98101")
}

pub fn order() -> OrderSnapshot {
    OrderSnapshot {
        order_number: "1001".to_string(),
        store_id: 1,
        customer: Customer {
            id: 42,
            customer_code: "c-42".to_string(),
            is_individual_consumer: true,
            ..Default::default()
        },
        billing_address: Some(Address::new("1 Billing Rd", "Austin", "TX", "US", "73301")),
        shipping_address: Some(seattle()),
        pickup_address: None,
        items: vec![OrderItem {
            product: Product {
                id: 1,
                sku: Some("SKU-1".into()),
                name: "Widget".into(),
                tax_code: Some("P0000000".into()),
                ..Default::default()
            },
            quantity: 1,
            price_excl_tax: dec!(90),
            discounted: false,
        }],
        shipping_amount: dec!(0),
        shipping_tax_code: None,
        payment_fee: dec!(0),
        payment_tax_code: None,
        checkout_attributes: vec![],
        discount_amount: dec!(0),
        order_total: dec!(100),
        order_tax: dec!(10),
        currency_code: "USD".to_string(),
        purchase_order_no: None,
        created_at: Utc::now(),
    }
}

/// A successful transaction body with one line at the given rate.
pub fn transaction_body(code: &str, taxable: f64, rate: f64) -> Value {
    let tax = (taxable * rate * 100.0).round() / 100.0;
    json!({
        "code": code,
        "status": "Saved",
        "totalAmount": taxable,
        "totalTaxable": taxable,
        "totalTax": tax,
        "lines": [{
            "lineNumber": "1",
            "taxableAmount": taxable,
            "tax": tax,
            "details": [{
                "jurisName": "WASHINGTON",
                "jurisType": "STA",
                "country": "US",
                "region": "WA",
                "taxName": "WA STATE TAX",
                "rate": rate,
                "tax": tax
            }]
        }]
    })
}

pub fn error_body(code: &str, message: &str) -> Value {
    json!({
        "error": {
            "code": code,
            "message": message,
            "details": []
        }
    })
}
