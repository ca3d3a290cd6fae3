use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::avatax::dto::CreateTransactionModel;
use crate::avatax::{AvaTaxClient, TaxTransport};
use crate::cache::RateCache;
use crate::config::AvalaraConfig;
use crate::entities::LogType;
use crate::errors::ServiceError;
use crate::models::{
    CalculateTaxRequest, DocumentType, OrderSnapshot, OrderTotals, RateResult, RefundRequest,
    RefundType, TaxResult, VoidReason,
};
use crate::services::request_mapper::{truncate, RequestMapper};
use crate::services::transaction_log::TransactionLogService;

const MAX_DOCUMENT_CODE: usize = 50;

/// Operations the host's pricing and order pipeline needs from a tax engine.
#[async_trait]
pub trait TaxProvider: Send + Sync {
    /// Percentage rate for a single address. Never fails; problems come
    /// back as error messages.
    async fn get_rate(&self, request: &CalculateTaxRequest) -> RateResult;

    /// Tax for a whole order. With `commit` the transaction is recorded at
    /// the provider under the order number.
    async fn get_order_tax(
        &self,
        order: &OrderSnapshot,
        commit: bool,
    ) -> Result<OrderTotals, ServiceError>;

    async fn void(&self, order: &OrderSnapshot, reason: VoidReason) -> Result<TaxResult, ServiceError>;

    /// Refunds `amount` of the order: in full when it equals the order
    /// total, otherwise as a percentage of the untaxed total.
    async fn refund(&self, order: &OrderSnapshot, amount: Decimal) -> Result<TaxResult, ServiceError>;
}

/// Builds the provider used for the lifetime of the process.
pub fn build_provider(
    config: AvalaraConfig,
    db: Arc<DatabaseConnection>,
) -> Result<Arc<dyn TaxProvider>, ServiceError> {
    let client = AvaTaxClient::new(&config)?;
    let cache = RateCache::in_memory(config.rate_cache_ttl());
    let log = TransactionLogService::new(db);
    Ok(Arc::new(AvalaraTaxProvider::new(
        Arc::new(config),
        Arc::new(client),
        cache,
        log,
    )))
}

/// Refund percentage of the untaxed order total.
pub fn refund_percentage(
    amount: Decimal,
    order_total: Decimal,
    order_tax: Decimal,
) -> Result<Decimal, ServiceError> {
    let untaxed_total = order_total - order_tax;
    if untaxed_total <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "cannot compute a refund percentage for an untaxed total of {}",
            untaxed_total
        )));
    }
    Ok(amount / untaxed_total * Decimal::ONE_HUNDRED)
}

/// Unique code for a return transaction, prefixed with the sale's code.
fn refund_document_code(document_code: &str) -> String {
    let suffix = format!(".refund.{}", &Uuid::new_v4().simple().to_string()[..8]);
    let prefix_len = MAX_DOCUMENT_CODE - suffix.len();
    format!("{}{}", truncate(document_code, prefix_len), suffix)
}

/// AvaTax-backed provider.
#[derive(Clone)]
pub struct AvalaraTaxProvider {
    mapper: RequestMapper,
    cache: RateCache,
    transport: Arc<dyn TaxTransport>,
    log: TransactionLogService,
}

impl AvalaraTaxProvider {
    pub fn new(
        config: Arc<AvalaraConfig>,
        transport: Arc<dyn TaxTransport>,
        cache: RateCache,
        log: TransactionLogService,
    ) -> Self {
        Self {
            mapper: RequestMapper::new(config),
            cache,
            transport,
            log,
        }
    }

    /// Writes a log record; a failing log never fails the tax operation.
    async fn record(
        &self,
        log_type: LogType,
        message: String,
        customer_id: Option<i64>,
        correlation_id: Option<Uuid>,
    ) {
        if let Err(e) = self
            .log
            .append(log_type, message, customer_id, correlation_id)
            .await
        {
            warn!(error = %e, %log_type, "Tax transaction log write failed");
        }
    }

    async fn record_error(&self, message: String, customer_id: Option<i64>, correlation_id: Option<Uuid>) {
        self.record(LogType::Error, message, customer_id, correlation_id)
            .await;
    }

    /// Logs the response of a logged request and any failure it reports.
    async fn record_response(
        &self,
        request_type: LogType,
        result: &TaxResult,
        customer_id: Option<i64>,
        correlation_id: Uuid,
    ) {
        let message = serde_json::to_string(result).unwrap_or_else(|e| {
            format!("unserializable response ({}): {}", e, result.error_summary())
        });
        self.record(request_type.response(), message, customer_id, Some(correlation_id))
            .await;

        if !result.is_success() {
            self.record_error(result.error_summary(), customer_id, Some(correlation_id))
                .await;
        }
    }

    fn payload<T: serde::Serialize>(value: &T) -> String {
        serde_json::to_string(value).unwrap_or_else(|e| format!("unserializable payload: {}", e))
    }
}

#[async_trait]
impl TaxProvider for AvalaraTaxProvider {
    #[instrument(skip(self, request), fields(store_id = request.store_id))]
    async fn get_rate(&self, request: &CalculateTaxRequest) -> RateResult {
        let customer_id = request.customer.as_ref().map(|c| c.id);

        let tax_request = match self.mapper.map_rate_request(request) {
            Ok(tax_request) => tax_request,
            Err(e) => {
                counter!("avatax.provider.calls", 1, "operation" => "get_rate", "outcome" => e.kind());
                return RateResult::error(e.to_string());
            }
        };

        let key = RateCache::request_fingerprint(request.store_id, &tax_request);
        if let Some(rate) = self.cache.get(&key).await {
            counter!("avatax.provider.calls", 1, "operation" => "get_rate", "outcome" => "cached");
            return RateResult::rate(rate);
        }

        match self.transport.create_transaction(&tax_request).await {
            Ok(result) if result.is_success() => {
                // The request carries one line of 100, so the tax is the rate
                let rate = result.total_tax;
                self.cache.put(&key, rate).await;
                counter!("avatax.provider.calls", 1, "operation" => "get_rate", "outcome" => "ok");
                RateResult::rate(rate)
            }
            Ok(result) => {
                warn!(messages = ?result.messages, "Rate lookup rejected by provider");
                self.record_error(result.error_summary(), customer_id, None)
                    .await;
                counter!("avatax.provider.calls", 1, "operation" => "get_rate", "outcome" => "provider_error");
                RateResult::errors(result.messages)
            }
            Err(e) => {
                error!(error = %e, "Rate lookup failed");
                self.record_error(e.to_string(), customer_id, None).await;
                counter!("avatax.provider.calls", 1, "operation" => "get_rate", "outcome" => e.kind());
                RateResult::error(e.to_string())
            }
        }
    }

    #[instrument(skip(self, order), fields(order_number = %order.order_number))]
    async fn get_order_tax(
        &self,
        order: &OrderSnapshot,
        commit: bool,
    ) -> Result<OrderTotals, ServiceError> {
        let customer_id = Some(order.customer.id);
        let document_type = if commit {
            DocumentType::SalesInvoice
        } else {
            DocumentType::SalesOrder
        };

        let tax_request = match self.mapper.map_order_request(order, document_type, commit) {
            Ok(tax_request) => tax_request,
            Err(e) => {
                if commit {
                    self.record_error(e.to_string(), customer_id, None).await;
                }
                return Err(e);
            }
        };

        let correlation_id = Uuid::new_v4();
        if commit {
            let payload = Self::payload(&CreateTransactionModel::from(&tax_request));
            self.record(LogType::Create, payload, customer_id, Some(correlation_id))
                .await;
        }

        let result = match self.transport.create_transaction(&tax_request).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, commit, "Order tax request failed");
                self.record_error(e.to_string(), customer_id, Some(correlation_id))
                    .await;
                counter!("avatax.provider.calls", 1, "operation" => "get_order_tax", "outcome" => e.kind());
                return Err(e);
            }
        };

        if commit {
            self.record_response(LogType::Create, &result, customer_id, correlation_id)
                .await;
            info!(result_code = %result.result_code, "Order tax transaction recorded");
        } else if !result.is_success() {
            self.record_error(result.error_summary(), customer_id, Some(correlation_id))
                .await;
        }

        counter!(
            "avatax.provider.calls",
            1,
            "operation" => "get_order_tax",
            "outcome" => if result.is_success() { "ok" } else { "provider_error" }
        );
        Ok(OrderTotals::from_result(result))
    }

    #[instrument(skip(self, order), fields(order_number = %order.order_number))]
    async fn void(&self, order: &OrderSnapshot, reason: VoidReason) -> Result<TaxResult, ServiceError> {
        let customer_id = Some(order.customer.id);
        let document_code = truncate(&order.order_number, MAX_DOCUMENT_CODE);
        let correlation_id = Uuid::new_v4();

        let payload = serde_json::json!({
            "code": document_code,
            "reason": reason.provider_code(),
        });
        self.record(LogType::Void, payload.to_string(), customer_id, Some(correlation_id))
            .await;

        match self.transport.void_transaction(&document_code, reason).await {
            Ok(result) => {
                self.record_response(LogType::Void, &result, customer_id, correlation_id)
                    .await;
                counter!("avatax.provider.calls", 1, "operation" => "void", "outcome" => if result.is_success() { "ok" } else { "provider_error" });
                Ok(result)
            }
            Err(e) => {
                error!(error = %e, "Void request failed");
                self.record_error(e.to_string(), customer_id, Some(correlation_id))
                    .await;
                counter!("avatax.provider.calls", 1, "operation" => "void", "outcome" => e.kind());
                Err(e)
            }
        }
    }

    #[instrument(skip(self, order), fields(order_number = %order.order_number))]
    async fn refund(&self, order: &OrderSnapshot, amount: Decimal) -> Result<TaxResult, ServiceError> {
        let customer_id = Some(order.customer.id);

        let prepared = if amount <= Decimal::ZERO || amount > order.order_total {
            Err(ServiceError::ValidationError(format!(
                "refund amount {} must be positive and at most the order total {}",
                amount, order.order_total
            )))
        } else if amount == order.order_total {
            Ok((RefundType::Full, None))
        } else {
            refund_percentage(amount, order.order_total, order.order_tax)
                // A refund that includes tax can exceed the untaxed total
                .map(|percentage| (RefundType::Percentage, Some(percentage.min(Decimal::ONE_HUNDRED))))
        };

        let (refund_type, refund_percentage) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                self.record_error(e.to_string(), customer_id, None).await;
                return Err(e);
            }
        };

        let document_code = truncate(&order.order_number, MAX_DOCUMENT_CODE);
        let refund = RefundRequest {
            refund_transaction_code: refund_document_code(&document_code),
            refund_date: Utc::now().date_naive(),
            refund_type,
            refund_percentage,
            reference_code: Some(document_code.clone()),
        };

        let correlation_id = Uuid::new_v4();
        self.record(LogType::Refund, Self::payload(&refund), customer_id, Some(correlation_id))
            .await;

        match self.transport.refund_transaction(&document_code, &refund).await {
            Ok(result) => {
                self.record_response(LogType::Refund, &result, customer_id, correlation_id)
                    .await;
                counter!("avatax.provider.calls", 1, "operation" => "refund", "outcome" => if result.is_success() { "ok" } else { "provider_error" });
                Ok(result)
            }
            Err(e) => {
                error!(error = %e, "Refund request failed");
                self.record_error(e.to_string(), customer_id, Some(correlation_id))
                    .await;
                counter!("avatax.provider.calls", 1, "operation" => "refund", "outcome" => e.kind());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{
        Address, AddressValidation, Company, Customer, EntityUseCode, OrderItem, PingStatus,
        Product, ResultCode, TaxCode, TaxRequest,
    };
    use crate::services::transaction_log::LogSearch;
    use mockall::mock;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use std::time::Duration;

    mock! {
        Transport {}

        #[async_trait]
        impl TaxTransport for Transport {
            async fn create_transaction(&self, request: &TaxRequest) -> Result<TaxResult, ServiceError>;
            async fn void_transaction(&self, document_code: &str, reason: VoidReason) -> Result<TaxResult, ServiceError>;
            async fn refund_transaction(&self, document_code: &str, refund: &RefundRequest) -> Result<TaxResult, ServiceError>;
            async fn resolve_address(&self, address: &Address) -> Result<AddressValidation, ServiceError>;
            async fn ping(&self) -> Result<PingStatus, ServiceError>;
            async fn list_entity_use_codes(&self) -> Result<Vec<EntityUseCode>, ServiceError>;
            async fn list_companies(&self, active_only: bool) -> Result<Vec<Company>, ServiceError>;
            async fn list_tax_code_types(&self) -> Result<BTreeMap<String, String>, ServiceError>;
            async fn list_tax_codes(&self, active_only: bool) -> Result<Vec<TaxCode>, ServiceError>;
            async fn get_transaction(&self, document_code: &str) -> Result<TaxResult, ServiceError>;
        }
    }

    fn success(total_tax: Decimal) -> TaxResult {
        TaxResult {
            result_code: ResultCode::Success,
            document_code: Some("1001".into()),
            total_amount: dec!(100),
            total_taxable: dec!(100),
            total_tax,
            lines: vec![],
            messages: vec![],
        }
    }

    async fn provider(transport: MockTransport, ttl: Duration) -> (AvalaraTaxProvider, TransactionLogService) {
        let pool = db::connect_and_migrate("sqlite::memory:").await.unwrap();
        let log = TransactionLogService::new(Arc::new(pool));
        let config = Arc::new(AvalaraConfig::with_credentials("1100012345", "ABCDEF"));
        let provider = AvalaraTaxProvider::new(
            config,
            Arc::new(transport),
            RateCache::in_memory(ttl),
            log.clone(),
        );
        (provider, log)
    }

    fn rate_request() -> CalculateTaxRequest {
        CalculateTaxRequest {
            address: Some(Address::new("2 Ship Ave", "Seattle", "WA", "US", "98101")),
            store_id: 1,
            ..Default::default()
        }
    }

    fn order() -> OrderSnapshot {
        OrderSnapshot {
            order_number: "1001".to_string(),
            store_id: 1,
            customer: Customer {
                id: 42,
                customer_code: "c-42".to_string(),
                ..Default::default()
            },
            billing_address: None,
            shipping_address: Some(Address::new("2 Ship Ave", "Seattle", "WA", "US", "98101")),
            pickup_address: None,
            items: vec![OrderItem {
                product: Product {
                    id: 1,
                    sku: Some("SKU-1".into()),
                    name: "Widget".into(),
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

    async fn logged_types(log: &TransactionLogService) -> Vec<LogType> {
        let page = log.search(&LogSearch::default()).await.unwrap();
        // Oldest first reads more naturally in assertions
        page.records.iter().rev().map(|r| r.log_type).collect()
    }

    #[test]
    fn partial_refund_percentage_excludes_tax() {
        let percentage = refund_percentage(dec!(30), dec!(100), dec!(10)).unwrap();
        assert_eq!(percentage.round_dp(2), dec!(33.33));
        assert!(percentage > dec!(33.333) && percentage < dec!(33.334));
    }

    #[test]
    fn refund_percentage_requires_untaxed_total() {
        assert!(refund_percentage(dec!(5), dec!(10), dec!(10)).is_err());
    }

    #[test]
    fn refund_code_keeps_sale_prefix_within_limit() {
        let code = refund_document_code("1001");
        assert!(code.starts_with("1001.refund."));

        let long = refund_document_code(&"9".repeat(50));
        assert_eq!(long.chars().count(), 50);
        assert!(long.starts_with("999"));
    }

    #[tokio::test]
    async fn rate_is_served_from_cache_within_ttl() {
        let mut transport = MockTransport::new();
        transport
            .expect_create_transaction()
            .times(1)
            .returning(|_| Ok(success(dec!(8.5))));
        let (provider, _) = provider(transport, Duration::from_secs(60)).await;

        let first = provider.get_rate(&rate_request()).await;
        let second = provider.get_rate(&rate_request()).await;

        assert_eq!(first.rate, Some(dec!(8.5)));
        assert_eq!(second.rate, Some(dec!(8.5)));
    }

    #[tokio::test]
    async fn rate_is_fetched_again_after_ttl() {
        let mut transport = MockTransport::new();
        transport
            .expect_create_transaction()
            .times(2)
            .returning(|_| Ok(success(dec!(8.5))));
        let (provider, _) = provider(transport, Duration::from_millis(20)).await;

        provider.get_rate(&rate_request()).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        let again = provider.get_rate(&rate_request()).await;

        assert!(again.is_success());
    }

    #[tokio::test]
    async fn exempt_rate_is_not_served_to_taxable_customer_at_same_address() {
        let mut transport = MockTransport::new();
        transport
            .expect_create_transaction()
            .times(2)
            .returning(|request| {
                if request.exemption_no.is_some() {
                    Ok(success(dec!(0)))
                } else {
                    Ok(success(dec!(8.5)))
                }
            });
        let (provider, _) = provider(transport, Duration::from_secs(60)).await;

        let exempt = CalculateTaxRequest {
            customer: Some(Customer {
                id: 7,
                is_tax_exempt: true,
                ..Default::default()
            }),
            ..rate_request()
        };
        let taxable = CalculateTaxRequest {
            customer: Some(Customer {
                id: 8,
                ..Default::default()
            }),
            ..rate_request()
        };

        assert_eq!(provider.get_rate(&exempt).await.rate, Some(dec!(0)));
        assert_eq!(provider.get_rate(&taxable).await.rate, Some(dec!(8.5)));
    }

    #[tokio::test]
    async fn failed_rate_is_not_cached_and_is_logged() {
        let mut transport = MockTransport::new();
        transport.expect_create_transaction().times(2).returning(|_| {
            Ok(TaxResult::failure(
                ResultCode::Error,
                vec!["InvalidAddress - Address not found".into()],
            ))
        });
        let (provider, log) = provider(transport, Duration::from_secs(60)).await;

        let first = provider.get_rate(&rate_request()).await;
        provider.get_rate(&rate_request()).await;

        assert_eq!(first.rate, None);
        assert_eq!(first.errors, vec!["InvalidAddress - Address not found".to_string()]);
        assert_eq!(logged_types(&log).await, vec![LogType::Error, LogType::Error]);
    }

    #[tokio::test]
    async fn rate_without_address_never_reaches_transport() {
        let mut transport = MockTransport::new();
        transport.expect_create_transaction().never();
        let (provider, _) = provider(transport, Duration::from_secs(60)).await;

        let result = provider.get_rate(&CalculateTaxRequest::default()).await;
        assert!(!result.is_success());
        assert_eq!(result.errors.len(), 1);
    }

    #[tokio::test]
    async fn committed_order_tax_logs_request_and_response() {
        let mut transport = MockTransport::new();
        transport
            .expect_create_transaction()
            .withf(|request| request.commit && request.document_type == DocumentType::SalesInvoice)
            .times(1)
            .returning(|_| Ok(success(dec!(9))));
        let (provider, log) = provider(transport, Duration::from_secs(60)).await;

        let totals = provider.get_order_tax(&order(), true).await.unwrap();
        assert_eq!(totals.usable_tax(), Some(dec!(9)));

        let page = log.search(&LogSearch::default()).await.unwrap();
        assert_eq!(page.total, 2);
        let response = &page.records[0];
        let request = &page.records[1];
        assert_eq!(request.log_type, LogType::Create);
        assert_eq!(response.log_type, LogType::CreateResponse);
        assert_eq!(request.customer_id, Some(42));
        assert!(request.correlation_id.is_some());
        assert_eq!(request.correlation_id, response.correlation_id);
        assert!(request.message.contains("\"code\":\"1001\""));
    }

    #[tokio::test]
    async fn quote_is_not_logged() {
        let mut transport = MockTransport::new();
        transport
            .expect_create_transaction()
            .withf(|request| !request.commit && request.document_type == DocumentType::SalesOrder)
            .returning(|_| Ok(success(dec!(9))));
        let (provider, log) = provider(transport, Duration::from_secs(60)).await;

        provider.get_order_tax(&order(), false).await.unwrap();
        assert!(logged_types(&log).await.is_empty());
    }

    #[tokio::test]
    async fn transport_failure_surfaces_and_is_logged() {
        let mut transport = MockTransport::new();
        transport
            .expect_create_transaction()
            .returning(|_| Err(ServiceError::TransportError("connection refused".into())));
        let (provider, log) = provider(transport, Duration::from_secs(60)).await;

        let result = provider.get_order_tax(&order(), true).await;
        assert!(matches!(result, Err(ServiceError::TransportError(_))));
        assert_eq!(logged_types(&log).await, vec![LogType::Create, LogType::Error]);
    }

    #[tokio::test]
    async fn void_uses_order_number_and_reason() {
        let mut transport = MockTransport::new();
        transport
            .expect_void_transaction()
            .withf(|code, reason| code == "1001" && *reason == VoidReason::Deleted)
            .times(1)
            .returning(|_, _| Ok(success(dec!(0))));
        let (provider, log) = provider(transport, Duration::from_secs(60)).await;

        provider.void(&order(), VoidReason::Deleted).await.unwrap();
        assert_eq!(logged_types(&log).await, vec![LogType::Void, LogType::VoidResponse]);
    }

    #[tokio::test]
    async fn refund_of_whole_total_is_full() {
        let mut transport = MockTransport::new();
        transport
            .expect_refund_transaction()
            .withf(|code, refund| {
                code == "1001" && refund.refund_type == RefundType::Full && refund.refund_percentage.is_none()
            })
            .times(1)
            .returning(|_, _| Ok(success(dec!(-10))));
        let (provider, log) = provider(transport, Duration::from_secs(60)).await;

        provider.refund(&order(), dec!(100)).await.unwrap();
        assert_eq!(logged_types(&log).await, vec![LogType::Refund, LogType::RefundResponse]);
    }

    #[tokio::test]
    async fn partial_refund_sends_percentage() {
        let mut transport = MockTransport::new();
        transport
            .expect_refund_transaction()
            .withf(|_, refund| {
                refund.refund_type == RefundType::Percentage
                    && refund.refund_percentage.map(|p| p.round_dp(2)) == Some(dec!(33.33))
                    && refund.refund_transaction_code.starts_with("1001.refund.")
            })
            .times(1)
            .returning(|_, _| Ok(success(dec!(-3))));
        let (provider, _) = provider(transport, Duration::from_secs(60)).await;

        provider.refund(&order(), dec!(30)).await.unwrap();
    }

    #[tokio::test]
    async fn refund_above_total_is_rejected() {
        let mut transport = MockTransport::new();
        transport.expect_refund_transaction().never();
        let (provider, log) = provider(transport, Duration::from_secs(60)).await;

        let result = provider.refund(&order(), dec!(150)).await;
        assert!(matches!(result, Err(ServiceError::ValidationError(_))));
        assert_eq!(logged_types(&log).await, vec![LogType::Error]);
    }
}
