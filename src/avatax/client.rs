use std::collections::BTreeMap;
use std::time::Instant;

use async_trait::async_trait;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use metrics::{counter, histogram};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use super::dto::{
    AddressInfo, AddressResolutionModel, CompanyModel, CreateTransactionModel, EntityUseCodeModel,
    ErrorResult, FetchResult, PingResultModel, RefundTransactionModel, TaxCodeModel,
    TaxCodeTypesModel, TransactionModel, VoidTransactionModel,
};
use super::{TaxTransport, VALIDATION_COUNTRIES};
use crate::config::AvalaraConfig;
use crate::errors::ServiceError;
use crate::models::{
    Address, AddressValidation, Company, EntityUseCode, PingStatus, RefundRequest, ResultCode,
    TaxCode, TaxRequest, TaxResult, VoidReason,
};
use crate::retry::{retry_with_backoff, RetryPolicy};

const API_PREFIX: [&str; 2] = ["api", "v2"];
const CLIENT_HEADER: &str = "X-Avalara-Client";
const ADAPTER_NAME: &str = "stateset-avatax";
const ACTIVE_FILTER: &str = "isActive eq true";

/// AvaTax REST v2 client.
///
/// Authenticates every call with HTTP Basic built from the account id and
/// license key, and identifies itself through the `X-Avalara-Client`
/// header. Each call is bounded by the configured timeout.
#[derive(Debug, Clone)]
pub struct AvaTaxClient {
    http: reqwest::Client,
    base_url: Url,
    company_code: String,
    validate_addresses: bool,
    retry: RetryPolicy,
}

impl AvaTaxClient {
    /// Builds a client, failing before any network I/O when credentials
    /// are missing.
    pub fn new(config: &AvalaraConfig) -> Result<Self, ServiceError> {
        if !config.is_configured() {
            return Err(ServiceError::ConfigurationError(
                "Avalara tax provider is not configured: account id and license key are required"
                    .to_string(),
            ));
        }

        let token = BASE64_STANDARD.encode(format!(
            "{}:{}",
            config.account_id.trim(),
            config.license_key.trim()
        ));
        let mut authorization = HeaderValue::from_str(&format!("Basic {}", token))
            .map_err(|e| ServiceError::ConfigurationError(format!("invalid credentials: {}", e)))?;
        authorization.set_sensitive(true);

        let machine = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
        let client_id = format!(
            "{}; {}; {}; {}; {}",
            config.application_name,
            env!("CARGO_PKG_VERSION"),
            ADAPTER_NAME,
            env!("CARGO_PKG_VERSION"),
            machine
        );
        let client_header = HeaderValue::from_str(&client_id).map_err(|e| {
            ServiceError::ConfigurationError(format!("invalid application name: {}", e))
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(CLIENT_HEADER, client_header);

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| ServiceError::ConfigurationError(format!("http client: {}", e)))?;

        Ok(Self {
            http,
            base_url: Url::parse(config.base_url())?,
            company_code: config.company_code.clone(),
            validate_addresses: config.validate_addresses,
            retry: config.retry_policy(),
        })
    }

    /// Replaces the retry policy used for idempotent calls.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint<I>(&self, segments: I) -> Result<Url, ServiceError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                ServiceError::ConfigurationError(format!(
                    "base URL {} cannot carry a path",
                    self.base_url
                ))
            })?;
            path.pop_if_empty().extend(API_PREFIX).extend(segments);
        }
        Ok(url)
    }

    fn transaction_endpoint(&self, document_code: &str, action: Option<&str>) -> Result<Url, ServiceError> {
        let mut segments = vec![
            "companies",
            self.company_code.as_str(),
            "transactions",
            document_code,
        ];
        segments.extend(action);
        self.endpoint(segments)
    }

    async fn execute(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<(StatusCode, String), ServiceError> {
        let started = Instant::now();
        let response = request.send().await.map_err(|e| {
            error!(operation, error = %e, "AvaTax request failed");
            counter!("avatax.requests", 1, "operation" => operation, "outcome" => "transport_error");
            ServiceError::from(e)
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            error!(operation, %status, error = %e, "Failed to read AvaTax response body");
            ServiceError::from(e)
        })?;

        let elapsed_ms = started.elapsed().as_millis() as f64;
        histogram!("avatax.request.duration_ms", elapsed_ms, "operation" => operation);
        counter!(
            "avatax.requests",
            1,
            "operation" => operation,
            "outcome" => if status.is_success() { "ok" } else { "error" }
        );
        debug!(operation, %status, elapsed_ms, "AvaTax responded");

        Ok((status, body))
    }

    async fn fetch_transaction(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<TaxResult, ServiceError> {
        let (status, body) = self.execute(operation, request).await?;
        decode_transaction(operation, status, &body)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, ServiceError> {
        let (status, body) = self.execute(operation, request).await?;
        decode(operation, status, &body)
    }

    async fn post_transaction<B: Serialize + ?Sized>(
        &self,
        operation: &'static str,
        url: Url,
        body: &B,
    ) -> Result<TaxResult, ServiceError> {
        self.fetch_transaction(operation, self.http.post(url).json(body))
            .await
    }

    async fn resolve_once(
        &self,
        url: &Url,
        query: &[(&str, &str)],
    ) -> Result<AddressResolutionModel, ServiceError> {
        let (status, body) = self
            .execute("resolve_address", self.http.get(url.clone()).query(query))
            .await?;
        decode_address_resolution(status, &body)
    }

    /// Validates every US and Canadian address of the request, including
    /// per-line overrides, replacing each with its corrected form. Returns
    /// the failure to report when any address cannot be validated.
    async fn validate_request_addresses(&self, request: &mut TaxRequest) -> Option<TaxResult> {
        if !self.validate_addresses {
            return None;
        }

        let mut addresses = request.addresses.all_mut();
        for line in request.lines.iter_mut() {
            if let Some(overrides) = line.addresses.as_mut() {
                addresses.extend(overrides.all_mut());
            }
        }

        for address in addresses {
            if !address.is_in_any(&VALIDATION_COUNTRIES) {
                continue;
            }

            let validation = match self.resolve_address(address).await {
                Ok(validation) => validation,
                Err(e) => {
                    error!(error = %e, postal_code = %address.postal_code, "Address validation call failed");
                    return Some(TaxResult::failure(
                        ResultCode::Error,
                        vec![format!("Error on validating address: {}", e)],
                    ));
                }
            };

            match validation.validated {
                Some(validated) if validation.messages.is_empty() => {
                    AddressInfo::from(&validated).apply_to(address);
                    debug!(postal_code = %address.postal_code, "Address validated");
                }
                _ => {
                    warn!(messages = ?validation.messages, "Address failed validation");
                    return Some(TaxResult::failure(ResultCode::Error, validation.messages));
                }
            }
        }

        None
    }
}

#[async_trait]
impl TaxTransport for AvaTaxClient {
    #[instrument(skip(self, request), fields(document_code = ?request.document_code, commit = request.commit))]
    async fn create_transaction(&self, request: &TaxRequest) -> Result<TaxResult, ServiceError> {
        let mut request = request.clone();
        if let Some(failure) = self.validate_request_addresses(&mut request).await {
            return Ok(failure);
        }

        let url = self.endpoint(["transactions", "create"])?;
        let body = CreateTransactionModel::from(&request);

        let result = if request.commit {
            // Never retried: a repeated commit may record the sale twice
            self.post_transaction("create_transaction", url, &body).await?
        } else {
            retry_with_backoff(&self.retry, || {
                self.post_transaction("create_transaction", url.clone(), &body)
            })
            .await?
        };

        info!(
            result_code = %result.result_code,
            total_tax = %result.total_tax,
            "AvaTax transaction created"
        );
        Ok(result)
    }

    #[instrument(skip(self))]
    async fn void_transaction(
        &self,
        document_code: &str,
        reason: VoidReason,
    ) -> Result<TaxResult, ServiceError> {
        let url = self.transaction_endpoint(document_code, Some("void"))?;
        let body = VoidTransactionModel {
            code: reason.provider_code().to_string(),
        };
        self.post_transaction("void_transaction", url, &body).await
    }

    #[instrument(skip(self, refund), fields(refund_type = %refund.refund_type))]
    async fn refund_transaction(
        &self,
        document_code: &str,
        refund: &RefundRequest,
    ) -> Result<TaxResult, ServiceError> {
        let url = self.transaction_endpoint(document_code, Some("refund"))?;
        let body = RefundTransactionModel::from(refund);
        self.post_transaction("refund_transaction", url, &body).await
    }

    #[instrument(skip(self, address), fields(country = %address.country, postal_code = %address.postal_code))]
    async fn resolve_address(&self, address: &Address) -> Result<AddressValidation, ServiceError> {
        let url = self.endpoint(["addresses", "resolve"])?;
        let mut query = vec![
            ("line1", address.line1.as_str()),
            ("city", address.city.as_str()),
            ("region", address.region.as_str()),
            ("postalCode", address.postal_code.as_str()),
            ("country", address.country.as_str()),
        ];
        if let Some(line2) = address.line2.as_deref().filter(|l| !l.is_empty()) {
            query.push(("line2", line2));
        }

        let result = retry_with_backoff(&self.retry, || self.resolve_once(&url, &query)).await?;

        let mut validation = AddressValidation::from(result);
        if let Some(validated) = validation.validated.as_mut() {
            validated.address_code = address.address_code.clone();
        }
        Ok(validation)
    }

    #[instrument(skip(self))]
    async fn ping(&self) -> Result<PingStatus, ServiceError> {
        let url = self.endpoint(["utilities", "ping"])?;
        let result: PingResultModel = retry_with_backoff(&self.retry, || {
            self.fetch("ping", self.http.get(url.clone()))
        })
        .await?;
        Ok(result.into())
    }

    #[instrument(skip(self))]
    async fn list_entity_use_codes(&self) -> Result<Vec<EntityUseCode>, ServiceError> {
        let url = self.endpoint(["definitions", "entityusecodes"])?;
        let result: FetchResult<EntityUseCodeModel> = retry_with_backoff(&self.retry, || {
            self.fetch("list_entity_use_codes", self.http.get(url.clone()))
        })
        .await?;
        Ok(result.value.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn list_companies(&self, active_only: bool) -> Result<Vec<Company>, ServiceError> {
        let url = self.endpoint(["companies"])?;
        let filter = active_filter(active_only);
        let result: FetchResult<CompanyModel> = retry_with_backoff(&self.retry, || {
            self.fetch("list_companies", self.http.get(url.clone()).query(&filter))
        })
        .await?;
        debug!(count = result.value.len(), "Account companies fetched");
        Ok(result.value.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn list_tax_code_types(&self) -> Result<BTreeMap<String, String>, ServiceError> {
        let url = self.endpoint(["definitions", "taxcodetypes"])?;
        let result: TaxCodeTypesModel = retry_with_backoff(&self.retry, || {
            self.fetch("list_tax_code_types", self.http.get(url.clone()))
        })
        .await?;
        Ok(result.types)
    }

    #[instrument(skip(self))]
    async fn list_tax_codes(&self, active_only: bool) -> Result<Vec<TaxCode>, ServiceError> {
        let url = self.endpoint(["definitions", "taxcodes"])?;
        let filter = active_filter(active_only);
        let result: FetchResult<TaxCodeModel> = retry_with_backoff(&self.retry, || {
            self.fetch("list_tax_codes", self.http.get(url.clone()).query(&filter))
        })
        .await?;
        Ok(result.value.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn get_transaction(&self, document_code: &str) -> Result<TaxResult, ServiceError> {
        let url = self.transaction_endpoint(document_code, None)?;
        retry_with_backoff(&self.retry, || {
            self.fetch_transaction("get_transaction", self.http.get(url.clone()))
        })
        .await
    }
}

fn active_filter(active_only: bool) -> Vec<(&'static str, &'static str)> {
    if active_only {
        vec![("$filter", ACTIVE_FILTER)]
    } else {
        Vec::new()
    }
}

/// Successful bodies become a result; structured error bodies become an
/// error result carrying the provider's messages. Anything else is a
/// transport failure.
fn decode_transaction(operation: &str, status: StatusCode, body: &str) -> Result<TaxResult, ServiceError> {
    if status.is_success() {
        return serde_json::from_str::<TransactionModel>(body)
            .map(TaxResult::from)
            .map_err(|e| {
                error!(operation, %status, error = %e, "Unreadable AvaTax response");
                ServiceError::TransportError(format!("unreadable {} response: {}", operation, e))
            });
    }

    match serde_json::from_str::<ErrorResult>(body) {
        Ok(error_result) => {
            let messages = error_result.messages();
            warn!(operation, %status, messages = ?messages, "AvaTax returned an error");
            Ok(TaxResult::failure(ResultCode::Error, messages))
        }
        Err(_) => {
            error!(operation, %status, "AvaTax error without a readable body");
            Err(ServiceError::TransportError(format!(
                "{} failed with status {}",
                operation, status
            )))
        }
    }
}

fn decode<T: DeserializeOwned>(operation: &str, status: StatusCode, body: &str) -> Result<T, ServiceError> {
    if status.is_success() {
        return serde_json::from_str(body).map_err(|e| {
            error!(operation, %status, error = %e, "Unreadable AvaTax response");
            ServiceError::TransportError(format!("unreadable {} response: {}", operation, e))
        });
    }

    match serde_json::from_str::<ErrorResult>(body) {
        Ok(error_result) => Err(ServiceError::ProviderError(error_result.messages().join("; "))),
        Err(_) => Err(ServiceError::TransportError(format!(
            "{} failed with status {}",
            operation, status
        ))),
    }
}

fn decode_address_resolution(status: StatusCode, body: &str) -> Result<AddressResolutionModel, ServiceError> {
    if status.is_success() {
        return decode("resolve_address", status, body);
    }

    // Address errors come back as a 4xx with a structured body
    match serde_json::from_str::<ErrorResult>(body) {
        Ok(error_result) => Ok(AddressResolutionModel {
            validated_addresses: Vec::new(),
            messages: error_result
                .messages()
                .into_iter()
                .map(|message| super::dto::AvaTaxMessage {
                    summary: Some(message),
                    details: None,
                    severity: Some("Error".to_string()),
                })
                .collect(),
        }),
        Err(_) => Err(ServiceError::TransportError(format!(
            "resolve_address failed with status {}",
            status
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn config() -> AvalaraConfig {
        AvalaraConfig::with_credentials("1100012345", "ABCDEF")
    }

    #[test]
    fn missing_credentials_fail_before_io() {
        let result = AvaTaxClient::new(&AvalaraConfig::default());
        assert_matches!(result, Err(ServiceError::ConfigurationError(_)));
    }

    #[test]
    fn endpoints_are_versioned_and_escaped() {
        let client = AvaTaxClient::new(&config()).unwrap();
        let url = client.transaction_endpoint("ORD 1/2", Some("void")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sandbox-rest.avatax.com/api/v2/companies/DEFAULT/transactions/ORD%201%2F2/void"
        );
    }

    #[test]
    fn production_endpoint_when_sandbox_disabled() {
        let mut cfg = config();
        cfg.use_sandbox = false;
        let client = AvaTaxClient::new(&cfg).unwrap();
        let url = client.endpoint(["transactions", "create"]).unwrap();
        assert_eq!(url.as_str(), "https://rest.avatax.com/api/v2/transactions/create");
    }

    #[test]
    fn unreadable_error_body_is_transport_error() {
        let result = decode_transaction("create_transaction", StatusCode::BAD_GATEWAY, "<html>");
        assert_matches!(result, Err(ServiceError::TransportError(_)));
    }

    #[test]
    fn structured_error_body_becomes_error_result() {
        let body = r#"{"error":{"code":"MissingLine","message":"A transaction must have at least one line.","details":[]}}"#;
        let result = decode_transaction("create_transaction", StatusCode::BAD_REQUEST, body).unwrap();
        assert_eq!(result.result_code, ResultCode::Error);
        assert_eq!(
            result.messages,
            vec!["MissingLine - A transaction must have at least one line.".to_string()]
        );
    }
}
