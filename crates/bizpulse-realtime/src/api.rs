//! REST client for the dashboard endpoints.
//!
//! Response types default every member so a partial payload still decodes.
//! Callers that want stale-but-available behaviour wrap calls in a
//! [`Snapshot`].
use std::collections::BTreeMap;
use std::future::Future;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::errors::{ClientError, detail_from_body};
use crate::frame::{Chart, FinalAnswer, FinalShape, QueryFrame, Source};

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MetricsSummary {
    #[serde(deserialize_with = "null_default")]
    pub business_id: String,
    pub latest_date: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub gross_sales: f64,
    #[serde(deserialize_with = "null_default")]
    pub net_sales: f64,
    #[serde(deserialize_with = "null_default")]
    pub cost_of_goods: f64,
    #[serde(deserialize_with = "null_default")]
    pub profit: f64,
    #[serde(deserialize_with = "null_default")]
    pub settlement_delay: i64,
    #[serde(deserialize_with = "null_default")]
    pub data_delay_notice: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DailyMetric {
    #[serde(deserialize_with = "null_default")]
    pub metric_date: String,
    #[serde(deserialize_with = "null_default")]
    pub gross_sales: f64,
    #[serde(deserialize_with = "null_default")]
    pub net_sales: f64,
    #[serde(deserialize_with = "null_default")]
    pub cost_of_goods: f64,
    #[serde(deserialize_with = "null_default")]
    pub settlement_delay_count: i64,
}

impl DailyMetric {
    pub fn profit(&self) -> f64 {
        self.net_sales - self.cost_of_goods
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MetricsDaily {
    #[serde(deserialize_with = "lenient_vec")]
    pub items: Vec<DailyMetric>,
    #[serde(deserialize_with = "null_default")]
    pub data_delay_notice: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReviewSummary {
    #[serde(deserialize_with = "null_default")]
    pub business_id: String,
    #[serde(deserialize_with = "null_default")]
    pub review_count: u64,
    #[serde(deserialize_with = "null_default")]
    pub average_rating: f64,
    #[serde(deserialize_with = "null_default")]
    pub positive_count: u64,
    #[serde(deserialize_with = "null_default")]
    pub neutral_count: u64,
    #[serde(deserialize_with = "null_default")]
    pub negative_count: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Review {
    #[serde(deserialize_with = "null_default")]
    pub rating: f64,
    #[serde(deserialize_with = "null_default")]
    pub content: String,
    #[serde(deserialize_with = "null_default")]
    pub source: String,
    #[serde(deserialize_with = "null_default")]
    pub reviewed_at: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReviewSourceSlice {
    #[serde(deserialize_with = "null_default")]
    pub source: String,
    #[serde(deserialize_with = "null_default")]
    pub count: u64,
    #[serde(deserialize_with = "null_default")]
    pub ratio: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PolicyRecommendation {
    #[serde(deserialize_with = "null_default")]
    pub policy_id: String,
    #[serde(deserialize_with = "null_default")]
    pub name: String,
    #[serde(deserialize_with = "null_default")]
    pub group_name: String,
    pub limit_amount: Option<String>,
    pub interest_rate: Option<String>,
    pub term: Option<String>,
    pub eligibility: Option<String>,
    pub documents: Option<String>,
    pub application_method: Option<String>,
    pub rationale: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub priority: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PolicyWorkflow {
    #[serde(deserialize_with = "null_default")]
    pub policy_id: String,
    #[serde(deserialize_with = "null_default")]
    pub status: String,
    #[serde(deserialize_with = "null_default")]
    pub status_color: String,
    pub notes: Option<String>,
    pub updated_at: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub product: serde_json::Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PolicyProduct {
    #[serde(deserialize_with = "null_default")]
    pub id: String,
    #[serde(deserialize_with = "null_default")]
    pub name: String,
    #[serde(deserialize_with = "null_default")]
    pub group_name: String,
    pub limit_amount: Option<String>,
    pub interest_rate: Option<String>,
    pub term: Option<String>,
    pub eligibility: Option<String>,
    pub application_method: Option<String>,
    pub documents: Option<String>,
    #[serde(deserialize_with = "lenient_vec")]
    pub features: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PolicyProductGroup {
    #[serde(deserialize_with = "null_default")]
    pub group_name: String,
    #[serde(deserialize_with = "lenient_vec")]
    pub products: Vec<PolicyProduct>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AccessToken {
    #[serde(deserialize_with = "null_default")]
    pub access_token: String,
    #[serde(deserialize_with = "null_default")]
    pub token_type: String,
}

/// Owner profile submitted at signup.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProfileData {
    pub owner_name: String,
    pub store_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub profile: ProfileData,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BusinessSetupRequest {
    pub owner_id: String,
    pub store_name: String,
    pub business_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
}

/// `/rag/query` response, the HTTP counterpart of a `final` frame.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RagAnswer {
    #[serde(deserialize_with = "null_default")]
    pub answer: String,
    #[serde(deserialize_with = "lenient_vec")]
    pub sources: Vec<Source>,
    #[serde(deserialize_with = "lenient_vec")]
    pub charts: Vec<Chart>,
    #[serde(deserialize_with = "null_default")]
    pub calculations: BTreeMap<String, Option<f64>>,
}

impl From<RagAnswer> for FinalAnswer {
    fn from(value: RagAnswer) -> Self {
        FinalAnswer {
            text: value.answer,
            sources: value.sources,
            charts: value.charts,
            calculations: value.calculations,
            shape: FinalShape::Flat,
        }
    }
}

/// Treats an explicit `null` like a missing member.
fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decodes an array member, skipping rows that do not fit `T`. A missing,
/// `null` or non-array member yields an empty list.
fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let Some(Value::Array(items)) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

#[derive(Default, Deserialize)]
#[serde(default, bound(deserialize = "T: DeserializeOwned + Default"))]
struct Items<T> {
    #[serde(deserialize_with = "lenient_vec")]
    items: Vec<T>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct Sources {
    #[serde(deserialize_with = "lenient_vec")]
    sources: Vec<ReviewSourceSlice>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct Recommendations {
    #[serde(deserialize_with = "lenient_vec")]
    recommendations: Vec<PolicyRecommendation>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct Workflows {
    #[serde(deserialize_with = "lenient_vec")]
    workflows: Vec<PolicyWorkflow>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct Groups {
    #[serde(deserialize_with = "lenient_vec")]
    groups: Vec<PolicyProductGroup>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct BusinessEnvelope {
    #[serde(deserialize_with = "null_default")]
    business: serde_json::Map<String, Value>,
}

/// Server-side `limit` ranges per list endpoint.
const DAILY_LIMIT_MAX: u32 = 90;
const RECENT_REVIEWS_LIMIT_MAX: u32 = 20;
const ALL_REVIEWS_LIMIT_MAX: u32 = 200;

fn clamp_limit(limit: u32, max: u32) -> String {
    limit.clamp(1, max).to_string()
}

/// HTTP client for the dashboard API.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn metrics_summary(&self, business_id: &str) -> Result<MetricsSummary, ClientError> {
        self.get(&format!("metrics/{}/summary", path_segment(business_id)?), &[])
            .await
    }

    pub async fn metrics_daily(
        &self,
        business_id: &str,
        limit: u32,
    ) -> Result<MetricsDaily, ClientError> {
        self.get(
            &format!("metrics/{}/daily", path_segment(business_id)?),
            &[("limit", clamp_limit(limit, DAILY_LIMIT_MAX))],
        )
        .await
    }

    pub async fn review_summary(&self, business_id: &str) -> Result<ReviewSummary, ClientError> {
        self.get(&format!("reviews/{}/summary", path_segment(business_id)?), &[])
            .await
    }

    pub async fn recent_reviews(
        &self,
        business_id: &str,
        limit: u32,
    ) -> Result<Vec<Review>, ClientError> {
        let page: Items<Review> = self
            .get(
                &format!("reviews/{}/recent", path_segment(business_id)?),
                &[("limit", clamp_limit(limit, RECENT_REVIEWS_LIMIT_MAX))],
            )
            .await?;
        Ok(page.items)
    }

    pub async fn all_reviews(
        &self,
        business_id: &str,
        limit: u32,
    ) -> Result<Vec<Review>, ClientError> {
        let page: Items<Review> = self
            .get(
                &format!("reviews/{}/all", path_segment(business_id)?),
                &[("limit", clamp_limit(limit, ALL_REVIEWS_LIMIT_MAX))],
            )
            .await?;
        Ok(page.items)
    }

    pub async fn review_sources(
        &self,
        business_id: &str,
    ) -> Result<Vec<ReviewSourceSlice>, ClientError> {
        let body: Sources = self
            .get(&format!("reviews/{}/sources", path_segment(business_id)?), &[])
            .await?;
        Ok(body.sources)
    }

    pub async fn policy_recommendations(
        &self,
        business_id: &str,
    ) -> Result<Vec<PolicyRecommendation>, ClientError> {
        let body: Recommendations = self
            .get(
                &format!("policy/{}/recommendations", path_segment(business_id)?),
                &[],
            )
            .await?;
        Ok(body.recommendations)
    }

    pub async fn policy_applications(
        &self,
        business_id: &str,
    ) -> Result<Vec<PolicyWorkflow>, ClientError> {
        let body: Workflows = self
            .get(
                &format!("policy/{}/applications", path_segment(business_id)?),
                &[],
            )
            .await?;
        Ok(body.workflows)
    }

    pub async fn policy_products(&self) -> Result<Vec<PolicyProductGroup>, ClientError> {
        let body: Groups = self.get("policy/products", &[]).await?;
        Ok(body.groups)
    }

    /// Exchanges credentials for an access token (form-encoded `POST /token`).
    ///
    /// A rejected login maps to [`ClientError::Unauthorized`] with a message
    /// suitable for showing to the user.
    pub async fn login(&self, email: &str, password: &str) -> Result<AccessToken, ClientError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(ClientError::Validation(
                "email and password are required".into(),
            ));
        }
        let response = self
            .client
            .post(self.config.endpoint("token"))
            .form(&[("username", email.trim()), ("password", password)])
            .send()
            .await?;
        let status = response.status();
        if matches!(status.as_u16(), 401 | 403) {
            let body = response.text().await.unwrap_or_default();
            let message = detail_from_body(&body)
                .unwrap_or_else(|| "Incorrect email or password".to_string());
            return Err(ClientError::Unauthorized(message));
        }
        let token: AccessToken = decode_response(response).await?;
        if token.access_token.is_empty() {
            return Err(ClientError::Decode("token response without access_token".into()));
        }
        Ok(token)
    }

    pub async fn signup(&self, request: &SignupRequest) -> Result<Value, ClientError> {
        self.post("auth/signup", request).await
    }

    /// HTTP fallback for the chat socket.
    pub async fn rag_query(&self, query: &QueryFrame) -> Result<RagAnswer, ClientError> {
        if query.query.trim().is_empty() {
            return Err(ClientError::Validation("query must not be empty".into()));
        }
        self.post("rag/query", query).await
    }

    /// Registers the owner's store; returns the stored business record.
    pub async fn business_setup(
        &self,
        request: &BusinessSetupRequest,
    ) -> Result<serde_json::Map<String, Value>, ClientError> {
        let body: BusinessEnvelope = self.post("business/setup", request).await?;
        Ok(body.business)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ClientError> {
        let url = self.config.endpoint(path);
        debug!(%url, "GET");
        let response = self.client.get(&url).query(query).send().await?;
        decode_response(response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = self.config.endpoint(path);
        debug!(%url, "POST");
        let response = self.client.post(&url).json(body).send().await?;
        decode_response(response).await
    }
}

async fn decode_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ClientError::http(status, body));
    }
    // An empty or `null` body decodes like an empty object so defaulted
    // types still come back.
    let value: Value = if body.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(&body)?
    };
    let value = if value.is_null() {
        Value::Object(Default::default())
    } else {
        value
    };
    Ok(serde_json::from_value(value)?)
}

fn path_segment(business_id: &str) -> Result<&str, ClientError> {
    let id = business_id.trim();
    if id.is_empty() || id.contains(['/', '?', '#']) {
        return Err(ClientError::Validation(format!(
            "invalid business id `{business_id}`"
        )));
    }
    Ok(id)
}

/// Last successfully loaded value of some dashboard data.
///
/// A failed refresh is logged and leaves the previous value in place (or the
/// default, before the first success).
#[derive(Clone, Debug, Default)]
pub struct Snapshot<T> {
    value: T,
    loaded: bool,
    last_error: Option<ClientError>,
}

impl<T: Default> Snapshot<T> {
    pub fn new() -> Self {
        Self {
            value: T::default(),
            loaded: false,
            last_error: None,
        }
    }

    /// Awaits `fetch` and keeps its value on success. Returns whether the
    /// value was replaced.
    pub async fn refresh<F>(&mut self, what: &str, fetch: F) -> bool
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        match fetch.await {
            Ok(value) => {
                self.value = value;
                self.loaded = true;
                self.last_error = None;
                true
            }
            Err(err) => {
                warn!(what, error = %err, stale = self.loaded, "refresh failed; keeping previous value");
                self.last_error = Some(err);
                false
            }
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn last_error(&self) -> Option<&ClientError> {
        self.last_error.as_ref()
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}
