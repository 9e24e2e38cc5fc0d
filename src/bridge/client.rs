use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::error::{ApiError, ApiResult};

use super::model::{DiscoveryRecord, HueApiResult, LightRecord, NewUserReply, SensorRecord};

/// The device categories the poller fetches. Everything else the bridge
/// knows about (groups, scenes, rules..) is irrelevant to the exporter.
#[async_trait]
pub trait BridgeClient: Send + Sync {
    async fn lights(&self) -> ApiResult<Vec<LightRecord>>;
    async fn sensors(&self) -> ApiResult<Vec<SensorRecord>>;
}

pub struct HueBridge {
    base_url: Url,
    http: reqwest::Client,
    username: String,
}

impl HueBridge {
    const DISCOVERY_URL: &'static str = "https://discovery.meethue.com/";
    const LINK_BUTTON_ERROR: u32 = 101;

    pub fn new(base_url: Url, username: String, timeout: Duration) -> ApiResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            http,
            username,
        })
    }

    /// Locate a bridge on the local network via the N-UPnP discovery
    /// endpoint. The first bridge reported wins.
    pub async fn discover(timeout: Duration) -> ApiResult<Url> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let response = http.get(Self::DISCOVERY_URL).send().await?;
        let bridges: Vec<DiscoveryRecord> = response.error_for_status()?.json().await?;

        let Some(bridge) = bridges.first() else {
            return Err(ApiError::NoBridgeFound);
        };

        log::info!("Bridge ID: {}", bridge.id);
        log::info!("Bridge host: {}", bridge.internalipaddress);

        Ok(Url::parse(&format!(
            "http://{}/",
            bridge.internalipaddress
        ))?)
    }

    fn endpoint_url(&self, endpoint: &str) -> ApiResult<Url> {
        let base = if self.base_url.path().is_empty() {
            format!("{}/", self.base_url)
        } else {
            self.base_url.to_string()
        };
        let base = Url::parse(&base)?;
        Ok(base.join(endpoint.trim_start_matches('/'))?)
    }

    async fn check_status(
        &self,
        response: reqwest::Response,
        action: &str,
    ) -> ApiResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_else(|_| String::new());

        let details = if body.is_empty() {
            format!("{status}")
        } else {
            format!("{status}: {body}")
        };

        Err(ApiError::bridge_error(format!(
            "Bridge error during {action}: {details}"
        )))
    }

    /// The v1 api reports failures as a 200 reply carrying an error array,
    /// so a successful status alone proves nothing.
    fn check_api_error(value: Value) -> ApiResult<Value> {
        if let Some(items) = value.as_array() {
            for item in items {
                if let Some(err) = item.get("error") {
                    let error: super::model::HueError = serde_json::from_value(err.clone())?;
                    return Err(ApiError::HueApiError {
                        error_type: error.error_type,
                        address: error.address,
                        description: error.description,
                    });
                }
            }
        }
        Ok(value)
    }

    async fn get_category<T: DeserializeOwned>(&self, category: &str) -> ApiResult<Vec<T>> {
        let value = self.raw_category(category).await?;
        let map: HashMap<String, T> = serde_json::from_value(value)?;

        /* v1 ids are small integers; sort them so each snapshot arrives in
         * a stable order */
        let mut entries: Vec<(u32, T)> = map
            .into_iter()
            .filter_map(|(id, record)| Some((id.parse().ok()?, record)))
            .collect();
        entries.sort_by_key(|(id, _)| *id);

        Ok(entries.into_iter().map(|(_, record)| record).collect())
    }

    /// Fetch one device category as raw json. Used by `dump` and as the
    /// common path for the typed fetches.
    pub async fn raw_category(&self, category: &str) -> ApiResult<Value> {
        if self.username.is_empty() {
            return Err(ApiError::MissingUsername);
        }

        let url = self.endpoint_url(&format!("api/{}/{category}", self.username))?;
        let response = self.http.get(url).send().await?;
        let response = self
            .check_status(response, &format!("GET /api/../{category}"))
            .await?;

        Self::check_api_error(response.json().await?)
    }

    /// Register a new application key on the bridge. The physical link
    /// button must have been pressed shortly before this call.
    pub async fn create_user(&self, devicetype: &str) -> ApiResult<String> {
        let url = self.endpoint_url("api")?;
        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({ "devicetype": devicetype }))
            .send()
            .await?;
        let response = self.check_status(response, "POST /api").await?;

        let replies: Vec<HueApiResult<NewUserReply>> = response.json().await?;
        match replies.into_iter().next() {
            Some(HueApiResult::Success(reply)) => Ok(reply.username),
            Some(HueApiResult::Error(err)) if err.error_type == Self::LINK_BUTTON_ERROR => {
                Err(ApiError::LinkButtonNotPressed(err.address))
            }
            Some(HueApiResult::Error(err)) => Err(ApiError::HueApiError {
                error_type: err.error_type,
                address: err.address,
                description: err.description,
            }),
            None => Err(ApiError::UnexpectedReply("empty create-user reply".into())),
        }
    }
}

#[async_trait]
impl BridgeClient for HueBridge {
    async fn lights(&self) -> ApiResult<Vec<LightRecord>> {
        self.get_category("lights").await
    }

    async fn sensors(&self) -> ApiResult<Vec<SensorRecord>> {
        self.get_category("sensors").await
    }
}
