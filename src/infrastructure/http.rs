use crate::domain::order::OrderNumber;
use crate::domain::ports::{AccrualReply, AccrualTransport};
use crate::error::Result;
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use std::time::Duration;
use tracing::debug;

/// `AccrualTransport` over HTTP.
#[derive(Clone)]
pub struct HttpAccrualTransport {
    client: reqwest::Client,
    base: String,
}

impl HttpAccrualTransport {
    /// `base` is the scheme and authority of the accrual service, e.g.
    /// `http://localhost:8080`. A trailing slash is tolerated.
    pub fn new(base: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base = base.into().trim_end_matches('/').to_string();
        Ok(Self { client, base })
    }

    pub fn order_url(&self, number: &OrderNumber) -> String {
        format!("{}/api/orders/{}", self.base, number)
    }
}

#[async_trait]
impl AccrualTransport for HttpAccrualTransport {
    async fn fetch(&self, number: &OrderNumber) -> Result<AccrualReply> {
        let url = self.order_url(number);
        debug!(%url, "requesting order info");

        let response = self.client.get(&url).send().await?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await?.to_vec();

        Ok(AccrualReply {
            status,
            retry_after,
            body,
        })
    }
}
