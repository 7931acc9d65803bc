use crate::ratelimit::RateLimiter;
use crate::{Error, Result};
use reqwest::{Client, Proxy, RequestBuilder, Response};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

/// Network access handed to every source: one HTTP client configured with the
/// caller's proxy and per-request timeout, plus the shared rate limiter.
#[derive(Debug)]
pub struct Session {
    client: Client,
    rate_limiter: Arc<RateLimiter>,
}

impl Session {
    pub fn new(
        proxy: Option<&str>,
        timeout: Duration,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self> {
        let mut builder = Client::builder().timeout(timeout);
        if let Some(proxy) = proxy {
            builder = builder.proxy(Proxy::all(proxy)?);
        }
        let client = builder.build()?;
        debug!("HTTP Client created: {:?}", client);

        Ok(Self {
            client,
            rate_limiter,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Waits for a `source` token, then sends the request. Gives up with
    /// [`Error::Cancelled`] as soon as `cancel` fires.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        source: &str,
        request: RequestBuilder,
    ) -> Result<Response> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            res = async {
                self.rate_limiter.acquire(source).await;
                http_request(request).await
            } => res,
        }
    }
}

#[instrument(name = "HTTP_request", level = "info", skip_all)]
async fn http_request(request: RequestBuilder) -> Result<Response> {
    info!("Sending request");
    match request.send().await {
        Ok(res) => {
            info!("Receive with status: {}", res.status());
            debug!("Response: {:?}", res);
            Ok(res)
        }
        Err(err) => {
            error!("Reason: {}", err);
            Err(Error::Reqwest(err))
        }
    }
}
