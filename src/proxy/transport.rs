//! Outbound transport through upstream proxies
//!
//! [`ProxyTransport`] is the single capability the forwarding core needs:
//! send one request, through a proxy or directly, within a timeout.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::redirect::Policy;
use tracing::{debug, instrument};

use crate::error::TransportError;
use crate::models::{ForwardRequest, ProxyRecord, UpstreamResponse};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Sends requests through a proxy (or directly when `proxy` is `None`)
#[async_trait]
pub trait ProxyTransport: Send + Sync {
    async fn send(
        &self,
        proxy: Option<&ProxyRecord>,
        request: &ForwardRequest,
        timeout: Duration,
    ) -> Result<UpstreamResponse, TransportError>;
}

/// reqwest-backed transport supporting http, socks4 and socks5 proxies
///
/// One client is built per proxy URL and reused, so connection pools survive
/// across requests.
pub struct ReqwestTransport {
    max_redirects: usize,
    clients: DashMap<Option<String>, reqwest::Client>,
}

impl ReqwestTransport {
    pub fn new(max_redirects: usize) -> Self {
        Self {
            max_redirects,
            clients: DashMap::new(),
        }
    }

    fn client_for(&self, proxy: Option<&ProxyRecord>) -> Result<reqwest::Client, TransportError> {
        let key = proxy.map(ProxyRecord::url);
        if let Some(client) = self.clients.get(&key) {
            return Ok(client.clone());
        }

        let builder = reqwest::Client::builder()
            .redirect(Policy::limited(self.max_redirects))
            .user_agent(DEFAULT_USER_AGENT);

        let builder = match &key {
            Some(url) => {
                let upstream = reqwest::Proxy::all(url.as_str())
                    .map_err(|e| TransportError::Client(format!("invalid proxy {}: {}", url, e)))?;
                builder.proxy(upstream)
            }
            None => builder.no_proxy(),
        };

        let client = builder.build()?;
        debug!(proxy = ?key, "Built outbound client");
        self.clients.insert(key, client.clone());
        Ok(client)
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(5)
    }
}

#[async_trait]
impl ProxyTransport for ReqwestTransport {
    #[instrument(skip_all, fields(proxy = ?proxy.map(|p| p.address()), url = %request.url))]
    async fn send(
        &self,
        proxy: Option<&ProxyRecord>,
        request: &ForwardRequest,
        timeout: Duration,
    ) -> Result<UpstreamResponse, TransportError> {
        let client = self.client_for(proxy)?;

        let mut builder = client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .timeout(timeout);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
