//! `Applier` over the Mastodon 4.x admin domain_blocks endpoints.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use url::Url;

use crate::apply::Applier;
use crate::domain_block::DomainBlock;
use crate::error::ApplyError;
use crate::rest::link::links_from_headers;

/// Sent as the User-Agent on every request.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

const DOMAIN_BLOCKS_PATH: &str = "api/v1/admin/domain_blocks";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Talks to `{base}/api/v1/admin/domain_blocks` with a bearer token.
///
/// Every call is its own request: there is no transaction spanning a run, so a failure
/// partway through leaves the earlier mutations applied.
pub struct RestApplier {
    client: Client,
    base_url: Url,
    token: String,
}

impl RestApplier {
    pub fn new(base_url: &str, token: &str) -> Result<Self, ApplyError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ApplyError::Http {
                method: Method::GET,
                url: base_url.to_string(),
                source: e,
            })?;
        Self::with_client(client, base_url, token)
    }

    /// Use a preconfigured client (proxies, custom TLS roots).
    pub fn with_client(client: Client, base_url: &str, token: &str) -> Result<Self, ApplyError> {
        let mut base_url = Url::parse(base_url).map_err(|e| ApplyError::InvalidUrl {
            url: base_url.to_string(),
            source: e,
        })?;
        // so that join() appends instead of replacing the last segment
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            client,
            base_url,
            token: token.to_string(),
        })
    }

    fn endpoint(&self, id: Option<&str>) -> Result<Url, ApplyError> {
        let path = match id {
            Some(id) => format!("{}/{}", DOMAIN_BLOCKS_PATH, id),
            None => DOMAIN_BLOCKS_PATH.to_string(),
        };
        self.base_url.join(&path).map_err(|e| ApplyError::InvalidUrl {
            url: format!("{}{}", self.base_url, path),
            source: e,
        })
    }

    fn request(&self, method: Method, url: &Url) -> RequestBuilder {
        self.client
            .request(method, url.clone())
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
    }

    /// Send, require 200, and decode the body. An empty body decodes as JSON `null`.
    async fn send<T>(
        &self,
        method: Method,
        url: &Url,
        builder: RequestBuilder,
    ) -> Result<(T, reqwest::header::HeaderMap), ApplyError>
    where
        T: DeserializeOwned,
    {
        tracing::debug!(method = %method, url = %url, "request");
        let http_err = |e| ApplyError::Http {
            method: method.clone(),
            url: url.to_string(),
            source: e,
        };
        let resp = builder.send().await.map_err(http_err)?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.text().await.map_err(http_err)?;
        if status != StatusCode::OK {
            return Err(ApplyError::UnexpectedStatus {
                method,
                url: url.to_string(),
                status,
            });
        }
        let body = if body.trim().is_empty() { "null" } else { body.as_str() };
        let value = serde_json::from_str(body).map_err(|e| ApplyError::Decode {
            method: method.clone(),
            url: url.to_string(),
            status,
            source: e,
        })?;
        Ok((value, headers))
    }
}

/// Form fields shared by create and update. Absent comments are left out, not sent empty.
fn block_form(block: &DomainBlock, include_domain: bool) -> Vec<(&'static str, String)> {
    let mut form = Vec::with_capacity(7);
    if include_domain {
        form.push(("domain", block.domain.clone()));
    }
    form.push(("severity", block.severity.name().to_string()));
    if let Some(c) = &block.private_comment {
        form.push(("private_comment", c.clone()));
    }
    if let Some(c) = &block.public_comment {
        form.push(("public_comment", c.clone()));
    }
    form.push(("reject_media", block.reject_media.to_string()));
    form.push(("reject_reports", block.reject_reports.to_string()));
    form.push(("obfuscate", block.obfuscate.to_string()));
    form
}

#[async_trait]
impl Applier for RestApplier {
    async fn query(&mut self, out: &mut HashMap<String, DomainBlock>) -> Result<(), ApplyError> {
        let mut url = self.endpoint(None)?;
        let mut seen = HashSet::new();
        loop {
            if !seen.insert(url.to_string()) {
                return Err(ApplyError::PaginationCycle(url.to_string()));
            }
            let builder = self.request(Method::GET, &url);
            let (blocks, headers): (Vec<DomainBlock>, _) = self.send(Method::GET, &url, builder).await?;
            tracing::debug!(url = %url, count = blocks.len(), "page");
            for block in blocks {
                out.insert(block.domain.clone(), block);
            }

            let links = links_from_headers(&headers).map_err(|e| ApplyError::LinkHeader {
                url: url.to_string(),
                source: e,
            })?;
            let Some(next) = links.iter().find(|l| l.has_rel("next")) else {
                return Ok(());
            };
            let next = next.resolve(&url).map_err(|e| ApplyError::InvalidUrl {
                url: next.target.clone(),
                source: e,
            })?;
            // the bearer token only goes to the configured instance
            if next.origin() != self.base_url.origin() {
                return Err(ApplyError::CrossOriginLink {
                    url: next.to_string(),
                    origin: self.base_url.origin().ascii_serialization(),
                });
            }
            url = next;
        }
    }

    async fn insert(&mut self, block: &DomainBlock) -> Result<(), ApplyError> {
        let url = self.endpoint(None)?;
        let builder = self
            .request(Method::POST, &url)
            .form(&block_form(block, true));
        let (created, _): (DomainBlock, _) = self.send(Method::POST, &url, builder).await?;
        tracing::debug!(id = %created.id, domain = %created.domain, "created domain block");
        Ok(())
    }

    async fn update(&mut self, block: &DomainBlock) -> Result<(), ApplyError> {
        let url = self.endpoint(Some(&block.id.to_string()))?;
        let builder = self
            .request(Method::PUT, &url)
            .form(&block_form(block, false));
        let (updated, _): (DomainBlock, _) = self.send(Method::PUT, &url, builder).await?;
        tracing::debug!(id = %updated.id, domain = %updated.domain, "updated domain block");
        Ok(())
    }

    async fn delete(&mut self, block: &DomainBlock) -> Result<(), ApplyError> {
        let url = self.endpoint(Some(&block.id.to_string()))?;
        let builder = self.request(Method::DELETE, &url);
        let _: (serde_json::Value, _) = self.send(Method::DELETE, &url, builder).await?;
        tracing::debug!(id = %block.id, domain = %block.domain, "deleted domain block");
        Ok(())
    }
}
