use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::{error::Error, net::IpAddr, thread::sleep, time::Duration};

use crate::config::HttpConfig;
use crate::errors::{ReaderError, ReaderResult};

/// Linear backoff step between retries
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn json<T: DeserializeOwned>(&self) -> ReaderResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// The outbound GET capability every adapter goes through.
pub trait HttpFetch: Send + Sync {
    /// Returns the response for any status; only transport failures and
    /// policy rejections are errors.
    fn get(&self, url: &str) -> ReaderResult<HttpResponse>;

    /// Like `get`, but a non-2xx status is an `AdapterFetch` error.
    fn get_ok(&self, url: &str) -> ReaderResult<HttpResponse> {
        let resp = self.get(url)?;
        if !resp.is_success() {
            return Err(ReaderError::fetch(url, format!("status {}", resp.status)));
        }
        Ok(resp)
    }
}

/// Which targets a client may reach.
#[derive(Debug, Clone)]
pub struct UrlPolicy {
    pub allowed_schemes: Vec<String>,
    /// `None` allows any public host.
    pub allowed_hosts: Option<Vec<String>>,
    pub block_private_ips: bool,
}

impl UrlPolicy {
    /// Policy for source adapters: only the configured allowlist.
    pub fn allowlisted(config: &HttpConfig) -> Self {
        Self {
            allowed_schemes: vec!["http".into(), "https".into()],
            allowed_hosts: Some(config.allowed_hosts.clone()),
            block_private_ips: config.block_private_ips,
        }
    }

    /// Policy for web fallback links: any public host.
    pub fn open(config: &HttpConfig) -> Self {
        Self {
            allowed_schemes: vec!["http".into(), "https".into()],
            allowed_hosts: None,
            block_private_ips: config.block_private_ips,
        }
    }

    pub fn check(&self, url_parsed: &url::Url) -> ReaderResult<()> {
        if !self.allowed_schemes.iter().any(|s| s == url_parsed.scheme()) {
            log::warn!("URL scheme '{}' not allowed", url_parsed.scheme());
            return Err(ReaderError::BlockedUrl(url_parsed.to_string()));
        }

        let host = url_parsed.host_str().unwrap_or_default();

        if let Some(allowed) = &self.allowed_hosts {
            if !allowed.iter().any(|h| h == host) {
                log::warn!("Host '{}' is not on the allowlist", host);
                return Err(ReaderError::BlockedUrl(url_parsed.to_string()));
            }
        }

        if self.block_private_ips && is_private_ip(host) {
            log::warn!("Host '{}' resolves to private IP (blocked by SSRF policy)", host);
            return Err(ReaderError::BlockedUrl(url_parsed.to_string()));
        }

        Ok(())
    }
}

fn is_ip_private(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback() || v6.is_unspecified() || (v6.segments()[0] & 0xfe00) == 0xfc00
        }
    }
}

fn is_private_ip(host: &str) -> bool {
    use std::net::ToSocketAddrs;

    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return is_ip_private(&ip);
    }

    if let Ok(addrs) = (host, 80).to_socket_addrs() {
        for addr in addrs {
            if is_ip_private(&addr.ip()) {
                return true;
            }
        }
    }

    false
}

fn get_error(error: &reqwest::Error) -> String {
    match error.source() {
        Some(e) => match e.source() {
            Some(e) => e.to_string(),
            None => e.to_string(),
        },
        None => error.to_string(),
    }
}

/// Builds the URL actually requested: the relay with the absolute target
/// appended, or the target itself.
pub fn relay_target(relay_url: Option<&str>, target: &str) -> String {
    match relay_url {
        Some(relay) => {
            let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
            format!("{relay}{encoded}")
        }
        None => target.to_string(),
    }
}

/// Blocking reqwest client with timeout, URL policy, optional relay and
/// bounded retries.
pub struct HttpClient {
    client: reqwest::blocking::Client,
    relay_url: Option<String>,
    max_retries: u8,
    policy: UrlPolicy,
}

impl HttpClient {
    pub fn new(config: &HttpConfig, policy: UrlPolicy) -> ReaderResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_idle_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ReaderError::Other(anyhow::anyhow!("http client: {e}")))?;

        Ok(Self {
            client,
            relay_url: config.relay_url.clone(),
            max_retries: config.max_retries,
            policy,
        })
    }
}

impl HttpFetch for HttpClient {
    fn get(&self, url: &str) -> ReaderResult<HttpResponse> {
        let mut url = url.to_string();

        if url.starts_with("//") {
            url = format!("https:{}", url);
        }

        let url_parsed = url::Url::parse(&url)
            .map_err(|e| ReaderError::fetch(url.clone(), format!("invalid URL: {e}")))?;
        self.policy.check(&url_parsed)?;

        let iden = format!(
            "{}{}",
            url_parsed.host_str().unwrap_or_default(),
            url_parsed.path()
        );
        let request_url = relay_target(self.relay_url.as_deref(), url_parsed.as_str());

        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                log::debug!("{iden}: retrying (attempt {})", attempt + 1);
                sleep(RETRY_BACKOFF * attempt);
            }
            attempt += 1;
            let retries_left = attempt <= u32::from(self.max_retries);

            log::debug!("{iden}: requesting");

            let resp = match self.client.get(&request_url).send() {
                Ok(r) => r,
                Err(err) => {
                    log::warn!("{iden}: {err}: {}", get_error(&err));
                    if retries_left {
                        continue;
                    }
                    return Err(ReaderError::fetch(url, get_error(&err)));
                }
            };

            let status = resp.status();
            if !status.is_success() {
                log::debug!("{iden}: {status}");
            }

            let transient = status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
            if transient && retries_left {
                continue;
            }

            let body = match resp.bytes() {
                Ok(b) => b,
                Err(err) => {
                    log::debug!("{iden}: body read failed, timeout={}", err.is_timeout());
                    if retries_left {
                        continue;
                    }
                    return Err(ReaderError::fetch(url, get_error(&err)));
                }
            };

            return Ok(HttpResponse {
                status,
                body: body.into(),
            });
        }
    }
}
