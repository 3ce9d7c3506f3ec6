//! HTTP probes over `reqwest`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;

use crate::error::ProbeError;
use crate::outcome::Outcome;
use crate::probe::Probe;

/// Status and body of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Require a 2xx status.
    pub fn ensure_success(&self, target: &str) -> Result<(), ProbeError> {
        if self.is_success() {
            Ok(())
        } else {
            Err(ProbeError::status(target, self.status))
        }
    }

    /// Decode the body into a typed response; only the fields the type names
    /// are read.
    pub fn json<T: DeserializeOwned>(&self, target: &str) -> Result<T, ProbeError> {
        serde_json::from_str(&self.body).map_err(|e| ProbeError::malformed(target, e))
    }
}

/// Turns a reply into an outcome. Receives the probe target for messages.
pub type Classifier = Arc<dyn Fn(&str, &HttpReply) -> Outcome + Send + Sync>;

/// Build a [`Classifier`] from a closure.
pub fn classifier<F>(f: F) -> Classifier
where
    F: Fn(&str, &HttpReply) -> Outcome + Send + Sync + 'static,
{
    Arc::new(f)
}

/// 2xx with a body that decodes as `T`, then judged by `judge`.
pub fn expect_json<T, F>(judge: F) -> Classifier
where
    T: DeserializeOwned,
    F: Fn(&str, T) -> Outcome + Send + Sync + 'static,
{
    classifier(move |target, reply| {
        if let Err(err) = reply.ensure_success(target) {
            return Outcome::Error(err);
        }
        match reply.json::<T>(target) {
            Ok(value) => judge(target, value),
            Err(err) => Outcome::Error(err),
        }
    })
}

/// 2xx is a success and 404 means not there yet.
pub fn expect_found() -> Classifier {
    classifier(|target, reply| match reply.status {
        404 => Outcome::Absent,
        _ => match reply.ensure_success(target) {
            Ok(()) => Outcome::success(format!("HTTP {}", reply.status)),
            Err(err) => Outcome::Error(err),
        },
    })
}

/// Any 2xx reply is a success.
pub fn expect_ok() -> Classifier {
    classifier(|target, reply| match reply.ensure_success(target) {
        Ok(()) => Outcome::success(format!("HTTP {}", reply.status)),
        Err(err) => Outcome::Error(err),
    })
}

/// 2xx and the body contains `needle`; a 2xx without it is Absent.
pub fn expect_body_contains(needle: impl Into<String>) -> Classifier {
    let needle = needle.into();
    classifier(move |target, reply| {
        if let Err(err) = reply.ensure_success(target) {
            return Outcome::Error(err);
        }
        if reply.body.contains(&needle) {
            Outcome::success(format!("found {needle:?}"))
        } else {
            Outcome::Absent
        }
    })
}

/// Exactly `status`; any other 2xx is an assertion failure.
pub fn expect_status(status: u16) -> Classifier {
    classifier(move |target, reply| {
        if reply.status == status {
            Outcome::success(format!("HTTP {}", reply.status))
        } else if reply.is_success() {
            Outcome::Error(ProbeError::assertion(
                target,
                format!("expected HTTP {status}, got {}", reply.status),
            ))
        } else {
            Outcome::Error(ProbeError::status(target, reply.status))
        }
    })
}

/// Shared HTTP client with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let inner = reqwest::Client::builder()
            .user_agent(concat!("pipecheck/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ProbeError::unreachable("http client", e))?;
        Ok(Self { inner, timeout })
    }

    /// One request, mapped onto the probe error taxonomy.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<HttpReply, ProbeError> {
        let target = format!("{method} {url}");
        let mut request = self.inner.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(&target, e))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(&target, e))?;

        Ok(HttpReply { status, body })
    }

    fn transport_error(&self, target: &str, err: reqwest::Error) -> ProbeError {
        if err.is_timeout() {
            ProbeError::timeout(target, self.timeout)
        } else if err.is_decode() || err.is_body() {
            ProbeError::malformed(target, err)
        } else {
            ProbeError::unreachable(target, err)
        }
    }
}

/// One HTTP request classified by a per-check function.
pub struct HttpProbe {
    client: HttpClient,
    method: Method,
    url: String,
    body: Option<serde_json::Value>,
    classify: Classifier,
}

impl HttpProbe {
    pub fn get(client: &HttpClient, url: impl Into<String>, classify: Classifier) -> Self {
        Self {
            client: client.clone(),
            method: Method::GET,
            url: url.into(),
            body: None,
            classify,
        }
    }

    pub fn head(client: &HttpClient, url: impl Into<String>, classify: Classifier) -> Self {
        Self {
            method: Method::HEAD,
            ..Self::get(client, url, classify)
        }
    }

    pub fn post_json(
        client: &HttpClient,
        url: impl Into<String>,
        body: serde_json::Value,
        classify: Classifier,
    ) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::get(client, url, classify)
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    fn target(&self) -> String {
        format!("{} {}", self.method, self.url)
    }

    async fn observe(&self) -> Outcome {
        let target = self.target();
        match self
            .client
            .send(self.method.clone(), &self.url, self.body.as_ref())
            .await
        {
            Ok(reply) => (self.classify)(&target, &reply),
            Err(err) => Outcome::Error(err),
        }
    }
}

/// Join a base URL and a path without doubling the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
