//! HTTP reachability probe.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use pipeline::ports::{ProbeOutcome, ReachabilityProbe};

/// Default per-probe timeout.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(8);

/// Sends one `HEAD` request per URL, following redirects.
///
/// A final status below 400 is reachable. Anything else, including transport
/// failures and timeouts, is [`ProbeOutcome::Unreachable`].
#[derive(Debug, Clone)]
pub struct HttpReachabilityProbe {
    http: reqwest::Client,
}

impl HttpReachabilityProbe {
    /// Builds a probe with the given timeout.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent("atlasgate-probe")
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ReachabilityProbe for HttpReachabilityProbe {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let outcome = match self.http.head(url).send().await {
            Ok(response) => {
                let code = response.status().as_u16();
                if code < 400 {
                    ProbeOutcome::Reachable { code }
                } else {
                    ProbeOutcome::Unreachable {
                        reason: format!("HTTP {code}"),
                    }
                }
            }
            Err(e) => ProbeOutcome::Unreachable {
                reason: e.to_string(),
            },
        };
        debug!(url, outcome = %outcome.summary(), "URL probed");
        outcome
    }
}
