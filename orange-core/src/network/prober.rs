//! Candidate racing.
//!
//! Given several addresses for the same relay, probe them all at once and
//! keep the first that answers. Used only for the first connection; a
//! reconnect goes straight back to the address that worked.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::error::OrangeError;
use crate::network::address::probe_url;

/// Default per-candidate probe deadline.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

// ── Probe ────────────────────────────────────────────────────────

/// A reachability check for one candidate.
#[async_trait]
pub trait Probe: Send + Sync {
    /// `Ok` when the candidate answered in time.
    async fn probe(&self, candidate: &str) -> Result<(), OrangeError>;
}

/// HTTP GET against the candidate. Any response, whatever its status,
/// proves the host is up.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, OrangeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, candidate: &str) -> Result<(), OrangeError> {
        let response = self.client.get(probe_url(candidate)).send().await?;
        debug!(candidate, status = %response.status(), "probe answered");
        Ok(())
    }
}

// ── Prober ───────────────────────────────────────────────────────

/// Races candidates through a [`Probe`].
#[derive(Clone)]
pub struct Prober {
    probe: Arc<dyn Probe>,
}

impl Prober {
    pub fn new(probe: impl Probe + 'static) -> Self {
        Self {
            probe: Arc::new(probe),
        }
    }

    /// Prober backed by [`HttpProbe`] with the given deadline.
    pub fn http(timeout: Duration) -> Result<Self, OrangeError> {
        Ok(Self::new(HttpProbe::new(timeout)?))
    }

    /// Return the first reachable candidate.
    ///
    /// A single candidate is returned without probing. Losing probes are
    /// aborted and awaited before this returns.
    pub async fn race(&self, candidates: &[String]) -> Option<String> {
        match candidates {
            [] => return None,
            [only] => return Some(only.clone()),
            _ => {}
        }

        let mut probes = JoinSet::new();
        for candidate in candidates {
            let probe = Arc::clone(&self.probe);
            let candidate = candidate.clone();
            probes.spawn(async move {
                let result = probe.probe(&candidate).await;
                (candidate, result)
            });
        }

        let mut winner = None;
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((candidate, Ok(()))) => {
                    winner = Some(candidate);
                    break;
                }
                Ok((candidate, Err(e))) => debug!(candidate, "probe failed: {e}"),
                Err(e) => debug!("probe task failed: {e}"),
            }
        }
        probes.shutdown().await;

        match &winner {
            Some(candidate) => info!(candidate, "fastest candidate selected"),
            None => info!(count = candidates.len(), "no candidate reachable"),
        }
        winner
    }
}

// ── Tests ────────────────────────────────────────────────────────
