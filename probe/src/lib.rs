//! HTTP probing: one shared tuned client, one GET per check, a closed
//! classification of everything that can go wrong on the way.

mod http_prober;

use async_trait::async_trait;
use common::{HttpResult, Monitor};

pub use http_prober::{build_client, HttpProber};

/// Seam between the executor and the network. The production implementation
/// is [`HttpProber`]; tests substitute scripted outcomes.
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    /// Runs one check against the monitor's URL and classifies the outcome.
    /// Never fails: every error becomes a classified result.
    async fn check(&self, monitor: &Monitor) -> HttpResult;
}
