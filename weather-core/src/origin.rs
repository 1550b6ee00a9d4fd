//! Origin provider seam
//!
//! The origin is the authoritative, slow and rate-limited weather source. The
//! lookup only ever talks to it through this trait; the concrete HTTP client
//! lives in the API crate.

use async_trait::async_trait;

use crate::{CityKey, OriginError, WeatherSnapshot};

// ============================================================================
// ORIGIN CLIENT TRAIT
// ============================================================================

/// Fetches a fresh, fully-converted snapshot for a city.
///
/// `requested_time` is copied verbatim into [`WeatherSnapshot::requested_time`].
/// Implementations must not consult any cache of their own.
#[async_trait]
pub trait OriginClient: Send + Sync {
    async fn fetch(
        &self,
        city: &CityKey,
        requested_time: &str,
    ) -> Result<WeatherSnapshot, OriginError>;

    /// Provider name for logs and metrics.
    fn provider_name(&self) -> &'static str {
        "origin"
    }
}
