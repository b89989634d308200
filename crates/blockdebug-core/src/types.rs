//! Block range, RPC target and retry policy types.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DriverError;

/// A half-open range of block numbers `[start, start + count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub start: u64,
    pub count: u64,
}

impl BlockRange {
    /// Build a range, rejecting ranges whose end does not fit in a `u64`.
    pub fn new(start: u64, count: u64) -> Result<Self, DriverError> {
        start.checked_add(count).ok_or_else(|| {
            DriverError::invalid(
                "num_blocks",
                format!("range {start} + {count} overflows the block height"),
            )
        })?;
        Ok(Self { start, count })
    }

    /// Exclusive end of the range.
    pub fn end(&self) -> u64 {
        self.start + self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Block numbers in ascending order.
    pub fn blocks(&self) -> std::ops::Range<u64> {
        self.start..self.end()
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end())
    }
}

/// Tracing dialect offered by the RPC provider.
///
/// Unknown tags are kept verbatim in [`RpcFlavor::Other`] so new flavors
/// understood by an external debugger need no change here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RpcFlavor {
    /// Erigon fork exposing the `zeroTracer` and `eth_getWitness`.
    Jerigon,
    /// Stock node with the built-in prestate tracer.
    Native,
    Other(String),
}

impl RpcFlavor {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Jerigon => "jerigon",
            Self::Native => "native",
            Self::Other(s) => s,
        }
    }
}

impl From<RpcFlavor> for String {
    fn from(f: RpcFlavor) -> Self {
        f.as_str().to_string()
    }
}

impl TryFrom<String> for RpcFlavor {
    type Error = DriverError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl FromStr for RpcFlavor {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Err(DriverError::invalid("flavor", "must not be empty")),
            "jerigon" => Ok(Self::Jerigon),
            "native" => Ok(Self::Native),
            _ => Ok(Self::Other(s.to_string())),
        }
    }
}

impl std::fmt::Display for RpcFlavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The endpoint a debugger traces against. Passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcTarget {
    pub endpoint: String,
    pub flavor: RpcFlavor,
}

impl RpcTarget {
    /// Validate and build a target. The endpoint must be a syntactically
    /// valid URL; reachability is never checked here.
    pub fn new(endpoint: impl Into<String>, flavor: &str) -> Result<Self, DriverError> {
        let endpoint = endpoint.into();
        if endpoint.is_empty() {
            return Err(DriverError::invalid("endpoint", "must not be empty"));
        }
        url::Url::parse(&endpoint)
            .map_err(|e| DriverError::invalid("endpoint", format!("`{endpoint}` is not a URL: {e}")))?;
        Ok(Self {
            endpoint,
            flavor: flavor.parse()?,
        })
    }
}

/// Retry settings forwarded to the per-block debugger, which owns the retry loop.
///
/// The default `{0, 0}` means a single attempt with no delay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay between attempts of a failed RPC call.
    pub backoff_millis: u64,
    /// Maximum number of retry attempts (not counting the first try).
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(backoff_millis: u64, max_retries: u32) -> Self {
        Self {
            backoff_millis,
            max_retries,
        }
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_millis)
    }

    /// Returns the delay before the `attempt`-th retry (1-based).
    /// Returns `None` if `attempt` exceeds `max_retries`.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        Some(self.backoff())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_range_has_no_blocks() {
        let range = BlockRange::new(42, 0).unwrap();
        assert!(range.is_empty());
        assert_eq!(range.blocks().count(), 0);
    }

    #[test]
    fn range_is_half_open_and_ascending() {
        let range = BlockRange::new(100, 3).unwrap();
        assert_eq!(range.blocks().collect::<Vec<_>>(), vec![100, 101, 102]);
        assert_eq!(range.to_string(), "[100, 103)");
    }

    #[test]
    fn range_overflow_rejected() {
        let err = BlockRange::new(u64::MAX, 2).unwrap_err();
        assert!(matches!(err, DriverError::InvalidArgument { field: "num_blocks", .. }));
    }

    #[test]
    fn flavor_round_trips_verbatim() {
        assert_eq!("jerigon".parse::<RpcFlavor>().unwrap(), RpcFlavor::Jerigon);
        assert_eq!("native".parse::<RpcFlavor>().unwrap(), RpcFlavor::Native);
        let other: RpcFlavor = "reth-ext".parse().unwrap();
        assert_eq!(other, RpcFlavor::Other("reth-ext".into()));
        assert_eq!(other.to_string(), "reth-ext");
    }

    #[test]
    fn flavor_deserialization_rejects_empty() {
        let native: RpcFlavor = serde_json::from_str("\"native\"").unwrap();
        assert_eq!(native, RpcFlavor::Native);
        assert!(serde_json::from_str::<RpcFlavor>("\"\"").is_err());
        assert!(serde_json::from_str::<RpcTarget>(
            r#"{"endpoint": "http://host:8545", "flavor": ""}"#
        )
        .is_err());
        assert_eq!(serde_json::to_string(&native).unwrap(), "\"native\"");
    }

    #[test]
    fn target_rejects_bad_endpoint() {
        assert!(RpcTarget::new("", "native").is_err());
        assert!(RpcTarget::new("not a url", "native").is_err());
        assert!(RpcTarget::new("http://host:8545", "").is_err());
        let t = RpcTarget::new("http://host:8545", "native").unwrap();
        assert_eq!(t.flavor, RpcFlavor::Native);
    }

    #[test]
    fn default_retry_is_single_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy, RetryPolicy::new(0, 0));
        assert!(policy.next_delay(1).is_none());
    }

    #[test]
    fn retry_delay_is_constant_backoff() {
        let policy = RetryPolicy::new(250, 2);
        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(250)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(250)));
        assert!(policy.next_delay(3).is_none());
    }
}
