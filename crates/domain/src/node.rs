//! Node addresses and liveness marker labels.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use stickyroute_core::{AppError, AppResult};
use url::Url;

/// Store key prefix for liveness markers.
pub const SERVICE_LABEL_PREFIX: &str = "service:";

/// Externally reachable base URL of one proxy instance.
///
/// The canonical form has no trailing `/`, so `http://a:3000/` and
/// `http://a:3000` name the same node. Lock values hold this canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddress(String);

impl NodeAddress {
    /// Parses and canonicalizes a node address.
    pub fn parse(value: impl AsRef<str>) -> AppResult<Self> {
        let trimmed = value.as_ref().trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(AppError::MisconfiguredAddress(
                "node address must not be empty".to_owned(),
            ));
        }

        let url = Url::parse(trimmed).map_err(|error| {
            AppError::MisconfiguredAddress(format!("invalid node address '{trimmed}': {error}"))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::MisconfiguredAddress(format!(
                "node address '{trimmed}' must use http or https"
            )));
        }

        if url.host_str().is_none_or(str::is_empty) {
            return Err(AppError::MisconfiguredAddress(format!(
                "node address '{trimmed}' must include a host"
            )));
        }

        if url.query().is_some() || url.fragment().is_some() {
            return Err(AppError::MisconfiguredAddress(format!(
                "node address '{trimmed}' must not carry a query or fragment"
            )));
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the canonical address string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the store label of this node's liveness marker.
    #[must_use]
    pub fn service_label(&self) -> ServiceLabel {
        ServiceLabel(format!("{SERVICE_LABEL_PREFIX}{}", self.0))
    }

    /// Builds the absolute URL of `path_and_query` on this node.
    #[must_use]
    pub fn join(&self, path_and_query: &str) -> String {
        if path_and_query.starts_with('/') {
            format!("{}{path_and_query}", self.0)
        } else {
            format!("{}/{path_and_query}", self.0)
        }
    }
}

impl Display for NodeAddress {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Store key of one liveness marker (`service:<address>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceLabel(String);

impl ServiceLabel {
    /// Returns the underlying store key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for ServiceLabel {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}
