//! Maps cache outcomes onto conditional responses.

use crate::cache::DeltaCache;
use crate::error::CacheResult;
use crate::notifier::ChangeNotifier;
use crate::store::FeatureStore;
use flagdelta_protocol::{ClientFeatureChange, ClientFeaturesDelta, DeltaQuery};
use std::sync::Arc;
use tracing::trace;

/// Response to a delta poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaResponse {
    /// The client is current; echo its validator.
    NotModified {
        /// Validator the client presented.
        etag: String,
    },
    /// New events and the validator to present next time.
    Ok {
        /// Validator for the revision the body brings the client to.
        etag: String,
        /// Events to apply.
        body: ClientFeaturesDelta,
    },
}

impl DeltaResponse {
    /// The validator carried by the response.
    pub fn etag(&self) -> &str {
        match self {
            DeltaResponse::NotModified { etag } | DeltaResponse::Ok { etag, .. } => etag,
        }
    }

    /// Returns true for a not-modified response.
    pub fn is_not_modified(&self) -> bool {
        matches!(self, DeltaResponse::NotModified { .. })
    }

    /// The body, if any.
    pub fn body(&self) -> Option<&ClientFeaturesDelta> {
        match self {
            DeltaResponse::NotModified { .. } => None,
            DeltaResponse::Ok { body, .. } => Some(body),
        }
    }
}

/// Renders a revision id as a strong ETag.
pub fn format_validator(revision_id: u64) -> String {
    format!("\"{revision_id}\"")
}

/// Parses a client validator.
///
/// Accepts `"42"`, `42` and `W/"42"`. Anything else reads as no validator,
/// which earns the client a full snapshot.
pub fn parse_validator(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let raw = raw.strip_prefix("W/").unwrap_or(raw);
    let raw = raw
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(raw);
    raw.parse().ok()
}

/// Request-handling seam in front of a [`DeltaCache`].
pub struct DeltaHandler<S, N> {
    cache: Arc<DeltaCache<S, N>>,
}

impl<S, N> Clone for DeltaHandler<S, N> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<S: FeatureStore, N: ChangeNotifier> DeltaHandler<S, N> {
    /// Creates a handler over a shared cache.
    pub fn new(cache: Arc<DeltaCache<S, N>>) -> Self {
        Self { cache }
    }

    /// The underlying cache.
    pub fn cache(&self) -> &Arc<DeltaCache<S, N>> {
        &self.cache
    }

    /// Handles one poll carrying an optional `If-None-Match` value.
    pub async fn handle(
        &self,
        if_none_match: Option<&str>,
        query: &DeltaQuery,
    ) -> CacheResult<DeltaResponse> {
        let client_revision = if_none_match.and_then(parse_validator);
        trace!(
            environment = %query.environment,
            ?client_revision,
            "delta poll"
        );

        let response = match self.cache.resolve_delta(client_revision, query).await? {
            ClientFeatureChange::Unchanged => DeltaResponse::NotModified {
                etag: format_validator(client_revision.unwrap_or_default()),
            },
            ClientFeatureChange::Delta(delta) => DeltaResponse::Ok {
                etag: format_validator(delta.revision_id),
                body: ClientFeaturesDelta::from_delta(&delta),
            },
            ClientFeatureChange::FullSnapshot(snapshot) => {
                let segments = self.cache.segments().await?;
                DeltaResponse::Ok {
                    etag: format_validator(snapshot.revision_id),
                    body: ClientFeaturesDelta::hydration(&snapshot, &segments),
                }
            }
        };
        Ok(response)
    }
}
