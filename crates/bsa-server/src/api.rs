//! HTTP surface
//!
//! - `GET  /api/v1/state?version=<optional>` - canonical state snapshot
//! - `POST /api/v1/propose` - stage a proposal
//!
//! Both paths answer any other method with 405. Error bodies are plain text.

use bsa_core::{AuthorityError, Proposal, StateAuthority};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::{Method, StatusCode};
use warp::hyper::body::Bytes;
use warp::reply::{Reply, Response};
use warp::Filter;

/// Query parameters of `GET /api/v1/state`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateQuery {
    /// Version selector; accepted, always resolved to latest
    pub version: Option<String>,
}

impl StateQuery {
    /// Build from decoded query pairs
    ///
    /// The first `version` wins; repeats and unknown keys are ignored.
    #[must_use]
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let version = pairs
            .into_iter()
            .find_map(|(key, value)| (key == "version").then_some(value));
        Self { version }
    }
}

/// Body of a 202 response to `POST /api/v1/propose`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposeAccepted {
    /// Always `"accepted"`
    pub status: String,
    /// Intent id of the staged proposal
    pub intent_id: String,
}

impl ProposeAccepted {
    fn new(intent_id: impl Into<String>) -> Self {
        Self {
            status: "accepted".to_string(),
            intent_id: intent_id.into(),
        }
    }
}

/// All routes, traced per request
pub fn routes(
    authority: Arc<StateAuthority>,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    state_route(Arc::clone(&authority))
        .or(propose_route(authority))
        .with(warp::trace::request())
}

fn with_authority(
    authority: Arc<StateAuthority>,
) -> impl Filter<Extract = (Arc<StateAuthority>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&authority))
}

fn state_route(
    authority: Arc<StateAuthority>,
) -> impl Filter<Extract = (Response,), Error = warp::Rejection> + Clone {
    warp::path!("api" / "v1" / "state")
        .and(warp::method())
        .and(lenient_query())
        .and(with_authority(authority))
        .then(get_state)
}

fn lenient_query() -> impl Filter<Extract = (StateQuery,), Error = Infallible> + Clone {
    warp::query::<Vec<(String, String)>>()
        .or(warp::any().map(Vec::new))
        .unify()
        .map(StateQuery::from_pairs)
}

fn propose_route(
    authority: Arc<StateAuthority>,
) -> impl Filter<Extract = (Response,), Error = warp::Rejection> + Clone {
    warp::path!("api" / "v1" / "propose")
        .and(warp::method())
        .and(warp::body::bytes())
        .and(with_authority(authority))
        .then(propose_change)
}

async fn get_state(method: Method, query: StateQuery, authority: Arc<StateAuthority>) -> Response {
    if method != Method::GET {
        return method_not_allowed();
    }

    let state = authority.get_state(query.version.as_deref());
    warp::reply::json(&state).into_response()
}

async fn propose_change(method: Method, body: Bytes, authority: Arc<StateAuthority>) -> Response {
    if method != Method::POST {
        return method_not_allowed();
    }

    let proposal: Proposal = match serde_json::from_slice(&body) {
        Ok(proposal) => proposal,
        Err(e) => {
            tracing::debug!(error = %e, "rejecting unparsable proposal body");
            return text(StatusCode::BAD_REQUEST, "Invalid request body");
        }
    };

    let intent_id = proposal.intent_id.clone();
    let staged = tokio::task::spawn_blocking(move || authority.propose_change(&proposal)).await;

    match staged {
        Ok(Ok(())) => warp::reply::with_status(
            warp::reply::json(&ProposeAccepted::new(intent_id)),
            StatusCode::ACCEPTED,
        )
        .into_response(),
        Ok(Err(e @ AuthorityError::InvalidProposal(_))) => {
            text(StatusCode::BAD_REQUEST, e.to_string())
        }
        Ok(Err(e)) => {
            tracing::error!(intent_id = %intent_id, error = %e, "failed to stage proposal");
            text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            tracing::error!(intent_id = %intent_id, error = %e, "staging task failed");
            text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to stage proposal")
        }
    }
}

fn method_not_allowed() -> Response {
    text(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

fn text(status: StatusCode, message: impl Into<String>) -> Response {
    warp::reply::with_status(message.into(), status).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn authority() -> (TempDir, Arc<StateAuthority>) {
        let dir = TempDir::new().unwrap();
        let authority = Arc::new(StateAuthority::open(dir.path()));
        (dir, authority)
    }

    #[tokio::test]
    async fn state_starts_as_empty_object() {
        let (_dir, authority) = authority();
        let res = warp::test::request()
            .path("/api/v1/state")
            .reply(&routes(authority))
            .await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["content-type"], "application/json");
        assert_eq!(res.body().as_ref(), b"{}");
    }

    #[tokio::test]
    async fn propose_accepts_and_stages() {
        let (_dir, authority) = authority();
        let res = warp::test::request()
            .method("POST")
            .path("/api/v1/propose")
            .body(r#"{"intent_id":"abc","delta_patch":"x=1"}"#)
            .reply(&routes(Arc::clone(&authority)))
            .await;

        assert_eq!(res.status(), StatusCode::ACCEPTED);
        let body: ProposeAccepted = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body, ProposeAccepted::new("abc"));
        assert!(authority.staging().contains("abc"));
    }

    #[tokio::test]
    async fn validation_message_is_plain_text() {
        let (_dir, authority) = authority();
        let res = warp::test::request()
            .method("POST")
            .path("/api/v1/propose")
            .body(r#"{"intent_id":"abc"}"#)
            .reply(&routes(authority))
            .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(res.body().as_ref(), b"delta_patch is required");
    }

    #[test]
    fn first_version_wins() {
        let pairs = vec![
            ("other".to_string(), "x".to_string()),
            ("version".to_string(), "a".to_string()),
            ("version".to_string(), "b".to_string()),
        ];
        assert_eq!(StateQuery::from_pairs(pairs).version.as_deref(), Some("a"));
        assert_eq!(StateQuery::from_pairs(Vec::new()), StateQuery::default());
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let (_dir, authority) = authority();
        let res = warp::test::request()
            .path("/api/v1/other")
            .reply(&routes(authority))
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
