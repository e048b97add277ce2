use std::sync::Arc;

use http::{HeaderMap, header};
use itertools::Itertools;
use reqwest::Method;
use snafu::{ResultExt, Snafu};
use url::Url;

use crate::internal::bridge::AuthBridge;
use crate::platform::CapabilityError;
use crate::response::ErrorResponse;
use crate::storage::StorageError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RequestError {
    #[snafu(display("RequestError: Could not send request"))]
    Send { source: reqwest::Error },

    #[snafu(display("RequestError: Could not decode payload"))]
    Decode { source: reqwest::Error },

    #[snafu(display("RequestError: Could not serialize or deserialize data: {source}"))]
    Serde { source: serde_json::Error },

    #[snafu(display("RequestError: Received an error response"))]
    ErrResponse { error_response: ErrorResponse },

    #[snafu(display("RequestError: Could not access the preference store"))]
    Storage { source: StorageError },

    #[snafu(display("RequestError: Missing or failing platform capability"))]
    Capability { source: CapabilityError },
}

/// The mutable pieces of an outgoing request. Handed to the bridge's `init`
/// hook, which may attach headers and rewrite the body before sending.
#[derive(Debug)]
pub(crate) struct RequestInit {
    pub(crate) headers: HeaderMap,
    pub(crate) body: Option<serde_json::Value>,
}

/// Read-only view of a completed, successful request, handed to the bridge's
/// `on_success` hook.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResponseContext<'a> {
    pub(crate) request_url: &'a Url,
    pub(crate) request_body: Option<&'a serde_json::Value>,
    pub(crate) headers: &'a HeaderMap,
    pub(crate) data: Option<&'a serde_json::Value>,
}

/// All `Set-Cookie` headers of a response as one comma-joined value.
///
/// This is the combined form a browser `fetch` exposes, and the form the
/// cookie codec splits again.
pub(crate) fn combined_set_cookie_header(headers: &HeaderMap) -> Option<String> {
    let combined = headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .join(", ");
    (!combined.is_empty()).then_some(combined)
}

/// Send one request to the auth server, routed through the bridge's `init`
/// and `on_success` hooks.
///
/// Non-2xx responses are decoded into an [`ErrorResponse`] and never reach
/// `on_success`, so error bodies can never pollute the jar or the session
/// cache.
pub(crate) async fn execute(
    bridge: &Arc<AuthBridge>,
    method: Method,
    url: Url,
    body: Option<serde_json::Value>,
) -> Result<Option<serde_json::Value>, RequestError> {
    let RequestInit { headers, body } = bridge
        .init(
            &url,
            RequestInit {
                headers: HeaderMap::new(),
                body,
            },
        )
        .await?;

    let mut request = reqwest::Client::new()
        .request(method, url.clone())
        .headers(headers);
    if let Some(body) = &body {
        request = request.json(body);
    }

    let response = request.send().await.context(SendSnafu {})?;
    let status = response.status();
    let response_headers = response.headers().clone();
    let text = response.text().await.context(DecodeSnafu {})?;
    let data = serde_json::from_str::<serde_json::Value>(&text).ok();

    if !status.is_success() {
        let mut error_response = data
            .and_then(|value| serde_json::from_value::<ErrorResponse>(value).ok())
            .unwrap_or_default();
        error_response.status = status.as_u16();
        return Err(ErrResponseSnafu { error_response }.build());
    }

    bridge
        .on_success(ResponseContext {
            request_url: &url,
            request_body: body.as_ref(),
            headers: &response_headers,
            data: data.as_ref(),
        })
        .await?;

    Ok(data)
}

#[cfg(test)]
mod tests {
    use assertr::prelude::*;
    use http::HeaderValue;

    use super::*;

    #[test]
    fn combines_multiple_set_cookie_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::SET_COOKIE, HeaderValue::from_static("a=1; Path=/"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));

        assert_that(combined_set_cookie_header(&headers))
            .is_equal_to(Some("a=1; Path=/, b=2".to_owned()));
    }

    #[test]
    fn no_set_cookie_headers_yield_none() {
        let headers = HeaderMap::new();
        assert_that(combined_set_cookie_header(&headers)).is_equal_to(None);
    }
}
