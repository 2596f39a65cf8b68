// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Remote Source Adapter (interface only)
//!
//! Specifies the contract a concrete HTTP-backed source must satisfy. No
//! transport, no wire format lives here: this module only pins down what a
//! `_query`/`_update`/`_pull`/`_push` handler consumes (a `Serializer`, a
//! `RequestProcessor`) and the status-mapping rule used to translate a raw
//! response into the error taxonomy. A concrete wire serializer and HTTP
//! transport are deliberately out of scope; the one fake that exercises
//! this trait lives in `orbiter-runtime`'s test suite, never in library
//! code.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::OrbitError;
use crate::record::Record;

/// Converts between a domain `Record` and whatever resource shape the wire
/// format uses (e.g. a JSON:API resource object).
pub trait Serializer: Send + Sync {
    fn serialize(&self, record: &Record) -> Result<Value, OrbitError>;
    fn deserialize(&self, resource: &Value, options: Option<&Value>) -> Result<Record, OrbitError>;
}

/// Settings governing how a request is dispatched: a timeout and any extra
/// headers to attach.
#[derive(Debug, Clone, Default)]
pub struct FetchSettings {
    pub timeout: Option<Duration>,
    pub headers: Vec<(String, String)>,
}

/// The raw outcome of one HTTP exchange, prior to status-mapping.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Option<Value>,
}

/// What a `_query`/`_update`/etc. handler on a remote-backed source
/// consumes to preprocess a response document and to actually perform the
/// exchange. A concrete `RequestProcessor` owns the real fetch function;
/// this crate only pins down the contract.
#[async_trait]
pub trait RequestProcessor: Send + Sync {
    fn fetch_settings(&self) -> FetchSettings;

    /// Applies any transport-specific normalization to a successful
    /// response body before the adapter maps it into domain records.
    fn preprocess_response_document(&self, document: Value, request_description: &str) -> Result<Value, OrbitError> {
        let _ = request_description;
        Ok(document)
    }

    /// Performs the exchange itself. Implementations that exceed
    /// `fetch_settings().timeout` before receiving a response must map that
    /// to [`OrbitError::NetworkError`] with the exact description
    /// `"No fetch response within <timeout>ms."`.
    async fn fetch(&self, url: &str, method: &str, body: Option<Value>) -> Result<RawResponse, OrbitError>;
}

/// Maps a raw HTTP status into the error taxonomy: `2xx` with a body
/// succeeds, `304` succeeds with no data, `4xx`/`5xx` become
/// `ClientError`/`ServerError`.
pub fn classify_status(response: RawResponse) -> Result<Option<Value>, OrbitError> {
    match response.status {
        304 => Ok(None),
        200..=299 => Ok(response.body),
        400..=499 => Err(OrbitError::ClientError {
            status: response.status,
            description: describe(&response),
        }),
        500..=599 => Err(OrbitError::ServerError {
            status: response.status,
            description: describe(&response),
        }),
        other => Err(OrbitError::NetworkError {
            description: format!("unexpected HTTP status {other}"),
        }),
    }
}

fn describe(response: &RawResponse) -> String {
    response
        .body
        .as_ref()
        .and_then(|b| b.get("errors"))
        .map(|e| e.to_string())
        .unwrap_or_else(|| format!("HTTP {}", response.status))
}

/// A remote-backed source must expose all four; `_pull`/`_push` may be
/// absent on sources that never replicate (the default impl in
/// [`crate::interfaces::SourceBackend`] already handles that split).
#[async_trait]
pub trait RemoteAdapter: Send + Sync {
    fn serializer(&self) -> &dyn Serializer;
    fn request_processor(&self) -> &dyn RequestProcessor;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_2xx_with_body_succeeds() {
        let response = RawResponse {
            status: 200,
            body: Some(Value::String("ok".into())),
        };
        assert_eq!(classify_status(response).unwrap(), Some(Value::String("ok".into())));
    }

    #[test]
    fn status_304_has_no_data() {
        let response = RawResponse { status: 304, body: None };
        assert_eq!(classify_status(response).unwrap(), None);
    }

    #[test]
    fn status_4xx_is_client_error() {
        let response = RawResponse { status: 404, body: None };
        assert!(matches!(classify_status(response), Err(OrbitError::ClientError { status: 404, .. })));
    }

    #[test]
    fn status_5xx_is_server_error() {
        let response = RawResponse { status: 503, body: None };
        assert!(matches!(classify_status(response), Err(OrbitError::ServerError { status: 503, .. })));
    }
}
