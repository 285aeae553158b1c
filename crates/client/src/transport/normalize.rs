//! Normalization of heterogeneous failure shapes into [`ApiFailure`].
//!
//! Three shapes come off the wire: transport failures that never produced a
//! response, field-keyed validation maps, and generic error payloads that
//! already carry `message`/`errors`/`detail`. Everything is collapsed into
//! the one result contract, totally: any input, including no body at all,
//! produces a well-formed failure.

use std::collections::BTreeMap;

use reqwest::StatusCode;
use serde_json::Value;

use crate::auth::AuthError;
use crate::crypto::CryptoError;
use crate::error::{ApiErrorKind, ApiFailure};

/// Stateless failure classifier used by the request pipeline.
pub struct ErrorNormalizer;

impl ErrorNormalizer {
    /// Normalize a transport-level failure (no response reached the client).
    ///
    /// Timeouts land here too; they are network failures, never 401s.
    #[must_use]
    pub fn from_transport(_error: &reqwest::Error) -> ApiFailure {
        ApiFailure::network()
    }

    /// Normalize a non-success HTTP response.
    #[must_use]
    pub fn from_response(status: StatusCode, body: Option<&Value>) -> ApiFailure {
        let code = status.as_u16();
        match code {
            401 => ApiFailure::auth(
                Self::extract_message(body)
                    .unwrap_or_else(|| "Authentication required".to_string()),
            )
            .with_status(code),
            403 => ApiFailure::permission(
                Self::extract_message(body).unwrap_or_else(|| {
                    "You do not have permission to perform this action".to_string()
                }),
            )
            .with_status(code),
            _ => {
                if status.is_client_error() {
                    if let Some(map) = body.and_then(Self::field_error_map) {
                        return Self::validation_failure(map, code);
                    }
                }
                Self::passthrough(code, body)
            }
        }
    }

    /// Fold a refresh-path failure into the caller-facing contract.
    #[must_use]
    pub fn auth_failure(error: &AuthError) -> ApiFailure {
        ApiFailure::auth(error.to_string())
    }

    /// Fold a payload crypto failure into the caller-facing contract.
    ///
    /// The specific cause goes to the log at the call site; callers only see
    /// an opaque failure so crypto internals never leak into UI text.
    #[must_use]
    pub fn crypto_failure(_error: &CryptoError) -> ApiFailure {
        ApiFailure::unknown("Unable to process the server response")
    }

    /// Fold a response deserialization failure into the contract.
    #[must_use]
    pub fn decode_failure(_error: &serde_json::Error) -> ApiFailure {
        ApiFailure::unknown("Malformed server response")
    }

    /// Detect a field-keyed validation map: a JSON object with none of the
    /// generic keys, whose values are strings or arrays of strings.
    fn field_error_map(body: &Value) -> Option<BTreeMap<String, Vec<String>>> {
        let object = body.as_object()?;
        if object.is_empty()
            || object.contains_key("message")
            || object.contains_key("errors")
            || object.contains_key("detail")
        {
            return None;
        }

        let mut map = BTreeMap::new();
        for (field, value) in object {
            let messages = match value {
                Value::String(message) => vec![message.clone()],
                Value::Array(items) => {
                    let mut collected = Vec::with_capacity(items.len());
                    for item in items {
                        collected.push(item.as_str()?.to_string());
                    }
                    collected
                }
                _ => return None,
            };
            if messages.is_empty() {
                return None;
            }
            map.insert(field.clone(), messages);
        }
        Some(map)
    }

    /// Flatten a validation map into `"field: message"` entries. Iteration
    /// over the map is ordered, so the flattening is deterministic and the
    /// first entry doubles as the primary message.
    fn validation_failure(map: BTreeMap<String, Vec<String>>, status: u16) -> ApiFailure {
        let flattened: Vec<String> = map
            .iter()
            .flat_map(|(field, messages)| {
                messages.iter().map(move |message| format!("{field}: {message}"))
            })
            .collect();
        let message = flattened
            .first()
            .cloned()
            .unwrap_or_else(|| "Validation failed".to_string());

        ApiFailure::validation(message, flattened, map).with_status(status)
    }

    /// Pass a generic error payload through with safe defaults.
    fn passthrough(status: u16, body: Option<&Value>) -> ApiFailure {
        let message = Self::extract_message(body)
            .unwrap_or_else(|| format!("Request failed with status {status}"));
        let errors = Self::extract_errors(body).unwrap_or_else(|| vec![message.clone()]);

        ApiFailure {
            kind: ApiErrorKind::Unknown,
            message,
            errors,
            field_errors: None,
            status: Some(status),
        }
    }

    fn extract_message(body: Option<&Value>) -> Option<String> {
        let body = body?;
        for key in ["message", "detail"] {
            if let Some(message) = body.get(key).and_then(Value::as_str) {
                return Some(message.to_string());
            }
        }
        None
    }

    fn extract_errors(body: Option<&Value>) -> Option<Vec<String>> {
        let items = body?.get("errors")?.as_array()?;
        let collected: Vec<String> = items
            .iter()
            .filter_map(|item| item.as_str().map(ToString::to_string))
            .collect();
        (!collected.is_empty()).then_some(collected)
    }
}
