//! Response envelope and outcome classification.

use hive_core::constants::{CODE_MEMBER, ERROR_MEMBER, REQUEST_ID_MEMBER, STATUS_MEMBER, STATUS_SUCCESS};
use hive_core::errors::ClientError;
use serde_json::Value;

/// The common members of every correlated response.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseEnvelope {
    /// Correlation id echoed by the server.
    pub request_id: String,
    /// `"success"` or an error marker.
    pub status: Option<String>,
    /// Numeric status code of a failed response.
    pub code: Option<u16>,
    /// Error text of a failed response.
    pub error: Option<String>,
    /// The whole response object.
    pub payload: Value,
}

impl ResponseEnvelope {
    /// Read the envelope members out of a response object.
    pub fn from_value(request_id: &str, payload: Value) -> Result<Self, ClientError> {
        let malformed = |message: String| ClientError::MalformedResponse {
            request_id: request_id.to_owned(),
            message,
        };

        let Some(object) = payload.as_object() else {
            return Err(malformed("response is not a JSON object".into()));
        };

        let status = match object.get(STATUS_MEMBER) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => return Err(malformed(format!("`{STATUS_MEMBER}` is not a string: {other}"))),
        };
        // `code` is only checked on failure.
        let success = status.as_deref() == Some(STATUS_SUCCESS);
        let code = match object.get(CODE_MEMBER) {
            None | Some(Value::Null) => None,
            Some(v) => match v.as_u64().and_then(|n| u16::try_from(n).ok()) {
                Some(code) => Some(code),
                None if success => None,
                None => {
                    return Err(malformed(format!("`{CODE_MEMBER}` is not a status code: {v}")));
                }
            },
        };
        let error = object
            .get(ERROR_MEMBER)
            .and_then(Value::as_str)
            .map(str::to_owned);
        let request_id = object
            .get(REQUEST_ID_MEMBER)
            .and_then(Value::as_str)
            .unwrap_or(request_id)
            .to_owned();

        Ok(Self {
            request_id,
            status,
            code,
            error,
            payload,
        })
    }

    /// Whether the server reported success.
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some(STATUS_SUCCESS)
    }

    /// Map a non-success response onto its error.
    ///
    /// 4xx codes become [`ClientError::Client`], 5xx [`ClientError::Server`];
    /// anything else is malformed.
    pub fn classify(&self) -> Result<(), ClientError> {
        if self.is_success() {
            return Ok(());
        }
        let message = self.error.clone().unwrap_or_default();
        match self.code {
            Some(code) => ClientError::from_status(code, message).map_or_else(
                || {
                    Err(ClientError::MalformedResponse {
                        request_id: self.request_id.clone(),
                        message: format!("failed response with non-error code {code}"),
                    })
                },
                Err,
            ),
            None => Err(ClientError::MalformedResponse {
                request_id: self.request_id.clone(),
                message: format!(
                    "response status is {:?} and carries no `{CODE_MEMBER}`",
                    self.status.as_deref().unwrap_or("missing")
                ),
            }),
        }
    }
}
