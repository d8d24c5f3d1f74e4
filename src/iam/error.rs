//! Typed IAM API errors and the classifier that produces them.
//!
//! Call sites branch on error *kind*: two errors are the same kind when their
//! codes match, whatever the message or status. Compare against the sentinels
//! below with [`ApiError::is`] or [`is_api_error`].

use std::borrow::Cow;
use std::fmt;

use serde::Deserialize;

pub const CODE_METHOD_NOT_ALLOWED: &str = "MethodNotAllowed";
pub const CODE_UNKNOWN_ERROR: &str = "UnknownError";

pub static NO_SUCH_ENTITY: ApiError = ApiError::sentinel("NoSuchEntity");
pub static ENTITY_ALREADY_EXISTS: ApiError = ApiError::sentinel("EntityAlreadyExists");
pub static MALFORMED_POLICY_DOCUMENT: ApiError = ApiError::sentinel("MalformedPolicyDocument");
pub static INVALID_INPUT: ApiError = ApiError::sentinel("InvalidInput");
pub static LIMIT_EXCEEDED: ApiError = ApiError::sentinel("LimitExceeded");
pub static ACCESS_DENIED: ApiError = ApiError::sentinel("AccessDenied");
pub static METHOD_NOT_ALLOWED: ApiError = ApiError::sentinel(CODE_METHOD_NOT_ALLOWED);
pub static UNKNOWN_ERROR: ApiError = ApiError::sentinel(CODE_UNKNOWN_ERROR);

/// An error reported by the IAM API over HTTP.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// Stable identifier, never empty for classified errors.
    pub code: Cow<'static, str>,
    pub message: String,
    pub status_code: u16,
    /// The action that produced this error.
    pub action: String,
}

impl ApiError {
    pub const fn sentinel(code: &'static str) -> Self {
        Self {
            code: Cow::Borrowed(code),
            message: String::new(),
            status_code: 0,
            action: String::new(),
        }
    }

    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        status_code: u16,
        action: impl Into<String>,
    ) -> Self {
        Self {
            code: Cow::Owned(code.into()),
            message: message.into(),
            status_code,
            action: action.into(),
        }
    }

    /// Same kind of error: codes are equal.
    pub fn is(&self, other: &ApiError) -> bool {
        self.code == other.code
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.action.is_empty() {
            write!(f, "{}: ", self.action)?;
        }
        write!(f, "{}", self.code)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if self.status_code != 0 {
            write!(f, " (HTTP {})", self.status_code)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(rename = "Error")]
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "Code", default)]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

/// Turns a non-2xx response into exactly one typed error.
///
/// A bare 405 is checked before the body: the gateway answers actions it does
/// not implement with 405 and no XML at all.
pub fn classify(status_code: u16, body: &[u8], action: &str) -> ApiError {
    if status_code == 405 {
        return ApiError::new(
            CODE_METHOD_NOT_ALLOWED,
            format!(
                "the {} action is not supported by this RadosGW server, it may require a newer server version",
                action
            ),
            status_code,
            action,
        );
    }

    let text = String::from_utf8_lossy(body);
    match quick_xml::de::from_str::<ErrorResponse>(&text) {
        Ok(parsed) if !parsed.error.code.is_empty() => ApiError::new(
            parsed.error.code,
            parsed.error.message,
            status_code,
            action,
        ),
        _ => ApiError::new(CODE_UNKNOWN_ERROR, text.into_owned(), status_code, action),
    }
}

/// Finds the typed API error anywhere in an error's context chain.
pub fn api_error(err: &anyhow::Error) -> Option<&ApiError> {
    err.chain().find_map(|e| e.downcast_ref::<ApiError>())
}

pub fn is_api_error(err: &anyhow::Error, kind: &ApiError) -> bool {
    api_error(err).is_some_and(|e| e.is(kind))
}

pub fn is_not_found(err: &anyhow::Error) -> bool {
    is_api_error(err, &NO_SUCH_ENTITY)
}

pub fn is_method_not_allowed(err: &anyhow::Error) -> bool {
    is_api_error(err, &METHOD_NOT_ALLOWED)
}
