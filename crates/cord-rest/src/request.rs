//! A buffered REST request.
//!
//! Bodies are held as bytes so the governor can re-send the identical
//! request across rate-limit and transport retries.

use serde::Serialize;

use crate::error::RestError;
use crate::routes::Route;

/// A file to upload alongside a request.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// File name shown to users.
    pub filename: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// A REST request ready for submission to the governor.
#[derive(Debug, Clone)]
pub struct Request {
    /// Endpoint route.
    pub route: Route,
    /// JSON body bytes, when the endpoint takes one.
    pub body: Option<Vec<u8>>,
    /// Query-string parameters.
    pub query: Vec<(&'static str, String)>,
    /// Value for the `X-Audit-Log-Reason` header.
    pub audit_log_reason: Option<String>,
    /// File upload; switches the request to multipart.
    pub attachment: Option<Attachment>,
}

impl Request {
    /// Create a bodyless request.
    #[must_use]
    pub fn new(route: Route) -> Self {
        Self {
            route,
            body: None,
            query: Vec::new(),
            audit_log_reason: None,
            attachment: None,
        }
    }

    /// Append a query-string parameter.
    #[must_use]
    pub fn query(mut self, name: &'static str, value: String) -> Self {
        self.query.push((name, value));
        self
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body fails to serialize.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, RestError> {
        self.body = Some(serde_json::to_vec(body)?);
        Ok(self)
    }

    /// Attach an audit-log reason.
    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.audit_log_reason = Some(reason.into());
        self
    }

    /// Attach a file, switching the request to multipart.
    #[must_use]
    pub fn attach(mut self, filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.attachment = Some(Attachment {
            filename: filename.into(),
            bytes,
        });
        self
    }
}
