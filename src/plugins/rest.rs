//! Generic REST request and response types

use std::collections::HashMap;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};

use crate::Result;
use crate::login::Login;
use crate::status::Status;

/// One call to `/restapi/{objectType}/{arg1}/{arg2}/{arg3}`
///
/// Missing path arguments are empty strings.
#[derive(Debug, Clone)]
pub struct RestApiRequest {
    pub object_type: String,
    pub arg1: String,
    pub arg2: String,
    pub arg3: String,
    /// Permission document of the admin login, `null` when anonymous
    pub perms: Value,
    pub admin_login: Option<Login>,
    pub method: Method,
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    pub body: Bytes,
}

impl RestApiRequest {
    /// Request with only the object-type tuple filled in
    #[must_use]
    pub fn new(
        object_type: impl Into<String>,
        arg1: impl Into<String>,
        arg2: impl Into<String>,
        arg3: impl Into<String>,
    ) -> Self {
        Self {
            object_type: object_type.into(),
            arg1: arg1.into(),
            arg2: arg2.into(),
            arg3: arg3.into(),
            perms: Value::Null,
            admin_login: None,
            method: Method::GET,
            headers: HeaderMap::new(),
            query: HashMap::new(),
            body: Bytes::new(),
        }
    }

    /// Attach a resolved login and its permissions
    #[must_use]
    pub fn with_login(mut self, login: Login) -> Self {
        self.perms = login.permissions();
        self.admin_login = Some(login);
        self
    }

    /// Parse the body as JSON
    ///
    /// # Errors
    ///
    /// Returns error if the body is not valid JSON for `T`
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Response recorder handed to a plugin
///
/// The body can be written once; writing it commits the response. A plugin
/// that faults after committing leaves the host unable to fall back to
/// another plugin.
#[derive(Debug)]
pub struct RestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl Default for RestResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl RestResponse {
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.body.is_some()
    }

    pub fn set_status(&mut self, status: StatusCode) {
        if self.is_committed() {
            tracing::warn!(%status, "status set after response was committed");
            return;
        }
        self.status = status;
    }

    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.is_committed() {
            tracing::warn!(header = %name, "header set after response was committed");
            return;
        }
        self.headers.insert(name, value);
    }

    /// Write the body and commit
    pub fn send(&mut self, body: impl Into<Bytes>) {
        if self.is_committed() {
            tracing::warn!("response body written twice, keeping the first");
            return;
        }
        self.body = Some(body.into());
    }

    /// Write `value` as JSON and commit
    ///
    /// # Errors
    ///
    /// Returns error if `value` cannot be serialized
    pub fn json<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let body = serde_json::to_vec(value)?;
        self.insert_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.send(body);
        Ok(())
    }

    /// Write a `{status, message}` body and commit
    pub fn send_status(&mut self, status: Status, message: &str) {
        let body = json!({ "status": status.code(), "message": message });
        self.insert_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.send(body.to_string());
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}

impl IntoResponse for RestResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, Body::from(self.body.unwrap_or_default())).into_response();
        response.headers_mut().extend(self.headers);
        response
    }
}
