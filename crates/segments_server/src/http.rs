//! HTTP routing and request handling.
//!
//! # Responsibility
//! - Map method + path onto segment and membership use-cases.
//! - Decode JSON request bodies and encode JSON responses.
//! - Translate repository failures into status codes.
//!
//! # Invariants
//! - Body decode failures answer 400; store failures answer 500.
//! - Path parameters are percent-decoded; query strings are ignored.
//! - Handlers borrow the worker's connection for one request only.

use log::warn;
use rusqlite::Connection;
use segments_core::{
    CatalogService, MembershipService, RepoError, SegmentDelta, SqliteMembershipRepository,
    SqliteSegmentRepository,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use tiny_http::Method;

const JSON_CONTENT_TYPE: &str = "application/json";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Use-case addressed by one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Health,
    ListSegments,
    CreateSegment,
    DeleteSegment { slug: String },
    ApplyDelta { user_id: String },
    GetUserSegments { user_id: String },
}

impl Route {
    /// Stable name used in log events instead of the raw path.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::ListSegments => "list_segments",
            Self::CreateSegment => "create_segment",
            Self::DeleteSegment { .. } => "delete_segment",
            Self::ApplyDelta { .. } => "apply_delta",
            Self::GetUserSegments { .. } => "get_user_segments",
        }
    }
}

/// Request failure with its HTTP status.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound,
    /// Path exists; `allow` lists the methods it accepts.
    MethodNotAllowed { allow: &'static str },
    Store(RepoError),
    Encode(serde_json::Error),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::NotFound => 404,
            Self::MethodNotAllowed { .. } => 405,
            Self::Store(_) | Self::Encode(_) => 500,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound => "not_found",
            Self::MethodNotAllowed { .. } => "method_not_allowed",
            Self::Store(RepoError::Conflict(_)) => "segment_exists",
            Self::Store(RepoError::InvalidData(_)) => "corrupt_segment_list",
            Self::Store(_) => "store_failed",
            Self::Encode(_) => "encode_failed",
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(message) => write!(f, "{message}"),
            Self::NotFound => write!(f, "not found"),
            Self::MethodNotAllowed { allow } => write!(f, "method not allowed; use {allow}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Encode(err) => write!(f, "failed to encode response: {err}"),
        }
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Encode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(value: RepoError) -> Self {
        Self::Store(value)
    }
}

/// Transport-neutral response produced by [`handle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: Option<&'static str>,
    /// Value of the `Allow` header on 405 responses.
    pub allow: Option<&'static str>,
    pub body: String,
}

impl ApiResponse {
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            allow: None,
            body: String::new(),
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some(TEXT_CONTENT_TYPE),
            allow: None,
            body: body.into(),
        }
    }

    pub fn json<T: Serialize + ?Sized>(status: u16, value: &T) -> Result<Self, ApiError> {
        Ok(Self {
            status,
            content_type: Some(JSON_CONTENT_TYPE),
            allow: None,
            body: serde_json::to_string(value).map_err(ApiError::Encode)?,
        })
    }
}

impl From<ApiError> for ApiResponse {
    fn from(err: ApiError) -> Self {
        let mut response = Self::text(err.status(), err.to_string());
        if let ApiError::MethodNotAllowed { allow } = err {
            response.allow = Some(allow);
        }
        response
    }
}

/// A missing or `null` slug is stored as the empty slug.
#[derive(Debug, Deserialize)]
struct CreateSegmentBody {
    #[serde(default, deserialize_with = "null_as_empty")]
    slug: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Resolves `method` + `url` to a route.
///
/// A path that exists under another method yields `MethodNotAllowed`.
pub fn parse_route(method: &Method, url: &str) -> Result<Route, ApiError> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let Some(path) = path.strip_prefix('/') else {
        return Err(ApiError::NotFound);
    };
    let parts: Vec<&str> = path.split('/').collect();

    match parts.as_slice() {
        ["healthz"] => match method {
            Method::Get => Ok(Route::Health),
            _ => Err(ApiError::MethodNotAllowed { allow: "GET" }),
        },
        ["segments"] => match method {
            Method::Get => Ok(Route::ListSegments),
            Method::Post => Ok(Route::CreateSegment),
            _ => Err(ApiError::MethodNotAllowed { allow: "GET, POST" }),
        },
        ["segments", slug] if !slug.is_empty() => match method {
            Method::Delete => Ok(Route::DeleteSegment {
                slug: decode_param(slug)?,
            }),
            _ => Err(ApiError::MethodNotAllowed { allow: "DELETE" }),
        },
        // `/users/segments/segments` matches both user routes; the method picks one.
        ["users", first, second] if !first.is_empty() && !second.is_empty() => {
            let membership_path = *second == "segments";
            let query_path = *first == "segments";
            match method {
                Method::Put if membership_path => Ok(Route::ApplyDelta {
                    user_id: decode_param(first)?,
                }),
                Method::Get if query_path => Ok(Route::GetUserSegments {
                    user_id: decode_param(second)?,
                }),
                _ if membership_path && query_path => {
                    Err(ApiError::MethodNotAllowed { allow: "GET, PUT" })
                }
                _ if membership_path => Err(ApiError::MethodNotAllowed { allow: "PUT" }),
                _ if query_path => Err(ApiError::MethodNotAllowed { allow: "GET" }),
                _ => Err(ApiError::NotFound),
            }
        }
        _ => Err(ApiError::NotFound),
    }
}

fn decode_param(raw: &str) -> Result<String, ApiError> {
    urlencoding::decode(raw)
        .map(|value| value.into_owned())
        .map_err(|err| ApiError::BadRequest(format!("invalid path parameter encoding: {err}")))
}

fn decode_body<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|err| ApiError::BadRequest(format!("invalid json: {err}")))
}

/// Runs one routed request against the worker's connection.
pub fn handle(conn: &mut Connection, route: &Route, body: &[u8]) -> Result<ApiResponse, ApiError> {
    match route {
        Route::Health => Ok(ApiResponse::text(200, "ok")),
        Route::ListSegments => {
            let catalog = CatalogService::new(SqliteSegmentRepository::try_new(conn)?);
            ApiResponse::json(200, &catalog.list_segments()?)
        }
        Route::CreateSegment => {
            let request: CreateSegmentBody = decode_body(body)?;
            let catalog = CatalogService::new(SqliteSegmentRepository::try_new(conn)?);
            catalog.create_segment(&request.slug)?;
            Ok(ApiResponse::empty(201))
        }
        Route::DeleteSegment { slug } => {
            let catalog = CatalogService::new(SqliteSegmentRepository::try_new(conn)?);
            catalog.delete_segment(slug)?;
            Ok(ApiResponse::empty(204))
        }
        Route::ApplyDelta { user_id } => {
            let delta: SegmentDelta = decode_body(body)?;
            let mut membership =
                MembershipService::new(SqliteMembershipRepository::try_new(conn)?);
            membership.apply_delta(user_id, &delta)?;
            Ok(ApiResponse::empty(204))
        }
        Route::GetUserSegments { user_id } => {
            let membership = MembershipService::new(SqliteMembershipRepository::try_new(conn)?);
            ApiResponse::json(200, &membership.get_active_segments(user_id)?)
        }
    }
}

/// Routes and handles one request, folding every failure into a response.
///
/// Also returns the route name for logging, `unrouted` when no route matched.
pub fn respond(
    conn: &mut Connection,
    method: &Method,
    url: &str,
    body: &[u8],
) -> (&'static str, ApiResponse) {
    let (name, result) = match parse_route(method, url) {
        Ok(route) => (route.name(), handle(conn, &route, body)),
        Err(err) => ("unrouted", Err(err)),
    };
    let response = match result {
        Ok(response) => response,
        Err(err) => {
            if err.status() >= 500 {
                warn!(
                    "event=http_handle module=http status=error error_code={} error={}",
                    err.error_code(),
                    err
                );
            }
            err.into()
        }
    };
    (name, response)
}
