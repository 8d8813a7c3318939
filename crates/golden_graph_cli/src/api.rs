//! HTTP-agnostic request routing over `GraphService`.
//!
//! # Responsibility
//! - Map `(method, path, query, body, caller)` onto one service call.
//! - Render results and service errors as JSON with stable status codes.
//!
//! # Invariants
//! - Error bodies are `{"error": <kind>, "message": <text>}`.
//! - Validation -> 422, conflict -> 409, missing identity -> 401, other
//!   authorization failures -> 403, not found -> 404, consistency and
//!   storage -> 500.

use crate::config::TokenTable;
use golden_graph_core::{
    Caller, DomainDeleteMode, ErrorKind, GraphFilter, GraphService,
    NewPrinciple, PrinciplePatch, ServiceError,
};
use hyper::{Method, StatusCode};
use log::error;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::form_urlencoded;
use uuid::Uuid;

/// Rendered response, independent of the HTTP stack.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: ResponseBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Text(String),
}

impl ApiResponse {
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(body) => Self {
                status,
                body: ResponseBody::Json(body),
            },
            Err(err) => Self::error(StatusCode::INTERNAL_SERVER_ERROR, "internal", &err.to_string()),
        }
    }

    pub fn text(status: StatusCode, body: &str) -> Self {
        Self {
            status,
            body: ResponseBody::Text(body.to_string()),
        }
    }

    pub fn error(status: StatusCode, kind: &str, message: &str) -> Self {
        Self {
            status,
            body: ResponseBody::Json(json!({ "error": kind, "message": message })),
        }
    }
}

/// Resolves the caller from an `Authorization` header value.
///
/// No header means an anonymous reader; an unknown token is rejected.
pub fn authenticate(tokens: &TokenTable, header: Option<&str>) -> Result<Caller, ApiResponse> {
    let Some(header) = header else {
        return Ok(Caller::anonymous());
    };
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .unwrap_or("");
    tokens.lookup(token).cloned().ok_or_else(|| {
        ApiResponse::error(
            StatusCode::UNAUTHORIZED,
            ErrorKind::Authorization.as_str(),
            "invalid bearer token",
        )
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DomainBody {
    name: String,
}

/// Routes one request against an open, migrated connection.
pub fn route(
    conn: &Connection,
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: &[u8],
    caller: &Caller,
) -> ApiResponse {
    let service = GraphService::new(conn);
    let segments: Vec<&str> = path
        .trim_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    let query = QueryParams::parse(query);

    match (method.clone(), segments.as_slice()) {
        (Method::GET, ["healthz"]) => ApiResponse::text(StatusCode::OK, "ok\n"),

        (Method::GET, ["graph"]) => match query.graph_filter() {
            Ok(filter) => respond(StatusCode::OK, service.graph(&filter)),
            Err(response) => response,
        },

        (Method::GET, ["domains"]) => respond(StatusCode::OK, service.list_domains()),
        (Method::POST, ["domains"]) => with_body::<DomainBody>(body, |input| {
            respond(StatusCode::CREATED, service.create_domain(caller, &input.name))
        }),
        (Method::GET, ["domains", id]) => {
            with_id(id, |id| respond(StatusCode::OK, service.get_domain(id)))
        }
        (Method::PATCH, ["domains", id]) => with_id(id, |id| {
            with_body::<DomainBody>(body, |input| {
                respond(StatusCode::OK, service.rename_domain(caller, id, &input.name))
            })
        }),
        (Method::DELETE, ["domains", id]) => with_id(id, |id| {
            let mode = if query.flag("cascade") {
                DomainDeleteMode::Cascade
            } else {
                DomainDeleteMode::Restrict
            };
            respond(StatusCode::OK, service.delete_domain(caller, id, mode))
        }),
        (Method::GET, ["domains", id, "principles"]) => {
            with_id(id, |id| respond(StatusCode::OK, service.domain_principles(id)))
        }

        (Method::POST, ["principles"]) => with_body::<NewPrinciple>(body, |input| {
            respond(StatusCode::CREATED, service.create_principle(caller, &input))
        }),
        (Method::GET, ["principles", id]) => {
            with_id(id, |id| respond(StatusCode::OK, service.get_principle(id)))
        }
        (Method::GET, ["principles", id, "edges"]) => {
            with_id(id, |id| respond(StatusCode::OK, service.principle_edges(id)))
        }
        (Method::PATCH, ["principles", id]) => with_id(id, |id| {
            with_body::<PrinciplePatch>(body, |patch| {
                respond(StatusCode::OK, service.update_principle(caller, id, &patch))
            })
        }),
        (Method::DELETE, ["principles", id]) => {
            with_id(id, |id| respond(StatusCode::OK, service.delete_principle(caller, id)))
        }

        (Method::POST, ["admin", "rebuild-edges"]) => {
            respond(StatusCode::OK, service.rebuild_edges(caller))
        }
        (Method::GET, ["admin", "check-edges"]) => match service.check_edges(caller) {
            Ok(report) => ApiResponse::json(
                StatusCode::OK,
                &json!({
                    "consistent": report.is_consistent(),
                    "violations": report.violation_count(),
                    "report": report,
                }),
            ),
            Err(err) => service_error(err),
        },

        (_, segments) if is_known_resource(segments) => ApiResponse::error(
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            &format!("{method} is not supported on {path}"),
        ),
        _ => ApiResponse::error(StatusCode::NOT_FOUND, "not_found", "no such route"),
    }
}

fn is_known_resource(segments: &[&str]) -> bool {
    matches!(
        segments,
        ["healthz"]
            | ["graph"]
            | ["domains"]
            | ["domains", _]
            | ["domains", _, "principles"]
            | ["principles"]
            | ["principles", _]
            | ["principles", _, "edges"]
            | ["admin", "rebuild-edges"]
            | ["admin", "check-edges"]
    )
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, ServiceError>) -> ApiResponse {
    match result {
        Ok(value) => ApiResponse::json(status, &value),
        Err(err) => service_error(err),
    }
}

/// Maps a service error onto its status code and error body.
pub fn service_error(err: ServiceError) -> ApiResponse {
    let status = match (&err, err.kind()) {
        (ServiceError::Authorization(auth), _) if auth.is_unauthenticated() => {
            StatusCode::UNAUTHORIZED
        }
        (_, ErrorKind::Authorization) => StatusCode::FORBIDDEN,
        (_, ErrorKind::Validation) => StatusCode::UNPROCESSABLE_ENTITY,
        (_, ErrorKind::Conflict) => StatusCode::CONFLICT,
        (_, ErrorKind::NotFound) => StatusCode::NOT_FOUND,
        (_, ErrorKind::Consistency) | (_, ErrorKind::Storage) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    match err.kind() {
        ErrorKind::Consistency => error!(
            "event=edge_consistency_violation module=api status=error error={}",
            err
        ),
        ErrorKind::Storage => error!("event=storage_failure module=api status=error error={}", err),
        _ => {}
    }
    ApiResponse::error(status, err.kind().as_str(), &err.to_string())
}

fn with_id(raw: &str, handler: impl FnOnce(Uuid) -> ApiResponse) -> ApiResponse {
    match Uuid::parse_str(raw) {
        Ok(id) => handler(id),
        Err(_) => ApiResponse::error(
            StatusCode::BAD_REQUEST,
            "bad_request",
            &format!("`{raw}` is not a valid id"),
        ),
    }
}

fn with_body<T: for<'de> Deserialize<'de>>(
    body: &[u8],
    handler: impl FnOnce(T) -> ApiResponse,
) -> ApiResponse {
    match serde_json::from_slice::<T>(body) {
        Ok(value) => handler(value),
        Err(err) => ApiResponse::error(
            StatusCode::BAD_REQUEST,
            "bad_request",
            &format!("invalid JSON body: {err}"),
        ),
    }
}

/// Decoded query string; keys may repeat.
struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    fn parse(query: Option<&str>) -> Self {
        let pairs = query
            .map(|raw| {
                form_urlencoded::parse(raw.as_bytes())
                    .map(|(key, value)| (key.into_owned(), value.into_owned()))
                    .collect()
            })
            .unwrap_or_default();
        Self { pairs }
    }

    fn values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    fn flag(&self, key: &str) -> bool {
        self.values(key)
            .last()
            .is_some_and(|value| matches!(value, "true" | "1" | "yes"))
    }

    fn graph_filter(&self) -> Result<GraphFilter, ApiResponse> {
        let mut domain_ids = Vec::new();
        for raw in self.values("domain") {
            let id = Uuid::parse_str(raw).map_err(|_| {
                ApiResponse::error(
                    StatusCode::BAD_REQUEST,
                    "bad_request",
                    &format!("`{raw}` is not a valid domain id"),
                )
            })?;
            domain_ids.push(id);
        }
        Ok(GraphFilter {
            domain_ids,
            text: self.values("q").last().map(str::to_string),
        })
    }
}
