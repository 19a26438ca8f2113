//! REST transcoding of the discovery service.
//!
//! | verb | path                                               | rpc               |
//! |------|----------------------------------------------------|-------------------|
//! | GET  | `/viam/api/v1/service/{name}/discovery`            | DiscoverResources |
//! | POST | `/viam/api/v1/service/discovery/{name}/do_command` | DoCommand         |
//!
//! Requests are turned into their protobuf form and dispatched through [`GrpcServer`], so both
//! surfaces share one code path. Errors are rendered as a JSON `google.rpc.Status`.
use std::pin::Pin;

use bytes::Bytes;
use futures_lite::Future;
use http_body_util::{BodyExt, Full};
use hyper::{body, service::Service, Method, Request, Response, StatusCode};
use log::*;
use prost::Message;

use super::{
    grpc::{GrpcError, GrpcServer, ServerError, DISCOVER_RESOURCES_PATH, DO_COMMAND_PATH},
    json::JsonMessage,
};
use crate::proto::{
    common::v1::{DoCommandRequest, DoCommandResponse},
    service::discovery::v1::{DiscoverResourcesRequest, DiscoverResourcesResponse},
};

const API_PREFIX: [&str; 4] = ["viam", "api", "v1", "service"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayRoute {
    DiscoverResources { name: String },
    DoCommand { name: String },
}

// A single path segment bound to `{name}`. Escapes that do not decode to utf-8 bind nothing.
fn bind_name(segment: &str) -> Option<String> {
    let name = urlencoding::decode(segment).ok()?;
    if name.is_empty() || name.contains('/') {
        return None;
    }
    Some(name.into_owned())
}

impl GatewayRoute {
    /// Matches a request line against the transcoding rules. A path that fits a rule under
    /// another verb is `RpcUnimplemented`, a path that fits no rule is `RpcNotFound`.
    pub fn from_request(method: &Method, path: &str) -> Result<Self, GrpcError> {
        let segments: Vec<&str> = path.strip_prefix('/').unwrap_or(path).split('/').collect();
        let rest = match segments.strip_prefix(&API_PREFIX[..]) {
            Some(rest) => rest,
            None => return Err(GrpcError::RpcNotFound),
        };
        let (route, verb) = match rest {
            [name, "discovery"] => (
                bind_name(name).map(|name| GatewayRoute::DiscoverResources { name }),
                Method::GET,
            ),
            ["discovery", name, "do_command"] => (
                bind_name(name).map(|name| GatewayRoute::DoCommand { name }),
                Method::POST,
            ),
            _ => (None, Method::GET),
        };
        match route {
            None => Err(GrpcError::RpcNotFound),
            Some(_) if *method != verb => Err(GrpcError::RpcUnimplemented),
            Some(route) => Ok(route),
        }
    }
}

/// Standard mapping of gRPC status codes onto HTTP statuses.
pub fn http_status(err: GrpcError) -> StatusCode {
    match err {
        GrpcError::RpcCanceled => {
            StatusCode::from_u16(499).unwrap_or(StatusCode::REQUEST_TIMEOUT)
        }
        GrpcError::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        GrpcError::RpcInvalidArgument => StatusCode::BAD_REQUEST,
        GrpcError::RpcDeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        GrpcError::RpcNotFound => StatusCode::NOT_FOUND,
        GrpcError::RpcAlreadyExists => StatusCode::CONFLICT,
        GrpcError::RpcPermissionDenied => StatusCode::FORBIDDEN,
        GrpcError::RpcResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        GrpcError::RpcFailedPrecondition => StatusCode::BAD_REQUEST,
        GrpcError::RpcAborted => StatusCode::CONFLICT,
        GrpcError::RpcOutOfRange => StatusCode::BAD_REQUEST,
        GrpcError::RpcUnimplemented => StatusCode::NOT_IMPLEMENTED,
        GrpcError::RpcInternal => StatusCode::INTERNAL_SERVER_ERROR,
        GrpcError::RpcUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        GrpcError::RpcDataLoss => StatusCode::INTERNAL_SERVER_ERROR,
        GrpcError::RpcUnauthenticated => StatusCode::UNAUTHORIZED,
    }
}

#[derive(Clone)]
pub struct GatewayServer {
    grpc: GrpcServer,
}

impl GatewayServer {
    pub fn new(grpc: GrpcServer) -> Self {
        Self { grpc }
    }

    /// Serves one request and returns the HTTP status and JSON body to send back.
    pub fn handle(&self, method: &Method, path: &str, body: &[u8]) -> (StatusCode, Bytes) {
        let result = GatewayRoute::from_request(method, path)
            .map_err(|err| match err {
                GrpcError::RpcUnimplemented => (
                    StatusCode::METHOD_NOT_ALLOWED,
                    ServerError::new(
                        err,
                        Some(format!("method {} not allowed on {}", method, path).into()),
                    ),
                ),
                _ => (
                    http_status(err),
                    ServerError::new(err, Some(format!("no route for {}", path).into())),
                ),
            })
            .and_then(|route| {
                self.transcode(route, body)
                    .map_err(|err| (http_status(err.grpc_error()), err))
            });
        match result {
            Ok(json) => (StatusCode::OK, json),
            Err((status, err)) => {
                warn!("{} {} failed: {}", method, path, err);
                let body = err
                    .to_status()
                    .to_json_string()
                    .unwrap_or_else(|_| String::from("{}"));
                (status, Bytes::from(body))
            }
        }
    }

    fn transcode(&self, route: GatewayRoute, body: &[u8]) -> Result<Bytes, ServerError> {
        let json = match route {
            GatewayRoute::DiscoverResources { name } => {
                let req = DiscoverResourcesRequest { name, extra: None };
                let resp = self
                    .grpc
                    .unary_rpc(DISCOVER_RESOURCES_PATH, &req.encode_to_vec())?;
                DiscoverResourcesResponse::decode(resp)
                    .map_err(|err| ServerError::new(GrpcError::RpcInternal, Some(err.into())))?
                    .to_json_string()
            }
            GatewayRoute::DoCommand { name } => {
                let mut req = if body.iter().all(u8::is_ascii_whitespace) {
                    DoCommandRequest::default()
                } else {
                    DoCommandRequest::from_json_slice(body).map_err(|err| {
                        ServerError::new(GrpcError::RpcInvalidArgument, Some(err.into()))
                    })?
                };
                req.name = name;
                let resp = self.grpc.unary_rpc(DO_COMMAND_PATH, &req.encode_to_vec())?;
                DoCommandResponse::decode(resp)
                    .map_err(|err| ServerError::new(GrpcError::RpcInternal, Some(err.into())))?
                    .to_json_string()
            }
        };
        json.map(Bytes::from)
            .map_err(|err| ServerError::new(GrpcError::RpcInternal, Some(err.into())))
    }
}

impl Service<Request<body::Incoming>> for GatewayServer {
    type Response = Response<Full<Bytes>>;
    type Error = GrpcError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn call(&self, req: Request<body::Incoming>) -> Self::Future {
        let svc = self.clone();
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|_| GrpcError::RpcFailedPrecondition)?
                .to_bytes();
            debug!("{} {}", parts.method, parts.uri.path());
            let (status, json) = svc.handle(&parts.method, parts.uri.path(), &body);
            Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Full::new(json))
                .map_err(|_| GrpcError::RpcInternal)
        })
    }
}
