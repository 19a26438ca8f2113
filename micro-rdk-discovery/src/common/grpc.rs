use core::fmt;
use std::{
    convert::Infallible,
    sync::{Arc, Mutex},
};

use crate::{
    common::{
        discovery::{Discovery, DiscoveryError, DiscoveryType},
        generic::{DoCommand, GenericError},
        robot::LocalRobot,
    },
    google::rpc::Status,
    proto::{self, service::discovery},
};
use bytes::{BufMut, Bytes};
use futures_lite::Future;
use http_body_util::BodyExt;
use hyper::{
    body::{self, Body, Frame},
    http::HeaderValue,
    service::Service,
    HeaderMap, Request, Response,
};
use log::*;
use prost::Message;
use std::{
    pin::Pin,
    task::{Context, Poll},
};
use thiserror::Error;

pub const DISCOVER_RESOURCES_PATH: &str =
    "/viam.service.discovery.v1.DiscoveryService/DiscoverResources";
pub const DO_COMMAND_PATH: &str = "/viam.service.discovery.v1.DiscoveryService/DoCommand";

// Length of the gRPC message prefix: 1 compression byte and a 4 byte big-endian length.
pub(crate) const GRPC_HEADER_LEN: usize = 5;

#[derive(Debug)]
pub struct GrpcBody {
    data: Option<Bytes>,
    trailers: Option<HeaderMap<HeaderValue>>,
}

impl GrpcBody {
    pub fn new() -> Self {
        let mut trailers = HeaderMap::new();
        trailers.insert("grpc-status", HeaderValue::from_static("0"));
        GrpcBody {
            data: None,
            trailers: Some(trailers),
        }
    }
}

impl Default for GrpcBody {
    fn default() -> Self {
        Self::new()
    }
}

pub trait GrpcResponse {
    fn put_data(&mut self, data: Bytes);
    fn set_status(&mut self, code: i32, message: Option<String>);
}

impl GrpcResponse for GrpcBody {
    fn put_data(&mut self, data: Bytes) {
        let _ = self.data.insert(data);
    }
    fn set_status(&mut self, code: i32, message: Option<String>) {
        if let Some(trailers) = self.trailers.as_mut() {
            trailers.insert("grpc-status", code.into());
            if let Some(message) = message {
                // grpc-message is percent-encoded, the encoded form is plain ascii
                if let Ok(value) = HeaderValue::from_str(&urlencoding::encode(&message)) {
                    trailers.insert("grpc-message", value);
                }
            }
        }
    }
}

impl Body for GrpcBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if let Some(data) = this.data.take() {
            return Poll::Ready(Some(Ok(Frame::data(data))));
        }
        if let Some(trailers) = this.trailers.take() {
            return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
        }
        Poll::Ready(None)
    }

    fn is_end_stream(&self) -> bool {
        self.data.is_none() && self.trailers.is_none()
    }
}

#[derive(Clone)]
pub struct GrpcServer {
    robot: Arc<Mutex<LocalRobot>>,
}

pub struct GrpcServerInner<'a> {
    robot: &'a Arc<Mutex<LocalRobot>>,
}

impl GrpcServer {
    pub fn new(robot: Arc<Mutex<LocalRobot>>) -> Self {
        GrpcServer { robot }
    }

    /// Dispatches an unframed protobuf payload and returns the unframed response.
    pub fn unary_rpc(&self, method: &str, data: &[u8]) -> Result<Bytes, ServerError> {
        let grpc = GrpcServerInner { robot: &self.robot };
        grpc.handle_unary_request(method, data)
            .map(|mut b| b.split_off(GRPC_HEADER_LEN))
    }
}

impl<'a> GrpcServerInner<'a> {
    pub(crate) fn encode_message<M: Message>(m: M) -> Result<Bytes, ServerError> {
        let mut buffer: Vec<u8> = vec![];
        // The buffer will have a null byte, then 4 bytes containing the big-endian length of the
        // data (*not* including this 5-byte header), and then the data from the message itself.
        buffer
            .try_reserve_exact(m.encoded_len() + GRPC_HEADER_LEN)
            .map_err(|err| {
                ServerError::new(GrpcError::RpcResourceExhausted, Some(Box::new(err)))
            })?;
        buffer.put_u8(0);
        let len: u32 = m.encoded_len().try_into().map_err(|err| {
            ServerError::new(GrpcError::RpcResourceExhausted, Some(Box::new(err)))
        })?;
        buffer.put_u32(len);
        m.encode(&mut buffer)
            .map_err(|_| ServerError::from(GrpcError::RpcInternal))?;
        Ok(Bytes::from(buffer))
    }

    pub(crate) fn validate_rpc(message: &Bytes) -> Result<&[u8], GrpcError> {
        // Per https://github.com/grpc/grpc/blob/master/doc/PROTOCOL-HTTP2.md, we're expecting a
        // 5-byte header followed by the actual protocol buffer data. The 5 bytes in the header are
        // 1 null byte (indicating we're not using compression), and 4 bytes of a big-endian
        // integer describing the length of the rest of the data.
        if message.len() < GRPC_HEADER_LEN {
            return Err(GrpcError::RpcFailedPrecondition);
        }
        let (header, rest) = message.split_at(GRPC_HEADER_LEN);
        if header[0] != 0 {
            return Err(GrpcError::RpcFailedPrecondition);
        }
        let expected_len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
        if expected_len as usize != rest.len() {
            return Err(GrpcError::RpcInvalidArgument);
        }
        Ok(rest)
    }

    pub(crate) fn handle_unary_request(
        &self,
        path: &str,
        payload: &[u8],
    ) -> Result<Bytes, ServerError> {
        match path {
            DISCOVER_RESOURCES_PATH => self.discovery_discover_resources(payload),
            DO_COMMAND_PATH => self.discovery_do_command(payload),
            _ => Err(ServerError::new(
                GrpcError::RpcUnimplemented,
                Some(format!("unknown method {}", path).into()),
            )),
        }
    }

    fn get_discovery(&self, name: String) -> Result<DiscoveryType, ServerError> {
        let service = match self
            .robot
            .lock()
            .map_err(|_| ServerError::from(GrpcError::RpcInternal))?
            .get_discovery_by_name(name.clone())
        {
            Some(s) => s,
            None => {
                return Err(ServerError::new(
                    GrpcError::RpcNotFound,
                    Some(format!("discovery service `{}` not found", name).into()),
                ))
            }
        };
        Ok(service)
    }

    fn discovery_discover_resources(&self, message: &[u8]) -> Result<Bytes, ServerError> {
        let req = discovery::v1::DiscoverResourcesRequest::decode(message)
            .map_err(|err| ServerError::new(GrpcError::RpcInvalidArgument, Some(err.into())))?;
        debug!("DiscoverResources on `{}`", req.name);
        let mut service = self.get_discovery(req.name)?;
        let discoveries = service.discover_resources(req.extra)?;
        let resp = discovery::v1::DiscoverResourcesResponse { discoveries };
        GrpcServerInner::encode_message(resp)
    }

    fn discovery_do_command(&self, message: &[u8]) -> Result<Bytes, ServerError> {
        let req = proto::common::v1::DoCommandRequest::decode(message)
            .map_err(|err| ServerError::new(GrpcError::RpcInvalidArgument, Some(err.into())))?;
        debug!("DoCommand on `{}`", req.name);
        let mut service = self.get_discovery(req.name)?;
        let res = service.do_command(req.command)?;
        let resp = proto::common::v1::DoCommandResponse { result: res };
        GrpcServerInner::encode_message(resp)
    }
}

impl Service<Request<body::Incoming>> for GrpcServer {
    type Response = Response<GrpcBody>;
    type Error = GrpcError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn call(&self, req: Request<body::Incoming>) -> Self::Future {
        let svc = self.clone();
        #[cfg(debug_assertions)]
        log::debug!("processing {:?}", req);
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let msg = body
                .collect()
                .await
                .map_err(|_| GrpcError::RpcFailedPrecondition)?
                .to_bytes();
            let path = parts.uri.path();

            let grpc = GrpcServerInner { robot: &svc.robot };
            let mut response = GrpcBody::new();
            match GrpcServerInner::validate_rpc(&msg)
                .map_err(ServerError::from)
                .and_then(|payload| grpc.handle_unary_request(path, payload))
            {
                Ok(bytes) => response.put_data(bytes),
                Err(e) => {
                    warn!("{} failed: {}", path, e);
                    response.set_status(e.status_code(), Some(e.to_string()));
                }
            }

            Response::builder()
                .header("content-type", "application/grpc")
                .status(200)
                .body(response)
                .map_err(|_| GrpcError::RpcFailedPrecondition)
        })
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrpcError {
    #[error("canceled rpc")]
    RpcCanceled = 1,
    #[error("unknown rpc")]
    Unknown = 2,
    #[error("invalid argument for this rpc")]
    RpcInvalidArgument = 3,
    #[error("rpc deadline exceeded")]
    RpcDeadlineExceeded = 4,
    #[error("rpc not found")]
    RpcNotFound = 5,
    #[error("rpc already exists")]
    RpcAlreadyExists = 6,
    #[error("permission denied")]
    RpcPermissionDenied = 7,
    #[error("resource exhausted")]
    RpcResourceExhausted = 8,
    #[error("failed precondition")]
    RpcFailedPrecondition = 9,
    #[error("aborted")]
    RpcAborted = 10,
    #[error("out of range")]
    RpcOutOfRange = 11,
    #[error("Unimplemented")]
    RpcUnimplemented = 12,
    #[error("internal")]
    RpcInternal = 13,
    #[error("unavailable")]
    RpcUnavailable = 14,
    #[error("data loss")]
    RpcDataLoss = 15,
    #[error("unauthenticated")]
    RpcUnauthenticated = 16,
}

impl GrpcError {
    pub fn to_status(self, message: String) -> Status {
        Status {
            code: self as i32,
            message,
            details: vec![],
        }
    }
}

#[derive(Debug, Error)]
pub struct ServerError {
    grpc_error: GrpcError,
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ServerError {
    pub fn new(
        grpc_error: GrpcError,
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self { grpc_error, cause }
    }

    pub fn to_status(&self) -> Status {
        self.grpc_error.to_status(self.to_string())
    }

    pub fn status_code(&self) -> i32 {
        self.grpc_error as i32
    }

    pub fn grpc_error(&self) -> GrpcError {
        self.grpc_error
    }
}

impl From<GrpcError> for ServerError {
    fn from(grpc_error: GrpcError) -> Self {
        Self {
            grpc_error,
            cause: None,
        }
    }
}

impl From<DiscoveryError> for ServerError {
    fn from(value: DiscoveryError) -> Self {
        let grpc_error = match value {
            DiscoveryError::DiscoveryMethodUnimplemented(_) => GrpcError::RpcUnimplemented,
            _ => GrpcError::RpcInternal,
        };
        Self::new(grpc_error, Some(value.into()))
    }
}

impl From<GenericError> for ServerError {
    fn from(value: GenericError) -> Self {
        let grpc_error = match value {
            GenericError::MethodUnimplemented(_) => GrpcError::RpcUnimplemented,
            _ => GrpcError::RpcInvalidArgument,
        };
        Self::new(grpc_error, Some(value.into()))
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(err) => write!(f, "{}: {}", self.grpc_error, err),
            None => std::fmt::Display::fmt(&self.grpc_error, f),
        }
    }
}

#[cfg(all(test, feature = "builtin-components"))]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use bytes::{BufMut, Bytes, BytesMut};
    use prost::Message;

    use crate::common::{
        discovery::FakeDiscovery,
        generic::DoCommand,
        grpc::{
            GrpcBody, GrpcError, GrpcResponse, GrpcServer, GrpcServerInner, ServerError,
            DISCOVER_RESOURCES_PATH, DO_COMMAND_PATH,
        },
        robot::LocalRobot,
    };
    use crate::google::protobuf::{value::Kind, Struct, Value};
    use crate::proto::{
        app::v1::ComponentConfig,
        common::v1::{DoCommandRequest, DoCommandResponse},
        service::discovery::v1::{DiscoverResourcesRequest, DiscoverResourcesResponse},
    };

    fn frame(payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(payload.len() + 5);
        buf.put_u8(0);
        buf.put_u32(payload.len() as u32);
        buf.put_slice(payload);
        buf.freeze()
    }

    fn test_server() -> GrpcServer {
        let mut robot = LocalRobot::new();
        robot.insert_discovery(
            "discovery1".to_owned(),
            Arc::new(Mutex::new(FakeDiscovery::new(vec![
                ComponentConfig {
                    name: "cam".to_owned(),
                    r#type: "camera".to_owned(),
                    model: "webcam".to_owned(),
                    ..Default::default()
                },
                ComponentConfig {
                    name: "temp".to_owned(),
                    r#type: "sensor".to_owned(),
                    model: "fake".to_owned(),
                    ..Default::default()
                },
            ]))),
        );
        GrpcServer::new(Arc::new(Mutex::new(robot)))
    }

    #[test_log::test]
    fn test_validate_rpc() {
        let msg = frame(&[0x0a, 0x01, 0x61]);
        assert_eq!(
            GrpcServerInner::validate_rpc(&msg).unwrap(),
            &[0x0a, 0x01, 0x61]
        );

        let short = Bytes::from_static(&[0, 0, 0]);
        assert_eq!(
            GrpcServerInner::validate_rpc(&short).err(),
            Some(GrpcError::RpcFailedPrecondition)
        );

        let compressed = Bytes::from_static(&[1, 0, 0, 0, 0]);
        assert_eq!(
            GrpcServerInner::validate_rpc(&compressed).err(),
            Some(GrpcError::RpcFailedPrecondition)
        );

        let wrong_len = Bytes::from_static(&[0, 0, 0, 0, 2, 0x0a]);
        assert_eq!(
            GrpcServerInner::validate_rpc(&wrong_len).err(),
            Some(GrpcError::RpcInvalidArgument)
        );

        let empty = Bytes::from_static(&[0, 0, 0, 0, 0]);
        assert!(GrpcServerInner::validate_rpc(&empty).unwrap().is_empty());
    }

    #[test_log::test]
    fn test_encode_message_frames_payload() {
        let req = DiscoverResourcesRequest {
            name: "discovery1".to_owned(),
            extra: None,
        };
        let framed = GrpcServerInner::encode_message(req.clone()).unwrap();
        assert_eq!(framed[0], 0);
        assert_eq!(
            u32::from_be_bytes([framed[1], framed[2], framed[3], framed[4]]) as usize,
            req.encoded_len()
        );
        let payload = GrpcServerInner::validate_rpc(&framed).unwrap();
        assert_eq!(DiscoverResourcesRequest::decode(payload).unwrap(), req);
    }

    #[test_log::test]
    fn test_discover_resources() {
        let server = test_server();
        let req = DiscoverResourcesRequest {
            name: "discovery1".to_owned(),
            extra: Some(Struct::default()),
        };
        let resp = server
            .unary_rpc(DISCOVER_RESOURCES_PATH, &req.encode_to_vec())
            .unwrap();
        let resp = DiscoverResourcesResponse::decode(resp).unwrap();
        assert_eq!(resp.discoveries.len(), 2);
        assert_eq!(resp.discoveries[0].name, "cam");
        assert_eq!(resp.discoveries[1].name, "temp");
    }

    #[test_log::test]
    fn test_discover_resources_errors() {
        let server = test_server();
        let req = DiscoverResourcesRequest {
            name: "missing".to_owned(),
            extra: None,
        };
        let err = server
            .unary_rpc(DISCOVER_RESOURCES_PATH, &req.encode_to_vec())
            .unwrap_err();
        assert_eq!(err.grpc_error(), GrpcError::RpcNotFound);
        assert_eq!(
            err.to_string(),
            "rpc not found: discovery service `missing` not found"
        );

        let err = server
            .unary_rpc(DISCOVER_RESOURCES_PATH, &[0x0a, 0x05, 0x61])
            .unwrap_err();
        assert_eq!(err.status_code(), 3);

        let err = server
            .unary_rpc("/viam.service.discovery.v1.DiscoveryService/Nope", &[])
            .unwrap_err();
        assert_eq!(err.grpc_error(), GrpcError::RpcUnimplemented);
        assert_eq!(err.to_status().code, 12);
    }

    #[test_log::test]
    fn test_do_command() {
        let server = test_server();
        let req = DoCommandRequest {
            name: "discovery1".to_owned(),
            command: Some(Struct {
                fields: HashMap::from([(
                    "count".to_owned(),
                    Value {
                        kind: Some(Kind::BoolValue(true)),
                    },
                )]),
            }),
        };
        let resp = server
            .unary_rpc(DO_COMMAND_PATH, &req.encode_to_vec())
            .unwrap();
        let resp = DoCommandResponse::decode(resp).unwrap();
        assert_eq!(
            resp.result.unwrap().fields.get("count").unwrap().kind,
            Some(Kind::NumberValue(2.0))
        );

        let req = DoCommandRequest {
            name: "discovery1".to_owned(),
            command: Some(Struct {
                fields: HashMap::from([("unknown".to_owned(), Value { kind: None })]),
            }),
        };
        let err = server
            .unary_rpc(DO_COMMAND_PATH, &req.encode_to_vec())
            .unwrap_err();
        assert_eq!(err.grpc_error(), GrpcError::RpcInvalidArgument);
    }

    struct Silent;
    impl DoCommand for Silent {}
    impl crate::common::discovery::Discovery for Silent {
        fn discover_resources(
            &mut self,
            _extra: Option<Struct>,
        ) -> Result<Vec<ComponentConfig>, crate::common::discovery::DiscoveryError> {
            Err(crate::common::discovery::DiscoveryError::DiscoveryFailed(
                "bus unavailable".to_owned(),
            ))
        }
    }

    #[test_log::test]
    fn test_handler_errors_become_status() {
        let mut robot = LocalRobot::new();
        robot.insert_discovery("silent".to_owned(), Arc::new(Mutex::new(Silent)));
        let server = GrpcServer::new(Arc::new(Mutex::new(robot)));

        let req = DiscoverResourcesRequest {
            name: "silent".to_owned(),
            extra: None,
        };
        let err = server
            .unary_rpc(DISCOVER_RESOURCES_PATH, &req.encode_to_vec())
            .unwrap_err();
        assert_eq!(err.grpc_error(), GrpcError::RpcInternal);
        assert!(err.to_string().contains("bus unavailable"));

        let req = DoCommandRequest {
            name: "silent".to_owned(),
            command: None,
        };
        let err: ServerError = server
            .unary_rpc(DO_COMMAND_PATH, &req.encode_to_vec())
            .unwrap_err();
        assert_eq!(err.grpc_error(), GrpcError::RpcUnimplemented);
    }

    #[test_log::test]
    fn test_status_trailers() {
        let mut body = GrpcBody::new();
        body.set_status(5, Some("discovery service `caf\u{e9}` not found: 100%".to_owned()));
        let trailers = body.trailers.as_ref().unwrap();
        assert_eq!(trailers.get("grpc-status").unwrap(), "5");
        let message = trailers.get("grpc-message").unwrap().to_str().unwrap();
        assert!(message.is_ascii());
        assert!(!message.contains(' '));
        assert_eq!(
            urlencoding::decode(message).unwrap(),
            "discovery service `caf\u{e9}` not found: 100%"
        );

        let ok = GrpcBody::new();
        assert_eq!(
            ok.trailers.as_ref().unwrap().get("grpc-status").unwrap(),
            "0"
        );
        assert!(ok.trailers.as_ref().unwrap().get("grpc-message").is_none());
    }
}
