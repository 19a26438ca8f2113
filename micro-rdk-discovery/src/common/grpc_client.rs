use std::{
    pin::Pin,
    task::Poll,
    time::{Duration, Instant},
};

use async_executor::Task;
use async_io::Timer;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures_lite::{ready, Future, FutureExt};
use http_body_util::{BodyExt, Full};
use hyper::{
    client::conn::http2::SendRequest,
    header::HeaderMap,
    http::status,
    rt::{self, Sleep},
    Method, Request,
};
use thiserror::Error;

use super::{
    exec::Executor,
    grpc::{DISCOVER_RESOURCES_PATH, DO_COMMAND_PATH, GRPC_HEADER_LEN},
};
use crate::{
    google::protobuf::Struct,
    proto::{
        app::v1::ComponentConfig,
        common::v1::{DoCommandRequest, DoCommandResponse},
        service::discovery::v1::{DiscoverResourcesRequest, DiscoverResourcesResponse},
    },
};

#[derive(Error, Debug)]
pub enum GrpcClientError {
    #[error(transparent)]
    ConversionError(#[from] std::num::TryFromIntError),
    #[error(transparent)]
    MessageEncodingError(#[from] prost::EncodeError),
    #[error(transparent)]
    MessageDecodingError(#[from] prost::DecodeError),
    #[error("http request error {0}")]
    HttpStatusError(status::StatusCode),
    #[error(transparent)]
    HyperError(#[from] hyper::Error),
    #[error(transparent)]
    HyperHttpError(#[from] hyper::http::Error),
    #[error("grpc error code {code:?}, message {message:?}")]
    GrpcError { code: i32, message: String },
    #[error("frame error {0}")]
    FrameError(String),
}

struct AsyncioSleep(Timer);

impl Sleep for AsyncioSleep {}

impl AsyncioSleep {
    fn reset(mut self: Pin<&mut Self>, deadline: Instant) {
        self.0.set_at(deadline)
    }
}

impl Future for AsyncioSleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        let _ = ready!(self.0.poll(cx));
        Poll::Ready(())
    }
}

#[derive(Default, Clone, Debug)]
struct H2Timer;

impl rt::Timer for H2Timer {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn rt::Sleep>> {
        Box::pin(AsyncioSleep(Timer::after(duration)))
    }
    fn sleep_until(&self, deadline: Instant) -> Pin<Box<dyn rt::Sleep>> {
        Box::pin(AsyncioSleep(Timer::at(deadline)))
    }
    fn reset(&self, sleep: &mut Pin<Box<dyn rt::Sleep>>, new_deadline: Instant) {
        if let Some(timer) = sleep.as_mut().downcast_mut_pin::<AsyncioSleep>() {
            timer.reset(new_deadline)
        }
    }
}

/// Frames a message: a zero compression byte, its big-endian length, then the message.
pub(crate) fn encode_frame<M: prost::Message>(message: &M) -> Result<Bytes, GrpcClientError> {
    let mut buf = BytesMut::with_capacity(message.encoded_len() + GRPC_HEADER_LEN);
    buf.put_u8(0);
    buf.put_u32(message.encoded_len().try_into()?);
    message.encode(&mut buf)?;
    Ok(buf.freeze())
}

/// Decodes the single message of a unary response body.
pub(crate) fn decode_frame<M: prost::Message + Default>(
    mut body: Bytes,
) -> Result<M, GrpcClientError> {
    if body.len() < GRPC_HEADER_LEN {
        return Err(GrpcClientError::FrameError(format!(
            "response of {} bytes is shorter than a frame header",
            body.len()
        )));
    }
    if body.get_u8() != 0 {
        return Err(GrpcClientError::FrameError(
            "compressed responses are not supported".to_owned(),
        ));
    }
    let len = body.get_u32() as usize;
    if len != body.len() {
        return Err(GrpcClientError::FrameError(format!(
            "frame announces {} bytes but carries {}",
            len,
            body.len()
        )));
    }
    Ok(M::decode(body)?)
}

/// Turns a non-zero `grpc-status` into an error. Servers answering with only headers put the
/// status there instead of in trailers.
pub(crate) fn check_grpc_status(map: &HeaderMap) -> Result<bool, GrpcClientError> {
    let status = match map.get("grpc-status") {
        Some(status) => status,
        None => return Ok(false),
    };
    // an unparsable grpc status defaults to -1 (not a valid grpc error code)
    let code = status.to_str().unwrap_or("").parse::<i32>().unwrap_or(-1);
    if code == 0 {
        return Ok(true);
    }
    let message = map
        .get("grpc-message")
        .and_then(|m| m.to_str().ok())
        .map(|m| {
            urlencoding::decode(m)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| m.to_owned())
        })
        .unwrap_or_default();
    Err(GrpcClientError::GrpcError { code, message })
}

pub struct GrpcClient {
    http2_connection: SendRequest<Full<Bytes>>,
    #[allow(dead_code)]
    http2_task: Option<Task<()>>,
    uri: String,
}

impl GrpcClient {
    pub async fn new<T>(io: T, executor: Executor, uri: &str) -> Result<GrpcClient, GrpcClientError>
    where
        T: rt::Read + rt::Write + Unpin + 'static,
    {
        let (http2_connection, conn) = hyper::client::conn::http2::Builder::new(executor.clone())
            .keep_alive_interval(Some(Duration::from_secs(120))) // will send ping frames every 120 seconds
            .keep_alive_timeout(Duration::from_secs(300)) // if ping frame is not answered after 300 seconds the connection will be dropped
            .timer(H2Timer)
            .handshake(io)
            .await?;

        let http2_task = executor.spawn(async {
            if let Err(e) = conn.await {
                log::error!("GrpcClient failed with {:?}", e);
            }
        });
        Ok(Self {
            http2_connection,
            http2_task: Some(http2_task),
            uri: uri.trim_end_matches('/').to_string(),
        })
    }

    pub(crate) fn build_request(
        &self,
        path: &str,
        body: Bytes,
    ) -> Result<Request<Full<Bytes>>, GrpcClientError> {
        let mut uri = self.uri.to_owned();
        uri.push_str(path);

        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/grpc")
            .header("te", "trailers")
            .header("user-agent", "micro-rdk-discovery")
            .body(Full::new(body))
            .map_err(GrpcClientError::HyperHttpError)
    }

    pub(crate) async fn send_request(
        &self,
        r: Request<Full<Bytes>>,
    ) -> Result<Bytes, GrpcClientError> {
        let mut http2_connection = self.http2_connection.clone();
        // verify if the server can accept a new HTTP2 stream
        http2_connection.ready().await?;

        let response = http2_connection.send_request(r).await?;
        let (part, body) = response.into_parts();

        if part.status != status::StatusCode::OK {
            log::error!("received status code {}", part.status.to_string());
            return Err(GrpcClientError::HttpStatusError(part.status));
        }
        if check_grpc_status(&part.headers)? {
            return Ok(Bytes::new());
        }

        let body = body.collect().await?;
        match body.trailers() {
            Some(trailers) => {
                if !check_grpc_status(trailers)? {
                    return Err(GrpcClientError::GrpcError {
                        code: 0,
                        message: "received grpc trailers without a grpc-status".to_owned(),
                    });
                }
            }
            None => {
                return Err(GrpcClientError::FrameError(
                    "response ended without trailers".to_owned(),
                ))
            }
        }
        Ok(body.to_bytes())
    }

    /// Sends one request message to `path` and waits for the single response message.
    pub async fn unary<R, P>(&self, path: &str, message: &R) -> Result<P, GrpcClientError>
    where
        R: prost::Message,
        P: prost::Message + Default,
    {
        let r = self.build_request(path, encode_frame(message)?)?;
        let body = self.send_request(r).await?;
        decode_frame(body)
    }
}

/// Typed client of `viam.service.discovery.v1.DiscoveryService`.
pub struct DiscoveryClient {
    client: GrpcClient,
}

impl DiscoveryClient {
    pub fn new(client: GrpcClient) -> Self {
        Self { client }
    }

    pub async fn discover_resources(
        &self,
        name: &str,
        extra: Option<Struct>,
    ) -> Result<Vec<ComponentConfig>, GrpcClientError> {
        let req = DiscoverResourcesRequest {
            name: name.to_owned(),
            extra,
        };
        let resp: DiscoverResourcesResponse =
            self.client.unary(DISCOVER_RESOURCES_PATH, &req).await?;
        Ok(resp.discoveries)
    }

    pub async fn do_command(
        &self,
        name: &str,
        command: Option<Struct>,
    ) -> Result<Option<Struct>, GrpcClientError> {
        let req = DoCommandRequest {
            name: name.to_owned(),
            command,
        };
        let resp: DoCommandResponse = self.client.unary(DO_COMMAND_PATH, &req).await?;
        Ok(resp.result)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use hyper::{header::HeaderMap, http::HeaderValue};

    use crate::common::grpc_client::{
        check_grpc_status, decode_frame, encode_frame, GrpcClientError,
    };
    use crate::proto::{
        app::v1::ComponentConfig, service::discovery::v1::DiscoverResourcesResponse,
    };

    #[test_log::test]
    fn test_frames() {
        let resp = DiscoverResourcesResponse {
            discoveries: vec![ComponentConfig {
                r#type: "camera".to_owned(),
                model: "webcam".to_owned(),
                ..Default::default()
            }],
        };
        let framed = encode_frame(&resp).unwrap();
        assert_eq!(framed[0], 0);
        let decoded: DiscoverResourcesResponse = decode_frame(framed.clone()).unwrap();
        assert_eq!(decoded, resp);

        let truncated = framed.slice(..framed.len() - 1);
        assert!(matches!(
            decode_frame::<DiscoverResourcesResponse>(truncated),
            Err(GrpcClientError::FrameError(_))
        ));
        assert!(matches!(
            decode_frame::<DiscoverResourcesResponse>(Bytes::from_static(&[0, 0])),
            Err(GrpcClientError::FrameError(_))
        ));
        assert!(matches!(
            decode_frame::<DiscoverResourcesResponse>(Bytes::from_static(&[1, 0, 0, 0, 0])),
            Err(GrpcClientError::FrameError(_))
        ));
        let empty: DiscoverResourcesResponse =
            decode_frame(Bytes::from_static(&[0, 0, 0, 0, 0])).unwrap();
        assert!(empty.discoveries.is_empty());
    }

    #[test_log::test]
    fn test_grpc_status() {
        let mut map = HeaderMap::new();
        assert!(!check_grpc_status(&map).unwrap());

        map.insert("grpc-status", HeaderValue::from_static("0"));
        assert!(check_grpc_status(&map).unwrap());

        map.insert("grpc-status", HeaderValue::from_static("5"));
        map.insert(
            "grpc-message",
            HeaderValue::from_static("discovery service `caf%C3%A9` not found"),
        );
        match check_grpc_status(&map) {
            Err(GrpcClientError::GrpcError { code, message }) => {
                assert_eq!(code, 5);
                assert_eq!(message, "discovery service `caf\u{e9}` not found");
            }
            other => panic!("unexpected {:?}", other),
        }

        map.insert("grpc-message", HeaderValue::from_static("bad %FF byte"));
        match check_grpc_status(&map) {
            Err(GrpcClientError::GrpcError { message, .. }) => {
                assert_eq!(message, "bad %FF byte");
            }
            other => panic!("unexpected {:?}", other),
        }

        map.insert("grpc-status", HeaderValue::from_static("garbage"));
        assert!(matches!(
            check_grpc_status(&map),
            Err(GrpcClientError::GrpcError { code: -1, .. })
        ));
    }
}
