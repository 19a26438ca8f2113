use std::{
    net::{SocketAddr, TcpListener},
    sync::{Arc, Mutex},
};

use async_io::Async;
use hyper::server::conn::{http1, http2};
use log::*;

use super::tcp::NativeStream;
use crate::common::{
    exec::Executor, gateway::GatewayServer, grpc::GrpcServer, robot::LocalRobot,
};

/// Serves a robot's discovery services: gRPC over cleartext HTTP/2 on one listener and the REST
/// gateway over HTTP/1.1 on another. Every connection is a task on the local executor.
#[derive(Clone)]
pub struct NativeServer {
    grpc: GrpcServer,
    gateway: GatewayServer,
    executor: Executor,
}

pub fn bind(addr: SocketAddr) -> Result<Async<TcpListener>, std::io::Error> {
    Async::<TcpListener>::bind(addr)
}

impl NativeServer {
    pub fn new(robot: Arc<Mutex<LocalRobot>>, executor: Executor) -> Self {
        let grpc = GrpcServer::new(robot);
        Self {
            gateway: GatewayServer::new(grpc.clone()),
            grpc,
            executor,
        }
    }

    pub async fn serve_grpc(&self, listener: Async<TcpListener>) -> Result<(), std::io::Error> {
        info!("serving grpc on {}", listener.get_ref().local_addr()?);
        loop {
            let (stream, peer) = listener.accept().await?;
            debug!("new grpc connection from {}", peer);
            let conn = http2::Builder::new(self.executor.clone())
                .max_concurrent_streams(16)
                .serve_connection(NativeStream::from(stream), self.grpc.clone());
            self.executor
                .spawn(async move {
                    if let Err(e) = conn.await {
                        warn!("grpc connection from {} ended with an error: {}", peer, e);
                    }
                })
                .detach();
        }
    }

    pub async fn serve_gateway(&self, listener: Async<TcpListener>) -> Result<(), std::io::Error> {
        info!("serving http gateway on {}", listener.get_ref().local_addr()?);
        loop {
            let (stream, peer) = listener.accept().await?;
            debug!("new http connection from {}", peer);
            let conn = http1::Builder::new()
                .serve_connection(NativeStream::from(stream), self.gateway.clone());
            self.executor
                .spawn(async move {
                    if let Err(e) = conn.await {
                        warn!("http connection from {} ended with an error: {}", peer, e);
                    }
                })
                .detach();
        }
    }

    /// Runs both accept loops until one of them fails.
    pub async fn serve(
        &self,
        grpc: Async<TcpListener>,
        http: Async<TcpListener>,
    ) -> Result<(), std::io::Error> {
        futures_lite::future::or(self.serve_grpc(grpc), self.serve_gateway(http)).await
    }
}

#[cfg(all(test, feature = "builtin-components"))]
mod tests {
    use std::{
        collections::HashMap,
        net::SocketAddr,
        sync::{Arc, Mutex},
    };

    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};
    use hyper::{Method, Request, StatusCode};

    use crate::common::{
        discovery::FakeDiscovery,
        exec::Executor,
        grpc_client::{DiscoveryClient, GrpcClient, GrpcClientError},
        robot::LocalRobot,
    };
    use crate::google::protobuf::{value::Kind, Struct, Value};
    use crate::native::{
        server::{bind, NativeServer},
        tcp::NativeStream,
    };
    use crate::proto::app::v1::ComponentConfig;

    fn start_server(exec: &Executor) -> (SocketAddr, SocketAddr) {
        let mut robot = LocalRobot::new();
        robot.insert_discovery(
            "discovery1".to_owned(),
            Arc::new(Mutex::new(FakeDiscovery::new(vec![
                ComponentConfig {
                    r#type: "camera".to_owned(),
                    model: "webcam".to_owned(),
                    ..Default::default()
                },
                ComponentConfig {
                    r#type: "sensor".to_owned(),
                    model: "fake".to_owned(),
                    ..Default::default()
                },
            ]))),
        );
        let server = NativeServer::new(Arc::new(Mutex::new(robot)), exec.clone());
        let grpc = bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let http = bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addrs = (
            grpc.get_ref().local_addr().unwrap(),
            http.get_ref().local_addr().unwrap(),
        );
        exec.spawn(async move { server.serve(grpc, http).await })
            .detach();
        addrs
    }

    #[test_log::test]
    fn test_grpc_round_trip() {
        let exec = Executor::new();
        let (grpc_addr, _) = start_server(&exec);

        exec.block_on(async {
            let stream = NativeStream::connect(grpc_addr).await.unwrap();
            let client = GrpcClient::new(stream, exec.clone(), &format!("http://{}", grpc_addr))
                .await
                .unwrap();
            let client = DiscoveryClient::new(client);

            let found = client.discover_resources("discovery1", None).await.unwrap();
            assert_eq!(found.len(), 2);
            assert_eq!(found[0].model, "webcam");

            let extra = Struct {
                fields: HashMap::from([(
                    "type".to_owned(),
                    Value {
                        kind: Some(Kind::StringValue("sensor".to_owned())),
                    },
                )]),
            };
            let found = client
                .discover_resources("discovery1", Some(extra))
                .await
                .unwrap();
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].r#type, "sensor");

            let err = client.discover_resources("nope", None).await.unwrap_err();
            assert!(matches!(err, GrpcClientError::GrpcError { code: 5, .. }));

            let result = client
                .do_command(
                    "discovery1",
                    Some(Struct {
                        fields: HashMap::from([(
                            "ping".to_owned(),
                            Value {
                                kind: Some(Kind::BoolValue(true)),
                            },
                        )]),
                    }),
                )
                .await
                .unwrap()
                .unwrap();
            assert_eq!(
                result.fields.get("ping").unwrap().kind,
                Some(Kind::StringValue("pinged".to_owned()))
            );
        });
    }

    #[test_log::test]
    fn test_gateway_round_trip() {
        let exec = Executor::new();
        let (_, http_addr) = start_server(&exec);

        exec.block_on(async {
            let stream = NativeStream::connect(http_addr).await.unwrap();
            let (mut sender, conn) = hyper::client::conn::http1::handshake(stream)
                .await
                .unwrap();
            exec.spawn(async move {
                let _ = conn.await;
            })
            .detach();

            let req = Request::builder()
                .method(Method::GET)
                .uri("/viam/api/v1/service/discovery1/discovery")
                .header("host", http_addr.to_string())
                .body(Full::new(Bytes::new()))
                .unwrap();
            let resp = sender.send_request(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(
                resp.headers().get("content-type").unwrap(),
                "application/json"
            );
            let body = resp.into_body().collect().await.unwrap().to_bytes();
            let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(body["discoveries"].as_array().unwrap().len(), 2);
            assert_eq!(body["discoveries"][0]["model"], "webcam");
        });
    }
}
