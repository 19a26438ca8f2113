use std::{
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use clap::Parser;
use micro_rdk_discovery::{
    common::{
        exec::Executor,
        json::{JsonError, JsonMessage},
        log::initialize_logger,
        registry::ServiceRegistry,
        robot::{LocalRobot, RobotError},
    },
    native::server::{bind, NativeServer},
    proto::app::v1::ServiceConfig,
};
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(about = "Serves the discovery services of a robot config over gRPC and HTTP")]
struct Args {
    /// JSON robot config holding a `services` list
    #[arg(long = "config")]
    config: PathBuf,
    /// Port of the gRPC (cleartext HTTP/2) listener
    #[arg(long = "grpc-port", default_value_t = 8080)]
    grpc_port: u16,
    /// Port of the REST gateway (HTTP/1.1) listener
    #[arg(long = "http-port", default_value_t = 8081)]
    http_port: u16,
    #[arg(long = "bind", default_value = "0.0.0.0")]
    bind: IpAddr,
}

#[derive(Error, Debug)]
enum StartupError {
    #[error("cannot read config {0}: {1}")]
    ConfigRead(PathBuf, std::io::Error),
    #[error("invalid config: {0}")]
    ConfigInvalid(#[from] JsonError),
    #[error(transparent)]
    Robot(#[from] RobotError),
    #[error("server failed: {0}")]
    Serve(#[from] std::io::Error),
}

fn load_services(path: &Path) -> Result<Vec<ServiceConfig>, StartupError> {
    let raw = std::fs::read(path).map_err(|e| StartupError::ConfigRead(path.to_owned(), e))?;
    let config: serde_json::Value = serde_json::from_slice(&raw).map_err(JsonError::from)?;
    match config.get("services") {
        None | Some(serde_json::Value::Null) => Ok(vec![]),
        Some(serde_json::Value::Array(services)) => services
            .iter()
            .map(ServiceConfig::from_json)
            .collect::<Result<_, _>>()
            .map_err(StartupError::from),
        Some(_) => Err(JsonError::InvalidField("services".to_owned(), "a list").into()),
    }
}

fn run(args: Args) -> Result<(), StartupError> {
    let services = load_services(&args.config)?;
    let robot = LocalRobot::from_service_configs(&services, &ServiceRegistry::default())?;
    let names = robot.get_resource_names();
    if names.is_empty() {
        log::warn!("{} has no discovery service", args.config.display());
    }
    for name in names {
        log::info!("hosting {}:{}:{}/{}", name.namespace, name.r#type, name.subtype, name.name);
    }

    let exec = Executor::new();
    let server = NativeServer::new(Arc::new(Mutex::new(robot)), exec.clone());
    let grpc = bind(SocketAddr::new(args.bind, args.grpc_port))?;
    let http = bind(SocketAddr::new(args.bind, args.http_port))?;
    exec.block_on(server.serve(grpc, http))?;
    Ok(())
}

fn main() {
    initialize_logger::<env_logger::Logger>();
    let args = Args::parse();
    if let Err(e) = run(args) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::Parser;

    use crate::{load_services, Args, StartupError};

    fn config_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test_log::test]
    fn test_args() {
        let args = Args::try_parse_from(["server", "--config", "robot.json"]).unwrap();
        assert_eq!(args.grpc_port, 8080);
        assert_eq!(args.http_port, 8081);
        assert_eq!(args.bind.to_string(), "0.0.0.0");

        let args = Args::try_parse_from([
            "server",
            "--config",
            "robot.json",
            "--grpc-port",
            "9090",
            "--bind",
            "127.0.0.1",
        ])
        .unwrap();
        assert_eq!(args.grpc_port, 9090);
        assert!(args.bind.is_loopback());

        assert!(Args::try_parse_from(["server"]).is_err());
    }

    #[test_log::test]
    fn test_load_services() {
        let file = config_file(
            r#"{
                "components": [],
                "services": [
                    {
                        "name": "discovery1",
                        "api": "rdk:service:discovery",
                        "model": "rdk:builtin:fake",
                        "attributes": {"discoveries": [{"type": "camera", "model": "webcam"}]}
                    },
                    {"name": "motion", "api": "rdk:service:motion", "model": "builtin"}
                ]
            }"#,
        );
        let services = load_services(file.path()).unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].name, "discovery1");
        assert!(services[0].attributes.is_some());

        let empty = config_file("{}");
        assert!(load_services(empty.path()).unwrap().is_empty());
    }

    #[test_log::test]
    fn test_load_services_errors() {
        let bad = config_file(r#"{"services": {"name": "x"}}"#);
        assert!(matches!(
            load_services(bad.path()),
            Err(StartupError::ConfigInvalid(_))
        ));

        let garbage = config_file("services:");
        assert!(matches!(
            load_services(garbage.path()),
            Err(StartupError::ConfigInvalid(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_services(&dir.path().join("missing.json")),
            Err(StartupError::ConfigRead(..))
        ));
    }
}
