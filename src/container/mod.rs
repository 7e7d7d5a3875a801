use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use bollard::container::{Config, CreateContainerOptions};
use bollard::models::{HostConfig, Mount, MountTypeEnum, PortBinding};
use serde::Serialize;

use crate::engine::CreateRequest;

pub const IMAGE: &str = "smpurkis/cython_debugger:latest";
pub const SERVER_COMMAND: &str =
    "python3.8 /gdb_python2_installation/cython_debugger/cygdb_server/Cygdb_server.py";
pub const CONTAINER_NAME: &str = "nodeDemo";
pub const HOST_PORT: u16 = 3456;
pub const CONTAINER_PORT: &str = "3456/tcp";
pub const MOUNT_TARGET: &str = "/project_folder";

/// Address the debugger server is reachable on once the container runs.
pub fn published_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, HOST_PORT))
}

/// Configuration of the one container this crate manages.
///
/// Everything except the host working directory is fixed. The directory is
/// not checked here; the engine reports a bad mount source when the
/// container is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSpec {
    image: &'static str,
    command: Vec<String>,
    name: &'static str,
    host_port: u16,
    container_port: &'static str,
    host_working_directory: PathBuf,
    mount_target: &'static str,
}

impl ContainerSpec {
    pub fn new(host_working_directory: impl Into<PathBuf>) -> Self {
        ContainerSpec {
            image: IMAGE,
            command: SERVER_COMMAND.split_whitespace().map(String::from).collect(),
            name: CONTAINER_NAME,
            host_port: HOST_PORT,
            container_port: CONTAINER_PORT,
            host_working_directory: host_working_directory.into(),
            mount_target: MOUNT_TARGET,
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn host_working_directory(&self) -> &Path {
        &self.host_working_directory
    }

    pub fn create_request(&self) -> CreateRequest {
        let port_bindings = HashMap::from([(
            self.container_port.to_string(),
            Some(vec![PortBinding {
                host_ip: None,
                host_port: Some(self.host_port.to_string()),
            }]),
        )]);

        let mounts = vec![Mount {
            typ: Some(MountTypeEnum::BIND),
            source: Some(self.host_working_directory.to_string_lossy().into_owned()),
            target: Some(self.mount_target.to_string()),
            ..Default::default()
        }];

        CreateRequest {
            options: CreateContainerOptions {
                name: self.name.to_string(),
                platform: None,
            },
            config: Config {
                image: Some(self.image.to_string()),
                cmd: Some(self.command.clone()),
                tty: Some(false),
                exposed_ports: Some(HashMap::from([(self.container_port.to_string(), HashMap::new())])),
                host_config: Some(HostConfig {
                    port_bindings: Some(port_bindings),
                    mounts: Some(mounts),
                    ..Default::default()
                }),
                ..Default::default()
            },
        }
    }
}
