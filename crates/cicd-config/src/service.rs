//! Service configuration.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Component, Path, PathBuf};

/// Mount point of the liveness endpoint; not configurable.
pub const HEALTH_ENDPOINT: &str = "/health";

/// Process-wide configuration, fixed once the service host starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Interface to listen on.
    pub address: String,
    /// Port to listen on.
    pub port: u16,
    /// Git URL cloned for every build.
    pub repository_url: String,
    /// Build script, relative to the published workspace root.
    pub build_script: PathBuf,
    /// Arguments given to the build script.
    pub build_args: Vec<String>,
    /// Arguments given to the build script when building master.
    pub master_args: Vec<String>,
    /// Well-known path of the symlink to the current checkout.
    pub publish_path: PathBuf,
    /// Mount point of the build endpoint.
    pub build_endpoint: String,
    /// Mount point of the metrics endpoint, if enabled.
    pub metrics_endpoint: Option<String>,
    /// TLS certificate and key; plaintext when absent.
    pub tls: Option<TlsKeyPair>,
    /// Parent directory for temporary checkouts; the system temp dir when absent.
    pub scratch_dir: Option<PathBuf>,
}

/// PEM-encoded certificate chain and private key files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsKeyPair {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8080,
            repository_url: "https://github.com/iceguard/mxchip".to_string(),
            build_script: PathBuf::from("Device/build.sh"),
            build_args: Vec::new(),
            master_args: Vec::new(),
            publish_path: PathBuf::from("/tmp/iot-cicd"),
            build_endpoint: "/build/".to_string(),
            metrics_endpoint: Some("/metrics".to_string()),
            tls: None,
            scratch_dir: None,
        }
    }
}

impl ServiceConfig {
    /// Load a KDL configuration file on top of the defaults.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        parse_service_config(&text)
    }

    /// Resolve the listen address.
    pub fn socket_addr(&self) -> ConfigResult<SocketAddr> {
        let target = format!("{}:{}", self.address, self.port);
        target
            .to_socket_addrs()
            .map_err(|e| ConfigError::invalid("address", format!("{}: {}", target, e)))?
            .next()
            .ok_or_else(|| ConfigError::invalid("address", format!("{} did not resolve", target)))
    }

    /// Check the configuration for values the service cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.repository_url.trim().is_empty() {
            return Err(ConfigError::MissingField("repository url".to_string()));
        }

        if self.build_script.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("build script".to_string()));
        }
        if !is_plain_relative(&self.build_script) {
            return Err(ConfigError::invalid(
                "script",
                format!(
                    "{} must be relative to the workspace root",
                    self.build_script.display()
                ),
            ));
        }

        if self.publish_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("publish path".to_string()));
        }

        validate_endpoint("build endpoint", &self.build_endpoint)?;
        if let Some(metrics) = &self.metrics_endpoint {
            validate_endpoint("metrics endpoint", metrics)?;
            if trim_mount(metrics) == trim_mount(&self.build_endpoint) {
                return Err(ConfigError::invalid(
                    "metrics endpoint",
                    format!("{} is already used by the build endpoint", metrics),
                ));
            }
        }

        if let Some(tls) = &self.tls {
            if tls.cert_file.as_os_str().is_empty() || tls.key_file.as_os_str().is_empty() {
                return Err(ConfigError::invalid(
                    "tls",
                    "both a certificate and a key file are required",
                ));
            }
        }

        Ok(())
    }
}

/// Split a comma-delimited argument list. An empty string yields no arguments.
pub fn split_args(list: &str) -> Vec<String> {
    if list.is_empty() {
        return Vec::new();
    }
    list.split(',').map(str::to_string).collect()
}

/// Parse a service configuration from KDL text, starting from the defaults.
pub fn parse_service_config(kdl: &str) -> ConfigResult<ServiceConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = ServiceConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "listen" => {
                if let Some(address) =
                    get_string_prop(node, "address").or_else(|| get_first_string_arg(node))
                {
                    config.address = address;
                }
                if let Some(port) = get_integer_prop(node, "port") {
                    config.port = u16::try_from(port)
                        .map_err(|_| ConfigError::invalid("port", format!("{} out of range", port)))?;
                }
            }
            "repository" => {
                config.repository_url = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("repository url".to_string()))?;
            }
            "script" => {
                config.build_script = get_first_string_arg(node)
                    .map(PathBuf::from)
                    .ok_or_else(|| ConfigError::MissingField("build script".to_string()))?;
            }
            "args" => {
                config.build_args = get_all_string_args(node);
            }
            "master-args" | "master_args" => {
                config.master_args = get_all_string_args(node);
            }
            "publish-path" | "publish_path" => {
                config.publish_path = get_first_string_arg(node)
                    .map(PathBuf::from)
                    .ok_or_else(|| ConfigError::MissingField("publish path".to_string()))?;
            }
            "endpoints" => {
                if let Some(build) = get_string_prop(node, "build") {
                    config.build_endpoint = build;
                }
                if let Some(enabled) = get_bool_prop(node, "metrics") {
                    if !enabled {
                        config.metrics_endpoint = None;
                    }
                } else if let Some(metrics) = get_string_prop(node, "metrics") {
                    config.metrics_endpoint = Some(metrics);
                }
            }
            "tls" => {
                let cert_file = get_string_prop(node, "cert")
                    .ok_or_else(|| ConfigError::MissingField("tls cert".to_string()))?;
                let key_file = get_string_prop(node, "key")
                    .ok_or_else(|| ConfigError::MissingField("tls key".to_string()))?;
                config.tls = Some(TlsKeyPair {
                    cert_file: cert_file.into(),
                    key_file: key_file.into(),
                });
            }
            "scratch-dir" | "scratch_dir" => {
                config.scratch_dir = get_first_string_arg(node).map(PathBuf::from);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

fn is_plain_relative(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn trim_mount(endpoint: &str) -> &str {
    endpoint.trim_end_matches('/')
}

fn validate_endpoint(field: &str, endpoint: &str) -> ConfigResult<()> {
    if !endpoint.starts_with('/') {
        return Err(ConfigError::invalid(
            field,
            format!("{} must start with '/'", endpoint),
        ));
    }
    if trim_mount(endpoint) == HEALTH_ENDPOINT {
        return Err(ConfigError::invalid(
            field,
            format!("{} is reserved for the health endpoint", endpoint),
        ));
    }
    Ok(())
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_integer_prop(node: &KdlNode, name: &str) -> Option<i128> {
    node.get(name).and_then(|v| v.as_integer())
}

fn get_bool_prop(node: &KdlNode, name: &str) -> Option<bool> {
    node.get(name).and_then(|v| v.as_bool())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServiceConfig::default();
        config.validate().unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.build_script, PathBuf::from("Device/build.sh"));
        assert_eq!(config.publish_path, PathBuf::from("/tmp/iot-cicd"));
        assert_eq!(config.metrics_endpoint.as_deref(), Some("/metrics"));
    }

    #[test]
    fn test_split_args() {
        assert!(split_args("").is_empty());
        assert_eq!(split_args("--release"), vec!["--release"]);
        assert_eq!(split_args("-t,dev,--verbose"), vec!["-t", "dev", "--verbose"]);
        assert_eq!(split_args("a,,b"), vec!["a", "", "b"]);
    }

    #[test]
    fn test_parse_full_config() {
        let kdl = r#"
            listen address="0.0.0.0" port=8443
            repository "https://github.com/iceguard/mxchip"
            script "Device/build.sh"
            args "--target" "dev"
            master-args "--target" "release"
            publish-path "/srv/iot-cicd"
            endpoints build="/hooks/build/" metrics="/prom"
            tls cert="/etc/cicd/tls.crt" key="/etc/cicd/tls.key"
            scratch-dir "/var/tmp"
        "#;

        let config = parse_service_config(kdl).unwrap();
        assert_eq!(config.address, "0.0.0.0");
        assert_eq!(config.port, 8443);
        assert_eq!(config.build_args, vec!["--target", "dev"]);
        assert_eq!(config.master_args, vec!["--target", "release"]);
        assert_eq!(config.publish_path, PathBuf::from("/srv/iot-cicd"));
        assert_eq!(config.build_endpoint, "/hooks/build/");
        assert_eq!(config.metrics_endpoint.as_deref(), Some("/prom"));
        assert_eq!(
            config.tls,
            Some(TlsKeyPair {
                cert_file: PathBuf::from("/etc/cicd/tls.crt"),
                key_file: PathBuf::from("/etc/cicd/tls.key"),
            })
        );
        assert_eq!(config.scratch_dir, Some(PathBuf::from("/var/tmp")));
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = parse_service_config(r#"repository "/srv/git/firmware.git""#).unwrap();
        assert_eq!(config.repository_url, "/srv/git/firmware.git");
        assert_eq!(config.port, 8080);
        assert_eq!(config.build_endpoint, "/build/");
    }

    #[test]
    fn test_port_out_of_range() {
        let result = parse_service_config("listen port=70000");
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_tls_requires_both_files() {
        let result = parse_service_config(r#"tls cert="/etc/cicd/tls.crt""#);
        assert!(matches!(result.unwrap_err(), ConfigError::MissingField(_)));
    }

    #[test]
    fn test_rejects_escaping_script_path() {
        let config = ServiceConfig {
            build_script: PathBuf::from("../outside.sh"),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServiceConfig {
            build_script: PathBuf::from("/usr/bin/make"),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_clashing_endpoints() {
        let config = ServiceConfig {
            build_endpoint: "/metrics/".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServiceConfig {
            build_endpoint: "build".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_health_endpoint() {
        let config = ServiceConfig {
            metrics_endpoint: Some("/health".to_string()),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("health"), "{}", err);

        let config = ServiceConfig {
            build_endpoint: "/health/".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServiceConfig {
            metrics_endpoint: Some("/healthz".to_string()),
            ..Default::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_socket_addr() {
        let config = ServiceConfig {
            address: "127.0.0.1".to_string(),
            port: 51467,
            ..Default::default()
        };
        assert_eq!(
            config.socket_addr().unwrap(),
            "127.0.0.1:51467".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cicd.kdl");
        std::fs::write(&path, r#"script "build/run.sh""#).unwrap();

        let config = ServiceConfig::load(&path).unwrap();
        assert_eq!(config.build_script, PathBuf::from("build/run.sh"));

        let missing = ServiceConfig::load(dir.path().join("missing.kdl"));
        assert!(matches!(missing.unwrap_err(), ConfigError::Io(_)));
    }
}
