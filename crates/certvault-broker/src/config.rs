//! Command-line configuration for `vault-init`.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;

use certvault_pki::paths::cert_path;

use crate::artifacts::{ArtifactPaths, DEFAULT_SECRETS_DIR};
use crate::bootstrap::AcquireSettings;
use crate::error::{BrokerError, BrokerResult};
use crate::marker::MarkerFile;

/// Settings for the bootstrap init container.
#[derive(Debug, Clone, Args)]
pub struct InitConfig {
    /// Namespace of this pod (pod.metadata.namespace)
    #[arg(long, env = "POD_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Service name that resolves to this pod
    #[arg(long, env = "SERVICE_NAME")]
    pub service_name: String,

    /// Name of this pod (pod.metadata.name)
    #[arg(long, env = "POD_NAME")]
    pub name: String,

    /// Retry timeout for token and certificate requests, in minutes
    #[arg(long, default_value_t = 1)]
    pub retry_timeout: u32,

    /// Directory shared with the workload for the token and certificates
    #[arg(long, default_value = DEFAULT_SECRETS_DIR)]
    pub secrets_dir: PathBuf,

    /// Secret store address
    #[arg(long, env = "VAULT_ADDR", default_value = "http://vault:8200")]
    pub vault_addr: String,

    /// Controller address
    #[arg(long, env = "VAULT_CONTROLLER_ADDR", default_value = "http://vault-controller")]
    pub controller_addr: String,

    /// Address the token broker listens on
    #[arg(long, default_value = "0.0.0.0:80")]
    pub broker_addr: SocketAddr,

    /// Discard any persisted token and certificates before starting
    #[arg(long)]
    pub force_refresh: bool,
}

impl InitConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Config`] if an identity field is empty or
    /// contains a path separator.
    pub fn validate(&self) -> BrokerResult<()> {
        for (field, value) in [
            ("name", &self.name),
            ("namespace", &self.namespace),
            ("service-name", &self.service_name),
        ] {
            if value.is_empty() {
                return Err(BrokerError::Config(format!("{field} cannot be empty")));
            }
            if value.contains('/') {
                return Err(BrokerError::Config(format!("{field} cannot contain '/'")));
            }
        }

        if self.vault_addr.is_empty() {
            return Err(BrokerError::Config("vault-addr cannot be empty".to_string()));
        }

        if self.controller_addr.is_empty() {
            return Err(BrokerError::Config("controller-addr cannot be empty".to_string()));
        }

        Ok(())
    }

    /// Layout of the secrets directory.
    #[must_use]
    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths::new(&self.secrets_dir)
    }

    /// The bootstrap marker file.
    #[must_use]
    pub fn marker(&self) -> MarkerFile {
        MarkerFile::new(self.artifact_paths().marker())
    }

    /// Secret-store path of this service's certificate.
    #[must_use]
    pub fn certificate_path(&self) -> String {
        cert_path(&self.namespace, &self.service_name)
    }

    /// Acquisition settings for this pod's identity.
    #[must_use]
    pub fn acquire_settings(&self) -> AcquireSettings {
        AcquireSettings::new(&self.name, &self.namespace)
            .with_retry_timeout_minutes(self.retry_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use test_case::test_case;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        init: InitConfig,
    }

    fn parse(args: &[&str]) -> InitConfig {
        let mut argv = vec!["vault-init"];
        argv.extend_from_slice(args);
        TestCli::parse_from(argv).init
    }

    #[test]
    fn defaults() {
        let config = parse(&["--name", "web-0", "--service-name", "web"]);
        assert_eq!(config.retry_timeout, 1);
        assert_eq!(config.broker_addr.port(), 80);
        assert_eq!(config.secrets_dir, PathBuf::from(DEFAULT_SECRETS_DIR));
        assert!(!config.force_refresh);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn derived_paths() {
        let config = parse(&[
            "--name",
            "web-0",
            "--service-name",
            "web",
            "--namespace",
            "prod",
            "--secrets-dir",
            "/tmp/secrets",
            "--retry-timeout",
            "2",
        ]);
        assert_eq!(config.certificate_path(), "secret/certs/prod/web");
        assert_eq!(
            config.marker().path(),
            PathBuf::from("/tmp/secrets/secret.json").as_path()
        );

        let settings = config.acquire_settings();
        assert_eq!(settings.name, "web-0");
        assert_eq!(settings.namespace, "prod");
        assert_eq!(settings.budget, 24);
    }

    #[test_case("", "web" ; "empty name")]
    #[test_case("web-0", "" ; "empty service")]
    #[test_case("a/b", "web" ; "slash in name")]
    fn invalid_identity(name: &str, service: &str) {
        let mut config = parse(&["--name", "x", "--service-name", "y"]);
        config.name = name.to_string();
        config.service_name = service.to_string();
        assert!(matches!(config.validate(), Err(BrokerError::Config(_))));
    }
}
