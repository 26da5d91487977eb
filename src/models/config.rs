use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::models::ServiceSpec;

pub const DEFAULT_CONTENT_TYPE: &str = r#"text/plain; charset="utf-8""#;

/// Parsed services file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    #[serde(rename = "services_list")]
    pub services: Vec<ServiceSpec>,
    /// Notification settings from the `general` section
    #[serde(rename = "general")]
    pub mailer: Option<MailerSettings>,
}

impl SupervisorConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        log::debug!("load yaml file value={}", path.display());

        let metadata = fs::metadata(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        if metadata.is_dir() {
            return Err(ConfigError::IsDirectory(path.to_path_buf()));
        }

        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        log::debug!(
            "yaml loaded services={} mailer={}",
            config.services.len(),
            config.mailer.is_some()
        );

        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }
}

/// Alert delivery settings.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct MailerSettings {
    /// `host:port` of the SMTP relay
    #[serde(rename = "mail_smtp_server")]
    pub smtp_server: String,
    #[serde(rename = "mail_auth_user")]
    pub auth_user: String,
    #[serde(rename = "mail_auth_password")]
    auth_password: String,
    #[serde(rename = "mail_subject_prefix")]
    pub subject_prefix: String,
    #[serde(rename = "mail_address_from")]
    pub address_from: String,
    /// Recipients of run-level alerts
    pub mailing_list: Vec<String>,
    #[serde(rename = "mail_content_type")]
    pub content_type: String,
}

impl MailerSettings {
    pub fn has_credentials(&self) -> bool {
        !self.auth_user.is_empty() && !self.auth_password.is_empty()
    }

    /// Validates the relay address and resolves the sender.
    pub fn check(&self, hostname: &str) -> Result<String, String> {
        if self.smtp_server.is_empty() {
            return Err("mail settings don't have 'mail_smtp_server' value".to_string());
        }

        if !self.smtp_server.contains(':') {
            return Err(
                "mail settings don't have smtp server port number in 'mail_smtp_server' field"
                    .to_string(),
            );
        }

        if !self.address_from.is_empty() {
            return Ok(self.address_from.clone());
        }

        let sender = default_sender(hostname);
        log::warn!(
            "mail settings don't have 'mail_address_from' field. Use default value value={}",
            sender
        );
        Ok(sender)
    }

    pub fn content_type(&self) -> &str {
        if self.content_type.is_empty() {
            DEFAULT_CONTENT_TYPE
        } else {
            &self.content_type
        }
    }
}

impl fmt::Debug for MailerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailerSettings")
            .field("smtp_server", &self.smtp_server)
            .field("auth_user", &self.auth_user)
            .field("subject_prefix", &self.subject_prefix)
            .field("address_from", &self.address_from)
            .field("mailing_list", &self.mailing_list)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// `server01@example.com` for `server01.sub.example.com`.
fn default_sender(hostname: &str) -> String {
    let labels: Vec<&str> = hostname.split('.').collect();

    if labels.len() >= 2 {
        format!("{}@{}", labels[0], labels[labels.len() - 2..].join("."))
    } else {
        hostname.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
general:
  mail_smtp_server: "smtp.example.com:25"
  mail_auth_user: "nanny"
  mail_auth_password: "secret"
  mailing_list: ["ops@example.com"]
services_list:
  - process_name: "worker.py"
    description: "queue worker"
    start_cmd: "python worker.py"
    cmd_args: ["--queue", "default"]
    python_venv: "/opt/venv"
    working_directory: "/opt/worker"
    pid_file: "*.pid"
    env_vars: ["MODE=prod"]
    mailing_list: ["dev@example.com"]
  - process_name: "legacy"
    disabled: true
"#;

    #[test]
    fn test_parse_services_and_general() {
        let config = SupervisorConfig::from_yaml(SAMPLE).unwrap();

        assert_eq!(config.services.len(), 2);
        let worker = &config.services[0];
        assert_eq!(worker.name, "worker.py");
        assert_eq!(worker.command_args, vec!["--queue", "default"]);
        assert_eq!(worker.pid_file_pattern, "*.pid");
        assert_eq!(worker.notify_list, vec!["dev@example.com"]);
        assert!(!worker.disabled);
        assert!(config.services[1].disabled);
        assert!(config.services[1].start_command.is_empty());

        let mailer = config.mailer.unwrap();
        assert!(mailer.has_credentials());
        assert_eq!(mailer.content_type(), DEFAULT_CONTENT_TYPE);
        assert!(!format!("{:?}", mailer).contains("secret"));
    }

    #[test]
    fn test_load_missing_and_directory() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("absent.yaml");
        assert!(matches!(
            SupervisorConfig::load(&missing),
            Err(ConfigError::NotFound(_))
        ));
        assert!(matches!(
            SupervisorConfig::load(dir.path()),
            Err(ConfigError::IsDirectory(_))
        ));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = SupervisorConfig::load(file.path()).unwrap();
        assert_eq!(config.services[0].working_directory, "/opt/worker");
    }

    #[test]
    fn test_load_malformed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"services_list: [unterminated").unwrap();

        assert!(matches!(
            SupervisorConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_mail_settings_check() {
        let mut settings = MailerSettings::default();
        assert!(settings.check("host").is_err());

        settings.smtp_server = "smtp.example.com".into();
        assert!(settings.check("host").is_err());

        settings.smtp_server = "smtp.example.com:25".into();
        assert_eq!(
            settings.check("server01.sub.example.com").unwrap(),
            "server01@example.com"
        );
        assert_eq!(settings.check("server01").unwrap(), "server01");

        settings.address_from = "nanny@example.com".into();
        assert_eq!(settings.check("server01").unwrap(), "nanny@example.com");
    }
}
