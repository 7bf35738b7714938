//! Connection settings for the object store

use hyper::Uri;
use serde::{Deserialize, Serialize};

use crate::{MpError, Result};

pub const DEFAULT_REGION: &str = "us-east-1";

/// Values given on the command line. Empty or `false` means "not given".
#[derive(Debug, Clone, Default)]
pub struct ConfigFlags {
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
    pub secure: bool,
    pub trace: bool,
}

/// Resolved connection parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub endpoint: String,
    pub access_key: String,
    #[serde(skip_serializing)]
    pub secret_key: String,
    pub region: String,
    pub secure: bool,
    pub trace: bool,
}

impl ConnectionConfig {
    /// Merge flags with the process environment
    pub fn from_env(flags: ConfigFlags) -> Self {
        Self::resolve(flags, |name| std::env::var(name).ok())
    }

    /// Merge flags with an environment lookup. A flag wins when present;
    /// switches are also turned on by the variable being exactly `"1"`.
    pub fn resolve<F>(flags: ConfigFlags, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |flag: Option<String>, var: &str| {
            flag.filter(|v| !v.is_empty())
                .or_else(|| env(var))
                .unwrap_or_default()
        };
        let switch = |flag: bool, var: &str| flag || env(var).as_deref() == Some("1");

        let region = pick(flags.region, "REGION");
        ConnectionConfig {
            endpoint: pick(flags.endpoint, "ENDPOINT"),
            access_key: pick(flags.access_key, "ACCESS_KEY"),
            secret_key: pick(flags.secret_key, "SECRET_KEY"),
            region: if region.is_empty() {
                DEFAULT_REGION.to_string()
            } else {
                region
            },
            secure: switch(flags.secure, "SECURE"),
            trace: switch(flags.trace, "TRACE"),
        }
    }

    /// Check that a client can be built from these values
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(MpError::Configuration(
                "no endpoint given (--endpoint or ENDPOINT)".to_string(),
            ));
        }
        if self.access_key.is_empty() {
            return Err(MpError::Configuration(
                "no access key given (--accesskey or ACCESS_KEY)".to_string(),
            ));
        }
        if self.secret_key.is_empty() {
            return Err(MpError::Configuration(
                "no secret key given (--secretkey or SECRET_KEY)".to_string(),
            ));
        }
        self.endpoint_url().map(|_| ())
    }

    /// Endpoint as a full URL. A bare `host[:port]` gets `https://` when
    /// `secure` is set and `http://` otherwise.
    pub fn endpoint_url(&self) -> Result<String> {
        let endpoint = self.endpoint.trim().trim_end_matches('/');
        let url = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            let scheme = if self.secure { "https" } else { "http" };
            format!("{}://{}", scheme, endpoint)
        };

        let uri: Uri = url
            .parse()
            .map_err(|e| MpError::Configuration(format!("invalid endpoint '{}': {}", self.endpoint, e)))?;
        if uri.host().map_or(true, str::is_empty) {
            return Err(MpError::Configuration(format!(
                "invalid endpoint '{}': no host",
                self.endpoint
            )));
        }
        match uri.scheme_str() {
            Some("http") | Some("https") => Ok(url),
            other => Err(MpError::Configuration(format!(
                "invalid endpoint '{}': unsupported scheme {:?}",
                self.endpoint, other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_flags_win_over_environment() {
        let flags = ConfigFlags {
            endpoint: Some("play.example.com:9000".to_string()),
            ..Default::default()
        };
        let config = ConnectionConfig::resolve(
            flags,
            env_of(&[("ENDPOINT", "other:9000"), ("ACCESS_KEY", "ak"), ("SECRET_KEY", "sk")]),
        );

        assert_eq!(config.endpoint, "play.example.com:9000");
        assert_eq!(config.access_key, "ak");
        assert_eq!(config.secret_key, "sk");
        assert_eq!(config.region, DEFAULT_REGION);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_switches_need_exactly_one() {
        let config = ConnectionConfig::resolve(
            ConfigFlags::default(),
            env_of(&[("SECURE", "true"), ("TRACE", "1")]),
        );
        assert!(!config.secure);
        assert!(config.trace);
    }

    #[test]
    fn test_endpoint_url_scheme() {
        let mut config = ConnectionConfig::resolve(
            ConfigFlags {
                endpoint: Some("localhost:9000".to_string()),
                ..Default::default()
            },
            |_| None,
        );
        assert_eq!(config.endpoint_url().unwrap(), "http://localhost:9000");

        config.secure = true;
        assert_eq!(config.endpoint_url().unwrap(), "https://localhost:9000");

        config.endpoint = "http://127.0.0.1:9000/".to_string();
        assert_eq!(config.endpoint_url().unwrap(), "http://127.0.0.1:9000");

        config.endpoint = "ftp://127.0.0.1".to_string();
        assert!(matches!(config.endpoint_url(), Err(MpError::Configuration(_))));
    }

    #[test]
    fn test_missing_values_are_configuration_errors() {
        let config = ConnectionConfig::resolve(ConfigFlags::default(), |_| None);
        assert!(matches!(config.validate(), Err(MpError::Configuration(_))));

        let config = ConnectionConfig::resolve(
            ConfigFlags::default(),
            env_of(&[("ENDPOINT", "localhost:9000"), ("ACCESS_KEY", "ak")]),
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("secret key"));
    }
}
