use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Configuration {
    #[serde(default)]
    pub server: ServerConfiguration,
    pub oauth: OAuthConfiguration,
    #[serde(default)]
    pub demo_user: DemoUserConfiguration,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfiguration {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL printed in `verification_uri`.
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Lifetime of a device code.
    #[serde(default = "default_grant_ttl")]
    pub grant_ttl_seconds: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OAuthConfiguration {
    pub client_id: String,
    #[serde(default)]
    pub audience: Option<String>,
}

/// Profile returned from `/userinfo` for every approved grant.
#[derive(Debug, Deserialize, Clone)]
pub struct DemoUserConfiguration {
    #[serde(default = "default_subject")]
    pub subject: String,

    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_email")]
    pub email: String,

    #[serde(default)]
    pub picture: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_grant_ttl() -> u64 {
    600
}

fn default_poll_interval() -> u64 {
    5
}

fn default_subject() -> String {
    "streamit|demo-viewer".to_string()
}

fn default_name() -> String {
    "Demo Viewer".to_string()
}

fn default_email() -> String {
    "viewer@streamit.dev".to_string()
}

impl Default for ServerConfiguration {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
            grant_ttl_seconds: default_grant_ttl(),
            poll_interval_seconds: default_poll_interval(),
        }
    }
}

impl Default for DemoUserConfiguration {
    fn default() -> Self {
        Self {
            subject: default_subject(),
            name: default_name(),
            email: default_email(),
            picture: None,
        }
    }
}

impl Configuration {
    pub fn new() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if std::path::Path::new("config.toml").exists() {
            builder = builder.add_source(config::File::with_name("config"));
        }

        builder = builder
            .add_source(config::Environment::with_prefix("STREAMIT_PROVIDER").separator("__"));

        builder.build()?.try_deserialize()
    }

    /// Defaults for everything except the accepted client.
    pub fn for_client(client_id: impl Into<String>) -> Self {
        Self {
            server: ServerConfiguration::default(),
            oauth: OAuthConfiguration {
                client_id: client_id.into(),
                audience: None,
            },
            demo_user: DemoUserConfiguration::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_source() {
        let configuration: Configuration = config::Config::builder()
            .set_override("oauth.client_id", "streamit-tv")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(configuration.oauth.client_id, "streamit-tv");
        assert_eq!(configuration.server.port, 8080);
        assert_eq!(configuration.server.public_url, "http://localhost:8080");
        assert_eq!(configuration.server.grant_ttl_seconds, 600);
        assert_eq!(configuration.server.poll_interval_seconds, 5);
        assert_eq!(configuration.demo_user.name, "Demo Viewer");
    }

    #[test]
    fn test_missing_client_id_is_rejected() {
        let result: Result<Configuration, _> = config::Config::builder()
            .set_override("server.port", 9090)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize();

        assert!(result.is_err());
    }
}
