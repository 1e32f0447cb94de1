use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub subjects: SubjectConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    /// Server URLs, e.g. "nats://localhost:4222"
    #[serde(default = "default_nats_urls")]
    pub urls: Vec<String>,
    /// Reply deadline for request/reply calls
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_stream_name")]
    pub name: String,
    #[serde(default = "default_stream_subjects")]
    pub subjects: Vec<String>,
    /// Retention cap in messages. Unlimited when unset.
    #[serde(default)]
    pub max_messages: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectConfig {
    /// Subject for durable publishes, must be captured by the stream
    #[serde(default = "default_stream_publish_subject")]
    pub stream_publish: String,
    /// Subject for fire-and-forget publishes
    #[serde(default = "default_publish_subject")]
    pub publish: String,
    /// Subject targeted by request/reply calls
    #[serde(default = "default_request_subject")]
    pub request: String,
    /// Pattern the built-in responder answers on
    #[serde(default = "default_responder_pattern")]
    pub responder_pattern: String,
    /// Subject mirrored to the log by the watcher subscription
    #[serde(default = "default_watch_subject")]
    pub watch: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            instance_id: default_instance_id(),
        }
    }
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            urls: default_nats_urls(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            name: default_stream_name(),
            subjects: default_stream_subjects(),
            max_messages: None,
        }
    }
}

impl Default for SubjectConfig {
    fn default() -> Self {
        Self {
            stream_publish: default_stream_publish_subject(),
            publish: default_publish_subject(),
            request: default_request_subject(),
            responder_pattern: default_responder_pattern(),
            watch: default_watch_subject(),
        }
    }
}

fn default_port() -> u16 {
    3005
}

fn default_instance_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_nats_urls() -> Vec<String> {
    vec!["nats://localhost:4222".to_string()]
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_stream_name() -> String {
    "mystream1".to_string()
}

fn default_stream_subjects() -> Vec<String> {
    vec!["mystream1.*".to_string()]
}

fn default_stream_publish_subject() -> String {
    "mystream1.a".to_string()
}

fn default_publish_subject() -> String {
    "mystream".to_string()
}

fn default_request_subject() -> String {
    "greet.joe".to_string()
}

fn default_responder_pattern() -> String {
    "greet.*".to_string()
}

fn default_watch_subject() -> String {
    "mystream".to_string()
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());

        let mut config: Self = if Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_yaml::from_str(&content)?
        } else {
            Self::default()
        };

        // Environment variables take precedence over the file
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse() {
                config.server.port = p;
            }
        }
        if let Ok(urls) = std::env::var("NATS_URL") {
            config.nats.urls = urls.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(timeout) = std::env::var("REQUEST_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                config.nats.request_timeout_ms = ms;
            }
        }

        if config.nats.urls.is_empty() || config.nats.urls.iter().any(|u| u.is_empty()) {
            anyhow::bail!("At least one non-empty NATS URL is required");
        }
        if config.nats.request_timeout_ms == 0 {
            anyhow::bail!("Request timeout must be positive");
        }
        if config.stream.name.is_empty() {
            anyhow::bail!("Stream name must not be empty");
        }
        if config.stream.subjects.is_empty() {
            anyhow::bail!("Stream subjects must not be empty");
        }

        Ok(config)
    }

    pub fn test_config() -> Self {
        Self {
            server: ServerConfig {
                port: std::env::var("PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or_else(default_port),
                instance_id: format!("test-{}", &default_instance_id()[..8]),
            },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_local_development() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 3005);
        assert_eq!(config.nats.urls, vec!["nats://localhost:4222"]);
        assert_eq!(config.nats.request_timeout_ms, 5000);
        assert_eq!(config.stream.name, "mystream1");
        assert_eq!(config.stream.subjects, vec!["mystream1.*"]);
        assert_eq!(config.stream.max_messages, None);
        assert_eq!(config.subjects.stream_publish, "mystream1.a");
        assert_eq!(config.subjects.publish, "mystream");
        assert_eq!(config.subjects.request, "greet.joe");
        assert_eq!(config.subjects.responder_pattern, "greet.*");
        assert_eq!(config.subjects.watch, "mystream");
    }

    #[test]
    fn yaml_overrides_defaults() {
        let yaml = r#"
server:
  port: 9000
nats:
  urls:
    - "nats://a:4222"
    - "nats://b:4222"
  request_timeout_ms: 250
stream:
  name: orders
  subjects: ["orders.*"]
  max_messages: 1000
subjects:
  stream_publish: orders.created
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(
            config.nats.urls,
            vec!["nats://a:4222", "nats://b:4222"]
        );
        assert_eq!(config.nats.request_timeout_ms, 250);
        assert_eq!(config.stream.name, "orders");
        assert_eq!(config.stream.max_messages, Some(1000));
        assert_eq!(config.subjects.stream_publish, "orders.created");
        // Fields absent from the file keep their defaults
        assert_eq!(config.subjects.publish, "mystream");
        assert_eq!(config.subjects.watch, "mystream");
    }

    #[test]
    fn partial_yaml_parses() {
        let config: AppConfig = serde_yaml::from_str("server:\n  port: 4000\n").unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.stream.name, "mystream1");
    }

    #[test]
    fn test_config_marks_the_instance() {
        let config = AppConfig::test_config();
        assert!(config.server.instance_id.starts_with("test-"));
        assert_eq!(config.stream.name, "mystream1");
    }

    // Environment variables are process-wide, so every load() scenario
    // runs inside this one test.
    #[test]
    fn load_applies_env_overrides_and_validates() {
        let path = std::env::temp_dir().join(format!(
            "gateway-config-{}.yaml",
            uuid::Uuid::new_v4().simple()
        ));
        std::fs::write(
            &path,
            "server:\n  port: 9000\nnats:\n  urls: [\"nats://file:4222\"]\n",
        )
        .unwrap();
        std::env::set_var("CONFIG_PATH", &path);
        std::env::set_var("PORT", "7777");
        std::env::set_var("NATS_URL", "nats://x:4222, nats://y:4222");
        std::env::set_var("REQUEST_TIMEOUT_MS", "1234");

        let config = AppConfig::load().unwrap();
        assert_eq!(config.server.port, 7777);
        assert_eq!(config.nats.urls, vec!["nats://x:4222", "nats://y:4222"]);
        assert_eq!(config.nats.request_timeout_ms, 1234);

        // Unparseable numbers fall back to the file values
        std::env::set_var("PORT", "not-a-port");
        std::env::set_var("REQUEST_TIMEOUT_MS", "soon");
        std::env::remove_var("NATS_URL");
        let config = AppConfig::load().unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.nats.request_timeout_ms, 5000);
        assert_eq!(config.nats.urls, vec!["nats://file:4222"]);

        // Validation rejects empty URLs, zero timeouts and empty streams
        std::env::set_var("NATS_URL", "");
        let err = AppConfig::load().unwrap_err();
        assert!(err.to_string().contains("NATS URL"), "got: {err}");

        std::env::set_var("NATS_URL", "nats://x:4222");
        std::env::set_var("REQUEST_TIMEOUT_MS", "0");
        let err = AppConfig::load().unwrap_err();
        assert!(err.to_string().contains("timeout"), "got: {err}");

        std::env::remove_var("REQUEST_TIMEOUT_MS");
        std::fs::write(&path, "stream:\n  name: \"\"\n").unwrap();
        let err = AppConfig::load().unwrap_err();
        assert!(err.to_string().contains("Stream name"), "got: {err}");

        std::fs::write(&path, "stream:\n  subjects: []\n").unwrap();
        let err = AppConfig::load().unwrap_err();
        assert!(err.to_string().contains("Stream subjects"), "got: {err}");

        // A missing file falls back to defaults
        std::fs::remove_file(&path).unwrap();
        std::env::remove_var("PORT");
        let config = AppConfig::load().unwrap();
        assert_eq!(config.server.port, 3005);

        std::env::remove_var("CONFIG_PATH");
        std::env::remove_var("NATS_URL");
        std::env::remove_var("REQUEST_TIMEOUT_MS");
    }
}
