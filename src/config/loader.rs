use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::debug;

use super::types::Config;

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        debug!(path = %path.display(), "loading configuration");

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(yaml).context("failed to parse YAML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        // At least one protocol must be listening
        if self.collectors.is_empty() {
            anyhow::bail!("at least one collector must be configured");
        }

        // Bind addresses must be distinct
        let mut addresses = HashSet::new();
        for (name, collector) in [
            ("cisco", &self.collectors.cisco),
            ("nokia", &self.collectors.nokia),
            ("huawei", &self.collectors.huawei),
        ] {
            let Some(collector) = collector else { continue };
            if !addresses.insert(collector.address) {
                anyhow::bail!("duplicate collector address: {} ({})", collector.address, name);
            }
            if collector.max_frame_bytes == 0 {
                anyhow::bail!("collector {name}: max_frame_bytes must be non-zero");
            }
            if collector.queue_depth == 0 {
                anyhow::bail!("collector {name}: queue_depth must be non-zero");
            }
        }

        if let Some(push) = &self.delivery.push {
            if push.endpoint.is_empty() {
                anyhow::bail!("push sink endpoint must not be empty");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
collectors:
  cisco:
    address: "127.0.0.1:10007"
    replies: 10
  huawei:
    address: "127.0.0.1:10009"
socket:
  bind_device: eth1
labels:
  path: /etc/dialoutd/labels.csv
delivery:
  queue:
    capacity: 512
telemetry:
  log_level: debug
"#;

    #[test]
    fn parses_sample() {
        let config = Config::from_yaml(SAMPLE).unwrap();

        let cisco = config.collectors.cisco.unwrap();
        assert_eq!(cisco.replies, Some(10));
        assert_eq!(cisco.max_frame_bytes, 4 * 1024 * 1024);

        let huawei = config.collectors.huawei.unwrap();
        assert_eq!(huawei.replies, None);

        assert!(config.collectors.nokia.is_none());
        assert_eq!(config.socket.bind_device.as_deref(), Some("eth1"));
        assert_eq!(config.delivery.queue.unwrap().capacity, 512);
        assert!(config.delivery.push.is_none());
        assert_eq!(config.telemetry.log_level, "debug");
    }

    #[test]
    fn rejects_empty_collectors() {
        let err = Config::from_yaml("collectors: {}").unwrap_err();
        assert!(err.to_string().contains("at least one collector"));
    }

    #[test]
    fn rejects_duplicate_addresses() {
        let yaml = r#"
collectors:
  cisco:
    address: "127.0.0.1:10007"
  nokia:
    address: "127.0.0.1:10007"
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate collector address"));
    }
}
