use log::warn;
use once_cell::sync::OnceCell;
use serde_derive::Deserialize;
use std::sync::Mutex;

static INSTANCE: OnceCell<Mutex<RuntimeConfig>> = OnceCell::new();

pub fn instance() -> &'static Mutex<RuntimeConfig> {
    INSTANCE.get_or_init(|| Mutex::new(RuntimeConfig::new()))
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    pub addr: String,
    pub metrics_addr: String,
    pub data_path: String,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        RuntimeConfig {
            addr: "0.0.0.0:4000".to_string(),
            metrics_addr: "0.0.0.0:4010".to_string(),
            data_path: "data".to_string(),
        }
    }

    pub fn from_toml(path: &str) -> Option<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(
                    "Something went wrong reading the runtime config file, {:?}",
                    e
                );
                return Some(RuntimeConfig::new());
            }
        };
        let config: RuntimeConfig = match toml::from_str(&contents) {
            Ok(c) => c,
            Err(e) => {
                warn!(
                    "Something went wrong reading the runtime config file, {:?}",
                    e
                );
                return Some(RuntimeConfig::new());
            }
        };
        *instance().lock().unwrap() = config.clone();
        Some(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = RuntimeConfig::from_toml("definitely-not-a-real-file.toml").unwrap();
        assert_eq!(config.addr, "0.0.0.0:4000");
        assert_eq!(config.data_path, "data");
    }

    #[test]
    fn test_toml_parsing() {
        let config: RuntimeConfig = toml::from_str(
            r#"
            addr = "127.0.0.1:5000"
            metrics_addr = "127.0.0.1:5010"
            data_path = "/var/lib/confstore"
            "#,
        )
        .unwrap();
        assert_eq!(config.addr, "127.0.0.1:5000");
        assert_eq!(config.metrics_addr, "127.0.0.1:5010");
        assert_eq!(config.data_path, "/var/lib/confstore");
    }
}
