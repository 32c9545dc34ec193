use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use vps_hypervisor::KvmConfig;
use vps_orchestrator::CoordinatorConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Implicit admin; required to start the service
    #[serde(default = "default_root_admin")]
    pub root_admin: Option<String>,

    #[serde(default = "default_driver_timeout")]
    pub driver_timeout_secs: u64,

    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,

    #[serde(default = "default_libvirt_uri")]
    pub libvirt_uri: Option<String>,

    #[serde(default = "default_os_variant")]
    pub os_variant: String,

    #[serde(default = "default_network")]
    pub network: String,

    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    /// Shown next to newly issued panel credentials
    #[serde(default = "default_panel_url")]
    pub panel_url: Option<String>,

    /// Shared secret presented by the chat dispatcher; the invoke endpoint is
    /// disabled when unset
    #[serde(default = "default_dispatch_token")]
    pub dispatch_token: Option<String>,
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn default_bind_addr() -> String {
    non_empty_var("VPS_API_BIND").unwrap_or_else(|| "0.0.0.0:3001".to_string())
}

fn default_data_dir() -> PathBuf {
    if let Some(path) = non_empty_var("VPS_DATA_DIR") {
        return PathBuf::from(path);
    }

    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vps")
        .join("data")
}

fn default_root_admin() -> Option<String> {
    non_empty_var("VPS_ROOT_ADMIN")
}

fn default_driver_timeout() -> u64 {
    non_empty_var("VPS_DRIVER_TIMEOUT")
        .and_then(|s| s.parse().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(60)
}

fn default_image_dir() -> PathBuf {
    non_empty_var("VPS_IMAGE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| KvmConfig::default().image_dir)
}

fn default_libvirt_uri() -> Option<String> {
    non_empty_var("VPS_LIBVIRT_URI")
}

fn default_os_variant() -> String {
    non_empty_var("VPS_OS_VARIANT").unwrap_or_else(|| KvmConfig::default().os_variant)
}

fn default_network() -> String {
    non_empty_var("VPS_NETWORK").unwrap_or_else(|| KvmConfig::default().network)
}

fn default_name_prefix() -> String {
    non_empty_var("VPS_NAME_PREFIX").unwrap_or_else(|| "vps".to_string())
}

fn default_panel_url() -> Option<String> {
    non_empty_var("VPS_PANEL_URL")
}

fn default_dispatch_token() -> Option<String> {
    non_empty_var("VPS_DISPATCH_TOKEN")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            data_dir: default_data_dir(),
            root_admin: default_root_admin(),
            driver_timeout_secs: default_driver_timeout(),
            image_dir: default_image_dir(),
            libvirt_uri: default_libvirt_uri(),
            os_variant: default_os_variant(),
            network: default_network(),
            name_prefix: default_name_prefix(),
            panel_url: default_panel_url(),
            dispatch_token: default_dispatch_token(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn driver_timeout(&self) -> Duration {
        Duration::from_secs(self.driver_timeout_secs)
    }

    pub fn kvm_config(&self) -> KvmConfig {
        KvmConfig {
            image_dir: self.image_dir.clone(),
            libvirt_uri: self.libvirt_uri.clone(),
            os_variant: self.os_variant.clone(),
            network: self.network.clone(),
            command_timeout: Some(self.driver_timeout()),
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            name_prefix: self.name_prefix.clone(),
            driver_timeout: self.driver_timeout(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_settings_share_timeout() {
        let config = Config {
            driver_timeout_secs: 15,
            name_prefix: "zy".to_string(),
            ..Config::default()
        };

        assert_eq!(config.kvm_config().command_timeout, Some(Duration::from_secs(15)));
        let coordinator = config.coordinator_config();
        assert_eq!(coordinator.driver_timeout, Duration::from_secs(15));
        assert_eq!(coordinator.name_prefix, "zy");
        assert!(coordinator.verify_after_create);
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "bind_addr": "127.0.0.1:9000", "root_admin": "42" }"#)
                .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.root_admin.as_deref(), Some("42"));
        assert!(!config.name_prefix.is_empty());
    }
}
