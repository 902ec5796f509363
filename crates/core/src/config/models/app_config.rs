use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    admin_executor::{AdminConfig, ExecutorConfig},
    database::DatabaseConfig,
    observability::ObservabilityConfig,
};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub admin: AdminConfig,
    pub executor: ExecutorConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Defaults of every section
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: `SCHEDULER_`, nested keys joined by `__`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/scheduler.toml",
                "scheduler.toml",
                "/etc/scheduler/config.toml",
            ];

            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("SCHEDULER")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("executor.admin_addresses")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;

        if self.admin.enabled {
            self.admin.validate().context("调度中心配置验证失败")?;
        }

        if self.executor.enabled {
            self.executor.validate().context("执行器配置验证失败")?;
        }

        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.admin.time_wheel_slots, 300);
        assert_eq!(config.admin.registry_dead_timeout_seconds, 30);
        assert_eq!(config.executor.heartbeat_interval_seconds, 5);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_str = r#"
            [database]
            url = "memory://"

            [executor]
            enabled = true
            app_name = "order-executor"
            admin_addresses = ["http://admin-1:8080", "http://admin-2:8080"]
        "#;

        let config = AppConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.database.url, "memory://");
        assert_eq!(config.executor.app_name, "order-executor");
        assert_eq!(config.executor.admin_addresses.len(), 2);
        assert_eq!(config.admin.pre_read_ms, 5000);
    }

    #[test]
    fn test_invalid_database_url_rejected() {
        let toml_str = r#"
            [database]
            url = "mysql://localhost/jobs"
        "#;
        assert!(AppConfig::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [admin]
            access_token = "secret"
            time_wheel_slots = 120

            [observability]
            log_format = "json"
            "#
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.admin.access_token, "secret");
        assert_eq!(config.admin.time_wheel_slots, 120);
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(AppConfig::load(Some("/nonexistent/scheduler.toml")).is_err());
    }

    #[test]
    fn test_toml_roundtrip_preserves_sections() {
        let config = AppConfig::default();
        let serialized = config.to_toml().unwrap();
        assert!(serialized.contains("[admin]"));
        assert!(serialized.contains("[executor]"));
    }
}
