use serde::{Deserialize, Serialize};

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

/// 由连接串前缀决定的存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    Postgres,
    Sqlite,
    Memory,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:scheduler.db?mode=rwc".to_string(),
            max_connections: 10,
            min_connections: 1,
            connection_timeout_seconds: 30,
            idle_timeout_seconds: 600,
        }
    }
}

impl DatabaseConfig {
    pub fn kind(&self) -> Option<DatabaseKind> {
        if self.url.starts_with("postgresql://") || self.url.starts_with("postgres://") {
            Some(DatabaseKind::Postgres)
        } else if self.url.starts_with("sqlite:") {
            Some(DatabaseKind::Sqlite)
        } else if self.url.starts_with("memory://") {
            Some(DatabaseKind::Memory)
        } else {
            None
        }
    }

    /// Validate database configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.url.is_empty() {
            return Err(anyhow::anyhow!("数据库URL不能为空"));
        }

        if self.kind().is_none() {
            return Err(anyhow::anyhow!(
                "不支持的数据库URL: {}，支持 postgres://、sqlite:、memory://",
                self.url
            ));
        }

        if self.max_connections == 0 {
            return Err(anyhow::anyhow!("最大连接数必须大于0"));
        }

        if self.min_connections > self.max_connections {
            return Err(anyhow::anyhow!("最小连接数不能大于最大连接数"));
        }

        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("连接超时时间必须大于0"));
        }

        Ok(())
    }
}
