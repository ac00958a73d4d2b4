use crate::orders::{GstConfig, OrderResult, RetryPolicy};
use crate::sync::SyncConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// 同步引擎配置 - 收银终端的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/pos-sync | 工作目录 (orders.redb) |
/// | BACKEND_URL | http://localhost:8080/api | 后端 API 地址 |
/// | ENVIRONMENT | development | 运行环境 |
/// | GST_MODE | exclusive | inclusive / exclusive |
/// | GST_PERCENTAGE | 5 | 税率 (百分比) |
/// | SYNC_INTERVAL_SECS | 30 | 定时同步间隔 |
/// | SYNC_CONCURRENCY | 8 | 并发远程写入数 |
/// | MAX_SYNC_ATTEMPTS | 5 | 进入死信队列前的最大尝试次数 |
/// | RETRY_BASE_DELAY_MS | 5000 | 重试退避基数 |
/// | RETRY_MAX_DELAY_MS | 300000 | 重试退避上限 |
/// | REMOTE_TIMEOUT_MS | 10000 | 单次远程调用超时 |
/// | PROBE_INTERVAL_SECS | 15 | 连通性探测间隔 |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_DIR | (无) | 日志目录, 设置后按天滚动写文件 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/pos GST_MODE=inclusive GST_PERCENTAGE=18 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储数据库
    pub work_dir: String,
    /// 后端 API 基础地址
    pub backend_url: String,
    /// 运行环境: development | staging | production
    pub environment: String,

    // === 税务 ===
    /// 原始字符串, 由 [`Config::gst`] 校验
    pub gst_mode: String,
    pub gst_percentage: String,

    // === 同步 ===
    pub sync_interval_secs: u64,
    pub sync_concurrency: usize,
    pub max_sync_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// 远程调用超时 (毫秒)
    pub remote_timeout_ms: u64,
    /// 连通性探测间隔 (秒)
    pub probe_interval_secs: u64,

    // === 日志 ===
    pub log_level: String,
    pub log_dir: Option<String>,
}

/// 读取并解析环境变量，失败时使用默认值
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    let Ok(value) = std::env::var(key) else {
        return default;
    };
    match value.trim().parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            tracing::warn!(key, value = %value, "Invalid value in environment, using default");
            default
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/pos-sync".into()),
            backend_url: std::env::var("BACKEND_URL")
                .unwrap_or_else(|_| "http://localhost:8080/api".into()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),

            gst_mode: std::env::var("GST_MODE").unwrap_or_else(|_| "exclusive".into()),
            gst_percentage: std::env::var("GST_PERCENTAGE").unwrap_or_else(|_| "5".into()),

            sync_interval_secs: env_or("SYNC_INTERVAL_SECS", 30),
            sync_concurrency: env_or("SYNC_CONCURRENCY", 8),
            max_sync_attempts: env_or("MAX_SYNC_ATTEMPTS", 5),
            retry_base_delay_ms: env_or("RETRY_BASE_DELAY_MS", 5_000),
            retry_max_delay_ms: env_or("RETRY_MAX_DELAY_MS", 300_000),
            remote_timeout_ms: env_or("REMOTE_TIMEOUT_MS", 10_000),
            probe_interval_secs: env_or("PROBE_INTERVAL_SECS", 15),

            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: std::env::var("LOG_DIR").ok().filter(|d| !d.trim().is_empty()),
        }
    }

    /// 使用自定义工作目录覆盖配置
    ///
    /// 常用于测试场景
    pub fn with_work_dir(work_dir: impl Into<String>) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config
    }

    /// 校验税务配置
    pub fn gst(&self) -> OrderResult<GstConfig> {
        GstConfig::parse(&self.gst_mode, &self.gst_percentage)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_sync_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            interval: Duration::from_secs(self.sync_interval_secs.max(1)),
            concurrency: self.sync_concurrency.max(1),
            remote_timeout: self.remote_timeout(),
        }
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }

    /// 订单数据库路径
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("orders.redb")
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
