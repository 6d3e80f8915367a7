//! 配置管理
//!
//! 文件格式的配置模型与加载逻辑。加载顺序为默认值、TOML 文件、`FLEET_` 前缀的环境变量，
//! 嵌套字段用 `__` 分隔，例如 `FLEET_HEALTH__FAILURE_THRESHOLD=5`。
//!
//! 各组件的运行时配置（携带 `Duration`）由 dispatcher 从这里的秒级字段转换得到。
//!
//! ```toml
//! [health]
//! check_interval_seconds = 15
//! failure_threshold = 3
//! cooldown_seconds = 60
//!
//! [[pools]]
//! name = "local-1"
//! pool_type = "local-process"
//! endpoint = "http://127.0.0.1:7001"
//! capabilities = ["python"]
//! max_workers = 10
//! ```

pub mod app_config;
pub mod sections;

pub use app_config::AppConfig;
pub use sections::*;
