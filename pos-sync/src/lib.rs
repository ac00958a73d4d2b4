//! POS Sync - 收银终端本地优先订单同步引擎
//!
//! # 架构概述
//!
//! Orders are taken and edited against a local redb store and are always
//! available offline. Every local change leaves one pending remote write in a
//! durable queue; a background worker pushes the queue to the backend when it
//! is reachable.
//!
//! - **订单** (`orders`): order model, state machine, GST, mutation queue
//! - **同步** (`sync`): background drain of the queue
//! - **远程** (`remote`): backend API trait and REST bindings
//! - **客户** (`enrichment`): best-effort customer directory updates
//! - **核心** (`core`): config, connectivity, background tasks, engine
//!
//! # 模块结构
//!
//! ```text
//! pos-sync/src/
//! ├── core/          # 配置、连通性、后台任务、引擎
//! ├── orders/        # 订单模型与变更队列
//! ├── sync/          # 同步工作者
//! ├── remote/        # 后端接口
//! ├── enrichment/    # 客户信息补充
//! └── utils/         # 日志
//! ```

pub mod core;
pub mod enrichment;
pub mod orders;
pub mod remote;
pub mod sync;
pub mod utils;

// Re-export 公共类型
pub use core::{Config, Connectivity, Engine, EngineError};
pub use enrichment::{CustomerDirectory, CustomerEnricher, CustomerRecord};
pub use orders::{
    GstConfig, GstMode, MutationQueue, OrderDraft, OrderError, OrderIntent, OrderPatch,
    OrderResult, OrderStorage, OrdersManager, RetryPolicy,
};
pub use remote::{HttpCustomerDirectory, HttpOrderRepository, RemoteError, RemoteOrderRepository};
pub use sync::{DrainReport, SyncConfig, SyncTrigger, SyncWorker};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};
