//! 基础设施层（Infrastructure）
//!
//! 持有稀缺资源（数据库连接池），只暴露存储能力。

pub mod memory_store;
pub mod record_store;
pub mod sqlite_store;

pub use memory_store::InMemoryRecordStore;
pub use record_store::{NumberingRule, RecordStore, StoreError};
pub use sqlite_store::SqliteRecordStore;
