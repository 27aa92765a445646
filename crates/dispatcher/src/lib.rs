//! # Dispatcher
//!
//! 输出分发模块。
//!
//! 负责：
//! - 接收融合节点发布的 `OutputEvent`（同步线程 → 异步通道）
//! - Fan-out 到多个 sinks
//! - 隔离慢 sink，不阻塞主链路

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod publisher;
pub mod sinks;

pub use contracts::{DataSink, OutputEvent};
pub use dispatcher::{create_dispatcher, Dispatcher, DispatcherBuilder, DispatcherConfig};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use publisher::ChannelPublisher;
pub use sinks::{FileSink, FileSinkConfig, LogSink};
