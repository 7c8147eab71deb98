#![doc = r#"
# spark-receiver

## 设计动机（Why）
- **定位**：传输层收包核心。OS 端点上到达的字节在这里变成离散报文，按对端地址路由到逻辑通道，
  并在交给上层协议之前穿过通道各自的过滤器链。
- **架构角色**：夹在事件循环与上层协议之间；事件循环、端点创建、连接簿记与载荷编解码均为外部协作者，
  通过 [`Endpoint`]、[`ChannelRegistry`]、[`FaultReporter`]、[`PacketSink`] 契约接入。
- **设计理念**：单线程、协作式、非阻塞。接收器在事件循环回调中同步执行并尽快返回，
  任何分类后的故障都交给上报器，而不是作为控制流错误向外传播。

## 核心契约（What）
- **就绪通知**：监听端点就绪时恰好接受一个连接并注册内部通道；对端端点就绪时排空到首次非生产性读取；
- **错误分类**：零字节读取恒为通用故障；`WouldBlock` 仅在非首次读取时为“稍后重试”；
  拒绝/不可达在能解析对端地址时为“对端不可达”，否则降级为通用故障；
- **分发**：有通道则更新统计，有过滤器则交由过滤器全权处理，否则交给默认交接点；
  交接失败仅在详细模式下上报。

## 实现策略（How）
- 待命缓冲与已交出报文分离：成功读取后以 `Arc<Packet>` 交出，立即换入新缓冲；
- 平台相关的错误码在端点实现内折叠为 [`TransportFailure`]，分类器保持平台无关；
- 日志统一使用 `tracing`，本 crate 不安装任何 Subscriber。

## 风险与考量（Trade-offs）
- “读到无数据为止”的排空可能让活跃对端独占事件循环，可通过
  [`ReceiverConfig::with_max_packets_per_notification`] 设置单次通知上限；
- 零字节读取对无连接传输的语义并不明确，这里统一按通用故障处理，不推断流结束。
"#]

mod channel;
mod classify;
mod config;
mod endpoint;
mod error;
mod filter;
mod packet;
mod receiver;
mod registry;
mod report;

pub use channel::{Channel, ChannelKind, ChannelStats};
pub use classify::{ErrorOutcome, ReadOutcome, classify};
pub use config::{DEFAULT_PACKET_CAPACITY, MAX_PACKET_CAPACITY, ReceiverConfig};
pub use endpoint::{Endpoint, EndpointId, EndpointKind, Received, TransportFailure};
pub use error::{ConfigError, Reason, RegistryError};
pub use filter::{
    DiscardSink, FilterChain, LengthPrefixedReassembler, PacketFilter, PacketSink,
    PassThroughFilter, PrefixWidth,
};
pub use packet::{Packet, PacketPtr};
pub use receiver::{InputNotificationHandler, PacketReceiver, ReceiverStats};
pub use registry::{ChannelMap, ChannelRegistry};
pub use report::{FaultReporter, ThrottledFaultReporter, TracingFaultReporter};
