#![doc = r#"
# spark-transport-socket

## 设计动机（Why）
- 为 `spark-receiver` 提供基于操作系统套接字的端点实现：TCP 监听、TCP 流与 UDP 数据报。
- 收包核心只依赖 [`spark_receiver::Endpoint`] 契约，本 crate 负责把平台差异（非阻塞模式、
  错误码、被拒绝数据报的对端定位）收敛在契约之下。

## 核心契约（What）
- 端点在构造时即为非阻塞，读取永不挂起；
- I/O 错误统一折叠为 [`spark_receiver::TransportFailure`]；
- 启用 `closed-peer-errqueue` 特性（默认开启）时，Linux 上的 UDP 端点通过 `IP_RECVERR`
  错误队列定位关闭了端口的对端；其他平台或关闭特性时退回到已连接的对端地址。

## 风险与考量（Trade-offs）
- 本 crate 不包含事件循环；就绪通知由宿主自行产生，再以端点标识投递给接收器。
"#]

mod endpoint;
mod error;
#[cfg(all(target_os = "linux", feature = "closed-peer-errqueue"))]
mod errqueue;
mod options;

pub use endpoint::SocketEndpoint;
pub use error::SocketError;
pub use options::SocketOptions;
