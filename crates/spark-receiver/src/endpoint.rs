//! 端点契约：收包核心观察到的 OS 网络句柄抽象。
//!
//! ## 设计动机（Why）
//! - 端点由外部创建并管理生命周期，收包核心只通过共享引用观察它；
//! - 各平台的错误码空间（errno、WSA 错误码）在端点实现内部折叠为唯一的
//!   [`TransportFailure`] 枚举，使错误分类器保持平台无关。
//!
//! ## 契约（What）
//! - [`Endpoint::receive`] 必须是非阻塞的：立即返回数据、`WouldBlock` 或其他失败；
//! - [`Endpoint::resolve_closed_peer`] 为尽力而为的能力，无法确定时返回 `None`。

use std::{
    fmt, io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use thiserror::Error;

/// 端点在事件循环中的身份标识。
///
/// 就绪通知以该标识为键投递；标识在进程内单调分配，不会复用。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct EndpointId(u64);

impl EndpointId {
    /// 分配一个新的进程内唯一标识。
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// 以原始数值构造标识，供测试或外部事件循环映射使用。
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ep#{}", self.0)
    }
}

/// 端点角色。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EndpointKind {
    /// 监听端点，就绪意味着有待接受的入站连接。
    Listening,
    /// 已连接的流式端点。
    Stream,
    /// 数据报端点，可能已连接也可能未连接。
    Datagram,
}

/// 一次成功读取的元数据。
///
/// - `len`：写入缓冲区的字节数，可能为 0（由分类器判定为故障）；
/// - `source`：数据报端点报告的来源地址；流式端点为 `None`。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Received {
    pub len: usize,
    pub source: Option<SocketAddr>,
}

impl Received {
    pub fn new(len: usize) -> Self {
        Self { len, source: None }
    }

    pub fn from_source(len: usize, source: SocketAddr) -> Self {
        Self {
            len,
            source: Some(source),
        }
    }
}

/// 平台无关的传输层失败枚举。
///
/// # 教案式说明
/// - **意图 (Why)**：Linux errno、Windows WSA 错误码各自成体系，若分类器直接读取原始码，
///   每新增一个平台都要改动核心逻辑；由端点把原始码折叠为本枚举后，分类器只需匹配变体。
/// - **契约 (What)**：
///   - `WouldBlock`：非阻塞读取暂无数据；
///   - `ConnectionRefused` / `HostUnreachable`：对端主动拒绝或不可达，触发对端地址解析；
///   - `Other` 保留原始 `ErrorKind` 与 OS 错误码，仅用于日志排障。
/// - **执行 (How)**：`From<io::Error>` 依据 `ErrorKind` 映射，标准库已在各平台完成
///   errno/WSA 码到 `ErrorKind` 的归一。
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TransportFailure {
    #[error("operation would block")]
    WouldBlock,
    #[error("connection refused by peer")]
    ConnectionRefused,
    #[error("peer host or network unreachable")]
    HostUnreachable,
    #[error("connection reset by peer")]
    ConnectionReset,
    #[error("operation interrupted")]
    Interrupted,
    #[error("operation not supported by this endpoint")]
    Unsupported,
    #[error("transport failure ({kind:?}, os error {raw_os_error:?})")]
    Other {
        kind: io::ErrorKind,
        raw_os_error: Option<i32>,
    },
}

impl TransportFailure {
    /// 是否属于“对端拒绝/不可达”一类。
    pub fn is_peer_unreachable(&self) -> bool {
        matches!(
            self,
            TransportFailure::ConnectionRefused | TransportFailure::HostUnreachable
        )
    }
}

impl From<io::Error> for TransportFailure {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock => TransportFailure::WouldBlock,
            io::ErrorKind::ConnectionRefused => TransportFailure::ConnectionRefused,
            io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
                TransportFailure::HostUnreachable
            }
            io::ErrorKind::ConnectionReset => TransportFailure::ConnectionReset,
            io::ErrorKind::Interrupted => TransportFailure::Interrupted,
            io::ErrorKind::Unsupported => TransportFailure::Unsupported,
            kind => TransportFailure::Other {
                kind,
                raw_os_error: err.raw_os_error(),
            },
        }
    }
}

/// 收包核心所需的端点能力。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 把“监听端点接受连接”和“对端端点读取报文”收敛到同一契约，
///   让同一个接收器在两种角色下复用一条处理路径。
///
/// ## 契约 (What)
/// - `id`：事件循环投递就绪通知时使用的身份；
/// - `kind`：决定就绪通知走接受路径还是排空路径；
/// - `address`：流式端点为对端地址，监听或未连接数据报端点为本地地址；
/// - `accept`：仅监听端点支持，默认返回 [`TransportFailure::Unsupported`]；
/// - `receive`：一次非阻塞读取；
/// - `resolve_closed_peer`：在收到拒绝/不可达错误后尽力解析出问题的对端地址。
///
/// ## 注意事项 (Trade-offs)
/// - 所有方法均以 `&self` 调用，实现需自行保证内部可变性；接收器只在单个事件循环线程上调用，
///   但注册表可能跨接收器共享端点引用，因此要求 `Send + Sync`。
pub trait Endpoint: Send + Sync + fmt::Debug {
    fn id(&self) -> EndpointId;

    fn kind(&self) -> EndpointKind;

    fn address(&self) -> SocketAddr;

    fn accept(&self) -> Result<Arc<dyn Endpoint>, TransportFailure> {
        Err(TransportFailure::Unsupported)
    }

    fn receive(&self, buf: &mut [u8]) -> Result<Received, TransportFailure>;

    fn resolve_closed_peer(&self) -> Option<SocketAddr>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_collapse_into_transport_failures() {
        let cases = [
            (io::ErrorKind::WouldBlock, TransportFailure::WouldBlock),
            (
                io::ErrorKind::ConnectionRefused,
                TransportFailure::ConnectionRefused,
            ),
            (
                io::ErrorKind::HostUnreachable,
                TransportFailure::HostUnreachable,
            ),
            (
                io::ErrorKind::NetworkUnreachable,
                TransportFailure::HostUnreachable,
            ),
            (
                io::ErrorKind::ConnectionReset,
                TransportFailure::ConnectionReset,
            ),
            (io::ErrorKind::Interrupted, TransportFailure::Interrupted),
        ];
        for (kind, expected) in cases {
            assert_eq!(TransportFailure::from(io::Error::from(kind)), expected);
        }
    }

    #[test]
    fn unknown_kinds_keep_raw_code() {
        let failure = TransportFailure::from(io::Error::from_raw_os_error(9999));
        match failure {
            TransportFailure::Other { raw_os_error, .. } => assert_eq!(raw_os_error, Some(9999)),
            other => panic!("unexpected mapping: {other:?}"),
        }
    }

    #[test]
    fn endpoint_ids_are_unique() {
        let a = EndpointId::next();
        let b = EndpointId::next();
        assert_ne!(a, b);
        assert_eq!(EndpointId::from_raw(a.as_raw()), a);
    }
}
