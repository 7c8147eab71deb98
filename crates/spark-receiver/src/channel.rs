//! # Channel：按对端地址索引的逻辑连接
//!
//! ## 核心意图（Why）
//! - 通道独立于底层端点存在，记录入站统计并可挂载一个过滤器；
//! - 接收器不拥有通道，每个报文都经由注册表按地址重新查找。
//!
//! ## 行为契约（What）
//! - `on_packet_received`：原子累加报文数与字节数，并刷新最近接收时间；
//! - `filter` / `set_filter` / `clear_filter`：读取或替换过滤器槽位；
//! - 所有方法以 `&self` 调用，通道以 `Arc<Channel>` 在注册表与接收器之间共享。

use std::{
    fmt,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use parking_lot::{Mutex, RwLock};

use crate::{endpoint::Endpoint, filter::PacketFilter};

/// 通道类别。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChannelKind {
    /// 集群内部连接，默认不挂载过滤器。
    Internal,
    /// 面向外部客户端的连接，通常会挂载解密/重组过滤器。
    External,
}

/// 通道入站统计的只读快照。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChannelStats {
    pub packets_received: u64,
    pub bytes_received: u64,
}

/// 逻辑连接。
///
/// # 教案式注释
/// - **意图 (Why)**：把“连接是谁、收了多少、由哪个过滤器处理”与“字节从哪个句柄读出”解耦；
/// - **契约 (What)**：`address` 为注册表键；`endpoint` 对接受得到的连接为其端点，
///   对仅以地址建模的对端（例如共享 UDP 套接字上的客户端）为 `None`；
/// - **风险 (Trade-offs)**：过滤器槽位使用读写锁，读取时克隆 `Arc` 后立即释放锁，
///   过滤器执行期间不持锁，因此过滤器内部可以安全地替换自身。
pub struct Channel {
    address: SocketAddr,
    kind: ChannelKind,
    endpoint: Option<Arc<dyn Endpoint>>,
    filter: RwLock<Option<Arc<dyn PacketFilter>>>,
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
    last_received_at: Mutex<Option<Instant>>,
}

impl Channel {
    /// 以对端地址构造未绑定端点的通道。
    pub fn new(address: SocketAddr, kind: ChannelKind) -> Self {
        Self {
            address,
            kind,
            endpoint: None,
            filter: RwLock::new(None),
            packets_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            last_received_at: Mutex::new(None),
        }
    }

    /// 包装一个新接受的端点，地址取自端点。
    pub fn from_endpoint(endpoint: Arc<dyn Endpoint>, kind: ChannelKind) -> Self {
        let mut channel = Self::new(endpoint.address(), kind);
        channel.endpoint = Some(endpoint);
        channel
    }

    /// 构造时挂载过滤器。
    pub fn with_filter(self, filter: Arc<dyn PacketFilter>) -> Self {
        *self.filter.write() = Some(filter);
        self
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn endpoint(&self) -> Option<&Arc<dyn Endpoint>> {
        self.endpoint.as_ref()
    }

    /// 当前过滤器。
    pub fn filter(&self) -> Option<Arc<dyn PacketFilter>> {
        self.filter.read().clone()
    }

    /// 替换过滤器，返回旧值。
    pub fn set_filter(&self, filter: Arc<dyn PacketFilter>) -> Option<Arc<dyn PacketFilter>> {
        self.filter.write().replace(filter)
    }

    pub fn clear_filter(&self) -> Option<Arc<dyn PacketFilter>> {
        self.filter.write().take()
    }

    /// 记录一次入站报文。
    pub fn on_packet_received(&self, bytes: usize) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        *self.last_received_at.lock() = Some(Instant::now());
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }

    /// 最近一次收到报文的时刻，未收到过为 `None`。
    pub fn last_received_at(&self) -> Option<Instant> {
        *self.last_received_at.lock()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("address", &self.address)
            .field("kind", &self.kind)
            .field("endpoint", &self.endpoint.as_ref().map(|ep| ep.id()))
            .field("filter", &self.filter.read().as_ref().map(|f| f.name()))
            .field("stats", &self.stats())
            .finish()
    }
}
