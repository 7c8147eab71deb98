//! # 通道注册表
//!
//! ## 核心意图（Why）
//! - 接收器对连接簿记的唯一诉求是“按地址注册”与“按地址查找”，
//!   因此以 [`ChannelRegistry`] 契约隔离，宿主可替换为自己的连接管理器；
//! - [`ChannelMap`] 提供基于 `DashMap` 的默认实现，多个接收器可共享同一实例。
//!
//! ## 风险提示（Trade-offs）
//! - `find_channel` 克隆 `Arc<Channel>` 后立即释放分片锁，调用方持有通道期间不会阻塞写入；
//! - 未内建过期清理，长期静默的通道需由上层结合 [`Channel::last_received_at`] 回收。

use std::{net::SocketAddr, sync::Arc};

use dashmap::{DashMap, mapref::entry::Entry};

use crate::{channel::Channel, error::RegistryError};

/// 连接注册表契约。
pub trait ChannelRegistry: Send + Sync {
    /// 注册通道；同地址已存在时返回 [`RegistryError::AlreadyRegistered`]。
    fn register_channel(&self, channel: Arc<Channel>) -> Result<(), RegistryError>;

    /// 按地址查找通道。
    fn find_channel(&self, addr: &SocketAddr) -> Option<Arc<Channel>>;

    /// 移除并返回通道。
    fn deregister_channel(&self, addr: &SocketAddr) -> Option<Arc<Channel>>;
}

/// 以对端地址为键的并发通道表。
#[derive(Debug, Default)]
pub struct ChannelMap {
    channels: DashMap<SocketAddr, Arc<Channel>>,
}

impl ChannelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// 当前全部通道地址的快照。
    pub fn addresses(&self) -> Vec<SocketAddr> {
        self.channels.iter().map(|entry| *entry.key()).collect()
    }
}

impl ChannelRegistry for ChannelMap {
    fn register_channel(&self, channel: Arc<Channel>) -> Result<(), RegistryError> {
        let addr = channel.address();
        match self.channels.entry(addr) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyRegistered { addr }),
            Entry::Vacant(vacant) => {
                vacant.insert(channel);
                Ok(())
            }
        }
    }

    fn find_channel(&self, addr: &SocketAddr) -> Option<Arc<Channel>> {
        self.channels.get(addr).map(|entry| Arc::clone(entry.value()))
    }

    fn deregister_channel(&self, addr: &SocketAddr) -> Option<Arc<Channel>> {
        self.channels.remove(addr).map(|(_, channel)| channel)
    }
}
