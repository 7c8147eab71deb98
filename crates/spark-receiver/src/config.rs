//! 接收器配置。
//!
//! ## 契约（What）
//! - `verbose`：是否上报过滤器或默认交接点返回的非成功结果；
//! - `packet_capacity`：每块待命接收缓冲的容量，超出的数据报由内核截断；
//! - `max_packets_per_notification`：单次就绪通知最多分发的报文数，缺省不设上限。
//!
//! ## 风险与考量（Trade-offs）
//! - 不设上限时，持续活跃或恶意的对端可以独占事件循环；设上限后，达到上限即结束本次通知，
//!   剩余数据依赖事件循环再次投递就绪通知（电平触发语义），边沿触发的循环不应启用上限。

use std::num::NonZeroUsize;

use serde::Deserialize;

use crate::error::ConfigError;

/// 缺省的待命缓冲容量：以太网 MTU 下 UDP 载荷的上限。
pub const DEFAULT_PACKET_CAPACITY: usize = 1472;

/// 单个报文缓冲的容量上限。
pub const MAX_PACKET_CAPACITY: usize = 65_535;

/// 接收器配置。
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ReceiverConfig {
    verbose: bool,
    packet_capacity: usize,
    max_packets_per_notification: Option<NonZeroUsize>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            packet_capacity: DEFAULT_PACKET_CAPACITY,
            max_packets_per_notification: None,
        }
    }
}

impl ReceiverConfig {
    /// 从 TOML 文本解析并校验配置。
    ///
    /// ```
    /// use spark_receiver::ReceiverConfig;
    ///
    /// let config = ReceiverConfig::from_toml_str("verbose = true\npacket_capacity = 2048\n")
    ///     .expect("配置合法");
    /// assert!(config.verbose());
    /// assert_eq!(config.packet_capacity(), 2048);
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验字段取值。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.packet_capacity == 0 || self.packet_capacity > MAX_PACKET_CAPACITY {
            return Err(ConfigError::Invalid {
                field: "packet_capacity",
                detail: format!(
                    "must be within 1..={MAX_PACKET_CAPACITY}, got {}",
                    self.packet_capacity
                ),
            });
        }
        Ok(())
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// 设置待命缓冲容量；超过 [`MAX_PACKET_CAPACITY`] 的取值按上限截断。
    pub fn with_packet_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.packet_capacity = capacity.get().min(MAX_PACKET_CAPACITY);
        self
    }

    pub fn with_max_packets_per_notification(mut self, cap: Option<NonZeroUsize>) -> Self {
        self.max_packets_per_notification = cap;
        self
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn packet_capacity(&self) -> usize {
        self.packet_capacity
    }

    pub fn max_packets_per_notification(&self) -> Option<NonZeroUsize> {
        self.max_packets_per_notification
    }
}
