//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 收包路径上流动的结果码 [`Reason`] 与配置、注册表等非热路径 API 的错误类型集中在此；
//! - `Reason` 为 `Copy` 的稳定码，可在过滤器、默认交接点与故障上报器之间零成本传递。
//!
//! ## 设计要求（What）
//! - 热路径只使用 `Reason`，不分配、不携带错误链；
//! - 可失败的装配期 API 返回 `thiserror` 派生的错误，兼容 `std::error::Error`。

use std::net::SocketAddr;

use thiserror::Error;

/// 收包链路上的处理结果码。
///
/// # 教案式说明
/// - **意图 (Why)**：过滤器、默认交接点与故障上报器需要一套共享的小型结果词汇，
///   既能表达“成功”，也能表达“对端不可达”“通用网络故障”等需要上报的结论。
/// - **契约 (What)**：
///   - `Success` 是唯一的非故障值；
///   - `GeneralNetwork` 对应分类结果 Fatal-General；`NoSuchPort` 对应 PeerUnreachable；
///   - 其余变体供过滤器描述自身失败（例如重组遇到损坏帧时返回 `CorruptedPacket`）。
/// - **风险 (Trade-offs)**：变体集合有意保持很小；新增变体时需要同步 [`Reason::code`]
///   的稳定码，避免告警维度漂移。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Reason {
    /// 处理成功。
    Success,
    /// 无法归类的传输层故障，仅对本次读取或连接尝试致命。
    GeneralNetwork,
    /// 对端拒绝连接或不可达。
    NoSuchPort,
    /// 收到的字节无法按预期格式解析。
    CorruptedPacket,
    /// 处理所需资源暂不可用。
    ResourceUnavailable,
    /// 通道已失效。
    ChannelLost,
    /// 进程或通道正在关闭。
    ShuttingDown,
}

impl Reason {
    /// 是否为成功结果。
    pub fn is_success(self) -> bool {
        matches!(self, Reason::Success)
    }

    /// 稳定错误码，用于日志字段与告警聚合。
    pub fn code(self) -> &'static str {
        match self {
            Reason::Success => "receiver.success",
            Reason::GeneralNetwork => "receiver.general_network",
            Reason::NoSuchPort => "receiver.no_such_port",
            Reason::CorruptedPacket => "receiver.corrupted_packet",
            Reason::ResourceUnavailable => "receiver.resource_unavailable",
            Reason::ChannelLost => "receiver.channel_lost",
            Reason::ShuttingDown => "receiver.shutting_down",
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Reason::Success => "success",
            Reason::GeneralNetwork => "general network error",
            Reason::NoSuchPort => "no such port",
            Reason::CorruptedPacket => "corrupted packet",
            Reason::ResourceUnavailable => "resource unavailable",
            Reason::ChannelLost => "channel lost",
            Reason::ShuttingDown => "shutting down",
        };
        f.write_str(text)
    }
}

/// 收包配置解析或校验失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML 文本无法解析为配置结构。
    #[error("failed to parse receiver config: {0}")]
    Parse(#[from] toml::de::Error),

    /// 字段取值越界。
    #[error("invalid receiver config field `{field}`: {detail}")]
    Invalid {
        field: &'static str,
        detail: String,
    },
}

/// 通道注册表操作失败。
///
/// - **意图 (Why)**：阻止同一对端地址被重复注册，避免旧通道的统计与过滤器被静默覆盖；
/// - **契约 (What)**：`addr` 为冲突的对端地址，调用方可据此决定替换或丢弃新通道。
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RegistryError {
    #[error("a channel is already registered for `{addr}`")]
    AlreadyRegistered { addr: SocketAddr },
}
