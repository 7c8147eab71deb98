//! 读取失败分类器。
//!
//! ## 设计动机（Why）
//! - 非阻塞读取的“失败”大多数并非真正的错误：`WouldBlock` 只说明缓冲已排空；
//!   分类器把零字节读取与各类失败收敛为三种可执行结论，驱动上报与对端存活信号。
//!
//! ## 契约（What）
//! - 零字节读取恒为 [`ErrorOutcome::FatalGeneral`]，与传输类型和 `expecting_more` 无关；
//! - `WouldBlock` 仅在 `expecting_more == true` 时为 [`ErrorOutcome::RetryLater`]；
//!   本次通知的首次读取即阻塞，同样视为 Fatal-General，避免含糊的空通知被静默吞掉；
//! - 拒绝/不可达失败解析对端地址，成功为 [`ErrorOutcome::PeerUnreachable`]，否则降级为 Fatal-General；
//! - 其余失败一律 Fatal-General。

use std::net::SocketAddr;

use tracing::warn;

use crate::{
    endpoint::{Endpoint, TransportFailure},
    error::Reason,
};

/// 一次非生产性读取的原始形态。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReadOutcome {
    /// 读取返回 0 字节。
    Empty,
    /// 读取返回失败。
    Failed(TransportFailure),
}

/// 分类结论。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOutcome {
    /// 非阻塞读取的预期结果，不上报，结束本次排空。
    RetryLater,
    /// 对端拒绝或不可达，携带解析出的对端地址。
    PeerUnreachable { offender: SocketAddr },
    /// 对本次读取或连接尝试致命的通用故障。
    FatalGeneral,
}

impl ErrorOutcome {
    /// 需要上报时返回对应的结果码与地址；`RetryLater` 返回 `None`。
    pub fn fault(self) -> Option<(Reason, Option<SocketAddr>)> {
        match self {
            ErrorOutcome::RetryLater => None,
            ErrorOutcome::PeerUnreachable { offender } => {
                Some((Reason::NoSuchPort, Some(offender)))
            }
            ErrorOutcome::FatalGeneral => Some((Reason::GeneralNetwork, None)),
        }
    }
}

/// 对一次非生产性读取进行分类。
///
/// `endpoint` 仅在需要解析对端地址时使用。
pub fn classify(
    outcome: &ReadOutcome,
    expecting_more: bool,
    endpoint: &dyn Endpoint,
) -> ErrorOutcome {
    let failure = match outcome {
        ReadOutcome::Empty => {
            warn!(endpoint = %endpoint.id(), "zero-byte read, treating as general network error");
            return ErrorOutcome::FatalGeneral;
        }
        ReadOutcome::Failed(failure) => failure,
    };

    match failure {
        TransportFailure::WouldBlock if expecting_more => ErrorOutcome::RetryLater,
        failure if failure.is_peer_unreachable() => match endpoint.resolve_closed_peer() {
            Some(offender) => ErrorOutcome::PeerUnreachable { offender },
            None => {
                warn!(
                    endpoint = %endpoint.id(),
                    %failure,
                    "could not resolve closed peer, treating as general network error"
                );
                ErrorOutcome::FatalGeneral
            }
        },
        failure => {
            warn!(
                endpoint = %endpoint.id(),
                %failure,
                expecting_more,
                "read failed, treating as general network error"
            );
            ErrorOutcome::FatalGeneral
        }
    }
}
