//! 故障上报。
//!
//! ## 设计动机（Why）
//! - 接收器从不把分类后的故障作为控制流错误向上抛出：单个异常对端不能阻断事件循环上其他端点的处理，
//!   因此故障统一交给“即发即忘”的上报器；
//! - 上报器可以记录日志、驱动对端存活判断，或像 [`ThrottledFaultReporter`] 一样聚合重复故障。

use std::{
    collections::HashMap,
    net::SocketAddr,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::warn;

use crate::error::Reason;

/// 故障上报契约。
pub trait FaultReporter: Send + Sync {
    /// 上报一次故障；`addr` 为相关的对端或端点地址。
    fn report(&self, reason: Reason, addr: Option<SocketAddr>);
}

/// 把故障写为 `tracing` 告警事件。
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingFaultReporter;

impl FaultReporter for TracingFaultReporter {
    fn report(&self, reason: Reason, addr: Option<SocketAddr>) {
        match addr {
            Some(addr) => warn!(code = reason.code(), %addr, "transport fault: {reason}"),
            None => warn!(code = reason.code(), "transport fault: {reason}"),
        }
    }
}

#[derive(Debug)]
struct Window {
    opened_at: Instant,
    suppressed: u64,
}

/// 对重复故障做时间窗节流的上报器。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 一个持续拒绝连接的对端会在每次读取时产生同样的故障；逐条转发会淹没日志与告警。
///
/// ## 契约 (What)
/// - 以 `(reason, addr)` 为键；窗口内首次出现立即转发给内层上报器；
/// - 窗口内的重复只计数；每次上报前回收全部过期窗口并记录其被抑制的次数，
///   过期键的下一次出现随即转发并开启新窗口；
/// - [`ThrottledFaultReporter::flush`] 输出全部待汇总计数并清空窗口。
///
/// ## 注意事项 (Trade-offs)
/// - 存活窗口数以一个窗口期内出现过的不同 `(reason, addr)` 为上界，回收是线性扫描。
#[derive(Debug)]
pub struct ThrottledFaultReporter<R> {
    inner: R,
    window: Duration,
    windows: Mutex<HashMap<(Reason, Option<SocketAddr>), Window>>,
}

impl<R: FaultReporter> ThrottledFaultReporter<R> {
    pub fn new(inner: R, window: Duration) -> Self {
        Self {
            inner,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// 输出全部被抑制的计数，返回被抑制的故障总数。
    pub fn flush(&self) -> u64 {
        let drained: Vec<_> = self.windows.lock().drain().collect();
        let mut total = 0;
        for ((reason, addr), window) in drained {
            if window.suppressed > 0 {
                log_suppressed(reason, addr, window.suppressed);
                total += window.suppressed;
            }
        }
        total
    }

    fn admit(&self, reason: Reason, addr: Option<SocketAddr>, now: Instant) -> bool {
        let mut windows = self.windows.lock();
        windows.retain(|&(seen, at), window| {
            let expired = now.duration_since(window.opened_at) >= self.window;
            if expired && window.suppressed > 0 {
                log_suppressed(seen, at, window.suppressed);
            }
            !expired
        });
        match windows.get_mut(&(reason, addr)) {
            Some(window) => {
                window.suppressed += 1;
                false
            }
            None => {
                windows.insert(
                    (reason, addr),
                    Window {
                        opened_at: now,
                        suppressed: 0,
                    },
                );
                true
            }
        }
    }
}

impl<R: FaultReporter> FaultReporter for ThrottledFaultReporter<R> {
    fn report(&self, reason: Reason, addr: Option<SocketAddr>) {
        if self.admit(reason, addr, Instant::now()) {
            self.inner.report(reason, addr);
        }
    }
}

fn log_suppressed(reason: Reason, addr: Option<SocketAddr>, repeats: u64) {
    match addr {
        Some(addr) => {
            warn!(code = reason.code(), %addr, repeats, "suppressed repeated transport faults")
        }
        None => warn!(code = reason.code(), repeats, "suppressed repeated transport faults"),
    }
}
