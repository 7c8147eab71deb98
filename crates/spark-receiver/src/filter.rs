//! 通道过滤器与默认交接点。
//!
//! ## 设计动机（Why）
//! - 解密、重组、解压等变换按通道挂载，接收器只负责“查到过滤器就交给它”，
//!   新增过滤器种类不会触及排空循环；
//! - [`PacketSink`] 是默认交接点：没有通道或通道未挂载过滤器的报文直接到达这里，
//!   过滤器处理完毕后也通过它把结果交给上层。
//!
//! ## 契约（What）
//! - [`PacketFilter::recv`] 的返回值对该报文具有最终效力；
//! - 过滤器可以缓存、拆分、合并报文，或通过克隆 [`PacketPtr`] 延长其生命周期；
//! - 过滤器状态按通道独立，同一实例不应被挂载到多个通道。

use std::{fmt, sync::Arc};

use bytes::{Buf, BytesMut};
use parking_lot::Mutex;

use crate::{
    channel::Channel,
    error::Reason,
    packet::{Packet, PacketPtr},
};

/// 报文最终交接点。
pub trait PacketSink: Send + Sync {
    /// 接收一个已通过过滤（或无需过滤）的报文。
    ///
    /// `channel` 为报文所属通道，未找到通道时为 `None`。
    fn process_filtered_packet(&self, channel: Option<&Channel>, packet: PacketPtr) -> Reason;
}

/// 基础设计中的默认交接点：丢弃报文并返回成功。
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardSink;

impl PacketSink for DiscardSink {
    fn process_filtered_packet(&self, _channel: Option<&Channel>, _packet: PacketPtr) -> Reason {
        Reason::Success
    }
}

/// 按通道挂载的报文变换。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 以统一的能力接口承载直通、重组、解密等多态实现，分发器只做一次虚调用。
///
/// ## 契约 (What)
/// - `sink`：过滤完成后的交接点，过滤器自行决定调用零次、一次或多次；
/// - `channel`：报文所属通道；
/// - 返回值：该报文的最终处理结果，非成功值在详细模式下由接收器上报。
///
/// ## 注意事项 (Trade-offs)
/// - 过滤器在事件循环线程上同步执行，必须无阻塞；耗时的解密应交由外部线程池。
pub trait PacketFilter: Send + Sync {
    /// 过滤器名称，用于日志与调试输出。
    fn name(&self) -> &'static str {
        "custom"
    }

    fn recv(&self, sink: &dyn PacketSink, channel: &Channel, packet: PacketPtr) -> Reason;
}

/// 原样转交的过滤器。
#[derive(Clone, Copy, Debug, Default)]
pub struct PassThroughFilter;

impl PacketFilter for PassThroughFilter {
    fn name(&self) -> &'static str {
        "pass-through"
    }

    fn recv(&self, sink: &dyn PacketSink, channel: &Channel, packet: PacketPtr) -> Reason {
        sink.process_filtered_packet(Some(channel), packet)
    }
}

/// 串联多个过滤器：每一级的输出作为下一级的输入，最后一级交给默认交接点。
#[derive(Clone, Default)]
pub struct FilterChain {
    stages: Vec<Arc<dyn PacketFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一级过滤器。
    pub fn push(mut self, filter: Arc<dyn PacketFilter>) -> Self {
        self.stages.push(filter);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    fn run_from(
        &self,
        stage: usize,
        sink: &dyn PacketSink,
        channel: &Channel,
        packet: PacketPtr,
    ) -> Reason {
        match self.stages.get(stage) {
            Some(filter) => {
                let next = ChainSink {
                    chain: self,
                    next: stage + 1,
                    channel,
                    sink,
                };
                filter.recv(&next, channel, packet)
            }
            None => sink.process_filtered_packet(Some(channel), packet),
        }
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|stage| stage.name()))
            .finish()
    }
}

impl PacketFilter for FilterChain {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn recv(&self, sink: &dyn PacketSink, channel: &Channel, packet: PacketPtr) -> Reason {
        self.run_from(0, sink, channel, packet)
    }
}

// 链内某一级的下游视图。
struct ChainSink<'a> {
    chain: &'a FilterChain,
    next: usize,
    channel: &'a Channel,
    sink: &'a dyn PacketSink,
}

impl PacketSink for ChainSink<'_> {
    fn process_filtered_packet(&self, _channel: Option<&Channel>, packet: PacketPtr) -> Reason {
        self.chain.run_from(self.next, self.sink, self.channel, packet)
    }
}

/// 长度前缀宽度，前缀均为网络字节序。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PrefixWidth {
    U16,
    U32,
}

impl PrefixWidth {
    fn header_len(self) -> usize {
        match self {
            PrefixWidth::U16 => 2,
            PrefixWidth::U32 => 4,
        }
    }

    fn peek(self, buf: &[u8]) -> usize {
        match self {
            PrefixWidth::U16 => u16::from_be_bytes([buf[0], buf[1]]) as usize,
            PrefixWidth::U32 => u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize,
        }
    }
}

/// 流式重组过滤器：把任意切分的字节流还原为长度前缀帧。
///
/// # 教案式注释
/// - **意图 (Why)**：流式端点的一次读取可能包含半帧或多帧，上层需要以完整帧为单位处理；
/// - **契约 (What)**：
///   - 每凑齐一帧即以新的 [`Packet`] 交给下游，来源地址沿用原报文；
///   - 前缀声明的长度超过 `max_frame` 时清空缓存并返回 [`Reason::CorruptedPacket`]；
///   - 下游返回非成功值时立即停止，并把剩余完整帧留在缓存中等待下一次调用；
/// - **执行 (How)**：先在锁内切出全部完整帧，释放锁后再逐帧交付，避免下游重入时死锁。
#[derive(Debug)]
pub struct LengthPrefixedReassembler {
    width: PrefixWidth,
    max_frame: usize,
    pending: Mutex<BytesMut>,
}

impl LengthPrefixedReassembler {
    pub fn new(width: PrefixWidth, max_frame: usize) -> Self {
        Self {
            width,
            max_frame,
            pending: Mutex::new(BytesMut::new()),
        }
    }

    /// 当前缓存中尚未凑成完整帧的字节数。
    pub fn buffered(&self) -> usize {
        self.pending.lock().len()
    }

    fn split_frames(&self, data: &[u8]) -> Result<Vec<BytesMut>, Reason> {
        let header = self.width.header_len();
        let mut pending = self.pending.lock();
        pending.extend_from_slice(data);

        let mut frames = Vec::new();
        while pending.len() >= header {
            let body = self.width.peek(&pending[..header]);
            if body > self.max_frame {
                pending.clear();
                return Err(Reason::CorruptedPacket);
            }
            if pending.len() < header + body {
                break;
            }
            pending.advance(header);
            frames.push(pending.split_to(body));
        }
        Ok(frames)
    }

    fn requeue(&self, frames: impl Iterator<Item = BytesMut>) {
        let mut restored = BytesMut::new();
        for frame in frames {
            match self.width {
                PrefixWidth::U16 => {
                    restored.extend_from_slice(&(frame.len() as u16).to_be_bytes())
                }
                PrefixWidth::U32 => {
                    restored.extend_from_slice(&(frame.len() as u32).to_be_bytes())
                }
            }
            restored.extend_from_slice(&frame);
        }
        let mut pending = self.pending.lock();
        restored.extend_from_slice(&pending);
        *pending = restored;
    }
}

impl PacketFilter for LengthPrefixedReassembler {
    fn name(&self) -> &'static str {
        "length-prefixed-reassembler"
    }

    fn recv(&self, sink: &dyn PacketSink, channel: &Channel, packet: PacketPtr) -> Reason {
        let frames = match self.split_frames(packet.data()) {
            Ok(frames) => frames,
            Err(reason) => return reason,
        };

        let mut frames = frames.into_iter();
        while let Some(frame) = frames.next() {
            let mut framed = Packet::from_bytes(frame);
            if let Some(source) = packet.source() {
                framed = framed.with_source(source);
            }
            let reason = sink.process_filtered_packet(Some(channel), Arc::new(framed));
            if !reason.is_success() {
                self.requeue(frames);
                return reason;
            }
        }
        Reason::Success
    }
}
