//! 报文缓冲：一次接收调用产出的字节。

use std::{net::SocketAddr, sync::Arc, time::Instant};

use bytes::{Bytes, BytesMut};

use crate::endpoint::{Endpoint, Received, TransportFailure};

/// 报文交接后的共享句柄。
///
/// 接收器交出报文后立刻分配下一块缓冲，下游（过滤器、通道）可克隆句柄延长报文生命周期，
/// 最后一个持有者释放时缓冲随之回收。
pub type PacketPtr = Arc<Packet>;

/// 一次接收调用的字节缓冲，附带写游标与来源地址。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 接收器始终持有一块“待命”缓冲，读取成功后整体交出，不在交接后再写入；
///   交出后只能经由 [`PacketPtr`] 共享只读访问，借用规则天然保证“交接后不再复用”。
///
/// ## 契约 (What)
/// - `capacity`：单次读取可写入的最大字节数，超出部分由端点截断；
/// - `data`：`[0, 写游标)` 区间的有效字节；
/// - `source`：数据报端点报告的来源地址。
#[derive(Debug)]
pub struct Packet {
    buf: BytesMut,
    wpos: usize,
    source: Option<SocketAddr>,
    received_at: Option<Instant>,
}

impl Packet {
    /// 预分配一块可容纳 `capacity` 字节的空缓冲。
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::zeroed(capacity),
            wpos: 0,
            source: None,
            received_at: None,
        }
    }

    /// 以现有字节构造一个已填满的报文，供过滤器产出新报文使用。
    pub fn from_bytes(data: impl Into<BytesMut>) -> Self {
        let buf = data.into();
        let wpos = buf.len();
        Self {
            buf,
            wpos,
            source: None,
            received_at: Some(Instant::now()),
        }
    }

    /// 从端点执行一次非阻塞读取，写游标移动到读取长度处。
    pub fn recv_from_endpoint(
        &mut self,
        endpoint: &dyn Endpoint,
    ) -> Result<Received, TransportFailure> {
        let received = endpoint.receive(&mut self.buf[..])?;
        self.wpos = received.len.min(self.buf.len());
        self.source = received.source;
        self.received_at = Some(Instant::now());
        Ok(received)
    }

    /// 为报文附加来源地址。
    pub fn with_source(mut self, source: SocketAddr) -> Self {
        self.source = Some(source);
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[..self.wpos]
    }

    pub fn len(&self) -> usize {
        self.wpos
    }

    pub fn is_empty(&self) -> bool {
        self.wpos == 0
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn source(&self) -> Option<SocketAddr> {
        self.source
    }

    pub fn received_at(&self) -> Option<Instant> {
        self.received_at
    }

    /// 拷贝有效字节为独立的 [`Bytes`]。
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.data())
    }
}
