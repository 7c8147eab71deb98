//! # PacketReceiver：就绪通知到报文分发
//!
//! ## 核心意图（Why）
//! - 事件循环每次投递一个就绪通知；接收器把它翻译为“接受一个连接”或“排空一个端点”，
//!   并在排空过程中把每个报文路由到所属通道及其过滤器；
//! - 接收器永远正常返回：分类后的故障交给上报器，不影响同一循环上的其他端点。
//!
//! ## 行为契约（What）
//! - 监听端点就绪：恰好尝试一次 `accept`，成功则注册内部通道，失败上报通用网络故障；
//! - 对端端点就绪：循环读取直到首次非生产性读取，首次读取 `expecting_more = false`，之后为 `true`；
//! - 每次成功读取后立即换入新的待命缓冲，已交出的报文不再被写入；
//! - 配置了单次通知上限时，达到上限即结束，不再发起额外读取。
//!
//! ## 风险提示（Trade-offs）
//! - 未设上限时排空次数只受“读到无数据为止”约束，活跃对端可能延迟同一循环上的其他端点。

use std::{mem, net::SocketAddr, sync::Arc};

use tracing::{debug, info, trace, warn};

use crate::{
    channel::{Channel, ChannelKind},
    classify::{ReadOutcome, classify},
    config::ReceiverConfig,
    endpoint::{Endpoint, EndpointId, EndpointKind},
    error::Reason,
    filter::{DiscardSink, PacketSink},
    packet::{Packet, PacketPtr},
    registry::ChannelRegistry,
    report::FaultReporter,
};

/// 事件循环与接收器之间的接缝。
///
/// 事件循环以端点身份投递就绪通知，实现方必须同步、无阻塞地处理完毕后返回。
pub trait InputNotificationHandler {
    fn handle_input_notification(&mut self, ready: EndpointId);
}

/// 接收器累计统计。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReceiverStats {
    /// 处理过的就绪通知数。
    pub notifications: u64,
    /// 发起的读取次数，包含非生产性读取。
    pub read_attempts: u64,
    /// 交给分发器的报文数。
    pub packets_dispatched: u64,
    /// 成功读取的字节总数。
    pub bytes_received: u64,
    /// 接受并注册的连接数。
    pub connections_accepted: u64,
    /// 交给上报器的故障数。
    pub faults_reported: u64,
    /// 因达到单次通知上限而提前结束的排空次数。
    pub capped_drains: u64,
    /// 填满待命缓冲的数据报数，这些数据报可能已被内核截断。
    pub truncated_datagrams: u64,
}

/// 单个端点的收包器。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 把“读取—分类—分发—上报”收敛在一个只在事件循环线程上被 `&mut` 驱动的对象中，
///   内部无需任何锁；
///
/// ## 契约 (What)
/// - `endpoint`：被观察的端点，生命周期由外部管理；
/// - `registry`：按地址注册/查找通道；
/// - `reporter`：分类后的故障与详细模式下的交接失败都交给它；
/// - `sink`：默认交接点，缺省为 [`DiscardSink`]；
/// - 任意时刻恰有一块待命缓冲。
///
/// ## 注意事项 (Trade-offs)
/// - 多个接收器分布在不同线程时必须绑定互不相交的端点；共享注册表本身是并发安全的。
pub struct PacketReceiver {
    endpoint: Arc<dyn Endpoint>,
    registry: Arc<dyn ChannelRegistry>,
    reporter: Arc<dyn FaultReporter>,
    sink: Arc<dyn PacketSink>,
    config: ReceiverConfig,
    next_packet: Packet,
    stats: ReceiverStats,
}

impl PacketReceiver {
    /// 以缺省配置与丢弃型交接点构造接收器。
    pub fn new(
        endpoint: Arc<dyn Endpoint>,
        registry: Arc<dyn ChannelRegistry>,
        reporter: Arc<dyn FaultReporter>,
    ) -> Self {
        let config = ReceiverConfig::default();
        Self {
            endpoint,
            registry,
            reporter,
            sink: Arc::new(DiscardSink),
            next_packet: Packet::with_capacity(config.packet_capacity()),
            config,
            stats: ReceiverStats::default(),
        }
    }

    /// 替换配置；待命缓冲按新容量重新分配。
    pub fn with_config(mut self, config: ReceiverConfig) -> Self {
        self.next_packet = Packet::with_capacity(config.packet_capacity());
        self.config = config;
        self
    }

    /// 替换默认交接点，上层借此观察未路由或未过滤的报文。
    pub fn with_sink(mut self, sink: Arc<dyn PacketSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn endpoint(&self) -> &Arc<dyn Endpoint> {
        &self.endpoint
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    /// 处理自身端点的就绪通知。
    pub fn handle_input(&mut self) {
        let id = self.endpoint.id();
        self.handle_input_notification(id);
    }

    /// 分发一个完整接收的报文，返回过滤器或默认交接点给出的结果。
    ///
    /// 查找键为报文来源地址（数据报端点），否则为端点地址；找不到通道时不更新任何统计，
    /// 直接交给默认交接点。
    pub fn process_packet(&self, packet: PacketPtr) -> Reason {
        let key = packet.source().unwrap_or_else(|| self.endpoint.address());
        let Some(channel) = self.registry.find_channel(&key) else {
            return self.sink.process_filtered_packet(None, packet);
        };

        channel.on_packet_received(packet.len());
        match channel.filter() {
            Some(filter) => filter.recv(&*self.sink, &channel, packet),
            None => self.sink.process_filtered_packet(Some(&channel), packet),
        }
    }

    fn accept_connection(&mut self) {
        let listener = self.endpoint.id();
        let accepted = match self.endpoint.accept() {
            Ok(accepted) => accepted,
            Err(failure) => {
                warn!(endpoint = %listener, %failure, "accept failed");
                self.report(Reason::GeneralNetwork, None);
                return;
            }
        };

        let channel = Arc::new(Channel::from_endpoint(accepted, ChannelKind::Internal));
        let peer = channel.address();
        match self.registry.register_channel(channel) {
            Ok(()) => {
                self.stats.connections_accepted += 1;
                info!(endpoint = %listener, %peer, "registered channel for accepted connection");
            }
            Err(err) => {
                warn!(endpoint = %listener, %peer, %err, "could not register accepted connection");
                self.report(Reason::GeneralNetwork, Some(peer));
            }
        }
    }

    fn drain(&mut self) {
        let cap = self.config.max_packets_per_notification();
        let mut dispatched = 0usize;
        let mut expecting_more = false;
        loop {
            if let Some(cap) = cap
                && dispatched >= cap.get()
            {
                self.stats.capped_drains += 1;
                debug!(
                    endpoint = %self.endpoint.id(),
                    cap = cap.get(),
                    "drain stopped at per-notification cap"
                );
                break;
            }
            if !self.process_socket(expecting_more) {
                break;
            }
            dispatched += 1;
            expecting_more = true;
        }
    }

    /// 执行一次读取；返回 `true` 表示读到了数据并已分发。
    fn process_socket(&mut self, expecting_more: bool) -> bool {
        self.stats.read_attempts += 1;
        let received = match self.next_packet.recv_from_endpoint(&*self.endpoint) {
            Ok(received) if received.len > 0 => received,
            Ok(_) => {
                self.check_socket_errors(ReadOutcome::Empty, expecting_more);
                return false;
            }
            Err(failure) => {
                self.check_socket_errors(ReadOutcome::Failed(failure), expecting_more);
                return false;
            }
        };

        trace!(endpoint = %self.endpoint.id(), len = received.len, "read packet");
        let capacity = self.next_packet.capacity();
        if self.endpoint.kind() == EndpointKind::Datagram && received.len >= capacity {
            self.stats.truncated_datagrams += 1;
            debug!(
                endpoint = %self.endpoint.id(),
                source = ?received.source,
                capacity,
                "datagram filled the receive buffer and may be truncated"
            );
        }
        let fresh = Packet::with_capacity(self.config.packet_capacity());
        let packet: PacketPtr = Arc::new(mem::replace(&mut self.next_packet, fresh));
        self.stats.packets_dispatched += 1;
        self.stats.bytes_received += packet.len() as u64;

        let reason = self.process_packet(packet);
        if !reason.is_success() {
            if self.config.verbose() {
                let addr = self.endpoint.address();
                self.report(reason, Some(addr));
            } else {
                debug!(
                    endpoint = %self.endpoint.id(),
                    code = reason.code(),
                    "dropped packet handoff failure"
                );
            }
        }
        true
    }

    fn check_socket_errors(&mut self, outcome: ReadOutcome, expecting_more: bool) {
        let verdict = classify(&outcome, expecting_more, &*self.endpoint);
        if let Some((reason, addr)) = verdict.fault() {
            self.report(reason, addr);
        }
    }

    fn report(&mut self, reason: Reason, addr: Option<SocketAddr>) {
        self.stats.faults_reported += 1;
        self.reporter.report(reason, addr);
    }
}

impl InputNotificationHandler for PacketReceiver {
    fn handle_input_notification(&mut self, ready: EndpointId) {
        self.stats.notifications += 1;
        let own = self.endpoint.id();
        if self.endpoint.kind() == EndpointKind::Listening && ready == own {
            self.accept_connection();
            return;
        }
        if ready != own {
            debug!(
                endpoint = %own,
                %ready,
                "notification for foreign endpoint, draining own endpoint"
            );
        }
        self.drain();
    }
}

impl std::fmt::Debug for PacketReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketReceiver")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
