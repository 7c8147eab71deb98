//! 通道查找、统计与过滤器分发。
//!
//! # 教案式说明
//! - **Why**：分发器是过滤器链的唯一入口；统计被错误更新或过滤器被绕过，
//!   都会让解密/重组层悄无声息地失效。
//! - **What**：无通道时走默认交接点且不改动统计；有过滤器时过滤器结果具有最终效力；
//!   交接失败仅在详细模式下带端点地址上报。

mod common;

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use common::{RecordingReporter, RecordingSink, ScriptedEndpoint, Step, peer};
use spark_receiver::{
    Channel, ChannelKind, ChannelMap, ChannelRegistry, ChannelStats, FilterChain,
    LengthPrefixedReassembler, PacketFilter, PacketPtr, PacketReceiver, PacketSink,
    PassThroughFilter, PrefixWidth, Reason, ReceiverConfig,
};

/// 吞掉报文并返回固定结果的过滤器，同时保留报文引用。
#[derive(Default)]
struct Swallow {
    seen: AtomicUsize,
    retained: parking_lot::Mutex<Vec<PacketPtr>>,
    verdict: Option<Reason>,
}

impl PacketFilter for Swallow {
    fn name(&self) -> &'static str {
        "swallow"
    }

    fn recv(&self, _sink: &dyn PacketSink, _channel: &Channel, packet: PacketPtr) -> Reason {
        self.seen.fetch_add(1, Ordering::SeqCst);
        self.retained.lock().push(packet);
        self.verdict.unwrap_or(Reason::Success)
    }
}

struct Setup {
    registry: Arc<ChannelMap>,
    reporter: Arc<RecordingReporter>,
    sink: Arc<RecordingSink>,
    receiver: PacketReceiver,
}

fn setup(endpoint: Arc<ScriptedEndpoint>, sink: RecordingSink, verbose: bool) -> Setup {
    let registry = Arc::new(ChannelMap::new());
    let reporter = Arc::new(RecordingReporter::default());
    let sink = Arc::new(sink);
    let receiver = PacketReceiver::new(endpoint, registry.clone(), reporter.clone())
        .with_config(ReceiverConfig::default().with_verbose(verbose))
        .with_sink(sink.clone());
    Setup {
        registry,
        reporter,
        sink,
        receiver,
    }
}

/// 无通道：报文到达默认交接点，注册表中其他通道的统计保持不变。
#[test]
fn unrouted_packet_reaches_default_handoff_without_accounting() {
    let other = Arc::new(Channel::new(peer(21999), ChannelKind::External));
    let endpoint = ScriptedEndpoint::stream(peer(21001), [Step::Data(b"lost".to_vec())]);
    let mut s = setup(endpoint, RecordingSink::default(), false);
    s.registry.register_channel(other.clone()).expect("注册");

    s.receiver.handle_input();

    assert_eq!(s.sink.payloads(), vec![b"lost".to_vec()]);
    assert_eq!(s.sink.channels(), vec![None]);
    assert_eq!(other.stats(), ChannelStats::default());
}

/// 有通道无过滤器：更新统计并以通道身份交给默认交接点。
#[test]
fn unfiltered_channel_updates_accounting() {
    let addr = peer(21002);
    let endpoint = ScriptedEndpoint::stream(
        addr,
        [Step::Data(vec![1, 2, 3]), Step::Data(vec![4, 5])],
    );
    let mut s = setup(endpoint, RecordingSink::default(), false);
    let channel = Arc::new(Channel::new(addr, ChannelKind::Internal));
    s.registry.register_channel(channel.clone()).expect("注册");

    s.receiver.handle_input();

    assert_eq!(s.sink.channels(), vec![Some(addr), Some(addr)]);
    assert_eq!(
        channel.stats(),
        ChannelStats {
            packets_received: 2,
            bytes_received: 5,
        }
    );
}

/// 有过滤器：报文不直接到达默认交接点，过滤器可以保留报文引用。
#[test]
fn filtered_channel_bypasses_default_handoff() {
    let addr = peer(21003);
    let endpoint = ScriptedEndpoint::stream(addr, [Step::Data(b"secret".to_vec())]);
    let mut s = setup(endpoint, RecordingSink::default(), true);
    let filter = Arc::new(Swallow::default());
    let channel = Arc::new(Channel::new(addr, ChannelKind::External).with_filter(filter.clone()));
    s.registry.register_channel(channel.clone()).expect("注册");

    s.receiver.handle_input();

    assert_eq!(filter.seen.load(Ordering::SeqCst), 1);
    assert_eq!(s.sink.len(), 0);
    assert_eq!(channel.stats().packets_received, 1);
    assert_eq!(filter.retained.lock()[0].data(), b"secret");
    assert!(s.reporter.faults().is_empty());
}

/// 过滤器失败在详细模式下带端点地址上报。
#[test]
fn filter_failure_is_reported_in_verbose_mode() {
    let addr = peer(21004);
    let endpoint = ScriptedEndpoint::stream(addr, [Step::Data(vec![0xff])]);
    let mut s = setup(endpoint, RecordingSink::default(), true);
    let filter = Arc::new(Swallow {
        verdict: Some(Reason::CorruptedPacket),
        ..Swallow::default()
    });
    s.registry
        .register_channel(Arc::new(
            Channel::new(addr, ChannelKind::External).with_filter(filter),
        ))
        .expect("注册");

    s.receiver.handle_input();

    assert_eq!(s.reporter.faults(), vec![(Reason::CorruptedPacket, Some(addr))]);
    assert_eq!(s.receiver.stats().packets_dispatched, 1);
}

/// 非详细模式下交接失败被静默丢弃，排空继续。
#[test]
fn handoff_failure_is_silent_when_not_verbose() {
    let endpoint = ScriptedEndpoint::stream(
        peer(21005),
        [Step::Data(vec![1]), Step::Data(vec![2])],
    );
    let mut s = setup(
        endpoint,
        RecordingSink::failing_with(Reason::ResourceUnavailable),
        false,
    );

    s.receiver.handle_input();

    assert_eq!(s.sink.len(), 2);
    assert!(s.reporter.faults().is_empty());
}

/// 默认交接点失败在详细模式下同样上报。
#[test]
fn default_handoff_failure_is_reported_when_verbose() {
    let addr = peer(21006);
    let endpoint = ScriptedEndpoint::stream(addr, [Step::Data(vec![1])]);
    let mut s = setup(endpoint, RecordingSink::failing_with(Reason::ChannelLost), true);

    s.receiver.handle_input();

    assert_eq!(s.reporter.faults(), vec![(Reason::ChannelLost, Some(addr))]);
}

/// 数据报端点按每个报文的来源地址查找通道。
#[test]
fn datagram_lookup_uses_packet_source() {
    let local = peer(21007);
    let client_a = peer(21100);
    let client_b = peer(21101);
    let endpoint = ScriptedEndpoint::datagram(
        local,
        [
            Step::DataFrom(b"a1".to_vec(), client_a),
            Step::DataFrom(b"b1".to_vec(), client_b),
            Step::DataFrom(b"a2".to_vec(), client_a),
        ],
    );
    let mut s = setup(endpoint, RecordingSink::default(), false);
    let channel_a = Arc::new(Channel::new(client_a, ChannelKind::External));
    s.registry.register_channel(channel_a.clone()).expect("注册");

    s.receiver.handle_input();

    assert_eq!(s.sink.channels(), vec![Some(client_a), None, Some(client_a)]);
    assert_eq!(channel_a.stats().packets_received, 2);
    assert_eq!(s.sink.packets()[1].source(), Some(client_b));
}

/// 过滤器链：重组后的帧经直通过滤器到达默认交接点。
#[test]
fn reassembling_chain_delivers_frames() {
    let addr = peer(21008);
    let endpoint = ScriptedEndpoint::stream(
        addr,
        [
            Step::Data(vec![0, 3, b'f', b'o']),
            Step::Data(vec![b'o', 0, 3, b'b', b'a', b'r']),
        ],
    );
    let mut s = setup(endpoint, RecordingSink::default(), true);
    let chain = FilterChain::new()
        .push(Arc::new(LengthPrefixedReassembler::new(PrefixWidth::U16, 1024)))
        .push(Arc::new(PassThroughFilter));
    s.registry
        .register_channel(Arc::new(
            Channel::new(addr, ChannelKind::External).with_filter(Arc::new(chain)),
        ))
        .expect("注册");

    s.receiver.handle_input();

    assert_eq!(s.sink.payloads(), vec![b"foo".to_vec(), b"bar".to_vec()]);
    assert_eq!(s.sink.channels(), vec![Some(addr), Some(addr)]);
    assert!(s.reporter.faults().is_empty());
}
