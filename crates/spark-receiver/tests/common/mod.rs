//! 集成测试共用的脚本化协作者。
//!
//! - `ScriptedEndpoint`：按预设脚本逐次返回读取结果，脚本耗尽后恒返回 `WouldBlock`；
//! - `RecordingReporter` / `RecordingSink`：记录收到的故障与报文，供断言使用。

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use parking_lot::Mutex;
use spark_receiver::{
    Channel, Endpoint, EndpointId, EndpointKind, FaultReporter, PacketPtr, PacketSink, Reason,
    Received, TransportFailure,
};

/// 脚本中的一步读取。
#[derive(Clone, Debug)]
pub enum Step {
    Data(Vec<u8>),
    DataFrom(Vec<u8>, SocketAddr),
    Empty,
    Fail(TransportFailure),
}

#[derive(Debug)]
pub struct ScriptedEndpoint {
    id: EndpointId,
    kind: EndpointKind,
    address: SocketAddr,
    closed_peer: Option<SocketAddr>,
    script: Mutex<VecDeque<Step>>,
    reads: AtomicUsize,
}

impl ScriptedEndpoint {
    pub fn stream(address: SocketAddr, script: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            id: EndpointId::next(),
            kind: EndpointKind::Stream,
            address,
            closed_peer: None,
            script: Mutex::new(script.into_iter().collect()),
            reads: AtomicUsize::new(0),
        })
    }

    pub fn datagram(address: SocketAddr, script: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            id: EndpointId::next(),
            kind: EndpointKind::Datagram,
            address,
            closed_peer: None,
            script: Mutex::new(script.into_iter().collect()),
            reads: AtomicUsize::new(0),
        })
    }

    pub fn with_closed_peer(
        address: SocketAddr,
        closed_peer: Option<SocketAddr>,
        script: impl IntoIterator<Item = Step>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: EndpointId::next(),
            kind: EndpointKind::Datagram,
            address,
            closed_peer,
            script: Mutex::new(script.into_iter().collect()),
            reads: AtomicUsize::new(0),
        })
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn push(&self, step: Step) {
        self.script.lock().push_back(step);
    }
}

impl Endpoint for ScriptedEndpoint {
    fn id(&self) -> EndpointId {
        self.id
    }

    fn kind(&self) -> EndpointKind {
        self.kind
    }

    fn address(&self) -> SocketAddr {
        self.address
    }

    fn receive(&self, buf: &mut [u8]) -> Result<Received, TransportFailure> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().pop_front();
        match step {
            None => Err(TransportFailure::WouldBlock),
            Some(Step::Empty) => Ok(Received::new(0)),
            Some(Step::Fail(failure)) => Err(failure),
            Some(Step::Data(bytes)) => {
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok(Received::new(len))
            }
            Some(Step::DataFrom(bytes, source)) => {
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok(Received::from_source(len, source))
            }
        }
    }

    fn resolve_closed_peer(&self) -> Option<SocketAddr> {
        self.closed_peer
    }
}

#[derive(Debug, Default)]
pub struct RecordingReporter {
    faults: Mutex<Vec<(Reason, Option<SocketAddr>)>>,
}

impl RecordingReporter {
    pub fn faults(&self) -> Vec<(Reason, Option<SocketAddr>)> {
        self.faults.lock().clone()
    }
}

impl FaultReporter for RecordingReporter {
    fn report(&self, reason: Reason, addr: Option<SocketAddr>) {
        self.faults.lock().push((reason, addr));
    }
}

/// 记录默认交接点收到的报文及其所属通道地址。
#[derive(Debug, Default)]
pub struct RecordingSink {
    packets: Mutex<Vec<(Option<SocketAddr>, PacketPtr)>>,
    verdict: Mutex<Option<Reason>>,
}

impl RecordingSink {
    pub fn failing_with(reason: Reason) -> Self {
        Self {
            packets: Mutex::new(Vec::new()),
            verdict: Mutex::new(Some(reason)),
        }
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.packets
            .lock()
            .iter()
            .map(|(_, packet)| packet.data().to_vec())
            .collect()
    }

    pub fn channels(&self) -> Vec<Option<SocketAddr>> {
        self.packets.lock().iter().map(|(addr, _)| *addr).collect()
    }

    pub fn packets(&self) -> Vec<PacketPtr> {
        self.packets
            .lock()
            .iter()
            .map(|(_, packet)| Arc::clone(packet))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.packets.lock().len()
    }
}

impl PacketSink for RecordingSink {
    fn process_filtered_packet(&self, channel: Option<&Channel>, packet: PacketPtr) -> Reason {
        self.packets
            .lock()
            .push((channel.map(Channel::address), packet));
        self.verdict.lock().unwrap_or(Reason::Success)
    }
}

pub fn peer(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}
