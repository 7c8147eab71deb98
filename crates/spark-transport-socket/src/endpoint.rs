//! 基于标准库套接字的非阻塞端点。
//!
//! ## 设计动机（Why）
//! - 收包核心只认 [`Endpoint`] 契约；本模块把 TCP 监听、TCP 流与 UDP 套接字适配到该契约，
//!   供宿主事件循环直接注册。
//!
//! ## 契约（What）
//! - 所有套接字在构造时即切换为非阻塞模式，`receive` 永不挂起；
//! - 监听端点的 `accept` 返回已切换为非阻塞的流端点；
//! - `resolve_closed_peer` 在 Linux 上优先读取错误队列，其次退回到已连接的对端地址。
//!
//! ## 实现策略（How）
//! - 套接字经 `socket2` 创建与配置，随后转换为标准库类型，读路径只使用 `&self` 方法；
//! - I/O 错误通过 `From<io::Error>` 折叠为 [`TransportFailure`]。

use std::{
    fmt,
    io::{self, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream, UdpSocket},
    sync::Arc,
};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use spark_receiver::{Endpoint, EndpointId, EndpointKind, Received, TransportFailure};
use tracing::{debug, trace};

use crate::{SocketError, SocketOptions};

enum Inner {
    Listener(TcpListener),
    Stream {
        stream: TcpStream,
        peer: SocketAddr,
    },
    Datagram {
        socket: UdpSocket,
        peer: Option<SocketAddr>,
        recv_errors: bool,
    },
}

/// 非阻塞套接字端点。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 以一个类型覆盖三种角色，宿主只需持有 `Arc<SocketEndpoint>` 即可交给接收器。
///
/// ## 契约 (What)
/// - `address()`：流端点返回对端地址；监听端点与数据报端点返回本地地址；
/// - `local_addr()`：始终返回本地绑定地址；
/// - `send`：仅供连接型端点使用的便捷写入，监听端点返回 `Unsupported`。
pub struct SocketEndpoint {
    id: EndpointId,
    local: SocketAddr,
    inner: Inner,
}

impl SocketEndpoint {
    /// 绑定并监听 TCP 地址。
    pub fn listen_tcp(addr: SocketAddr, options: &SocketOptions) -> Result<Self, SocketError> {
        let socket = new_socket(addr, Type::STREAM, Protocol::TCP, options)?;
        socket
            .bind(&SockAddr::from(addr))
            .map_err(|source| SocketError::Bind { addr, source })?;
        socket
            .listen(options.backlog())
            .map_err(|source| SocketError::Bind { addr, source })?;
        let listener = TcpListener::from(socket);
        let local = local_of(listener.local_addr())?;
        debug!(%local, "tcp listener ready");
        Ok(Self {
            id: EndpointId::next(),
            local,
            inner: Inner::Listener(listener),
        })
    }

    /// 绑定未连接的 UDP 套接字。
    pub fn bind_udp(addr: SocketAddr, options: &SocketOptions) -> Result<Self, SocketError> {
        let socket = bind_datagram(addr, options)?;
        let local = local_of(socket.local_addr())?;
        debug!(%local, "udp endpoint bound");
        Ok(Self {
            id: EndpointId::next(),
            local,
            inner: Inner::Datagram {
                socket,
                peer: None,
                recv_errors: options.recv_errors(),
            },
        })
    }

    /// 绑定本地地址并将 UDP 套接字连接到固定对端。
    pub fn connect_udp(
        local: SocketAddr,
        remote: SocketAddr,
        options: &SocketOptions,
    ) -> Result<Self, SocketError> {
        let socket = bind_datagram(local, options)?;
        socket
            .connect(remote)
            .map_err(|source| SocketError::Connect {
                addr: remote,
                source,
            })?;
        let local = local_of(socket.local_addr())?;
        debug!(%local, %remote, "udp endpoint connected");
        Ok(Self {
            id: EndpointId::next(),
            local,
            inner: Inner::Datagram {
                socket,
                peer: Some(remote),
                recv_errors: options.recv_errors(),
            },
        })
    }

    /// 包装一条已建立的 TCP 连接，并切换为非阻塞模式。
    pub fn from_tcp_stream(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        let peer = stream.peer_addr()?;
        let local = stream.local_addr()?;
        Ok(Self {
            id: EndpointId::next(),
            local,
            inner: Inner::Stream { stream, peer },
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// 向连接的对端写入一段字节。
    pub fn send(&self, bytes: &[u8]) -> Result<usize, TransportFailure> {
        match &self.inner {
            Inner::Listener(_) => Err(TransportFailure::Unsupported),
            Inner::Stream { stream, .. } => Ok((&*stream).write(bytes)?),
            Inner::Datagram {
                socket,
                peer: Some(_),
                ..
            } => Ok(socket.send(bytes)?),
            Inner::Datagram { peer: None, .. } => Err(TransportFailure::Unsupported),
        }
    }

    /// 未连接的数据报端点向指定地址发送。
    pub fn send_to(&self, bytes: &[u8], target: SocketAddr) -> Result<usize, TransportFailure> {
        match &self.inner {
            Inner::Datagram { socket, .. } => Ok(socket.send_to(bytes, target)?),
            _ => Err(TransportFailure::Unsupported),
        }
    }
}

impl Endpoint for SocketEndpoint {
    fn id(&self) -> EndpointId {
        self.id
    }

    fn kind(&self) -> EndpointKind {
        match self.inner {
            Inner::Listener(_) => EndpointKind::Listening,
            Inner::Stream { .. } => EndpointKind::Stream,
            Inner::Datagram { .. } => EndpointKind::Datagram,
        }
    }

    fn address(&self) -> SocketAddr {
        match &self.inner {
            Inner::Stream { peer, .. } => *peer,
            Inner::Listener(_) | Inner::Datagram { .. } => self.local,
        }
    }

    fn accept(&self) -> Result<Arc<dyn Endpoint>, TransportFailure> {
        let Inner::Listener(listener) = &self.inner else {
            return Err(TransportFailure::Unsupported);
        };
        let (stream, peer) = listener.accept()?;
        trace!(listener = %self.local, %peer, "accepted tcp connection");
        let endpoint = SocketEndpoint::from_tcp_stream(stream)?;
        Ok(Arc::new(endpoint))
    }

    fn receive(&self, buf: &mut [u8]) -> Result<Received, TransportFailure> {
        match &self.inner {
            Inner::Listener(_) => Err(TransportFailure::Unsupported),
            Inner::Stream { stream, .. } => {
                let len = (&*stream).read(buf)?;
                Ok(Received::new(len))
            }
            Inner::Datagram {
                socket,
                peer: Some(peer),
                ..
            } => {
                let len = socket.recv(buf)?;
                Ok(Received::from_source(len, *peer))
            }
            Inner::Datagram {
                socket, peer: None, ..
            } => {
                let (len, source) = socket.recv_from(buf)?;
                Ok(Received::from_source(len, source))
            }
        }
    }

    fn resolve_closed_peer(&self) -> Option<SocketAddr> {
        match &self.inner {
            Inner::Listener(_) => None,
            Inner::Stream { peer, .. } => Some(*peer),
            Inner::Datagram {
                socket,
                peer,
                recv_errors,
            } => queued_offender(socket, *recv_errors).or(*peer),
        }
    }
}

impl fmt::Debug for SocketEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketEndpoint")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("local", &self.local)
            .field("address", &self.address())
            .finish()
    }
}

fn new_socket(
    addr: SocketAddr,
    ty: Type,
    protocol: Protocol,
    options: &SocketOptions,
) -> Result<Socket, SocketError> {
    let socket = Socket::new(Domain::for_address(addr), ty, Some(protocol))
        .map_err(|source| SocketError::Bind { addr, source })?;
    socket
        .set_nonblocking(true)
        .map_err(|source| SocketError::Configure {
            option: "O_NONBLOCK",
            source,
        })?;
    if options.reuse_address() {
        socket
            .set_reuse_address(true)
            .map_err(|source| SocketError::Configure {
                option: "SO_REUSEADDR",
                source,
            })?;
    }
    if let Some(size) = options.recv_buffer_size() {
        socket
            .set_recv_buffer_size(size)
            .map_err(|source| SocketError::Configure {
                option: "SO_RCVBUF",
                source,
            })?;
    }
    Ok(socket)
}

fn bind_datagram(addr: SocketAddr, options: &SocketOptions) -> Result<UdpSocket, SocketError> {
    let socket = new_socket(addr, Type::DGRAM, Protocol::UDP, options)?;
    socket
        .bind(&SockAddr::from(addr))
        .map_err(|source| SocketError::Bind { addr, source })?;
    let socket = UdpSocket::from(socket);
    enable_recv_errors(&socket, addr, options)?;
    Ok(socket)
}

fn local_of(result: io::Result<SocketAddr>) -> Result<SocketAddr, SocketError> {
    result.map_err(|source| SocketError::Configure {
        option: "getsockname",
        source,
    })
}

#[cfg(all(target_os = "linux", feature = "closed-peer-errqueue"))]
fn enable_recv_errors(
    socket: &UdpSocket,
    addr: SocketAddr,
    options: &SocketOptions,
) -> Result<(), SocketError> {
    if !options.recv_errors() {
        return Ok(());
    }
    crate::errqueue::enable(socket, addr.is_ipv6()).map_err(|source| SocketError::Configure {
        option: "IP_RECVERR",
        source,
    })
}

#[cfg(not(all(target_os = "linux", feature = "closed-peer-errqueue")))]
fn enable_recv_errors(
    _socket: &UdpSocket,
    _addr: SocketAddr,
    _options: &SocketOptions,
) -> Result<(), SocketError> {
    Ok(())
}

#[cfg(all(target_os = "linux", feature = "closed-peer-errqueue"))]
fn queued_offender(socket: &UdpSocket, recv_errors: bool) -> Option<SocketAddr> {
    if !recv_errors {
        return None;
    }
    let offender = crate::errqueue::closed_peer(socket);
    trace!(?offender, "drained socket error queue");
    offender
}

#[cfg(not(all(target_os = "linux", feature = "closed-peer-errqueue")))]
fn queued_offender(_socket: &UdpSocket, _recv_errors: bool) -> Option<SocketAddr> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().expect("loopback")
    }

    #[test]
    fn listener_reports_local_address_and_rejects_reads() {
        let endpoint =
            SocketEndpoint::listen_tcp(loopback(), &SocketOptions::default()).expect("listen");
        assert_eq!(endpoint.kind(), EndpointKind::Listening);
        assert_eq!(endpoint.address(), endpoint.local_addr());
        assert_ne!(endpoint.local_addr().port(), 0);
        let mut buf = [0u8; 8];
        assert_eq!(
            endpoint.receive(&mut buf),
            Err(TransportFailure::Unsupported)
        );
        assert_eq!(endpoint.resolve_closed_peer(), None);
    }

    #[test]
    fn idle_sockets_would_block() {
        let udp = SocketEndpoint::bind_udp(loopback(), &SocketOptions::default()).expect("bind");
        let mut buf = [0u8; 8];
        assert_eq!(udp.receive(&mut buf), Err(TransportFailure::WouldBlock));

        let tcp =
            SocketEndpoint::listen_tcp(loopback(), &SocketOptions::default()).expect("listen");
        assert_eq!(tcp.accept().err(), Some(TransportFailure::WouldBlock));
    }

    #[test]
    fn non_listening_endpoints_do_not_accept() {
        let udp = SocketEndpoint::bind_udp(loopback(), &SocketOptions::default()).expect("bind");
        assert_eq!(udp.accept().err(), Some(TransportFailure::Unsupported));
        assert_eq!(udp.send(b"x"), Err(TransportFailure::Unsupported));
    }

    #[test]
    fn connected_datagram_falls_back_to_remote() {
        let remote: SocketAddr = "127.0.0.1:9".parse().expect("addr");
        let options = SocketOptions::default().with_recv_errors(false);
        let udp = SocketEndpoint::connect_udp(loopback(), remote, &options).expect("connect");
        assert_eq!(udp.resolve_closed_peer(), Some(remote));
    }
}
