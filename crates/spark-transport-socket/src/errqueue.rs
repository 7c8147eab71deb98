//! Linux 错误队列：定位被 ICMP 拒绝的数据报目的地址。
//!
//! 开启 `IP_RECVERR` 后，内核把触发 ICMP 端口不可达的原始报文挂到套接字错误队列；
//! 以 `MSG_ERRQUEUE` 读取时，`msg_name` 即原始报文的目的地址，也就是关闭了端口的对端。

use std::{
    io::IoSliceMut,
    net::{SocketAddr, UdpSocket},
    os::fd::AsRawFd,
};

use nix::sys::socket::{MsgFlags, SockaddrStorage, recvmsg, setsockopt, sockopt};

/// 为套接字开启扩展错误上报。
pub(crate) fn enable(socket: &UdpSocket, ipv6: bool) -> std::io::Result<()> {
    let result = if ipv6 {
        setsockopt(socket, sockopt::Ipv6RecvErr, &true)
    } else {
        setsockopt(socket, sockopt::Ipv4RecvErr, &true)
    };
    result.map_err(std::io::Error::from)
}

/// 从错误队列取出一条记录并返回其目的地址；队列为空或地址族不支持时返回 `None`。
pub(crate) fn closed_peer(socket: &UdpSocket) -> Option<SocketAddr> {
    let mut payload = [0u8; 512];
    let mut iov = [IoSliceMut::new(&mut payload)];
    let msg = recvmsg::<SockaddrStorage>(
        socket.as_raw_fd(),
        &mut iov,
        None,
        MsgFlags::MSG_ERRQUEUE | MsgFlags::MSG_DONTWAIT,
    )
    .ok()?;
    let storage = msg.address?;
    storage_to_std(&storage)
}

fn storage_to_std(storage: &SockaddrStorage) -> Option<SocketAddr> {
    if let Some(v4) = storage.as_sockaddr_in() {
        return Some(SocketAddr::V4((*v4).into()));
    }
    storage.as_sockaddr_in6().map(|v6| SocketAddr::V6((*v6).into()))
}
