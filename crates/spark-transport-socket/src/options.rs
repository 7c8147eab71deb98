/// 套接字的可选参数集合。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 将 `SO_REUSEADDR`、`SO_RCVBUF`、监听队列长度与错误队列开关显式建模，
///   避免宿主层散布魔法数字；
///
/// ## 契约（What）
/// - `reuse_address`：绑定前设置 `SO_REUSEADDR`，缺省开启；
/// - `recv_buffer_size`：覆盖内核接收缓冲大小，缺省沿用系统值；
/// - `backlog`：TCP 监听队列长度，缺省 128；
/// - `recv_errors`：Linux 下为 UDP 套接字开启 `IP_RECVERR`/`IPV6_RECVERR`，
///   使被拒绝的数据报可通过错误队列定位目的地址；其他平台忽略。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SocketOptions {
    reuse_address: bool,
    recv_buffer_size: Option<usize>,
    backlog: i32,
    recv_errors: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            reuse_address: true,
            recv_buffer_size: None,
            backlog: 128,
            recv_errors: true,
        }
    }
}

impl SocketOptions {
    pub fn with_reuse_address(mut self, enabled: bool) -> Self {
        self.reuse_address = enabled;
        self
    }

    pub fn with_recv_buffer_size(mut self, size: Option<usize>) -> Self {
        self.recv_buffer_size = size;
        self
    }

    pub fn with_backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn with_recv_errors(mut self, enabled: bool) -> Self {
        self.recv_errors = enabled;
        self
    }

    pub fn reuse_address(&self) -> bool {
        self.reuse_address
    }

    pub fn recv_buffer_size(&self) -> Option<usize> {
        self.recv_buffer_size
    }

    pub fn backlog(&self) -> i32 {
        self.backlog
    }

    pub fn recv_errors(&self) -> bool {
        self.recv_errors
    }
}
