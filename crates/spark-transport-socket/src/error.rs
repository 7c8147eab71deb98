use std::{io, net::SocketAddr};

use thiserror::Error;

/// 端点创建阶段的错误。
///
/// 收包热路径的失败以 [`spark_receiver::TransportFailure`] 表达，这里只覆盖绑定、连接与选项配置，
/// 并保留原始 `io::Error` 作为 `source` 以便排障。
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("failed to bind `{addr}`")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to `{addr}`")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to configure socket option `{option}`")]
    Configure {
        option: &'static str,
        #[source]
        source: io::Error,
    },
}
