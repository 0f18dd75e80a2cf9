use anyhow::anyhow;
use std::net::{SocketAddr, ToSocketAddrs};
use url::Url;

/// Resolves `host:port`, `tcp://host:port` or `http://host:port` into a socket address.
pub fn parse_socket_addr(addr: &str) -> anyhow::Result<SocketAddr> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err(anyhow!("address cannot be empty"));
    }

    let url = if addr.contains("://") {
        Url::parse(addr)?
    } else {
        Url::parse(&format!("tcp://{}", addr))?
    };

    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("missing host in {}", addr))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();

    let port = url
        .port_or_known_default()
        .ok_or_else(|| anyhow!("missing port in {}", addr))?;

    (host.as_str(), port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow!("{} did not resolve to any address", addr))
}
