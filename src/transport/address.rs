//! Multiaddress-style listen addresses: `/ip4/127.0.0.1/tcp/7001`.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

/// Network-layer component of a listen address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Host {
    Ip4(Ipv4Addr),
    Ip6(Ipv6Addr),
    /// `dns`, `dns4` and `dns6` all resolve through the system resolver.
    Dns(String),
}

/// Protocol/host/port triple an agent is reachable on.
///
/// Port `0` asks the operating system for an ephemeral port at bind time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ListenAddress {
    host: Host,
    port: u16,
}

impl ListenAddress {
    pub fn new(host: Host, port: u16) -> Self {
        Self { host, port }
    }

    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        let host = match addr.ip() {
            IpAddr::V4(ip) => Host::Ip4(ip),
            IpAddr::V6(ip) => Host::Ip6(ip),
        };
        Self {
            host,
            port: addr.port(),
        }
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// True when the port is chosen by the OS at bind time.
    pub fn is_ephemeral(&self) -> bool {
        self.port == 0
    }

    pub fn with_port(&self, port: u16) -> Self {
        Self {
            host: self.host.clone(),
            port,
        }
    }

    /// `host:port` form accepted by `tokio::net` bind/connect/lookup.
    pub fn socket_target(&self) -> String {
        match &self.host {
            Host::Ip4(ip) => format!("{}:{}", ip, self.port),
            Host::Ip6(ip) => format!("[{}]:{}", ip, self.port),
            Host::Dns(name) => format!("{}:{}", name, self.port),
        }
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Host::Ip4(ip) => write!(f, "/ip4/{}/tcp/{}", ip, self.port),
            Host::Ip6(ip) => write!(f, "/ip6/{}/tcp/{}", ip, self.port),
            Host::Dns(name) => write!(f, "/dns/{}/tcp/{}", name, self.port),
        }
    }
}

impl FromStr for ListenAddress {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |detail: &str| {
            ApiError::InvalidRequest(format!("invalid listen address '{}': {}", s, detail))
        };

        if !s.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }
        let parts: Vec<&str> = s[1..].split('/').collect();
        if parts.len() != 4 {
            return Err(invalid("expected /<proto>/<host>/tcp/<port>"));
        }

        let host = match parts[0] {
            "ip4" => Host::Ip4(parts[1].parse().map_err(|_| invalid("bad IPv4 address"))?),
            "ip6" => Host::Ip6(parts[1].parse().map_err(|_| invalid("bad IPv6 address"))?),
            "dns" | "dns4" | "dns6" => {
                if parts[1].is_empty() || parts[1].chars().any(|c| c.is_whitespace() || c == ':') {
                    return Err(invalid("bad host name"));
                }
                Host::Dns(parts[1].to_string())
            }
            other => return Err(invalid(&format!("unsupported network protocol '{}'", other))),
        };

        if parts[2] != "tcp" {
            return Err(invalid("only tcp transport is supported"));
        }
        let port: u16 = parts[3].parse().map_err(|_| invalid("bad port"))?;

        Ok(Self { host, port })
    }
}

impl TryFrom<String> for ListenAddress {
    type Error = ApiError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ListenAddress> for String {
    fn from(addr: ListenAddress) -> Self {
        addr.to_string()
    }
}
