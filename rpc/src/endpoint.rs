use crate::error::{Error, ErrorKind};
use std::fmt;
use std::str::FromStr;

/// Transport used to reach an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Tcp,
    Unix,
}

impl FromStr for Network {
    type Err = Error;
    fn from_str(network: &str) -> Result<Network, Self::Err> {
        match network.to_lowercase().as_str() {
            "tcp" => Ok(Network::Tcp),
            "unix" => Ok(Network::Unix),
            other => Err(Error::new(
                ErrorKind::Config,
                &format!("unsupported network \"{other}\""),
            )),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Network::Tcp => write!(f, "tcp"),
            Network::Unix => write!(f, "unix"),
        }
    }
}

/// A remote service instance, written as `network:address`
/// (e.g. `tcp:127.0.0.1:7270` or `unix:/tmp/router.sock`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub network: Network,
    pub address: String,
}

impl Endpoint {
    pub fn new(network: Network, address: impl Into<String>) -> Self {
        Self {
            network,
            address: address.into(),
        }
    }

    pub fn tcp(address: impl Into<String>) -> Self {
        Self::new(Network::Tcp, address)
    }
}

impl FromStr for Endpoint {
    type Err = Error;
    fn from_str(s: &str) -> Result<Endpoint, Self::Err> {
        let (network, address) = s.trim().split_once(':').ok_or_else(|| {
            Error::new(
                ErrorKind::Config,
                &format!("endpoint \"{s}\" is not in network:address form"),
            )
        })?;
        if address.is_empty() {
            return Err(Error::new(
                ErrorKind::Config,
                &format!("endpoint \"{s}\" has an empty address"),
            ));
        }
        Ok(Endpoint::new(network.parse()?, address))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.network, self.address)
    }
}
