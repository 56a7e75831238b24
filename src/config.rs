//! Runtime configuration for wgsync
//!
//! Resolved once at startup from built-in defaults and environment overrides,
//! then passed by reference to every lifecycle step.

use std::ffi::OsString;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ipnet::IpNet;
use tracing::debug;

use crate::error::{WgError, WgResult};

/// Environment variable overriding the interface config path
pub const CONFIG_PATH_ENV: &str = "INTERFACE_CONFIG_PATH";

/// Environment variable overriding the VPN subnet (CIDR notation)
pub const SUBNET_ENV: &str = "SUBNET";

pub const DEFAULT_CONFIG_PATH: &str = "/etc/wireguard/wg0.conf";

pub const DEFAULT_SUBNET: &str = "10.32.42.0/24";

/// VPN subnet in canonical form: all host bits are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subnet(IpNet);

impl Subnet {
    /// Canonicalize `net` by clearing every bit outside the prefix.
    ///
    /// Fails when the prefix leaves no host bits, since the interface
    /// address is always the first host of the subnet.
    pub fn new(net: IpNet) -> WgResult<Self> {
        let net = net.trunc();
        if net.prefix_len() >= net.max_prefix_len() {
            return Err(WgError::Config(format!(
                "subnet {} leaves no room for a host address",
                net
            )));
        }
        Ok(Self(net))
    }

    pub fn network(&self) -> IpAddr {
        self.0.network()
    }

    pub fn prefix_len(&self) -> u8 {
        self.0.prefix_len()
    }

    /// The address the local end of the tunnel takes: network address with
    /// the lowest host bit set.
    pub fn interface_address(&self) -> InterfaceAddress {
        let address = match self.0.network() {
            IpAddr::V4(v4) => IpAddr::V4(Ipv4Addr::from(u32::from(v4) | 1)),
            IpAddr::V6(v6) => IpAddr::V6(Ipv6Addr::from(u128::from(v6) | 1)),
        };
        InterfaceAddress { address, prefix_len: self.prefix_len() }
    }
}

impl FromStr for Subnet {
    type Err = WgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let net = s
            .parse::<IpNet>()
            .map_err(|e| WgError::Config(format!("unable to parse subnet '{}': {}", s, e)))?;
        Self::new(net)
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Host address plus the subnet's prefix length, in route notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub address: IpAddr,
    pub prefix_len: u8,
}

impl fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

/// Immutable settings shared by all lifecycle steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Path of the wireguard-ui managed interface config
    pub config_path: PathBuf,
    /// Subnet served by the interface
    pub subnet: Subnet,
}

impl RuntimeConfig {
    /// Resolve from the process environment
    pub fn from_env() -> WgResult<Self> {
        Self::resolve(|name| std::env::var_os(name))
    }

    /// Resolve from defaults plus whatever `lookup` reports for the override
    /// variables. The path override is taken verbatim; the subnet override
    /// must parse as CIDR and is canonicalized.
    pub fn resolve<F>(lookup: F) -> WgResult<Self>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let config_path = match lookup(CONFIG_PATH_ENV) {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_PATH),
        };

        let subnet = match lookup(SUBNET_ENV) {
            Some(raw) => {
                let raw = raw.into_string().map_err(|raw| {
                    WgError::Config(format!("{} is not valid UTF-8: {:?}", SUBNET_ENV, raw))
                })?;
                let subnet = raw.parse::<Subnet>()?;
                if subnet.to_string() != raw {
                    debug!("Canonicalized subnet {} to {}", raw, subnet);
                }
                subnet
            }
            None => DEFAULT_SUBNET.parse()?,
        };

        Ok(Self { config_path, subnet })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn interface_address(&self) -> InterfaceAddress {
        self.subnet.interface_address()
    }
}
