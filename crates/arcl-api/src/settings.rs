// ── Connection settings ──
//
// Parsed form of the `"<ipv4>:<port>:<password>"` connection string.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

/// Where and how to log in to an ARCL server.
#[derive(Clone)]
pub struct ConnectionSettings {
    pub host: Ipv4Addr,
    pub port: u16,
    pub password: SecretString,
}

impl ConnectionSettings {
    pub fn new(host: Ipv4Addr, port: u16, password: SecretString) -> Result<Self, Error> {
        if password.expose_secret().is_empty() {
            return Err(Error::MissingPassword);
        }
        Ok(Self {
            host,
            port,
            password,
        })
    }

    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.host, self.port)
    }
}

impl FromStr for ConnectionSettings {
    type Err = Error;

    /// Everything after the second `:` is the password, so passwords may
    /// themselves contain colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, ':');

        let host = parts.next().unwrap_or_default();
        let host: Ipv4Addr = host.parse().map_err(|_| Error::InvalidSettings {
            field: "host",
            reason: format!("'{host}' is not an IPv4 address"),
        })?;

        let port = parts.next().ok_or_else(|| Error::InvalidSettings {
            field: "port",
            reason: "missing".into(),
        })?;
        let port: u16 = port.parse().map_err(|_| Error::InvalidSettings {
            field: "port",
            reason: format!("'{port}' is not a port number"),
        })?;

        let password = parts.next().ok_or(Error::MissingPassword)?;
        Self::new(host, port, SecretString::from(password.to_owned()))
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"[REDACTED]")
            .finish()
    }
}
