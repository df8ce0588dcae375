//! Plugin handshake negotiation
//!
//! The host launches a plugin with `<magic_cookie_key>=<magic_cookie_value>`
//! in its environment. A plugin that recognizes the cookie answers with a
//! single stdout line before anything else:
//!
//! ```text
//! <protocol_version>|<transport protocol>
//! ```
//!
//! No RPC call is issued until that line has been validated.

use std::time::Duration;

use crate::{Error, Result};

/// Transport protocol spoken over the plugin's stdin/stdout
pub const PROTOCOL_JSONRPC: &str = "jsonrpc";

/// Transport protocols the framework knows how to speak
const SUPPORTED_PROTOCOLS: &[&str] = &[PROTOCOL_JSONRPC];

/// Shared secret and version both sides must agree on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    pub protocol_version: u32,
    pub magic_cookie_key: String,
    pub magic_cookie_value: String,
    /// Transport protocols a plugin is allowed to negotiate
    pub allowed_protocols: Vec<String>,
    /// Bound on the time a plugin may take to answer the handshake
    pub timeout: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            protocol_version: 1,
            magic_cookie_key: "HARBOR_PLUGIN_COOKIE".to_string(),
            magic_cookie_value: "5f1c9a7e2d4b4e0c8a3f6b9d1e7c2a40".to_string(),
            allowed_protocols: vec![PROTOCOL_JSONRPC.to_string()],
            timeout: Duration::from_secs(10),
        }
    }
}

/// Outcome of a successful handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub protocol_version: u32,
    pub protocol: String,
}

impl HandshakeConfig {
    /// Handshake line a conforming plugin prints
    #[must_use]
    pub fn line(&self, protocol: &str) -> String {
        format!("{}|{protocol}", self.protocol_version)
    }

    /// Whether the given environment value matches the shared cookie
    #[must_use]
    pub fn cookie_matches(&self, value: Option<&str>) -> bool {
        value == Some(self.magic_cookie_value.as_str())
    }

    /// Validate the handshake line emitted by a plugin
    ///
    /// # Errors
    ///
    /// Returns [`Error::Process`] for a malformed line, a protocol version
    /// mismatch, or a protocol outside the allow-list
    pub fn negotiate(&self, line: &str) -> Result<Negotiated> {
        let line = line.trim();
        let mut parts = line.split('|');

        let (Some(version), Some(protocol), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(Error::Process(format!("malformed handshake line: '{line}'")));
        };

        let protocol_version: u32 = version
            .parse()
            .map_err(|_| Error::Process(format!("invalid protocol version '{version}'")))?;

        if protocol_version != self.protocol_version {
            return Err(Error::Process(format!(
                "incompatible plugin protocol version {protocol_version}, expected {}",
                self.protocol_version
            )));
        }

        if !SUPPORTED_PROTOCOLS.contains(&protocol) {
            return Err(Error::Process(format!("unsupported plugin protocol '{protocol}'")));
        }

        if !self.allowed_protocols.iter().any(|p| p == protocol) {
            return Err(Error::Process(format!("plugin protocol '{protocol}' is not allowed")));
        }

        Ok(Negotiated {
            protocol_version,
            protocol: protocol.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_matching_line() {
        let config = HandshakeConfig::default();
        let negotiated = config.negotiate("1|jsonrpc\n").unwrap();

        assert_eq!(negotiated.protocol_version, 1);
        assert_eq!(negotiated.protocol, PROTOCOL_JSONRPC);
    }

    #[test]
    fn generated_line_round_trips() {
        let config = HandshakeConfig::default();
        assert!(config.negotiate(&config.line(PROTOCOL_JSONRPC)).is_ok());
    }

    #[test]
    fn rejects_version_mismatch() {
        let err = HandshakeConfig::default().negotiate("2|jsonrpc").unwrap_err();
        assert!(err.to_string().contains("incompatible"));
    }

    #[test]
    fn rejects_unknown_protocol() {
        let err = HandshakeConfig::default().negotiate("1|grpc").unwrap_err();
        assert!(err.to_string().contains("unsupported"));
    }

    #[test]
    fn rejects_protocol_outside_allow_list() {
        let config = HandshakeConfig {
            allowed_protocols: Vec::new(),
            ..HandshakeConfig::default()
        };
        let err = config.negotiate("1|jsonrpc").unwrap_err();
        assert!(err.to_string().contains("not allowed"));
    }

    #[test]
    fn rejects_malformed_lines() {
        let config = HandshakeConfig::default();
        for line in ["", "1", "one|jsonrpc", "1|jsonrpc|extra"] {
            assert!(config.negotiate(line).is_err(), "accepted '{line}'");
        }
    }

    #[test]
    fn cookie_check() {
        let config = HandshakeConfig::default();
        assert!(config.cookie_matches(Some(&config.magic_cookie_value)));
        assert!(!config.cookie_matches(Some("nope")));
        assert!(!config.cookie_matches(None));
    }
}
