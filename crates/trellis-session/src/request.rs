//! Request context
//!
//! The fingerprint inputs, as handed over by whatever request layer sits in
//! front of the session manager.

use std::net::IpAddr;

use crate::error::SessionError;
use crate::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub client_ip: Option<IpAddr>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new(client_ip: IpAddr, user_agent: impl Into<String>) -> Self {
        Self {
            client_ip: Some(client_ip),
            user_agent: Some(user_agent.into()),
        }
    }

    /// Context for a non-HTTP invocation (CLI, job runner)
    pub fn detached() -> Self {
        Self::default()
    }

    /// Build from the peer address and raw request headers.
    ///
    /// The first parseable `X-Forwarded-For` hop, across all such headers,
    /// wins over the peer address. Header names are matched case-insensitively.
    pub fn from_headers<'a, I>(peer: Option<IpAddr>, headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut forwarded = None;
        let mut user_agent = None;

        for (name, value) in headers {
            if name.eq_ignore_ascii_case("x-forwarded-for") {
                forwarded = forwarded.or_else(|| {
                    value
                        .split(',')
                        .find_map(|hop| hop.trim().parse::<IpAddr>().ok())
                });
            } else if name.eq_ignore_ascii_case("user-agent") {
                user_agent = Some(value.trim().to_string());
            }
        }

        Self {
            client_ip: forwarded.or(peer),
            user_agent,
        }
    }

    pub fn fingerprint_inputs(&self) -> Result<(IpAddr, &str)> {
        let ip = self
            .client_ip
            .ok_or_else(|| SessionError::Init("client IP address unavailable".to_string()))?;
        let user_agent = self
            .user_agent
            .as_deref()
            .ok_or_else(|| SessionError::Init("user agent unavailable".to_string()))?;
        Ok((ip, user_agent))
    }
}
