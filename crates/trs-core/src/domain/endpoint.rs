//! Endpoint descriptor for a TRS provider
//!
//! An [`EndpointDescriptor`] bundles the feed URI with optional HTTP Basic
//! credentials. It is constructed through one of two factories, anonymous
//! or basic-auth, and rejects partial credentials at construction time.
//!
//! Empty-string credentials are kept as basic auth with empty values; they
//! are not normalized to anonymous access.

use std::fmt::{self, Debug, Display, Formatter};

use url::Url;

use super::errors::DomainError;

/// Username/password pair for HTTP Basic authentication
///
/// `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    username: String,
    password: String,
}

impl BasicCredentials {
    /// Username sent in the Authorization header
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Password sent in the Authorization header
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl Debug for BasicCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Immutable description of a TRS feed endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    feed_uri: Url,
    credentials: Option<BasicCredentials>,
}

impl EndpointDescriptor {
    /// Descriptor for a feed that needs no authentication
    pub fn anonymous(feed_uri: &str) -> Result<Self, DomainError> {
        Ok(Self {
            feed_uri: parse_feed_uri(feed_uri)?,
            credentials: None,
        })
    }

    /// Descriptor for a feed protected by HTTP Basic authentication
    pub fn basic_auth(
        feed_uri: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            feed_uri: parse_feed_uri(feed_uri)?,
            credentials: Some(BasicCredentials {
                username: username.into(),
                password: password.into(),
            }),
        })
    }

    /// Builds a descriptor from optional configuration values
    ///
    /// Both credentials present selects basic auth, both absent selects
    /// anonymous access. Exactly one present is rejected.
    pub fn from_parts(
        feed_uri: &str,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self, DomainError> {
        match (username, password) {
            (Some(user), Some(pass)) => Self::basic_auth(feed_uri, user, pass),
            (None, None) => Self::anonymous(feed_uri),
            (Some(_), None) => Err(DomainError::PartialCredentials(format!(
                "username given without password for {feed_uri}"
            ))),
            (None, Some(_)) => Err(DomainError::PartialCredentials(format!(
                "password given without username for {feed_uri}"
            ))),
        }
    }

    /// The TRS document URI of the feed
    pub fn feed_uri(&self) -> &Url {
        &self.feed_uri
    }

    /// Basic-auth credentials, if any
    pub fn credentials(&self) -> Option<&BasicCredentials> {
        self.credentials.as_ref()
    }

    /// Returns true if requests must carry an Authorization header
    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }
}

impl Display for EndpointDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.credentials {
            Some(creds) => write!(f, "{} (basic auth as {})", self.feed_uri, creds.username),
            None => write!(f, "{} (anonymous)", self.feed_uri),
        }
    }
}

fn parse_feed_uri(raw: &str) -> Result<Url, DomainError> {
    let url = Url::parse(raw.trim()).map_err(|e| DomainError::InvalidUri(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(DomainError::InvalidUri(format!(
            "{raw}: unsupported scheme '{other}'"
        ))),
    }
}
