/// Anonymous Identity Resolution
///
/// Maps an inbound request (session token, network address, optional device
/// fingerprint) to a durable anonymous account, creating one when nothing
/// matches.

pub mod resolver;

pub use resolver::IdentityResolver;

/// What a request tells us about who is calling
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Token from the session cookie, if any
    pub session_token: Option<String>,
    /// Client network address (first forwarded hop or socket peer)
    pub ip_address: String,
    /// Client-derived device hash; a weak, non-unique hint
    pub fingerprint: Option<String>,
}

impl ClientIdentity {
    pub fn new(ip_address: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            ..Default::default()
        }
    }

    pub fn with_session_token(mut self, token: Option<String>) -> Self {
        self.session_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: Option<String>) -> Self {
        self.fingerprint = fingerprint.filter(|f| !f.trim().is_empty());
        self
    }
}
