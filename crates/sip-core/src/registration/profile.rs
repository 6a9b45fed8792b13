use serde::{Deserialize, Serialize};

/// Identity of the registered user as confirmed by the network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub display_name: String,
    pub home_domain: String,
    /// Login used against the XDM server, `sip:<username>@<domain>`
    pub xdm_server_login: String,
}

impl UserProfile {
    /// `sip:<username>@<home_domain>`
    pub fn public_uri(&self) -> String {
        format!("sip:{}@{}", self.username, self.home_domain)
    }
}
