//! IMS registration procedures.
//!
//! A procedure decides the identity used in REGISTER and how the
//! registrar's answer updates the local [`UserProfile`]. The REGISTER
//! transaction itself is driven elsewhere.

mod giba;
mod profile;

pub use giba::GibaRegistrationProcedure;
pub use profile::UserProfile;

use crate::error::Result;
use crate::types::SipMessage;

/// Header carrying the identities the network associated with the registration
pub const HEADER_P_ASSOCIATED_URI: &str = "P-Associated-URI";

pub trait RegistrationProcedure: Send + Sync {
    /// Home network domain used as registrar and in the public URI
    fn home_domain(&self) -> String;

    /// IMS public user identity (IMPU) put in From/To of REGISTER
    fn public_uri(&self) -> String;

    /// Add procedure specific security headers to a REGISTER request
    fn write_security_header(&self, request: &mut SipMessage) -> Result<()>;

    /// Apply the registrar's 200 OK to the user profile
    fn read_security_header(&self, response: &SipMessage, profile: &mut UserProfile) -> Result<()>;
}
