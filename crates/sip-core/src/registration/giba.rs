use tracing::{debug, info};

use super::{RegistrationProcedure, UserProfile, HEADER_P_ASSOCIATED_URI};
use crate::error::{Error, Result};
use crate::types::address::{extract_domain_from_address, extract_username_from_address, split_address_list};
use crate::types::SipMessage;

/// GIBA / early-IMS registration (3GPP TS 33.978).
///
/// The identity is derived from the SIM: with IMSI `208011234567890` and
/// operator code `20801` the IMPU is
/// `sip:208011234567890@ims.mnc001.mcc208.3gppnetwork.org`.
///
/// ```
/// use rcs_sip_core::registration::{GibaRegistrationProcedure, RegistrationProcedure};
///
/// let giba = GibaRegistrationProcedure::from_sim("208011234567890", "20801").unwrap();
/// assert_eq!(giba.home_domain(), "ims.mnc001.mcc208.3gppnetwork.org");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GibaRegistrationProcedure {
    imsi: String,
    mcc: String,
    mnc: String,
}

impl GibaRegistrationProcedure {
    /// Build from the subscriber IMSI and the SIM operator code (MCC+MNC,
    /// 5 or 6 digits). A 2-digit MNC is padded to 3.
    pub fn from_sim(imsi: &str, sim_operator: &str) -> Result<Self> {
        if imsi.is_empty() || !imsi.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidIdentity(format!("IMSI {:?}", imsi)));
        }
        if !(5..=6).contains(&sim_operator.len()) || !sim_operator.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidIdentity(format!("SIM operator {:?}", sim_operator)));
        }

        let mcc = sim_operator[..3].to_string();
        let mut mnc = sim_operator[3..].to_string();
        if sim_operator.len() == 5 {
            mnc.insert(0, '0');
        }

        debug!(mcc = %mcc, mnc = %mnc, "GIBA identity derived from SIM");
        Ok(Self {
            imsi: imsi.to_string(),
            mcc,
            mnc,
        })
    }

    pub fn mcc(&self) -> &str {
        &self.mcc
    }

    pub fn mnc(&self) -> &str {
        &self.mnc
    }
}

impl RegistrationProcedure for GibaRegistrationProcedure {
    fn home_domain(&self) -> String {
        format!("ims.mnc{}.mcc{}.3gppnetwork.org", self.mnc, self.mcc)
    }

    fn public_uri(&self) -> String {
        format!("sip:{}@{}", self.imsi, self.home_domain())
    }

    fn write_security_header(&self, _request: &mut SipMessage) -> Result<()> {
        // GIBA authenticates at the bearer level; REGISTER carries no
        // Authorization header
        Ok(())
    }

    /// The first `P-Associated-URI` entry is the authoritative identity. A tel
    /// URI keeps the current home domain since it has no host.
    fn read_security_header(&self, response: &SipMessage, profile: &mut UserProfile) -> Result<()> {
        let header = response
            .header(HEADER_P_ASSOCIATED_URI)
            .ok_or(Error::MissingHeader(HEADER_P_ASSOCIATED_URI))?;
        let address = split_address_list(header)
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidAddress(header.to_string()))?;

        let username = extract_username_from_address(address)?;
        let domain = extract_domain_from_address(address).unwrap_or_else(|| {
            if profile.home_domain.is_empty() {
                self.home_domain()
            } else {
                profile.home_domain.clone()
            }
        });

        profile.display_name = username.clone();
        profile.xdm_server_login = format!("sip:{}@{}", username, domain);
        profile.username = username;
        profile.home_domain = domain;

        info!(username = %profile.username, domain = %profile.home_domain, "User profile updated from P-Associated-URI");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_response(associated: &str) -> SipMessage {
        SipMessage::response(200, "OK")
            .unwrap()
            .with_header("P-Associated-URI", associated)
    }

    #[test]
    fn test_two_digit_mnc_is_padded() {
        let giba = GibaRegistrationProcedure::from_sim("208011234567890", "20801").unwrap();
        assert_eq!(giba.mcc(), "208");
        assert_eq!(giba.mnc(), "001");
        assert_eq!(giba.public_uri(), "sip:208011234567890@ims.mnc001.mcc208.3gppnetwork.org");
    }

    #[test]
    fn test_three_digit_mnc_is_kept() {
        let giba = GibaRegistrationProcedure::from_sim("310150123456789", "310150").unwrap();
        assert_eq!(giba.home_domain(), "ims.mnc150.mcc310.3gppnetwork.org");
    }

    #[test]
    fn test_invalid_sim_values() {
        assert!(GibaRegistrationProcedure::from_sim("", "20801").is_err());
        assert!(GibaRegistrationProcedure::from_sim("20801abc", "20801").is_err());
        assert!(GibaRegistrationProcedure::from_sim("208011234567890", "2080").is_err());
        assert!(GibaRegistrationProcedure::from_sim("208011234567890", "2080123").is_err());
    }

    #[test]
    fn test_profile_from_sip_associated_uri() {
        let giba = GibaRegistrationProcedure::from_sim("208011234567890", "20801").unwrap();
        let mut profile = UserProfile::default();
        giba.read_security_header(
            &ok_response("<sip:+33612345678@ims.orange.fr>, <tel:+33612345678>"),
            &mut profile,
        )
        .unwrap();

        assert_eq!(profile.username, "+33612345678");
        assert_eq!(profile.display_name, "+33612345678");
        assert_eq!(profile.home_domain, "ims.orange.fr");
        assert_eq!(profile.xdm_server_login, "sip:+33612345678@ims.orange.fr");
    }

    #[test]
    fn test_profile_from_tel_associated_uri() {
        let giba = GibaRegistrationProcedure::from_sim("208011234567890", "20801").unwrap();
        let mut profile = UserProfile::default();
        giba.read_security_header(&ok_response("<tel:+33612345678>"), &mut profile).unwrap();

        assert_eq!(profile.username, "+33612345678");
        assert_eq!(profile.home_domain, "ims.mnc001.mcc208.3gppnetwork.org");
    }

    #[test]
    fn test_missing_associated_uri() {
        let giba = GibaRegistrationProcedure::from_sim("208011234567890", "20801").unwrap();
        let mut profile = UserProfile::default();
        let response = SipMessage::response(200, "OK").unwrap();
        assert_eq!(
            giba.read_security_header(&response, &mut profile),
            Err(Error::MissingHeader("P-Associated-URI"))
        );
        assert_eq!(profile, UserProfile::default());
    }
}
