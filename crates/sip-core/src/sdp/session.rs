use super::media::{parse_attribute, MediaAttribute};
use super::reader::TokenReader;

/// A `t=` line with its `r=` repeat times
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeDescription {
    pub time_active: String,
    pub repeat_times: Vec<String>,
}

impl TimeDescription {
    fn parse(reader: &mut TokenReader<'_>) -> Self {
        let time_active = reader.get_line();
        let mut repeat_times = Vec::new();
        while reader.get_token("r=") {
            repeat_times.push(reader.get_line());
        }
        Self {
            time_active,
            repeat_times,
        }
    }
}

/// Reads one `x=` line if it is next, recording absent mandatory tokens
pub(crate) fn field(
    reader: &mut TokenReader<'_>,
    token: &'static str,
    mandatory: bool,
    missing: &mut Vec<&'static str>,
) -> Option<String> {
    if reader.get_token_checked(token, mandatory) {
        Some(reader.get_line())
    } else {
        if mandatory {
            missing.push(token);
        }
        None
    }
}

/// Session-level part of an SDP body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDescription {
    pub version: String,
    pub origin: Option<String>,
    pub session_name: Option<String>,
    pub session_info: Option<String>,
    pub uri: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub connection_info: Option<String>,
    pub bandwidth_info: Option<String>,
    pub time_descriptions: Vec<TimeDescription>,
    pub timezone_adjustment: Option<String>,
    pub encryption_key: Option<String>,
    pub session_attributes: Vec<MediaAttribute>,
    /// Set when a session-level `c=` line was present, making it optional in
    /// every media block
    pub connection_included: bool,
}

impl SessionDescription {
    /// Parse the session section. The `v=` token has already been consumed.
    pub(crate) fn parse(reader: &mut TokenReader<'_>, missing: &mut Vec<&'static str>) -> Self {
        let mut session = SessionDescription {
            version: reader.get_line(),
            ..Default::default()
        };

        session.origin = field(reader, "o=", true, missing);
        session.session_name = field(reader, "s=", true, missing);
        session.session_info = field(reader, "i=", false, missing);
        session.uri = field(reader, "u=", false, missing);
        session.email = field(reader, "e=", false, missing);
        // some servers send two e= lines; keep the last one
        if let Some(email) = field(reader, "e=", false, missing) {
            session.email = Some(email);
        }
        session.phone = field(reader, "p=", false, missing);
        session.connection_info = field(reader, "c=", false, missing);
        session.connection_included = session.connection_info.is_some();
        session.bandwidth_info = field(reader, "b=", false, missing);

        let mut found = reader.get_token_checked("t=", true);
        if !found {
            missing.push("t=");
        }
        while found {
            session.time_descriptions.push(TimeDescription::parse(reader));
            found = reader.get_token("t=");
        }

        session.timezone_adjustment = field(reader, "z=", false, missing);
        session.encryption_key = field(reader, "k=", false, missing);

        while reader.get_token("a=") {
            if let Some(attribute) = parse_attribute(&reader.get_line()) {
                session.session_attributes.push(attribute);
            }
        }

        session
    }

    /// The first `t=` value
    pub fn time_active(&self) -> Option<&str> {
        self.time_descriptions.first().map(|t| t.time_active.as_str())
    }

    /// All repeat times across time descriptions
    pub fn repeat_times(&self) -> impl Iterator<Item = &str> {
        self.time_descriptions
            .iter()
            .flat_map(|t| t.repeat_times.iter().map(String::as_str))
    }

    /// First session attribute with this name
    pub fn session_attribute(&self, name: &str) -> Option<&MediaAttribute> {
        self.session_attributes.iter().find(|a| a.name == name)
    }
}
