use crate::error::{Error, Result};

/// An `a=` line split at its first colon. Property attributes such as
/// `a=sendrecv` carry an empty value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAttribute {
    pub name: String,
    pub value: String,
}

impl MediaAttribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

pub(crate) fn parse_attribute(line: &str) -> Option<MediaAttribute> {
    match line.find(':') {
        Some(0) => None,
        Some(index) => Some(MediaAttribute::new(&line[..index], &line[index + 1..])),
        None if line.trim().is_empty() => None,
        None => Some(MediaAttribute::new(line.trim(), "")),
    }
}

/// One media format of an `m=` block.
///
/// An `m=` line listing several formats yields one description per format,
/// all sharing name, port, protocol and the block's `i=`/`c=`/`b=`/`k=`
/// lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    pub name: String,
    pub port: u16,
    /// Number of ports from `<port>/<count>`, when given
    pub port_count: Option<u16>,
    pub protocol: String,
    /// Format token exactly as written on the `m=` line
    pub payload: String,
    /// Numeric value of [`payload`](Self::payload); `None` for formats like
    /// `*` in MSRP media lines
    pub payload_type: Option<u8>,
    pub media_title: Option<String>,
    pub connection_info: Option<String>,
    pub bandwidth_info: Option<String>,
    pub encryption_key: Option<String>,
    /// Attributes in source order; names may repeat
    pub media_attributes: Vec<MediaAttribute>,
}

impl MediaDescription {
    pub fn new(name: impl Into<String>, port: u16, protocol: impl Into<String>, payload: impl Into<String>) -> Self {
        let payload = payload.into();
        Self {
            name: name.into(),
            port,
            port_count: None,
            protocol: protocol.into(),
            payload_type: payload.parse::<u8>().ok().filter(|pt| *pt <= 127),
            payload,
            media_title: None,
            connection_info: None,
            bandwidth_info: None,
            encryption_key: None,
            media_attributes: Vec::new(),
        }
    }

    /// First attribute with this name
    pub fn media_attribute(&self, name: &str) -> Option<&MediaAttribute> {
        self.media_attributes.iter().find(|a| a.name == name)
    }

    /// Every attribute with this name, in source order
    pub fn media_attributes<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MediaAttribute> + 'a {
        self.media_attributes.iter().filter(move |a| a.name == name)
    }

    /// Whether an `rtpmap`-style value (`<fmt> <encoding>`) targets this format
    pub(crate) fn matches_format(&self, value: &str) -> bool {
        value.split_whitespace().next() == Some(self.payload.as_str())
    }
}

/// Split an `m=` value into one description per listed format
pub(crate) fn parse_media_line(line: &str) -> Result<Vec<MediaDescription>> {
    let malformed = || Error::SdpParse(format!("malformed media line: m={}", line));

    let mut fields = line.split(' ').filter(|f| !f.is_empty());
    let name = fields.next().ok_or_else(malformed)?;
    let port_field = fields.next().ok_or_else(malformed)?;
    let protocol = fields.next().ok_or_else(malformed)?;

    let (port, port_count) = match port_field.split_once('/') {
        Some((port, count)) => (
            port.parse::<u16>().map_err(|_| malformed())?,
            Some(count.parse::<u16>().map_err(|_| malformed())?),
        ),
        None => (port_field.parse::<u16>().map_err(|_| malformed())?, None),
    };

    let descriptions: Vec<MediaDescription> = fields
        .map(|payload| {
            let mut media = MediaDescription::new(name, port, protocol, payload);
            media.port_count = port_count;
            media
        })
        .collect();

    if descriptions.is_empty() {
        return Err(malformed());
    }
    Ok(descriptions)
}
