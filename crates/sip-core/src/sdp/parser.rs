use tracing::debug;

use super::media::{parse_attribute, parse_media_line, MediaAttribute, MediaDescription};
use super::reader::TokenReader;
use super::session::{field, SessionDescription};
use crate::error::Result;

/// Parsed SDP body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SdpParser {
    /// `None` when the body does not start with `v=`
    pub session_description: Option<SessionDescription>,
    pub media_descriptions: Vec<MediaDescription>,
    /// Mandatory tokens that were absent, in the order they were expected
    pub missing_tokens: Vec<&'static str>,
}

impl SdpParser {
    /// Parse an SDP body.
    ///
    /// Fails only on a malformed `m=` line; absent optional fields are left
    /// empty and absent mandatory ones are listed in
    /// [`missing_tokens`](Self::missing_tokens).
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = TokenReader::new(data);
        let mut parser = SdpParser::default();

        if !reader.get_token_checked("v=", true) {
            parser.missing_tokens.push("v=");
            return Ok(parser);
        }

        let session = SessionDescription::parse(&mut reader, &mut parser.missing_tokens);
        parser.parse_media_descriptions(&mut reader, session.connection_included)?;
        parser.session_description = Some(session);

        if !reader.at_end() {
            debug!(line = %reader.get_line(), "SDP parsing stopped at unexpected line");
        }
        Ok(parser)
    }

    fn parse_media_descriptions(&mut self, reader: &mut TokenReader<'_>, session_connection: bool) -> Result<()> {
        while reader.get_token("m=") {
            let mut descs = parse_media_line(&reader.get_line())?;

            let title = field(reader, "i=", false, &mut self.missing_tokens);
            let connection = field(reader, "c=", !session_connection, &mut self.missing_tokens);
            let bandwidth = field(reader, "b=", false, &mut self.missing_tokens);
            let key = field(reader, "k=", false, &mut self.missing_tokens);
            for media in descs.iter_mut() {
                media.media_title = title.clone();
                media.connection_info = connection.clone();
                media.bandwidth_info = bandwidth.clone();
                media.encryption_key = key.clone();
            }

            while reader.get_token("a=") {
                let Some(attribute) = parse_attribute(&reader.get_line()) else {
                    continue;
                };
                // rtpmap names its format; everything else applies to the whole block
                let targeted = attribute.name.eq_ignore_ascii_case("rtpmap") && attribute.value.contains(' ');
                for media in descs.iter_mut() {
                    if !targeted || media.matches_format(&attribute.value) {
                        media.media_attributes.push(attribute.clone());
                    }
                }
            }

            self.media_descriptions.extend(descs);
        }
        Ok(())
    }

    /// First session attribute with this name
    pub fn session_attribute(&self, name: &str) -> Option<&MediaAttribute> {
        self.session_description
            .as_ref()
            .and_then(|s| s.session_attribute(name))
    }

    /// All media descriptions in source order
    ///
    /// An `m=` line offering several formats yields one description per
    /// format, so a block such as `m=video 40000 RTP/AVP 96 97` counts twice.
    /// Each copy shares the block's fields and carries only its own `rtpmap`.
    pub fn media_descriptions(&self) -> &[MediaDescription] {
        &self.media_descriptions
    }

    /// First media description with this media name (e.g. `"audio"`)
    pub fn media_description(&self, name: &str) -> Option<&MediaDescription> {
        self.media_descriptions.iter().find(|m| m.name == name)
    }

    /// Every media description with this media name
    pub fn media_descriptions_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MediaDescription> + 'a {
        self.media_descriptions.iter().filter(move |m| m.name == name)
    }

    /// Connection line for a media block, falling back to the session level
    pub fn connection_info<'a>(&'a self, media: &'a MediaDescription) -> Option<&'a str> {
        media.connection_info.as_deref().or_else(|| {
            self.session_description
                .as_ref()
                .filter(|s| s.connection_included)
                .and_then(|s| s.connection_info.as_deref())
        })
    }

    /// Whether every mandatory token was present
    pub fn is_complete(&self) -> bool {
        self.missing_tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_audio_offer() {
        let sdp = "v=0\r\nt=0 0\r\nm=audio 49170 RTP/AVP 0\r\nc=IN IP4 192.0.2.1\r\na=rtpmap:0 PCMU/8000\r\n";
        let parser = SdpParser::parse(sdp.as_bytes()).unwrap();

        assert_eq!(parser.media_descriptions().len(), 1);
        let media = &parser.media_descriptions()[0];
        assert_eq!(media.name, "audio");
        assert_eq!(media.port, 49170);
        assert_eq!(media.protocol, "RTP/AVP");
        assert_eq!(media.payload, "0");
        assert_eq!(media.payload_type, Some(0));
        assert_eq!(media.connection_info.as_deref(), Some("IN IP4 192.0.2.1"));
        assert_eq!(media.media_attributes, vec![MediaAttribute::new("rtpmap", "0 PCMU/8000")]);

        // o= and s= are mandatory but absent
        assert_eq!(parser.missing_tokens, vec!["o=", "s="]);
        assert_eq!(parser.session_description.unwrap().time_active(), Some("0 0"));
    }

    #[test]
    fn test_one_description_per_format() {
        let sdp = "v=0\r\nc=IN IP4 192.0.2.1\r\nt=0 0\r\n\
m=video 40000 RTP/AVP 96 97\r\na=rtpmap:96 H263-2000/90000\r\na=rtpmap:97 H264/90000\r\na=sendrecv\r\n\
m=audio 49170 RTP/AVP 0\r\n";
        let parser = SdpParser::parse(sdp.as_bytes()).unwrap();

        let payloads: Vec<_> = parser
            .media_descriptions()
            .iter()
            .map(|m| (m.name.as_str(), m.payload_type))
            .collect();
        assert_eq!(payloads, vec![("video", Some(96)), ("video", Some(97)), ("audio", Some(0))]);
        assert_eq!(parser.media_descriptions_named("video").count(), 2);

        let h264 = &parser.media_descriptions()[1];
        assert_eq!(h264.port, 40000);
        assert_eq!(
            h264.media_attributes,
            vec![MediaAttribute::new("rtpmap", "97 H264/90000"), MediaAttribute::new("sendrecv", "")]
        );
    }

    #[test]
    fn test_missing_version() {
        let parser = SdpParser::parse(b"o=- 0 0 IN IP4 1.2.3.4\r\n").unwrap();
        assert!(parser.session_description.is_none());
        assert!(parser.media_descriptions().is_empty());
        assert_eq!(parser.missing_tokens, vec!["v="]);
    }

    #[test]
    fn test_media_connection_mandatory_without_session_connection() {
        let sdp = "v=0\r\no=- 1 1 IN IP4 h\r\ns=-\r\nt=0 0\r\nm=audio 4000 RTP/AVP 8\r\na=sendrecv\r\n";
        let parser = SdpParser::parse(sdp.as_bytes()).unwrap();
        assert_eq!(parser.missing_tokens, vec!["c="]);
        assert!(!parser.is_complete());
        assert_eq!(parser.media_descriptions()[0].media_attribute("sendrecv").map(|a| a.value.as_str()), Some(""));
    }

    #[test]
    fn test_session_connection_is_inherited() {
        let sdp = "v=0\r\no=- 1 1 IN IP4 h\r\ns=-\r\nc=IN IP4 10.0.0.1\r\nt=0 0\r\nm=audio 4000 RTP/AVP 8\r\n";
        let parser = SdpParser::parse(sdp.as_bytes()).unwrap();
        assert!(parser.is_complete());
        let media = &parser.media_descriptions()[0];
        assert_eq!(media.connection_info, None);
        assert_eq!(parser.connection_info(media), Some("IN IP4 10.0.0.1"));
    }

    #[test]
    fn test_unexpected_line_stops_parsing() {
        let sdp = "v=0\r\no=- 1 1 IN IP4 h\r\ns=-\r\nt=0 0\r\nx=unknown\r\nm=audio 4000 RTP/AVP 8\r\n";
        let parser = SdpParser::parse(sdp.as_bytes()).unwrap();
        assert!(parser.media_descriptions().is_empty());
    }

    #[test]
    fn test_malformed_media_line_is_an_error() {
        let sdp = "v=0\r\nt=0 0\r\nm=audio port RTP/AVP 0\r\n";
        assert!(SdpParser::parse(sdp.as_bytes()).is_err());
    }
}
