use std::fmt;

use rcs_sip_core::SipMessage;

/// Identity of one SIP exchange: `callId_method_cseq`.
///
/// `_` and `%` inside the Call-ID or method are percent-escaped, so the
/// separators stay unambiguous and distinct triples never share a key. For
/// the usual Call-IDs the key reads exactly `callId_method_cseq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextKey(String);

fn escape(component: &str, out: &mut String) {
    for ch in component.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '_' => out.push_str("%5F"),
            other => out.push(other),
        }
    }
}

impl ContextKey {
    pub fn new(call_id: &str, method: &str, cseq: u32) -> Self {
        let mut key = String::with_capacity(call_id.len() + method.len() + 12);
        escape(call_id, &mut key);
        key.push('_');
        escape(method, &mut key);
        key.push('_');
        key.push_str(&cseq.to_string());
        ContextKey(key)
    }

    /// Key of the exchange a message belongs to. Responses are matched by
    /// their CSeq method, which names the request they answer.
    pub fn for_message(message: &SipMessage) -> Option<Self> {
        let call_id = message.call_id()?;
        let cseq = message.cseq()?;
        Some(Self::new(call_id, cseq.method.as_str(), cseq.seq))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
