use std::collections::VecDeque;

use tracing::warn;

/// Byte reader with token lookahead and pushback.
///
/// A token is everything up to and including the first `=`, CR or LF.
#[derive(Debug)]
pub struct TokenReader<'a> {
    data: &'a [u8],
    pos: usize,
    pushback: VecDeque<u8>,
}

impl<'a> TokenReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            pushback: VecDeque::new(),
        }
    }

    fn read_char(&mut self) -> Option<u8> {
        if let Some(ch) = self.pushback.pop_front() {
            return Some(ch);
        }
        let ch = self.data.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn has_more(&self) -> bool {
        !self.pushback.is_empty() || self.pos < self.data.len()
    }

    /// Put bytes back so the next read returns them first, in order
    pub fn unget(&mut self, bytes: &[u8]) {
        for &b in bytes.iter().rev() {
            self.pushback.push_front(b);
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.read_char() {
            if ch != b' ' && ch != b'\r' && ch != b'\n' {
                self.pushback.push_front(ch);
                break;
            }
        }
    }

    /// Consume `expected` (e.g. `"m="`) if it is the next token; otherwise
    /// leave the input untouched.
    pub fn get_token(&mut self, expected: &str) -> bool {
        self.skip_whitespace();

        let mut token = Vec::with_capacity(expected.len());
        while let Some(ch) = self.read_char() {
            token.push(ch);
            if ch == b'=' || ch == b'\r' || ch == b'\n' {
                break;
            }
        }

        if token == expected.as_bytes() {
            true
        } else {
            self.unget(&token);
            false
        }
    }

    /// Like [`get_token`](Self::get_token), but logs when a mandatory token
    /// is absent
    pub fn get_token_checked(&mut self, expected: &str, mandatory: bool) -> bool {
        let found = self.get_token(expected);
        if !found && mandatory {
            warn!(token = expected, "Mandatory SDP token missing");
        }
        found
    }

    /// Rest of the current line, without its terminator
    pub fn get_line(&mut self) -> String {
        let mut line = Vec::new();
        while let Some(ch) = self.read_char() {
            if ch == b'\r' || ch == b'\n' {
                break;
            }
            line.push(ch);
        }
        String::from_utf8_lossy(&line).into_owned()
    }

    /// Whether unread input (including pushed back bytes) remains, ignoring
    /// trailing line breaks
    pub fn at_end(&mut self) -> bool {
        self.skip_whitespace();
        !self.has_more()
    }
}
