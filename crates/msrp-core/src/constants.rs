//! MSRP protocol constants (RFC 4975).

pub const MSRP_PROTOCOL: &str = "MSRP";

pub const METHOD_SEND: &str = "SEND";
pub const METHOD_REPORT: &str = "REPORT";

pub const HEADER_TO_PATH: &str = "To-Path";
pub const HEADER_FROM_PATH: &str = "From-Path";
pub const HEADER_MESSAGE_ID: &str = "Message-ID";
pub const HEADER_BYTE_RANGE: &str = "Byte-Range";
pub const HEADER_FAILURE_REPORT: &str = "Failure-Report";
pub const HEADER_SUCCESS_REPORT: &str = "Success-Report";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_STATUS: &str = "Status";

pub const NEW_LINE: &str = "\r\n";

/// Seven dashes open the end-line of every chunk
pub const END_MSRP_MSG: &str = "-------";

pub const FLAG_LAST_CHUNK: u8 = b'$';
pub const FLAG_MORE_CHUNK: u8 = b'+';
pub const FLAG_ABORT_CHUNK: u8 = b'#';

pub const RESPONSE_OK: u16 = 200;
pub const RESPONSE_BAD_REQUEST: u16 = 400;
pub const RESPONSE_FORBIDDEN: u16 = 403;
pub const RESPONSE_TIMEOUT: u16 = 408;
pub const RESPONSE_STOP_SENDING: u16 = 413;
pub const RESPONSE_UNSUPPORTED_MEDIA: u16 = 415;
pub const RESPONSE_OUT_OF_BOUNDS: u16 = 423;
pub const RESPONSE_NO_SESSION: u16 = 481;
pub const RESPONSE_UNKNOWN_METHOD: u16 = 501;
pub const RESPONSE_WRONG_CONNECTION: u16 = 506;

pub const COMMENT_OK: &str = "OK";

/// Status header value of a positive success report
pub const STATUS_OK: &str = "000 200 OK";

/// Largest chunk body sent in one SEND
pub const CHUNK_MAX_SIZE: usize = 10 * 1024;

/// Largest chunk body accepted from a peer
pub const MAX_RECEIVED_CHUNK_SIZE: usize = 1024 * 1024;

/// Largest start or header line accepted from a peer
pub const MAX_LINE_SIZE: usize = 16 * 1024;
