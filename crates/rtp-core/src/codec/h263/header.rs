use crate::error::Error;
use crate::Result;

/// RFC 4629 payload header
///
/// ```text
///  0                   1
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   RR    |P|V|   PLEN    |PEBIT|
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct H263RtpHeader {
    /// Reserved, 5 bits
    pub rr: u8,

    /// Picture or GOB start, the two zero bytes of the start code are omitted
    pub p: bool,

    /// A VRC byte follows the header
    pub v: bool,

    /// Length of the extra picture header, 6 bits
    pub plen: u8,

    /// Bits to ignore in the last byte of the extra picture header, 3 bits
    pub pebit: u8,
}

impl H263RtpHeader {
    pub const SIZE: usize = 2;

    pub fn new(rr: u8, p: bool, v: bool, plen: u8, pebit: u8) -> Result<Self> {
        if rr > 0x1f || plen > 0x3f || pebit > 0x07 {
            return Err(Error::InvalidHeader(format!(
                "H.263 field out of range: rr={} plen={} pebit={}",
                rr, plen, pebit
            )));
        }
        Ok(Self { rr, p, v, plen, pebit })
    }

    /// Header of a packet that starts a picture
    pub fn picture_start() -> Self {
        Self {
            p: true,
            ..Default::default()
        }
    }

    pub fn to_u16(&self) -> u16 {
        (self.rr as u16 & 0x1f) << 11
            | (self.p as u16) << 10
            | (self.v as u16) << 9
            | (self.plen as u16 & 0x3f) << 3
            | (self.pebit as u16 & 0x07)
    }

    pub fn from_u16(value: u16) -> Self {
        Self {
            rr: (value >> 11) as u8 & 0x1f,
            p: value & (1 << 10) != 0,
            v: value & (1 << 9) != 0,
            plen: (value >> 3) as u8 & 0x3f,
            pebit: value as u8 & 0x07,
        }
    }

    pub fn to_bytes(&self) -> [u8; 2] {
        self.to_u16().to_be_bytes()
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        match data {
            [high, low, ..] => Ok(Self::from_u16(u16::from_be_bytes([*high, *low]))),
            _ => Err(Error::BufferTooSmall {
                required: Self::SIZE,
                available: data.len(),
            }),
        }
    }

    /// Bytes before the picture data: this header, the VRC byte and the
    /// extra picture header
    pub fn total_len(&self) -> usize {
        Self::SIZE + self.v as usize + self.plen as usize
    }
}
