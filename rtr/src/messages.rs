// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::error::Error;
use num_enum::TryFromPrimitive;
use std::io::Read;
use std::net::{Ipv4Addr, Ipv6Addr};

/// RTR protocol version 1.
///
/// Ref: RFC 8210
pub const VERSION_1: u8 = 1;

/// RTR protocol version 2.
///
/// Ref: RFC 8210bis
pub const VERSION_2: u8 = 2;

/// Smallest PDU on the wire: a bare 8-byte header.
pub const MIN_PDU_LENGTH: u32 = 8;

/// Largest PDU the cache will frame in either direction.
pub const MAX_PDU_LENGTH: u32 = 65535;

/// Prefix PDU flag values.
///
/// Ref: RFC 8210 §5.1
pub const FLAG_WITHDRAW: u8 = 0;
pub const FLAG_ANNOUNCE: u8 = 1;

pub fn version_supported(version: u8) -> bool {
    version == VERSION_1 || version == VERSION_2
}

/// RTR PDU types.
///
/// Ref: RFC 8210 §5
#[derive(Debug, Eq, PartialEq, TryFromPrimitive, Copy, Clone)]
#[repr(u8)]
pub enum PduType {
    /// Cache to router: a new serial is available.
    ///
    /// RFC 8210 §5.2
    SerialNotify = 0,

    /// Router to cache: send the diff since this serial.
    ///
    /// RFC 8210 §5.3
    SerialQuery = 1,

    /// Router to cache: send the complete data set.
    ///
    /// RFC 8210 §5.4
    ResetQuery = 2,

    /// Cache to router: response data follows.
    ///
    /// RFC 8210 §5.5
    CacheResponse = 3,

    /// One IPv4 origin authorization record.
    ///
    /// RFC 8210 §5.6
    Ipv4Prefix = 4,

    /// One IPv6 origin authorization record.
    ///
    /// RFC 8210 §5.7
    Ipv6Prefix = 6,

    /// Cache to router: response complete, carries the timer parameters.
    ///
    /// RFC 8210 §5.8
    EndOfData = 7,

    /// Cache to router: cannot serve an incremental update, start over.
    ///
    /// RFC 8210 §5.9
    CacheReset = 8,

    /// BGPsec router key material.
    ///
    /// RFC 8210 §5.10
    RouterKey = 9,

    /// Diagnostic report, last PDU before the sender closes the transport.
    ///
    /// RFC 8210 §5.11
    ErrorReport = 10,

    /// Provider authorization for a customer ASN.
    ///
    /// RFC 8210bis §5.12
    Aspa = 11,
}

/// Error Report error codes. The cache only ever emits a subset of these,
/// but the full code space is enumerated so received reports can be
/// rendered.
///
/// Ref: RFC 8210 §12.4
#[derive(Debug, Eq, PartialEq, TryFromPrimitive, Copy, Clone)]
#[repr(u16)]
pub enum ErrorCode {
    CorruptData = 0,
    InternalError = 1,
    NoData = 2,
    InvalidRequest = 3,
    UnsupportedProtocolVersion = 4,
    UnsupportedPduType = 5,
    WithdrawalOfUnknownRecord = 6,
    DuplicateAnnouncement = 7,
    UnexpectedProtocolVersion = 8,
}

/// Every RTR PDU starts with the same fixed header.
///
/// ```text
/// 0          8          16         24        31
/// .-------------------------------------------.
/// | Protocol |   PDU    |                     |
/// | Version  |   Type   |  Session / Reserved |
/// +-------------------------------------------+
/// |                                           |
/// |                  Length                   |
/// |                                           |
/// `-------------------------------------------'
/// ```
///
/// The 16-bit field after the type byte is overloaded per PDU type: session
/// id, error code, flags, or zero. `length` counts the whole PDU including
/// the header and must be within [8, 65535].
///
/// Ref: RFC 8210 §5.1
#[derive(Debug, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub typ: u8,
    pub reserved: u16,
    pub length: u32,
}

impl Header {
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = vec![self.version, self.typ];
        buf.extend_from_slice(&self.reserved.to_be_bytes());
        buf.extend_from_slice(&self.length.to_be_bytes());
        buf
    }

    pub fn from_wire(buf: &[u8]) -> Result<Header, Error> {
        if buf.len() < 8 {
            return Err(Error::TooSmall("header".into()));
        }
        let length = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if !(MIN_PDU_LENGTH..=MAX_PDU_LENGTH).contains(&length) {
            return Err(Error::InvalidLength(length));
        }
        Ok(Header {
            version: buf[0],
            typ: buf[1],
            reserved: u16::from_be_bytes([buf[2], buf[3]]),
            length,
        })
    }
}

/// Announces that the cache has new data available at `serial`. Pushed to
/// every connected router when a refresh installs a new generation.
///
/// ```text
/// 0          8          16         24        31
/// .-------------------------------------------.
/// | Protocol |   PDU    |                     |
/// | Version  |   Type   |     Session ID      |
/// |    X     |    0     |                     |
/// +-------------------------------------------+
/// |                                           |
/// |                Length=12                  |
/// |                                           |
/// +-------------------------------------------+
/// |                                           |
/// |               Serial Number               |
/// |                                           |
/// `-------------------------------------------'
/// ```
///
/// Ref: RFC 8210 §5.2
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SerialNotifyPdu {
    pub version: u8,
    pub session: u16,
    pub serial: u32,
}

impl SerialNotifyPdu {
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = vec![self.version, PduType::SerialNotify as u8];
        buf.extend_from_slice(&self.session.to_be_bytes());
        buf.extend_from_slice(&12u32.to_be_bytes());
        buf.extend_from_slice(&self.serial.to_be_bytes());
        buf
    }
}

/// A router asking for the changes since the serial it last saw.
///
/// Same layout as [`SerialNotifyPdu`] with type 1.
///
/// Ref: RFC 8210 §5.3
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SerialQueryPdu {
    pub version: u8,
    pub session: u16,
    pub serial: u32,
}

impl SerialQueryPdu {
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = vec![self.version, PduType::SerialQuery as u8];
        buf.extend_from_slice(&self.session.to_be_bytes());
        buf.extend_from_slice(&12u32.to_be_bytes());
        buf.extend_from_slice(&self.serial.to_be_bytes());
        buf
    }

    fn from_wire(header: &Header, body: &[u8]) -> Result<SerialQueryPdu, Error> {
        if header.length != 12 {
            return Err(Error::BadLength {
                expected: 12,
                found: header.length,
            });
        }
        Ok(SerialQueryPdu {
            version: header.version,
            session: header.reserved,
            serial: u32::from_be_bytes([body[0], body[1], body[2], body[3]]),
        })
    }
}

/// A router asking for the complete current data set.
///
/// ```text
/// 0          8          16         24        31
/// .-------------------------------------------.
/// | Protocol |   PDU    |                     |
/// | Version  |   Type   |         zero        |
/// |    X     |    2     |                     |
/// +-------------------------------------------+
/// |                                           |
/// |                 Length=8                  |
/// |                                           |
/// `-------------------------------------------'
/// ```
///
/// Ref: RFC 8210 §5.4
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ResetQueryPdu {
    pub version: u8,
}

impl ResetQueryPdu {
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = vec![self.version, PduType::ResetQuery as u8, 0, 0];
        buf.extend_from_slice(&8u32.to_be_bytes());
        buf
    }

    fn from_wire(header: &Header) -> Result<ResetQueryPdu, Error> {
        if header.length != 8 {
            return Err(Error::BadLength {
                expected: 8,
                found: header.length,
            });
        }
        Ok(ResetQueryPdu {
            version: header.version,
        })
    }
}

/// Opens a cache response to a query. Prefix PDUs, if any, follow.
///
/// Ref: RFC 8210 §5.5
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CacheResponsePdu {
    pub version: u8,
    pub session: u16,
}

impl CacheResponsePdu {
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = vec![self.version, PduType::CacheResponse as u8];
        buf.extend_from_slice(&self.session.to_be_bytes());
        buf.extend_from_slice(&8u32.to_be_bytes());
        buf
    }
}

/// One IPv4 origin authorization.
///
/// ```text
/// 0          8          16         24        31
/// .-------------------------------------------.
/// | Protocol |   PDU    |                     |
/// | Version  |   Type   |         zero        |
/// |    X     |    4     |                     |
/// +-------------------------------------------+
/// |                                           |
/// |                 Length=20                 |
/// |                                           |
/// +-------------------------------------------+
/// |          |  Prefix  |   Max    |          |
/// |  Flags   |  Length  |  Length  |   zero   |
/// |          |   0..32  |   0..32  |          |
/// +-------------------------------------------+
/// |                                           |
/// |                IPv4 Prefix                |
/// |                                           |
/// +-------------------------------------------+
/// |                                           |
/// |         Autonomous System Number          |
/// |                                           |
/// `-------------------------------------------'
/// ```
///
/// Ref: RFC 8210 §5.6
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Ipv4PrefixPdu {
    pub version: u8,
    pub flags: u8,
    pub prefix_len: u8,
    pub max_len: u8,
    pub prefix: Ipv4Addr,
    pub asn: u32,
}

impl Ipv4PrefixPdu {
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = vec![self.version, PduType::Ipv4Prefix as u8, 0, 0];
        buf.extend_from_slice(&20u32.to_be_bytes());
        buf.push(self.flags);
        buf.push(self.prefix_len);
        buf.push(self.max_len);
        buf.push(0);
        buf.extend_from_slice(&self.prefix.octets());
        buf.extend_from_slice(&self.asn.to_be_bytes());
        buf
    }
}

/// One IPv6 origin authorization. Same shape as [`Ipv4PrefixPdu`] with a
/// 16-byte address field.
///
/// Ref: RFC 8210 §5.7
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Ipv6PrefixPdu {
    pub version: u8,
    pub flags: u8,
    pub prefix_len: u8,
    pub max_len: u8,
    pub prefix: Ipv6Addr,
    pub asn: u32,
}

impl Ipv6PrefixPdu {
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = vec![self.version, PduType::Ipv6Prefix as u8, 0, 0];
        buf.extend_from_slice(&32u32.to_be_bytes());
        buf.push(self.flags);
        buf.push(self.prefix_len);
        buf.push(self.max_len);
        buf.push(0);
        buf.extend_from_slice(&self.prefix.octets());
        buf.extend_from_slice(&self.asn.to_be_bytes());
        buf
    }
}

/// Closes a cache response and hands the router its timer parameters.
///
/// ```text
/// 0          8          16         24        31
/// .-------------------------------------------.
/// | Protocol |   PDU    |                     |
/// | Version  |   Type   |     Session ID      |
/// |    X     |    7     |                     |
/// +-------------------------------------------+
/// |                                           |
/// |                 Length=24                 |
/// |                                           |
/// +-------------------------------------------+
/// |                                           |
/// |               Serial Number               |
/// |                                           |
/// +-------------------------------------------+
/// |                                           |
/// |              Refresh Interval             |
/// |                                           |
/// +-------------------------------------------+
/// |                                           |
/// |               Retry Interval              |
/// |                                           |
/// +-------------------------------------------+
/// |                                           |
/// |              Expire Interval              |
/// |                                           |
/// `-------------------------------------------'
/// ```
///
/// Ref: RFC 8210 §5.8
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct EndOfDataPdu {
    pub version: u8,
    pub session: u16,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
}

impl EndOfDataPdu {
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = vec![self.version, PduType::EndOfData as u8];
        buf.extend_from_slice(&self.session.to_be_bytes());
        buf.extend_from_slice(&24u32.to_be_bytes());
        buf.extend_from_slice(&self.serial.to_be_bytes());
        buf.extend_from_slice(&self.refresh.to_be_bytes());
        buf.extend_from_slice(&self.retry.to_be_bytes());
        buf.extend_from_slice(&self.expire.to_be_bytes());
        buf
    }
}

/// Tells the router the cache cannot provide an incremental update and the
/// router must fall back to a Reset Query.
///
/// Ref: RFC 8210 §5.9
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CacheResetPdu {
    pub version: u8,
}

impl CacheResetPdu {
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = vec![self.version, PduType::CacheReset as u8, 0, 0];
        buf.extend_from_slice(&8u32.to_be_bytes());
        buf
    }
}

/// BGPsec router key material. The cache can frame these but never
/// populates them; upstream validator output carries no key data yet.
///
/// ```text
/// 0          8          16         24        31
/// .-------------------------------------------.
/// | Protocol |   PDU    |                     |
/// | Version  |   Type   |     Session ID      |
/// |    X     |    9     |                     |
/// +-------------------------------------------+
/// |                                           |
/// |                  Length                   |
/// |                                           |
/// +-------------------------------------------+
/// |                                           |
/// +---                                     ---+
/// |          Subject Key Identifier           |
/// +---                                     ---+
/// |                (20 octets)                |
/// +---                                     ---+
/// |                                           |
/// +-------------------------------------------+
/// |                                           |
/// |                 AS Number                 |
/// |                                           |
/// +-------------------------------------------+
/// |                                           |
/// ~          Subject Public Key Info          ~
/// |                                           |
/// `-------------------------------------------'
/// ```
///
/// Ref: RFC 8210 §5.10
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RouterKeyPdu {
    pub version: u8,
    pub session: u16,
    pub ski: [u8; 20],
    pub asn: u32,
    pub spki: Vec<u8>,
}

impl RouterKeyPdu {
    pub fn to_wire(&self) -> Result<Vec<u8>, Error> {
        let length = 32 + self.spki.len();
        if length > MAX_PDU_LENGTH as usize {
            return Err(Error::TooLarge("router key spki".into()));
        }
        let mut buf = vec![self.version, PduType::RouterKey as u8];
        buf.extend_from_slice(&self.session.to_be_bytes());
        buf.extend_from_slice(&(length as u32).to_be_bytes());
        buf.extend_from_slice(&self.ski);
        buf.extend_from_slice(&self.asn.to_be_bytes());
        buf.extend_from_slice(&self.spki);
        Ok(buf)
    }
}

/// Diagnostic report. The sender must close the transport after emitting
/// one, and must never answer a received report with another.
///
/// ```text
/// 0          8          16         24        31
/// .-------------------------------------------.
/// | Protocol |   PDU    |                     |
/// | Version  |   Type   |     Error Code      |
/// |    X     |    10    |                     |
/// +-------------------------------------------+
/// |                                           |
/// |                  Length                   |
/// |                                           |
/// +-------------------------------------------+
/// |                                           |
/// |       Length of Encapsulated PDU          |
/// |                                           |
/// +-------------------------------------------+
/// |                                           |
/// ~               Erroneous PDU               ~
/// |                                           |
/// +-------------------------------------------+
/// |                                           |
/// |           Length of Error Text            |
/// |                                           |
/// +-------------------------------------------+
/// |                                           |
/// ~     Arbitrary Text of Error Diagnostic    ~
/// |                                           |
/// `-------------------------------------------'
/// ```
///
/// The text is kept as raw bytes; peers are not obliged to send UTF-8.
///
/// Ref: RFC 8210 §5.11
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ErrorReportPdu {
    pub version: u8,
    pub code: u16,
    pub pdu: Vec<u8>,
    pub text: Vec<u8>,
}

impl ErrorReportPdu {
    pub fn new(version: u8, code: ErrorCode, text: &str) -> ErrorReportPdu {
        ErrorReportPdu {
            version,
            code: code as u16,
            pdu: Vec::new(),
            text: text.as_bytes().to_vec(),
        }
    }

    pub fn to_wire(&self) -> Result<Vec<u8>, Error> {
        let length = 16 + self.pdu.len() + self.text.len();
        if length > MAX_PDU_LENGTH as usize {
            return Err(Error::TooLarge("error report".into()));
        }
        let mut buf = vec![self.version, PduType::ErrorReport as u8];
        buf.extend_from_slice(&self.code.to_be_bytes());
        buf.extend_from_slice(&(length as u32).to_be_bytes());
        buf.extend_from_slice(&(self.pdu.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.pdu);
        buf.extend_from_slice(&(self.text.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.text);
        Ok(buf)
    }

    fn from_wire(header: &Header, body: &[u8]) -> Result<ErrorReportPdu, Error> {
        if body.len() < 8 {
            return Err(Error::TooSmall("error report".into()));
        }
        let pdu_len =
            u32::from_be_bytes([body[0], body[1], body[2], body[3]]) as usize;
        if pdu_len > body.len() || 4 + pdu_len + 4 > body.len() {
            return Err(Error::TooSmall("error report enclosed pdu".into()));
        }
        let text_at = 4 + pdu_len;
        let text_len = u32::from_be_bytes([
            body[text_at],
            body[text_at + 1],
            body[text_at + 2],
            body[text_at + 3],
        ]) as usize;
        if text_len > body.len() || text_at + 4 + text_len > body.len() {
            return Err(Error::TooSmall("error report text".into()));
        }
        Ok(ErrorReportPdu {
            version: header.version,
            code: header.reserved,
            pdu: body[4..4 + pdu_len].to_vec(),
            text: body[text_at + 4..text_at + 4 + text_len].to_vec(),
        })
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.text).into_owned()
    }
}

/// Provider authorization for a customer ASN. Version 2 only. Like
/// [`RouterKeyPdu`] this is emission-capable but never populated by the
/// cache core.
///
/// ```text
/// 0          8          16         24        31
/// .-------------------------------------------.
/// | Protocol |   PDU    |          |          |
/// | Version  |   Type   |   Flags  |   zero   |
/// |    2     |    11    |          |          |
/// +-------------------------------------------+
/// |                                           |
/// |                  Length                   |
/// |                                           |
/// +-------------------------------------------+
/// |                                           |
/// |    Customer Autonomous System Number      |
/// |                                           |
/// +-------------------------------------------+
/// |                                           |
/// ~    Provider Autonomous System Numbers     ~
/// |                                           |
/// `-------------------------------------------'
/// ```
///
/// Ref: RFC 8210bis §5.12
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct AspaPdu {
    pub version: u8,
    pub flags: u8,
    pub customer_asn: u32,
    pub provider_asns: Vec<u32>,
}

impl AspaPdu {
    pub fn to_wire(&self) -> Result<Vec<u8>, Error> {
        let length = 12 + 4 * self.provider_asns.len();
        if length > MAX_PDU_LENGTH as usize {
            return Err(Error::TooLarge("aspa provider list".into()));
        }
        let mut buf = vec![self.version, PduType::Aspa as u8, self.flags, 0];
        buf.extend_from_slice(&(length as u32).to_be_bytes());
        buf.extend_from_slice(&self.customer_asn.to_be_bytes());
        for pasn in &self.provider_asns {
            buf.extend_from_slice(&pasn.to_be_bytes());
        }
        Ok(buf)
    }
}

/// A decoded PDU. The decoder only ever produces the three variants a
/// cache accepts from a router; the rest exist for emission.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Pdu {
    SerialNotify(SerialNotifyPdu),
    SerialQuery(SerialQueryPdu),
    ResetQuery(ResetQueryPdu),
    CacheResponse(CacheResponsePdu),
    Ipv4Prefix(Ipv4PrefixPdu),
    Ipv6Prefix(Ipv6PrefixPdu),
    EndOfData(EndOfDataPdu),
    CacheReset(CacheResetPdu),
    RouterKey(RouterKeyPdu),
    ErrorReport(ErrorReportPdu),
    Aspa(AspaPdu),
}

impl Pdu {
    pub fn version(&self) -> u8 {
        match self {
            Pdu::SerialNotify(p) => p.version,
            Pdu::SerialQuery(p) => p.version,
            Pdu::ResetQuery(p) => p.version,
            Pdu::CacheResponse(p) => p.version,
            Pdu::Ipv4Prefix(p) => p.version,
            Pdu::Ipv6Prefix(p) => p.version,
            Pdu::EndOfData(p) => p.version,
            Pdu::CacheReset(p) => p.version,
            Pdu::RouterKey(p) => p.version,
            Pdu::ErrorReport(p) => p.version,
            Pdu::Aspa(p) => p.version,
        }
    }

    pub fn typ(&self) -> PduType {
        match self {
            Pdu::SerialNotify(_) => PduType::SerialNotify,
            Pdu::SerialQuery(_) => PduType::SerialQuery,
            Pdu::ResetQuery(_) => PduType::ResetQuery,
            Pdu::CacheResponse(_) => PduType::CacheResponse,
            Pdu::Ipv4Prefix(_) => PduType::Ipv4Prefix,
            Pdu::Ipv6Prefix(_) => PduType::Ipv6Prefix,
            Pdu::EndOfData(_) => PduType::EndOfData,
            Pdu::CacheReset(_) => PduType::CacheReset,
            Pdu::RouterKey(_) => PduType::RouterKey,
            Pdu::ErrorReport(_) => PduType::ErrorReport,
            Pdu::Aspa(_) => PduType::Aspa,
        }
    }

    pub fn to_wire(&self) -> Result<Vec<u8>, Error> {
        match self {
            Pdu::SerialNotify(p) => Ok(p.to_wire()),
            Pdu::SerialQuery(p) => Ok(p.to_wire()),
            Pdu::ResetQuery(p) => Ok(p.to_wire()),
            Pdu::CacheResponse(p) => Ok(p.to_wire()),
            Pdu::Ipv4Prefix(p) => Ok(p.to_wire()),
            Pdu::Ipv6Prefix(p) => Ok(p.to_wire()),
            Pdu::EndOfData(p) => Ok(p.to_wire()),
            Pdu::CacheReset(p) => Ok(p.to_wire()),
            Pdu::RouterKey(p) => p.to_wire(),
            Pdu::ErrorReport(p) => p.to_wire(),
            Pdu::Aspa(p) => p.to_wire(),
        }
    }
}

/// Read one framed PDU off the stream.
///
/// Reads the 8-byte header, validates the length bounds, reads the
/// remaining body, and dispatches on the type byte. Only Serial Query,
/// Reset Query, and Error Report are accepted; those are the PDUs a
/// router may legitimately send a cache. Every path is bounds-checked so
/// arbitrary input can never panic the decoder.
pub fn read_pdu<R: Read>(r: &mut R) -> Result<Pdu, Error> {
    let mut hdr = [0u8; 8];
    read_exact(r, &mut hdr)?;
    let header = Header::from_wire(&hdr)?;

    let mut body = vec![0u8; (header.length - MIN_PDU_LENGTH) as usize];
    read_exact(r, &mut body)?;

    match PduType::try_from(header.typ) {
        Ok(PduType::SerialQuery) => {
            Ok(Pdu::SerialQuery(SerialQueryPdu::from_wire(&header, &body)?))
        }
        Ok(PduType::ResetQuery) => {
            Ok(Pdu::ResetQuery(ResetQueryPdu::from_wire(&header)?))
        }
        Ok(PduType::ErrorReport) => {
            Ok(Pdu::ErrorReport(ErrorReportPdu::from_wire(&header, &body)?))
        }
        _ => Err(Error::UnsupportedPduType {
            typ: header.typ,
            version: header.version,
        }),
    }
}

fn read_exact<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<(), Error> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Disconnected
        } else {
            Error::Io(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use pretty_hex::*;

    fn decode(buf: &[u8]) -> Result<Pdu, Error> {
        read_pdu(&mut &buf[..])
    }

    #[test]
    fn header_round_trip() {
        let h0 = Header {
            version: VERSION_2,
            typ: PduType::SerialQuery as u8,
            reserved: 0x1234,
            length: 12,
        };
        let buf = h0.to_wire();
        println!("buf: {}", buf.hex_dump());
        assert_eq!(buf, vec![0x02, 0x01, 0x12, 0x34, 0x00, 0x00, 0x00, 0x0C]);
        let h1 = Header::from_wire(&buf).expect("header from wire");
        assert_eq!(h0, h1);
    }

    #[test]
    fn cache_response_wire() {
        let p = CacheResponsePdu {
            version: VERSION_2,
            session: 0x1234,
        };
        let buf = p.to_wire();
        println!("buf: {}", buf.hex_dump());
        assert_eq!(buf, vec![0x02, 0x03, 0x12, 0x34, 0x00, 0x00, 0x00, 0x08]);
    }

    #[test]
    fn end_of_data_wire() {
        let p = EndOfDataPdu {
            version: VERSION_2,
            session: 0x1234,
            serial: 1,
            refresh: 3600,
            retry: 600,
            expire: 7200,
        };
        assert_eq!(
            p.to_wire(),
            vec![
                0x02, 0x07, 0x12, 0x34, 0x00, 0x00, 0x00, 0x18, // header
                0x00, 0x00, 0x00, 0x01, // serial
                0x00, 0x00, 0x0E, 0x10, // refresh
                0x00, 0x00, 0x02, 0x58, // retry
                0x00, 0x00, 0x1C, 0x20, // expire
            ]
        );
    }

    #[test]
    fn ipv4_prefix_wire() {
        let p = Ipv4PrefixPdu {
            version: VERSION_2,
            flags: FLAG_ANNOUNCE,
            prefix_len: 24,
            max_len: 24,
            prefix: "10.0.0.0".parse().unwrap(),
            asn: 65001,
        };
        assert_eq!(
            p.to_wire(),
            vec![
                0x02, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x14, // header
                0x01, 0x18, 0x18, 0x00, // flags, plen, maxlen, zero
                0x0A, 0x00, 0x00, 0x00, // 10.0.0.0
                0x00, 0x00, 0xFD, 0xE9, // asn 65001
            ]
        );
    }

    #[test]
    fn ipv6_prefix_wire() {
        let p = Ipv6PrefixPdu {
            version: VERSION_1,
            flags: FLAG_WITHDRAW,
            prefix_len: 32,
            max_len: 48,
            prefix: "2001:db8::".parse().unwrap(),
            asn: 64512,
        };
        let buf = p.to_wire();
        println!("buf: {}", buf.hex_dump());
        assert_eq!(buf.len(), 32);
        assert_eq!(&buf[..8], &[0x01, 0x06, 0x00, 0x00, 0x00, 0x00, 0x00, 0x20]);
        assert_eq!(&buf[8..12], &[0x00, 0x20, 0x30, 0x00]);
        assert_eq!(&buf[12..14], &[0x20, 0x01]);
        assert_eq!(&buf[28..32], &[0x00, 0x00, 0xFC, 0x00]);
    }

    #[test]
    fn serial_notify_wire() {
        let p = SerialNotifyPdu {
            version: VERSION_2,
            session: 0x1234,
            serial: 2,
        };
        assert_eq!(
            p.to_wire(),
            vec![
                0x02, 0x00, 0x12, 0x34, 0x00, 0x00, 0x00, 0x0C, //
                0x00, 0x00, 0x00, 0x02,
            ]
        );
    }

    #[test]
    fn cache_reset_wire() {
        let p = CacheResetPdu { version: VERSION_2 };
        assert_eq!(p.to_wire(), vec![0x02, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08]);
    }

    #[test]
    fn serial_query_round_trip() {
        let p0 = SerialQueryPdu {
            version: VERSION_2,
            session: 0x1234,
            serial: 0x01020304,
        };
        let buf = p0.to_wire();
        println!("buf: {}", buf.hex_dump());
        let p1 = decode(&buf).expect("serial query from wire");
        assert_eq!(Pdu::SerialQuery(p0), p1);
        // the tagged dispatch re-encodes to the same bytes
        assert_eq!(p1.to_wire().expect("re-encode"), buf);
    }

    #[test]
    fn reset_query_round_trip() {
        let p0 = ResetQueryPdu { version: VERSION_1 };
        let buf = p0.to_wire();
        let p1 = decode(&buf).expect("reset query from wire");
        assert_eq!(Pdu::ResetQuery(p0), p1);
    }

    #[test]
    fn error_report_round_trip() {
        let p0 = ErrorReportPdu {
            version: VERSION_2,
            code: ErrorCode::CorruptData as u16,
            pdu: vec![0x02, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08],
            text: b"length out of range".to_vec(),
        };
        let buf = p0.to_wire().expect("error report to wire");
        println!("buf: {}", buf.hex_dump());
        let p1 = decode(&buf).expect("error report from wire");
        assert_eq!(Pdu::ErrorReport(p0), p1);
    }

    #[test]
    fn error_report_empty_round_trip() {
        let p0 = ErrorReportPdu::new(
            VERSION_2,
            ErrorCode::UnsupportedProtocolVersion,
            "",
        );
        let buf = p0.to_wire().expect("error report to wire");
        assert_eq!(buf.len(), 16);
        let p1 = decode(&buf).expect("error report from wire");
        assert_eq!(Pdu::ErrorReport(p0), p1);
    }

    #[test]
    fn router_key_wire() {
        let p = RouterKeyPdu {
            version: VERSION_2,
            session: 0x1234,
            ski: [0xAB; 20],
            asn: 64496,
            spki: vec![0x30, 0x59, 0x01],
        };
        let buf = p.to_wire().expect("router key to wire");
        assert_eq!(buf.len(), 35);
        assert_eq!(&buf[..8], &[0x02, 0x09, 0x12, 0x34, 0x00, 0x00, 0x00, 0x23]);
        assert_eq!(&buf[8..28], &[0xAB; 20]);
        assert_eq!(&buf[28..32], &[0x00, 0x00, 0xFB, 0xF0]);
        assert_eq!(&buf[32..], &[0x30, 0x59, 0x01]);
    }

    #[test]
    fn aspa_wire() {
        let p = AspaPdu {
            version: VERSION_2,
            flags: FLAG_ANNOUNCE,
            customer_asn: 64500,
            provider_asns: vec![64501, 64502],
        };
        let buf = p.to_wire().expect("aspa to wire");
        assert_eq!(buf.len(), 20);
        assert_eq!(&buf[..8], &[0x02, 0x0B, 0x01, 0x00, 0x00, 0x00, 0x00, 0x14]);
        assert_eq!(&buf[8..12], &[0x00, 0x00, 0xFB, 0xF4]);
        assert_eq!(&buf[12..16], &[0x00, 0x00, 0xFB, 0xF5]);
    }

    #[test]
    fn length_below_minimum_rejected() {
        let buf = [0x00, 0x63, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04];
        match decode(&buf) {
            Err(Error::InvalidLength(4)) => {}
            other => panic!("expected invalid length, got {other:?}"),
        }
    }

    #[test]
    fn truncated_header_rejected() {
        let buf = [0x02, 0x02, 0x00];
        match decode(&buf) {
            Err(Error::Disconnected) => {}
            other => panic!("expected disconnected, got {other:?}"),
        }
    }

    #[test]
    fn truncated_body_rejected() {
        // Claims 12 bytes, delivers 10.
        let buf = [
            0x02, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x00, 0x00,
        ];
        match decode(&buf) {
            Err(Error::Disconnected) => {}
            other => panic!("expected disconnected, got {other:?}"),
        }
    }

    #[test]
    fn wrong_fixed_size_rejected() {
        // Reset query with a 12-byte length.
        let buf = [
            0x02, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x00, 0x00, 0x00,
            0x00,
        ];
        match decode(&buf) {
            Err(Error::BadLength {
                expected: 8,
                found: 12,
            }) => {}
            other => panic!("expected bad length, got {other:?}"),
        }
    }

    #[test]
    fn unaccepted_type_rejected() {
        // A router must never send the cache a Cache Response.
        let buf = [0x02, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08];
        match decode(&buf) {
            Err(Error::UnsupportedPduType { typ: 3, version: 2 }) => {}
            other => panic!("expected unsupported type, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_rejected() {
        let buf = [0x02, 0x63, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08];
        match decode(&buf) {
            Err(Error::UnsupportedPduType {
                typ: 0x63,
                version: 2,
            }) => {}
            other => panic!("expected unsupported type, got {other:?}"),
        }
    }

    #[test]
    fn error_report_bad_enclosed_length_rejected() {
        // pdu_len claims 0xffff inside a 16-byte report.
        let buf = [
            0x02, 0x0A, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, //
            0x00, 0x00, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00,
        ];
        match decode(&buf) {
            Err(Error::TooSmall(_)) => {}
            other => panic!("expected too small, got {other:?}"),
        }
    }

    #[test]
    fn error_report_bad_text_length_rejected() {
        let buf = [
            0x02, 0x0A, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, //
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x09,
        ];
        match decode(&buf) {
            Err(Error::TooSmall(_)) => {}
            other => panic!("expected too small, got {other:?}"),
        }
    }

    #[test]
    fn version_preserved_even_when_unsupported() {
        // The decoder does not judge versions; the session layer does.
        let buf = [0x09, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08];
        match decode(&buf) {
            Ok(Pdu::ResetQuery(p)) => assert_eq!(p.version, 9),
            other => panic!("expected reset query, got {other:?}"),
        }
    }
}
