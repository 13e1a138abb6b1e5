// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Property-based tests for the PDU wire format.
//!
//! The decoder sits directly on the network and must hold two invariants
//! for any input whatsoever: it never panics, and for every PDU it can
//! emit and accept, decode is the exact inverse of encode.

use crate::messages::{
    self, ErrorReportPdu, Pdu, ResetQueryPdu, SerialQueryPdu,
};
use proptest::prelude::*;

proptest! {
    /// Property: arbitrary bytes never panic the decoder.
    #[test]
    fn prop_decoder_never_panics(
        data in proptest::collection::vec(any::<u8>(), 0..128),
    ) {
        let _ = messages::read_pdu(&mut &data[..]);
    }

    /// Property: a frame with a self-consistent length field never
    /// panics the decoder either. This forces coverage past the header
    /// checks and into the per-type parsers.
    #[test]
    fn prop_decoder_never_panics_on_framed_input(
        version in any::<u8>(),
        typ in any::<u8>(),
        reserved in any::<u16>(),
        body in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut buf = vec![version, typ];
        buf.extend_from_slice(&reserved.to_be_bytes());
        buf.extend_from_slice(&((body.len() + 8) as u32).to_be_bytes());
        buf.extend_from_slice(&body);
        let _ = messages::read_pdu(&mut &buf[..]);
    }

    /// Property: serial query round-trip is identity.
    #[test]
    fn prop_serial_query_roundtrip(
        version in any::<u8>(),
        session in any::<u16>(),
        serial in any::<u32>(),
    ) {
        let p = SerialQueryPdu { version, session, serial };
        let buf = p.to_wire();
        let decoded = messages::read_pdu(&mut &buf[..])
            .expect("serial query should decode");
        prop_assert_eq!(Pdu::SerialQuery(p), decoded);
    }

    /// Property: reset query round-trip is identity.
    #[test]
    fn prop_reset_query_roundtrip(version in any::<u8>()) {
        let p = ResetQueryPdu { version };
        let buf = p.to_wire();
        let decoded = messages::read_pdu(&mut &buf[..])
            .expect("reset query should decode");
        prop_assert_eq!(Pdu::ResetQuery(p), decoded);
    }

    /// Property: error report round-trip is identity, for any enclosed
    /// PDU bytes and any (not necessarily UTF-8) text.
    #[test]
    fn prop_error_report_roundtrip(
        version in any::<u8>(),
        code in any::<u16>(),
        pdu in proptest::collection::vec(any::<u8>(), 0..32),
        text in proptest::collection::vec(any::<u8>(), 0..32),
    ) {
        let p = ErrorReportPdu { version, code, pdu, text };
        let buf = p.to_wire().expect("error report should encode");
        let decoded = messages::read_pdu(&mut &buf[..])
            .expect("error report should decode");
        prop_assert_eq!(Pdu::ErrorReport(p), decoded);
    }
}
