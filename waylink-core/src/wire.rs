//! Encoding and decoding of the primitive Wayland wire types.
//!
//! Every multi-byte field is little-endian and every argument is padded to
//! a 4-byte boundary. Encoders are total: given a value they always
//! produce a well-formed, correctly padded byte string. Decoders report
//! how many bytes they consumed so callers can advance a cursor; on a
//! buffer that is too short they report [`WireError::ShortRead`] so the
//! caller can wait for more bytes instead of treating it as fatal.

use std::ffi::CString;

use crate::{pad4, Fixed, MessageHeader, ObjectId};

/// A decoding failure.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The buffer does not yet contain a complete value. Not fatal: the
    /// caller should wait for more bytes and retry.
    #[error("short read: need {needed} bytes, have {available}")]
    ShortRead { needed: usize, available: usize },
    /// The buffer contains a self-inconsistent length (e.g. a string or
    /// array length that runs past the end of the message). Fatal for the
    /// connection.
    #[error("malformed frame: {0}")]
    FrameFormat(&'static str),
}

fn require(buf: &[u8], n: usize) -> Result<(), WireError> {
    if buf.len() < n {
        Err(WireError::ShortRead {
            needed: n,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

pub fn encode_int(v: i32, out: &mut Vec<u8>) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub fn encode_uint(v: u32, out: &mut Vec<u8>) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub fn encode_fixed(v: Fixed, out: &mut Vec<u8>) {
    encode_int(v.0, out);
}

/// Encodes an object id; `None` encodes the null id (0), valid only where
/// the argument's schema allows it.
pub fn encode_object(v: Option<ObjectId>, out: &mut Vec<u8>) {
    encode_uint(v.map_or(0, ObjectId::as_u32), out);
}

pub fn encode_new_id(v: ObjectId, out: &mut Vec<u8>) {
    encode_uint(v.as_u32(), out);
}

pub fn encode_string(v: &CString, out: &mut Vec<u8>) {
    let bytes = v.to_bytes_with_nul();
    encode_uint(bytes.len() as u32, out);
    out.extend_from_slice(bytes);
    out.resize(out.len() + (pad4(bytes.len()) - bytes.len()), 0);
}

pub fn encode_array(v: &[u8], out: &mut Vec<u8>) {
    encode_uint(v.len() as u32, out);
    out.extend_from_slice(v);
    out.resize(out.len() + (pad4(v.len()) - v.len()), 0);
}

/// Encodes the inline `(interface name, version, id)` triple used by the
/// generic `new_id` argument of `wl_registry.bind`.
pub fn encode_any_new_id(iface: &CString, version: u32, id: ObjectId, out: &mut Vec<u8>) {
    encode_string(iface, out);
    encode_uint(version, out);
    encode_uint(id.as_u32(), out);
}

pub fn decode_int(buf: &[u8]) -> Result<(i32, usize), WireError> {
    require(buf, 4)?;
    Ok((i32::from_le_bytes(buf[..4].try_into().unwrap()), 4))
}

pub fn decode_uint(buf: &[u8]) -> Result<(u32, usize), WireError> {
    require(buf, 4)?;
    Ok((u32::from_le_bytes(buf[..4].try_into().unwrap()), 4))
}

pub fn decode_fixed(buf: &[u8]) -> Result<(Fixed, usize), WireError> {
    let (raw, n) = decode_int(buf)?;
    Ok((Fixed(raw), n))
}

pub fn decode_object(buf: &[u8]) -> Result<(Option<ObjectId>, usize), WireError> {
    let (raw, n) = decode_uint(buf)?;
    Ok((std::num::NonZeroU32::new(raw).map(ObjectId), n))
}

pub fn decode_new_id(buf: &[u8]) -> Result<(ObjectId, usize), WireError> {
    let (raw, n) = decode_uint(buf)?;
    let id = std::num::NonZeroU32::new(raw)
        .map(ObjectId)
        .ok_or(WireError::FrameFormat("new_id argument was null"))?;
    Ok((id, n))
}

pub fn decode_string(buf: &[u8]) -> Result<(CString, usize), WireError> {
    let (len, _) = decode_uint(buf)?;
    let len = len as usize;
    if len == 0 {
        return Err(WireError::FrameFormat("string length is zero"));
    }
    let padded = pad4(len);
    require(buf, 4 + padded)?;
    let raw = &buf[4..4 + len];
    let owned =
        CString::from_vec_with_nul(raw.to_vec()).map_err(|_| WireError::FrameFormat("string contains an internal NUL"))?;
    Ok((owned, 4 + padded))
}

pub fn decode_array(buf: &[u8]) -> Result<(Vec<u8>, usize), WireError> {
    let (len, _) = decode_uint(buf)?;
    let len = len as usize;
    let padded = pad4(len);
    require(buf, 4 + padded)?;
    Ok((buf[4..4 + len].to_vec(), 4 + padded))
}

pub fn decode_any_new_id(buf: &[u8]) -> Result<((CString, u32, ObjectId), usize), WireError> {
    let (iface, n1) = decode_string(buf)?;
    let (version, n2) = decode_uint(&buf[n1..])?;
    let (id, n3) = decode_new_id(&buf[n1 + n2..])?;
    Ok(((iface, version, id), n1 + n2 + n3))
}

pub fn encode_header(h: MessageHeader, out: &mut Vec<u8>) {
    encode_uint(h.object_id.as_u32(), out);
    encode_uint((h.size as u32) << 16 | h.opcode as u32, out);
}

pub fn decode_header(buf: &[u8]) -> Result<MessageHeader, WireError> {
    require(buf, MessageHeader::SIZE)?;
    let (object_id, _) = decode_uint(buf)?;
    let (size_and_opcode, _) = decode_uint(&buf[4..])?;
    let object_id = std::num::NonZeroU32::new(object_id)
        .map(ObjectId)
        .ok_or(WireError::FrameFormat("message header has a null object id"))?;
    Ok(MessageHeader {
        object_id,
        size: ((size_and_opcode & 0xFFFF_0000) >> 16) as u16,
        opcode: (size_and_opcode & 0x0000_FFFF) as u16,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_round_trips() {
        for v in [i32::MIN, -1, 0, 1, i32::MAX] {
            let mut buf = Vec::new();
            encode_int(v, &mut buf);
            assert_eq!(buf.len() % 4, 0);
            let (decoded, consumed) = decode_int(&buf).unwrap();
            assert_eq!(decoded, v);
            assert_eq!(consumed, buf.len());
        }
    }

    #[test]
    fn fixed_zero_and_one_point_five() {
        let mut buf = Vec::new();
        encode_fixed(Fixed::ZERO, &mut buf);
        assert_eq!(buf, [0, 0, 0, 0]);

        let mut buf = Vec::new();
        encode_fixed(Fixed::from(1.5_f64), &mut buf);
        assert_eq!(u32::from_le_bytes(buf.clone().try_into().unwrap()), 0x0000_0180);
        let (decoded, _) = decode_fixed(&buf).unwrap();
        assert_eq!(decoded.as_f64(), 1.5);
    }

    #[test]
    fn empty_string_is_eight_bytes() {
        let mut buf = Vec::new();
        encode_string(&CString::new("").unwrap(), &mut buf);
        assert_eq!(buf, [1, 0, 0, 0, 0, 0, 0, 0]);
        let (decoded, consumed) = decode_string(&buf).unwrap();
        assert_eq!(decoded, CString::new("").unwrap());
        assert_eq!(consumed, 8);
    }

    #[test]
    fn string_round_trips_and_pads() {
        for s in ["", "a", "ab", "abc", "abcd", "hello, wayland"] {
            let cs = CString::new(s).unwrap();
            let mut buf = Vec::new();
            encode_string(&cs, &mut buf);
            assert_eq!(buf.len() % 4, 0);
            let (decoded, consumed) = decode_string(&buf).unwrap();
            assert_eq!(decoded, cs);
            assert_eq!(consumed, buf.len());
        }
    }

    #[test]
    fn array_length_prefix_is_exact_no_terminator() {
        let data = vec![1u8, 2, 3];
        let mut buf = Vec::new();
        encode_array(&data, &mut buf);
        let (len, _) = decode_uint(&buf).unwrap();
        assert_eq!(len as usize, data.len());
        let (decoded, consumed) = decode_array(&buf).unwrap();
        assert_eq!(decoded, data);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn header_round_trips_and_is_eight_bytes() {
        let h = MessageHeader {
            object_id: ObjectId::DISPLAY,
            size: 12,
            opcode: 3,
        };
        let mut buf = Vec::new();
        encode_header(h, &mut buf);
        assert_eq!(buf.len(), MessageHeader::SIZE);
        let decoded = decode_header(&buf).unwrap();
        assert_eq!(decoded.object_id, h.object_id);
        assert_eq!(decoded.size, h.size);
        assert_eq!(decoded.opcode, h.opcode);
    }

    #[test]
    fn no_payload_frame_decodes_to_zero_arguments() {
        let h = MessageHeader {
            object_id: ObjectId::DISPLAY,
            size: MessageHeader::SIZE as u16,
            opcode: 0,
        };
        assert_eq!(h.size as usize, MessageHeader::SIZE);
    }

    #[test]
    fn short_read_is_reported_not_panicked() {
        assert!(matches!(decode_uint(&[1, 2]), Err(WireError::ShortRead { .. })));
        assert!(matches!(decode_header(&[0; 4]), Err(WireError::ShortRead { .. })));
    }

    #[test]
    fn malformed_array_length_is_frame_format_error() {
        // length says 100 bytes but buffer only has 4 bytes of payload
        let mut buf = Vec::new();
        encode_uint(100, &mut buf);
        buf.extend_from_slice(&[0; 4]);
        assert!(matches!(decode_array(&buf), Err(WireError::ShortRead { .. })));
    }
}
