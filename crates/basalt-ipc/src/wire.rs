//! Length-prefixed framing and the protocol-version handshake, in the same
//! big-endian wire convention `basalt-shim`'s protocol module and the
//! header codec both use.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// Bumped whenever a request or response variant's wire shape changes.
/// Exchanged as the first frame in each direction; a mismatch is rejected
/// before any real request is processed.
pub const PROTOCOL_VERSION: u16 = 1;

const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

pub fn write_frame(stream: &mut impl Write, tag: u8, payload: &[u8]) -> io::Result<()> {
    let len = payload.len() as u32 + 1;
    stream.write_u32::<BigEndian>(len)?;
    stream.write_u8(tag)?;
    stream.write_all(payload)?;
    stream.flush()
}

pub fn read_frame(stream: &mut impl Read) -> io::Result<(u8, Vec<u8>)> {
    let len = stream.read_u32::<BigEndian>()?;
    if len == 0 || len > MAX_FRAME_BYTES {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame length out of bounds"));
    }
    let tag = stream.read_u8()?;
    let mut payload = vec![0u8; (len - 1) as usize];
    stream.read_exact(&mut payload)?;
    Ok((tag, payload))
}

pub fn write_string(buf: &mut Vec<u8>, s: &str) -> io::Result<()> {
    buf.write_u32::<BigEndian>(s.len() as u32)?;
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

pub fn read_string(cursor: &mut &[u8]) -> io::Result<String> {
    let len = cursor.read_u32::<BigEndian>()? as usize;
    if cursor.len() < len {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated string field"));
    }
    let (s, rest) = cursor.split_at(len);
    *cursor = rest;
    String::from_utf8(s.to_vec()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub fn write_bytes_field(buf: &mut Vec<u8>, data: &[u8]) -> io::Result<()> {
    buf.write_u32::<BigEndian>(data.len() as u32)?;
    buf.extend_from_slice(data);
    Ok(())
}

pub fn read_bytes_field(cursor: &mut &[u8]) -> io::Result<Vec<u8>> {
    let len = cursor.read_u32::<BigEndian>()? as usize;
    if cursor.len() < len {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated bytes field"));
    }
    let (data, rest) = cursor.split_at(len);
    *cursor = rest;
    Ok(data.to_vec())
}

/// Sends this side's protocol version and checks the peer's. Both sides
/// call this once, before any `Request`/`Response` frame crosses the wire.
pub fn handshake(stream: &mut (impl Read + Write)) -> io::Result<()> {
    let mut out = Vec::with_capacity(2);
    out.write_u16::<BigEndian>(PROTOCOL_VERSION)?;
    write_frame(stream, 0, &out)?;

    let (_, payload) = read_frame(stream)?;
    let peer_version = (&payload[..]).read_u16::<BigEndian>()?;
    if peer_version != PROTOCOL_VERSION {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("protocol version mismatch: local {PROTOCOL_VERSION}, peer {peer_version}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn string_field_round_trips() {
        let mut buf = Vec::new();
        write_string(&mut buf, "/tmp/volume.basalt").unwrap();
        let mut cursor = &buf[..];
        assert_eq!(read_string(&mut cursor).unwrap(), "/tmp/volume.basalt");
        assert!(cursor.is_empty());
    }

    #[test]
    fn frame_round_trips() {
        let mut buf = Vec::new();
        write_frame(&mut buf, 7, b"payload").unwrap();
        let (tag, payload) = read_frame(&mut Cursor::new(buf)).unwrap();
        assert_eq!(tag, 7);
        assert_eq!(payload, b"payload");
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(MAX_FRAME_BYTES + 1).unwrap();
        assert!(read_frame(&mut Cursor::new(buf)).is_err());
    }
}
