//! The shim's fixed request/response protocol: length-prefixed frames, a
//! one-byte tag, and big-endian fields — the same wire conventions the
//! header codec uses for its own on-disk fields.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// Frames larger than this are rejected outright; a single request or
/// response never needs to carry more than one sector-I/O-sized payload.
const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub enum Request {
    SizeQuery,
    SectorSizeQuery,
    Read { offset: u64, len: u32 },
    Write { offset: u64, data: Vec<u8> },
    Flush,
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum Response {
    Size(u64),
    SectorSize(u32),
    Data(Vec<u8>),
    Ack,
    Error(String),
}

fn write_frame(stream: &mut impl Write, tag: u8, payload: &[u8]) -> io::Result<()> {
    let len = payload.len() as u32 + 1;
    stream.write_u32::<BigEndian>(len)?;
    stream.write_u8(tag)?;
    stream.write_all(payload)?;
    stream.flush()
}

fn read_frame(stream: &mut impl Read) -> io::Result<(u8, Vec<u8>)> {
    let len = stream.read_u32::<BigEndian>()?;
    if len == 0 || len > MAX_FRAME_BYTES {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame length out of bounds"));
    }
    let tag = stream.read_u8()?;
    let mut payload = vec![0u8; (len - 1) as usize];
    stream.read_exact(&mut payload)?;
    Ok((tag, payload))
}

pub fn write_request(stream: &mut impl Write, request: &Request) -> io::Result<()> {
    match request {
        Request::SizeQuery => write_frame(stream, 0, &[]),
        Request::SectorSizeQuery => write_frame(stream, 1, &[]),
        Request::Read { offset, len } => {
            let mut payload = Vec::with_capacity(12);
            payload.write_u64::<BigEndian>(*offset)?;
            payload.write_u32::<BigEndian>(*len)?;
            write_frame(stream, 2, &payload)
        }
        Request::Write { offset, data } => {
            let mut payload = Vec::with_capacity(8 + data.len());
            payload.write_u64::<BigEndian>(*offset)?;
            payload.extend_from_slice(data);
            write_frame(stream, 3, &payload)
        }
        Request::Flush => write_frame(stream, 4, &[]),
        Request::Shutdown => write_frame(stream, 5, &[]),
    }
}

pub fn read_request(stream: &mut impl Read) -> io::Result<Request> {
    let (tag, payload) = read_frame(stream)?;
    Ok(match tag {
        0 => Request::SizeQuery,
        1 => Request::SectorSizeQuery,
        2 => {
            let mut cursor = &payload[..];
            let offset = cursor.read_u64::<BigEndian>()?;
            let len = cursor.read_u32::<BigEndian>()?;
            Request::Read { offset, len }
        }
        3 => {
            let mut cursor = &payload[..];
            let offset = cursor.read_u64::<BigEndian>()?;
            Request::Write { offset, data: cursor.to_vec() }
        }
        4 => Request::Flush,
        5 => Request::Shutdown,
        other => return Err(io::Error::new(io::ErrorKind::InvalidData, format!("unknown request tag {other}"))),
    })
}

pub fn write_response(stream: &mut impl Write, response: &Response) -> io::Result<()> {
    match response {
        Response::Size(size) => {
            let mut payload = Vec::with_capacity(8);
            payload.write_u64::<BigEndian>(*size)?;
            write_frame(stream, 0, &payload)
        }
        Response::SectorSize(size) => {
            let mut payload = Vec::with_capacity(4);
            payload.write_u32::<BigEndian>(*size)?;
            write_frame(stream, 1, &payload)
        }
        Response::Data(data) => write_frame(stream, 2, data),
        Response::Ack => write_frame(stream, 3, &[]),
        Response::Error(message) => write_frame(stream, 4, message.as_bytes()),
    }
}

pub fn read_response(stream: &mut impl Read) -> io::Result<Response> {
    let (tag, payload) = read_frame(stream)?;
    Ok(match tag {
        0 => Response::Size((&payload[..]).read_u64::<BigEndian>()?),
        1 => Response::SectorSize((&payload[..]).read_u32::<BigEndian>()?),
        2 => Response::Data(payload),
        3 => Response::Ack,
        4 => Response::Error(String::from_utf8_lossy(&payload).into_owned()),
        other => return Err(io::Error::new(io::ErrorKind::InvalidData, format!("unknown response tag {other}"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_request_round_trips_write() {
        let mut buf = Vec::new();
        let request = Request::Write { offset: 512, data: vec![1, 2, 3, 4] };
        write_request(&mut buf, &request).unwrap();
        let decoded = read_request(&mut &buf[..]).unwrap();
        match decoded {
            Request::Write { offset, data } => {
                assert_eq!(offset, 512);
                assert_eq!(data, vec![1, 2, 3, 4]);
            }
            _ => panic!("expected Write"),
        }
    }

    #[test]
    fn read_response_round_trips_data() {
        let mut buf = Vec::new();
        write_response(&mut buf, &Response::Data(vec![9, 9, 9])).unwrap();
        match read_response(&mut &buf[..]).unwrap() {
            Response::Data(data) => assert_eq!(data, vec![9, 9, 9]),
            _ => panic!("expected Data"),
        }
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(MAX_FRAME_BYTES + 1).unwrap();
        assert!(read_frame(&mut &buf[..]).is_err());
    }
}
