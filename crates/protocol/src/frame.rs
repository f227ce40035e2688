use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;
use tidekv_common::{MAX_FRAME_DEPTH, MAX_FRAME_SIZE, ProtocolError};

const CRLF: &[u8] = b"\r\n";

/// Frame RESP2.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
}

impl Frame {
    /// Tenta decodificar um frame do início de `buf`.
    ///
    /// Retorna `Ok(None)` se o buffer ainda não contém um frame completo, ou o
    /// frame junto com o número de bytes consumidos.
    pub fn decode(buf: &[u8]) -> Result<Option<(Frame, usize)>, ProtocolError> {
        let mut cursor = Cursor::new(buf);
        match Frame::check(&mut cursor) {
            Ok(()) => {
                let len = cursor.position() as usize;
                cursor.set_position(0);
                let frame = Frame::parse(&mut cursor)?;
                Ok(Some((frame, len)))
            }
            Err(ProtocolError::Incomplete) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Valida que há um frame completo no cursor sem alocar.
    pub fn check(src: &mut Cursor<&[u8]>) -> Result<(), ProtocolError> {
        check_at(src, 0)
    }

    /// Lê um frame do cursor. Assume que `check()` já passou.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Frame, ProtocolError> {
        parse_at(src, 0)
    }

    /// Serializa o frame em RESP2 no buffer de saída.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => put_line(dst, b'+', s.as_bytes()),
            Frame::Error(s) => put_line(dst, b'-', s.as_bytes()),
            Frame::Integer(n) => put_line(dst, b':', n.to_string().as_bytes()),
            Frame::Bulk(data) => {
                put_line(dst, b'$', data.len().to_string().as_bytes());
                dst.put_slice(data);
                dst.put_slice(CRLF);
            }
            Frame::Null => dst.put_slice(b"$-1\r\n"),
            Frame::Array(frames) => {
                put_line(dst, b'*', frames.len().to_string().as_bytes());
                for frame in frames {
                    frame.encode(dst);
                }
            }
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Resposta `+OK`.
    pub fn ok() -> Frame {
        Frame::Simple("OK".into())
    }

    pub fn bulk(s: &str) -> Frame {
        Frame::Bulk(Bytes::from(s.to_string()))
    }

    /// Array de bulk strings, o formato de um comando enviado por cliente.
    pub fn array_from_strs(strs: &[&str]) -> Frame {
        Frame::Array(strs.iter().map(|s| Frame::bulk(s)).collect())
    }
}

fn check_at(src: &mut Cursor<&[u8]>, depth: usize) -> Result<(), ProtocolError> {
    match get_u8(src)? {
        b'+' | b'-' | b':' => get_line(src).map(|_| ()),
        b'$' => match get_length(src)? {
            None => Ok(()),
            Some(len) => skip(src, len + CRLF.len()),
        },
        b'*' => {
            let Some(count) = get_length(src)? else {
                return Ok(());
            };
            let depth = nested(depth)?;
            for _ in 0..count {
                check_at(src, depth)?;
            }
            Ok(())
        }
        byte => Err(ProtocolError::InvalidFrameType(byte)),
    }
}

fn parse_at(src: &mut Cursor<&[u8]>, depth: usize) -> Result<Frame, ProtocolError> {
    match get_u8(src)? {
        b'+' => Ok(Frame::Simple(get_text(src)?)),
        b'-' => Ok(Frame::Error(get_text(src)?)),
        b':' => Ok(Frame::Integer(get_decimal(src)?)),
        b'$' => {
            let Some(len) = get_length(src)? else {
                return Ok(Frame::Null);
            };
            if src.remaining() < len + CRLF.len() {
                return Err(ProtocolError::Incomplete);
            }
            let start = src.position() as usize;
            let data = Bytes::copy_from_slice(&src.get_ref()[start..start + len]);
            src.advance(len + CRLF.len());
            Ok(Frame::Bulk(data))
        }
        b'*' => {
            let Some(count) = get_length(src)? else {
                return Ok(Frame::Null);
            };
            let depth = nested(depth)?;
            let mut frames = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                frames.push(parse_at(src, depth)?);
            }
            Ok(Frame::Array(frames))
        }
        byte => Err(ProtocolError::InvalidFrameType(byte)),
    }
}

/// Entra em mais um nível de array, limitado a `MAX_FRAME_DEPTH`.
fn nested(depth: usize) -> Result<usize, ProtocolError> {
    if depth >= MAX_FRAME_DEPTH {
        return Err(ProtocolError::TooDeep(MAX_FRAME_DEPTH));
    }
    Ok(depth + 1)
}

fn put_line(dst: &mut BytesMut, prefix: u8, body: &[u8]) {
    dst.put_u8(prefix);
    dst.put_slice(body);
    dst.put_slice(CRLF);
}

fn get_u8(src: &mut Cursor<&[u8]>) -> Result<u8, ProtocolError> {
    if !src.has_remaining() {
        return Err(ProtocolError::Incomplete);
    }
    Ok(src.get_u8())
}

fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], ProtocolError> {
    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();

    let end = buf[start..]
        .windows(CRLF.len())
        .position(|w| w == CRLF)
        .map(|i| start + i)
        .ok_or(ProtocolError::Incomplete)?;

    src.set_position((end + CRLF.len()) as u64);
    Ok(&buf[start..end])
}

fn get_text(src: &mut Cursor<&[u8]>) -> Result<String, ProtocolError> {
    let line = get_line(src)?;
    String::from_utf8(line.to_vec())
        .map_err(|e| ProtocolError::InvalidEncoding(e.to_string()))
}

fn get_decimal(src: &mut Cursor<&[u8]>) -> Result<i64, ProtocolError> {
    let line = get_line(src)?;
    let s = std::str::from_utf8(line).map_err(|e| ProtocolError::InvalidInteger(e.to_string()))?;
    s.parse::<i64>()
        .map_err(|e| ProtocolError::InvalidInteger(e.to_string()))
}

/// Comprimento de bulk/array. `-1` é nulo (`None`).
fn get_length(src: &mut Cursor<&[u8]>) -> Result<Option<usize>, ProtocolError> {
    match get_decimal(src)? {
        -1 => Ok(None),
        n if n < 0 => Err(ProtocolError::InvalidLength(n)),
        n if n as usize > MAX_FRAME_SIZE => Err(ProtocolError::FrameTooLarge(n as usize)),
        n => Ok(Some(n as usize)),
    }
}

fn skip(src: &mut Cursor<&[u8]>, n: usize) -> Result<(), ProtocolError> {
    if src.remaining() < n {
        return Err(ProtocolError::Incomplete);
    }
    src.advance(n);
    Ok(())
}
