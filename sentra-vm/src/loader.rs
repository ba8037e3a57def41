//! Chunk format: serialized function prototypes.
//!
//! Layout, all multi-byte integers little-endian:
//!
//! ```text
//! magic      \x1b S N T
//! version    u8
//! prototype:
//!   arity          u8
//!   variadic       u8 (0/1)
//!   upvalue count  u16, then entries {index: u8, is_local: u8}
//!   constant count u32, then entries {kind: u8, payload}
//!   code count     u32, then 32-bit instruction words
//!   proto count    u32, then nested prototypes, recursively
//! ```
//!
//! Constant payloads: nil none, bool u8, int i64, float f64 bits, string
//! u32 length + UTF-8 bytes.

use crate::consts::{CHUNK_MAGIC, CHUNK_VERSION};
use crate::proto::{Constant, FunctionProto, ProtoFlags, UpvalDesc};

use sentra_asm::Instruction;
use thiserror::Error;

use std::sync::Arc;

/// Chunk decoding failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The magic prefix did not match.
    #[error("bad chunk magic")]
    BadMagic,
    /// The version byte is newer than this VM understands.
    #[error("unsupported chunk version {0}")]
    UnsupportedVersion(u8),
    /// The chunk ended mid-structure.
    #[error("unexpected end of chunk at offset {0}")]
    UnexpectedEof(usize),
    /// A constant entry carried an unknown kind byte.
    #[error("unknown constant kind {0}")]
    UnknownConstantKind(u8),
    /// A string constant was not valid UTF-8.
    #[error("constant string is not valid UTF-8")]
    InvalidUtf8,
    /// Trailing bytes after the root prototype.
    #[error("{0} trailing bytes after chunk")]
    TrailingBytes(usize),
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(DecodeError::UnexpectedEof(self.pos))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }
}

/// Decode a chunk into its root prototype.
pub fn decode_chunk(bytes: &[u8]) -> Result<Arc<FunctionProto>, DecodeError> {
    let mut reader = Reader { bytes, pos: 0 };
    if reader.take(4)? != CHUNK_MAGIC {
        return Err(DecodeError::BadMagic);
    }
    let version = reader.u8()?;
    if version != CHUNK_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let proto = decode_proto(&mut reader, "main")?;
    let trailing = bytes.len() - reader.pos;
    if trailing != 0 {
        return Err(DecodeError::TrailingBytes(trailing));
    }
    Ok(proto)
}

fn decode_proto(reader: &mut Reader<'_>, name: &str) -> Result<Arc<FunctionProto>, DecodeError> {
    let arity = reader.u8()?;
    let flags = if reader.u8()? != 0 {
        ProtoFlags::VARIADIC
    } else {
        ProtoFlags::empty()
    };

    let upval_count = reader.u16()? as usize;
    let mut upvals = Vec::with_capacity(upval_count);
    for _ in 0..upval_count {
        let index = reader.u8()?;
        let is_local = reader.u8()? != 0;
        upvals.push(UpvalDesc { index, is_local });
    }

    let const_count = reader.u32()? as usize;
    let mut consts = Vec::with_capacity(const_count);
    for _ in 0..const_count {
        let kind = reader.u8()?;
        let constant = match kind {
            0 => Constant::Nil,
            1 => Constant::Bool(reader.u8()? != 0),
            2 => Constant::Int(reader.u64()? as i64),
            3 => Constant::Float(f64::from_bits(reader.u64()?)),
            4 => {
                let len = reader.u32()? as usize;
                let bytes = reader.take(len)?;
                let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
                Constant::Str(text.to_owned())
            }
            other => return Err(DecodeError::UnknownConstantKind(other)),
        };
        consts.push(constant);
    }

    let code_count = reader.u32()? as usize;
    let mut code = Vec::with_capacity(code_count);
    for _ in 0..code_count {
        let word = reader.u32()?;
        code.push(Instruction::from_le_bytes(word.to_le_bytes()));
    }

    let proto_count = reader.u32()? as usize;
    let mut protos = Vec::with_capacity(proto_count);
    for i in 0..proto_count {
        protos.push(decode_proto(reader, &format!("{name}.{i}"))?);
    }

    Ok(Arc::new(FunctionProto::new(
        name, arity, flags, upvals, consts, code, protos,
    )))
}

/// Encode a prototype tree into chunk bytes.
pub fn encode_chunk(proto: &FunctionProto) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&CHUNK_MAGIC);
    out.push(CHUNK_VERSION);
    encode_proto(proto, &mut out);
    out
}

fn encode_proto(proto: &FunctionProto, out: &mut Vec<u8>) {
    out.push(proto.arity);
    out.push(proto.is_variadic() as u8);

    out.extend_from_slice(&(proto.upvals.len() as u16).to_le_bytes());
    for upval in &proto.upvals {
        out.push(upval.index);
        out.push(upval.is_local as u8);
    }

    out.extend_from_slice(&(proto.consts.len() as u32).to_le_bytes());
    for constant in &proto.consts {
        out.push(constant.kind_byte());
        match constant {
            Constant::Nil => {}
            Constant::Bool(b) => out.push(*b as u8),
            Constant::Int(i) => out.extend_from_slice(&(*i as u64).to_le_bytes()),
            Constant::Float(x) => out.extend_from_slice(&x.to_bits().to_le_bytes()),
            Constant::Str(s) => {
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
        }
    }

    out.extend_from_slice(&(proto.code.len() as u32).to_le_bytes());
    for instr in &proto.code {
        out.extend_from_slice(&instr.to_le_bytes());
    }

    out.extend_from_slice(&(proto.protos.len() as u32).to_le_bytes());
    for nested in &proto.protos {
        encode_proto(nested, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentra_asm::op;

    fn sample_proto() -> FunctionProto {
        let inner = Arc::new(FunctionProto::new(
            "main.0",
            2,
            ProtoFlags::VARIADIC,
            vec![UpvalDesc { index: 1, is_local: true }],
            vec![Constant::Int(-5), Constant::Str("piece".into())],
            vec![op::getupval(0, 0, 0), op::ret(0, 2, 0)],
            vec![],
        ));
        FunctionProto::new(
            "main",
            0,
            ProtoFlags::empty(),
            vec![],
            vec![
                Constant::Nil,
                Constant::Bool(true),
                Constant::Int(i64::MIN),
                Constant::Float(0.5),
                Constant::Str("hello".into()),
            ],
            vec![op::loadk(0, 4), op::closure(1, 0), op::ret(0, 2, 0)],
            vec![inner],
        )
    }

    #[test]
    fn chunks_round_trip() {
        let original = sample_proto();
        let bytes = encode_chunk(&original);
        assert_eq!(&bytes[..4], &CHUNK_MAGIC);

        let decoded = decode_chunk(&bytes).unwrap();
        assert_eq!(decoded.arity, original.arity);
        assert_eq!(decoded.consts, original.consts);
        assert_eq!(decoded.code, original.code);
        assert_eq!(decoded.protos.len(), 1);
        assert_eq!(decoded.protos[0].upvals, original.protos[0].upvals);
        assert!(decoded.protos[0].is_variadic());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = encode_chunk(&sample_proto());
        bytes[0] = b'X';
        assert_eq!(decode_chunk(&bytes).unwrap_err(), DecodeError::BadMagic);
    }

    #[test]
    fn future_versions_are_rejected() {
        let mut bytes = encode_chunk(&sample_proto());
        bytes[4] = CHUNK_VERSION + 1;
        assert_eq!(
            decode_chunk(&bytes).unwrap_err(),
            DecodeError::UnsupportedVersion(CHUNK_VERSION + 1)
        );
    }

    #[test]
    fn truncation_is_detected() {
        let bytes = encode_chunk(&sample_proto());
        for cut in [3, 5, 8, bytes.len() - 1] {
            assert!(matches!(
                decode_chunk(&bytes[..cut]),
                Err(DecodeError::UnexpectedEof(_)) | Err(DecodeError::BadMagic)
            ));
        }
    }

    #[test]
    fn trailing_bytes_are_detected() {
        let mut bytes = encode_chunk(&sample_proto());
        bytes.push(0);
        assert_eq!(decode_chunk(&bytes).unwrap_err(), DecodeError::TrailingBytes(1));
    }
}
