//! `.vmb` container reader.
//!
//! The loader-side inverse of [`crate::bytecode::writer`]. Bad magic, an
//! unsupported version, an unknown opcode or a checksum mismatch are fatal.

use std::convert::TryFrom;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::bytecode::op::Opcode;
use crate::bytecode::program::{
    BytecodeProgram, Constant, DebugInfo, DebugLine, FunctionInfo, GlobalInfo, Instruction,
    TypeTag, FLAG_DEBUG_INFO, FORMAT_VERSION,
};
use crate::bytecode::writer::{
    crc32, CONST_TAG_FLOAT, CONST_TAG_INT, CONST_TAG_STR, MAGIC,
};

#[derive(Debug)]
pub enum ReadError {
    BadMagic,
    UnsupportedVersion(u16),
    UnknownOpcode(u8),
    UnknownConstantTag(u8),
    UnknownTypeTag(u8),
    ChecksumMismatch { stored: u32, computed: u32 },
    Truncated,
    BadString,
    Io(String),
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::BadMagic => write!(f, "not a .vmb file (bad magic)"),
            ReadError::UnsupportedVersion(v) => {
                write!(f, "unsupported container version {}", v)
            }
            ReadError::UnknownOpcode(b) => write!(f, "unknown opcode 0x{:02X}", b),
            ReadError::UnknownConstantTag(t) => write!(f, "unknown constant tag {}", t),
            ReadError::UnknownTypeTag(t) => write!(f, "unknown global type tag {}", t),
            ReadError::ChecksumMismatch { stored, computed } => write!(
                f,
                "checksum mismatch: stored {:08X}, computed {:08X}",
                stored, computed
            ),
            ReadError::Truncated => write!(f, "file is truncated"),
            ReadError::BadString => write!(f, "malformed string data"),
            ReadError::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for ReadError {}

#[derive(Default)]
pub struct BytecodeReader;

impl BytecodeReader {
    pub fn new() -> Self {
        BytecodeReader
    }

    pub fn read(&self, path: &Path) -> Result<BytecodeProgram, ReadError> {
        let bytes = fs::read(path).map_err(|e| ReadError::Io(e.to_string()))?;
        decode(&bytes)
    }
}

pub fn decode(bytes: &[u8]) -> Result<BytecodeProgram, ReadError> {
    if bytes.len() < MAGIC.len() + 4 {
        return Err(ReadError::Truncated);
    }
    let (body, trailer) = bytes.split_at(bytes.len() - 4);
    let stored = u32::from_le_bytes(trailer.try_into().unwrap());
    let computed = crc32(body);
    if stored != computed {
        return Err(ReadError::ChecksumMismatch { stored, computed });
    }

    let mut r = Cursor { bytes: body, at: 0 };
    if r.take(4)? != MAGIC {
        return Err(ReadError::BadMagic);
    }
    let version = r.u16()?;
    if version != FORMAT_VERSION {
        return Err(ReadError::UnsupportedVersion(version));
    }
    let flags = r.u16()?;

    let constant_count = r.u32()? as usize;
    let mut constants = Vec::with_capacity(constant_count);
    for _ in 0..constant_count {
        let tag = r.u8()?;
        constants.push(match tag {
            CONST_TAG_INT => Constant::Int(r.u32()? as i32),
            CONST_TAG_FLOAT => Constant::Float(f32::from_bits(r.u32()?)),
            CONST_TAG_STR => {
                let len = r.u32()? as usize;
                Constant::Str(r.string(len)?)
            }
            other => return Err(ReadError::UnknownConstantTag(other)),
        });
    }

    let global_count = r.u32()? as usize;
    let mut globals = Vec::with_capacity(global_count);
    for _ in 0..global_count {
        let len = r.u16()? as usize;
        let name = r.string(len)?;
        let tag = r.u8()?;
        let type_tag = TypeTag::from_u8(tag).ok_or(ReadError::UnknownTypeTag(tag))?;
        globals.push(GlobalInfo { name, type_tag });
    }

    let function_count = r.u32()? as usize;
    let mut functions = Vec::with_capacity(function_count);
    for _ in 0..function_count {
        let len = r.u16()? as usize;
        let name = r.string(len)?;
        let entry_pc = r.u32()?;
        let local_count = r.u16()?;
        let param_count = r.u16()?;
        functions.push(FunctionInfo {
            name,
            entry_pc,
            local_count,
            param_count,
        });
    }

    let instruction_count = r.u32()? as usize;
    let mut instructions = Vec::with_capacity(instruction_count);
    for _ in 0..instruction_count {
        let byte = r.u8()?;
        let opcode = Opcode::try_from(byte).map_err(|e| ReadError::UnknownOpcode(e.0))?;
        let operand_count = r.u8()? as usize;
        let mut operands = Vec::with_capacity(operand_count);
        for _ in 0..operand_count {
            operands.push(r.u32()?);
        }
        instructions.push(Instruction { opcode, operands });
    }

    let debug = if flags & FLAG_DEBUG_INFO != 0 {
        let file_count = r.u16()? as usize;
        let mut files = Vec::with_capacity(file_count);
        for _ in 0..file_count {
            let len = r.u16()? as usize;
            files.push(r.string(len)?);
        }
        let line_count = r.u32()? as usize;
        let mut lines = Vec::with_capacity(line_count);
        for _ in 0..line_count {
            lines.push(DebugLine {
                pc: r.u32()?,
                file: r.u16()?,
                line: r.u32()?,
            });
        }
        Some(DebugInfo { files, lines })
    } else {
        None
    };

    Ok(BytecodeProgram {
        version,
        constants,
        globals,
        functions,
        instructions,
        debug,
    })
}

struct Cursor<'b> {
    bytes: &'b [u8],
    at: usize,
}

impl<'b> Cursor<'b> {
    fn take(&mut self, n: usize) -> Result<&'b [u8], ReadError> {
        if self.at + n > self.bytes.len() {
            return Err(ReadError::Truncated);
        }
        let slice = &self.bytes[self.at..self.at + n];
        self.at += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ReadError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32, ReadError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn string(&mut self, len: usize) -> Result<String, ReadError> {
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ReadError::BadString)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::writer::encode;

    fn sample_program(debug: bool) -> BytecodeProgram {
        BytecodeProgram {
            version: FORMAT_VERSION,
            constants: vec![
                Constant::Int(-7),
                Constant::Float(0.25),
                Constant::Str("sensor".into()),
            ],
            globals: vec![
                GlobalInfo {
                    name: "pts".into(),
                    type_tag: TypeTag::Array,
                },
                GlobalInfo {
                    name: "Q".into(),
                    type_tag: TypeTag::Message,
                },
            ],
            functions: vec![FunctionInfo {
                name: "main".into(),
                entry_pc: 2,
                local_count: 1,
                param_count: 0,
            }],
            instructions: vec![
                Instruction::new(Opcode::Call, vec![0, 0]),
                Instruction::new(Opcode::Halt, vec![]),
                Instruction::new(Opcode::PushConst, vec![0]),
                Instruction::new(Opcode::MsgRecvTimeout, vec![0, 100]),
                Instruction::new(Opcode::Ret, vec![]),
            ],
            debug: debug.then(|| DebugInfo {
                files: vec!["main.rtmc".into(), "util.rtmc".into()],
                lines: vec![
                    DebugLine {
                        pc: 2,
                        file: 0,
                        line: 4,
                    },
                    DebugLine {
                        pc: 3,
                        file: 1,
                        line: 9,
                    },
                ],
            }),
        }
    }

    #[test]
    fn round_trip_preserves_everything_debug() {
        let program = sample_program(true);
        let decoded = decode(&encode(&program)).unwrap();
        assert_eq!(decoded, program);
    }

    #[test]
    fn round_trip_preserves_everything_release() {
        let program = sample_program(false);
        let decoded = decode(&encode(&program)).unwrap();
        assert_eq!(decoded, program);
        assert!(decoded.debug.is_none());
    }

    #[test]
    fn corrupted_byte_fails_the_checksum() {
        let mut bytes = encode(&sample_program(true));
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0x40;
        assert!(matches!(
            decode(&bytes),
            Err(ReadError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = encode(&sample_program(false));
        bytes[0] = b'X';
        // Re-seal the checksum so the magic check itself is what trips.
        let body_len = bytes.len() - 4;
        let crc = crc32(&bytes[..body_len]).to_le_bytes();
        bytes[body_len..].copy_from_slice(&crc);
        assert!(matches!(decode(&bytes), Err(ReadError::BadMagic)));
    }

    #[test]
    fn future_version_is_rejected() {
        let mut bytes = encode(&sample_program(false));
        bytes[4] = 0xEE;
        bytes[5] = 0x7F;
        let body_len = bytes.len() - 4;
        let crc = crc32(&bytes[..body_len]).to_le_bytes();
        bytes[body_len..].copy_from_slice(&crc);
        assert!(matches!(
            decode(&bytes),
            Err(ReadError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn unknown_opcode_is_fatal() {
        let program = BytecodeProgram {
            version: FORMAT_VERSION,
            constants: Vec::new(),
            globals: Vec::new(),
            functions: Vec::new(),
            instructions: vec![Instruction::new(Opcode::Halt, vec![])],
            debug: None,
        };
        let mut bytes = encode(&program);
        // The lone instruction's opcode byte sits right after its count.
        let opcode_at = bytes.len() - 4 - 2; // checksum, then operand_count+opcode
        assert_eq!(bytes[opcode_at], Opcode::Halt as u8);
        bytes[opcode_at] = 0xFE;
        let body_len = bytes.len() - 4;
        let crc = crc32(&bytes[..body_len]).to_le_bytes();
        bytes[body_len..].copy_from_slice(&crc);
        assert!(matches!(decode(&bytes), Err(ReadError::UnknownOpcode(0xFE))));
    }

    #[test]
    fn truncated_input_is_rejected() {
        let bytes = encode(&sample_program(false));
        assert!(matches!(decode(&bytes[..6]), Err(ReadError::Truncated)));
    }
}
