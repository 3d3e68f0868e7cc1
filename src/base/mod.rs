//! Primitive, width- and endianness-aware readers and writers shared by
//! every ELF structure in this crate.
//!
//! The upstream library this crate's object model is adapted from encodes
//! class and data-encoding as `const` generic parameters on every field
//! type, which lets a monomorphized reader be picked once a file's class is
//! known. That works well for a library that is only ever handed a class it
//! already trusts. This tool instead starts from an arbitrary, untrusted
//! `ET_REL` object whose class and encoding are unknown until the identifier
//! bytes are read, so [`ElfClass`] and [`ElfDataEncoding`] are ordinary
//! runtime values threaded through the read/write helpers below rather than
//! compile-time parameters.

use crate::error::{Error, Result};
use std::io::{Read, Write};

/// The file's class: whether fields are 32-bit or 64-bit wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElfClass {
    /// `ELFCLASS32`
    Elf32,
    /// `ELFCLASS64`
    Elf64,
}

impl ElfClass {
    /// `ELFCLASS32`'s on-disk value.
    pub const ELFCLASS32: u8 = 1;
    /// `ELFCLASS64`'s on-disk value.
    pub const ELFCLASS64: u8 = 2;

    /// Decode `e_ident[EI_CLASS]`.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            Self::ELFCLASS32 => Ok(Self::Elf32),
            Self::ELFCLASS64 => Ok(Self::Elf64),
            other => Err(Error::InvalidClass(other)),
        }
    }

    /// Encode back to the on-disk value.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Elf32 => Self::ELFCLASS32,
            Self::Elf64 => Self::ELFCLASS64,
        }
    }

    /// Width in bytes of a "native word" field (`Elf32_Word`/`Elf64_Xword`
    /// equivalents such as `sh_size`, `sh_addr`, symbol/relocation pointer
    /// fields) for this class.
    pub fn word_width(self) -> usize {
        match self {
            Self::Elf32 => 4,
            Self::Elf64 => 8,
        }
    }
}

/// The file's byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElfDataEncoding {
    /// `ELFDATA2LSB`
    Little,
    /// `ELFDATA2MSB`
    Big,
}

impl ElfDataEncoding {
    /// `ELFDATA2LSB`'s on-disk value.
    pub const ELFDATA2LSB: u8 = 1;
    /// `ELFDATA2MSB`'s on-disk value.
    pub const ELFDATA2MSB: u8 = 2;

    /// Decode `e_ident[EI_DATA]`.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            Self::ELFDATA2LSB => Ok(Self::Little),
            Self::ELFDATA2MSB => Ok(Self::Big),
            other => Err(Error::InvalidDataEncoding(other)),
        }
    }

    /// Encode back to the on-disk value.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Little => Self::ELFDATA2LSB,
            Self::Big => Self::ELFDATA2MSB,
        }
    }
}

/// Read a 2-byte half-word.
pub fn read_u16(bytes: &[u8], off: usize, enc: ElfDataEncoding) -> Result<u16> {
    let buf: [u8; 2] = bytes
        .get(off..off + 2)
        .ok_or_else(|| Error::io("read u16", std::io::ErrorKind::UnexpectedEof.into()))?
        .try_into()
        .expect("slice of length 2");
    Ok(match enc {
        ElfDataEncoding::Little => u16::from_le_bytes(buf),
        ElfDataEncoding::Big => u16::from_be_bytes(buf),
    })
}

/// Read a 4-byte word.
pub fn read_u32(bytes: &[u8], off: usize, enc: ElfDataEncoding) -> Result<u32> {
    let buf: [u8; 4] = bytes
        .get(off..off + 4)
        .ok_or_else(|| Error::io("read u32", std::io::ErrorKind::UnexpectedEof.into()))?
        .try_into()
        .expect("slice of length 4");
    Ok(match enc {
        ElfDataEncoding::Little => u32::from_le_bytes(buf),
        ElfDataEncoding::Big => u32::from_be_bytes(buf),
    })
}

/// Read an 8-byte extended word.
pub fn read_u64(bytes: &[u8], off: usize, enc: ElfDataEncoding) -> Result<u64> {
    let buf: [u8; 8] = bytes
        .get(off..off + 8)
        .ok_or_else(|| Error::io("read u64", std::io::ErrorKind::UnexpectedEof.into()))?
        .try_into()
        .expect("slice of length 8");
    Ok(match enc {
        ElfDataEncoding::Little => u64::from_le_bytes(buf),
        ElfDataEncoding::Big => u64::from_be_bytes(buf),
    })
}

/// Read a class-dependent "native word" (4 bytes for ELF32, 8 for ELF64),
/// widened to `u64`.
pub fn read_word(bytes: &[u8], off: usize, class: ElfClass, enc: ElfDataEncoding) -> Result<u64> {
    match class {
        ElfClass::Elf32 => read_u32(bytes, off, enc).map(u64::from),
        ElfClass::Elf64 => read_u64(bytes, off, enc),
    }
}

/// Append a 2-byte half-word.
pub fn write_u16(out: &mut Vec<u8>, value: u16, enc: ElfDataEncoding) {
    out.extend_from_slice(&match enc {
        ElfDataEncoding::Little => value.to_le_bytes(),
        ElfDataEncoding::Big => value.to_be_bytes(),
    });
}

/// Append a 4-byte word.
pub fn write_u32(out: &mut Vec<u8>, value: u32, enc: ElfDataEncoding) {
    out.extend_from_slice(&match enc {
        ElfDataEncoding::Little => value.to_le_bytes(),
        ElfDataEncoding::Big => value.to_be_bytes(),
    });
}

/// Append an 8-byte extended word.
pub fn write_u64(out: &mut Vec<u8>, value: u64, enc: ElfDataEncoding) {
    out.extend_from_slice(&match enc {
        ElfDataEncoding::Little => value.to_le_bytes(),
        ElfDataEncoding::Big => value.to_be_bytes(),
    });
}

/// Append a class-dependent "native word", truncating a widened `u64` back
/// down to 4 bytes for ELF32.
pub fn write_word(out: &mut Vec<u8>, value: u64, class: ElfClass, enc: ElfDataEncoding) {
    match class {
        ElfClass::Elf32 => write_u32(out, value as u32, enc),
        ElfClass::Elf64 => write_u64(out, value, enc),
    }
}

/// Overwrite a class-dependent "native word" already present in `out` at
/// `off`, in place (used to patch a single field of an already-serialized
/// record, e.g. a relocation's `r_info`).
pub fn rewrite_word(out: &mut [u8], off: usize, value: u64, class: ElfClass, enc: ElfDataEncoding) {
    let width = class.word_width();
    let mut tmp = Vec::with_capacity(width);
    write_word(&mut tmp, value, class, enc);
    out[off..off + width].copy_from_slice(&tmp);
}

/// Read a byte slice as a NUL-terminated string starting at `off`.
pub fn read_cstr(bytes: &[u8], off: usize) -> Option<&str> {
    let rest = bytes.get(off..)?;
    let end = rest.iter().position(|&b| b == 0)?;
    std::str::from_utf8(&rest[..end]).ok()
}

/// Read a trusted reader fully into a buffer, wrapping I/O errors with the
/// given operation name for diagnostics.
pub fn read_all(mut reader: impl Read, operation: &'static str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader
        .read_to_end(&mut buf)
        .map_err(|e| Error::io(operation, e))?;
    Ok(buf)
}

/// Write a buffer fully, wrapping I/O errors with the given operation name.
pub fn write_all(mut writer: impl Write, bytes: &[u8], operation: &'static str) -> Result<()> {
    writer.write_all(bytes).map_err(|e| Error::io(operation, e))
}
