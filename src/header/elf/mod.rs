//! The ELF file header (`Elf32_Ehdr`/`Elf64_Ehdr`) and the `e_ident` bytes
//! that precede it.

use crate::base::{read_u16, read_u32, read_word, write_u16, write_u32, write_word, ElfClass, ElfDataEncoding};
use crate::error::{Error, Result};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// Size in bytes of `e_ident`.
pub const EI_NIDENT: usize = 16;
const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// The 16-byte identifier block at the start of every ELF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfIdent {
    /// `ELFCLASS32`/`ELFCLASS64`.
    pub class: ElfClass,
    /// `ELFDATA2LSB`/`ELFDATA2MSB`.
    pub data: ElfDataEncoding,
    /// `e_ident[EI_VERSION]`, should be `EV_CURRENT` (1).
    pub version: u8,
    /// `e_ident[EI_OSABI]`.
    pub os_abi: u8,
    /// `e_ident[EI_ABIVERSION]`.
    pub abi_version: u8,
}

impl ElfIdent {
    /// Parse the identifier block from the first 16 bytes of a file.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let ident = bytes
            .get(0..EI_NIDENT)
            .ok_or_else(|| Error::io("read e_ident", std::io::ErrorKind::UnexpectedEof.into()))?;
        if ident[0..4] != ELF_MAGIC {
            return Err(Error::BadMagic);
        }
        Ok(Self {
            class: ElfClass::from_u8(ident[4])?,
            data: ElfDataEncoding::from_u8(ident[5])?,
            version: ident[6],
            os_abi: ident[7],
            abi_version: ident[8],
        })
    }

    /// Serialize back to 16 bytes.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&ELF_MAGIC);
        out.push(self.class.as_u8());
        out.push(self.data.as_u8());
        out.push(self.version);
        out.push(self.os_abi);
        out.push(self.abi_version);
        out.extend_from_slice(&[0u8; 7]);
    }
}

/// `e_type`: the object file's kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u16)]
pub enum ElfType {
    /// `ET_NONE`
    None = 0,
    /// `ET_REL` — a relocatable object; the only kind this tool accepts.
    Relocatable = 1,
    /// `ET_EXEC`
    Executable = 2,
    /// `ET_DYN`
    Dynamic = 3,
    /// `ET_CORE`
    Core = 4,
}

/// The handful of `e_machine` values this tool needs to name in
/// diagnostics. Every other value is represented as
/// [`ElfMachine::Other`] and is always rejected by
/// [`crate::arch::patcher_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfMachine {
    /// `EM_NONE`
    None,
    /// `EM_386`
    I386,
    /// `EM_X86_64` — the only architecture this tool can patch.
    X86_64,
    /// `EM_AARCH64`
    AArch64,
    /// `EM_ARM`
    Arm,
    /// Any machine value not named above.
    Other(u16),
}

impl ElfMachine {
    const EM_NONE: u16 = 0;
    const EM_386: u16 = 3;
    const EM_ARM: u16 = 40;
    const EM_X86_64: u16 = 62;
    const EM_AARCH64: u16 = 183;

    fn from_u16(value: u16) -> Self {
        match value {
            Self::EM_NONE => Self::None,
            Self::EM_386 => Self::I386,
            Self::EM_ARM => Self::Arm,
            Self::EM_X86_64 => Self::X86_64,
            Self::EM_AARCH64 => Self::AArch64,
            other => Self::Other(other),
        }
    }

    fn as_u16(self) -> u16 {
        match self {
            Self::None => Self::EM_NONE,
            Self::I386 => Self::EM_386,
            Self::Arm => Self::EM_ARM,
            Self::X86_64 => Self::EM_X86_64,
            Self::AArch64 => Self::EM_AARCH64,
            Self::Other(v) => v,
        }
    }
}

impl std::fmt::Display for ElfMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Byte offsets of the fixed-position `e_ident`-relative fields, identical
/// across ELF32/ELF64 up to `e_entry`.
mod layout {
    pub const E_TYPE: usize = 0;
    pub const E_MACHINE: usize = 2;
    pub const E_VERSION: usize = 4;
    // e_entry, e_phoff, e_shoff are class-width (4 or 8 bytes) and start here.
    pub const E_ENTRY: usize = 8;
}

/// The ELF file header, with every "native word" field widened to `u64`
/// regardless of class (mirroring how [`crate::header::section::ElfSectionHeader`]
/// stores its own native-word fields).
#[derive(Debug, Clone)]
pub struct ElfHeader {
    /// `e_ident`.
    pub ident: ElfIdent,
    /// `e_type`.
    pub ty: ElfType,
    /// `e_machine`.
    pub machine: ElfMachine,
    /// `e_version`.
    pub version: u32,
    /// `e_entry`.
    pub entry: u64,
    /// `e_phoff`.
    pub phoff: u64,
    /// `e_shoff`.
    pub shoff: u64,
    /// `e_flags`.
    pub flags: u32,
    /// `e_ehsize`.
    pub ehsize: u16,
    /// `e_phentsize`.
    pub phentsize: u16,
    /// `e_phnum`.
    pub phnum: u16,
    /// `e_shentsize`.
    pub shentsize: u16,
    /// `e_shnum`.
    pub shnum: u16,
    /// `e_shstrndx`.
    pub shstrndx: u16,
}

impl ElfHeader {
    /// Size in bytes of the fixed header for this class (52 for ELF32, 64
    /// for ELF64).
    pub fn size_for(class: ElfClass) -> usize {
        match class {
            ElfClass::Elf32 => 52,
            ElfClass::Elf64 => 64,
        }
    }

    /// Parse the full header, assuming `bytes` starts at file offset 0.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let ident = ElfIdent::parse(bytes)?;
        let enc = ident.data;
        let class = ident.class;
        let word = class.word_width();

        let ty_raw = read_u16(bytes, EI_NIDENT + layout::E_TYPE, enc)?;
        let ty = ElfType::from_u16(ty_raw).ok_or(Error::InvalidElfType(ty_raw))?;
        let machine = ElfMachine::from_u16(read_u16(bytes, EI_NIDENT + layout::E_MACHINE, enc)?);
        let version = read_u32(bytes, EI_NIDENT + layout::E_VERSION, enc)?;

        let mut off = EI_NIDENT + layout::E_ENTRY;
        let entry = read_word(bytes, off, class, enc)?;
        off += word;
        let phoff = read_word(bytes, off, class, enc)?;
        off += word;
        let shoff = read_word(bytes, off, class, enc)?;
        off += word;
        let flags = read_u32(bytes, off, enc)?;
        off += 4;
        let ehsize = read_u16(bytes, off, enc)?;
        off += 2;
        let phentsize = read_u16(bytes, off, enc)?;
        off += 2;
        let phnum = read_u16(bytes, off, enc)?;
        off += 2;
        let shentsize = read_u16(bytes, off, enc)?;
        off += 2;
        let shnum = read_u16(bytes, off, enc)?;
        off += 2;
        let shstrndx = read_u16(bytes, off, enc)?;

        Ok(Self {
            ident,
            ty,
            machine,
            version,
            entry,
            phoff,
            shoff,
            flags,
            ehsize,
            phentsize,
            phnum,
            shentsize,
            shnum,
            shstrndx,
        })
    }

    /// Serialize back to exactly [`ElfHeader::size_for`] bytes.
    pub fn write(&self, out: &mut Vec<u8>) {
        let enc = self.ident.data;
        let class = self.ident.class;
        self.ident.write(out);
        write_u16(out, self.ty as u16, enc);
        write_u16(out, self.machine.as_u16(), enc);
        write_u32(out, self.version, enc);
        write_word(out, self.entry, class, enc);
        write_word(out, self.phoff, class, enc);
        write_word(out, self.shoff, class, enc);
        write_u32(out, self.flags, enc);
        write_u16(out, self.ehsize, enc);
        write_u16(out, self.phentsize, enc);
        write_u16(out, self.phnum, enc);
        write_u16(out, self.shentsize, enc);
        write_u16(out, self.shnum, enc);
        write_u16(out, self.shstrndx, enc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header(class: ElfClass) -> Vec<u8> {
        let hdr = ElfHeader {
            ident: ElfIdent {
                class,
                data: ElfDataEncoding::Little,
                version: 1,
                os_abi: 0,
                abi_version: 0,
            },
            ty: ElfType::Relocatable,
            machine: ElfMachine::X86_64,
            version: 1,
            entry: 0,
            phoff: 0,
            shoff: 0x1000,
            flags: 0,
            ehsize: ElfHeader::size_for(class) as u16,
            phentsize: 0,
            phnum: 0,
            shentsize: 64,
            shnum: 7,
            shstrndx: 6,
        };
        let mut out = Vec::new();
        hdr.write(&mut out);
        out
    }

    #[test]
    fn round_trips_elf64() {
        let bytes = sample_header(ElfClass::Elf64);
        assert_eq!(bytes.len(), 64);
        let hdr = ElfHeader::parse(&bytes).unwrap();
        assert_eq!(hdr.ty, ElfType::Relocatable);
        assert_eq!(hdr.machine, ElfMachine::X86_64);
        assert_eq!(hdr.shoff, 0x1000);
        assert_eq!(hdr.shnum, 7);
        assert_eq!(hdr.shstrndx, 6);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample_header(ElfClass::Elf64);
        bytes[0] = 0;
        assert!(matches!(ElfHeader::parse(&bytes), Err(Error::BadMagic)));
    }
}
