//! The ELF section header (`Elf32_Shdr`/`Elf64_Shdr`).

use crate::base::{read_u32, read_word, write_u32, write_word, ElfClass, ElfDataEncoding};
use crate::error::Result;
use bitflags::bitflags;

/// `sh_type` values this tool reads or writes. Unrecognized values are kept
/// as their raw `u32` rather than rejected — most section types are simply
/// skipped by the relocation scanner, so there is no reason to fail closed
/// on a type this tool never inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfSectionHeaderType {
    /// `SHT_NULL`
    Null,
    /// `SHT_PROGBITS`
    ProgBits,
    /// `SHT_SYMTAB`
    SymTab,
    /// `SHT_STRTAB`
    StrTab,
    /// `SHT_RELA`
    Rela,
    /// `SHT_NOBITS`
    NoBits,
    /// `SHT_REL`
    Rel,
    /// `SHT_DYNSYM`
    DynSym,
    /// Any other, unrecognized section type.
    Other(u32),
}

impl ElfSectionHeaderType {
    const SHT_NULL: u32 = 0;
    const SHT_PROGBITS: u32 = 1;
    const SHT_SYMTAB: u32 = 2;
    const SHT_STRTAB: u32 = 3;
    const SHT_RELA: u32 = 4;
    const SHT_NOBITS: u32 = 8;
    const SHT_REL: u32 = 9;
    const SHT_DYNSYM: u32 = 11;

    /// Decode a raw `sh_type`.
    pub fn from_u32(value: u32) -> Self {
        match value {
            Self::SHT_NULL => Self::Null,
            Self::SHT_PROGBITS => Self::ProgBits,
            Self::SHT_SYMTAB => Self::SymTab,
            Self::SHT_STRTAB => Self::StrTab,
            Self::SHT_RELA => Self::Rela,
            Self::SHT_NOBITS => Self::NoBits,
            Self::SHT_REL => Self::Rel,
            Self::SHT_DYNSYM => Self::DynSym,
            other => Self::Other(other),
        }
    }

    /// Encode back to the raw `sh_type` value.
    pub fn as_u32(self) -> u32 {
        match self {
            Self::Null => Self::SHT_NULL,
            Self::ProgBits => Self::SHT_PROGBITS,
            Self::SymTab => Self::SHT_SYMTAB,
            Self::StrTab => Self::SHT_STRTAB,
            Self::Rela => Self::SHT_RELA,
            Self::NoBits => Self::SHT_NOBITS,
            Self::Rel => Self::SHT_REL,
            Self::DynSym => Self::SHT_DYNSYM,
            Self::Other(v) => v,
        }
    }

    /// Whether this section carries REL or RELA relocation entries.
    pub fn is_relocation(self) -> bool {
        matches!(self, Self::Rel | Self::Rela)
    }
}

bitflags! {
    /// `sh_flags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ElfSectionHeaderFlags: u64 {
        /// `SHF_WRITE`
        const WRITE = 0x1;
        /// `SHF_ALLOC` — the flag this tool sets on `set_sdt_instance_set`.
        const ALLOC = 0x2;
        /// `SHF_EXECINSTR`
        const EXECINSTR = 0x4;
        /// `SHF_INFO_LINK` — `sh_info` holds a section index rather than a
        /// plain number (true of every `SHT_REL`/`SHT_RELA` section).
        const INFO_LINK = 0x40;
    }
}

/// A parsed section header. Every native-word field (`sh_flags`, `sh_addr`,
/// `sh_offset`, `sh_size`, `sh_addralign`, `sh_entsize`) is widened to `u64`
/// regardless of class, mirroring [`crate::header::elf::ElfHeader`].
#[derive(Debug, Clone)]
pub struct ElfSectionHeader {
    /// `sh_name`: byte offset into the section header string table.
    pub name_offset: u32,
    /// `sh_type`.
    pub ty: ElfSectionHeaderType,
    /// `sh_flags`.
    pub flags: ElfSectionHeaderFlags,
    /// `sh_addr`.
    pub addr: u64,
    /// `sh_offset`: byte offset of the section's data within the file.
    pub offset: u64,
    /// `sh_size`: byte length of the section's data.
    pub size: u64,
    /// `sh_link`: meaning depends on `sh_type`.
    pub link: u32,
    /// `sh_info`: meaning depends on `sh_type`. For `SHT_REL`/`SHT_RELA`,
    /// the index of the section the relocations apply to.
    pub info: u32,
    /// `sh_addralign`.
    pub addralign: u64,
    /// `sh_entsize`: size of one fixed-size record, for sections that hold
    /// an array of them (symbol tables, relocation sections).
    pub entsize: u64,
}

impl ElfSectionHeader {
    /// Size in bytes of one entry for this class (40 for ELF32, 64 for
    /// ELF64).
    pub fn size_for(class: ElfClass) -> usize {
        match class {
            ElfClass::Elf32 => 40,
            ElfClass::Elf64 => 64,
        }
    }

    /// Parse one section header entry from `bytes[off..]`.
    pub fn parse(bytes: &[u8], off: usize, class: ElfClass, enc: ElfDataEncoding) -> Result<Self> {
        let mut cur = off;
        let name_offset = read_u32(bytes, cur, enc)?;
        cur += 4;
        let ty = ElfSectionHeaderType::from_u32(read_u32(bytes, cur, enc)?);
        cur += 4;
        let flags = ElfSectionHeaderFlags::from_bits_truncate(read_word(bytes, cur, class, enc)?);
        cur += class.word_width();
        let addr = read_word(bytes, cur, class, enc)?;
        cur += class.word_width();
        let offset = read_word(bytes, cur, class, enc)?;
        cur += class.word_width();
        let size = read_word(bytes, cur, class, enc)?;
        cur += class.word_width();
        let link = read_u32(bytes, cur, enc)?;
        cur += 4;
        let info = read_u32(bytes, cur, enc)?;
        cur += 4;
        let addralign = read_word(bytes, cur, class, enc)?;
        cur += class.word_width();
        let entsize = read_word(bytes, cur, class, enc)?;

        Ok(Self {
            name_offset,
            ty,
            flags,
            addr,
            offset,
            size,
            link,
            info,
            addralign,
            entsize,
        })
    }

    /// Serialize back to [`ElfSectionHeader::size_for`] bytes.
    pub fn write(&self, out: &mut Vec<u8>, class: ElfClass, enc: ElfDataEncoding) {
        write_u32(out, self.name_offset, enc);
        write_u32(out, self.ty.as_u32(), enc);
        write_word(out, self.flags.bits(), class, enc);
        write_word(out, self.addr, class, enc);
        write_word(out, self.offset, class, enc);
        write_word(out, self.size, class, enc);
        write_u32(out, self.link, enc);
        write_u32(out, self.info, enc);
        write_word(out, self.addralign, class, enc);
        write_word(out, self.entsize, class, enc);
    }
}
