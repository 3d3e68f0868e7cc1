//! Symbol table entries (`Elf32_Sym`/`Elf64_Sym`).

use crate::base::{read_u16, read_u32, read_word, ElfClass, ElfDataEncoding};
use crate::error::Result;

/// `ELF64_ST_TYPE(st_info)` values this tool checks against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfSymbolType {
    /// `STT_NOTYPE` — what a compiler-emitted probe stub symbol must be.
    NoType,
    /// `STT_FUNC`
    Func,
    /// Any other type nibble.
    Other(u8),
}

impl ElfSymbolType {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NoType,
            2 => Self::Func,
            other => Self::Other(other),
        }
    }

    /// The raw 4-bit type nibble.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::NoType => 0,
            Self::Func => 2,
            Self::Other(v) => v,
        }
    }
}

/// `ELF64_ST_BIND(st_info)` values this tool checks against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfSymbolBinding {
    /// `STB_LOCAL`
    Local,
    /// `STB_GLOBAL` — what a compiler-emitted probe stub symbol must be.
    Global,
    /// `STB_WEAK`
    Weak,
    /// Any other binding nibble.
    Other(u8),
}

impl ElfSymbolBinding {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Local,
            1 => Self::Global,
            2 => Self::Weak,
            other => Self::Other(other),
        }
    }

    /// The raw 4-bit binding nibble.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Local => 0,
            Self::Global => 1,
            Self::Weak => 2,
            Self::Other(v) => v,
        }
    }
}

/// Split `st_info` into its binding (high nibble) and type (low nibble).
pub fn unpack_st_info(st_info: u8) -> (ElfSymbolBinding, ElfSymbolType) {
    (
        ElfSymbolBinding::from_u8(st_info >> 4),
        ElfSymbolType::from_u8(st_info & 0xf),
    )
}

/// A parsed symbol table entry. `st_name` is resolved to an owned `String`
/// at parse time, since the record must outlive the relocation iteration
/// that discovered it, rather than kept as a string-table offset.
#[derive(Debug, Clone)]
pub struct ElfSymbol {
    /// The symbol's name, resolved via the symbol table's linked string
    /// table. Empty both when `st_name == 0` (a valid, deliberately
    /// unnamed symbol — e.g. `STT_SECTION`) and when resolution genuinely
    /// failed; see `name_resolved` for which case applies.
    pub name: String,
    /// Whether `st_name` actually resolved to a string within `strtab`.
    /// `false` means the offset pointed outside the table or at
    /// non-UTF-8 bytes — a real lookup failure, distinct from a symbol
    /// whose name is legitimately the empty string at `strtab[0]`.
    pub name_resolved: bool,
    /// `st_info`, unsplit.
    pub info: u8,
    /// `st_shndx`.
    pub shndx: u16,
    /// `st_value`.
    pub value: u64,
    /// `st_size`.
    pub size: u64,
}

impl ElfSymbol {
    /// Size in bytes of one entry for this class (16 for ELF32, 24 for
    /// ELF64).
    pub fn size_for(class: ElfClass) -> usize {
        match class {
            ElfClass::Elf32 => 16,
            ElfClass::Elf64 => 24,
        }
    }

    /// Parse one symbol table entry at `bytes[off..]`, resolving `st_name`
    /// against `strtab`.
    pub fn parse(
        bytes: &[u8],
        off: usize,
        strtab: &[u8],
        class: ElfClass,
        enc: ElfDataEncoding,
    ) -> Result<Self> {
        let (name_offset, info, shndx, value, size) = match class {
            ElfClass::Elf32 => {
                let name_offset = read_u32(bytes, off, enc)?;
                let value = read_word(bytes, off + 4, class, enc)?;
                let size = read_word(bytes, off + 8, class, enc)?;
                let info = bytes[off + 12];
                let shndx = read_u16(bytes, off + 14, enc)?;
                (name_offset, info, shndx, value, size)
            }
            ElfClass::Elf64 => {
                let name_offset = read_u32(bytes, off, enc)?;
                let info = bytes[off + 4];
                let shndx = read_u16(bytes, off + 6, enc)?;
                let value = read_word(bytes, off + 8, class, enc)?;
                let size = read_word(bytes, off + 16, class, enc)?;
                (name_offset, info, shndx, value, size)
            }
        };
        let resolved = crate::base::read_cstr(strtab, name_offset as usize);
        let name_resolved = resolved.is_some();
        let name = resolved.unwrap_or_default().to_string();
        Ok(Self {
            name,
            name_resolved,
            info,
            shndx,
            value,
            size,
        })
    }

    /// This symbol's `(binding, type)` pair.
    pub fn binding_and_type(&self) -> (ElfSymbolBinding, ElfSymbolType) {
        unpack_st_info(self.info)
    }
}
