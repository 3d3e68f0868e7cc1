//! Relocation entries (`Elf32_Rel(a)`/`Elf64_Rel(a)`) and the `r_info`
//! packing conventions used to address them.

use crate::base::{read_word, rewrite_word, write_word, ElfClass, ElfDataEncoding};
use crate::error::Result;

/// `R_X86_64_NONE` — the relocation type this tool rewrites a neutralized
/// probe-call relocation to.
pub const R_X86_64_NONE: u32 = 0;
/// `R_X86_64_64` — a direct 64-bit absolute reference; the type this tool
/// emits for the new relocations in `.relaset_sdt_instance_set`.
pub const R_X86_64_64: u32 = 1;
/// `R_X86_64_PC32`, one of the relocation types a probe call site's
/// `call`/`jmp rel32` is ordinarily encoded with.
pub const R_X86_64_PC32: u32 = 2;
/// `R_X86_64_PLT32`, the other common encoding for a probe call site.
pub const R_X86_64_PLT32: u32 = 4;

/// `ELF32_R_SYM`/`ELF64_R_SYM`: extract the symbol table index from `r_info`.
pub fn r_sym(r_info: u64, class: ElfClass) -> u32 {
    match class {
        ElfClass::Elf32 => (r_info >> 8) as u32,
        ElfClass::Elf64 => (r_info >> 32) as u32,
    }
}

/// `ELF32_R_TYPE`/`ELF64_R_TYPE`: extract the relocation type from `r_info`.
pub fn r_type(r_info: u64, class: ElfClass) -> u32 {
    match class {
        ElfClass::Elf32 => (r_info & 0xff) as u32,
        ElfClass::Elf64 => (r_info & 0xffff_ffff) as u32,
    }
}

/// `ELF32_R_INFO`/`ELF64_R_INFO`: pack a symbol index and relocation type
/// back into `r_info`.
pub fn r_info(sym: u32, ty: u32, class: ElfClass) -> u64 {
    match class {
        ElfClass::Elf32 => ((sym as u64) << 8) | (ty as u64 & 0xff),
        ElfClass::Elf64 => ((sym as u64) << 32) | (ty as u64),
    }
}

/// One `Elf32_Rel`/`Elf64_Rel` or `Elf32_Rela`/`Elf64_Rela` entry, plus the
/// byte offset within its section's raw data where it was read from (so the
/// scanner can write a patched `r_info` straight back without re-serializing
/// the whole section).
#[derive(Debug, Clone)]
pub struct ElfRelEntry {
    /// `r_offset`: the location, within the target section, to relocate.
    pub offset: u64,
    /// `r_info`, unpacked on demand via [`r_sym`]/[`r_type`].
    pub info: u64,
    /// `r_addend`, present only for RELA entries.
    pub addend: Option<i64>,
    /// Byte offset of this entry within its containing section's data.
    pub entry_offset: usize,
}

impl ElfRelEntry {
    /// Size in bytes of one entry for this class and whether it carries an
    /// addend (RELA vs REL).
    pub fn size_for(class: ElfClass, has_addend: bool) -> usize {
        let word = class.word_width();
        if has_addend {
            word * 3
        } else {
            word * 2
        }
    }

    /// Parse every entry out of a relocation section's raw data.
    ///
    /// Tolerant of a relocation section whose data spans what upstream
    /// `libelf` calls multiple `Elf_Data` chunks: this crate's
    /// container always holds one contiguous buffer per section (see
    /// [`crate::container::ElfObject`]), so a single linear pass over `data`
    /// already iterates every entry in file order regardless of how many
    /// chunks the original producer would have split it into.
    pub fn parse_all(
        data: &[u8],
        has_addend: bool,
        class: ElfClass,
        enc: ElfDataEncoding,
    ) -> Result<Vec<Self>> {
        let entsize = Self::size_for(class, has_addend);
        if entsize == 0 || data.len() % entsize != 0 {
            return Err(crate::error::Error::MalformedRelocationEntry(
                data.len() as u64
            ));
        }
        let mut out = Vec::with_capacity(data.len() / entsize);
        let word = class.word_width();
        for entry_offset in (0..data.len()).step_by(entsize) {
            let offset = read_word(data, entry_offset, class, enc)?;
            let info = read_word(data, entry_offset + word, class, enc)?;
            let addend = if has_addend {
                Some(read_word(data, entry_offset + 2 * word, class, enc)? as i64)
            } else {
                None
            };
            out.push(Self {
                offset,
                info,
                addend,
                entry_offset,
            });
        }
        Ok(out)
    }

    /// Overwrite this entry's `r_info` field in place within the section's
    /// raw data buffer.
    pub fn rewrite_info(&self, data: &mut [u8], new_info: u64, class: ElfClass, enc: ElfDataEncoding) {
        let word = class.word_width();
        rewrite_word(data, self.entry_offset + word, new_info, class, enc);
    }

    /// Serialize a brand-new entry (used by the instance emitter to append
    /// a relocation to `.relaset_sdt_instance_set`).
    pub fn write_new(out: &mut Vec<u8>, offset: u64, info: u64, addend: i64, class: ElfClass, enc: ElfDataEncoding) {
        write_word(out, offset, class, enc);
        write_word(out, info, class, enc);
        write_word(out, addend as u64, class, enc);
    }
}
