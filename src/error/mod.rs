//! Error type for every fatal condition the rewriter can encounter.
//!
//! Per the design's error taxonomy there is no local recovery: once a
//! probe-related invariant is violated the whole process terminates, because
//! the alternative is a half-patched object. The one non-fatal condition
//! (input is not `ET_REL`) is therefore modeled outside this enum, as a
//! variant of [`crate::driver::Outcome`], rather than as an `Error`.

use std::io;

#[derive(thiserror::Error, Debug)]
/// Every way a single object's pipeline run can fail fatally.
pub enum Error {
    #[error("I/O error during {operation}: {source}")]
    /// A read, write, or seek against the object file failed.
    Io {
        /// What the tool was trying to do when the I/O call failed.
        operation: &'static str,
        /// The underlying I/O error.
        source: io::Error,
    },

    #[error("not an ELF file (bad magic)")]
    /// The first four bytes were not `0x7f 'E' 'L' 'F'`.
    BadMagic,

    #[error("invalid ELF class {0}")]
    /// `e_ident[EI_CLASS]` was neither `ELFCLASS32` nor `ELFCLASS64`.
    InvalidClass(u8),

    #[error("invalid ELF data encoding {0}")]
    /// `e_ident[EI_DATA]` was neither `ELFDATA2LSB` nor `ELFDATA2MSB`.
    InvalidDataEncoding(u8),

    #[error("invalid e_type {0}")]
    /// `e_type` was not one of the values defined by the ELF specification.
    InvalidElfType(u16),

    #[error("section header string table index {0} is out of range")]
    /// `e_shstrndx` did not name a section present in the file.
    StringTableIndexInvalid(u16),

    #[error("section index {index} out of range (section header table has {count} entries)")]
    /// A `sh_link`/`sh_info` or symbol-derived section index did not resolve.
    SectionIndexInvalid {
        /// The index that failed to resolve.
        index: u32,
        /// The number of sections actually present.
        count: usize,
    },

    #[error("symbol index {index} out of range (symbol table has {count} entries)")]
    /// `ELF64_R_SYM(r_info)` named a symbol past the end of the symbol table.
    SymbolIndexInvalid {
        /// The index that failed to resolve.
        index: u32,
        /// The number of symbols actually present.
        count: usize,
    },

    #[error("symbol at index {0} has an unresolvable name (st_name points outside its string table)")]
    /// The symbol's `st_name` did not resolve to a valid, NUL-terminated
    /// string within its string table. A symbol whose `st_name` is `0` (an
    /// empty but valid name, e.g. `STT_SECTION` symbols) does not trigger
    /// this — only a genuinely out-of-bounds or non-UTF-8 offset does.
    UnreadableSymbolName(u32),

    #[error("section \"{0}\" not found")]
    /// A section that is required to exist (by name) was absent.
    SectionNotFound(String),

    #[error("no relocation section targets section index {0}")]
    /// No `SHT_REL`/`SHT_RELA` section had `sh_info` pointing at the given
    /// section index.
    RelocationSectionNotFound(u32),

    #[error("probe symbol \"{probe}\" has unexpected st_info (type {ty}, binding {bind}); expected STT_NOTYPE/STB_GLOBAL")]
    /// The probe stub symbol failed the type/binding sanity check.
    UnexpectedSymbolTypeOrBinding {
        /// The probe symbol's name.
        probe: String,
        /// The observed `ELF64_ST_TYPE` nibble.
        ty: u8,
        /// The observed `ELF64_ST_BIND` nibble.
        bind: u8,
    },

    #[error("machine type {0} is not supported by this rewriter (x86-64 only)")]
    /// `e_machine` named an architecture with no registered [`crate::arch::Patcher`].
    UnsupportedMachine(u16),

    #[error("call site at offset {offset:#x} for probe \"{probe}\" has opcode {opcode:#04x}, expected 0xe8 (call) or 0xe9 (jmp)")]
    /// The byte preceding `r_offset` was neither `E8` nor `E9`.
    UnexpectedOpcode {
        /// The probe symbol's name.
        probe: String,
        /// The relocation's `r_offset`.
        offset: u64,
        /// The byte actually observed.
        opcode: u8,
    },

    #[error("call site at offset {offset:#x} for probe \"{probe}\" already looks patched (displacement bytes are not zero); this tool does not support re-running on its own output")]
    /// The pre-patch sanity check failed because the displacement was
    /// already zeroed out by NOPs, i.e. this object was already patched.
    /// Distinguished from [`Error::NonZeroDisplacement`], which means the
    /// object was linked (or otherwise mutated) by something else.
    AlreadyPatched {
        /// The probe symbol's name.
        probe: String,
        /// The relocation's `r_offset`.
        offset: u64,
    },

    #[error("call site at offset {offset:#x} for probe \"{probe}\" has a non-zero pre-patch displacement; the object appears to have already been linked")]
    /// The four bytes at `r_offset` were not all zero, and the opcode check
    /// ruled out "already patched".
    NonZeroDisplacement {
        /// The probe symbol's name.
        probe: String,
        /// The relocation's `r_offset`.
        offset: u64,
    },

    #[error("object has {0} patched probe site(s) but no \"set_sdt_probes_set\" section")]
    /// The sibling probe-definition linker set is missing.
    ProbeSetMissing(usize),

    #[error("no relocation in the probe-set relocation section names a symbol matching probe \"{0}\"")]
    /// The cross-section join found no `sdt_<name>` match.
    NoMatchingProbeRelocation(String),

    #[error("relocation entry size ({0}) does not match a REL or RELA record for this class")]
    /// A relocation section's `sh_entsize`/data did not line up with
    /// `Elf32_Rel(a)`/`Elf64_Rel(a)`.
    MalformedRelocationEntry(u64),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap an [`io::Error`] with the operation that produced it.
    pub fn io(operation: &'static str, source: io::Error) -> Self {
        Self::Io { operation, source }
    }
}
