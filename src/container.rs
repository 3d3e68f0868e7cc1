//! The mutable, read-write view of a single ELF relocatable object.
//!
//! There is no local libelf binding for this crate to bind against, so this
//! module is its own small ELF container library: it owns the parsed
//! header, the section header table, one owned byte buffer per section, and
//! the dirty-flag/flush machinery the rest of the crate mutates through.

use crate::base::{read_cstr, ElfClass, ElfDataEncoding};
use crate::error::{Error, Result};
use crate::header::elf::ElfHeader;
use crate::header::section::{ElfSectionHeader, ElfSectionHeaderFlags, ElfSectionHeaderType};
use crate::header::symbol::ElfSymbol;
use std::fs;
use std::path::Path;

/// One section: its header, resolved name, and owned data buffer.
#[derive(Debug, Clone)]
pub struct Section {
    /// The section's header. Kept in sync with `data`/`name` by the methods
    /// on [`ElfObject`] — callers should not hand-edit `size`/`name_offset`.
    pub header: ElfSectionHeader,
    /// The section's name, resolved once at open time (or assigned at
    /// append time for newly created sections).
    pub name: String,
    /// The section's raw on-disk bytes (empty for `SHT_NOBITS`).
    pub data: Vec<u8>,
    /// Whether `data` or `header` has been modified since the file was
    /// opened. Newly appended sections are implicitly dirty.
    pub dirty: bool,
}

/// A single relocatable ELF object, open for in-place mutation.
pub struct ElfObject {
    /// The parsed file header. `header.shnum`/`header.shoff` are
    /// recomputed at flush time and should not be trusted until then.
    pub header: ElfHeader,
    /// Sections present in the original file, in their original order.
    pub sections: Vec<Section>,
    /// Sections appended during this run; empty until the instance emitter
    /// runs.
    pub appended: Vec<Section>,
    path: std::path::PathBuf,
}

impl ElfObject {
    /// Class (32/64-bit) of the open object.
    pub fn class(&self) -> ElfClass {
        self.header.ident.class
    }

    /// Data encoding (endianness) of the open object.
    pub fn encoding(&self) -> ElfDataEncoding {
        self.header.ident.data
    }

    /// Open a file for read-write and parse its header, section header
    /// table, and section data. Does not reject non-`ET_REL` inputs — that
    /// check belongs to the driver, which needs to distinguish "skip with a
    /// warning" from every other, fatal failure here.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| Error::io("open object file", e))?;

        let header = ElfHeader::parse(&bytes)?;
        let class = header.ident.class;
        let enc = header.ident.data;

        if header.shnum == 0 {
            return Ok(Self {
                header,
                sections: Vec::new(),
                appended: Vec::new(),
                path: path.to_path_buf(),
            });
        }

        let shentsize = ElfSectionHeader::size_for(class);
        let mut raw_headers = Vec::with_capacity(header.shnum as usize);
        for i in 0..header.shnum as usize {
            let off = header.shoff as usize + i * shentsize;
            raw_headers.push(ElfSectionHeader::parse(&bytes, off, class, enc)?);
        }

        let shstrndx = header.shstrndx as usize;
        let shstrtab_raw = raw_headers
            .get(shstrndx)
            .ok_or(Error::StringTableIndexInvalid(header.shstrndx))?;
        let shstrtab_bytes = section_bytes(&bytes, shstrtab_raw)?;

        let mut sections = Vec::with_capacity(raw_headers.len());
        for sh in raw_headers {
            let name = read_cstr(&shstrtab_bytes, sh.name_offset as usize)
                .unwrap_or("")
                .to_string();
            let data = section_bytes(&bytes, &sh)?;
            sections.push(Section {
                header: sh,
                name,
                data,
                dirty: false,
            });
        }

        Ok(Self {
            header,
            sections,
            appended: Vec::new(),
            path: path.to_path_buf(),
        })
    }

    /// Linear scan for a section by name.
    pub fn section_index_by_name(&self, name: &str) -> Option<usize> {
        self.sections.iter().position(|s| s.name == name)
    }

    /// The relocation section (if any, among originally-present sections)
    /// whose `sh_info` targets `section_index`.
    pub fn relocation_section_for(&self, section_index: usize) -> Option<usize> {
        self.sections.iter().position(|s| {
            s.header.ty.is_relocation() && s.header.info as usize == section_index
        })
    }

    /// Bounds-checked symbol lookup. `symtab_index` names the
    /// `SHT_SYMTAB` section; `sym_index` is `ELF64_R_SYM(r_info)`.
    pub fn symbol_at(&self, symtab_index: usize, sym_index: u32) -> Result<ElfSymbol> {
        let symtab = self
            .sections
            .get(symtab_index)
            .ok_or(Error::SectionIndexInvalid {
                index: symtab_index as u32,
                count: self.sections.len(),
            })?;
        let entsize = ElfSymbol::size_for(self.class());
        let count = symtab.data.len() / entsize;
        if sym_index as usize >= count {
            return Err(Error::SymbolIndexInvalid {
                index: sym_index,
                count,
            });
        }
        let strtab = self
            .sections
            .get(symtab.header.link as usize)
            .ok_or(Error::SectionIndexInvalid {
                index: symtab.header.link,
                count: self.sections.len(),
            })?;
        ElfSymbol::parse(
            &symtab.data,
            sym_index as usize * entsize,
            &strtab.data,
            self.class(),
            self.encoding(),
        )
    }

    /// Mark a section's data dirty. Both the relocation section's data and
    /// the target section's data must be marked dirty on every write.
    pub fn mark_dirty(&mut self, section_index: usize) {
        self.sections[section_index].dirty = true;
    }

    /// Append `name` (with its terminating NUL) to the section
    /// header string table and return the offset it was placed at.
    /// Existing offsets remain valid — this only ever grows the buffer.
    pub fn grow_shstrtab(&mut self, name: &str) -> Result<u32> {
        let idx = self.header.shstrndx as usize;
        let shstrtab = self
            .sections
            .get_mut(idx)
            .ok_or(Error::StringTableIndexInvalid(self.header.shstrndx))?;
        let offset = shstrtab.data.len() as u32;
        shstrtab.data.extend_from_slice(name.as_bytes());
        shstrtab.data.push(0);
        shstrtab.header.size = shstrtab.data.len() as u64;
        shstrtab.dirty = true;
        Ok(offset)
    }

    /// Append a brand-new section (its name already grown into the string
    /// table by the caller). Returns the section's eventual index (current
    /// section count plus however many sections are already queued to
    /// append).
    pub fn append_section(
        &mut self,
        name: String,
        name_offset: u32,
        ty: ElfSectionHeaderType,
        flags: ElfSectionHeaderFlags,
        addralign: u64,
        entsize: u64,
        link: u32,
        info: u32,
        data: Vec<u8>,
    ) -> usize {
        let header = ElfSectionHeader {
            name_offset,
            ty,
            flags,
            addr: 0,
            offset: 0, // assigned at flush time
            size: data.len() as u64,
            link,
            info,
            addralign,
            entsize,
        };
        self.appended.push(Section {
            header,
            name,
            data,
            dirty: true,
        });
        self.sections.len() + self.appended.len() - 1
    }

    /// Whether any section (original or appended) has unflushed changes.
    pub fn has_pending_changes(&self) -> bool {
        !self.appended.is_empty() || self.sections.iter().any(|s| s.dirty)
    }

    /// Stage 5: write every dirty section and every appended section back
    /// to the file.
    ///
    /// Pre-existing section data is never relocated or resized in place —
    /// patches only overwrite bytes already present, so every original
    /// section except the section-header string table keeps its exact
    /// original file offset and length. The grown string table and the
    /// newly appended sections are written after the original file's
    /// content, followed by a freshly laid out section header table; only
    /// *existing* offsets need to remain valid, not the string table's own
    /// file position, so relocating it is in-contract. This mirrors how a
    /// production `libelf`-based rewriter lays out `elf_update(ELF_C_WRITE)`
    /// once new sections exist.
    pub fn flush(&mut self) -> Result<()> {
        if !self.has_pending_changes() {
            return Ok(());
        }

        let class = self.class();
        let enc = self.encoding();
        let ehsize = ElfHeader::size_for(class);

        // 1. Patch already-present, non-growing sections in place.
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| Error::io("reopen object file for write", e))?;
        use std::io::{Seek, SeekFrom, Write};

        let shstrndx = self.header.shstrndx as usize;
        for (idx, section) in self.sections.iter().enumerate() {
            if !section.dirty || idx == shstrndx {
                continue;
            }
            file.seek(SeekFrom::Start(section.header.offset))
                .map_err(|e| Error::io("seek to section data", e))?;
            file.write_all(&section.data)
                .map_err(|e| Error::io("write patched section data", e))?;
        }

        // 2. Lay out the grown string table and the appended sections
        //    after the end of the original file.
        let tail_offset = file
            .seek(SeekFrom::End(0))
            .map_err(|e| Error::io("seek to end of file", e))?;
        let mut tail = Vec::new();

        if self.sections[shstrndx].dirty {
            self.sections[shstrndx].header.offset = tail_offset + tail.len() as u64;
            tail.extend_from_slice(&self.sections[shstrndx].data);
        }
        for section in &mut self.appended {
            align_to(&mut tail, section.header.addralign.max(1));
            section.header.offset = tail_offset + tail.len() as u64;
            tail.extend_from_slice(&section.data);
        }

        // 3. Lay out the new section header table right after that.
        align_to(&mut tail, 8);
        let new_shoff = tail_offset + tail.len() as u64;
        let total_sections = self.sections.len() + self.appended.len();
        for section in self.sections.iter().chain(self.appended.iter()) {
            section.header.write(&mut tail, class, enc);
        }

        // 4. Rewrite the file header with the updated section count and
        //    table offset.
        self.header.shoff = new_shoff;
        self.header.shnum = total_sections as u16;
        let mut header_bytes = Vec::with_capacity(ehsize);
        self.header.write(&mut header_bytes);

        file.seek(SeekFrom::Start(0))
            .map_err(|e| Error::io("seek to file header", e))?;
        file.write_all(&header_bytes)
            .map_err(|e| Error::io("write file header", e))?;

        file.seek(SeekFrom::Start(tail_offset))
            .map_err(|e| Error::io("seek to appended data", e))?;
        file.write_all(&tail)
            .map_err(|e| Error::io("write appended sections", e))?;

        file.flush().map_err(|e| Error::io("flush object file", e))?;

        for section in &mut self.sections {
            section.dirty = false;
        }
        self.appended.clear();
        Ok(())
    }
}

fn section_bytes(file: &[u8], header: &ElfSectionHeader) -> Result<Vec<u8>> {
    if header.ty == ElfSectionHeaderType::NoBits || header.size == 0 {
        return Ok(Vec::new());
    }
    let start = header.offset as usize;
    let end = start + header.size as usize;
    file.get(start..end)
        .map(|s| s.to_vec())
        .ok_or_else(|| Error::io("read section data", std::io::ErrorKind::UnexpectedEof.into()))
}

fn align_to(buf: &mut Vec<u8>, align: u64) {
    if align <= 1 {
        return;
    }
    let pad = (align - (buf.len() as u64 % align)) % align;
    buf.extend(std::iter::repeat(0u8).take(pad as usize));
}
