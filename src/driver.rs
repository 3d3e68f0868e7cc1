//! The per-object driver: opens one file, runs every stage, and reports what
//! happened.

use crate::container::ElfObject;
use crate::error::Result;
use crate::header::elf::ElfType;
use crate::instance::emit_instances;
use crate::scanner::scan_text_relocations;
use std::path::Path;

/// The result of running the pipeline against one object.
///
/// A non-relocatable object is a warning rather than a fatal error, so it
/// gets its own variant here instead of living in [`crate::error::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The object's `e_type` was not `ET_REL`; it was left untouched.
    NotRelocatable,
    /// The object was a relocatable object; `patched` probe call sites were
    /// found and neutralized (zero if none were present — in that case the
    /// file is left byte-identical).
    Processed {
        /// Number of probe call sites patched.
        patched: usize,
    },
}

/// Run stages 1-5 against a single object file.
pub fn process_object(path: impl AsRef<Path>) -> Result<Outcome> {
    let path = path.as_ref();
    let mut obj = ElfObject::open(path)?;

    if obj.header.ty != ElfType::Relocatable {
        log::warn!("{}: not a relocatable object, skipping", path.display());
        return Ok(Outcome::NotRelocatable);
    }

    let instances = scan_text_relocations(&mut obj)?;
    if instances.is_empty() {
        log::debug!("{}: no probe call sites found", path.display());
        return Ok(Outcome::Processed { patched: 0 });
    }

    emit_instances(&mut obj, &instances)?;
    obj.flush()?;

    log::info!(
        "{}: patched {} probe call site(s)",
        path.display(),
        instances.len()
    );
    Ok(Outcome::Processed {
        patched: instances.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{ElfClass, ElfDataEncoding};
    use crate::header::elf::{ElfHeader, ElfIdent, ElfMachine, ElfType as Ty};
    use crate::header::section::{ElfSectionHeader, ElfSectionHeaderFlags, ElfSectionHeaderType};
    use std::io::Write as _;

    fn write_object(ty: Ty, path: &std::path::Path) {
        let class = ElfClass::Elf64;
        let enc = ElfDataEncoding::Little;

        let mut shstrtab = vec![0u8];
        let name_off = shstrtab.len() as u32;
        shstrtab.extend_from_slice(b".shstrtab\0");

        let ehsize = ElfHeader::size_for(class);
        let shentsize = ElfSectionHeader::size_for(class);
        let shstrtab_off = ehsize as u64;
        let shoff = shstrtab_off + shstrtab.len() as u64;

        let headers = vec![
            ElfSectionHeader {
                name_offset: 0,
                ty: ElfSectionHeaderType::Null,
                flags: ElfSectionHeaderFlags::empty(),
                addr: 0,
                offset: 0,
                size: 0,
                link: 0,
                info: 0,
                addralign: 0,
                entsize: 0,
            },
            ElfSectionHeader {
                name_offset: name_off,
                ty: ElfSectionHeaderType::StrTab,
                flags: ElfSectionHeaderFlags::empty(),
                addr: 0,
                offset: shstrtab_off,
                size: shstrtab.len() as u64,
                link: 0,
                info: 0,
                addralign: 1,
                entsize: 0,
            },
        ];

        let header = ElfHeader {
            ident: ElfIdent {
                class,
                data: enc,
                version: 1,
                os_abi: 0,
                abi_version: 0,
            },
            ty,
            machine: ElfMachine::X86_64,
            version: 1,
            entry: 0,
            phoff: 0,
            shoff,
            flags: 0,
            ehsize: ehsize as u16,
            phentsize: 0,
            phnum: 0,
            shentsize: shentsize as u16,
            shnum: headers.len() as u16,
            shstrndx: 1,
        };

        let mut bytes = Vec::new();
        header.write(&mut bytes);
        bytes.extend_from_slice(&shstrtab);
        for h in &headers {
            h.write(&mut bytes, class, enc);
        }
        std::fs::File::create(path).unwrap().write_all(&bytes).unwrap();
    }

    #[test]
    fn skips_non_relocatable_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obj.so");
        write_object(Ty::Dynamic, &path);

        let before = std::fs::read(&path).unwrap();
        let outcome = process_object(&path).unwrap();
        assert_eq!(outcome, Outcome::NotRelocatable);
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn leaves_object_untouched_when_no_probes_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obj.o");
        write_object(Ty::Relocatable, &path);

        let before = std::fs::read(&path).unwrap();
        let outcome = process_object(&path).unwrap();
        assert_eq!(outcome, Outcome::Processed { patched: 0 });
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    /// Builds a full object with one probe call site in `.text` and a
    /// matching `set_sdt_probes_set`/`sdt_foo` pair, runs the whole
    /// pipeline end to end through the public entry point, and checks the
    /// file that comes out the other side.
    #[test]
    fn patches_end_to_end_and_emits_instance_sections() {
        use crate::base::{write_u16, write_u32, write_word};
        use crate::header::relocation::{r_info, R_X86_64_NONE, R_X86_64_PLT32};

        let class = ElfClass::Elf64;
        let enc = ElfDataEncoding::Little;

        let text_data: Vec<u8> = vec![0x55, 0x48, 0x89, 0xe5, 0xe8, 0, 0, 0, 0, 0x5d, 0xc3];
        let probes_data = vec![0u8; 8];

        let mut strtab = vec![0u8];
        let probe_name_off = strtab.len() as u32;
        strtab.extend_from_slice(b"__dtrace_probe_foo\0");
        let sdt_name_off = strtab.len() as u32;
        strtab.extend_from_slice(b"sdt_foo\0");

        let mut symtab = Vec::new();
        symtab.extend(std::iter::repeat(0u8).take(24)); // index 0: null
        write_u32(&mut symtab, probe_name_off, enc); // index 1: __dtrace_probe_foo
        symtab.push(0x10); // STB_GLOBAL | STT_NOTYPE
        symtab.push(0);
        write_u16(&mut symtab, 0, enc);
        write_word(&mut symtab, 0, class, enc);
        write_word(&mut symtab, 0, class, enc);
        write_u32(&mut symtab, sdt_name_off, enc); // index 2: sdt_foo
        symtab.push(0x11); // STB_GLOBAL | STT_OBJECT
        symtab.push(0);
        write_u16(&mut symtab, 2, enc); // defined in section 2 (set_sdt_probes_set)
        write_word(&mut symtab, 0, class, enc);
        write_word(&mut symtab, 8, class, enc);

        let mut rela_text = Vec::new();
        write_word(&mut rela_text, 5u64, class, enc); // r_offset
        write_word(&mut rela_text, r_info(1, R_X86_64_PLT32, class), class, enc);
        write_word(&mut rela_text, 0u64, class, enc);

        let mut rela_probes = Vec::new();
        write_word(&mut rela_probes, 0u64, class, enc);
        write_word(&mut rela_probes, r_info(2, R_X86_64_PLT32, class), class, enc);
        write_word(&mut rela_probes, 0u64, class, enc);

        let mut shstrtab = vec![0u8];
        let text_name_off = shstrtab.len() as u32;
        shstrtab.extend_from_slice(b".text\0");
        let probes_name_off = shstrtab.len() as u32;
        shstrtab.extend_from_slice(b"set_sdt_probes_set\0");
        let symtab_name_off = shstrtab.len() as u32;
        shstrtab.extend_from_slice(b".symtab\0");
        let strtab_name_off = shstrtab.len() as u32;
        shstrtab.extend_from_slice(b".strtab\0");
        let rela_text_name_off = shstrtab.len() as u32;
        shstrtab.extend_from_slice(b".rela.text\0");
        let rela_probes_name_off = shstrtab.len() as u32;
        shstrtab.extend_from_slice(b".relaset_sdt_probes_set\0");
        let shstrtab_name_off = shstrtab.len() as u32;
        shstrtab.extend_from_slice(b".shstrtab\0");

        let ehsize = ElfHeader::size_for(class);
        let shentsize = ElfSectionHeader::size_for(class);

        let text_off = ehsize as u64;
        let probes_off = text_off + text_data.len() as u64;
        let symtab_off = probes_off + probes_data.len() as u64;
        let strtab_off = symtab_off + symtab.len() as u64;
        let rela_text_off = strtab_off + strtab.len() as u64;
        let rela_probes_off = rela_text_off + rela_text.len() as u64;
        let shstrtab_off = rela_probes_off + rela_probes.len() as u64;
        let shoff = shstrtab_off + shstrtab.len() as u64;

        // Section indices: 0 null, 1 .text, 2 set_sdt_probes_set, 3 .symtab,
        // 4 .strtab, 5 .rela.text, 6 .relaset_sdt_probes_set, 7 .shstrtab.
        let headers = vec![
            ElfSectionHeader {
                name_offset: 0,
                ty: ElfSectionHeaderType::Null,
                flags: ElfSectionHeaderFlags::empty(),
                addr: 0,
                offset: 0,
                size: 0,
                link: 0,
                info: 0,
                addralign: 0,
                entsize: 0,
            },
            ElfSectionHeader {
                name_offset: text_name_off,
                ty: ElfSectionHeaderType::ProgBits,
                flags: ElfSectionHeaderFlags::ALLOC | ElfSectionHeaderFlags::EXECINSTR,
                addr: 0,
                offset: text_off,
                size: text_data.len() as u64,
                link: 0,
                info: 0,
                addralign: 16,
                entsize: 0,
            },
            ElfSectionHeader {
                name_offset: probes_name_off,
                ty: ElfSectionHeaderType::ProgBits,
                flags: ElfSectionHeaderFlags::ALLOC,
                addr: 0,
                offset: probes_off,
                size: probes_data.len() as u64,
                link: 0,
                info: 0,
                addralign: 8,
                entsize: 0,
            },
            ElfSectionHeader {
                name_offset: symtab_name_off,
                ty: ElfSectionHeaderType::SymTab,
                flags: ElfSectionHeaderFlags::empty(),
                addr: 0,
                offset: symtab_off,
                size: symtab.len() as u64,
                link: 4,
                info: 2,
                addralign: 8,
                entsize: 24,
            },
            ElfSectionHeader {
                name_offset: strtab_name_off,
                ty: ElfSectionHeaderType::StrTab,
                flags: ElfSectionHeaderFlags::empty(),
                addr: 0,
                offset: strtab_off,
                size: strtab.len() as u64,
                link: 0,
                info: 0,
                addralign: 1,
                entsize: 0,
            },
            ElfSectionHeader {
                name_offset: rela_text_name_off,
                ty: ElfSectionHeaderType::Rela,
                flags: ElfSectionHeaderFlags::empty(),
                addr: 0,
                offset: rela_text_off,
                size: rela_text.len() as u64,
                link: 3,
                info: 1,
                addralign: 8,
                entsize: 24,
            },
            ElfSectionHeader {
                name_offset: rela_probes_name_off,
                ty: ElfSectionHeaderType::Rela,
                flags: ElfSectionHeaderFlags::empty(),
                addr: 0,
                offset: rela_probes_off,
                size: rela_probes.len() as u64,
                link: 3,
                info: 2,
                addralign: 8,
                entsize: 24,
            },
            ElfSectionHeader {
                name_offset: shstrtab_name_off,
                ty: ElfSectionHeaderType::StrTab,
                flags: ElfSectionHeaderFlags::empty(),
                addr: 0,
                offset: shstrtab_off,
                size: shstrtab.len() as u64,
                link: 0,
                info: 0,
                addralign: 1,
                entsize: 0,
            },
        ];

        let header = ElfHeader {
            ident: ElfIdent {
                class,
                data: enc,
                version: 1,
                os_abi: 0,
                abi_version: 0,
            },
            ty: Ty::Relocatable,
            machine: ElfMachine::X86_64,
            version: 1,
            entry: 0,
            phoff: 0,
            shoff,
            flags: 0,
            ehsize: ehsize as u16,
            phentsize: 0,
            phnum: 0,
            shentsize: shentsize as u16,
            shnum: headers.len() as u16,
            shstrndx: 7,
        };

        let mut bytes = Vec::new();
        header.write(&mut bytes);
        bytes.extend_from_slice(&text_data);
        bytes.extend_from_slice(&probes_data);
        bytes.extend_from_slice(&symtab);
        bytes.extend_from_slice(&strtab);
        bytes.extend_from_slice(&rela_text);
        bytes.extend_from_slice(&rela_probes);
        bytes.extend_from_slice(&shstrtab);
        for h in &headers {
            h.write(&mut bytes, class, enc);
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obj.o");
        std::fs::File::create(&path).unwrap().write_all(&bytes).unwrap();

        let outcome = process_object(&path).unwrap();
        assert_eq!(outcome, Outcome::Processed { patched: 1 });

        let reopened = ElfObject::open(&path).unwrap();
        let text_idx = reopened.section_index_by_name(".text").unwrap();
        assert_eq!(
            &reopened.sections[text_idx].data[4..9],
            &[0x90, 0x90, 0x90, 0x90, 0x90]
        );

        let rela_text_idx = reopened.section_index_by_name(".rela.text").unwrap();
        let entries = crate::header::relocation::ElfRelEntry::parse_all(
            &reopened.sections[rela_text_idx].data,
            true,
            class,
            enc,
        )
        .unwrap();
        assert_eq!(
            crate::header::relocation::r_type(entries[0].info, class),
            R_X86_64_NONE
        );

        let instance_idx = reopened.section_index_by_name("set_sdt_instance_set").unwrap();
        assert_eq!(reopened.sections[instance_idx].data.len(), 16);
        let probe_field =
            crate::base::read_word(&reopened.sections[instance_idx].data, 0, class, enc).unwrap();
        assert_eq!(probe_field, 0);
        let offset_field =
            crate::base::read_word(&reopened.sections[instance_idx].data, 8, class, enc).unwrap();
        assert_eq!(offset_field, 5);

        let rela_instance_idx = reopened
            .section_index_by_name(".relaset_sdt_instance_set")
            .unwrap();
        let instance_relas = crate::header::relocation::ElfRelEntry::parse_all(
            &reopened.sections[rela_instance_idx].data,
            true,
            class,
            enc,
        )
        .unwrap();
        assert_eq!(instance_relas.len(), 1);
        assert_eq!(
            crate::header::relocation::r_sym(instance_relas[0].info, class),
            2 // sdt_foo's symbol index
        );

        // Running the tool again on its own output is rejected, not silently
        // re-applied.
        let rerun = process_object(&path);
        assert!(matches!(
            rerun,
            Err(crate::error::Error::AlreadyPatched { .. })
        ));
    }
}
