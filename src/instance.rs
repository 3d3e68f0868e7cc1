//! The instance emitter: builds `set_sdt_instance_set` and its RELA
//! companion from the probe instances the scanner recorded.

use crate::base::write_word;
use crate::container::ElfObject;
use crate::error::{Error, Result};
use crate::header::relocation::{r_info, r_sym, ElfRelEntry, R_X86_64_64};
use crate::header::section::{ElfSectionHeaderFlags, ElfSectionHeaderType};
use crate::scanner::ProbeInstance;

const INSTANCE_SECTION_NAME: &str = "set_sdt_instance_set";
const INSTANCE_RELA_SECTION_NAME: &str = ".relaset_sdt_instance_set";
const PROBE_SET_SECTION_NAME: &str = "set_sdt_probes_set";
const PROBE_PREFIX: &str = "__dtrace_probe_";
const SDT_PREFIX: &str = "sdt_";

/// Append `set_sdt_instance_set` and `.relaset_sdt_instance_set` to `obj`
/// and populate them from `instances`. A no-op if `instances` is empty —
/// this stage is skipped entirely when no probes were found.
///
/// Also appends one `R_X86_64_64` relocation per instance into
/// `.relaset_sdt_instance_set`, referencing the same symbol index as the
/// matched `sdt_<name>` relocation in `set_sdt_probes_set`'s relocation
/// section, with `r_offset` equal to the descriptor's `probe` field offset
/// within the new instance section.
pub fn emit_instances(obj: &mut ElfObject, instances: &[ProbeInstance]) -> Result<()> {
    if instances.is_empty() {
        return Ok(());
    }

    let class = obj.class();
    let enc = obj.encoding();
    let word = class.word_width() as u64;
    let descriptor_size = word * 2;

    let probe_set_idx = obj
        .section_index_by_name(PROBE_SET_SECTION_NAME)
        .ok_or(Error::ProbeSetMissing(instances.len()))?;
    let probe_reloc_idx = obj
        .relocation_section_for(probe_set_idx)
        .ok_or(Error::RelocationSectionNotFound(probe_set_idx as u32))?;

    let probe_reloc_header = obj.sections[probe_reloc_idx].header.clone();
    let probe_symtab_idx = probe_reloc_header.link as usize;
    let probe_has_addend = probe_reloc_header.ty == ElfSectionHeaderType::Rela;
    let probe_entries = ElfRelEntry::parse_all(
        &obj.sections[probe_reloc_idx].data,
        probe_has_addend,
        class,
        enc,
    )?;

    let mut instance_data = Vec::with_capacity(instances.len() * descriptor_size as usize);
    let mut rela_data = Vec::new();

    for instance in instances {
        let probe_suffix = instance
            .symname
            .strip_prefix(PROBE_PREFIX)
            .unwrap_or(&instance.symname);

        let matched_sym = probe_entries
            .iter()
            .find_map(|entry| {
                let sym_index = r_sym(entry.info, class);
                let symbol = obj.symbol_at(probe_symtab_idx, sym_index).ok()?;
                let sdt_suffix = symbol.name.strip_prefix(SDT_PREFIX)?;
                (sdt_suffix == probe_suffix).then_some(sym_index)
            })
            .ok_or_else(|| Error::NoMatchingProbeRelocation(instance.symname.clone()))?;

        log::info!(
            "matched probe instance {} to symbol index {} in {}",
            instance.symname,
            matched_sym,
            PROBE_SET_SECTION_NAME
        );

        let descriptor_offset = instance_data.len() as u64;
        write_word(&mut instance_data, 0, class, enc); // probe: resolved by the final linker
        write_word(&mut instance_data, instance.offset, class, enc);

        let rela_info = r_info(matched_sym, R_X86_64_64, class);
        ElfRelEntry::write_new(&mut rela_data, descriptor_offset, rela_info, 0, class, enc);
    }

    let instance_name_off = obj.grow_shstrtab(INSTANCE_SECTION_NAME)?;
    let instance_idx = obj.append_section(
        INSTANCE_SECTION_NAME.to_string(),
        instance_name_off,
        ElfSectionHeaderType::ProgBits,
        ElfSectionHeaderFlags::ALLOC,
        8,
        descriptor_size,
        0,
        0,
        instance_data,
    );
    log::info!("created section {}", INSTANCE_SECTION_NAME);

    let rela_name_off = obj.grow_shstrtab(INSTANCE_RELA_SECTION_NAME)?;
    obj.append_section(
        INSTANCE_RELA_SECTION_NAME.to_string(),
        rela_name_off,
        ElfSectionHeaderType::Rela,
        ElfSectionHeaderFlags::empty(),
        8,
        ElfRelEntry::size_for(class, true) as u64,
        probe_symtab_idx as u32,
        instance_idx as u32,
        rela_data,
    );
    log::info!("created section {}", INSTANCE_RELA_SECTION_NAME);

    Ok(())
}
