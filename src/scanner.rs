//! The relocation scanner and probe-site classifier.

use crate::arch::patcher_for;
use crate::container::ElfObject;
use crate::error::{Error, Result};
use crate::header::relocation::{r_info, r_sym, ElfRelEntry};
use crate::header::section::ElfSectionHeaderType;
use crate::header::symbol::{ElfSymbolBinding, ElfSymbolType};

/// The literal prefix a relocation's symbol name must carry to be a probe
/// call site.
const PROBE_PREFIX: &str = "__dtrace_probe_";

/// One patched call site, recorded for the instance emitter.
#[derive(Debug, Clone)]
pub struct ProbeInstance {
    /// The probe stub symbol's fully-qualified name.
    pub symname: String,
    /// The relocation's original `r_offset` — the file offset, within
    /// `.text`, of the (now-neutralized) 32-bit displacement.
    pub offset: u64,
}

/// Walk every `SHT_REL`/`SHT_RELA` section targeting `.text` and patch every
/// probe call site found. Returns the probe instances in the order their
/// call sites were encountered.
pub fn scan_text_relocations(obj: &mut ElfObject) -> Result<Vec<ProbeInstance>> {
    let class = obj.class();
    let enc = obj.encoding();
    let machine = obj.header.machine;

    let reloc_indices: Vec<usize> = obj
        .sections
        .iter()
        .enumerate()
        .filter(|(_, s)| s.header.ty.is_relocation())
        .map(|(i, _)| i)
        .collect();

    let mut instances = Vec::new();

    for reloc_idx in reloc_indices {
        let reloc_header = obj.sections[reloc_idx].header.clone();
        let target_idx = reloc_header.info as usize;
        if obj.sections.get(target_idx).map(|s| s.name.as_str()) != Some(".text") {
            continue;
        }

        let has_addend = reloc_header.ty == ElfSectionHeaderType::Rela;
        let symtab_idx = reloc_header.link as usize;
        let entries =
            ElfRelEntry::parse_all(&obj.sections[reloc_idx].data, has_addend, class, enc)?;

        let patcher = patcher_for(machine)?;

        for entry in &entries {
            let sym_index = r_sym(entry.info, class);
            let symbol = obj.symbol_at(symtab_idx, sym_index)?;
            if !symbol.name_resolved {
                return Err(Error::UnreadableSymbolName(sym_index));
            }

            // An empty name is a valid, resolved name (e.g. STT_SECTION
            // symbols have st_name == 0) — it just never matches the probe
            // prefix, so it falls through and is skipped like any other
            // ordinary relocation.
            let Some(_probe_name) = symbol.name.strip_prefix(PROBE_PREFIX) else {
                continue;
            };

            let (binding, ty) = symbol.binding_and_type();
            if !(ty == ElfSymbolType::NoType && binding == ElfSymbolBinding::Global) {
                return Err(Error::UnexpectedSymbolTypeOrBinding {
                    probe: symbol.name.clone(),
                    ty: ty.as_u8(),
                    bind: binding.as_u8(),
                });
            }

            let kind =
                patcher.verify_call_site(&obj.sections[target_idx].data, entry.offset, &symbol.name)?;
            patcher.patch_to_nop(&mut obj.sections[target_idx].data, entry.offset, kind);
            log::info!(
                "patched probe call site: {} at offset {:#x}",
                symbol.name,
                entry.offset
            );

            let new_info = r_info(sym_index, patcher.neutralize_relocation_type(), class);
            entry.rewrite_info(&mut obj.sections[reloc_idx].data, new_info, class, enc);

            obj.mark_dirty(reloc_idx);
            obj.mark_dirty(target_idx);

            instances.push(ProbeInstance {
                symname: symbol.name.clone(),
                offset: entry.offset,
            });
        }
    }

    Ok(instances)
}
