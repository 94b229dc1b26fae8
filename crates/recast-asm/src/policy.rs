use recast_ir::{BinaryFormat, Module};
use std::collections::BTreeSet;

/// What the printer leaves out. Skip sets accumulate from the named policy
/// plus caller additions; keep sets always win over skips, including the
/// defaults carried by a named policy.
#[derive(Debug, Clone, Default)]
pub struct PrintingPolicy {
    pub skip_functions: BTreeSet<String>,
    pub skip_symbols: BTreeSet<String>,
    pub skip_sections: BTreeSet<String>,
    pub keep_functions: BTreeSet<String>,
    pub keep_symbols: BTreeSet<String>,
    pub keep_sections: BTreeSet<String>,
    /// Sections whose contents may be regenerated by the linker.
    pub array_sections: BTreeSet<String>,
    /// Extra arguments for the external compiler/linker.
    pub extra_link_args: Vec<String>,
}

const PLT_SECTIONS: &[&str] = &[".plt", ".plt.sec", ".plt.got"];

impl PrintingPolicy {
    /// The named policies of the original tool. `dynamic` skips everything a
    /// conventional toolchain regenerates, `static` assumes `-nostartfiles`
    /// relinking of a static binary, `complete` reprints all user code but
    /// drops linker-owned tables.
    pub fn named(format: BinaryFormat, name: &str) -> Option<Self> {
        match (format, name) {
            (BinaryFormat::Elf, "dynamic") => Some(Self {
                skip_functions: names([
                    "call_weak_fn",
                    "deregister_tm_clones",
                    "_dl_relocate_static_pie",
                    "__do_global_dtors_aux",
                    "frame_dummy",
                    "_start",
                    "register_tm_clones",
                    "__libc_csu_fini",
                    "__libc_csu_init",
                ]),
                skip_symbols: names([
                    "__bss_start",
                    "__data_start",
                    "__dso_handle",
                    "_fp_hw",
                    "_IO_stdin_used",
                    "__TMC_END__",
                ]),
                skip_sections: elf_dynamic_skip_sections(),
                array_sections: names([".fini_array", ".init_array"]),
                ..Default::default()
            }),
            (BinaryFormat::Elf, "static") => Some(Self {
                skip_sections: names([".eh_frame", ".rela.plt"]),
                extra_link_args: vec!["-static".into(), "-nostartfiles".into()],
                ..Default::default()
            }),
            (BinaryFormat::Elf, "complete") => Some(Self {
                skip_sections: elf_complete_skip_sections(),
                extra_link_args: vec!["-nostartfiles".into()],
                ..Default::default()
            }),
            (BinaryFormat::Pe, "dynamic") => Some(Self {
                skip_sections: names([".idata", ".pdata", ".reloc", ".rsrc"]),
                ..Default::default()
            }),
            _ => None,
        }
    }

    /// Policy used when the caller names none: `static` for a static ELF
    /// module (no `.dynamic` section), otherwise `complete`/`dynamic`.
    pub fn default_for(module: &Module) -> Self {
        match module.format {
            BinaryFormat::Elf => {
                let name = if module.has_section(".dynamic") {
                    "complete"
                } else {
                    "static"
                };
                Self::named(BinaryFormat::Elf, name).unwrap_or_default()
            }
            BinaryFormat::Pe => {
                Self::named(BinaryFormat::Pe, "dynamic").unwrap_or_default()
            }
        }
    }

    pub fn should_skip_section(&self, name: &str) -> bool {
        !self.keep_sections.contains(name) && self.skip_sections.contains(name)
    }

    pub fn should_skip_function(&self, name: &str) -> bool {
        !self.keep_functions.contains(name) && self.skip_functions.contains(name)
    }

    pub fn should_skip_symbol(&self, name: &str) -> bool {
        !self.keep_symbols.contains(name) && self.skip_symbols.contains(name)
    }
}

fn names<const N: usize>(list: [&str; N]) -> BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn elf_dynamic_skip_sections() -> BTreeSet<String> {
    let mut sections = names([
        ".comment",
        ".eh_frame_hdr",
        ".eh_frame",
        ".fini",
        ".got",
        ".got.plt",
        ".init",
        ".rela.dyn",
        ".rela.plt",
    ]);
    sections.extend(PLT_SECTIONS.iter().map(|s| s.to_string()));
    sections
}

fn elf_complete_skip_sections() -> BTreeSet<String> {
    let mut sections = names([
        ".eh_frame_hdr",
        ".eh_frame",
        ".got",
        ".got.plt",
        ".rela.dyn",
        ".rela.plt",
    ]);
    sections.extend(PLT_SECTIONS.iter().map(|s| s.to_string()));
    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use recast_ir::{Isa, Section, SectionFlags};

    #[test]
    fn keep_overrides_skip() {
        let mut policy = PrintingPolicy::named(BinaryFormat::Elf, "dynamic").unwrap();
        assert!(policy.should_skip_function("_start"));
        policy.keep_functions.insert("_start".to_string());
        assert!(!policy.should_skip_function("_start"));
    }

    #[test]
    fn default_policy_tracks_dynamic_section() {
        let mut m = Module::new("ex", Isa::X64, BinaryFormat::Elf);
        let static_policy = PrintingPolicy::default_for(&m);
        assert!(static_policy.extra_link_args.contains(&"-static".to_string()));

        m.add_section(Section::new(".dynamic", SectionFlags::data()));
        let complete_policy = PrintingPolicy::default_for(&m);
        assert!(!complete_policy.extra_link_args.contains(&"-static".to_string()));
        assert!(complete_policy.should_skip_section(".got"));
    }

    #[test]
    fn unknown_policy_name_is_none() {
        assert!(PrintingPolicy::named(BinaryFormat::Elf, "everything").is_none());
        assert!(PrintingPolicy::named(BinaryFormat::Pe, "static").is_none());
    }
}
