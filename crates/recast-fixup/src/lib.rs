/*! Mutate a module into printable shape, exactly once.
 *
 * Assembler-bound modules need adjustments the lifted IR does not carry:
 * entry symbols promoted to global binding, init/fini functions guaranteed a
 * global name, shared-object references pushed through the PLT or a hidden
 * alias, PE pseudo-symbols synthesized. `prepare` applies them and returns
 * the read-only handle the printing engine accepts, so the pass cannot run
 * twice on one module.
 */

mod elf;
mod pe;
mod shared;

use recast_ir::{BinaryFormat, Module, PreparedModule};

/// How the final binary will be linked. Shared objects need interposition
/// protection the other modes do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    Executable,
    Shared,
}

impl LinkMode {
    /// Shared iff the binary-type flags say DYN without EXEC or PIE; a PIE
    /// executable keeps direct references to its own globals.
    pub fn infer(module: &Module) -> Self {
        if module.aux.is_shared_object() {
            LinkMode::Shared
        } else {
            LinkMode::Executable
        }
    }
}

/// Run every fixup the module's format and link mode call for, consuming the
/// module and returning the ready-to-print handle.
pub fn prepare(mut module: Module, link_mode: LinkMode) -> PreparedModule {
    match module.format {
        BinaryFormat::Pe => {
            pe::fixup_pe_symbols(&mut module);
        }
        BinaryFormat::Elf => {
            elf::fixup_elf_symbols(&mut module);
            if link_mode == LinkMode::Shared {
                shared::fixup_shared_object(&mut module);
            }
        }
    }
    PreparedModule::assume_prepared(module)
}

/// `prepare` with the link mode inferred from the module's own flags.
pub fn prepare_auto(module: Module) -> PreparedModule {
    let link_mode = LinkMode::infer(&module);
    prepare(module, link_mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use recast_ir::{BinaryTypeFlag, Isa};

    #[test]
    fn link_mode_inference() {
        let mut m = Module::new("ex", Isa::X64, BinaryFormat::Elf);
        m.aux.binary_type = vec![BinaryTypeFlag::Dyn];
        assert_eq!(LinkMode::infer(&m), LinkMode::Shared);

        m.aux.binary_type = vec![BinaryTypeFlag::Dyn, BinaryTypeFlag::Pie];
        assert_eq!(LinkMode::infer(&m), LinkMode::Executable);

        m.aux.binary_type = vec![BinaryTypeFlag::Exec];
        assert_eq!(LinkMode::infer(&m), LinkMode::Executable);
    }
}
