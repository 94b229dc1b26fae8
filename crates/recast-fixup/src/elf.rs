use recast_ir::{
    Binding, CodeBlockId, ElfSymbolInfo, Module, Referent, Symbol, SymbolId, SymbolType,
    Visibility,
};
use tracing::warn;

/// Promote conventional entry symbols to global binding and make sure the
/// dynamic init/fini functions carry a globally-bound name the linker can
/// reference.
pub(crate) fn fixup_elf_symbols(module: &mut Module) {
    // _start references main after relinking under a dynamic policy; both
    // must be global for that to resolve.
    for name in ["main", "_start"] {
        if let Some(id) = module.find_symbols_by_name(name).into_iter().next() {
            promote_symbol_binding(module, id);
        }
    }

    ensure_global_symbol_at(module, module.aux.elf_dynamic_init, "_init");
    ensure_global_symbol_at(module, module.aux.elf_dynamic_fini, "_fini");
}

/// Update a symbol's binding/visibility to GLOBAL/HIDDEN. If the binding was
/// not already GLOBAL in the linked binary, it was HIDDEN in the object file.
pub(crate) fn promote_symbol_binding(module: &mut Module, id: SymbolId) {
    let name = module
        .symbol(id)
        .map(|s| s.name.clone())
        .unwrap_or_default();
    match module.aux.elf_symbol_info.get_mut(&id) {
        Some(info) => {
            if !info.is_global() {
                info.binding = Binding::Global;
                info.visibility = Visibility::Hidden;
            }
        }
        None => {
            warn!(symbol = %name, "no symbol info; binding left unmodified");
        }
    }
}

fn ensure_global_symbol_at(module: &mut Module, block: Option<CodeBlockId>, default_name: &str) {
    let Some(block) = block else {
        return;
    };
    let symbols = module.symbols_for_code_block(block);

    let has_global = symbols.iter().any(|id| {
        module
            .aux
            .symbol_info(*id)
            .map(ElfSymbolInfo::is_global)
            .unwrap_or(false)
    });
    if has_global {
        return;
    }

    let local = symbols.iter().find(|id| {
        module
            .aux
            .symbol_info(**id)
            .map(|info| info.binding == Binding::Local)
            .unwrap_or(false)
    });
    if let Some(local) = local {
        promote_symbol_binding(module, *local);
        return;
    }

    let mut name = default_name.to_string();
    let mut count = 0u32;
    while !module.find_symbols_by_name(&name).is_empty() {
        name = format!("{}_disambig_{}", default_name, count);
        count += 1;
    }
    let id = module.add_symbol(Symbol::with_referent(name, Referent::Code(block)));
    module.aux.elf_symbol_info.insert(
        id,
        ElfSymbolInfo::new(SymbolType::None, Binding::Global, Visibility::Hidden),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use recast_ir::{BinaryFormat, CodeBlock, Isa};

    fn module_with_block() -> (Module, CodeBlockId) {
        let mut m = Module::new("ex", Isa::X64, BinaryFormat::Elf);
        let cb = m.add_code_block(CodeBlock::new(0x1000, 16));
        (m, cb)
    }

    #[test]
    fn main_is_promoted_to_global_hidden() {
        let (mut m, cb) = module_with_block();
        let id = m.add_symbol(Symbol::with_referent("main", Referent::Code(cb)));
        m.aux.elf_symbol_info.insert(
            id,
            ElfSymbolInfo::new(SymbolType::Func, Binding::Local, Visibility::Default),
        );

        fixup_elf_symbols(&mut m);

        let info = m.aux.symbol_info(id).unwrap();
        assert_eq!(info.binding, Binding::Global);
        assert_eq!(info.visibility, Visibility::Hidden);
    }

    #[test]
    fn already_global_main_is_untouched() {
        let (mut m, cb) = module_with_block();
        let id = m.add_symbol(Symbol::with_referent("main", Referent::Code(cb)));
        m.aux.elf_symbol_info.insert(
            id,
            ElfSymbolInfo::new(SymbolType::Func, Binding::Global, Visibility::Default),
        );

        fixup_elf_symbols(&mut m);

        let info = m.aux.symbol_info(id).unwrap();
        assert_eq!(info.visibility, Visibility::Default);
    }

    #[test]
    fn missing_metadata_is_not_fatal() {
        let (mut m, cb) = module_with_block();
        m.add_symbol(Symbol::with_referent("main", Referent::Code(cb)));
        fixup_elf_symbols(&mut m);
    }

    #[test]
    fn init_promotes_an_existing_local_symbol() {
        let (mut m, cb) = module_with_block();
        let id = m.add_symbol(Symbol::with_referent("my_init", Referent::Code(cb)));
        m.aux.elf_symbol_info.insert(
            id,
            ElfSymbolInfo::new(SymbolType::Func, Binding::Local, Visibility::Default),
        );
        m.aux.elf_dynamic_init = Some(cb);

        fixup_elf_symbols(&mut m);

        assert_eq!(m.aux.symbol_info(id).unwrap().binding, Binding::Global);
        assert!(m.find_symbols_by_name("_init").is_empty());
    }

    #[test]
    fn fini_synthesizes_a_disambiguated_global() {
        let (mut m, cb) = module_with_block();
        // An unrelated symbol already owns the conventional name.
        let other = m.add_code_block(CodeBlock::new(0x2000, 4));
        m.add_symbol(Symbol::with_referent("_fini", Referent::Code(other)));
        m.aux.elf_dynamic_fini = Some(cb);

        fixup_elf_symbols(&mut m);

        let synthesized = m.find_symbols_by_name("_fini_disambig_0");
        assert_eq!(synthesized.len(), 1);
        let info = m.aux.symbol_info(synthesized[0]).unwrap();
        assert_eq!(info.binding, Binding::Global);
        assert_eq!(info.visibility, Visibility::Hidden);
        assert_eq!(
            m.symbol(synthesized[0]).unwrap().referent(),
            Some(Referent::Code(cb))
        );
    }
}
