use recast_ir::{Isa, Module, Referent, Symbol, SymbolPayload};

/// PE modules need two pseudo-symbols the IR may not carry: an image-base
/// anchor for IMAGEREL arithmetic and an explicit entry-point name for the
/// linker's /ENTRY.
pub(crate) fn fixup_pe_symbols(module: &mut Module) {
    ensure_image_base(module);
    ensure_entry_point(module);
}

fn ensure_image_base(module: &mut Module) {
    let existing = module
        .find_symbols_by_name("__ImageBase")
        .into_iter()
        .chain(module.find_symbols_by_name("___ImageBase"))
        .next();

    let id = match existing {
        Some(id) => {
            let proxy = module.add_proxy_block();
            if let Some(symbol) = module.symbol_mut(id) {
                symbol.payload = SymbolPayload::Referent(Referent::Proxy(proxy));
            }
            id
        }
        None => {
            let proxy = module.add_proxy_block();
            module.add_symbol(Symbol::with_referent("__ImageBase", Referent::Proxy(proxy)))
        }
    };

    // IA32 symbol decoration carries an extra underscore.
    if module.isa == Isa::Ia32 {
        if let Some(symbol) = module.symbol_mut(id) {
            symbol.name = "___ImageBase".to_string();
        }
    }
}

fn ensure_entry_point(module: &mut Module) {
    let Some(entry) = module.entry_point else {
        return;
    };
    let Some(address) = module.code_block(entry).map(|b| b.address) else {
        return;
    };
    let already_named = module
        .symbols
        .keys()
        .any(|id| module.symbol_address(*id) == Some(address));
    if already_named {
        return;
    }
    let id = module.add_symbol(Symbol::with_referent("__EntryPoint", Referent::Code(entry)));
    module.aux.pe_exported_symbols.insert(id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use recast_ir::{BinaryFormat, CodeBlock};

    #[test]
    fn image_base_is_synthesized_with_a_proxy_referent() {
        let mut m = Module::new("ex.exe", Isa::X64, BinaryFormat::Pe);
        fixup_pe_symbols(&mut m);

        let ids = m.find_symbols_by_name("__ImageBase");
        assert_eq!(ids.len(), 1);
        assert!(m
            .symbol(ids[0])
            .unwrap()
            .referent()
            .map(|r| r.is_proxy())
            .unwrap_or(false));
    }

    #[test]
    fn existing_image_base_is_rebound_to_a_proxy() {
        let mut m = Module::new("ex.exe", Isa::X64, BinaryFormat::Pe);
        let id = m.add_symbol(Symbol::with_address("__ImageBase", 0x140000000));
        fixup_pe_symbols(&mut m);

        assert!(m
            .symbol(id)
            .unwrap()
            .referent()
            .map(|r| r.is_proxy())
            .unwrap_or(false));
    }

    #[test]
    fn ia32_image_base_gains_an_underscore() {
        let mut m = Module::new("ex.exe", Isa::Ia32, BinaryFormat::Pe);
        fixup_pe_symbols(&mut m);
        assert_eq!(m.find_symbols_by_name("___ImageBase").len(), 1);
        assert!(m.find_symbols_by_name("__ImageBase").is_empty());
    }

    #[test]
    fn unnamed_entry_block_gets_an_entry_symbol() {
        let mut m = Module::new("ex.exe", Isa::X64, BinaryFormat::Pe);
        let cb = m.add_code_block(CodeBlock::new(0x140001000, 16));
        m.entry_point = Some(cb);
        fixup_pe_symbols(&mut m);

        let ids = m.find_symbols_by_name("__EntryPoint");
        assert_eq!(ids.len(), 1);
        assert!(m.aux.pe_exported_symbols.contains(&ids[0]));
    }

    #[test]
    fn named_entry_block_is_left_alone() {
        let mut m = Module::new("ex.exe", Isa::X64, BinaryFormat::Pe);
        let cb = m.add_code_block(CodeBlock::new(0x140001000, 16));
        m.entry_point = Some(cb);
        m.add_symbol(Symbol::with_referent("WinMain", Referent::Code(cb)));
        fixup_pe_symbols(&mut m);

        assert!(m.find_symbols_by_name("__EntryPoint").is_empty());
    }
}
