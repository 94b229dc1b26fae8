use recast_ir::{
    Binding, Block, ExprAttribute, Module, SymbolId, SymbolType, SymbolicExpr, Visibility,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

const ALIAS_PREFIX: &str = ".recast.hidden_alias.";

/// A symbolic expression's position: (section, interval, offset).
type ExprLoc = (usize, usize, u64);

/// Direct references to default-visibility globals are unsafe in a shared
/// object: the dynamic linker may interpose another definition. References
/// to external functions get retagged through the PLT; references to
/// definitions in this module are rewritten to a hidden alias of the same
/// referent, created once per symbol.
pub(crate) fn fixup_shared_object(module: &mut Module) {
    let mut symbols_to_alias: BTreeSet<SymbolId> = BTreeSet::new();
    let mut locs_to_alias: Vec<ExprLoc> = Vec::new();
    let mut locs_to_plt: Vec<ExprLoc> = Vec::new();

    for (si, section) in module.sections.iter().enumerate() {
        for (ii, interval) in section.intervals.iter().enumerate() {
            for block in &interval.blocks {
                let Block::Code(id) = block else {
                    continue;
                };
                let Some(code) = module.code_block(*id) else {
                    continue;
                };
                let start = code.address - interval.address;
                let end = start + code.size;
                for (offset, expr) in interval.symbolic_exprs_in(start, end) {
                    // PLT/GOT references are already interposition-safe.
                    if expr.has_attr(ExprAttribute::Plt) || expr.has_attr(ExprAttribute::Got) {
                        continue;
                    }
                    for sym in expr.symbols() {
                        let Some(symbol) = module.symbol(sym) else {
                            continue;
                        };
                        if symbol.is_integral() {
                            continue;
                        }
                        let Some(info) = module.aux.symbol_info(sym) else {
                            warn!(symbol = %symbol.name, "no symbol info; reference left as-is");
                            continue;
                        };
                        if info.binding == Binding::Local
                            || info.visibility != Visibility::Default
                        {
                            continue;
                        }
                        let external = symbol.referent().map(|r| r.is_proxy()).unwrap_or(true)
                            || module.aux.forwarded(sym).is_some();
                        if external {
                            if info.sym_type == SymbolType::Func {
                                locs_to_plt.push((si, ii, offset));
                            }
                        } else {
                            symbols_to_alias.insert(sym);
                            locs_to_alias.push((si, ii, offset));
                        }
                    }
                }
            }
        }
    }

    // One hidden alias per aliased symbol, sharing its referent.
    let mut alias_of: BTreeMap<SymbolId, SymbolId> = BTreeMap::new();
    for sym in symbols_to_alias {
        let Some(original) = module.symbol(sym).cloned() else {
            continue;
        };
        let alias = module.add_symbol(recast_ir::Symbol::new(
            format!("{}{}", ALIAS_PREFIX, original.name),
            original.payload,
        ));
        if let Some(info) = module.aux.symbol_info(sym).cloned() {
            let mut alias_info = info;
            alias_info.visibility = Visibility::Hidden;
            module.aux.elf_symbol_info.insert(alias, alias_info);
        }
        alias_of.insert(sym, alias);
    }

    for (si, ii, offset) in locs_to_alias {
        rewrite_expr(module, si, ii, offset, |expr| {
            expr.map_symbols(|s| alias_of.get(&s).copied().unwrap_or(s))
        });
    }

    let forwarding = module.aux.symbol_forwarding.clone();
    for (si, ii, offset) in locs_to_plt {
        rewrite_expr(module, si, ii, offset, |expr| {
            let mut rewritten =
                expr.map_symbols(|s| forwarding.get(&s).copied().unwrap_or(s));
            rewritten.attrs_mut().insert(ExprAttribute::Plt);
            rewritten
        });
    }
}

fn rewrite_expr(
    module: &mut Module,
    section: usize,
    interval: usize,
    offset: u64,
    f: impl FnOnce(&SymbolicExpr) -> SymbolicExpr,
) {
    let exprs = &mut module.sections[section].intervals[interval].symbolic_exprs;
    if let Some(expr) = exprs.get(&offset) {
        let rewritten = f(expr);
        exprs.insert(offset, rewritten);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recast_ir::{
        BinaryFormat, ByteInterval, CodeBlock, ElfSymbolInfo, Isa, Referent, Section,
        SectionFlags, Symbol,
    };

    fn shared_module() -> (Module, SymbolId, SymbolId) {
        let mut m = Module::new("libex.so", Isa::X64, BinaryFormat::Elf);
        let callee = m.add_code_block(CodeBlock::new(0x1000, 8));
        let caller = m.add_code_block(CodeBlock::new(0x1008, 16));
        let callee_sym = m.add_symbol(Symbol::with_referent("exported_fn", Referent::Code(callee)));
        m.aux.elf_symbol_info.insert(
            callee_sym,
            ElfSymbolInfo::new(SymbolType::Func, Binding::Global, Visibility::Default),
        );
        let proxy = m.add_proxy_block();
        let extern_sym = m.add_symbol(Symbol::with_referent("puts", Referent::Proxy(proxy)));
        m.aux.elf_symbol_info.insert(
            extern_sym,
            ElfSymbolInfo::new(SymbolType::Func, Binding::Global, Visibility::Default),
        );

        let mut text = Section::new(".text", SectionFlags::text());
        let mut iv = ByteInterval::new(0x1000, 0x18);
        iv.blocks.push(Block::Code(callee));
        iv.blocks.push(Block::Code(caller));
        // Two direct references from the caller block: one to the local
        // global, one to the external function.
        iv.add_symbolic_expr(0x9, SymbolicExpr::addr_const(callee_sym, 0));
        iv.add_symbolic_expr(0xe, SymbolicExpr::addr_const(extern_sym, 0));
        text.add_interval(iv);
        m.add_section(text);
        (m, callee_sym, extern_sym)
    }

    #[test]
    fn local_global_gains_exactly_one_hidden_alias() {
        let (mut m, callee_sym, _) = shared_module();
        // A second direct reference to the same symbol must reuse the alias.
        m.sections[0].intervals[0]
            .add_symbolic_expr(0x14, SymbolicExpr::addr_const(callee_sym, 0));

        fixup_shared_object(&mut m);

        let aliases = m.find_symbols_by_name(".recast.hidden_alias.exported_fn");
        assert_eq!(aliases.len(), 1);
        let alias = aliases[0];
        let info = m.aux.symbol_info(alias).unwrap();
        assert_eq!(info.visibility, Visibility::Hidden);
        assert_eq!(info.binding, Binding::Global);
        assert_eq!(
            m.symbol(alias).unwrap().referent(),
            m.symbol(callee_sym).unwrap().referent()
        );

        for offset in [0x9u64, 0x14] {
            let expr = &m.sections[0].intervals[0].symbolic_exprs[&offset];
            assert_eq!(expr.symbols(), vec![alias], "reference at {:#x}", offset);
        }
    }

    #[test]
    fn external_function_reference_is_retagged_plt() {
        let (mut m, _, extern_sym) = shared_module();

        fixup_shared_object(&mut m);

        let expr = &m.sections[0].intervals[0].symbolic_exprs[&0xe];
        assert!(expr.has_attr(ExprAttribute::Plt));
        assert_eq!(expr.symbols(), vec![extern_sym]);
        // Externals never get aliased.
        assert!(m.find_symbols_by_name(".recast.hidden_alias.puts").is_empty());
    }

    #[test]
    fn already_tagged_references_are_untouched() {
        let (mut m, callee_sym, extern_sym) = shared_module();
        m.sections[0].intervals[0].add_symbolic_expr(
            0x9,
            SymbolicExpr::addr_const(callee_sym, 0).with_attr(ExprAttribute::Got),
        );
        m.sections[0].intervals[0].add_symbolic_expr(
            0xe,
            SymbolicExpr::addr_const(extern_sym, 0).with_attr(ExprAttribute::Plt),
        );

        fixup_shared_object(&mut m);

        assert!(m
            .find_symbols_by_name(".recast.hidden_alias.exported_fn")
            .is_empty());
        let expr = &m.sections[0].intervals[0].symbolic_exprs[&0x9];
        assert_eq!(expr.symbols(), vec![callee_sym]);
    }

    #[test]
    fn forwarded_function_goes_through_the_plt_target() {
        let (mut m, _, extern_sym) = shared_module();
        let proxy = m.add_proxy_block();
        let real = m.add_symbol(Symbol::with_referent("puts_real", Referent::Proxy(proxy)));
        m.aux.symbol_forwarding.insert(extern_sym, real);

        fixup_shared_object(&mut m);

        let expr = &m.sections[0].intervals[0].symbolic_exprs[&0xe];
        assert!(expr.has_attr(ExprAttribute::Plt));
        assert_eq!(expr.symbols(), vec![real]);
    }

    #[test]
    fn data_references_are_left_alone() {
        let (mut m, callee_sym, _) = shared_module();
        // Move the reference outside any code block: offset past the blocks.
        let mut data_section = Section::new(".data", SectionFlags::data());
        let mut iv = ByteInterval::new(0x2000, 8);
        let db = m.add_data_block(recast_ir::DataBlock::new(0x2000, 8));
        iv.blocks.push(Block::Data(db));
        iv.add_symbolic_expr(0, SymbolicExpr::addr_const(callee_sym, 0));
        data_section.add_interval(iv);
        m.add_section(data_section);
        m.sections[0].intervals[0].symbolic_exprs.clear();

        fixup_shared_object(&mut m);

        assert!(m
            .find_symbols_by_name(".recast.hidden_alias.exported_fn")
            .is_empty());
    }
}
