use crate::policy::PrintingPolicy;
use crate::strategy::{FormatStrategy, MemOperand};
use crate::target::{strategy_for, TargetSpec};
use crate::{PrintError, Result};
use recast_ir::aux::SHN_COMMON;
use recast_ir::{
    Binding, Block, ByteInterval, CodeBlock, CodeBlockId, DataBlock, DataEncoding, Instruction,
    Isa, Module, Operand, PreparedModule, SymbolId, SymbolicExpr,
};
use std::collections::BTreeMap;
use tracing::debug;

/// The printing engine. Holds the formatting strategy by composition; all
/// traversal and policy decisions are strategy-agnostic.
pub struct AsmPrinter {
    target: TargetSpec,
    strategy: Box<dyn FormatStrategy>,
    policy: PrintingPolicy,
}

impl AsmPrinter {
    /// Fails fast on an unregistered target triple, before any output.
    pub fn new(target: TargetSpec, policy: PrintingPolicy) -> Result<Self> {
        let strategy = strategy_for(target)?;
        Ok(Self {
            target,
            strategy,
            policy,
        })
    }

    pub fn target(&self) -> TargetSpec {
        self.target
    }

    /// Render the whole module. Deterministic: identical inputs yield
    /// byte-identical text. Output is buffered and returned only on success,
    /// so a failed print emits nothing.
    pub fn print(&self, prepared: &PreparedModule) -> Result<String> {
        let module = prepared.module();
        if module.format != self.target.format || module.isa != self.target.isa {
            return Err(PrintError::TargetMismatch {
                module: module.name.clone(),
                module_format: module.format,
                module_isa: module.isa,
                target: self.target,
            });
        }

        let state = PrintState::build(module, self.strategy.as_ref());
        let mut out = String::new();

        out.push_str(&self.strategy.header(module));

        for section in &module.sections {
            if self.policy.should_skip_section(&section.name) {
                debug!(section = %section.name, "skipping section");
                continue;
            }
            out.push_str(&self.strategy.section_header(section));
            out.push('\n');

            for interval in &section.intervals {
                self.print_interval(&mut out, &state, section, interval)?;
            }

            if let Some(footer) = self.strategy.section_footer(section) {
                out.push_str(&footer);
                out.push('\n');
            }
        }

        self.print_integral_symbols(&mut out, &state)?;

        if let Some(footer) = self.strategy.footer() {
            out.push_str(&footer);
            out.push('\n');
        }

        Ok(out)
    }

    fn print_interval(
        &self,
        out: &mut String,
        state: &PrintState<'_>,
        section: &recast_ir::Section,
        interval: &ByteInterval,
    ) -> Result<()> {
        let module = state.module;
        let mut cursor = interval.address;

        for block in &interval.blocks {
            match block {
                Block::Code(id) => {
                    let code = module.code_block(*id).ok_or(PrintError::DanglingBlock {
                        address: interval.address,
                    })?;
                    if self.skips_function(state, *id) {
                        cursor = cursor.max(code.end());
                        continue;
                    }
                    self.fill_gap(out, cursor, code.address);
                    self.print_alignment(out, state, code.address);
                    self.print_symbol_defs(out, state, code.address, true)?;
                    self.print_code_block(out, state, interval, code)?;
                    if let Some(entry) = state.function_exit.get(id) {
                        let name = state.formatted_name(*entry);
                        if let Some(line) = self.strategy.function_end(&name) {
                            out.push_str(&line);
                            out.push('\n');
                        }
                    }
                    cursor = cursor.max(code.end());
                }
                Block::Data(id) => {
                    let data = module.data_block(*id).ok_or(PrintError::DanglingBlock {
                        address: interval.address,
                    })?;
                    self.fill_gap(out, cursor, data.address);
                    self.print_alignment(out, state, data.address);
                    self.print_symbol_defs(out, state, data.address, false)?;
                    self.print_data_block(out, state, section, interval, data)?;
                    cursor = cursor.max(data.end());
                }
            }
        }

        if cursor < interval.end() {
            self.fill_gap(out, cursor, interval.end());
        }
        Ok(())
    }

    fn skips_function(&self, state: &PrintState<'_>, block: CodeBlockId) -> bool {
        state
            .function_of_block
            .get(&block)
            .map(|name| self.policy.should_skip_function(name))
            .unwrap_or(false)
    }

    fn fill_gap(&self, out: &mut String, cursor: u64, target: u64) {
        if target > cursor {
            out.push_str(self.strategy.tab());
            out.push_str(&self.strategy.zero_fill(target - cursor));
            out.push('\n');
        }
    }

    fn print_alignment(&self, out: &mut String, state: &PrintState<'_>, address: u64) {
        if let Some(alignment) = state.module.aux.alignment.get(&address) {
            out.push_str(&self.strategy.align_directive(*alignment));
            out.push('\n');
        }
    }

    /// Definitions before content: the chosen primary first, co-located
    /// aliases after, each with its header directives.
    fn print_symbol_defs(
        &self,
        out: &mut String,
        state: &PrintState<'_>,
        address: u64,
        is_code: bool,
    ) -> Result<()> {
        let Some(ids) = state.defs_at.get(&address) else {
            return Ok(());
        };
        for id in ids {
            let symbol = state.symbol(*id)?;
            if self.policy.should_skip_symbol(&symbol.name) {
                continue;
            }
            let name = state.formatted_name(*id);
            let info = state.module.aux.symbol_info(*id);
            let exported = state.module.aux.pe_exported_symbols.contains(id);
            out.push_str(&self.strategy.symbol_header(&name, info, exported, is_code));
            if exported && is_code {
                continue; // the header already carries the export stub
            }
            let label = if is_code {
                self.strategy.code_label(&name)
            } else {
                self.strategy.data_label(&name)
            };
            out.push_str(&label);
            out.push('\n');
        }
        Ok(())
    }

    fn print_code_block(
        &self,
        out: &mut String,
        state: &PrintState<'_>,
        interval: &ByteInterval,
        block: &CodeBlock,
    ) -> Result<()> {
        for insn in &block.instructions {
            if insn.address != block.address {
                self.print_symbol_defs(out, state, insn.address, true)?;
            }
            let mut insn = insn.clone();
            self.strategy.fixup_instruction(&mut insn);

            let mut operands = Vec::with_capacity(insn.operands.len());
            for op in &insn.operands {
                operands.push(self.render_operand(state, interval, &insn, op)?);
            }
            out.push_str(self.strategy.tab());
            out.push_str(&self.strategy.format_instruction(&insn, operands));
            out.push('\n');
        }
        Ok(())
    }

    fn render_operand(
        &self,
        state: &PrintState<'_>,
        interval: &ByteInterval,
        insn: &Instruction,
        op: &Operand,
    ) -> Result<String> {
        match op {
            Operand::Register(reg) => Ok(self.strategy.format_op_register(reg)),
            Operand::Immediate { value, symbolic } => {
                let rendered = match symbolic {
                    Some(offset) => Some(self.render_symexpr_at(
                        state,
                        interval,
                        *offset,
                        insn.address,
                        insn.is_branch(),
                    )?),
                    None => None,
                };
                Ok(self.strategy.format_op_immediate(
                    insn,
                    *value,
                    rendered.as_ref().map(|r| r.text.as_str()),
                ))
            }
            Operand::Memory {
                segment,
                base,
                index,
                scale,
                displacement,
                size,
                symbolic,
            } => {
                let rendered = match symbolic {
                    Some(offset) => Some(self.render_symexpr_at(
                        state,
                        interval,
                        *offset,
                        insn.address,
                        insn.is_branch(),
                    )?),
                    None => None,
                };
                let mem = MemOperand {
                    segment: segment.as_deref(),
                    base: base.as_deref(),
                    index: index.as_deref(),
                    scale: *scale,
                    displacement: *displacement,
                    size: *size,
                };
                Ok(self.strategy.format_op_memory(
                    insn,
                    &mem,
                    rendered.as_ref().map(|r| r.text.as_str()),
                    rendered.as_ref().and_then(|r| r.collapse.as_deref()),
                ))
            }
        }
    }

    fn render_symexpr_at(
        &self,
        state: &PrintState<'_>,
        interval: &ByteInterval,
        offset: u64,
        insn_address: u64,
        is_branch: bool,
    ) -> Result<RenderedExpr> {
        let expr = interval
            .symbolic_exprs
            .get(&offset)
            .ok_or(PrintError::MissingSymbolicExpr {
                address: insn_address,
                offset,
            })?;
        self.render_symexpr(state, expr, offset, is_branch)
    }

    fn render_symexpr(
        &self,
        state: &PrintState<'_>,
        expr: &SymbolicExpr,
        offset: u64,
        is_branch: bool,
    ) -> Result<RenderedExpr> {
        match expr {
            SymbolicExpr::AddrConst {
                symbol,
                offset: addend,
                attrs,
            } => {
                // Forwarded symbols print their target's name at every
                // reference site.
                let forwarded = state.module.aux.forwarded(*symbol);
                let referenced = forwarded.unwrap_or(*symbol);
                let name = state.reference_name(referenced, offset)?;
                let mut text = name.clone();
                push_addend(&mut text, *addend);
                text.push_str(self.strategy.symexpr_suffix(attrs, is_branch));
                Ok(RenderedExpr {
                    text,
                    collapse: forwarded.map(|_| name),
                })
            }
            SymbolicExpr::AddrAddr {
                minuend,
                subtrahend,
                offset: addend,
                attrs: _,
            } => {
                let minuend_name = state.reference_name(*minuend, offset)?;
                if state.image_base == Some(*subtrahend) {
                    if let Some(text) = self.strategy.imagerel(&minuend_name) {
                        let mut text = text;
                        push_addend(&mut text, *addend);
                        return Ok(RenderedExpr {
                            text,
                            collapse: None,
                        });
                    }
                }
                let subtrahend_name = state.reference_name(*subtrahend, offset)?;
                let mut text = format!("{}-{}", minuend_name, subtrahend_name);
                push_addend(&mut text, *addend);
                Ok(RenderedExpr {
                    text,
                    collapse: None,
                })
            }
        }
    }

    fn print_data_block(
        &self,
        out: &mut String,
        state: &PrintState<'_>,
        section: &recast_ir::Section,
        interval: &ByteInterval,
        block: &DataBlock,
    ) -> Result<()> {
        let start = block.address - interval.address;
        let end = start + block.size;
        let has_exprs = interval.symbolic_exprs_in(start, end).next().is_some();

        if !section.flags.initialized {
            out.push_str(self.strategy.tab());
            out.push_str(&self.strategy.zero_fill(block.size));
            out.push('\n');
            return Ok(());
        }

        if !has_exprs {
            let bytes = interval.bytes_at(start, block.size);
            match block.encoding {
                Some(DataEncoding::String) | Some(DataEncoding::Ascii) => {
                    let null_terminated = block.encoding == Some(DataEncoding::String);
                    for line in self.strategy.format_string(&bytes, null_terminated) {
                        out.push_str(self.strategy.tab());
                        out.push_str(&line);
                        out.push('\n');
                    }
                    return Ok(());
                }
                _ => {}
            }
            if block.size > 8 && bytes.iter().all(|b| *b == 0) {
                out.push_str(self.strategy.tab());
                out.push_str(&self.strategy.zero_fill(block.size));
                out.push('\n');
                return Ok(());
            }
        }

        let mut off = start;
        while off < end {
            if let Some(expr) = interval.symbolic_exprs.get(&off) {
                let rendered = self.render_symexpr(state, expr, off, false)?;
                let leb = match block.encoding {
                    Some(DataEncoding::Uleb128) => self.strategy.format_uleb128(&rendered.text),
                    Some(DataEncoding::Sleb128) => self.strategy.format_sleb128(&rendered.text),
                    _ => None,
                };
                if let Some(line) = leb {
                    out.push_str(self.strategy.tab());
                    out.push_str(&line);
                    out.push('\n');
                    off = end;
                    continue;
                }

                let size = self.symexpr_data_size(state, expr).min(end - off);
                let directive = self
                    .strategy
                    .data_directive(size)
                    .ok_or(PrintError::UnsupportedDataSize { size })?;
                out.push_str(self.strategy.tab());
                out.push_str(&format!("{} {}", directive, rendered.text));
                out.push('\n');
                off += size;
            } else {
                let byte = interval.bytes_at(off, 1)[0];
                out.push_str(self.strategy.tab());
                out.push_str(&self.strategy.format_byte(byte));
                out.push('\n');
                off += 1;
            }
        }
        Ok(())
    }

    /// Width of a symbolic datum: image-relative entries are 32-bit, plain
    /// pointers are the ISA word size.
    fn symexpr_data_size(&self, state: &PrintState<'_>, expr: &SymbolicExpr) -> u64 {
        if let SymbolicExpr::AddrAddr { subtrahend, .. } = expr {
            if state.image_base == Some(*subtrahend) {
                return 4;
            }
        }
        match state.module.isa {
            Isa::X64 => 8,
            Isa::Ia32 => 4,
        }
    }

    /// Integral symbols print after all sections, then communal symbols.
    /// Both walk in name order, the way symbol tables are listed.
    fn print_integral_symbols(&self, out: &mut String, state: &PrintState<'_>) -> Result<()> {
        let mut by_name: Vec<(&str, SymbolId)> = state
            .module
            .symbols
            .iter()
            .map(|(id, s)| (s.name.as_str(), *id))
            .collect();
        by_name.sort();

        for (raw_name, id) in &by_name {
            let symbol = state.symbol(*id)?;
            if !symbol.is_integral() || self.policy.should_skip_symbol(raw_name) {
                continue;
            }
            let Some(address) = state.module.symbol_address(*id) else {
                continue;
            };
            let name = state.formatted_name(*id);
            let info = state.module.aux.symbol_info(*id);
            out.push_str(&self.strategy.symbol_header(&name, info, false, false));
            out.push_str(&self.strategy.set_directive(&name, &format!("{:#x}", address)));
            out.push('\n');
        }

        for (raw_name, id) in &by_name {
            let symbol = state.symbol(*id)?;
            if self.policy.should_skip_symbol(raw_name) {
                continue;
            }
            let common = state
                .module
                .aux
                .symbol_info(*id)
                .map(|info| info.section_index == SHN_COMMON)
                .unwrap_or(false);
            if !common || !symbol.referent().map(|r| r.is_proxy()).unwrap_or(false) {
                continue;
            }
            let info = state.module.aux.symbol_info(*id);
            let size = info.map(|i| i.size).unwrap_or(0);
            let name = state.formatted_name(*id);
            if let Some(line) = self.strategy.comm_directive(&name, size, 0) {
                out.push_str(&line);
                out.push('\n');
            }
        }
        Ok(())
    }
}

struct RenderedExpr {
    text: String,
    collapse: Option<String>,
}

fn push_addend(text: &mut String, addend: i64) {
    if addend > 0 {
        text.push_str(&format!("+{}", addend));
    } else if addend < 0 {
        text.push_str(&format!("-{}", -addend));
    }
}

/// Per-print read-only lookup tables, all order-stable.
struct PrintState<'a> {
    module: &'a Module,
    strategy: &'a dyn FormatStrategy,
    /// Address to co-located definitions; the chosen primary sits first.
    defs_at: BTreeMap<u64, Vec<SymbolId>>,
    function_of_block: BTreeMap<CodeBlockId, String>,
    /// Last block of each function to its entry symbol.
    function_exit: BTreeMap<CodeBlockId, SymbolId>,
    image_base: Option<SymbolId>,
}

impl<'a> PrintState<'a> {
    fn build(module: &'a Module, strategy: &'a dyn FormatStrategy) -> Self {
        let mut defs_at: BTreeMap<u64, Vec<SymbolId>> = BTreeMap::new();
        for (id, symbol) in &module.symbols {
            if symbol.is_integral() {
                continue;
            }
            if let Some(address) = module.symbol_address(*id) {
                defs_at.entry(address).or_default().push(*id);
            }
        }
        // Primary-definition tie-break: non-local binding first, then
        // lexical name order. The winner fronts the list and names every
        // reference to the address.
        for ids in defs_at.values_mut() {
            ids.sort_by_key(|id| {
                let local = module
                    .aux
                    .symbol_info(*id)
                    .map(|info| info.binding == Binding::Local)
                    .unwrap_or(true);
                let name = module
                    .symbol(*id)
                    .map(|s| s.name.clone())
                    .unwrap_or_default();
                (local, name, *id)
            });
        }

        let mut function_of_block = BTreeMap::new();
        let mut function_exit = BTreeMap::new();
        for (entry, blocks) in &module.aux.functions {
            let Some(entry_symbol) = module.symbol(*entry) else {
                continue;
            };
            let mut last: Option<(u64, CodeBlockId)> = None;
            for block in blocks {
                function_of_block.insert(*block, entry_symbol.name.clone());
                if let Some(code) = module.code_block(*block) {
                    if last.map(|(addr, _)| code.address > addr).unwrap_or(true) {
                        last = Some((code.address, *block));
                    }
                }
            }
            if let Some((_, block)) = last {
                function_exit.insert(block, *entry);
            }
        }

        let image_base = ["__ImageBase", "___ImageBase"]
            .iter()
            .find_map(|name| module.find_symbols_by_name(name).into_iter().next());

        Self {
            module,
            strategy,
            defs_at,
            function_of_block,
            function_exit,
            image_base,
        }
    }

    fn symbol(&self, id: SymbolId) -> Result<&'a recast_ir::Symbol> {
        self.module
            .symbol(id)
            .ok_or(PrintError::DanglingSymbol {
                symbol: id,
                offset: 0,
            })
    }

    fn formatted_name(&self, id: SymbolId) -> String {
        self.module
            .symbol(id)
            .map(|s| self.strategy.format_symbol_name(&s.name))
            .unwrap_or_default()
    }

    /// The name a reference to this symbol prints: the chosen primary for
    /// its address when it has one, else its own name.
    fn reference_name(&self, id: SymbolId, expr_offset: u64) -> Result<String> {
        let symbol = self
            .module
            .symbol(id)
            .ok_or(PrintError::DanglingSymbol {
                symbol: id,
                offset: expr_offset,
            })?;
        if let Some(address) = self.module.symbol_address(id) {
            if let Some(ids) = self.defs_at.get(&address) {
                if let Some(primary) = ids.first() {
                    return Ok(self.formatted_name(*primary));
                }
            }
        }
        Ok(self.strategy.format_symbol_name(&symbol.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Syntax;
    use recast_ir::{BinaryFormat, Referent, Symbol};

    #[test]
    fn printer_construction_checks_the_registry() {
        let bad = TargetSpec::new(BinaryFormat::Pe, Isa::X64, Syntax::Att);
        assert!(AsmPrinter::new(bad, PrintingPolicy::default()).is_err());
        let good = TargetSpec::new(BinaryFormat::Elf, Isa::X64, Syntax::Att);
        assert!(AsmPrinter::new(good, PrintingPolicy::default()).is_ok());
    }

    #[test]
    fn mismatched_module_is_rejected_before_output() {
        let printer = AsmPrinter::new(
            TargetSpec::new(BinaryFormat::Elf, Isa::X64, Syntax::Att),
            PrintingPolicy::default(),
        )
        .unwrap();
        let module = Module::new("pe-module", Isa::X64, BinaryFormat::Pe);
        let err = printer
            .print(&PreparedModule::assume_prepared(module))
            .unwrap_err();
        assert!(matches!(err, PrintError::TargetMismatch { .. }));
    }

    #[test]
    fn primary_selection_prefers_global_then_lexical() {
        let mut module = Module::new("ex", Isa::X64, BinaryFormat::Elf);
        let cb = module.add_code_block(CodeBlock::new(0x1000, 4));
        let local = module.add_symbol(Symbol::with_referent("_foo", Referent::Code(cb)));
        let global = module.add_symbol(Symbol::with_referent("foo", Referent::Code(cb)));
        module.aux.elf_symbol_info.insert(
            local,
            recast_ir::ElfSymbolInfo::new(
                recast_ir::SymbolType::Func,
                Binding::Local,
                recast_ir::Visibility::Default,
            ),
        );
        module.aux.elf_symbol_info.insert(
            global,
            recast_ir::ElfSymbolInfo::new(
                recast_ir::SymbolType::Func,
                Binding::Global,
                recast_ir::Visibility::Default,
            ),
        );

        let strategy = strategy_for(TargetSpec::new(BinaryFormat::Elf, Isa::X64, Syntax::Att))
            .unwrap();
        let state = PrintState::build(&module, strategy.as_ref());
        let ids = state.defs_at.get(&0x1000).unwrap();
        assert_eq!(ids[0], global);
        assert_eq!(state.reference_name(local, 0).unwrap(), "foo");
    }
}
