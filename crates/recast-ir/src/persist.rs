use crate::module::Module;
use crate::section::Block;
use crate::symbol::{Referent, SymbolPayload};
use crate::{IrError, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Top-level persisted form: one file may carry several modules, e.g. an
/// executable plus the shared objects it loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ir {
    #[serde(default)]
    pub modules: Vec<Module>,
}

impl Ir {
    pub fn new(modules: Vec<Module>) -> Self {
        Self { modules }
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let ir: Ir = serde_json::from_str(s)?;
        for module in &ir.modules {
            module.validate()?;
        }
        Ok(ir)
    }

    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        let ir: Ir = serde_json::from_reader(reader)?;
        for module in &ir.modules {
            module.validate()?;
        }
        Ok(ir)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_json_writer<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

impl Module {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let module: Module = serde_json::from_str(s)?;
        module.validate()?;
        Ok(module)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check id integrity and block layout before anything downstream trusts
    /// the graph: every id resolves, and blocks sit inside their interval in
    /// strict address order.
    pub fn validate(&self) -> Result<()> {
        for (_, symbol) in &self.symbols {
            if let SymbolPayload::Referent(referent) = symbol.payload {
                match referent {
                    Referent::Code(id) if !self.code_blocks.contains_key(&id) => {
                        return Err(IrError::DanglingCodeBlock(id));
                    }
                    Referent::Data(id) if !self.data_blocks.contains_key(&id) => {
                        return Err(IrError::DanglingDataBlock(id));
                    }
                    Referent::Proxy(id) if !self.proxy_blocks.contains_key(&id) => {
                        return Err(IrError::DanglingProxyBlock(id));
                    }
                    _ => {}
                }
            }
        }

        if let Some(entry) = self.entry_point {
            if !self.code_blocks.contains_key(&entry) {
                return Err(IrError::DanglingCodeBlock(entry));
            }
        }

        for section in &self.sections {
            for interval in &section.intervals {
                let mut cursor = interval.address;
                for block in &interval.blocks {
                    let (address, size) = match block {
                        Block::Code(id) => {
                            let cb = self
                                .code_blocks
                                .get(id)
                                .ok_or(IrError::DanglingCodeBlock(*id))?;
                            (cb.address, cb.size)
                        }
                        Block::Data(id) => {
                            let db = self
                                .data_blocks
                                .get(id)
                                .ok_or(IrError::DanglingDataBlock(*id))?;
                            (db.address, db.size)
                        }
                    };
                    if address < cursor {
                        return Err(IrError::MisorderedBlocks {
                            section: section.name.clone(),
                            address,
                        });
                    }
                    if address + size > interval.end() {
                        return Err(IrError::BlockOutOfRange {
                            section: section.name.clone(),
                            address,
                        });
                    }
                    cursor = address + size;
                }

                for expr in interval.symbolic_exprs.values() {
                    for sym in expr.symbols() {
                        if !self.symbols.contains_key(&sym) {
                            return Err(IrError::DanglingSymbol(sym));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{CodeBlock, CodeBlockId};
    use crate::module::{BinaryFormat, Isa};
    use crate::section::{ByteInterval, Section, SectionFlags};
    use crate::symbol::{Symbol, SymbolId};
    use crate::symexpr::SymbolicExpr;
    use pretty_assertions::assert_eq;

    fn small_module() -> Module {
        let mut m = Module::new("ex", Isa::X64, BinaryFormat::Elf);
        let cb = m.add_code_block(CodeBlock::new(0x1000, 4));
        let sym = m.add_symbol(Symbol::with_referent("main", Referent::Code(cb)));
        let mut text = Section::new(".text", SectionFlags::text());
        let mut iv = ByteInterval::with_contents(0x1000, vec![0xc3, 0, 0, 0]);
        iv.blocks.push(Block::Code(cb));
        iv.add_symbolic_expr(0, SymbolicExpr::addr_const(sym, 0));
        text.add_interval(iv);
        m.add_section(text);
        m.entry_point = Some(cb);
        m
    }

    #[test]
    fn json_round_trip_preserves_graph() {
        let m = small_module();
        let json = m.to_json_string().unwrap();
        let back = Module::from_json_str(&json).unwrap();
        assert_eq!(back.name, "ex");
        assert_eq!(back.code_blocks.len(), 1);
        assert_eq!(back.sections[0].intervals[0].symbolic_exprs.len(), 1);
        assert_eq!(back.to_json_string().unwrap(), json);
    }

    #[test]
    fn dangling_symbolic_expr_is_rejected() {
        let mut m = small_module();
        m.sections[0].intervals[0]
            .add_symbolic_expr(2, SymbolicExpr::addr_const(SymbolId(99), 0));
        assert!(matches!(
            m.validate(),
            Err(IrError::DanglingSymbol(SymbolId(99)))
        ));
    }

    #[test]
    fn dangling_entry_point_is_rejected() {
        let mut m = small_module();
        m.entry_point = Some(CodeBlockId(42));
        assert!(matches!(
            m.validate(),
            Err(IrError::DanglingCodeBlock(CodeBlockId(42)))
        ));
    }

    #[test]
    fn overlapping_blocks_are_rejected() {
        let mut m = small_module();
        let overlapping = m.add_code_block(CodeBlock::new(0x1001, 4));
        m.sections[0].intervals[0].blocks.push(Block::Code(overlapping));
        assert!(m.validate().is_err());
    }

    #[test]
    fn ir_wrapper_round_trips() {
        let ir = Ir::new(vec![small_module()]);
        let json = ir.to_json_string().unwrap();
        let back = Ir::from_json_str(&json).unwrap();
        assert_eq!(back.modules.len(), 1);
    }
}
