use crate::aux::AuxData;
use crate::block::{CodeBlock, CodeBlockId, DataBlock, DataBlockId, ProxyBlock, ProxyBlockId};
use crate::section::{Block, Section};
use crate::symbol::{Referent, Symbol, SymbolId, SymbolPayload};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Isa {
    X64,
    Ia32,
}

impl std::fmt::Display for Isa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Isa::X64 => write!(f, "x64"),
            Isa::Ia32 => write!(f, "ia32"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryFormat {
    Elf,
    Pe,
}

impl std::fmt::Display for BinaryFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryFormat::Elf => write!(f, "elf"),
            BinaryFormat::Pe => write!(f, "pe"),
        }
    }
}

/// One rewritable binary: sections in file order, arenas of blocks and
/// symbols addressed by stable ids, and the keyed auxiliary tables.
///
/// Arena iteration follows insertion order, so identical construction always
/// yields identical traversal; nothing downstream may depend on hashing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub isa: Isa,
    pub format: BinaryFormat,
    #[serde(default)]
    pub entry_point: Option<CodeBlockId>,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub symbols: IndexMap<SymbolId, Symbol>,
    #[serde(default)]
    pub code_blocks: IndexMap<CodeBlockId, CodeBlock>,
    #[serde(default)]
    pub data_blocks: IndexMap<DataBlockId, DataBlock>,
    #[serde(default)]
    pub proxy_blocks: IndexMap<ProxyBlockId, ProxyBlock>,
    #[serde(default)]
    pub aux: AuxData,
}

impl Module {
    pub fn new(name: impl Into<String>, isa: Isa, format: BinaryFormat) -> Self {
        Self {
            name: name.into(),
            isa,
            format,
            entry_point: None,
            sections: Vec::new(),
            symbols: IndexMap::new(),
            code_blocks: IndexMap::new(),
            data_blocks: IndexMap::new(),
            proxy_blocks: IndexMap::new(),
            aux: AuxData::default(),
        }
    }

    pub fn add_section(&mut self, section: Section) {
        self.sections.push(section);
    }

    pub fn add_symbol(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(next_key(self.symbols.keys().map(|k| k.0)));
        self.symbols.insert(id, symbol);
        id
    }

    pub fn add_code_block(&mut self, block: CodeBlock) -> CodeBlockId {
        let id = CodeBlockId(next_key(self.code_blocks.keys().map(|k| k.0)));
        self.code_blocks.insert(id, block);
        id
    }

    pub fn add_data_block(&mut self, block: DataBlock) -> DataBlockId {
        let id = DataBlockId(next_key(self.data_blocks.keys().map(|k| k.0)));
        self.data_blocks.insert(id, block);
        id
    }

    pub fn add_proxy_block(&mut self) -> ProxyBlockId {
        let id = ProxyBlockId(next_key(self.proxy_blocks.keys().map(|k| k.0)));
        self.proxy_blocks.insert(id, ProxyBlock);
        id
    }

    pub fn symbol(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(&id)
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> Option<&mut Symbol> {
        self.symbols.get_mut(&id)
    }

    pub fn code_block(&self, id: CodeBlockId) -> Option<&CodeBlock> {
        self.code_blocks.get(&id)
    }

    pub fn data_block(&self, id: DataBlockId) -> Option<&DataBlock> {
        self.data_blocks.get(&id)
    }

    /// Ids of all symbols with the given name, in arena order.
    pub fn find_symbols_by_name(&self, name: &str) -> Vec<SymbolId> {
        self.symbols
            .iter()
            .filter(|(_, s)| s.name == name)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Symbols whose referent is the given code block, in arena order.
    pub fn symbols_for_code_block(&self, block: CodeBlockId) -> Vec<SymbolId> {
        self.symbols
            .iter()
            .filter(|(_, s)| s.referent() == Some(Referent::Code(block)))
            .map(|(id, _)| *id)
            .collect()
    }

    /// The address a symbol denotes, through its referent if it has one.
    /// Proxy referents have no address.
    pub fn symbol_address(&self, id: SymbolId) -> Option<u64> {
        match self.symbols.get(&id)?.payload {
            SymbolPayload::Addr(addr) => Some(addr),
            SymbolPayload::Referent(Referent::Code(b)) => {
                self.code_blocks.get(&b).map(|cb| cb.address)
            }
            SymbolPayload::Referent(Referent::Data(b)) => {
                self.data_blocks.get(&b).map(|db| db.address)
            }
            SymbolPayload::Referent(Referent::Proxy(_)) => None,
        }
    }

    pub fn block_address(&self, block: Block) -> Option<u64> {
        match block {
            Block::Code(id) => self.code_blocks.get(&id).map(|b| b.address),
            Block::Data(id) => self.data_blocks.get(&id).map(|b| b.address),
        }
    }

    pub fn block_size(&self, block: Block) -> Option<u64> {
        match block {
            Block::Code(id) => self.code_blocks.get(&id).map(|b| b.size),
            Block::Data(id) => self.data_blocks.get(&id).map(|b| b.size),
        }
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.iter().any(|s| s.name == name)
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }
}

fn next_key(keys: impl Iterator<Item = u32>) -> u32 {
    keys.max().map(|k| k + 1).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_ids_are_stable_and_fresh() {
        let mut m = Module::new("ex", Isa::X64, BinaryFormat::Elf);
        let a = m.add_code_block(CodeBlock::new(0x1000, 4));
        let b = m.add_code_block(CodeBlock::new(0x1004, 4));
        assert_ne!(a, b);
        assert_eq!(m.code_block(a).map(|cb| cb.address), Some(0x1000));
        assert_eq!(m.code_block(b).map(|cb| cb.address), Some(0x1004));
    }

    #[test]
    fn symbol_address_resolves_through_referents() {
        let mut m = Module::new("ex", Isa::X64, BinaryFormat::Elf);
        let cb = m.add_code_block(CodeBlock::new(0x1000, 8));
        let sym = m.add_symbol(Symbol::with_referent("main", Referent::Code(cb)));
        let abs = m.add_symbol(Symbol::new("absolute", SymbolPayload::Addr(0x4000)));
        let proxy = m.add_proxy_block();
        let ext = m.add_symbol(Symbol::with_referent("puts", Referent::Proxy(proxy)));

        assert_eq!(m.symbol_address(sym), Some(0x1000));
        assert_eq!(m.symbol_address(abs), Some(0x4000));
        assert_eq!(m.symbol_address(ext), None);
    }

    #[test]
    fn find_symbols_by_name_keeps_arena_order() {
        let mut m = Module::new("ex", Isa::X64, BinaryFormat::Elf);
        let cb = m.add_code_block(CodeBlock::new(0x1000, 8));
        let first = m.add_symbol(Symbol::with_referent("dup", Referent::Code(cb)));
        let second = m.add_symbol(Symbol::with_referent("dup", Referent::Code(cb)));
        assert_eq!(m.find_symbols_by_name("dup"), vec![first, second]);
    }
}
