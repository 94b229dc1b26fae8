use crate::block::CodeBlockId;
use crate::symbol::SymbolId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Binding {
    Local,
    Global,
    Weak,
    GnuUnique,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Default,
    Hidden,
    Protected,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolType {
    None,
    Func,
    Object,
    Tls,
    File,
    GnuIFunc,
}

/// Section index value marking a communal symbol in its object file.
pub const SHN_COMMON: u64 = 0xfff2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElfSymbolInfo {
    #[serde(default)]
    pub size: u64,
    pub sym_type: SymbolType,
    pub binding: Binding,
    pub visibility: Visibility,
    #[serde(default)]
    pub section_index: u64,
}

impl ElfSymbolInfo {
    pub fn new(sym_type: SymbolType, binding: Binding, visibility: Visibility) -> Self {
        Self {
            size: 0,
            sym_type,
            binding,
            visibility,
            section_index: 0,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self.binding, Binding::Global | Binding::GnuUnique)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryTypeFlag {
    Dyn,
    Exec,
    Pie,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeImportEntry {
    pub iat_address: u64,
    pub ordinal: i64,
    pub function: String,
    pub library: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeExportEntry {
    pub address: u64,
    pub ordinal: i64,
    pub name: String,
}

/// Keyed auxiliary tables carried alongside the module graph. All maps are
/// ordered so table iteration never depends on insertion history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuxData {
    pub elf_symbol_info: BTreeMap<SymbolId, ElfSymbolInfo>,
    /// References to a key symbol print as its value symbol instead, e.g.
    /// a PLT stub forwarding to the external function it wraps.
    pub symbol_forwarding: BTreeMap<SymbolId, SymbolId>,
    pub libraries: Vec<String>,
    pub library_paths: Vec<String>,
    pub binary_type: Vec<BinaryTypeFlag>,
    pub pe_import_entries: Vec<PeImportEntry>,
    pub pe_export_entries: Vec<PeExportEntry>,
    pub pe_imported_symbols: BTreeSet<SymbolId>,
    pub pe_exported_symbols: BTreeSet<SymbolId>,
    pub elf_dynamic_init: Option<CodeBlockId>,
    pub elf_dynamic_fini: Option<CodeBlockId>,
    /// Function entry symbol to the blocks the function comprises.
    pub functions: BTreeMap<SymbolId, Vec<CodeBlockId>>,
    /// Required alignment by address.
    pub alignment: BTreeMap<u64, u64>,
}

impl AuxData {
    pub fn symbol_info(&self, id: SymbolId) -> Option<&ElfSymbolInfo> {
        self.elf_symbol_info.get(&id)
    }

    pub fn forwarded(&self, id: SymbolId) -> Option<SymbolId> {
        self.symbol_forwarding.get(&id).copied()
    }

    pub fn is_shared_object(&self) -> bool {
        self.binary_type.contains(&BinaryTypeFlag::Dyn)
            && !self.binary_type.contains(&BinaryTypeFlag::Exec)
            && !self.binary_type.contains(&BinaryTypeFlag::Pie)
    }
}
