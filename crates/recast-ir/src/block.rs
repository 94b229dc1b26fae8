use crate::insn::Instruction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CodeBlockId(pub u32);

impl std::fmt::Display for CodeBlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "code{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataBlockId(pub u32);

impl std::fmt::Display for DataBlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "data{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProxyBlockId(pub u32);

impl std::fmt::Display for ProxyBlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "proxy{}", self.0)
    }
}

/// A run of executable bytes. The instruction sequence is supplied by the
/// upstream decoder; this crate never decodes bytes itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeBlock {
    pub address: u64,
    pub size: u64,
    #[serde(default)]
    pub instructions: Vec<Instruction>,
}

impl CodeBlock {
    pub fn new(address: u64, size: u64) -> Self {
        Self {
            address,
            size,
            instructions: Vec::new(),
        }
    }

    pub fn with_instructions(address: u64, size: u64, instructions: Vec<Instruction>) -> Self {
        Self {
            address,
            size,
            instructions,
        }
    }

    pub fn end(&self) -> u64 {
        self.address + self.size
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataBlock {
    pub address: u64,
    pub size: u64,
    #[serde(default)]
    pub encoding: Option<DataEncoding>,
}

impl DataBlock {
    pub fn new(address: u64, size: u64) -> Self {
        Self {
            address,
            size,
            encoding: None,
        }
    }

    pub fn with_encoding(address: u64, size: u64, encoding: DataEncoding) -> Self {
        Self {
            address,
            size,
            encoding: Some(encoding),
        }
    }

    pub fn end(&self) -> u64 {
        self.address + self.size
    }
}

/// How a data block's bytes should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataEncoding {
    /// NUL-terminated string.
    String,
    /// String without a terminator.
    Ascii,
    Uleb128,
    Sleb128,
}

/// Placeholder for a block defined outside this module, e.g. the target of an
/// undefined external symbol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyBlock;
