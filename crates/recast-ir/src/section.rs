use crate::block::{CodeBlockId, DataBlockId};
use crate::symexpr::SymbolicExpr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Block {
    Code(CodeBlockId),
    Data(DataBlockId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionFlags {
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
    pub loaded: bool,
    /// False for bss-style sections whose bytes are not stored in the file.
    pub initialized: bool,
}

impl SectionFlags {
    pub fn text() -> Self {
        Self {
            readable: true,
            writable: false,
            executable: true,
            loaded: true,
            initialized: true,
        }
    }

    pub fn data() -> Self {
        Self {
            readable: true,
            writable: true,
            executable: false,
            loaded: true,
            initialized: true,
        }
    }

    pub fn rodata() -> Self {
        Self {
            readable: true,
            writable: false,
            executable: false,
            loaded: true,
            initialized: true,
        }
    }

    pub fn bss() -> Self {
        Self {
            readable: true,
            writable: true,
            executable: false,
            loaded: true,
            initialized: false,
        }
    }
}

/// A contiguous, addressed run of bytes. Blocks are listed in address order
/// and must not overlap; symbolic expressions are keyed by offset from the
/// interval's start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ByteInterval {
    pub address: u64,
    pub size: u64,
    #[serde(default)]
    pub contents: Vec<u8>,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub symbolic_exprs: BTreeMap<u64, SymbolicExpr>,
}

impl ByteInterval {
    pub fn new(address: u64, size: u64) -> Self {
        Self {
            address,
            size,
            contents: Vec::new(),
            blocks: Vec::new(),
            symbolic_exprs: BTreeMap::new(),
        }
    }

    pub fn with_contents(address: u64, contents: Vec<u8>) -> Self {
        Self {
            address,
            size: contents.len() as u64,
            contents,
            blocks: Vec::new(),
            symbolic_exprs: BTreeMap::new(),
        }
    }

    pub fn end(&self) -> u64 {
        self.address + self.size
    }

    pub fn add_symbolic_expr(&mut self, offset: u64, expr: SymbolicExpr) {
        self.symbolic_exprs.insert(offset, expr);
    }

    /// Bytes for `[offset, offset + len)`, zero-padded past the stored
    /// contents (uninitialized tails of an interval read as zero).
    pub fn bytes_at(&self, offset: u64, len: u64) -> Vec<u8> {
        let mut out = Vec::with_capacity(len as usize);
        for i in offset..offset + len {
            out.push(*self.contents.get(i as usize).unwrap_or(&0));
        }
        out
    }

    /// Symbolic expressions with offsets in `[start, end)`.
    pub fn symbolic_exprs_in(
        &self,
        start: u64,
        end: u64,
    ) -> impl Iterator<Item = (u64, &SymbolicExpr)> {
        self.symbolic_exprs
            .range(start..end)
            .map(|(off, expr)| (*off, expr))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub flags: SectionFlags,
    #[serde(default)]
    pub intervals: Vec<ByteInterval>,
}

impl Section {
    pub fn new(name: impl Into<String>, flags: SectionFlags) -> Self {
        Self {
            name: name.into(),
            flags,
            intervals: Vec::new(),
        }
    }

    pub fn add_interval(&mut self, interval: ByteInterval) {
        self.intervals.push(interval);
    }
}
