use crate::block::{CodeBlockId, DataBlockId, ProxyBlockId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

impl std::fmt::Display for SymbolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sym{}", self.0)
    }
}

/// What a symbol points at: an identifier plus an explicit kind tag, resolved
/// through the module's arenas rather than a graph pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Referent {
    Code(CodeBlockId),
    Data(DataBlockId),
    Proxy(ProxyBlockId),
}

impl Referent {
    pub fn is_proxy(&self) -> bool {
        matches!(self, Referent::Proxy(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolPayload {
    /// An integral symbol: a bare address with no backing block.
    Addr(u64),
    Referent(Referent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub payload: SymbolPayload,
}

impl Symbol {
    pub fn new(name: impl Into<String>, payload: SymbolPayload) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    pub fn with_referent(name: impl Into<String>, referent: Referent) -> Self {
        Self::new(name, SymbolPayload::Referent(referent))
    }

    pub fn with_address(name: impl Into<String>, address: u64) -> Self {
        Self::new(name, SymbolPayload::Addr(address))
    }

    pub fn referent(&self) -> Option<Referent> {
        match self.payload {
            SymbolPayload::Referent(r) => Some(r),
            SymbolPayload::Addr(_) => None,
        }
    }

    /// True for symbols whose only payload is an absolute address.
    pub fn is_integral(&self) -> bool {
        matches!(self.payload, SymbolPayload::Addr(_))
    }
}
