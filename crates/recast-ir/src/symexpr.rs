use crate::symbol::SymbolId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Attributes changing how a reference must be rendered and linked.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ExprAttribute {
    Plt,
    Got,
    GotOff,
    PcRel,
    TpOff,
    NtpOff,
    DtpOff,
    TlsGd,
    TlsLd,
}

/// A relocation placeholder: the value at some byte offset derives from one
/// or two symbols plus a constant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolicExpr {
    AddrConst {
        symbol: SymbolId,
        #[serde(default)]
        offset: i64,
        #[serde(default)]
        attrs: BTreeSet<ExprAttribute>,
    },
    AddrAddr {
        minuend: SymbolId,
        subtrahend: SymbolId,
        #[serde(default)]
        offset: i64,
        #[serde(default)]
        attrs: BTreeSet<ExprAttribute>,
    },
}

impl SymbolicExpr {
    pub fn addr_const(symbol: SymbolId, offset: i64) -> Self {
        SymbolicExpr::AddrConst {
            symbol,
            offset,
            attrs: BTreeSet::new(),
        }
    }

    pub fn addr_addr(minuend: SymbolId, subtrahend: SymbolId) -> Self {
        SymbolicExpr::AddrAddr {
            minuend,
            subtrahend,
            offset: 0,
            attrs: BTreeSet::new(),
        }
    }

    pub fn with_attr(mut self, attr: ExprAttribute) -> Self {
        self.attrs_mut().insert(attr);
        self
    }

    pub fn attrs(&self) -> &BTreeSet<ExprAttribute> {
        match self {
            SymbolicExpr::AddrConst { attrs, .. } => attrs,
            SymbolicExpr::AddrAddr { attrs, .. } => attrs,
        }
    }

    pub fn attrs_mut(&mut self) -> &mut BTreeSet<ExprAttribute> {
        match self {
            SymbolicExpr::AddrConst { attrs, .. } => attrs,
            SymbolicExpr::AddrAddr { attrs, .. } => attrs,
        }
    }

    pub fn has_attr(&self, attr: ExprAttribute) -> bool {
        self.attrs().contains(&attr)
    }

    /// Every symbol the expression mentions, minuend first.
    pub fn symbols(&self) -> Vec<SymbolId> {
        match self {
            SymbolicExpr::AddrConst { symbol, .. } => vec![*symbol],
            SymbolicExpr::AddrAddr {
                minuend,
                subtrahend,
                ..
            } => vec![*minuend, *subtrahend],
        }
    }

    /// Rewrite each symbol reference through `f`, preserving structure.
    pub fn map_symbols(&self, mut f: impl FnMut(SymbolId) -> SymbolId) -> Self {
        match self {
            SymbolicExpr::AddrConst {
                symbol,
                offset,
                attrs,
            } => SymbolicExpr::AddrConst {
                symbol: f(*symbol),
                offset: *offset,
                attrs: attrs.clone(),
            },
            SymbolicExpr::AddrAddr {
                minuend,
                subtrahend,
                offset,
                attrs,
            } => SymbolicExpr::AddrAddr {
                minuend: f(*minuend),
                subtrahend: f(*subtrahend),
                offset: *offset,
                attrs: attrs.clone(),
            },
        }
    }
}
