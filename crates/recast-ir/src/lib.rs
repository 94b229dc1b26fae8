/*! Core IR types for binary program rewriting.
 *
 * A rewritten binary starts life as an IR graph: sections holding byte
 * intervals, intervals holding code and data blocks, symbols naming addresses
 * or blocks, and symbolic expressions marking the byte offsets whose values
 * derive from symbols. This crate provides that graph, its typed auxiliary
 * tables, and JSON persistence for moving modules between tools.
 */

pub mod aux;
pub mod block;
pub mod insn;
pub mod module;
pub mod persist;
pub mod prepared;
pub mod section;
pub mod symbol;
pub mod symexpr;

pub use aux::{
    AuxData, Binding, BinaryTypeFlag, ElfSymbolInfo, PeExportEntry, PeImportEntry, SymbolType,
    Visibility,
};
pub use block::{
    CodeBlock, CodeBlockId, DataBlock, DataBlockId, DataEncoding, ProxyBlock, ProxyBlockId,
};
pub use insn::{InsnGroup, Instruction, Operand};
pub use module::{BinaryFormat, Isa, Module};
pub use persist::Ir;
pub use prepared::PreparedModule;
pub use section::{Block, ByteInterval, Section, SectionFlags};
pub use symbol::{Referent, Symbol, SymbolId, SymbolPayload};
pub use symexpr::{ExprAttribute, SymbolicExpr};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IrError {
    #[error("dangling symbol id: {0}")]
    DanglingSymbol(SymbolId),
    #[error("dangling code block id: {0}")]
    DanglingCodeBlock(CodeBlockId),
    #[error("dangling data block id: {0}")]
    DanglingDataBlock(DataBlockId),
    #[error("dangling proxy block id: {0}")]
    DanglingProxyBlock(ProxyBlockId),
    #[error("blocks out of address order in section {section} at {address:#x}")]
    MisorderedBlocks { section: String, address: u64 },
    #[error("block at {address:#x} lies outside its byte interval in section {section}")]
    BlockOutOfRange { section: String, address: u64 },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IrError>;
