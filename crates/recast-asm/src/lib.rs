/*! Turn binary IR into assembly text.
 *
 * The printing engine walks a module's sections, intervals, and blocks in a
 * fixed order and emits dialect-correct text: labels before bytes, fill
 * directives for every unused gap, relocation operands rendered through the
 * indirection their attributes demand. All dialect knowledge lives in a
 * formatting strategy chosen by (format, isa, syntax); the traversal itself
 * never branches on the target.
 */

pub mod elf;
pub mod engine;
pub mod masm;
pub mod policy;
pub mod strategy;
pub mod target;

pub use engine::AsmPrinter;
pub use policy::PrintingPolicy;
pub use strategy::FormatStrategy;
pub use target::{strategy_for, supported_targets, Syntax, TargetSpec};

use recast_ir::{BinaryFormat, Isa, SymbolId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrintError {
    #[error("unsupported target: {0}")]
    UnsupportedTarget(TargetSpec),
    #[error("module '{module}' is {module_format}-{module_isa}, target expects {target}")]
    TargetMismatch {
        module: String,
        module_format: BinaryFormat,
        module_isa: Isa,
        target: TargetSpec,
    },
    #[error("symbolic expression at offset {offset:#x} references unknown symbol {symbol}")]
    DanglingSymbol { symbol: SymbolId, offset: u64 },
    #[error("operand at {address:#x} references a missing symbolic expression (offset {offset:#x})")]
    MissingSymbolicExpr { address: u64, offset: u64 },
    #[error("no {size}-byte data directive in this dialect")]
    UnsupportedDataSize { size: u64 },
    #[error("interval at {address:#x} references a block missing from the arena")]
    DanglingBlock { address: u64 },
}

pub type Result<T> = std::result::Result<T, PrintError>;
