/*! Unified interface for binary rewriting output.
 *
 * Single import for everything you need: the IR graph, the fixup pass, the
 * assembly printing engine, and output-path routing. Batteries-included
 * entry point for relinking workflows.
 */

pub use recast_asm as asm;
pub use recast_fixup as fixup;
pub use recast_ir as ir;
pub use recast_paths as paths;

pub use recast_ir::{
    Block, ByteInterval, CodeBlock, DataBlock, Instruction, Ir, Module, PreparedModule, Section,
    Symbol, SymbolicExpr,
};

pub use recast_asm::{AsmPrinter, PrintingPolicy, Syntax, TargetSpec};

pub use recast_fixup::{prepare, prepare_auto, LinkMode};

pub use recast_paths::PathTemplateRules;
