use recast_ir::{ElfSymbolInfo, ExprAttribute, Instruction, Module, Section};
use std::collections::BTreeSet;

/// Memory operand fields after the dialect's fixup hook has run.
#[derive(Debug, Clone, Copy)]
pub struct MemOperand<'a> {
    pub segment: Option<&'a str>,
    pub base: Option<&'a str>,
    pub index: Option<&'a str>,
    pub scale: u8,
    pub displacement: i64,
    pub size: u16,
}

/// Everything the engine delegates: directive vocabulary, name mangling, the
/// pre-print instruction fixup hook, and operand layout. One implementation
/// per registered target triple; the traversal never sees which one it holds.
///
/// `symbolic` arguments carry relocation text the engine has already
/// rendered (primary name, constant, indirection suffix); the strategy only
/// decides where it sits in the operand.
pub trait FormatStrategy {
    // Vocabulary.
    fn comment(&self) -> &'static str;
    fn tab(&self) -> &'static str {
        "    "
    }
    fn format_byte(&self, byte: u8) -> String;
    fn zero_fill(&self, len: u64) -> String;
    /// Directive for a `size`-byte symbolic datum, if the dialect has one.
    fn data_directive(&self, size: u64) -> Option<&'static str>;
    fn align_directive(&self, alignment: u64) -> String;
    fn format_string(&self, bytes: &[u8], null_terminated: bool) -> Vec<String>;
    fn format_uleb128(&self, expr: &str) -> Option<String> {
        let _ = expr;
        None
    }
    fn format_sleb128(&self, expr: &str) -> Option<String> {
        let _ = expr;
        None
    }

    // Module furniture.
    fn header(&self, module: &Module) -> String {
        let _ = module;
        String::new()
    }
    fn footer(&self) -> Option<String> {
        None
    }
    fn section_header(&self, section: &Section) -> String;
    fn section_footer(&self, section: &Section) -> Option<String>;

    // Name mangling.
    fn format_section_name(&self, name: &str) -> String {
        name.to_string()
    }
    fn format_symbol_name(&self, name: &str) -> String {
        name.to_string()
    }

    // Symbol definitions.
    /// Directive lines (binding, visibility, type, size) printed before a
    /// symbol's label. `exported` marks PE export-table membership and
    /// `is_code` whether the definition fronts a code block.
    fn symbol_header(
        &self,
        name: &str,
        info: Option<&ElfSymbolInfo>,
        exported: bool,
        is_code: bool,
    ) -> String;
    fn code_label(&self, name: &str) -> String {
        format!("{}:", name)
    }
    fn data_label(&self, name: &str) -> String {
        format!("{}:", name)
    }
    fn function_end(&self, name: &str) -> Option<String> {
        let _ = name;
        None
    }
    fn set_directive(&self, name: &str, value: &str) -> String;
    fn comm_directive(&self, name: &str, size: u64, align: u64) -> Option<String> {
        let _ = (name, size, align);
        None
    }

    // Instructions.
    /// Correct known decoder/dialect mismatches before printing.
    fn fixup_instruction(&self, insn: &mut Instruction) {
        let _ = insn;
    }
    fn format_op_register(&self, reg: &str) -> String;
    fn format_op_immediate(&self, insn: &Instruction, value: i64, symbolic: Option<&str>)
        -> String;
    /// `collapse` carries the direct name an indirect reference to a
    /// forwarded external should degrade to, for dialects that do that.
    fn format_op_memory(
        &self,
        insn: &Instruction,
        mem: &MemOperand,
        symbolic: Option<&str>,
        collapse: Option<&str>,
    ) -> String;
    fn format_instruction(&self, insn: &Instruction, operands: Vec<String>) -> String;

    // Symbolic expressions.
    fn symexpr_suffix(&self, attrs: &BTreeSet<ExprAttribute>, is_branch: bool) -> &'static str {
        let _ = (attrs, is_branch);
        ""
    }
    /// Image-relative form for `sym - image_base`, if the dialect has one.
    fn imagerel(&self, name: &str) -> Option<String> {
        let _ = name;
        None
    }
}
