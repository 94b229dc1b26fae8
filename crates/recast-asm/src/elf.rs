use crate::strategy::{FormatStrategy, MemOperand};
use recast_ir::{Binding, ElfSymbolInfo, ExprAttribute, Instruction, Module, Operand, Section};
use recast_ir::{SymbolType, Visibility};
use std::collections::BTreeSet;

/// Sections GAS spells as a bare directive instead of `.section`.
const BARE_SECTIONS: &[&str] = &[".text", ".data", ".bss"];

/// Mnemonics whose GAS/AT&T spelling takes an operand-size suffix when no
/// register operand pins the width.
const SUFFIXABLE: &[&str] = &[
    "mov", "add", "sub", "cmp", "and", "or", "xor", "test", "inc", "dec", "not", "neg", "shl",
    "shr", "sar", "push", "pop",
];

/// Directive vocabulary shared by both GAS dialects.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElfSyntax;

impl ElfSyntax {
    fn section_header(&self, section: &Section) -> String {
        if BARE_SECTIONS.contains(&section.name.as_str()) {
            return section.name.clone();
        }
        let mut flags = String::new();
        if section.flags.writable {
            flags.push('w');
        }
        if section.flags.loaded {
            flags.push('a');
        }
        if section.flags.executable {
            flags.push('x');
        }
        let kind = if section.flags.initialized {
            "progbits"
        } else {
            "nobits"
        };
        format!(".section {} ,\"{}\",@{}", section.name, flags, kind)
    }

    fn symbol_header(&self, name: &str, info: Option<&ElfSymbolInfo>) -> String {
        let info = match info {
            Some(info) => info,
            None => return String::new(),
        };
        // Default attributes need no header; FILE symbols are never printed.
        if info.binding == Binding::Local
            && info.visibility == Visibility::Default
            && info.sym_type == SymbolType::None
        {
            return String::new();
        }
        if info.sym_type == SymbolType::File {
            return String::new();
        }

        let mut out = String::new();
        match info.binding {
            Binding::Local => {}
            Binding::Global | Binding::GnuUnique => {
                out.push_str(&format!(".globl {}\n", name));
            }
            Binding::Weak => {
                out.push_str(&format!(".weak {}\n", name));
            }
        }
        match info.visibility {
            Visibility::Default => {}
            Visibility::Hidden => out.push_str(&format!(".hidden {}\n", name)),
            Visibility::Protected => out.push_str(&format!(".protected {}\n", name)),
            Visibility::Internal => out.push_str(&format!(".internal {}\n", name)),
        }
        let type_name = if info.binding == Binding::GnuUnique {
            "gnu_unique_object"
        } else {
            match info.sym_type {
                SymbolType::Func => "function",
                SymbolType::Object => "object",
                SymbolType::Tls => "tls_object",
                SymbolType::GnuIFunc => "gnu_indirect_function",
                SymbolType::None | SymbolType::File => "notype",
            }
        };
        out.push_str(&format!(".type {}, @{}\n", name, type_name));
        if matches!(info.sym_type, SymbolType::Object | SymbolType::Tls) && info.size != 0 {
            out.push_str(&format!(".size {}, {}\n", name, info.size));
        }
        out
    }

    fn data_directive(&self, size: u64) -> Option<&'static str> {
        match size {
            1 => Some(".byte"),
            2 => Some(".value"),
            4 => Some(".long"),
            8 => Some(".quad"),
            _ => None,
        }
    }

    fn format_string(&self, directive: &str, bytes: &[u8]) -> String {
        let mut text = String::new();
        for byte in bytes {
            if *byte == 0 {
                continue;
            }
            text.push_str(&escape_byte(*byte));
        }
        format!("{} \"{}\"", directive, text)
    }

    fn symexpr_suffix(&self, attrs: &BTreeSet<ExprAttribute>, is_branch: bool) -> &'static str {
        use ExprAttribute::*;
        if attrs.contains(&Plt) {
            if is_branch {
                "@PLT"
            } else {
                ""
            }
        } else if attrs.contains(&Got) {
            if attrs.contains(&PcRel) {
                "@GOTPCREL"
            } else if attrs.contains(&NtpOff) {
                "@GOTNTPOFF"
            } else if attrs.contains(&TpOff) {
                "@GOTTPOFF"
            } else {
                "@GOT"
            }
        } else if attrs.contains(&GotOff) {
            "@GOTOFF"
        } else if attrs.contains(&TpOff) {
            "@TPOFF"
        } else if attrs.contains(&NtpOff) {
            "@NTPOFF"
        } else if attrs.contains(&DtpOff) {
            "@DTPOFF"
        } else if attrs.contains(&TlsGd) {
            "@TLSGD"
        } else if attrs.contains(&TlsLd) {
            "@TLSLD"
        } else {
            ""
        }
    }
}

pub fn escape_byte(byte: u8) -> String {
    match byte {
        b'\\' => "\\\\".to_string(),
        b'"' => "\\\"".to_string(),
        b'\n' => "\\n".to_string(),
        b'\t' => "\\t".to_string(),
        b'\r' => "\\r".to_string(),
        b if (0x20..0x7f).contains(&b) => (b as char).to_string(),
        b => format!("\\{:03o}", b),
    }
}

fn plain_immediate(value: i64) -> String {
    value.to_string()
}

fn branch_target(value: i64, symbolic: Option<&str>) -> String {
    match symbolic {
        Some(text) => text.to_string(),
        None => format!("{:#x}", value),
    }
}

/// AT&T syntax on ELF.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElfAttStrategy {
    syntax: ElfSyntax,
}

impl ElfAttStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FormatStrategy for ElfAttStrategy {
    fn comment(&self) -> &'static str {
        "#"
    }

    fn format_byte(&self, byte: u8) -> String {
        format!(".byte {:#x}", byte)
    }

    fn zero_fill(&self, len: u64) -> String {
        format!(".zero {}", len)
    }

    fn data_directive(&self, size: u64) -> Option<&'static str> {
        self.syntax.data_directive(size)
    }

    fn align_directive(&self, alignment: u64) -> String {
        format!(".align {}", alignment)
    }

    fn format_string(&self, bytes: &[u8], null_terminated: bool) -> Vec<String> {
        let directive = if null_terminated { ".string" } else { ".ascii" };
        vec![self.syntax.format_string(directive, bytes)]
    }

    fn format_uleb128(&self, expr: &str) -> Option<String> {
        Some(format!(".uleb128 {}", expr))
    }

    fn format_sleb128(&self, expr: &str) -> Option<String> {
        Some(format!(".sleb128 {}", expr))
    }

    fn section_header(&self, section: &Section) -> String {
        self.syntax.section_header(section)
    }

    fn section_footer(&self, section: &Section) -> Option<String> {
        Some(format!("{} end section {}", self.comment(), section.name))
    }

    fn symbol_header(
        &self,
        name: &str,
        info: Option<&ElfSymbolInfo>,
        _exported: bool,
        _is_code: bool,
    ) -> String {
        self.syntax.symbol_header(name, info)
    }

    fn function_end(&self, name: &str) -> Option<String> {
        Some(format!(".size {}, . - {}", name, name))
    }

    fn set_directive(&self, name: &str, value: &str) -> String {
        format!(".set {}, {}", name, value)
    }

    fn comm_directive(&self, name: &str, size: u64, align: u64) -> Option<String> {
        if align > 0 {
            Some(format!(".comm {},{},{}", name, size, align))
        } else {
            Some(format!(".comm {},{}", name, size))
        }
    }

    fn fixup_instruction(&self, insn: &mut Instruction) {
        // Complete the operand-size suffix when no register operand pins the
        // width; the decoder reports sizes only on the memory operand.
        if !SUFFIXABLE.contains(&insn.mnemonic.as_str()) {
            return;
        }
        let has_register = insn
            .operands
            .iter()
            .any(|op| matches!(op, Operand::Register(_)));
        if has_register {
            return;
        }
        let mem_size = insn.operands.iter().find_map(|op| match op {
            Operand::Memory { size, .. } => Some(*size),
            _ => None,
        });
        let suffix = match mem_size {
            Some(1) => "b",
            Some(2) => "w",
            Some(4) => "l",
            Some(8) => "q",
            _ => return,
        };
        insn.mnemonic.push_str(suffix);
    }

    fn format_op_register(&self, reg: &str) -> String {
        format!("%{}", reg)
    }

    fn format_op_immediate(
        &self,
        insn: &Instruction,
        value: i64,
        symbolic: Option<&str>,
    ) -> String {
        if insn.is_branch() {
            return branch_target(value, symbolic);
        }
        match symbolic {
            Some(text) => format!("${}", text),
            None => format!("${}", plain_immediate(value)),
        }
    }

    fn format_op_memory(
        &self,
        _insn: &Instruction,
        mem: &MemOperand,
        symbolic: Option<&str>,
        _collapse: Option<&str>,
    ) -> String {
        let mut out = String::new();
        if let Some(segment) = mem.segment {
            out.push_str(&format!("%{}:", segment));
        }
        let displacement = match symbolic {
            Some(text) => text.to_string(),
            None if mem.displacement != 0 || (mem.base.is_none() && mem.index.is_none()) => {
                mem.displacement.to_string()
            }
            None => String::new(),
        };
        out.push_str(&displacement);
        if mem.base.is_none() && mem.index.is_none() {
            return out;
        }
        out.push('(');
        if let Some(base) = mem.base {
            out.push_str(&format!("%{}", base));
        }
        if let Some(index) = mem.index {
            out.push_str(&format!(",%{},{}", index, mem.scale));
        }
        out.push(')');
        out
    }

    fn format_instruction(&self, insn: &Instruction, mut operands: Vec<String>) -> String {
        operands.reverse();
        if operands.is_empty() {
            insn.mnemonic.clone()
        } else {
            format!("{} {}", insn.mnemonic, operands.join(", "))
        }
    }

    fn symexpr_suffix(&self, attrs: &BTreeSet<ExprAttribute>, is_branch: bool) -> &'static str {
        self.syntax.symexpr_suffix(attrs, is_branch)
    }
}

/// GAS Intel syntax on ELF: same directives as AT&T, Intel operand forms.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElfIntelStrategy {
    syntax: ElfSyntax,
}

impl ElfIntelStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

fn intel_size_name(size: u16) -> Option<&'static str> {
    match size {
        1 => Some("BYTE"),
        2 => Some("WORD"),
        4 => Some("DWORD"),
        8 => Some("QWORD"),
        10 => Some("TBYTE"),
        16 => Some("XMMWORD"),
        32 => Some("YMMWORD"),
        _ => None,
    }
}

impl FormatStrategy for ElfIntelStrategy {
    fn comment(&self) -> &'static str {
        "#"
    }

    fn format_byte(&self, byte: u8) -> String {
        format!(".byte {:#x}", byte)
    }

    fn zero_fill(&self, len: u64) -> String {
        format!(".zero {}", len)
    }

    fn data_directive(&self, size: u64) -> Option<&'static str> {
        self.syntax.data_directive(size)
    }

    fn align_directive(&self, alignment: u64) -> String {
        format!(".align {}", alignment)
    }

    fn format_string(&self, bytes: &[u8], null_terminated: bool) -> Vec<String> {
        let directive = if null_terminated { ".string" } else { ".ascii" };
        vec![self.syntax.format_string(directive, bytes)]
    }

    fn format_uleb128(&self, expr: &str) -> Option<String> {
        Some(format!(".uleb128 {}", expr))
    }

    fn format_sleb128(&self, expr: &str) -> Option<String> {
        Some(format!(".sleb128 {}", expr))
    }

    fn header(&self, _module: &Module) -> String {
        ".intel_syntax noprefix\n".to_string()
    }

    fn section_header(&self, section: &Section) -> String {
        self.syntax.section_header(section)
    }

    fn section_footer(&self, section: &Section) -> Option<String> {
        Some(format!("{} end section {}", self.comment(), section.name))
    }

    fn symbol_header(
        &self,
        name: &str,
        info: Option<&ElfSymbolInfo>,
        _exported: bool,
        _is_code: bool,
    ) -> String {
        self.syntax.symbol_header(name, info)
    }

    fn function_end(&self, name: &str) -> Option<String> {
        Some(format!(".size {}, . - {}", name, name))
    }

    fn set_directive(&self, name: &str, value: &str) -> String {
        format!(".set {}, {}", name, value)
    }

    fn comm_directive(&self, name: &str, size: u64, align: u64) -> Option<String> {
        if align > 0 {
            Some(format!(".comm {},{},{}", name, size, align))
        } else {
            Some(format!(".comm {},{}", name, size))
        }
    }

    fn format_op_register(&self, reg: &str) -> String {
        reg.to_string()
    }

    fn format_op_immediate(
        &self,
        insn: &Instruction,
        value: i64,
        symbolic: Option<&str>,
    ) -> String {
        if insn.is_branch() {
            return branch_target(value, symbolic);
        }
        match symbolic {
            Some(text) => format!("OFFSET {}", text),
            None => plain_immediate(value),
        }
    }

    fn format_op_memory(
        &self,
        _insn: &Instruction,
        mem: &MemOperand,
        symbolic: Option<&str>,
        _collapse: Option<&str>,
    ) -> String {
        let mut out = String::new();
        if let Some(size_name) = intel_size_name(mem.size) {
            out.push_str(size_name);
            out.push_str(" PTR ");
        }
        if let Some(segment) = mem.segment {
            out.push_str(segment);
            out.push(':');
        }
        out.push('[');
        let mut first = true;
        if let Some(base) = mem.base {
            out.push_str(base);
            first = false;
        }
        if let Some(index) = mem.index {
            if !first {
                out.push('+');
            }
            out.push_str(&format!("{}*{}", index, mem.scale));
            first = false;
        }
        match symbolic {
            Some(text) => {
                if !first {
                    out.push('+');
                }
                out.push_str(text);
            }
            None => {
                if mem.displacement != 0 || first {
                    if !first && mem.displacement >= 0 {
                        out.push('+');
                    }
                    out.push_str(&mem.displacement.to_string());
                }
            }
        }
        out.push(']');
        out
    }

    fn format_instruction(&self, insn: &Instruction, operands: Vec<String>) -> String {
        if operands.is_empty() {
            insn.mnemonic.clone()
        } else {
            format!("{} {}", insn.mnemonic, operands.join(", "))
        }
    }

    fn symexpr_suffix(&self, attrs: &BTreeSet<ExprAttribute>, is_branch: bool) -> &'static str {
        self.syntax.symexpr_suffix(attrs, is_branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recast_ir::{InsnGroup, SectionFlags};

    #[test]
    fn bare_section_names_have_no_section_directive() {
        let strategy = ElfAttStrategy::new();
        let text = Section::new(".text", SectionFlags::text());
        assert_eq!(strategy.section_header(&text), ".text");

        let rodata = Section::new(".rodata", SectionFlags::rodata());
        assert_eq!(
            strategy.section_header(&rodata),
            ".section .rodata ,\"a\",@progbits"
        );

        let bss = Section::new(".extra_bss", SectionFlags::bss());
        assert_eq!(
            strategy.section_header(&bss),
            ".section .extra_bss ,\"wa\",@nobits"
        );
    }

    #[test]
    fn att_reverses_operand_order() {
        let strategy = ElfAttStrategy::new();
        let insn = Instruction::new(0x1000, 3, "mov");
        let rendered = strategy.format_instruction(
            &insn,
            vec!["%rax".to_string(), "%rbx".to_string()],
        );
        assert_eq!(rendered, "mov %rbx, %rax");
    }

    #[test]
    fn att_suffix_fixup_applies_only_without_registers() {
        let strategy = ElfAttStrategy::new();

        let mut insn = Instruction::new(0x1000, 7, "mov").with_operands(vec![
            Operand::Memory {
                segment: None,
                base: Some("rbp".to_string()),
                index: None,
                scale: 1,
                displacement: -8,
                size: 8,
                symbolic: None,
            },
            Operand::imm(1),
        ]);
        strategy.fixup_instruction(&mut insn);
        assert_eq!(insn.mnemonic, "movq");

        let mut with_reg = Instruction::new(0x1000, 3, "mov").with_operands(vec![
            Operand::reg("rax"),
            Operand::imm(1),
        ]);
        strategy.fixup_instruction(&mut with_reg);
        assert_eq!(with_reg.mnemonic, "mov");
    }

    #[test]
    fn plt_suffix_only_on_branches() {
        let strategy = ElfAttStrategy::new();
        let attrs: BTreeSet<_> = [ExprAttribute::Plt].into_iter().collect();
        assert_eq!(strategy.symexpr_suffix(&attrs, true), "@PLT");
        assert_eq!(strategy.symexpr_suffix(&attrs, false), "");

        let got: BTreeSet<_> = [ExprAttribute::Got, ExprAttribute::PcRel]
            .into_iter()
            .collect();
        assert_eq!(strategy.symexpr_suffix(&got, false), "@GOTPCREL");
    }

    #[test]
    fn intel_memory_operand_forms() {
        let strategy = ElfIntelStrategy::new();
        let insn = Instruction::new(0x1000, 4, "mov");
        let rendered = strategy.format_op_memory(
            &insn,
            &MemOperand {
                segment: None,
                base: Some("rax"),
                index: Some("rcx"),
                scale: 4,
                displacement: 16,
                size: 8,
            },
            None,
            None,
        );
        assert_eq!(rendered, "QWORD PTR [rax+rcx*4+16]");
    }

    #[test]
    fn branch_immediates_are_bare_symbols() {
        let strategy = ElfAttStrategy::new();
        let call = Instruction::new(0x1000, 5, "call").with_group(InsnGroup::Call);
        assert_eq!(
            strategy.format_op_immediate(&call, 0, Some("puts@PLT")),
            "puts@PLT"
        );
        let mov = Instruction::new(0x1000, 5, "mov");
        assert_eq!(
            strategy.format_op_immediate(&mov, 0, Some("message")),
            "$message"
        );
    }

    #[test]
    fn string_escaping() {
        let strategy = ElfAttStrategy::new();
        let lines = strategy.format_string(b"hi\n\0", true);
        assert_eq!(lines, vec![".string \"hi\\n\"".to_string()]);
    }
}
