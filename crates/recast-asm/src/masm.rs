use crate::strategy::{FormatStrategy, MemOperand};
use recast_ir::{ElfSymbolInfo, Instruction, Module, Operand, Section};
use std::collections::BTreeSet;

/// Sections whose MASM name is a reserved model directive; their footer is a
/// comment instead of an `ENDS`.
const MODEL_SECTIONS: &[&str] = &["_TEXT", "_DATA", "_BSS"];

const REGISTER_NAMES: &[&str] = &[
    "rax", "rbx", "rcx", "rdx", "rsi", "rdi", "rbp", "rsp", "eax", "ebx", "ecx", "edx", "esi",
    "edi", "ebp", "esp", "ax", "bx", "cx", "dx", "si", "di", "bp", "sp", "al", "bl", "cl", "dl",
    "ah", "bh", "ch", "dh", "r8", "r9", "r10", "r11", "r12", "r13", "r14", "r15",
];

fn masm_size_name(size: u16) -> Option<&'static str> {
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

/// MASM on PE.
#[derive(Debug, Clone, Copy, Default)]
pub struct MasmStrategy;

impl MasmStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl FormatStrategy for MasmStrategy {
    fn comment(&self) -> &'static str {
        ";"
    }

    fn format_byte(&self, byte: u8) -> String {
        // Byte constants must start with a digit for the MASM assembler.
        format!("BYTE 0{:02x}H", byte)
    }

    fn zero_fill(&self, len: u64) -> String {
        format!("BYTE {} DUP(0)", len)
    }

    fn data_directive(&self, size: u64) -> Option<&'static str> {
        match size {
            1 => Some("BYTE"),
            2 => Some("WORD"),
            4 => Some("DWORD"),
            8 => Some("QWORD"),
            _ => None,
        }
    }

    fn align_directive(&self, alignment: u64) -> String {
        format!("ALIGN {}", alignment)
    }

    fn format_string(&self, bytes: &[u8], null_terminated: bool) -> Vec<String> {
        // MASM strings cap at 255 bytes and 50 comma-separated items per
        // statement; chunk printable runs and fall back to bytes elsewhere.
        let mut lines = Vec::new();
        let mut chunk = String::new();
        for byte in bytes {
            if *byte == 0 && null_terminated {
                continue;
            }
            if chunk.len() >= 64 {
                lines.push(format!("BYTE '{}'", chunk.replace('\'', "''")));
                chunk.clear();
            }
            if byte.is_ascii_graphic() || *byte == b' ' {
                chunk.push(*byte as char);
                continue;
            }
            if !chunk.is_empty() {
                lines.push(format!("BYTE '{}'", chunk.replace('\'', "''")));
                chunk.clear();
            }
            lines.push(self.format_byte(*byte));
        }
        if !chunk.is_empty() {
            lines.push(format!("BYTE '{}'", chunk.replace('\'', "''")));
        }
        if null_terminated {
            lines.push(self.format_byte(0));
        }
        lines
    }

    fn header(&self, module: &Module) -> String {
        let mut out = String::new();
        for library in &module.aux.libraries {
            let lib = if library.to_lowercase().ends_with(".dll") {
                format!("{}.lib", &library[..library.len() - 4])
            } else {
                library.clone()
            };
            out.push_str(&format!("INCLUDELIB {}\n", lib));
        }
        out.push('\n');

        let mut externs = BTreeSet::new();
        for target in module.aux.symbol_forwarding.values() {
            if let Some(symbol) = module.symbol(*target) {
                externs.insert(self.format_symbol_name(&symbol.name));
            }
        }
        for name in externs {
            out.push_str(&format!("EXTERN {}:PROC\n", name));
        }
        out.push_str("\nEXTERN __ImageBase:BYTE\n\n");
        out
    }

    fn footer(&self) -> Option<String> {
        Some("\nEND".to_string())
    }

    fn section_header(&self, section: &Section) -> String {
        let name = self.format_section_name(&section.name);
        let mut out = format!("{} SEGMENT", name);
        if section.flags.readable {
            out.push_str(" READ");
        }
        if section.flags.writable {
            out.push_str(" WRITE");
        }
        if section.flags.executable {
            out.push_str(" EXECUTE 'CODE'");
        } else {
            out.push_str(" 'DATA'");
        }
        out
    }

    fn section_footer(&self, section: &Section) -> Option<String> {
        let name = self.format_section_name(&section.name);
        if MODEL_SECTIONS.contains(&name.as_str()) {
            Some(format!("{} {} ENDS", self.comment(), name))
        } else {
            Some(format!("{} ENDS", name))
        }
    }

    fn format_section_name(&self, name: &str) -> String {
        let renamed = match name.strip_prefix('.') {
            Some(rest) => format!("_{}", rest),
            None => name.to_string(),
        };
        renamed.to_uppercase()
    }

    fn format_symbol_name(&self, name: &str) -> String {
        let mut renamed = match name.strip_prefix('.') {
            Some(rest) => format!("${}", rest),
            None => name.to_string(),
        };
        if REGISTER_NAMES.contains(&renamed.to_lowercase().as_str()) {
            renamed.push('$');
        }
        renamed
    }

    fn symbol_header(
        &self,
        name: &str,
        _info: Option<&ElfSymbolInfo>,
        exported: bool,
        is_code: bool,
    ) -> String {
        if !exported {
            return String::new();
        }
        if is_code {
            format!("{} PROC EXPORT\n{} ENDP\n", name, name)
        } else {
            format!("PUBLIC {}\n", name)
        }
    }

    fn data_label(&self, name: &str) -> String {
        format!("{} LABEL BYTE", name)
    }

    fn set_directive(&self, name: &str, value: &str) -> String {
        format!("{} = {}", name, value)
    }

    fn fixup_instruction(&self, insn: &mut Instruction) {
        // GAS-specific MOVABS has no MASM spelling.
        if insn.mnemonic == "movabs" {
            insn.mnemonic = "mov".to_string();
        }

        // PBLENDVB/BLENDVPS have an implicit third operand (XMM0) that MASM
        // requires spelled out.
        if matches!(insn.mnemonic.as_str(), "pblendvb" | "blendvps")
            && insn.operands.len() == 2
        {
            insn.operands.push(Operand::reg("xmm0"));
        }

        // The decoder reports XMMWORD-sized memory operands for scalar
        // compares; correct the access width.
        let forced_size = match insn.mnemonic.as_str() {
            "comisd" | "vcomisd" => Some(8),
            "comiss" => Some(4),
            _ => None,
        };
        if let Some(forced) = forced_size {
            for op in &mut insn.operands {
                if let Operand::Memory { size, .. } = op {
                    *size = forced;
                }
            }
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
        match symbolic {
            Some(text) if insn.is_branch() => text.to_string(),
            Some(text) => format!("OFFSET {}", text),
            None if insn.is_branch() => format!("{:#x}", value),
            None => value.to_string(),
        }
    }

    fn format_op_memory(
        &self,
        _insn: &Instruction,
        mem: &MemOperand,
        symbolic: Option<&str>,
        collapse: Option<&str>,
    ) -> String {
        // Indirect references to forwarded externals print as direct calls:
        //   call QWORD PTR [puts]  ->  call puts
        if let Some(direct) = collapse {
            return direct.to_string();
        }

        let mut out = String::new();
        if let Some(size_name) = masm_size_name(mem.size) {
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
            // RIP-relative addressing is implicit in MASM.
            if base != "rip" {
                out.push_str(base);
                first = false;
            }
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

    fn imagerel(&self, name: &str) -> Option<String> {
        Some(format!("IMAGEREL {}", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recast_ir::SectionFlags;

    #[test]
    fn section_names_are_uppercased_with_leading_underscore() {
        let strategy = MasmStrategy::new();
        assert_eq!(strategy.format_section_name(".text"), "_TEXT");
        assert_eq!(strategy.format_section_name(".rdata"), "_RDATA");
    }

    #[test]
    fn symbol_names_avoid_registers_and_dots() {
        let strategy = MasmStrategy::new();
        assert_eq!(strategy.format_symbol_name(".L_1234"), "$L_1234");
        assert_eq!(strategy.format_symbol_name("rax"), "rax$");
        assert_eq!(strategy.format_symbol_name("main"), "main");
    }

    #[test]
    fn movabs_becomes_mov() {
        let strategy = MasmStrategy::new();
        let mut insn = Instruction::new(0x1000, 10, "movabs")
            .with_operands(vec![Operand::reg("rax"), Operand::imm(42)]);
        strategy.fixup_instruction(&mut insn);
        assert_eq!(insn.mnemonic, "mov");
    }

    #[test]
    fn blend_instructions_gain_implicit_xmm0() {
        let strategy = MasmStrategy::new();
        let mut insn = Instruction::new(0x1000, 5, "pblendvb")
            .with_operands(vec![Operand::reg("xmm1"), Operand::reg("xmm2")]);
        strategy.fixup_instruction(&mut insn);
        assert_eq!(insn.operands.len(), 3);
        assert_eq!(insn.operands[2], Operand::reg("xmm0"));
    }

    #[test]
    fn comisd_memory_size_is_corrected() {
        let strategy = MasmStrategy::new();
        let mut insn = Instruction::new(0x1000, 5, "comisd").with_operands(vec![
            Operand::reg("xmm0"),
            Operand::Memory {
                segment: None,
                base: Some("rax".to_string()),
                index: None,
                scale: 1,
                displacement: 0,
                size: 16,
                symbolic: None,
            },
        ]);
        strategy.fixup_instruction(&mut insn);
        match &insn.operands[1] {
            Operand::Memory { size, .. } => assert_eq!(*size, 8),
            other => panic!("unexpected operand {:?}", other),
        }
    }

    #[test]
    fn rip_relative_memory_hides_the_base() {
        let strategy = MasmStrategy::new();
        let insn = Instruction::new(0x1000, 7, "mov");
        let rendered = strategy.format_op_memory(
            &insn,
            &MemOperand {
                segment: None,
                base: Some("rip"),
                index: None,
                scale: 1,
                displacement: 0,
                size: 8,
            },
            Some("message"),
            None,
        );
        assert_eq!(rendered, "QWORD PTR [message]");
    }

    #[test]
    fn forwarded_indirect_collapses_to_direct() {
        let strategy = MasmStrategy::new();
        let insn = Instruction::new(0x1000, 6, "call");
        let rendered = strategy.format_op_memory(
            &insn,
            &MemOperand {
                segment: None,
                base: Some("rip"),
                index: None,
                scale: 1,
                displacement: 0,
                size: 8,
            },
            Some("puts_iat"),
            Some("puts"),
        );
        assert_eq!(rendered, "puts");
    }

    #[test]
    fn imagerel_renders_the_subtraction() {
        let strategy = MasmStrategy::new();
        assert_eq!(
            strategy.imagerel("handler").as_deref(),
            Some("IMAGEREL handler")
        );
    }
}
