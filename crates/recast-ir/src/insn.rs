use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum InsnGroup {
    Call,
    Jump,
    Ret,
}

/// One operand of a decoded instruction. A `symbolic` field holds the byte
/// offset, within the owning byte interval, of the symbolic expression that
/// must be rendered in place of the literal value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Register(String),
    Immediate {
        value: i64,
        #[serde(default)]
        symbolic: Option<u64>,
    },
    Memory {
        #[serde(default)]
        segment: Option<String>,
        #[serde(default)]
        base: Option<String>,
        #[serde(default)]
        index: Option<String>,
        #[serde(default = "one")]
        scale: u8,
        #[serde(default)]
        displacement: i64,
        /// Access width in bytes, as reported by the decoder.
        size: u16,
        #[serde(default)]
        symbolic: Option<u64>,
    },
}

fn one() -> u8 {
    1
}

impl Operand {
    pub fn reg(name: impl Into<String>) -> Self {
        Operand::Register(name.into())
    }

    pub fn imm(value: i64) -> Self {
        Operand::Immediate {
            value,
            symbolic: None,
        }
    }

    pub fn symbolic(&self) -> Option<u64> {
        match self {
            Operand::Register(_) => None,
            Operand::Immediate { symbolic, .. } => *symbolic,
            Operand::Memory { symbolic, .. } => *symbolic,
        }
    }
}

/// A decoded instruction as supplied by the upstream decoder collaborator.
/// Mnemonics are the decoder's canonical (Intel-style) spellings; dialects
/// adjust them through their fixup hooks before printing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub address: u64,
    pub size: u64,
    pub mnemonic: String,
    #[serde(default)]
    pub operands: Vec<Operand>,
    #[serde(default)]
    pub groups: BTreeSet<InsnGroup>,
}

impl Instruction {
    pub fn new(address: u64, size: u64, mnemonic: impl Into<String>) -> Self {
        Self {
            address,
            size,
            mnemonic: mnemonic.into(),
            operands: Vec::new(),
            groups: BTreeSet::new(),
        }
    }

    pub fn with_operands(mut self, operands: Vec<Operand>) -> Self {
        self.operands = operands;
        self
    }

    pub fn with_group(mut self, group: InsnGroup) -> Self {
        self.groups.insert(group);
        self
    }

    pub fn is_call(&self) -> bool {
        self.groups.contains(&InsnGroup::Call)
    }

    pub fn is_jump(&self) -> bool {
        self.groups.contains(&InsnGroup::Jump)
    }

    /// Calls and jumps take symbol operands directly; everything else renders
    /// them through the dialect's data forms.
    pub fn is_branch(&self) -> bool {
        self.is_call() || self.is_jump()
    }
}
