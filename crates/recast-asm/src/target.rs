use crate::elf::{ElfAttStrategy, ElfIntelStrategy};
use crate::masm::MasmStrategy;
use crate::strategy::FormatStrategy;
use crate::{PrintError, Result};
use once_cell::sync::Lazy;
use recast_ir::{BinaryFormat, Isa};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Syntax {
    Att,
    Intel,
    Masm,
}

impl std::fmt::Display for Syntax {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Syntax::Att => write!(f, "att"),
            Syntax::Intel => write!(f, "intel"),
            Syntax::Masm => write!(f, "masm"),
        }
    }
}

impl std::str::FromStr for Syntax {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "att" => Ok(Syntax::Att),
            "intel" => Ok(Syntax::Intel),
            "masm" => Ok(Syntax::Masm),
            other => Err(format!("unknown syntax: {}", other)),
        }
    }
}

/// The (format, isa, syntax) triple a print call is parameterized by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetSpec {
    pub format: BinaryFormat,
    pub isa: Isa,
    pub syntax: Syntax,
}

impl TargetSpec {
    pub fn new(format: BinaryFormat, isa: Isa, syntax: Syntax) -> Self {
        Self {
            format,
            isa,
            syntax,
        }
    }
}

impl std::fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.format, self.isa, self.syntax)
    }
}

type StrategyCtor = fn() -> Box<dyn FormatStrategy>;

/// The process-wide target table. Registration happens exactly once, on
/// first access, and the table never changes afterwards.
static REGISTRY: Lazy<Vec<(TargetSpec, StrategyCtor)>> = Lazy::new(|| {
    fn att() -> Box<dyn FormatStrategy> {
        Box::new(ElfAttStrategy::new())
    }
    fn intel() -> Box<dyn FormatStrategy> {
        Box::new(ElfIntelStrategy::new())
    }
    fn masm() -> Box<dyn FormatStrategy> {
        Box::new(MasmStrategy::new())
    }
    vec![
        (TargetSpec::new(BinaryFormat::Elf, Isa::X64, Syntax::Att), att as StrategyCtor),
        (
            TargetSpec::new(BinaryFormat::Elf, Isa::X64, Syntax::Intel),
            intel as StrategyCtor,
        ),
        (TargetSpec::new(BinaryFormat::Pe, Isa::X64, Syntax::Masm), masm as StrategyCtor),
    ]
});

/// Look up the formatting strategy for a target. An unregistered triple is a
/// configuration error, raised before any output is produced.
pub fn strategy_for(target: TargetSpec) -> Result<Box<dyn FormatStrategy>> {
    REGISTRY
        .iter()
        .find(|(spec, _)| *spec == target)
        .map(|(_, ctor)| ctor())
        .ok_or(PrintError::UnsupportedTarget(target))
}

pub fn supported_targets() -> Vec<TargetSpec> {
    REGISTRY.iter().map(|(spec, _)| *spec).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_targets_resolve() {
        for target in supported_targets() {
            assert!(strategy_for(target).is_ok(), "no strategy for {}", target);
        }
    }

    #[test]
    fn unregistered_target_is_a_configuration_error() {
        let target = TargetSpec::new(BinaryFormat::Pe, Isa::X64, Syntax::Att);
        assert!(matches!(
            strategy_for(target),
            Err(PrintError::UnsupportedTarget(_))
        ));
    }

    #[test]
    fn syntax_parses_from_cli_spelling() {
        assert_eq!("att".parse::<Syntax>(), Ok(Syntax::Att));
        assert_eq!("masm".parse::<Syntax>(), Ok(Syntax::Masm));
        assert!("gas".parse::<Syntax>().is_err());
    }
}
