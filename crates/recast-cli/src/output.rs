use crate::{PrintOptions, SharedArg};
use anyhow::{anyhow, Result};
use recast_asm::{AsmPrinter, PrintingPolicy, Syntax, TargetSpec};
use recast_fixup::LinkMode;
use recast_ir::{BinaryFormat, Module};
use std::path::{Path, PathBuf};

pub struct PrintedModule {
    pub name: String,
    pub text: String,
}

pub fn default_syntax(format: BinaryFormat) -> Syntax {
    match format {
        BinaryFormat::Elf => Syntax::Att,
        BinaryFormat::Pe => Syntax::Masm,
    }
}

pub fn resolve_policy(module: &Module, options: &PrintOptions) -> Result<PrintingPolicy> {
    let mut policy = match &options.policy {
        Some(name) => PrintingPolicy::named(module.format, name)
            .ok_or_else(|| anyhow!("unknown policy '{}' for {} modules", name, module.format))?,
        None => PrintingPolicy::default_for(module),
    };
    policy
        .skip_functions
        .extend(options.skip_functions.iter().cloned());
    policy
        .keep_functions
        .extend(options.keep_functions.iter().cloned());
    policy
        .skip_symbols
        .extend(options.skip_symbols.iter().cloned());
    policy
        .keep_symbols
        .extend(options.keep_symbols.iter().cloned());
    policy
        .skip_sections
        .extend(options.skip_sections.iter().cloned());
    policy
        .keep_sections
        .extend(options.keep_sections.iter().cloned());
    Ok(policy)
}

pub fn link_mode(module: &Module, options: &PrintOptions) -> LinkMode {
    match options.shared {
        SharedArg::Yes => LinkMode::Shared,
        SharedArg::No => LinkMode::Executable,
        SharedArg::Auto => LinkMode::infer(module),
    }
}

/// Fix up and print every module, in file order.
pub fn print_modules(modules: Vec<Module>, options: &PrintOptions) -> Result<Vec<PrintedModule>> {
    let mut printed = Vec::with_capacity(modules.len());
    for module in modules {
        let syntax = options
            .syntax
            .map(Syntax::from)
            .unwrap_or_else(|| default_syntax(module.format));
        let target = TargetSpec::new(module.format, module.isa, syntax);
        let policy = resolve_policy(&module, options)?;
        let printer = AsmPrinter::new(target, policy)?;

        let name = module.name.clone();
        let mode = link_mode(&module, options);
        let prepared = recast_fixup::prepare(module, mode);
        let text = printer.print(&prepared)?;
        printed.push(PrintedModule { name, text });
    }
    Ok(printed)
}

/// Module N > 0 appends N to the requested path's stem.
pub fn numbered_asm_path(path: &Path, index: usize) -> PathBuf {
    if index == 0 {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    path.with_file_name(format!("{}{}{}", stem, index, extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_paths_suffix_the_stem() {
        let base = PathBuf::from("out/mod.s");
        assert_eq!(numbered_asm_path(&base, 0), PathBuf::from("out/mod.s"));
        assert_eq!(numbered_asm_path(&base, 1), PathBuf::from("out/mod1.s"));
        assert_eq!(numbered_asm_path(&base, 2), PathBuf::from("out/mod2.s"));
    }
}
