use crate::PrintOptions;
use anyhow::{Context, Result};
use recast_fixup::LinkMode;
use recast_ir::{BinaryTypeFlag, Ir};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use tracing::warn;

/// Arguments for the external compiler, assembled before any file is
/// written: user extras, libraries, search paths, and the PIE/shared flags
/// the binary-type table dictates.
pub struct LinkPlan {
    pub args: Vec<String>,
}

impl LinkPlan {
    pub fn build(
        ir: &Ir,
        options: &PrintOptions,
        compiler_args: Vec<String>,
        library_paths: Vec<String>,
    ) -> Result<Self> {
        let mut args = compiler_args;

        let mut all_search_paths = library_paths.clone();
        for module in &ir.modules {
            all_search_paths.extend(module.aux.library_paths.iter().cloned());
        }

        for module in &ir.modules {
            for library in &module.aux.libraries {
                // lib*.so* entries resolve through the compiler's own search;
                // anything else must be found on the search paths.
                if let Some(infix) = infix_library_name(library) {
                    args.push(format!("-l{}", infix));
                } else if let Some(path) = find_library(library, &all_search_paths) {
                    args.push(path.to_string_lossy().into_owned());
                } else {
                    warn!(library = %library, "could not find library");
                }
            }
        }

        for path in &library_paths {
            args.push(format!("-L{}", path));
        }
        for module in &ir.modules {
            for path in &module.aux.library_paths {
                args.push(format!("-L{}", path));
                args.push(format!("-Wl,-rpath,{}", path));
            }
        }

        let shared = ir
            .modules
            .first()
            .map(|m| crate::output::link_mode(m, options) == LinkMode::Shared)
            .unwrap_or(false);
        if shared {
            args.push("-shared".to_string());
        } else if let Some(module) = ir.modules.first() {
            // DYN means pie, EXEC means no-pie; pie wins when both appear.
            let dyn_flag = module.aux.binary_type.contains(&BinaryTypeFlag::Dyn)
                || module.aux.binary_type.contains(&BinaryTypeFlag::Pie);
            let exec_flag = module.aux.binary_type.contains(&BinaryTypeFlag::Exec);
            if dyn_flag {
                args.push("-pie".to_string());
            } else if exec_flag {
                args.push("-no-pie".to_string());
            }
        }

        for module in &ir.modules {
            let policy = crate::output::resolve_policy(module, options)?;
            for arg in policy.extra_link_args {
                if !args.contains(&arg) {
                    args.push(arg);
                }
            }
        }

        Ok(Self { args })
    }
}

/// `libfoo.so` or `libfoo.so.6` links as `-lfoo`.
fn infix_library_name(library: &str) -> Option<&str> {
    let rest = library.strip_prefix("lib")?;
    let dot = rest.find(".so")?;
    let tail = &rest[dot + 3..];
    if tail.is_empty() || tail.starts_with('.') {
        Some(&rest[..dot])
    } else {
        None
    }
}

fn find_library(library: &str, paths: &[String]) -> Option<PathBuf> {
    paths.iter().find_map(|path| {
        let candidate = Path::new(path).join(library);
        candidate.is_file().then_some(candidate)
    })
}

pub fn run_compiler(
    compiler: &str,
    output: &Path,
    asm_paths: &[PathBuf],
    plan: &LinkPlan,
    verbose: bool,
) -> Result<ExitStatus> {
    let mut command = Command::new(compiler);
    command.arg("-o").arg(output);
    command.args(asm_paths);
    command.args(&plan.args);

    if verbose {
        println!("compiler arguments: {:?}", command);
    }

    command
        .status()
        .with_context(|| format!("could not run {}", compiler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infix_names_cover_versioned_sonames() {
        assert_eq!(infix_library_name("libc.so.6"), Some("c"));
        assert_eq!(infix_library_name("libm.so"), Some("m"));
        assert_eq!(infix_library_name("libfoo.sox"), None);
        assert_eq!(infix_library_name("crt0.o"), None);
    }
}
