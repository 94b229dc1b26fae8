use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

mod link;
mod output;

#[derive(Parser)]
#[command(name = "recast")]
#[command(about = "recast - print binary IR as assembly and relink it with an external toolchain")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the modules of an IR file as assembly text.
    Print {
        /// IR file (JSON) to print.
        ir: PathBuf,

        /// Write assembly to this path; later modules get a numeric stem
        /// suffix. Without it, assembly goes to stdout.
        #[arg(short, long)]
        asm: Option<PathBuf>,

        /// Routing rules mapping module names to output paths, e.g.
        /// "{stem:*}.{ext:so*}={stem}.rewritten.{ext}.s,{n}.s".
        #[arg(short, long)]
        modules: Option<String>,

        #[command(flatten)]
        options: PrintOptions,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the modules to temporary files and link them into a binary
    /// with an external compiler.
    Link {
        /// IR file (JSON) to link.
        ir: PathBuf,

        /// Output binary path.
        #[arg(short, long)]
        output: PathBuf,

        /// Compiler executable used for assembling and linking.
        #[arg(long, default_value = "gcc")]
        use_compiler: String,

        /// Additional arguments passed through to the compiler.
        #[arg(short = 'c', long = "compiler-args", num_args = 1.., allow_hyphen_values = true)]
        compiler_args: Vec<String>,

        /// Library search paths passed to the linker.
        #[arg(short = 'L', long = "library-paths", num_args = 1..)]
        library_paths: Vec<String>,

        #[command(flatten)]
        options: PrintOptions,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Load an IR file and check id integrity and block layout.
    Validate {
        ir: PathBuf,

        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Args, Clone)]
struct PrintOptions {
    /// Assembly syntax; defaults to att for ELF modules and masm for PE.
    #[arg(short, long)]
    syntax: Option<SyntaxArg>,

    /// Named skip policy: dynamic, static, or complete.
    #[arg(short, long)]
    policy: Option<String>,

    /// Print these functions even if the policy skips them.
    #[arg(long = "keep-function")]
    keep_functions: Vec<String>,

    /// Do not print these functions.
    #[arg(long = "skip-function")]
    skip_functions: Vec<String>,

    /// Print these symbols even if the policy skips them.
    #[arg(long = "keep-symbol")]
    keep_symbols: Vec<String>,

    /// Do not print these symbols.
    #[arg(long = "skip-symbol")]
    skip_symbols: Vec<String>,

    /// Print these sections even if the policy skips them.
    #[arg(long = "keep-section")]
    keep_sections: Vec<String>,

    /// Do not print these sections.
    #[arg(long = "skip-section")]
    skip_sections: Vec<String>,

    /// Shared-object mode: yes, no, or auto (from the module's own flags).
    #[arg(short = 'S', long, default_value = "auto")]
    shared: SharedArg,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SyntaxArg {
    Att,
    Intel,
    Masm,
}

impl From<SyntaxArg> for recast_asm::Syntax {
    fn from(syntax: SyntaxArg) -> Self {
        match syntax {
            SyntaxArg::Att => recast_asm::Syntax::Att,
            SyntaxArg::Intel => recast_asm::Syntax::Intel,
            SyntaxArg::Masm => recast_asm::Syntax::Masm,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SharedArg {
    Yes,
    No,
    Auto,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Print {
            ir,
            asm,
            modules,
            options,
            verbose,
        } => cmd_print(ir, asm, modules, options, verbose),
        Commands::Link {
            ir,
            output,
            use_compiler,
            compiler_args,
            library_paths,
            options,
            verbose,
        } => cmd_link(
            ir,
            output,
            use_compiler,
            compiler_args,
            library_paths,
            options,
            verbose,
        ),
        Commands::Validate { ir, verbose } => cmd_validate(ir, verbose),
    }
}

fn load_ir(path: &Path) -> Result<recast_ir::Ir> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("could not read IR file {}", path.display()))?;
    recast_ir::Ir::from_json_str(&text)
        .with_context(|| format!("could not load IR from {}", path.display()))
}

fn cmd_print(
    ir_path: PathBuf,
    asm: Option<PathBuf>,
    modules: Option<String>,
    options: PrintOptions,
    verbose: bool,
) -> Result<()> {
    use colored::*;

    let ir = load_ir(&ir_path)?;
    if ir.modules.is_empty() {
        println!("{}", "no modules in IR file".yellow());
        return Ok(());
    }

    let rules = match &modules {
        Some(spec) => Some(
            recast_paths::PathTemplateRules::parse(spec)
                .map_err(|e| anyhow::anyhow!("invalid --modules rules: {}", e))?,
        ),
        None => None,
    };

    for (index, printed) in output::print_modules(ir.modules, &options)?.into_iter().enumerate() {
        let output::PrintedModule { name, text } = printed;
        let destination = match (&rules, &asm) {
            (Some(rules), _) => rules.resolve(&name).or_else(|| {
                asm.as_ref()
                    .map(|path| output::numbered_asm_path(path, index))
            }),
            (None, Some(path)) => Some(output::numbered_asm_path(path, index)),
            (None, None) => None,
        };

        match destination {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                std::fs::write(&path, &text)
                    .with_context(|| format!("could not write {}", path.display()))?;
                if verbose {
                    println!(" {} {} -> {}", "wrote".bright_green(), name, path.display());
                }
            }
            None => print!("{}", text),
        }
    }

    Ok(())
}

fn cmd_link(
    ir_path: PathBuf,
    output: PathBuf,
    use_compiler: String,
    compiler_args: Vec<String>,
    library_paths: Vec<String>,
    options: PrintOptions,
    verbose: bool,
) -> Result<()> {
    use colored::*;

    let ir = load_ir(&ir_path)?;
    if ir.modules.is_empty() {
        bail!("no modules in IR file");
    }
    if ir
        .modules
        .iter()
        .any(|m| m.format != recast_ir::BinaryFormat::Elf)
    {
        bail!("binary linking is only supported for ELF modules");
    }

    let plan = link::LinkPlan::build(&ir, &options, compiler_args, library_paths)?;
    let printed = output::print_modules(ir.modules, &options)?;

    let scratch = tempfile::tempdir().context("could not create scratch directory")?;
    let mut asm_paths = Vec::new();
    for (index, module) in printed.iter().enumerate() {
        let path = scratch.path().join(format!("module{}.s", index));
        std::fs::write(&path, &module.text)?;
        asm_paths.push(path);
    }

    let status = link::run_compiler(&use_compiler, &output, &asm_paths, &plan, verbose)?;
    if !status.success() {
        bail!("{} exited with {}", use_compiler, status);
    }
    if verbose {
        println!(
            " {} linked {}",
            "SUCCESS:".bright_green().bold(),
            output.display()
        );
    }
    Ok(())
}

fn cmd_validate(ir_path: PathBuf, verbose: bool) -> Result<()> {
    use colored::*;

    let ir = load_ir(&ir_path)?;
    println!("{}", "VALID".bright_green().bold());
    if verbose {
        for module in &ir.modules {
            println!(
                " {}: {} sections, {} symbols, {} code blocks, {} data blocks",
                module.name,
                module.sections.len(),
                module.symbols.len(),
                module.code_blocks.len(),
                module.data_blocks.len()
            );
        }
    }
    Ok(())
}
