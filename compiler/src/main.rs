use clap::Parser as ClapParser;
use std::{fs, path::PathBuf, process, sync::Arc};

use compiler::{CompiledTemplate, Compiler, CompilerSettings};
use env_logger::Env;
use parser::ErrorBuffer;

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Template files to compile
    #[arg(required = true, help = "The .st files to compile")]
    files: Vec<PathBuf>,

    /// Print the token stream before compiling
    #[arg(long, help = "Dump tokens for inputs")]
    tokens: bool,

    /// Print the single-line assembly instead of the full listing
    #[arg(long, help = "Print compact assembly")]
    asm: bool,

    /// Start and stop delimiter, e.g. `$$`
    #[arg(long, value_name = "SS", value_parser = parse_delimiters)]
    delimiters: Option<(char, char)>,

    /// Log more; repeat for trace output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_delimiters(s: &str) -> Result<(char, char), String> {
    let mut chars = s.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some(start), Some(stop), None) => Ok((start, stop)),
        _ => Err(format!("expected two delimiter characters, got '{s}'")),
    }
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    let mut settings = CompilerSettings::default();
    if let Some((start, stop)) = cli.delimiters {
        settings.delimiter_start = start;
        settings.delimiter_stop = stop;
    }
    let errors = Arc::new(ErrorBuffer::new());
    let compiler = Compiler::with_listener(settings, errors.clone());

    let mut failed = false;
    for path in &cli.files {
        let text = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                eprintln!("Error reading file '{}': {}", path.display(), err);
                process::exit(1);
            }
        };
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| compiler::DEFAULT_TEMPLATE_NAME.to_owned());

        if cli.tokens {
            println!("== {} tokens ==", path.display());
            for token in compiler.tokenize(&text) {
                println!("{token}");
            }
        } else {
            match compiler.compile_named(&name, &text) {
                Ok(template) => {
                    dump(&template, cli.asm);
                    for sub in template.implicitly_defined_templates.iter() {
                        dump(sub, cli.asm);
                    }
                }
                Err(err) => {
                    eprintln!("Error compiling {}: {}", path.display(), err);
                    failed = true;
                }
            }
        }

        for message in errors.messages() {
            eprintln!("{message}");
            failed = true;
        }
        errors.clear();
    }

    if failed {
        process::exit(1);
    }
}

fn dump(template: &CompiledTemplate, compact: bool) {
    println!("== {} ==", template.name);
    if compact {
        println!("{}", template.instrs());
    } else {
        print!("{}", template.disasm());
    }
}
