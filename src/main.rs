//! Xray CLI: run a script file, or `-e` to evaluate a string directly.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::env;
use std::fs;
use std::process;

const VERSION: &str = env!("CARGO_PKG_VERSION");

enum Command {
    Run { file: String },
    Eval { code: String },
}

struct Options {
    command: Command,
    trace: bool,
    dump: bool,
}

fn print_usage() {
    eprintln!("xray {VERSION}");
    eprintln!();
    eprintln!("Usage: xray [options] <script>");
    eprintln!("       xray [options] -e <code>");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -e <code>     Evaluate code directly instead of a file");
    eprintln!("  --trace       Print each instruction as it executes");
    eprintln!("  --dump        Print a disassembly instead of running");
    eprintln!("  --help, -h    Show this help message");
}

fn parse_args() -> Options {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut command: Option<Command> = None;
    let mut trace = false;
    let mut dump = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            "--trace" => trace = true,
            "--dump" => dump = true,
            "-e" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("-e requires a code argument");
                    print_usage();
                    process::exit(64);
                }
                command = Some(Command::Eval { code: args[i].clone() });
            }
            arg if arg.starts_with('-') => {
                eprintln!("Unknown option: {arg}");
                print_usage();
                process::exit(64);
            }
            arg => {
                if command.is_some() {
                    eprintln!("Only one script file can be specified");
                    print_usage();
                    process::exit(64);
                }
                command = Some(Command::Run { file: arg.to_string() });
            }
        }
        i += 1;
    }

    let Some(command) = command else {
        print_usage();
        process::exit(64);
    };
    Options { command, trace, dump }
}

fn main() {
    let options = parse_args();

    let source = match &options.command {
        Command::Run { file } => fs::read_to_string(file).unwrap_or_else(|e| {
            eprintln!("[line 0] cannot read '{file}': {e}");
            process::exit(66);
        }),
        Command::Eval { code } => code.clone(),
    };

    if options.dump {
        match xray::compile_source(&source) {
            Ok(proto) => print!("{}", xray::vm::disassemble(&proto)),
            Err(e) => {
                eprintln!("[line {}] {}", error_line(&e), e);
                process::exit(65);
            }
        }
        return;
    }

    if let Err(e) = xray::run_with_trace(&source, options.trace) {
        eprintln!("[line {}] {}", error_line(&e), e);
        process::exit(if matches!(e, xray::error::XrayError::Runtime(_)) { 70 } else { 65 });
    }
}

fn error_line(err: &xray::error::XrayError) -> u32 {
    use xray::error::XrayError;
    match err {
        XrayError::Lex(e) => e.span().line,
        XrayError::Parse(e) => e.span().line,
        XrayError::Compile(e) => e.span().line,
        XrayError::Runtime(tb) => tb.frames.first().map(|f| f.line).unwrap_or(0),
        XrayError::Io(_) => 0,
    }
}
