use std::io::{self, BufRead, Write};
use std::process;

use tcl::cli;
use tcl::error::TclError;
use tcl::parse::is_complete_line;
use tcl::{Interp, Value};

fn main() {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("tclsh: {e}");
            eprintln!("Usage: tclsh [-d] [<script> [<arg> ...]]");
            process::exit(1);
        }
    };

    let mut tcl = Interp::new();
    tcl.set_debug(args.debug);
    tcl.set_variable_value("version", Value::from(env!("CARGO_PKG_VERSION")));

    // ── Script mode ───────────────────────────────────────────────────────────
    if let Some(script) = args.script {
        tcl.set_program_args(&script, &args.script_args);
        match tcl.parse_file(&script) {
            // Failures inside the script were already reported on the
            // error sink.
            Ok(true) => {}
            Ok(false) => process::exit(1),
            Err(TclError::Exit(code)) => process::exit(code),
            Err(err) => {
                eprintln!("{}", err.message());
                process::exit(1);
            }
        }
        return;
    }

    // ── Interactive shell ─────────────────────────────────────────────────────
    tcl.set_program_args("tclsh", &[]);

    let is_tty = unsafe {
        libc::isatty(libc::STDIN_FILENO) != 0 && libc::isatty(libc::STDOUT_FILENO) != 0
    };
    if is_tty {
        println!("tclsh (tcl) version {}", env!("CARGO_PKG_VERSION"));
    }

    // ── User startup file ─────────────────────────────────────────────────────
    if let Some(dirs) = directories::UserDirs::new() {
        let rc = dirs.home_dir().join(".tclshrc");
        if rc.exists() {
            match tcl.parse_file(&rc.display().to_string()) {
                Ok(_) => {}
                Err(TclError::Exit(code)) => process::exit(code),
                Err(err) => eprintln!("tclsh: warning: {}", err.message()),
            }
        }
    }

    // ── Read-eval-print loop ──────────────────────────────────────────────────
    let stdin = io::stdin();
    let mut pending = String::new();
    loop {
        if is_tty {
            if pending.is_empty() {
                print!("% ");
            }
            io::stdout().flush().ok();
        }
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                eprintln!("tclsh: {err}");
                break;
            }
        }
        let line = line.trim_end_matches(['\n', '\r']);
        if pending.is_empty() && line.trim().is_empty() {
            continue;
        }
        if !pending.is_empty() {
            pending.push('\n');
        }
        pending.push_str(line);
        // Keep reading until braces, brackets, and quotes balance.
        if !is_complete_line(&pending) {
            continue;
        }
        let chunk = std::mem::take(&mut pending);
        match tcl.parse_line(&chunk) {
            Ok(Some(value)) => println!("{value}"),
            Ok(None) => {}
            Err(TclError::Exit(code)) => process::exit(code),
            Err(err) => eprintln!("{}", err.message()),
        }
    }
}
