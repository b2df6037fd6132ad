//! Command-line argument parsing.
//!
//! Usage:
//!   tclsh [-d] [<script> [<arg> ...]]

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Execution trace (`-d` / `-debug`).
    pub debug: bool,
    /// Script to run; interactive shell when absent.
    pub script: Option<String>,
    /// Arguments handed to the script as `argv`.
    pub script_args: Vec<String>,
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(&raw[1..])
}

/// Parse a slice of argument strings (exposed for testing).
///
/// Flags stop at the first non-flag argument (or `--`); everything
/// after the script name belongs to the script.
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();
        if arg == "--" {
            i += 1;
            break;
        }
        if !arg.starts_with('-') || arg == "-" {
            break;
        }
        match arg {
            "-d" | "-debug" => args.debug = true,
            _ => return Err(format!("unknown option: {arg}")),
        }
        i += 1;
    }

    if i < argv.len() {
        args.script = Some(argv[i].clone());
        args.script_args = argv[i + 1..].to_vec();
    }

    Ok(args)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
