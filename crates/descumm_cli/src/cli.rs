use std::path::PathBuf;

use clap::{ArgAction, Parser, builder::{Styles, styling::{AnsiColor, Effects}}, crate_description, crate_name, crate_version};
use clap_complete::Shell;

use descumm_lib::{DecompileOptions, ScriptVersion};

#[derive(Parser)]
#[command(name = crate_name!(),
    version = crate_version!(),
    about = crate_description!(),
    disable_help_flag = true,
    styles = Styles::styled()
        .header(AnsiColor::BrightGreen.on_default() | Effects::BOLD | Effects::UNDERLINE)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default()))]
pub struct Cli {
    /// Compiled script file (LSCR/SCRP/ENCD/EXDE/VERB container)
    pub path: Option<PathBuf>,

    /// Always show jump target offsets in block headers
    #[arg(short = 'o')]
    pub show_offsets: bool,

    /// Don't reconstruct `if` blocks
    #[arg(short = 'i')]
    pub no_if: bool,

    /// Don't reconstruct `else` blocks
    #[arg(short = 'e')]
    pub no_else: bool,

    /// Don't reconstruct `else if` blocks
    #[arg(short = 'f')]
    pub no_else_if: bool,

    /// Don't reconstruct `while` loops
    #[arg(short = 'w')]
    pub no_while: bool,

    /// Hide the opcode column
    #[arg(short = 'c')]
    pub hide_opcode: bool,

    /// Hide the offset column
    #[arg(short = 'x')]
    pub hide_offsets: bool,

    /// Halt on the first stack underflow instead of patching the output
    #[arg(short = 'h')]
    pub halt_on_error: bool,

    /// Assume v6 scripts (default)
    #[arg(short = '6', overrides_with_all = ["v6", "v7", "v8"])]
    pub v6: bool,

    /// Assume v7 scripts
    #[arg(short = '7', overrides_with_all = ["v6", "v7", "v8"])]
    pub v7: bool,

    /// Assume v8 scripts
    #[arg(short = '8', overrides_with_all = ["v6", "v7", "v8"])]
    pub v8: bool,

    /// Generate shell completion and exit
    #[arg(long, value_enum)]
    pub completions: Option<Shell>,

    /// Print help
    #[arg(long, action = ArgAction::HelpLong)]
    help: Option<bool>,
}

impl Cli {
    pub fn options(&self) -> DecompileOptions {
        let version = if self.v8 {
            ScriptVersion::V8
        } else if self.v7 {
            ScriptVersion::V7
        } else {
            ScriptVersion::V6
        };
        DecompileOptions {
            version,
            always_show_offsets: self.show_offsets,
            no_if: self.no_if,
            no_else: self.no_else,
            no_else_if: self.no_else_if,
            no_while: self.no_while,
            hide_opcode: self.hide_opcode,
            hide_offsets: self.hide_offsets,
            halt_on_error: self.halt_on_error,
        }
    }
}
