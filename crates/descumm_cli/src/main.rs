use std::io::{self, Write};

use clap::{CommandFactory, Parser};

use crate::cli::Cli;

mod cli;

fn main() {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        let bin_name = cmd.get_name().to_string();
        clap_complete::generate(shell, &mut cmd, bin_name, &mut io::stdout());
        return;
    }

    let Some(path) = cli.path.as_ref() else {
        let _ = Cli::command().print_help();
        return;
    };

    let data = match std::fs::read(path) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("failed to read {path:?}: {e}");
            std::process::exit(1);
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = descumm_lib::decompile_to(&data, cli.options(), &mut out) {
        let _ = out.flush();
        println!("{e}");
        std::process::exit(1);
    }
}
