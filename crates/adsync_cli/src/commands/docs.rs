//! Shell completions and man pages generated from the clap definition.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_complete::Shell;

use crate::Cli;

const BIN_NAME: &str = "adsync";

fn completion_script(shell: Shell) -> Vec<u8> {
    let mut cmd = Cli::command();
    let mut out = Vec::new();
    clap_complete::generate(shell, &mut cmd, BIN_NAME, &mut out);
    out
}

/// Print the completion script, or install it into `dir` under the file
/// name the shell expects (`adsync.bash`, `_adsync`, `adsync.fish`, ...).
pub(crate) fn handle_completions(
    shell: Shell,
    dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    match dir {
        Some(dir) => {
            let path = write_completions(shell, &dir)?;
            println!("Wrote {} completions to {}", shell, path.display());
        }
        None => std::io::stdout().write_all(&completion_script(shell))?,
    }
    Ok(())
}

fn write_completions(shell: Shell, dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let mut cmd = Cli::command();
    clap_complete::generate_to(shell, &mut cmd, BIN_NAME, dir)
}

/// Print the top-level page, or write one page per command into `dir`
/// (`adsync.1`, `adsync-sync.1`, `adsync-connection-add.1`, ...).
pub(crate) fn handle_man(dir: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    match dir {
        Some(dir) => {
            let pages = write_man_pages(&dir)?;
            println!("Wrote {} man page(s) to {}", pages.len(), dir.display());
        }
        None => {
            let mut out = Vec::new();
            clap_mangen::Man::new(Cli::command()).render(&mut out)?;
            std::io::stdout().write_all(&out)?;
        }
    }
    Ok(())
}

fn write_man_pages(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    clap_mangen::generate_to(Cli::command(), dir)?;

    let mut pages: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "1"))
        .collect();
    pages.sort();
    Ok(pages)
}
