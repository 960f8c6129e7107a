// Render the pipetrack man page: generate-man [OUTPUT_DIR]

use std::path::PathBuf;
use anyhow::{Context, Result};
use clap::CommandFactory;
use pipetrack::cli::Cli;

fn main() -> Result<()> {
    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create directory: {}", out_dir.display()))?;

    let command = Cli::command();
    let path = out_dir.join("pipetrack.1");
    let mut buffer: Vec<u8> = Vec::new();
    clap_mangen::Man::new(command.clone())
        .render(&mut buffer)
        .context("Failed to render man page")?;
    std::fs::write(&path, buffer).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("{}", path.display());

    for sub in command.get_subcommands() {
        let path = out_dir.join(format!("pipetrack-{}.1", sub.get_name()));
        let mut buffer: Vec<u8> = Vec::new();
        clap_mangen::Man::new(sub.clone())
            .render(&mut buffer)
            .with_context(|| format!("Failed to render man page for {}", sub.get_name()))?;
        std::fs::write(&path, buffer).with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{}", path.display());
    }
    Ok(())
}
