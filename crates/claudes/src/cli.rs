// ABOUTME: Command-line arguments and prompt batch parsing
// ABOUTME: Prompts come from argv or a file (or stdin) split on three newlines

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;
use std::path::PathBuf;

/// Separator between prompts in a prompts file
pub const PROMPT_SEPARATOR: &str = "\n\n\n";

#[derive(Parser, Debug)]
#[command(name = "claudes")]
#[command(about = "Run several Claude sessions at once and manage them from a TUI")]
#[command(after_help = "Usage:\n  claudes [options] \"prompt1\" \"prompt2\" ...\n  claudes -f prompts.txt\n  claudes                 (TUI for existing sessions)")]
pub struct Args {
    /// Read prompts from FILE (- for stdin); prompts are separated by two blank lines
    #[arg(short = 'f', value_name = "FILE")]
    pub file: Option<String>,

    /// Create a git worktree for each session
    #[arg(short = 'w')]
    pub worktree: bool,

    /// Base directory for worktrees (default ~/.claudes-work)
    #[arg(short = 'd', value_name = "DIR")]
    pub worktree_dir: Option<PathBuf>,

    /// Spawn the prompts, print progress and wait for them without the TUI
    #[arg(long)]
    pub headless: bool,

    /// Prompts to start, one session each
    pub prompts: Vec<String>,
}

impl Args {
    /// The prompt batch: the file's contents when `-f` is given, else argv
    pub fn read_prompts(&self) -> Result<Vec<String>> {
        let Some(file) = &self.file else {
            return Ok(clean(self.prompts.iter().map(String::as_str)));
        };

        let mut text = String::new();
        if file == "-" {
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read prompts from stdin")?;
        } else {
            text = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read prompts from {file}"))?;
        }
        Ok(parse_prompts(&text))
    }
}

/// Split a prompts file on `\n\n\n`, trimming each piece and dropping empties
pub fn parse_prompts(text: &str) -> Vec<String> {
    clean(text.split(PROMPT_SEPARATOR))
}

fn clean<'a>(prompts: impl Iterator<Item = &'a str>) -> Vec<String> {
    prompts
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
