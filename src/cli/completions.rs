//! Shell completions generation.
//!
//! Generates shell completion scripts for bash, zsh, fish, PowerShell and elvish.

use clap::CommandFactory;
use clap_complete::Shell;

use crate::cli::args::Cli;
use crate::error::OffsyncError;

const BIN_NAME: &str = "offsync";

/// Generate the completion script for `shell`.
///
/// # Errors
///
/// Returns `OffsyncError::Parse` if the generated script is not valid UTF-8.
pub fn generate_completions(shell: Shell) -> Result<String, OffsyncError> {
    let mut cmd = Cli::command();
    let mut buf = Vec::new();
    clap_complete::generate(shell, &mut cmd, BIN_NAME, &mut buf);
    String::from_utf8(buf).map_err(|e| OffsyncError::Parse(format!("UTF-8 error: {e}")))
}

/// Installation instructions for shell completions.
#[must_use]
pub fn completion_install_instructions(shell: Shell) -> String {
    match shell {
        Shell::Bash => r"# Add to ~/.bashrc:
source <(offsync completions bash)

# Or save to a file:
offsync completions bash > ~/.local/share/bash-completion/completions/offsync
"
        .to_string(),

        Shell::Zsh => r"# Save to your fpath:
offsync completions zsh > ~/.zsh/completions/_offsync
# Then add to ~/.zshrc (before compinit):
fpath=(~/.zsh/completions $fpath)
autoload -Uz compinit && compinit
"
        .to_string(),

        Shell::Fish => r"# Save to fish completions directory:
offsync completions fish > ~/.config/fish/completions/offsync.fish
"
        .to_string(),

        Shell::PowerShell => r"# Add to your PowerShell profile ($PROFILE):
offsync completions powershell | Out-String | Invoke-Expression
"
        .to_string(),

        Shell::Elvish => r"# Save to elvish completions directory:
offsync completions elvish > ~/.config/elvish/lib/offsync.elv

# Then add to rc.elv:
use offsync
"
        .to_string(),

        _ => "Unknown shell".to_string(),
    }
}
