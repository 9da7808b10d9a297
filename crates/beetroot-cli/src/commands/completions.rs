//! Shell completions generation and installation.

use std::io;
use std::path::PathBuf;
use std::{env, fs};

use anyhow::{bail, Context, Result};
use clap::CommandFactory;
use clap_complete::{generate, Shell};

use super::{Cli, CompletionsAction, ShellType};

impl From<ShellType> for Shell {
    fn from(shell: ShellType) -> Self {
        match shell {
            ShellType::Bash => Self::Bash,
            ShellType::Zsh => Self::Zsh,
            ShellType::Fish => Self::Fish,
            ShellType::PowerShell => Self::PowerShell,
            ShellType::Elvish => Self::Elvish,
        }
    }
}

/// Run the completions command.
pub fn run(action: CompletionsAction) -> Result<()> {
    match action {
        CompletionsAction::Install { shell } => install(shell),
        CompletionsAction::Generate { shell } => {
            let mut cmd = Cli::command();
            generate(Shell::from(shell), &mut cmd, "beetroot", &mut io::stdout());
            Ok(())
        }
    }
}

fn generate_completions(shell: ShellType) -> Result<String> {
    let mut cmd = Cli::command();
    let mut buf = Vec::new();
    generate(Shell::from(shell), &mut cmd, "beetroot", &mut buf);
    String::from_utf8(buf).context("completions were not valid UTF-8")
}

fn install(shell: Option<ShellType>) -> Result<()> {
    let shell = match shell {
        Some(shell) => shell,
        None => detect_shell(env::var("SHELL").ok().as_deref())?,
    };
    let path = completions_path(shell)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(&path, generate_completions(shell)?)
        .with_context(|| format!("writing {}", path.display()))?;

    println!("Installed {shell:?} completions to {}", path.display());
    if shell == ShellType::Zsh {
        println!("Make sure its directory is in your $fpath, then restart your shell.");
    } else {
        println!("Restart your shell to enable them.");
    }
    Ok(())
}

/// Detect the shell from a `$SHELL` value.
fn detect_shell(shell_var: Option<&str>) -> Result<ShellType> {
    let Some(shell_path) = shell_var else {
        bail!(
            "Could not detect shell from $SHELL environment variable.\n\
             Use --shell to specify your shell manually."
        );
    };

    let shell_name = shell_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(shell_path)
        .trim_end_matches(".exe")
        .to_lowercase();

    match shell_name.as_str() {
        "bash" => Ok(ShellType::Bash),
        "zsh" => Ok(ShellType::Zsh),
        "fish" => Ok(ShellType::Fish),
        "pwsh" | "powershell" => Ok(ShellType::PowerShell),
        "elvish" => Ok(ShellType::Elvish),
        other => bail!(
            "Unknown shell: {other}\n\
             Supported shells: bash, zsh, fish, powershell, elvish\n\
             Use --shell to specify your shell manually."
        ),
    }
}

fn completions_path(shell: ShellType) -> Result<PathBuf> {
    let home = env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .context("Could not determine home directory")?;
    let data = env::var("XDG_DATA_HOME").map_or_else(|_| home.join(".local/share"), PathBuf::from);
    let config =
        env::var("XDG_CONFIG_HOME").map_or_else(|_| home.join(".config"), PathBuf::from);

    Ok(match shell {
        ShellType::Bash => data.join("bash-completion/completions/beetroot"),
        ShellType::Zsh => data.join("zsh/site-functions/_beetroot"),
        ShellType::Fish => config.join("fish/completions/beetroot.fish"),
        ShellType::PowerShell => config.join("powershell/beetroot.ps1"),
        ShellType::Elvish => home.join(".elvish/lib/beetroot.elv"),
    })
}
