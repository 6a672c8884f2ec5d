//! Interactive API key entry for hosts with no stored credential

use anyhow::{Context, Result};
use nameaudit_core::CredentialStore;
use std::io::{self, BufRead, Write};

/// Ask for a key on the terminal and offer to save it to the credential file.
pub fn prompt_for_api_key(store: &CredentialStore, host: &str) -> Result<String> {
    let stdin = io::stdin();
    let mut input = stdin.lock();

    eprintln!(
        "No key found in file and no API key specified for the appliance at {}.",
        host
    );
    let key = ask(&mut input, "Please enter the API key for the specified appliance: ")?;
    if key.is_empty() {
        anyhow::bail!("No API key entered for {}", host);
    }

    let answer = ask(
        &mut input,
        &format!(
            "Do you wish to save this key to the default file ({})? [y/N] ",
            store.path().display()
        ),
    )?;
    if is_yes(&answer) {
        store
            .save(host, &key)
            .with_context(|| format!("Failed to save API key to {:?}", store.path()))?;
        eprintln!("Saved key to {}", store.path().display());
    }

    Ok(key)
}

fn ask(input: &mut impl BufRead, question: &str) -> Result<String> {
    eprint!("{}", question);
    io::stderr().flush().ok();

    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("Failed to read from terminal")?;
    Ok(line.trim().to_string())
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.to_lowercase().as_str(), "y" | "yes")
}
