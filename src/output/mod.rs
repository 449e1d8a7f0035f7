use console::style;
use std::io::{self, BufRead, Write};
use std::path::Path;

use crate::{BatchError, Result};

/// How to resolve a pre-existing output root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Ask the operator before deleting anything
    Ask,
    /// Delete and recreate without asking
    AssumeYes,
}

/// What `prepare_output_root` did to the root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareOutcome {
    Created,
    Recreated,
    Declined,
}

/// Answers the overwrite question; tests substitute scripted prompters
pub trait Prompter {
    fn confirm_overwrite(&mut self, root: &Path) -> Result<bool>;
}

/// Prompter reading the operator's answer from stdin
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn confirm_overwrite(&mut self, root: &Path) -> Result<bool> {
        print!(
            "Directory {} already exists. Delete and recreate it? (y/n) ",
            style(root.display()).cyan()
        );
        io::stdout().flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;

        Ok(matches!(answer.trim(), "y" | "Y"))
    }
}

/// Ensure the output root exists before any file is written.
///
/// Called once per run, ahead of the row loop. A pre-existing root is deleted
/// and recreated only with the operator's consent (or under
/// [`OverwritePolicy::AssumeYes`]); on refusal nothing is touched.
pub fn prepare_output_root(
    root: &Path,
    policy: OverwritePolicy,
    prompter: &mut dyn Prompter,
) -> Result<PrepareOutcome> {
    if !root.exists() {
        create_root(root)?;
        tracing::info!("Created output directory {}", root.display());
        return Ok(PrepareOutcome::Created);
    }

    let overwrite = match policy {
        OverwritePolicy::AssumeYes => true,
        OverwritePolicy::Ask => prompter.confirm_overwrite(root)?,
    };

    if !overwrite {
        return Ok(PrepareOutcome::Declined);
    }

    fs_err::remove_dir_all(root).map_err(|err| BatchError::Filesystem {
        path: root.to_path_buf(),
        detail: err.to_string(),
    })?;
    create_root(root)?;
    tracing::info!("Recreated output directory {}", root.display());

    Ok(PrepareOutcome::Recreated)
}

fn create_root(root: &Path) -> Result<()> {
    fs_err::create_dir_all(root).map_err(|err| {
        BatchError::Filesystem {
            path: root.to_path_buf(),
            detail: err.to_string(),
        }
        .into()
    })
}
