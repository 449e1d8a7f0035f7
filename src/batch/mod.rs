use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::extract::AudioExtractor;
use crate::output::{prepare_output_root, OverwritePolicy, PrepareOutcome, Prompter};
use crate::table;
use crate::{utils, BatchError, Result};

/// What a batch run needs to know before it starts
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub table: PathBuf,
    pub output_root: PathBuf,
    /// Hide the progress bar
    pub quiet: bool,
}

/// How a finished run ended
#[derive(Debug)]
pub enum BatchOutcome {
    Completed(BatchSummary),
    Declined,
}

#[derive(Debug)]
pub struct BatchSummary {
    pub rows: usize,
    /// Clip count per person, sorted by name
    pub clips: Vec<(String, u32)>,
    pub output_root: PathBuf,
}

/// Mutable state threaded through one run: per-person label counters
struct RunState {
    counters: HashMap<String, u32>,
}

impl RunState {
    fn new() -> Self {
        Self {
            counters: HashMap::new(),
        }
    }

    /// Next label for this person: audio.0 on first sight, then audio.1, ...
    fn allocate_label(&mut self, person: &str) -> String {
        let counter = self
            .counters
            .entry(person.to_string())
            .and_modify(|c| *c += 1)
            .or_insert(0);

        format!("audio.{}", counter)
    }

    /// Counters hold the last allocated index, so each person's clip
    /// count is one past it.
    fn into_clip_counts(self) -> Vec<(String, u32)> {
        let mut clips: Vec<(String, u32)> = self
            .counters
            .into_iter()
            .map(|(person, last)| (person, last + 1))
            .collect();
        clips.sort();
        clips
    }
}

/// Drives one table through extraction and placement
pub struct BatchRunner {
    extractor: Box<dyn AudioExtractor>,
    options: BatchOptions,
}

impl BatchRunner {
    pub fn new(extractor: Box<dyn AudioExtractor>, options: BatchOptions) -> Self {
        Self { extractor, options }
    }

    /// Run the whole batch. The table is read and validated before the
    /// output root is touched, so a bad table never triggers the
    /// overwrite prompt.
    pub async fn run(
        &self,
        policy: OverwritePolicy,
        prompter: &mut dyn Prompter,
    ) -> Result<BatchOutcome> {
        let rows = table::read_rows(&self.options.table)?;

        match prepare_output_root(&self.options.output_root, policy, prompter)? {
            PrepareOutcome::Declined => return Ok(BatchOutcome::Declined),
            PrepareOutcome::Created | PrepareOutcome::Recreated => {}
        }

        let table_name = self
            .options
            .table
            .file_name()
            .map(|name| name.to_owned())
            .ok_or_else(|| BatchError::Filesystem {
                path: self.options.table.clone(),
                detail: "table path has no file name".to_string(),
            })?;

        let mut state = RunState::new();

        let progress = if self.options.quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(rows.len() as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap()
                    .progress_chars("#>-"),
            );
            bar
        };

        for (index, row) in rows.iter().enumerate() {
            let row_number = index + 1;
            let label = state.allocate_label(&row.person);
            progress.set_message(format!("{}: {}", row.person, label));

            let person_dir = self.ensure_person_dir(&row.person)?;

            tracing::info!(
                "Row {}: extracting {} for {} from minute {}",
                row_number,
                label,
                row.person,
                row.start_minute
            );

            let artifact = self
                .extractor
                .extract_audio(&row.url, &label, &row.start_minute)
                .await
                .map_err(|err| BatchError::Extraction {
                    row: row_number,
                    url: row.url.clone(),
                    detail: format!("{:#}", err),
                })?;

            let placed = place_artifact(&artifact, &person_dir)?;
            tracing::debug!("Placed {}", placed.display());

            // Each person's directory carries a copy of the table the
            // batch was driven by. Losing the copy is not worth losing
            // the extracted audio over.
            let provenance = person_dir.join(&table_name);
            if let Err(err) = fs_err::copy(&self.options.table, &provenance) {
                tracing::warn!(
                    "Could not copy {} into {}: {}",
                    self.options.table.display(),
                    person_dir.display(),
                    err
                );
            }

            progress.inc(1);
        }

        progress.finish_with_message("Batch complete");

        Ok(BatchOutcome::Completed(BatchSummary {
            rows: rows.len(),
            clips: state.into_clip_counts(),
            output_root: self.options.output_root.clone(),
        }))
    }

    /// Create the person's directory on first use. Idempotent, so rows
    /// for the same person later in the table cost nothing extra.
    /// Names sanitizing to empty, `.` or `..` are refused: joined onto
    /// the root they would alias it or climb out of it.
    fn ensure_person_dir(&self, person: &str) -> Result<PathBuf> {
        let name = utils::sanitize_filename(person);
        if name.is_empty() || name == "." || name == ".." {
            return Err(BatchError::Filesystem {
                path: self.options.output_root.clone(),
                detail: format!("person {:?} does not yield a usable directory name", person),
            }
            .into());
        }

        let dir = self.options.output_root.join(name);

        fs_err::create_dir_all(&dir).map_err(|err| BatchError::Filesystem {
            path: dir.clone(),
            detail: err.to_string(),
        })?;

        Ok(dir)
    }
}

/// Move an extracted artifact into its person directory, falling back
/// to copy + remove when a rename crosses filesystems.
fn place_artifact(artifact: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let name = artifact
        .file_name()
        .ok_or_else(|| BatchError::Filesystem {
            path: artifact.to_path_buf(),
            detail: "artifact has no file name".to_string(),
        })?;
    let dest = dest_dir.join(name);

    if dest.exists() {
        return Err(BatchError::Filesystem {
            path: dest,
            detail: "destination already exists".to_string(),
        }
        .into());
    }

    if fs_err::rename(artifact, &dest).is_err() {
        fs_err::copy(artifact, &dest).map_err(|err| BatchError::Filesystem {
            path: dest.clone(),
            detail: err.to_string(),
        })?;
        if let Err(err) = fs_err::remove_file(artifact) {
            tracing::warn!("Could not remove work file {}: {}", artifact.display(), err);
        }
    }

    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::MockAudioExtractor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct NeverPrompter;

    impl Prompter for NeverPrompter {
        fn confirm_overwrite(&mut self, _root: &Path) -> Result<bool> {
            panic!("prompt must not be shown in this scenario");
        }
    }

    struct DecliningPrompter {
        calls: usize,
    }

    impl Prompter for DecliningPrompter {
        fn confirm_overwrite(&mut self, _root: &Path) -> Result<bool> {
            self.calls += 1;
            Ok(false)
        }
    }

    fn write_table(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("links.csv");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn file_writing_mock(work_dir: PathBuf, calls: usize) -> MockAudioExtractor {
        let mut mock = MockAudioExtractor::new();
        mock.expect_extract_audio()
            .times(calls)
            .returning(move |_url, label, _start| {
                let path = work_dir.join(format!("{}.mp3", label));
                std::fs::write(&path, b"audio bytes").unwrap();
                Ok(path)
            });
        mock
    }

    #[test]
    fn test_labels_count_per_person_in_arrival_order() {
        let mut state = RunState::new();

        assert_eq!(state.allocate_label("alice"), "audio.0");
        assert_eq!(state.allocate_label("bob"), "audio.0");
        assert_eq!(state.allocate_label("alice"), "audio.1");
        assert_eq!(state.allocate_label("alice"), "audio.2");
        assert_eq!(state.allocate_label("bob"), "audio.1");
        assert_eq!(
            state.into_clip_counts(),
            vec![("alice".to_string(), 3), ("bob".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn test_run_places_labeled_audio_per_person() {
        let scratch = tempfile::tempdir().unwrap();
        let table = write_table(
            scratch.path(),
            "url,person,start_minute\n\
             https://example.com/a,alice,0\n\
             https://example.com/b,bob,3\n\
             https://example.com/c,alice,7\n",
        );
        let work = scratch.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        let root = scratch.path().join("out");

        let runner = BatchRunner::new(
            Box::new(file_writing_mock(work, 3)),
            BatchOptions {
                table: table.clone(),
                output_root: root.clone(),
                quiet: true,
            },
        );

        let outcome = runner
            .run(OverwritePolicy::Ask, &mut NeverPrompter)
            .await
            .unwrap();

        let summary = match outcome {
            BatchOutcome::Completed(summary) => summary,
            BatchOutcome::Declined => panic!("run was not declined"),
        };
        assert_eq!(summary.rows, 3);
        assert_eq!(
            summary.clips,
            vec![("alice".to_string(), 2), ("bob".to_string(), 1)]
        );

        assert!(root.join("alice").join("audio.0.mp3").exists());
        assert!(root.join("alice").join("audio.1.mp3").exists());
        assert!(root.join("bob").join("audio.0.mp3").exists());

        let original = std::fs::read(&table).unwrap();
        assert_eq!(std::fs::read(root.join("alice").join("links.csv")).unwrap(), original);
        assert_eq!(std::fs::read(root.join("bob").join("links.csv")).unwrap(), original);
    }

    #[tokio::test]
    async fn test_declined_overwrite_ends_the_run_without_extracting() {
        let scratch = tempfile::tempdir().unwrap();
        let table = write_table(
            scratch.path(),
            "url,person,start_minute\nhttps://example.com/a,alice,0\n",
        );
        let root = scratch.path().join("out");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("keep.txt"), b"precious").unwrap();

        let mut mock = MockAudioExtractor::new();
        mock.expect_extract_audio().never();

        let runner = BatchRunner::new(
            Box::new(mock),
            BatchOptions {
                table,
                output_root: root.clone(),
                quiet: true,
            },
        );

        let mut prompter = DecliningPrompter { calls: 0 };
        let outcome = runner.run(OverwritePolicy::Ask, &mut prompter).await.unwrap();

        assert!(matches!(outcome, BatchOutcome::Declined));
        assert_eq!(prompter.calls, 1);
        assert!(root.join("keep.txt").exists());
    }

    #[tokio::test]
    async fn test_extraction_failure_reports_the_offending_row() {
        let scratch = tempfile::tempdir().unwrap();
        let table = write_table(
            scratch.path(),
            "url,person,start_minute\n\
             https://example.com/a,alice,0\n\
             https://example.com/broken,bob,5\n",
        );
        let work = scratch.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        let root = scratch.path().join("out");

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let work_dir = work.clone();
        let mut mock = MockAudioExtractor::new();
        mock.expect_extract_audio()
            .times(2)
            .returning(move |_url, label, _start| {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    let path = work_dir.join(format!("{}.mp3", label));
                    std::fs::write(&path, b"audio bytes").unwrap();
                    Ok(path)
                } else {
                    Err(anyhow::anyhow!("404 not found"))
                }
            });

        let runner = BatchRunner::new(
            Box::new(mock),
            BatchOptions {
                table,
                output_root: root.clone(),
                quiet: true,
            },
        );

        let err = runner
            .run(OverwritePolicy::Ask, &mut NeverPrompter)
            .await
            .unwrap_err();

        match err.downcast_ref::<BatchError>() {
            Some(BatchError::Extraction { row, url, .. }) => {
                assert_eq!(*row, 2);
                assert_eq!(url, "https://example.com/broken");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        // Work finished before the failure stays on disk.
        assert!(root.join("alice").join("audio.0.mp3").exists());
    }

    #[tokio::test]
    async fn test_bad_table_never_reaches_the_prompt() {
        let scratch = tempfile::tempdir().unwrap();
        let table = write_table(scratch.path(), "url,who\nhttps://example.com/a,alice\n");
        let root = scratch.path().join("out");
        std::fs::create_dir_all(&root).unwrap();

        let mut mock = MockAudioExtractor::new();
        mock.expect_extract_audio().never();

        let runner = BatchRunner::new(
            Box::new(mock),
            BatchOptions {
                table,
                output_root: root,
                quiet: true,
            },
        );

        let err = runner
            .run(OverwritePolicy::Ask, &mut NeverPrompter)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<BatchError>(),
            Some(BatchError::Schema { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_table_still_creates_the_output_root() {
        let scratch = tempfile::tempdir().unwrap();
        let table = write_table(scratch.path(), "url,person,start_minute\n");
        let root = scratch.path().join("out");

        let mut mock = MockAudioExtractor::new();
        mock.expect_extract_audio().never();

        let runner = BatchRunner::new(
            Box::new(mock),
            BatchOptions {
                table,
                output_root: root.clone(),
                quiet: true,
            },
        );

        let outcome = runner
            .run(OverwritePolicy::Ask, &mut NeverPrompter)
            .await
            .unwrap();

        match outcome {
            BatchOutcome::Completed(summary) => {
                assert_eq!(summary.rows, 0);
                assert!(summary.clips.is_empty());
            }
            BatchOutcome::Declined => panic!("run was not declined"),
        }
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_dotdot_person_cannot_escape_the_output_root() {
        let scratch = tempfile::tempdir().unwrap();
        let table = write_table(
            scratch.path(),
            "url,person,start_minute\nhttps://example.com/a,..,0\n",
        );
        let root = scratch.path().join("out");

        let mut mock = MockAudioExtractor::new();
        mock.expect_extract_audio().never();

        let runner = BatchRunner::new(
            Box::new(mock),
            BatchOptions {
                table: table.clone(),
                output_root: root,
                quiet: true,
            },
        );

        let before = std::fs::read(&table).unwrap();
        let err = runner
            .run(OverwritePolicy::Ask, &mut NeverPrompter)
            .await
            .unwrap_err();

        match err.downcast_ref::<BatchError>() {
            Some(BatchError::Filesystem { detail, .. }) => {
                assert!(detail.contains(".."), "detail was: {}", detail);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        // Nothing may land beside the root, and the table must survive.
        assert!(!scratch.path().join("audio.0.mp3").exists());
        assert_eq!(std::fs::read(&table).unwrap(), before);
    }

    #[test]
    fn test_person_names_without_a_usable_directory_name_are_refused() {
        let scratch = tempfile::tempdir().unwrap();
        let root = scratch.path().join("out");
        std::fs::create_dir_all(&root).unwrap();

        let mut mock = MockAudioExtractor::new();
        mock.expect_extract_audio().never();

        let runner = BatchRunner::new(
            Box::new(mock),
            BatchOptions {
                table: scratch.path().join("links.csv"),
                output_root: root.clone(),
                quiet: true,
            },
        );

        for person in ["..", ".", "", "  ", " .. "] {
            assert!(
                runner.ensure_person_dir(person).is_err(),
                "accepted {:?}",
                person
            );
        }
        assert!(runner.ensure_person_dir("alice").is_ok());
        assert!(root.join("alice").is_dir());
    }

    #[test]
    fn test_place_artifact_refuses_to_overwrite() {
        let scratch = tempfile::tempdir().unwrap();
        let artifact = scratch.path().join("audio.0.mp3");
        std::fs::write(&artifact, b"new").unwrap();
        let dest_dir = scratch.path().join("alice");
        std::fs::create_dir_all(&dest_dir).unwrap();
        std::fs::write(dest_dir.join("audio.0.mp3"), b"old").unwrap();

        let err = place_artifact(&artifact, &dest_dir).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<BatchError>(),
            Some(BatchError::Filesystem { .. })
        ));
        assert_eq!(std::fs::read(dest_dir.join("audio.0.mp3")).unwrap(), b"old");
    }
}
