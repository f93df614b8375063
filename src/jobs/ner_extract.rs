/// Loading named entities from NER corpus files.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{BatchReport, Connections, UnitOutcome, WorkerPool};
use crate::errors::PhraseError;
use crate::text::ner::parse_ner_text;

#[derive(Debug, Clone)]
pub struct NerFile(pub PathBuf);

impl fmt::Display for NerFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// The file itself, or every regular file of a directory sorted by name.
pub fn ner_files(path: &Path) -> Result<Vec<NerFile>, PhraseError> {
    if path.is_file() {
        tracing::info!(path = %path.display(), "Processing a single NER file");
        return Ok(vec![NerFile(path.to_path_buf())]);
    }
    if !path.is_dir() {
        return Err(PhraseError::validation(
            "ner_path",
            &format!("Path does not exist: {}", path.display()),
        ));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    tracing::info!(path = %path.display(), files = files.len(), "Processing a NER directory");
    Ok(files.into_iter().map(NerFile).collect())
}

pub async fn extract_named_entities(
    connections: Arc<dyn Connections>,
    path: &Path,
    n_jobs: usize,
) -> Result<BatchReport, PhraseError> {
    let files = ner_files(path)?;
    let pool = WorkerPool::new("process-NER", n_jobs);
    let report = pool
        .run(files, |file| {
            let connections = connections.clone();
            async move { extract_file(connections.as_ref(), file).await }
        })
        .await;
    Ok(report)
}

async fn extract_file(connections: &dyn Connections, file: NerFile) -> Result<UnitOutcome, PhraseError> {
    let raw = tokio::fs::read_to_string(&file.0).await?;
    let entities = parse_ner_text(&raw);
    let store = connections.graph_store().await?;

    let mut outcome = UnitOutcome::default();
    let mut known = 0usize;
    for entity in &entities {
        match store.insert_entity(entity).await {
            Ok(true) => outcome.records += 1,
            Ok(false) => known += 1,
            Err(e) => {
                tracing::error!(file = %file, entity = %entity, error = %e, "Failed inserting entity");
                outcome.failed_records += 1;
            }
        }
    }

    tracing::info!(
        file = %file,
        entities = entities.len(),
        inserted = outcome.records,
        already_known = known,
        "Finished NER file"
    );
    Ok(outcome)
}
