use std::{path::PathBuf, time::Instant};

use anyhow::{bail, Context, Result};
use chunker_core::{ChunkStorage, ChunkStore};
use clap::Args;
use humantime::format_duration;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, warn};
use yansi::{Condition, Paint};

use crate::config::StoreArgs;

/// Spool JSON records through temporary chunk files and write them back out
#[derive(Args, Debug)]
pub struct SpoolArgs {
    /// File with one JSON record per line. Reads from stdin if omitted.
    #[arg(name = "INPUT")]
    pub input: Option<PathBuf>,

    #[command(flatten)]
    pub store: StoreArgs,
}

/// An error in the input stream
#[derive(Error, Debug)]
pub enum InputError {
    #[error("line {line} is not a valid JSON record: {source}")]
    InvalidRecord {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Counters collected during a spool run
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SpoolSummary {
    pub records: usize,
    pub chunks: usize,
    pub lost_chunks: usize,
}

/// Run the `spool` command
pub async fn run_spool(args: SpoolArgs) -> Result<()> {
    let config = args.store.resolve()?;
    let store: ChunkStore<Value> = ChunkStore::new(config)?;
    debug!(store = store.name(), "created chunk store");

    let start = Instant::now();

    let input: Box<dyn AsyncBufRead + Unpin + Send> = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("unable to open input file: {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let output = BufWriter::new(tokio::io::stdout());

    // always clean up, even if the input was broken
    let result = spool(&store, input, output).await;
    store.destroy().await;
    let summary = result?;

    eprintln!(
        "{}",
        format!(
            "Spooled {} records in {} chunks in {}",
            summary.records,
            summary.chunks,
            format_duration(std::time::Duration::from_millis(
                start.elapsed().as_millis() as u64
            ))
        )
        .green()
        .whenever(Condition::from(|| {
            Condition::stderr_is_tty() && Condition::clicolor() && Condition::no_color()
        }))
    );

    if summary.lost_chunks > 0 {
        bail!("{} chunks could not be read back", summary.lost_chunks);
    }

    Ok(())
}

/// Append all records from `input` to the store, then replay them to
/// `output`
pub async fn spool<S, R, W>(
    store: &ChunkStore<Value, S>,
    input: R,
    mut output: W,
) -> Result<SpoolSummary>
where
    S: ChunkStorage,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut line_number = 0;
    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| InputError::InvalidRecord {
            line: line_number,
            source,
        })?;
        store.append(record);
    }
    store.end();

    let mut summary = SpoolSummary {
        chunks: store.pages_created(),
        ..Default::default()
    };

    let mut replay = store.each();
    while let Some(chunk) = replay.next().await {
        if chunk.status.is_failure() {
            warn!(index = chunk.index, status = ?chunk.status, "chunk could not be read");
            summary.lost_chunks += 1;
        }

        for record in &chunk.records {
            let mut line = serde_json::to_vec(record)?;
            line.push(b'\n');
            output.write_all(&line).await?;
        }
        summary.records += chunk.records.len();

        debug!(
            index = chunk.index,
            percentage = store.replay_percentage(),
            "replayed chunk"
        );
    }
    output.flush().await?;

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assertor::{assert_that, BooleanAssertion, EqualityAssertion};
    use chunker_core::{ChunkStore, ChunkStoreConfig, MemoryStorage};
    use serde_json::Value;
    use tempdir::TempDir;

    use super::{spool, InputError, SpoolSummary};

    #[tokio::test]
    async fn spool_lines() {
        let dir = TempDir::new("chunker_cli").unwrap();
        let config = ChunkStoreConfig::new("spool")
            .with_temp_dir(dir.path())
            .with_max_chunk_size(2);
        let store: ChunkStore<Value> = ChunkStore::new(config).unwrap();

        let input = "{\"a\":1}\n\n[1,2]\n\"x\"\nnull\n{\"b\":{\"c\":true}}\n";
        let mut output = Vec::new();
        let summary = spool(&store, Cursor::new(input), &mut output).await.unwrap();
        store.destroy().await;

        assert_that!(summary).is_equal_to(SpoolSummary {
            records: 5,
            chunks: 3,
            lost_chunks: 0,
        });
        assert_that!(String::from_utf8(output).unwrap())
            .is_equal_to("{\"a\":1}\n[1,2]\n\"x\"\nnull\n{\"b\":{\"c\":true}}\n".to_string());
    }

    #[tokio::test]
    async fn invalid_line() {
        let store: ChunkStore<Value, _> =
            ChunkStore::with_storage(ChunkStoreConfig::new("spool"), MemoryStorage::new())
                .unwrap();
        let err = spool(&store, Cursor::new("1\n{oops\n"), Vec::new())
            .await
            .unwrap_err();
        let err = err.downcast::<InputError>().unwrap();
        assert_that!(matches!(err, InputError::InvalidRecord { line: 2, .. })).is_true();
    }
}
