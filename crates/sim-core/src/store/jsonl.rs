//! JSONL persistence backend.
//!
//! One append-only file per record kind inside an output directory:
//!
//! - `runs.jsonl`: every status change appends the whole run; the last
//!   record for an id wins
//! - `feeds.jsonl`, `actions.jsonl`, `turns.jsonl`
//! - `follow_graph_<run_id>.json`: rewritten atomically on every save
//!
//! Opening a store replays the logs into an in-memory index, which serves
//! reads and key-uniqueness checks. An agent's actions for a turn are written
//! with a single write; a failed write is cut back off the file so a retry
//! never leaves a repeated or torn record behind.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use sim_records::{AgentAction, GeneratedFeed, RecordError, Run, RunStatus, TurnMetadata};

use super::{InMemoryStore, PersistenceStore, StoreError};
use crate::follow_graph::FollowGraph;

const RUNS_FILE: &str = "runs.jsonl";
const FEEDS_FILE: &str = "feeds.jsonl";
const ACTIONS_FILE: &str = "actions.jsonl";
const TURNS_FILE: &str = "turns.jsonl";

/// Append-only writer for one JSONL file.
#[derive(Debug)]
struct LineWriter {
    path: PathBuf,
    file: File,
}

impl LineWriter {
    fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    fn append<T: Serialize>(&mut self, record: &T) -> Result<(), StoreError> {
        self.append_all(std::slice::from_ref(record))
    }

    /// Writes `records` as consecutive lines in one write. On failure the
    /// file is truncated back to its previous length and reopened.
    fn append_all<T: Serialize>(&mut self, records: &[T]) -> Result<(), StoreError> {
        let mut buf = String::new();
        for record in records {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }
        if buf.is_empty() {
            return Ok(());
        }
        let len = self.file.metadata()?.len();
        if let Err(e) = self
            .file
            .write_all(buf.as_bytes())
            .and_then(|()| self.file.flush())
        {
            self.rewind(len);
            return Err(e.into());
        }
        Ok(())
    }

    fn rewind(&mut self, len: u64) {
        if let Err(e) = self.file.set_len(len) {
            tracing::error!(file = %self.path.display(), error = %e, "could not truncate partial write");
        }
        match Self::open(&self.path) {
            Ok(reopened) => *self = reopened,
            Err(e) => {
                tracing::error!(file = %self.path.display(), error = %e, "could not reopen log")
            }
        }
    }
}

#[derive(Debug)]
struct Writers {
    runs: LineWriter,
    feeds: LineWriter,
    actions: LineWriter,
    turns: LineWriter,
}

/// File-backed store rooted at a directory.
#[derive(Debug)]
pub struct JsonlStore {
    dir: PathBuf,
    index: InMemoryStore,
    writers: Mutex<Writers>,
}

impl JsonlStore {
    /// Opens (creating if needed) a store in `dir` and replays its logs.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let index = InMemoryStore::new();
        replay(&dir.join(RUNS_FILE), parse_run, |run| index.put_run(run))?;
        replay(&dir.join(FEEDS_FILE), GeneratedFeed::from_jsonl, |feed| {
            match index.save_feed(&feed) {
                Err(StoreError::DuplicateFeed(key)) => {
                    tracing::warn!(%key, "ignoring repeated feed record in log");
                    Ok(())
                }
                other => other,
            }
        })?;
        replay(&dir.join(ACTIONS_FILE), AgentAction::from_jsonl, |action| {
            if !index.put_action(&action)? {
                tracing::warn!(action_id = %action.action_id, "ignoring repeated action record in log");
            }
            Ok(())
        })?;
        replay(&dir.join(TURNS_FILE), parse_turn, |meta| {
            match index.save_turn_metadata(&meta) {
                Err(StoreError::DuplicateTurn { run_id, turn }) => {
                    tracing::warn!(run_id = %run_id, turn, "ignoring repeated turn record in log");
                    Ok(())
                }
                other => other,
            }
        })?;

        let writers = Writers {
            runs: LineWriter::open(&dir.join(RUNS_FILE))?,
            feeds: LineWriter::open(&dir.join(FEEDS_FILE))?,
            actions: LineWriter::open(&dir.join(ACTIONS_FILE))?,
            turns: LineWriter::open(&dir.join(TURNS_FILE))?,
        };

        tracing::debug!(dir = %dir.display(), "opened jsonl store");
        Ok(Self {
            dir,
            index,
            writers: Mutex::new(writers),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn graph_path(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("follow_graph_{}.json", run_id))
    }

    fn writers(&self) -> Result<MutexGuard<'_, Writers>, StoreError> {
        self.writers
            .lock()
            .map_err(|_| StoreError::Unavailable("writer lock poisoned".into()))
    }
}

fn parse_run(line: &str) -> Result<Run, RecordError> {
    let run: Run = serde_json::from_str(line)?;
    run.validate()?;
    Ok(run)
}

fn parse_turn(line: &str) -> Result<TurnMetadata, RecordError> {
    Ok(serde_json::from_str(line)?)
}

/// Feeds every non-empty line of `path` through `parse` and `apply`.
/// A missing file replays nothing.
fn replay<T, P, A>(path: &Path, parse: P, mut apply: A) -> Result<usize, StoreError>
where
    P: Fn(&str) -> Result<T, RecordError>,
    A: FnMut(T) -> Result<(), StoreError>,
{
    if !path.exists() {
        return Ok(0);
    }
    let reader = BufReader::new(File::open(path)?);
    let mut count = 0;
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = parse(&line).map_err(|source| StoreError::Corrupt {
            file: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        apply(record)?;
        count += 1;
    }
    Ok(count)
}

impl PersistenceStore for JsonlStore {
    fn create_run(&self, run: &Run) -> Result<(), StoreError> {
        let mut writers = self.writers()?;
        if self.index.get_run(&run.run_id)?.is_some() {
            return Err(StoreError::DuplicateRun(run.run_id.clone()));
        }
        writers.runs.append(run)?;
        self.index.create_run(run)
    }

    fn update_run_status(&self, run_id: &str, status: RunStatus) -> Result<Run, StoreError> {
        let mut writers = self.writers()?;
        let mut run = self
            .index
            .get_run(run_id)?
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))?;
        let before = run.status;
        run.transition(status)?;
        if run.status != before {
            writers.runs.append(&run)?;
            self.index.put_run(run.clone())?;
        }
        Ok(run)
    }

    fn get_run(&self, run_id: &str) -> Result<Option<Run>, StoreError> {
        self.index.get_run(run_id)
    }

    fn list_runs(&self) -> Result<Vec<Run>, StoreError> {
        self.index.list_runs()
    }

    fn save_feed(&self, feed: &GeneratedFeed) -> Result<(), StoreError> {
        let mut writers = self.writers()?;
        let key = feed.key();
        if self.index.has_feed(&key)? {
            return Err(StoreError::DuplicateFeed(key));
        }
        writers.feeds.append(feed)?;
        self.index.save_feed(feed)
    }

    fn load_feeds(&self, run_id: &str, turn_lt: u32) -> Result<Vec<GeneratedFeed>, StoreError> {
        self.index.load_feeds(run_id, turn_lt)
    }

    fn load_turn_feeds(&self, run_id: &str, turn: u32) -> Result<Vec<GeneratedFeed>, StoreError> {
        self.index.load_turn_feeds(run_id, turn)
    }

    fn save_actions(
        &self,
        run_id: &str,
        turn: u32,
        agent: &str,
        actions: &[AgentAction],
    ) -> Result<(), StoreError> {
        let mut writers = self.writers()?;
        self.index.check_actions(run_id, turn, agent, actions)?;
        writers.actions.append_all(actions)?;
        self.index.save_actions(run_id, turn, agent, actions)
    }

    fn load_actions(&self, run_id: &str, turn: u32) -> Result<Vec<AgentAction>, StoreError> {
        self.index.load_actions(run_id, turn)
    }

    fn load_follow_graph(&self, run_id: &str) -> Result<FollowGraph, StoreError> {
        let path = self.graph_path(run_id);
        if !path.exists() {
            return Ok(FollowGraph::new());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save_follow_graph(&self, run_id: &str, graph: &FollowGraph) -> Result<(), StoreError> {
        let path = self.graph_path(run_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(graph)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn save_turn_metadata(&self, metadata: &TurnMetadata) -> Result<(), StoreError> {
        let mut writers = self.writers()?;
        if self
            .index
            .load_turn_metadata(&metadata.run_id, metadata.turn_number)?
            .is_some()
        {
            return Err(StoreError::DuplicateTurn {
                run_id: metadata.run_id.clone(),
                turn: metadata.turn_number,
            });
        }
        writers.turns.append(metadata)?;
        self.index.save_turn_metadata(metadata)
    }

    fn load_turn_metadata(
        &self,
        run_id: &str,
        turn: u32,
    ) -> Result<Option<TurnMetadata>, StoreError> {
        self.index.load_turn_metadata(run_id, turn)
    }

    fn list_turn_metadata(&self, run_id: &str) -> Result<Vec<TurnMetadata>, StoreError> {
        self.index.list_turn_metadata(run_id)
    }
}
