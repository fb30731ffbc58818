use super::parser::{self, ParseError};
use super::reader::{CancelToken, PlumbingCommand, PlumbingReader};
use super::request::{GitSource, SortOrder, TraversalRequest};
use crate::core::{CommitId, CommitRecord};
use crate::error::{GraphError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tracing::{info, warn};

/// What to do with a record that fails to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    /// Abort the traversal
    #[default]
    Strict,
    /// Log and skip the record
    Lenient,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalOptions {
    pub parse_mode: ParseMode,
    /// Records buffered between the reader thread and the consumer
    pub window: usize,
    /// Rows materialized by a reload
    pub page_size: usize,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            parse_mode: ParseMode::Strict,
            window: 64,
            page_size: 200,
        }
    }
}

type RawItem = std::result::Result<CommitRecord, ParseError>;

/// One traversal: an ordered, de-duplicated, cancellable stream of commits.
///
/// The iterator ends after the first error, after cancellation, and at the
/// end of the history.
pub struct Enumerator {
    reader: PlumbingReader<RawItem>,
    sort: SortOrder,
    parse_mode: ParseMode,
    seen: HashSet<CommitId>,
    by_time: Option<VecDeque<CommitRecord>>,
    yielded: usize,
    duplicates: usize,
    skipped: usize,
    done: bool,
}

impl Enumerator {
    pub fn start(
        source: &GitSource,
        request: &TraversalRequest,
        options: &TraversalOptions,
    ) -> Result<Self> {
        Self::from_command(&request.command(source), request.sort, options)
    }

    /// Run an arbitrary producer of records in the log format
    pub fn from_command(
        command: &PlumbingCommand,
        sort: SortOrder,
        options: &TraversalOptions,
    ) -> Result<Self> {
        let reader = PlumbingReader::spawn(command, options.window, |raw| {
            parser::parse_record(&raw)
        })?;
        Ok(Self {
            reader,
            sort,
            parse_mode: options.parse_mode,
            seen: HashSet::new(),
            by_time: None,
            yielded: 0,
            duplicates: 0,
            skipped: 0,
            done: false,
        })
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.reader.token().clone()
    }

    pub fn cancel(&self) {
        self.reader.token().cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.done
    }

    pub fn sort(&self) -> SortOrder {
        self.sort
    }

    /// Commits reachable from more than one root that were dropped
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Records skipped in lenient mode
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn cancelled(&self) -> bool {
        self.reader.token().is_cancelled()
    }

    /// Next unique record in stream order
    fn pull(&mut self) -> Option<Result<CommitRecord>> {
        loop {
            match self.reader.recv()? {
                Err(err) => return Some(Err(err)),
                Ok(Err(err)) => match self.parse_mode {
                    ParseMode::Strict => return Some(Err(GraphError::Parse(err))),
                    ParseMode::Lenient => {
                        warn!(field = %err.field, reason = %err.reason, "skipping malformed record");
                        self.skipped += 1;
                    }
                },
                Ok(Ok(record)) => {
                    if self.seen.insert(record.id.clone()) {
                        return Some(Ok(record));
                    }
                    self.duplicates += 1;
                }
            }
        }
    }

    /// Commit timestamps are not monotone along ancestry, so the whole
    /// stream has to be read before the first commit can be yielded.
    fn pull_by_time(&mut self) -> Option<Result<CommitRecord>> {
        if self.by_time.is_none() {
            let mut all = Vec::new();
            while let Some(item) = self.pull() {
                match item {
                    Ok(record) => all.push(record),
                    Err(err) => return Some(Err(err)),
                }
            }
            all.sort_by(|a, b| {
                b.timestamp
                    .cmp(&a.timestamp)
                    .then_with(|| a.id.cmp(&b.id))
            });
            self.by_time = Some(all.into());
        }
        self.by_time.as_mut()?.pop_front().map(Ok)
    }

    fn finish(&mut self, last: Option<Result<CommitRecord>>) -> Option<Result<CommitRecord>> {
        self.done = true;
        if last.is_some() {
            self.reader.token().cancel();
        } else {
            info!(
                commits = self.yielded,
                duplicates = self.duplicates,
                skipped = self.skipped,
                "history traversal complete"
            );
        }
        last
    }
}

impl Iterator for Enumerator {
    type Item = Result<CommitRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.cancelled() {
            warn!(commits = self.yielded, "history traversal cancelled");
            return self.finish(Some(Err(GraphError::Cancelled)));
        }

        let item = match self.sort {
            SortOrder::Topo => self.pull(),
            SortOrder::Time => self.pull_by_time(),
        };

        match item {
            Some(Ok(record)) if !self.cancelled() => {
                self.yielded += 1;
                Some(Ok(record))
            }
            Some(Err(err)) => self.finish(Some(Err(err))),
            _ if self.cancelled() => self.finish(Some(Err(GraphError::Cancelled))),
            _ => self.finish(None),
        }
    }
}
