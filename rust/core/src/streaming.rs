// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Streaming entity parser
//!
//! Consumes IFC bytes chunk by chunk without holding the whole file in memory.
//! Decoding state, the trailing partial line and any record still open across
//! lines are carried between chunks, so the emitted entities do not depend on
//! where chunk boundaries fall.
//!
//! ```rust,ignore
//! use ifc_ids_core::{EntityReader, ParseEvent, StreamConfig};
//!
//! for event in EntityReader::open("model.ifc", StreamConfig::default())? {
//!     match event? {
//!         ParseEvent::Entity(entity) => println!("#{} {}", entity.id, entity.type_name),
//!         ParseEvent::Completed { entity_count, .. } => println!("{} entities", entity_count),
//!         _ => {}
//!     }
//! }
//! ```

use std::borrow::Cow;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use futures_core::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::parser::parse_record;

const DATA_MARKER: &str = "DATA;";
const END_SECTION_MARKER: &str = "ENDSEC;";

/// Streaming configuration
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Bytes read per chunk
    pub chunk_size: usize,
    /// Group entities into batches of this size instead of emitting them one by one
    pub batch_size: Option<usize>,
    /// Total input size, when known, reported in progress events
    pub total_bytes: Option<u64>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            batch_size: None,
            total_bytes: None,
        }
    }
}

/// Progress snapshot emitted after each chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParseProgress {
    pub processed_bytes: u64,
    pub total_bytes: Option<u64>,
    pub entity_count: usize,
}

/// Parse events
#[derive(Debug, Clone, PartialEq)]
pub enum ParseEvent {
    /// One parsed entity
    Entity(Entity),
    /// A group of parsed entities (when `batch_size` is configured)
    Batch(Vec<Entity>),
    /// A completed record that did not match the record grammar
    Skipped { reason: String, text: String },
    /// Progress after a chunk has been consumed
    Progress(ParseProgress),
    /// Terminal event, emitted exactly once
    Completed {
        entity_count: usize,
        skipped_count: usize,
        processed_bytes: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Data,
    Trailer,
}

/// Incremental parser state machine.
///
/// Feed it chunks with [`feed`](Self::feed) and call [`finish`](Self::finish)
/// once the input is exhausted.
pub struct StreamingParser {
    config: StreamConfig,
    /// Bytes of an incomplete UTF-8 sequence at the end of the last chunk
    pending_bytes: Vec<u8>,
    /// Decoded text not yet terminated by a newline
    line_buffer: String,
    /// Record text accumulated across lines
    record: String,
    /// Inside an open string literal of `record`
    in_string: bool,
    /// Inside a `/* ... */` block comment spanning lines
    in_comment: bool,
    section: Section,
    processed_bytes: u64,
    entity_count: usize,
    skipped_count: usize,
    batch: Vec<Entity>,
    events: Vec<ParseEvent>,
    finished: bool,
}

impl StreamingParser {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            pending_bytes: Vec::new(),
            line_buffer: String::new(),
            record: String::new(),
            in_string: false,
            in_comment: false,
            section: Section::Header,
            processed_bytes: 0,
            entity_count: 0,
            skipped_count: 0,
            batch: Vec::new(),
            events: Vec::new(),
            finished: false,
        }
    }

    /// Entities emitted so far
    pub fn entity_count(&self) -> usize {
        self.entity_count
    }

    /// Malformed records dropped so far
    pub fn skipped_count(&self) -> usize {
        self.skipped_count
    }

    /// Consume one chunk and return the events it produced.
    ///
    /// The last event of every non-empty call is a [`ParseEvent::Progress`].
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ParseEvent> {
        if self.finished || chunk.is_empty() {
            return Vec::new();
        }

        self.processed_bytes += chunk.len() as u64;
        self.decode(chunk);

        let mut text = std::mem::take(&mut self.line_buffer);
        let mut start = 0;
        for newline in memchr::memchr_iter(b'\n', text.as_bytes()) {
            self.process_line(&text[start..newline]);
            start = newline + 1;
        }
        text.drain(..start);
        self.line_buffer = text;

        self.events.push(ParseEvent::Progress(ParseProgress {
            processed_bytes: self.processed_bytes,
            total_bytes: self.config.total_bytes,
            entity_count: self.entity_count,
        }));
        std::mem::take(&mut self.events)
    }

    /// Flush trailing content and emit the completion event.
    ///
    /// Subsequent calls return no events.
    pub fn finish(&mut self) -> Vec<ParseEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        if !self.pending_bytes.is_empty() {
            self.pending_bytes.clear();
            self.line_buffer.push(char::REPLACEMENT_CHARACTER);
        }

        let tail = std::mem::take(&mut self.line_buffer);
        if !tail.is_empty() {
            self.process_line(&tail);
        }

        if !self.record.is_empty() {
            let text = std::mem::take(&mut self.record);
            self.skip(text, "unterminated record at end of input".to_string());
        }

        if !self.batch.is_empty() {
            let batch = std::mem::take(&mut self.batch);
            self.events.push(ParseEvent::Batch(batch));
        }

        tracing::debug!(
            entities = self.entity_count,
            skipped = self.skipped_count,
            bytes = self.processed_bytes,
            "Streaming parse completed"
        );

        self.events.push(ParseEvent::Completed {
            entity_count: self.entity_count,
            skipped_count: self.skipped_count,
            processed_bytes: self.processed_bytes,
        });
        std::mem::take(&mut self.events)
    }

    /// Decode bytes into `line_buffer`, carrying a split multi-byte sequence over
    fn decode(&mut self, chunk: &[u8]) {
        let joined;
        let mut input: &[u8] = if self.pending_bytes.is_empty() {
            chunk
        } else {
            self.pending_bytes.extend_from_slice(chunk);
            joined = std::mem::take(&mut self.pending_bytes);
            &joined
        };

        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    self.line_buffer.push_str(text);
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.line_buffer
                        .push_str(std::str::from_utf8(&input[..valid]).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            self.line_buffer.push(char::REPLACEMENT_CHARACTER);
                            input = &input[valid + len..];
                        }
                        None => {
                            self.pending_bytes.extend_from_slice(&input[valid..]);
                            return;
                        }
                    }
                }
            }
        }
    }

    fn process_line(&mut self, line: &str) {
        let line = self.strip_comments(line);
        let mut rest = line.trim();

        while !rest.is_empty() {
            if self.record.is_empty() {
                match self.section {
                    Section::Header | Section::Trailer => {
                        if rest == DATA_MARKER {
                            self.section = Section::Data;
                        }
                        return;
                    }
                    Section::Data => {
                        if rest == END_SECTION_MARKER {
                            self.section = Section::Trailer;
                            return;
                        }
                        if !rest.starts_with('#') {
                            return;
                        }
                    }
                }
                self.in_string = false;
            } else {
                self.record.push(' ');
            }

            match self.append_to_record(rest) {
                Some(consumed) => {
                    self.complete_record();
                    rest = rest[consumed..].trim_start();
                }
                None => return,
            }
        }
    }

    /// Remove `/* ... */` comments outside string literals.
    ///
    /// An unclosed comment swallows the rest of the line and carries over.
    fn strip_comments<'a>(&mut self, line: &'a str) -> Cow<'a, str> {
        if !self.in_comment && !line.contains("/*") {
            return Cow::Borrowed(line);
        }

        let bytes = line.as_bytes();
        let mut kept = String::with_capacity(line.len());
        let mut in_string = !self.record.is_empty() && self.in_string;
        let mut start = 0;
        let mut i = 0;
        while i < bytes.len() {
            if self.in_comment {
                if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
                    self.in_comment = false;
                    i += 2;
                    start = i;
                    continue;
                }
            } else if bytes[i] == b'\'' {
                in_string = !in_string;
            } else if !in_string && bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'*') {
                kept.push_str(&line[start..i]);
                self.in_comment = true;
                i += 2;
                continue;
            }
            i += 1;
        }
        if !self.in_comment {
            kept.push_str(&line[start..]);
        }
        Cow::Owned(kept)
    }

    /// Append `text` to the open record, tracking string state.
    ///
    /// Returns the number of bytes consumed when a terminating `;` outside a
    /// string literal was reached.
    fn append_to_record(&mut self, text: &str) -> Option<usize> {
        let bytes = text.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\'' if self.in_string => {
                    if bytes.get(i + 1) == Some(&b'\'') {
                        i += 1;
                    } else {
                        self.in_string = false;
                    }
                }
                b'\'' => self.in_string = true,
                b';' if !self.in_string => {
                    self.record.push_str(&text[..=i]);
                    return Some(i + 1);
                }
                _ => {}
            }
            i += 1;
        }
        self.record.push_str(text);
        None
    }

    fn complete_record(&mut self) {
        let text = std::mem::take(&mut self.record);
        self.in_string = false;

        match parse_record(&text) {
            Ok(entity) => {
                self.entity_count += 1;
                match self.config.batch_size {
                    Some(size) if size > 0 => {
                        self.batch.push(entity);
                        if self.batch.len() >= size {
                            let batch = std::mem::take(&mut self.batch);
                            self.events.push(ParseEvent::Batch(batch));
                        }
                    }
                    _ => self.events.push(ParseEvent::Entity(entity)),
                }
            }
            Err(e) => self.skip(text, e.to_string()),
        }
    }

    fn skip(&mut self, text: String, reason: String) {
        self.skipped_count += 1;
        tracing::warn!(
            reason = %reason,
            record = %preview(&text),
            "Skipping malformed record"
        );
        self.events.push(ParseEvent::Skipped { reason, text });
    }
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(100) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Lazy, finite, non-restartable event sequence over a blocking reader
pub struct EntityReader<R> {
    reader: R,
    parser: StreamingParser,
    buffer: Vec<u8>,
    pending: VecDeque<ParseEvent>,
    done: bool,
}

impl EntityReader<File> {
    /// Open a file, reporting its size as `total_bytes`
    pub fn open(path: impl AsRef<Path>, mut config: StreamConfig) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        if config.total_bytes.is_none() {
            config.total_bytes = file.metadata().ok().map(|m| m.len());
        }
        Ok(Self::new(file, config))
    }
}

impl<R: Read> EntityReader<R> {
    pub fn new(reader: R, config: StreamConfig) -> Self {
        let chunk_size = config.chunk_size.max(1);
        Self {
            reader,
            parser: StreamingParser::new(config),
            buffer: vec![0; chunk_size],
            pending: VecDeque::new(),
            done: false,
        }
    }
}

impl<R: Read> Iterator for EntityReader<R> {
    type Item = Result<ParseEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.done {
                return None;
            }
            match self.reader.read(&mut self.buffer) {
                Ok(0) => {
                    self.done = true;
                    self.pending.extend(self.parser.finish());
                }
                Ok(n) => self.pending.extend(self.parser.feed(&self.buffer[..n])),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(Error::Io(e)));
                }
            }
        }
    }
}

/// Parse an async byte source as a stream of events.
///
/// Suspends at each chunk read; buffered data is processed synchronously.
pub fn parse_stream<R>(mut reader: R, config: StreamConfig) -> impl Stream<Item = Result<ParseEvent>>
where
    R: AsyncRead + Unpin,
{
    async_stream::try_stream! {
        let mut buffer = vec![0u8; config.chunk_size.max(1)];
        let mut parser = StreamingParser::new(config);
        loop {
            let n = reader.read(&mut buffer).await.map_err(Error::Io)?;
            if n == 0 {
                break;
            }
            for event in parser.feed(&buffer[..n]) {
                yield event;
            }
        }
        for event in parser.finish() {
            yield event;
        }
    }
}

/// Collected output of a full parse
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub entities: Vec<Entity>,
    pub skipped_count: usize,
    pub processed_bytes: u64,
}

impl ParsedFile {
    /// Fold one event into the collection; returns progress events for forwarding
    pub fn absorb(&mut self, event: ParseEvent) -> Option<ParseProgress> {
        match event {
            ParseEvent::Entity(entity) => self.entities.push(entity),
            ParseEvent::Batch(batch) => self.entities.extend(batch),
            ParseEvent::Skipped { .. } => {}
            ParseEvent::Progress(progress) => return Some(progress),
            ParseEvent::Completed {
                skipped_count,
                processed_bytes,
                ..
            } => {
                self.skipped_count = skipped_count;
                self.processed_bytes = processed_bytes;
            }
        }
        None
    }
}

/// Parse an in-memory buffer, feeding it in `chunk_size` pieces
pub fn parse_bytes(bytes: &[u8], config: StreamConfig) -> ParsedFile {
    let chunk_size = config.chunk_size.max(1);
    let mut parser = StreamingParser::new(config);
    let mut parsed = ParsedFile::default();
    for chunk in bytes.chunks(chunk_size) {
        for event in parser.feed(chunk) {
            parsed.absorb(event);
        }
    }
    for event in parser.finish() {
        parsed.absorb(event);
    }
    parsed
}
