//! Virtual filesystem with Pascal file semantics
//!
//! The engine was written against a Pascal runtime: files are opened with
//! `reset`/`rewrite`, read one unit at a time with `get`, read a line at a
//! time with `inputln`, and probed with `eof`/`eoln`/`erstat`. [`Vfs`] provides
//! those procedures over in-memory buffers.
//!
//! ```text
//!   guest handle ──► open-file table (Vec<VirtualFile>)
//!                         │
//!          ┌──────────────┼────────────────┐
//!          ▼              ▼                ▼
//!      ConsoleIn      ConsoleOut        Regular
//!   (terminal script) (Console lines)  (byte buffer)
//!                                          ▲
//!                                          │ open()
//!                        filesystem: name ─┘ ─► miss ─► Fetch / not found
//! ```
//!
//! Handles are indexes into the open-file table and are never reused within a
//! session. File identity is by name: re-opening a name always starts from the
//! filesystem content (or the latest written content), never from another
//! handle's cursor.

pub mod console;
pub mod file;
pub mod filename;

pub use console::Console;
pub use file::{ConsoleIn, FileStatus, OpenMode, ReadCursor, RegularFile, VirtualFile};
pub use filename::PascalName;

use crate::error::VfsError;
use crate::memory::{latin1, GuestMemory};
use crate::metrics::FontMetrics;
use std::collections::HashMap;
use std::sync::Arc;

/// Index into the open-file table
pub type Handle = i32;

/// Handle returned while the requested file is being fetched
pub const NOT_READY: Handle = -1;

/// Result of opening a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// The file is in the table at this handle (possibly with an error status)
    Opened(Handle),

    /// The file must be fetched before the open can complete
    Fetch(String),
}

/// Guest addresses for an `inputln` call
#[derive(Debug, Clone, Copy)]
pub struct LineRequest {
    /// Skip the terminator left by the previous line
    pub bypass_eoln: bool,

    /// Start of the guest line buffer
    pub buffer: usize,

    /// Address of the `first` index (u32)
    pub first: usize,

    /// Address of the `last` index (u32)
    pub last: usize,

    /// Size of the guest line buffer
    pub buf_size: usize,
}

/// Filesystem, open-file table and console of one session
pub struct Vfs {
    filesystem: HashMap<String, Vec<u8>>,
    files: Vec<VirtualFile>,
    console: Console,
    terminal_input: Vec<u8>,
    metrics: Arc<dyn FontMetrics>,
    finished: bool,
}

impl Vfs {
    pub fn new(terminal_input: impl Into<Vec<u8>>, metrics: Arc<dyn FontMetrics>, echo: bool) -> Self {
        Self {
            filesystem: HashMap::new(),
            files: Vec::new(),
            console: Console::new(echo),
            terminal_input: terminal_input.into(),
            metrics,
            finished: false,
        }
    }

    /// Place a file in the filesystem
    pub fn insert(&mut self, name: impl Into<String>, content: Vec<u8>) {
        self.filesystem.insert(name.into(), content);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filesystem.contains_key(name)
    }

    /// Number of entries in the open-file table
    pub fn open_count(&self) -> usize {
        self.files.len()
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut Console {
        &mut self.console
    }

    /// Whether the engine has reached its final end
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Flush the console and mark the run finished
    pub fn finish(&mut self) {
        self.console.flush();
        self.finished = true;
    }

    /// Content written to `name` in this session, up to its logical length
    pub fn read_back(&self, name: &str) -> Option<&[u8]> {
        self.files.iter().rev().find_map(|file| match file {
            VirtualFile::Regular(regular)
                if regular.name == name && regular.mode == OpenMode::Write && regular.is_open() =>
            {
                Some(regular.written())
            }
            _ => None,
        })
    }

    fn push(&mut self, file: VirtualFile) -> OpenOutcome {
        self.files.push(file);
        OpenOutcome::Opened((self.files.len() - 1) as Handle)
    }

    fn file(&self, handle: Handle) -> Result<&VirtualFile, VfsError> {
        usize::try_from(handle)
            .ok()
            .and_then(|index| self.files.get(index))
            .ok_or(VfsError::BadHandle(handle))
    }

    fn file_mut(&mut self, handle: Handle) -> Result<&mut VirtualFile, VfsError> {
        usize::try_from(handle)
            .ok()
            .and_then(|index| self.files.get_mut(index))
            .ok_or(VfsError::BadHandle(handle))
    }

    /// `reset`/`rewrite`: open a raw Pascal name buffer
    pub fn open_raw(&mut self, raw: &[u8], mode: OpenMode, resuming: bool) -> OpenOutcome {
        match filename::parse(raw) {
            PascalName::Terminal => match mode {
                OpenMode::Read => {
                    let input = ConsoleIn::new(self.terminal_input.clone());
                    self.push(VirtualFile::ConsoleIn(input))
                }
                OpenMode::Write => self.push(VirtualFile::ConsoleOut),
            },
            PascalName::File(name) => self.open(&name, mode, resuming),
        }
    }

    /// Open a file by name
    ///
    /// A read of a name that is neither present nor previously written asks
    /// for a fetch, unless the session is resuming from a fetch or the name is
    /// an engine scratch file; those report "not found" instead.
    pub fn open(&mut self, name: &str, mode: OpenMode, resuming: bool) -> OpenOutcome {
        if mode == OpenMode::Read && filename::is_font_metric(name) {
            let font = name.trim_end_matches(".tfm");
            if let Some(data) = self.metrics.metrics(font) {
                tracing::trace!(name, "Synthesized font metrics");
                return self.push(VirtualFile::Regular(RegularFile::opened(name, mode, data)));
            }
        }

        if let Some(content) = self.filesystem.get(name) {
            let file = RegularFile::opened(name, mode, content.clone());
            return self.push(VirtualFile::Regular(file));
        }

        if mode == OpenMode::Write {
            return self.push(VirtualFile::Regular(RegularFile::opened(name, mode, Vec::new())));
        }

        if let Some(content) = self.previous_contents(name) {
            return self.push(VirtualFile::Regular(RegularFile::opened(name, mode, content)));
        }

        if resuming || filename::is_scratch(name) {
            tracing::debug!(name, resuming, "File not found");
            return self.push(VirtualFile::Regular(RegularFile::failed(name)));
        }

        OpenOutcome::Fetch(name.to_string())
    }

    fn previous_contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files.iter().rev().find_map(|file| match file {
            VirtualFile::Regular(regular) if regular.name == name && regular.is_open() => {
                Some(match regular.mode {
                    OpenMode::Write => regular.written().to_vec(),
                    OpenMode::Read => regular.buffer.clone(),
                })
            }
            _ => None,
        })
    }

    /// `close`: content stays in the table for read-back
    pub fn close(&mut self, handle: Handle) -> Result<(), VfsError> {
        self.file(handle).map(|_| ())
    }

    pub fn eof(&self, handle: Handle) -> Result<bool, VfsError> {
        Ok(self.file(handle)?.eof())
    }

    pub fn eoln(&self, handle: Handle) -> Result<bool, VfsError> {
        Ok(self.file(handle)?.eoln())
    }

    pub fn erstat(&self, handle: Handle) -> Result<i32, VfsError> {
        Ok(self.file(handle)?.status() as i32)
    }

    /// `get`: read `len` bytes at the cursor into guest memory at `ptr`
    pub fn get(
        &mut self,
        handle: Handle,
        memory: &mut GuestMemory<'_>,
        ptr: usize,
        len: usize,
    ) -> Result<(), VfsError> {
        let mut terminal_exhausted = false;

        let (cursor, byte) = match self.file_mut(handle)? {
            VirtualFile::ConsoleIn(ConsoleIn { content, cursor }) => {
                let byte = match content.get(cursor.position) {
                    Some(&byte) => byte,
                    None => {
                        cursor.eof = true;
                        terminal_exhausted = true;
                        b'\r'
                    }
                };
                memory.write_u8(ptr, byte)?;
                (cursor, byte)
            }
            VirtualFile::Regular(regular) => {
                if !regular.is_open() {
                    regular.cursor.eof = true;
                    regular.cursor.eoln = true;
                    return Ok(());
                }
                let count = regular.read_at_cursor(memory.slice_mut(ptr, len)?);
                if count == 0 {
                    memory.write_u8(ptr, 0)?;
                    regular.cursor.eof = true;
                    regular.cursor.eoln = true;
                    return Ok(());
                }
                (&mut regular.cursor, memory.read_u8(ptr)?)
            }
            VirtualFile::ConsoleOut => {
                return Err(VfsError::WrongDirection {
                    operation: "get",
                    file: "console output",
                })
            }
        };

        cursor.eoln = byte == b'\n' || byte == b'\r';
        cursor.position += len;

        if terminal_exhausted {
            self.finish();
        }
        Ok(())
    }

    /// `put`: write `len` bytes from guest memory at `ptr` at the cursor
    pub fn put(
        &mut self,
        handle: Handle,
        memory: &GuestMemory<'_>,
        ptr: usize,
        len: usize,
    ) -> Result<(), VfsError> {
        let data = memory.read(ptr, len)?;
        self.write_bytes(handle, data)
    }

    /// Print family: append to a file or to the console
    ///
    /// A negative handle addresses the console.
    pub fn write_bytes(&mut self, handle: Handle, data: &[u8]) -> Result<(), VfsError> {
        if handle < 0 {
            self.console.write(&latin1(data));
            return Ok(());
        }

        match self.file_mut(handle)? {
            VirtualFile::ConsoleOut => {
                self.console.write(&latin1(data));
                Ok(())
            }
            VirtualFile::Regular(regular) => {
                regular.write(data);
                Ok(())
            }
            VirtualFile::ConsoleIn(_) => Err(VfsError::WrongDirection {
                operation: "write",
                file: "console input",
            }),
        }
    }

    /// `inputln`: copy the next line into the guest buffer
    ///
    /// Sets `last` past the line with trailing blanks removed. Returns false
    /// at end of content; at the end of the terminal script this also
    /// finishes the run.
    pub fn input_line(
        &mut self,
        handle: Handle,
        memory: &mut GuestMemory<'_>,
        request: LineRequest,
    ) -> Result<bool, VfsError> {
        let (content, cursor, is_terminal) = match self.file_mut(handle)? {
            VirtualFile::ConsoleIn(ConsoleIn { content, cursor }) => (&content[..], cursor, true),
            VirtualFile::Regular(RegularFile { buffer, cursor, .. }) => (&buffer[..], cursor, false),
            VirtualFile::ConsoleOut => {
                return Err(VfsError::WrongDirection {
                    operation: "inputln",
                    file: "console output",
                })
            }
        };

        let first = memory.read_u32(request.first)? as usize;
        memory.write_u32(request.last, first as u32)?;

        if request.bypass_eoln && !cursor.eof && cursor.eoln {
            cursor.line_position += 1;
        }

        if cursor.line_position >= content.len() {
            cursor.eof = true;
            if is_terminal {
                self.finish();
            }
            return Ok(false);
        }

        let start = cursor.line_position;
        let end = content[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(content.len(), |i| start + i);
        let line = &content[start..end];

        if first + line.len() > request.buf_size {
            return Err(VfsError::LineOverflow {
                line: line.len(),
                capacity: request.buf_size.saturating_sub(first),
            });
        }
        memory.write(request.buffer + first, line)?;

        let trimmed = line.len() - line.iter().rev().take_while(|&&b| b == b' ').count();
        memory.write_u32(request.last, (first + trimmed) as u32)?;

        cursor.line_position = end;
        cursor.eoln = true;
        Ok(true)
    }
}
