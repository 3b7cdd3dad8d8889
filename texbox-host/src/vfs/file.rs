//! Open file variants

/// Direction a file was opened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

/// Pascal `erstat` value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Ok = 0,
    OpenFailed = 1,
}

/// Read state shared by every readable file: content plus two cursors
///
/// `position` advances with `get`, `line_position` with `inputln`.
#[derive(Debug, Default)]
pub struct ReadCursor {
    pub position: usize,
    pub line_position: usize,
    pub eof: bool,
    pub eoln: bool,
}

/// Terminal input
#[derive(Debug)]
pub struct ConsoleIn {
    pub content: Vec<u8>,
    pub cursor: ReadCursor,
}

/// A named file backed by a growable buffer
///
/// For files opened for writing the buffer is a capacity area: bytes past
/// `cursor.position` are zero fill and the logical length is the position.
#[derive(Debug)]
pub struct RegularFile {
    pub name: String,
    pub mode: OpenMode,
    pub status: FileStatus,
    pub buffer: Vec<u8>,
    pub cursor: ReadCursor,
}

/// An entry in the open-file table
#[derive(Debug)]
pub enum VirtualFile {
    ConsoleIn(ConsoleIn),
    ConsoleOut,
    Regular(RegularFile),
}

impl ConsoleIn {
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: content.into(),
            cursor: ReadCursor::default(),
        }
    }
}

impl RegularFile {
    /// A successfully opened file positioned at the start of `content`
    pub fn opened(name: impl Into<String>, mode: OpenMode, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mode,
            status: FileStatus::Ok,
            buffer: content,
            cursor: ReadCursor::default(),
        }
    }

    /// A file whose open failed; reads see end of file immediately
    pub fn failed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: OpenMode::Read,
            status: FileStatus::OpenFailed,
            buffer: Vec::new(),
            cursor: ReadCursor {
                eof: true,
                eoln: true,
                ..Default::default()
            },
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == FileStatus::Ok
    }

    /// Write at the cursor, doubling the buffer until the data fits
    pub fn write(&mut self, data: &[u8]) {
        let position = self.cursor.position;
        let mut capacity = self.buffer.len();
        while data.len() > capacity.saturating_sub(position) {
            capacity = 1 + capacity * 2;
        }
        if capacity > self.buffer.len() {
            self.buffer.resize(capacity, 0);
        }

        self.buffer[position..position + data.len()].copy_from_slice(data);
        self.cursor.position += data.len();
    }

    /// Copy up to `out.len()` bytes from the cursor; returns the count copied
    pub fn read_at_cursor(&self, out: &mut [u8]) -> usize {
        let start = self.cursor.position;
        if start >= self.buffer.len() {
            return 0;
        }
        let count = out.len().min(self.buffer.len() - start);
        out[..count].copy_from_slice(&self.buffer[start..start + count]);
        count
    }

    /// Bytes written so far
    pub fn written(&self) -> &[u8] {
        let end = self.cursor.position.min(self.buffer.len());
        &self.buffer[..end]
    }
}

impl VirtualFile {
    /// Short label for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            VirtualFile::ConsoleIn(_) => "console input",
            VirtualFile::ConsoleOut => "console output",
            VirtualFile::Regular(_) => "regular file",
        }
    }

    pub fn eof(&self) -> bool {
        match self {
            VirtualFile::ConsoleIn(file) => file.cursor.eof,
            VirtualFile::ConsoleOut => false,
            VirtualFile::Regular(file) => file.cursor.eof,
        }
    }

    pub fn eoln(&self) -> bool {
        match self {
            VirtualFile::ConsoleIn(file) => file.cursor.eoln,
            VirtualFile::ConsoleOut => false,
            VirtualFile::Regular(file) => file.cursor.eoln,
        }
    }

    pub fn status(&self) -> FileStatus {
        match self {
            VirtualFile::ConsoleIn(_) | VirtualFile::ConsoleOut => FileStatus::Ok,
            VirtualFile::Regular(file) => file.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_grows_geometrically() {
        let mut file = RegularFile::opened("out.dvi", OpenMode::Write, Vec::new());
        file.write(b"a");
        assert_eq!(file.buffer.len(), 1);
        file.write(b"bc");
        assert_eq!(file.buffer.len(), 3);
        file.write(b"d");
        assert_eq!(file.buffer.len(), 7);
        assert_eq!(file.written(), b"abcd");

        file.write(&[b'x'; 10]);
        assert_eq!(file.buffer.len(), 15);
        assert_eq!(file.written().len(), 14);
    }

    #[test]
    fn test_buffer_never_shrinks() {
        let mut file = RegularFile::opened("x", OpenMode::Write, vec![0; 32]);
        file.write(b"hi");
        assert_eq!(file.buffer.len(), 32);
        assert_eq!(file.written(), b"hi");
    }

    #[test]
    fn test_read_at_cursor() {
        let mut file = RegularFile::opened("x", OpenMode::Read, b"hello".to_vec());
        let mut out = [0u8; 3];
        assert_eq!(file.read_at_cursor(&mut out), 3);
        assert_eq!(&out, b"hel");

        file.cursor.position = 4;
        assert_eq!(file.read_at_cursor(&mut out), 1);
        file.cursor.position = 9;
        assert_eq!(file.read_at_cursor(&mut out), 0);
    }

    #[test]
    fn test_failed_file_flags() {
        let file = VirtualFile::Regular(RegularFile::failed("input.aux"));
        assert_eq!(file.status(), FileStatus::OpenFailed);
        assert!(file.eof());
    }
}
