use smol_str::SmolStr;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

/// Interned strings referenced by index from `STRINGR` tokens.
///
/// Index 0 is reserved and never valid in a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StringTable {
    entries: Vec<SmolStr>,
}

impl Default for StringTable {
    fn default() -> Self {
        Self {
            entries: vec![SmolStr::default()],
        }
    }
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from entries 1, 2, ... in order.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        let mut table = Self::default();
        table.entries.extend(lines.into_iter().map(Into::into));
        table
    }

    /// Read one entry per line. Trailing CR/LF is stripped.
    pub fn load<R: Read>(reader: R) -> io::Result<Self> {
        let mut table = Self::default();
        for line in BufReader::new(reader).lines() {
            let line = line?;
            table.entries.push(SmolStr::new(line.trim_end_matches(['\r', '\n'])));
        }
        Ok(table)
    }

    pub fn load_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let table = Self::load(std::fs::File::open(path.as_ref())?)?;
        tracing::debug!(path = %path.as_ref().display(), entries = table.len(), "loaded string table");
        Ok(table)
    }

    /// Entry at a stream index. Index 0 and anything past the end is `None`.
    pub fn get(&self, index: usize) -> Option<&SmolStr> {
        if index == 0 {
            return None;
        }
        self.entries.get(index)
    }

    /// Table size including the reserved slot.
    #[inline]
    pub fn slots(&self) -> usize {
        self.entries.len()
    }

    /// Number of usable entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len() - 1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
