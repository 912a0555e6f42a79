//! File-system stages: reading lines, globbing paths and writing tokens out.
//!
//! Readers own their open file inside the running step, so the file is closed
//! when the chain is closed, not when the reader happens to be dropped.

use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{StreamConfig, TextEncoding};
use crate::connector::Connector;
use crate::error::{PipelineError, Result};
use crate::pipe::TerminatorCall;
use crate::stage::{Input, StageDescriptor, Step, wrap, wrap_terminator};

const READ: StageDescriptor = StageDescriptor::composable("read", &["fname", "config"]);
const READ_EACH: StageDescriptor = StageDescriptor::composable("read_each", &["config"]);
const FIND: StageDescriptor = StageDescriptor::composable("find", &["pattern"]);
const WRITE: StageDescriptor = StageDescriptor::terminator("write", &["target"]);

/// Line reader over one open file.
struct LineReader {
    path: PathBuf,
    reader: BufReader<File>,
    encoding: TextEncoding,
    line: usize,
    buf: Vec<u8>,
}

impl LineReader {
    fn open(path: PathBuf, config: &StreamConfig) -> Result<Self> {
        let file = File::open(&path).map_err(|source| PipelineError::Open {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "opened file");
        // A zero-capacity BufReader reports EOF on the first fill.
        Ok(Self {
            reader: BufReader::with_capacity(config.buffer_capacity.max(1), file),
            path,
            encoding: config.encoding,
            line: 0,
            buf: Vec::new(),
        })
    }

    /// Next line with its terminator (`\n` or `\r\n`) removed.
    fn next_line(&mut self) -> Option<Result<String>> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => return None,
            Ok(_) => {}
            Err(err) => return Some(Err(err.into())),
        }
        self.line += 1;
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        Some(
            self.encoding
                .decode(&self.buf)
                .ok_or_else(|| PipelineError::Decode {
                    path: self.path.clone(),
                    line: self.line,
                    encoding: self.encoding.name(),
                }),
        )
    }
}

struct ReadStep {
    reader: Option<LineReader>,
}

impl Step<()> for ReadStep {
    type Output = String;

    fn step(&mut self, _input: &mut Input<'_, ()>) -> Option<Result<String>> {
        let line = self.reader.as_mut()?.next_line();
        if line.is_none() {
            self.reader = None;
        }
        line
    }

    fn release(&mut self) -> Result<()> {
        if let Some(reader) = self.reader.take() {
            debug!(path = %reader.path.display(), "closed file");
        }
        Ok(())
    }
}

/// Lines of the file at `path`, decoded as UTF-8.
pub fn read(path: impl AsRef<Path>) -> Connector<(), String> {
    read_with(path, &StreamConfig::default())
}

/// Lines of the file at `path`, decoded per `config`. The file is opened on
/// the first pull.
pub fn read_with(path: impl AsRef<Path>, config: &StreamConfig) -> Connector<(), String> {
    wrap(READ, |(path, config): (PathBuf, StreamConfig)| {
        Ok(ReadStep {
            reader: Some(LineReader::open(path, &config)?),
        })
    })
    .call((path.as_ref().to_path_buf(), config.clone()))
}

struct ReadEachStep {
    config: StreamConfig,
    current: Option<LineReader>,
}

impl<P: AsRef<Path>> Step<P> for ReadEachStep {
    type Output = String;

    fn step(&mut self, input: &mut Input<'_, P>) -> Option<Result<String>> {
        loop {
            if let Some(reader) = self.current.as_mut() {
                match reader.next_line() {
                    Some(line) => return Some(line),
                    None => self.current = None,
                }
            }
            let path = match input.pull()? {
                Ok(path) => path.as_ref().to_path_buf(),
                Err(err) => return Some(Err(err)),
            };
            match LineReader::open(path, &self.config) {
                Ok(reader) => self.current = Some(reader),
                Err(err) => return Some(Err(err)),
            }
        }
    }

    fn release(&mut self) -> Result<()> {
        self.current = None;
        Ok(())
    }
}

/// Treat each upstream token as a path and emit the lines of each file in turn.
pub fn read_each<P: AsRef<Path> + 'static>() -> Connector<P, String> {
    read_each_with(&StreamConfig::default())
}

/// [`read_each`] with an explicit configuration.
pub fn read_each_with<P: AsRef<Path> + 'static>(config: &StreamConfig) -> Connector<P, String> {
    wrap(READ_EACH, |config: StreamConfig| {
        Ok(ReadEachStep {
            config,
            current: None,
        })
    })
    .call(config.clone())
}

struct FindStep {
    paths: glob::Paths,
}

impl Step<()> for FindStep {
    type Output = String;

    fn step(&mut self, _input: &mut Input<'_, ()>) -> Option<Result<String>> {
        let path = self.paths.next()?;
        Some(
            path.map(|path| path.to_string_lossy().into_owned())
                .map_err(PipelineError::from),
        )
    }
}

/// Paths matching a shell glob such as `src/**/*.rs`, yielded as the walk
/// finds them.
pub fn find(pattern: &str) -> Connector<(), String> {
    wrap(FIND, |pattern: String| {
        Ok(FindStep {
            paths: glob::glob(&pattern)?,
        })
    })
    .call(pattern.to_string())
}

/// Where [`write`] sends its lines.
pub enum WriteTarget<'a> {
    Stdout,
    /// Create or truncate the file (`>`).
    Truncate(PathBuf),
    /// Create the file or append to it (`>>`).
    Append(PathBuf),
    /// A caller-owned writer; flushed but never closed.
    Writer(&'a mut dyn Write),
}

impl WriteTarget<'_> {
    pub fn truncate(path: impl AsRef<Path>) -> Self {
        WriteTarget::Truncate(path.as_ref().to_path_buf())
    }

    pub fn append(path: impl AsRef<Path>) -> Self {
        WriteTarget::Append(path.as_ref().to_path_buf())
    }
}

fn write_lines<W, T>(out: &mut W, tokens: &mut Input<'_, T>) -> Result<()>
where
    W: Write + ?Sized,
    T: Display,
{
    for token in tokens {
        let line = token?.to_string();
        out.write_all(line.as_bytes())?;
        if !line.ends_with('\n') {
            out.write_all(b"\n")?;
        }
    }
    out.flush()?;
    Ok(())
}

fn open_for_write(path: &Path, append: bool) -> Result<BufWriter<File>> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .map_err(|source| PipelineError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(BufWriter::new(file))
}

fn write_body<T: Display>(target: WriteTarget<'_>, tokens: &mut Input<'_, T>) -> Result<()> {
    match target {
        WriteTarget::Stdout => write_lines(&mut io::stdout().lock(), tokens),
        WriteTarget::Truncate(path) => write_lines(&mut open_for_write(&path, false)?, tokens),
        WriteTarget::Append(path) => write_lines(&mut open_for_write(&path, true)?, tokens),
        WriteTarget::Writer(writer) => write_lines(writer, tokens),
    }
}

/// Write every token as one line, adding a newline where a token lacks one.
pub fn write<'a, T: Display + 'a>(target: WriteTarget<'a>) -> TerminatorCall<'a, T, ()> {
    wrap_terminator(WRITE, write_body::<T>).call(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::Pipe;
    use crate::stages::{aslist, count, first, matches};
    use crate::stream::source;
    use std::fs;
    use tempfile::TempDir;

    fn fixture(dir: &TempDir, name: &str, text: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_read_strips_newlines() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "a.txt", "one\r\ntwo\nthree");
        let lines = read(&path).pipe(aslist()).unwrap();
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_read_with_zero_buffer_still_reads() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "a.txt", "one\ntwo\n");
        let config = StreamConfig {
            buffer_capacity: 0,
            ..StreamConfig::default()
        };
        let lines = read_with(&path, &config).pipe(aslist()).unwrap();
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[test]
    fn test_read_is_lazy_about_missing_files() {
        let connector = read("/definitely/not/here.txt");
        let err = connector.pipe(count()).unwrap_err();
        assert!(matches!(err, PipelineError::Open { .. }));
    }

    #[test]
    fn test_read_decode_error_names_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.txt");
        fs::write(&path, b"fine\n\xff\xfe\n").unwrap();
        let err = read(&path).pipe(aslist()).unwrap_err();
        assert!(matches!(err, PipelineError::Decode { line: 2, .. }), "got: {err}");

        let config = StreamConfig::default().with_encoding(TextEncoding::Latin1);
        let lines = read_with(&path, &config).pipe(aslist()).unwrap();
        assert_eq!(lines[1], "\u{ff}\u{fe}");
    }

    #[test]
    fn test_read_then_first_closes_file() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "a.txt", "x\nmatch me\ny\n");
        let found = read(&path)
            .pipe(matches("match"))
            .unwrap()
            .pipe(first())
            .unwrap();
        assert_eq!(found.as_deref(), Some("match me"));
    }

    #[test]
    fn test_read_each_concatenates() {
        let dir = TempDir::new().unwrap();
        let a = fixture(&dir, "a.txt", "1\n2\n");
        let b = fixture(&dir, "b.txt", "3\n");
        let lines = source(vec![a, b])
            .pipe(read_each())
            .unwrap()
            .pipe(aslist())
            .unwrap();
        assert_eq!(lines, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_find_yields_matches() {
        let dir = TempDir::new().unwrap();
        fixture(&dir, "a.log", "");
        fixture(&dir, "b.log", "");
        fixture(&dir, "c.txt", "");
        let pattern = format!("{}/*.log", dir.path().display());
        let mut found = find(&pattern).pipe(aslist()).unwrap();
        found.sort();
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("a.log"));
    }

    #[test]
    fn test_find_rejects_bad_glob() {
        let err = find("[").pipe(count()).unwrap_err();
        assert!(matches!(err, PipelineError::Glob(_)));
    }

    #[test]
    fn test_redirect_truncates_and_append_extends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        source(vec!["a", "b", "c"]).redirect(&path).unwrap();
        source(vec!["d", "e"]).redirect(&path).unwrap();
        assert_eq!(read(&path).pipe(count()).unwrap(), 2);

        source(vec!["f", "g", "h"]).append(&path).unwrap();
        assert_eq!(read(&path).pipe(count()).unwrap(), 5);
        assert_eq!(fs::read_to_string(&path).unwrap(), "d\ne\nf\ng\nh\n");
    }

    #[test]
    fn test_write_to_writer() {
        let mut out = Vec::new();
        source(vec![1, 2]).pipe(write(WriteTarget::Writer(&mut out))).unwrap();
        assert_eq!(out, b"1\n2\n");
    }
}
