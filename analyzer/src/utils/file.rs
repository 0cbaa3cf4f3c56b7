//! Trace file access

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Expand `~`, `~/path` and relative paths to an absolute path.
///
/// ```text
/// expand_path("~/.ctrlscope")   // -> /home/user/.ctrlscope
/// expand_path("logs/comm.log")  // -> /current/dir/logs/comm.log
/// expand_path("/var/log/x.log") // -> /var/log/x.log
/// ```
pub fn expand_path(path: &str) -> PathBuf {
    let path = path.trim();

    if path.is_empty() {
        return std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    }

    let expanded = if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(path))
    } else if let Some(rest) = path.strip_prefix("~/") {
        match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        }
    } else {
        PathBuf::from(path)
    };

    if expanded.is_relative() {
        std::env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    } else {
        expanded
    }
}

/// Open a trace file for buffered line reading.
pub fn open_trace(path: &Path) -> io::Result<BufReader<File>> {
    let file = File::open(path)?;
    tracing::debug!(path = %path.display(), "Opened trace file");
    Ok(BufReader::new(file))
}

/// Lines of a trace, decoded lossily.
///
/// Controller logs are not guaranteed to be UTF-8; invalid sequences are
/// replaced instead of failing the read. Trailing `\r\n` / `\n` is stripped.
pub struct TraceLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> Iterator for TraceLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
                    self.buf.pop();
                }
                Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

pub fn trace_lines<R: BufRead>(reader: R) -> TraceLines<R> {
    TraceLines {
        reader,
        buf: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn test_expand_path_absolute_unix() {
        assert_eq!(
            expand_path("/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }

    #[test]
    fn test_expand_path_relative() {
        let result = expand_path("logs/comm.log");
        assert!(result.is_absolute());
        assert!(result.ends_with("logs/comm.log"));
    }

    #[test]
    fn test_expand_path_tilde() {
        let result = expand_path("~/.ctrlscope");
        assert!(!result.to_string_lossy().contains('~'));
        assert!(result.ends_with(".ctrlscope"));
    }

    #[test]
    fn test_expand_path_trims_whitespace() {
        assert_eq!(expand_path("  /path/to/x  "), PathBuf::from("/path/to/x"));
    }

    #[test]
    fn test_trace_lines_strip_line_endings() {
        let input = Cursor::new(b"a\r\nb\n\nc".to_vec());
        let lines: Vec<String> = trace_lines(input).map(|l| l.unwrap()).collect();
        assert_eq!(lines, vec!["a", "b", "", "c"]);
    }

    #[test]
    fn test_trace_lines_invalid_utf8_is_lossy() {
        let input = Cursor::new(vec![b'o', b'k', 0xff, b'\n', b'x']);
        let lines: Vec<String> = trace_lines(input).map(|l| l.unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("ok"));
        assert_eq!(lines[1], "x");
    }

    #[test]
    fn test_open_trace_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "10:00:00.000 Snd: 05").unwrap();
        let reader = open_trace(file.path()).unwrap();
        assert_eq!(trace_lines(reader).count(), 1);
    }

    #[test]
    fn test_open_trace_missing_file() {
        assert!(open_trace(Path::new("/nonexistent/trace.log")).is_err());
    }
}
