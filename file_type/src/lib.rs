//! Classifies byte content as binary or text, and identifies/normalizes line
//! endings. Used by the object store to decide whether a blob is eligible
//! for compression, and by the merge engine to canonicalize files to LF
//! before running diff3 and restore the original ending afterwards.

use std::io::{self, Read};

/// Only the first this-many bytes of a file are sampled for classification;
/// matches the object store's compression-eligibility check and avoids
/// reading huge binary blobs in full just to find a NUL byte.
pub const SAMPLE_BYTES: usize = 8192;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum LineEnding {
    Lf,
    Crlf,
    Mixed,
    /// No line breaks at all (e.g. empty file, or a single line with none).
    None,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct FileTypeInfo {
    pub binary: bool,
    pub line_ending: LineEnding,
}

impl FileTypeInfo {
    pub fn is_text(&self) -> bool {
        !self.binary
    }
}

/// Binary iff the sample contains a NUL byte, or the sample does not decode
/// as UTF-8. Line-ending detection only matters for non-binary content.
pub fn classify(sample: &[u8]) -> FileTypeInfo {
    let sample = &sample[..sample.len().min(SAMPLE_BYTES)];
    if sample.contains(&0) || std::str::from_utf8(sample).is_err() {
        return FileTypeInfo {
            binary: true,
            line_ending: LineEnding::None,
        };
    }
    FileTypeInfo {
        binary: false,
        line_ending: detect_line_ending(sample),
    }
}

fn detect_line_ending(sample: &[u8]) -> LineEnding {
    let mut lf = 0usize;
    let mut crlf = 0usize;
    let mut i = 0;
    while i < sample.len() {
        if sample[i] == b'\n' {
            if i > 0 && sample[i - 1] == b'\r' {
                crlf += 1;
            } else {
                lf += 1;
            }
        }
        i += 1;
    }
    match (lf, crlf) {
        (0, 0) => LineEnding::None,
        (_, 0) => LineEnding::Lf,
        (0, _) => LineEnding::Crlf,
        _ => LineEnding::Mixed,
    }
}

/// The merged type for a three-way comparison. Binary dominates: if any side
/// is binary the result is binary, which forces the merge engine onto the
/// binary-conflict path. Otherwise the dominant line ending wins a majority
/// vote; ties (including a two-way tie with `None`) favor LF.
pub fn resolve_three_way(o: FileTypeInfo, a: FileTypeInfo, b: FileTypeInfo) -> FileTypeInfo {
    if o.binary || a.binary || b.binary {
        return FileTypeInfo {
            binary: true,
            line_ending: LineEnding::None,
        };
    }
    let endings = [o.line_ending, a.line_ending, b.line_ending];
    let count = |e: LineEnding| endings.iter().filter(|&&x| x == e).count();
    let lf = count(LineEnding::Lf);
    let crlf = count(LineEnding::Crlf);
    let line_ending = if lf >= crlf {
        if lf == 0 && crlf == 0 {
            LineEnding::None
        } else {
            LineEnding::Lf
        }
    } else {
        LineEnding::Crlf
    };
    FileTypeInfo {
        binary: false,
        line_ending,
    }
}

/// Wraps a reader, rewriting CRLF to LF as bytes pass through. Binary
/// content should never be wrapped in this; callers check `classify` first.
pub struct CanonicalizingReader<R> {
    inner: R,
    pending_cr: bool,
}

impl<R: Read> CanonicalizingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending_cr: false,
        }
    }
}

impl<R: Read> Read for CanonicalizingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut raw = vec![0u8; buf.len()];
        let n = self.inner.read(&mut raw)?;
        let mut out = Vec::with_capacity(n);
        for &byte in &raw[..n] {
            if self.pending_cr {
                self.pending_cr = false;
                if byte != b'\n' {
                    out.push(b'\r');
                }
            }
            if byte == b'\r' {
                self.pending_cr = true;
            } else {
                out.push(byte);
            }
        }
        let written = out.len().min(buf.len());
        buf[..written].copy_from_slice(&out[..written]);
        Ok(written)
    }
}

/// Wraps a reader of canonical-LF text, rewriting to the requested ending on
/// the way out. Used for merge output so the working copy gets back the
/// ending the majority of the three sides used.
pub struct TypeReader<R> {
    inner: R,
    target: LineEnding,
}

impl<R: Read> TypeReader<R> {
    pub fn new(inner: R, target: LineEnding) -> Self {
        Self { inner, target }
    }
}

impl<R: Read> Read for TypeReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !matches!(self.target, LineEnding::Crlf) {
            return self.inner.read(buf);
        }
        let mut raw = vec![0u8; buf.len() / 2 + 1];
        let n = self.inner.read(&mut raw)?;
        let mut out = Vec::with_capacity(n * 2);
        for &byte in &raw[..n] {
            if byte == b'\n' {
                out.push(b'\r');
            }
            out.push(byte);
        }
        let written = out.len().min(buf.len());
        buf[..written].copy_from_slice(&out[..written]);
        Ok(written)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn detects_binary_from_nul_byte() {
        let info = classify(b"hello\0world");
        assert!(info.binary);
    }

    #[test]
    fn detects_lf() {
        let info = classify(b"a\nb\nc\n");
        assert!(!info.binary);
        assert_eq!(info.line_ending, LineEnding::Lf);
    }

    #[test]
    fn detects_crlf() {
        let info = classify(b"a\r\nb\r\n");
        assert_eq!(info.line_ending, LineEnding::Crlf);
    }

    #[test]
    fn detects_mixed() {
        let info = classify(b"a\r\nb\n");
        assert_eq!(info.line_ending, LineEnding::Mixed);
    }

    #[test]
    fn no_line_breaks_is_none() {
        let info = classify(b"no newlines here");
        assert_eq!(info.line_ending, LineEnding::None);
    }

    #[test]
    fn three_way_binary_dominates() {
        let text = classify(b"a\n");
        let binary = classify(b"a\0b");
        let merged = resolve_three_way(text, text, binary);
        assert!(merged.binary);
    }

    #[test]
    fn three_way_majority_wins_tie_favors_lf() {
        let lf = classify(b"a\n");
        let crlf = classify(b"a\r\n");
        let merged = resolve_three_way(lf, crlf, classify(b"no newline"));
        assert_eq!(merged.line_ending, LineEnding::Lf);
    }

    #[test]
    fn canonicalizing_reader_rewrites_crlf_to_lf() {
        let mut reader = CanonicalizingReader::new(&b"a\r\nb\r\n"[..]);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"a\nb\n");
    }

    #[test]
    fn type_reader_restores_crlf() {
        let mut reader = TypeReader::new(&b"a\nb\n"[..], LineEnding::Crlf);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"a\r\nb\r\n");
    }
}
