//! Newline framing for received byte streams

/// Accumulates received bytes and splits them into lines.
///
/// Lines end at `\n`; a trailing `\r` is stripped and empty lines are
/// skipped. Bytes that are not valid UTF-8 are replaced rather than
/// rejected, since boards routinely emit garbage while resetting.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    /// Create an empty framer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes and return every line they complete
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(data);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.is_empty() {
                lines.push(String::from_utf8_lossy(&line).into_owned());
            }
        }
        lines
    }

    /// Bytes received since the last complete line
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_crlf_lines() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b"ok\r\nready\r\n"), vec!["ok", "ready"]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_keeps_partial_line_until_terminated() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"dist").is_empty());
        assert_eq!(framer.pending(), b"dist");
        assert_eq!(framer.push(b"ance 12\n"), vec!["distance 12"]);
    }

    #[test]
    fn test_skips_empty_lines() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b"\r\n\na\n"), vec!["a"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut framer = LineFramer::new();
        let lines = framer.push(&[0xff, b'o', b'k', b'\n']);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("ok"));
    }

    proptest::proptest! {
        #[test]
        fn prop_chunking_does_not_change_lines(
            data in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..256),
            cut in 0usize..256,
        ) {
            let cut = cut.min(data.len());

            let mut whole = LineFramer::new();
            let expected = whole.push(&data);

            let mut split = LineFramer::new();
            let mut lines = split.push(&data[..cut]);
            lines.extend(split.push(&data[cut..]));

            proptest::prop_assert_eq!(lines, expected);
            proptest::prop_assert_eq!(split.pending(), whole.pending());
        }
    }
}
