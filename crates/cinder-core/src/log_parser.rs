//! Extraction of failed tests from raw build output.
//!
//! Recognises the Test::Unit console layout:
//!
//! ```text
//!   1) Error:
//! test_connect(ClientTest):
//! RuntimeError: connection refused
//!     ./test/client_test.rb:12:in `test_connect'
//!
//!   2) Failure:
//! test_parse(ParserTest) [./test/parser_test.rb:40]:
//! <"a"> expected but was
//! <"b">.
//!
//! ```
//!
//! Parsing is lossy: blocks that do not have the expected shape are skipped,
//! never reported as errors.

use regex::Regex;
use std::sync::LazyLock;

use crate::build::{TestErrorEntry, TestErrorKind};

// Numbered "Error:" header, locator line ending in ':', message line, then
// zero or more non-blank detail lines. A blank line or end of output ends
// the block.
static ERROR_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*\d+\) Error:\n(.+):\n(.+)(?:\n|\z)((?:[ \t]*\S.*(?:\n|\z))*)").unwrap()
});

// Numbered "Failure:" header, "name [location]:" line, then the non-blank
// lines of the assertion message.
static FAILURE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*\d+\) Failure:\n(.+?) \[(.+)\]:(?:\n|\z)((?:[ \t]*\S.*(?:\n|\z))*)")
        .unwrap()
});

/// Parse build output into failed-test entries, in the order they appear.
pub fn parse(raw_output: &str) -> Vec<TestErrorEntry> {
    let text = raw_output.replace("\r\n", "\n");
    let mut found: Vec<(usize, TestErrorEntry)> = Vec::new();

    for caps in ERROR_BLOCK.captures_iter(&text) {
        let (Some(whole), Some(name), Some(message)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        found.push((
            whole.start(),
            TestErrorEntry {
                kind: TestErrorKind::Error,
                test_name: name.as_str().trim().to_string(),
                message: message.as_str().trim().to_string(),
                stacktrace: caps
                    .get(3)
                    .map(|m| m.as_str().trim_end().to_string())
                    .unwrap_or_default(),
            },
        ));
    }

    for caps in FAILURE_BLOCK.captures_iter(&text) {
        let (Some(whole), Some(name), Some(location)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        found.push((
            whole.start(),
            TestErrorEntry {
                kind: TestErrorKind::Failure,
                test_name: name.as_str().trim().to_string(),
                message: caps
                    .get(3)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default(),
                stacktrace: location.as_str().trim().to_string(),
            },
        ));
    }

    found.sort_by_key(|(offset, _)| *offset);
    found.into_iter().map(|(_, entry)| entry).collect()
}
