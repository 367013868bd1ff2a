//! Status-line decoding.
//!
//! Every line from the debuggee starts with a three-digit status code.
//! Decoding is pure; deciding what a line means for the pending queue is
//! the dispatcher's job.

/// A decoded status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLine {
    /// `200 OK[ <text>|<len>]`; the remainder after `OK`, if any.
    Ok(Option<String>),
    /// `202 Paused <file> <line>`
    Paused { file: String, line: u32 },
    /// `203 Paused <file> <line> <watch index>`
    PausedAtWatch {
        file: String,
        line: u32,
        watch_index: u32,
    },
    /// `204 Output <stream> <len>`, followed by a body.
    Output { stream: String, len: usize },
    /// `400 Bad Request[ <detail>]`, holding only the detail.
    BadRequest(String),
    /// `401 Error in ... <len>`, followed by a body when `len` is present.
    Error { message: String, len: Option<usize> },
    /// Anything else, including malformed known codes.
    Unknown(String),
}

impl StatusLine {
    pub fn parse(line: &str) -> Self {
        let unknown = || StatusLine::Unknown(line.to_string());
        let Some(code) = line.get(..3) else {
            return unknown();
        };
        let rest = line[3..].trim();

        match code {
            "200" => {
                let rest = rest.strip_prefix("OK").unwrap_or(rest).trim();
                StatusLine::Ok((!rest.is_empty()).then(|| rest.to_string()))
            }
            "202" => match fields(rest, "Paused").as_slice() {
                [file, line] => match line.parse() {
                    Ok(line) => StatusLine::Paused {
                        file: file.to_string(),
                        line,
                    },
                    Err(_) => unknown(),
                },
                _ => unknown(),
            },
            "203" => match fields(rest, "Paused").as_slice() {
                [file, line, index] => match (line.parse(), index.parse()) {
                    (Ok(line), Ok(watch_index)) => StatusLine::PausedAtWatch {
                        file: file.to_string(),
                        line,
                        watch_index,
                    },
                    _ => unknown(),
                },
                _ => unknown(),
            },
            "204" => match fields(rest, "Output").as_slice() {
                [stream, len] => match len.parse() {
                    Ok(len) => StatusLine::Output {
                        stream: stream.to_string(),
                        len,
                    },
                    Err(_) => unknown(),
                },
                _ => unknown(),
            },
            "400" => {
                let detail = rest.strip_prefix("Bad Request").unwrap_or(rest);
                StatusLine::BadRequest(detail.trim_start_matches(':').trim().to_string())
            }
            "401" => {
                let (message, len) = match rest.rsplit_once(' ') {
                    Some((message, tail)) => match tail.parse() {
                        Ok(len) => (message.trim(), Some(len)),
                        Err(_) => (rest, None),
                    },
                    None => match rest.parse() {
                        Ok(len) => ("", Some(len)),
                        Err(_) => (rest, None),
                    },
                };
                StatusLine::Error {
                    message: message.to_string(),
                    len,
                }
            }
            _ => unknown(),
        }
    }
}

/// Whitespace-separated fields after an expected leading word.
fn fields<'a>(rest: &'a str, word: &str) -> Vec<&'a str> {
    let mut parts = rest.split_whitespace();
    match parts.next() {
        Some(first) if first == word => parts.collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_variants() {
        assert_eq!(StatusLine::parse("200 OK"), StatusLine::Ok(None));
        assert_eq!(StatusLine::parse("200 OK 2"), StatusLine::Ok(Some("2".into())));
        assert_eq!(
            StatusLine::parse("200 OK done here"),
            StatusLine::Ok(Some("done here".into()))
        );
    }

    #[test]
    fn paused() {
        assert_eq!(
            StatusLine::parse("202 Paused /main/game.lua 42"),
            StatusLine::Paused {
                file: "/main/game.lua".into(),
                line: 42
            }
        );
    }

    #[test]
    fn paused_at_watch() {
        assert_eq!(
            StatusLine::parse("203 Paused main/a.lua 7 2"),
            StatusLine::PausedAtWatch {
                file: "main/a.lua".into(),
                line: 7,
                watch_index: 2
            }
        );
    }

    #[test]
    fn malformed_pauses_are_unknown() {
        for line in [
            "202 Paused main.lua",
            "202 Paused main.lua x",
            "202 Paused a b 3",
            "203 Paused main.lua 7",
            "202 Running main.lua 1",
        ] {
            assert_eq!(StatusLine::parse(line), StatusLine::Unknown(line.into()), "{line}");
        }
    }

    #[test]
    fn output_header() {
        assert_eq!(
            StatusLine::parse("204 Output stdout 11"),
            StatusLine::Output {
                stream: "stdout".into(),
                len: 11
            }
        );
    }

    #[test]
    fn errors() {
        assert_eq!(
            StatusLine::parse("400 Bad Request"),
            StatusLine::BadRequest(String::new())
        );
        assert_eq!(
            StatusLine::parse("400 Bad Request: unknown command FOO"),
            StatusLine::BadRequest("unknown command FOO".into())
        );
        assert_eq!(
            StatusLine::parse("401 Error in Execution 27"),
            StatusLine::Error {
                message: "Error in Execution".into(),
                len: Some(27)
            }
        );
        assert_eq!(
            StatusLine::parse("401 Error in Expression"),
            StatusLine::Error {
                message: "Error in Expression".into(),
                len: None
            }
        );
    }

    #[test]
    fn short_and_non_ascii_lines_are_unknown() {
        assert_eq!(StatusLine::parse("20"), StatusLine::Unknown("20".into()));
        assert_eq!(StatusLine::parse("é2"), StatusLine::Unknown("é2".into()));
        assert_eq!(
            StatusLine::parse("hello"),
            StatusLine::Unknown("hello".into())
        );
    }
}
