//! Text query protocol.
//!
//! One command per datagram, plain-text replies. Parsing and reply formatting are
//! pure; the socket loop in [`super::udp`] only moves bytes.

use crate::sampler::IntervalSnapshot;

/// Largest datagram sent or received.
pub const MAX_DATAGRAM: usize = 1500;

/// History values printed per row.
pub const HISTORY_ROW_LEN: usize = 10;

/// Reply to `help` and `?`.
pub const HELP_TEXT: &str = "\
Accepted command examples:
count -- get the total number of samples taken.
length -- get the number of samples taken in the previously completed second.
dips -- get the number of dips in the previously completed second.
history -- get all the samples in the previously completed second.
stop -- cause the server program to end.
<enter> -- repeat last command.
";

/// Reply to `stop`.
pub const STOP_REPLY: &str = "Program terminating.\n";

/// A parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `help` or `?`
    Help,
    /// `count`
    Count,
    /// `length`
    Length,
    /// `dips`
    Dips,
    /// `history`
    History,
    /// `stop`
    Stop,
    /// Anything else, including an empty line with nothing to repeat.
    Unknown(String),
}

impl Command {
    /// Parse one request line. Matching is exact and case-sensitive.
    pub fn parse(line: &str) -> Self {
        match line {
            "help" | "?" => Self::Help,
            "count" => Self::Count,
            "length" => Self::Length,
            "dips" => Self::Dips,
            "history" => Self::History,
            "stop" => Self::Stop,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Decode a datagram into a request line: lossy UTF-8, cut at the first line break.
pub fn request_line(datagram: &[u8]) -> String {
    let text = String::from_utf8_lossy(datagram);
    let end = text.find(|c: char| c == '\r' || c == '\n').unwrap_or(text.len());
    text[..end].to_string()
}

/// At most `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// `count` reply.
pub fn count_reply(total: u64) -> String {
    format!("# samples taken total: {total}\n")
}

/// `length` reply.
pub fn length_reply(snapshot: &IntervalSnapshot) -> String {
    format!("# samples taken last second: {}\n", snapshot.len())
}

/// `dips` reply.
pub fn dips_reply(snapshot: &IntervalSnapshot) -> String {
    format!("# Dips: {}\n", snapshot.dip_count)
}

/// Reply to an unrecognised command, echoing at most `max_echo_len` characters.
pub fn unknown_reply(text: &str, max_echo_len: usize) -> String {
    format!("Unknown command: {}\n", truncate_chars(text, max_echo_len))
}

/// `history` reply, split into datagrams of at most `max_datagram` bytes.
///
/// Values are `%.3f`, separated by `", "`, with a line break after every
/// [`HISTORY_ROW_LEN`] values. Datagrams break only between rows. An empty interval
/// yields a single empty line.
pub fn history_datagrams(samples: &[f64], max_datagram: usize) -> Vec<String> {
    if samples.is_empty() {
        return vec!["\n".to_string()];
    }

    let rows = samples.chunks(HISTORY_ROW_LEN).count();
    let mut datagrams = Vec::new();
    let mut current = String::new();

    for (row_index, row) in samples.chunks(HISTORY_ROW_LEN).enumerate() {
        let mut line = row
            .iter()
            .map(|v| format!("{v:.3}"))
            .collect::<Vec<_>>()
            .join(", ");
        if row_index + 1 < rows {
            line.push(',');
        }
        line.push('\n');

        if !current.is_empty() && current.len() + line.len() > max_datagram {
            datagrams.push(std::mem::take(&mut current));
        }
        current.push_str(&line);
    }
    datagrams.push(current);
    datagrams
}
