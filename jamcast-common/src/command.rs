//! Control channel vocabulary
//!
//! Commands travel as ASCII tokens, one or more per newline-terminated line.
//! Tokens are case-insensitive. Clients send `play`, `pause` (alias `stop`),
//! `resume`, `next` and `sair` (aliases `quit`, `leave`); the server echoes
//! `play`, `pause`, `resume` after applying a command and may broadcast
//! `shutdown`.

use crate::error::Error;
use bytes::BytesMut;
use std::io::ErrorKind;
use std::str::FromStr;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

/// Longest accepted command line in bytes
pub const MAX_COMMAND_LINE: usize = 256;

/// Transport command understood on the control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Restart the current track from the beginning
    Play,
    /// Freeze playback at the current position
    Pause,
    /// Continue from the frozen position
    Resume,
    /// Skip to the next track
    Next,
    /// Leave the control session
    Quit,
    /// Server-wide teardown, only ever sent by the server
    Shutdown,
}

impl Command {
    /// Canonical wire token
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Play => "play",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Next => "next",
            Command::Quit => "sair",
            Command::Shutdown => "shutdown",
        }
    }

    /// Encode as a single newline-terminated line
    pub fn to_line(&self) -> String {
        format!("{}\n", self.as_str())
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token.trim().to_ascii_lowercase().as_str() {
            "play" => Ok(Command::Play),
            "pause" | "stop" => Ok(Command::Pause),
            "resume" => Ok(Command::Resume),
            "next" => Ok(Command::Next),
            "sair" | "quit" | "leave" => Ok(Command::Quit),
            "shutdown" => Ok(Command::Shutdown),
            other => Err(Error::UnknownCommand(other.to_string())),
        }
    }
}

/// Split a received line into command tokens
///
/// Blank lines yield nothing; several commands on one line are returned in order.
pub fn parse_line(line: &str) -> Vec<Result<Command, Error>> {
    line.split_whitespace().map(Command::from_str).collect()
}

/// Line framing for the control channel
pub fn line_codec() -> LinesCodec {
    LinesCodec::new_with_max_length(MAX_COMMAND_LINE)
}

/// One line read by `CommandLineCodec`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceivedLine {
    Text(String),
    /// Longer than `MAX_COMMAND_LINE`; skipped up to the next newline
    TooLong,
    /// Not valid UTF-8; skipped
    NotUtf8,
}

/// Command line decoder that keeps the stream alive on bad input
///
/// `LinesCodec` reports over-long and non-UTF-8 lines as errors, and a
/// `FramedRead` stops at the first decoder error. Here they become
/// `ReceivedLine` items so the reader can log them and carry on.
#[derive(Debug, Clone)]
pub struct CommandLineCodec {
    lines: LinesCodec,
}

impl CommandLineCodec {
    pub fn new() -> Self {
        Self {
            lines: line_codec(),
        }
    }

    fn recover(
        decoded: Result<Option<String>, LinesCodecError>,
    ) -> Result<Option<ReceivedLine>, LinesCodecError> {
        match decoded {
            Ok(line) => Ok(line.map(ReceivedLine::Text)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(ReceivedLine::TooLong)),
            Err(LinesCodecError::Io(e)) if e.kind() == ErrorKind::InvalidData => {
                Ok(Some(ReceivedLine::NotUtf8))
            }
            Err(e) => Err(e),
        }
    }
}

impl Default for CommandLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for CommandLineCodec {
    type Item = ReceivedLine;
    type Error = LinesCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<ReceivedLine>, LinesCodecError> {
        Self::recover(self.lines.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<ReceivedLine>, LinesCodecError> {
        Self::recover(self.lines.decode_eof(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::FramedRead;

    #[test]
    fn test_parse_vocabulary() {
        assert_eq!("play".parse::<Command>().unwrap(), Command::Play);
        assert_eq!("PAUSE".parse::<Command>().unwrap(), Command::Pause);
        assert_eq!("stop".parse::<Command>().unwrap(), Command::Pause);
        assert_eq!(" resume\r".parse::<Command>().unwrap(), Command::Resume);
        assert_eq!("next".parse::<Command>().unwrap(), Command::Next);
        assert_eq!("sair".parse::<Command>().unwrap(), Command::Quit);
        assert_eq!("leave".parse::<Command>().unwrap(), Command::Quit);
        assert_eq!("shutdown".parse::<Command>().unwrap(), Command::Shutdown);
    }

    #[test]
    fn test_unknown_token() {
        match "rewind".parse::<Command>() {
            Err(Error::UnknownCommand(token)) => assert_eq!(token, "rewind"),
            other => panic!("expected UnknownCommand, got {:?}", other),
        }
    }

    #[test]
    fn test_canonical_tokens_parse_back() {
        for cmd in [
            Command::Play,
            Command::Pause,
            Command::Resume,
            Command::Next,
            Command::Quit,
            Command::Shutdown,
        ] {
            assert_eq!(cmd.as_str().parse::<Command>().unwrap(), cmd);
            assert!(cmd.to_line().ends_with('\n'));
        }
    }

    #[test]
    fn test_parse_line_with_coalesced_commands() {
        let parsed = parse_line("pause  resume bogus");
        assert_eq!(parsed.len(), 3);
        assert_eq!(*parsed[0].as_ref().unwrap(), Command::Pause);
        assert_eq!(*parsed[1].as_ref().unwrap(), Command::Resume);
        assert!(parsed[2].is_err());

        assert!(parse_line("   ").is_empty());
    }

    #[tokio::test]
    async fn test_line_codec_reassembles_split_writes() {
        let (mut tx, rx) = tokio::io::duplex(64);
        tokio::spawn(async move {
            tx.write_all(b"pl").await.unwrap();
            tx.write_all(b"ay\nnext\r\npau").await.unwrap();
            tx.write_all(b"se").await.unwrap();
        });

        let lines: Vec<String> = FramedRead::new(rx, line_codec())
            .map(|line| line.unwrap())
            .collect()
            .await;

        assert_eq!(lines, vec!["play", "next", "pause"]);
    }

    #[tokio::test]
    async fn test_command_codec_skips_bad_lines() {
        let (mut tx, rx) = tokio::io::duplex(4_096);
        let long_line = "x".repeat(MAX_COMMAND_LINE + 40);
        tokio::spawn(async move {
            tx.write_all(long_line.as_bytes()).await.unwrap();
            tx.write_all(b"\npause\n\xff\xfe\nresume\n").await.unwrap();
        });

        let lines: Vec<ReceivedLine> = FramedRead::new(rx, CommandLineCodec::new())
            .map(|line| line.unwrap())
            .collect()
            .await;

        assert_eq!(
            lines,
            vec![
                ReceivedLine::TooLong,
                ReceivedLine::Text("pause".to_string()),
                ReceivedLine::NotUtf8,
                ReceivedLine::Text("resume".to_string()),
            ]
        );
    }
}
