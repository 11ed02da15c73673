//! # Reply
//!
//! Framing of the replies read from the control channel.
//!
//! A reply is either a single line `<code> <text>` or a multi-line reply opened by
//! `<code>-<text>`, followed by any number of lines and closed by `<code> <text>`.

use std::io::{BufRead, ErrorKind};

use crate::types::{FtpError, FtpResult, Response};

/// Length of the reply code
const CODE_LEN: usize = 3;

/// Kind of a line read while waiting for the end of a multi-line reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyLine {
    /// `<code>-...` or any other text in the middle of a multi-line reply
    Continuation,
    /// `<code> ...`; closes the reply
    Terminal,
}

impl ReplyLine {
    /// Classify `line` as part of a multi-line reply opened with `code`.
    ///
    /// The line closes the reply only if it starts with the same code and the code is
    /// followed by a space (or by nothing at all). `226-...` never closes a `226` reply.
    pub fn classify(line: &[u8], code: &[u8]) -> Self {
        if line.len() < CODE_LEN || &line[..CODE_LEN] != code {
            return Self::Continuation;
        }
        match line.get(CODE_LEN) {
            None | Some(b' ') | Some(b'\r') | Some(b'\n') => Self::Terminal,
            Some(_) => Self::Continuation,
        }
    }
}

/// Read a complete reply from `reader`.
///
/// Returns the reply code and the terminal line with trailing whitespace stripped.
/// The code is not validated here; see `FtpStream` for the expected-code check.
pub fn read_reply<R: BufRead>(reader: &mut R) -> FtpResult<Response> {
    let mut line = Vec::new();
    read_line(reader, &mut line)?;
    let code = parse_code(&line)?;

    if line.get(CODE_LEN) == Some(&b'-') {
        let prefix = line[..CODE_LEN].to_vec();
        trace!("multi-line reply opened with {code}");
        loop {
            line.clear();
            read_line(reader, &mut line)?;
            if ReplyLine::classify(&line, &prefix) == ReplyLine::Terminal {
                break;
            }
        }
    }

    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    line.truncate(end);

    Ok(Response::new(code, line))
}

/// Read bytes from reader until 0x0A; EOF before any byte is an error
fn read_line<R: BufRead>(reader: &mut R, line: &mut Vec<u8>) -> FtpResult<usize> {
    let len = reader
        .read_until(0x0A, line)
        .map_err(FtpError::ConnectionError)?;
    if len == 0 {
        return Err(FtpError::ConnectionError(ErrorKind::UnexpectedEof.into()));
    }
    trace!("CC IN: {:?}", String::from_utf8_lossy(line));
    Ok(len)
}

/// Get the reply code from the first three bytes of `line`
fn parse_code(line: &[u8]) -> FtpResult<u32> {
    match line.get(..CODE_LEN) {
        Some(digits) if digits.iter().all(u8::is_ascii_digit) => Ok(digits
            .iter()
            .fold(0, |code, digit| code * 10 + u32::from(digit - b'0'))),
        _ => {
            error!("invalid reply line: {:?}", String::from_utf8_lossy(line));
            Err(FtpError::BadResponse)
        }
    }
}
