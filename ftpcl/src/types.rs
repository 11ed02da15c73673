//! # Types
//!
//! Errors, replies and the set of valid values for FTP commands

use std::convert::From;
use std::fmt;
use std::string::FromUtf8Error;
use std::time::Duration;

use thiserror::Error;

use super::Status;
use crate::url::UrlError;

/// A shorthand for a Result whose error type is always an FtpError.
pub type FtpResult<T> = std::result::Result<T, FtpError>;

/// `FtpError` is a library-global error type to describe the different kinds of
/// errors that might occur while using FTP.
#[derive(Debug, Error)]
pub enum FtpError {
    /// Connection error: connect failure on the control or data channel, a timeout,
    /// or any I/O error while talking to the server.
    #[error("Connection error: {0}")]
    ConnectionError(std::io::Error),
    /// Unexpected response from remote. The command expected a certain response, but got another one.
    /// This means the ftp server refused to perform your request or there was an error while processing it.
    /// Contains the terminal line of the reply.
    #[error("Invalid response: {0}")]
    UnexpectedResponse(Response),
    /// The response syntax is invalid
    #[error("Response contains an invalid syntax")]
    BadResponse,
    /// The url provided was rejected before connecting
    #[error("Invalid url: {0}")]
    InvalidUrl(#[from] UrlError),
    /// The control connection has been closed; no further command can be issued
    #[error("Session is closed")]
    SessionClosed,
}

/// A complete reply read from the control channel.
///
/// `body` holds the terminal line only (continuation lines of a multi-line reply are
/// consumed and discarded), with trailing whitespace stripped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub code: u32,
    pub body: Vec<u8>,
}

impl Response {
    /// Instantiates a new `Response`
    pub fn new(code: u32, body: Vec<u8>) -> Self {
        Self { code, body }
    }

    /// Get the [`Status`] matching the reply code
    pub fn status(&self) -> Status {
        Status::from(self.code)
    }

    /// Get response as string
    pub fn as_string(&self) -> Result<String, FromUtf8Error> {
        String::from_utf8(self.body.clone()).map(|x| x.trim_end().to_string())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.body).trim_end())
    }
}

/// Text Format Control used in `TYPE` command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatControl {
    /// Non-print (not destined for printing)
    NonPrint,
    /// Telnet format control (\<CR\>, \<FF\>, etc.)
    Telnet,
    /// ASA (Fortran) Carriage Control
    Asa,
}

/// Representation type used in `TYPE` command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// ASCII text (the argument is the text format control)
    Ascii(FormatControl),
    /// EBCDIC text (the argument is the text format control)
    Ebcdic(FormatControl),
    /// Image; bytes are sent unchanged
    Image,
    /// Local format (the argument is the number of bits in one byte on local machine)
    Local(u8),
}

/// Transmission mode used in `MODE` command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Stream,
    Block,
    Compressed,
}

/// File structure used in `STRU` command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStructure {
    File,
    Record,
    Page,
}

impl fmt::Display for FormatControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FormatControl::NonPrint => "N",
            FormatControl::Telnet => "T",
            FormatControl::Asa => "C",
        })
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileType::Ascii(fc) => write!(f, "A {fc}"),
            FileType::Ebcdic(fc) => write!(f, "E {fc}"),
            FileType::Image => f.write_str("I"),
            FileType::Local(bits) => write!(f, "L {bits}"),
        }
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransferMode::Stream => "S",
            TransferMode::Block => "B",
            TransferMode::Compressed => "C",
        })
    }
}

impl fmt::Display for FileStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileStructure::File => "F",
            FileStructure::Record => "R",
            FileStructure::Page => "P",
        })
    }
}

/// Timeout used to open the data connection if none is configured
pub const DEFAULT_DATA_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Socket options applied when a session is built.
///
/// By default the control channel blocks forever waiting for a reply; set
/// `read_timeout` to bound every reply wait instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Timeout for the control connection TCP handshake
    pub connect_timeout: Option<Duration>,
    /// Read timeout on the control socket
    pub read_timeout: Option<Duration>,
    /// Write timeout on the control socket
    pub write_timeout: Option<Duration>,
    /// Timeout for the data connection TCP handshake
    pub data_connect_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            data_connect_timeout: DEFAULT_DATA_CONNECT_TIMEOUT,
        }
    }
}

impl SessionOptions {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn with_data_connect_timeout(mut self, timeout: Duration) -> Self {
        self.data_connect_timeout = timeout;
        self
    }
}
