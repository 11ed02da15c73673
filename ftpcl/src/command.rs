//! # Command
//!
//! The set of FTP commands sent on the control channel

use std::fmt;

use crate::types::{FileStructure, FileType, TransferMode};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Ftp commands with their arguments
pub enum Command {
    /// Remove file at specified path
    Dele(String),
    /// List entries at specified path
    List(String),
    /// Make directory
    Mkd(String),
    /// Set transmission mode
    Mode(TransferMode),
    /// Provide login password
    Pass(String),
    /// Passive mode
    Pasv,
    /// Quit
    Quit,
    /// Retrieve file
    Retr(String),
    /// Remove directory
    Rmd(String),
    /// Put file at specified path
    Store(String),
    /// Set file structure
    Stru(FileStructure),
    /// Set transfer type
    Type(FileType),
    /// Provide user to login as
    User(String),
}

impl Command {
    /// Line written to the log; hides the password
    pub fn redacted(&self) -> String {
        match self {
            Self::Pass(_) => "PASS ******".to_string(),
            cmd => cmd.to_string().trim_end_matches("\r\n").to_string(),
        }
    }
}

// -- stringify

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dele(p) => write!(f, "DELE {p}"),
            Self::List(p) => write!(f, "LIST {p}"),
            Self::Mkd(p) => write!(f, "MKD {p}"),
            Self::Mode(m) => write!(f, "MODE {m}"),
            Self::Pass(p) => write!(f, "PASS {p}"),
            Self::Pasv => f.write_str("PASV"),
            Self::Quit => f.write_str("QUIT"),
            Self::Retr(p) => write!(f, "RETR {p}"),
            Self::Rmd(p) => write!(f, "RMD {p}"),
            Self::Store(p) => write!(f, "STOR {p}"),
            Self::Stru(s) => write!(f, "STRU {s}"),
            Self::Type(t) => write!(f, "TYPE {t}"),
            Self::User(u) => write!(f, "USER {u}"),
        }?;
        f.write_str("\r\n")
    }
}
