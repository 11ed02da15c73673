//! # Status
//!
//! Reply codes defined by RFC 959 which the client may receive on the control channel

use thiserror::Error;

#[derive(Debug, Copy, Clone, Error, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
/// Ftp status returned in the terminal line of a reply
pub enum Status {
    // 1xx: Positive Preliminary Reply
    #[error("service ready in (n) minutes")]
    ReadyMinute = 120,
    #[error("data connection already open, transfer starting")]
    AlreadyOpen = 125,
    #[error("file status okay, about to open data connection")]
    AboutToSend = 150,
    // 2xx: Positive Completion Reply
    #[error("command okay")]
    CommandOk = 200,
    #[error("command not implemented, superfluous at this site")]
    CommandNotImplemented = 202,
    #[error("system status, or system help reply")]
    System = 211,
    #[error("service ready for new user")]
    Ready = 220,
    #[error("service closing control connection")]
    Closing = 221,
    #[error("data connection open; no transfer in progress")]
    DataConnectionOpen = 225,
    #[error("closing data connection")]
    ClosingDataConnection = 226,
    #[error("entering passive mode")]
    PassiveMode = 227,
    #[error("user logged in, proceed")]
    LoggedIn = 230,
    #[error("requested file action okay, completed")]
    RequestedFileActionOk = 250,
    #[error("pathname created")]
    PathCreated = 257,
    // 3xx: Positive Intermediate Reply
    #[error("user name okay, need password")]
    NeedPassword = 331,
    #[error("need account for login")]
    LoginNeedAccount = 332,
    #[error("requested file action pending further information")]
    RequestFilePending = 350,
    // 4xx: Transient Negative Completion Reply
    #[error("service not available, closing control connection")]
    NotAvailable = 421,
    #[error("can't open data connection")]
    CannotOpenDataConnection = 425,
    #[error("connection closed; transfer aborted")]
    TransferAborted = 426,
    #[error("requested file action not taken; file unavailable")]
    RequestFileActionIgnored = 450,
    #[error("requested action aborted; local error in processing")]
    ActionAborted = 451,
    #[error("requested action not taken; insufficient storage space")]
    RequestedActionNotTaken = 452,
    // 5xx: Permanent Negative Completion Reply
    #[error("syntax error, command unrecognized")]
    BadCommand = 500,
    #[error("syntax error in parameters or arguments")]
    BadArguments = 501,
    #[error("command not implemented")]
    NotImplemented = 502,
    #[error("bad sequence of commands")]
    BadSequence = 503,
    #[error("command not implemented for that parameter")]
    NotImplementedParameter = 504,
    #[error("not logged in")]
    NotLoggedIn = 530,
    #[error("need account for storing files")]
    StoringNeedAccount = 532,
    #[error("requested action not taken; file unavailable")]
    FileUnavailable = 550,
    #[error("requested action aborted; page type unknown")]
    PageTypeUnknown = 551,
    #[error("requested file action aborted; exceeded storage allocation")]
    ExceededStorage = 552,
    #[error("requested action not taken; file name not allowed")]
    BadFilename = 553,
    #[error("unknown reply code")]
    Unknown = 0,
}

impl Status {
    /// Get status code
    pub fn code(&self) -> u32 {
        *self as u32
    }

    /// Get status description
    pub fn desc(&self) -> String {
        self.to_string()
    }
}

impl From<u32> for Status {
    fn from(code: u32) -> Self {
        match code {
            120 => Self::ReadyMinute,
            125 => Self::AlreadyOpen,
            150 => Self::AboutToSend,
            200 => Self::CommandOk,
            202 => Self::CommandNotImplemented,
            211 => Self::System,
            220 => Self::Ready,
            221 => Self::Closing,
            225 => Self::DataConnectionOpen,
            226 => Self::ClosingDataConnection,
            227 => Self::PassiveMode,
            230 => Self::LoggedIn,
            250 => Self::RequestedFileActionOk,
            257 => Self::PathCreated,
            331 => Self::NeedPassword,
            332 => Self::LoginNeedAccount,
            350 => Self::RequestFilePending,
            421 => Self::NotAvailable,
            425 => Self::CannotOpenDataConnection,
            426 => Self::TransferAborted,
            450 => Self::RequestFileActionIgnored,
            451 => Self::ActionAborted,
            452 => Self::RequestedActionNotTaken,
            500 => Self::BadCommand,
            501 => Self::BadArguments,
            502 => Self::NotImplemented,
            503 => Self::BadSequence,
            504 => Self::NotImplementedParameter,
            530 => Self::NotLoggedIn,
            532 => Self::StoringNeedAccount,
            550 => Self::FileUnavailable,
            551 => Self::PageTypeUnknown,
            552 => Self::ExceededStorage,
            553 => Self::BadFilename,
            _ => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod test {

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn should_return_code_for_status() {
        assert_eq!(Status::PathCreated.code(), 257);
        assert_eq!(Status::Unknown.code(), 0);
    }

    #[test]
    fn should_return_desc_for_status() {
        assert_eq!(
            Status::NeedPassword.desc().as_str(),
            "user name okay, need password"
        );
    }

    #[test]
    fn should_convert_u32_to_status() {
        assert_eq!(Status::from(150), Status::AboutToSend);
        assert_eq!(Status::from(200), Status::CommandOk);
        assert_eq!(Status::from(220), Status::Ready);
        assert_eq!(Status::from(221), Status::Closing);
        assert_eq!(Status::from(226), Status::ClosingDataConnection);
        assert_eq!(Status::from(227), Status::PassiveMode);
        assert_eq!(Status::from(230), Status::LoggedIn);
        assert_eq!(Status::from(250), Status::RequestedFileActionOk);
        assert_eq!(Status::from(257), Status::PathCreated);
        assert_eq!(Status::from(331), Status::NeedPassword);
        assert_eq!(Status::from(426), Status::TransferAborted);
        assert_eq!(Status::from(500), Status::BadCommand);
        assert_eq!(Status::from(550), Status::FileUnavailable);
    }

    #[test]
    fn should_map_unlisted_codes_to_unknown() {
        assert_eq!(Status::from(599), Status::Unknown);
        assert_eq!(Status::from(0), Status::Unknown);
        assert_eq!(Status::from(1000), Status::Unknown);
    }

    #[test]
    fn should_round_trip_every_listed_code() {
        for code in [120, 125, 150, 200, 202, 211, 220, 221, 225, 226, 227, 230, 250, 257] {
            assert_eq!(Status::from(code).code(), code);
        }
        for code in [331, 332, 350, 421, 425, 426, 450, 451, 452] {
            assert_eq!(Status::from(code).code(), code);
        }
        for code in [500, 501, 502, 503, 504, 530, 532, 550, 551, 552, 553] {
            assert_eq!(Status::from(code).code(), code);
        }
    }
}
