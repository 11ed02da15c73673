//! # Url
//!
//! Connection target parsed from an url with the syntax
//! `ftp://[user[:password]@]host[:port][/path]`

use std::fmt;
use std::str::FromStr;

use percent_encoding::percent_decode_str;
use thiserror::Error;
use url::{Host, Url};

/// Port used when the url doesn't specify one
pub const DEFAULT_PORT: u16 = 21;
/// User used when the url doesn't specify one
pub const DEFAULT_USER: &str = "anonymous";
/// Remote path used when the url doesn't specify one
pub const DEFAULT_PATH: &str = "/";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("malformed url: {0}")]
    Malformed(url::ParseError),
    #[error("invalid scheme `{0}`, expected `ftp`")]
    InvalidScheme(String),
    #[error("no host found")]
    NoHostFound,
    #[error("user info is not valid utf-8 once decoded")]
    InvalidUserInfo,
    #[error("path is not valid utf-8 once decoded")]
    InvalidPath,
}

/// Everything required to open and authenticate a session and address a remote path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpUrl {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub path: String,
}

impl FtpUrl {
    /// Returns whether `s` looks like an ftp url rather than a local path
    pub fn is_ftp_url(s: &str) -> bool {
        s.get(..6)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("ftp://"))
    }
}

impl FromStr for FtpUrl {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s).map_err(|err| match err {
            url::ParseError::EmptyHost => UrlError::NoHostFound,
            err => UrlError::Malformed(err),
        })?;
        FtpUrl::try_from(&url)
    }
}

impl TryFrom<&Url> for FtpUrl {
    type Error = UrlError;

    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        if !url.scheme().eq_ignore_ascii_case("ftp") {
            return Err(UrlError::InvalidScheme(url.scheme().to_string()));
        }
        let host = match url.host().ok_or(UrlError::NoHostFound)? {
            Host::Domain(domain) if domain.is_empty() => return Err(UrlError::NoHostFound),
            Host::Domain(domain) => domain.to_string(),
            Host::Ipv4(ip) => ip.to_string(),
            Host::Ipv6(ip) => ip.to_string(),
        };
        let port = url.port().unwrap_or(DEFAULT_PORT);

        let user = match decode(url.username()).ok_or(UrlError::InvalidUserInfo)? {
            user if user.is_empty() => DEFAULT_USER.to_string(),
            user => user,
        };
        let password = match url.password() {
            Some(password) => Some(decode(password).ok_or(UrlError::InvalidUserInfo)?),
            None => None,
        }
        .filter(|password| !password.is_empty());

        let path = match decode(url.path()).ok_or(UrlError::InvalidPath)? {
            path if path.is_empty() => DEFAULT_PATH.to_string(),
            path => path,
        };

        Ok(Self {
            host,
            port,
            user,
            password,
            path,
        })
    }
}

/// Printable form of the url; the password is never shown
impl fmt::Display for FtpUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        write!(f, "ftp://{}@{}:{}{}", self.user, host, self.port, self.path)
    }
}

fn decode(s: &str) -> Option<String> {
    percent_decode_str(s)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}
