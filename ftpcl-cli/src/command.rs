use std::path::PathBuf;
use std::str::FromStr;

use ftpcl::{FtpError, FtpUrl};

use crate::args::OperationArgs;

/// The operation to run on the remote; every variant targets exactly one url
#[derive(Debug, PartialEq, Eq)]
pub enum Operation {
    List(FtpUrl),
    Mkdir(FtpUrl),
    Rm(FtpUrl),
    Rmdir(FtpUrl),
    /// Copy a local file to the remote; with `remove_source` the local file is removed afterwards
    Put {
        local: PathBuf,
        remote: FtpUrl,
        remove_source: bool,
    },
    /// Copy a remote file to a local path; with `remove_source` the remote file is removed afterwards
    Retr {
        remote: FtpUrl,
        local: PathBuf,
        remove_source: bool,
    },
}

impl Operation {
    /// The url the session must be opened with
    pub fn remote(&self) -> &FtpUrl {
        match self {
            Self::List(url) | Self::Mkdir(url) | Self::Rm(url) | Self::Rmdir(url) => url,
            Self::Put { remote, .. } | Self::Retr { remote, .. } => remote,
        }
    }
}

impl TryFrom<OperationArgs> for Operation {
    type Error = String;

    fn try_from(args: OperationArgs) -> Result<Self, Self::Error> {
        match args {
            OperationArgs::Ls(args) => parse_url(&args.url).map(Self::List),
            OperationArgs::Mkdir(args) => parse_url(&args.url).map(Self::Mkdir),
            OperationArgs::Rm(args) => parse_url(&args.url).map(Self::Rm),
            OperationArgs::Rmdir(args) => parse_url(&args.url).map(Self::Rmdir),
            OperationArgs::Cp(args) => copy(&args.source, &args.dest, false),
            OperationArgs::Mv(args) => copy(&args.source, &args.dest, true),
        }
    }
}

fn parse_url(url: &str) -> Result<FtpUrl, String> {
    FtpUrl::from_str(url)
        .map_err(FtpError::from)
        .map_err(|err| format!("{err} (`{url}`)"))
}

/// Resolve the direction of a copy; exactly one side must be an url
fn copy(source: &str, dest: &str, remove_source: bool) -> Result<Operation, String> {
    match (FtpUrl::is_ftp_url(source), FtpUrl::is_ftp_url(dest)) {
        (false, true) => {
            let local = PathBuf::from(source);
            let mut remote = parse_url(dest)?;
            // upload into a directory keeps the local name
            if remote.path.ends_with('/') {
                if let Some(name) = local.file_name() {
                    remote.path.push_str(&name.to_string_lossy());
                }
            }
            Ok(Operation::Put {
                local,
                remote,
                remove_source,
            })
        }
        (true, false) => Ok(Operation::Retr {
            remote: parse_url(source)?,
            local: PathBuf::from(dest),
            remove_source,
        }),
        (true, true) => Err("Copying between two remotes is not supported".to_string()),
        (false, false) => Err("One of source and dest must be an ftp:// url".to_string()),
    }
}
