use argh::FromArgs;

#[derive(FromArgs, Debug)]
#[argh(description = "Run one operation against an FTP server.
Remote paths are given as urls: ftp://[user[:password]@]host[:port]/path")]
pub struct Args {
    #[argh(switch, short = 'D', description = "enable TRACE log level")]
    pub debug: bool,
    #[argh(switch, short = 'v', description = "verbose mode")]
    pub verbose: bool,
    #[argh(switch, short = 'V', description = "print version")]
    pub version: bool,
    #[argh(
        switch,
        short = 'P',
        description = "prompt for the password if the url carries none"
    )]
    pub password: bool,
    #[argh(
        option,
        description = "connect timeout and read/write timeout on the control connection, in seconds"
    )]
    pub timeout: Option<u64>,
    #[argh(subcommand)]
    pub operation: Option<OperationArgs>,
}

#[derive(FromArgs, Debug, PartialEq, Eq)]
#[argh(subcommand)]
pub enum OperationArgs {
    Ls(LsArgs),
    Mkdir(MkdirArgs),
    Rm(RmArgs),
    Rmdir(RmdirArgs),
    Cp(CpArgs),
    Mv(MvArgs),
}

#[derive(FromArgs, Debug, PartialEq, Eq)]
#[argh(
    subcommand,
    name = "ls",
    description = "print the listing of a remote directory"
)]
pub struct LsArgs {
    #[argh(positional, description = "remote directory")]
    pub url: String,
}

#[derive(FromArgs, Debug, PartialEq, Eq)]
#[argh(subcommand, name = "mkdir", description = "create a remote directory")]
pub struct MkdirArgs {
    #[argh(positional, description = "remote directory")]
    pub url: String,
}

#[derive(FromArgs, Debug, PartialEq, Eq)]
#[argh(subcommand, name = "rm", description = "remove a remote file")]
pub struct RmArgs {
    #[argh(positional, description = "remote file")]
    pub url: String,
}

#[derive(FromArgs, Debug, PartialEq, Eq)]
#[argh(subcommand, name = "rmdir", description = "remove a remote directory")]
pub struct RmdirArgs {
    #[argh(positional, description = "remote directory")]
    pub url: String,
}

#[derive(FromArgs, Debug, PartialEq, Eq)]
#[argh(
    subcommand,
    name = "cp",
    description = "copy a file; exactly one of source and dest must be an url"
)]
pub struct CpArgs {
    #[argh(positional, description = "source file")]
    pub source: String,
    #[argh(positional, description = "destination file")]
    pub dest: String,
}

#[derive(FromArgs, Debug, PartialEq, Eq)]
#[argh(
    subcommand,
    name = "mv",
    description = "move a file; exactly one of source and dest must be an url"
)]
pub struct MvArgs {
    #[argh(positional, description = "source file")]
    pub source: String,
    #[argh(positional, description = "destination file")]
    pub dest: String,
}
