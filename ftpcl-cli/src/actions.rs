use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use ftpcl::{FtpResult, FtpStream, FtpUrl, SessionOptions};

use crate::command::Operation;

/// Open a session on the remote of `operation`, run it and quit.
///
/// Once connected, QUIT is attempted whatever the outcome of login and operation.
pub fn run(
    operation: &Operation,
    options: SessionOptions,
    prompt_password: bool,
) -> Result<(), String> {
    let url = operation.remote();
    let password =
        password(url, prompt_password).map_err(|err| format!("Could not read password: {err}"))?;
    let mut ftp =
        connect(url, options).map_err(|err| format!("Failed to connect to {url}: {err}"))?;
    let result = login(&mut ftp, &url.user, password.as_deref())
        .and_then(|_| perform(&mut ftp, operation));
    quit(&mut ftp);
    result
}

/// Ask for the password on the terminal, unless the url already carries one
fn password(url: &FtpUrl, prompt: bool) -> io::Result<Option<String>> {
    match &url.password {
        Some(password) => Ok(Some(password.clone())),
        None if prompt => {
            rpassword::prompt_password(format!("Password for {}: ", url.user)).map(Some)
        }
        None => Ok(None),
    }
}

fn connect(url: &FtpUrl, options: SessionOptions) -> FtpResult<FtpStream> {
    let stream = FtpStream::connect_url(url, options)?;
    if let Some(welcome) = stream.get_welcome_msg() {
        info!("{welcome}");
    }
    Ok(stream)
}

fn login(ftp: &mut FtpStream, user: &str, password: Option<&str>) -> Result<(), String> {
    ftp.login(user, password).map_err(|err| format!("LOGIN error: {err}"))
}

fn quit(ftp: &mut FtpStream) {
    if let Err(err) = ftp.quit() {
        eprintln!("Failed to disconnect from remote: {err}");
    }
}

fn perform(ftp: &mut FtpStream, operation: &Operation) -> Result<(), String> {
    match operation {
        Operation::List(url) => list(ftp, &url.path),
        Operation::Mkdir(url) => mkdir(ftp, &url.path),
        Operation::Rm(url) => rm(ftp, &url.path),
        Operation::Rmdir(url) => rmdir(ftp, &url.path),
        Operation::Put {
            local,
            remote,
            remove_source,
        } => {
            put(ftp, local, &remote.path)?;
            if *remove_source {
                fs::remove_file(local)
                    .map_err(|err| format!("Failed to remove {}: {err}", local.display()))?;
            }
            Ok(())
        }
        Operation::Retr {
            remote,
            local,
            remove_source,
        } => {
            retr(ftp, &remote.path, local)?;
            if *remove_source {
                rm(ftp, &remote.path)?;
            }
            Ok(())
        }
    }
}

fn list(ftp: &mut FtpStream, path: &str) -> Result<(), String> {
    let listing = ftp.list(path).map_err(|err| format!("LIST error: {err}"))?;
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(&listing)
        .and_then(|_| stdout.flush())
        .map_err(|err| format!("Failed to write listing: {err}"))
}

fn mkdir(ftp: &mut FtpStream, path: &str) -> Result<(), String> {
    ftp.mkdir(path).map_err(|err| format!("MKDIR error: {err}"))
}

fn rm(ftp: &mut FtpStream, path: &str) -> Result<(), String> {
    ftp.rm(path).map_err(|err| format!("RM error: {err}"))
}

fn rmdir(ftp: &mut FtpStream, path: &str) -> Result<(), String> {
    ftp.rmdir(path).map_err(|err| format!("RMDIR error: {err}"))
}

fn put(ftp: &mut FtpStream, local: &Path, dest: &str) -> Result<(), String> {
    let mut reader = File::open(local)
        .map_err(|err| format!("Failed to open local file for read: {err}"))?;
    let bytes = ftp
        .upload(dest, &mut reader)
        .map_err(|err| format!("PUT error: {err}"))?;
    info!("{bytes} bytes sent to {dest}");
    Ok(())
}

fn retr(ftp: &mut FtpStream, file: &str, dest: &Path) -> Result<(), String> {
    let mut writer = LazyFile::new(local_target(dest, file));
    let bytes = ftp
        .download(file, &mut writer)
        .map_err(|err| format!("RETR error: {err}"))?;
    info!("{bytes} bytes written to {}", writer.path.display());
    Ok(())
}

/// Download into a directory keeps the remote name
fn local_target(dest: &Path, remote: &str) -> PathBuf {
    match remote.rsplit('/').next().filter(|name| !name.is_empty()) {
        Some(name) if dest.is_dir() => dest.join(name),
        _ => dest.to_path_buf(),
    }
}

/// Local file created (or truncated) on the first write or flush.
///
/// Bytes only reach the writer once the server accepted the transfer, so a refused
/// download leaves an existing file untouched.
struct LazyFile {
    path: PathBuf,
    file: Option<File>,
}

impl LazyFile {
    fn new(path: PathBuf) -> Self {
        Self { path, file: None }
    }

    fn open(&mut self) -> io::Result<&mut File> {
        if self.file.is_none() {
            debug!("Creating local file {}", self.path.display());
            self.file = Some(File::create(&self.path)?);
        }
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "local file not open"))
    }
}

impl Write for LazyFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.open()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.open()?.flush()
    }
}
