//! # Test server
//!
//! In-process FTP servers the tests run sessions against.
//!
//! Available to other crates of the workspace through the `test-server` feature.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Bounds every blocking read of the servers, so a broken test fails instead of hanging
const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// What a [`ScriptedServer`] saw during the session
#[derive(Debug)]
pub struct Transcript {
    /// Command lines received, without CRLF
    pub commands: Vec<String>,
    /// Whether the client closed the control connection
    pub closed_by_client: bool,
}

/// Serves a single client: sends `greeting`, then answers the n-th command with the n-th reply.
///
/// Commands received once the replies are exhausted are recorded and answered with `502`.
pub struct ScriptedServer {
    addr: SocketAddr,
    handle: JoinHandle<Transcript>,
}

impl ScriptedServer {
    pub fn start(greeting: &str, replies: &[&str]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind scripted server");
        let addr = listener.local_addr().expect("scripted server has no address");
        let greeting = greeting.to_string();
        let replies: Vec<String> = replies.iter().map(|reply| reply.to_string()).collect();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("failed to accept client");
            stream
                .set_read_timeout(Some(IO_TIMEOUT))
                .expect("failed to set read timeout");
            let mut reader = BufReader::new(stream);
            let mut transcript = Transcript {
                commands: Vec::new(),
                closed_by_client: false,
            };
            if reader.get_mut().write_all(greeting.as_bytes()).is_err() {
                return transcript;
            }
            let mut replies = replies.into_iter();
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) => {
                        transcript.closed_by_client = true;
                        break;
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
                transcript
                    .commands
                    .push(line.trim_end_matches(['\r', '\n']).to_string());
                let reply = replies
                    .next()
                    .unwrap_or_else(|| "502 unexpected command\r\n".to_string());
                if reader.get_mut().write_all(reply.as_bytes()).is_err() {
                    break;
                }
            }
            transcript
        });
        Self { addr, handle }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Wait for the client to go away and get the transcript
    pub fn join(self) -> Transcript {
        self.handle.join().expect("scripted server panicked")
    }
}

#[derive(Debug, Default)]
struct Storage {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    commands: Vec<String>,
}

/// Minimal FTP server keeping files and directories in memory.
///
/// Any user and password are accepted. Clients are served one at a time.
/// PASV always advertises `10.0.0.99`, which is not the address of the server.
pub struct MemoryServer {
    addr: SocketAddr,
    storage: Arc<Mutex<Storage>>,
}

impl MemoryServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind memory server");
        let addr = listener.local_addr().expect("memory server has no address");
        let storage = Arc::new(Mutex::new(Storage::default()));
        let server_storage = Arc::clone(&storage);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let _ = MemorySession::new(stream, Arc::clone(&server_storage))
                    .and_then(MemorySession::run);
            }
        });
        Self { addr, storage }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.storage().files.get(path).cloned()
    }

    pub fn put_file(&self, path: &str, data: &[u8]) {
        self.storage().files.insert(path.to_string(), data.to_vec());
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.storage().dirs.contains(path)
    }

    /// Command lines received so far, from every client, without CRLF
    pub fn commands(&self) -> Vec<String> {
        self.storage().commands.clone()
    }

    fn storage(&self) -> std::sync::MutexGuard<'_, Storage> {
        self.storage.lock().expect("storage lock poisoned")
    }
}

struct MemorySession {
    reader: BufReader<TcpStream>,
    storage: Arc<Mutex<Storage>>,
    passive: Option<TcpListener>,
}

impl MemorySession {
    fn new(stream: TcpStream, storage: Arc<Mutex<Storage>>) -> io::Result<Self> {
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        Ok(Self {
            reader: BufReader::new(stream),
            storage,
            passive: None,
        })
    }

    fn run(mut self) -> io::Result<()> {
        self.reply("220-in-memory ftp server\r\n220-anonymous welcome\r\n220 ready")?;
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(());
            }
            let line = line.trim_end_matches(['\r', '\n']);
            self.storage().commands.push(line.to_string());
            let (verb, arg) = line.split_once(' ').unwrap_or((line, ""));
            let arg = arg.to_string();
            match verb.to_ascii_uppercase().as_str() {
                "USER" => self.reply("331 Please specify the password.")?,
                "PASS" => self.reply("230 Login successful.")?,
                "TYPE" | "MODE" | "STRU" => self.reply(&format!("200 {verb} set to {arg}."))?,
                "PASV" => self.pasv()?,
                "LIST" => self.list(&arg)?,
                "STOR" => self.stor(&arg)?,
                "RETR" => self.retr(&arg)?,
                "MKD" => {
                    let created = self.storage().dirs.insert(arg.clone());
                    if created {
                        self.reply(&format!("257 \"{arg}\" created"))?
                    } else {
                        self.reply("550 Create directory operation failed.")?
                    }
                }
                "RMD" => {
                    let removed = {
                        let mut storage = self.storage();
                        let empty = !storage.files.keys().any(|path| parent(path) == arg)
                            && !storage.dirs.iter().any(|path| parent(path) == arg);
                        empty && storage.dirs.remove(&arg)
                    };
                    if removed {
                        self.reply("250 Remove directory operation successful.")?
                    } else {
                        self.reply("550 Remove directory operation failed.")?
                    }
                }
                "DELE" => {
                    let removed = self.storage().files.remove(&arg).is_some();
                    if removed {
                        self.reply("250 Delete operation successful.")?
                    } else {
                        self.reply("550 Delete operation failed.")?
                    }
                }
                "QUIT" => {
                    self.reply("221 Goodbye.")?;
                    return Ok(());
                }
                _ => self.reply("502 Command not implemented.")?,
            }
        }
    }

    fn reply(&mut self, reply: &str) -> io::Result<()> {
        self.reader
            .get_mut()
            .write_all(format!("{reply}\r\n").as_bytes())
    }

    fn storage(&self) -> std::sync::MutexGuard<'_, Storage> {
        self.storage.lock().expect("storage lock poisoned")
    }

    fn pasv(&mut self) -> io::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        self.passive = Some(listener);
        self.reply(&format!(
            "227 Entering Passive Mode (10,0,0,99,{},{}).",
            port >> 8,
            port & 0xff
        ))
    }

    /// Accept the data connection opened after PASV; replies 425 if there is none
    fn accept_data(&mut self) -> io::Result<Option<TcpStream>> {
        match self.passive.take() {
            Some(listener) => {
                let (stream, _) = listener.accept()?;
                stream.set_read_timeout(Some(IO_TIMEOUT))?;
                Ok(Some(stream))
            }
            None => {
                self.reply("425 Use PASV first.")?;
                Ok(None)
            }
        }
    }

    fn list(&mut self, path: &str) -> io::Result<()> {
        let dir = match path.trim_end_matches('/') {
            "" => "/",
            dir => dir,
        };
        let listing: String = {
            let storage = self.storage();
            let dirs = storage
                .dirs
                .iter()
                .filter(|entry| parent(entry) == dir)
                .map(|entry| format!("drwxr-xr-x 1 ftp ftp 0 Jan 01 00:00 {}\r\n", name(entry)));
            let files = storage
                .files
                .iter()
                .filter(|(entry, _)| parent(entry) == dir)
                .map(|(entry, data)| {
                    format!(
                        "-rw-r--r-- 1 ftp ftp {} Jan 01 00:00 {}\r\n",
                        data.len(),
                        name(entry)
                    )
                });
            dirs.chain(files).collect()
        };
        let Some(mut data) = self.accept_data()? else {
            return Ok(());
        };
        self.reply("150 Here comes the directory listing.")?;
        data.write_all(listing.as_bytes())?;
        drop(data);
        self.reply("226 Directory send OK.")
    }

    fn stor(&mut self, path: &str) -> io::Result<()> {
        let Some(mut data) = self.accept_data()? else {
            return Ok(());
        };
        self.reply("150 Ok to send data.")?;
        let mut content = Vec::new();
        data.read_to_end(&mut content)?;
        self.storage().files.insert(path.to_string(), content);
        self.reply("226 Transfer complete.")
    }

    fn retr(&mut self, path: &str) -> io::Result<()> {
        let content = self.storage().files.get(path).cloned();
        let Some(content) = content else {
            self.passive = None;
            return self.reply("550 Failed to open file.");
        };
        let Some(mut data) = self.accept_data()? else {
            return Ok(());
        };
        self.reply("150 Opening BINARY mode data connection.")?;
        data.write_all(&content)?;
        drop(data);
        self.reply("226 Transfer complete.")
    }
}

/// Directory holding `path`
fn parent(path: &str) -> &str {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) => "/",
        Some((dir, _)) => dir,
        None => "",
    }
}

/// Last component of `path`
fn name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}
