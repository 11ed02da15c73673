//! # Sync
//!
//! This module contains the control session and the passive data connections it opens

mod data_stream;

use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::mem;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

// export
pub use data_stream::{DataStream, CHUNK_SIZE};

use super::regex::PASV_NUMBER_RE;
use super::types::{
    FileStructure, FileType, FtpError, FtpResult, Response, SessionOptions, TransferMode,
};
use super::Status;
use crate::command::Command;
use crate::reply::read_reply;
use crate::url::FtpUrl;
use data_stream::copy_chunked;

/// A function that creates a new stream for the data connection in passive mode.
///
/// It takes a [`SocketAddr`] and returns a [`TcpStream`].
pub type PassiveStreamBuilder = dyn Fn(SocketAddr) -> FtpResult<TcpStream> + Send + Sync;

/// State of the control connection
#[derive(Debug)]
enum ControlChannel {
    Open(BufReader<TcpStream>),
    Closed,
}

/// Stream to interface with the FTP server. This interface is only for the command stream.
///
/// Every operation sends one command and waits for its complete reply before returning,
/// so there is never more than one command outstanding. Once the session is closed
/// (after [`FtpStream::quit`], [`FtpStream::abort`] or a failure on the control connection)
/// every operation fails with [`FtpError::SessionClosed`].
pub struct FtpStream {
    channel: ControlChannel,
    host: String,
    welcome_msg: Option<String>,
    options: SessionOptions,
    passive_stream_builder: Box<PassiveStreamBuilder>,
}

impl FtpStream {
    /// Try to connect to the remote server
    pub fn connect<S: AsRef<str>>(host: S, port: u16) -> FtpResult<Self> {
        Self::connect_with_options(host, port, SessionOptions::default())
    }

    /// Try to connect to the remote server, applying the provided [`SessionOptions`]
    pub fn connect_with_options<S: AsRef<str>>(
        host: S,
        port: u16,
        options: SessionOptions,
    ) -> FtpResult<Self> {
        let host = host.as_ref();
        debug!("Connecting to server {host}:{port}");
        let stream = match options.connect_timeout {
            Some(timeout) => Self::connect_timeout((host, port), timeout)?,
            None => TcpStream::connect((host, port)).map_err(FtpError::ConnectionError)?,
        };
        Self::connect_with_stream(host, stream, options)
    }

    /// Connect to the host and port of `url`
    pub fn connect_url(url: &FtpUrl, options: SessionOptions) -> FtpResult<Self> {
        Self::connect_with_options(&url.host, url.port, options)
    }

    /// Connect using provided configured tcp stream.
    ///
    /// `host` is only kept for reference: data connections are opened towards the
    /// peer address of `stream`.
    pub fn connect_with_stream<S: AsRef<str>>(
        host: S,
        stream: TcpStream,
        options: SessionOptions,
    ) -> FtpResult<Self> {
        debug!("Established connection with server");
        stream
            .set_read_timeout(options.read_timeout)
            .map_err(FtpError::ConnectionError)?;
        stream
            .set_write_timeout(options.write_timeout)
            .map_err(FtpError::ConnectionError)?;
        let mut ftp_stream = Self {
            channel: ControlChannel::Open(BufReader::new(stream)),
            host: host.as_ref().to_string(),
            welcome_msg: None,
            options,
            passive_stream_builder: Self::default_passive_stream_builder(
                options.data_connect_timeout,
            ),
        };
        debug!("Reading server greeting...");
        let response = ftp_stream.read_any_response()?;
        if response.status() != Status::Ready {
            warn!("Server greeted with an unexpected code: {response}");
        }
        let welcome_msg = response.as_string().ok();
        debug!("Server READY; response: {:?}", welcome_msg);
        ftp_stream.welcome_msg = welcome_msg;
        Ok(ftp_stream)
    }

    /// Set a custom [`PassiveStreamBuilder`] for passive mode.
    ///
    /// The stream builder is a function that takes a `SocketAddr` and returns a `TcpStream` and it's used
    /// to create the [`TcpStream`] for the data connection in passive mode.
    pub fn passive_stream_builder<F>(mut self, stream_builder: F) -> Self
    where
        F: Fn(SocketAddr) -> FtpResult<TcpStream> + Send + Sync + 'static,
    {
        self.passive_stream_builder = Box::new(stream_builder);
        self
    }

    /// Returns welcome message retrieved from server (if available)
    pub fn get_welcome_msg(&self) -> Option<&str> {
        self.welcome_msg.as_deref()
    }

    /// Returns the host this session was opened with
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the options this session was opened with
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Returns a reference to the underlying control [`TcpStream`], unless the session is closed.
    pub fn get_ref(&self) -> Option<&TcpStream> {
        match &self.channel {
            ControlChannel::Open(reader) => Some(reader.get_ref()),
            ControlChannel::Closed => None,
        }
    }

    /// Returns whether the control connection has been closed
    pub fn is_closed(&self) -> bool {
        matches!(self.channel, ControlChannel::Closed)
    }

    /// Log in to the FTP server.
    ///
    /// `PASS` is sent only if the server asks for it; a missing password is sent as empty.
    /// Once logged in, the session is set to binary type, stream mode and file structure.
    pub fn login(&mut self, user: &str, password: Option<&str>) -> FtpResult<()> {
        debug!("Signin in with user '{user}'");
        self.perform(Command::User(user.to_string()))?;
        let response = self.read_response_in(&[Status::LoggedIn, Status::NeedPassword])?;
        if response.status() == Status::NeedPassword {
            debug!("Password is required");
            self.perform(Command::Pass(password.unwrap_or_default().to_string()))?;
            self.read_response(Status::LoggedIn)?;
        }
        debug!("Login OK");
        self.transfer_type(FileType::Image)?;
        self.transfer_mode(TransferMode::Stream)?;
        self.file_structure(FileStructure::File)
    }

    /// Sets the type of file to be transferred. That is the implementation
    /// of `TYPE` command.
    pub fn transfer_type(&mut self, file_type: FileType) -> FtpResult<()> {
        debug!("Setting transfer type {file_type}");
        self.perform(Command::Type(file_type))?;
        self.read_response(Status::CommandOk).map(|_| ())
    }

    /// Sets the transmission mode (`MODE` command)
    pub fn transfer_mode(&mut self, mode: TransferMode) -> FtpResult<()> {
        debug!("Setting transfer mode {mode}");
        self.perform(Command::Mode(mode))?;
        self.read_response(Status::CommandOk).map(|_| ())
    }

    /// Sets the file structure (`STRU` command)
    pub fn file_structure(&mut self, structure: FileStructure) -> FtpResult<()> {
        debug!("Setting file structure {structure}");
        self.perform(Command::Stru(structure))?;
        self.read_response(Status::CommandOk).map(|_| ())
    }

    /// Execute `LIST` command on `pathname`.
    ///
    /// Returns the raw bytes sent by the server; they are not decoded nor parsed.
    pub fn list<S: AsRef<str>>(&mut self, pathname: S) -> FtpResult<Vec<u8>> {
        debug!("Reading {} directory content", pathname.as_ref());
        let mut listing = Vec::new();
        self.transfer(Command::List(pathname.as_ref().to_string()), |stream| {
            copy_chunked(stream, &mut listing)
        })?;
        Ok(listing)
    }

    /// This creates a new directory on the server.
    pub fn mkdir<S: AsRef<str>>(&mut self, pathname: S) -> FtpResult<()> {
        debug!("Creating directory at {}", pathname.as_ref());
        self.perform(Command::Mkd(pathname.as_ref().to_string()))?;
        self.read_response(Status::PathCreated).map(|_| ())
    }

    /// Remove the remote file from the server.
    pub fn rm<S: AsRef<str>>(&mut self, filename: S) -> FtpResult<()> {
        debug!("Removing file {}", filename.as_ref());
        self.perform(Command::Dele(filename.as_ref().to_string()))?;
        self.read_response(Status::RequestedFileActionOk).map(|_| ())
    }

    /// Removes the remote pathname from the server.
    pub fn rmdir<S: AsRef<str>>(&mut self, pathname: S) -> FtpResult<()> {
        debug!("Removing directory {}", pathname.as_ref());
        self.perform(Command::Rmd(pathname.as_ref().to_string()))?;
        self.read_response(Status::RequestedFileActionOk).map(|_| ())
    }

    /// This stores a file on the server.
    /// r argument must be any struct which implemenents the [`Read`] trait.
    /// Returns amount of written bytes
    pub fn upload<S: AsRef<str>, R: Read>(&mut self, filename: S, r: &mut R) -> FtpResult<u64> {
        debug!("Put file {}", filename.as_ref());
        self.transfer(Command::Store(filename.as_ref().to_string()), |stream| {
            copy_chunked(r, stream)
        })
    }

    /// Retrieves the file name specified from the server and writes it to `w`.
    /// Returns amount of read bytes
    pub fn download<S: AsRef<str>, W: Write>(
        &mut self,
        filename: S,
        w: &mut W,
    ) -> FtpResult<u64> {
        debug!("Retrieving '{}'", filename.as_ref());
        self.transfer(Command::Retr(filename.as_ref().to_string()), |stream| {
            copy_chunked(stream, w)
        })
    }

    /// Quits the current FTP session.
    ///
    /// The control connection is closed whatever the outcome of `QUIT`.
    pub fn quit(&mut self) -> FtpResult<()> {
        debug!("Quitting stream");
        let result = self
            .perform(Command::Quit)
            .and_then(|_| self.read_response(Status::Closing));
        self.close();
        result.map(|_| ())
    }

    /// Close the control connection without sending `QUIT`
    pub fn abort(&mut self) {
        debug!("Aborting session");
        self.close();
    }

    /// Read response from stream
    fn read_response(&mut self, expected_code: Status) -> FtpResult<Response> {
        self.read_response_in(&[expected_code])
    }

    /// Read a complete reply and check its code is one of `expected_code`
    fn read_response_in(&mut self, expected_code: &[Status]) -> FtpResult<Response> {
        let response = self.read_any_response()?;
        trace!("Code parsed from response: {}", response.code);
        if expected_code
            .iter()
            .any(|status| status.code() == response.code)
        {
            Ok(response)
        } else {
            debug!("Unexpected response: {response}");
            Err(FtpError::UnexpectedResponse(response))
        }
    }

    /// Read a complete reply, whatever its code
    fn read_any_response(&mut self) -> FtpResult<Response> {
        let reader = self.control()?;
        match read_reply(reader) {
            Err(FtpError::ConnectionError(err)) => Err(self.fail(err)),
            result => result,
        }
    }

    /// Write data to stream with command to perform
    fn perform(&mut self, command: Command) -> FtpResult<()> {
        trace!("CC OUT: {}", command.redacted());
        let stream = self.control()?.get_mut();
        match stream.write_all(command.to_string().as_bytes()) {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Get the control connection, unless the session is closed
    fn control(&mut self) -> FtpResult<&mut BufReader<TcpStream>> {
        match &mut self.channel {
            ControlChannel::Open(reader) => Ok(reader),
            ControlChannel::Closed => Err(FtpError::SessionClosed),
        }
    }

    /// Close the session after an I/O failure on the control connection
    fn fail(&mut self, err: io::Error) -> FtpError {
        error!("control connection failure: {err}; closing session");
        self.close();
        FtpError::ConnectionError(err)
    }

    /// Drop the control connection; does nothing if already closed
    fn close(&mut self) {
        let channel = mem::replace(&mut self.channel, ControlChannel::Closed);
        if let ControlChannel::Open(reader) = channel {
            trace!("Closing control connection");
            drop(reader);
        }
    }

    /// Run a data command: open the data connection, let `io` move the bytes,
    /// close the data connection and wait for the transfer to be confirmed.
    ///
    /// If `io` fails the server is left in the middle of a transfer, so the session is closed.
    fn transfer<F>(&mut self, cmd: Command, io: F) -> FtpResult<u64>
    where
        F: FnOnce(&mut DataStream) -> io::Result<u64>,
    {
        let mut data_stream = self.data_command(cmd)?;
        let result = io(&mut data_stream);
        // Drop stream NOTE: must be done first, otherwise server won't return any response
        drop(data_stream);
        trace!("dropped stream");
        match result {
            Ok(bytes) => {
                trace!("transferred {bytes} bytes");
                self.read_response(Status::ClosingDataConnection)?;
                Ok(bytes)
            }
            Err(err) => {
                error!("data transfer failed: {err}; aborting session");
                self.close();
                Err(FtpError::ConnectionError(err))
            }
        }
    }

    /// Execute command which send data back in a separate stream
    fn data_command(&mut self, cmd: Command) -> FtpResult<DataStream> {
        let addr = self.pasv()?;
        let stream = DataStream::new((self.passive_stream_builder)(addr)?);
        trace!("Data connection established with {addr}");
        self.perform(cmd)?;
        self.read_response(Status::AboutToSend)?;
        Ok(stream)
    }

    /// Runs the PASV command to enter passive mode.
    ///
    /// The address advertised by the server is ignored: the data connection is always
    /// opened towards the host of the control connection.
    fn pasv(&mut self) -> FtpResult<SocketAddr> {
        debug!("PASV command");
        self.perform(Command::Pasv)?;
        // PASV response format : 227 Entering Passive Mode (h1,h2,h3,h4,p1,p2).
        let response = self.read_response(Status::PassiveMode)?;
        let port = Self::parse_passive_port_from_response(&response)?;
        let mut remote = self
            .control()?
            .get_ref()
            .peer_addr()
            .map_err(FtpError::ConnectionError)?;
        remote.set_port(port);
        trace!("Passive address: {remote}");
        Ok(remote)
    }

    /// Parse passive port from response.
    ///
    /// The last two numbers following the reply code are the port halves;
    /// the port is `p1 * 256 + p2` and must fit in 16 bits.
    pub(crate) fn parse_passive_port_from_response(response: &Response) -> FtpResult<u16> {
        let response_str = String::from_utf8_lossy(&response.body);
        trace!("PASV response: {response_str}");
        let text = response_str.get(3..).unwrap_or_default();
        let numbers: Vec<&str> = PASV_NUMBER_RE
            .find_iter(text)
            .map(|number| number.as_str())
            .collect();
        let (msb, lsb) = match numbers.as_slice() {
            [.., msb, lsb] => (
                msb.parse::<u32>().map_err(|_| FtpError::BadResponse)?,
                lsb.parse::<u32>().map_err(|_| FtpError::BadResponse)?,
            ),
            _ => {
                error!("no port found in PASV response: {response_str}");
                return Err(FtpError::BadResponse);
            }
        };
        u16::try_from(u64::from(msb) * 256 + u64::from(lsb)).map_err(|_| {
            error!("port out of range in PASV response: {response_str}");
            FtpError::BadResponse
        })
    }

    /// Try every address `addr` resolves to, until one accepts the connection
    fn connect_timeout<A: ToSocketAddrs>(addr: A, timeout: Duration) -> FtpResult<TcpStream> {
        let mut last_error = None;
        for addr in addr.to_socket_addrs().map_err(FtpError::ConnectionError)? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(err) => {
                    debug!("Could not connect to {addr}: {err}");
                    last_error = Some(err);
                }
            }
        }
        Err(FtpError::ConnectionError(last_error.unwrap_or_else(|| {
            io::Error::new(ErrorKind::NotFound, "host resolved to no address")
        })))
    }

    /// Default stream builder
    fn default_passive_stream_builder(timeout: Duration) -> Box<PassiveStreamBuilder> {
        Box::new(move |addr| {
            TcpStream::connect_timeout(&addr, timeout).map_err(FtpError::ConnectionError)
        })
    }
}

#[cfg(test)]
mod test;
