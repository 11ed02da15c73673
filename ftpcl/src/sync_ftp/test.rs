use std::io::{Cursor, ErrorKind, Read};
use std::net::{Ipv4Addr, TcpListener};
use std::sync::{Arc, Mutex};
use std::thread;

use pretty_assertions::assert_eq;
use rand::Rng;

use super::*;
use crate::test_server::{MemoryServer, ScriptedServer};

fn response(body: &str) -> Response {
    Response::new(227, body.as_bytes().to_vec())
}

fn with_memory_session<F>(server: &MemoryServer, f: F)
where
    F: FnOnce(&mut FtpStream),
{
    crate::log_init();
    let mut stream = FtpStream::connect("127.0.0.1", server.port()).unwrap();
    stream.login("test", Some("test")).unwrap();
    f(&mut stream);
    assert!(stream.quit().is_ok());
}

#[test]
fn should_run_a_complete_session() {
    crate::log_init();
    let server = ScriptedServer::start(
        "220 ready\r\n",
        &[
            "331 need password\r\n",
            "230 ok\r\n",
            "200 ok\r\n",
            "200 ok\r\n",
            "200 ok\r\n",
            "257 created\r\n",
            "250 removed\r\n",
            "221 bye\r\n",
        ],
    );
    let mut stream = FtpStream::connect("127.0.0.1", server.port()).unwrap();
    assert_eq!(stream.get_welcome_msg(), Some("220 ready"));
    assert_eq!(stream.host(), "127.0.0.1");
    stream.login("anonymous", None).unwrap();
    stream.mkdir("/tmp/x").unwrap();
    stream.rmdir("/tmp/x").unwrap();
    stream.quit().unwrap();
    assert!(stream.is_closed());
    let transcript = server.join();
    assert_eq!(
        transcript.commands,
        vec![
            "USER anonymous",
            "PASS ",
            "TYPE I",
            "MODE S",
            "STRU F",
            "MKD /tmp/x",
            "RMD /tmp/x",
            "QUIT",
        ]
    );
    assert!(transcript.closed_by_client);
}

#[test]
fn should_read_multi_line_greeting() {
    let server = ScriptedServer::start("220-Welcome\r\n220-to the\r\n220 server\r\n", &[]);
    let mut stream = FtpStream::connect("127.0.0.1", server.port()).unwrap();
    assert_eq!(stream.get_welcome_msg(), Some("220 server"));
    stream.abort();
    assert!(server.join().commands.is_empty());
}

#[test]
fn should_accept_unusual_greeting() {
    let server = ScriptedServer::start("120 service ready in 2 minutes\r\n", &[]);
    let mut stream = FtpStream::connect("127.0.0.1", server.port()).unwrap();
    assert_eq!(
        stream.get_welcome_msg(),
        Some("120 service ready in 2 minutes")
    );
    stream.abort();
    server.join();
}

#[test]
fn should_skip_password_if_not_required() {
    let server = ScriptedServer::start(
        "220 ready\r\n",
        &["230 no password needed\r\n", "200 ok\r\n", "200 ok\r\n", "200 ok\r\n"],
    );
    let mut stream = FtpStream::connect("127.0.0.1", server.port()).unwrap();
    stream.login("omar", Some("secret")).unwrap();
    stream.abort();
    assert_eq!(
        server.join().commands,
        vec!["USER omar", "TYPE I", "MODE S", "STRU F"]
    );
}

#[test]
fn should_stop_login_on_unexpected_response() {
    let server = ScriptedServer::start("220 ready\r\n", &["500 unknown command\r\n"]);
    let mut stream = FtpStream::connect("127.0.0.1", server.port()).unwrap();
    match stream.login("anonymous", None).unwrap_err() {
        FtpError::UnexpectedResponse(response) => {
            assert_eq!(response.code, 500);
            assert_eq!(response.to_string().as_str(), "500 unknown command");
        }
        err => panic!("unexpected error: {err}"),
    }
    assert!(!stream.is_closed());
    drop(stream);
    let transcript = server.join();
    assert_eq!(transcript.commands, vec!["USER anonymous"]);
    assert!(transcript.closed_by_client);
}

#[test]
fn should_fail_login_on_wrong_password() {
    let server = ScriptedServer::start(
        "220 ready\r\n",
        &["331 need password\r\n", "530 Login incorrect.\r\n"],
    );
    let mut stream = FtpStream::connect("127.0.0.1", server.port()).unwrap();
    assert!(matches!(
        stream.login("omar", Some("wrong")).unwrap_err(),
        FtpError::UnexpectedResponse(Response { code: 530, .. })
    ));
    stream.abort();
    assert_eq!(server.join().commands, vec!["USER omar", "PASS wrong"]);
}

#[test]
fn should_close_session_on_quit_even_if_refused() {
    let server = ScriptedServer::start("220 ready\r\n", &["500 nope\r\n"]);
    let mut stream = FtpStream::connect("127.0.0.1", server.port()).unwrap();
    assert!(matches!(
        stream.quit().unwrap_err(),
        FtpError::UnexpectedResponse(Response { code: 500, .. })
    ));
    assert!(stream.is_closed());
    assert!(stream.get_ref().is_none());
    // the socket is closed even though the stream is still alive
    let transcript = server.join();
    assert_eq!(transcript.commands, vec!["QUIT"]);
    assert!(transcript.closed_by_client);
    drop(stream);
}

#[test]
fn should_refuse_commands_once_closed() {
    let server = ScriptedServer::start("220 ready\r\n", &["221 bye\r\n"]);
    let mut stream = FtpStream::connect("127.0.0.1", server.port()).unwrap();
    stream.quit().unwrap();
    assert!(matches!(
        stream.mkdir("/tmp").unwrap_err(),
        FtpError::SessionClosed
    ));
    assert!(matches!(
        stream.list("/").unwrap_err(),
        FtpError::SessionClosed
    ));
    assert!(matches!(stream.quit().unwrap_err(), FtpError::SessionClosed));
    assert_eq!(server.join().commands, vec!["QUIT"]);
}

#[test]
fn should_abort_session() {
    let server = ScriptedServer::start("220 ready\r\n", &[]);
    let mut stream = FtpStream::connect("127.0.0.1", server.port()).unwrap();
    assert!(stream.get_ref().is_some());
    stream.abort();
    assert!(stream.is_closed());
    assert!(matches!(stream.rm("a.txt").unwrap_err(), FtpError::SessionClosed));
    let transcript = server.join();
    assert!(transcript.commands.is_empty());
    assert!(transcript.closed_by_client);
}

#[test]
fn should_close_session_when_server_hangs_up() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream.write_all(b"220 ready\r\n").unwrap();
    });
    let mut stream = FtpStream::connect("127.0.0.1", port).unwrap();
    server.join().unwrap();
    assert!(matches!(
        stream.mkdir("/tmp").unwrap_err(),
        FtpError::ConnectionError(_)
    ));
    assert!(stream.is_closed());
}

#[test]
fn should_fail_on_bad_reply() {
    let server = ScriptedServer::start("220 ready\r\n", &["hello there\r\n"]);
    let mut stream = FtpStream::connect("127.0.0.1", server.port()).unwrap();
    assert!(matches!(
        stream.rm("a.txt").unwrap_err(),
        FtpError::BadResponse
    ));
    stream.abort();
    server.join();
}

#[test]
fn should_fail_to_connect_to_closed_port() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    assert!(matches!(
        FtpStream::connect("127.0.0.1", port).err().unwrap(),
        FtpError::ConnectionError(_)
    ));
    assert!(matches!(
        FtpStream::connect_with_options(
            "127.0.0.1",
            port,
            SessionOptions::default().with_connect_timeout(Duration::from_secs(1))
        )
        .err()
        .unwrap(),
        FtpError::ConnectionError(_)
    ));
}

#[test]
fn should_time_out_waiting_for_greeting() {
    // connections queue in the backlog but are never served
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let options = SessionOptions::default().with_read_timeout(Duration::from_millis(200));
    match FtpStream::connect_with_options("127.0.0.1", port, options).err() {
        Some(FtpError::ConnectionError(err)) => assert!(matches!(
            err.kind(),
            ErrorKind::WouldBlock | ErrorKind::TimedOut
        )),
        _ => panic!("expected a timeout"),
    }
    drop(listener);
}

#[test]
fn should_connect_to_url() {
    let server = ScriptedServer::start("220 ready\r\n", &["221 bye\r\n"]);
    let url: FtpUrl = format!("ftp://omar@127.0.0.1:{}/pub", server.port())
        .parse()
        .unwrap();
    let mut stream = FtpStream::connect_url(&url, SessionOptions::default()).unwrap();
    stream.quit().unwrap();
    assert_eq!(server.join().commands, vec!["QUIT"]);
}

#[test]
fn should_parse_passive_port() {
    assert_eq!(
        FtpStream::parse_passive_port_from_response(&response(
            "227 Entering Passive Mode (213,229,112,130,216,4)"
        ))
        .unwrap(),
        55300
    );
    assert_eq!(
        FtpStream::parse_passive_port_from_response(&response(
            "227 Entering Passive Mode (10,0,0,99,117,56)."
        ))
        .unwrap(),
        30008
    );
    assert_eq!(
        FtpStream::parse_passive_port_from_response(&response("227 =127,0,0,1,0,21"))
            .unwrap(),
        21
    );
    // halves are not bounded on their own, only the resulting port is
    assert_eq!(
        FtpStream::parse_passive_port_from_response(&response(
            "227 Entering Passive Mode (10,0,0,1,0,300)"
        ))
        .unwrap(),
        300
    );
    assert_eq!(
        FtpStream::parse_passive_port_from_response(&response(
            "227 Entering Passive Mode (10,0,0,1,255,255)"
        ))
        .unwrap(),
        65535
    );
}

#[test]
fn should_fail_to_parse_passive_port() {
    assert!(matches!(
        FtpStream::parse_passive_port_from_response(&response("227 Entering Passive Mode"))
            .unwrap_err(),
        FtpError::BadResponse
    ));
    // the reply code is not part of the address
    assert!(matches!(
        FtpStream::parse_passive_port_from_response(&response("227 port (4)")).unwrap_err(),
        FtpError::BadResponse
    ));
    assert!(matches!(
        FtpStream::parse_passive_port_from_response(&response(
            "227 Entering Passive Mode (127,0,0,1,256,0)"
        ))
        .unwrap_err(),
        FtpError::BadResponse
    ));
    assert!(matches!(
        FtpStream::parse_passive_port_from_response(&response(
            "227 Entering Passive Mode (127,0,0,1,1,99999999999)"
        ))
        .unwrap_err(),
        FtpError::BadResponse
    ));
}

#[test]
fn should_upload_and_download_file() {
    let server = MemoryServer::start();
    let mut data = vec![0u8; 10_000];
    rand::rng().fill(&mut data[..]);
    with_memory_session(&server, |stream| {
        let mut reader = Cursor::new(data.clone());
        assert_eq!(stream.upload("/data.bin", &mut reader).unwrap(), 10_000);
        let mut downloaded = Vec::new();
        assert_eq!(
            stream.download("/data.bin", &mut downloaded).unwrap(),
            10_000
        );
        assert_eq!(downloaded, data);
    });
    assert_eq!(server.file("/data.bin"), Some(data));
}

#[test]
fn should_upload_empty_file() {
    let server = MemoryServer::start();
    with_memory_session(&server, |stream| {
        assert_eq!(stream.upload("/empty", &mut std::io::empty()).unwrap(), 0);
    });
    assert_eq!(server.file("/empty"), Some(Vec::new()));
}

#[test]
fn should_list_directory() {
    let server = MemoryServer::start();
    server.put_file("/pub/readme.txt", b"hello");
    server.put_file("/other.txt", b"");
    with_memory_session(&server, |stream| {
        stream.mkdir("/pub/docs").unwrap();
        let listing = String::from_utf8(stream.list("/pub").unwrap()).unwrap();
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(
            lines,
            vec![
                "drwxr-xr-x 1 ftp ftp 0 Jan 01 00:00 docs",
                "-rw-r--r-- 1 ftp ftp 5 Jan 01 00:00 readme.txt",
            ]
        );
        assert!(stream.list("/empty").unwrap().is_empty());
    });
}

#[test]
fn should_manage_directories_and_files() {
    let server = MemoryServer::start();
    server.put_file("/trash.txt", b"bye");
    with_memory_session(&server, |stream| {
        stream.mkdir("/tmp").unwrap();
        assert!(matches!(
            stream.mkdir("/tmp").unwrap_err(),
            FtpError::UnexpectedResponse(Response { code: 550, .. })
        ));
        stream.rmdir("/tmp").unwrap();
        stream.rm("/trash.txt").unwrap();
        assert!(matches!(
            stream.rm("/trash.txt").unwrap_err(),
            FtpError::UnexpectedResponse(Response { code: 550, .. })
        ));
    });
    assert!(!server.has_dir("/tmp"));
    assert!(server.file("/trash.txt").is_none());
}

#[test]
fn should_keep_session_after_refused_transfer() {
    let server = MemoryServer::start();
    with_memory_session(&server, |stream| {
        let mut sink = Vec::new();
        assert!(matches!(
            stream.download("/missing.txt", &mut sink).unwrap_err(),
            FtpError::UnexpectedResponse(Response { code: 550, .. })
        ));
        assert!(sink.is_empty());
        assert!(!stream.is_closed());
        stream.mkdir("/still-alive").unwrap();
    });
    assert!(server.has_dir("/still-alive"));
}

#[test]
fn should_open_data_connection_to_control_peer() {
    let server = MemoryServer::start();
    server.put_file("/a.txt", b"content");
    let dialed = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&dialed);
    crate::log_init();
    let mut stream = FtpStream::connect("127.0.0.1", server.port())
        .unwrap()
        .passive_stream_builder(move |addr| {
            recorder.lock().unwrap().push(addr);
            TcpStream::connect(addr).map_err(FtpError::ConnectionError)
        });
    stream.login("test", None).unwrap();
    let mut content = Vec::new();
    stream.download("/a.txt", &mut content).unwrap();
    assert_eq!(content, b"content".to_vec());
    stream.quit().unwrap();
    let dialed = dialed.lock().unwrap();
    assert_eq!(dialed.len(), 1);
    // the server advertises 10.0.0.99
    assert_eq!(dialed[0].ip(), Ipv4Addr::LOCALHOST);
    assert_ne!(dialed[0].port(), server.port());
}

#[test]
fn should_keep_session_if_data_connection_fails() {
    let server = MemoryServer::start();
    crate::log_init();
    let mut stream = FtpStream::connect("127.0.0.1", server.port())
        .unwrap()
        .passive_stream_builder(|_| {
            Err(FtpError::ConnectionError(ErrorKind::ConnectionRefused.into()))
        });
    stream.login("test", None).unwrap();
    assert!(matches!(
        stream.list("/").unwrap_err(),
        FtpError::ConnectionError(_)
    ));
    assert!(!stream.is_closed());
    stream.mkdir("/after").unwrap();
    stream.quit().unwrap();
    assert!(server.has_dir("/after"));
}

#[test]
fn should_close_session_if_transfer_fails() {
    struct Broken;
    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(ErrorKind::BrokenPipe.into())
        }
    }
    let server = MemoryServer::start();
    crate::log_init();
    let mut stream = FtpStream::connect("127.0.0.1", server.port()).unwrap();
    stream.login("test", None).unwrap();
    assert!(matches!(
        stream.upload("/broken", &mut Broken).unwrap_err(),
        FtpError::ConnectionError(err) if err.kind() == ErrorKind::BrokenPipe
    ));
    assert!(stream.is_closed());
    assert!(matches!(stream.quit().unwrap_err(), FtpError::SessionClosed));
}

#[test]
fn should_set_transfer_parameters() {
    let server = ScriptedServer::start(
        "220 ready\r\n",
        &["200 ok\r\n", "200 ok\r\n", "200 ok\r\n", "504 not supported\r\n"],
    );
    let mut stream = FtpStream::connect("127.0.0.1", server.port()).unwrap();
    stream
        .transfer_type(FileType::Ascii(crate::types::FormatControl::NonPrint))
        .unwrap();
    stream.transfer_mode(TransferMode::Block).unwrap();
    stream.file_structure(FileStructure::Record).unwrap();
    assert!(matches!(
        stream.file_structure(FileStructure::Page).unwrap_err(),
        FtpError::UnexpectedResponse(Response { code: 504, .. })
    ));
    stream.abort();
    assert_eq!(
        server.join().commands,
        vec!["TYPE A N", "MODE B", "STRU R", "STRU P"]
    );
}

#[test]
fn ftp_stream_should_be_send() {
    fn assert_send<T: Send + Sync>() {}
    assert_send::<FtpStream>();
}
