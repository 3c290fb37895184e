//! Scripted SMTP server for client tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Overrides the default answer for a command line; `None` keeps the default.
pub type Responder = Box<dyn FnMut(&str) -> Option<String> + Send>;

/// Everything the server saw.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    pub commands: Vec<String>,
    pub messages: Vec<String>,
}

pub struct MockServer {
    pub addr: SocketAddr,
    transcript: Arc<Mutex<Transcript>>,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub async fn start(greeting: &str, ehlo: &str, mut responder: Responder) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let transcript = Arc::new(Mutex::new(Transcript::default()));
        let greeting = greeting.to_string();
        let ehlo = ehlo.to_string();
        let seen = Arc::clone(&transcript);

        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut reader = BufReader::new(read);
            write.write_all(greeting.as_bytes()).await.unwrap();

            let mut line = String::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).await.unwrap() == 0 {
                    break;
                }
                let command = line.trim_end().to_string();
                seen.lock().unwrap().commands.push(command.clone());

                let verb = command
                    .split([' ', ':'])
                    .next()
                    .unwrap_or_default()
                    .to_ascii_uppercase();
                let answer = responder(&command).unwrap_or_else(|| match verb.as_str() {
                    "EHLO" => ehlo.clone(),
                    "DATA" => "354 go ahead\r\n".into(),
                    "QUIT" => "221 bye\r\n".into(),
                    "AUTH" => "235 ok\r\n".into(),
                    _ => "250 ok\r\n".into(),
                });
                write.write_all(answer.as_bytes()).await.unwrap();

                if verb == "DATA" && answer.starts_with("354") {
                    let mut data = String::new();
                    loop {
                        let mut data_line = String::new();
                        if reader.read_line(&mut data_line).await.unwrap() == 0 {
                            return;
                        }
                        if data_line == ".\r\n" {
                            break;
                        }
                        data.push_str(&data_line);
                    }
                    let accepted = responder("<data>").unwrap_or_else(|| "250 queued\r\n".into());
                    seen.lock().unwrap().messages.push(data);
                    write.write_all(accepted.as_bytes()).await.unwrap();
                }
                if verb == "QUIT" {
                    break;
                }
            }
        });

        Self {
            addr,
            transcript,
            handle,
        }
    }

    pub async fn finish(self) -> Transcript {
        self.handle.await.unwrap();
        self.transcript.lock().unwrap().clone()
    }
}

pub const EHLO_FULL: &str = "250-mock.test\r\n250-SIZE 1000000\r\n250-8BITMIME\r\n250 AUTH LOGIN PLAIN\r\n";
pub const EHLO_BARE: &str = "250 mock.test\r\n";

pub fn defaults() -> Responder {
    Box::new(|_| None)
}
