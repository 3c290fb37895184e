//! Reusable SMTP session.

use super::{ServerInfo, SmtpStream};
use crate::command::{Command, dot_stuff};
use crate::error::{Error, Result, Stage};
use crate::parser::ReplyParser;
use crate::types::{AuthMechanism, Envelope, Extension, Refused, Reply, ReplyCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// An SMTP session that can carry several mail transactions.
#[derive(Debug)]
pub struct Client {
    stream: SmtpStream,
    parser: ReplyParser,
    server_info: ServerInfo,
    hello: Option<String>,
}

impl Client {
    /// Wraps a stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting cannot be read or is not 220.
    pub async fn from_stream(stream: SmtpStream) -> Result<Self> {
        let mut client = Self {
            stream,
            parser: ReplyParser::new(),
            server_info: ServerInfo::default(),
            hello: None,
        };

        let greeting = client.read_reply().await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(Error::reply(Stage::Greeting, greeting));
        }
        tracing::debug!(greeting = %greeting.message_text(), "SMTP greeting received");
        client.server_info.greeting = greeting.message_text();
        Ok(client)
    }

    /// Returns what the server advertised.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Returns true if the session runs over TLS.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        self.stream.is_tls()
    }

    /// Sends EHLO, falling back to HELO when the server does not know EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if both greetings are refused.
    pub async fn ehlo(&mut self, client_hostname: &str) -> Result<()> {
        let reply = self.command(&Command::Ehlo(client_hostname.to_string())).await?;

        if reply.is_success() {
            self.server_info.extensions = reply
                .lines
                .iter()
                .skip(1)
                .map(|line| Extension::parse(line))
                .collect();
        } else if matches!(reply.code, ReplyCode::SYNTAX_ERROR | ReplyCode::NOT_IMPLEMENTED) {
            let reply = self.command(&Command::Helo(client_hostname.to_string())).await?;
            if !reply.is_success() {
                return Err(Error::reply(Stage::Hello, reply));
            }
            self.server_info.extensions.clear();
        } else {
            return Err(Error::reply(Stage::Hello, reply));
        }

        self.hello = Some(client_hostname.to_string());
        Ok(())
    }

    /// Upgrades the session with STARTTLS and repeats EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if EHLO has not been sent, STARTTLS is not offered or
    /// refused, or the TLS handshake fails.
    pub async fn starttls(mut self, server_hostname: &str) -> Result<Self> {
        let Some(hello) = self.hello.clone() else {
            return Err(Error::Protocol("STARTTLS before EHLO".into()));
        };
        if !self.server_info.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }

        let reply = self.command(&Command::StartTls).await?;
        if !reply.is_success() {
            return Err(Error::reply(Stage::StartTls, reply));
        }

        self.stream = self.stream.upgrade_to_tls(server_hostname).await?;
        tracing::debug!(host = server_hostname, "SMTP session upgraded to TLS");

        self.server_info.extensions.clear();
        self.ehlo(&hello).await?;
        Ok(self)
    }

    /// Authenticates with the best mechanism both sides support.
    ///
    /// PLAIN is preferred over LOGIN.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotSupported` if the server offers neither mechanism,
    /// or the authentication error.
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<()> {
        let offered = self.server_info.auth_mechanisms();
        let plain = offered.contains(&AuthMechanism::Plain);
        let login = offered.contains(&AuthMechanism::Login);
        if plain {
            self.auth_plain(username, password).await
        } else if login {
            self.auth_login(username, password).await
        } else {
            Err(Error::NotSupported("AUTH PLAIN or LOGIN".into()))
        }
    }

    /// Authenticates using AUTH PLAIN with an initial response.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails.
    pub async fn auth_plain(&mut self, username: &str, password: &str) -> Result<()> {
        let credentials = STANDARD.encode(format!("\0{username}\0{password}"));
        let reply = self
            .command(&Command::Auth {
                mechanism: AuthMechanism::Plain,
                initial_response: Some(credentials),
            })
            .await?;
        expect(Stage::Auth, reply, ReplyCode::AUTH_SUCCESS)
    }

    /// Authenticates using AUTH LOGIN.
    ///
    /// # Errors
    ///
    /// Returns an error if any step of the exchange is refused.
    pub async fn auth_login(&mut self, username: &str, password: &str) -> Result<()> {
        let reply = self
            .command(&Command::Auth {
                mechanism: AuthMechanism::Login,
                initial_response: None,
            })
            .await?;
        expect(Stage::Auth, reply, ReplyCode::AUTH_CONTINUE)?;

        let reply = self.command(&Command::AuthResponse(STANDARD.encode(username))).await?;
        expect(Stage::Auth, reply, ReplyCode::AUTH_CONTINUE)?;

        let reply = self.command(&Command::AuthResponse(STANDARD.encode(password))).await?;
        expect(Stage::Auth, reply, ReplyCode::AUTH_SUCCESS)
    }

    /// Runs one mail transaction.
    ///
    /// `message` is the complete RFC 5322 message; transparency and the
    /// terminating dot are applied here. Returns the recipients the server
    /// refused while accepting at least one other.
    ///
    /// When the sender, every recipient, or the data is refused, the error is
    /// an `Error::Reply` whose stage is `MailFrom`, `RcptTo` or `Data`, and
    /// the session is reset so it can carry the next transaction.
    ///
    /// # Errors
    ///
    /// Returns the refusal described above, or any I/O or protocol error.
    pub async fn send_mail(&mut self, envelope: &Envelope, message: &[u8]) -> Result<Vec<Refused>> {
        let size = self.server_info.size().map(|_| message.len());
        let reply = self
            .command(&Command::MailFrom {
                from: envelope.from.clone(),
                size,
            })
            .await?;
        if !reply.is_success() {
            return Err(self.abort(Stage::MailFrom, reply).await);
        }

        let mut refused = Vec::new();
        for address in &envelope.to {
            let reply = self.command(&Command::RcptTo(address.clone())).await?;
            if !reply.is_success() {
                tracing::debug!(%address, code = %reply.code, "recipient refused");
                refused.push(Refused {
                    address: address.clone(),
                    reply,
                });
            }
        }
        if refused.len() == envelope.to.len() {
            let reply = refused.pop().map_or_else(
                || Reply::new(ReplyCode::new(554), vec!["no recipients".into()]),
                |last| last.reply,
            );
            return Err(self.abort(Stage::RcptTo, reply).await);
        }

        let reply = self.command(&Command::Data).await?;
        if reply.code != ReplyCode::START_DATA {
            return Err(self.abort(Stage::Data, reply).await);
        }

        self.stream.write_all(&dot_stuff(message)).await?;
        let reply = self.read_reply().await?;
        if !reply.is_success() {
            return Err(Error::reply(Stage::Data, reply));
        }

        tracing::trace!(recipients = envelope.to.len() - refused.len(), "message accepted");
        Ok(refused)
    }

    /// Sends RSET.
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses it.
    pub async fn reset(&mut self) -> Result<()> {
        let reply = self.command(&Command::Rset).await?;
        expect(Stage::Reset, reply, ReplyCode::OK)
    }

    /// Sends NOOP, useful to check that a pooled session is still alive.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is gone or the server refuses it.
    pub async fn noop(&mut self) -> Result<()> {
        let reply = self.command(&Command::Noop).await?;
        expect(Stage::Noop, reply, ReplyCode::OK)
    }

    /// Sends QUIT and drops the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails.
    pub async fn quit(mut self) -> Result<()> {
        let reply = self.command(&Command::Quit).await?;
        expect(Stage::Quit, reply, ReplyCode::CLOSING)
    }

    /// Resets after a refused transaction step and returns the refusal.
    async fn abort(&mut self, stage: Stage, reply: Reply) -> Error {
        if let Err(e) = self.reset().await {
            tracing::debug!(error = %e, "RSET after refusal failed");
        }
        Error::reply(stage, reply)
    }

    async fn command(&mut self, command: &Command) -> Result<Reply> {
        tracing::trace!(command = command.verb(), "SMTP >>");
        self.stream.write_all(&command.to_bytes()).await?;
        let reply = self.read_reply().await?;
        tracing::trace!(code = %reply.code, "SMTP <<");
        Ok(reply)
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        loop {
            let line = self.stream.read_line().await?;
            if let Some(reply) = self.parser.feed(&line)? {
                return Ok(reply);
            }
        }
    }
}

fn expect(stage: Stage, reply: Reply, code: ReplyCode) -> Result<()> {
    if reply.code == code {
        Ok(())
    } else {
        Err(Error::reply(stage, reply))
    }
}
