mod error;
mod handlers;
pub mod transfer;
pub mod writer;

pub use error::SessionError;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::broadcast;
use uuid::Uuid;

use shared::codec::{self, Reply, Request, Verb};
use shared::logger;

use crate::ServerCommand;
use crate::directory::{RegisterError, SessionHandle, UserDirectory};
use crate::faults::FaultPolicy;
use crate::groups::{GroupRegistry, LeaveOutcome};

use handlers::CommandHandlers;
use writer::{ClientWriter, SessionWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Connecting,
    Connected,
    Finished,
}

/// One connected client: owns the read half of the connection and the
/// session lifecycle; shares its serialized write half through the user
/// directory so other sessions can fan out to it.
pub struct Session {
    id: Uuid,
    addr: SocketAddr,
    state: SessionState,
    username: Option<String>,
    reader: BufReader<OwnedReadHalf>,
    writer: Arc<ClientWriter>,
    directory: Arc<UserDirectory>,
    groups: Arc<GroupRegistry>,
    commands: broadcast::Sender<ServerCommand>,
    welcome: String,
}

impl Session {
    pub fn new(
        socket: TcpStream,
        addr: SocketAddr,
        directory: Arc<UserDirectory>,
        groups: Arc<GroupRegistry>,
        commands: broadcast::Sender<ServerCommand>,
        faults: Arc<dyn FaultPolicy>,
        welcome: String,
    ) -> Self {
        let (read_half, write_half) = socket.into_split();
        Session {
            id: Uuid::new_v4(),
            addr,
            state: SessionState::Init,
            username: None,
            reader: BufReader::new(read_half),
            writer: Arc::new(SessionWriter::new(write_half, faults)),
            directory,
            groups,
            commands,
            welcome,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Runs the session to completion. Cleanup (directory removal, group
    /// cascade, notifications) runs on every exit path: QUIT, protocol
    /// violation, I/O failure, or forced drop.
    pub async fn handle(mut self) -> Result<(), SessionError> {
        let result = self.run().await;
        self.finish().await;
        result
    }

    async fn run(&mut self) -> Result<(), SessionError> {
        logger::log_info(&format!("New client connected: {}", self.addr));
        self.state = SessionState::Connecting;
        self.writer.send_line(&codec::welcome(&self.welcome)).await?;

        let mut commands = self.commands.subscribe();
        let mut line = String::new();
        while self.state != SessionState::Finished {
            line.clear();
            tokio::select! {
                result = self.reader.read_line(&mut line) => {
                    match result {
                        Ok(0) => {
                            logger::log_warning(&format!("Client {} disconnected", self.display_name()));
                            break;
                        }
                        Ok(_) => {
                            logger::log_incoming(self.username.as_deref(), line.trim_end());
                            let request = Request::parse(&line);
                            self.dispatch(request).await?;
                        }
                        Err(e) => {
                            logger::log_error(&format!("IO error reading from {}: {}", self.display_name(), e));
                            return Err(SessionError::Io(e));
                        }
                    }
                }
                command = commands.recv() => {
                    match command {
                        Ok(ServerCommand::Kick { session }) if session == self.id => {
                            logger::log_warning(&format!("[DROP CONNECTION] {}", self.display_name()));
                            break;
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
        Ok(())
    }

    async fn dispatch(&mut self, request: Request) -> Result<(), SessionError> {
        match self.state {
            SessionState::Connected => self.dispatch_connected(request).await,
            SessionState::Connecting => self.dispatch_connecting(request).await,
            SessionState::Init | SessionState::Finished => Ok(()),
        }
    }

    /// Before the handshake only HELO is meaningful; QUIT is honored as a
    /// polite exit, everything else is refused without closing.
    async fn dispatch_connecting(&mut self, request: Request) -> Result<(), SessionError> {
        match request.verb {
            Verb::Helo => self.handle_helo(&request.payload).await,
            Verb::Quit => self.handle_quit().await,
            _ => {
                self.writer
                    .send_line(&Reply::Err("not authenticated".to_string()).to_string())
                    .await?;
                Ok(())
            }
        }
    }

    async fn dispatch_connected(&mut self, request: Request) -> Result<(), SessionError> {
        match request.verb {
            Verb::Quit => return self.handle_quit().await,
            Verb::Helo => {
                self.writer
                    .send_line(&Reply::Err("already logged in".to_string()).to_string())
                    .await?;
                return Ok(());
            }
            _ => {}
        }

        let Some(username) = self.username.clone() else {
            // CONNECTED implies a registered username; a missing one is a
            // directory invariant violation, not a client error.
            logger::log_error(&format!("Session {} is CONNECTED without a username", self.id));
            self.state = SessionState::Finished;
            return Ok(());
        };
        let handlers = CommandHandlers {
            directory: &self.directory,
            groups: &self.groups,
            writer: &self.writer,
            username: &username,
        };
        match request.verb {
            Verb::Bcst => handlers.handle_bcst(&request.payload).await,
            Verb::Lstus => handlers.handle_lstus().await,
            Verb::Msg => handlers.handle_msg(&request.payload).await,
            Verb::Mkgrp => handlers.handle_mkgrp(&request.payload).await,
            Verb::Jngrp => handlers.handle_jngrp(&request.payload).await,
            Verb::Lstgrp => handlers.handle_lstgrp().await,
            Verb::Bcgrp => handlers.handle_bcgrp(&request.payload).await,
            Verb::Lvgrp => handlers.handle_lvgrp(&request.payload).await,
            Verb::Kick => handlers.handle_kick(&request.payload).await,
            Verb::Trnsfr => handlers.handle_trnsfr(&request.payload, &mut self.reader).await,
            Verb::Unknown => {
                handlers.writer
                    .send_line(&Reply::Err("Unknown command".to_string()).to_string())
                    .await?;
                Ok(())
            }
            Verb::Helo | Verb::Quit => Ok(()),
        }
    }

    async fn handle_helo(&mut self, payload: &str) -> Result<(), SessionError> {
        if !handlers::is_valid_name(payload) {
            // Malformed username is fatal: notify, then close.
            self.state = SessionState::Finished;
            self.writer
                .send_line(
                    &Reply::Err(
                        "username has an invalid format (only characters, numbers and underscores are allowed)"
                            .to_string(),
                    )
                    .to_string(),
                )
                .await?;
            return Ok(());
        }

        let handle = SessionHandle {
            id: self.id,
            writer: self.writer.clone(),
        };
        match self.directory.register(payload, handle).await {
            Err(RegisterError::AlreadyExists) => {
                // Recoverable: the client may retry with another name.
                self.writer
                    .send_line(&Reply::Err("user already logged in".to_string()).to_string())
                    .await?;
            }
            Ok(()) => {
                self.username = Some(payload.to_string());
                self.writer.set_username(payload);
                self.state = SessionState::Connected;
                self.writer
                    .send_line(&Reply::OkWith(payload.to_string()).to_string())
                    .await?;
                logger::log_system(&format!("{} has joined the chat", payload));
            }
        }
        Ok(())
    }

    async fn handle_quit(&mut self) -> Result<(), SessionError> {
        self.state = SessionState::Finished;
        self.writer
            .send_line(&Reply::OkWith("Goodbye".to_string()).to_string())
            .await?;
        Ok(())
    }

    /// The single cleanup path: remove the directory entry, cascade out of
    /// every joined group with the same semantics as LVGRP, and notify the
    /// affected members.
    async fn finish(&mut self) {
        self.state = SessionState::Finished;
        let Some(username) = self.username.take() else {
            return;
        };
        self.directory.unregister(&username).await;
        for (group, outcome) in self.groups.purge(&username).await {
            match outcome {
                LeaveOutcome::Left { remaining } => {
                    let notice =
                        codec::group_notice(&group, &format!("{} left the group", username));
                    handlers::notify_all(&self.directory, &remaining, &notice).await;
                }
                LeaveOutcome::Disbanded { evicted } => {
                    let notice = codec::group_notice(&group, "Disbanded");
                    handlers::notify_all(&self.directory, &evicted, &notice).await;
                }
            }
        }
        logger::log_system(&format!("{} has left the chat", username));
    }

    fn display_name(&self) -> String {
        match &self.username {
            Some(username) => username.clone(),
            None => self.addr.to_string(),
        }
    }
}
