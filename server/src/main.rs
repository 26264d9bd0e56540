use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use uuid::Uuid;

use shared::logger;

mod completer;
mod config;
mod directory;
mod faults;
mod groups;
mod input;
mod readline_helper;
mod session;

use config::ServerConfig;
use directory::UserDirectory;
use faults::FaultPolicy;
use groups::GroupRegistry;
use input::ServerUserInput;
use session::Session;

/// Out-of-band instruction fanned out to every session; the targeted one
/// tears itself down. Used by the admin `/kick` and the simulated-drop timer.
#[derive(Debug, Clone)]
pub enum ServerCommand {
    Kick { session: Uuid },
}

pub struct ChatServer {
    listener: TcpListener,
    config: ServerConfig,
    directory: Arc<UserDirectory>,
    groups: Arc<GroupRegistry>,
    commands: broadcast::Sender<ServerCommand>,
    faults: Arc<dyn FaultPolicy>,
}

impl ChatServer {
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let (commands, _) = broadcast::channel(64);
        let faults = faults::policy_from_config(&config);
        Ok(ChatServer {
            listener,
            config,
            directory: Arc::new(UserDirectory::new()),
            groups: Arc::new(GroupRegistry::new()),
            commands,
            faults,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(&mut self) -> io::Result<()> {
        let mut readline_rx = readline_helper::spawn_readline_handler();
        if readline_rx.is_none() {
            logger::log_info("Running in non-interactive mode (no TTY), admin console disabled");
        }

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((socket, addr)) => self.accept(socket, addr),
                        Err(e) => logger::log_error(&format!("Failed to accept connection: {}", e)),
                    }
                }
                line = async {
                    match &mut readline_rx {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    match line {
                        Some(line) => {
                            if self.handle_console_line(&line).await {
                                return Ok(());
                            }
                        }
                        None => {
                            logger::log_info("Server shutting down...");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn accept(&self, socket: TcpStream, addr: SocketAddr) {
        let session = Session::new(
            socket,
            addr,
            self.directory.clone(),
            self.groups.clone(),
            self.commands.clone(),
            self.faults.clone(),
            self.config.welcome_message.clone(),
        );
        if self.config.simulate_dropped_connections {
            faults::spawn_connection_drop(self.commands.clone(), session.id());
        }
        tokio::spawn(async move {
            if let Err(e) = session.handle().await {
                logger::log_error(&format!("Error handling client {}: {}", addr, e));
            }
            logger::log_info(&format!("Connection from {} closed", addr));
        });
    }

    /// Returns true when the server should shut down.
    async fn handle_console_line(&self, line: &str) -> bool {
        match ServerUserInput::try_from(line) {
            Ok(ServerUserInput::Quit) => {
                logger::log_info("Server shutting down...");
                true
            }
            Ok(ServerUserInput::Help) => {
                for line in input::help_text() {
                    logger::log_info(&line);
                }
                false
            }
            Ok(ServerUserInput::ListUsers) => {
                self.handle_list_users().await;
                false
            }
            Ok(ServerUserInput::ListGroups) => {
                self.handle_list_groups().await;
                false
            }
            Ok(ServerUserInput::Kick(username)) => {
                self.handle_kick(username).await;
                false
            }
            Err(_) => {
                logger::log_error("Invalid command. Type /help for available commands.");
                false
            }
        }
    }

    async fn handle_list_users(&self) {
        let users = self.directory.snapshot().await;
        if users.is_empty() {
            logger::log_info("No users currently connected.");
        } else {
            logger::log_info(&format!("Connected users ({}):", users.len()));
            for user in users {
                logger::log_info(&format!("  - {}", user));
            }
        }
    }

    async fn handle_list_groups(&self) {
        let groups = self.groups.list().await;
        if groups.is_empty() {
            logger::log_info("No live groups.");
        } else {
            logger::log_info(&format!("Live groups ({}):", groups.len()));
            for group in groups {
                logger::log_info(&format!("  - {}", group));
            }
        }
    }

    async fn handle_kick(&self, username: String) {
        if !self.directory.exists(&username).await {
            logger::log_error(&format!("User '{}' not found", username));
            return;
        }
        // The session can still vanish between the check and the lookup.
        if let Some(handle) = self.directory.lookup(&username).await {
            if self
                .commands
                .send(ServerCommand::Kick { session: handle.id })
                .is_ok()
            {
                logger::log_warning(&format!("Kicking user: {}", username));
            }
        }
    }
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let config = ServerConfig::from_env();
    let mut server = ChatServer::bind(config).await?;

    logger::log_success(&format!("Chat server started at {}", server.local_addr()?));
    logger::log_info(&format!(
        "To change address, set {} environment variable",
        config::CHAT_SERVER_ADDR_ENV_VAR
    ));
    logger::log_info("Server commands: /help, /list, /groups, /kick, /quit");

    server.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::time::timeout;

    const RECV_TIMEOUT: Duration = Duration::from_secs(5);

    async fn start_server() -> SocketAddr {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        };
        let mut server = ChatServer::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        addr
    }

    struct TestClient {
        reader: BufReader<OwnedReadHalf>,
        writer: OwnedWriteHalf,
    }

    impl TestClient {
        async fn connect(addr: SocketAddr) -> Self {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (read_half, write_half) = stream.into_split();
            let mut client = TestClient {
                reader: BufReader::new(read_half),
                writer: write_half,
            };
            let banner = client.recv().await;
            assert!(banner.starts_with("HELO "), "unexpected banner: {}", banner);
            client
        }

        async fn login(addr: SocketAddr, username: &str) -> Self {
            let mut client = Self::connect(addr).await;
            client.send(&format!("HELO {}", username)).await;
            assert_eq!(client.recv().await, format!("+OK {}", username));
            client
        }

        async fn send(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }

        async fn send_bytes(&mut self, bytes: &[u8]) {
            self.writer.write_all(bytes).await.unwrap();
        }

        async fn recv(&mut self) -> String {
            let mut line = String::new();
            let read = timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
                .await
                .expect("timed out waiting for a line")
                .unwrap();
            assert!(read > 0, "connection closed while expecting a line");
            line.trim_end().to_string()
        }

        async fn recv_bytes(&mut self, len: usize) -> Vec<u8> {
            let mut buffer = vec![0u8; len];
            timeout(RECV_TIMEOUT, self.reader.read_exact(&mut buffer))
                .await
                .expect("timed out waiting for bytes")
                .unwrap();
            buffer
        }

        async fn assert_closed(&mut self) {
            let mut line = String::new();
            let read = timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
                .await
                .expect("timed out waiting for close")
                .unwrap();
            assert_eq!(read, 0, "expected a closed connection, got: {}", line);
        }

        async fn assert_silent(&mut self) {
            let mut line = String::new();
            let result = timeout(
                Duration::from_millis(300),
                self.reader.read_line(&mut line),
            )
            .await;
            match result {
                Err(_) => {}
                Ok(Ok(0)) => {}
                Ok(other) => panic!("expected silence, got {:?}: {}", other, line),
            }
        }
    }

    fn transfer_frame(filename: &str, declared_len: u64, payload: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(filename.len() as u16).to_be_bytes());
        bytes.extend_from_slice(filename.as_bytes());
        bytes.extend_from_slice(&declared_len.to_be_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    #[tokio::test]
    async fn test_handshake_enforces_unique_usernames() {
        let addr = start_server().await;
        let _alice = TestClient::login(addr, "alice").await;

        let mut bob = TestClient::connect(addr).await;
        bob.send("HELO alice").await;
        assert_eq!(bob.recv().await, "-ERR user already logged in");
        // Recoverable: the same connection may retry with a free name.
        bob.send("HELO bob").await;
        assert_eq!(bob.recv().await, "+OK bob");
    }

    #[tokio::test]
    async fn test_malformed_username_closes_the_connection() {
        let addr = start_server().await;
        let mut client = TestClient::connect(addr).await;
        client.send("HELO a!").await;
        assert_eq!(
            client.recv().await,
            "-ERR username has an invalid format (only characters, numbers and underscores are allowed)"
        );
        client.assert_closed().await;
    }

    #[tokio::test]
    async fn test_commands_before_authentication_are_rejected() {
        let addr = start_server().await;
        let mut client = TestClient::connect(addr).await;
        for command in ["BCST hello", "LSTUS", "MKGRP team", "MSG bob hi"] {
            client.send(command).await;
            assert_eq!(client.recv().await, "-ERR not authenticated");
        }
        // The connection stays usable.
        client.send("HELO carol").await;
        assert_eq!(client.recv().await, "+OK carol");
    }

    #[tokio::test]
    async fn test_concurrent_handshakes_admit_exactly_one() {
        let addr = start_server().await;
        let mut tasks = Vec::new();
        for _ in 0..8 {
            tasks.push(tokio::spawn(async move {
                let mut client = TestClient::connect(addr).await;
                client.send("HELO dave").await;
                client.recv().await
            }));
        }
        let mut admitted = 0;
        for task in tasks {
            match task.await.unwrap().as_str() {
                "+OK dave" => admitted += 1,
                "-ERR user already logged in" => {}
                other => panic!("unexpected reply: {}", other),
            }
        }
        assert_eq!(admitted, 1);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone_else() {
        let addr = start_server().await;
        let mut alice = TestClient::login(addr, "alice").await;
        let mut bob = TestClient::login(addr, "bob").await;
        let mut carol = TestClient::login(addr, "carol").await;

        alice.send("BCST hello everyone").await;
        assert_eq!(alice.recv().await, "+OK");
        assert_eq!(bob.recv().await, "BCST [alice] hello everyone");
        assert_eq!(carol.recv().await, "BCST [alice] hello everyone");
    }

    #[tokio::test]
    async fn test_lstus_tracks_connected_users() {
        let addr = start_server().await;
        let mut alice = TestClient::login(addr, "alice").await;
        let mut bob = TestClient::login(addr, "bob").await;

        alice.send("LSTUS").await;
        assert_eq!(alice.recv().await, "+OK [alice,bob]");

        bob.send("QUIT").await;
        assert_eq!(bob.recv().await, "+OK Goodbye");
        bob.assert_closed().await;

        // Deregistration runs after the socket closes; poll until it lands.
        let mut cleaned = false;
        for _ in 0..50 {
            alice.send("LSTUS").await;
            if alice.recv().await == "+OK [alice]" {
                cleaned = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(cleaned, "bob was never removed from the directory");
    }

    #[tokio::test]
    async fn test_whisper_delivery_and_missing_target() {
        let addr = start_server().await;
        let mut alice = TestClient::login(addr, "alice").await;
        let mut bob = TestClient::login(addr, "bob").await;

        alice.send("MSG bob hello there").await;
        assert_eq!(alice.recv().await, "+OK");
        assert_eq!(bob.recv().await, "WHISPER bob hello there");

        alice.send("MSG ghost hello").await;
        assert_eq!(alice.recv().await, "-ERR Username doesn't exist.");
    }

    #[tokio::test]
    async fn test_group_create_join_broadcast_and_member_leave() {
        let addr = start_server().await;
        let mut alice = TestClient::login(addr, "alice").await;
        let mut bob = TestClient::login(addr, "bob").await;

        alice.send("MKGRP team").await;
        assert_eq!(alice.recv().await, "+OK");
        alice.send("MKGRP team").await;
        assert_eq!(alice.recv().await, "-ERR groupname already exists");

        bob.send("JNGRP team").await;
        assert_eq!(bob.recv().await, "+OK");
        assert_eq!(alice.recv().await, "BCST [team] bob joined Group");
        bob.send("JNGRP team").await;
        assert_eq!(bob.recv().await, "-ERR already joined this group.");
        bob.send("JNGRP ghosts").await;
        assert_eq!(bob.recv().await, "-ERR Group doesn't exist.");

        bob.send("BCGRP team morning all").await;
        assert_eq!(bob.recv().await, "+OK");
        assert_eq!(alice.recv().await, "BCST [team] [bob]morning all");

        bob.send("LVGRP team").await;
        assert_eq!(bob.recv().await, "+OK");
        assert_eq!(alice.recv().await, "BCST [team] bob left the group");

        bob.send("BCGRP team hello again").await;
        assert_eq!(bob.recv().await, "-ERR not in this group");

        // bob was not the owner, so the group survives.
        bob.send("LSTGRP").await;
        assert_eq!(bob.recv().await, "+OK Groups: team");
    }

    #[tokio::test]
    async fn test_owner_leave_disbands_the_group() {
        let addr = start_server().await;
        let mut alice = TestClient::login(addr, "alice").await;
        let mut bob = TestClient::login(addr, "bob").await;

        alice.send("MKGRP team").await;
        assert_eq!(alice.recv().await, "+OK");
        bob.send("JNGRP team").await;
        assert_eq!(bob.recv().await, "+OK");
        assert_eq!(alice.recv().await, "BCST [team] bob joined Group");

        alice.send("LVGRP team").await;
        assert_eq!(alice.recv().await, "+OK");
        assert_eq!(bob.recv().await, "BCST [team] Disbanded");

        alice.send("LSTGRP").await;
        assert_eq!(alice.recv().await, "+OK Groups:");
        // bob's membership went away with the group.
        bob.send("LVGRP team").await;
        assert_eq!(bob.recv().await, "-ERR not in this group");
    }

    #[tokio::test]
    async fn test_kick_authorization_rules() {
        let addr = start_server().await;
        let mut alice = TestClient::login(addr, "alice").await;
        let mut bob = TestClient::login(addr, "bob").await;

        alice.send("MKGRP team").await;
        assert_eq!(alice.recv().await, "+OK");
        bob.send("JNGRP team").await;
        assert_eq!(bob.recv().await, "+OK");
        assert_eq!(alice.recv().await, "BCST [team] bob joined Group");

        bob.send("KICK team alice").await;
        assert_eq!(bob.recv().await, "-ERR You are not the owner");
        alice.send("KICK team alice").await;
        assert_eq!(alice.recv().await, "-ERR You cannot kick yourself");
        alice.send("KICK team ghost").await;
        assert_eq!(alice.recv().await, "-ERR User is not in this group");
        alice.send("KICK ghosts bob").await;
        assert_eq!(alice.recv().await, "-ERR You are not the owner");

        alice.send("KICK team bob").await;
        assert_eq!(alice.recv().await, "+OK");
        assert_eq!(bob.recv().await, "+OK kicked from group [team]");
        bob.send("BCGRP team am I still here").await;
        assert_eq!(bob.recv().await, "-ERR not in this group");
    }

    #[tokio::test]
    async fn test_disconnect_cleans_up_owned_groups() {
        let addr = start_server().await;
        let mut alice = TestClient::login(addr, "alice").await;
        let mut bob = TestClient::login(addr, "bob").await;

        alice.send("MKGRP team").await;
        assert_eq!(alice.recv().await, "+OK");
        bob.send("JNGRP team").await;
        assert_eq!(bob.recv().await, "+OK");
        assert_eq!(alice.recv().await, "BCST [team] bob joined Group");

        // Abrupt disconnect, no QUIT: same cascade as a graceful leave.
        drop(alice);
        assert_eq!(bob.recv().await, "BCST [team] Disbanded");

        let mut cleaned = false;
        for _ in 0..50 {
            bob.send("LSTGRP").await;
            if bob.recv().await == "+OK Groups:" {
                cleaned = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(cleaned, "disbanded group still listed");
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let addr = start_server().await;
        let mut alice = TestClient::login(addr, "alice").await;
        alice.send("NOPE whatever").await;
        assert_eq!(alice.recv().await, "-ERR Unknown command");
    }

    #[tokio::test]
    async fn test_file_transfer_end_to_end() {
        let addr = start_server().await;
        let mut alice = TestClient::login(addr, "alice").await;
        let mut bob = TestClient::login(addr, "bob").await;

        let payload = b"pretend this is a file".to_vec();
        alice.send("TRNSFR bob").await;
        alice
            .send_bytes(&transfer_frame("notes.txt", payload.len() as u64, &payload))
            .await;
        assert_eq!(alice.recv().await, "+OK");

        assert_eq!(bob.recv().await, "TRNSFR from alice");
        let name_len = u16::from_be_bytes(bob.recv_bytes(2).await.try_into().unwrap());
        assert_eq!(name_len, 9);
        assert_eq!(bob.recv_bytes(9).await, b"notes.txt");
        let payload_len = u64::from_be_bytes(bob.recv_bytes(8).await.try_into().unwrap());
        assert_eq!(payload_len, payload.len() as u64);
        assert_eq!(bob.recv_bytes(payload.len()).await, payload);
        assert_eq!(bob.recv().await, "+OK");
    }

    #[tokio::test]
    async fn test_truncated_transfer_forwards_nothing() {
        let addr = start_server().await;
        let mut alice = TestClient::login(addr, "alice").await;
        let mut bob = TestClient::login(addr, "bob").await;

        alice.send("TRNSFR bob").await;
        // Declare 100 bytes but deliver only 11, then die.
        alice
            .send_bytes(&transfer_frame("notes.txt", 100, &b"partial data"[..11]))
            .await;
        drop(alice);

        bob.assert_silent().await;
    }

    #[tokio::test]
    async fn test_transfer_to_missing_user_keeps_the_session_in_sync() {
        let addr = start_server().await;
        let mut alice = TestClient::login(addr, "alice").await;

        alice.send("TRNSFR ghost").await;
        alice.send_bytes(&transfer_frame("notes.txt", 5, b"hello")).await;
        assert_eq!(alice.recv().await, "-ERR Username doesn't exist.");

        // The binary frame was fully drained; line mode still works.
        alice.send("LSTUS").await;
        assert_eq!(alice.recv().await, "+OK [alice]");
    }

    #[tokio::test]
    async fn test_transfer_to_yourself_is_rejected() {
        let addr = start_server().await;
        let mut alice = TestClient::login(addr, "alice").await;

        alice.send("TRNSFR alice").await;
        alice.send_bytes(&transfer_frame("notes.txt", 5, b"hello")).await;
        assert_eq!(
            alice.recv().await,
            "-ERR You cannot transfer a file to yourself"
        );
    }

    #[tokio::test]
    async fn test_repeated_helo_is_rejected() {
        let addr = start_server().await;
        let mut alice = TestClient::login(addr, "alice").await;
        alice.send("HELO alice2").await;
        assert_eq!(alice.recv().await, "-ERR already logged in");
    }
}
