use std::sync::Arc;

use tokio::io::AsyncRead;

use shared::codec::{self, Reply};
use shared::logger;

use crate::directory::UserDirectory;
use crate::groups::{GroupError, GroupRegistry, LeaveOutcome};

use super::error::SessionError;
use super::transfer::{self, TransferError};
use super::writer::ClientWriter;

/// Handlers for the commands of an authenticated session. Borrowed fresh per
/// dispatch from the session's shared state.
pub(crate) struct CommandHandlers<'a> {
    pub directory: &'a UserDirectory,
    pub groups: &'a GroupRegistry,
    pub writer: &'a Arc<ClientWriter>,
    pub username: &'a str,
}

/// Usernames and group names share the same shape: 3 to 14 word characters.
pub(crate) fn is_valid_name(name: &str) -> bool {
    (3..=14).contains(&name.len())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn first_token(payload: &str) -> &str {
    payload.split_whitespace().next().unwrap_or("")
}

/// Splits `<target> <text>` payloads; a missing text portion becomes empty
/// rather than a parse failure, and target validation decides the reply.
fn split_target(payload: &str) -> (&str, &str) {
    match payload.split_once(' ') {
        Some((target, text)) => (target, text),
        None => (payload, ""),
    }
}

/// Best-effort fan-out of one line to a set of usernames. Peers that
/// disconnected since the member list was computed are skipped; a failed
/// write is the recipient's problem, never the sender's.
pub(crate) async fn notify_all(directory: &UserDirectory, members: &[String], line: &str) {
    for member in members {
        let Some(handle) = directory.lookup(member).await else {
            continue;
        };
        if let Err(e) = handle.writer.send_line(line).await {
            logger::log_warning(&format!("Failed to notify {}: {}", member, e));
        }
    }
}

impl CommandHandlers<'_> {
    async fn reply(&self, reply: Reply) -> Result<(), SessionError> {
        self.writer.send_line(&reply.to_string()).await?;
        Ok(())
    }

    pub async fn handle_bcst(&self, text: &str) -> Result<(), SessionError> {
        let line = codec::broadcast(self.username, text);
        for (name, handle) in self.directory.peers(self.username).await {
            if let Err(e) = handle.writer.send_line(&line).await {
                logger::log_warning(&format!("Failed to send broadcast to {}: {}", name, e));
            }
        }
        self.reply(Reply::Ok).await
    }

    pub async fn handle_lstus(&self) -> Result<(), SessionError> {
        let users = self.directory.snapshot().await;
        self.reply(Reply::OkWith(format!("[{}]", users.join(",")))).await
    }

    pub async fn handle_msg(&self, payload: &str) -> Result<(), SessionError> {
        let (recipient, text) = split_target(payload);
        let Some(handle) = self.directory.lookup(recipient).await else {
            return self.reply(Reply::Err("Username doesn't exist.".to_string())).await;
        };
        if let Err(e) = handle.writer.send_line(&codec::whisper(recipient, text)).await {
            logger::log_warning(&format!("Failed to whisper to {}: {}", recipient, e));
        }
        self.reply(Reply::Ok).await
    }

    pub async fn handle_mkgrp(&self, payload: &str) -> Result<(), SessionError> {
        let name = first_token(payload);
        if !is_valid_name(name) {
            return self
                .reply(Reply::Err(
                    "groupname has an invalid format (only characters, numbers and underscores are allowed)"
                        .to_string(),
                ))
                .await;
        }
        match self.groups.create(name, self.username).await {
            Ok(()) => self.reply(Reply::Ok).await,
            Err(_) => self.reply(Reply::Err("groupname already exists".to_string())).await,
        }
    }

    pub async fn handle_jngrp(&self, payload: &str) -> Result<(), SessionError> {
        let name = first_token(payload);
        match self.groups.join(name, self.username).await {
            Ok(others) => {
                self.reply(Reply::Ok).await?;
                let notice = codec::group_notice(name, &format!("{} joined Group", self.username));
                notify_all(self.directory, &others, &notice).await;
                Ok(())
            }
            Err(GroupError::AlreadyJoined) => {
                self.reply(Reply::Err("already joined this group.".to_string())).await
            }
            Err(_) => self.reply(Reply::Err("Group doesn't exist.".to_string())).await,
        }
    }

    pub async fn handle_lstgrp(&self) -> Result<(), SessionError> {
        let groups = self.groups.list().await;
        self.reply(Reply::OkWith(format!("Groups: {}", groups.join("; ")))).await
    }

    pub async fn handle_bcgrp(&self, payload: &str) -> Result<(), SessionError> {
        let (name, text) = split_target(payload);
        match self.groups.members_except(name, self.username).await {
            Ok(members) => {
                let line = codec::group_notice(name, &format!("[{}]{}", self.username, text));
                notify_all(self.directory, &members, &line).await;
                self.reply(Reply::Ok).await
            }
            Err(_) => self.reply(Reply::Err("not in this group".to_string())).await,
        }
    }

    pub async fn handle_lvgrp(&self, payload: &str) -> Result<(), SessionError> {
        let name = first_token(payload);
        match self.groups.leave(name, self.username).await {
            Ok(outcome) => {
                self.reply(Reply::Ok).await?;
                match outcome {
                    LeaveOutcome::Left { remaining } => {
                        let notice =
                            codec::group_notice(name, &format!("{} left the group", self.username));
                        notify_all(self.directory, &remaining, &notice).await;
                    }
                    LeaveOutcome::Disbanded { evicted } => {
                        let notice = codec::group_notice(name, "Disbanded");
                        notify_all(self.directory, &evicted, &notice).await;
                    }
                }
                Ok(())
            }
            Err(_) => self.reply(Reply::Err("not in this group".to_string())).await,
        }
    }

    pub async fn handle_kick(&self, payload: &str) -> Result<(), SessionError> {
        let (name, target) = split_target(payload);
        let target = target.trim();
        match self.groups.kick(name, self.username, target).await {
            Ok(()) => {
                if let Some(handle) = self.directory.lookup(target).await {
                    if let Err(e) = handle.writer.send_line(&codec::kick_notice(name)).await {
                        logger::log_warning(&format!(
                            "Failed to notify kicked user {}: {}",
                            target, e
                        ));
                    }
                }
                self.reply(Reply::Ok).await
            }
            Err(GroupError::KickSelf) => {
                self.reply(Reply::Err("You cannot kick yourself".to_string())).await
            }
            Err(GroupError::NotAMember) => {
                self.reply(Reply::Err("User is not in this group".to_string())).await
            }
            Err(_) => self.reply(Reply::Err("You are not the owner".to_string())).await,
        }
    }

    /// Runs the binary sub-protocol on the sender's stream, then forwards to
    /// the recipient. The frame is consumed before any verdict so the line
    /// protocol stays in sync regardless of the outcome.
    pub async fn handle_trnsfr<R>(&self, payload: &str, reader: &mut R) -> Result<(), SessionError>
    where
        R: AsyncRead + Unpin,
    {
        let recipient = first_token(payload);
        let file = match transfer::receive_file(reader).await {
            Ok(file) => file,
            Err(TransferError::Io(e)) => return Err(SessionError::Io(e)),
            Err(e) => {
                logger::log_warning(&format!(
                    "Rejected file transfer from {}: {}",
                    self.username, e
                ));
                return self.reply(Reply::Err("Failed to receive file".to_string())).await;
            }
        };

        if recipient == self.username {
            return self
                .reply(Reply::Err("You cannot transfer a file to yourself".to_string()))
                .await;
        }
        let Some(handle) = self.directory.lookup(recipient).await else {
            return self.reply(Reply::Err("Username doesn't exist.".to_string())).await;
        };

        logger::log_system(&format!(
            "[FILE] {} -> {} ('{}', {} bytes)",
            self.username,
            recipient,
            file.filename,
            file.payload.len()
        ));
        match handle
            .writer
            .send_file(&codec::transfer_notice(self.username), &file.filename, &file.payload)
            .await
        {
            Ok(()) => self.reply(Reply::Ok).await,
            Err(e) => {
                logger::log_warning(&format!("Failed to forward file to {}: {}", recipient, e));
                self.reply(Reply::Err("Failed to receive file".to_string())).await
            }
        }
    }
}
