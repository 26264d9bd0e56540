//! Line codec for the chat protocol.
//!
//! Every control message is one newline-terminated UTF-8 line. Requests are
//! `<VERB>[ <payload>]`, responses are `+OK[ <body>]` or `-ERR <reason>`.
//! Server-initiated deliveries (broadcasts, whispers, transfer notices) use
//! their own verb-prefixed line forms, built by the free functions below.
//!
//! The codec only tokenizes: the first whitespace-delimited word becomes the
//! verb, the rest is handed over as a raw payload. Semantic validation is the
//! session's job.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Helo,
    Bcst,
    Lstus,
    Msg,
    Mkgrp,
    Jngrp,
    Lstgrp,
    Bcgrp,
    Lvgrp,
    Kick,
    Trnsfr,
    Quit,
    Unknown,
}

impl From<&str> for Verb {
    fn from(word: &str) -> Self {
        match word {
            "HELO" => Verb::Helo,
            "BCST" => Verb::Bcst,
            "LSTUS" => Verb::Lstus,
            "MSG" => Verb::Msg,
            "MKGRP" => Verb::Mkgrp,
            "JNGRP" => Verb::Jngrp,
            "LSTGRP" => Verb::Lstgrp,
            "BCGRP" => Verb::Bcgrp,
            "LVGRP" => Verb::Lvgrp,
            "KICK" => Verb::Kick,
            "TRNSFR" => Verb::Trnsfr,
            "QUIT" => Verb::Quit,
            _ => Verb::Unknown,
        }
    }
}

/// One decoded request line: a verb tag plus the raw remainder of the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub verb: Verb,
    pub payload: String,
}

impl Request {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line.split_once(char::is_whitespace) {
            Some((word, rest)) => Request {
                verb: Verb::from(word),
                payload: rest.trim_start().to_string(),
            },
            None => Request {
                verb: Verb::from(line),
                payload: String::new(),
            },
        }
    }
}

/// Response status rendered back to the requesting client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    OkWith(String),
    Err(String),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => write!(f, "+OK"),
            Reply::OkWith(body) => write!(f, "+OK {}", body),
            Reply::Err(reason) => write!(f, "-ERR {}", reason),
        }
    }
}

/// Banner sent as soon as a connection is accepted.
pub fn welcome(text: &str) -> String {
    format!("HELO {}", text)
}

/// Server-wide broadcast as delivered to everyone but the sender.
pub fn broadcast(sender: &str, text: &str) -> String {
    format!("BCST [{}] {}", sender, text)
}

/// Group-scoped delivery; `body` already carries the sender tag when the
/// message originated from a member rather than from the server.
pub fn group_notice(group: &str, body: &str) -> String {
    format!("BCST [{}] {}", group, body)
}

/// Private message as delivered to the recipient.
pub fn whisper(recipient: &str, text: &str) -> String {
    format!("WHISPER {} {}", recipient, text)
}

/// Line announcing an inbound file right before its binary frame.
pub fn transfer_notice(sender: &str) -> String {
    format!("TRNSFR from {}", sender)
}

/// Line delivered to a member that was kicked out of a group.
pub fn kick_notice(group: &str) -> String {
    format!("+OK kicked from group [{}]", group)
}
