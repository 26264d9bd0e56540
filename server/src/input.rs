use std::fmt;

/// One admin console command: name, argument hint, and help text. The table
/// drives completion and `/help` output.
pub struct ConsoleCommand {
    pub name: &'static str,
    pub usage: Option<&'static str>,
    pub description: &'static str,
}

pub const COMMANDS: &[ConsoleCommand] = &[
    ConsoleCommand {
        name: "/help",
        usage: None,
        description: "Show this help message",
    },
    ConsoleCommand {
        name: "/list",
        usage: None,
        description: "List all connected users",
    },
    ConsoleCommand {
        name: "/groups",
        usage: None,
        description: "List all live groups",
    },
    ConsoleCommand {
        name: "/kick",
        usage: Some("<user>"),
        description: "Force-disconnect a user",
    },
    ConsoleCommand {
        name: "/quit",
        usage: None,
        description: "Shutdown the server",
    },
];

pub fn completion_names() -> Vec<&'static str> {
    COMMANDS.iter().map(|command| command.name).collect()
}

pub fn help_text() -> Vec<String> {
    let mut lines = vec!["Available server commands:".to_string()];
    for command in COMMANDS {
        let mut line = format!("  {}", command.name);
        if let Some(usage) = command.usage {
            line.push_str(&format!(" {}", usage));
        }
        line.push_str(&format!(" - {}", command.description));
        lines.push(line);
    }
    lines
}

#[derive(Debug, PartialEq, Eq)]
pub enum UserInputError {
    InvalidCommand,
}

impl fmt::Display for UserInputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserInputError::InvalidCommand => write!(f, "invalid command"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ServerUserInput {
    Help,
    ListUsers,
    ListGroups,
    Kick(String),
    Quit,
}

impl TryFrom<&str> for ServerUserInput {
    type Error = UserInputError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        match trimmed {
            "/quit" | "/q" => Ok(ServerUserInput::Quit),
            "/help" | "/h" => Ok(ServerUserInput::Help),
            "/list" => Ok(ServerUserInput::ListUsers),
            "/groups" => Ok(ServerUserInput::ListGroups),
            _ => {
                if let Some(username) = trimmed.strip_prefix("/kick ") {
                    let username = username.trim();
                    if username.is_empty() {
                        Err(UserInputError::InvalidCommand)
                    } else {
                        Ok(ServerUserInput::Kick(username.to_string()))
                    }
                } else {
                    Err(UserInputError::InvalidCommand)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_commands() {
        assert_eq!(ServerUserInput::try_from("/quit"), Ok(ServerUserInput::Quit));
        assert_eq!(ServerUserInput::try_from("/q"), Ok(ServerUserInput::Quit));
    }

    #[test]
    fn test_list_commands() {
        assert_eq!(
            ServerUserInput::try_from("/list"),
            Ok(ServerUserInput::ListUsers)
        );
        assert_eq!(
            ServerUserInput::try_from("/groups"),
            Ok(ServerUserInput::ListGroups)
        );
    }

    #[test]
    fn test_kick_command() {
        assert_eq!(
            ServerUserInput::try_from("/kick alice"),
            Ok(ServerUserInput::Kick("alice".to_string()))
        );
        assert_eq!(
            ServerUserInput::try_from("/kick   bob  "),
            Ok(ServerUserInput::Kick("bob".to_string()))
        );
    }

    #[test]
    fn test_kick_without_username_is_invalid() {
        assert_eq!(
            ServerUserInput::try_from("/kick"),
            Err(UserInputError::InvalidCommand)
        );
        assert_eq!(
            ServerUserInput::try_from("/kick   "),
            Err(UserInputError::InvalidCommand)
        );
    }

    #[test]
    fn test_unknown_command_is_invalid() {
        assert_eq!(
            ServerUserInput::try_from("/nope"),
            Err(UserInputError::InvalidCommand)
        );
        assert_eq!(
            ServerUserInput::try_from("hello"),
            Err(UserInputError::InvalidCommand)
        );
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        assert_eq!(
            ServerUserInput::try_from("  /help  "),
            Ok(ServerUserInput::Help)
        );
    }

    #[test]
    fn test_help_text_covers_every_command() {
        let help = help_text();
        for command in COMMANDS {
            assert!(help.iter().any(|line| line.contains(command.name)));
        }
    }
}
