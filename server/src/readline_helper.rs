use std::io::IsTerminal;

use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{CompletionType, Config, Editor};
use tokio::sync::mpsc;

use shared::logger;

use crate::completer::ConsoleCompleter;

/// Runs the rustyline admin console on a dedicated thread, feeding lines to
/// the server loop. Returns `None` when stdin is not a TTY; dropping the
/// sender (EOF, ctrl-c, editor failure) signals shutdown to the receiver.
pub fn spawn_readline_handler() -> Option<mpsc::Receiver<String>> {
    if !std::io::stdin().is_terminal() {
        return None;
    }

    let (tx, rx) = mpsc::channel(32);
    std::thread::spawn(move || {
        let config = Config::builder()
            .completion_type(CompletionType::List)
            .build();
        let mut editor: Editor<ConsoleCompleter, DefaultHistory> =
            match Editor::with_config(config) {
                Ok(editor) => editor,
                Err(e) => {
                    logger::log_error(&format!("Failed to start admin console: {}", e));
                    return;
                }
            };
        editor.set_helper(Some(ConsoleCompleter::new()));

        loop {
            match editor.readline("> ") {
                Ok(line) => {
                    let _ = editor.add_history_entry(line.as_str());
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => {
                    logger::log_error(&format!("Admin console error: {}", e));
                    break;
                }
            }
        }
    });
    Some(rx)
}
