use std::{io, thread};

use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::warn;
use yao_sets::session::SetHandle;

const HELP: &str = "\
commands:
  help              show this message
  show              print the current set
  set <v1> <v2> ... replace the set (used from the next session on)
  exit              stop after the running session";

/// A command typed into the evaluator's console.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    Show,
    Set(Vec<u64>),
    Exit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        match words.next() {
            Some("help") | None => Ok(Command::Help),
            Some("show") => Ok(Command::Show),
            Some("exit") | Some("quit") => Ok(Command::Exit),
            Some("set") => words
                .flat_map(|w| w.split(','))
                .filter(|w| !w.is_empty())
                .map(|w| {
                    w.parse::<u64>()
                        .map_err(|_| format!("'{w}' is not an unsigned integer"))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Command::Set),
            Some(other) => Err(format!("unknown command '{other}', type 'help'")),
        }
    }
}

/// Reads commands from stdin until `exit` or the end of the input, then notifies `exit`.
pub async fn run(set: SetHandle, exit: Sender<()>) -> anyhow::Result<()> {
    let mut lines = stdin_lines();
    println!("{HELP}");
    while let Some(line) = lines.recv().await {
        match Command::parse(&line?) {
            Ok(Command::Help) => println!("{HELP}"),
            Ok(Command::Show) => println!("{:?}", set.snapshot()),
            Ok(Command::Set(values)) => {
                let previous = set.replace(values);
                println!("replaced {previous:?} with {:?}", set.snapshot());
            }
            Ok(Command::Exit) => break,
            Err(e) => warn!("{e}"),
        }
    }
    // the receiver is gone if the server stopped on its own
    let _ = exit.send(()).await;
    Ok(())
}

/// Forwards the lines of stdin from a plain thread.
///
/// A blocking read on a thread of the runtime would keep the process alive until the next line
/// arrives, even after the server has stopped.
fn stdin_lines() -> Receiver<io::Result<String>> {
    let (tx, rx) = mpsc::channel(8);
    thread::spawn(move || {
        for line in io::stdin().lines() {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_commands() {
        assert_eq!(Command::parse(""), Ok(Command::Help));
        assert_eq!(Command::parse("show"), Ok(Command::Show));
        assert_eq!(Command::parse("set 1 2,3"), Ok(Command::Set(vec![1, 2, 3])));
        assert_eq!(Command::parse("set"), Ok(Command::Set(vec![])));
        assert_eq!(Command::parse("  exit "), Ok(Command::Exit));
        assert!(Command::parse("set -1").is_err());
        assert!(Command::parse("launch").is_err());
    }
}
