use std::{net::SocketAddr, path::PathBuf};

use clap::{Parser, Subcommand};
use yao_sets::msg::Operation;

/// Computes the sum or the common elements of two private sets using garbled circuits.
#[derive(Debug, Parser)]
#[command(name = "yao-sets")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Garbles the circuits and connects to a running evaluator.
    Alice {
        /// The address of the evaluator.
        #[arg(long, short, default_value = "127.0.0.1:8000")]
        addr: SocketAddr,
        /// The operation to compute, `sum` or `compare`.
        #[arg(long, short, default_value = "sum")]
        operation: Operation,
        /// The elements of the set, separated by commas.
        #[arg(long, short, value_delimiter = ',', num_args = 0..)]
        set: Vec<u64>,
        /// Writes the compiled circuit as JSON to this file.
        #[arg(long)]
        circuit_out: Option<PathBuf>,
        /// The evaluator's set, to check the outcome against the computation in the clear.
        #[arg(long, value_delimiter = ',', num_args = 0..)]
        check_against: Option<Vec<u64>>,
        /// Prints the garbled table of every gate, for every round.
        #[arg(long)]
        print_tables: bool,
    },
    /// Listens for garblers and evaluates their circuits, one session after the other.
    Bob {
        /// The address to listen on.
        #[arg(long, short, default_value = "127.0.0.1:8000")]
        addr: SocketAddr,
        /// The elements of the set, separated by commas.
        #[arg(long, short, value_delimiter = ',', num_args = 0..)]
        set: Vec<u64>,
        /// Stops after this many sessions.
        #[arg(long)]
        sessions: Option<usize>,
        /// Reads commands from stdin to inspect and replace the set between sessions.
        #[arg(long)]
        console: bool,
    },
}
