use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Context, Error};
use clap::Parser;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use yao_sets::{
    circuit::CircuitDescription,
    protocol::{Garbler, Party},
    session::{EvaluatorSession, expected_outcome},
};

use crate::{
    channel::TcpChannel,
    cli::{Cli, Command},
};

mod channel;
mod cli;
mod console;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let Cli { command } = Cli::parse();
    match command {
        Command::Alice {
            addr,
            operation,
            set,
            circuit_out,
            check_against,
            print_tables,
        } => {
            let garbler = Garbler::new(set.clone(), operation);
            let garbler = if print_tables {
                garbler.keep_tables()
            } else {
                garbler
            };
            alice(addr, garbler, set, circuit_out, check_against).await
        }
        Command::Bob {
            addr,
            set,
            sessions,
            console,
        } => bob(addr, set, sessions, console).await,
    }
}

async fn alice(
    addr: SocketAddr,
    mut garbler: Garbler,
    set: Vec<u64>,
    circuit_out: Option<PathBuf>,
    check_against: Option<Vec<u64>>,
) -> Result<(), Error> {
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("Could not connect to the evaluator at {addr}"))?;
    info!("connected to {addr}");
    let channel = TcpChannel::new(stream);
    let outcome = garbler.run(&channel).await?;
    println!("{outcome}");

    for (round, tables) in garbler.tables().unwrap_or_default().iter().enumerate() {
        println!("round {round}:");
        for (gate, table) in tables {
            println!("gate {gate}:\n{table}");
        }
    }

    if let (Some(path), Some(circuit)) = (circuit_out, garbler.circuit()) {
        let json = CircuitDescription::single(circuit.clone()).to_json()?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Could not write the circuit to {}", path.display()))?;
        info!("wrote the circuit to {}", path.display());
    }
    if let Some(bob) = check_against {
        let expected = expected_outcome(garbler.operation(), &set, &bob);
        if expected == outcome {
            info!("the outcome matches the computation in the clear");
        } else {
            warn!("the computation in the clear yields {expected}");
        }
    }
    Ok(())
}

async fn bob(
    addr: SocketAddr,
    set: Vec<u64>,
    sessions: Option<usize>,
    console: bool,
) -> Result<(), Error> {
    let mut session = EvaluatorSession::new(set);
    // exit_tx lives until the server stops, so exit_rx only yields when the console exits
    let (exit_tx, mut exit_rx) = mpsc::channel(1);
    if console {
        let handle = session.handle();
        let exit = exit_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = console::run(handle, exit).await {
                error!("console failed: {e:#}");
            }
        });
    }

    let listener = TcpListener::bind(addr).await?;
    info!("listening on {addr}");
    while sessions.is_none_or(|max| session.sessions() < max) {
        let stream = tokio::select! {
            biased;
            _ = exit_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                info!("session with {peer}");
                stream
            }
        };
        let channel = TcpChannel::new(stream);
        match session.serve_once(&channel).await {
            Ok(outcome) => println!("{outcome}"),
            // a failed session does not stop the server
            Err(e) => error!("session failed: {e}"),
        }
    }
    info!("served {} sessions", session.sessions());
    drop(exit_tx);
    Ok(())
}
