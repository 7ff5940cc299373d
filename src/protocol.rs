//! The two-party protocol: a garbler and an evaluator computing a function of their sets.
//!
//! A session runs over a single [`Channel`] and is strictly sequential, every message is awaited
//! before the next one is sent:
//!
//! 1. the garbler sends the natural bit length of its inputs, the evaluator replies with the
//!    agreed bit length (one more than the larger of both natural bit lengths);
//! 2. the garbler announces the [`Operation`], the evaluator acknowledges it;
//! 3. the oblivious transfer is set up once for the whole session;
//! 4. for every input of the evaluator, the evaluator asks for a round and the garbler sends a
//!    freshly garbled circuit together with the labels of its own inputs, the evaluator obtains
//!    the labels of its inputs by oblivious transfer, evaluates the circuit and sends the decoded
//!    output back;
//! 5. the evaluator ends the session with [`Msg::EndOfRounds`].
//!
//! Both parties learn the [`Outcome`]. A sum takes a single round, a comparison one round per
//! element of the evaluator's set. The end of rounds reveals the size of the evaluator's set to
//! the garbler.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
    future::Future,
};

use rand::{SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha20Rng;
use tracing::{Level, debug, info, instrument};

use crate::{
    channel::{self, Channel, SimpleChannel, recv_from, send_to},
    circuit::{Circuit, CircuitError, WireId},
    compiler::{addition, compare},
    data_types::{GarbledGate, WireValue},
    evaluate::{EvalError, decode, evaluate},
    garble::{self, garble},
    msg::{CircuitPayload, Msg, Operation},
    ot,
    utils::{bit_length, from_bits, to_bits},
};

/// The largest bit length that two parties can agree on (one more than a 64-bit input).
pub const MAX_BIT_LENGTH: u32 = u64::BITS + 1;

/// A custom error type for the garbled circuit protocol.
#[derive(Debug)]
pub enum Error {
    /// The circuit is invalid or could not be compiled.
    Circuit(CircuitError),
    /// The circuit could not be garbled.
    Garbling(garble::Error),
    /// The oblivious transfer of the evaluator's labels failed.
    Ot(ot::Error),
    /// The garbled circuit could not be evaluated.
    Evaluation(EvalError),
    /// A message could not be sent or received.
    Channel(channel::Error),
    /// The other party sent a message that is not valid at this point of the protocol.
    UnexpectedMsg {
        /// The message(s) that would have been valid.
        expected: &'static str,
        /// The kind of message that was received.
        actual: &'static str,
    },
    /// The inputs or parameters of the session are invalid.
    InvalidInput(String),
    /// The runtime of the simulation could not be started.
    Runtime(std::io::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Circuit(e) => write!(f, "Invalid circuit: {e}"),
            Error::Garbling(e) => write!(f, "Garbling failed: {e}"),
            Error::Ot(e) => write!(f, "Oblivious transfer failed: {e}"),
            Error::Evaluation(e) => write!(f, "Evaluation failed: {e}"),
            Error::Channel(e) => write!(f, "Channel error: {e}"),
            Error::UnexpectedMsg { expected, actual } => {
                write!(f, "Expected a message of kind '{expected}', received '{actual}'")
            }
            Error::InvalidInput(e) => write!(f, "Invalid input: {e}"),
            Error::Runtime(e) => write!(f, "Could not start the runtime: {e}"),
        }
    }
}

impl From<CircuitError> for Error {
    fn from(e: CircuitError) -> Self {
        Self::Circuit(e)
    }
}

impl From<garble::Error> for Error {
    fn from(e: garble::Error) -> Self {
        match e {
            garble::Error::InvalidCircuit(e) => Self::Circuit(e),
            e => Self::Garbling(e),
        }
    }
}

impl From<ot::Error> for Error {
    fn from(e: ot::Error) -> Self {
        Self::Ot(e)
    }
}

impl From<EvalError> for Error {
    fn from(e: EvalError) -> Self {
        match e {
            EvalError::InvalidCircuit(e) => Self::Circuit(e),
            e => Self::Evaluation(e),
        }
    }
}

impl From<channel::Error> for Error {
    fn from(e: channel::Error) -> Self {
        Self::Channel(e)
    }
}

/// The result of a session, learned by both parties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The sum of all elements of both sets.
    Sum(u128),
    /// The elements that both sets have in common.
    Common(BTreeSet<u64>),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Sum(sum) => write!(f, "sum = {sum}"),
            Outcome::Common(common) => {
                let common: Vec<String> = common.iter().map(|v| v.to_string()).collect();
                write!(f, "common elements = {{{}}}", common.join(", "))
            }
        }
    }
}

/// A participant of the protocol.
pub trait Party {
    /// Runs a complete session with the other party over the channel.
    fn run(&mut self, channel: &impl Channel) -> impl Future<Output = Result<Outcome, Error>>;
}

/// The party that compiles and garbles the circuits ("Alice").
#[derive(Debug)]
pub struct Garbler {
    set: Vec<u64>,
    operation: Operation,
    rng: ChaCha20Rng,
    circuit: Option<Circuit>,
    tables: Option<Vec<BTreeMap<WireId, GarbledGate>>>,
}

impl Garbler {
    /// A garbler with a fresh random generator.
    pub fn new(set: Vec<u64>, operation: Operation) -> Self {
        Self::with_rng(set, operation, ChaCha20Rng::from_rng(&mut rand::rng()))
    }

    /// A garbler drawing its labels and permutation bits from `rng`.
    pub fn with_rng(set: Vec<u64>, operation: Operation, rng: ChaCha20Rng) -> Self {
        Self {
            set,
            operation,
            rng,
            circuit: None,
            tables: None,
        }
    }

    /// Keeps a copy of the garbled tables sent in every round.
    pub fn keep_tables(mut self) -> Self {
        self.tables = Some(vec![]);
        self
    }

    /// The garbled tables of every round of the last session, if they are kept.
    pub fn tables(&self) -> Option<&[BTreeMap<WireId, GarbledGate>]> {
        self.tables.as_deref()
    }

    /// The bit length needed for the garbler's inputs to the operation.
    fn natural_bit_length(&self) -> Result<u32, Error> {
        match self.operation {
            Operation::Sum => Ok(bit_length(set_sum(&self.set)?)),
            Operation::Compare => Ok(bit_length(self.set.iter().copied().max().unwrap_or(0))),
        }
    }

    /// The operation computed in every session.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// The circuit compiled for the last session, if any.
    pub fn circuit(&self) -> Option<&Circuit> {
        self.circuit.as_ref()
    }

    fn compile(&self, bits: u32) -> Result<(Circuit, Vec<bool>), Error> {
        let bits = bits as usize;
        match self.operation {
            Operation::Sum => {
                let sum = set_sum(&self.set)?;
                Ok((addition(bits, 1)?, to_bits(sum, bits)))
            }
            Operation::Compare => {
                if self.set.is_empty() {
                    return Err(Error::InvalidInput(
                        "the garbler needs at least one element to compare".into(),
                    ));
                }
                let inputs = self.set.iter().flat_map(|v| to_bits(*v, bits)).collect();
                Ok((compare(bits, self.set.len())?, inputs))
            }
        }
    }
}

impl Party for Garbler {
    #[instrument(level = Level::DEBUG, skip_all, fields(party = "garbler"), err)]
    async fn run(&mut self, channel: &impl Channel) -> Result<Outcome, Error> {
        let natural = self.natural_bit_length()?;
        send_msg(channel, &Msg::BitLength(natural)).await?;
        let bits = match recv_msg(channel, "agreed bit length").await? {
            Msg::AgreedBitLength(bits) => bits,
            msg => return Err(unexpected("agreed bit length", &msg)),
        };
        if bits <= natural || bits > MAX_BIT_LENGTH {
            return Err(Error::InvalidInput(format!(
                "cannot use {bits} bits for inputs of {natural} bits"
            )));
        }
        debug!(natural, bits, "agreed on the bit length");

        send_msg(channel, &Msg::Operation(self.operation)).await?;
        match recv_msg(channel, "ack").await? {
            Msg::Ack => {}
            msg => return Err(unexpected("ack", &msg)),
        }

        let (circuit, inputs) = self.compile(bits)?;
        self.circuit = Some(circuit.clone());
        if let Some(tables) = &mut self.tables {
            tables.clear();
        }
        let mut ot = ot::Sender::init(channel, &mut self.rng).await?;
        let mut outcome = Outcome::empty(self.operation);
        let mut rounds = 0;
        loop {
            match recv_msg(channel, "next round").await? {
                Msg::NextRound => {}
                Msg::EndOfRounds => break,
                msg => return Err(unexpected("next round or end of rounds", &msg)),
            }
            if self.operation == Operation::Sum && rounds > 0 {
                return Err(Error::UnexpectedMsg {
                    expected: "end of rounds",
                    actual: Msg::NextRound.kind(),
                });
            }
            rounds += 1;

            let (garbled, keys) = garble(&circuit, &mut self.rng)?;
            if let Some(tables) = &mut self.tables {
                tables.push(garbled.tables.clone());
            }
            let garbler_inputs = circuit
                .alice
                .iter()
                .zip(&inputs)
                .map(|(w, bit)| Ok((*w, keys.encode(*w, *bit)?)))
                .collect::<Result<BTreeMap<_, _>, garble::Error>>()?;
            let payload = CircuitPayload {
                circuit: circuit.clone(),
                tables: garbled.tables,
                decoding: garbled.decoding,
                garbler_inputs,
            };
            send_msg(channel, &Msg::Circuit(Box::new(payload))).await?;

            let pairs = circuit
                .bob
                .iter()
                .map(|w| keys.ot_pair(*w))
                .collect::<Result<Vec<_>, _>>()?;
            ot.send(channel, &pairs).await?;

            let output = match recv_msg(channel, "result").await? {
                Msg::Result(output) => output,
                msg => return Err(unexpected("result", &msg)),
            };
            outcome.update(&circuit, &output)?;
            debug!(rounds, "finished round");
        }
        if rounds == 0 && self.operation == Operation::Sum {
            return Err(Error::UnexpectedMsg {
                expected: "next round",
                actual: Msg::EndOfRounds.kind(),
            });
        }
        info!(rounds, %outcome, "session complete");
        Ok(outcome)
    }
}

/// The party that evaluates the garbled circuits ("Bob").
#[derive(Debug)]
pub struct Evaluator {
    set: Vec<u64>,
    rng: ChaCha20Rng,
}

impl Evaluator {
    /// An evaluator with a fresh random generator.
    pub fn new(set: Vec<u64>) -> Self {
        Self::with_rng(set, ChaCha20Rng::from_rng(&mut rand::rng()))
    }

    /// An evaluator drawing its OT secrets and the order of its rounds from `rng`.
    pub fn with_rng(set: Vec<u64>, rng: ChaCha20Rng) -> Self {
        Self { set, rng }
    }

    async fn round(
        &mut self,
        channel: &impl Channel,
        ot: &mut ot::Receiver,
        bits: u32,
        input: u64,
    ) -> Result<(Circuit, BTreeMap<WireId, bool>), Error> {
        send_msg(channel, &Msg::NextRound).await?;
        let payload = match recv_msg(channel, "circuit").await? {
            Msg::Circuit(payload) => *payload,
            msg => return Err(unexpected("circuit", &msg)),
        };
        let CircuitPayload {
            circuit,
            tables,
            decoding,
            garbler_inputs,
        } = payload;
        if circuit.bob.len() != bits as usize {
            return Err(CircuitError::WrongInputSize {
                expected: bits as usize,
                actual: circuit.bob.len(),
            }
            .into());
        }

        let choices = to_bits(input, circuit.bob.len());
        let blocks = ot.receive(channel, &choices, &mut self.rng).await?;
        let mut inputs: HashMap<WireId, WireValue> = garbler_inputs.into_iter().collect();
        for (i, (w, block)) in circuit.bob.iter().zip(&blocks).enumerate() {
            let value = WireValue::from_block(block).ok_or(ot::Error::MalformedTransfer(i))?;
            inputs.insert(*w, value);
        }

        let masked = evaluate(&circuit, &tables, &inputs)?;
        let output = decode(&masked, &decoding)?;
        send_msg(channel, &Msg::Result(output.clone())).await?;
        Ok((circuit, output))
    }
}

impl Party for Evaluator {
    #[instrument(level = Level::DEBUG, skip_all, fields(party = "evaluator"), err)]
    async fn run(&mut self, channel: &impl Channel) -> Result<Outcome, Error> {
        // the operation is not known yet, a set whose sum overflows can still be compared
        let sum = set_sum(&self.set);
        let natural = sum.as_ref().map_or(u64::BITS, |sum| bit_length(*sum));
        let theirs = match recv_msg(channel, "bit length").await? {
            Msg::BitLength(bits) => bits,
            msg => return Err(unexpected("bit length", &msg)),
        };
        if theirs == 0 || theirs >= MAX_BIT_LENGTH {
            return Err(Error::InvalidInput(format!(
                "the garbler's inputs cannot have {theirs} bits"
            )));
        }
        let bits = natural.max(theirs) + 1;
        send_msg(channel, &Msg::AgreedBitLength(bits)).await?;
        debug!(natural, bits, "agreed on the bit length");

        let operation = match recv_msg(channel, "operation").await? {
            Msg::Operation(operation) => operation,
            msg => return Err(unexpected("operation", &msg)),
        };
        send_msg(channel, &Msg::Ack).await?;

        let inputs = match operation {
            Operation::Sum => vec![sum?],
            Operation::Compare => {
                let mut set = self.set.clone();
                set.shuffle(&mut self.rng);
                set
            }
        };
        let mut ot = ot::Receiver::init(channel).await?;
        let mut outcome = Outcome::empty(operation);
        for input in inputs {
            let (circuit, output) = self.round(channel, &mut ot, bits, input).await?;
            outcome.update(&circuit, &output)?;
        }
        send_msg(channel, &Msg::EndOfRounds).await?;
        info!(%outcome, "session complete");
        Ok(outcome)
    }
}

impl Outcome {
    fn empty(operation: Operation) -> Self {
        match operation {
            Operation::Sum => Outcome::Sum(0),
            Operation::Compare => Outcome::Common(BTreeSet::new()),
        }
    }

    /// Folds the decoded output of one round into the outcome.
    fn update(&mut self, circuit: &Circuit, output: &BTreeMap<WireId, bool>) -> Result<(), Error> {
        let bits = circuit
            .out
            .iter()
            .map(|w| {
                output.get(w).copied().ok_or_else(|| {
                    Error::InvalidInput(format!("the result has no bit for output wire {w}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        match self {
            Outcome::Sum(sum) => *sum = from_bits(&bits),
            Outcome::Common(common) => {
                if let Some((true, value)) = bits.split_first() {
                    let value = u64::try_from(from_bits(value)).map_err(|_| {
                        Error::InvalidInput("a common element does not fit into 64 bits".into())
                    })?;
                    common.insert(value);
                }
            }
        }
        Ok(())
    }
}

/// The sum of a set, which must fit into 64 bits.
pub fn set_sum(set: &[u64]) -> Result<u64, Error> {
    set.iter()
        .try_fold(0u64, |acc, v| acc.checked_add(*v))
        .ok_or_else(|| Error::InvalidInput("the sum of the set does not fit into 64 bits".into()))
}

async fn send_msg(channel: &impl Channel, msg: &Msg) -> Result<(), Error> {
    Ok(send_to(channel, msg.kind(), msg).await?)
}

async fn recv_msg(channel: &impl Channel, phase: &str) -> Result<Msg, Error> {
    Ok(recv_from(channel, phase).await?)
}

fn unexpected(expected: &'static str, msg: &Msg) -> Error {
    Error::UnexpectedMsg {
        expected,
        actual: msg.kind(),
    }
}

/// Simulates a complete session between a garbler and an evaluator over an in-memory channel.
///
/// Returns the outcomes of the garbler and of the evaluator, in that order.
pub fn simulate(
    operation: Operation,
    alice: &[u64],
    bob: &[u64],
) -> Result<(Outcome, Outcome), Error> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(Error::Runtime)?;
    let (a, b) = SimpleChannel::pair();
    let mut garbler = Garbler::new(alice.to_vec(), operation);
    let mut evaluator = Evaluator::new(bob.to_vec());
    runtime.block_on(async move {
        // each party drops its channel when it is done, so a failing party ends the session
        let garbler = async move { garbler.run(&a).await };
        let evaluator = async move { evaluator.run(&b).await };
        match tokio::join!(garbler, evaluator) {
            (Ok(garbled), Ok(evaluated)) => Ok((garbled, evaluated)),
            // the other party only sees the channel closing after the first failure
            (Err(Error::Channel(_)), Err(e)) | (Err(e), _) | (_, Err(e)) => Err(e),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_overflow_into_errors() {
        assert_eq!(set_sum(&[1, 2, 3]).ok(), Some(6));
        assert!(matches!(
            set_sum(&[u64::MAX, 1]),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn outcomes_read_the_output_bits() -> Result<(), Error> {
        let circuit = compare(3, 1)?;
        let output = |bits: &[bool]| -> BTreeMap<WireId, bool> {
            circuit.out.iter().copied().zip(bits.iter().copied()).collect()
        };
        let mut outcome = Outcome::empty(Operation::Compare);
        outcome.update(&circuit, &output(&[true, true, false, true]))?;
        outcome.update(&circuit, &output(&[false, false, false, false]))?;
        assert_eq!(outcome, Outcome::Common(BTreeSet::from([5])));
        assert!(outcome.update(&circuit, &BTreeMap::new()).is_err());

        let circuit = addition(2, 1)?;
        let mut outcome = Outcome::empty(Operation::Sum);
        let output: BTreeMap<_, _> = circuit.out.iter().map(|w| (*w, true)).collect();
        outcome.update(&circuit, &output)?;
        assert_eq!(outcome, Outcome::Sum(7));
        assert_eq!(outcome.to_string(), "sum = 7");
        Ok(())
    }

    #[test]
    fn error_classes_stay_distinct() {
        let e: Error = garble::Error::InvalidCircuit(CircuitError::ZeroWireId).into();
        assert!(matches!(e, Error::Circuit(CircuitError::ZeroWireId)));
        let e: Error = garble::Error::EncryptionFailed.into();
        assert!(matches!(e, Error::Garbling(_)));
        let e: Error = EvalError::MissingTable(3).into();
        assert!(matches!(e, Error::Evaluation(EvalError::MissingTable(3))));
        let e: Error = ot::Error::InvalidPoint.into();
        assert!(matches!(e, Error::Ot(ot::Error::InvalidPoint)));
    }
}
