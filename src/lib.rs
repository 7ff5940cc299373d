//! Privacy-preserving two-party computations over integer sets, based on Yao's garbled circuits
//! and 1-out-of-2 oblivious transfer.
//!
//! Two parties, a garbler ("Alice") and an evaluator ("Bob"), each hold a private set of
//! unsigned integers. Together they compute either the sum of all elements or the elements both
//! sets have in common, without revealing anything else about their sets (in the semi-honest
//! model, where both parties follow the protocol).
//!
//! ## Main Components
//!
//! * [`compiler`]: boolean circuits for ripple-carry addition and set membership.
//! * [`circuit`]: the circuit model, validation, plaintext evaluation and the JSON description.
//! * [`garble`]: per-wire labels and permutation bits, and the encrypted gate tables.
//! * [`ot`]: the oblivious transfer that delivers the evaluator's input labels.
//! * [`evaluate`]: evaluation and decoding of a garbled circuit.
//! * [`protocol`]: the [`protocol::Garbler`] and [`protocol::Evaluator`] parties.
//! * [`session`]: an evaluator whose set can be replaced between sessions.
//! * [`channel`]: communication abstractions for exchanging messages between the parties.
//!
//! ## Example
//!
//! ```
//! use yao_sets::{msg::Operation, protocol::{Outcome, simulate}};
//!
//! # fn main() -> Result<(), yao_sets::protocol::Error> {
//! let (alice, bob) = simulate(Operation::Sum, &[2, 3], &[4])?;
//! assert_eq!(alice, Outcome::Sum(9));
//! assert_eq!(bob, Outcome::Sum(9));
//! # Ok(())
//! # }
//! ```
//!
//! Outside of simulations, each party runs [`protocol::Party::run`] over its own [`Channel`]
//! implementation.
//!
//! [`Channel`]: channel::Channel
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod channel;
pub mod circuit;
pub mod compiler;
pub mod evaluate;
pub mod garble;
pub mod msg;
pub mod ot;
pub mod protocol;
pub mod session;
pub mod utils;

mod data_types;

pub use data_types::{BLOCK_LEN, Block, GarbledGate, Label, WireValue};
