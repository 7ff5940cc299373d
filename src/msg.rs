//! The messages exchanged by the garbler and the evaluator during a session.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    circuit::{Circuit, WireId},
    data_types::{GarbledGate, WireValue},
};

/// The function computed over the two sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// The sum of all elements of both sets.
    Sum,
    /// The elements that both sets have in common.
    Compare,
}

impl Operation {
    /// The numeric code of the operation.
    pub fn code(self) -> u8 {
        match self {
            Operation::Sum => 0,
            Operation::Compare => 1,
        }
    }
}

impl TryFrom<u8> for Operation {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Operation::Sum),
            1 => Ok(Operation::Compare),
            other => Err(other),
        }
    }
}

impl std::str::FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sum" | "0" => Ok(Operation::Sum),
            "compare" | "cmp" | "1" => Ok(Operation::Compare),
            _ => Err(format!("unknown operation '{s}', expected 'sum' or 'compare'")),
        }
    }
}

/// Everything the evaluator needs to evaluate one round, except its own input labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitPayload {
    /// The circuit to evaluate.
    pub circuit: Circuit,
    /// The garbled table of every gate, freshly garbled for this round.
    pub tables: BTreeMap<WireId, GarbledGate>,
    /// The permutation bits of the output wires.
    pub decoding: BTreeMap<WireId, bool>,
    /// The active label and masked bit of every garbler input wire.
    pub garbler_inputs: BTreeMap<WireId, WireValue>,
}

/// A session-level message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Msg {
    /// The natural bit length of the garbler's inputs.
    BitLength(u32),
    /// The bit length both parties use for their inputs.
    AgreedBitLength(u32),
    /// The operation the garbler wants to compute.
    Operation(Operation),
    /// Acknowledges the operation.
    Ack,
    /// The evaluator asks for another round.
    NextRound,
    /// The evaluator has no more inputs.
    EndOfRounds,
    /// The garbled circuit of a round.
    Circuit(Box<CircuitPayload>),
    /// The decoded output bits of a round.
    Result(BTreeMap<WireId, bool>),
}

impl Msg {
    /// A short name of the message kind, used in errors and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::BitLength(_) => "bit length",
            Msg::AgreedBitLength(_) => "agreed bit length",
            Msg::Operation(_) => "operation",
            Msg::Ack => "ack",
            Msg::NextRound => "next round",
            Msg::EndOfRounds => "end of rounds",
            Msg::Circuit(_) => "circuit",
            Msg::Result(_) => "result",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_codes() {
        for op in [Operation::Sum, Operation::Compare] {
            assert_eq!(Operation::try_from(op.code()), Ok(op));
        }
        assert_eq!(Operation::try_from(2), Err(2));
        assert_eq!("compare".parse(), Ok(Operation::Compare));
        assert_eq!("0".parse(), Ok(Operation::Sum));
        assert!("product".parse::<Operation>().is_err());
    }

    #[test]
    fn messages_survive_bincode() -> Result<(), bincode::Error> {
        let msg = Msg::Result(BTreeMap::from([(3, true), (4, false)]));
        let bytes = bincode::serialize(&msg)?;
        assert_eq!(bincode::deserialize::<Msg>(&bytes)?, msg);
        assert_eq!(msg.kind(), "result");
        Ok(())
    }
}
