//! Data types shared by the garbler, the evaluator and the oblivious transfer.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// A key bound to one semantic bit of a wire, called a label in the garbling literature.
///
/// Every wire carries two independently random labels, one for `false` and one for `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label(pub(crate) u128);

impl Label {
    pub(crate) fn random(rng: &mut impl Rng) -> Self {
        Label(rng.random())
    }

    pub(crate) fn to_be_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }
}

/// The length of a message transferred by the oblivious transfer.
pub const BLOCK_LEN: usize = 32;

/// A fixed-size message of the oblivious transfer.
pub type Block = [u8; BLOCK_LEN];

/// The secret held by the evaluator for one wire: the active label and its masked bit.
///
/// The masked bit is the real bit XOR the wire's permutation bit, so it can be revealed to the
/// evaluator without leaking the real value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireValue {
    /// The label of the wire for its (hidden) real bit.
    pub label: Label,
    /// The real bit of the wire, masked by the permutation bit of the wire.
    pub masked: bool,
}

impl WireValue {
    /// Packs the value into an OT block: 16 label bytes, one byte for the masked bit, zero padding.
    pub(crate) fn to_block(self) -> Block {
        let mut block = [0; BLOCK_LEN];
        block[..16].copy_from_slice(&self.label.0.to_le_bytes());
        block[16] = self.masked as u8;
        block
    }

    /// Unpacks an OT block, rejecting blocks with a non-zero padding or an invalid masked bit.
    pub(crate) fn from_block(block: &Block) -> Option<Self> {
        if block[17..].iter().any(|b| *b != 0) {
            return None;
        }
        let masked = match block[16] {
            0 => false,
            1 => true,
            _ => return None,
        };
        let mut label = [0; 16];
        label.copy_from_slice(&block[..16]);
        Some(WireValue {
            label: Label(u128::from_le_bytes(label)),
            masked,
        })
    }
}

/// The encrypted truth table of a single gate, rows ordered by the masked input bits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarbledGate(pub(crate) Vec<Vec<u8>>);

impl GarbledGate {
    /// The number of rows in the table (always `2^arity` for a table built by the garbler).
    pub fn rows(&self) -> usize {
        self.0.len()
    }
}

/// One line per row, each row as lowercase hex.
impl fmt::Display for GarbledGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{i}: ")?;
            for byte in row {
                write!(f, "{byte:02x}")?;
            }
        }
        Ok(())
    }
}

#[test]
fn garbled_gate_prints_rows_as_hex() {
    let gate = GarbledGate(vec![vec![0x0f, 0xa0], vec![], vec![1]]);
    assert_eq!(gate.to_string(), "0: 0fa0\n1: \n2: 01");
}

#[test]
fn wire_value_block_rejects_padding() {
    let value = WireValue {
        label: Label(0xdead_beef),
        masked: true,
    };
    let mut block = value.to_block();
    assert_eq!(WireValue::from_block(&block), Some(value));
    block[31] = 1;
    assert_eq!(WireValue::from_block(&block), None);
    block[31] = 0;
    block[16] = 2;
    assert_eq!(WireValue::from_block(&block), None);
}
