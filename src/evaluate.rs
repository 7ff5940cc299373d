//! Evaluation of a garbled circuit by the party that holds one label per input wire.

use std::collections::{BTreeMap, HashMap};

use tracing::{Level, instrument};

use crate::{
    circuit::{Circuit, CircuitError, WireId},
    data_types::{GarbledGate, WireValue},
    garble::{GarbledCircuit, GarblingKey, decrypt},
};

/// Errors that abort the evaluation of a garbled circuit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    /// The circuit to evaluate is invalid.
    #[error("invalid circuit: {0}")]
    InvalidCircuit(#[from] CircuitError),
    /// No label was provided for an input wire.
    #[error("no label for input wire {0}")]
    MissingInput(WireId),
    /// No garbled table was provided for a gate.
    #[error("no garbled table for gate {0}")]
    MissingTable(WireId),
    /// A garbled table does not have one row per combination of inputs.
    #[error("the table of gate {gate} has {actual} rows, expected {expected}")]
    WrongTableSize {
        /// The id of the gate.
        gate: WireId,
        /// `2^arity` of the gate.
        expected: usize,
        /// The number of rows of the table.
        actual: usize,
    },
    /// The row selected by the held labels could not be decrypted with them.
    #[error("row {row} of gate {gate} does not open with the held labels")]
    IntegrityFailure {
        /// The id of the gate.
        gate: WireId,
        /// The index of the row.
        row: usize,
    },
    /// No decoding bit was provided for an output wire.
    #[error("no decoding bit for output wire {0}")]
    MissingDecoding(WireId),
}

/// Evaluates the garbled circuit and returns the masked bit of every output wire.
///
/// `inputs` must hold a value for every input wire of the circuit. Exactly one row is decrypted
/// per gate; a row that does not open aborts the evaluation.
#[instrument(level = Level::DEBUG, skip_all, fields(circuit = %circuit.id), err)]
pub fn evaluate(
    circuit: &Circuit,
    tables: &BTreeMap<WireId, GarbledGate>,
    inputs: &HashMap<WireId, WireValue>,
) -> Result<BTreeMap<WireId, bool>, EvalError> {
    let order = circuit.validate()?;
    let mut values = HashMap::with_capacity(circuit.wires());
    for &w in circuit.alice.iter().chain(&circuit.bob) {
        let value = inputs.get(&w).ok_or(EvalError::MissingInput(w))?;
        values.insert(w, *value);
    }

    for i in order {
        let gate = &circuit.gates[i];
        let GarbledGate(rows) = tables.get(&gate.id).ok_or(EvalError::MissingTable(gate.id))?;
        let expected = 1 << gate.ty.arity();
        if rows.len() != expected {
            return Err(EvalError::WrongTableSize {
                gate: gate.id,
                expected,
                actual: rows.len(),
            });
        }
        // validated: inputs are evaluated before the gate
        let held: Vec<WireValue> = gate.inputs.iter().map(|w| values[w]).collect();
        let row = held
            .iter()
            .fold(0usize, |row, v| (row << 1) | v.masked as usize);
        let key = GarblingKey::new(
            held[0].label,
            held.get(1).map(|v| v.label),
            gate.id,
            row as u8,
        );
        let value = decrypt(&key, &rows[row])
            .map_err(|_| EvalError::IntegrityFailure { gate: gate.id, row })?;
        values.insert(gate.id, value);
    }

    Ok(circuit.out.iter().map(|w| (*w, values[w].masked)).collect())
}

/// Recovers the real output bits from the masked bits and the garbler's decoding map.
pub fn decode(
    masked: &BTreeMap<WireId, bool>,
    decoding: &BTreeMap<WireId, bool>,
) -> Result<BTreeMap<WireId, bool>, EvalError> {
    masked
        .iter()
        .map(|(w, bit)| {
            let pbit = decoding.get(w).ok_or(EvalError::MissingDecoding(*w))?;
            Ok((*w, bit ^ pbit))
        })
        .collect()
}

/// Evaluates and decodes a garbled circuit, returning the output bits in output order.
pub fn evaluate_and_decode(
    circuit: &Circuit,
    garbled: &GarbledCircuit,
    inputs: &HashMap<WireId, WireValue>,
) -> Result<Vec<bool>, EvalError> {
    let masked = evaluate(circuit, &garbled.tables, inputs)?;
    let decoded = decode(&masked, &garbled.decoding)?;
    circuit
        .out
        .iter()
        .map(|w| decoded.get(w).copied().ok_or(EvalError::MissingDecoding(*w)))
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::{
        circuit::{Gate, GateType},
        compiler::addition,
        data_types::Label,
        garble::{GarblerKeys, garble},
        utils::{from_bits, to_bits},
    };

    fn encode_inputs(
        circuit: &Circuit,
        keys: &GarblerKeys,
        a: &[bool],
        b: &[bool],
    ) -> HashMap<WireId, WireValue> {
        circuit
            .alice
            .iter()
            .zip(a)
            .chain(circuit.bob.iter().zip(b))
            .map(|(w, bit)| (*w, keys.encode(*w, *bit).unwrap()))
            .collect()
    }

    #[test]
    fn garbled_adder_matches_plain_adder() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        let circuit = addition(3, 1)?;
        for a in 0..8 {
            for b in 0..8 {
                let (garbled, keys) = garble(&circuit, &mut rng)?;
                let (a_bits, b_bits) = (to_bits(a, 3), to_bits(b, 3));
                let inputs = encode_inputs(&circuit, &keys, &a_bits, &b_bits);
                let output = evaluate_and_decode(&circuit, &garbled, &inputs)?;
                assert_eq!(output, circuit.eval(&a_bits, &b_bits)?);
                assert_eq!(from_bits(&output), (a + b) as u128);
            }
        }
        Ok(())
    }

    #[test]
    fn every_gate_type_evaluates_correctly() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = ChaCha20Rng::seed_from_u64(10);
        // a chain that uses every gate type, including a gate reading the same wire twice
        let circuit = Circuit {
            id: "all gates".into(),
            alice: vec![1, 2],
            bob: vec![3],
            out: vec![4, 5, 6, 7, 8],
            gates: vec![
                Gate { id: 4, ty: GateType::And, inputs: vec![1, 3] },
                Gate { id: 5, ty: GateType::Or, inputs: vec![2, 3] },
                Gate { id: 6, ty: GateType::Xor, inputs: vec![4, 5] },
                Gate { id: 7, ty: GateType::Not, inputs: vec![6] },
                Gate { id: 8, ty: GateType::Xor, inputs: vec![1, 1] },
            ],
        };
        for input in 0..8u64 {
            let bits = to_bits(input, 3);
            let (a, b) = bits.split_at(2);
            let (garbled, keys) = garble(&circuit, &mut rng)?;
            let inputs = encode_inputs(&circuit, &keys, a, b);
            assert_eq!(
                evaluate_and_decode(&circuit, &garbled, &inputs)?,
                circuit.eval(a, b)?
            );
        }
        Ok(())
    }

    #[test]
    fn foreign_labels_abort_the_evaluation() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = ChaCha20Rng::seed_from_u64(12);
        let circuit = addition(2, 1)?;
        let (garbled, keys) = garble(&circuit, &mut rng)?;
        let mut inputs = encode_inputs(&circuit, &keys, &[true, false], &[true, true]);
        let bob = circuit.bob[0];
        let masked = inputs[&bob].masked;
        inputs.insert(bob, WireValue { label: Label(12345), masked });

        assert!(matches!(
            evaluate(&circuit, &garbled.tables, &inputs),
            Err(EvalError::IntegrityFailure { .. })
        ));
        Ok(())
    }

    #[test]
    fn missing_inputs_and_tables_are_reported() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = ChaCha20Rng::seed_from_u64(13);
        let circuit = addition(1, 1)?;
        let (garbled, keys) = garble(&circuit, &mut rng)?;
        let mut inputs = encode_inputs(&circuit, &keys, &[true], &[false]);
        inputs.remove(&2);
        assert_eq!(
            evaluate(&circuit, &garbled.tables, &inputs),
            Err(EvalError::MissingInput(2))
        );

        let inputs = encode_inputs(&circuit, &keys, &[true], &[false]);
        let mut tables = garbled.tables.clone();
        tables.remove(&3);
        assert_eq!(
            evaluate(&circuit, &tables, &inputs),
            Err(EvalError::MissingTable(3))
        );

        let mut tables = garbled.tables.clone();
        if let Some(GarbledGate(rows)) = tables.get_mut(&4) {
            rows.pop();
        }
        assert!(matches!(
            evaluate(&circuit, &tables, &inputs),
            Err(EvalError::WrongTableSize { gate: 4, .. })
        ));
        Ok(())
    }
}
