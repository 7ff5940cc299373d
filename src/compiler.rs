//! Compilers for the two circuits of the protocol: set sum and set comparison.

use crate::circuit::{Circuit, CircuitError, Gate, GateType, WireId};

/// The id of circuits compiled by [`addition`].
pub const SUM_CIRCUIT_ID: &str = "set_sum";
/// The id of circuits compiled by [`compare`].
pub const COMPARE_CIRCUIT_ID: &str = "set_cmp";

/// Hands out increasing wire ids and collects gates.
struct Builder {
    next: WireId,
    gates: Vec<Gate>,
}

impl Builder {
    fn new(next: WireId) -> Self {
        Self {
            next,
            gates: vec![],
        }
    }

    fn inputs(&mut self, n: usize) -> Result<Vec<WireId>, CircuitError> {
        (0..n).map(|_| self.wire()).collect()
    }

    fn wire(&mut self) -> Result<WireId, CircuitError> {
        let id = self.next;
        self.next = id
            .checked_add(1)
            .ok_or_else(|| CircuitError::InvalidParameters("too many wires".into()))?;
        Ok(id)
    }

    fn gate(&mut self, ty: GateType, inputs: &[WireId]) -> Result<WireId, CircuitError> {
        let id = self.wire()?;
        self.gates.push(Gate {
            id,
            ty,
            inputs: inputs.to_vec(),
        });
        Ok(id)
    }

    /// Folds the wires with `ty`, returning the single wire unchanged.
    fn reduce(&mut self, ty: GateType, wires: &[WireId]) -> Result<WireId, CircuitError> {
        let Some((&first, rest)) = wires.split_first() else {
            return Err(CircuitError::InvalidParameters(
                "cannot reduce an empty list of wires".into(),
            ));
        };
        rest.iter()
            .try_fold(first, |acc, &w| self.gate(ty, &[acc, w]))
    }
}

/// Compiles a ripple-carry adder for two `bits`-bit numbers.
///
/// The garbler's operand occupies the wires `start_index..start_index + bits`, the evaluator's
/// operand the following `bits` wires, both least significant bit first. The outputs are the
/// `bits` sum bits followed by the final carry, so the result never overflows.
pub fn addition(bits: usize, start_index: WireId) -> Result<Circuit, CircuitError> {
    if bits == 0 {
        return Err(CircuitError::InvalidParameters(
            "the adder needs at least one bit".into(),
        ));
    }
    if start_index == 0 {
        return Err(CircuitError::ZeroWireId);
    }
    let mut b = Builder::new(start_index);
    let alice = b.inputs(bits)?;
    let bob = b.inputs(bits)?;
    let mut out = Vec::with_capacity(bits + 1);

    let sum = b.gate(GateType::Xor, &[alice[0], bob[0]])?;
    out.push(sum);
    let mut carry = b.gate(GateType::And, &[alice[0], bob[0]])?;
    for i in 1..bits {
        let xor = b.gate(GateType::Xor, &[alice[i], bob[i]])?;
        let and1 = b.gate(GateType::And, &[alice[i], bob[i]])?;
        let sum = b.gate(GateType::Xor, &[xor, carry])?;
        out.push(sum);
        let and2 = b.gate(GateType::And, &[xor, carry])?;
        carry = b.gate(GateType::Or, &[and1, and2])?;
    }
    out.push(carry);

    Ok(Circuit {
        id: SUM_CIRCUIT_ID.into(),
        alice,
        bob,
        out,
        gates: b.gates,
    })
}

/// Compiles a circuit that checks whether the evaluator's `bits`-bit value is one of the
/// garbler's `set_len` values.
///
/// The garbler's values occupy the first `set_len * bits` wires (value after value, each least
/// significant bit first), followed by the `bits` wires of the evaluator's value. The first output
/// is the membership bit, the remaining `bits` outputs are the matching value (all zero if there
/// is no match).
pub fn compare(bits: usize, set_len: usize) -> Result<Circuit, CircuitError> {
    if bits == 0 || set_len == 0 {
        return Err(CircuitError::InvalidParameters(format!(
            "cannot compare {bits}-bit values against {set_len} values"
        )));
    }
    let total = bits
        .checked_mul(set_len)
        .ok_or_else(|| CircuitError::InvalidParameters("too many wires".into()))?;
    let mut b = Builder::new(1);
    let alice = b.inputs(total)?;
    let bob = b.inputs(bits)?;
    let values: Vec<&[WireId]> = alice.chunks(bits).collect();

    let mut equal = Vec::with_capacity(set_len);
    for value in &values {
        let mut same_bits = Vec::with_capacity(bits);
        for (&a, &v) in value.iter().zip(&bob) {
            let xor = b.gate(GateType::Xor, &[a, v])?;
            same_bits.push(b.gate(GateType::Not, &[xor])?);
        }
        equal.push(b.reduce(GateType::And, &same_bits)?);
    }

    let mut out = Vec::with_capacity(bits + 1);
    out.push(b.reduce(GateType::Or, &equal)?);
    for j in 0..bits {
        let mut selected = Vec::with_capacity(set_len);
        for (value, &eq) in values.iter().zip(&equal) {
            selected.push(b.gate(GateType::And, &[value[j], eq])?);
        }
        out.push(b.reduce(GateType::Or, &selected)?);
    }

    Ok(Circuit {
        id: COMPARE_CIRCUIT_ID.into(),
        alice,
        bob,
        out,
        gates: b.gates,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use super::*;
    use crate::utils::{from_bits, to_bits};

    #[test]
    fn adder_layout() -> Result<(), CircuitError> {
        let c = addition(1, 1)?;
        assert_eq!(c.alice, vec![1]);
        assert_eq!(c.bob, vec![2]);
        assert_eq!(c.out, vec![3, 4]);
        assert_eq!(c.gates.len(), 2);

        let c = addition(3, 10)?;
        assert_eq!(c.alice, vec![10, 11, 12]);
        assert_eq!(c.bob, vec![13, 14, 15]);
        assert_eq!(c.gates.len(), 2 + 2 * 5);
        assert_eq!(c.gates[0].id, 16);
        assert_eq!(c.out.len(), 4);
        c.validate()?;
        Ok(())
    }

    #[test]
    fn compare_layout() -> Result<(), CircuitError> {
        let c = compare(3, 2)?;
        assert_eq!(c.alice, (1..=6).collect::<Vec<_>>());
        assert_eq!(c.bob, vec![7, 8, 9]);
        assert_eq!(c.gates[0].id, 10);
        assert_eq!(c.out.len(), 4);
        // per value: 3 XOR + 3 NOT + 2 AND; 1 OR; per bit: 2 AND + 1 OR
        assert_eq!(c.gates.len(), 2 * 8 + 1 + 3 * 3);
        c.validate()?;

        let c = compare(1, 1)?;
        assert_eq!(c.gates.len(), 3);
        assert_eq!(c.out.len(), 2);
        Ok(())
    }

    #[test]
    fn rejects_empty_parameters() {
        assert!(addition(0, 1).is_err());
        assert!(addition(2, 0).is_err());
        assert!(compare(0, 3).is_err());
        assert!(compare(3, 0).is_err());
    }

    proptest! {
        #[test]
        fn adder_adds(bits in 1usize..=12, a in any::<u64>(), b in any::<u64>()) {
            let mask = (1u64 << bits) - 1;
            let (a, b) = (a & mask, b & mask);
            let c = addition(bits, 1).unwrap();
            let out = c.eval(&to_bits(a, bits), &to_bits(b, bits)).unwrap();
            prop_assert_eq!(out.len(), bits + 1);
            prop_assert_eq!(from_bits(&out), (a + b) as u128);
        }

        #[test]
        fn compare_finds_members(
            bits in 1usize..=6,
            set in prop::collection::btree_set(any::<u64>(), 1..6),
            query in any::<u64>(),
        ) {
            let mask = (1u64 << bits) - 1;
            let set: BTreeSet<u64> = set.into_iter().map(|v| v & mask).collect();
            let set: Vec<u64> = set.into_iter().collect();
            let query = query & mask;
            let c = compare(bits, set.len()).unwrap();
            let alice: Vec<bool> = set.iter().flat_map(|v| to_bits(*v, bits)).collect();
            let out = c.eval(&alice, &to_bits(query, bits)).unwrap();
            let member = set.contains(&query);
            prop_assert_eq!(out[0], member);
            let selected = from_bits(&out[1..]) as u64;
            prop_assert_eq!(selected, if member { query } else { 0 });
        }
    }
}
