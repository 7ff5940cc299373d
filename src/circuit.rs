//! Boolean circuits: gates, wires, validation and the JSON circuit description.
//!
//! A [`Circuit`] is a netlist of AND, OR, XOR and NOT gates. The id of a gate is also the id of
//! its output wire. Compilers hand out ids in increasing order, but nothing downstream relies on
//! that: [`Circuit::validate`] checks the netlist and computes an explicit topological order,
//! which is the order used by the garbler and the evaluator.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap, HashSet},
};

use serde::{Deserialize, Serialize};

/// The id of a wire (and of the gate driving it, if any).
pub type WireId = u32;

/// The type of a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateType {
    /// Conjunction of two wires.
    And,
    /// Disjunction of two wires.
    Or,
    /// Exclusive or of two wires.
    Xor,
    /// Negation of a single wire.
    Not,
}

impl GateType {
    /// The number of input wires of the gate.
    pub fn arity(self) -> usize {
        match self {
            GateType::Not => 1,
            GateType::And | GateType::Or | GateType::Xor => 2,
        }
    }

    /// The truth table of the gate. `y` is ignored for NOT gates.
    pub fn eval(self, x: bool, y: bool) -> bool {
        match self {
            GateType::And => x & y,
            GateType::Or => x | y,
            GateType::Xor => x ^ y,
            GateType::Not => !x,
        }
    }
}

/// A single gate of a circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate {
    /// The id of the gate, which is also the id of its output wire.
    pub id: WireId,
    /// The type of the gate.
    #[serde(rename = "type")]
    pub ty: GateType,
    /// The input wires, exactly [`GateType::arity`] many.
    #[serde(rename = "in")]
    pub inputs: Vec<WireId>,
}

/// A boolean circuit with inputs of the garbler ("alice") and of the evaluator ("bob").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Circuit {
    /// A human readable identifier of the circuit.
    pub id: String,
    /// The input wires of the garbler, in input order.
    pub alice: Vec<WireId>,
    /// The input wires of the evaluator, in input order.
    pub bob: Vec<WireId>,
    /// The output wires, in output order.
    pub out: Vec<WireId>,
    /// The gates of the circuit.
    pub gates: Vec<Gate>,
}

/// Errors caused by an invalid circuit or invalid compiler parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CircuitError {
    /// Wire ids must be positive.
    #[error("wire id 0 is not a valid wire id")]
    ZeroWireId,
    /// The wire is defined twice, either as an input or as a gate output.
    #[error("wire {0} is defined more than once")]
    DuplicateWire(WireId),
    /// A gate reads from a wire that is never defined.
    #[error("gate {gate} reads wire {input}, which is never defined")]
    DanglingInput {
        /// The id of the gate.
        gate: WireId,
        /// The undefined input wire.
        input: WireId,
    },
    /// An output wire is never defined.
    #[error("output wire {0} is never defined")]
    DanglingOutput(WireId),
    /// A gate has the wrong number of inputs for its type.
    #[error("gate {gate} of type {ty:?} expects {expected} inputs, found {actual}")]
    ArityMismatch {
        /// The id of the gate.
        gate: WireId,
        /// The type of the gate.
        ty: GateType,
        /// The arity of the gate type.
        expected: usize,
        /// The number of inputs of the gate.
        actual: usize,
    },
    /// The gates depend on each other in a cycle.
    #[error("gates {0:?} are part of a cycle")]
    Cycle(Vec<WireId>),
    /// The number of provided input bits does not match the inputs of the circuit.
    #[error("expected {expected} input bits, found {actual}")]
    WrongInputSize {
        /// The number of input wires.
        expected: usize,
        /// The number of provided bits.
        actual: usize,
    },
    /// The parameters passed to a circuit compiler are out of range.
    #[error("invalid compiler parameters: {0}")]
    InvalidParameters(String),
}

impl Circuit {
    /// Checks the circuit and returns the indices of its gates in a valid evaluation order.
    ///
    /// Among the gates that are ready at any point, the one with the smallest id is chosen, so a
    /// circuit whose ids are already topologically sorted is evaluated in ascending id order.
    pub fn validate(&self) -> Result<Vec<usize>, CircuitError> {
        let mut defined = HashSet::new();
        for &w in self.alice.iter().chain(self.bob.iter()) {
            if w == 0 {
                return Err(CircuitError::ZeroWireId);
            }
            if !defined.insert(w) {
                return Err(CircuitError::DuplicateWire(w));
            }
        }
        let mut gate_index = HashMap::with_capacity(self.gates.len());
        for (i, gate) in self.gates.iter().enumerate() {
            if gate.id == 0 {
                return Err(CircuitError::ZeroWireId);
            }
            if !defined.insert(gate.id) {
                return Err(CircuitError::DuplicateWire(gate.id));
            }
            gate_index.insert(gate.id, i);
        }

        let mut pending = vec![0usize; self.gates.len()];
        let mut dependents: HashMap<WireId, Vec<usize>> = HashMap::new();
        for (i, gate) in self.gates.iter().enumerate() {
            let expected = gate.ty.arity();
            if gate.inputs.len() != expected {
                return Err(CircuitError::ArityMismatch {
                    gate: gate.id,
                    ty: gate.ty,
                    expected,
                    actual: gate.inputs.len(),
                });
            }
            for &input in &gate.inputs {
                if !defined.contains(&input) {
                    return Err(CircuitError::DanglingInput {
                        gate: gate.id,
                        input,
                    });
                }
                if gate_index.contains_key(&input) {
                    pending[i] += 1;
                    dependents.entry(input).or_default().push(i);
                }
            }
        }
        for &w in &self.out {
            if !defined.contains(&w) {
                return Err(CircuitError::DanglingOutput(w));
            }
        }

        let mut ready: BinaryHeap<Reverse<(WireId, usize)>> = self
            .gates
            .iter()
            .enumerate()
            .filter(|(i, _)| pending[*i] == 0)
            .map(|(i, gate)| Reverse((gate.id, i)))
            .collect();
        let mut order = Vec::with_capacity(self.gates.len());
        while let Some(Reverse((id, i))) = ready.pop() {
            order.push(i);
            for &d in dependents.get(&id).into_iter().flatten() {
                pending[d] -= 1;
                if pending[d] == 0 {
                    ready.push(Reverse((self.gates[d].id, d)));
                }
            }
        }
        if order.len() != self.gates.len() {
            let mut cycle: Vec<WireId> = self
                .gates
                .iter()
                .enumerate()
                .filter(|(i, _)| pending[*i] > 0)
                .map(|(_, gate)| gate.id)
                .collect();
            cycle.sort_unstable();
            return Err(CircuitError::Cycle(cycle));
        }
        Ok(order)
    }

    /// Evaluates the circuit in the clear, returning the bits of the output wires.
    pub fn eval(&self, alice: &[bool], bob: &[bool]) -> Result<Vec<bool>, CircuitError> {
        let order = self.validate()?;
        for (wires, bits) in [(&self.alice, alice), (&self.bob, bob)] {
            if wires.len() != bits.len() {
                return Err(CircuitError::WrongInputSize {
                    expected: wires.len(),
                    actual: bits.len(),
                });
            }
        }
        let mut values: HashMap<WireId, bool> = self
            .alice
            .iter()
            .copied()
            .zip(alice.iter().copied())
            .chain(self.bob.iter().copied().zip(bob.iter().copied()))
            .collect();
        for i in order {
            let gate = &self.gates[i];
            // validated: every input is defined and computed before the gate
            let x = values[&gate.inputs[0]];
            let y = gate.inputs.get(1).is_some_and(|w| values[w]);
            values.insert(gate.id, gate.ty.eval(x, y));
        }
        Ok(self.out.iter().map(|w| values[w]).collect())
    }

    /// The total number of wires (inputs and gate outputs).
    pub fn wires(&self) -> usize {
        self.alice.len() + self.bob.len() + self.gates.len()
    }
}

/// The serialized form of one or more circuits, as exchanged and stored as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitDescription {
    /// The name of the description.
    pub name: String,
    /// The circuits.
    pub circuits: Vec<Circuit>,
}

impl CircuitDescription {
    /// Wraps a single circuit, named after the circuit's id.
    pub fn single(circuit: Circuit) -> Self {
        Self {
            name: circuit.id.clone(),
            circuits: vec![circuit],
        }
    }

    /// Serializes the description to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses a description from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
