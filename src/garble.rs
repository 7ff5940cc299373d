//! Garbling of circuits: per-wire labels and permutation bits, and the encrypted gate tables.
//!
//! Every row of a gate table holds the output label and masked output bit for one combination of
//! input bits, encrypted under the pair of input labels of that combination. The row index is
//! derived from the masked input bits, so the layout of a table says nothing about which label
//! encodes which bit.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
};

use blake3::Hasher;
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{Level, debug, instrument};

use crate::{
    circuit::{Circuit, CircuitError, WireId},
    data_types::{Block, GarbledGate, Label, WireValue},
};

/// Errors that can occur while garbling a circuit or while encrypting / decrypting a table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The circuit cannot be garbled because it is invalid.
    InvalidCircuit(CircuitError),
    /// A row could not be (de-)serialized.
    Serde(String),
    /// A row could not be encrypted.
    EncryptionFailed,
    /// A row could not be decrypted with the given labels.
    DecryptionFailed,
    /// The wire is not part of the garbled circuit.
    UnknownWire(WireId),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidCircuit(e) => write!(f, "Invalid circuit: {e}"),
            Error::Serde(e) => write!(f, "Could not (de-)serialize a table row: {e}"),
            Error::EncryptionFailed => f.write_str("A table row could not be encrypted"),
            Error::DecryptionFailed => f.write_str("A table row could not be decrypted"),
            Error::UnknownWire(w) => write!(f, "Wire {w} is not part of the garbled circuit"),
        }
    }
}

impl From<CircuitError> for Error {
    fn from(e: CircuitError) -> Self {
        Error::InvalidCircuit(e)
    }
}

/// The labels of a row together with the gate and row they belong to.
#[derive(Debug)]
pub(crate) struct GarblingKey {
    label_x: Label,
    label_y: Option<Label>,
    gate: WireId,
    row: u8,
}

impl GarblingKey {
    pub(crate) fn new(label_x: Label, label_y: Option<Label>, gate: WireId, row: u8) -> Self {
        Self {
            label_x,
            label_y,
            gate,
            row,
        }
    }
}

/// Derive a key from the garbling key components using BLAKE3 for key commitment.
fn derive_commitment_key(key: &Key, nonce: &Nonce) -> Key {
    let mut hasher = Hasher::new();
    hasher.update(key);
    hasher.update(nonce);
    let derived_key = hasher.finalize();
    Key::from_slice(&derived_key.as_bytes()[..32]).to_owned()
}

/// Add a commitment to the plaintext using BLAKE3.
fn add_commitment(plaintext: &[u8], nonce: &Nonce) -> [u8; 16] {
    let mut hasher = Hasher::new();
    hasher.update(plaintext);
    hasher.update(nonce);
    let hash = hasher.finalize();
    let mut commitment = [0u8; 16];
    commitment.copy_from_slice(&hash.as_bytes()[..16]);
    commitment
}

/// Encrypts the output label and masked output bit of a table row.
pub(crate) fn encrypt(garbling_key: &GarblingKey, row: (Label, bool)) -> Result<Vec<u8>, Error> {
    let (key, nonce) = key_and_nonce(garbling_key);
    let cipher = ChaCha20Poly1305::new(&derive_commitment_key(&key, &nonce));

    let mut bytes = bincode::serialize(&row).map_err(|e| Error::Serde(format!("{e:?}")))?;
    let commitment = add_commitment(&bytes, &nonce);
    bytes.extend_from_slice(&commitment);

    cipher
        .encrypt(&nonce, bytes.as_ref())
        .map_err(|_| Error::EncryptionFailed)
}

/// Decrypts a table row, failing unless `garbling_key` holds exactly the labels of the row.
pub(crate) fn decrypt(garbling_key: &GarblingKey, bytes: &[u8]) -> Result<WireValue, Error> {
    let (key, nonce) = key_and_nonce(garbling_key);
    let cipher = ChaCha20Poly1305::new(&derive_commitment_key(&key, &nonce));

    let plaintext = cipher
        .decrypt(&nonce, bytes)
        .map_err(|_| Error::DecryptionFailed)?;
    if plaintext.len() < 16 {
        return Err(Error::DecryptionFailed);
    }
    let (row, commitment) = plaintext.split_at(plaintext.len() - 16);
    let expected_commitment = add_commitment(row, &nonce);
    if !bool::from(commitment.ct_eq(&expected_commitment[..])) {
        return Err(Error::DecryptionFailed);
    }

    let (label, masked): (Label, bool) =
        bincode::deserialize(row).map_err(|e| Error::Serde(format!("{e:?}")))?;
    Ok(WireValue { label, masked })
}

/// Extract key and nonce from a garbling key.
fn key_and_nonce(
    GarblingKey {
        label_x,
        label_y,
        gate,
        row,
    }: &GarblingKey,
) -> (Key, Nonce) {
    let mut key = [0; 32];
    key[..16].copy_from_slice(&label_x.to_be_bytes());
    if let Some(label_y) = label_y {
        key[16..].copy_from_slice(&label_y.to_be_bytes());
    }
    let mut nonce = [0; 12];
    nonce[..4].copy_from_slice(&gate.to_be_bytes());
    nonce[4] = label_y.is_some() as u8;
    nonce[5] = *row;
    (key.into(), nonce.into())
}

/// The part of a garbled circuit that is sent to the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarbledCircuit {
    /// The encrypted table of every gate, by gate id.
    pub tables: BTreeMap<WireId, GarbledGate>,
    /// The permutation bit of every output wire, used to decode the masked output bits.
    pub decoding: BTreeMap<WireId, bool>,
}

/// The secrets of the garbler: both labels and the permutation bit of every wire.
pub struct GarblerKeys {
    labels: HashMap<WireId, [Label; 2]>,
    pbits: HashMap<WireId, bool>,
}

impl fmt::Debug for GarblerKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GarblerKeys")
            .field("wires", &self.labels.len())
            .finish_non_exhaustive()
    }
}

impl GarblerKeys {
    /// The label and masked bit that encode `bit` on `wire`.
    pub fn encode(&self, wire: WireId, bit: bool) -> Result<WireValue, Error> {
        let (Some(labels), Some(pbit)) = (self.labels.get(&wire), self.pbits.get(&wire)) else {
            return Err(Error::UnknownWire(wire));
        };
        Ok(WireValue {
            label: labels[bit as usize],
            masked: pbit ^ bit,
        })
    }

    /// The permutation bit of `wire`.
    pub fn pbit(&self, wire: WireId) -> Option<bool> {
        self.pbits.get(&wire).copied()
    }

    /// Both encodings of `wire` as oblivious transfer messages, indexed by the real bit.
    pub(crate) fn ot_pair(&self, wire: WireId) -> Result<(Block, Block), Error> {
        let zero = self.encode(wire, false)?;
        let one = self.encode(wire, true)?;
        Ok((zero.to_block(), one.to_block()))
    }
}

/// Garbles the circuit with fresh labels and permutation bits.
///
/// The returned keys must only be used for a single evaluation.
#[instrument(level = Level::DEBUG, skip_all, fields(circuit = %circuit.id), err)]
pub fn garble<R: CryptoRng>(
    circuit: &Circuit,
    rng: &mut R,
) -> Result<(GarbledCircuit, GarblerKeys), Error> {
    let order = circuit.validate()?;

    let wires = circuit
        .alice
        .iter()
        .chain(&circuit.bob)
        .copied()
        .chain(circuit.gates.iter().map(|gate| gate.id));
    let mut labels = HashMap::with_capacity(circuit.wires());
    let mut pbits = HashMap::with_capacity(circuit.wires());
    for w in wires {
        labels.insert(w, [Label::random(rng), Label::random(rng)]);
        pbits.insert(w, rng.random::<bool>());
    }

    let mut tables = BTreeMap::new();
    for i in order {
        let gate = &circuit.gates[i];
        // the circuit is validated, so every wire has labels and a pbit
        let out_labels = labels[&gate.id];
        let out_pbit = pbits[&gate.id];
        let inputs: Vec<([Label; 2], bool)> = gate
            .inputs
            .iter()
            .map(|w| (labels[w], pbits[w]))
            .collect();
        let arity = inputs.len();

        let mut rows = vec![vec![]; 1 << arity];
        for combination in 0..(1usize << arity) {
            // the first input is the most significant bit of the combination
            let bits: Vec<bool> = (0..arity)
                .map(|j| (combination >> (arity - 1 - j)) & 1 == 1)
                .collect();
            let x = bits[0];
            let y = bits.get(1).copied().unwrap_or(false);
            let z = gate.ty.eval(x, y);
            let row = bits
                .iter()
                .zip(&inputs)
                .fold(0usize, |row, (bit, (_, pbit))| {
                    (row << 1) | (*bit ^ *pbit) as usize
                });
            let key = GarblingKey::new(
                inputs[0].0[x as usize],
                inputs.get(1).map(|(l, _)| l[y as usize]),
                gate.id,
                row as u8,
            );
            rows[row] = encrypt(&key, (out_labels[z as usize], out_pbit ^ z))?;
        }
        tables.insert(gate.id, GarbledGate(rows));
    }

    let decoding = circuit.out.iter().map(|w| (*w, pbits[w])).collect();
    debug!(gates = tables.len(), "garbled circuit");
    Ok((GarbledCircuit { tables, decoding }, GarblerKeys { labels, pbits }))
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, random};
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::circuit::{Gate, GateType};

    #[test]
    fn encrypt_decrypt() -> Result<(), Error> {
        let key = GarblingKey::new(Label(random()), Some(Label(random())), random(), random());
        let row = (Label(random()), random());
        let encrypted = encrypt(&key, row)?;
        let decrypted = decrypt(&key, &encrypted)?;
        assert_eq!(decrypted.label, row.0);
        assert_eq!(decrypted.masked, row.1);

        let wrong = GarblingKey::new(key.label_x, Some(Label(random())), key.gate, key.row);
        assert_eq!(decrypt(&wrong, &encrypted), Err(Error::DecryptionFailed));
        let wrong_row = GarblingKey::new(key.label_x, key.label_y, key.gate, key.row ^ 1);
        assert_eq!(decrypt(&wrong_row, &encrypted), Err(Error::DecryptionFailed));
        Ok(())
    }

    fn single_gate(ty: GateType) -> Circuit {
        let inputs = if ty == GateType::Not { vec![1] } else { vec![1, 2] };
        Circuit {
            id: format!("{ty:?}"),
            alice: vec![1],
            bob: if ty == GateType::Not { vec![] } else { vec![2] },
            out: vec![3],
            gates: vec![Gate { id: 3, ty, inputs }],
        }
    }

    #[test]
    fn every_combination_opens_exactly_its_own_row() -> Result<(), Error> {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        for ty in [GateType::And, GateType::Or, GateType::Xor, GateType::Not] {
            let circuit = single_gate(ty);
            let (garbled, keys) = garble(&circuit, &mut rng)?;
            let table = &garbled.tables[&3];
            assert_eq!(table.rows(), 1 << ty.arity());

            let mut opened = vec![false; table.rows()];
            for combination in 0..table.rows() {
                let values: Vec<WireValue> = circuit.gates[0]
                    .inputs
                    .iter()
                    .enumerate()
                    .map(|(j, w)| {
                        let bit = (combination >> (ty.arity() - 1 - j)) & 1 == 1;
                        keys.encode(*w, bit).unwrap()
                    })
                    .collect();
                let row = values
                    .iter()
                    .fold(0usize, |row, v| (row << 1) | v.masked as usize);
                assert!(!opened[row], "two combinations share row {row}");
                opened[row] = true;

                for (r, ciphertext) in table.0.iter().enumerate() {
                    let key = GarblingKey::new(
                        values[0].label,
                        values.get(1).map(|v| v.label),
                        3,
                        r as u8,
                    );
                    let result = decrypt(&key, ciphertext);
                    if r == row {
                        let x = (combination >> (ty.arity() - 1)) & 1 == 1;
                        let y = combination & 1 == 1;
                        let expected = ty.eval(x, if ty == GateType::Not { false } else { y });
                        assert_eq!(result, Ok(keys.encode(3, expected).unwrap()));
                    } else {
                        assert_eq!(result, Err(Error::DecryptionFailed));
                    }
                }
            }
            assert!(opened.iter().all(|o| *o));
            assert_eq!(garbled.decoding[&3], keys.pbit(3).unwrap());
        }
        Ok(())
    }

    #[test]
    fn invalid_circuits_are_not_garbled() {
        let mut circuit = single_gate(GateType::And);
        circuit.gates[0].inputs = vec![1, 9];
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        assert!(matches!(
            garble(&circuit, &mut rng),
            Err(Error::InvalidCircuit(CircuitError::DanglingInput { .. }))
        ));
    }

    #[test]
    fn labels_are_fresh_for_every_garbling() -> Result<(), Error> {
        let circuit = single_gate(GateType::Xor);
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let (_, a) = garble(&circuit, &mut rng)?;
        let (_, b) = garble(&circuit, &mut rng)?;
        for w in [1, 2, 3] {
            assert_ne!(a.encode(w, false), b.encode(w, false));
            assert_ne!(a.encode(w, false).map(|v| v.label), a.encode(w, true).map(|v| v.label));
        }
        assert_eq!(a.encode(9, true), Err(Error::UnknownWire(9)));
        Ok(())
    }
}
