//! 1-out-of-2 oblivious transfer following Chou and Orlandi (cf.
//! <https://eprint.iacr.org/2015/267>).
//!
//! This implementation uses the Ristretto prime order group from `curve25519-dalek` and
//! transfers fixed-size blocks. The sender publishes `S = y·G`. For every transfer the receiver
//! blinds a random `x` with its choice bit `c` as `R = c·S + x·G`, which is uniformly distributed
//! whatever `c` is. The sender masks its two messages with keys derived from `y·R` and
//! `y·R - y·S`; only the key of the chosen message equals `x·S`, which the receiver can compute.
//!
//! A counter is hashed into every key derivation, so that repeated transfers with the same
//! sender never reuse a key.

use std::fmt;

use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_TABLE,
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar::Scalar,
};
use rand::CryptoRng;
use tracing::{Level, debug, instrument};

use crate::{
    channel::{self, Channel, recv_from, recv_vec_from, send_to},
    data_types::{BLOCK_LEN, Block},
};

/// Errors that can occur during an oblivious transfer.
#[derive(Debug)]
pub enum Error {
    /// The transfer could not be sent or received.
    Channel(channel::Error),
    /// The other party sent bytes that are not a valid group element.
    InvalidPoint,
    /// A transferred message does not have the expected format.
    MalformedTransfer(usize),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Channel(e) => write!(f, "Channel error: {e}"),
            Error::InvalidPoint => f.write_str("Received an invalid group element"),
            Error::MalformedTransfer(i) => write!(f, "Transfer {i} yielded a malformed message"),
        }
    }
}

impl From<channel::Error> for Error {
    fn from(e: channel::Error) -> Self {
        Error::Channel(e)
    }
}

/// Lends a rand 0.9 generator to `curve25519-dalek`, which samples scalars through rand_core 0.6.
struct DalekRng<'a, R>(&'a mut R);

impl<R: CryptoRng> rand_core_0_6::RngCore for DalekRng<'_, R> {
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core_0_6::Error> {
        self.0.fill_bytes(dest);
        Ok(())
    }
}

impl<R: CryptoRng> rand_core_0_6::CryptoRng for DalekRng<'_, R> {}

fn random_scalar(rng: &mut impl CryptoRng) -> Scalar {
    Scalar::random(&mut DalekRng(rng))
}

fn hash_pt(tweak: u128, pt: &RistrettoPoint) -> Block {
    *blake3::keyed_hash(pt.compress().as_bytes(), &tweak.to_le_bytes()).as_bytes()
}

fn xor(a: &Block, b: &Block) -> Block {
    let mut out = [0; BLOCK_LEN];
    for (o, (a, b)) in out.iter_mut().zip(a.iter().zip(b)) {
        *o = a ^ b;
    }
    out
}

fn decompress(bytes: &[u8; 32]) -> Result<RistrettoPoint, Error> {
    CompressedRistretto(*bytes)
        .decompress()
        .ok_or(Error::InvalidPoint)
}

/// Oblivious transfer sender.
pub struct Sender {
    y: Scalar,
    s: RistrettoPoint,
    counter: u128,
}

impl Sender {
    /// Picks the secret scalar and publishes the corresponding point to the receiver.
    pub async fn init<RNG: CryptoRng>(
        channel: &impl Channel,
        rng: &mut RNG,
    ) -> Result<Self, Error> {
        let y = random_scalar(rng);
        let s = &y * RISTRETTO_BASEPOINT_TABLE;
        send_to(channel, "OT setup", &s.compress().to_bytes()).await?;
        Ok(Self { y, s, counter: 0 })
    }

    /// Sends one message of every pair, chosen by the receiver without the sender learning which.
    #[instrument(level = Level::DEBUG, skip_all, fields(n = inputs.len()), err)]
    pub async fn send(
        &mut self,
        channel: &impl Channel,
        inputs: &[(Block, Block)],
    ) -> Result<(), Error> {
        let ys = self.y * self.s;
        let blinded: Vec<[u8; 32]> = recv_vec_from(channel, "OT blinded", inputs.len()).await?;
        let mut masked = Vec::with_capacity(inputs.len());
        for (i, (r, (m0, m1))) in blinded.iter().zip(inputs).enumerate() {
            let yr = self.y * decompress(r)?;
            let tweak = self.counter + i as u128;
            let k0 = hash_pt(tweak, &yr);
            let k1 = hash_pt(tweak, &(yr - ys));
            masked.push((xor(&k0, m0), xor(&k1, m1)));
        }
        self.counter += inputs.len() as u128;
        send_to(channel, "OT masked", &masked).await?;
        debug!("sent {} messages obliviously", inputs.len());
        Ok(())
    }
}

/// Oblivious transfer receiver.
pub struct Receiver {
    s: RistrettoPoint,
    counter: u128,
}

impl Receiver {
    /// Receives the sender's public point.
    pub async fn init(channel: &impl Channel) -> Result<Self, Error> {
        let s_bytes: [u8; 32] = recv_from(channel, "OT setup").await?;
        Ok(Self {
            s: decompress(&s_bytes)?,
            counter: 0,
        })
    }

    /// Receives, for every choice bit, the message of the sender's pair at that index.
    #[instrument(level = Level::DEBUG, skip_all, fields(n = choices.len()), err)]
    pub async fn receive<RNG: CryptoRng>(
        &mut self,
        channel: &impl Channel,
        choices: &[bool],
        rng: &mut RNG,
    ) -> Result<Vec<Block>, Error> {
        let mut keys = Vec::with_capacity(choices.len());
        let mut blinded = Vec::with_capacity(choices.len());
        for (i, c) in choices.iter().enumerate() {
            let x = random_scalar(rng);
            let xg = &x * RISTRETTO_BASEPOINT_TABLE;
            let r = if *c { self.s + xg } else { xg };
            blinded.push(r.compress().to_bytes());
            keys.push(hash_pt(self.counter + i as u128, &(x * self.s)));
        }
        send_to(channel, "OT blinded", &blinded).await?;
        self.counter += choices.len() as u128;

        let masked: Vec<(Block, Block)> =
            recv_vec_from(channel, "OT masked", choices.len()).await?;
        Ok(choices
            .iter()
            .zip(keys)
            .zip(masked)
            .map(|((c, k), (e0, e1))| xor(&k, if *c { &e1 } else { &e0 }))
            .collect())
    }
}
