//! A communication channel used to send/receive messages to/from the other party.

use std::{fmt, future::Future, time::Duration};

use serde::{Serialize, de::DeserializeOwned};
use tokio::{
    sync::{
        Mutex,
        mpsc::{Receiver, Sender, channel, error::SendError},
    },
    time::timeout,
};
use tracing::trace;

/// Errors related to sending / receiving / (de-)serializing messages.
#[derive(Debug)]
pub struct Error {
    /// The protocol phase during which the error occurred.
    pub phase: String,
    /// The specific error that was raised.
    pub reason: ErrorKind,
}

/// The specific error that occurred when trying to send / receive a message.
#[derive(Debug)]
pub enum ErrorKind {
    /// The (serialized) message could not be received over the channel.
    RecvError(String),
    /// The (serialized) message could not be sent over the channel.
    SendError(String),
    /// The message could not be (de-)serialized.
    SerdeError(String),
    /// The message is a Vec, but not of the expected length.
    InvalidLength {
        /// The expected number of elements.
        expected: usize,
        /// The number of elements that were received.
        actual: usize,
    },
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = &self.phase;
        match &self.reason {
            ErrorKind::RecvError(e) => write!(f, "Could not receive {phase}: {e}"),
            ErrorKind::SendError(e) => write!(f, "Could not send {phase}: {e}"),
            ErrorKind::SerdeError(e) => write!(f, "Could not (de-)serialize {phase}: {e}"),
            ErrorKind::InvalidLength { expected, actual } => write!(
                f,
                "Expected {expected} elements while receiving {phase}, found {actual}"
            ),
        }
    }
}

/// A communication channel used to send/receive messages to/from the other party.
///
/// Every call completes one transfer: the protocol awaits each send and receive before issuing
/// the next one, so implementations never see more than one exchange in flight.
pub trait Channel {
    /// The error that can occur sending messages over the channel.
    type SendError: fmt::Debug;
    /// The error that can occur receiving messages over the channel.
    type RecvError: fmt::Debug;

    /// Sends a message to the other party.
    fn send_bytes(
        &self,
        msg: Vec<u8>,
        phase: &str,
    ) -> impl Future<Output = Result<(), Self::SendError>> + Send;

    /// Awaits a message from the other party.
    fn recv_bytes(&self, phase: &str)
    -> impl Future<Output = Result<Vec<u8>, Self::RecvError>> + Send;
}

/// Serializes and sends a message to the other party.
pub async fn send_to<S: Serialize>(
    channel: &impl Channel,
    phase: &str,
    msg: &S,
) -> Result<(), Error> {
    let msg = bincode::serialize(msg).map_err(|e| Error {
        phase: format!("sending {phase}"),
        reason: ErrorKind::SerdeError(format!("{e:?}")),
    })?;
    trace!(bytes = msg.len(), "sending {phase}");
    channel.send_bytes(msg, phase).await.map_err(|e| Error {
        phase: phase.to_string(),
        reason: ErrorKind::SendError(format!("{e:?}")),
    })
}

/// Receives and deserializes a message from the other party.
pub async fn recv_from<T: DeserializeOwned>(
    channel: &impl Channel,
    phase: &str,
) -> Result<T, Error> {
    let msg = channel.recv_bytes(phase).await.map_err(|e| Error {
        phase: phase.to_string(),
        reason: ErrorKind::RecvError(format!("{e:?}")),
    })?;
    trace!(bytes = msg.len(), "received {phase}");
    bincode::deserialize(&msg).map_err(|e| Error {
        phase: format!("receiving {phase}"),
        reason: ErrorKind::SerdeError(format!("{e:?}")),
    })
}

/// Receives and deserializes a Vec from the other party (while checking the length).
pub async fn recv_vec_from<T: DeserializeOwned>(
    channel: &impl Channel,
    phase: &str,
    len: usize,
) -> Result<Vec<T>, Error> {
    let v: Vec<T> = recv_from(channel, phase).await?;
    if v.len() == len {
        Ok(v)
    } else {
        Err(Error {
            phase: phase.to_string(),
            reason: ErrorKind::InvalidLength {
                expected: len,
                actual: v.len(),
            },
        })
    }
}

/// A simple in-memory channel using [`Sender`] and [`Receiver`].
#[derive(Debug)]
pub struct SimpleChannel {
    s: Sender<Vec<u8>>,
    r: Mutex<Receiver<Vec<u8>>>,
}

impl SimpleChannel {
    /// Creates two connected channels, one for each party.
    pub fn pair() -> (Self, Self) {
        let buffer_capacity = 1024;
        let (send_a_to_b, recv_a_to_b) = channel(buffer_capacity);
        let (send_b_to_a, recv_b_to_a) = channel(buffer_capacity);
        let a = SimpleChannel {
            s: send_a_to_b,
            r: Mutex::new(recv_b_to_a),
        };
        let b = SimpleChannel {
            s: send_b_to_a,
            r: Mutex::new(recv_a_to_b),
        };
        (a, b)
    }
}

/// The error raised by `recv` calls of a [`SimpleChannel`].
#[derive(Debug)]
pub enum AsyncRecvError {
    /// The channel has been closed.
    Closed,
    /// No message was received before the timeout.
    TimeoutElapsed,
}

impl Channel for SimpleChannel {
    type SendError = SendError<Vec<u8>>;
    type RecvError = AsyncRecvError;

    async fn send_bytes(&self, msg: Vec<u8>, _phase: &str) -> Result<(), SendError<Vec<u8>>> {
        self.s.send(msg).await
    }

    async fn recv_bytes(&self, _phase: &str) -> Result<Vec<u8>, AsyncRecvError> {
        let mut r = self.r.lock().await;
        match timeout(Duration::from_secs(10 * 60), r.recv()).await {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(AsyncRecvError::Closed),
            Err(_) => Err(AsyncRecvError::TimeoutElapsed),
        }
    }
}
