use anyhow::{Context, bail};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::Mutex,
};
use tracing::debug;
use yao_sets::channel::Channel;

/// Messages larger than this are rejected before any buffer is allocated.
const MAX_MSG_LEN: u32 = 1 << 30;

/// A channel over a TCP connection, every message is prefixed with its length (u32, big endian).
pub struct TcpChannel {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
}

impl TcpChannel {
    pub fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }
}

impl Channel for TcpChannel {
    type SendError = anyhow::Error;
    type RecvError = anyhow::Error;

    async fn send_bytes(&self, msg: Vec<u8>, phase: &str) -> Result<(), Self::SendError> {
        let len = u32::try_from(msg.len())
            .ok()
            .filter(|len| *len <= MAX_MSG_LEN)
            .with_context(|| format!("{phase} is too large ({} bytes)", msg.len()))?;
        let kb = msg.len() as f64 / 1024.0;
        debug!("Sending {phase} ({kb:.2}KB)...");
        let mut w = self.writer.lock().await;
        w.write_all(&len.to_be_bytes()).await?;
        w.write_all(&msg).await?;
        w.flush().await?;
        Ok(())
    }

    async fn recv_bytes(&self, phase: &str) -> Result<Vec<u8>, Self::RecvError> {
        let mut r = self.reader.lock().await;
        let mut len = [0; 4];
        r.read_exact(&mut len)
            .await
            .with_context(|| format!("Connection closed while waiting for {phase}"))?;
        let len = u32::from_be_bytes(len);
        if len > MAX_MSG_LEN {
            bail!("{phase} is too large ({len} bytes)");
        }
        let mut msg = vec![0; len as usize];
        r.read_exact(&mut msg).await?;
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;
    use yao_sets::channel::{recv_from, send_to};

    use super::*;

    #[tokio::test]
    async fn messages_cross_the_connection() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let a = TcpChannel::new(client?);
        let b = TcpChannel::new(server?.0);

        send_to(&a, "greeting", &(1u32, "hello".to_string())).await?;
        send_to(&a, "empty", &Vec::<u8>::new()).await?;
        let greeting: (u32, String) = recv_from(&b, "greeting").await?;
        assert_eq!(greeting, (1, "hello".to_string()));
        let empty: Vec<u8> = recv_from(&b, "empty").await?;
        assert!(empty.is_empty());
        Ok(())
    }
}
