//! Integration tests for the key-exchange secured channel over real sockets
//!
//! Wire format used by these tests (the framework itself defines none):
//! each side first sends its raw 32-byte public key, then length-prefixed
//! sealed frames (`u32` big-endian length, then the sealed bytes).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

use sockframe::connection::{ConnectionReader, FnAcceptHook};
use sockframe::{
    AcceptorRegistry, ConnectionHandler, ExchangeWait, ManagedConnection, SecureChannel,
};

/// Echoes decrypted frames back, re-sealed, once the exchange is done
struct SecureEchoHandler {
    channel: SecureChannel,
}

impl SecureEchoHandler {
    fn new() -> Self {
        Self {
            channel: SecureChannel::with_wait(ExchangeWait::new(Duration::from_millis(100), 3)),
        }
    }
}

#[async_trait]
impl ConnectionHandler for SecureEchoHandler {
    async fn setup(&self, conn: &ManagedConnection) -> sockframe::Result<()> {
        // Our half of the exchange goes out as soon as the writer starts.
        conn.queue_output(self.channel.public_key().to_vec());
        Ok(())
    }

    async fn read_input(
        &self,
        conn: &ManagedConnection,
        io: &mut ConnectionReader,
    ) -> sockframe::Result<bool> {
        if !self.channel.is_complete() {
            let mut peer_key = [0u8; 32];
            io.read_exact(&mut peer_key).await?;
            self.channel.finish_exchange(peer_key)?;
            return Ok(true);
        }

        let len = io.read_u32().await? as usize;
        let mut sealed = vec![0u8; len];
        io.read_exact(&mut sealed).await?;

        let plaintext = self.channel.decrypt(&sealed, len).await?;
        let reply = self.channel.encrypt(&plaintext).await?;

        let mut frame = Vec::with_capacity(4 + reply.len());
        frame.extend_from_slice(&(reply.len() as u32).to_be_bytes());
        frame.extend_from_slice(&reply);
        conn.queue_output(frame);
        Ok(true)
    }
}

async fn secure_echo_server(port: u16) -> AcceptorRegistry {
    let registry = AcceptorRegistry::default();

    let factory = |stream: TcpStream| {
        ManagedConnection::new(stream, Arc::new(SecureEchoHandler::new()))
    };
    let hook = FnAcceptHook(|conn: Arc<ManagedConnection>, _port: u16| async move {
        conn.start().await
    });

    registry
        .start_with_hook(port, factory, Arc::new(hook))
        .await
        .unwrap();
    registry
}

async fn write_frame(stream: &mut TcpStream, sealed: &[u8]) {
    stream
        .write_all(&(sealed.len() as u32).to_be_bytes())
        .await
        .unwrap();
    stream.write_all(sealed).await.unwrap();
}

async fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let len = stream.read_u32().await.unwrap() as usize;
    let mut sealed = vec![0u8; len];
    stream.read_exact(&mut sealed).await.unwrap();
    sealed
}

#[tokio::test]
async fn encrypted_echo_round_trip() {
    let registry = secure_echo_server(19301).await;

    let client = SecureChannel::new();
    let mut stream = TcpStream::connect("127.0.0.1:19301").await.unwrap();

    // Exchange public keys.
    let mut server_key = [0u8; 32];
    timeout(Duration::from_secs(1), stream.read_exact(&mut server_key))
        .await
        .unwrap()
        .unwrap();
    client.finish_exchange(server_key).unwrap();
    stream.write_all(&client.public_key()).await.unwrap();

    // Round-trip a few messages of different shapes.
    for message in [&b"hello"[..], &[0u8; 1][..], &[0xAB; 600][..]] {
        let sealed = client.encrypt(message).await.unwrap();
        write_frame(&mut stream, &sealed).await;

        let reply = timeout(Duration::from_secs(1), read_frame(&mut stream))
            .await
            .unwrap();
        let plaintext = client.decrypt(&reply, reply.len()).await.unwrap();
        assert_eq!(plaintext, message);
    }

    registry.stop_all().await;
}

#[tokio::test]
async fn server_stalls_bounded_when_client_never_sends_its_key() {
    let registry = secure_echo_server(19302).await;

    let mut stream = TcpStream::connect("127.0.0.1:19302").await.unwrap();

    // Take the server's key but never answer; the connection must stay up
    // (the server is merely parked in read_input) and our socket must not
    // be written to beyond the key.
    let mut server_key = [0u8; 32];
    timeout(Duration::from_secs(1), stream.read_exact(&mut server_key))
        .await
        .unwrap()
        .unwrap();

    let mut extra = [0u8; 1];
    let silence = timeout(Duration::from_millis(300), stream.read(&mut extra)).await;
    assert!(silence.is_err(), "server sent data before exchange finished");

    registry.stop_all().await;
}

#[tokio::test]
async fn mismatched_keys_fail_decryption_cleanly() {
    let alice = SecureChannel::new();
    let bob = SecureChannel::new();
    let mallory = SecureChannel::new();

    // Alice pairs with Bob, Mallory pairs with Alice's key only.
    alice.finish_exchange(bob.public_key()).unwrap();
    mallory.finish_exchange(alice.public_key()).unwrap();

    let sealed = alice.encrypt(b"for bob only").await.unwrap();
    let stolen = mallory.decrypt(&sealed, sealed.len()).await;
    assert!(stolen.is_err());
}
