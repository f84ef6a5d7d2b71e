//! TCP server and connection handling.
//!
//! The server accepts Redis clients, parses pipelined RESP frames from a
//! per-connection buffer, and dispatches each command to the machine on the
//! blocking thread pool (store I/O and the machine's locks are synchronous).
//! Replies are written back in arrival order. A watch channel carries the
//! node's shutdown signal into every connection task.

use crate::machine::Machine;
use crate::protocol::{encode_to_vec, Command, ParseResult, RespParser, RespValue};
use crate::replication::Applier;
use bytes::{Buf, BytesMut};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// The Redis-protocol server.
pub struct Server {
    machine: Arc<Machine>,
    applier: Arc<dyn Applier>,
    bind: std::net::SocketAddr,
}

impl Server {
    /// Create a server fronting `machine` through `applier`.
    pub fn new(
        machine: Arc<Machine>,
        applier: Arc<dyn Applier>,
        bind: std::net::SocketAddr,
    ) -> Self {
        Self {
            machine,
            applier,
            bind,
        }
    }

    /// Accept connections until the machine's shutdown signal fires.
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.bind).await?;
        info!(addr = %self.bind, "listening");

        let mut shutdown = self.machine.shutdown_signal();
        let mut connection_id = 0u64;

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, remote)) => {
                            connection_id += 1;
                            let machine = Arc::clone(&self.machine);
                            let applier = Arc::clone(&self.applier);
                            debug!(%remote, connection_id, "accepted connection");
                            tokio::spawn(handle_connection(
                                machine,
                                applier,
                                stream,
                                connection_id,
                            ));
                        }
                        Err(e) => {
                            error!(error = %e, "accept failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("shutdown signal received, closing listener");
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Serve one connection until it closes, errors, or the node shuts down.
async fn handle_connection(
    machine: Arc<Machine>,
    applier: Arc<dyn Applier>,
    mut stream: TcpStream,
    connection_id: u64,
) {
    let _ = stream.set_nodelay(true);
    let mut parser = RespParser::new();
    let mut buffer = BytesMut::with_capacity(4096);
    let mut shutdown = machine.shutdown_signal();

    'conn: loop {
        tokio::select! {
            result = stream.read_buf(&mut buffer) => {
                match result {
                    Ok(0) => break 'conn,
                    Ok(_) => {}
                    Err(e) => {
                        debug!(connection_id, error = %e, "read failed");
                        break 'conn;
                    }
                }

                while !buffer.is_empty() {
                    match parser.parse(&buffer) {
                        ParseResult::Complete(value, used) => {
                            buffer.advance(used);
                            let cmd = match Command::from_resp(value) {
                                Ok(cmd) => cmd,
                                Err(e) => {
                                    let reply = encode_to_vec(&e.to_resp());
                                    if stream.write_all(&reply).await.is_err() {
                                        break 'conn;
                                    }
                                    continue;
                                }
                            };

                            let reply = dispatch(&machine, &applier, cmd.clone()).await;
                            let is_shutdown =
                                cmd.name() == "shutdown" && !reply.is_error();
                            if stream.write_all(&encode_to_vec(&reply)).await.is_err() {
                                break 'conn;
                            }
                            if is_shutdown {
                                // SHUTDOWN closes the connection after OK.
                                break 'conn;
                            }
                        }
                        ParseResult::Incomplete => break,
                        ParseResult::Error(e) => {
                            let reply = RespValue::Error(format!("ERR protocol error: {}", e));
                            let _ = stream.write_all(&encode_to_vec(&reply)).await;
                            break 'conn;
                        }
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break 'conn;
                }
            }
        }
    }

    debug!(connection_id, "connection closed");
}

/// Run one command on the blocking pool and shape its reply.
async fn dispatch(machine: &Arc<Machine>, applier: &Arc<dyn Applier>, cmd: Command) -> RespValue {
    let machine = Arc::clone(machine);
    let applier = Arc::clone(applier);
    let result =
        tokio::task::spawn_blocking(move || machine.command(applier.as_ref(), &cmd)).await;
    match result {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => e.to_resp(),
        Err(join) => {
            error!(error = %join, "command task failed");
            RespValue::Error("ERR internal error".to_string())
        }
    }
}
