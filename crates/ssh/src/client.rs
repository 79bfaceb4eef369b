//! russh-backed connection factory.
//!
//! Each opened channel is driven by one pump task on the shared Tokio
//! runtime. The task owns the russh channel and transport handle; blocking
//! callers talk to it through the reader/writer/control halves of a
//! [`ShellChannel`]:
//!
//! - output flows pump -> `std::sync::mpsc` -> [`ChannelReader`]
//! - writes and resizes flow through a command queue, each write waiting for
//!   the pump to confirm it reached the transport
//!
//! Closing the control half ends the pump, which drops the output sender and
//! unblocks the reader.

use crate::classify::classify;
use crate::error::{ConnectError, ErrorKind};
use crate::factory::ConnectionFactory;
use crate::host::{Credential, HostDescriptor};
use anyhow::Context as _;
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg, PublicKey};
use russh::{Channel, ChannelMsg, Disconnect};
use settings::constants::pty::TERM_TYPE;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::time::Duration;
use terminal::{ChannelControl, ShellChannel, TermSize};
use tokio::sync::{mpsc, oneshot};
use tokio_bridge::TokioBridge;

type OutputChunk = io::Result<Vec<u8>>;

struct ClientHandler {
    address: String,
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        // No known_hosts check and no interactive confirmation: every host
        // key is accepted. This trades MITM protection for a prompt-free
        // connect and is intentional.
        tracing::debug!(host = %self.address, "Accepting server host key without verification");
        Ok(true)
    }
}

/// Opens shell channels over SSH using the shared Tokio runtime.
pub struct SshConnectionFactory {
    runtime: Arc<TokioBridge>,
    initial_size: TermSize,
}

impl SshConnectionFactory {
    pub fn new(runtime: Arc<TokioBridge>, config: &settings::Config) -> Self {
        let (cols, rows) = config.initial_grid();
        Self {
            runtime,
            initial_size: TermSize::for_config(cols, rows, config),
        }
    }
}

impl ConnectionFactory for SshConnectionFactory {
    fn open(&self, host: &HostDescriptor, timeout: Duration) -> Result<ShellChannel, ConnectError> {
        // Key identity is loaded before any transport exists.
        let identity = load_identity(&host.credential).map_err(|e| {
            ConnectError::new(ErrorKind::AuthenticationFailure, format!("{e:#}"))
        })?;

        tracing::info!(
            host = %host,
            method = host.credential.method(),
            timeout_ms = timeout.as_millis() as u64,
            "Opening SSH shell"
        );

        let size = self.initial_size;
        let established = self.runtime.block_on(async {
            tokio::time::timeout(timeout, establish(host, identity, size)).await
        });

        let (session, channel) = match established {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                let error = classify(&e);
                tracing::warn!(host = %host, kind = %error.kind, "Connect failed: {:#}", e);
                return Err(error);
            }
            Err(_) => {
                tracing::warn!(host = %host, "Connect timed out after {:?}", timeout);
                return Err(ConnectError::new(
                    ErrorKind::ConnectionTimeout,
                    format!("no shell from {} within {:?}", host.address(), timeout),
                ));
            }
        };

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = std_mpsc::channel();
        let open = Arc::new(AtomicBool::new(true));
        let close_requested = Arc::new(AtomicBool::new(false));

        self.runtime.spawn(pump(
            session,
            channel,
            command_rx,
            output_tx,
            open.clone(),
            host.address(),
        ));

        Ok(ShellChannel::new(
            ChannelReader {
                output: output_rx,
                chunk: Vec::new(),
                pos: 0,
                close_requested: close_requested.clone(),
            },
            ChannelWriter {
                commands: command_tx.clone(),
            },
            ChannelHandle {
                commands: command_tx,
                open,
                close_requested,
            },
        ))
    }
}

fn load_identity(credential: &Credential) -> anyhow::Result<Option<Arc<PrivateKey>>> {
    match credential {
        Credential::Password(_) => Ok(None),
        Credential::Key { path, passphrase } => {
            let key = russh::keys::load_secret_key(path, passphrase.as_deref())
                .with_context(|| format!("cannot load authentication key {}", path.display()))?;
            Ok(Some(Arc::new(key)))
        }
    }
}

async fn establish(
    host: &HostDescriptor,
    identity: Option<Arc<PrivateKey>>,
    size: TermSize,
) -> anyhow::Result<(Handle<ClientHandler>, Channel<Msg>)> {
    let config = Arc::new(client::Config::default());
    let handler = ClientHandler {
        address: host.address(),
    };

    let mut session = client::connect(config, (host.hostname.as_str(), host.port), handler)
        .await
        .with_context(|| format!("failed to connect to {}", host.address()))?;

    let auth = match (&host.credential, identity) {
        (Credential::Password(password), _) => session
            .authenticate_password(host.username.as_str(), password.as_str())
            .await
            .context("password authentication error")?,
        (Credential::Key { .. }, Some(key)) => {
            let hash = session.best_supported_rsa_hash().await?.flatten();
            session
                .authenticate_publickey(
                    host.username.as_str(),
                    PrivateKeyWithHashAlg::new(key, hash),
                )
                .await
                .context("public key authentication error")?
        }
        (Credential::Key { .. }, None) => anyhow::bail!("authentication key was not loaded"),
    };
    if !auth.success() {
        anyhow::bail!("authentication rejected for user {}", host.username);
    }

    let channel = session
        .channel_open_session()
        .await
        .context("failed to open session channel")?;
    channel
        .request_pty(
            true,
            TERM_TYPE,
            size.cols.into(),
            size.rows.into(),
            size.pixel_width.into(),
            size.pixel_height.into(),
            &[],
        )
        .await
        .context("PTY request failed")?;
    channel
        .request_shell(true)
        .await
        .context("shell request failed")?;

    tracing::debug!(host = %host, size = %size, "Shell channel negotiated");
    Ok((session, channel))
}

enum ChannelCommand {
    Write {
        data: Vec<u8>,
        respond_to: oneshot::Sender<io::Result<()>>,
    },
    Resize(TermSize),
    Close,
}

/// Owns the russh channel for its whole life.
async fn pump(
    session: Handle<ClientHandler>,
    mut channel: Channel<Msg>,
    mut commands: mpsc::UnboundedReceiver<ChannelCommand>,
    output: std_mpsc::Sender<OutputChunk>,
    open: Arc<AtomicBool>,
    address: String,
) {
    let outcome: io::Result<()> = loop {
        tokio::select! {
            msg = channel.wait() => match msg {
                Some(ChannelMsg::Data { data }) | Some(ChannelMsg::ExtendedData { data, .. }) => {
                    if output.send(Ok(data.to_vec())).is_err() {
                        break Ok(());
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    tracing::debug!(host = %address, exit_status, "Remote shell exited");
                }
                Some(ChannelMsg::Failure) => {
                    tracing::warn!(host = %address, "Remote rejected a channel request");
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) => break Ok(()),
                Some(_) => {}
                None => {
                    break Err(io::Error::new(
                        io::ErrorKind::ConnectionReset,
                        "transport closed unexpectedly",
                    ))
                }
            },
            command = commands.recv() => match command {
                Some(ChannelCommand::Write { data, respond_to }) => {
                    let result = channel.data(&data[..]).await.map_err(to_io);
                    let _ = respond_to.send(result);
                }
                Some(ChannelCommand::Resize(size)) => {
                    let result = channel
                        .window_change(
                            size.cols.into(),
                            size.rows.into(),
                            size.pixel_width.into(),
                            size.pixel_height.into(),
                        )
                        .await;
                    if let Err(e) = result {
                        tracing::warn!(host = %address, "Window change failed: {}", e);
                    }
                }
                Some(ChannelCommand::Close) | None => {
                    let _ = channel.eof().await;
                    let _ = channel.close().await;
                    break Ok(());
                }
            },
        }
    };

    open.store(false, Ordering::Release);
    if let Err(e) = outcome {
        tracing::warn!(host = %address, "Shell channel lost: {}", e);
        let _ = output.send(Err(e));
    }
    drop(output);

    if let Err(e) = session
        .disconnect(Disconnect::ByApplication, "", "en")
        .await
    {
        tracing::debug!(host = %address, "Disconnect after channel end failed: {}", e);
    }
    tracing::debug!(host = %address, "Channel pump stopped");
}

fn to_io(error: russh::Error) -> io::Error {
    match error {
        russh::Error::IO(e) => e,
        other => io::Error::new(io::ErrorKind::BrokenPipe, other.to_string()),
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "shell channel is closed")
}

struct ChannelReader {
    output: std_mpsc::Receiver<OutputChunk>,
    chunk: Vec<u8>,
    pos: usize,
    close_requested: Arc<AtomicBool>,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.chunk.len() {
            match self.output.recv() {
                Ok(Ok(data)) => {
                    self.chunk = data;
                    self.pos = 0;
                }
                Ok(Err(e)) => return Err(e),
                // Pump gone. A local close turns that into an error so the
                // reader can tell it apart from the remote shell exiting.
                Err(_) if self.close_requested.load(Ordering::Acquire) => {
                    return Err(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        "shell channel closed locally",
                    ))
                }
                Err(_) => return Ok(0),
            }
        }

        let n = buf.len().min(self.chunk.len() - self.pos);
        buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

struct ChannelWriter {
    commands: mpsc::UnboundedSender<ChannelCommand>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let (respond_to, response) = oneshot::channel();
        self.commands
            .send(ChannelCommand::Write {
                data: buf.to_vec(),
                respond_to,
            })
            .map_err(|_| closed_error())?;
        response.blocking_recv().map_err(|_| closed_error())??;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct ChannelHandle {
    commands: mpsc::UnboundedSender<ChannelCommand>,
    open: Arc<AtomicBool>,
    close_requested: Arc<AtomicBool>,
}

impl ChannelControl for ChannelHandle {
    fn resize(&self, size: TermSize) -> io::Result<()> {
        self.commands
            .send(ChannelCommand::Resize(size))
            .map_err(|_| closed_error())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.commands.is_closed()
    }

    fn close(&self) -> io::Result<()> {
        self.close_requested.store(true, Ordering::Release);
        self.open.store(false, Ordering::Release);
        // Pump may already be gone; that is as closed as it gets.
        let _ = self.commands.send(ChannelCommand::Close);
        Ok(())
    }
}
