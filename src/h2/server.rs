//! HTTP/2 server
//!
//! Accepts plain TCP connections and runs one [`Connection`] per accepted
//! socket on its own thread. Stream events of each connection are handed
//! to an application callback running on a second thread, so the frame
//! reader never waits for the application. The callback answers through
//! the command sender it is given.

use super::connection::{Connection, StreamCommand, StreamEvent};
use super::error::Result;
use super::settings::{Settings, SettingsBuilder};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, BufReader, BufWriter};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection type produced by [`H2Server::accept`]
pub type TcpConnection = Connection<BufReader<TcpStream>, BufWriter<TcpStream>>;

/// Pause after the first listener error
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);
/// Longest pause between failing accepts
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// HTTP/2 server
pub struct H2Server {
    listener: TcpListener,
    settings: Settings,
    poll_interval: Duration,
    idle_timeout: Option<Duration>,
}

impl H2Server {
    /// Address the server is listening on
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Settings advertised to every client
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Accept one TCP connection
    pub fn accept(&self) -> Result<(TcpConnection, SocketAddr)> {
        let (stream, peer) = self.listener.accept()?;
        let connection = self.connection_for(stream)?;
        debug!(%peer, "accepted connection");
        Ok((connection, peer))
    }

    /// Wrap an accepted socket
    ///
    /// Reads time out every `poll_interval` so the connection can send
    /// responses while the client is quiet.
    fn connection_for(&self, stream: TcpStream) -> io::Result<TcpConnection> {
        stream.set_read_timeout(Some(self.poll_interval))?;
        stream.set_nodelay(true)?;

        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream);
        let connection = Connection::with_settings(reader, writer, self.settings.clone());
        Ok(match self.idle_timeout {
            Some(timeout) => connection.with_idle_timeout(timeout),
            None => connection,
        })
    }

    /// Accept one connection and serve it on the calling thread
    pub fn serve_one(
        &self,
        events: Sender<StreamEvent>,
        commands: Receiver<StreamCommand>,
    ) -> Result<()> {
        let (connection, _) = self.accept()?;
        connection.with_events(events).with_commands(commands).serve()
    }

    /// Accept connections forever
    ///
    /// `on_connection` runs on its own thread for every connection. It gets
    /// the receiving end of that connection's stream events and a sender
    /// for the frames it wants to send back.
    ///
    /// Transient accept errors are retried at once. Other listener errors
    /// (running out of file descriptors, for one) pause the loop, longer
    /// after each consecutive failure. A socket that cannot be set up is
    /// dropped without affecting the listener.
    pub fn serve<F>(&self, on_connection: F) -> Result<()>
    where
        F: Fn(SocketAddr, Receiver<StreamEvent>, Sender<StreamCommand>) + Send + Sync + 'static,
    {
        let on_connection = Arc::new(on_connection);
        let mut backoff = ACCEPT_BACKOFF_MIN;

        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => {
                    backoff = ACCEPT_BACKOFF_MIN;
                    accepted
                }
                Err(e) if is_transient_accept_error(&e) => {
                    debug!(error = %e, "transient accept error");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, pause_ms = backoff.as_millis() as u64, "accept failed");
                    thread::sleep(backoff);
                    backoff = next_backoff(backoff);
                    continue;
                }
            };

            let connection = match self.connection_for(stream) {
                Ok(connection) => connection,
                Err(e) => {
                    warn!(%peer, error = %e, "socket setup failed, dropping connection");
                    continue;
                }
            };
            debug!(%peer, "accepted connection");

            let (events, events_rx) = mpsc::channel();
            let (commands, commands_rx) = mpsc::channel();
            let handler = Arc::clone(&on_connection);
            thread::spawn(move || handler(peer, events_rx, commands));

            thread::spawn(move || {
                let mut connection = connection.with_events(events).with_commands(commands_rx);
                match connection.serve() {
                    Ok(()) => debug!(%peer, "connection closed"),
                    Err(e) => warn!(%peer, error = %e, code = %e.code(), "connection failed"),
                }
            });
        }
    }
}

/// Errors that concern one incoming connection rather than the listener
fn is_transient_accept_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(ACCEPT_BACKOFF_MAX)
}

/// HTTP/2 server builder
pub struct H2ServerBuilder {
    settings: SettingsBuilder,
    poll_interval: Duration,
    idle_timeout: Option<Duration>,
    backlog: i32,
}

impl H2ServerBuilder {
    /// Create a new server builder
    pub fn new() -> Self {
        H2ServerBuilder {
            settings: SettingsBuilder::new(),
            poll_interval: Duration::from_millis(50),
            idle_timeout: None,
            backlog: 128,
        }
    }

    /// Set header table size
    pub fn header_table_size(mut self, size: u32) -> Self {
        self.settings = self.settings.header_table_size(size);
        self
    }

    /// Set enable push
    pub fn enable_push(mut self, enable: bool) -> Self {
        self.settings = self.settings.enable_push(enable);
        self
    }

    /// Set initial window size
    pub fn initial_window_size(mut self, size: u32) -> Self {
        self.settings = self.settings.initial_window_size(size);
        self
    }

    /// Set max concurrent streams
    pub fn max_concurrent_streams(mut self, max: u32) -> Self {
        self.settings = self.settings.max_concurrent_streams(max);
        self
    }

    /// Set max frame size
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.settings = self.settings.max_frame_size(size);
        self
    }

    /// Set max header list size
    pub fn max_header_list_size(mut self, size: u32) -> Self {
        self.settings = self.settings.max_header_list_size(size);
        self
    }

    /// How often a quiet connection checks for responses to send
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Close connections without open streams that stay silent for this long
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Listen queue length
    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Validate the settings and start listening on `addr`
    pub fn bind(self, addr: SocketAddr) -> Result<H2Server> {
        let settings = self.settings.build()?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(self.backlog)?;

        let listener: TcpListener = socket.into();
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "listening");

        Ok(H2Server {
            listener,
            settings,
            poll_interval: self.poll_interval,
            idle_timeout: self.idle_timeout,
        })
    }
}

impl Default for H2ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
