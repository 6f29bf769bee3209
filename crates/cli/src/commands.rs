//! What each role does once the connection is up.

use std::fmt;

use anyhow::{ensure, Context};
use oob::memory::verify_test_string;
use oob::{AllocatorRegistry, MemoryKind, OobConnection, Role, TestBuffer};
use tracing::info;

use crate::config::CliConfig;

/// The two sides of the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Wait for a peer and receive its test string.
    Listen,
    /// Connect to a listener and send it a test string.
    Connect,
}

/// Summary printed when a command finishes.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub role: Role,
    pub kind: MemoryKind,
    pub size: usize,
    /// The test string as seen on the host, without its NUL.
    pub text: String,
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "----- OOB TEST SUCCESS ({}) -----", self.role)?;
        writeln!(f, "{} bytes of {} memory", self.size, self.kind)?;
        write!(f, "{}", self.text)
    }
}

impl Command {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Listener => Command::Listen,
            Role::Connector => Command::Connect,
        }
    }

    /// Bootstrap per `config` and run this side of the exchange.
    pub fn execute(
        &self,
        config: &CliConfig,
        registry: &AllocatorRegistry,
    ) -> anyhow::Result<CommandResult> {
        let bootstrap = config.bootstrap();
        match &bootstrap.server {
            Some(host) => info!(host = %host, port = bootstrap.port, "connecting"),
            None => info!(port = bootstrap.port, "waiting for connection"),
        }
        let conn = bootstrap.establish().context("out-of-band bootstrap failed")?;
        info!(peer = %conn.peer_addr(), "peer connected");

        match self {
            Command::Listen => receive(conn, registry, config.mem_type),
            Command::Connect => send(conn, registry, config.mem_type, config.size),
        }
    }
}

/// Connector side: prepare the test string in `kind` memory and ship it.
pub(crate) fn send(
    mut conn: OobConnection,
    registry: &AllocatorRegistry,
    kind: MemoryKind,
    size: usize,
) -> anyhow::Result<CommandResult> {
    conn.barrier().context("opening barrier")?;

    let buffer = TestBuffer::generate(registry, kind, size)?;
    let staged = buffer.to_host()?;
    buffer.release()?;
    conn.send_blob(&staged)?;

    conn.barrier().context("closing barrier")?;
    conn.close()?;
    Ok(summary(Role::Connector, kind, &staged))
}

/// Listener side: receive the test string into `kind` memory and check it.
pub(crate) fn receive(
    mut conn: OobConnection,
    registry: &AllocatorRegistry,
    kind: MemoryKind,
) -> anyhow::Result<CommandResult> {
    conn.barrier().context("opening barrier")?;

    let received = conn.recv_blob()?;
    ensure!(!received.is_empty(), "peer sent an empty test string");

    // land the bytes in the selected memory, then stage them back out
    let allocator = registry.resolve(kind)?;
    let mut landing = allocator.allocate(received.len())?;
    let mut staged = vec![0u8; received.len()];
    let copied = allocator
        .copy_from_host(&mut landing, 0, &received)
        .and_then(|()| allocator.copy_to_host(&mut staged, &landing, 0));
    allocator.release(landing)?;
    copied?;

    ensure!(
        verify_test_string(&staged),
        "received {} bytes that are not a test string",
        staged.len()
    );

    conn.barrier().context("closing barrier")?;
    conn.close()?;
    Ok(summary(Role::Listener, kind, &staged))
}

fn summary(role: Role, kind: MemoryKind, bytes: &[u8]) -> CommandResult {
    let text = bytes.strip_suffix(b"\0").unwrap_or(bytes);
    CommandResult {
        role,
        kind,
        size: bytes.len(),
        text: String::from_utf8_lossy(text).into_owned(),
    }
}
