//! Socket readiness: the one OS primitive the replica set blocks on

use crate::error::Result;
use crate::types::SocketId;
use std::time::Duration;

/// Waits for any of a set of sockets to become readable
pub trait ReadinessPoller {
    /// Block until at least one of `sockets` is readable or `timeout` elapses.
    ///
    /// Returns the readable subset, empty on timeout. Implementations must
    /// only report sockets they were asked to watch.
    fn wait_readable(&mut self, sockets: &[SocketId], timeout: Duration) -> Result<Vec<SocketId>>;
}

#[cfg(unix)]
pub use self::mio_poller::MioPoller;

#[cfg(unix)]
mod mio_poller {
    use super::ReadinessPoller;
    use crate::error::Result;
    use crate::types::SocketId;
    use mio::unix::SourceFd;
    use mio::{Events, Interest, Poll, Token};
    use std::io::{self, ErrorKind};
    use std::time::Duration;

    /// Readiness poller backed by `mio`.
    ///
    /// Sockets are registered for the duration of a single wait and
    /// deregistered afterwards, so each call reports the readiness of the
    /// sockets as they are at that moment (level-triggered, like `select`).
    pub struct MioPoller {
        poll: Poll,
        events: Events,
    }

    impl MioPoller {
        pub fn new() -> io::Result<Self> {
            Ok(Self {
                poll: Poll::new()?,
                events: Events::with_capacity(64),
            })
        }

        fn register_all(&self, sockets: &[SocketId]) -> io::Result<()> {
            let registry = self.poll.registry();
            for (i, socket) in sockets.iter().enumerate() {
                let fd = socket.as_raw_fd();
                let registered = if fd < 0 {
                    Err(io::Error::new(
                        ErrorKind::InvalidInput,
                        format!("invalid socket {}", socket),
                    ))
                } else {
                    registry.register(&mut SourceFd(&fd), Token(fd as usize), Interest::READABLE)
                };

                if let Err(e) = registered {
                    self.deregister_all(&sockets[..i]);
                    return Err(e);
                }
            }
            Ok(())
        }

        fn deregister_all(&self, sockets: &[SocketId]) {
            let registry = self.poll.registry();
            for socket in sockets {
                let fd = socket.as_raw_fd();
                if let Err(e) = registry.deregister(&mut SourceFd(&fd)) {
                    tracing::debug!("Failed to deregister socket {}: {}", socket, e);
                }
            }
        }
    }

    impl ReadinessPoller for MioPoller {
        fn wait_readable(
            &mut self,
            sockets: &[SocketId],
            timeout: Duration,
        ) -> Result<Vec<SocketId>> {
            if sockets.is_empty() {
                return Ok(Vec::new());
            }

            if self.events.capacity() < sockets.len() {
                self.events = Events::with_capacity(sockets.len());
            }

            self.register_all(sockets)?;
            let polled = self.poll.poll(&mut self.events, Some(timeout));
            self.deregister_all(sockets);

            match polled {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            }

            // Hang-ups and errors count as readable: the next read reports them.
            let ready = self
                .events
                .iter()
                .filter(|e| e.is_readable() || e.is_read_closed() || e.is_error())
                .map(|e| SocketId(e.token().0 as i32))
                .collect();
            Ok(ready)
        }
    }

}
