//! net/association.rs
//!
//! One transport connection plus its framing state. An association never
//! calls back into anyone; the driver inspects it after each I/O step and
//! decides what to report.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};

use bytes::{Buf, Bytes, BytesMut};
use mio::net::{TcpListener, TcpStream};

use super::links::AssocId;
use super::multiplexer::Interest;
use crate::wire_protocol::{FrameError, peek_frame};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const READ_CHUNK: usize = 16 * 1024;

// -----------------------------------------------------------------------------
// ----- AssocState ------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssocState {
    Connecting,
    Listening,
    Accepting,
    Ready,
    Writing,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Open,
    EndOfStream,
}

enum Socket {
    Stream(TcpStream),
    Listener(TcpListener),
    Released,
}

// -----------------------------------------------------------------------------
// ----- Association -----------------------------------------------------------

pub struct Association {
    state: AssocState,
    socket: Socket,
    listener: Option<AssocId>,
    inbox: BytesMut,
    outbox: VecDeque<Bytes>,
    close_after_flush: bool,
    peer: Option<SocketAddr>,
}

// -----------------------------------------------------------------------------
// ----- Association: Static ---------------------------------------------------

impl Association {
    pub fn connect(addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        Ok(Self::with_socket(AssocState::Connecting, Socket::Stream(stream), None))
    }

    pub fn listen(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self::with_socket(AssocState::Listening, Socket::Listener(listener), None))
    }

    pub fn accepted(stream: TcpStream, peer: SocketAddr, listener: AssocId) -> Self {
        let _ = stream.set_nodelay(true);
        let mut assoc = Self::with_socket(AssocState::Accepting, Socket::Stream(stream), Some(listener));
        assoc.peer = Some(peer);
        assoc
    }

    fn with_socket(state: AssocState, socket: Socket, listener: Option<AssocId>) -> Self {
        Self {
            state,
            socket,
            listener,
            inbox: BytesMut::with_capacity(READ_CHUNK),
            outbox: VecDeque::new(),
            close_after_flush: false,
            peer: None,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Association: Public ---------------------------------------------------

impl Association {
    pub fn state(&self) -> AssocState {
        self.state
    }

    pub fn listener(&self) -> Option<AssocId> {
        self.listener
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.state == AssocState::Closed
    }

    pub fn raw_fd(&self) -> Option<RawFd> {
        match &self.socket {
            Socket::Stream(s) => Some(s.as_raw_fd()),
            Socket::Listener(l) => Some(l.as_raw_fd()),
            Socket::Released => None,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match &self.socket {
            Socket::Stream(s) => s.local_addr(),
            Socket::Listener(l) => l.local_addr(),
            Socket::Released => Err(io::ErrorKind::NotConnected.into()),
        }
    }

    pub fn interest(&self) -> Interest {
        match self.state {
            AssocState::Connecting => Interest::WRITE,
            AssocState::Listening | AssocState::Accepting | AssocState::Ready => Interest::READ,
            AssocState::Writing => Interest::READ | Interest::WRITE,
            AssocState::Closed => Interest::NONE,
        }
    }

    /// The accept handshake is done once the handler has been told.
    pub fn mark_ready(&mut self) {
        if self.state == AssocState::Accepting {
            self.state = self.settled_state();
        }
    }

    /// `Ok(true)` once the outbound connect has completed.
    pub fn complete_connect(&mut self) -> io::Result<bool> {
        let Socket::Stream(stream) = &self.socket else {
            return Ok(false);
        };

        if let Some(e) = stream.take_error()? {
            return Err(e);
        }

        match stream.peer_addr() {
            Ok(addr) => {
                let _ = stream.set_nodelay(true);
                self.peer = Some(addr);
                self.state = self.settled_state();
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn accept(&mut self) -> io::Result<Option<(TcpStream, SocketAddr)>> {
        let Socket::Listener(listener) = &self.socket else {
            return Ok(None);
        };

        loop {
            match listener.accept() {
                Ok(pair) => return Ok(Some(pair)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Drain the socket into the inbox until it would block.
    pub fn fill_inbox(&mut self) -> io::Result<ReadOutcome> {
        let Socket::Stream(stream) = &mut self.socket else {
            return Ok(ReadOutcome::Open);
        };

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => return Ok(ReadOutcome::EndOfStream),
                Ok(n) => self.inbox.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(ReadOutcome::Open),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Split off the next complete frame, if the inbox holds one.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, FrameError> {
        match peek_frame(&self.inbox)? {
            Some((_, len)) => Ok(Some(self.inbox.split_to(len).freeze())),
            None => Ok(None),
        }
    }

    pub fn enqueue(&mut self, frame: Bytes) {
        if self.is_closed() || frame.is_empty() {
            return;
        }
        self.outbox.push_back(frame);
    }

    /// Write as much pending output as the socket takes.
    pub fn flush(&mut self) -> io::Result<()> {
        if matches!(
            self.state,
            AssocState::Connecting | AssocState::Listening | AssocState::Closed
        ) {
            return Ok(());
        }

        let Socket::Stream(stream) = &mut self.socket else {
            return Ok(());
        };

        while let Some(front) = self.outbox.front_mut() {
            match stream.write(&front[..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    front.advance(n);
                    if front.is_empty() {
                        self.outbox.pop_front();
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if self.state != AssocState::Accepting {
            self.state = self.settled_state();
        }
        Ok(())
    }

    pub fn pending_output(&self) -> usize {
        self.outbox.len()
    }

    pub fn request_close_after_flush(&mut self) {
        self.close_after_flush = true;
    }

    /// Close-after-flush was requested and nothing is left to write.
    pub fn should_close(&self) -> bool {
        self.close_after_flush && self.outbox.is_empty() && self.state != AssocState::Connecting
    }

    /// Drop the transport. Callers deregister the descriptor first.
    pub fn release(&mut self) {
        self.socket = Socket::Released;
        self.state = AssocState::Closed;
        self.outbox.clear();
        self.inbox.clear();
    }
}

// -----------------------------------------------------------------------------
// ----- Association: Private --------------------------------------------------

impl Association {
    fn settled_state(&self) -> AssocState {
        if self.outbox.is_empty() {
            AssocState::Ready
        } else {
            AssocState::Writing
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write as _;
    use std::net::TcpListener as StdListener;
    use std::time::Duration;

    fn connected_pair() -> (Association, std::net::TcpStream) {
        let listener = StdListener::bind("127.0.0.1:0").unwrap();
        let mut assoc = Association::connect(listener.local_addr().unwrap()).unwrap();
        let (peer, _) = listener.accept().unwrap();

        for _ in 0..100 {
            if assoc.complete_connect().unwrap() {
                return (assoc, peer);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("connect never completed");
    }

    #[test]
    fn connect_moves_to_ready() {
        let listener = StdListener::bind("127.0.0.1:0").unwrap();
        let assoc = Association::connect(listener.local_addr().unwrap()).unwrap();

        assert_eq!(assoc.state(), AssocState::Connecting);
        assert_eq!(assoc.interest(), Interest::WRITE);

        let (assoc, _peer) = connected_pair();
        assert_eq!(assoc.state(), AssocState::Ready);
        assert_eq!(assoc.interest(), Interest::READ);
    }

    #[test]
    fn frames_are_split_one_at_a_time() {
        let (mut assoc, mut peer) = connected_pair();

        // two native frames plus the first byte of a third
        peer.write_all(&[b'X', 0, 0, 0, 5, 1, b'X', 0, 0, 0, 5, 2, b'X'])
            .unwrap();

        for _ in 0..100 {
            assoc.fill_inbox().unwrap();
            if assoc.inbox.len() >= 13 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(&assoc.next_frame().unwrap().unwrap()[..], &[b'X', 0, 0, 0, 5, 1]);
        assert_eq!(&assoc.next_frame().unwrap().unwrap()[..], &[b'X', 0, 0, 0, 5, 2]);
        assert!(assoc.next_frame().unwrap().is_none());
    }

    #[test]
    fn end_of_stream_is_reported() {
        let (mut assoc, peer) = connected_pair();
        drop(peer);

        let mut outcome = ReadOutcome::Open;
        for _ in 0..100 {
            outcome = assoc.fill_inbox().unwrap_or(ReadOutcome::EndOfStream);
            if outcome == ReadOutcome::EndOfStream {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(outcome, ReadOutcome::EndOfStream);
    }

    #[test]
    fn output_queued_while_connecting_is_kept() {
        let listener = StdListener::bind("127.0.0.1:0").unwrap();
        let mut assoc = Association::connect(listener.local_addr().unwrap()).unwrap();

        assoc.enqueue(Bytes::from_static(b"hello"));
        assoc.flush().unwrap();
        assert_eq!(assoc.pending_output(), 1);
        assert!(!assoc.should_close());
    }

    #[test]
    fn flush_empties_outbox_and_close_after_flush_triggers() {
        let (mut assoc, _peer) = connected_pair();

        assoc.enqueue(Bytes::from_static(b"bye"));
        assoc.request_close_after_flush();
        assert!(!assoc.should_close());

        assoc.flush().unwrap();
        assert_eq!(assoc.pending_output(), 0);
        assert_eq!(assoc.state(), AssocState::Ready);
        assert!(assoc.should_close());
    }

    #[test]
    fn released_association_ignores_output() {
        let (mut assoc, _peer) = connected_pair();
        assoc.release();

        assoc.enqueue(Bytes::from_static(b"late"));
        assert_eq!(assoc.pending_output(), 0);
        assert_eq!(assoc.interest(), Interest::NONE);
        assert!(assoc.raw_fd().is_none());
    }

    #[test]
    fn listener_never_becomes_ready() {
        let mut assoc = Association::listen("127.0.0.1:0".parse().unwrap()).unwrap();
        assoc.flush().unwrap();
        assoc.mark_ready();

        assert_eq!(assoc.state(), AssocState::Listening);
        assert!(assoc.accept().unwrap().is_none());
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
