use crate::line_transport::{LineTransport, SerialLink};
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::time::{Duration, Instant};

/// Scripted serial port.
///
/// Every complete line written releases the next reply block into the
/// input buffer, at once or after its delay. Reads from an empty buffer
/// time out like an idle port, or return end of file once closed.
pub struct MockPort {
    replies: VecDeque<(Vec<u8>, Duration)>,
    late: Vec<(Instant, Vec<u8>)>,
    input: VecDeque<u8>,
    written: Vec<u8>,
    closed: bool,
}

impl MockPort {
    pub fn new() -> MockPort {
        MockPort {
            replies: VecDeque::new(),
            late: Vec::new(),
            input: VecDeque::new(),
            written: Vec::new(),
            closed: false,
        }
    }

    /// Bytes already waiting before anything is written
    pub fn stale(mut self, data: &str) -> MockPort {
        self.input.extend(data.bytes());
        self
    }

    /// Reply block for the next written line
    pub fn reply(mut self, block: &str) -> MockPort {
        self.replies.push_back((block.as_bytes().to_vec(), Duration::from_secs(0)));
        self
    }

    /// Reply block that arrives `delay` after the line is written
    pub fn reply_after(mut self, block: &str, delay: Duration) -> MockPort {
        self.replies.push_back((block.as_bytes().to_vec(), delay));
        self
    }

    /// Raw bytes
    pub fn reply_bytes(mut self, block: &[u8]) -> MockPort {
        self.replies.push_back((block.to_vec(), Duration::from_secs(0)));
        self
    }

    /// Reads return end of file once the input is used up
    pub fn closed(mut self) -> MockPort {
        self.closed = true;
        self
    }

    pub fn lines_written(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.written)
            .lines()
            .map(|l| l.to_string())
            .collect()
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Input that nobody has read yet
    pub fn unread(&self) -> String {
        String::from_utf8_lossy(&self.input.iter().copied().collect::<Vec<u8>>()).into_owned()
    }

    pub fn replies_left(&self) -> usize {
        self.replies.len()
    }

    pub fn into_transport(self) -> LineTransport<MockPort> {
        LineTransport::new(self)
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let now = Instant::now();
        let (arrived, pending): (Vec<_>, Vec<_>) = self.late.drain(..).partition(|(at, _)| *at <= now);
        self.late = pending;
        for (_, block) in arrived {
            self.input.extend(block);
        }
        if self.input.is_empty() {
            if self.closed {
                return Ok(0);
            }
            return Err(io::Error::new(ErrorKind::TimedOut, "no data"));
        }
        let mut n = 0;
        while n < buf.len() {
            match self.input.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &b in buf {
            self.written.push(b);
            if b == b'\n' {
                match self.replies.pop_front() {
                    Some((reply, delay)) if delay > Duration::from_secs(0) => {
                        self.late.push((Instant::now() + delay, reply))
                    }
                    Some((reply, _)) => self.input.extend(reply),
                    None => {}
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialLink for MockPort {
    fn set_poll_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }
}
