use std::io::{self, IoSlice, Write};

/// Most segments a response is built from: header, pre-body text, body, trailer.
pub const MAX_SEGMENTS: usize = 4;

/// One piece of a response.
#[derive(Debug)]
pub enum Segment {
    /// Text generated for this connection (HTTP header, counters block).
    Owned(Vec<u8>),
    /// Fixed text such as the document terminator.
    Static(&'static [u8]),
    /// The mapped file body; its bytes are supplied at write time.
    Body(usize),
}

impl Segment {
    fn len(&self) -> usize {
        match self {
            Segment::Owned(v) => v.len(),
            Segment::Static(s) => s.len(),
            Segment::Body(len) => *len,
        }
    }
}

#[derive(Debug)]
struct Pending {
    segment: Segment,
    flushed: usize,
}

/// Segments waiting to be written with one scatter write per attempt.
///
/// Partial writes leave fully flushed segments empty and advance the first
/// unfinished one, so the next attempt resumes exactly where this one stopped.
#[derive(Debug, Default)]
pub struct ScatterList {
    pending: Vec<Pending>,
    written: usize,
}

impl ScatterList {
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(MAX_SEGMENTS),
            written: 0,
        }
    }

    pub fn push(&mut self, segment: Segment) {
        debug_assert!(self.pending.len() < MAX_SEGMENTS, "too many response segments");
        self.pending.push(Pending { segment, flushed: 0 });
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.written = 0;
    }

    /// Total response length.
    pub fn total_len(&self) -> usize {
        self.pending.iter().map(|p| p.segment.len()).sum()
    }

    pub fn remaining(&self) -> usize {
        self.pending.iter().map(|p| p.segment.len() - p.flushed).sum()
    }

    /// Bytes already handed to the socket.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn is_done(&self) -> bool {
        self.remaining() == 0
    }

    /// The unwritten parts of every segment, skipping flushed ones.
    pub fn io_slices<'a>(&'a self, body: &'a [u8]) -> Vec<IoSlice<'a>> {
        self.pending
            .iter()
            .filter_map(|p| {
                let bytes: &[u8] = match &p.segment {
                    Segment::Owned(v) => v,
                    Segment::Static(s) => s,
                    Segment::Body(len) => &body[..(*len).min(body.len())],
                };
                let rest = bytes.get(p.flushed..).unwrap_or(&[]);
                (!rest.is_empty()).then(|| IoSlice::new(rest))
            })
            .collect()
    }

    /// Accounts for `n` bytes accepted by the socket.
    pub fn advance(&mut self, mut n: usize) {
        self.written += n;
        for p in &mut self.pending {
            let left = p.segment.len() - p.flushed;
            if n >= left {
                n -= left;
                p.flushed = p.segment.len();
            } else {
                p.flushed += n;
                return;
            }
        }
    }

    /// One scatter write attempt.
    pub fn write_to<W: Write>(&mut self, out: &mut W, body: &[u8]) -> io::Result<usize> {
        let n = {
            let slices = self.io_slices(body);
            if slices.is_empty() {
                return Ok(0);
            }
            out.write_vectored(&slices)?
        };
        self.advance(n);
        Ok(n)
    }
}
