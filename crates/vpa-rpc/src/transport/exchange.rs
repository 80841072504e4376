//! One request/response exchange over a byte stream.
//!
//! Shared by the TCP server and the inetd worker. Only the origin of the
//! reader and writer differs between them.

use std::io::{self, Read, Write};
use std::thread;

use vpa_core::limits::MAX_MESSAGE_SIZE;
use vpa_core::wire::{HEADER_SIZE, PREFIX_SIZE};
use vpa_core::{FuncCode, Header, Status};
use vpa_shm::{ProcessLock, SegmentMemory};

use crate::dispatch::{Dispatcher, RequestContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// A reply was written. `func` is `None` for frames that did not decode.
    Answered {
        func: Option<FuncCode>,
        status: Status,
    },
    /// The peer sent too little to answer.
    Dropped { received: usize },
}

/// Read one frame, dispatch it, and write the reply.
///
/// The remainder after the header is read up to the declared size. A
/// declared size outside `PREFIX_SIZE..=MAX_MESSAGE_SIZE` is not trusted:
/// only the prefix is read, and the reply is that prefix with an error
/// status. Failed-authentication replies are held back by the
/// dispatcher's penalty before being written.
pub fn serve_exchange<M, L, R, W>(
    dispatcher: &Dispatcher<M, L>,
    reader: &mut R,
    writer: &mut W,
    ctx: &RequestContext,
) -> io::Result<ExchangeOutcome>
where
    M: SegmentMemory,
    L: ProcessLock,
    R: Read,
    W: Write,
{
    let frame = read_frame(reader)?;

    let Some(reply) = dispatcher.handle_frame(&frame, ctx) else {
        tracing::debug!(received = frame.len(), peer = ?ctx.peer, "short frame dropped");
        return Ok(ExchangeOutcome::Dropped {
            received: frame.len(),
        });
    };

    if reply.penalize {
        thread::sleep(dispatcher.penalty_delay());
    }
    writer.write_all(&reply.bytes)?;
    writer.flush()?;

    Ok(ExchangeOutcome::Answered {
        func: reply.func,
        status: reply.status,
    })
}

/// Read the header and as much of the body as the header declares.
///
/// Stops early at end of stream; the short frame is returned as is.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut frame = vec![0u8; HEADER_SIZE];
    let got = read_full(reader, &mut frame)?;
    if got < HEADER_SIZE {
        frame.truncate(got);
        return Ok(frame);
    }

    let declared = Header::peek(&frame).map(|h| h.size as usize).unwrap_or(0);
    let want = if (PREFIX_SIZE..=MAX_MESSAGE_SIZE).contains(&declared) {
        declared
    } else {
        PREFIX_SIZE
    };
    frame.resize(want, 0);
    let got = HEADER_SIZE + read_full(reader, &mut frame[HEADER_SIZE..])?;
    frame.truncate(got);
    Ok(frame)
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut got = 0;
    while got < buf.len() {
        match reader.read(&mut buf[got..]) {
            Ok(0) => break,
            Ok(n) => got += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(got)
}
