//! Serializing channel variant: length-prefixed serde_json frames over any byte transport.
//!
//! The writer half can live in another process (inherited pipe, socket). The reader half
//! pumps frames on a background thread into a local [`MemoryQueue`], which gives it the same
//! receive semantics as the in-memory variant.

use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use super::memory::MemoryQueue;
use super::queue::{QueueError, QueueReader, QueueWriter, Received};
use crate::utils::config::QueueConsts;

/// One unit on the wire.
#[derive(Debug, Serialize, Deserialize)]
pub enum Frame<T> {
    Item(T),
    EndOfStream,
    Abort,
}

/// Write one frame: u32 little-endian body length, then the JSON body.
pub fn write_frame<T: Serialize, W: Write>(out: &mut W, frame: &Frame<T>) -> Result<(), QueueError> {
    let body = serde_json::to_vec(frame)?;
    let len = u32::try_from(body.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    out.write_all(&len.to_le_bytes())?;
    out.write_all(&body)?;
    out.flush()?;
    Ok(())
}

/// Read one frame. `Ok(None)` on a clean EOF at a frame boundary.
pub fn read_frame<T: DeserializeOwned, R: Read>(input: &mut R) -> Result<Option<Frame<T>>, QueueError> {
    let mut len_buf = [0u8; 4];
    match input.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > QueueConsts::MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit"),
        )
        .into());
    }
    let mut body = vec![0u8; len];
    input.read_exact(&mut body)?;
    Ok(Some(serde_json::from_slice(&body)?))
}

/// Send half. Dropping the inner writer (on end-of-stream or abort) gives the reader EOF.
pub struct FrameWriter<W: Write> {
    out: Mutex<Option<W>>,
    closed: AtomicBool,
    aborted: AtomicBool,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(Some(out)),
            closed: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
        }
    }

    fn finish_with<T: Serialize>(&self, frame: Frame<T>) {
        let mut guard = self.out.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(mut out) = guard.take()
            && let Err(e) = write_frame(&mut out, &frame)
        {
            debug!("could not deliver final frame: {}", e);
        }
    }
}

impl<T, W> QueueWriter<T> for FrameWriter<W>
where
    T: Serialize + Send,
    W: Write + Send,
{
    fn send(&self, item: T) -> Result<(), QueueError> {
        if self.closed.load(Ordering::Acquire) || self.aborted.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }
        let mut guard = self.out.lock().unwrap_or_else(|p| p.into_inner());
        match guard.as_mut() {
            Some(out) => write_frame(out, &Frame::Item(item)),
            None => Err(QueueError::Closed),
        }
    }

    fn signal_end_of_stream(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) && !self.aborted.load(Ordering::Acquire) {
            self.finish_with::<T>(Frame::EndOfStream);
        }
    }

    fn signal_abort(&self) {
        if !self.aborted.swap(true, Ordering::AcqRel) {
            self.finish_with::<T>(Frame::Abort);
        }
    }
}

/// Receive half backed by a pump thread.
pub struct FrameReader<T> {
    local: Arc<MemoryQueue<T>>,
}

impl<T> FrameReader<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Start pumping frames from `input` into a local queue of `capacity`.
    pub fn spawn<R>(input: R, capacity: Option<usize>) -> Result<Self, QueueError>
    where
        R: Read + Send + 'static,
    {
        let local = Arc::new(MemoryQueue::new(capacity));
        let pump_local = Arc::clone(&local);
        thread::Builder::new()
            .name("frame-pump".to_string())
            .spawn(move || pump_frames(input, &pump_local))?;
        Ok(Self { local })
    }
}

/// Move frames into `local` until the stream ends. After a local abort keep reading and
/// discarding so a writer blocked on a full transport is released.
fn pump_frames<T, R>(mut input: R, local: &MemoryQueue<T>)
where
    T: DeserializeOwned + Send,
    R: Read,
{
    let mut discarding = false;
    loop {
        match read_frame::<T, _>(&mut input) {
            Ok(Some(Frame::Item(item))) => {
                if !discarding && local.send(item).is_err() {
                    discarding = true;
                }
            }
            Ok(Some(Frame::EndOfStream)) => {
                local.signal_end_of_stream();
                break;
            }
            Ok(Some(Frame::Abort)) => {
                QueueWriter::signal_abort(local);
                discarding = true;
            }
            Ok(None) => {
                if !local.is_closed() {
                    warn!("channel peer went away without end-of-stream; aborting receivers");
                    QueueWriter::signal_abort(local);
                }
                break;
            }
            Err(e) => {
                error!("corrupt channel frame: {}", e);
                QueueWriter::signal_abort(local);
                let _ = io::copy(&mut input, &mut io::sink());
                break;
            }
        }
    }
}

impl<T: Send> QueueReader<T> for FrameReader<T> {
    fn receive(&self) -> Received<T> {
        self.local.receive()
    }

    fn try_receive(&self) -> Option<Received<T>> {
        self.local.try_receive()
    }

    fn signal_abort(&self) {
        QueueReader::signal_abort(&*self.local);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PathSpec;

    #[test]
    fn test_frame_round_trip_in_buffer() {
        let spec = PathSpec::nested("GZIP", Some("/x".into()), PathSpec::os("/x.gz"));
        let mut buf = Vec::new();
        write_frame(&mut buf, &Frame::Item(spec.clone())).unwrap();
        write_frame::<PathSpec, _>(&mut buf, &Frame::EndOfStream).unwrap();
        let mut cursor = io::Cursor::new(buf);
        match read_frame::<PathSpec, _>(&mut cursor).unwrap() {
            Some(Frame::Item(got)) => assert_eq!(got, spec),
            other => panic!("unexpected frame {:?}", other),
        }
        assert!(matches!(
            read_frame::<PathSpec, _>(&mut cursor).unwrap(),
            Some(Frame::EndOfStream)
        ));
        assert!(read_frame::<PathSpec, _>(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_peer_gone_without_end_of_stream_aborts_receiver() {
        let reader = FrameReader::<u32>::spawn(io::Cursor::new(Vec::new()), None).unwrap();
        assert_eq!(reader.receive(), Received::Aborted);
    }

    #[test]
    fn test_end_of_stream_frame_drains_cleanly() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Frame::Item(7u32)).unwrap();
        write_frame::<u32, _>(&mut buf, &Frame::EndOfStream).unwrap();
        let reader = FrameReader::<u32>::spawn(io::Cursor::new(buf), None).unwrap();
        assert_eq!(reader.receive(), Received::Item(7));
        assert_eq!(reader.receive(), Received::EndOfStream);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&u32::MAX.to_le_bytes());
        let err = read_frame::<u32, _>(&mut io::Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, QueueError::Transport(_)));
    }
}
