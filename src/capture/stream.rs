use chrono::{DateTime, Local};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

use super::StreamOrigin;

/// A decoded line before sequence assignment
#[derive(Debug)]
pub struct RawLine {
    pub origin: StreamOrigin,
    pub text: String,
    pub at: DateTime<Local>,
}

/// Read one child stream to end-of-file, emitting decoded lines.
///
/// Bytes buffer until a newline or end-of-stream; a trailing chunk with no
/// terminator is emitted as one final line. Malformed UTF-8 is replaced
/// rather than treated as an error, so capture never aborts on raw bytes.
/// The task ends when the descriptor closes or the receiver is dropped.
pub async fn read_lines<R>(reader: R, origin: StreamOrigin, tx: mpsc::Sender<RawLine>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                let line = RawLine {
                    origin,
                    text: String::from_utf8_lossy(&buf).into_owned(),
                    at: Local::now(),
                };
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}
