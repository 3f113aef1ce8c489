//! Newline-delimited JSON framing.
//!
//! One JSON document per line, UTF-8, `\n` terminated. Both the manager's
//! proxy client and the worker loop speak this framing.

use std::io;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Serialize `message` and write it as a single line.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_string(message).map_err(io::Error::other)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

/// Read one line and parse it as `T`.
///
/// Returns `Ok(None)` on a clean EOF (peer closed the connection). A line
/// that is not valid JSON for `T` surfaces as an [`io::ErrorKind::InvalidData`]
/// error.
pub async fn read_message<R, T>(reader: &mut R) -> io::Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    serde_json::from_str(line.trim())
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;
    use serde_json::json;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn writes_one_line_per_message() {
        let mut buffer = Vec::new();
        write_message(&mut buffer, &Envelope::ok(json!(1))).await.unwrap();
        write_message(&mut buffer, &Envelope::err("bad")).await.unwrap();

        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.ends_with('\n'));
    }

    #[tokio::test]
    async fn reads_back_what_was_written() {
        let mut buffer = Vec::new();
        write_message(&mut buffer, &Envelope::ok(json!({"status": "ready"})))
            .await
            .unwrap();

        let mut reader = BufReader::new(buffer.as_slice());
        let envelope: Envelope = read_message(&mut reader).await.unwrap().unwrap();
        assert!(envelope.success);

        // EOF after the single message.
        let next: Option<Envelope> = read_message(&mut reader).await.unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn garbage_is_invalid_data() {
        let mut reader = BufReader::new(&b"not json at all\n"[..]);
        let err = read_message::<_, Envelope>(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
