use futures::{Stream, StreamExt, stream};
use snafu::ResultExt;

use super::provider::{LineStream, ReadStreamSnafu};

/// Splits a byte stream on `\n`.
///
/// Bytes are buffered until a full line is present, so chunk boundaries may fall anywhere,
/// including inside a multi-byte character. A trailing `\r` is dropped.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    finished: bool,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Marks end of input; the unterminated remainder becomes the last line.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn next_line(&mut self) -> Option<String> {
        let line = match self.buffer.iter().position(|byte| *byte == b'\n') {
            Some(end) => {
                let mut line = self.buffer.drain(..=end).collect::<Vec<_>>();
                line.pop();
                line
            }
            None if self.finished && !self.buffer.is_empty() => std::mem::take(&mut self.buffer),
            None => return None,
        };

        let line = line.strip_suffix(b"\r").unwrap_or(line.as_slice());
        Some(String::from_utf8_lossy(line).into_owned())
    }
}

/// Adapts a response body into a [`LineStream`]. A transport error ends the stream after
/// being yielded once.
pub fn lines_from_bytes<S, B>(bytes: S) -> LineStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send,
{
    let state = (Box::pin(bytes), LineDecoder::new(), false);

    Box::pin(stream::unfold(
        state,
        |(mut bytes, mut decoder, mut failed)| async move {
            if failed {
                return None;
            }

            loop {
                if let Some(line) = decoder.next_line() {
                    return Some((Ok(line), (bytes, decoder, failed)));
                }

                if decoder.finished {
                    return None;
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => decoder.push(chunk.as_ref()),
                    Some(Err(source)) => {
                        failed = true;
                        let error = Err::<String, _>(source).context(ReadStreamSnafu {
                            stage: "read-response-line",
                        });
                        return Some((error, (bytes, decoder, failed)));
                    }
                    None => decoder.finish(),
                }
            }
        },
    ))
}
