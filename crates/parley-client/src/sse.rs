//! Decoding of server-sent stream parts.

use futures_util::stream::{self, BoxStream, Stream, StreamExt};

use parley_core::StreamPart;

use crate::error::ClientError;

/// Stream of decoded parts.
pub type PartStream = BoxStream<'static, Result<StreamPart, ClientError>>;

/// Terminal data payload.
pub const DONE: &str = "[DONE]";

/// One complete event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    Data(String),
    Done,
}

/// Incremental SSE decoder. Chunks may split events (and UTF-8 sequences) anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete data event. Comments and keep-alives are skipped.
    pub fn next_frame(&mut self) -> Option<SseFrame> {
        loop {
            let end = self.buffer.windows(2).position(|w| w == b"\n\n")?;
            let raw: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let text = String::from_utf8_lossy(&raw[..end]);

            let data = text
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|value| value.strip_prefix(' ').unwrap_or(value))
                .collect::<Vec<_>>()
                .join("\n");

            if data.is_empty() {
                continue;
            }
            if data == DONE {
                return Some(SseFrame::Done);
            }
            return Some(SseFrame::Data(data));
        }
    }
}

/// Decode a streaming response body into parts. Ends at `[DONE]`; a body that
/// ends before it yields [`ClientError::Interrupted`].
pub fn part_stream(response: reqwest::Response) -> PartStream {
    decode_parts(response.bytes_stream())
}

fn decode_parts<S, B>(bytes: S) -> PartStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    stream::unfold(
        (bytes.boxed(), SseDecoder::default(), false),
        |(mut bytes, mut decoder, done)| async move {
            if done {
                return None;
            }
            loop {
                match decoder.next_frame() {
                    Some(SseFrame::Done) => return None,
                    Some(SseFrame::Data(data)) => {
                        let part = serde_json::from_str::<StreamPart>(&data)
                            .map_err(|e| ClientError::Serialization(e.to_string()));
                        return Some((part, (bytes, decoder, false)));
                    }
                    None => {}
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => decoder.push(chunk.as_ref()),
                    Some(Err(e)) => return Some((Err(ClientError::Http(e)), (bytes, decoder, true))),
                    None => return Some((Err(ClientError::Interrupted), (bytes, decoder, true))),
                }
            }
        },
    )
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_handles_split_events_and_keepalives() {
        let mut decoder = SseDecoder::default();
        decoder.push(b": keep-alive\n\ndata: {\"type\":\"text-st");
        assert_eq!(decoder.next_frame(), None);

        decoder.push(b"art\",\"id\":\"t\"}\n\ndata: [DONE]\n\n");
        let Some(SseFrame::Data(data)) = decoder.next_frame() else {
            panic!("expected data frame");
        };
        let part: StreamPart = serde_json::from_str(&data).unwrap();
        assert_eq!(part, StreamPart::TextStart { id: "t".to_string() });
        assert_eq!(decoder.next_frame(), Some(SseFrame::Done));
        assert_eq!(decoder.next_frame(), None);
    }

    #[test]
    fn test_decoder_survives_split_utf8() {
        let event = "data: {\"type\":\"data-title\",\"data\":\"caf\u{e9}\"}\n\n".as_bytes();
        let split = event.iter().position(|b| *b == 0xc3).unwrap() + 1;

        let mut decoder = SseDecoder::default();
        decoder.push(&event[..split]);
        assert_eq!(decoder.next_frame(), None);
        decoder.push(&event[split..]);

        let Some(SseFrame::Data(data)) = decoder.next_frame() else {
            panic!("expected data frame");
        };
        assert!(data.contains("caf\u{e9}"));
    }

    #[test]
    fn test_multiline_data_is_joined() {
        let mut decoder = SseDecoder::default();
        decoder.push(b"data: a\ndata: b\n\n");
        assert_eq!(decoder.next_frame(), Some(SseFrame::Data("a\nb".to_string())));
    }

    fn body(chunks: &[&'static str]) -> Vec<Result<Vec<u8>, reqwest::Error>> {
        chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect()
    }

    #[tokio::test]
    async fn test_complete_body_ends_cleanly() {
        let mut parts = decode_parts(stream::iter(body(&[
            "data: {\"type\":\"text-start\",\"id\":\"t\"}\n\n",
            "data: [DONE]\n\n",
        ])));
        assert!(matches!(parts.next().await, Some(Ok(StreamPart::TextStart { .. }))));
        assert!(parts.next().await.is_none());
    }

    #[tokio::test]
    async fn test_body_cut_before_done_is_interrupted() {
        let mut parts = decode_parts(stream::iter(body(&[
            "data: {\"type\":\"text-start\",\"id\":\"t\"}\n\n",
            ": lagged by 3 parts\n\n",
        ])));
        assert!(matches!(parts.next().await, Some(Ok(StreamPart::TextStart { .. }))));
        assert!(matches!(parts.next().await, Some(Err(ClientError::Interrupted))));
        assert!(parts.next().await.is_none());
    }
}
