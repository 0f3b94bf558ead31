// Line-oriented message source
// One inbound message per non-empty line of an async reader
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::debug;

use batchwork_core::domain::InboundMessage;
use batchwork_core::port::{MessageSource, SourceError};

/// Reads messages line by line; the line number is the offset
pub struct LineSource<R> {
    lines: Lines<R>,
    topic: String,
    next_offset: i64,
    committed: Option<i64>,
}

impl<R> LineSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R, topic: impl Into<String>) -> Self {
        Self {
            lines: reader.lines(),
            topic: topic.into(),
            next_offset: 0,
            committed: None,
        }
    }

    /// Highest acknowledged offset
    pub fn committed_offset(&self) -> Option<i64> {
        self.committed
    }
}

impl LineSource<BufReader<Stdin>> {
    /// Source over the process's standard input
    pub fn stdin(topic: impl Into<String>) -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), topic)
    }
}

#[async_trait]
impl<R> MessageSource for LineSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next(&mut self) -> Result<Option<InboundMessage>, SourceError> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Ok(None);
            };
            let offset = self.next_offset;
            self.next_offset += 1;
            if line.trim().is_empty() {
                debug!(offset, "Skipping blank line");
                continue;
            }
            return Ok(Some(InboundMessage::new(self.topic.clone(), offset, line)));
        }
    }

    async fn commit(&mut self, message: &InboundMessage) -> Result<(), SourceError> {
        if let Some(committed) = self.committed {
            if message.offset <= committed {
                return Err(SourceError::Commit {
                    offset: message.offset,
                    reason: format!("already committed up to {}", committed),
                });
            }
        }
        self.committed = Some(message.offset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_lines_with_offsets() {
        let input: &[u8] = b"first\n\nsecond\nthird";
        let mut source = LineSource::new(input, "lines");

        let mut got = Vec::new();
        while let Some(msg) = source.next().await.unwrap() {
            got.push((msg.offset, String::from_utf8(msg.value.to_vec()).unwrap()));
            assert_eq!(msg.topic, "lines");
        }

        assert_eq!(
            got,
            vec![
                (0, "first".to_string()),
                (2, "second".to_string()),
                (3, "third".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_commit_must_move_forward() {
        let input: &[u8] = b"a\nb\n";
        let mut source = LineSource::new(input, "t");
        let a = source.next().await.unwrap().unwrap();
        let b = source.next().await.unwrap().unwrap();

        source.commit(&b).await.unwrap();
        assert_eq!(source.committed_offset(), Some(1));

        let err = source.commit(&a).await.unwrap_err();
        assert!(matches!(err, SourceError::Commit { offset: 0, .. }));
    }
}
