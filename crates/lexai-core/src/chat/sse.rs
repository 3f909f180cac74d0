/// Accumulates raw response bytes and hands out complete SSE event blocks.
///
/// Bytes are kept undecoded until a block is complete so a multi-byte
/// character split across network chunks survives intact.
#[derive(Debug, Default)]
pub struct SseBuffer {
    buffer: Vec<u8>,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) {
        self.buffer
            .extend(chunk.iter().copied().filter(|byte| *byte != b'\r'));
    }

    pub fn next_event_block(&mut self) -> Option<String> {
        let boundary = self.buffer.windows(2).position(|pair| pair == b"\n\n")?;
        let remaining = self.buffer.split_off(boundary + 2);
        let block = std::mem::replace(&mut self.buffer, remaining);
        Some(String::from_utf8_lossy(&block).into_owned())
    }

    /// Whatever is left once the body ends without a closing blank line.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.iter().all(u8::is_ascii_whitespace) {
            self.buffer.clear();
            return None;
        }
        let block = std::mem::take(&mut self.buffer);
        Some(String::from_utf8_lossy(&block).into_owned())
    }
}

pub fn parse_data_lines(event_block: &str) -> Vec<&str> {
    event_block
        .lines()
        .filter_map(|line| {
            line.strip_prefix("data:")
                .map(|data| data.strip_prefix(' ').unwrap_or(data))
        })
        .filter(|data| !data.is_empty())
        .collect()
}
