/// Splits document text into overlapping chunks, breaking on whitespace
/// where possible
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

impl TextSplitter {
    /// Sizes are in characters; overlap is clamped below the chunk size
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let mut end = (start + self.chunk_size).min(chars.len());
            if end < chars.len() {
                if let Some(cut) = self.break_point(&chars[start..end]) {
                    end = start + cut;
                }
            }

            let chunk: String = chars[start..end].iter().collect();
            let chunk = chunk.trim();
            if !chunk.is_empty() {
                chunks.push(chunk.to_string());
            }

            if end >= chars.len() {
                break;
            }

            let next = end.saturating_sub(self.chunk_overlap);
            start = if next > start { next } else { end };
        }

        chunks
    }

    /// Last line break, else last space, past the overlap region
    fn break_point(&self, window: &[char]) -> Option<usize> {
        let min = self.chunk_overlap + 1;

        ['\n', ' '].iter().find_map(|separator| {
            window
                .iter()
                .rposition(|ch| ch == separator)
                .filter(|&position| position >= min)
                .map(|position| position + 1)
        })
    }
}
