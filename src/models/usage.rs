use serde::{Deserialize, Serialize};

/// Token counts reported by an extractor that bills per token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One append-only row of the `usage` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub url: String,
    pub length_in: usize,
    pub length_out: usize,
    pub tokens_in: u64,
    pub tokens_out: u64,
}
