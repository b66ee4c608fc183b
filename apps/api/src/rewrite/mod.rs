// Rewrite API: tone rewrites gated by the daily quota, plus usage and history reads.

pub mod handlers;
