use async_trait::async_trait;

use crate::llm_client::prompts::{rewrite_system, ROAST_SYSTEM};
use crate::llm_client::tone::Tone;
use crate::llm_client::{LlmClient, LlmError};

/// Produces rewritten and roasted email text.
///
/// Carried in `AppState` as `Arc<dyn EmailRewriter>` so handlers can be exercised
/// without a network.
#[async_trait]
pub trait EmailRewriter: Send + Sync {
    async fn rewrite(&self, text: &str, tone: Tone) -> Result<String, LlmError>;

    async fn roast(&self, text: &str) -> Result<String, LlmError>;
}

#[async_trait]
impl EmailRewriter for LlmClient {
    async fn rewrite(&self, text: &str, tone: Tone) -> Result<String, LlmError> {
        self.complete(&rewrite_system(tone), text).await
    }

    async fn roast(&self, text: &str) -> Result<String, LlmError> {
        self.complete(ROAST_SYSTEM, text).await
    }
}
