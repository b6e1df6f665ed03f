use std::sync::Arc;

use gateway_core::http::{HttpChatModel, HttpClientConfig};
use gateway_core::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), GatewayError> {
    gateway_core::init_observability();

    let model = HttpChatModel::new(HttpClientConfig::openai_from_env()?)?;
    let gateway = Gateway::builder()
        .register_model(model.provider(), Arc::new(model))
        .build()?;

    let mut turn = gateway
        .turn(ModelRef::new("openai", "gpt-4o-mini"))
        .system_prompt("Reply to test gateway streaming.")
        .user_text("Stream a greeting.")
        .start_stream()
        .await?;

    while let Some(item) = turn.next_item().await {
        match item {
            OutputItem::Segment(SegmentUpdate {
                payload: SegmentPayload::Text(text),
                ..
            }) => print!("{text}"),
            OutputItem::Summary(summary) => {
                println!("\n[{}] {} tokens", summary.finish_reason, summary.usage.total_tokens)
            }
            _ => {}
        }
    }

    let _ = turn.finish().await?;
    Ok(())
}
