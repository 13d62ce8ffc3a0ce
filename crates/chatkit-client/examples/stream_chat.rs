use chatkit_client::prelude::*;
use serde_json::json;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), RequestError> {
    let base = std::env::var("CHATKIT_API_BASE")
        .unwrap_or_else(|_| "http://localhost:5001/console/api".to_string());
    let client = ApiClient::new(ClientConfig::new(base.clone(), base))?;

    let mut stream = client.stream(ChatRequest::new(
        "/chat-messages",
        json!({"query": "Stream a short greeting.", "response_mode": "streaming"}),
    ));

    while let Some(event) = stream.next_event().await {
        match event {
            ChatEvent::Delta { text, .. } => print!("{text}"),
            ChatEvent::Thought(thought) => eprintln!("thought: {thought}"),
            ChatEvent::MessageEnd(_) => {}
            ChatEvent::Completed => println!(),
            ChatEvent::Failed(failure) => eprintln!("stream failed: {failure}"),
        }
    }

    let answer = stream.finish().await.unwrap_or_default();
    eprintln!("full answer: {answer}");
    Ok(())
}
