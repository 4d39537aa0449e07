use anyhow::Result;
use brainwire_core::config::get_config;
use brainwire_core::correlator::MessageSink;
use brainwire_core::log::setup_logging;
use brainwire_core::message::Message;
use brainwire_core::step::ExecutionStep;
use brainwire_core::DispatchOptions;
use std::env;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Prints steps as they arrive and keeps the conversation in memory.
#[derive(Default)]
struct Transcript {
    messages: Mutex<Vec<Message>>,
}

impl Transcript {
    fn update(&self, id: &str, f: impl FnOnce(&mut Message)) {
        let mut messages = self.messages.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(message) = messages.iter_mut().find(|m| m.id == id) {
            f(message);
        }
    }
}

impl MessageSink for Transcript {
    fn append_step(&self, message_id: &str, step: ExecutionStep) {
        println!("  [{:?}] {}", step.step_type, step.content);
        self.update(message_id, |m| m.steps.push(step));
    }

    fn finish_streaming(&self, message_id: &str) {
        self.update(message_id, |m| m.is_streaming = false);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = env::args().skip(1);
    let model_id = args.next().unwrap_or_else(|| "gpt-4o".to_string());
    let prompt = args.collect::<Vec<_>>().join(" ");
    let prompt = if prompt.is_empty() { "2+2?".to_string() } else { prompt };

    setup_logging(None)?;
    let config = get_config(None)?;
    let transcript = Arc::new(Transcript::default());
    let engine = brainwire_providers::build_engine(&config, transcript.clone())?;

    let matrix = engine.initialize().await;
    println!("Configured providers: {:?}", matrix.configured_providers());

    let pending = Message::new_pending_assistant(&model_id, true);
    let id = pending.id.clone();
    {
        let mut messages = transcript.messages.lock().unwrap_or_else(|p| p.into_inner());
        messages.push(Message::user("user-1", &prompt));
        messages.push(pending);
    }
    engine.note_assistant_message(&id);

    println!("> {prompt}");
    let mut printed = 0;
    let options = DispatchOptions::for_message(&id).with_stream_callback(move |content, _| {
        print!("{}", &content[printed..]);
        let _ = std::io::stdout().flush();
        printed = content.len();
    });

    match engine.dispatch(&prompt, &model_id, options).await {
        Ok(response) => {
            println!("\n{}", response.content);
            transcript.update(&id, |m| m.apply_response(&response));
        }
        Err(err) => {
            eprintln!("{}", err.user_message());
            transcript.update(&id, |m| m.mark_failed(&err));
        }
    }

    engine.shutdown();
    Ok(())
}
