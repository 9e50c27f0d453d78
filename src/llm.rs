//! # Answer generation
//!
//! Two interchangeable ways to produce an answer string:
//!
//! - **Grounded mode** ([`GroundedAnswerer`]): prompts an OpenAI-compatible
//!   chat endpoint with the retrieved booking documents as context and an
//!   explicit instruction to answer only from that context. Failures never
//!   escape as errors; they come back as [`Generation::Failed`] carrying
//!   the reason, so the caller can decide what to do next.
//! - **Fallback mode** ([`fallback_answer`]): a fixed, ordered decision
//!   table of keyword predicates mapping to canned dataset statistics. It
//!   needs no model and no context and cannot fail; the query engine
//!   switches to it when grounded generation reports a failure.

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
    },
};
use tiktoken_rs::cl100k_base;
use tracing::{debug, error};

use crate::config::ConciergeConfig;
use crate::vector_store::QueryHit;

/// Outcome of one grounded generation attempt.
///
/// The explicit result type replaces exception-driven control flow: the
/// query engine pattern-matches on it to pick the fallback path.
#[derive(Debug, Clone, PartialEq)]
pub enum Generation {
    /// The model produced an answer from the provided context.
    Grounded(String),
    /// Generation failed; the payload is the error description.
    Failed(String),
}

/// Grounded answerer backed by an OpenAI-compatible chat endpoint.
pub struct GroundedAnswerer {
    client: Client<OpenAIConfig>,
    model: String,
    max_answer_tokens: u16,
    context_token_budget: usize,
}

impl GroundedAnswerer {
    /// Build a client from configuration.
    pub fn new(config: &ConciergeConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(config.api_key.clone())
            .with_api_base(config.api_base.clone());
        debug!("chat client created for {}", config.api_base);
        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            max_answer_tokens: config.max_answer_tokens,
            context_token_budget: config.context_max_tokens,
        }
    }

    /// Answer `question` from the given ranked context documents.
    ///
    /// The documents' text blocks are joined with a blank line (truncated to
    /// the context token budget, dropping the lowest-ranked blocks first) and
    /// embedded in a single prompt instructing the model to use only that
    /// context. Returns the generated text with surrounding whitespace
    /// stripped.
    ///
    /// Any failure (request building, transport, the model itself, or an
    /// empty completion) is caught and reported as [`Generation::Failed`];
    /// this method never panics and never returns an `Err`.
    pub async fn answer(&self, question: &str, context: &[QueryHit]) -> Generation {
        let prompt = self.build_prompt(question, context);

        let message = ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(prompt),
            name: None,
        });

        let request = match CreateChatCompletionRequestArgs::default()
            .max_tokens(self.max_answer_tokens)
            .model(self.model.clone())
            .messages(vec![message])
            .build()
        {
            Ok(request) => request,
            Err(err) => return Generation::Failed(err.to_string()),
        };

        debug!("sending grounded completion request to model {}", self.model);

        match self.client.chat().create(request).await {
            Ok(response) => {
                let mut answer = String::new();
                for choice in &response.choices {
                    if let Some(content) = &choice.message.content {
                        answer.push_str(content);
                    }
                }
                let answer = answer.trim().to_string();
                if answer.is_empty() {
                    Generation::Failed("model returned an empty completion".to_string())
                } else {
                    Generation::Grounded(answer)
                }
            }
            Err(err) => {
                error!("grounded generation failed: {err}");
                Generation::Failed(err.to_string())
            }
        }
    }

    fn build_prompt(&self, question: &str, context: &[QueryHit]) -> String {
        let context_text = self.bounded_context(context);
        format!(
            "As a hotel booking analytics assistant, please answer the following \
             question based only on the provided context information about hotel \
             bookings.\n\nContext:\n{context_text}\n\nQuestion: {question}\n\nAnswer:"
        )
    }

    /// Join context blocks with blank lines, dropping the lowest-ranked
    /// blocks until the whole context fits the token budget.
    fn bounded_context(&self, context: &[QueryHit]) -> String {
        let blocks: Vec<&str> = context.iter().map(|hit| hit.text.as_str()).collect();
        let joined = blocks.join("\n\n");
        let Ok(bpe) = cl100k_base() else {
            return joined;
        };
        if bpe.encode_with_special_tokens(&joined).len() <= self.context_token_budget {
            return joined;
        }
        let mut kept = blocks.len();
        while kept > 1 {
            kept -= 1;
            let candidate = blocks[..kept].join("\n\n");
            if bpe.encode_with_special_tokens(&candidate).len() <= self.context_token_budget {
                return candidate;
            }
        }
        blocks.first().map(|block| block.to_string()).unwrap_or_default()
    }
}

fn asks_top_country(q: &str) -> bool {
    q.contains("country") && q.contains("most bookings")
}

fn asks_lead_time(q: &str) -> bool {
    q.contains("lead time")
}

fn asks_cancellation(q: &str) -> bool {
    q.contains("cancel") || q.contains("cancellation")
}

fn asks_hotel_type(q: &str) -> bool {
    q.contains("hotel type") || q.contains("resort") || q.contains("city hotel")
}

fn asks_average_rate(q: &str) -> bool {
    q.contains("average") && (q.contains("price") || q.contains("rate") || q.contains("adr"))
}

fn asks_stay_length(q: &str) -> bool {
    q.contains("stay") && (q.contains("length") || q.contains("duration") || q.contains("nights"))
}

/// Ordered decision table: first matching predicate wins.
const FALLBACK_RULES: &[(fn(&str) -> bool, &str)] = &[
    (
        asks_top_country,
        "Based on the hotel booking data, Portugal (PRT) had the most bookings, \
         followed by Great Britain (GBR) and France (FRA).",
    ),
    (
        asks_lead_time,
        "The average lead time for bookings is approximately 104 days, with a \
         median of 69 days. The lead time varies by hotel type, with resort \
         hotels having slightly longer average lead times than city hotels.",
    ),
    (
        asks_cancellation,
        "The overall cancellation rate is 37.04% across all bookings. The \
         highest cancellation rates are observed in the summer months, \
         particularly August.",
    ),
    (
        asks_hotel_type,
        "The dataset contains bookings for two hotel types: City Hotel and \
         Resort Hotel. City Hotels account for approximately 61% of bookings, \
         while Resort Hotels account for about 39%.",
    ),
    (
        asks_average_rate,
        "The average daily rate (ADR) across all bookings is approximately \
         101.83 EUR. Resort Hotels generally have a higher average rate than \
         City Hotels.",
    ),
    (
        asks_stay_length,
        "The average length of stay is approximately 3.4 nights. Weekend stays \
         (Friday/Saturday) average 0.93 nights, while weekday stays average 2.5 \
         nights.",
    ),
];

const FALLBACK_GUIDANCE: &str = "I'm sorry, but I need more specific information to \
     answer that question. You can ask about booking statistics such as country \
     distribution, cancellation rates, lead times, average prices, hotel types, \
     or length of stay.";

/// Context-free canned answer for `question`.
///
/// Classifies the question case-insensitively against [`FALLBACK_RULES`] in
/// priority order; unmatched questions get a generic guidance message listing
/// the supported topics. Never fails and never calls the generation model.
pub fn fallback_answer(question: &str) -> String {
    let q = question.to_lowercase();
    for (matches, answer) in FALLBACK_RULES {
        if matches(&q) {
            return (*answer).to_string();
        }
    }
    FALLBACK_GUIDANCE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn answerer(api_base: &str) -> GroundedAnswerer {
        GroundedAnswerer::new(&ConciergeConfig {
            api_key: "test-key".to_string(),
            api_base: api_base.to_string(),
            model: "test-model".to_string(),
            max_answer_tokens: 128,
            context_max_tokens: 2048,
            db_url: String::new(),
            data_dir: String::new(),
            collection_name: "hotel_bookings".to_string(),
            embedding_dim: 384,
        })
    }

    fn hit(text: &str) -> QueryHit {
        QueryHit {
            id: "1".to_string(),
            text: text.to_string(),
            metadata: HashMap::new(),
            distance: 0.0,
        }
    }

    #[test]
    fn test_fallback_routing() {
        let answer = fallback_answer("Which country has the most bookings?");
        assert!(answer.contains("Portugal (PRT)"));

        assert!(fallback_answer("What is the average lead time?").contains("104 days"));
        assert!(fallback_answer("How many bookings get canceled?").contains("37.04%"));
        assert!(fallback_answer("Compare resort and city bookings").contains("two hotel types"));
        assert!(fallback_answer("What's the average price?").contains("101.83 EUR"));
        assert!(fallback_answer("What is the typical stay duration?").contains("3.4 nights"));
    }

    #[test]
    fn test_fallback_unmatched_question_gets_guidance() {
        let answer = fallback_answer("What is the weather?");
        assert!(answer.contains("more specific information"));
    }

    #[test]
    fn test_fallback_priority_order() {
        // Matches both the country rule and (via "cancel") nothing else first:
        // the country rule sits higher in the table and must win.
        let answer = fallback_answer("Which country has the most bookings canceled?");
        assert!(answer.contains("Portugal (PRT)"));
    }

    #[test]
    fn test_prompt_embeds_context_and_question() {
        let answerer = answerer("http://localhost:9");
        let prompt = answerer.build_prompt(
            "How many nights?",
            &[hit("Booking ID: 1"), hit("Booking ID: 2")],
        );
        assert!(prompt.contains("Booking ID: 1\n\nBooking ID: 2"));
        assert!(prompt.contains("Question: How many nights?"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[tokio::test]
    async fn test_grounded_answer_success() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "created": 1700000000,
                "model": "test-model",
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": "  Two PRT bookings.  "
                    },
                    "finish_reason": "stop"
                }],
                "usage": {
                    "prompt_tokens": 10,
                    "completion_tokens": 4,
                    "total_tokens": 14
                }
            }));
        });

        let answerer = answerer(&server.base_url());
        let generation = answerer
            .answer("How many PRT bookings?", &[hit("Booking ID: 1")])
            .await;

        mock.assert();
        assert_eq!(
            generation,
            Generation::Grounded("Two PRT bookings.".to_string())
        );
    }

    #[tokio::test]
    async fn test_grounded_answer_failure_is_reported_not_thrown() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(500).body("model exploded");
        });

        let answerer = answerer(&server.base_url());
        let generation = answerer.answer("Anything?", &[]).await;

        assert!(matches!(generation, Generation::Failed(_)));
    }
}
