use anyhow::Context;
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::info;

use crate::threat_pipeline::{ResponseGenerator, ResponseMode};

const MODEL_NAME: &str = "gpt-4-0125-preview";

const CALM_SYSTEM_PROMPT: &str = "You are Aura, a personal safety companion. \
The user checked in and nothing indicates danger. \
Respond in a calm, warm and reassuring voice. \
Remind them you are listening and how to reach you. \
Give short answers, two sentences at most.";

const ASSERTIVE_SYSTEM_PROMPT: &str = "You are Aura, a personal safety companion. \
The user may be in danger right now. \
Respond in a loud, assertive voice meant to be overheard by a bystander or attacker. \
State clearly that emergency contacts have been alerted and that this location is being shared. \
Give short, commanding answers. Do not ask questions.";

pub struct OpenAiResponder {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl OpenAiResponder {
    pub fn new(openai_api_key: &str) -> Self {
        let config = OpenAIConfig::new().with_api_key(openai_api_key);
        let client = Client::with_config(config);
        Self {
            client,
            model_name: MODEL_NAME.to_string(),
        }
    }

    fn system_prompt(mode: ResponseMode) -> &'static str {
        match mode {
            ResponseMode::Calm => CALM_SYSTEM_PROMPT,
            ResponseMode::Assertive => ASSERTIVE_SYSTEM_PROMPT,
        }
    }
}

#[async_trait]
impl ResponseGenerator for OpenAiResponder {
    async fn respond(&self, transcript: &str, mode: ResponseMode) -> anyhow::Result<String> {
        info!("Requesting {:?} response", mode);

        let system_message: ChatCompletionRequestMessage =
            ChatCompletionRequestSystemMessageArgs::default()
                .content(Self::system_prompt(mode))
                .build()?
                .into();
        let user_message: ChatCompletionRequestMessage =
            ChatCompletionRequestUserMessageArgs::default()
                .content(transcript)
                .build()?
                .into();

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model_name.clone())
            .messages([system_message, user_message])
            .build()?;

        let response_message = self
            .client
            .chat()
            .create(request)
            .await?
            .choices
            .get(0)
            .context("Failed to get first choice on OpenAI api response")?
            .message
            .clone();

        response_message
            .content
            .context("OpenAI response had no content")
    }
}
