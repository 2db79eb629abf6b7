use anyhow::Result;
use async_trait::async_trait;

/// Raw completion seam. Every model call in the system, classification
/// included, goes through this single method; the capability layer on top
/// owns prompts and parsing.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    use super::LlmClient;

    /// Plays back a fixed script of completions, one entry per call, and
    /// records every prompt it was given. Erroring once the script runs out
    /// keeps tests honest about how many model calls a path makes.
    pub struct ScriptedClient {
        script: Mutex<Vec<Result<String, String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        pub fn new(script: Vec<Result<String, String>>) -> Self {
            Self {
                script: Mutex::new(script),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn replies(replies: &[&str]) -> Self {
            Self::new(replies.iter().map(|reply| Ok(reply.to_string())).collect())
        }

        pub fn failing(message: &str) -> Self {
            Self::new(vec![Err(message.to_string())])
        }

        pub fn seen_prompts(&self) -> Vec<String> {
            self.prompts.lock().expect("prompt lock").clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts
                .lock()
                .expect("prompt lock")
                .push(prompt.to_string());
            let mut script = self.script.lock().expect("script lock");
            if script.is_empty() {
                return Err(anyhow!("scripted client exhausted"));
            }
            script.remove(0).map_err(|message| anyhow!(message))
        }
    }
}
