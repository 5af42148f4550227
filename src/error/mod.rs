use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("pipeline error: {context}")]
    Pipeline { context: &'static str },

    #[error("stage `{stage}` failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("stage `{stage}` gave up after {attempts} attempts: {source}")]
    RetryExhausted {
        stage: &'static str,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("no tokio runtime available to spawn pipeline tasks")]
    NoRuntime,
}

impl Error {
    pub fn pipeline(context: &'static str) -> Self {
        Self::Pipeline { context }
    }

    pub fn stage_source(stage: &'static str, source: Error) -> Self {
        Self::Stage {
            stage,
            source: Box::new(source),
        }
    }

    pub fn retry_exhausted(stage: &'static str, attempts: u32, source: Error) -> Self {
        Self::RetryExhausted {
            stage,
            attempts,
            source: Box::new(source),
        }
    }
}
